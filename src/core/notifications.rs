use anyhow::Result;
use notify_rust::Notification;

const MAX_BODY_LINES: usize = 5;

/// Unviewed activity on one watched pin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinActivity {
    pub title: String,
    pub new_posts: usize,
    pub new_quotes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSummary {
    pub summary: String,
    pub body: String,
    pub has_quotes: bool,
}

/// Builds the notification text, or `None` when nothing is unviewed.
pub fn summarize(activity: &[PinActivity]) -> Option<WatchSummary> {
    let active: Vec<&PinActivity> = activity
        .iter()
        .filter(|a| a.new_posts > 0 || a.new_quotes > 0)
        .collect();
    if active.is_empty() {
        return None;
    }

    let posts: usize = active.iter().map(|a| a.new_posts).sum();
    let quotes: usize = active.iter().map(|a| a.new_quotes).sum();

    let mut summary = format!(
        "{} new {} in {} {}",
        posts,
        plural(posts, "post", "posts"),
        active.len(),
        plural(active.len(), "thread", "threads")
    );
    if quotes > 0 {
        summary.push_str(&format!(", {} {}", quotes, plural(quotes, "quote", "quotes")));
    }

    // Threads quoting the user first.
    let mut ordered = active.clone();
    ordered.sort_by_key(|a| std::cmp::Reverse(a.new_quotes));

    let mut lines: Vec<String> = ordered
        .iter()
        .take(MAX_BODY_LINES)
        .map(|a| {
            if a.new_quotes > 0 {
                format!("{}: {} new, {} quoting you", a.title, a.new_posts, a.new_quotes)
            } else {
                format!("{}: {} new", a.title, a.new_posts)
            }
        })
        .collect();
    if ordered.len() > MAX_BODY_LINES {
        lines.push(format!("and {} more", ordered.len() - MAX_BODY_LINES));
    }

    Some(WatchSummary {
        summary,
        body: lines.join("\n"),
        has_quotes: quotes > 0,
    })
}

fn plural<'a>(n: usize, one: &'a str, many: &'a str) -> &'a str {
    if n == 1 {
        one
    } else {
        many
    }
}

pub fn send_watch_notification(summary: &WatchSummary) -> Result<()> {
    let urgency = if summary.has_quotes {
        notify_rust::Urgency::Critical
    } else {
        notify_rust::Urgency::Normal
    };

    Notification::new()
        .summary(&summary.summary)
        .body(&summary.body)
        .appname("pinwatch")
        .urgency(urgency)
        .timeout(notify_rust::Timeout::Milliseconds(5000))
        .show()?;

    tracing::info!(
        summary = %summary.summary,
        has_quotes = summary.has_quotes,
        "Sent watch notification"
    );

    Ok(())
}
