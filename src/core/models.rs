use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

const MAX_TITLE_CHARS: usize = 200;

/// Store-assigned pin identifier. `PinId(0)` marks a pin that was never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PinId(pub u32);

impl PinId {
    pub const UNASSIGNED: PinId = PinId(0);
}

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to a single remote thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Loadable {
    pub board: String,
    pub thread: u64,
}

impl Loadable {
    pub fn new(board: impl Into<String>, thread: u64) -> Self {
        Self {
            board: board.into(),
            thread,
        }
    }

    pub fn api_path(&self) -> String {
        format!("{}/thread/{}.json", self.board, self.thread)
    }

    pub fn web_url(&self, web_base: &str) -> String {
        format!(
            "{}/{}/thread/{}",
            web_base.trim_end_matches('/'),
            self.board,
            self.thread
        )
    }
}

impl fmt::Display for Loadable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.board, self.thread)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pin {
    pub id: PinId,
    pub loadable: Loadable,
    pub title: String,
    /// `None` until known; `Some("")` means the thread has no image.
    pub thumbnail_url: Option<String>,
    pub order: i32,
    pub watching: bool,
    pub archived: bool,
    pub is_error: bool,
    pub watch_last_count: i32,
    pub watch_new_count: i32,
    pub quote_last_count: i32,
    pub quote_new_count: i32,
}

impl Pin {
    pub fn new(loadable: Loadable, title: impl Into<String>) -> Self {
        Self {
            id: PinId::UNASSIGNED,
            loadable,
            title: title.into(),
            thumbnail_url: None,
            order: -1,
            watching: true,
            archived: false,
            is_error: false,
            watch_last_count: -1,
            watch_new_count: -1,
            quote_last_count: -1,
            quote_new_count: -1,
        }
    }

    /// Builds a pin for `loadable`, taking title and thumbnail from the
    /// post the user pinned from when there is one.
    pub fn from_post(loadable: Loadable, post: Option<&Post>) -> Self {
        let title = title_for(post, &loadable);
        let mut pin = Self::new(loadable, title);
        if let Some(post) = post {
            pin.thumbnail_url = Some(post.thumbnail_url.clone().unwrap_or_default());
        }
        pin
    }

    pub fn new_post_count(&self) -> i32 {
        unviewed_count(self.watch_last_count, self.watch_new_count)
    }

    pub fn new_quote_count(&self) -> i32 {
        unviewed_count(self.quote_last_count, self.quote_new_count)
    }

    pub fn is_loaded(&self) -> bool {
        self.watch_new_count >= 0 && self.quote_new_count >= 0
    }
}

fn unviewed_count(last: i32, new: i32) -> i32 {
    if last < 0 || new < 0 {
        0
    } else {
        (new - last).max(0)
    }
}

fn title_for(post: Option<&Post>, loadable: &Loadable) -> String {
    let Some(post) = post else {
        return loadable.to_string();
    };

    if let Some(subject) = post.subject.as_deref().map(str::trim) {
        if !subject.is_empty() {
            return subject.to_string();
        }
    }

    let comment = post.comment.trim();
    if comment.is_empty() {
        return loadable.to_string();
    }
    comment.chars().take(MAX_TITLE_CHARS).collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub no: u64,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub comment: String,
    /// Post numbers this post quotes.
    #[serde(default)]
    pub replies_to: BTreeSet<u64>,
    /// Set when the post is one of the user's own saved replies.
    #[serde(default)]
    pub is_saved_reply: bool,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

impl Post {
    pub fn new(no: u64) -> Self {
        Self {
            no,
            ..Default::default()
        }
    }
}

/// A thread as returned by one successful fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadSnapshot {
    pub posts: Vec<Post>,
    pub archived: bool,
    pub closed: bool,
}

impl ThreadSnapshot {
    pub fn op(&self) -> Option<&Post> {
        self.posts.first()
    }

    /// Posts that quote any of the user's saved replies, in thread order.
    pub fn quotes_of_saved_replies(&self) -> Vec<Post> {
        let saved: BTreeSet<u64> = self
            .posts
            .iter()
            .filter(|p| p.is_saved_reply)
            .map(|p| p.no)
            .collect();

        if saved.is_empty() {
            return Vec::new();
        }

        self.posts
            .iter()
            .filter(|p| p.replies_to.iter().any(|no| saved.contains(no)))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(no: u64, to: &[u64]) -> Post {
        Post {
            no,
            replies_to: to.iter().copied().collect(),
            ..Post::new(no)
        }
    }

    #[test]
    fn test_new_pin_defaults() {
        let pin = Pin::new(Loadable::new("g", 1), "title");
        assert_eq!(pin.id, PinId::UNASSIGNED);
        assert_eq!(pin.order, -1);
        assert!(pin.watching);
        assert!(!pin.is_loaded());
        assert_eq!(pin.new_post_count(), 0);
    }

    #[test]
    fn test_new_counts_never_negative() {
        let mut pin = Pin::new(Loadable::new("g", 1), "t");
        pin.watch_last_count = 10;
        pin.watch_new_count = 4;
        pin.quote_last_count = 1;
        pin.quote_new_count = 3;
        assert_eq!(pin.new_post_count(), 0);
        assert_eq!(pin.new_quote_count(), 2);
    }

    #[test]
    fn test_title_prefers_subject_then_comment() {
        let loadable = Loadable::new("g", 42);
        let mut op = Post::new(42);
        op.subject = Some("  Daily thread ".to_string());
        op.comment = "body".to_string();
        assert_eq!(Pin::from_post(loadable.clone(), Some(&op)).title, "Daily thread");

        op.subject = None;
        assert_eq!(Pin::from_post(loadable.clone(), Some(&op)).title, "body");

        op.comment.clear();
        assert_eq!(Pin::from_post(loadable.clone(), Some(&op)).title, "/g/42");
        assert_eq!(Pin::from_post(loadable, None).title, "/g/42");
    }

    #[test]
    fn test_thumbnail_from_post_without_image_is_empty() {
        let pin = Pin::from_post(Loadable::new("g", 1), Some(&Post::new(1)));
        assert_eq!(pin.thumbnail_url.as_deref(), Some(""));

        let pin = Pin::from_post(Loadable::new("g", 1), None);
        assert!(pin.thumbnail_url.is_none());
    }

    #[test]
    fn test_quotes_of_saved_replies() {
        let mut own = Post::new(2);
        own.is_saved_reply = true;
        let thread = ThreadSnapshot {
            posts: vec![Post::new(1), own, reply(3, &[2]), reply(4, &[1]), reply(5, &[1, 2])],
            ..Default::default()
        };

        let quotes: Vec<u64> = thread.quotes_of_saved_replies().iter().map(|p| p.no).collect();
        assert_eq!(quotes, vec![3, 5]);
    }

    #[test]
    fn test_loadable_urls() {
        let loadable = Loadable::new("g", 99);
        assert_eq!(loadable.api_path(), "g/thread/99.json");
        assert_eq!(
            loadable.web_url("https://boards.4chan.org/"),
            "https://boards.4chan.org/g/thread/99"
        );
        assert_eq!(loadable.to_string(), "/g/99");
    }

    #[test]
    fn test_pin_serialization_roundtrip() {
        let pin = Pin::new(Loadable::new("v", 7), "x");
        let json = serde_json::to_string(&pin).unwrap();
        let back: Pin = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pin);
    }
}
