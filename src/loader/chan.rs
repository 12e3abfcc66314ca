use super::ThreadSource;
use crate::core::error::LoadError;
use crate::core::models::{Loadable, Post, ThreadSnapshot};
use crate::core::settings::{ApiSettings, SavedReply};
use async_trait::async_trait;
use scraper::{Html, Node, Selector};
use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// The user's own posts, shared with the daemon so config reloads apply
/// to fetches already scheduled.
#[derive(Debug, Clone, Default)]
pub struct SavedReplies {
    inner: Arc<RwLock<HashSet<SavedReply>>>,
}

impl SavedReplies {
    pub fn new(replies: &[SavedReply]) -> Self {
        let saved = Self::default();
        saved.replace(replies);
        saved
    }

    pub fn replace(&self, replies: &[SavedReply]) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *inner = replies.iter().cloned().collect();
    }

    pub fn contains(&self, board: &str, no: u64) -> bool {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.contains(&SavedReply {
            board: board.to_string(),
            no,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiThread {
    #[serde(default)]
    posts: Vec<ApiPost>,
}

#[derive(Debug, Deserialize)]
struct ApiPost {
    no: u64,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    com: Option<String>,
    #[serde(default)]
    tim: Option<u64>,
    #[serde(default)]
    closed: u8,
    #[serde(default)]
    archived: u8,
}

/// Fetches threads from a 4chan-compatible read-only JSON API.
pub struct ChanApiSource {
    client: reqwest::Client,
    api: ApiSettings,
    saved: SavedReplies,
}

impl ChanApiSource {
    pub fn new(api: ApiSettings, saved: SavedReplies) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(api.timeout_secs))
            .user_agent(concat!("pinwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, api, saved })
    }

    fn to_snapshot(&self, loadable: &Loadable, thread: ApiThread) -> ThreadSnapshot {
        let (archived, closed) = thread
            .posts
            .first()
            .map(|op| (op.archived != 0, op.closed != 0))
            .unwrap_or((false, false));

        let posts = thread
            .posts
            .into_iter()
            .map(|p| {
                let comment_html = p.com.unwrap_or_default();
                Post {
                    no: p.no,
                    subject: p.sub.map(|s| strip_html(&s)),
                    replies_to: quoted_posts(&comment_html),
                    comment: strip_html(&comment_html),
                    is_saved_reply: self.saved.contains(&loadable.board, p.no),
                    thumbnail_url: p.tim.map(|tim| {
                        format!(
                            "{}/{}/{}s.jpg",
                            self.api.media_url.trim_end_matches('/'),
                            loadable.board,
                            tim
                        )
                    }),
                }
            })
            .collect();

        ThreadSnapshot {
            posts,
            archived,
            closed,
        }
    }
}

#[async_trait]
impl ThreadSource for ChanApiSource {
    async fn fetch(&self, loadable: &Loadable) -> Result<ThreadSnapshot, LoadError> {
        let url = format!(
            "{}/{}",
            self.api.base_url.trim_end_matches('/'),
            loadable.api_path()
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LoadError::Transient(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(LoadError::NotFound);
        }
        if !status.is_success() {
            return Err(LoadError::Transient(format!("HTTP {status}")));
        }

        let thread: ApiThread = response
            .json()
            .await
            .map_err(|e| LoadError::Transient(format!("invalid thread JSON: {e}")))?;

        Ok(self.to_snapshot(loadable, thread))
    }
}

/// Post numbers referenced by quote links in a comment.
fn quoted_posts(comment_html: &str) -> BTreeSet<u64> {
    let Ok(selector) = Selector::parse("a.quotelink") else {
        return BTreeSet::new();
    };
    let fragment = Html::parse_fragment(comment_html);
    let quotes = fragment
        .select(&selector)
        .filter_map(|link| link.value().attr("href"))
        .filter_map(|href| href.rsplit_once("#p"))
        .filter_map(|(_, no)| no.parse().ok())
        .collect();
    quotes
}

/// Comment text with markup removed and entities decoded. Line breaks
/// become newlines.
fn strip_html(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut text = String::with_capacity(html.len());
    for node in fragment.tree.root().descendants() {
        match node.value() {
            Node::Text(t) => text.push_str(t),
            Node::Element(e) if e.name() == "br" => text.push('\n'),
            _ => {}
        }
    }
    text
}
