//! Source document retrieval from the Notion block API.
//!
//! A page's content is a paginated list of child blocks; any block with
//! `has_children` owns a further paginated list. [`NotionSource`] drains
//! every page of every level in order and returns the fully assembled tree.
//! Sub-pages and inline databases are references to other documents and are
//! not descended into.
//!
//! Retrieval is all-or-nothing: the first non-success response aborts and
//! whatever was gathered so far is dropped.

use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::block::{Block, BlockKind, ImageSource};
use crate::error::DeckError;

/// Notion's maximum `page_size`.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Block types that reference other documents.
const OPAQUE_CHILD_TYPES: &[&str] = &["child_page", "child_database"];

static RE_PAGE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)([0-9a-f]{32})$").unwrap());

/// Extract a 32-hex page id from an id, a dashed UUID, or a page URL.
///
/// ```
/// use page2deck::pipeline::source::parse_page_id;
///
/// let id = parse_page_id("https://www.notion.so/team/Roadmap-0123456789abcdef0123456789ABCDEF?pvs=4").unwrap();
/// assert_eq!(id, "0123456789abcdef0123456789abcdef");
/// ```
pub fn parse_page_id(input: &str) -> Result<String, DeckError> {
    let invalid = || DeckError::InvalidPageId {
        input: input.to_string(),
    };

    let trimmed = input.trim();
    // Query and fragment never carry the id.
    let path = trimmed
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('/');
    let last = path.rsplit('/').next().unwrap_or_default();

    // A dashed UUID as the last segment.
    let undashed: String = last.chars().filter(|c| *c != '-').collect();
    if last.len() == 36 && undashed.len() == 32 && undashed.chars().all(|c| c.is_ascii_hexdigit()) {
        return Ok(undashed.to_ascii_lowercase());
    }

    RE_PAGE_ID
        .captures(last)
        .map(|caps| caps[1].to_ascii_lowercase())
        .ok_or_else(invalid)
}

#[derive(Debug, Deserialize)]
struct BlockList {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    has_more: bool,
    next_cursor: Option<String>,
}

/// Client for the block and page endpoints.
#[derive(Debug, Clone)]
pub struct NotionSource {
    client: reqwest::Client,
    base_url: String,
    token: String,
    version: String,
    page_size: u32,
    max_blocks: Option<usize>,
}

impl NotionSource {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        version: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DeckError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeckError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            version: version.into(),
            page_size: MAX_PAGE_SIZE,
            max_blocks: None,
        })
    }

    /// Blocks per request, clamped to `1..=100`.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Fail with [`DeckError::BlockLimitExceeded`] past `limit` blocks.
    pub fn with_max_blocks(mut self, limit: Option<usize>) -> Self {
        self.max_blocks = limit;
        self
    }

    /// Every block of `page_id`, as an ordered tree.
    pub async fn fetch_blocks(&self, page_id: &str) -> Result<Vec<Block>, DeckError> {
        let mut seen = 0usize;
        let blocks = self.fetch_children(page_id, &mut seen).await?;
        info!("Retrieved {} blocks ({} at top level)", seen, blocks.len());
        Ok(blocks)
    }

    /// The page's title property, if it has a non-empty one.
    pub async fn fetch_title(&self, page_id: &str) -> Result<Option<String>, DeckError> {
        let url = format!("{}/v1/pages/{}", self.base_url, page_id);
        let page = self.get_json(&url, &[], &format!("page {page_id}")).await?;

        let title = page
            .get("properties")
            .and_then(Value::as_object)
            .and_then(|props| {
                props
                    .values()
                    .find(|p| p.get("type").and_then(Value::as_str) == Some("title"))
            })
            .map(|p| rich_text(p.get("title")))
            .map(|t| t.concat().trim().to_string())
            .filter(|t| !t.is_empty());
        Ok(title)
    }

    fn fetch_children<'a>(
        &'a self,
        block_id: &'a str,
        seen: &'a mut usize,
    ) -> BoxFuture<'a, Result<Vec<Block>, DeckError>> {
        async move {
            let mut blocks = Vec::new();
            let mut cursor: Option<String> = None;

            loop {
                let url = format!("{}/v1/blocks/{}/children", self.base_url, block_id);
                let mut query = vec![("page_size", self.page_size.to_string())];
                if let Some(c) = &cursor {
                    query.push(("start_cursor", c.clone()));
                }

                let body = self
                    .get_json(&url, &query, &format!("children of {block_id}"))
                    .await?;
                let batch: BlockList = serde_json::from_value(body).map_err(|e| {
                    DeckError::RetrievalTransport {
                        detail: format!("unexpected block list shape: {e}"),
                    }
                })?;
                debug!("{}: {} blocks, has_more={}", block_id, batch.results.len(), batch.has_more);

                for raw in &batch.results {
                    *seen += 1;
                    if let Some(limit) = self.max_blocks {
                        if *seen > limit {
                            return Err(DeckError::BlockLimitExceeded { limit });
                        }
                    }

                    let mut block = map_block(raw);
                    if descends(raw) {
                        if let Some(id) = raw.get("id").and_then(Value::as_str) {
                            block.children = self.fetch_children(id, seen).await?;
                        }
                    }
                    blocks.push(block);
                }

                match batch.next_cursor {
                    Some(next) if batch.has_more => cursor = Some(next),
                    _ => break,
                }
            }
            Ok(blocks)
        }
        .boxed()
    }

    async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
        what: &str,
    ) -> Result<Value, DeckError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .bearer_auth(&self.token)
            .header("Notion-Version", &self.version)
            .send()
            .await
            .map_err(|e| DeckError::RetrievalTransport {
                detail: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeckError::RetrievalFailed {
                status: status.as_u16(),
                what: what.to_string(),
                detail: error_detail(&body),
            });
        }

        response
            .json()
            .await
            .map_err(|e| DeckError::RetrievalTransport {
                detail: format!("unreadable response for {what}: {e}"),
            })
    }
}

/// `code: message` from an API error body, or the body itself.
fn error_detail(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let field = |name: &str| {
        parsed
            .as_ref()
            .and_then(|v| v.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    match (field("code"), field("message")) {
        (Some(code), Some(message)) => format!("{code}: {message}"),
        (None, Some(message)) => message,
        _ => body.chars().take(300).collect(),
    }
}

fn descends(raw: &Value) -> bool {
    let has_children = raw
        .get("has_children")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let kind = raw.get("type").and_then(Value::as_str).unwrap_or_default();
    has_children && !OPAQUE_CHILD_TYPES.contains(&kind)
}

fn rich_text(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|runs| {
            runs.iter()
                .filter_map(|r| r.get("plain_text").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Map one API block object to a [`Block`] (children not yet attached).
pub fn map_block(raw: &Value) -> Block {
    let kind_name = raw.get("type").and_then(Value::as_str).unwrap_or("unknown");
    let payload = raw.get(kind_name);
    let field = |name: &str| payload.and_then(|p| p.get(name));
    let text = rich_text(field("rich_text"));

    let kind = match kind_name {
        "paragraph" => BlockKind::Paragraph,
        "heading_1" => BlockKind::Heading1,
        "heading_2" => BlockKind::Heading2,
        "heading_3" => BlockKind::Heading3,
        "bulleted_list_item" => BlockKind::BulletedListItem,
        "numbered_list_item" => BlockKind::NumberedListItem,
        "quote" => BlockKind::Quote,
        "code" => BlockKind::Code {
            language: field("language")
                .and_then(Value::as_str)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
        },
        "image" => {
            let url_of = |key: &str| {
                field(key)
                    .and_then(|v| v.get("url"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            };
            let source = match field("type").and_then(Value::as_str) {
                Some("file") => url_of("file").map(ImageSource::File),
                _ => url_of("external").map(ImageSource::External),
            }
            .or_else(|| url_of("file").map(ImageSource::File));

            match source {
                Some(source) => BlockKind::Image {
                    source,
                    caption: rich_text(field("caption")).concat(),
                },
                // An image with no URL has nothing to show.
                None => BlockKind::Other {
                    name: "image".to_string(),
                },
            }
        }
        other => BlockKind::Other {
            name: other.to_string(),
        },
    };

    Block {
        kind,
        text,
        children: Vec::new(),
    }
}
