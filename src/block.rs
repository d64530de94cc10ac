//! Block Records: the unit consumed by the Markdown transducer.
//!
//! A page is an ordered list of root [`Block`]s; each block owns its
//! children outright, so the whole document is a plain tree of values. The
//! transducer only ever reads it.

use serde::{Deserialize, Serialize};

/// Where an image block's bytes live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "url", rename_all = "snake_case")]
pub enum ImageSource {
    /// Hot-linked from an external URL.
    External(String),
    /// Uploaded to the document host (signed, expiring URL).
    File(String),
}

impl ImageSource {
    pub fn url(&self) -> &str {
        match self {
            ImageSource::External(u) | ImageSource::File(u) => u,
        }
    }
}

/// Block type tag, with the kind-specific payload folded in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockKind {
    Paragraph,
    Heading1,
    Heading2,
    Heading3,
    BulletedListItem,
    NumberedListItem,
    Code {
        /// Language tag for the fence; `None` emits an untagged fence.
        language: Option<String>,
    },
    Quote,
    Image {
        source: ImageSource,
        /// Caption text, used as alt text.
        #[serde(default)]
        caption: String,
    },
    /// Any other source type, keyed by its raw type name.
    Other { name: String },
}

/// The two list kinds. Runs of one never merge with runs of the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Bulleted,
    Numbered,
}

impl ListKind {
    /// Line marker, including the trailing space.
    pub fn marker(self) -> &'static str {
        match self {
            ListKind::Bulleted => "- ",
            ListKind::Numbered => "1. ",
        }
    }
}

impl BlockKind {
    /// `Some` for list-item kinds.
    pub fn list_kind(&self) -> Option<ListKind> {
        match self {
            BlockKind::BulletedListItem => Some(ListKind::Bulleted),
            BlockKind::NumberedListItem => Some(ListKind::Numbered),
            _ => None,
        }
    }
}

/// One node of the source document tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub kind: BlockKind,
    /// Plain-text runs, concatenated to form the block's text.
    #[serde(default)]
    pub text: Vec<String>,
    /// Children in render order. Empty means leaf.
    #[serde(default)]
    pub children: Vec<Block>,
}

impl Block {
    pub fn new(kind: BlockKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: vec![text.into()],
            children: Vec::new(),
        }
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::new(BlockKind::Paragraph, text)
    }

    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        let kind = match level {
            1 => BlockKind::Heading1,
            2 => BlockKind::Heading2,
            _ => BlockKind::Heading3,
        };
        Self::new(kind, text)
    }

    pub fn bulleted(text: impl Into<String>) -> Self {
        Self::new(BlockKind::BulletedListItem, text)
    }

    pub fn numbered(text: impl Into<String>) -> Self {
        Self::new(BlockKind::NumberedListItem, text)
    }

    pub fn quote(text: impl Into<String>) -> Self {
        Self::new(BlockKind::Quote, text)
    }

    pub fn code(language: Option<&str>, text: impl Into<String>) -> Self {
        Self::new(
            BlockKind::Code {
                language: language.map(str::to_string),
            },
            text,
        )
    }

    pub fn image(source: ImageSource) -> Self {
        Self {
            kind: BlockKind::Image {
                source,
                caption: String::new(),
            },
            text: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Attach children, replacing any existing ones.
    pub fn with_children(mut self, children: Vec<Block>) -> Self {
        self.children = children;
        self
    }

    /// Concatenated text of all runs.
    pub fn plain_text(&self) -> String {
        self.text.concat()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Total number of blocks in this subtree, including `self`.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(Block::subtree_len).sum::<usize>()
    }
}
