use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub mod config;
pub mod error;
pub mod outline;
pub mod pagination;
pub mod ranges;
pub mod session;

pub use config::{Config, LoggingConfig, RenderConfig, ZoomConfig};
pub use error::{LoadError, ResolutionError};
pub use outline::{flatten_outline, resolve_destination};
pub use pagination::PaginationController;
pub use ranges::{build_ranges, Chapters};
pub use session::{Command, LoadOutcome, Session, ViewerEvent};

/// Indirect object reference inside a document, `(object number, generation)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub number: u32,
    pub generation: u16,
}

impl ObjectRef {
    pub fn new(number: u32, generation: u16) -> Self {
        Self { number, generation }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.number, self.generation)
    }
}

/// View parameters trailing the target of an explicit destination
/// (`/XYZ left top zoom`, `/FitH top`, ...). Only the renderer reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DestinationParam {
    Name(String),
    Number(f64),
    Null,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplicitDestination {
    /// First element of the destination array. `None` when the array was
    /// empty or did not start with an object reference.
    pub target: Option<ObjectRef>,
    pub params: Vec<DestinationParam>,
}

impl ExplicitDestination {
    pub fn to_page(target: ObjectRef) -> Self {
        Self {
            target: Some(target),
            params: vec![DestinationParam::Name("Fit".to_owned())],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DestinationRef {
    Named(String),
    Explicit(ExplicitDestination),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineNode {
    pub title: String,
    pub destination: Option<DestinationRef>,
    pub children: Vec<OutlineNode>,
}

impl OutlineNode {
    pub fn new(title: impl Into<String>, destination: Option<DestinationRef>) -> Self {
        Self {
            title: title.into(),
            destination,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<OutlineNode>) -> Self {
        self.children = children;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterEntry {
    pub title: String,
    /// 1-based page, `None` when the bookmark could not be resolved.
    pub page_number: Option<usize>,
}

impl ChapterEntry {
    pub fn is_selectable(&self) -> bool {
        self.page_number.is_some()
    }
}

/// Inclusive 1-based page interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpan {
    pub start: usize,
    pub end: usize,
}

impl PageSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, page: usize) -> bool {
        self.start <= page && page <= self.end
    }

    pub fn len(&self) -> usize {
        (self.end + 1).saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterRange {
    pub title: String,
    pub start: usize,
    pub end: usize,
}

impl ChapterRange {
    pub fn span(&self) -> PageSpan {
        PageSpan::new(self.start, self.end)
    }
}

impl From<&ChapterRange> for PageSpan {
    fn from(range: &ChapterRange) -> Self {
        range.span()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerState {
    pub current_page: usize,
    pub active_range: Option<PageSpan>,
    pub total_pages: usize,
    pub scale: f32,
}

impl ViewerState {
    /// Bounds navigation is confined to: the active range, or the whole document.
    pub fn bounds(&self) -> PageSpan {
        self.active_range
            .unwrap_or_else(|| PageSpan::new(1, self.total_pages))
    }

    pub fn page_label(&self) -> String {
        format!("Page {} of {}", self.current_page, self.bounds().end)
    }
}

#[derive(Debug, Clone)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// A loaded document as seen through the rendering engine. Implementations
/// are read-only and may be queried concurrently.
#[async_trait::async_trait]
pub trait DocumentHandle: Send + Sync {
    fn page_count(&self) -> usize;

    /// Top-level outline nodes, `None` when the document has no outline.
    async fn outline(&self) -> Result<Option<Vec<OutlineNode>>>;

    async fn resolve_named_destination(
        &self,
        name: &str,
    ) -> std::result::Result<ExplicitDestination, ResolutionError>;

    /// Zero-based index of the page object `reference` points at.
    async fn page_index_for_reference(
        &self,
        reference: ObjectRef,
    ) -> std::result::Result<usize, ResolutionError>;

    async fn render_page(&self, page_index: usize, scale: f32) -> Result<RenderImage>;
}

#[async_trait::async_trait]
pub trait RenderingEngine: Send + Sync {
    async fn load_document(
        &self,
        bytes: Bytes,
    ) -> std::result::Result<Arc<dyn DocumentHandle>, LoadError>;
}
