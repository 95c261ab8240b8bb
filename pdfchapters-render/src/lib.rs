use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use pdfchapters_core::{
    DocumentHandle, ExplicitDestination, LoadError, ObjectRef, OutlineNode, RenderConfig,
    RenderImage, RenderingEngine, ResolutionError,
};
use tracing::{info, instrument, warn};

#[cfg(feature = "pdf")]
mod pdfium;
mod structure;

#[cfg(feature = "pdf")]
pub use pdfium::PdfiumRasterizer;

use structure::{read_structure, Structure};

/// Turns one page of a document into RGBA pixels.
pub trait PageRasterizer: Send + Sync {
    fn render(&self, bytes: &[u8], page_index: usize, scale: f32) -> Result<RenderImage>;
}

/// Engine that reads document structure with `lopdf` and hands rasterization
/// to an optional [`PageRasterizer`].
#[derive(Clone, Default)]
pub struct PdfEngine {
    rasterizer: Option<Arc<dyn PageRasterizer>>,
}

impl PdfEngine {
    /// Outline and page lookups only; `render_page` always fails.
    pub fn structure_only() -> Self {
        Self { rasterizer: None }
    }

    pub fn with_rasterizer(rasterizer: Arc<dyn PageRasterizer>) -> Self {
        Self {
            rasterizer: Some(rasterizer),
        }
    }

    #[cfg(feature = "pdf")]
    pub fn from_config(config: &RenderConfig) -> Result<Self> {
        let rasterizer = PdfiumRasterizer::bind(config.pdfium_library.as_deref())?;
        Ok(Self::with_rasterizer(Arc::new(rasterizer)))
    }

    #[cfg(not(feature = "pdf"))]
    pub fn from_config(_config: &RenderConfig) -> Result<Self> {
        bail!("built without the `pdf` feature; page rendering is unavailable")
    }

    pub fn can_render(&self) -> bool {
        self.rasterizer.is_some()
    }
}

#[async_trait]
impl RenderingEngine for PdfEngine {
    #[instrument(skip_all, fields(len = bytes.len()))]
    async fn load_document(&self, bytes: Bytes) -> Result<Arc<dyn DocumentHandle>, LoadError> {
        let parse_bytes = bytes.clone();
        let structure = tokio::task::spawn_blocking(move || {
            lopdf::Document::load_mem(&parse_bytes)
                .map(|doc| read_structure(&doc))
                .map_err(|err| LoadError::Malformed(err.to_string()))
        })
        .await
        .map_err(|err| LoadError::Engine(anyhow!("document parse task failed: {err}")))??;

        info!(pages = structure.page_count, "document loaded");
        Ok(Arc::new(LopdfDocument {
            bytes,
            structure,
            rasterizer: self.rasterizer.clone(),
        }))
    }
}

struct LopdfDocument {
    bytes: Bytes,
    structure: Structure,
    rasterizer: Option<Arc<dyn PageRasterizer>>,
}

#[async_trait]
impl DocumentHandle for LopdfDocument {
    fn page_count(&self) -> usize {
        self.structure.page_count
    }

    async fn outline(&self) -> Result<Option<Vec<OutlineNode>>> {
        Ok(self.structure.outline.clone())
    }

    async fn resolve_named_destination(
        &self,
        name: &str,
    ) -> Result<ExplicitDestination, ResolutionError> {
        self.structure
            .named
            .get(name)
            .cloned()
            .ok_or_else(|| ResolutionError::UnknownNamedDestination(name.to_owned()))
    }

    async fn page_index_for_reference(
        &self,
        reference: ObjectRef,
    ) -> Result<usize, ResolutionError> {
        self.structure
            .pages
            .get(&reference)
            .copied()
            .ok_or(ResolutionError::UnresolvableReference(Some(reference)))
    }

    #[instrument(skip(self))]
    async fn render_page(&self, page_index: usize, scale: f32) -> Result<RenderImage> {
        if page_index >= self.structure.page_count {
            bail!(
                "page {} out of range ({} pages)",
                page_index,
                self.structure.page_count
            );
        }
        let Some(rasterizer) = self.rasterizer.clone() else {
            warn!(page_index, "render requested without a rasterizer");
            bail!("no page rasterizer configured");
        };
        let bytes = self.bytes.clone();
        tokio::task::spawn_blocking(move || rasterizer.render(&bytes, page_index, scale))
            .await
            .context("render task failed")?
    }
}
