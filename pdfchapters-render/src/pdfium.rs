use std::convert::TryFrom;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use pdfchapters_core::RenderImage;
use pdfium_render::prelude::*;
use tracing::{debug, instrument, warn};

use crate::PageRasterizer;

/// Rasterizes pages through a dynamically bound pdfium library.
pub struct PdfiumRasterizer {
    pdfium: Pdfium,
}

impl PdfiumRasterizer {
    /// Binds `library` when given, otherwise tries the working directory and
    /// then the system library path.
    pub fn bind(library: Option<&Path>) -> Result<Self> {
        let pdfium = match library {
            Some(path) => bind_pdfium_at(path)?,
            None => bind_pdfium_default()?,
        };
        Ok(Self { pdfium })
    }
}

impl PageRasterizer for PdfiumRasterizer {
    #[instrument(skip(self, bytes))]
    fn render(&self, bytes: &[u8], page_index: usize, scale: f32) -> Result<RenderImage> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .context("pdfium failed to open document")?;
        let index: PdfPageIndex = page_index
            .try_into()
            .map_err(|_| anyhow!("page {} is out of supported range", page_index))?;
        let page = document
            .pages()
            .get(index)
            .with_context(|| format!("page {} out of range", page_index))?;

        let config = PdfRenderConfig::new().scale_page_by_factor(scale.max(0.1));
        let bitmap = page
            .render_with_config(&config)
            .with_context(|| format!("failed to render page {}", page_index))?;
        let pixels = bitmap.as_image().to_rgba8().into_raw();
        debug!(page_index, width = bitmap.width(), height = bitmap.height(), "rendered page");

        Ok(RenderImage {
            width: u32::try_from(bitmap.width()).unwrap_or_default(),
            height: u32::try_from(bitmap.height()).unwrap_or_default(),
            pixels,
        })
    }
}

fn bind_pdfium_at(path: &Path) -> Result<Pdfium> {
    let bindings = Pdfium::bind_to_library(path)
        .map_err(|err| anyhow!("failed to load pdfium from {}: {}", path.display(), err))?;
    Ok(Pdfium::new(bindings))
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("{}: {}", cwd_path.display(), err));
        }
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            warn!(attempts = %errors.join(", "), "no pdfium library found");
            Err(anyhow!(
                "failed to bind to a pdfium library; install it or set render.pdfium_library ({})",
                errors.join(", ")
            ))
        }
    }
}
