use std::io::Write;

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    terminal::{Clear, ClearType},
};
use pdfchapters_core::RenderImage;
use png::{BitDepth, ColorType, Encoder};

const CHUNK_SIZE: usize = 4096;

/// Writes page images with the kitty graphics protocol.
pub struct KittyRenderer<W: Write> {
    writer: W,
    image_id: u32,
}

/// Cell area an image is scaled into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawParams {
    pub columns: u32,
    pub rows: u32,
}

impl DrawParams {
    pub fn clamped(columns: u32, rows: u32) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }

    /// Largest cell area inside `columns x rows` that keeps the image's
    /// aspect ratio, given the pixel size of one cell.
    pub fn fit(image: &RenderImage, columns: u32, rows: u32, cell_px: (f32, f32)) -> Self {
        let (cell_w, cell_h) = cell_px;
        if image.width == 0 || image.height == 0 || cell_w <= 0.0 || cell_h <= 0.0 {
            return Self::clamped(columns, rows);
        }
        let avail_w = columns as f32 * cell_w;
        let avail_h = rows as f32 * cell_h;
        let ratio = (avail_w / image.width as f32).min(avail_h / image.height as f32);
        let cols = (image.width as f32 * ratio / cell_w).round() as u32;
        let rows_used = (image.height as f32 * ratio / cell_h).round() as u32;
        Self::clamped(cols.min(columns), rows_used.min(rows))
    }
}

impl<W: Write> KittyRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            image_id: 1,
        }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Transmits and places `image`, replacing the previous page image.
    pub fn draw(&mut self, image: &RenderImage, params: DrawParams) -> Result<()> {
        let encoded = BASE64.encode(encode_png(image)?);
        let mut chunks = encoded.as_bytes().chunks(CHUNK_SIZE).peekable();
        let mut first = true;

        while let Some(chunk) = chunks.next() {
            let more = u8::from(chunks.peek().is_some());
            if first {
                write!(
                    self.writer,
                    "\u{1b}_Ga=T,f=100,C=1,q=2,i={},c={},r={},z=-1,m={}",
                    self.image_id, params.columns, params.rows, more
                )?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={},q=2", more)?;
            }
            self.writer.write_all(b";")?;
            self.writer.write_all(chunk)?;
            write!(self.writer, "\u{1b}\\")?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Removes every placement of the page image, e.g. before an overlay.
    pub fn delete_image(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}_Ga=d,d=I,i={},q=2\u{1b}\\", self.image_id)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// Ends a synchronized update; the terminal paints buffered output at once.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }
}

fn encode_png(image: &RenderImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut encoder = Encoder::new(&mut buffer, image.width, image.height);
    encoder.set_color(ColorType::Rgba);
    encoder.set_depth(BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&image.pixels)?;
    writer.finish()?;
    Ok(buffer)
}
