use std::io::{self, Write};

use pdfchapters_core::ViewerState;

mod chapter_list;
mod input;
mod kitty;

pub use chapter_list::{format_row, truncate_with_ellipsis, ChapterListView, ChapterRow};
pub use input::{EventMapper, InputMode, UiEvent};
pub use kitty::{DrawParams, KittyRenderer};

/// Status line text: page label, active chapter, zoom and any typed count.
pub fn format_status(
    state: &ViewerState,
    chapter: Option<&str>,
    pending_input: Option<&str>,
) -> String {
    let mut status = state.page_label();
    if let Some(title) = chapter {
        status.push_str(" | ");
        status.push_str(title);
    }
    let percent = state.scale * 100.0;
    if percent.is_finite() {
        status.push_str(&format!(" | {:.0}%", percent));
    }
    if let Some(pending) = pending_input.filter(|s| !s.is_empty()) {
        status.push_str(" | ");
        status.push_str(pending);
    }
    status
}

pub fn write_status_line<W: Write>(writer: &mut W, label: &str) -> io::Result<()> {
    write!(writer, "{}", label)?;
    writer.flush()
}
