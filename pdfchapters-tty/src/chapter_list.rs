use pdfchapters_core::Chapters;

/// Selection and scroll state of the chapter list overlay.
#[derive(Debug, Clone)]
pub struct ChapterListView {
    rows: Vec<ChapterRow>,
    selected: usize,
    scroll_offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterRow {
    pub title: String,
    /// `"12-40"`, or `None` for a bookmark that could not be resolved.
    pub pages: Option<String>,
}

impl ChapterRow {
    pub fn is_selectable(&self) -> bool {
        self.pages.is_some()
    }
}

impl ChapterListView {
    /// Starts with the chapter containing `current_page` selected.
    pub fn new(chapters: &Chapters, current_page: usize) -> Self {
        let rows = chapters
            .entries
            .iter()
            .enumerate()
            .map(|(index, entry)| ChapterRow {
                title: entry.title.clone(),
                pages: chapters.range_for_entry(index).map(|range| {
                    if range.start == range.end {
                        range.start.to_string()
                    } else {
                        format!("{}-{}", range.start, range.end)
                    }
                }),
            })
            .collect();
        Self {
            rows,
            selected: chapters.entry_for_page(current_page).unwrap_or(0),
            scroll_offset: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[ChapterRow] {
        &self.rows
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    /// Entry index to activate, `None` when the highlighted row is unresolved.
    pub fn selected_entry(&self) -> Option<usize> {
        self.rows
            .get(self.selected)
            .filter(|row| row.is_selectable())
            .map(|_| self.selected)
    }

    pub fn move_selection(&mut self, delta: isize) -> bool {
        if self.rows.is_empty() {
            return false;
        }
        let last = self.rows.len() as isize - 1;
        let next = (self.selected as isize + delta).clamp(0, last) as usize;
        let changed = next != self.selected;
        self.selected = next;
        changed
    }

    /// Rows visible in a window `height` rows tall, scrolled to keep the
    /// selection on screen.
    pub fn visible(&mut self, height: usize) -> impl Iterator<Item = (usize, &ChapterRow)> {
        let height = height.max(1);
        if self.selected < self.scroll_offset {
            self.scroll_offset = self.selected;
        } else if self.selected >= self.scroll_offset + height {
            self.scroll_offset = self.selected + 1 - height;
        }
        self.scroll_offset = self
            .scroll_offset
            .min(self.rows.len().saturating_sub(height));
        self.rows
            .iter()
            .enumerate()
            .skip(self.scroll_offset)
            .take(height)
    }
}

/// Formats one overlay row padded or truncated to exactly `width` characters.
pub fn format_row(row: &ChapterRow, selected: bool, width: usize) -> String {
    let marker = if selected { '>' } else { ' ' };
    let suffix = match &row.pages {
        Some(pages) => format!(" p{}", pages),
        None => " (unresolved)".to_owned(),
    };
    let title_width = width.saturating_sub(2 + suffix.chars().count());
    let title = truncate(&row.title, title_width);
    let line = format!("{} {}{}", marker, title, suffix);
    truncate_with_ellipsis(&line, width)
}

/// Shortens `text` to at most `width` characters, ending in `...` when cut.
pub fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_owned();
    }
    if width <= 3 {
        return text.chars().take(width).collect();
    }
    let mut truncated: String = text.chars().take(width - 3).collect();
    truncated.push_str("...");
    truncated
}

pub fn truncate_with_ellipsis(text: &str, width: usize) -> String {
    let mut out = truncate(text, width);
    let used = out.chars().count();
    out.extend(std::iter::repeat(' ').take(width.saturating_sub(used)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdfchapters_core::ChapterEntry;

    fn chapters() -> Chapters {
        let entries = vec![
            ChapterEntry {
                title: "Preface".to_owned(),
                page_number: Some(1),
            },
            ChapterEntry {
                title: "Lost".to_owned(),
                page_number: None,
            },
            ChapterEntry {
                title: "Methods".to_owned(),
                page_number: Some(21),
            },
            ChapterEntry {
                title: "Index".to_owned(),
                page_number: Some(100),
            },
        ];
        Chapters::new(Vec::new(), entries, 100)
    }

    #[test]
    fn rows_show_ranges_and_unresolved_entries() {
        let view = ChapterListView::new(&chapters(), 1);
        let pages: Vec<_> = view.rows().iter().map(|r| r.pages.clone()).collect();
        assert_eq!(
            pages,
            vec![
                Some("1-20".to_owned()),
                None,
                Some("21-99".to_owned()),
                Some("100".to_owned()),
            ]
        );
    }

    #[test]
    fn initial_selection_follows_current_page() {
        assert_eq!(ChapterListView::new(&chapters(), 50).selected(), 2);
        assert_eq!(ChapterListView::new(&chapters(), 100).selected(), 3);
        assert_eq!(ChapterListView::new(&chapters(), 3).selected(), 0);
    }

    #[test]
    fn unresolved_row_cannot_be_activated() {
        let mut view = ChapterListView::new(&chapters(), 1);
        assert_eq!(view.selected_entry(), Some(0));
        assert!(view.move_selection(1));
        assert_eq!(view.selected_entry(), None);
        view.move_selection(1);
        assert_eq!(view.selected_entry(), Some(2));
    }

    #[test]
    fn selection_is_clamped() {
        let mut view = ChapterListView::new(&chapters(), 1);
        assert!(!view.move_selection(-1));
        assert!(view.move_selection(50));
        assert_eq!(view.selected(), 3);
    }

    #[test]
    fn visible_window_follows_selection() {
        let mut view = ChapterListView::new(&chapters(), 100);
        let shown: Vec<usize> = view.visible(2).map(|(i, _)| i).collect();
        assert_eq!(shown, vec![2, 3]);
        view.move_selection(-3);
        let shown: Vec<usize> = view.visible(2).map(|(i, _)| i).collect();
        assert_eq!(shown, vec![0, 1]);
    }

    #[test]
    fn rows_are_fitted_to_width() {
        let row = ChapterRow {
            title: "A rather long chapter title".to_owned(),
            pages: Some("21-60".to_owned()),
        };
        let line = format_row(&row, true, 20);
        assert_eq!(line.chars().count(), 20);
        assert!(line.starts_with("> A rather"));
        assert!(line.ends_with(" p21-60"));

        let row = ChapterRow {
            title: "Lost".to_owned(),
            pages: None,
        };
        assert_eq!(format_row(&row, false, 22), "  Lost (unresolved)   ");
    }
}
