use serde::{Deserialize, Serialize};

use crate::{ChapterEntry, ChapterRange, OutlineNode};

/// Splits the document into one page range per resolved chapter.
///
/// Unresolved entries are skipped. A chapter ends the page before the next
/// resolved chapter starts, the last one at `total_pages`. When the next
/// chapter does not start after this one (duplicate or out-of-order
/// bookmarks) the range shrinks to its first page instead of inverting.
pub fn build_ranges(entries: &[ChapterEntry], total_pages: usize) -> Vec<ChapterRange> {
    let resolved: Vec<(&str, usize)> = entries
        .iter()
        .filter_map(|entry| entry.page_number.map(|page| (entry.title.as_str(), page)))
        .collect();

    resolved
        .iter()
        .enumerate()
        .map(|(index, &(title, start))| {
            let end = match resolved.get(index + 1) {
                Some(&(_, next)) if next <= start => start,
                Some(&(_, next)) => next - 1,
                None => total_pages.max(start),
            };
            ChapterRange {
                title: title.to_owned(),
                start,
                end,
            }
        })
        .collect()
}

/// Everything derived from a document's outline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chapters {
    /// Full outline tree, nested levels included, for display.
    pub outline: Vec<OutlineNode>,
    pub entries: Vec<ChapterEntry>,
    pub ranges: Vec<ChapterRange>,
}

impl Chapters {
    pub fn new(outline: Vec<OutlineNode>, entries: Vec<ChapterEntry>, total_pages: usize) -> Self {
        let ranges = build_ranges(&entries, total_pages);
        Self {
            outline,
            entries,
            ranges,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Range belonging to the entry at `index`; `None` for unresolved entries.
    pub fn range_for_entry(&self, index: usize) -> Option<&ChapterRange> {
        let entry = self.entries.get(index)?;
        entry.page_number?;
        let position = self.entries[..index]
            .iter()
            .filter(|e| e.is_selectable())
            .count();
        self.ranges.get(position)
    }

    /// Index of the last entry starting at or before `page`.
    pub fn entry_for_page(&self, page: usize) -> Option<usize> {
        let mut found = None;
        for (index, entry) in self.entries.iter().enumerate() {
            match entry.page_number {
                Some(start) if start <= page => found = Some(index),
                _ => {}
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str, page: Option<usize>) -> ChapterEntry {
        ChapterEntry {
            title: title.to_owned(),
            page_number: page,
        }
    }

    fn spans(ranges: &[ChapterRange]) -> Vec<(usize, usize)> {
        ranges.iter().map(|r| (r.start, r.end)).collect()
    }

    #[test]
    fn three_chapters_over_hundred_pages() {
        let entries = vec![
            entry("Ch1", Some(1)),
            entry("Ch2", Some(21)),
            entry("Ch3", Some(61)),
        ];
        let ranges = build_ranges(&entries, 100);
        assert_eq!(spans(&ranges), vec![(1, 20), (21, 60), (61, 100)]);
        assert_eq!(ranges[1].title, "Ch2");
    }

    #[test]
    fn increasing_pages_cover_document_without_gaps() {
        for total in [1usize, 2, 7, 40, 333] {
            for step in 1..=5usize {
                let entries: Vec<_> = (1..=total)
                    .step_by(step)
                    .map(|page| entry("c", Some(page)))
                    .collect();
                let ranges = build_ranges(&entries, total);

                assert_eq!(ranges.first().map(|r| r.start), Some(1));
                assert_eq!(ranges.last().map(|r| r.end), Some(total));
                for pair in ranges.windows(2) {
                    assert_eq!(pair[0].end + 1, pair[1].start);
                }
                let covered: usize = ranges.iter().map(|r| r.span().len()).sum();
                assert_eq!(covered, total);
            }
        }
    }

    #[test]
    fn duplicate_pages_collapse_to_single_page() {
        let entries = vec![
            entry("Preface", Some(3)),
            entry("Foreword", Some(3)),
            entry("Body", Some(9)),
        ];
        let ranges = build_ranges(&entries, 12);
        assert_eq!(spans(&ranges), vec![(3, 3), (3, 8), (9, 12)]);
    }

    #[test]
    fn out_of_order_pages_never_invert() {
        let entries = vec![
            entry("A", Some(10)),
            entry("B", Some(4)),
            entry("C", Some(20)),
        ];
        let ranges = build_ranges(&entries, 30);
        assert_eq!(spans(&ranges), vec![(10, 10), (4, 19), (20, 30)]);
        assert!(ranges.iter().all(|r| r.start <= r.end));
    }

    #[test]
    fn unresolved_entries_are_skipped() {
        let entries = vec![
            entry("Cover", None),
            entry("One", Some(2)),
            entry("Broken", None),
            entry("Two", Some(5)),
        ];
        let ranges = build_ranges(&entries, 8);
        assert_eq!(spans(&ranges), vec![(2, 4), (5, 8)]);
        assert_eq!(ranges[0].title, "One");
    }

    #[test]
    fn nothing_resolved_means_no_ranges() {
        assert!(build_ranges(&[], 10).is_empty());
        assert!(build_ranges(&[entry("x", None)], 10).is_empty());
    }

    #[test]
    fn range_for_entry_skips_unresolved_entries() {
        let entries = vec![
            entry("Cover", None),
            entry("One", Some(1)),
            entry("Broken", None),
            entry("Two", Some(5)),
        ];
        let chapters = Chapters::new(Vec::new(), entries, 9);

        assert!(chapters.range_for_entry(0).is_none());
        assert_eq!(chapters.range_for_entry(1).map(|r| r.span().end), Some(4));
        assert!(chapters.range_for_entry(2).is_none());
        assert_eq!(chapters.range_for_entry(3).map(|r| r.title.as_str()), Some("Two"));
        assert!(chapters.range_for_entry(4).is_none());
    }

    #[test]
    fn entry_for_page_finds_enclosing_chapter() {
        let entries = vec![entry("One", Some(1)), entry("Two", Some(5))];
        let chapters = Chapters::new(Vec::new(), entries, 9);
        assert_eq!(chapters.entry_for_page(4), Some(0));
        assert_eq!(chapters.entry_for_page(5), Some(1));
        assert_eq!(chapters.entry_for_page(9), Some(1));
    }
}
