use crate::{PageSpan, ViewerState, ZoomConfig};

/// Owns the [`ViewerState`] of the loaded document and is its only writer.
///
/// Every transition keeps `current_page` inside the active range, or inside
/// `1..=total_pages` when no range is active.
#[derive(Debug, Clone)]
pub struct PaginationController {
    state: ViewerState,
    zoom: ZoomConfig,
}

impl PaginationController {
    pub fn new(total_pages: usize, zoom: ZoomConfig) -> Self {
        let mut controller = Self {
            state: ViewerState {
                current_page: 1,
                active_range: None,
                total_pages: 1,
                scale: zoom.initial,
            },
            zoom,
        };
        controller.load_document(total_pages);
        controller
    }

    pub fn state(&self) -> &ViewerState {
        &self.state
    }

    pub fn load_document(&mut self, total_pages: usize) {
        self.state = ViewerState {
            current_page: 1,
            active_range: None,
            total_pages: total_pages.max(1),
            scale: self.zoom.initial,
        };
    }

    /// Restricts navigation to `range` and jumps to its first page. The span
    /// is clipped to the document so the page invariant holds for any input.
    pub fn select_chapter(&mut self, range: PageSpan) {
        let total = self.state.total_pages;
        let start = range.start.clamp(1, total);
        let end = range.end.clamp(start, total);
        self.state.active_range = Some(PageSpan::new(start, end));
        self.state.current_page = start;
    }

    pub fn clear_chapter(&mut self) {
        self.state.active_range = None;
        self.state.current_page = self.state.current_page.clamp(1, self.state.total_pages);
    }

    pub fn next(&mut self) {
        let bounds = self.state.bounds();
        self.state.current_page = (self.state.current_page + 1).min(bounds.end);
    }

    pub fn prev(&mut self) {
        let bounds = self.state.bounds();
        self.state.current_page = self.state.current_page.saturating_sub(1).max(bounds.start);
    }

    pub fn go_to_page(&mut self, page: usize) {
        let bounds = self.state.bounds();
        self.state.current_page = page.clamp(bounds.start, bounds.end);
    }

    pub fn can_go_next(&self) -> bool {
        self.state.current_page < self.state.bounds().end
    }

    pub fn can_go_prev(&self) -> bool {
        self.state.current_page > self.state.bounds().start
    }

    pub fn zoom_in(&mut self) {
        self.set_scale(self.state.scale + self.zoom.step);
    }

    pub fn zoom_out(&mut self) {
        self.set_scale(self.state.scale - self.zoom.step);
    }

    pub fn reset_zoom(&mut self) {
        self.set_scale(self.zoom.initial);
    }

    fn set_scale(&mut self, scale: f32) {
        // Snap to hundredths so repeated steps do not drift.
        let snapped = (scale * 100.0).round() / 100.0;
        self.state.scale = snapped.clamp(self.zoom.min, self.zoom.max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(total: usize) -> PaginationController {
        PaginationController::new(total, ZoomConfig::default())
    }

    #[test]
    fn load_starts_on_first_page_without_range() {
        let pager = controller(100);
        assert_eq!(pager.state().current_page, 1);
        assert_eq!(pager.state().active_range, None);
        assert_eq!(pager.state().total_pages, 100);
        assert!(!pager.can_go_prev());
        assert!(pager.can_go_next());
    }

    #[test]
    fn next_stops_at_last_page() {
        let mut pager = controller(3);
        pager.next();
        pager.next();
        assert_eq!(pager.state().current_page, 3);
        let before = pager.state().clone();
        pager.next();
        assert_eq!(pager.state(), &before);
        assert!(!pager.can_go_next());
    }

    #[test]
    fn prev_is_clamped_to_chapter_start() {
        let mut pager = controller(40);
        pager.select_chapter(PageSpan::new(10, 15));
        for _ in 0..3 {
            pager.prev();
        }
        assert_eq!(pager.state().current_page, 10);
        assert!(!pager.can_go_prev());
    }

    #[test]
    fn chapter_walkthrough_stays_inside_range() {
        let mut pager = controller(100);
        pager.select_chapter(PageSpan::new(21, 60));
        assert_eq!(pager.state().current_page, 21);
        for _ in 0..39 {
            pager.next();
        }
        assert_eq!(pager.state().current_page, 60);
        pager.next();
        assert_eq!(pager.state().current_page, 60);
        assert!(!pager.can_go_next());
        assert_eq!(pager.state().page_label(), "Page 60 of 60");
    }

    #[test]
    fn selecting_chapter_always_jumps_to_its_start() {
        let mut pager = controller(100);
        pager.go_to_page(80);
        pager.select_chapter(PageSpan::new(21, 60));
        assert_eq!(pager.state().current_page, 21);
        pager.go_to_page(30);
        pager.select_chapter(PageSpan::new(21, 60));
        assert_eq!(pager.state().current_page, 21);
    }

    #[test]
    fn clearing_chapter_keeps_position() {
        let mut pager = controller(100);
        pager.select_chapter(PageSpan::new(21, 60));
        pager.next();
        pager.clear_chapter();
        assert_eq!(pager.state().active_range, None);
        assert_eq!(pager.state().current_page, 22);
        assert_eq!(pager.state().page_label(), "Page 22 of 100");
    }

    #[test]
    fn out_of_document_span_is_clipped() {
        let mut pager = controller(50);
        pager.select_chapter(PageSpan::new(45, 90));
        assert_eq!(pager.state().active_range, Some(PageSpan::new(45, 50)));

        pager.select_chapter(PageSpan::new(0, 0));
        assert_eq!(pager.state().active_range, Some(PageSpan::new(1, 1)));
        assert_eq!(pager.state().current_page, 1);
    }

    #[test]
    fn go_to_page_respects_active_bounds() {
        let mut pager = controller(100);
        pager.go_to_page(usize::MAX);
        assert_eq!(pager.state().current_page, 100);
        pager.select_chapter(PageSpan::new(21, 60));
        pager.go_to_page(1);
        assert_eq!(pager.state().current_page, 21);
        pager.go_to_page(usize::MAX);
        assert_eq!(pager.state().current_page, 60);
    }

    #[test]
    fn zoom_steps_and_clamps() {
        let mut pager = controller(10);
        for _ in 0..20 {
            pager.zoom_in();
        }
        assert_eq!(pager.state().scale, 2.0);
        for _ in 0..3 {
            pager.zoom_out();
        }
        assert!((pager.state().scale - 1.7).abs() < 1e-6);
        for _ in 0..20 {
            pager.zoom_out();
        }
        assert_eq!(pager.state().scale, 0.5);
        pager.reset_zoom();
        assert_eq!(pager.state().scale, 1.0);
    }

    #[test]
    fn selecting_chapter_keeps_zoom() {
        let mut pager = controller(10);
        pager.zoom_in();
        pager.select_chapter(PageSpan::new(2, 4));
        assert!((pager.state().scale - 1.1).abs() < 1e-6);
    }

    #[test]
    fn reload_resets_everything() {
        let mut pager = controller(10);
        pager.select_chapter(PageSpan::new(2, 4));
        pager.zoom_in();
        pager.load_document(7);
        assert_eq!(pager.state().current_page, 1);
        assert_eq!(pager.state().active_range, None);
        assert_eq!(pager.state().total_pages, 7);
        assert_eq!(pager.state().scale, 1.0);
    }
}
