use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Error, Result};
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::{
    flatten_outline, ChapterEntry, ChapterRange, Chapters, DocumentHandle, LoadError, PageSpan,
    PaginationController, RenderImage, RenderingEngine, ViewerState, ZoomConfig,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    NextPage { count: usize },
    PrevPage { count: usize },
    GotoPage { page: usize },
    /// Activates the range of the chapter entry at `index`.
    SelectChapter { index: usize },
    ClearChapter,
    ZoomIn,
    ZoomOut,
    ResetZoom,
}

/// Notifications for the presentation layer, queued in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ViewerEvent {
    ChapterListReady(Vec<ChapterEntry>),
    ChapterRangesReady(Vec<ChapterRange>),
    ViewerStateChanged(ViewerState),
    LoadFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Ready,
    /// A later `open` replaced this document before it finished loading.
    Superseded,
}

struct DocumentSlot {
    generation: u64,
    document: Arc<dyn DocumentHandle>,
    pager: PaginationController,
    /// `None` while the outline is still being resolved.
    chapters: Option<Chapters>,
    render_cache: HashMap<CacheKey, RenderImage>,
}

const CACHE_CAPACITY: usize = 10;

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
struct CacheKey {
    page: usize,
    scale_milli: u32,
}

impl CacheKey {
    fn new(page: usize, scale: f32) -> Self {
        Self {
            page,
            scale_milli: quantize_scale(scale),
        }
    }

    fn distance(&self, reference_page: usize) -> usize {
        self.page.abs_diff(reference_page)
    }
}

fn quantize_scale(scale: f32) -> u32 {
    let scaled = (scale * 1000.0).round();
    if !scaled.is_finite() || scaled <= 0.0 {
        1
    } else if scaled > u32::MAX as f32 {
        u32::MAX
    } else {
        scaled as u32
    }
}

/// Holds the currently loaded document and everything derived from it.
///
/// Each `open` takes a fresh generation number. Results are committed only
/// while that number is still the latest one, so a document that has been
/// replaced can never write into its successor's state.
pub struct Session {
    engine: Arc<dyn RenderingEngine>,
    zoom: ZoomConfig,
    generation: AtomicU64,
    slot: Mutex<Option<DocumentSlot>>,
    events: Arc<Mutex<Vec<ViewerEvent>>>,
}

impl Session {
    pub fn new(engine: Arc<dyn RenderingEngine>, zoom: ZoomConfig) -> Self {
        Self {
            engine,
            zoom,
            generation: AtomicU64::new(0),
            slot: Mutex::new(None),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn events(&self) -> Arc<Mutex<Vec<ViewerEvent>>> {
        Arc::clone(&self.events)
    }

    pub fn drain_events(&self) -> Vec<ViewerEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.lock().is_some()
    }

    pub fn state(&self) -> Option<ViewerState> {
        self.slot.lock().as_ref().map(|slot| slot.pager.state().clone())
    }

    /// Derived chapter data, `None` until the outline has been resolved.
    pub fn chapters(&self) -> Option<Chapters> {
        self.slot.lock().as_ref().and_then(|slot| slot.chapters.clone())
    }

    pub fn can_go_next(&self) -> bool {
        self.slot
            .lock()
            .as_ref()
            .map_or(false, |slot| slot.pager.can_go_next())
    }

    pub fn can_go_prev(&self) -> bool {
        self.slot
            .lock()
            .as_ref()
            .map_or(false, |slot| slot.pager.can_go_prev())
    }

    /// Loads `bytes` as the new current document, then resolves its outline.
    ///
    /// Returns once the chapter list is committed, or as soon as a newer
    /// `open` has taken over.
    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    pub async fn open(&self, bytes: Bytes) -> std::result::Result<LoadOutcome, LoadError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let document = match self.load(bytes).await {
            Ok(document) => document,
            Err(err) => {
                let mut slot = self.slot.lock();
                if !self.is_current(generation) {
                    return Ok(LoadOutcome::Superseded);
                }
                *slot = None;
                self.push_event(ViewerEvent::LoadFailed(err.to_string()));
                return Err(err);
            }
        };
        let total_pages = document.page_count();

        {
            let mut slot = self.slot.lock();
            if !self.is_current(generation) {
                debug!(generation, "discarding superseded document");
                return Ok(LoadOutcome::Superseded);
            }
            let pager = PaginationController::new(total_pages, self.zoom);
            self.push_event(ViewerEvent::ViewerStateChanged(pager.state().clone()));
            *slot = Some(DocumentSlot {
                generation,
                document: Arc::clone(&document),
                pager,
                chapters: None,
                render_cache: HashMap::new(),
            });
        }
        info!(generation, total_pages, "document loaded");

        let outline = match document.outline().await {
            Ok(outline) => outline.unwrap_or_default(),
            Err(err) => {
                warn!(?err, "failed to read outline; continuing without chapters");
                Vec::new()
            }
        };
        let entries = flatten_outline(&document, &outline).await;
        let chapters = Chapters::new(outline, entries, total_pages);

        let mut slot = self.slot.lock();
        let outcome = match slot.as_mut() {
            Some(current) if current.generation == generation && self.is_current(generation) => {
                info!(
                    generation,
                    entries = chapters.entries.len(),
                    ranges = chapters.ranges.len(),
                    "chapters ready"
                );
                self.push_event(ViewerEvent::ChapterListReady(chapters.entries.clone()));
                self.push_event(ViewerEvent::ChapterRangesReady(chapters.ranges.clone()));
                current.chapters = Some(chapters);
                Ok(LoadOutcome::Ready)
            }
            _ => {
                debug!(generation, "discarding outline of superseded document");
                Ok(LoadOutcome::Superseded)
            }
        };
        outcome
    }

    /// Drops the current document and invalidates any load still in flight.
    pub fn close(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.slot.lock() = None;
    }

    /// Applies a navigation command. Returns `false` when nothing is loaded or
    /// the command targets an entry that has no range.
    pub fn apply(&self, command: Command) -> bool {
        let mut guard = self.slot.lock();
        let Some(slot) = guard.as_mut() else {
            return false;
        };
        let pager = &mut slot.pager;
        match command {
            Command::NextPage { count } => (0..count.max(1)).for_each(|_| pager.next()),
            Command::PrevPage { count } => (0..count.max(1)).for_each(|_| pager.prev()),
            Command::GotoPage { page } => pager.go_to_page(page),
            Command::SelectChapter { index } => {
                let span = slot
                    .chapters
                    .as_ref()
                    .and_then(|chapters| chapters.range_for_entry(index))
                    .map(PageSpan::from);
                match span {
                    Some(span) => pager.select_chapter(span),
                    None => {
                        debug!(index, "chapter entry is not selectable");
                        return false;
                    }
                }
            }
            Command::ClearChapter => pager.clear_chapter(),
            Command::ZoomIn => pager.zoom_in(),
            Command::ZoomOut => pager.zoom_out(),
            Command::ResetZoom => pager.reset_zoom(),
        }
        self.push_event(ViewerEvent::ViewerStateChanged(pager.state().clone()));
        true
    }

    /// Restricts navigation to an arbitrary span, as a table-of-contents
    /// callback would.
    pub fn select_range(&self, span: PageSpan) -> bool {
        let mut guard = self.slot.lock();
        let Some(slot) = guard.as_mut() else {
            return false;
        };
        slot.pager.select_chapter(span);
        self.push_event(ViewerEvent::ViewerStateChanged(slot.pager.state().clone()));
        true
    }

    /// Renders the current page at the current zoom.
    pub async fn render_current(&self) -> Result<RenderImage> {
        let (document, generation, page, scale) = {
            let guard = self.slot.lock();
            let slot = guard.as_ref().ok_or_else(|| anyhow!("no document loaded"))?;
            let state = slot.pager.state();
            (
                Arc::clone(&slot.document),
                slot.generation,
                state.current_page,
                state.scale,
            )
        };
        self.render_cached(&document, generation, page, scale, page)
            .await
    }

    /// Warms the cache for up to `range` pages around the current one,
    /// staying inside the active bounds.
    pub async fn prefetch_neighbors(&self, range: usize) -> Result<()> {
        if range == 0 {
            return Ok(());
        }
        let (document, generation, state) = {
            let guard = self.slot.lock();
            let Some(slot) = guard.as_ref() else {
                return Ok(());
            };
            (
                Arc::clone(&slot.document),
                slot.generation,
                slot.pager.state().clone(),
            )
        };

        let bounds = state.bounds();
        let current = state.current_page;
        let mut last_error: Option<Error> = None;
        for offset in 1..=range {
            let candidates = [current.checked_sub(offset), Some(current + offset)];
            for page in candidates.into_iter().flatten() {
                if !bounds.contains(page) {
                    continue;
                }
                if let Err(err) = self
                    .render_cached(&document, generation, page, state.scale, current)
                    .await
                {
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn render_cached(
        &self,
        document: &Arc<dyn DocumentHandle>,
        generation: u64,
        page: usize,
        scale: f32,
        reference_page: usize,
    ) -> Result<RenderImage> {
        let key = CacheKey::new(page, scale);
        {
            let guard = self.slot.lock();
            if let Some(image) = guard
                .as_ref()
                .filter(|slot| slot.generation == generation)
                .and_then(|slot| slot.render_cache.get(&key))
            {
                return Ok(image.clone());
            }
        }

        let image = document.render_page(page - 1, scale).await?;

        let mut guard = self.slot.lock();
        if let Some(slot) = guard.as_mut().filter(|slot| slot.generation == generation) {
            store_cached_render(&mut slot.render_cache, key, &image, reference_page);
        }
        Ok(image)
    }

    async fn load(&self, bytes: Bytes) -> std::result::Result<Arc<dyn DocumentHandle>, LoadError> {
        let document = self.engine.load_document(bytes).await?;
        if document.page_count() == 0 {
            return Err(LoadError::NoPages);
        }
        Ok(document)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn push_event(&self, event: ViewerEvent) {
        self.events.lock().push(event);
    }
}

fn store_cached_render(
    cache: &mut HashMap<CacheKey, RenderImage>,
    key: CacheKey,
    image: &RenderImage,
    reference_page: usize,
) {
    cache.insert(key, image.clone());

    if cache.len() > CACHE_CAPACITY {
        let mut keys: Vec<_> = cache.keys().copied().collect();
        keys.sort_by_key(|k| k.distance(reference_page));
        for stale in keys.into_iter().skip(CACHE_CAPACITY) {
            cache.remove(&stale);
        }
    }
}
