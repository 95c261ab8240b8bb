use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use crossterm::cursor;
use crossterm::event;
use crossterm::style::{Attribute, Print, SetAttribute};
use crossterm::terminal::{self, Clear, ClearType};
use directories::ProjectDirs;
use pdfchapters_core::{
    ChapterEntry, ChapterRange, Chapters, Command, Config, LoadOutcome, LoggingConfig,
    RenderImage, Session, ViewerEvent, ViewerState,
};
use pdfchapters_render::PdfEngine;
use pdfchapters_tty::{
    format_row, format_status, truncate_with_ellipsis, write_status_line, ChapterListView,
    DrawParams, EventMapper, InputMode, KittyRenderer, UiEvent,
};
use serde::Serialize;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "pdfchapters",
    version,
    about = "Chapter-scoped PDF reader for kitty-compatible terminals"
)]
struct Args {
    /// Configuration file (defaults to config.toml in the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Print the top-level chapters of a document with their page ranges
    Chapters {
        file: PathBuf,
        /// Emit entries and ranges as JSON
        #[arg(long)]
        json: bool,
    },
    /// Read a document in the terminal
    View {
        file: PathBuf,
        /// Chapter to restrict navigation to (1-based, as listed by `chapters`)
        #[arg(short = 'c', long = "chapter")]
        chapter: Option<usize>,
        /// Page to open on (1-based)
        #[arg(short = 'p', long = "page")]
        page: Option<usize>,
    },
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, cursor::Show);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "pdfchapters", "pdfchapters")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| project_dirs.config_dir().join("config.toml"));
    let config = Config::load(&config_path)?;

    let console = matches!(args.command, CliCommand::Chapters { .. });
    let _log_guard = init_logging(&project_dirs, &config.logging, console)?;
    info!(config = %config_path.display(), "configuration loaded");

    match args.command {
        CliCommand::Chapters { file, json } => print_chapters(&config, &file, json).await,
        CliCommand::View {
            file,
            chapter,
            page,
        } => view(&config, &file, chapter, page).await,
    }
}

async fn open_session(engine: PdfEngine, config: &Config, file: &Path) -> Result<Arc<Session>> {
    let bytes = fs::read(file).with_context(|| format!("failed to read {:?}", file))?;
    let session = Arc::new(Session::new(Arc::new(engine), config.zoom));
    match session
        .open(Bytes::from(bytes))
        .await
        .with_context(|| format!("failed to open {:?}", file))?
    {
        LoadOutcome::Ready => Ok(session),
        LoadOutcome::Superseded => bail!("loading {:?} was interrupted", file),
    }
}

#[derive(Debug, Serialize)]
struct ChapterReport<'a> {
    total_pages: usize,
    entries: &'a [ChapterEntry],
    ranges: &'a [ChapterRange],
}

async fn print_chapters(config: &Config, file: &Path, json: bool) -> Result<()> {
    let session = open_session(PdfEngine::structure_only(), config, file).await?;
    let total_pages = session.state().map(|s| s.total_pages).unwrap_or_default();
    let chapters = session.chapters().unwrap_or_default();

    let mut stdout = io::stdout().lock();
    if json {
        let report = ChapterReport {
            total_pages,
            entries: &chapters.entries,
            ranges: &chapters.ranges,
        };
        serde_json::to_writer_pretty(&mut stdout, &report)?;
        writeln!(stdout)?;
    } else {
        write!(stdout, "{}", chapter_table(&chapters, total_pages))?;
    }
    Ok(())
}

fn chapter_table(chapters: &Chapters, total_pages: usize) -> String {
    if chapters.is_empty() {
        return format!("no chapters ({} pages)\n", total_pages);
    }
    let mut out = String::new();
    for (index, entry) in chapters.entries.iter().enumerate() {
        let pages = match chapters.range_for_entry(index) {
            Some(range) => format!("{}-{}", range.start, range.end),
            None => "unresolved".to_owned(),
        };
        out.push_str(&format!("{:>3}  {:<12} {}\n", index + 1, pages, entry.title));
    }
    out
}

async fn view(
    config: &Config,
    file: &Path,
    chapter: Option<usize>,
    page: Option<usize>,
) -> Result<()> {
    let engine = PdfEngine::from_config(&config.render)?;
    let session = open_session(engine, config, file).await?;

    if let Some(chapter) = chapter {
        let index = chapter
            .checked_sub(1)
            .ok_or_else(|| anyhow!("chapters are numbered from 1"))?;
        if !session.apply(Command::SelectChapter { index }) {
            bail!("chapter {} has no resolvable page range", chapter);
        }
    }
    if let Some(page) = page {
        session.apply(Command::GotoPage { page });
    }

    let _raw = RawModeGuard::new()?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, cursor::Hide)?;
    let mut renderer = KittyRenderer::new(stdout);
    let mut event_mapper = EventMapper::new();
    let mut overlay: Option<ChapterListView> = None;
    let mut dirty = true;

    loop {
        for event in session.drain_events() {
            match event {
                ViewerEvent::ViewerStateChanged(_)
                | ViewerEvent::ChapterListReady(_)
                | ViewerEvent::ChapterRangesReady(_) => dirty = true,
                ViewerEvent::LoadFailed(reason) => warn!(%reason, "document load failed"),
            }
        }

        if dirty {
            redraw(
                &mut renderer,
                &session,
                event_mapper.pending_input(),
                overlay.as_mut(),
            )
            .await?;
            if overlay.is_none() {
                let prefetch_session = Arc::clone(&session);
                let range = config.render.prefetch;
                tokio::spawn(async move {
                    if let Err(err) = prefetch_session.prefetch_neighbors(range).await {
                        warn!(?err, "failed to prefetch neighboring pages");
                    }
                });
            }
            dirty = false;
        }

        if event::poll(Duration::from_millis(100))? {
            let ui_event = event_mapper.map_event(event::read()?);
            match handle_event(ui_event, &session, &mut overlay, &mut event_mapper) {
                LoopAction::ContinueRedraw => dirty = true,
                LoopAction::Continue => {
                    if let Some(state) = session.state() {
                        draw_status_line(
                            &mut renderer,
                            &status_for(&session, &state, event_mapper.pending_input()),
                        )?;
                    }
                }
                LoopAction::Quit => break,
            }
        }
    }

    renderer.delete_image()?;
    renderer.clear_all()?;
    Ok(())
}

enum LoopAction {
    Continue,
    ContinueRedraw,
    Quit,
}

fn handle_event(
    event: UiEvent,
    session: &Session,
    overlay: &mut Option<ChapterListView>,
    mapper: &mut EventMapper,
) -> LoopAction {
    match event {
        UiEvent::Command(command) => {
            if session.apply(command) {
                LoopAction::ContinueRedraw
            } else {
                LoopAction::Continue
            }
        }
        UiEvent::OpenChapterList => {
            let current_page = session.state().map(|s| s.current_page).unwrap_or(1);
            let chapters = session.chapters().unwrap_or_default();
            *overlay = Some(ChapterListView::new(&chapters, current_page));
            mapper.set_mode(InputMode::ChapterList);
            LoopAction::ContinueRedraw
        }
        UiEvent::CloseOverlay => {
            *overlay = None;
            mapper.set_mode(InputMode::Normal);
            LoopAction::ContinueRedraw
        }
        UiEvent::MoveSelection { delta } => {
            if overlay
                .as_mut()
                .is_some_and(|view| view.move_selection(delta))
            {
                LoopAction::ContinueRedraw
            } else {
                LoopAction::Continue
            }
        }
        UiEvent::ActivateSelection => {
            let Some(index) = overlay.as_ref().and_then(ChapterListView::selected_entry) else {
                return LoopAction::Continue;
            };
            if session.apply(Command::SelectChapter { index }) {
                *overlay = None;
                mapper.set_mode(InputMode::Normal);
                LoopAction::ContinueRedraw
            } else {
                LoopAction::Continue
            }
        }
        UiEvent::Quit => LoopAction::Quit,
        UiEvent::None => LoopAction::Continue,
    }
}

/// Title of the chapter whose range is currently active.
fn active_chapter_title(chapters: &Chapters, state: &ViewerState) -> Option<String> {
    let active = state.active_range?;
    chapters
        .ranges
        .iter()
        .find(|range| range.span() == active)
        .map(|range| range.title.clone())
}

fn status_for(session: &Session, state: &ViewerState, pending: Option<&str>) -> String {
    let title = session
        .chapters()
        .and_then(|chapters| active_chapter_title(&chapters, state));
    format_status(state, title.as_deref(), pending)
}

async fn redraw(
    renderer: &mut KittyRenderer<io::Stdout>,
    session: &Session,
    pending_input: Option<&str>,
    overlay: Option<&mut ChapterListView>,
) -> Result<()> {
    let Some(state) = session.state() else {
        return Ok(());
    };
    let window = terminal::window_size()?;
    let total_cols = u32::from(window.columns).max(1);
    let total_rows = u32::from(window.rows).max(1);
    let image_rows = total_rows.saturating_sub(1).max(1);

    renderer.begin_sync_update()?;
    renderer.delete_image()?;
    renderer.clear_all()?;

    let mut status = status_for(session, &state, pending_input);
    if let Some(view) = overlay {
        draw_chapter_overlay(renderer, view, session.chapters().is_some(), total_cols, image_rows)?;
    } else if let Some(image) = current_page_image(session, &mut status).await {
        let cell_px = (
            f32::from(window.width) / total_cols as f32,
            f32::from(window.height) / total_rows as f32,
        );
        let params = DrawParams::fit(&image, total_cols, image_rows, cell_px);
        let start_col = total_cols.saturating_sub(params.columns) / 2;
        let start_row = image_rows.saturating_sub(params.rows) / 2;
        crossterm::execute!(
            renderer.writer(),
            cursor::MoveTo(start_col as u16, start_row as u16)
        )?;
        renderer.draw(&image, params)?;
    }

    draw_status_line(renderer, &status)?;
    renderer.end_sync_update()?;
    Ok(())
}

/// Renders the current page. A failure is logged and appended to `status`
/// so the viewer keeps running.
async fn current_page_image(session: &Session, status: &mut String) -> Option<RenderImage> {
    match session.render_current().await {
        Ok(image) => Some(image),
        Err(err) => {
            warn!(?err, "failed to render page");
            status.push_str(&format!(" | render failed: {}", err));
            None
        }
    }
}

fn draw_status_line(renderer: &mut KittyRenderer<io::Stdout>, status: &str) -> Result<()> {
    let window = terminal::window_size()?;
    let status_row = window.rows.saturating_sub(1);
    let writer = renderer.writer();
    crossterm::execute!(
        writer,
        cursor::MoveTo(0, status_row),
        Clear(ClearType::CurrentLine)
    )?;
    write_status_line(writer, status)?;
    Ok(())
}

fn draw_chapter_overlay(
    renderer: &mut KittyRenderer<io::Stdout>,
    view: &mut ChapterListView,
    ready: bool,
    total_cols: u32,
    image_rows: u32,
) -> Result<()> {
    const TITLE: &str = "Chapters";

    if total_cols < 20 || image_rows < 6 {
        return Ok(());
    }
    let inner_width = (total_cols as usize).saturating_sub(6).min(72);
    let content_height = (image_rows as usize).saturating_sub(6).max(1);
    let window_height = content_height + 4;
    let start_col = (total_cols as usize).saturating_sub(inner_width + 2) as u16 / 2;
    let mut row = (image_rows as usize).saturating_sub(window_height) as u16 / 2;

    let writer = renderer.writer();
    let border = format!("+{}+", "-".repeat(inner_width));
    print_inverted(writer, start_col, row, &border)?;
    row += 1;
    let title = format!("|{: ^width$}|", TITLE, width = inner_width);
    print_inverted(writer, start_col, row, &title)?;
    row += 1;
    print_inverted(writer, start_col, row, &border)?;
    row += 1;

    let mut lines = Vec::with_capacity(content_height);
    if view.is_empty() {
        let message = if ready {
            "  No chapters in this document"
        } else {
            "  Resolving chapters..."
        };
        lines.push(truncate_with_ellipsis(message, inner_width));
    } else {
        let selected = view.selected();
        for (index, entry) in view.visible(content_height) {
            lines.push(format_row(entry, index == selected, inner_width));
        }
    }
    lines.resize(content_height, " ".repeat(inner_width));

    for line in lines {
        print_inverted(writer, start_col, row, &format!("|{}|", line))?;
        row += 1;
    }
    print_inverted(writer, start_col, row, &border)?;
    Ok(())
}

fn print_inverted(writer: &mut impl Write, col: u16, row: u16, content: &str) -> Result<()> {
    crossterm::execute!(
        writer,
        cursor::MoveTo(col, row),
        SetAttribute(Attribute::Reverse),
        Print(content),
        SetAttribute(Attribute::Reset)
    )?;
    Ok(())
}

/// File logging under the platform data dir; `console` adds a stderr layer
/// for commands that do not take over the terminal.
fn init_logging(
    project_dirs: &ProjectDirs,
    logging: &LoggingConfig,
    console: bool,
) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, &logging.file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    let console_layer = console.then(|| tracing_subscriber::fmt::layer().with_writer(io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
