use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event::{
    self, DisableBracketedPaste, DisableFocusChange, DisableMouseCapture, EnableBracketedPaste,
    EnableFocusChange, EnableMouseCapture,
};
use crossterm::terminal;
use directories::ProjectDirs;
use serde::Serialize;
use termnote_core::{
    resolve_load, Command, Config, DocumentProvider, DocumentSource, LoadCompletion, LoadRequest,
    Point, PointerPhase, Session, SessionEvent, ViewerStatus,
};
use termnote_render::PdfRenderFactory;
use termnote_tty::{
    crop_image, draw_annotations, draw_centered, write_line_at, CellArea, CellMetrics, DrawParams,
    EventMapper, InputMode, KittyRenderer, PageLayout, UiEvent,
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

mod intake;

#[derive(Debug, Parser)]
#[command(
    name = "termnote",
    version,
    about = "kitty-native PDF viewer with a text-box annotation layer"
)]
struct Args {
    /// PDF file to open on startup
    file: Option<PathBuf>,

    /// Configuration file to use instead of the platform default
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit
    #[arg(long = "print-config")]
    print_config: bool,

    /// Load the file, print its metadata as JSON and exit
    #[arg(long = "inspect", requires = "file")]
    inspect: bool,
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        crossterm::execute!(
            stdout,
            cursor::Hide,
            EnableMouseCapture,
            EnableBracketedPaste,
            EnableFocusChange
        )?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(
            stdout,
            DisableFocusChange,
            DisableBracketedPaste,
            DisableMouseCapture,
            cursor::Show
        );
        let _ = terminal::disable_raw_mode();
    }
}

/// Runs loads off the event loop and hands completions back over a channel.
struct Loader {
    provider: Arc<dyn DocumentProvider>,
    completions: UnboundedSender<LoadCompletion>,
}

impl Loader {
    fn spawn(&self, request: LoadRequest) {
        let provider = Arc::clone(&self.provider);
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let completion = resolve_load(provider.as_ref(), request).await;
            if completions.send(completion).is_err() {
                warn!("event loop gone before load completed");
            }
        });
    }
}

#[derive(Debug, Serialize)]
struct InspectReport {
    id: String,
    name: String,
    pages: usize,
    title: Option<String>,
    author: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "termnote", "termnote")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| Config::default_path(&project_dirs));
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path.display()))?;

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let _log_guard = init_logging(&project_dirs)?;
    info!(config = %config_path.display(), "starting");

    let provider: Arc<dyn DocumentProvider> = Arc::new(PdfRenderFactory::new(&config.renderer)?);
    let mut session = Session::new(&config);

    if args.inspect {
        let path = args
            .file
            .clone()
            .ok_or_else(|| anyhow!("--inspect needs a file"))?;
        return inspect(&mut session, provider.as_ref(), path).await;
    }

    let (sender, receiver) = mpsc::unbounded_channel();
    let loader = Loader {
        provider,
        completions: sender,
    };
    if let Some(path) = args.file {
        loader.spawn(session.begin_load(DocumentSource::Path(path)));
    }

    let result = run(&mut session, &loader, receiver);
    info!(status = session.status().label(), "exiting");
    result
}

async fn inspect(session: &mut Session, provider: &dyn DocumentProvider, path: PathBuf) -> Result<()> {
    session
        .open_with(provider, DocumentSource::Path(path.clone()))
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
    let ready = session
        .ready()
        .ok_or_else(|| anyhow!("document {} did not become ready", path.display()))?;
    let info = &ready.document.info;
    let report = InspectReport {
        id: info.id.to_string(),
        name: info.name.clone(),
        pages: info.page_count,
        title: info.metadata.title.clone(),
        author: info.metadata.author.clone(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

enum LoopAction {
    Continue,
    Redraw,
    RedrawOverlay,
    Quit,
}

#[derive(Default)]
struct Screen {
    layout: Option<PageLayout>,
    notice: Option<String>,
}

fn run(
    session: &mut Session,
    loader: &Loader,
    mut completions: UnboundedReceiver<LoadCompletion>,
) -> Result<()> {
    let _raw = RawModeGuard::new()?;
    let mut renderer = KittyRenderer::new(io::stdout());
    let mut event_mapper = EventMapper::new();
    let mut screen = Screen::default();
    let mut dirty = true;
    let mut overlay_dirty = false;

    loop {
        while let Ok(completion) = completions.try_recv() {
            session.finish_load(completion);
        }
        for event in session.drain_events() {
            match event {
                SessionEvent::AnnotationsChanged => overlay_dirty = true,
                SessionEvent::LoadFailed(_) | SessionEvent::DocumentReady(_) => {
                    screen.notice = None;
                    dirty = true;
                }
                _ => dirty = true,
            }
        }

        let editing = session.is_editing();
        if editing && event_mapper.mode() != InputMode::EditText {
            event_mapper.set_mode(InputMode::EditText);
        } else if !editing && event_mapper.mode() == InputMode::EditText {
            event_mapper.set_mode(InputMode::Normal);
        }

        if dirty {
            screen.layout = redraw(&mut renderer, session)?;
            draw_status_line(&mut renderer, session, &event_mapper, &screen)?;
            dirty = false;
            overlay_dirty = false;
        } else if overlay_dirty {
            redraw_overlay(&mut renderer, session, &screen)?;
            draw_status_line(&mut renderer, session, &event_mapper, &screen)?;
            overlay_dirty = false;
        }

        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        let ui_event = event_mapper.map_event(event::read()?);
        match handle_event(ui_event, session, loader, &mut screen)? {
            LoopAction::Continue => {}
            LoopAction::Redraw => dirty = true,
            LoopAction::RedrawOverlay => overlay_dirty = true,
            LoopAction::Quit => break,
        }
        draw_status_line(&mut renderer, session, &event_mapper, &screen)?;
    }

    renderer.delete_image()?;
    renderer.clear_all()?;
    Ok(())
}

fn handle_event(
    event: UiEvent,
    session: &mut Session,
    loader: &Loader,
    screen: &mut Screen,
) -> Result<LoopAction> {
    match event {
        UiEvent::Command(command) => {
            session.apply(command);
            Ok(LoopAction::Continue)
        }
        UiEvent::Pointer { phase, column, row } => {
            let Some(layout) = screen.layout else {
                return Ok(LoopAction::Continue);
            };
            let at = match phase {
                PointerPhase::Down if !layout.contains(column, row) => {
                    session.apply(Command::ReleaseFocus);
                    return Ok(LoopAction::Continue);
                }
                PointerPhase::Cancel => Point::default(),
                _ => layout.to_overlay(column, row),
            };
            session.apply(Command::Pointer { phase, at });
            Ok(LoopAction::Continue)
        }
        UiEvent::OpenPath { input } => {
            match intake::source_from_input(&input) {
                Some(source) => open_source(session, loader, screen, source),
                None => screen.notice = Some("open: no path given".to_string()),
            }
            Ok(LoopAction::Continue)
        }
        UiEvent::FileDropped { payload } => {
            if let Some(source) = intake::accept_drop(&payload) {
                open_source(session, loader, screen, source);
            }
            Ok(LoopAction::Continue)
        }
        UiEvent::ClipboardPaste => {
            match arboard::Clipboard::new().and_then(|mut clipboard| clipboard.get_text()) {
                Ok(text) => {
                    session.apply(Command::InsertText { text });
                }
                Err(err) => {
                    warn!(%err, "clipboard unavailable");
                    screen.notice = Some("clipboard unavailable".to_string());
                }
            }
            Ok(LoopAction::Continue)
        }
        UiEvent::BeginPrompt(_) | UiEvent::PromptChanged | UiEvent::PromptCancel => {
            Ok(LoopAction::Continue)
        }
        UiEvent::Resize => Ok(LoopAction::Redraw),
        UiEvent::Quit => Ok(LoopAction::Quit),
        UiEvent::None => Ok(LoopAction::Continue),
    }
}

fn open_source(session: &mut Session, loader: &Loader, screen: &mut Screen, source: DocumentSource) {
    screen.notice = None;
    screen.layout = None;
    loader.spawn(session.begin_load(source));
}

/// Full repaint: control bar, page image and annotation boxes. Returns where
/// the page landed so pointer events can be mapped onto it.
fn redraw(
    renderer: &mut KittyRenderer<io::Stdout>,
    session: &mut Session,
) -> Result<Option<PageLayout>> {
    let window = terminal::window_size()?;
    let columns = window.columns.max(1);
    let rows = window.rows.max(3);
    let cell = CellMetrics::from_window(window.columns, window.rows, window.width, window.height);

    renderer.begin_sync_update()?;
    renderer.delete_image()?;
    renderer.clear_all()?;
    write_line_at(renderer.writer(), 0, &format_control_bar(session), true)?;

    let available = CellArea {
        column: 0,
        row: 1,
        columns,
        rows: rows - 2,
    };
    let middle = available.row + available.rows / 2;

    let rendered = match session.status() {
        ViewerStatus::NoDocument => {
            draw_centered(
                renderer.writer(),
                middle,
                columns,
                "Drop a PDF here or press o to open one",
            )?;
            None
        }
        ViewerStatus::Loading => {
            let name = session
                .selected()
                .map(DocumentSource::display_name)
                .unwrap_or_default();
            draw_centered(renderer.writer(), middle, columns, &format!("Loading {name}..."))?;
            None
        }
        ViewerStatus::Error { message } => {
            draw_centered(
                renderer.writer(),
                middle,
                columns,
                &format!("Could not open document: {message}"),
            )?;
            None
        }
        ViewerStatus::Ready(ready) => match ready.document.render(&ready.viewport) {
            Ok(image) => {
                if let Err(err) = ready.document.prefetch_neighbors(&ready.viewport, 1) {
                    warn!(
                        ?err,
                        page = ready.viewport.page_number(),
                        "failed to prefetch neighboring pages"
                    );
                }
                Some(image)
            }
            Err(err) => {
                warn!(?err, page = ready.viewport.page_number(), "failed to render page");
                draw_centered(
                    renderer.writer(),
                    middle,
                    columns,
                    &format!("Could not render page: {err}"),
                )?;
                None
            }
        },
    };

    let layout = match rendered {
        Some(image) => {
            let layout = PageLayout::compute(image.width, image.height, available, cell);
            session.set_overlay_bounds(Some(layout.overlay_bounds()));
            session.set_handle_size(cell.width.max(cell.height));

            let visible = crop_image(&image, layout.visible_width, layout.visible_height);
            crossterm::queue!(
                renderer.writer(),
                cursor::MoveTo(layout.area.column, layout.area.row)
            )?;
            renderer.draw(
                &visible,
                DrawParams::clamped(u32::from(layout.area.columns), u32::from(layout.area.rows)),
            )?;
            draw_annotations(
                renderer.writer(),
                &layout,
                session.overlay().annotations(),
                session.is_editing(),
            )?;
            Some(layout)
        }
        None => None,
    };

    renderer.end_sync_update()?;
    Ok(layout)
}

/// Repaints only the text layer above the page. The image stays in place.
fn redraw_overlay(
    renderer: &mut KittyRenderer<io::Stdout>,
    session: &Session,
    screen: &Screen,
) -> Result<()> {
    let Some(layout) = screen.layout else {
        return Ok(());
    };
    renderer.begin_sync_update()?;
    {
        let writer = renderer.writer();
        let blank = " ".repeat(usize::from(layout.area.columns));
        for row in layout.area.row..layout.area.row + layout.area.rows {
            crossterm::queue!(
                writer,
                cursor::MoveTo(layout.area.column, row),
                crossterm::style::Print(&blank)
            )?;
        }
        draw_annotations(
            writer,
            &layout,
            session.overlay().annotations(),
            session.is_editing(),
        )?;
    }
    write_line_at(renderer.writer(), 0, &format_control_bar(session), true)?;
    renderer.end_sync_update()?;
    Ok(())
}

fn draw_status_line(
    renderer: &mut KittyRenderer<io::Stdout>,
    session: &Session,
    mapper: &EventMapper,
    screen: &Screen,
) -> Result<()> {
    let window = terminal::window_size()?;
    let status_row = window.rows.max(1) - 1;
    let status = combine_status(
        screen.notice.clone(),
        mapper.pending_input().as_deref(),
    )
    .unwrap_or_else(|| key_hints(session).to_string());
    write_line_at(renderer.writer(), status_row, &status, false)?;
    Ok(())
}

fn combine_status(base: Option<String>, pending_input: Option<&str>) -> Option<String> {
    match (base, pending_input.filter(|s| !s.is_empty())) {
        (Some(mut base), Some(pending)) => {
            base.push_str(" | ");
            base.push_str(pending);
            Some(base)
        }
        (Some(base), None) => Some(base),
        (None, Some(pending)) => Some(pending.to_string()),
        (None, None) => None,
    }
}

fn key_hints(session: &Session) -> &'static str {
    match session.status() {
        ViewerStatus::Ready(_) => {
            "j/k page  +/- zoom  z1-6 preset  a add  enter edit  x delete  o open  c clear  q quit"
        }
        _ => "o open  q quit",
    }
}

fn format_control_bar(session: &Session) -> String {
    match session.status() {
        ViewerStatus::Ready(ready) => {
            let viewport = &ready.viewport;
            let info = &ready.document.info;
            let title = info.metadata.title.as_deref().unwrap_or(&info.name);
            let mut bar = format!(
                " {} | page {}/{} | {}%",
                title,
                viewport.page_number(),
                viewport.page_count(),
                viewport.zoom_percent()
            );
            if let Some(index) = session
                .limits()
                .nearest_preset(viewport.scale())
                .filter(|&index| session.limits().preset(index) == Some(viewport.scale()))
            {
                bar.push_str(&format!(" [z{}]", index + 1));
            }
            let count = session.overlay().len();
            if count > 0 {
                bar.push_str(&format!(
                    " | {} note{}",
                    count,
                    if count == 1 { "" } else { "s" }
                ));
            }
            if let Some(active) = session.overlay().active() {
                bar.push_str(&format!(" | {} selected", active.id));
            }
            bar
        }
        ViewerStatus::Loading => " loading...".to_string(),
        ViewerStatus::Error { .. } => " error".to_string(),
        ViewerStatus::NoDocument => " no document".to_string(),
    }
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "termnote.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
