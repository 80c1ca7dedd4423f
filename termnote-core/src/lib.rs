use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Error, Result};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

pub mod config;
pub mod error;
pub mod interaction;
pub mod load;
pub mod overlay;
pub mod viewport;

pub use config::{Config, OverlayConfig, RendererConfig, ViewerConfig};
pub use error::{ConfigError, LoadError};
pub use interaction::{Gesture, OverlayController, ResizeHandle};
pub use load::{resolve_load, LoadCompletion, LoadOutcome, LoadRequest, LoadTicket, LoadTracker};
pub use overlay::{Annotation, AnnotationId, OverlayStore, Point, Size};
pub use viewport::{ScaleLimits, Viewport};

pub type DocumentId = Uuid;

static DOCUMENT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("3f4a1d2e-8b7c-5e6f-9a0b-1c2d3e4f5a6b").expect("valid namespace UUID")
});

pub fn document_id_for_path(path: &Path) -> DocumentId {
    let resolved = path
        .canonicalize()
        .or_else(|_| {
            if path.is_absolute() {
                Ok(path.to_path_buf())
            } else {
                std::env::current_dir().map(|cwd| cwd.join(path))
            }
        })
        .unwrap_or_else(|_| path.to_path_buf());
    let rendered = resolved.to_string_lossy();
    Uuid::new_v5(&DOCUMENT_NAMESPACE, rendered.as_bytes())
}

pub fn document_id_for_bytes(data: &[u8]) -> DocumentId {
    Uuid::new_v5(&DOCUMENT_NAMESPACE, data)
}

/// Where a document comes from: a file on disk or an in-memory blob.
#[derive(Clone, PartialEq, Eq)]
pub enum DocumentSource {
    Path(PathBuf),
    Bytes { name: String, data: Vec<u8> },
}

impl DocumentSource {
    pub fn display_name(&self) -> String {
        match self {
            DocumentSource::Path(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            DocumentSource::Bytes { name, .. } => name.clone(),
        }
    }

    pub fn document_id(&self) -> DocumentId {
        match self {
            DocumentSource::Path(path) => document_id_for_path(path),
            DocumentSource::Bytes { data, .. } => document_id_for_bytes(data),
        }
    }
}

impl fmt::Debug for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            DocumentSource::Bytes { name, data } => f
                .debug_struct("Bytes")
                .field("name", name)
                .field("len", &data.len())
                .finish(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub id: DocumentId,
    pub name: String,
    pub page_count: usize,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, Copy)]
pub struct RenderRequest {
    pub page_index: usize,
    pub scale: f32,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self {
            page_index: 0,
            scale: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// An opened document able to rasterize its pages.
pub trait DocumentBackend: Send + Sync {
    fn info(&self) -> &DocumentInfo;
    fn render_page(&self, request: RenderRequest) -> Result<RenderImage>;
}

/// Opens documents. Decoding may take a while, so opening is asynchronous.
#[async_trait::async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open(&self, source: &DocumentSource) -> Result<Arc<dyn DocumentBackend>, LoadError>;
}

pub struct DocumentInstance {
    pub info: DocumentInfo,
    pub backend: Arc<dyn DocumentBackend>,
    render_cache: Mutex<HashMap<CacheKey, RenderImage>>,
}

impl DocumentInstance {
    pub fn new(backend: Arc<dyn DocumentBackend>) -> Self {
        Self {
            info: backend.info().clone(),
            backend,
            render_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn render(&self, viewport: &Viewport) -> Result<RenderImage> {
        self.render_page_internal(viewport.page_index(), viewport.scale(), viewport.page_index())
    }

    pub fn prefetch_neighbors(&self, viewport: &Viewport, range: usize) -> Result<()> {
        if range == 0 {
            return Ok(());
        }

        let current_page = viewport.page_index();
        let scale = viewport.scale();
        let mut last_error: Option<Error> = None;

        for offset in 1..=range {
            if let Some(prev) = current_page.checked_sub(offset) {
                if let Err(err) = self.render_page_internal(prev, scale, current_page) {
                    last_error = Some(err);
                }
            }

            let next = current_page + offset;
            if next < self.info.page_count {
                if let Err(err) = self.render_page_internal(next, scale, current_page) {
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn render_page_internal(
        &self,
        page_index: usize,
        scale: f32,
        reference_page: usize,
    ) -> Result<RenderImage> {
        if page_index >= self.info.page_count {
            return Err(anyhow!("page {} out of range", page_index + 1));
        }

        let key = CacheKey::new(page_index, scale);
        if let Some(image) = self.render_cache.lock().get(&key).cloned() {
            return Ok(image);
        }

        let image = self.backend.render_page(RenderRequest { page_index, scale })?;
        self.store_cached_render(key, &image, reference_page);
        Ok(image)
    }

    fn store_cached_render(&self, key: CacheKey, image: &RenderImage, reference_page: usize) {
        let mut cache = self.render_cache.lock();
        cache.insert(key, image.clone());

        if cache.len() > CACHE_CAPACITY {
            let mut keys: Vec<_> = cache.keys().copied().collect();
            keys.sort_by_key(|k| k.distance(reference_page));
            for stale in keys.into_iter().skip(CACHE_CAPACITY) {
                cache.remove(&stale);
            }
        }
    }
}

const CACHE_CAPACITY: usize = 8;

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
struct CacheKey {
    page_index: usize,
    scale_milli: u32,
}

impl CacheKey {
    fn new(page_index: usize, scale: f32) -> Self {
        Self {
            page_index,
            scale_milli: quantize_scale(scale),
        }
    }

    fn distance(&self, reference_page: usize) -> usize {
        self.page_index.abs_diff(reference_page)
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerPhase {
    Down,
    Move,
    Up,
    Cancel,
}

#[derive(Debug, Clone)]
pub enum Command {
    NextPage,
    PrevPage,
    FirstPage,
    LastPage,
    GotoPage { page: usize },
    GotoPageInput { input: String },
    ZoomIn,
    ZoomOut,
    SetScale { scale: f32 },
    SelectScalePreset { index: usize },
    ResetScale,
    AddText,
    UpdatePosition { id: AnnotationId, x: f32, y: f32 },
    UpdateSize { id: AnnotationId, width: f32, height: f32, x: f32, y: f32 },
    UpdateText { id: AnnotationId, text: String },
    Activate { id: AnnotationId },
    Deactivate { id: AnnotationId },
    RemoveAnnotation { id: AnnotationId },
    RemoveActive,
    ReleaseFocus,
    BeginEdit,
    EndEdit,
    InsertText { text: String },
    Backspace,
    Nudge { dx: f32, dy: f32 },
    Pointer { phase: PointerPhase, at: Point },
    Clear,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    DocumentLoading(DocumentId),
    DocumentReady(DocumentId),
    LoadFailed(String),
    Cleared,
    RedrawNeeded,
    AnnotationsChanged,
}

pub struct ReadyDocument {
    pub document: DocumentInstance,
    pub viewport: Viewport,
}

pub enum ViewerStatus {
    NoDocument,
    Loading,
    Ready(ReadyDocument),
    Error { message: String },
}

impl ViewerStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ViewerStatus::NoDocument => "no-document",
            ViewerStatus::Loading => "loading",
            ViewerStatus::Ready(_) => "ready",
            ViewerStatus::Error { .. } => "error",
        }
    }
}

impl fmt::Debug for ViewerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewerStatus::Ready(ready) => f
                .debug_struct("Ready")
                .field("document", &ready.document.info.name)
                .field("viewport", &ready.viewport)
                .finish(),
            ViewerStatus::Error { message } => {
                f.debug_struct("Error").field("message", message).finish()
            }
            other => f.write_str(other.label()),
        }
    }
}

/// Everything the viewer shows: the selected file, the page state machine and
/// the annotation layer.
pub struct Session {
    limits: ScaleLimits,
    status: ViewerStatus,
    selected: Option<DocumentSource>,
    overlay: OverlayStore,
    controller: OverlayController,
    loads: LoadTracker,
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl Session {
    pub fn new(config: &Config) -> Self {
        Self {
            limits: ScaleLimits::from_config(&config.viewer),
            status: ViewerStatus::NoDocument,
            selected: None,
            overlay: OverlayStore::new(config.overlay.clone()),
            controller: OverlayController::default(),
            loads: LoadTracker::new(),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn events(&self) -> Arc<Mutex<Vec<SessionEvent>>> {
        Arc::clone(&self.events)
    }

    pub fn drain_events(&self) -> Vec<SessionEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn status(&self) -> &ViewerStatus {
        &self.status
    }

    pub fn ready(&self) -> Option<&ReadyDocument> {
        match &self.status {
            ViewerStatus::Ready(ready) => Some(ready),
            _ => None,
        }
    }

    pub fn viewport(&self) -> Option<&Viewport> {
        self.ready().map(|ready| &ready.viewport)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.status, ViewerStatus::Loading)
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            ViewerStatus::Error { message } => Some(message),
            _ => None,
        }
    }

    pub fn selected(&self) -> Option<&DocumentSource> {
        self.selected.as_ref()
    }

    pub fn limits(&self) -> &ScaleLimits {
        &self.limits
    }

    pub fn overlay(&self) -> &OverlayStore {
        &self.overlay
    }

    pub fn controller(&self) -> &OverlayController {
        &self.controller
    }

    pub fn is_editing(&self) -> bool {
        self.controller.is_editing()
    }

    /// Size of the rendered page surface, which bounds every annotation.
    pub fn set_overlay_bounds(&mut self, bounds: Option<Size>) {
        self.overlay.set_bounds(bounds);
    }

    pub fn set_handle_size(&mut self, handle_size: f32) {
        self.controller.set_handle_size(handle_size);
    }

    /// Selects a new file. The previous document and its annotations are
    /// dropped and any load still in flight is superseded.
    #[instrument(skip(self))]
    pub fn begin_load(&mut self, source: DocumentSource) -> LoadRequest {
        let ticket = self.loads.begin();
        self.selected = Some(source.clone());
        self.status = ViewerStatus::Loading;
        self.overlay.clear();
        self.overlay.set_bounds(None);
        self.controller.reset();
        self.push_event(SessionEvent::DocumentLoading(source.document_id()));
        LoadRequest { ticket, source }
    }

    /// Applies a finished load. Returns `false` when the completion was
    /// superseded and has been discarded.
    pub fn finish_load(&mut self, completion: LoadCompletion) -> bool {
        if !self.loads.is_current(completion.ticket) {
            debug!(
                generation = completion.ticket.generation(),
                "discarding superseded load"
            );
            return false;
        }

        match completion.outcome {
            LoadOutcome::Success(backend) => {
                let document = DocumentInstance::new(backend);
                let viewport = Viewport::new(document.info.page_count, &self.limits);
                let id = document.info.id;
                info!(
                    name = %document.info.name,
                    pages = document.info.page_count,
                    "document ready"
                );
                self.status = ViewerStatus::Ready(ReadyDocument { document, viewport });
                self.push_event(SessionEvent::DocumentReady(id));
            }
            LoadOutcome::Failure(err) => {
                warn!(%err, "document load failed");
                let message = err.to_string();
                self.status = ViewerStatus::Error {
                    message: message.clone(),
                };
                self.push_event(SessionEvent::LoadFailed(message));
            }
        }
        self.push_event(SessionEvent::RedrawNeeded);
        true
    }

    /// Selects `source` and waits for it to load.
    pub async fn open_with<P>(
        &mut self,
        provider: &P,
        source: DocumentSource,
    ) -> Result<(), LoadError>
    where
        P: DocumentProvider + ?Sized,
    {
        let request = self.begin_load(source);
        let completion = resolve_load(provider, request).await;
        let failure = match &completion.outcome {
            LoadOutcome::Failure(err) => Some(err.clone()),
            LoadOutcome::Success(_) => None,
        };
        self.finish_load(completion);
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Back to the initial state: no file, no annotations, no pending load.
    pub fn clear(&mut self) {
        self.loads.invalidate();
        self.selected = None;
        self.status = ViewerStatus::NoDocument;
        self.overlay.clear();
        self.overlay.set_bounds(None);
        self.controller.reset();
        self.push_event(SessionEvent::Cleared);
        self.push_event(SessionEvent::RedrawNeeded);
    }

    /// Applies a user command. Returns `true` when anything visible changed.
    /// Commands that need a document are ignored while none is ready.
    pub fn apply(&mut self, command: Command) -> bool {
        match command {
            Command::Clear => {
                self.clear();
                true
            }
            Command::NextPage => self.navigate(|viewport, _| viewport.next_page()),
            Command::PrevPage => self.navigate(|viewport, _| viewport.prev_page()),
            Command::FirstPage => self.navigate(|viewport, _| viewport.first_page()),
            Command::LastPage => self.navigate(|viewport, _| viewport.last_page()),
            Command::GotoPage { page } => self.navigate(|viewport, _| viewport.goto_page(page)),
            Command::GotoPageInput { input } => {
                self.navigate(|viewport, _| viewport.goto_page_input(&input))
            }
            Command::ZoomIn => self.navigate(|viewport, limits| viewport.zoom_in(limits)),
            Command::ZoomOut => self.navigate(|viewport, limits| viewport.zoom_out(limits)),
            Command::SetScale { scale } => {
                self.navigate(|viewport, limits| viewport.set_scale(scale, limits))
            }
            Command::SelectScalePreset { index } => {
                self.navigate(|viewport, limits| viewport.select_preset(index, limits))
            }
            Command::ResetScale => self.navigate(|viewport, limits| viewport.reset_scale(limits)),
            Command::AddText => self.edit_overlay(|overlay, controller| {
                controller.reset();
                overlay.create();
                true
            }),
            Command::UpdatePosition { id, x, y } => {
                self.edit_overlay(|overlay, _| overlay.update_position(id, x, y))
            }
            Command::UpdateSize {
                id,
                width,
                height,
                x,
                y,
            } => self.edit_overlay(|overlay, _| overlay.update_size(id, width, height, x, y)),
            Command::UpdateText { id, text } => {
                self.edit_overlay(|overlay, _| overlay.update_text(id, text))
            }
            Command::Activate { id } => self.edit_overlay(|overlay, controller| {
                let switching = overlay.active_id() != Some(id);
                let changed = overlay.activate(id);
                if changed && switching {
                    controller.end_editing();
                }
                changed
            }),
            Command::Deactivate { id } => self.edit_overlay(|overlay, controller| {
                let changed = overlay.deactivate(id);
                if changed {
                    controller.end_editing();
                }
                changed
            }),
            Command::RemoveAnnotation { id } => self.edit_overlay(|overlay, controller| {
                if overlay.active_id() == Some(id) {
                    controller.reset();
                }
                overlay.remove(id)
            }),
            Command::RemoveActive => {
                self.edit_overlay(|overlay, controller| controller.remove_active(overlay))
            }
            Command::ReleaseFocus => {
                self.edit_overlay(|overlay, controller| controller.release_focus(overlay))
            }
            Command::BeginEdit => {
                self.edit_overlay(|overlay, controller| controller.begin_editing(overlay))
            }
            Command::EndEdit => self.edit_overlay(|_, controller| {
                let was_editing = controller.is_editing();
                controller.end_editing();
                was_editing
            }),
            Command::InsertText { text } => {
                self.edit_overlay(|overlay, controller| controller.insert_text(overlay, &text))
            }
            Command::Backspace => {
                self.edit_overlay(|overlay, controller| controller.backspace(overlay))
            }
            Command::Nudge { dx, dy } => {
                self.edit_overlay(|overlay, controller| controller.nudge(overlay, dx, dy))
            }
            Command::Pointer { phase, at } => {
                self.edit_overlay(|overlay, controller| match phase {
                    PointerPhase::Down => controller.pointer_down(overlay, at),
                    PointerPhase::Move => controller.pointer_move(overlay, at),
                    PointerPhase::Up => controller.pointer_up(overlay, at),
                    PointerPhase::Cancel => {
                        controller.cancel();
                        false
                    }
                })
            }
        }
    }

    fn navigate<F>(&mut self, change: F) -> bool
    where
        F: FnOnce(&mut Viewport, &ScaleLimits) -> bool,
    {
        let ViewerStatus::Ready(ready) = &mut self.status else {
            return false;
        };
        let changed = change(&mut ready.viewport, &self.limits);
        if changed {
            self.push_event(SessionEvent::RedrawNeeded);
        }
        changed
    }

    fn edit_overlay<F>(&mut self, change: F) -> bool
    where
        F: FnOnce(&mut OverlayStore, &mut OverlayController) -> bool,
    {
        if self.ready().is_none() {
            return false;
        }
        let changed = change(&mut self.overlay, &mut self.controller);
        if changed {
            self.push_event(SessionEvent::AnnotationsChanged);
        }
        changed
    }

    fn push_event(&self, event: SessionEvent) {
        self.events.lock().push(event);
    }
}
