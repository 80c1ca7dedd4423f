use std::convert::TryFrom;
use std::mem;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use termnote_core::{
    DocumentBackend, DocumentInfo, DocumentMetadata, DocumentProvider, DocumentSource, LoadError,
    RenderImage, RenderRequest, RendererConfig,
};
use tracing::{debug, instrument, warn};

/// Opens documents through a pdfium binding configured once at startup.
pub struct PdfiumRenderFactory {
    pdfium: Arc<Pdfium>,
}

impl PdfiumRenderFactory {
    pub fn new(config: &RendererConfig) -> Result<Self> {
        let pdfium = match config.library_path.as_deref().and_then(bind_pdfium_from_path) {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

#[async_trait]
impl DocumentProvider for PdfiumRenderFactory {
    #[instrument(skip(self))]
    async fn open(&self, source: &DocumentSource) -> Result<Arc<dyn DocumentBackend>, LoadError> {
        let source = match source {
            DocumentSource::Path(path) => {
                let data = std::fs::read(path).map_err(|err| LoadError::Unreadable {
                    path: path.clone(),
                    reason: err.to_string(),
                })?;
                DocumentSource::Bytes {
                    name: source.display_name(),
                    data,
                }
            }
            DocumentSource::Bytes { .. } => source.clone(),
        };
        let info = build_document_info(&self.pdfium, &source)?;
        debug!(pages = info.page_count, name = %info.name, "document decoded");
        Ok(Arc::new(PdfiumDocument::new(
            Arc::clone(&self.pdfium),
            source,
            info,
        )))
    }
}

struct PdfiumDocument {
    document: Mutex<Option<PdfDocument<'static>>>,
    pdfium: Arc<Pdfium>,
    source: DocumentSource,
    info: DocumentInfo,
}

impl PdfiumDocument {
    fn new(pdfium: Arc<Pdfium>, source: DocumentSource, info: DocumentInfo) -> Self {
        Self {
            document: Mutex::new(None),
            pdfium,
            source,
            info,
        }
    }

    fn open_document(&self) -> Result<PdfDocument<'static>> {
        let document = load_source(&self.pdfium, &self.source)
            .map_err(|err| anyhow!("failed to open {}: {err}", self.info.name))?;
        // SAFETY: the returned PdfDocument borrows the bindings owned by self.pdfium. It is
        // stored in self.document, which is declared before self.pdfium and therefore dropped
        // first, so the borrow never outlives the bindings.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
        Ok(document)
    }

    fn with_document<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&PdfDocument<'static>) -> Result<R>,
    {
        let mut guard = self.document.lock();
        if guard.is_none() {
            *guard = Some(self.open_document()?);
        }
        match guard.as_ref() {
            Some(document) => f(document),
            None => Err(anyhow!("document {} is not loaded", self.info.name)),
        }
    }

    fn render_internal(
        &self,
        document: &PdfDocument<'_>,
        request: &RenderRequest,
    ) -> Result<RenderImage> {
        let page_index: PdfPageIndex = request
            .page_index
            .try_into()
            .map_err(|_| anyhow!("page {} is out of supported range", request.page_index + 1))?;
        let page = document
            .pages()
            .get(page_index)
            .with_context(|| format!("page {} out of range", request.page_index + 1))?;

        let config = PdfRenderConfig::new().scale_page_by_factor(request.scale.max(0.1));
        let bitmap = page
            .render_with_config(&config)
            .with_context(|| format!("failed to render page {}", request.page_index + 1))?;
        let image = bitmap.as_image().to_rgba8();

        Ok(RenderImage {
            width: image.width(),
            height: image.height(),
            pixels: image.into_raw(),
        })
    }
}

impl DocumentBackend for PdfiumDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    #[instrument(skip(self), fields(name = %self.info.name))]
    fn render_page(&self, request: RenderRequest) -> Result<RenderImage> {
        self.with_document(|document| self.render_internal(document, &request))
    }
}

fn load_source<'a>(
    pdfium: &'a Pdfium,
    source: &DocumentSource,
) -> Result<PdfDocument<'a>, PdfiumError> {
    match source {
        DocumentSource::Path(path) => pdfium.load_pdf_from_file(path, None),
        DocumentSource::Bytes { data, .. } => pdfium.load_pdf_from_byte_vec(data.clone(), None),
    }
}

fn build_document_info(pdfium: &Pdfium, source: &DocumentSource) -> Result<DocumentInfo, LoadError> {
    let document =
        load_source(pdfium, source).map_err(|err| LoadError::Decode(err.to_string()))?;
    let page_count = usize::try_from(document.pages().len()).unwrap_or_default();
    let metadata = document.metadata();

    let title = metadata
        .get(PdfDocumentMetadataTagType::Title)
        .map(|t| t.value().trim().to_owned())
        .filter(|t| !t.is_empty());
    let author = metadata
        .get(PdfDocumentMetadataTagType::Author)
        .map(|t| t.value().trim().to_owned())
        .filter(|t| !t.is_empty());

    Ok(DocumentInfo {
        id: source.document_id(),
        name: source.display_name(),
        page_count,
        metadata: DocumentMetadata { title, author },
    })
}

pub type PdfRenderFactory = PdfiumRenderFactory;

fn bind_pdfium_from_path(path: &Path) -> Option<Pdfium> {
    match Pdfium::bind_to_library(path) {
        Ok(bindings) => Some(Pdfium::new(bindings)),
        Err(err) => {
            warn!(
                path = %path.display(),
                %err,
                "failed to load configured pdfium library"
            );
            None
        }
    }
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
            Err(anyhow!(
                "failed to bind to a pdfium library; set renderer.library_path or install it ({})",
                errors.join(", ")
            ))
        }
    }
}
