//! Session and navigation state machine
//!
//! The single owner of view state. Events arrive through one inbound
//! channel (see [`ViewerSession::run`]); every backend failure ends up here,
//! and this is the only place that decides what the user sees.
//!
//! Navigation never cancels a call already sent through the host. Each
//! page pipeline carries the generation it started under, and everything it
//! produces is dropped unless that generation is still current when the
//! result arrives.
//!
//! # Thread Safety
//!
//! State sits behind a `parking_lot::Mutex` that is never held across an
//! await point. Generation checks and commits happen under the same lock.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::alto::{Point, TextRegion};
use crate::proxy::{DocumentSource, SelectionAck, SelectionRequest, ThumbnailRequest, THUMBNAIL_MAX_WIDTH};

use super::cancel::{GenerationCounter, GenerationToken};
use super::channel::{request_image_info, request_metadata, request_regions, request_thumbnails, send_selection, HostChannel};
use super::document::{Document, PageSource};
use super::error::{TransferError, ViewerError};
use super::hit_test::{ClickOutcome, HoverState, InteractionEngine, Selection, Tooltip};
use super::local::ingest_files;
use super::transfer::{ChunkedTransferClient, TransferProgress, DEFAULT_CHUNK_BYTES};
use super::viewport::{ImageSurface, OverlaySynchronizer, RegionSpace, VectorSurface, ViewportTransform};

/// How long success messages stay visible
pub const STATUS_TTL: Duration = Duration::from_millis(2500);

#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub chunk_bytes: u64,
    pub status_ttl: Duration,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            status_ttl: STATUS_TTL,
        }
    }
}

/// Lifecycle of the view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewState {
    Disconnected,
    Connecting,
    /// Connected, nothing loaded
    Empty,
    /// Local files being read and parsed
    Uploading,
    Viewing { page: usize },
    /// Document-level failure; left only by a fresh load
    Error { message: String },
}

impl ViewState {
    fn name(&self) -> &'static str {
        match self {
            ViewState::Disconnected => "disconnected",
            ViewState::Connecting => "connecting",
            ViewState::Empty => "empty",
            ViewState::Uploading => "uploading",
            ViewState::Viewing { .. } => "viewing",
            ViewState::Error { .. } => "error",
        }
    }
}

/// Inbound events, from the host and from the user
#[derive(Debug, Clone)]
pub enum ViewerEvent {
    HostConnected,
    LoadDocument(DocumentSource),
    LoadLocal { region_path: PathBuf, image_path: PathBuf },
    GoToPage(usize),
    NextPage,
    PreviousPage,
    /// Image surface pan/zoom changed
    ViewportChanged,
    /// Container pixel size changed
    Resized,
    AnimationFrame,
    PointerMove { x: f64, y: f64 },
    PointerDown { x: f64, y: f64 },
    PointerUp { x: f64, y: f64 },
    PointerLeave,
    SetOverlayVisible(bool),
    /// Page strip scrolled; fetch thumbnails for these pages
    LoadThumbnails(Vec<usize>),
}

/// How a page pipeline ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Loaded { page: usize, regions: usize },
    /// A newer navigation took over; nothing was committed
    Superseded,
    /// Page-level failure, shown until the next successful load
    Failed { page: usize, message: String },
}

/// Read-only view of the session for rendering
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub view: ViewState,
    pub title: Option<String>,
    pub page_count: usize,
    pub page_label: Option<String>,
    pub loading: bool,
    pub progress: Option<TransferProgress>,
    pub page_error: Option<String>,
    pub status: Option<String>,
    pub region_count: usize,
    pub hover: HoverState,
    pub tooltip: Option<Tooltip>,
    pub overlay_visible: bool,
    pub transform: Option<ViewportTransform>,
}

struct StatusMessage {
    text: String,
    expires_at: Instant,
}

struct SessionState {
    view: ViewState,
    document: Option<Document>,
    loading: bool,
    progress: Option<TransferProgress>,
    page_error: Option<String>,
    status: Option<StatusMessage>,
    image: Box<dyn ImageSurface>,
    overlay: Box<dyn VectorSurface>,
    sync: OverlaySynchronizer,
    interaction: InteractionEngine,
}

impl SessionState {
    /// Tear down the current page's overlay and image
    fn clear_page(&mut self) {
        self.sync.clear(self.overlay.as_mut());
        self.interaction.detach();
        self.image.close();
    }
}

/// Everything a page pipeline needs, captured when navigation starts
struct PagePipeline {
    index: usize,
    token: GenerationToken,
    source: PageSource,
}

/// What a finished page pipeline commits
struct LoadedPage {
    regions: Vec<TextRegion>,
    /// Coordinate space of `regions`
    dimensions: (u32, u32),
    /// Pixel width of the image actually opened
    image_width: u32,
    text: String,
}

/// One viewer session
#[derive(Clone)]
pub struct ViewerSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: Uuid,
    channel: Arc<dyn HostChannel>,
    transfer: ChunkedTransferClient,
    generations: GenerationCounter,
    config: ViewerConfig,
    state: Mutex<SessionState>,
}

impl ViewerSession {
    pub fn new(
        channel: Arc<dyn HostChannel>,
        image: Box<dyn ImageSurface>,
        overlay: Box<dyn VectorSurface>,
        config: ViewerConfig,
    ) -> Self {
        let transfer = ChunkedTransferClient::with_chunk_size(channel.clone(), config.chunk_bytes);
        Self {
            inner: Arc::new(SessionInner {
                id: Uuid::new_v4(),
                channel,
                transfer,
                generations: GenerationCounter::new(),
                config,
                state: Mutex::new(SessionState {
                    view: ViewState::Disconnected,
                    document: None,
                    loading: false,
                    progress: None,
                    page_error: None,
                    status: None,
                    image,
                    overlay,
                    sync: OverlaySynchronizer::new(),
                    interaction: InteractionEngine::new(),
                }),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start the host handshake
    pub fn connect(&self) {
        let mut state = self.inner.state.lock();
        if state.view == ViewState::Disconnected {
            state.view = ViewState::Connecting;
            tracing::debug!(session = %self.inner.id, "Connecting to host");
        }
    }

    /// Host handshake completed
    pub fn host_connected(&self) {
        let mut state = self.inner.state.lock();
        if state.view != ViewState::Connecting {
            tracing::debug!(session = %self.inner.id, state = state.view.name(), "Ignoring host handshake");
            return;
        }
        state.view = ViewState::Empty;
        tracing::info!(session = %self.inner.id, "Host connected");
    }

    /// Load a document through the backend and show its first page
    pub async fn load_document(&self, source: DocumentSource) -> Result<PageOutcome, ViewerError> {
        let token = {
            let mut state = self.inner.state.lock();
            Self::ensure_loadable(&state.view)?;
            state.loading = true;
            self.inner.generations.advance()
        };

        let metadata = request_metadata(self.inner.channel.as_ref(), source).await;
        if token.is_stale() {
            return Ok(PageOutcome::Superseded);
        }

        let metadata = match metadata {
            Ok(metadata) if metadata.total_pages == 0 || metadata.page_locators.is_empty() => {
                return Err(self.fail_document(&token, ViewerError::EmptyDocument));
            }
            Ok(metadata) => metadata,
            Err(e) => return Err(self.fail_document(&token, e.into())),
        };

        let document = Document::from_metadata(metadata);
        tracing::info!(
            session = %self.inner.id,
            pages = document.page_count(),
            title = ?document.title,
            "Document loaded"
        );
        Ok(self.open_document(&token, document).await)
    }

    /// Load a page from local files, bypassing the backend
    pub async fn load_local(&self, region_path: PathBuf, image_path: PathBuf) -> Result<PageOutcome, ViewerError> {
        let token = {
            let mut state = self.inner.state.lock();
            match state.view {
                ViewState::Empty | ViewState::Viewing { .. } | ViewState::Error { .. } => {}
                ref other => return Err(ViewerError::InvalidState(other.name())),
            }
            let token = self.inner.generations.advance();
            state.view = ViewState::Uploading;
            state.loading = true;
            state.clear_page();
            token
        };

        let page = ingest_files(&region_path, &image_path).await;
        if token.is_stale() {
            return Ok(PageOutcome::Superseded);
        }
        match page {
            Ok(page) => Ok(self.open_document(&token, Document::from_local(page)).await),
            Err(e) => Err(self.fail_document(&token, e.into())),
        }
    }

    fn ensure_loadable(view: &ViewState) -> Result<(), ViewerError> {
        match view {
            ViewState::Disconnected | ViewState::Connecting => Err(ViewerError::InvalidState(view.name())),
            _ => Ok(()),
        }
    }

    async fn open_document(&self, token: &GenerationToken, document: Document) -> PageOutcome {
        {
            let mut state = self.inner.state.lock();
            if token.is_stale() {
                return PageOutcome::Superseded;
            }
            state.document = Some(document);
        }
        match self.begin_page(0) {
            Some(pipeline) => self.run_page(pipeline).await,
            None => PageOutcome::Superseded,
        }
    }

    fn fail_document(&self, token: &GenerationToken, error: ViewerError) -> ViewerError {
        let mut state = self.inner.state.lock();
        if token.is_current() {
            tracing::warn!(session = %self.inner.id, error = %error, "Document load failed");
            state.clear_page();
            state.document = None;
            state.loading = false;
            state.progress = None;
            state.view = ViewState::Error {
                message: error.to_string(),
            };
        }
        error
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Navigate to a page; out-of-range requests are no-ops
    ///
    /// The pipeline runs in the background. Its handle can be awaited, but
    /// the session does not depend on that.
    pub fn go_to_page(&self, index: usize) -> Option<JoinHandle<PageOutcome>> {
        let pipeline = self.begin_page(index)?;
        let session = self.clone();
        Some(tokio::spawn(async move { session.run_page(pipeline).await }))
    }

    /// Navigate and wait for the page to finish loading
    pub async fn show_page(&self, index: usize) -> Option<PageOutcome> {
        let pipeline = self.begin_page(index)?;
        Some(self.run_page(pipeline).await)
    }

    pub fn next_page(&self) -> Option<JoinHandle<PageOutcome>> {
        let current = self.current_page()?;
        self.go_to_page(current.checked_add(1)?)
    }

    pub fn previous_page(&self) -> Option<JoinHandle<PageOutcome>> {
        let current = self.current_page()?;
        self.go_to_page(current.checked_sub(1)?)
    }

    pub fn current_page(&self) -> Option<usize> {
        match self.inner.state.lock().view {
            ViewState::Viewing { page } => Some(page),
            _ => None,
        }
    }

    fn begin_page(&self, index: usize) -> Option<PagePipeline> {
        let mut state = self.inner.state.lock();
        let source = state.document.as_ref()?.page(index).map(|p| p.source.clone());
        let Some(source) = source else {
            tracing::debug!(session = %self.inner.id, page = index, "Page out of range, ignoring");
            return None;
        };

        let token = self.inner.generations.advance();
        state.clear_page();
        state.view = ViewState::Viewing { page: index };
        state.loading = true;
        state.progress = None;
        tracing::debug!(
            session = %self.inner.id,
            page = index,
            generation = token.generation(),
            "Navigating"
        );

        Some(PagePipeline { index, token, source })
    }

    async fn run_page(&self, pipeline: PagePipeline) -> PageOutcome {
        let PagePipeline { index, token, source } = pipeline;

        // Image bytes
        let image = match &source {
            PageSource::Remote { image_locator, .. } => {
                let fetched = self
                    .inner
                    .transfer
                    .fetch(image_locator, &token, |progress| self.record_progress(&token, progress))
                    .await;
                match fetched {
                    Ok(bytes) => bytes,
                    Err(TransferError::Superseded) => return PageOutcome::Superseded,
                    Err(e) => return self.fail_page(&token, index, e.to_string()),
                }
            }
            PageSource::Local(page) => page.image.to_vec(),
        };

        // Open on the surface; regions are only fetched once the image is ready
        let opened = {
            let mut state = self.inner.state.lock();
            if token.is_stale() {
                return PageOutcome::Superseded;
            }
            match state.image.open(&image) {
                Ok(size) => size,
                Err(e) => {
                    drop(state);
                    return self.fail_page(&token, index, ViewerError::Surface(e).to_string());
                }
            }
        };

        let loaded = match &source {
            PageSource::Remote {
                image_locator,
                region_locator,
            } => {
                let fetched = request_regions(self.inner.channel.as_ref(), region_locator).await;
                if token.is_stale() {
                    return PageOutcome::Superseded;
                }
                let response = match fetched {
                    Ok(response) => response,
                    Err(e) => return self.fail_page(&token, index, e.to_string()),
                };

                let dimensions = if response.dimensions_declared {
                    (response.page_width, response.page_height)
                } else {
                    let size = self.undeclared_dimensions(image_locator, opened).await;
                    if token.is_stale() {
                        return PageOutcome::Superseded;
                    }
                    size
                };
                LoadedPage {
                    regions: response.text_lines,
                    dimensions,
                    image_width: opened.0,
                    text: response.full_text,
                }
            }
            PageSource::Local(page) => LoadedPage {
                regions: page.page.regions.clone(),
                dimensions: page.dimensions(),
                image_width: opened.0,
                text: page.page.full_text.clone(),
            },
        };

        self.commit_page(&token, index, loaded)
    }

    /// Size the regions were measured against when the layout is silent
    ///
    /// The image service's `info.json` describes the full-resolution image;
    /// without it the opened image's own size stands in.
    async fn undeclared_dimensions(&self, image_locator: &str, opened: (u32, u32)) -> (u32, u32) {
        match request_image_info(self.inner.channel.as_ref(), image_locator).await {
            Ok(info) => (info.width, info.height),
            Err(e) => {
                tracing::debug!(session = %self.inner.id, error = %e, "No image info, using opened size");
                opened
            }
        }
    }

    fn commit_page(&self, token: &GenerationToken, index: usize, loaded: LoadedPage) -> PageOutcome {
        let mut guard = self.inner.state.lock();
        if token.is_stale() {
            return PageOutcome::Superseded;
        }
        let state = &mut *guard;
        let LoadedPage {
            regions,
            dimensions,
            image_width,
            text,
        } = loaded;
        let count = regions.len();

        if let Some(page) = state.document.as_mut().and_then(|d| d.pages.get_mut(index)) {
            page.dimensions = Some(dimensions);
            page.regions = Some(regions.clone());
            page.text = Some(text);
        }

        let space = RegionSpace::new(f64::from(dimensions.0), f64::from(image_width));
        state
            .sync
            .rebuild(state.image.as_ref(), state.overlay.as_mut(), &regions, space);
        state.interaction.attach(regions);
        state.loading = false;
        state.progress = None;
        state.page_error = None;
        Self::set_status(state, &self.inner.config, format!("{} lines loaded", count));

        tracing::info!(session = %self.inner.id, page = index, regions = count, "Page ready");
        PageOutcome::Loaded { page: index, regions: count }
    }

    fn fail_page(&self, token: &GenerationToken, index: usize, message: String) -> PageOutcome {
        let mut state = self.inner.state.lock();
        if token.is_stale() {
            return PageOutcome::Superseded;
        }
        tracing::warn!(session = %self.inner.id, page = index, error = %message, "Page load failed");
        state.loading = false;
        state.progress = None;
        state.page_error = Some(message.clone());
        PageOutcome::Failed { page: index, message }
    }

    fn record_progress(&self, token: &GenerationToken, progress: TransferProgress) {
        let mut state = self.inner.state.lock();
        if token.is_current() {
            state.progress = Some(progress);
        }
    }

    // ========================================================================
    // Viewport and pointer
    // ========================================================================

    /// Image surface pan/zoom changed; `true` if a frame should be scheduled
    pub fn viewport_changed(&self) -> bool {
        self.inner.state.lock().sync.request_sync()
    }

    /// Container resized; `true` if a frame should be scheduled
    pub fn resized(&self) -> bool {
        self.inner.state.lock().sync.on_resize()
    }

    /// Apply the pending overlay sync, at most once per frame
    pub fn animation_frame(&self) -> Option<ViewportTransform> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        state.sync.on_animation_frame(state.image.as_ref(), state.overlay.as_mut())
    }

    pub fn pointer_move(&self, x: f64, y: f64) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let region = Self::region_point(state, x, y);
        state
            .interaction
            .pointer_move(Point::new(x, y), region, state.overlay.as_mut());
    }

    /// Screen point in the coordinate space of the page's regions
    fn region_point(state: &SessionState, x: f64, y: f64) -> Option<Point> {
        let image = state.image.screen_to_image(x, y)?;
        state.sync.image_to_region(image)
    }

    pub fn pointer_down(&self, x: f64, y: f64) {
        self.inner.state.lock().interaction.pointer_down(Point::new(x, y));
    }

    pub fn pointer_leave(&self) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        state.interaction.pointer_leave(state.overlay.as_mut());
    }

    /// Pointer released; a click on a line sends it on in the background
    pub fn pointer_up(&self, x: f64, y: f64) -> ClickOutcome {
        let (outcome, request) = {
            let mut state = self.inner.state.lock();
            let region = Self::region_point(&state, x, y);
            let outcome = state.interaction.pointer_up(Point::new(x, y), region);
            let request = match (&outcome, &state.view) {
                (ClickOutcome::Select(selection), ViewState::Viewing { page }) => {
                    let image_locator = state
                        .document
                        .as_ref()
                        .and_then(|d| d.page(*page))
                        .and_then(|p| p.image_locator())
                        .map(str::to_string);
                    Some(selection_request(*page, selection, image_locator))
                }
                _ => None,
            };
            (outcome, request)
        };

        if let Some(request) = request {
            let session = self.clone();
            tokio::spawn(async move {
                let _ = session.notify_selection(request).await;
            });
        }
        outcome
    }

    /// Send a selection to the model and report it in the status line
    pub async fn notify_selection(&self, request: SelectionRequest) -> Result<SelectionAck, ViewerError> {
        let region = request.region_id.clone();
        let result = send_selection(self.inner.channel.as_ref(), request).await;

        let mut state = self.inner.state.lock();
        match &result {
            Ok(_) => {
                tracing::debug!(session = %self.inner.id, region = %region, "Selection sent");
                Self::set_status(&mut state, &self.inner.config, "Text sent".to_string());
            }
            Err(e) => {
                tracing::warn!(session = %self.inner.id, region = %region, error = %e, "Selection not sent");
                Self::set_status(&mut state, &self.inner.config, format!("Failed to send text: {}", e));
            }
        }
        result.map_err(ViewerError::from)
    }

    /// Show or hide the overlay; hidden disables hit testing entirely
    pub fn set_overlay_visible(&self, visible: bool) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        state.interaction.set_enabled(visible, state.overlay.as_mut());
    }

    // ========================================================================
    // Status
    // ========================================================================

    fn set_status(state: &mut SessionState, config: &ViewerConfig, text: String) {
        state.status = Some(StatusMessage {
            text,
            expires_at: Instant::now() + config.status_ttl,
        });
    }

    pub fn view(&self) -> ViewState {
        self.inner.state.lock().view.clone()
    }

    /// Transient status text, `None` once expired
    pub fn status(&self) -> Option<String> {
        let state = self.inner.state.lock();
        state
            .status
            .as_ref()
            .filter(|s| Instant::now() < s.expires_at)
            .map(|s| s.text.clone())
    }

    pub fn page_error(&self) -> Option<String> {
        self.inner.state.lock().page_error.clone()
    }

    /// Regions of a page, if it has been loaded
    pub fn page_regions(&self, index: usize) -> Option<Vec<TextRegion>> {
        let state = self.inner.state.lock();
        state.document.as_ref()?.page(index)?.regions.clone()
    }

    /// Transcription of a page, if it has been loaded
    pub fn page_text(&self, index: usize) -> Option<String> {
        let state = self.inner.state.lock();
        state.document.as_ref()?.page(index)?.text.clone()
    }

    pub fn thumbnail(&self, index: usize) -> Option<String> {
        let state = self.inner.state.lock();
        state.document.as_ref()?.page(index)?.thumbnail.clone()
    }

    // ========================================================================
    // Thumbnails
    // ========================================================================

    /// Fetch thumbnails for the given pages that have none yet
    ///
    /// Remote pages go to the backend in one batch; local pages are shrunk
    /// here. Results for a document replaced in the meantime are dropped.
    /// Returns how many thumbnails were stored.
    pub async fn load_thumbnails(&self, indices: &[usize]) -> Result<usize, ViewerError> {
        let requested: Vec<(usize, PageSource)> = {
            let state = self.inner.state.lock();
            let Some(document) = state.document.as_ref() else {
                return Err(ViewerError::InvalidState(state.view.name()));
            };
            indices
                .iter()
                .filter_map(|&index| document.page(index))
                .filter(|page| page.thumbnail.is_none())
                .map(|page| (page.index, page.source.clone()))
                .collect()
        };

        let mut remote = ThumbnailRequest {
            image_urls: Vec::new(),
            page_indices: Vec::new(),
            max_width: None,
        };
        let mut produced = Vec::new();
        for (index, source) in &requested {
            match source {
                PageSource::Remote { image_locator, .. } => {
                    remote.image_urls.push(image_locator.clone());
                    remote.page_indices.push(*index);
                }
                PageSource::Local(page) => {
                    let page = page.clone();
                    match tokio::task::spawn_blocking(move || page.thumbnail(THUMBNAIL_MAX_WIDTH)).await {
                        Ok(Ok(data_url)) => produced.push((*index, data_url)),
                        Ok(Err(e)) => tracing::warn!(session = %self.inner.id, page = index, error = %e, "Thumbnail failed"),
                        Err(e) => tracing::warn!(session = %self.inner.id, page = index, error = %e, "Thumbnail task failed"),
                    }
                }
            }
        }

        if !remote.image_urls.is_empty() {
            let response = request_thumbnails(self.inner.channel.as_ref(), remote).await?;
            if !response.errors.is_empty() {
                tracing::warn!(session = %self.inner.id, errors = ?response.errors, "Some thumbnails failed");
            }
            produced.extend(response.thumbnails.into_iter().map(|t| (t.index, t.data_url)));
        }

        let mut state = self.inner.state.lock();
        let Some(document) = state.document.as_mut() else {
            return Ok(0);
        };
        let mut stored = 0;
        for (index, data_url) in produced {
            let Some((_, source)) = requested.iter().find(|(i, _)| *i == index) else {
                continue;
            };
            if let Some(page) = document.pages.get_mut(index).filter(|p| p.source.same_as(source)) {
                page.thumbnail = Some(data_url);
                stored += 1;
            }
        }
        tracing::debug!(session = %self.inner.id, stored, "Thumbnails stored");
        Ok(stored)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let status = self.status();
        let state = self.inner.state.lock();
        let page = match state.view {
            ViewState::Viewing { page } => state.document.as_ref().and_then(|d| d.page(page)),
            _ => None,
        };

        SessionSnapshot {
            view: state.view.clone(),
            title: state.document.as_ref().and_then(|d| d.title.clone()),
            page_count: state.document.as_ref().map(Document::page_count).unwrap_or(0),
            page_label: page.map(|p| p.label.clone()),
            loading: state.loading,
            progress: state.progress,
            page_error: state.page_error.clone(),
            status,
            region_count: state.interaction.region_count(),
            hover: state.interaction.hover().clone(),
            tooltip: state.interaction.tooltip().cloned(),
            overlay_visible: state.interaction.is_enabled(),
            transform: state.sync.last_transform(),
        }
    }

    // ========================================================================
    // Event loop
    // ========================================================================

    /// Apply one event; long-running work is spawned
    pub fn handle(&self, event: ViewerEvent) {
        match event {
            ViewerEvent::HostConnected => self.host_connected(),
            ViewerEvent::LoadDocument(source) => {
                let session = self.clone();
                tokio::spawn(async move {
                    let _ = session.load_document(source).await;
                });
            }
            ViewerEvent::LoadLocal { region_path, image_path } => {
                let session = self.clone();
                tokio::spawn(async move {
                    let _ = session.load_local(region_path, image_path).await;
                });
            }
            ViewerEvent::GoToPage(index) => {
                self.go_to_page(index);
            }
            ViewerEvent::NextPage => {
                self.next_page();
            }
            ViewerEvent::PreviousPage => {
                self.previous_page();
            }
            ViewerEvent::ViewportChanged => {
                self.viewport_changed();
            }
            ViewerEvent::Resized => {
                self.resized();
            }
            ViewerEvent::AnimationFrame => {
                self.animation_frame();
            }
            ViewerEvent::PointerMove { x, y } => self.pointer_move(x, y),
            ViewerEvent::PointerDown { x, y } => self.pointer_down(x, y),
            ViewerEvent::PointerUp { x, y } => {
                self.pointer_up(x, y);
            }
            ViewerEvent::PointerLeave => self.pointer_leave(),
            ViewerEvent::SetOverlayVisible(visible) => self.set_overlay_visible(visible),
            ViewerEvent::LoadThumbnails(indices) => {
                let session = self.clone();
                tokio::spawn(async move {
                    let _ = session.load_thumbnails(&indices).await;
                });
            }
        }
    }

    /// Consume events until the sender side closes
    pub async fn run(self, mut events: mpsc::Receiver<ViewerEvent>) {
        self.connect();
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
        tracing::debug!(session = %self.inner.id, "Event stream closed");
    }
}

fn selection_request(page: usize, selection: &Selection, image_locator: Option<String>) -> SelectionRequest {
    SelectionRequest {
        page_index: page,
        region_id: selection.region_id.clone(),
        transcription: selection.transcription.clone(),
        bounds: image_locator.as_ref().map(|_| selection.bounds),
        image_locator,
    }
}
