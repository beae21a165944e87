//! The load coordinator: request dedup, part joins and artifact caching.
//!
//! A single owner task exclusively holds the three [`PartCache`]s, the
//! [`RequestRegistry`] and the write side of the [`ArtifactCache`]. Fetches
//! run as spawned tasks and deliver their completions back onto the owner as
//! [`PartEvent`] messages over an mpsc channel; that channel is the only
//! synchronization boundary in the design. On every part arrival the owner
//! re-scans all pending requests for readiness (geometry and material
//! present, image present or ignorable), so parts may arrive in any order
//! and may have been satisfied by a cache hit that predates the request.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::assemble::Assembler;
use crate::error::{AssemblyError, FetchError, LoadError};
use crate::fetch::{Fetcher, fetch_with_retry};
use crate::parts::{CompositeKey, FetchDecision, PartCache, PartKind, PartRef};
use crate::registry::{ArtifactCache, CallbackPair, PendingRequest, RequestRegistry, Submission};

/// Tuning knobs for the coordinator.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Total attempts per part fetch; the last transient failure is terminal.
    pub max_attempts: u32,
    /// Optional per-attempt timeout. A timed-out attempt counts as transient.
    pub fetch_timeout: Option<Duration>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            fetch_timeout: None,
        }
    }
}

/// Completion notification delivered from a fetch task onto the owner loop.
enum PartEvent {
    Ready {
        kind: PartKind,
        part: PartRef,
        bytes: Arc<[u8]>,
    },
    Failed {
        kind: PartKind,
        part: PartRef,
        error: FetchError,
    },
}

enum Message<T> {
    Submit { key: CompositeKey, pair: CallbackPair<T> },
    Part(PartEvent),
}

/// Handle to a running load coordinator.
///
/// Cloning is cheap; every clone talks to the same owner task and shares the
/// same caches. Requires a tokio runtime: [`Loader::new`] spawns the owner
/// task onto the current runtime.
pub struct Loader<A: Assembler> {
    events: mpsc::UnboundedSender<Message<A::Artifact>>,
    artifacts: Arc<RwLock<ArtifactCache<A::Artifact>>>,
    cancel: CancellationToken,
}

impl<A: Assembler> Clone for Loader<A> {
    fn clone(&self) -> Self {
        Self {
            events: self.events.clone(),
            artifacts: Arc::clone(&self.artifacts),
            cancel: self.cancel.clone(),
        }
    }
}

impl<A: Assembler> Loader<A> {
    pub fn new(fetcher: Arc<dyn Fetcher>, assembler: A, config: LoaderConfig) -> Self {
        let (events, mailbox) = mpsc::unbounded_channel();
        let artifacts = Arc::new(RwLock::new(ArtifactCache::new()));
        let cancel = CancellationToken::new();

        let owner = Owner {
            fetcher,
            assembler,
            config,
            geometry: PartCache::new(),
            material: PartCache::new(),
            image: PartCache::new(),
            registry: RequestRegistry::new(),
            artifacts: Arc::clone(&artifacts),
            events: events.clone(),
            cancel: cancel.clone(),
        };
        tokio::spawn(owner.run(mailbox));

        Self {
            events,
            artifacts,
            cancel,
        }
    }

    /// Request the artifact identified by the three part locators.
    ///
    /// Never suspends the caller: an artifact-cache hit invokes `on_success`
    /// synchronously before returning, anything else queues the request onto
    /// the owner loop. Exactly one of the callbacks fires, exactly once,
    /// unless the coordinator is shut down first, in which case neither does.
    ///
    /// Every call registers its own callback pair, including repeat calls
    /// with the same key; fetch sharing happens at the key level.
    pub fn request_artifact(
        &self,
        geometry: &str,
        material: &str,
        image: &str,
        on_success: impl FnOnce(Arc<A::Artifact>) + Send + 'static,
        on_failure: impl FnOnce(LoadError) + Send + 'static,
    ) {
        let key = CompositeKey::new(geometry, material, image);
        let cached = self.artifacts.read().get(&key);
        if let Some(artifact) = cached {
            log::debug!("artifact cache hit for {key}");
            on_success(artifact);
            return;
        }
        let pair = CallbackPair::new(on_success, on_failure);
        if self.events.send(Message::Submit { key, pair }).is_err() {
            log::debug!("coordinator is shut down, dropping request");
        }
    }

    /// Async convenience over [`Loader::request_artifact`].
    pub async fn load(
        &self,
        geometry: &str,
        material: &str,
        image: &str,
    ) -> Result<Arc<A::Artifact>, LoadError> {
        let (done, outcome) = oneshot::channel();
        let done = Arc::new(Mutex::new(Some(done)));
        let done_err = Arc::clone(&done);

        self.request_artifact(
            geometry,
            material,
            image,
            move |artifact| {
                if let Some(done) = done.lock().take() {
                    let _ = done.send(Ok(artifact));
                }
            },
            move |error| {
                if let Some(done) = done_err.lock().take() {
                    let _ = done.send(Err(error));
                }
            },
        );

        match outcome.await {
            Ok(outcome) => outcome,
            Err(_) => Err(LoadError::Shutdown),
        }
    }

    /// Abandon all pending requests and in-flight fetches.
    ///
    /// The owner task stops, drops every part cache and pending request, and
    /// empties the shared artifact cache; no leftover callbacks are invoked.
    /// This is the only administrative operation; caches live for the
    /// coordinator lifetime otherwise.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// State owned exclusively by the coordinator task. All mutation happens in
/// [`Owner::run`]; nothing here is shared except the read side of the
/// artifact cache.
struct Owner<A: Assembler> {
    fetcher: Arc<dyn Fetcher>,
    assembler: A,
    config: LoaderConfig,
    geometry: PartCache,
    material: PartCache,
    image: PartCache,
    registry: RequestRegistry<A::Artifact>,
    artifacts: Arc<RwLock<ArtifactCache<A::Artifact>>>,
    events: mpsc::UnboundedSender<Message<A::Artifact>>,
    cancel: CancellationToken,
}

impl<A: Assembler> Owner<A> {
    async fn run(mut self, mut mailbox: mpsc::UnboundedReceiver<Message<A::Artifact>>) {
        loop {
            let message = tokio::select! {
                _ = self.cancel.cancelled() => {
                    log::debug!(
                        "coordinator shutting down, abandoning {} pending request(s)",
                        self.registry.len()
                    );
                    // The artifact cache is shared with every handle; empty it
                    // so the fast path stops serving hits after shutdown.
                    self.artifacts.write().clear();
                    break;
                }
                message = mailbox.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            match message {
                Message::Submit { key, pair } => self.on_submit(key, pair),
                Message::Part(event) => self.on_part_event(event),
            }
        }
    }

    fn on_submit(&mut self, key: CompositeKey, pair: CallbackPair<A::Artifact>) {
        match self.route(key, pair) {
            Submission::CacheHit(_) | Submission::Deduplicated => {}
            Submission::Created(key) => {
                self.trigger_fetches(&key);
                // Every part may already be satisfied by earlier keys.
                self.join_ready();
            }
        }
    }

    /// Route one caller: cache hit, append to an existing pending request,
    /// or create a new one.
    fn route(
        &mut self,
        key: CompositeKey,
        pair: CallbackPair<A::Artifact>,
    ) -> Submission<A::Artifact> {
        // The handle checks the cache before queueing, but a join may have
        // completed while this submit sat in the mailbox.
        let cached = self.artifacts.read().get(&key);
        if let Some(artifact) = cached {
            log::debug!("artifact cache hit for {key} on the owner loop");
            (pair.on_success)(Arc::clone(&artifact));
            return Submission::CacheHit(artifact);
        }
        if self.registry.register(&key, pair) {
            log::debug!("deduplicated request for {key}");
            Submission::Deduplicated
        } else {
            log::debug!("new composite request {key}");
            Submission::Created(key)
        }
    }

    fn cache_mut(&mut self, kind: PartKind) -> &mut PartCache {
        match kind {
            PartKind::Geometry => &mut self.geometry,
            PartKind::Material => &mut self.material,
            PartKind::Image => &mut self.image,
        }
    }

    fn trigger_fetches(&mut self, key: &CompositeKey) {
        for kind in PartKind::ALL {
            let part = key.part(kind).clone();
            match self.cache_mut(kind).get_or_fetch(&part) {
                FetchDecision::AlreadyCached => {
                    log::debug!("{kind} part {part} already cached");
                }
                FetchDecision::AlreadyInFlight => {
                    log::debug!("{kind} part {part} already in flight");
                }
                FetchDecision::FetchStarted => self.spawn_fetch(kind, part),
            }
        }
    }

    fn spawn_fetch(&self, kind: PartKind, part: PartRef) {
        let fetcher = Arc::clone(&self.fetcher);
        let events = self.events.clone();
        let cancel = self.cancel.clone();
        let max_attempts = self.config.max_attempts;
        let timeout = self.config.fetch_timeout;

        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = fetch_with_retry(fetcher.as_ref(), part.as_str(), max_attempts, timeout) => result,
            };
            let event = match result {
                Ok(bytes) => PartEvent::Ready {
                    kind,
                    part,
                    bytes: Arc::from(bytes),
                },
                Err(error) => PartEvent::Failed { kind, part, error },
            };
            // The owner may be gone already; nothing left to deliver then.
            let _ = events.send(Message::Part(event));
        });
    }

    fn on_part_event(&mut self, event: PartEvent) {
        match event {
            PartEvent::Ready { kind, part, bytes } => {
                log::debug!("{kind} part {part} ready ({} bytes)", bytes.len());
                self.cache_mut(kind).complete(&part, bytes);
            }
            PartEvent::Failed { kind, part, error } => {
                self.cache_mut(kind).fail(&part);
                if kind == PartKind::Image {
                    // A missing image degrades the artifact instead of
                    // failing the request.
                    let marked = self.registry.mark_image_ignorable(&part);
                    log::warn!(
                        "image part {part} failed permanently, degrading {marked} request(s): {error}"
                    );
                } else {
                    let failed = self.registry.take_referencing(kind, &part);
                    log::warn!(
                        "{kind} part {part} failed permanently, failing {} request(s): {error}",
                        failed.len()
                    );
                    for request in failed {
                        request.dispatch_failure(LoadError::Fetch {
                            kind,
                            locator: part.clone(),
                            message: error.to_string(),
                        });
                    }
                }
            }
        }
        self.join_ready();
    }

    /// Scan all pending requests and dispatch those whose required parts are
    /// satisfied.
    fn join_ready(&mut self) {
        let Self {
            registry,
            geometry,
            material,
            image,
            ..
        } = self;
        let ready = registry.take_ready(|request| {
            let key = request.key();
            geometry.contains(&key.geometry)
                && material.contains(&key.material)
                && (request.image_ignorable() || image.contains(&key.image))
        });
        for request in ready {
            self.assemble_and_dispatch(request);
        }
    }

    fn assemble_and_dispatch(&mut self, request: PendingRequest<A::Artifact>) {
        let key = request.key().clone();

        let Some(geometry) = self.geometry.get(&key.geometry).map(Arc::clone) else {
            log::error!("geometry part {} vanished before assembly", key.geometry);
            request.dispatch_failure(LoadError::Assembly(AssemblyError(
                "geometry part missing at assembly".to_owned(),
            )));
            return;
        };
        let Some(material) = self.material.get(&key.material).map(Arc::clone) else {
            log::error!("material part {} vanished before assembly", key.material);
            request.dispatch_failure(LoadError::Assembly(AssemblyError(
                "material part missing at assembly".to_owned(),
            )));
            return;
        };
        // None exactly when the request was degraded by an image failure.
        let image = self.image.get(&key.image).map(Arc::clone);

        match self
            .assembler
            .assemble(&geometry, &material, image.as_deref())
        {
            Ok(artifact) => {
                // Write-once: a concurrent assembly for the same key keeps
                // the first cached entry.
                let artifact = self.artifacts.write().insert(key.clone(), Arc::new(artifact));
                log::debug!("assembled artifact for {key} ({} caller(s))", request.callers());
                request.dispatch_success(artifact);
            }
            Err(error) => {
                log::error!("assembly failed for {key}: {error}");
                request.dispatch_failure(LoadError::Assembly(error));
            }
        }
    }
}
