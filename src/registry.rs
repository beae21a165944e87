//! Pending-request dedup registry and the assembled-artifact cache.
//!
//! The registry guarantees at most one [`PendingRequest`] per distinct
//! [`CompositeKey`]: concurrent requests for the same key share one entry and
//! one set of part fetches. Every caller registers a [`CallbackPair`];
//! duplicate closures for the same key are deliberately kept (fetch sharing
//! happens at the key level, not via callback identity).

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::LoadError;
use crate::parts::{CompositeKey, PartKind, PartRef};

/// One caller's completion callbacks. Exactly one of the two is invoked,
/// exactly once, when the owning request is dispatched.
pub struct CallbackPair<T> {
    pub on_success: Box<dyn FnOnce(Arc<T>) + Send>,
    pub on_failure: Box<dyn FnOnce(LoadError) + Send>,
}

impl<T> CallbackPair<T> {
    pub fn new(
        on_success: impl FnOnce(Arc<T>) + Send + 'static,
        on_failure: impl FnOnce(LoadError) + Send + 'static,
    ) -> Self {
        Self {
            on_success: Box::new(on_success),
            on_failure: Box::new(on_failure),
        }
    }
}

/// One in-flight composite request with every caller waiting on it.
///
/// Created when a key has neither a cached artifact nor an existing entry,
/// grows as duplicate requests arrive, and is removed from the registry the
/// instant its required parts are satisfied. Dispatch is exactly-once: the
/// dispatch methods consume the request.
pub struct PendingRequest<T> {
    key: CompositeKey,
    image_ignorable: bool,
    callbacks: Vec<CallbackPair<T>>,
}

impl<T> PendingRequest<T> {
    fn new(key: CompositeKey) -> Self {
        Self {
            key,
            image_ignorable: false,
            callbacks: Vec::new(),
        }
    }

    pub fn key(&self) -> &CompositeKey {
        &self.key
    }

    /// Whether the image part may be skipped when judging readiness. Set once
    /// the image fetch has permanently failed; never cleared.
    pub fn image_ignorable(&self) -> bool {
        self.image_ignorable
    }

    pub fn mark_image_ignorable(&mut self) {
        self.image_ignorable = true;
    }

    pub fn callers(&self) -> usize {
        self.callbacks.len()
    }

    fn push(&mut self, pair: CallbackPair<T>) {
        self.callbacks.push(pair);
    }

    /// Invoke every success callback in registration order.
    pub fn dispatch_success(self, artifact: Arc<T>) {
        for pair in self.callbacks {
            (pair.on_success)(Arc::clone(&artifact));
        }
    }

    /// Invoke every failure callback in registration order.
    pub fn dispatch_failure(self, error: LoadError) {
        for pair in self.callbacks {
            (pair.on_failure)(error.clone());
        }
    }
}

/// How a submitted request was routed.
#[derive(Debug)]
pub enum Submission<T> {
    /// The artifact cache already held the key; the caller's success callback
    /// was invoked immediately and no fetch was issued.
    CacheHit(Arc<T>),
    /// An identical pending request existed; the callbacks were appended.
    Deduplicated,
    /// A new pending request was inserted; part fetches must be triggered.
    Created(CompositeKey),
}

/// Key-indexed table of pending requests.
#[derive(Default)]
pub struct RequestRegistry<T> {
    pending: HashMap<CompositeKey, PendingRequest<T>>,
}

impl<T> RequestRegistry<T> {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Append the caller to an existing entry or create a new one.
    /// Returns `true` when an entry for `key` already existed.
    pub fn register(&mut self, key: &CompositeKey, pair: CallbackPair<T>) -> bool {
        match self.pending.get_mut(key) {
            Some(request) => {
                request.push(pair);
                true
            }
            None => {
                let mut request = PendingRequest::new(key.clone());
                request.push(pair);
                self.pending.insert(key.clone(), request);
                false
            }
        }
    }

    /// Flag every pending request whose key uses `image` as its image part.
    /// Returns how many were flagged.
    pub fn mark_image_ignorable(&mut self, image: &PartRef) -> usize {
        let mut marked = 0;
        for request in self.pending.values_mut() {
            if request.key.references(PartKind::Image, image) {
                request.mark_image_ignorable();
                marked += 1;
            }
        }
        marked
    }

    /// Remove and return every pending request whose key references
    /// `(kind, part)`.
    pub fn take_referencing(&mut self, kind: PartKind, part: &PartRef) -> Vec<PendingRequest<T>> {
        let keys: Vec<CompositeKey> = self
            .pending
            .keys()
            .filter(|key| key.references(kind, part))
            .cloned()
            .collect();
        keys.iter()
            .filter_map(|key| self.pending.remove(key))
            .collect()
    }

    /// Remove and return every pending request `is_ready` accepts.
    pub fn take_ready(
        &mut self,
        is_ready: impl Fn(&PendingRequest<T>) -> bool,
    ) -> Vec<PendingRequest<T>> {
        let keys: Vec<CompositeKey> = self
            .pending
            .iter()
            .filter(|(_, request)| is_ready(request))
            .map(|(key, _)| key.clone())
            .collect();
        keys.iter()
            .filter_map(|key| self.pending.remove(key))
            .collect()
    }
}

/// Composite-key to assembled-artifact cache. Write-once per key.
#[derive(Debug)]
pub struct ArtifactCache<T> {
    entries: HashMap<CompositeKey, Arc<T>>,
}

impl<T> Default for ArtifactCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ArtifactCache<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, key: &CompositeKey) -> Option<Arc<T>> {
        self.entries.get(key).map(Arc::clone)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store an artifact for `key`. The first write wins: a second assembly
    /// for the same key never replaces the cached artifact. Returns the entry
    /// that is now cached.
    pub fn insert(&mut self, key: CompositeKey, artifact: Arc<T>) -> Arc<T> {
        Arc::clone(self.entries.entry(key).or_insert(artifact))
    }

    /// Drop every cached artifact. Invoked on coordinator shutdown, which is
    /// the only point the cache is ever emptied.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
