//! Part identity and the per-kind part caches.
//!
//! A composite artifact is assembled from three parts, each addressed by an
//! opaque string locator. [`PartCache`] keeps completed bytes per locator
//! together with the set of locators whose fetch is still outstanding, so a
//! fetch is never issued twice concurrently for the same ref.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// The three resources joined into one artifact.
///
/// Geometry and material are mandatory. The image is mandatory unless its
/// fetch permanently fails, in which case the request degrades instead of
/// failing (see [`PendingRequest`](crate::registry::PendingRequest)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartKind {
    Geometry,
    Material,
    Image,
}

impl PartKind {
    /// All kinds in the order they appear in a [`CompositeKey`].
    pub const ALL: [PartKind; 3] = [PartKind::Geometry, PartKind::Material, PartKind::Image];
}

impl fmt::Display for PartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PartKind::Geometry => "geometry",
            PartKind::Material => "material",
            PartKind::Image => "image",
        };
        f.write_str(name)
    }
}

/// Opaque locator for a single part, typically a URL. Equality is exact
/// string match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartRef(String);

impl PartRef {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PartRef {
    fn from(locator: &str) -> Self {
        Self(locator.to_owned())
    }
}

impl From<String> for PartRef {
    fn from(locator: String) -> Self {
        Self(locator)
    }
}

impl fmt::Display for PartRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one assembled artifact: the ordered triple of part locators.
///
/// Two keys are equal iff all three refs are equal. Used both as the
/// artifact-cache key and the request-dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeKey {
    pub geometry: PartRef,
    pub material: PartRef,
    pub image: PartRef,
}

impl CompositeKey {
    pub fn new(
        geometry: impl Into<PartRef>,
        material: impl Into<PartRef>,
        image: impl Into<PartRef>,
    ) -> Self {
        Self {
            geometry: geometry.into(),
            material: material.into(),
            image: image.into(),
        }
    }

    /// The locator this key uses for `kind`.
    pub fn part(&self, kind: PartKind) -> &PartRef {
        match kind {
            PartKind::Geometry => &self.geometry,
            PartKind::Material => &self.material,
            PartKind::Image => &self.image,
        }
    }

    /// Whether this key references `part` as its `kind` locator.
    pub fn references(&self, kind: PartKind, part: &PartRef) -> bool {
        self.part(kind) == part
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} + {} + {}]", self.geometry, self.material, self.image)
    }
}

/// Outcome of [`PartCache::get_or_fetch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchDecision {
    /// The bytes are already in the completed map; no fetch needed.
    AlreadyCached,
    /// A fetch for this ref was issued earlier and has not completed yet.
    AlreadyInFlight,
    /// The ref was marked in-flight; the caller must issue the fetch.
    FetchStarted,
}

/// Completed bytes per locator plus the set of locators currently being
/// fetched.
///
/// One instance exists per part kind. A ref is never in both the completed
/// map and the in-flight set; transitions happen atomically on the
/// coordinator's owner loop.
#[derive(Debug, Default)]
pub struct PartCache {
    completed: HashMap<PartRef, Arc<[u8]>>,
    in_flight: HashSet<PartRef>,
}

impl PartCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, part: &PartRef) -> Option<&Arc<[u8]>> {
        self.completed.get(part)
    }

    pub fn contains(&self, part: &PartRef) -> bool {
        self.completed.contains_key(part)
    }

    pub fn in_flight(&self, part: &PartRef) -> bool {
        self.in_flight.contains(part)
    }

    /// Decide whether a fetch must be issued for `part`.
    ///
    /// Checks the completed map first, then the in-flight set. Only when the
    /// ref is in neither is it marked in-flight and `FetchStarted` returned;
    /// the caller is then responsible for issuing exactly one fetch.
    pub fn get_or_fetch(&mut self, part: &PartRef) -> FetchDecision {
        if self.completed.contains_key(part) {
            return FetchDecision::AlreadyCached;
        }
        if self.in_flight.contains(part) {
            return FetchDecision::AlreadyInFlight;
        }
        self.in_flight.insert(part.clone());
        FetchDecision::FetchStarted
    }

    /// Move `part` from in-flight to completed with its fetched bytes.
    pub fn complete(&mut self, part: &PartRef, bytes: Arc<[u8]>) {
        self.in_flight.remove(part);
        self.completed.insert(part.clone(), bytes);
    }

    /// Drop `part` from the in-flight set after a permanent fetch failure.
    ///
    /// The ref is not cached, so a later request for the same locator will
    /// fetch it again.
    pub fn fail(&mut self, part: &PartRef) {
        self.in_flight.remove(part);
    }
}
