//! The byte-to-artifact assembly boundary.

use crate::error::AssemblyError;

/// Turns the raw part buffers into the final artifact.
///
/// Pure and synchronous from the coordinator's point of view; it is invoked
/// on the owner loop once a request's required parts are satisfied. `image`
/// is `None` when the request was degraded by a permanent image fetch
/// failure; implementations must produce a usable artifact without it.
///
/// Assembled artifacts are shared between callers as `Arc<Self::Artifact>`
/// and cached for the process lifetime.
pub trait Assembler: Send + Sync + 'static {
    type Artifact: Send + Sync + 'static;

    fn assemble(
        &self,
        geometry: &[u8],
        material: &[u8],
        image: Option<&[u8]>,
    ) -> Result<Self::Artifact, AssemblyError>;
}
