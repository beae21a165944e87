//! asset-loom
//!
//! A multi-part remote asset load coordinator. An artifact is assembled from
//! three independently fetched parts (a geometry description, a material
//! description and an image) identified together by a composite key of
//! their locators. The coordinator deduplicates concurrent requests for the
//! same key, caches each part and the assembled result, and tolerates the
//! image part failing: a permanently missing image degrades the artifact
//! instead of failing the request.
//!
//! The transport ([`Fetcher`]) and the byte decoder ([`Assembler`]) are
//! injected; [`ObjAssembler`] ships as the default for OBJ/MTL/image inputs
//! and an HTTP fetcher is available behind the `http` feature.
//!
//! High-level modules
//! - `assemble`: the byte-to-artifact assembly boundary
//! - `coordinator`: the public [`Loader`] handle and its owner loop
//! - `error`: fetch/assembly/load error taxonomy
//! - `fetch`: the remote fetch boundary and retry policy
//! - `model`: CPU-side model data for the default assembler
//! - `obj`: OBJ/MTL/image assembler
//! - `parts`: part identity and the per-kind part caches
//! - `registry`: request dedup and the assembled-artifact cache
//!

pub mod assemble;
pub mod coordinator;
pub mod error;
pub mod fetch;
pub mod model;
pub mod obj;
pub mod parts;
pub mod registry;

// Re-exports commonly used types for convenience in downstream code.
pub use assemble::Assembler;
pub use coordinator::{Loader, LoaderConfig};
pub use error::{AssemblyError, FetchError, LoadError};
#[cfg(feature = "http")]
pub use fetch::HttpFetcher;
pub use fetch::Fetcher;
pub use model::Model;
pub use obj::ObjAssembler;
pub use parts::{CompositeKey, FetchDecision, PartKind, PartRef};
