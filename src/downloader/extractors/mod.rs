// Manifest resolution - VOD metadata and stream variants
//
// Two phases per VOD:
// - metadata lookup against the platform API (title, duration, signed part URLs)
// - manifest lookup of the part playlists, merged into whole-VOD variants
//
// `ManifestSource` is the seam: the SOOP client implements it, tests use fakes.

mod auth;
mod diagnostics;
mod hls;
mod orchestrator;
pub mod soop;
mod traits;

pub use auth::Credentials;
pub use diagnostics::{analyze_error, diagnose_error, FailureDiagnostics, FailureReason};
pub use hls::{HlsPlaylist, HlsVariant};
pub use orchestrator::{merge_parts, ManifestResolver};
pub use soop::{SoopConfig, SoopSource};
pub use traits::{
    ManifestSource, MetadataGrant, PartGrant, PartManifest, RawVariant, Rendition, ResolverConfig,
};
