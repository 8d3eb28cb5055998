//! Production build orchestration for the Peaque framework.
//!
//! Turns a project directory into a self-contained `dist/`: a
//! build-hash-tagged asset directory with pre-compressed variants, one
//! pre-rendered HTML document per distinct head stack, and a generated
//! backend entry that rebuilds the router in-process at startup.

pub mod assets;
pub mod builder;
pub mod bundler;
pub mod compress;
pub mod esbuild;
pub mod hash;
pub mod jobs;

pub use assets::rewrite_asset_references;
pub use builder::{BuildArtifact, BuildOptions, ProductionBuilder};
pub use bundler::{BundleOutput, Bundler, MemoryBundler};
pub use esbuild::EsbuildBundler;
pub use compress::precompress_dir;
pub use hash::build_hash;
pub use jobs::{discover_jobs, JobModule};

/// Errors from the production pipeline.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("bundler: {0}")]
    Bundler(String),

    #[error("transform: {0}")]
    Transform(#[from] peaque_transform::TransformError),

    #[error(transparent)]
    Fs(#[from] peaque_fs::FsError),

    #[error("router: {0}")]
    Router(#[from] peaque_router::RouterError),
}

pub type BuildResult<T> = Result<T, BuildError>;
