//! Error taxonomy for the render pipeline.
//!
//! Every failure carries the stage it happened in; nothing is swallowed on
//! the way up to the orchestrator. Registration and build failures are fatal
//! (no page is servable without a bundle), marshalling and evaluation
//! failures are per-request.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Duplicate route path or slug collision. Fatal at startup.
    #[error("cannot register page '{path}': {reason}")]
    Registration { path: String, reason: String },

    /// First diagnostic reported by the bundler. Rendering stays unavailable
    /// until a rebuild succeeds.
    #[error("build failed: {message} ({file}:{line})")]
    Build {
        message: String,
        file: String,
        line: u32,
    },

    /// The bundler binary could not be spawned or its output read.
    #[error("bundler could not be invoked: {0}")]
    BundlerIo(#[from] std::io::Error),

    /// Filesystem failure outside the bundler itself (e.g. preparing the
    /// bundle output directory).
    #[error("i/o failure at '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A host shim could not be installed into a fresh context. Indicates a
    /// mismatch between the bundle's expectations and the fixed shim surface.
    #[error("sandbox setup failed: {0}")]
    SandboxSetup(String),

    /// Data could not cross the host/sandbox boundary in either direction.
    #[error("marshalling failed at {stage}: {message}")]
    Marshal {
        stage: &'static str,
        message: String,
    },

    /// The compiled script threw, timed out, or returned a value violating
    /// the Response-like contract.
    #[error("evaluation failed at {stage}: {message}")]
    Evaluation {
        stage: &'static str,
        message: String,
    },

    /// A page's data loader failed; the loader error propagates unchanged.
    #[error("loader failed for page '{path}': {source}")]
    Loader {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("no page registered for path '{0}'")]
    PageNotFound(String),

    #[error("no compiled bundle; build() must succeed before rendering")]
    BundleMissing,
}
