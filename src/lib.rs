//! # Nexus SSR
//!
//! Server-side rendering of registered page components without a Node.js
//! runtime. Pages are compiled into a single script and executed inside a
//! sandboxed V8 isolate that exposes only a fixed, minimal host surface.
//!
//! ## Pipeline
//!
//! 1. Pages (route path + data loader) are registered at startup.
//! 2. A virtual entry module importing the shared entry point and every page
//!    is synthesized in memory - it never exists as a real file.
//! 3. esbuild compiles the virtual entry plus the page sources into one
//!    CommonJS bundle, with the shimmed host modules left external.
//! 4. Each render runs the bundle in a fresh isolate whose globals are limited
//!    to `require` (shim modules only), `module`, `process.env`, `Response`,
//!    and a captured `console`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use nexus_ssr::{PageRegistry, Renderer, RendererConfig, RenderRequest};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut registry = PageRegistry::new();
//!     registry
//!         .register("", Box::new(|_req| Ok(serde_json::json!({ "counter": 0 }))))
//!         .unwrap();
//!
//!     let mut renderer = Renderer::new(registry, RendererConfig::new("./app"));
//!     renderer.build().unwrap();
//!
//!     let request = RenderRequest::new("", serde_json::json!({}));
//!     let output = renderer.render("", &request).await.unwrap();
//!     println!("{}", output.body);
//! }
//! ```

mod bundler;
mod error;
mod executor;
mod marshal;
mod registry;
mod sandbox;
mod server;
mod synth;

pub use bundler::{BuildOptions, BuildRequest, Bundler, CompiledBundle, EsbuildCli};
pub use error::{Error, Result};
pub use executor::{ExecOptions, RenderOutput};
pub use registry::{Loader, Page, PageRegistry, RenderRequest};
pub use sandbox::ConsoleOutput;
pub use server::{Renderer, RendererConfig};
pub use synth::{AppLayout, VIRTUAL_ENTRY_NAME};
