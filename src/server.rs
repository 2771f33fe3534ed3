//! Rendering orchestrator - builds once, renders many.
//!
//! Owns the registry, the bundler and the cached compiled bundle. The build
//! step runs at startup (and again whenever the registry changes, by
//! rebuilding the Renderer); renders only read the cached bundle, so
//! compilation cost is never paid per request. Renders may run concurrently:
//! the bundle is shared read-only and every render gets its own context.

use crate::bundler::{BuildRequest, Bundler, CompiledBundle, EsbuildCli};
use crate::error::{Error, Result};
use crate::executor::{self, ExecOptions, RenderOutput};
use crate::registry::{PageRegistry, RenderRequest};
use crate::synth::{self, AppLayout, VIRTUAL_ENTRY_NAME};
use std::path::PathBuf;

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Application directory (entry point + page modules).
    pub app_dir: PathBuf,
    /// Where the compiled bundle is written.
    pub outfile: PathBuf,
    pub layout: AppLayout,
    pub exec: ExecOptions,
}

impl RendererConfig {
    pub fn new(app_dir: impl Into<PathBuf>) -> Self {
        let app_dir = app_dir.into();
        let outfile = app_dir.join(".nexus").join("bundle.js");
        Self {
            app_dir,
            outfile,
            layout: AppLayout::default(),
            exec: ExecOptions::default(),
        }
    }
}

/// Drives synthesizer -> bundler -> executor for a fixed page registry.
pub struct Renderer {
    registry: PageRegistry,
    config: RendererConfig,
    bundler: Box<dyn Bundler + Send + Sync>,
    bundle: Option<CompiledBundle>,
}

impl Renderer {
    pub fn new(registry: PageRegistry, config: RendererConfig) -> Self {
        Self::with_bundler(registry, config, Box::new(EsbuildCli::default()))
    }

    pub fn with_bundler(
        registry: PageRegistry,
        config: RendererConfig,
        bundler: Box<dyn Bundler + Send + Sync>,
    ) -> Self {
        Self {
            registry,
            config,
            bundler,
            bundle: None,
        }
    }

    pub fn registry(&self) -> &PageRegistry {
        &self.registry
    }

    /// Synthesize the virtual entry and compile it. Run once at startup; a
    /// failure leaves rendering unavailable until a rebuild succeeds.
    pub fn build(&mut self) -> Result<()> {
        // A failed attempt must not leave the previous bundle in use.
        self.bundle = None;

        if let Some(parent) = self.config.outfile.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::Io {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        let entry_source = synth::synthesize(&self.registry, &self.config.layout)?;
        let request = BuildRequest {
            entry_source: &entry_source,
            entry_name: VIRTUAL_ENTRY_NAME,
            app_dir: &self.config.app_dir,
            outfile: &self.config.outfile,
        };
        let bundle = self.bundler.build(&request)?;
        eprintln!(
            "[nexus-ssr] bundle built: {} pages, {} bytes -> {}",
            self.registry.len(),
            bundle.source.len(),
            bundle.outfile.display()
        );
        self.bundle = Some(bundle);
        Ok(())
    }

    /// Render the page registered at `path` for one request. Loader errors
    /// propagate unchanged; every render runs in its own fresh context.
    pub async fn render(&self, path: &str, request: &RenderRequest) -> Result<RenderOutput> {
        let bundle = self.bundle.as_ref().ok_or(Error::BundleMissing)?;
        let page = self
            .registry
            .find(path)
            .ok_or_else(|| Error::PageNotFound(path.to_string()))?;

        let data = page.load(request).map_err(|e| Error::Loader {
            path: path.to_string(),
            source: e,
        })?;

        // The entry point routes on the request url; for direct page renders
        // that is the page's own path.
        executor::render(&bundle.source, page.path(), &data, &self.config.exec).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Loader;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::Mutex;

    /// Bundler double: records the request and returns a canned CJS-shaped
    /// script, so orchestrator tests run without an esbuild binary.
    struct FakeBundler {
        script: &'static str,
        seen_entry: Arc<Mutex<String>>,
    }

    impl Bundler for FakeBundler {
        fn build(&self, request: &BuildRequest<'_>) -> crate::Result<CompiledBundle> {
            *self.seen_entry.lock().unwrap() = request.entry_source.to_string();
            Ok(CompiledBundle {
                source: Arc::from(self.script),
                outfile: request.outfile.to_path_buf(),
            })
        }
    }

    const FAKE_BUNDLE: &str = r#"
        module.exports.routes = [{ path: "", view: {} }];
        module.exports.entry = {
            default: (ctx, req) => new Response(
                "<!DOCTYPE html><pre>" + JSON.stringify(ctx.props) + "</pre>"
            ),
        };
    "#;

    fn counter_loader(value: i64) -> Loader {
        Box::new(move |_req| Ok(json!({ "counter": value })))
    }

    fn renderer_with(script: &'static str, registry: PageRegistry) -> (Renderer, Arc<Mutex<String>>) {
        let seen_entry = Arc::new(Mutex::new(String::new()));
        let dir = std::env::temp_dir().join("nexus-ssr-test");
        let mut config = RendererConfig::new(&dir);
        config.outfile = dir.join("bundle.js");
        config.exec.timeout_ms = None;
        let bundler = FakeBundler {
            script,
            seen_entry: seen_entry.clone(),
        };
        (
            Renderer::with_bundler(registry, config, Box::new(bundler)),
            seen_entry,
        )
    }

    #[tokio::test]
    async fn test_end_to_end_counter_page() {
        let mut registry = PageRegistry::new();
        registry.register("", counter_loader(0)).unwrap();

        let (mut renderer, seen_entry) = renderer_with(FAKE_BUNDLE, registry);
        renderer.build().unwrap();

        // The bundler received the synthesized entry for the registry.
        let entry = seen_entry.lock().unwrap().clone();
        assert!(entry.contains("route_index_page"));

        let request = RenderRequest::new("", json!({}));
        let output = renderer.render("", &request).await.unwrap();
        assert!(!output.body.is_empty());
        assert!(output.body.contains(r#"{"counter":0}"#));
    }

    #[test]
    fn test_unpreparable_output_dir_is_io_error() {
        // A regular file where the output directory should go makes
        // create_dir_all fail; that is an orchestrator filesystem error,
        // not a bundler invocation failure.
        let dir = tempfile::tempdir().unwrap();
        let occupied = dir.path().join("occupied");
        std::fs::write(&occupied, "x").unwrap();

        let mut registry = PageRegistry::new();
        registry.register("", counter_loader(0)).unwrap();

        let mut config = RendererConfig::new(dir.path());
        config.outfile = occupied.join("sub").join("bundle.js");
        let bundler = FakeBundler {
            script: FAKE_BUNDLE,
            seen_entry: Arc::new(Mutex::new(String::new())),
        };
        let mut renderer = Renderer::with_bundler(registry, config, Box::new(bundler));

        let err = renderer.build().unwrap_err();
        match err {
            Error::Io { path, .. } => assert!(path.contains("occupied")),
            other => panic!("expected io error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_render_before_build_fails() {
        let mut registry = PageRegistry::new();
        registry.register("", counter_loader(0)).unwrap();
        let (renderer, _) = renderer_with(FAKE_BUNDLE, registry);

        let request = RenderRequest::new("", json!({}));
        let err = renderer.render("", &request).await.unwrap_err();
        assert!(matches!(err, Error::BundleMissing));
    }

    #[tokio::test]
    async fn test_unknown_page_is_not_found() {
        let mut registry = PageRegistry::new();
        registry.register("", counter_loader(0)).unwrap();

        let (mut renderer, _) = renderer_with(FAKE_BUNDLE, registry);
        renderer.build().unwrap();

        let request = RenderRequest::new("missing", json!({}));
        let err = renderer.render("missing", &request).await.unwrap_err();
        assert!(matches!(err, Error::PageNotFound(_)));
    }

    #[tokio::test]
    async fn test_loader_error_propagates() {
        let mut registry = PageRegistry::new();
        registry
            .register(
                "",
                Box::new(|_req| Err(anyhow::anyhow!("database unreachable"))),
            )
            .unwrap();

        let (mut renderer, _) = renderer_with(FAKE_BUNDLE, registry);
        renderer.build().unwrap();

        let request = RenderRequest::new("", json!({}));
        let err = renderer.render("", &request).await.unwrap_err();
        match err {
            Error::Loader { path, source } => {
                assert_eq!(path, "");
                assert!(source.to_string().contains("database unreachable"));
            }
            other => panic!("expected loader error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_loader_request_params_reach_page_data() {
        let mut registry = PageRegistry::new();
        registry
            .register("", Box::new(|req| Ok(req.params.clone())))
            .unwrap();

        let (mut renderer, _) = renderer_with(FAKE_BUNDLE, registry);
        renderer.build().unwrap();

        let request = RenderRequest::new("", json!({ "id": 42 }));
        let output = renderer.render("", &request).await.unwrap();
        assert!(output.body.contains(r#"{"id":42}"#));
    }
}
