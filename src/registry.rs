//! Page registry: the ordered set of routes the server can render.
//!
//! Registration order is load-bearing: it fixes the import order in the
//! synthesized entry module and therefore the build output. Duplicate paths
//! and slug collisions are rejected here, at registration time, so the
//! synthesizer never has to deal with ambiguous identifiers.

use crate::error::{Error, Result};

/// Incoming render request as seen by page data loaders.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// Request URL (the route path for direct page renders).
    pub url: String,
    /// Route parameters extracted by the outer HTTP/CLI layer.
    pub params: serde_json::Value,
}

impl RenderRequest {
    pub fn new(url: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            url: url.into(),
            params,
        }
    }
}

/// Server-side data loader: produces the JSON props a page renders with.
pub type Loader =
    Box<dyn Fn(&RenderRequest) -> anyhow::Result<serde_json::Value> + Send + Sync>;

/// A registered route: path plus data loader. Immutable after registration.
pub struct Page {
    path: String,
    slug: String,
    loader: Loader,
}

impl Page {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Identifier-safe form of the route path: `/` becomes `_`, the empty
    /// path becomes the reserved slug `index`.
    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Import identifier for this page in the synthesized entry module.
    pub fn import_ident(&self) -> String {
        format!("route_{}_page", self.slug)
    }

    pub fn load(&self, request: &RenderRequest) -> anyhow::Result<serde_json::Value> {
        (self.loader)(request)
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("path", &self.path)
            .field("slug", &self.slug)
            .finish_non_exhaustive()
    }
}

pub fn slugify(path: &str) -> String {
    if path.is_empty() {
        String::from("index")
    } else {
        path.replace('/', "_")
    }
}

/// Insertion-ordered collection of pages. Mutated only during startup
/// registration; treated as immutable once the server starts rendering.
#[derive(Debug, Default)]
pub struct PageRegistry {
    pages: Vec<Page>,
}

impl PageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page. Rejects duplicate paths and distinct paths whose
    /// slugs collide (e.g. `a/b` vs `a_b`), since either would produce a
    /// duplicate binding in the synthesized module.
    pub fn register(&mut self, path: impl Into<String>, loader: Loader) -> Result<()> {
        let path = path.into();
        let slug = slugify(&path);

        for existing in &self.pages {
            if existing.path == path {
                return Err(Error::Registration {
                    path,
                    reason: String::from("duplicate route path"),
                });
            }
            if existing.slug == slug {
                return Err(Error::Registration {
                    path,
                    reason: format!(
                        "slug '{}' collides with already registered path '{}'",
                        slug, existing.path
                    ),
                });
            }
        }

        self.pages.push(Page { path, slug, loader });
        Ok(())
    }

    /// Pages in registration order.
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn find(&self, path: &str) -> Option<&Page> {
        self.pages.iter().find(|p| p.path == path)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
