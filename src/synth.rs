//! Module graph synthesizer.
//!
//! Produces the source text of the virtual entry module: a namespace import
//! of the shared entry point, one namespace import per registered page, and
//! an exported routing table pairing each route path with its page module.
//! The source only ever exists in memory; the bundler receives it through a
//! virtual-entry hook and resolves the imports it references against the app
//! directory.

use crate::error::{Error, Result};
use crate::registry::PageRegistry;
use std::collections::HashSet;

/// Synthetic name of the virtual entry module. Never written to disk; used
/// as the bundler's source-file label so diagnostics point somewhere real.
pub const VIRTUAL_ENTRY_NAME: &str = "nexus-entry.jsx";

/// On-disk layout of the application directory the imports resolve against.
#[derive(Debug, Clone)]
pub struct AppLayout {
    /// Shared entry point module, relative to the app dir.
    pub entry_point: String,
    /// Directory holding page modules, relative to the app dir.
    pub routes_dir: String,
}

impl Default for AppLayout {
    fn default() -> Self {
        Self {
            entry_point: String::from("entry.server.jsx"),
            routes_dir: String::from("routes"),
        }
    }
}

impl AppLayout {
    /// Import path of the page module backing a route path. The empty route
    /// maps to the index module.
    fn page_module_path(&self, route_path: &str) -> String {
        if route_path.is_empty() {
            format!("{}/index.jsx", self.routes_dir)
        } else {
            format!("{}/{}.jsx", self.routes_dir, route_path)
        }
    }
}

/// Generate the virtual entry module for the current registry.
///
/// Imports appear in registration order so the build output is
/// deterministic. The registry already guarantees slug uniqueness; the check
/// here is a backstop so a bug upstream surfaces as an error instead of a
/// duplicate binding in generated code.
pub fn synthesize(registry: &PageRegistry, layout: &AppLayout) -> Result<String> {
    let mut seen = HashSet::new();
    let mut out = String::new();

    out.push_str(&format!(
        "import * as entry from \"./{}\";\n",
        layout.entry_point
    ));

    for page in registry.pages() {
        let ident = page.import_ident();
        if !seen.insert(ident.clone()) {
            return Err(Error::Registration {
                path: page.path().to_string(),
                reason: format!("import identifier '{}' already emitted", ident),
            });
        }
        out.push_str(&format!(
            "import * as {} from \"./{}\";\n",
            ident,
            layout.page_module_path(page.path())
        ));
    }

    out.push_str("export { entry };\n");
    out.push_str("export const routes = [\n");
    for page in registry.pages() {
        out.push_str(&format!(
            "  {{ path: {}, view: {} }},\n",
            js_string_literal(page.path()),
            page.import_ident()
        ));
    }
    out.push_str("];\n");

    Ok(out)
}

/// JSON string escaping is a subset of JS string literal escaping.
fn js_string_literal(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Loader;

    fn noop_loader() -> Loader {
        Box::new(|_req| Ok(serde_json::json!({})))
    }

    fn registry_with(paths: &[&str]) -> PageRegistry {
        let mut registry = PageRegistry::new();
        for path in paths {
            registry.register(*path, noop_loader()).unwrap();
        }
        registry
    }

    #[test]
    fn test_entry_imported_first() {
        let source = synthesize(&registry_with(&["a"]), &AppLayout::default()).unwrap();
        let first_line = source.lines().next().unwrap();
        assert_eq!(first_line, "import * as entry from \"./entry.server.jsx\";");
    }

    #[test]
    fn test_one_import_per_page_in_order() {
        let source = synthesize(&registry_with(&["a", "a/b"]), &AppLayout::default()).unwrap();

        let imports: Vec<&str> = source
            .lines()
            .filter(|l| l.starts_with("import * as route_"))
            .collect();
        assert_eq!(
            imports,
            vec![
                "import * as route_a_page from \"./routes/a.jsx\";",
                "import * as route_a_b_page from \"./routes/a/b.jsx\";",
            ]
        );
    }

    #[test]
    fn test_routing_table_preserves_order() {
        let source = synthesize(&registry_with(&["a", "a/b"]), &AppLayout::default()).unwrap();

        let a = source.find("{ path: \"a\", view: route_a_page }").unwrap();
        let ab = source
            .find("{ path: \"a/b\", view: route_a_b_page }")
            .unwrap();
        assert!(a < ab);
    }

    #[test]
    fn test_empty_path_maps_to_index_module() {
        let source = synthesize(&registry_with(&[""]), &AppLayout::default()).unwrap();

        assert!(source.contains("import * as route_index_page from \"./routes/index.jsx\";"));
        assert!(source.contains("{ path: \"\", view: route_index_page }"));
    }

    #[test]
    fn test_exports_entry_and_routes() {
        let source = synthesize(&registry_with(&["a"]), &AppLayout::default()).unwrap();
        assert!(source.contains("export { entry };"));
        assert!(source.contains("export const routes = ["));
    }

    #[test]
    fn test_custom_layout() {
        let layout = AppLayout {
            entry_point: String::from("server.jsx"),
            routes_dir: String::from("pages"),
        };
        let source = synthesize(&registry_with(&["a"]), &layout).unwrap();

        assert!(source.contains("from \"./server.jsx\""));
        assert!(source.contains("from \"./pages/a.jsx\""));
    }
}
