//! Nexus SSR CLI
//!
//! Single-shot mode:
//!   nexus-ssr <app-dir> <route-path> [params-json]
//!
//! Server mode (persistent process, reads from stdin):
//!   nexus-ssr --server <app-dir>
//!
//! Pages are discovered from `.jsx` files anywhere under `<app-dir>/routes/`;
//! the `/`-joined path segments form the route path, and an `index.jsx` maps
//! to its directory's path (the top-level one to the empty path). Each page's
//! loader passes the request params through as page data.
//!
//! Protocol (server mode):
//!   Request (stdin):
//!     a/b
//!     {"id":42}
//!
//!   Response (stdout):
//!     Status:Ok
//!     Length:1234
//!
//!     <!DOCTYPE html>...
//!
//!   Error response:
//!     Status:Error
//!     Length:38
//!
//!     evaluation failed at invoke: boom

use anyhow::{anyhow, Result};
use nexus_ssr::{PageRegistry, RenderRequest, Renderer, RendererConfig};
use std::io::{BufRead, Write};
use std::path::Path;

fn print_usage() {
    eprintln!("Nexus SSR - sandboxed server-side page rendering");
    eprintln!();
    eprintln!("Single-shot mode:");
    eprintln!("  nexus-ssr <app-dir> <route-path> [params-json]");
    eprintln!();
    eprintln!("Server mode (persistent process):");
    eprintln!("  nexus-ssr --server <app-dir>");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  nexus-ssr ./app '' '{{\"counter\":0}}'");
    eprintln!("  nexus-ssr --server ./app");
}

/// Register one page per `.jsx` file under `routes/`, walking subdirectories
/// so nested routes like `a/b` register too. An `index.jsx` maps to its
/// directory's path (the top-level one to the empty path); a file and a
/// sibling directory index claiming the same path surface as a registration
/// error. Routes are sorted so the bundle is deterministic; loaders forward
/// request params as page data.
fn discover_pages(app_dir: &Path) -> Result<PageRegistry> {
    let routes_dir = app_dir.join("routes");
    let mut routes = Vec::new();
    collect_routes(&routes_dir, "", &mut routes)
        .map_err(|e| anyhow!("cannot read routes dir '{}': {}", routes_dir.display(), e))?;
    routes.sort();

    let mut registry = PageRegistry::new();
    for route in routes {
        registry.register(route, Box::new(|req| Ok(req.params.clone())))?;
    }
    if registry.is_empty() {
        return Err(anyhow!("no .jsx pages found in {}", routes_dir.display()));
    }
    Ok(registry)
}

fn collect_routes(dir: &Path, prefix: &str, out: &mut Vec<String>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => continue,
        };
        if path.is_dir() {
            let child_prefix = if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{}/{}", prefix, name)
            };
            collect_routes(&path, &child_prefix, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("jsx") {
            let stem = match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) => stem,
                None => continue,
            };
            let route = if stem == "index" {
                prefix.to_string()
            } else if prefix.is_empty() {
                stem.to_string()
            } else {
                format!("{}/{}", prefix, stem)
            };
            out.push(route);
        }
    }
    Ok(())
}

fn build_renderer(app_dir: &str) -> Result<Renderer> {
    let registry = discover_pages(Path::new(app_dir))?;
    let mut renderer = Renderer::new(registry, RendererConfig::new(app_dir));
    renderer.build()?;
    Ok(renderer)
}

fn log_console(console: &nexus_ssr::ConsoleOutput) {
    for log in &console.logs {
        eprintln!("[LOG] {}", log);
    }
    for warn in &console.warns {
        eprintln!("[WARN] {}", warn);
    }
    for err in &console.errors {
        eprintln!("[ERROR] {}", err);
    }
}

/// Run in single-shot mode: build, render one page, print the body.
async fn run_single_shot(app_dir: &str, route_path: &str, params_json: Option<&str>) -> Result<()> {
    let params: serde_json::Value = match params_json {
        Some(json) => {
            serde_json::from_str(json).map_err(|e| anyhow!("Invalid params JSON: {}", e))?
        }
        None => serde_json::json!({}),
    };

    let renderer = build_renderer(app_dir)?;
    let request = RenderRequest::new(route_path, params);
    let output = renderer.render(route_path, &request).await?;

    log_console(&output.console);
    println!("{}", output.body);
    Ok(())
}

/// Run in server mode: build once, then serve render requests from stdin.
/// Per-request failures are reported to the caller; only startup/build
/// failures are fatal.
async fn run_server(app_dir: &str) -> Result<()> {
    let renderer = build_renderer(app_dir)?;

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let mut reader = stdin.lock();

    eprintln!("[nexus-ssr] Server ready, reading from stdin...");

    loop {
        let mut path_line = String::new();
        let mut params_line = String::new();

        let bytes_read = reader.read_line(&mut path_line)?;
        if bytes_read == 0 {
            // EOF - stdin closed, exit gracefully
            break;
        }
        reader.read_line(&mut params_line)?;

        let route_path = path_line.trim();
        let params_str = params_line.trim();

        let params: serde_json::Value = if params_str.is_empty() {
            serde_json::json!({})
        } else {
            match serde_json::from_str(params_str) {
                Ok(p) => p,
                Err(e) => {
                    write_response(&mut stdout, false, &format!("Invalid params JSON: {}", e))?;
                    continue;
                }
            }
        };

        let request = RenderRequest::new(route_path, params);
        match renderer.render(route_path, &request).await {
            Ok(output) => {
                log_console(&output.console);
                write_response(&mut stdout, true, &output.body)?;
            }
            Err(e) => {
                write_response(&mut stdout, false, &e.to_string())?;
            }
        }
    }

    eprintln!("[nexus-ssr] Server shutting down");
    Ok(())
}

/// Write response in length-prefixed protocol
fn write_response(stdout: &mut std::io::Stdout, ok: bool, body: &str) -> Result<()> {
    let status = if ok { "Ok" } else { "Error" };

    writeln!(stdout, "Status:{}", status)?;
    writeln!(stdout, "Length:{}", body.len())?;
    writeln!(stdout)?; // Empty line separator
    write!(stdout, "{}", body)?;
    stdout.flush()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        return Err(anyhow!("Missing required arguments"));
    }

    if args[1] == "--server" {
        if args.len() < 3 {
            print_usage();
            return Err(anyhow!("Server mode requires app-dir argument"));
        }
        return run_server(&args[2]).await;
    }

    if args.len() < 3 {
        print_usage();
        return Err(anyhow!("Missing required arguments"));
    }

    let app_dir = &args[1];
    let route_path = &args[2];
    let params_json = args.get(3).map(|s| s.as_str());

    run_single_shot(app_dir, route_path, params_json).await
}
