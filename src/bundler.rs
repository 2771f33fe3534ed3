//! Bundler adapter: compiles the virtual entry module into one script.
//!
//! The bundler itself is a black box behind the [`Bundler`] trait; the
//! shipped implementation shells out to the esbuild binary. The virtual
//! entry is piped over stdin (so it never touches disk) with the process cwd
//! set to the app directory, which is how esbuild resolves the entry's
//! relative imports. On failure the first diagnostic is parsed out of
//! esbuild's stderr and any partially written outfile is removed, so a
//! failed build can never leave a stale bundle behind.

use crate::error::{Error, Result};
use crate::sandbox;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

/// One build: the synthesized entry plus where to resolve and emit.
#[derive(Debug)]
pub struct BuildRequest<'a> {
    /// Virtual entry module source (in-memory only).
    pub entry_source: &'a str,
    /// Synthetic name the entry is labelled with in diagnostics.
    pub entry_name: &'a str,
    /// Directory the entry's relative imports resolve against.
    pub app_dir: &'a Path,
    /// Where the compiled bundle is written.
    pub outfile: &'a Path,
}

/// Compile options. The defaults are the only configuration the sandbox's
/// loader convention supports; they are exposed mainly so tests can point at
/// a different esbuild binary.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub esbuild_path: PathBuf,
    /// Output module format. The sandbox executes the bundle as a classic
    /// script with a global `module` placeholder, so this must stay `cjs`.
    pub format: String,
    pub platform: String,
    pub tree_shaking: bool,
    /// Host modules the sandbox shims instead of letting esbuild inline.
    pub externals: Vec<String>,
    /// Extensions the bundler may resolve page imports through.
    pub resolve_extensions: Vec<String>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            esbuild_path: PathBuf::from("esbuild"),
            format: String::from("cjs"),
            platform: String::from("neutral"),
            tree_shaking: true,
            externals: sandbox::HOST_MODULES.iter().map(|m| m.to_string()).collect(),
            resolve_extensions: [".js", ".jsx", ".ts", ".tsx"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }
}

/// A successfully compiled bundle. The source is held in memory behind an
/// `Arc` so concurrent renders share it without locking; the outfile is the
/// durable copy.
#[derive(Debug, Clone)]
pub struct CompiledBundle {
    pub source: Arc<str>,
    pub outfile: PathBuf,
}

/// Black-box bundling service: one virtual entry in, one script (or the
/// first diagnostic) out.
pub trait Bundler {
    fn build(&self, request: &BuildRequest<'_>) -> Result<CompiledBundle>;
}

/// Bundler implementation driving the esbuild CLI.
#[derive(Debug, Default)]
pub struct EsbuildCli {
    options: BuildOptions,
}

impl EsbuildCli {
    pub fn new(options: BuildOptions) -> Self {
        Self { options }
    }
}

impl Bundler for EsbuildCli {
    fn build(&self, request: &BuildRequest<'_>) -> Result<CompiledBundle> {
        let opts = &self.options;

        // The child runs with cwd = app dir, which would reinterpret a
        // relative outfile. Resolve it against the host cwd up front and use
        // the absolute path on both sides of the subprocess boundary.
        let outfile = std::path::absolute(request.outfile)?;

        let mut cmd = Command::new(&opts.esbuild_path);
        cmd.arg("--bundle")
            .arg(format!("--format={}", opts.format))
            .arg(format!("--platform={}", opts.platform))
            .arg("--main-fields=module,main")
            .arg(format!("--tree-shaking={}", opts.tree_shaking))
            // stdin carries the virtual entry; the loader and sourcefile
            // flags apply to it.
            .arg("--loader=jsx")
            .arg(format!("--sourcefile={}", request.entry_name))
            .arg(format!(
                "--resolve-extensions={}",
                opts.resolve_extensions.join(",")
            ))
            .arg(format!("--outfile={}", outfile.display()));
        for external in &opts.externals {
            cmd.arg(format!("--external:{}", external));
        }
        cmd.current_dir(request.app_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn()?;
        if let Some(stdin) = child.stdin.as_mut() {
            stdin.write_all(request.entry_source.as_bytes())?;
        }
        let output = child.wait_with_output()?;

        if !output.status.success() {
            // No partially written bundle may survive a failed build.
            let _ = std::fs::remove_file(&outfile);
            let stderr = String::from_utf8_lossy(&output.stderr);
            let (message, file, line) = parse_first_diagnostic(&stderr, request.entry_name);
            return Err(Error::Build {
                message,
                file,
                line,
            });
        }

        let source = std::fs::read_to_string(&outfile)?;
        Ok(CompiledBundle {
            source: Arc::from(source.as_str()),
            outfile,
        })
    }
}

/// Extract the first `[ERROR]` diagnostic from esbuild's stderr text,
/// including the `file:line:col:` location printed underneath it. Falls back
/// to the synthetic entry name when esbuild reports no location.
fn parse_first_diagnostic(stderr: &str, fallback_file: &str) -> (String, String, u32) {
    let mut lines = stderr.lines();
    let message = loop {
        match lines.next() {
            Some(line) => {
                if let Some(idx) = line.find("[ERROR]") {
                    break line[idx + "[ERROR]".len()..].trim().to_string();
                }
            }
            None => {
                return (
                    stderr.trim().to_string(),
                    fallback_file.to_string(),
                    0,
                );
            }
        }
    };

    // Location line follows the message, e.g. "    nexus-entry.jsx:2:30:"
    for line in lines {
        if let Some((file, line_no)) = parse_location(line.trim()) {
            return (message, file, line_no);
        }
        // Stop at the next diagnostic; only the first one is reported.
        if line.contains("[ERROR]") || line.contains("[WARNING]") {
            break;
        }
    }
    (message, fallback_file.to_string(), 0)
}

/// Parse a `file:line:col:` location line.
fn parse_location(line: &str) -> Option<(String, u32)> {
    let trimmed = line.strip_suffix(':')?;
    let mut parts = trimmed.rsplitn(3, ':');
    let _col: u32 = parts.next()?.parse().ok()?;
    let line_no: u32 = parts.next()?.parse().ok()?;
    let file = parts.next()?;
    if file.is_empty() {
        return None;
    }
    Some((file.to_string(), line_no))
}
