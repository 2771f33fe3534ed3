//! Execution & marshalling pipeline - runs the compiled bundle in a fresh
//! sandbox context and extracts the rendered body.
//!
//! Stages, each with its own error kind:
//! 1. context: build a fresh isolate with the shim surface (SandboxSetup)
//! 2. load: run the bundle source exactly once; its CJS exports land on the
//!    global `module.exports` as `entry` and `routes` (Evaluation)
//! 3. inject: serialize the page data, bind it as a global transport string,
//!    parse it back into an engine value inside the context (Marshal)
//! 4. invoke: call the entry module's default render function with the
//!    routing table, the parsed props and a request stub (Evaluation)
//! 5. extract: read the `body` string off the returned Response-like object
//!    (Evaluation)
//!
//! Renders are independent and stateless given a valid bundle: there is no
//! retry and no state shared between contexts.

use crate::error::{Error, Result};
use crate::marshal;
use crate::sandbox;
use deno_core::{v8, JsRuntime, PollEventLoopOptions};

/// Per-render execution limits.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Maximum heap size in bytes (default: 64MB, None = unlimited)
    pub max_heap_size: Option<usize>,
    /// Maximum time for a single render in milliseconds (default: 30000ms, None = unlimited)
    pub timeout_ms: Option<u64>,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            max_heap_size: Some(64 * 1024 * 1024),
            timeout_ms: Some(30_000),
        }
    }
}

/// Result of one render.
#[derive(Debug)]
pub struct RenderOutput {
    pub body: String,
    pub console: sandbox::ConsoleOutput,
}

/// Global binding the transport string is injected under.
const DATA_BINDING: &str = "__nexus_data__";

/// Render `data` through the compiled bundle for the given request url.
pub async fn render(
    bundle: &str,
    url: &str,
    data: &serde_json::Value,
    opts: &ExecOptions,
) -> Result<RenderOutput> {
    match opts.timeout_ms {
        Some(ms) => {
            let mut runtime = sandbox::create_context(opts)?;
            let isolate_handle = runtime.v8_isolate().thread_safe_handle();

            // Race the render against a wall-clock deadline; on timeout the
            // isolate is terminated, not force-killed mid-instruction.
            let timeout_handle = tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
                isolate_handle.terminate_execution();
            });

            let result = render_in(&mut runtime, bundle, url, data).await;
            timeout_handle.abort();

            match &result {
                Err(e) => {
                    let msg = e.to_string();
                    if msg.contains("terminated") || msg.contains("unresolved promise") {
                        Err(Error::Evaluation {
                            stage: "timeout",
                            message: format!("render timed out after {}ms", ms),
                        })
                    } else {
                        result
                    }
                }
                _ => result,
            }
        }
        None => {
            let mut runtime = sandbox::create_context(opts)?;
            render_in(&mut runtime, bundle, url, data).await
        }
    }
}

async fn render_in(
    runtime: &mut JsRuntime,
    bundle: &str,
    url: &str,
    data: &serde_json::Value,
) -> Result<RenderOutput> {
    // Stage: load. Executed exactly once per context.
    runtime
        .execute_script("<nexus-bundle>", bundle.to_string())
        .map_err(|e| Error::Evaluation {
            stage: "load",
            message: e.to_string(),
        })?;

    // Stage: inject. Host side serializes, sandbox side parses.
    let transport = marshal::to_transport(data)?;
    bind_global_string(runtime, DATA_BINDING, &transport)?;
    runtime
        .execute_script(
            "<nexus-inject>",
            format!(
                "globalThis.__nexus_props__ = JSON.parse(globalThis.{});",
                DATA_BINDING
            ),
        )
        .map_err(|e| Error::Marshal {
            stage: "parse",
            message: e.to_string(),
        })?;

    // Stage: invoke. Fixed expression calling the entry's default export
    // with the routing table, the parsed props and a request-context stub.
    let invoke = format!(
        "module.exports.entry.default(\
         {{ routes: module.exports.routes, props: globalThis.__nexus_props__ }}, \
         {{ url: {} }})",
        serde_json::Value::String(url.to_string())
    );
    let result = runtime
        .execute_script("<nexus-render>", invoke)
        .map_err(|e| Error::Evaluation {
            stage: "invoke",
            message: e.to_string(),
        })?;

    // Flush any microtasks/promises the render scheduled.
    runtime
        .run_event_loop(PollEventLoopOptions::default())
        .await
        .map_err(|e| Error::Evaluation {
            stage: "invoke",
            message: e.to_string(),
        })?;

    // Stage: extract.
    let body = {
        let scope = &mut runtime.handle_scope();
        let local = v8::Local::new(scope, &result);
        let value = resolve_value(scope, local)?;
        extract_body(scope, value)?
    };

    let console = sandbox::take_console(runtime);
    Ok(RenderOutput { body, console })
}

/// Inject a string as a named global binding through the handle scope.
fn bind_global_string(runtime: &mut JsRuntime, name: &str, value: &str) -> Result<()> {
    let scope = &mut runtime.handle_scope();
    let context = scope.get_current_context();
    let global = context.global(scope);

    let key = v8::String::new(scope, name).ok_or_else(|| Error::Marshal {
        stage: "inject",
        message: format!("failed to allocate binding name '{}'", name),
    })?;
    let val = v8::String::new(scope, value).ok_or_else(|| Error::Marshal {
        stage: "inject",
        message: String::from("transport string exceeds engine limits"),
    })?;
    if global.set(scope, key.into(), val.into()).is_none() {
        return Err(Error::Marshal {
            stage: "inject",
            message: format!("failed to set global binding '{}'", name),
        });
    }
    Ok(())
}

/// Unwrap a settled promise, or pass a plain value through.
fn resolve_value<'s>(
    scope: &mut v8::HandleScope<'s>,
    local: v8::Local<'s, v8::Value>,
) -> Result<v8::Local<'s, v8::Value>> {
    if let Ok(promise) = v8::Local::<v8::Promise>::try_from(local) {
        match promise.state() {
            v8::PromiseState::Fulfilled => Ok(promise.result(scope)),
            v8::PromiseState::Rejected => {
                let exception = promise.result(scope);
                Err(Error::Evaluation {
                    stage: "invoke",
                    message: exception.to_rust_string_lossy(scope),
                })
            }
            v8::PromiseState::Pending => Err(Error::Evaluation {
                stage: "invoke",
                message: String::from("render returned an unresolved promise"),
            }),
        }
    } else {
        Ok(local)
    }
}

/// Read the `body` string off the Response-like object the entry returned.
fn extract_body(scope: &mut v8::HandleScope<'_>, value: v8::Local<'_, v8::Value>) -> Result<String> {
    let object = v8::Local::<v8::Object>::try_from(value).map_err(|_| Error::Evaluation {
        stage: "extract",
        message: String::from("render must return a Response-like object"),
    })?;

    let key = v8::String::new(scope, "body").ok_or_else(|| Error::Evaluation {
        stage: "extract",
        message: String::from("failed to allocate property name"),
    })?;
    let body = object
        .get(scope, key.into())
        .ok_or_else(|| Error::Evaluation {
            stage: "extract",
            message: String::from("failed to read body property"),
        })?;

    if !body.is_string() {
        return Err(Error::Evaluation {
            stage: "extract",
            message: String::from("Response body must be a string"),
        });
    }
    Ok(body.to_rust_string_lossy(scope))
}
