//! Sandbox builder - constructs the restricted execution context a bundle
//! runs in.
//!
//! Each render gets a fresh V8 isolate with a fixed global surface installed
//! by `prelude.js`:
//! - `require` resolving only the shimmed host modules (see [`HOST_MODULES`]);
//!   anything else throws an unsupported-capability error
//! - `module` / `exports` placeholders for CJS-format bundles
//! - `process.env` as an empty object
//! - a `Response` class storing its body argument
//! - `console.log/warn/error` captured into host state, never printed
//!
//! No fs, net, env, timers, or other system access exists in the context.

use crate::error::{Error, Result};
use crate::executor::ExecOptions;
use deno_core::{op2, JsRuntime, OpState, RuntimeOptions};

/// Host module names the bundler externalizes and the prelude shims. The
/// bundler's default externals list is derived from this so the two sides of
/// the contract cannot drift apart.
pub const HOST_MODULES: &[&str] = &["stream", "util"];

/// Shim surface executed into every fresh context before the bundle.
const PRELUDE: &str = include_str!("prelude.js");

/// Captured console output from the sandboxed context
#[derive(Debug, Default, Clone)]
pub struct ConsoleOutput {
    pub logs: Vec<String>,
    pub warns: Vec<String>,
    pub errors: Vec<String>,
}

#[op2(fast)]
fn op_console_log(state: &mut OpState, #[string] msg: &str) {
    if let Some(output) = state.try_borrow_mut::<ConsoleOutput>() {
        output.logs.push(msg.to_string());
    }
}

#[op2(fast)]
fn op_console_warn(state: &mut OpState, #[string] msg: &str) {
    if let Some(output) = state.try_borrow_mut::<ConsoleOutput>() {
        output.warns.push(msg.to_string());
    }
}

#[op2(fast)]
fn op_console_error(state: &mut OpState, #[string] msg: &str) {
    if let Some(output) = state.try_borrow_mut::<ConsoleOutput>() {
        output.errors.push(msg.to_string());
    }
}

deno_core::extension!(
    nexus_sandbox,
    ops = [op_console_log, op_console_warn, op_console_error],
);

/// Build a fresh, isolated execution context with the shim surface installed.
///
/// The global template is rebuilt from scratch on every call; nothing leaks
/// between contexts built here.
pub fn create_context(opts: &ExecOptions) -> Result<JsRuntime> {
    let create_params = opts
        .max_heap_size
        .map(|max_bytes| deno_core::v8::Isolate::create_params().heap_limits(0, max_bytes));

    let mut runtime = JsRuntime::new(RuntimeOptions {
        extensions: vec![nexus_sandbox::init_ops()],
        create_params,
        ..Default::default()
    });

    if opts.max_heap_size.is_some() {
        runtime.add_near_heap_limit_callback(|current, initial| {
            // Don't raise the limit - let V8 terminate with an OOM error
            // instead of aborting the process.
            eprintln!(
                "[nexus-ssr] Near heap limit: current={}MB, initial={}MB",
                current / (1024 * 1024),
                initial / (1024 * 1024)
            );
            current
        });
    }

    runtime.op_state().borrow_mut().put(ConsoleOutput::default());

    runtime
        .execute_script("<nexus-prelude>", PRELUDE)
        .map_err(|e| Error::SandboxSetup(e.to_string()))?;

    Ok(runtime)
}

/// Drain the console output captured so far in a context.
pub fn take_console(runtime: &mut JsRuntime) -> ConsoleOutput {
    runtime
        .op_state()
        .borrow_mut()
        .try_take::<ConsoleOutput>()
        .unwrap_or_default()
}
