//! Executor
//!
//! Runs one invocation end to end: resolve the handler, call it with the
//! request parameters and the process-wide context, optionally capture its
//! output, and shape the [`InvocationResponse`].
//!
//! Handler calls are blocking and run on tokio's blocking pool. There is no
//! execution timeout: a handler that never returns keeps its blocking thread
//! and its caller's connection for good.

use fexec_common::protocol::error::FexecError;
use fexec_common::{InvocationRequest, InvocationResponse};
use serde_json::Value;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::capture;
use crate::registry::{Handler, HandlerRegistry};

/// Result of one call plus whatever output was collected.
struct Execution {
    result: Result<Value, FexecError>,
    output: Option<String>,
    /// Time spent in the handler, zero if it never ran
    elapsed: Duration,
}

#[derive(Clone)]
pub struct Executor {
    registry: Arc<HandlerRegistry>,
    context: Arc<Value>,
}

impl Executor {
    pub fn new(registry: Arc<HandlerRegistry>, context: Value) -> Self {
        Self {
            registry,
            context: Arc::new(context),
        }
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Context passed unchanged to every handler.
    pub fn context(&self) -> &Value {
        &self.context
    }

    /// Runs `request` on the blocking pool.
    ///
    /// Never fails: load and execution errors are logged and reported as
    /// `Success: false`.
    pub async fn invoke(&self, request: InvocationRequest) -> InvocationResponse {
        let id = request.id.clone();
        let return_output = request.return_output;
        let handler = request.handler.clone();
        let executor = self.clone();

        match tokio::task::spawn_blocking(move || executor.invoke_blocking(&request)).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Invocation of {} aborted: {}", handler, e);
                InvocationResponse::failure(id).with_output(return_output.then(String::new))
            }
        }
    }

    /// Runs `request` on the current thread.
    pub fn invoke_blocking(&self, request: &InvocationRequest) -> InvocationResponse {
        let Execution { result, output, elapsed } = self.execute(request);

        let response = result.and_then(|value| {
            InvocationResponse::success(request.id.clone(), &value).map_err(|e| {
                FexecError::Execution(format!("Handler returned an unserializable value: {}", e))
            })
        });

        match response {
            Ok(response) => {
                tracing::debug!("{} finished in {:?}", request.handler, elapsed);
                response.with_output(output).with_duration(elapsed)
            }
            Err(e) => {
                tracing::error!("Invocation of {} failed: {}", request.handler, e);
                InvocationResponse::failure(request.id.clone())
                    .with_output(output)
                    .with_duration(elapsed)
            }
        }
    }

    fn execute(&self, request: &InvocationRequest) -> Execution {
        let not_run = || request.return_output.then(String::new);

        // Loading a module may write to the standard streams, so it is kept
        // out of any running capture as well.
        let resolved = capture::passthrough(|| {
            request
                .reference()
                .and_then(|reference| self.registry.resolve(&reference, &request.handler_dir))
        });
        let handler = match resolved {
            Ok(handler) => handler,
            Err(e) => {
                return Execution {
                    result: Err(e),
                    output: not_run(),
                    elapsed: Duration::ZERO,
                }
            }
        };

        let timed_call = || {
            let started = Instant::now();
            let result = self.call(&handler, &request.params);
            (result, started.elapsed())
        };

        if !request.return_output {
            let (result, elapsed) = capture::passthrough(timed_call);
            return Execution {
                result,
                output: None,
                elapsed,
            };
        }

        match capture::capture(timed_call) {
            Ok(((result, elapsed), captured)) => Execution {
                result,
                output: Some(captured.combined()),
                elapsed,
            },
            Err(e) => Execution {
                result: Err(FexecError::Execution(format!("Output capture failed: {}", e))),
                output: not_run(),
                elapsed: Duration::ZERO,
            },
        }
    }

    /// Calls the handler, turning errors and panics into [`FexecError::Execution`].
    fn call(&self, handler: &Handler, params: &Value) -> Result<Value, FexecError> {
        match panic::catch_unwind(AssertUnwindSafe(|| handler(params, self.context()))) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(FexecError::Execution(e.to_string())),
            Err(payload) => Err(FexecError::Execution(format!(
                "handler panicked: {}",
                panic_message(payload.as_ref())
            ))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
