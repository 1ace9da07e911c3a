//! Invocation Request and Response Types
//!
//! Field names are PascalCase on the wire (`Handler`, `HandlerDir`, `Params`,
//! `ReturnOutput`, `Success`, `Result`, `Output`) to match what the platform
//! sends to and expects from the executor.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::error::{FexecError, Result};

/// A request to invoke one handler.
///
/// # Example
///
/// ```
/// use fexec_common::InvocationRequest;
/// use serde_json::json;
///
/// let request = InvocationRequest::new("isprime.handler", json!({"n": "17"}))
///     .with_handler_dir("/app")
///     .with_output();
/// assert!(request.return_output);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct InvocationRequest {
    /// Handler reference in `module.function` form
    pub handler: String,
    /// Directory added to the handler search path before resolution
    #[serde(default)]
    pub handler_dir: PathBuf,
    /// Caller-defined parameters, an empty mapping when omitted
    #[serde(default = "empty_params", deserialize_with = "null_as_empty")]
    pub params: Value,
    /// Whether the diagnostic output of the call is returned
    #[serde(default)]
    pub return_output: bool,
    /// Correlation id echoed in the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

fn empty_params() -> Value {
    Value::Object(Default::default())
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Value, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(if value.is_null() { empty_params() } else { value })
}

impl InvocationRequest {
    pub fn new(handler: impl Into<String>, params: Value) -> Self {
        Self {
            handler: handler.into(),
            handler_dir: PathBuf::new(),
            params,
            return_output: false,
            id: None,
        }
    }

    pub fn with_handler_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.handler_dir = dir.into();
        self
    }

    pub fn with_output(mut self) -> Self {
        self.return_output = true;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Parses the handler string into module and function.
    pub fn reference(&self) -> Result<HandlerReference> {
        self.handler.parse()
    }
}

/// A handler reference split at its last `.` into module and function.
///
/// The module part may itself contain dots (`pkg.sub.handler` names function
/// `handler` in module `pkg.sub`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerReference {
    pub module: String,
    pub function: String,
}

impl HandlerReference {
    pub fn new(module: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            function: function.into(),
        }
    }
}

impl FromStr for HandlerReference {
    type Err = FexecError;

    fn from_str(reference: &str) -> Result<Self> {
        let (module, function) = reference.rsplit_once('.').ok_or_else(|| {
            FexecError::Load(format!(
                "Handler reference '{}' is not in module.function form",
                reference
            ))
        })?;

        if module.is_empty() {
            return Err(FexecError::Load(format!(
                "Handler reference '{}' has an empty module name",
                reference
            )));
        }
        if function.is_empty() {
            return Err(FexecError::Load(format!(
                "Handler reference '{}' has an empty function name",
                reference
            )));
        }

        Ok(Self::new(module, function))
    }
}

impl fmt::Display for HandlerReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.function)
    }
}

/// The reply for one invocation.
///
/// `Result` carries the JSON text of the handler's return value and is only
/// present on success. `Output` is only present when the request asked for
/// it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct InvocationResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Handler run time in seconds
    #[serde(default)]
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl InvocationResponse {
    /// Creates a successful response, serializing `result` into the
    /// `Result` field.
    ///
    /// # Example
    ///
    /// ```
    /// use fexec_common::InvocationResponse;
    /// use serde_json::json;
    ///
    /// let response = InvocationResponse::success(None, &json!({"IsPrime": true})).unwrap();
    /// assert_eq!(response.result.as_deref(), Some(r#"{"IsPrime":true}"#));
    /// ```
    pub fn success(id: Option<String>, result: &Value) -> Result<Self> {
        Ok(Self {
            success: true,
            result: Some(serde_json::to_string(result)?),
            output: None,
            duration: 0.0,
            id,
        })
    }

    /// Creates a failed response. Failures never carry a `Result`.
    pub fn failure(id: Option<String>) -> Self {
        Self {
            success: false,
            result: None,
            output: None,
            duration: 0.0,
            id,
        }
    }

    pub fn with_output(mut self, output: Option<String>) -> Self {
        self.output = output;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration.as_secs_f64();
        self
    }

    /// Decodes `Result` back into the value the handler returned.
    pub fn result_value(&self) -> Result<Option<Value>> {
        self.result
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(FexecError::from)
    }
}
