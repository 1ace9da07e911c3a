//! Built-in handler modules.

use serde_json::{json, Value};
use std::io::Write;

use super::{HandlerError, Module};

/// The `isprime` module.
///
/// `isprime.handler` takes `{"n": <integer or integer string>}` and returns
/// `{"IsPrime": bool}`. It writes one line of diagnostic output per call.
pub fn isprime() -> Module {
    Module::new("isprime").with_function("handler", is_prime_handler)
}

fn is_prime_handler(params: &Value, _context: &Value) -> Result<Value, HandlerError> {
    let n = match &params["n"] {
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| format!("invalid n '{}': {}", s, e))?,
        Value::Number(n) => n.as_i64().ok_or_else(|| format!("n is not an integer: {}", n))?,
        Value::Null => return Err("missing parameter 'n'".into()),
        other => return Err(format!("invalid n: {}", other).into()),
    };

    writeln!(std::io::stdout(), "Checking n = {}", n)?;
    Ok(json!({ "IsPrime": is_prime(n) }))
}

fn is_prime(n: i64) -> bool {
    if n < 2 {
        return false;
    }
    let mut i = 2;
    while i <= n / i {
        if n % i == 0 {
            return false;
        }
        i += 1;
    }
    true
}
