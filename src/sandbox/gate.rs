//! Security gate run before every operation invocation.
//!
//! The gate screens the full argument object against the operation's
//! declared parameters:
//!
//! - `Path` arguments: every string inside is checked, separator or not
//! - `Url` arguments: `file://` URLs are checked by the path they name
//! - everything else: any string containing a path separator is checked
//!   as written, whatever the declared kind
//!
//! Relative strings resolve under the root, so SQL such as `SELECT a/b`
//! or a date like `2024/01/01` passes while `/etc/passwd` in a commit
//! message does not.
//!
//! A rejection happens before the handler body runs, so a rejected call has
//! no side effects.

use std::borrow::Cow;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use super::{Sandbox, SandboxError};
use crate::operations::{ArgKind, Parameter};

#[derive(Debug, Error)]
#[error("access denied: argument '{argument}' of '{operation}' is not inside the sandbox: {source}")]
pub struct Violation {
    pub operation: String,
    pub argument: String,
    pub value: String,
    #[source]
    pub source: SandboxError,
}

/// Checks every path-bearing argument; the first failure wins.
pub fn screen(
    sandbox: &Sandbox,
    operation: &str,
    parameters: &[Parameter],
    args: &Map<String, Value>,
) -> Result<(), Violation> {
    for (name, value) in args {
        let kind = parameters
            .iter()
            .find(|p| p.name == name.as_str())
            .map(|p| p.kind);

        let mut strings = Vec::new();
        collect_strings(value, &mut strings);

        for s in strings {
            let Some(target) = path_target(kind, s) else {
                continue;
            };
            if let Err(source) = sandbox.check(&target) {
                warn!("Rejected {operation}: argument '{name}' = '{s}' ({source})");
                return Err(Violation {
                    operation: operation.to_string(),
                    argument: name.clone(),
                    value: s.to_string(),
                    source,
                });
            }
        }
    }
    Ok(())
}

/// The path that must be checked for a string argument, if any.
fn path_target(kind: Option<ArgKind>, s: &str) -> Option<Cow<'_, str>> {
    match kind {
        Some(ArgKind::Path) => Some(Cow::Borrowed(s)),
        Some(ArgKind::Url) => match url::Url::parse(s) {
            Ok(url) if url.scheme() == "file" => match url.to_file_path() {
                Ok(path) => Some(Cow::Owned(path.to_string_lossy().into_owned())),
                // Unrepresentable file URL: check the raw string (fails closed)
                Err(()) => Some(Cow::Borrowed(s)),
            },
            _ => has_separator(s).then_some(Cow::Borrowed(s)),
        },
        Some(ArgKind::Text | ArgKind::Integer | ArgKind::Json) | None => {
            has_separator(s).then_some(Cow::Borrowed(s))
        }
    }
}

fn has_separator(s: &str) -> bool {
    s.contains('/') || s.contains(std::path::MAIN_SEPARATOR)
}

fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}
