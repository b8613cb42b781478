pub mod builtin;
pub mod registry;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::sandbox::Sandbox;

/// Declared type of an argument. Strings of any kind are checked by the
/// security gate when they contain a path separator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgKind {
    /// Filesystem path; every string value is checked against the sandbox.
    Path,
    /// URL; `file://` URLs are checked by the path they name.
    Url,
    /// Free text (SQL, commit messages, weekday names).
    Text,
    Integer,
    /// Structured value (filter rules, size pairs).
    Json,
}

/// A declared argument of an operation.
#[derive(Debug, Clone, Serialize)]
pub struct Parameter {
    pub name: &'static str,
    pub kind: ArgKind,
    pub required: bool,
}

impl Parameter {
    pub const fn required(name: &'static str, kind: ArgKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: ArgKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum OperationError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The operation exists in the catalogue but has no working backend.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Runtime context passed to operation execution.
///
/// Gives handlers the sandbox so they can map argument strings onto the
/// filesystem. Handlers never check paths themselves: every argument has
/// already been screened by the gate before `execute` is called.
#[derive(Clone)]
pub struct OperationContext {
    pub sandbox: Arc<Sandbox>,
}

impl OperationContext {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }

    /// Filesystem location designated by a (screened) path argument.
    pub fn path(&self, arg: &str) -> PathBuf {
        self.sandbox.resolve(arg)
    }
}

/// A file/data operation the dispatcher can run.
///
/// All operations (builtin or test doubles) implement this trait.
/// `execute()` is only ever reached through `TaskDispatcher::invoke`,
/// which screens the arguments first.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Unique identifier, lowercase with underscores (e.g. "csv_filter").
    fn name(&self) -> &str;

    /// Human-readable summary shown by `GET /operations`.
    fn description(&self) -> &str;

    /// Declared argument shape. Drives both the gate and required-argument
    /// validation.
    fn parameters(&self) -> &[Parameter];

    /// Run the operation. `Value::Null` means "success, nothing to report".
    async fn execute(&self, args: Value, context: &OperationContext)
        -> Result<Value, OperationError>;
}

// ── Argument accessors ───────────────────────────────────

/// Required string argument.
pub fn str_arg<'a>(args: &'a Value, name: &str) -> Result<&'a str, OperationError> {
    args[name].as_str().ok_or_else(|| {
        OperationError::InvalidArguments(format!("missing required string parameter: {name}"))
    })
}

/// Optional string argument; `null` and absent are both `None`.
pub fn opt_str_arg<'a>(args: &'a Value, name: &str) -> Result<Option<&'a str>, OperationError> {
    match &args[name] {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        other => Err(OperationError::InvalidArguments(format!(
            "parameter {name} must be a string, got {other}"
        ))),
    }
}

/// Optional non-negative integer argument.
pub fn opt_u64_arg(args: &Value, name: &str) -> Result<Option<u64>, OperationError> {
    match &args[name] {
        Value::Null => Ok(None),
        value => value.as_u64().map(Some).ok_or_else(|| {
            OperationError::InvalidArguments(format!(
                "parameter {name} must be a non-negative integer, got {value}"
            ))
        }),
    }
}

/// Runs blocking handler code off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, OperationError>
where
    F: FnOnce() -> Result<T, OperationError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| OperationError::Failed(anyhow::anyhow!("worker task failed: {e}")))?
}

/// Creates the parent directory of an output file.
pub(crate) fn ensure_parent(path: &std::path::Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
