//! Task dispatcher: the core of the agent.
//!
//! Maps a task description to exactly one registered operation, runs it
//! through the security gate, and normalizes the outcome into a
//! [`ResultEnvelope`]. Every failure (gate rejection, unknown task, bad
//! arguments, handler error, unimplemented handler) becomes an error
//! envelope; nothing escapes to the caller.

pub mod extract;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::operations::registry::{OperationRegistry, OperationSpec};
use crate::operations::{OperationContext, OperationError};
use crate::sandbox::gate::{self, Violation};
use crate::sandbox::Sandbox;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SandboxViolation,
    UnrecognizedTask,
    UnknownOperation,
    InvalidArguments,
    NotImplemented,
    HandlerFailure,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    SandboxViolation(#[from] Violation),

    #[error("task not recognized")]
    UnrecognizedTask,

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("invalid arguments for '{operation}': {reason}")]
    InvalidArguments { operation: String, reason: String },

    #[error("'{operation}' is not implemented: {reason}")]
    NotImplemented { operation: String, reason: String },

    #[error("'{operation}' failed: {message}")]
    HandlerFailure { operation: String, message: String },
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SandboxViolation(_) => ErrorKind::SandboxViolation,
            Self::UnrecognizedTask => ErrorKind::UnrecognizedTask,
            Self::UnknownOperation(_) => ErrorKind::UnknownOperation,
            Self::InvalidArguments { .. } => ErrorKind::InvalidArguments,
            Self::NotImplemented { .. } => ErrorKind::NotImplemented,
            Self::HandlerFailure { .. } => ErrorKind::HandlerFailure,
        }
    }

    fn from_operation(operation: &str, err: OperationError) -> Self {
        match err {
            OperationError::InvalidArguments(reason) => Self::InvalidArguments {
                operation: operation.to_string(),
                reason,
            },
            OperationError::NotImplemented(reason) => Self::NotImplemented {
                operation: operation.to_string(),
                reason,
            },
            OperationError::Failed(e) => Self::HandlerFailure {
                operation: operation.to_string(),
                // Include the whole context chain ("reading x: No such file")
                message: format!("{e:#}"),
            },
        }
    }
}

/// Uniform result of one dispatch.
///
/// Serializes as `{"status":"success","result":...}` (result omitted when
/// the operation reports nothing) or
/// `{"status":"error","kind":"...","error":"..."}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ResultEnvelope {
    Success {
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
    Error {
        kind: ErrorKind,
        error: String,
    },
}

impl ResultEnvelope {
    fn success(value: Value) -> Self {
        Self::Success {
            result: (!value.is_null()).then_some(value),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Success { .. } => None,
            Self::Error { kind, .. } => Some(*kind),
        }
    }

    pub fn result(&self) -> Option<&Value> {
        match self {
            Self::Success { result } => result.as_ref(),
            Self::Error { .. } => None,
        }
    }
}

impl From<Result<Value, DispatchError>> for ResultEnvelope {
    fn from(outcome: Result<Value, DispatchError>) -> Self {
        match outcome {
            Ok(value) => Self::success(value),
            Err(e) => Self::Error {
                kind: e.kind(),
                error: e.to_string(),
            },
        }
    }
}

/// Stateless dispatcher over an immutable registry and sandbox.
///
/// Cheap to clone; concurrent dispatches share nothing mutable.
#[derive(Clone)]
pub struct TaskDispatcher {
    registry: Arc<OperationRegistry>,
    context: OperationContext,
}

impl TaskDispatcher {
    pub fn new(registry: Arc<OperationRegistry>, sandbox: Arc<Sandbox>) -> Self {
        Self {
            registry,
            context: OperationContext::new(sandbox),
        }
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.context.sandbox
    }

    /// Resolves a task description and runs the matching operation.
    pub async fn dispatch(&self, description: &str) -> ResultEnvelope {
        self.try_dispatch(description).await.into()
    }

    /// Runs a registered operation by name with explicit arguments.
    pub async fn invoke(&self, name: &str, args: Value) -> ResultEnvelope {
        self.try_invoke(name, args).await.into()
    }

    pub async fn try_dispatch(&self, description: &str) -> Result<Value, DispatchError> {
        let description = description.trim();

        let Some(spec) = self.registry.resolve(description) else {
            info!("No operation matches task: {description:?}");
            return Err(DispatchError::UnrecognizedTask);
        };

        let args = match spec.extractor {
            Some(ref extract) => {
                extract(description).map_err(|reason| DispatchError::InvalidArguments {
                    operation: spec.name().to_string(),
                    reason,
                })?
            }
            None => return Err(DispatchError::UnrecognizedTask),
        };

        debug!("Task resolved to {} with arguments {args}", spec.name());
        self.run(spec, args).await
    }

    pub async fn try_invoke(&self, name: &str, args: Value) -> Result<Value, DispatchError> {
        let spec = self
            .registry
            .get(name)
            .ok_or_else(|| DispatchError::UnknownOperation(name.to_string()))?;
        self.run(spec, args).await
    }

    /// Single entry point to `Operation::execute`: gate, validate, run.
    async fn run(&self, spec: &OperationSpec, args: Value) -> Result<Value, DispatchError> {
        let name = spec.name();
        let request_id = Uuid::new_v4();

        let Value::Object(ref map) = args else {
            return Err(DispatchError::InvalidArguments {
                operation: name.to_string(),
                reason: format!("arguments must be a JSON object, got {args}"),
            });
        };

        let parameters = spec.handler.parameters();
        gate::screen(&self.context.sandbox, name, parameters, map)?;

        if let Some(missing) = parameters
            .iter()
            .find(|p| p.required && map.get(p.name).map_or(true, Value::is_null))
        {
            return Err(DispatchError::InvalidArguments {
                operation: name.to_string(),
                reason: format!("missing required parameter: {}", missing.name),
            });
        }

        info!("[{request_id}] Running {name}");
        let outcome = spec.handler.execute(args, &self.context).await;

        match outcome {
            Ok(value) => {
                info!("[{request_id}] {name} succeeded");
                Ok(value)
            }
            Err(e) => {
                let err = DispatchError::from_operation(name, e);
                warn!("[{request_id}] {err}");
                Err(err)
            }
        }
    }
}
