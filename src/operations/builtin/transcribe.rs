//! Builtin operation: audio transcription.
//!
//! Listed so callers can discover it, but there is no speech-to-text
//! backend: every call reports `NotImplemented`.

use async_trait::async_trait;
use serde_json::Value;

use crate::operations::{ArgKind, Operation, OperationContext, OperationError, Parameter};

const PARAMETERS: &[Parameter] = &[
    Parameter::required("audio_path", ArgKind::Path),
    Parameter::required("output_path", ArgKind::Path),
];

pub struct TranscribeOperation;

#[async_trait]
impl Operation for TranscribeOperation {
    fn name(&self) -> &str {
        "transcribe"
    }

    fn description(&self) -> &str {
        "Transcribe an audio file to text (no transcription backend is configured)."
    }

    fn parameters(&self) -> &[Parameter] {
        PARAMETERS
    }

    async fn execute(&self, _args: Value, _context: &OperationContext) -> Result<Value, OperationError> {
        Err(OperationError::NotImplemented(
            "audio transcription requires a speech-to-text backend".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::Sandbox;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_always_not_implemented() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = OperationContext::new(Arc::new(Sandbox::new(dir.path(), "/data").unwrap()));
        let result = TranscribeOperation
            .execute(
                json!({"audio_path": "/data/a.mp3", "output_path": "/data/a.txt"}),
                &ctx,
            )
            .await;
        assert!(matches!(result, Err(OperationError::NotImplemented(_))));
        assert!(!dir.path().join("a.txt").exists());
    }
}
