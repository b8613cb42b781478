//! Builtin operation: sort a JSON contact list.

use std::cmp::Ordering;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::operations::{
    blocking, ensure_parent, str_arg, ArgKind, Operation, OperationContext, OperationError,
    Parameter,
};

const DEFAULT_SORT_KEYS: &[&str] = &["last_name", "first_name"];

const PARAMETERS: &[Parameter] = &[
    Parameter::required("input_path", ArgKind::Path),
    Parameter::required("output_path", ArgKind::Path),
    Parameter::optional("sort_keys", ArgKind::Json),
];

pub struct SortContactsOperation;

fn sort_keys(value: &Value) -> Result<Vec<String>, OperationError> {
    match value {
        Value::Null => Ok(DEFAULT_SORT_KEYS.iter().map(|k| k.to_string()).collect()),
        Value::Array(keys) if !keys.is_empty() => keys
            .iter()
            .map(|k| {
                k.as_str().map(str::to_string).ok_or_else(|| {
                    OperationError::InvalidArguments(format!("sort key must be a string, got {k}"))
                })
            })
            .collect(),
        other => Err(OperationError::InvalidArguments(format!(
            "sort_keys must be a non-empty list of field names, got {other}"
        ))),
    }
}

/// Missing fields sort first; strings compare as text, anything else by
/// its JSON rendering.
fn compare_field(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (x, y) => x.to_string().cmp(&y.to_string()),
    }
}

fn sort_contacts(contacts: &mut [Value], keys: &[String]) {
    contacts.sort_by(|a, b| {
        keys.iter()
            .map(|k| compare_field(&a[k.as_str()], &b[k.as_str()]))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

#[async_trait]
impl Operation for SortContactsOperation {
    fn name(&self) -> &str {
        "sort_contacts"
    }

    fn description(&self) -> &str {
        "Sort a JSON array of contacts by last_name then first_name (or the given \
         keys) and write it pretty-printed."
    }

    fn parameters(&self) -> &[Parameter] {
        PARAMETERS
    }

    async fn execute(&self, args: Value, context: &OperationContext) -> Result<Value, OperationError> {
        let input_path = context.path(str_arg(&args, "input_path")?);
        let output_path = context.path(str_arg(&args, "output_path")?);
        let keys = sort_keys(&args["sort_keys"])?;

        blocking(move || {
            let content = std::fs::read_to_string(&input_path)
                .with_context(|| format!("reading {}", input_path.display()))?;
            let parsed: Value = serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", input_path.display()))?;
            let Value::Array(mut contacts) = parsed else {
                return Err(anyhow!("{} does not contain a JSON array", input_path.display()).into());
            };

            sort_contacts(&mut contacts, &keys);
            let rendered =
                serde_json::to_string_pretty(&contacts).context("serializing contacts")?;

            ensure_parent(&output_path)
                .with_context(|| format!("creating parent of {}", output_path.display()))?;
            std::fs::write(&output_path, rendered)
                .with_context(|| format!("writing {}", output_path.display()))?;

            info!("Sorted {} contacts by {}", contacts.len(), keys.join(", "));
            Ok(Value::Null)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::Sandbox;
    use serde_json::json;
    use std::sync::Arc;

    fn contacts() -> Value {
        json!([
            {"first_name": "Zoe", "last_name": "Adams", "email": "z@a"},
            {"first_name": "Bob", "last_name": "Young", "email": "b@y"},
            {"first_name": "Amy", "last_name": "Adams", "email": "a@a"},
            {"first_name": "Nobody"}
        ])
    }

    fn order(sorted: &Value) -> Vec<&str> {
        sorted
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["first_name"].as_str().unwrap())
            .collect()
    }

    #[test]
    fn test_sort_by_last_then_first() {
        let Value::Array(mut list) = contacts() else { unreachable!() };
        sort_contacts(&mut list, &sort_keys(&Value::Null).unwrap());
        assert_eq!(order(&Value::Array(list)), vec!["Nobody", "Amy", "Zoe", "Bob"]);
    }

    #[test]
    fn test_custom_keys() {
        let Value::Array(mut list) = contacts() else { unreachable!() };
        sort_contacts(&mut list, &sort_keys(&json!(["first_name"])).unwrap());
        assert_eq!(order(&Value::Array(list)), vec!["Amy", "Bob", "Nobody", "Zoe"]);
        assert!(sort_keys(&json!([])).is_err());
        assert!(sort_keys(&json!([1])).is_err());
    }

    #[tokio::test]
    async fn test_execute_writes_sorted_file() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Arc::new(Sandbox::new(dir.path(), "/data").unwrap());
        std::fs::write(sandbox.root().join("contacts.json"), contacts().to_string()).unwrap();
        let ctx = OperationContext::new(sandbox.clone());

        let result = SortContactsOperation
            .execute(
                json!({"input_path": "/data/contacts.json", "output_path": "/data/contacts-sorted.json"}),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(result, Value::Null);

        let written =
            std::fs::read_to_string(sandbox.root().join("contacts-sorted.json")).unwrap();
        let parsed: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(order(&parsed), vec!["Nobody", "Amy", "Zoe", "Bob"]);
    }

    #[tokio::test]
    async fn test_non_array_fails() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Arc::new(Sandbox::new(dir.path(), "/data").unwrap());
        std::fs::write(sandbox.root().join("contacts.json"), "{}").unwrap();
        let ctx = OperationContext::new(sandbox.clone());
        let result = SortContactsOperation
            .execute(
                json!({"input_path": "contacts.json", "output_path": "out.json"}),
                &ctx,
            )
            .await;
        assert!(matches!(result, Err(OperationError::Failed(_))));
        assert!(!sandbox.root().join("out.json").exists());
    }
}
