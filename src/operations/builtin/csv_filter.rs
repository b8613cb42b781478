//! Builtin operation: filter the rows of a CSV file.
//!
//! Filters are applied in order and every one must hold for a row to be
//! kept. Comparisons are numeric when both the cell and the filter value
//! read as numbers, textual otherwise.

use std::cmp::Ordering;
use std::fs::File;

use anyhow::Context;
use async_trait::async_trait;
use csv::ReaderBuilder;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::operations::{
    blocking, str_arg, ArgKind, Operation, OperationContext, OperationError, Parameter,
};

const PARAMETERS: &[Parameter] = &[
    Parameter::required("csv_path", ArgKind::Path),
    Parameter::optional("filters", ArgKind::Json),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    #[default]
    #[serde(alias = "==")]
    Eq,
    #[serde(alias = ">")]
    Gt,
    #[serde(alias = "<")]
    Lt,
    Contains,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilterRule {
    pub column: String,
    #[serde(default)]
    pub operator: Operator,
    pub value: Value,
}

pub struct CsvFilterOperation;

fn number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Filter value as text: strings unquoted, everything else as JSON.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare(cell: &str, wanted: &str) -> Option<Ordering> {
    match (number(cell), number(wanted)) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => Some(cell.cmp(wanted)),
    }
}

impl FilterRule {
    fn holds(&self, cell: &str) -> bool {
        let wanted = value_text(&self.value);
        match self.operator {
            Operator::Contains => cell.contains(&wanted),
            Operator::Eq => compare(cell, &wanted) == Some(Ordering::Equal),
            Operator::Gt => compare(cell, &wanted) == Some(Ordering::Greater),
            Operator::Lt => compare(cell, &wanted) == Some(Ordering::Less),
        }
    }
}

/// Cell as JSON: integers and floats become numbers, empty cells null.
fn typed_cell(cell: &str) -> Value {
    if cell.is_empty() {
        Value::Null
    } else if let Ok(i) = cell.parse::<i64>() {
        Value::from(i)
    } else if let Some(f) = number(cell).and_then(serde_json::Number::from_f64) {
        Value::Number(f)
    } else {
        Value::String(cell.to_string())
    }
}

/// Filter list; absent or `null` means no filtering.
pub fn parse_filters(value: &Value) -> Result<Vec<FilterRule>, OperationError> {
    if value.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(value.clone())
        .map_err(|e| OperationError::InvalidArguments(format!("invalid filters: {e}")))
}

/// Rows of `reader` satisfying every rule, in file order.
pub fn filter_rows<R: std::io::Read>(
    mut reader: csv::Reader<R>,
    rules: &[FilterRule],
) -> Result<Vec<Value>, OperationError> {
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV header")?
        .iter()
        .map(str::to_string)
        .collect();

    let columns = rules
        .iter()
        .map(|rule| {
            headers.iter().position(|h| *h == rule.column).ok_or_else(|| {
                OperationError::InvalidArguments(format!("unknown column '{}'", rule.column))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut kept = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("parsing CSV row {}", idx + 2))?;
        let keep = rules
            .iter()
            .zip(&columns)
            .all(|(rule, &col)| rule.holds(record.get(col).unwrap_or("")));
        if keep {
            let row: Map<String, Value> = headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.clone(), typed_cell(record.get(i).unwrap_or(""))))
                .collect();
            kept.push(Value::Object(row));
        }
    }
    Ok(kept)
}

#[async_trait]
impl Operation for CsvFilterOperation {
    fn name(&self) -> &str {
        "csv_filter"
    }

    fn description(&self) -> &str {
        "Return the rows of a CSV file matching every filter \
         ({column, operator: eq|gt|lt|contains, value})."
    }

    fn parameters(&self) -> &[Parameter] {
        PARAMETERS
    }

    async fn execute(&self, args: Value, context: &OperationContext) -> Result<Value, OperationError> {
        let csv_path = context.path(str_arg(&args, "csv_path")?);
        let rules = parse_filters(args.get("filters").unwrap_or(&Value::Null))?;

        blocking(move || {
            let file = File::open(&csv_path)
                .with_context(|| format!("opening {}", csv_path.display()))?;
            let reader = ReaderBuilder::new().flexible(true).from_reader(file);
            let rows = filter_rows(reader, &rules)?;
            info!(
                "Filtered {} with {} rule(s): {} row(s) kept",
                csv_path.display(),
                rules.len(),
                rows.len()
            );
            Ok(Value::Array(rows))
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

    const PEOPLE: &str = "name,city,age,score\n\
                          Alice Smith,Paris,34,9.5\n\
                          Bob Jones,Berlin,9,\n\
                          Carol Smithers,Rome,41,7\n";

    fn reader(data: &str) -> csv::Reader<&[u8]> {
        ReaderBuilder::new().flexible(true).from_reader(data.as_bytes())
    }

    fn rules(value: Value) -> Vec<FilterRule> {
        parse_filters(&value).unwrap()
    }

    fn names(rows: &[Value]) -> Vec<&str> {
        rows.iter().map(|r| r["name"].as_str().unwrap()).collect()
    }

    // ── parsing ──

    #[test]
    fn test_operator_aliases_and_default() {
        let parsed = rules(json!([
            {"column": "a", "operator": "==", "value": 1},
            {"column": "a", "operator": ">", "value": 1},
            {"column": "a", "operator": "lt", "value": 1},
            {"column": "a", "value": 1}
        ]));
        let ops: Vec<Operator> = parsed.iter().map(|r| r.operator).collect();
        assert_eq!(ops, vec![Operator::Eq, Operator::Gt, Operator::Lt, Operator::Eq]);
    }

    #[test]
    fn test_unknown_operator_is_invalid() {
        let result = parse_filters(&json!([{"column": "a", "operator": "~", "value": 1}]));
        assert!(matches!(result, Err(OperationError::InvalidArguments(_))));
        assert!(parse_filters(&json!("age > 3")).is_err());
    }

    // ── filtering ──

    #[test]
    fn test_contains_preserves_order() {
        let rows = filter_rows(
            reader(PEOPLE),
            &rules(json!([{"column": "name", "operator": "contains", "value": "Smith"}])),
        )
        .unwrap();
        assert_eq!(names(&rows), vec!["Alice Smith", "Carol Smithers"]);
    }

    #[test]
    fn test_numeric_comparison_not_lexical() {
        // "9" > "34" as text, but 9 < 34 as numbers
        let rows = filter_rows(
            reader(PEOPLE),
            &rules(json!([{"column": "age", "operator": ">", "value": 30}])),
        )
        .unwrap();
        assert_eq!(names(&rows), vec!["Alice Smith", "Carol Smithers"]);

        let rows = filter_rows(
            reader(PEOPLE),
            &rules(json!([{"column": "age", "operator": "lt", "value": "10"}])),
        )
        .unwrap();
        assert_eq!(names(&rows), vec!["Bob Jones"]);
    }

    #[test]
    fn test_eq_on_text_and_combined_rules() {
        let rows = filter_rows(
            reader(PEOPLE),
            &rules(json!([
                {"column": "name", "operator": "contains", "value": "Smith"},
                {"column": "city", "operator": "eq", "value": "Rome"}
            ])),
        )
        .unwrap();
        assert_eq!(names(&rows), vec!["Carol Smithers"]);
    }

    #[test]
    fn test_rows_are_typed() {
        let rows = filter_rows(
            reader(PEOPLE),
            &rules(json!([{"column": "city", "value": "Berlin"}])),
        )
        .unwrap();
        assert_eq!(
            rows,
            vec![json!({"name": "Bob Jones", "city": "Berlin", "age": 9, "score": null})]
        );

        let rows = filter_rows(reader(PEOPLE), &[]).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["score"], json!(9.5));
    }

    #[test]
    fn test_unknown_column_is_invalid() {
        let result = filter_rows(reader(PEOPLE), &rules(json!([{"column": "zip", "value": 1}])));
        assert!(matches!(result, Err(OperationError::InvalidArguments(_))));
    }

    // ── execution ──

    #[tokio::test]
    async fn test_execute_reads_from_sandbox() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Arc::new(Sandbox::new(dir.path(), "/data").unwrap());
        std::fs::write(sandbox.root().join("people.csv"), PEOPLE).unwrap();
        let ctx = OperationContext::new(sandbox);

        let result = CsvFilterOperation
            .execute(
                json!({
                    "csv_path": "/data/people.csv",
                    "filters": [{"column": "name", "operator": "contains", "value": "Smith"}]
                }),
                &ctx,
            )
            .await
            .unwrap();
        let rows = result.as_array().unwrap();
        assert_eq!(names(rows), vec!["Alice Smith", "Carol Smithers"]);
    }

    #[tokio::test]
    async fn test_filters_default_to_all_rows() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Arc::new(Sandbox::new(dir.path(), "/data").unwrap());
        std::fs::write(sandbox.root().join("people.csv"), PEOPLE).unwrap();
        let ctx = OperationContext::new(sandbox);

        let result = CsvFilterOperation
            .execute(json!({"csv_path": "people.csv"}), &ctx)
            .await
            .unwrap();
        assert_eq!(
            names(result.as_array().unwrap()),
            vec!["Alice Smith", "Bob Jones", "Carol Smithers"]
        );
        assert!(parse_filters(&Value::Null).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = OperationContext::new(Arc::new(Sandbox::new(dir.path(), "/data").unwrap()));
        let result = CsvFilterOperation
            .execute(json!({"csv_path": "none.csv", "filters": []}), &ctx)
            .await;
        assert!(matches!(result, Err(OperationError::Failed(_))));
    }
}
