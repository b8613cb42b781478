//! Builtin operation: run a read-only SQL query against a SQLite database
//! in the sandbox and save the rows as JSON.

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::{json, Value};
use tracing::info;

use crate::operations::{
    blocking, ensure_parent, str_arg, ArgKind, Operation, OperationContext, OperationError,
    Parameter,
};

const PARAMETERS: &[Parameter] = &[
    Parameter::required("db_path", ArgKind::Path),
    Parameter::required("query", ArgKind::Text),
    Parameter::required("output_path", ArgKind::Path),
];

pub struct QueryOperation;

/// Opens an existing database without write access.
pub(super) fn open_read_only(db_path: &Path) -> anyhow::Result<Connection> {
    Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("opening database {}", db_path.display()))
}

fn cell_to_json(cell: ValueRef<'_>) -> Value {
    match cell {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => json!(i),
        ValueRef::Real(f) => json!(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => json!(b),
    }
}

/// Executes `query` and returns every row as a JSON array of cells.
///
/// Statements that could modify the database are rejected before they run.
fn run_query(conn: &Connection, query: &str) -> Result<Vec<Value>, OperationError> {
    let mut stmt = conn
        .prepare(query)
        .map_err(|e| OperationError::InvalidArguments(format!("invalid query: {e}")))?;

    if !stmt.readonly() {
        return Err(OperationError::InvalidArguments(
            "only read-only queries are allowed".into(),
        ));
    }

    let columns = stmt.column_count();
    let mut rows = stmt.query([]).context("executing query")?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().context("reading row")? {
        let cells = (0..columns)
            .map(|i| row.get_ref(i).map(cell_to_json))
            .collect::<Result<Vec<_>, _>>()
            .context("reading column")?;
        out.push(Value::Array(cells));
    }
    Ok(out)
}

#[async_trait]
impl Operation for QueryOperation {
    fn name(&self) -> &str {
        "query"
    }

    fn description(&self) -> &str {
        "Run a read-only SQL query on a SQLite database and save the rows as a JSON \
         array of arrays. Returns the rows."
    }

    fn parameters(&self) -> &[Parameter] {
        PARAMETERS
    }

    async fn execute(&self, args: Value, context: &OperationContext) -> Result<Value, OperationError> {
        let db_path = context.path(str_arg(&args, "db_path")?);
        let query = str_arg(&args, "query")?.to_string();
        let output_path = context.path(str_arg(&args, "output_path")?);

        blocking(move || {
            let conn = open_read_only(&db_path)?;
            let rows = run_query(&conn, &query)?;
            let rendered = serde_json::to_string(&rows).context("serializing rows")?;

            ensure_parent(&output_path)
                .with_context(|| format!("creating parent of {}", output_path.display()))?;
            std::fs::write(&output_path, rendered)
                .with_context(|| format!("writing {}", output_path.display()))?;

            info!("Query returned {} rows → {}", rows.len(), output_path.display());
            Ok(Value::Array(rows))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::Sandbox;
    use std::sync::Arc;

    fn context() -> (tempfile::TempDir, OperationContext) {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Arc::new(Sandbox::new(dir.path().join("data"), "/data").unwrap());
        (dir, OperationContext::new(sandbox))
    }

    fn seed(db: &Path) {
        let conn = Connection::open(db).unwrap();
        conn.execute_batch(
            "CREATE TABLE test_table (id INTEGER, name TEXT, score REAL, note TEXT);
             INSERT INTO test_table VALUES (1, 'alpha', 1.5, NULL);
             INSERT INTO test_table VALUES (2, 'beta', 2.0, 'x');",
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_select_writes_and_returns_rows() {
        let (_dir, ctx) = context();
        seed(&ctx.sandbox.root().join("database.db"));

        let result = QueryOperation
            .execute(
                json!({
                    "db_path": "/data/database.db",
                    "query": "SELECT * FROM test_table ORDER BY id",
                    "output_path": "/data/results.json"
                }),
                &ctx,
            )
            .await
            .unwrap();

        let expected = json!([[1, "alpha", 1.5, null], [2, "beta", 2.0, "x"]]);
        assert_eq!(result, expected);

        let written = std::fs::read_to_string(ctx.sandbox.root().join("results.json")).unwrap();
        let parsed: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed, expected);
    }

    #[tokio::test]
    async fn test_write_statements_are_rejected() {
        let (_dir, ctx) = context();
        let db = ctx.sandbox.root().join("database.db");
        seed(&db);

        let result = QueryOperation
            .execute(
                json!({
                    "db_path": "/data/database.db",
                    "query": "DELETE FROM test_table",
                    "output_path": "/data/results.json"
                }),
                &ctx,
            )
            .await;
        assert!(matches!(result, Err(OperationError::InvalidArguments(_))));
        assert!(!ctx.sandbox.root().join("results.json").exists());

        let count: i64 = Connection::open(&db)
            .unwrap()
            .query_row("SELECT COUNT(*) FROM test_table", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_invalid_sql_is_invalid_arguments() {
        let (_dir, ctx) = context();
        seed(&ctx.sandbox.root().join("database.db"));
        let result = QueryOperation
            .execute(
                json!({
                    "db_path": "database.db",
                    "query": "SELECT FROM WHERE",
                    "output_path": "out.json"
                }),
                &ctx,
            )
            .await;
        assert!(matches!(result, Err(OperationError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn test_missing_database_is_not_created() {
        let (_dir, ctx) = context();
        let result = QueryOperation
            .execute(
                json!({
                    "db_path": "/data/missing.db",
                    "query": "SELECT 1",
                    "output_path": "/data/out.json"
                }),
                &ctx,
            )
            .await;
        assert!(matches!(result, Err(OperationError::Failed(_))));
        assert!(!ctx.sandbox.root().join("missing.db").exists());
    }
}
