//! Builtin operation: total revenue of one ticket type.

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use super::query::open_read_only;
use crate::operations::{
    blocking, ensure_parent, str_arg, ArgKind, Operation, OperationContext, OperationError,
    Parameter,
};

const PARAMETERS: &[Parameter] = &[
    Parameter::required("db_path", ArgKind::Path),
    Parameter::required("ticket_type", ArgKind::Text),
    Parameter::required("output_path", ArgKind::Path),
];

pub struct TicketRevenueOperation;

/// Renders a total the way people write money: integral sums without a
/// trailing `.0`.
fn format_total(total: f64) -> String {
    if total.fract() == 0.0 && total.abs() < 1e15 {
        format!("{}", total as i64)
    } else {
        total.to_string()
    }
}

#[async_trait]
impl Operation for TicketRevenueOperation {
    fn name(&self) -> &str {
        "ticket_revenue"
    }

    fn description(&self) -> &str {
        "Sum units * price over the `tickets` table for one ticket type and write \
         the total."
    }

    fn parameters(&self) -> &[Parameter] {
        PARAMETERS
    }

    async fn execute(&self, args: Value, context: &OperationContext) -> Result<Value, OperationError> {
        let db_path = context.path(str_arg(&args, "db_path")?);
        let ticket_type = str_arg(&args, "ticket_type")?.to_string();
        let output_path = context.path(str_arg(&args, "output_path")?);

        blocking(move || {
            let conn = open_read_only(&db_path)?;
            let total: Option<f64> = conn
                .query_row(
                    "SELECT SUM(units * price) FROM tickets WHERE type = ?1",
                    [&ticket_type],
                    |row| row.get(0),
                )
                .context("summing ticket sales")?;
            let total = total.unwrap_or(0.0);

            ensure_parent(&output_path)
                .with_context(|| format!("creating parent of {}", output_path.display()))?;
            std::fs::write(&output_path, format_total(total))
                .with_context(|| format!("writing {}", output_path.display()))?;

            info!("{ticket_type} ticket revenue: {total}");
            Ok(json!(total))
        })
        .await
    }
}
