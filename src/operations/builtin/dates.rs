//! Builtin operation: count the dates in a file that fall on a weekday.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};
use serde_json::{json, Value};
use tracing::info;

use crate::operations::{
    blocking, ensure_parent, opt_str_arg, str_arg, ArgKind, Operation, OperationContext,
    OperationError, Parameter,
};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%b-%Y", "%b %d, %Y", "%Y/%m/%d"];
const DATETIME_FORMATS: &[&str] = &["%Y/%m/%d %H:%M:%S", "%Y-%m-%d %H:%M:%S"];

const PARAMETERS: &[Parameter] = &[
    Parameter::required("input_path", ArgKind::Path),
    Parameter::required("output_path", ArgKind::Path),
    Parameter::optional("weekday", ArgKind::Text),
];

pub struct CountWeekdaysOperation;

pub fn parse_date(line: &str) -> Option<NaiveDate> {
    let line = line.trim();
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(line, f).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(line, f).ok())
                .map(|dt| dt.date())
        })
}

/// Counts the non-blank lines of `content` that fall on `weekday`.
/// Fails on the first line that is not a recognised date.
fn count_weekday(content: &str, weekday: Weekday) -> anyhow::Result<usize> {
    let mut count = 0;
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let date =
            parse_date(line).ok_or_else(|| anyhow!("line {}: unrecognised date '{line}'", idx + 1))?;
        if date.weekday() == weekday {
            count += 1;
        }
    }
    Ok(count)
}

#[async_trait]
impl Operation for CountWeekdaysOperation {
    fn name(&self) -> &str {
        "count_weekdays"
    }

    fn description(&self) -> &str {
        "Count the dates (one per line, mixed formats) falling on a weekday and \
         write the count. Weekday defaults to Wednesday."
    }

    fn parameters(&self) -> &[Parameter] {
        PARAMETERS
    }

    async fn execute(&self, args: Value, context: &OperationContext) -> Result<Value, OperationError> {
        let input_path = context.path(str_arg(&args, "input_path")?);
        let output_path = context.path(str_arg(&args, "output_path")?);
        let weekday = match opt_str_arg(&args, "weekday")? {
            None => Weekday::Wed,
            Some(name) => name.trim().parse::<Weekday>().map_err(|_| {
                OperationError::InvalidArguments(format!("unknown weekday '{name}'"))
            })?,
        };

        blocking(move || {
            let content = std::fs::read_to_string(&input_path)
                .with_context(|| format!("reading {}", input_path.display()))?;
            let count = count_weekday(&content, weekday)?;

            ensure_parent(&output_path)
                .with_context(|| format!("creating parent of {}", output_path.display()))?;
            std::fs::write(&output_path, count.to_string())
                .with_context(|| format!("writing {}", output_path.display()))?;

            info!("{count} {weekday:?} dates in {}", input_path.display());
            Ok(Value::Null)
        })
        .await
    }
}
