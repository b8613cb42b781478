//! Builtin operation: first lines of the most recently modified log files.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::operations::{
    blocking, ensure_parent, opt_u64_arg, str_arg, ArgKind, Operation, OperationContext,
    OperationError, Parameter,
};

pub const DEFAULT_COUNT: u64 = 10;

const PARAMETERS: &[Parameter] = &[
    Parameter::required("logs_dir", ArgKind::Path),
    Parameter::required("output_path", ArgKind::Path),
    Parameter::optional("count", ArgKind::Integer),
];

pub struct RecentLogsOperation;

/// `*.log` files directly inside `dir`, newest first.
fn newest_logs(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut logs: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("log") {
            continue;
        }
        let meta = entry.metadata()?;
        if meta.is_file() {
            logs.push((meta.modified()?, path));
        }
    }
    // Newest first; ties by name so output is stable.
    logs.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    Ok(logs.into_iter().map(|(_, p)| p).collect())
}

fn first_line(path: &Path) -> anyhow::Result<String> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut line = String::new();
    BufReader::new(file)
        .read_line(&mut line)
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

#[async_trait]
impl Operation for RecentLogsOperation {
    fn name(&self) -> &str {
        "recent_logs"
    }

    fn description(&self) -> &str {
        "Write the first line of the most recent .log files in a directory \
         (newest first, 10 by default)."
    }

    fn parameters(&self) -> &[Parameter] {
        PARAMETERS
    }

    async fn execute(&self, args: Value, context: &OperationContext) -> Result<Value, OperationError> {
        let logs_dir = context.path(str_arg(&args, "logs_dir")?);
        let output_path = context.path(str_arg(&args, "output_path")?);
        let count = opt_u64_arg(&args, "count")?.unwrap_or(DEFAULT_COUNT) as usize;

        blocking(move || {
            let lines = newest_logs(&logs_dir)?
                .iter()
                .take(count)
                .map(|p| first_line(p))
                .collect::<anyhow::Result<Vec<_>>>()?;

            let mut rendered = lines.join("\n");
            if !rendered.is_empty() {
                rendered.push('\n');
            }
            ensure_parent(&output_path)
                .with_context(|| format!("creating parent of {}", output_path.display()))?;
            std::fs::write(&output_path, rendered)
                .with_context(|| format!("writing {}", output_path.display()))?;

            info!("Wrote first lines of {} log files from {}", lines.len(), logs_dir.display());
            Ok(Value::Null)
        })
        .await
    }
}
