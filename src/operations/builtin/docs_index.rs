//! Builtin operation: index markdown files by their first H1 heading.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::operations::{
    blocking, ensure_parent, str_arg, ArgKind, Operation, OperationContext, OperationError,
    Parameter,
};

const PARAMETERS: &[Parameter] = &[
    Parameter::required("docs_dir", ArgKind::Path),
    Parameter::required("output_path", ArgKind::Path),
];

pub struct DocsIndexOperation;

fn first_heading(markdown: &str) -> Option<&str> {
    markdown
        .lines()
        .find_map(|line| line.strip_prefix("# "))
        .map(str::trim)
}

/// Relative path (always `/`-separated) → first heading, for every `.md`
/// file under `dir` that has one.
fn build_index(dir: &Path) -> anyhow::Result<BTreeMap<String, String>> {
    let mut index = BTreeMap::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.with_context(|| format!("walking {}", dir.display()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("md")
        {
            continue;
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let Some(title) = first_heading(&content) else {
            debug!("No heading in {}", path.display());
            continue;
        };

        let relative = path.strip_prefix(dir).unwrap_or(path);
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        index.insert(key, title.to_string());
    }
    Ok(index)
}

#[async_trait]
impl Operation for DocsIndexOperation {
    fn name(&self) -> &str {
        "docs_index"
    }

    fn description(&self) -> &str {
        "Map every markdown file under a directory to its first '# ' heading and \
         write the index as JSON."
    }

    fn parameters(&self) -> &[Parameter] {
        PARAMETERS
    }

    async fn execute(&self, args: Value, context: &OperationContext) -> Result<Value, OperationError> {
        let docs_dir = context.path(str_arg(&args, "docs_dir")?);
        let output_path = context.path(str_arg(&args, "output_path")?);

        blocking(move || {
            let index = build_index(&docs_dir)?;
            let rendered = serde_json::to_string_pretty(&index).context("serializing index")?;

            ensure_parent(&output_path)
                .with_context(|| format!("creating parent of {}", output_path.display()))?;
            std::fs::write(&output_path, rendered)
                .with_context(|| format!("writing {}", output_path.display()))?;

            info!("Indexed {} documents under {}", index.len(), docs_dir.display());
            Ok(Value::Null)
        })
        .await
    }
}
