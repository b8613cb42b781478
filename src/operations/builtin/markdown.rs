//! Builtin operation: render a markdown file to HTML.

use anyhow::Context;
use async_trait::async_trait;
use pulldown_cmark::{html, Options, Parser};
use serde_json::{json, Value};
use tracing::info;

use crate::operations::{
    blocking, ensure_parent, str_arg, ArgKind, Operation, OperationContext, OperationError,
    Parameter,
};

const PARAMETERS: &[Parameter] = &[
    Parameter::required("md_path", ArgKind::Path),
    Parameter::required("output_path", ArgKind::Path),
];

pub struct RenderMarkdownOperation;

pub fn render(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

#[async_trait]
impl Operation for RenderMarkdownOperation {
    fn name(&self) -> &str {
        "render_markdown"
    }

    fn description(&self) -> &str {
        "Convert a markdown file to HTML (tables, footnotes, strikethrough and task \
         lists supported)."
    }

    fn parameters(&self) -> &[Parameter] {
        PARAMETERS
    }

    async fn execute(&self, args: Value, context: &OperationContext) -> Result<Value, OperationError> {
        let md_path = context.path(str_arg(&args, "md_path")?);
        let output_path = context.path(str_arg(&args, "output_path")?);

        blocking(move || {
            let markdown = std::fs::read_to_string(&md_path)
                .with_context(|| format!("reading {}", md_path.display()))?;
            let rendered = render(&markdown);

            ensure_parent(&output_path)
                .with_context(|| format!("creating parent of {}", output_path.display()))?;
            std::fs::write(&output_path, rendered)
                .with_context(|| format!("writing {}", output_path.display()))?;

            info!("Rendered {} → {}", md_path.display(), output_path.display());
            Ok(json!(true))
        })
        .await
    }
}
