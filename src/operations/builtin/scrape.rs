//! Builtin operation: fetch a web page and save its readable text.
//!
//! HTML is converted to plain text with html2text; other textual content
//! types are saved as-is.

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use super::fetch::{download, Downloaded};
use super::HttpSettings;
use crate::operations::{
    ensure_parent, str_arg, ArgKind, Operation, OperationContext, OperationError, Parameter,
};

/// Text wrapping width for html2text conversion.
const TEXT_WIDTH: usize = 100;

const PARAMETERS: &[Parameter] = &[
    Parameter::required("url", ArgKind::Url),
    Parameter::required("output_path", ArgKind::Path),
];

pub struct ScrapeOperation {
    http: HttpSettings,
}

impl ScrapeOperation {
    pub fn new(http: HttpSettings) -> Self {
        Self { http }
    }
}

/// How a response body is turned into text, decided by its content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Body {
    Markup,
    Text,
    Unknown,
}

impl Body {
    fn classify(content_type: &str) -> Self {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "text/html" | "application/xhtml+xml" => Body::Markup,
            m if m.starts_with("text/") || m.ends_with("json") || m.ends_with("xml") => Body::Text,
            _ => Body::Unknown,
        }
    }

    /// Page text: markup rendered by html2text, text decoded lossily,
    /// anything else only when it carries no NUL bytes.
    fn into_text(self, content_type: &str, body: &[u8]) -> Result<String, OperationError> {
        match self {
            Body::Markup => Ok(html2text::from_read(body, TEXT_WIDTH)
                .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned())),
            Body::Text => Ok(String::from_utf8_lossy(body).into_owned()),
            Body::Unknown if body.iter().take(512).any(|b| *b == 0) => Err(anyhow::anyhow!(
                "response is binary ({content_type}), nothing to scrape"
            )
            .into()),
            Body::Unknown => Ok(String::from_utf8_lossy(body).into_owned()),
        }
    }
}

#[async_trait]
impl Operation for ScrapeOperation {
    fn name(&self) -> &str {
        "scrape"
    }

    fn description(&self) -> &str {
        "Fetch a web page and save its readable text content (HTML markup stripped) \
         to a file in the sandbox."
    }

    fn parameters(&self) -> &[Parameter] {
        PARAMETERS
    }

    async fn execute(&self, args: Value, context: &OperationContext) -> Result<Value, OperationError> {
        let url = str_arg(&args, "url")?;
        let output_path = context.path(str_arg(&args, "output_path")?);

        let Downloaded { content_type, body } = download(&self.http, url).await?;
        let text = Body::classify(&content_type).into_text(&content_type, &body)?;

        ensure_parent(&output_path)
            .with_context(|| format!("creating parent of {}", output_path.display()))?;
        tokio::fs::write(&output_path, text.trim())
            .await
            .with_context(|| format!("writing {}", output_path.display()))?;

        info!("Scraped {url} → {} ({} chars)", output_path.display(), text.len());
        Ok(json!(true))
    }
}
