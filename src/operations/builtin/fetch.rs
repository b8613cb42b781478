//! Builtin operation: download a URL and save the body inside the sandbox.
//!
//! The body is downloaded and validated (status, scheme, size) before the
//! target file is created, so a failed fetch leaves nothing behind.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::HttpSettings;
use crate::operations::{
    ensure_parent, str_arg, ArgKind, Operation, OperationContext, OperationError, Parameter,
};

const PARAMETERS: &[Parameter] = &[
    Parameter::required("url", ArgKind::Url),
    Parameter::required("save_path", ArgKind::Path),
];

pub struct FetchOperation {
    http: HttpSettings,
}

impl FetchOperation {
    pub fn new(http: HttpSettings) -> Self {
        Self { http }
    }
}

/// A fully downloaded, size-checked response body.
pub(super) struct Downloaded {
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Validates the URL and returns the response body.
///
/// Shared with the scrape operation.
pub(super) async fn download(
    http: &HttpSettings,
    url_str: &str,
) -> Result<Downloaded, OperationError> {
    let parsed = url::Url::parse(url_str)
        .map_err(|e| OperationError::InvalidArguments(format!("invalid URL '{url_str}': {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(OperationError::InvalidArguments(format!(
                "unsupported scheme '{scheme}' (only http/https)"
            )));
        }
    }

    debug!("Fetching URL: {url_str}");
    let response = http
        .client
        .get(parsed)
        .send()
        .await
        .with_context(|| format!("requesting {url_str}"))?;

    let status = response.status();
    if !status.is_success() {
        return Err(anyhow!("HTTP {status} from {url_str}").into());
    }

    if let Some(len) = response.content_length() {
        if len > http.max_response_bytes {
            return Err(anyhow!(
                "response too large ({len} bytes, limit is {} bytes)",
                http.max_response_bytes
            )
            .into());
        }
    }

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("text/html")
        .to_string();

    let body = response
        .bytes()
        .await
        .with_context(|| format!("reading response from {url_str}"))?;

    if body.len() as u64 > http.max_response_bytes {
        return Err(anyhow!(
            "response too large ({} bytes, limit is {} bytes)",
            body.len(),
            http.max_response_bytes
        )
        .into());
    }

    Ok(Downloaded {
        content_type,
        body: body.to_vec(),
    })
}

#[async_trait]
impl Operation for FetchOperation {
    fn name(&self) -> &str {
        "fetch"
    }

    fn description(&self) -> &str {
        "Download the content at an http(s) URL and save it to a file in the sandbox. \
         Returns the number of bytes written."
    }

    fn parameters(&self) -> &[Parameter] {
        PARAMETERS
    }

    async fn execute(&self, args: Value, context: &OperationContext) -> Result<Value, OperationError> {
        let url = str_arg(&args, "url")?;
        let save_path = context.path(str_arg(&args, "save_path")?);

        let Downloaded { body, .. } = download(&self.http, url).await?;

        ensure_parent(&save_path)
            .with_context(|| format!("creating parent of {}", save_path.display()))?;
        tokio::fs::write(&save_path, &body)
            .await
            .with_context(|| format!("writing {}", save_path.display()))?;

        info!("Saved {} bytes from {url} to {}", body.len(), save_path.display());
        Ok(json!(body.len()))
    }
}
