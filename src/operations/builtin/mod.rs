//! Builtin operations and the catalogue that wires them to task
//! descriptions.

pub mod contacts;
pub mod csv_filter;
pub mod dates;
pub mod docs_index;
pub mod fetch;
pub mod git;
pub mod image_transform;
pub mod logs;
pub mod markdown;
pub mod query;
pub mod scrape;
pub mod ticket_sales;
pub mod transcribe;

use std::time::Duration;

use serde_json::{json, Map, Value};

use super::registry::{Matcher, OperationRegistry, OperationSpec};
use crate::config::{Config, HttpConfig};
use crate::dispatch::extract;

pub use contacts::SortContactsOperation;
pub use csv_filter::CsvFilterOperation;
pub use dates::CountWeekdaysOperation;
pub use docs_index::DocsIndexOperation;
pub use fetch::FetchOperation;
pub use git::GitOperation;
pub use image_transform::ImageTransformOperation;
pub use logs::RecentLogsOperation;
pub use markdown::RenderMarkdownOperation;
pub use query::QueryOperation;
pub use scrape::ScrapeOperation;
pub use ticket_sales::TicketRevenueOperation;
pub use transcribe::TranscribeOperation;

/// Shared HTTP client and limits for the network operations.
#[derive(Clone)]
pub struct HttpSettings {
    pub client: reqwest::Client,
    pub max_response_bytes: u64,
}

impl HttpSettings {
    pub fn from_config(config: &HttpConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            max_response_bytes: config.max_response_bytes,
        }
    }
}

fn required<'a>(value: Option<&'a str>, what: &str) -> Result<&'a str, String> {
    value.ok_or_else(|| format!("could not find {what} in the task description"))
}

/// Builds the argument object, leaving out absent optional values.
fn object<const N: usize>(entries: [(&str, Option<Value>); N]) -> Value {
    let map: Map<String, Value> = entries
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k.to_string(), v)))
        .collect();
    Value::Object(map)
}

// ── Extractors ───────────────────────────────────────────

fn extract_count_weekdays(d: &str) -> Result<Value, String> {
    let weekday = extract::weekday(d).unwrap_or(chrono::Weekday::Wed);
    Ok(json!({
        "input_path": extract::file_named(d, "dates.txt").unwrap_or("dates.txt"),
        "output_path": extract::file_named(d, "dates-wednesdays.txt").unwrap_or("dates-wednesdays.txt"),
        "weekday": format!("{weekday:?}"),
    }))
}

fn extract_sort_contacts(d: &str) -> Result<Value, String> {
    Ok(json!({
        "input_path": extract::file_named(d, "contacts.json").unwrap_or("contacts.json"),
        "output_path": extract::file_named(d, "contacts-sorted.json").unwrap_or("contacts-sorted.json"),
    }))
}

/// Log directory: a path token naming a `logs` directory, else `logs` next
/// to the output file.
fn extract_recent_logs(d: &str) -> Result<Value, String> {
    let output = extract::file_named(d, "logs-recent.txt").unwrap_or("logs-recent.txt");
    let logs_dir = extract::tokens(d)
        .find(|t| {
            !extract::is_url(t)
                && t.contains('/')
                && std::path::Path::new(t).file_name().and_then(|n| n.to_str()) == Some("logs")
        })
        .map(str::to_string)
        .unwrap_or_else(|| match output.rsplit_once('/') {
            Some((dir, _)) => format!("{dir}/logs"),
            None => "logs".to_string(),
        });
    let count = extract::tokens(d).find_map(|t| t.parse::<u64>().ok());
    Ok(object([
        ("logs_dir", Some(json!(logs_dir))),
        ("output_path", Some(json!(output))),
        ("count", count.map(Value::from)),
    ]))
}

fn extract_docs_index(d: &str) -> Result<Value, String> {
    let output = extract::file_named(d, "docs/index.json").unwrap_or("docs/index.json");
    let docs_dir = output.strip_suffix("/index.json").unwrap_or("docs");
    Ok(json!({ "docs_dir": docs_dir, "output_path": output }))
}

fn extract_ticket_revenue(d: &str) -> Result<Value, String> {
    Ok(json!({
        "db_path": extract::file_named(d, "ticket-sales.db").unwrap_or("ticket-sales.db"),
        "ticket_type": extract::quoted(d).unwrap_or("Gold"),
        "output_path": extract::file_named(d, "ticket-sales-gold.txt").unwrap_or("ticket-sales-gold.txt"),
    }))
}

/// Local path defaults to the repository name under the sandbox root; a
/// commit message is the quoted text of a description that asks to commit.
fn extract_git(d: &str) -> Result<Value, String> {
    let repo_url = required(extract::first_url(d), "a repository URL")?;
    let local_path = match extract::last_path(d) {
        Some(path) => path,
        None => required(git::repo_name(repo_url), "a repository name")?,
    };
    let commit_message = d
        .to_lowercase()
        .contains("commit")
        .then(|| extract::quoted(d))
        .flatten();
    Ok(object([
        ("repo_url", Some(json!(repo_url))),
        ("local_path", Some(json!(local_path))),
        ("commit_message", commit_message.map(Value::from)),
    ]))
}

fn extract_query(d: &str) -> Result<Value, String> {
    let databases = extract::paths_with_extension(d, &["db", "sqlite", "sqlite3"]);
    let outputs = extract::paths_with_extension(d, &["json"]);
    Ok(json!({
        "db_path": required(databases.first().copied(), "a database path")?,
        "query": extract::sql_statement(d).ok_or("could not find a SELECT query in the task description")?,
        "output_path": required(outputs.last().copied(), "a .json output path")?,
    }))
}

fn extract_scrape(d: &str) -> Result<Value, String> {
    Ok(json!({
        "url": required(extract::first_url(d), "a URL")?,
        "output_path": required(extract::last_path(d), "an output path")?,
    }))
}

fn extract_fetch(d: &str) -> Result<Value, String> {
    Ok(json!({
        "url": required(extract::first_url(d), "a URL")?,
        "save_path": required(extract::last_path(d), "a save path")?,
    }))
}

/// First image path is the source, the second the output.
fn extract_image_transform(d: &str) -> Result<Value, String> {
    let images = extract::paths_with_extension(d, image_transform::IMAGE_EXTENSIONS);
    let image_path = required(images.first().copied(), "an image path")?;
    let output_path = required(images.get(1).copied(), "an output image path")?;
    let resize = extract::dimensions(d).map(|(w, h)| json!([w, h]));
    let quality = extract::number_after(d, "quality").map(Value::from);
    Ok(object([
        ("image_path", Some(json!(image_path))),
        ("output_path", Some(json!(output_path))),
        ("resize", resize),
        ("quality", quality),
    ]))
}

fn extract_render_markdown(d: &str) -> Result<Value, String> {
    let sources = extract::paths_with_extension(d, &["md", "markdown"]);
    let outputs = extract::paths_with_extension(d, &["html", "htm"]);
    Ok(json!({
        "md_path": required(sources.first().copied(), "a markdown path")?,
        "output_path": required(outputs.first().copied(), "an .html output path")?,
    }))
}

// ── Catalogue ────────────────────────────────────────────

const IMAGE_MARKERS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".bmp", ".webp", ".tiff", ".PNG", ".JPG", ".JPEG",
];

/// Builds the catalogue in resolution order.
///
/// Order matters where matchers overlap: the ticket-sales task precedes
/// the generic query, git precedes scrape and fetch (clone descriptions
/// often say "save"), and scrape precedes fetch.
pub fn registry(config: &Config) -> anyhow::Result<OperationRegistry> {
    let http = HttpSettings::from_config(&config.http);
    let mut registry = OperationRegistry::new();

    registry.register(
        OperationSpec::new(CountWeekdaysOperation)
            .matching(Matcher::all(["dates.txt", "dates-wednesdays.txt"]))
            .extracting(extract_count_weekdays),
    )?;
    registry.register(
        OperationSpec::new(SortContactsOperation)
            .matching(Matcher::all(["contacts.json", "contacts-sorted.json"]))
            .extracting(extract_sort_contacts),
    )?;
    registry.register(
        OperationSpec::new(RecentLogsOperation)
            .matching(Matcher::all(["logs-recent.txt"]))
            .extracting(extract_recent_logs),
    )?;
    registry.register(
        OperationSpec::new(DocsIndexOperation)
            .matching(Matcher::all(["docs/index.json"]))
            .extracting(extract_docs_index),
    )?;
    registry.register(
        OperationSpec::new(TicketRevenueOperation)
            .matching(Matcher::all(["ticket-sales.db", "ticket-sales-gold.txt"]))
            .extracting(extract_ticket_revenue),
    )?;
    registry.register(
        OperationSpec::new(GitOperation::new(config.git.clone()))
            .matching(
                Matcher::default()
                    .any_of([".git", "github.com", "gitlab.com"])
                    .any_of(["clone", "Clone", "commit", "Commit"]),
            )
            .extracting(extract_git),
    )?;
    registry.register(
        OperationSpec::new(QueryOperation)
            .matching(Matcher::all([".db", ".json"]).any_of(["SELECT", "select"]))
            .extracting(extract_query),
    )?;
    registry.register(
        OperationSpec::new(ScrapeOperation::new(http.clone()))
            .matching(
                Matcher::default()
                    .any_of(["http://", "https://"])
                    .any_of(["scrape", "Scrape"]),
            )
            .extracting(extract_scrape),
    )?;
    registry.register(
        OperationSpec::new(FetchOperation::new(http))
            .matching(
                Matcher::default()
                    .any_of(["http://", "https://"])
                    .any_of(["save", "Save"]),
            )
            .extracting(extract_fetch),
    )?;
    registry.register(
        OperationSpec::new(ImageTransformOperation)
            .matching(
                Matcher::default()
                    .any_of(IMAGE_MARKERS.iter().copied())
                    .any_of(["resize", "Resize", "convert", "Convert", "compress", "Compress"]),
            )
            .extracting(extract_image_transform),
    )?;
    registry.register(
        OperationSpec::new(RenderMarkdownOperation)
            .matching(Matcher::all([".md", ".html"]))
            .extracting(extract_render_markdown),
    )?;
    registry.register(OperationSpec::new(TranscribeOperation))?;
    registry.register(OperationSpec::new(CsvFilterOperation))?;

    Ok(registry)
}
