//! Helpers that pull literal arguments out of a task description.
//!
//! Extraction is purely lexical: whitespace-separated tokens with
//! surrounding quotes/brackets/punctuation stripped, plus a few regexes for
//! SQL statements, quoted strings, sizes and numbers.

use std::path::Path;
use std::sync::OnceLock;

use chrono::Weekday;
use regex::Regex;

/// Characters stripped from both ends of a token.
const WRAPPERS: &[char] = &[
    '`', '\'', '"', '(', ')', '[', ']', '{', '}', '<', '>', ',', ';', ':', '!', '?',
];

const URL_SCHEMES: &[&str] = &["http://", "https://", "file://", "ssh://", "git://"];

fn cached(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("extraction regexes are valid"))
}

fn clean(token: &str) -> &str {
    token
        .trim_start_matches(WRAPPERS)
        .trim_end_matches(|c: char| c == '.' || WRAPPERS.contains(&c))
}

/// Cleaned, non-empty tokens in order of appearance.
pub fn tokens(description: &str) -> impl Iterator<Item = &str> {
    description
        .split_whitespace()
        .map(clean)
        .filter(|t| !t.is_empty())
}

pub fn is_url(token: &str) -> bool {
    URL_SCHEMES.iter().any(|scheme| token.starts_with(scheme))
}

pub fn first_url(description: &str) -> Option<&str> {
    tokens(description).find(|t| is_url(t))
}

/// The token naming `file_name`, either bare or as the tail of a path
/// (`/data/dates.txt` for `dates.txt`).
pub fn file_named<'a>(description: &'a str, file_name: &str) -> Option<&'a str> {
    let suffix = format!("/{file_name}");
    tokens(description).find(|t| !is_url(t) && (*t == file_name || t.ends_with(&suffix)))
}

/// Non-URL tokens whose extension (case-insensitive) is one of `extensions`.
pub fn paths_with_extension<'a>(description: &'a str, extensions: &[&str]) -> Vec<&'a str> {
    tokens(description)
        .filter(|t| !is_url(t))
        .filter(|t| {
            extension_of(t).is_some_and(|ext| {
                extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(&ext))
            })
        })
        .collect()
}

fn extension_of(token: &str) -> Option<String> {
    Path::new(token)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_string)
}

/// True for tokens that read as a file path rather than a word or number.
pub fn looks_like_path(token: &str) -> bool {
    if is_url(token) || token.parse::<f64>().is_ok() {
        return false;
    }
    if token.starts_with('/') || token.starts_with("./") {
        return true;
    }
    let path = Path::new(token);
    let has_stem = path.file_stem().is_some_and(|s| !s.is_empty());
    has_stem
        && extension_of(token).is_some_and(|ext| {
            (1..=5).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
}

/// The description with URL and path tokens removed, so that sizes and
/// day names are never read out of file names.
fn prose(description: &str) -> String {
    tokens(description)
        .filter(|t| !is_url(t) && !looks_like_path(t))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Last path-like token, which in "fetch X and save it to Y" is the target.
pub fn last_path(description: &str) -> Option<&str> {
    tokens(description).filter(|t| looks_like_path(t)).last()
}

/// A read query embedded in the description.
///
/// Backtick- or double-quoted statements win (any case); otherwise the text
/// from the first upper-case SELECT/WITH keyword up to a `;` or the end of
/// the description.
pub fn sql_statement(description: &str) -> Option<String> {
    static QUOTED: OnceLock<Regex> = OnceLock::new();
    static BARE: OnceLock<Regex> = OnceLock::new();

    let starts_like_query = |s: &str| {
        let head: String = s.trim_start().chars().take(6).collect::<String>().to_uppercase();
        head.starts_with("SELECT") || head.starts_with("WITH")
    };

    for caps in cached(&QUOTED, r#"`([^`]+)`|"([^"]+)""#).captures_iter(description) {
        let body = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str());
        if let Some(body) = body.filter(|b| starts_like_query(b)) {
            return Some(body.trim().trim_end_matches(';').trim().to_string());
        }
    }

    cached(&BARE, r"(?s)\b(?:SELECT|WITH)\b[^;]*")
        .find(description)
        .map(|m| m.as_str().trim().to_string())
}

/// First double-quoted string.
pub fn quoted(description: &str) -> Option<&str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r#""([^"]+)""#)
        .captures(description)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// A `WIDTHxHEIGHT` size such as `800x600` or `50 x 50`.
pub fn dimensions(description: &str) -> Option<(u32, u32)> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let text = prose(description);
    let caps = cached(&RE, r"\b(\d{1,5})\s*[xX×]\s*(\d{1,5})\b").captures(&text)?;
    let width = caps[1].parse().ok()?;
    let height = caps[2].parse().ok()?;
    Some((width, height))
}

/// The first integer following `keyword` (case-insensitive), e.g.
/// "quality 80", "quality of 80", "quality=80".
pub fn number_after(description: &str, keyword: &str) -> Option<u64> {
    let pattern = format!(r"(?i){}\D{{0,12}}?(\d+)", regex::escape(keyword));
    let re = Regex::new(&pattern).ok()?;
    re.captures(description)?.get(1)?.as_str().parse().ok()
}

/// The weekday mentioned first outside of file names (case-insensitive,
/// plural forms included).
pub fn weekday(description: &str) -> Option<Weekday> {
    const NAMES: [(&str, Weekday); 7] = [
        ("monday", Weekday::Mon),
        ("tuesday", Weekday::Tue),
        ("wednesday", Weekday::Wed),
        ("thursday", Weekday::Thu),
        ("friday", Weekday::Fri),
        ("saturday", Weekday::Sat),
        ("sunday", Weekday::Sun),
    ];
    let lower = prose(description).to_lowercase();
    NAMES
        .iter()
        .filter_map(|(name, day)| lower.find(name).map(|pos| (pos, *day)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, day)| day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_strip_wrappers() {
        let t: Vec<&str> =
            tokens("Read `/data/in.txt`, then (write) \"/data/out.json\".").collect();
        assert_eq!(t, vec!["Read", "/data/in.txt", "then", "write", "/data/out.json"]);
    }

    #[test]
    fn test_first_url() {
        let d = "Fetch https://api.example.com/todos/1 and http://x.org, save to a.json";
        assert_eq!(first_url(d), Some("https://api.example.com/todos/1"));
        assert_eq!(first_url("no links here"), None);
    }

    #[test]
    fn test_file_named() {
        let d = "Count Wednesdays in /data/dates.txt and write to /data/dates-wednesdays.txt";
        assert_eq!(file_named(d, "dates.txt"), Some("/data/dates.txt"));
        assert_eq!(
            file_named(d, "dates-wednesdays.txt"),
            Some("/data/dates-wednesdays.txt")
        );
        assert_eq!(file_named("use dates.txt", "dates.txt"), Some("dates.txt"));
        assert_eq!(file_named("use olddates.txt", "dates.txt"), None);
    }

    #[test]
    fn test_paths_with_extension() {
        let d = "Resize /data/in.PNG to 50x50 and save as out.jpg (see https://x.org/a.png)";
        assert_eq!(
            paths_with_extension(d, &["png", "jpg"]),
            vec!["/data/in.PNG", "out.jpg"]
        );
    }

    #[test]
    fn test_looks_like_path() {
        assert!(looks_like_path("/data/x"));
        assert!(looks_like_path("./x"));
        assert!(looks_like_path("out.json"));
        assert!(!looks_like_path("3.14"));
        assert!(!looks_like_path("https://example.com/a.json"));
        assert!(!looks_like_path("word"));
        assert!(!looks_like_path(".hidden"));
    }

    #[test]
    fn test_last_path() {
        let d = "Fetch https://api.example.com/data.json and save it to /data/api.json.";
        assert_eq!(last_path(d), Some("/data/api.json"));
        assert_eq!(last_path("nothing"), None);
    }

    #[test]
    fn test_sql_statement_backticks() {
        let d = "Run `SELECT * FROM test_table;` on /data/database.db, save to out.json";
        assert_eq!(sql_statement(d).unwrap(), "SELECT * FROM test_table");
    }

    #[test]
    fn test_sql_statement_double_quotes_lowercase() {
        let d = r#"Execute "select name from t where v > 1" against db.db"#;
        assert_eq!(sql_statement(d).unwrap(), "select name from t where v > 1");
    }

    #[test]
    fn test_sql_statement_bare_until_semicolon() {
        let d = "SELECT id, name FROM users WHERE id < 3; write rows from users.db to out.json";
        assert_eq!(
            sql_statement(d).unwrap(),
            "SELECT id, name FROM users WHERE id < 3"
        );
    }

    #[test]
    fn test_sql_statement_skips_non_query_quotes() {
        let d = r#"Name it "report" and run `SELECT 1`"#;
        assert_eq!(sql_statement(d).unwrap(), "SELECT 1");
        assert!(sql_statement("no query here").is_none());
    }

    #[test]
    fn test_quoted() {
        assert_eq!(quoted(r#"commit with message "Add data" now"#), Some("Add data"));
        assert_eq!(quoted("no quotes"), None);
    }

    #[test]
    fn test_dimensions() {
        assert_eq!(dimensions("resize to 800x600 please"), Some((800, 600)));
        assert_eq!(dimensions("resize to 50 x 40"), Some((50, 40)));
        assert_eq!(dimensions("no size"), None);
    }

    #[test]
    fn test_dimensions_ignore_file_names() {
        assert_eq!(dimensions("Convert /data/icon-1x1-source.png to /data/icon.jpg"), None);
        assert_eq!(
            dimensions("Resize /data/thumb-64x64.png to 32x32 as /data/t.png"),
            Some((32, 32))
        );
    }

    #[test]
    fn test_number_after() {
        assert_eq!(number_after("jpeg quality 70", "quality"), Some(70));
        assert_eq!(number_after("Quality of 55%", "quality"), Some(55));
        assert_eq!(number_after("quality=90", "quality"), Some(90));
        assert_eq!(number_after("no number", "quality"), None);
    }

    #[test]
    fn test_weekday() {
        assert_eq!(weekday("How many Wednesdays are there?"), Some(Weekday::Wed));
        assert_eq!(weekday("count SUNDAYS then mondays"), Some(Weekday::Sun));
        assert_eq!(weekday("no day"), None);
    }

    #[test]
    fn test_weekday_ignores_file_names() {
        let d = "Write to /data/dates-wednesdays.txt the number of Mondays listed in /data/dates.txt";
        assert_eq!(weekday(d), Some(Weekday::Mon));
        assert_eq!(weekday("Count dates in /data/dates-wednesdays.txt"), None);
    }
}
