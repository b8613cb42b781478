use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub git: GitConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SandboxConfig {
    /// Directory every file-touching operation is confined to.
    /// Created at startup if it does not exist.
    #[serde(default = "default_sandbox_root")]
    pub root: PathBuf,
    /// Virtual prefix that task descriptions use to name the root,
    /// e.g. "/data/dates.txt" → "<root>/dates.txt". Empty disables it.
    #[serde(default = "default_mount")]
    pub mount: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitConfig {
    /// Identity used for commits made by the git operation
    #[serde(default = "default_author_name")]
    pub author_name: String,
    #[serde(default = "default_author_email")]
    pub author_email: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_sandbox_root() -> PathBuf {
    PathBuf::from("./data")
}

fn default_mount() -> String {
    "/data".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_max_response_bytes() -> u64 {
    25 * 1024 * 1024
}

fn default_user_agent() -> String {
    format!("dataworks-agent/{}", env!("CARGO_PKG_VERSION"))
}

fn default_author_name() -> String {
    "dataworks-agent".to_string()
}

fn default_author_email() -> String {
    "agent@localhost".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            root: default_sandbox_root(),
            mount: default_mount(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_response_bytes: default_max_response_bytes(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            author_name: default_author_name(),
            author_email: default_author_email(),
        }
    }
}

impl ServerConfig {
    /// Socket address string for the listener, e.g. "127.0.0.1:8000"
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses TOML content, expanding environment variables like ${DATA_ROOT}
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let expanded = shellexpand::env(content)?;
        let config: Config = toml::from_str(&expanded)?;
        Ok(config)
    }

    /// Loads `path` if it exists. A missing file is only tolerated when
    /// the caller did not ask for it explicitly.
    pub fn load_or_default(path: &str, explicit: bool) -> anyhow::Result<Self> {
        if !explicit && !Path::new(path).exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.sandbox.root, PathBuf::from("./data"));
        assert_eq!(config.sandbox.mount, "/data");
        assert_eq!(config.http.timeout_secs, 30);
        assert_eq!(config.http.max_response_bytes, 25 * 1024 * 1024);
        assert_eq!(config.git.author_name, "dataworks-agent");
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::parse(
            r#"
[server]
port = 9000

[sandbox]
root = "/srv/data"
mount = ""
"#,
        )
        .unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.sandbox.root, PathBuf::from("/srv/data"));
        assert!(config.sandbox.mount.is_empty());
        assert_eq!(config.http.connect_timeout_secs, 10);
    }

    #[test]
    fn test_env_expansion() {
        std::env::set_var("DATAWORKS_TEST_ROOT", "/tmp/dataworks-env");
        let config = Config::parse(
            r#"
[sandbox]
root = "${DATAWORKS_TEST_ROOT}"
"#,
        )
        .unwrap();
        assert_eq!(config.sandbox.root, PathBuf::from("/tmp/dataworks-env"));
    }

    #[test]
    fn test_missing_env_var_is_an_error() {
        let result = Config::parse(
            r#"
[sandbox]
root = "${DATAWORKS_SURELY_UNSET_VARIABLE}"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(Config::parse("[server\nport = 1").is_err());
    }

    #[test]
    fn test_load_or_default_missing_implicit_file() {
        let config = Config::load_or_default("/nonexistent/agent.toml", false).unwrap();
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_load_or_default_missing_explicit_file() {
        assert!(Config::load_or_default("/nonexistent/agent.toml", true).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(&path, "[git]\nauthor_email = \"bot@example.com\"\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.git.author_email, "bot@example.com");
        assert_eq!(config.git.author_name, "dataworks-agent");
    }

    #[test]
    fn test_bind_address() {
        let server = ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 8080,
        };
        assert_eq!(server.bind_address(), "0.0.0.0:8080");
    }
}
