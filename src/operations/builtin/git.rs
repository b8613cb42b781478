//! Builtin operation: clone a git repository into the sandbox and
//! optionally commit everything in the working tree.
//!
//! Uses the `git` CLI. `file://` repository URLs are mapped through the
//! sandbox like any other path argument.

use std::path::Path;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::GitConfig;
use crate::operations::{
    ensure_parent, opt_str_arg, str_arg, ArgKind, Operation, OperationContext, OperationError,
    Parameter,
};

const PARAMETERS: &[Parameter] = &[
    Parameter::required("repo_url", ArgKind::Url),
    Parameter::required("local_path", ArgKind::Path),
    Parameter::optional("commit_message", ArgKind::Text),
];

pub struct GitOperation {
    config: GitConfig,
}

impl GitOperation {
    pub fn new(config: GitConfig) -> Self {
        Self { config }
    }

    async fn run_git(&self, args: &[&str], cwd: Option<&Path>) -> Result<String, OperationError> {
        let mut command = Command::new("git");
        command
            .arg("-c")
            .arg(format!("user.name={}", self.config.author_name))
            .arg("-c")
            .arg(format!("user.email={}", self.config.author_email))
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0");
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        debug!("git {}", args.join(" "));
        let output = command
            .output()
            .await
            .context("running git (is it installed?)")?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(anyhow!("git {} failed: {}", args[0], stderr.trim()).into())
        }
    }
}

/// Repository name from a URL: `https://host/org/Hello-World.git` → `Hello-World`.
pub fn repo_name(repo_url: &str) -> Option<&str> {
    let last = repo_url
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()?;
    let name = last.strip_suffix(".git").unwrap_or(last);
    (!name.is_empty()).then_some(name)
}

/// Where git should clone from: sandbox-mapped path for `file://` URLs,
/// the URL itself otherwise.
fn clone_source(repo_url: &str, context: &OperationContext) -> Result<String, OperationError> {
    match url::Url::parse(repo_url) {
        Ok(url) if url.scheme() == "file" => {
            let path = url.to_file_path().map_err(|()| {
                OperationError::InvalidArguments(format!("invalid file URL '{repo_url}'"))
            })?;
            Ok(context
                .path(&path.to_string_lossy())
                .to_string_lossy()
                .into_owned())
        }
        Ok(url) if matches!(url.scheme(), "http" | "https" | "ssh" | "git") => {
            Ok(repo_url.to_string())
        }
        Ok(url) => Err(OperationError::InvalidArguments(format!(
            "unsupported repository scheme '{}'",
            url.scheme()
        ))),
        Err(e) => Err(OperationError::InvalidArguments(format!(
            "invalid repository URL '{repo_url}': {e}"
        ))),
    }
}

#[async_trait]
impl Operation for GitOperation {
    fn name(&self) -> &str {
        "git"
    }

    fn description(&self) -> &str {
        "Clone a git repository into the sandbox (or open an existing clone) and \
         optionally commit all changes with a message."
    }

    fn parameters(&self) -> &[Parameter] {
        PARAMETERS
    }

    async fn execute(&self, args: Value, context: &OperationContext) -> Result<Value, OperationError> {
        let repo_url = str_arg(&args, "repo_url")?;
        let local_path = context.path(str_arg(&args, "local_path")?);
        let commit_message = opt_str_arg(&args, "commit_message")?;

        let source = clone_source(repo_url, context)?;
        let local = local_path.to_string_lossy().into_owned();

        if !local_path.exists() {
            ensure_parent(&local_path)
                .with_context(|| format!("creating parent of {local}"))?;
            self.run_git(&["clone", "--", source.as_str(), local.as_str()], None).await?;
            info!("Cloned {repo_url} into {local}");
        } else if !local_path.join(".git").exists() {
            return Err(anyhow!("{local} exists and is not a git repository").into());
        }

        if let Some(message) = commit_message {
            self.run_git(&["add", "-A"], Some(&local_path)).await?;
            self.run_git(&["commit", "--allow-empty", "-m", message], Some(&local_path))
                .await?;
            info!("Committed in {local}: {message}");
        }

        Ok(json!(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::Sandbox;
    use std::sync::Arc;

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = std::process::Command::new("git")
            .args(["-c", "user.name=test", "-c", "user.email=test@localhost"])
            .args(args)
            .current_dir(dir)
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?}");
    }

    fn context() -> (tempfile::TempDir, OperationContext) {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Arc::new(Sandbox::new(dir.path().join("data"), "/data").unwrap());
        (dir, OperationContext::new(sandbox))
    }

    #[test]
    fn test_repo_name() {
        assert_eq!(
            repo_name("https://github.com/octocat/Hello-World.git"),
            Some("Hello-World")
        );
        assert_eq!(repo_name("https://github.com/octocat/Hello-World/"), Some("Hello-World"));
        assert_eq!(repo_name("git@github.com:octocat/tool.git"), Some("tool"));
        assert_eq!(repo_name("file:///data/src-repo"), Some("src-repo"));
        assert_eq!(repo_name(""), None);
    }

    #[test]
    fn test_clone_source_maps_file_urls() {
        let (_dir, ctx) = context();
        let source = clone_source("file:///data/src", &ctx).unwrap();
        assert_eq!(source, ctx.sandbox.root().join("src").to_string_lossy());
        assert_eq!(
            clone_source("https://github.com/a/b.git", &ctx).unwrap(),
            "https://github.com/a/b.git"
        );
        assert!(clone_source("ftp://example.com/repo", &ctx).is_err());
        assert!(clone_source("not a url", &ctx).is_err());
    }

    #[tokio::test]
    async fn test_existing_non_repo_directory_fails() {
        let (_dir, ctx) = context();
        std::fs::create_dir_all(ctx.sandbox.root().join("plain")).unwrap();
        let op = GitOperation::new(GitConfig::default());
        let result = op
            .execute(
                json!({"repo_url": "https://github.com/a/b.git", "local_path": "/data/plain"}),
                &ctx,
            )
            .await;
        assert!(result.unwrap_err().to_string().contains("not a git repository"));
    }

    #[tokio::test]
    async fn test_clone_and_commit_local_repository() {
        if !git_available() {
            return;
        }
        let (_dir, ctx) = context();
        let src = ctx.sandbox.root().join("src-repo");
        std::fs::create_dir_all(&src).unwrap();
        git(&src, &["init", "-q"]);
        std::fs::write(src.join("README.md"), "# hello\n").unwrap();
        git(&src, &["add", "README.md"]);
        git(&src, &["commit", "-q", "-m", "initial"]);

        let op = GitOperation::new(GitConfig::default());
        let result = op
            .execute(
                json!({"repo_url": "file:///data/src-repo", "local_path": "/data/clone"}),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(result, json!(true));
        let clone = ctx.sandbox.root().join("clone");
        assert!(clone.join("README.md").exists());

        std::fs::write(clone.join("notes.txt"), "new file").unwrap();
        op.execute(
            json!({
                "repo_url": "file:///data/src-repo",
                "local_path": "/data/clone",
                "commit_message": "Add notes"
            }),
            &ctx,
        )
        .await
        .unwrap();

        let log = std::process::Command::new("git")
            .args(["log", "-1", "--format=%s|%an"])
            .current_dir(&clone)
            .output()
            .unwrap();
        assert_eq!(
            String::from_utf8_lossy(&log.stdout).trim(),
            "Add notes|dataworks-agent"
        );
    }
}
