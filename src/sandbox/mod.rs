//! Filesystem sandbox: the single root every operation is confined to.
//!
//! All path decisions go through [`Sandbox::check`], which resolves a
//! path to its canonical absolute form before comparing it with the root:
//!
//! 1. The virtual mount prefix (`/data` by default) is mapped onto the root
//! 2. Relative paths are joined to the root (never to the process cwd)
//! 3. The longest existing ancestor is canonicalized (symlinks followed),
//!    the missing remainder is normalized lexically; a dangling symlink on
//!    the way is resolved through its target, since writing to it would
//!    create that target
//! 4. The result must be the root itself or nested under it, compared
//!    component by component
//!
//! Raw string prefixes are never compared: `root_evil/x` and
//! `root/../evil` both start with `root` as text and are both outside.

pub mod gate;

use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::config::SandboxConfig;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("empty path")]
    EmptyPath,

    #[error("'{path}' resolves to '{}', outside the sandbox", .resolved.display())]
    Outside { path: String, resolved: PathBuf },

    #[error("cannot resolve '{path}': {source}")]
    Unresolvable {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// The sandbox root plus the virtual prefix used to address it.
///
/// Immutable after construction; shared between concurrent dispatches
/// behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
    mount: Option<PathBuf>,
}

impl Sandbox {
    /// Creates the root directory if needed and canonicalizes it.
    pub fn new(root: impl AsRef<Path>, mount: &str) -> io::Result<Self> {
        let root = root.as_ref();
        if root.as_os_str().is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "sandbox root must not be empty",
            ));
        }
        std::fs::create_dir_all(root)?;
        let root = std::fs::canonicalize(root)?;

        let mount = if mount.is_empty() {
            None
        } else {
            let mount = PathBuf::from(mount);
            if !mount.is_absolute() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("sandbox mount '{}' must be absolute", mount.display()),
                ));
            }
            Some(mount)
        };

        Ok(Self { root, mount })
    }

    pub fn from_config(config: &SandboxConfig) -> io::Result<Self> {
        Self::new(&config.root, &config.mount)
    }

    /// Canonical absolute sandbox root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a caller-supplied path onto the filesystem without checking it:
    /// mount prefix → root, relative → under root, other absolute → as is.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let raw = Path::new(path);
        if let Some(ref mount) = self.mount {
            if let Ok(rest) = raw.strip_prefix(mount) {
                return self.root.join(rest);
            }
        }
        if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.root.join(raw)
        }
    }

    /// Resolves `path` canonically and returns it if it lies inside the root.
    pub fn check(&self, path: &str) -> Result<PathBuf, SandboxError> {
        if path.is_empty() {
            return Err(SandboxError::EmptyPath);
        }

        let resolved =
            canonicalize_lenient(&self.resolve(path)).map_err(|source| {
                SandboxError::Unresolvable {
                    path: path.to_string(),
                    source,
                }
            })?;

        if resolved.starts_with(&self.root) {
            Ok(resolved)
        } else {
            Err(SandboxError::Outside {
                path: path.to_string(),
                resolved,
            })
        }
    }

    /// True iff the canonical form of `path` is the root or a descendant.
    pub fn is_within_sandbox(&self, path: &str) -> bool {
        self.check(path).is_ok()
    }
}

/// Dangling links followed before giving up, like the kernel's `ELOOP` limit.
const MAX_LINK_DEPTH: usize = 40;

/// Canonicalizes a path that may not exist yet.
///
/// The deepest existing ancestor is resolved by the OS and components past
/// it are normalized lexically. A component that is a dangling symlink is
/// replaced by its target and resolution starts over.
fn canonicalize_lenient(path: &Path) -> io::Result<PathBuf> {
    resolve_lenient(path, 0)
}

fn resolve_lenient(path: &Path, depth: usize) -> io::Result<PathBuf> {
    if depth > MAX_LINK_DEPTH {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("too many levels of symbolic links in '{}'", path.display()),
        ));
    }

    let components: Vec<Component> = path.components().collect();

    for split in (1..=components.len()).rev() {
        let prefix: PathBuf = components[..split].iter().collect();
        match std::fs::canonicalize(&prefix) {
            Ok(mut resolved) => {
                for component in &components[split..] {
                    match component {
                        Component::Normal(name) => resolved.push(name),
                        Component::ParentDir => {
                            resolved.pop();
                        }
                        Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
                    }
                }
                return Ok(resolved);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if let Some(target) = dangling_target(&prefix)? {
                    let mut next = target;
                    next.extend(&components[split..]);
                    return resolve_lenient(&next, depth + 1);
                }
            }
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("no existing ancestor for '{}'", path.display()),
    ))
}

/// Where `path` points if it is a symlink, relative targets taken from the
/// link's directory.
fn dangling_target(path: &Path) -> io::Result<Option<PathBuf>> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => {
            let target = std::fs::read_link(path)?;
            let base = path.parent().unwrap_or_else(|| Path::new("/"));
            Ok(Some(base.join(target)))
        }
        Ok(_) => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
