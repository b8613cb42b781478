//! Operation registry: the fixed, ordered catalogue of operations.
//!
//! Specs are registered once at startup; the registry is then shared
//! behind an `Arc` and never mutated. Resolution walks the specs in
//! registration order and the first full match wins, so when two
//! matchers accept the same description the earlier registration is
//! chosen. Keep narrow matchers ahead of broad ones.

use std::fmt;
use std::sync::Arc;

use anyhow::{bail, Result};
use serde_json::Value;

use super::Operation;

/// Turns a task description into the operation's argument object.
pub type Extractor = Arc<dyn Fn(&str) -> Result<Value, String> + Send + Sync>;

/// Case-sensitive keyword matcher over a task description.
///
/// Holds a list of keyword groups: every group must have at least one
/// member contained in the description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Matcher {
    groups: Vec<Vec<String>>,
}

impl Matcher {
    /// Every keyword must appear.
    pub fn all<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            groups: keywords.into_iter().map(|k| vec![k.into()]).collect(),
        }
    }

    /// Adds a group in which any one keyword is enough.
    pub fn any_of<I, S>(mut self, alternatives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups
            .push(alternatives.into_iter().map(Into::into).collect());
        self
    }

    /// An empty matcher never matches.
    pub fn matches(&self, description: &str) -> bool {
        !self.groups.is_empty()
            && self
                .groups
                .iter()
                .all(|group| group.iter().any(|k| description.contains(k.as_str())))
    }
}

/// A registered operation: handler plus how descriptions reach it.
///
/// Specs without a matcher are direct-only (reachable by name).
#[derive(Clone)]
pub struct OperationSpec {
    pub handler: Arc<dyn Operation>,
    pub matcher: Option<Matcher>,
    pub extractor: Option<Extractor>,
}

impl OperationSpec {
    pub fn new(handler: impl Operation + 'static) -> Self {
        Self {
            handler: Arc::new(handler),
            matcher: None,
            extractor: None,
        }
    }

    pub fn matching(mut self, matcher: Matcher) -> Self {
        self.matcher = Some(matcher);
        self
    }

    pub fn extracting<F>(mut self, extractor: F) -> Self
    where
        F: Fn(&str) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.extractor = Some(Arc::new(extractor));
        self
    }

    pub fn name(&self) -> &str {
        self.handler.name()
    }

    pub fn is_dispatchable(&self) -> bool {
        self.matcher.is_some()
    }

    fn matches(&self, description: &str) -> bool {
        self.matcher
            .as_ref()
            .is_some_and(|m| m.matches(description))
    }
}

impl fmt::Debug for OperationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationSpec")
            .field("name", &self.name())
            .field("matcher", &self.matcher)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct OperationRegistry {
    specs: Vec<OperationSpec>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a spec. Startup only.
    pub fn register(&mut self, spec: OperationSpec) -> Result<()> {
        if self.get(spec.name()).is_some() {
            bail!("operation '{}' is already registered", spec.name());
        }
        if spec.matcher.is_some() && spec.extractor.is_none() {
            bail!(
                "operation '{}' has a matcher but no argument extractor",
                spec.name()
            );
        }
        self.specs.push(spec);
        Ok(())
    }

    /// First spec, in registration order, whose matcher accepts `description`.
    pub fn resolve(&self, description: &str) -> Option<&OperationSpec> {
        self.specs.iter().find(|spec| spec.matches(description))
    }

    pub fn get(&self, name: &str) -> Option<&OperationSpec> {
        self.specs.iter().find(|spec| spec.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OperationSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
