//! Prompt template catalog.
//!
//! The catalog is a YAML document mapping step identifiers to questions.
//! Compound steps nest sub-steps one level down (`four: { b: { question } }`),
//! addressed with dotted paths such as `"four.b"`. The top-level `context`
//! entry is the system message shared by every query of a run.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use super::template;
use crate::error::CatalogError;

/// Catalog bundled with the binary.
pub const BUILTIN_CATALOG: &str = include_str!("../../prompts/compositional.yaml");

/// One entry of the catalog: a question or a group of sub-entries.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CatalogEntry {
    Question { question: String },
    Group(BTreeMap<String, CatalogEntry>),
}

#[derive(Debug, Deserialize)]
struct RawCatalog {
    context: Option<String>,
    #[serde(flatten)]
    entries: BTreeMap<String, CatalogEntry>,
}

/// Read-only lookup of question templates keyed by step path.
#[derive(Debug, Clone)]
pub struct PromptCatalog {
    context: String,
    entries: BTreeMap<String, CatalogEntry>,
}

impl PromptCatalog {
    /// Parses a catalog from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CatalogError> {
        let raw: RawCatalog = serde_yaml::from_str(yaml)?;
        let context = raw.context.ok_or(CatalogError::MissingContext)?;
        Ok(Self {
            context,
            entries: raw.entries,
        })
    }

    /// Reads and parses a catalog file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// The catalog bundled with the crate.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_yaml_str(BUILTIN_CATALOG)
    }

    /// The shared system message.
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Looks up the question template at a dotted path (`"one"`, `"four.b"`).
    pub fn question(&self, path: &str) -> Result<&str, CatalogError> {
        let mut parts = path.split('.');
        let first = parts.next().unwrap_or_default();
        let mut entry = self
            .entries
            .get(first)
            .ok_or_else(|| CatalogError::QuestionNotFound(path.to_string()))?;

        for part in parts {
            entry = match entry {
                CatalogEntry::Group(children) => children
                    .get(part)
                    .ok_or_else(|| CatalogError::QuestionNotFound(path.to_string()))?,
                CatalogEntry::Question { .. } => {
                    return Err(CatalogError::QuestionNotFound(path.to_string()))
                }
            };
        }

        match entry {
            CatalogEntry::Question { question } => Ok(question),
            CatalogEntry::Group(_) => Err(CatalogError::NotAQuestion(path.to_string())),
        }
    }

    /// Renders the question at `path` with the given bindings.
    pub fn render(
        &self,
        path: &str,
        bindings: &BTreeMap<&str, &str>,
    ) -> Result<String, CatalogError> {
        template::render(path, self.question(path)?, bindings)
    }

    /// Placeholders referenced by the question at `path`.
    pub fn placeholders(&self, path: &str) -> Result<Vec<String>, CatalogError> {
        Ok(template::placeholders(self.question(path)?))
    }

    /// Dotted paths of every question in the catalog, sorted.
    pub fn question_paths(&self) -> Vec<String> {
        fn walk(prefix: &str, entries: &BTreeMap<String, CatalogEntry>, out: &mut Vec<String>) {
            for (key, entry) in entries {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                match entry {
                    CatalogEntry::Question { .. } => out.push(path),
                    CatalogEntry::Group(children) => walk(&path, children, out),
                }
            }
        }

        let mut out = Vec::new();
        walk("", &self.entries, &mut out);
        out
    }
}
