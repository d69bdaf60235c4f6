//! Prompt templates for compositional Scenic generation.
//!
//! - [`catalog`] - YAML catalog of step questions plus the shared system context
//! - [`template`] - `{placeholder}` rendering with strict resolution
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use scenic_nl::prompts::PromptCatalog;
//!
//! let catalog = PromptCatalog::builtin().expect("bundled catalog parses");
//! let bindings: BTreeMap<&str, &str> = [("description", "A cyclist overtakes a bus.")].into();
//! let question = catalog.render("one", &bindings).expect("step one renders");
//! println!("{}\n\n{}", catalog.context(), question);
//! ```

pub mod catalog;
pub mod template;

pub use catalog::{CatalogEntry, PromptCatalog, BUILTIN_CATALOG};
pub use template::{placeholders, render};
