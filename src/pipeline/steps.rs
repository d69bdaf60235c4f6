//! Typed step descriptors for the compositional chain.
//!
//! The chain is linear: every binding of a step must name an artifact that
//! the caller supplied ([`Artifact::Description`]) or that a strictly earlier
//! step produced. [`PIPELINE_STEPS`] is checked at compile time.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::error::CatalogError;
use crate::prompts::PromptCatalog;

/// Values threaded through the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Artifact {
    /// The natural-language scene description supplied by the caller.
    Description,
    Objects,
    RefinedObjects,
    MissingObjectInfo,
    GenericDistributions,
    ScenicDistributions,
}

impl Artifact {
    pub fn name(&self) -> &'static str {
        match self {
            Artifact::Description => "description",
            Artifact::Objects => "objects",
            Artifact::RefinedObjects => "refined objects",
            Artifact::MissingObjectInfo => "missing object info",
            Artifact::GenericDistributions => "generic distributions",
            Artifact::ScenicDistributions => "scenic distributions",
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A template placeholder and the artifact that fills it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub placeholder: &'static str,
    pub source: Artifact,
}

const fn bind(placeholder: &'static str, source: Artifact) -> Binding {
    Binding {
        placeholder,
        source,
    }
}

/// One query/response/extraction unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepSpec {
    /// Dotted catalog path, also used as the step id in logs and errors.
    pub id: &'static str,
    pub bindings: &'static [Binding],
    pub produces: Artifact,
}

/// The fixed chain: one → nine → four.b → five → six.
pub const PIPELINE_STEPS: &[StepSpec] = &[
    StepSpec {
        id: "one",
        bindings: &[bind("description", Artifact::Description)],
        produces: Artifact::Objects,
    },
    StepSpec {
        id: "nine",
        bindings: &[bind("objects_from_one", Artifact::Objects)],
        produces: Artifact::RefinedObjects,
    },
    StepSpec {
        id: "four.b",
        bindings: &[
            bind("description", Artifact::Description),
            bind("objects_from_nine", Artifact::RefinedObjects),
        ],
        produces: Artifact::MissingObjectInfo,
    },
    StepSpec {
        id: "five",
        bindings: &[
            bind("description", Artifact::Description),
            bind("missing_object_info", Artifact::MissingObjectInfo),
        ],
        produces: Artifact::GenericDistributions,
    },
    StepSpec {
        id: "six",
        bindings: &[
            bind("description", Artifact::Description),
            bind("missing_info", Artifact::MissingObjectInfo),
            bind("distributions", Artifact::GenericDistributions),
        ],
        produces: Artifact::ScenicDistributions,
    },
];

/// Catalog path of the compiler-error repair question.
pub const REPAIR_QUESTION: &str = "compiler_error";

/// Placeholders the repair question may use.
pub const REPAIR_PLACEHOLDERS: &[&str] = &["description", "program", "error"];

/// Finds the first binding that reads an artifact not yet available.
///
/// Returns `(step index, binding index)`.
pub const fn first_forward_reference(steps: &[StepSpec]) -> Option<(usize, usize)> {
    let mut available: u32 = 1 << (Artifact::Description as u32);
    let mut i = 0;
    while i < steps.len() {
        let bindings = steps[i].bindings;
        let mut j = 0;
        while j < bindings.len() {
            if available & (1 << (bindings[j].source as u32)) == 0 {
                return Some((i, j));
            }
            j += 1;
        }
        available |= 1 << (steps[i].produces as u32);
        i += 1;
    }
    None
}

const _: () = assert!(first_forward_reference(PIPELINE_STEPS).is_none());

/// Structural problems in a step chain.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("Step '{step}' binds '{{{placeholder}}}' to {artifact}, which no earlier step produces")]
    ForwardReference {
        step: &'static str,
        placeholder: &'static str,
        artifact: Artifact,
    },
}

/// Checks that a chain only reads artifacts produced by earlier steps.
pub fn validate_chain(steps: &[StepSpec]) -> Result<(), ChainError> {
    match first_forward_reference(steps) {
        None => Ok(()),
        Some((i, j)) => {
            let binding = steps[i].bindings[j];
            Err(ChainError::ForwardReference {
                step: steps[i].id,
                placeholder: binding.placeholder,
                artifact: binding.source,
            })
        }
    }
}

/// Checks that every step question exists and only uses bound placeholders.
///
/// Run before any gateway call so a bad catalog fails without spending tokens.
pub fn verify_catalog(steps: &[StepSpec], catalog: &PromptCatalog) -> Result<(), CatalogError> {
    for step in steps {
        for placeholder in catalog.placeholders(step.id)? {
            if !step.bindings.iter().any(|b| b.placeholder == placeholder) {
                return Err(CatalogError::UnresolvedPlaceholder {
                    template: step.id.to_string(),
                    placeholder,
                });
            }
        }
    }

    for placeholder in catalog.placeholders(REPAIR_QUESTION)? {
        if !REPAIR_PLACEHOLDERS.contains(&placeholder.as_str()) {
            return Err(CatalogError::UnresolvedPlaceholder {
                template: REPAIR_QUESTION.to_string(),
                placeholder,
            });
        }
    }
    Ok(())
}

/// Artifacts accumulated during one run.
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    values: BTreeMap<Artifact, String>,
}

impl Artifacts {
    /// Seeds the store with the caller's description.
    pub fn new(description: impl Into<String>) -> Self {
        let mut values = BTreeMap::new();
        values.insert(Artifact::Description, description.into());
        Self { values }
    }

    pub fn get(&self, artifact: Artifact) -> Option<&str> {
        self.values.get(&artifact).map(String::as_str)
    }

    pub fn insert(&mut self, artifact: Artifact, value: impl Into<String>) {
        self.values.insert(artifact, value.into());
    }

    /// Resolves a step's bindings to placeholder values.
    ///
    /// On failure returns the binding whose artifact is missing.
    pub fn bindings_for(&self, step: &StepSpec) -> Result<BTreeMap<&'static str, &str>, Binding> {
        step.bindings
            .iter()
            .map(|binding| {
                self.get(binding.source)
                    .map(|value| (binding.placeholder, value))
                    .ok_or(*binding)
            })
            .collect()
    }
}
