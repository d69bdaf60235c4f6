//! Program assembly from step answers.
//!
//! Turns the refined object list into Scenic constants and the Scenic-specific
//! distributions into variable declarations, producing the "constants and
//! variables" section of a program.

use std::collections::BTreeSet;
use std::fmt::Write;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use super::orchestrator::StepRecord;
use crate::llm::Usage;

static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*•+]|\(?\d+[.):]|\(?[a-zA-Z][.)])\s+").expect("Invalid list marker regex")
});

static DECLARATION_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_ \-]*$").expect("Invalid declaration name regex")
});

static CAMEL_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z])([A-Z])").expect("Invalid camel case regex"));

/// A Scenic program with its compile history.
#[derive(Debug, Clone)]
pub struct AssembledProgram {
    /// Program text of the latest attempt.
    pub source: String,
    /// Compiler diagnostic of the latest attempt, `None` once it compiled.
    pub diagnostics: Option<String>,
    pub compile_attempts: u32,
    pub repairs: u32,
    /// Step and repair queries in dispatch order.
    pub transcript: Vec<StepRecord>,
    /// Token usage summed over every query of the run.
    pub usage: Usage,
}

impl AssembledProgram {
    pub fn new(source: impl Into<String>, transcript: Vec<StepRecord>, usage: Usage) -> Self {
        Self {
            source: source.into(),
            diagnostics: None,
            compile_attempts: 0,
            repairs: 0,
            transcript,
            usage,
        }
    }

    /// Steps whose completion had no final-answer marker.
    pub fn unmarked_steps(&self) -> Vec<&str> {
        self.transcript
            .iter()
            .filter(|r| !r.marker_found)
            .map(|r| r.step.as_str())
            .collect()
    }
}

/// A `NAME = expression` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub expr: String,
}

/// Splits an object list on newlines and commas.
///
/// Bullets, numbering, quotes and a trailing period are removed; names are
/// lowercased and deduplicated in first-seen order.
pub fn parse_objects(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut objects = Vec::new();

    for line in strip_code_fences(text).lines() {
        let line = LIST_MARKER.replace(line, "");
        for item in line.split(',') {
            let name = item
                .trim()
                .trim_matches(|c| matches!(c, '"' | '\'' | '`'))
                .trim_end_matches('.')
                .trim()
                .to_lowercase();
            if name.is_empty() {
                continue;
            }
            if seen.insert(name.clone()) {
                objects.push(name);
            }
        }
    }
    objects
}

/// Normalises a name to SCREAMING_SNAKE_CASE.
///
/// Returns `None` when nothing alphanumeric remains.
pub fn to_constant_name(name: &str) -> Option<String> {
    let split = CAMEL_BOUNDARY.replace_all(name.trim(), "${1}_${2}");
    let mut out = String::with_capacity(split.len());
    for c in split.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_uppercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let out = out.trim_matches('_').to_string();

    if out.is_empty() {
        None
    } else if out.starts_with(|c: char| c.is_ascii_digit()) {
        Some(format!("OBJ_{}", out))
    } else {
        Some(out)
    }
}

/// Parses `name = expr` or `name: expr` lines.
///
/// Comments, fences and lines without a usable name are skipped.
pub fn parse_declarations(text: &str) -> Vec<Declaration> {
    let mut declarations = Vec::new();

    for line in strip_code_fences(text).lines() {
        let line = LIST_MARKER.replace(line, "");
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some(index) = declaration_separator(line) else {
            debug!(line, "Skipping line without a declaration");
            continue;
        };

        let (raw_name, expr) = (line[..index].trim(), line[index + 1..].trim());
        if expr.is_empty() || !DECLARATION_NAME.is_match(raw_name) {
            debug!(line, "Skipping malformed declaration");
            continue;
        }
        if let Some(name) = to_constant_name(raw_name) {
            declarations.push(Declaration {
                name,
                expr: expr.to_string(),
            });
        }
    }
    declarations
}

/// Byte index of the first `:` or assignment `=`, whichever comes first.
///
/// Comparison operators (`==`, `!=`, `<=`, `>=`) are not separators.
fn declaration_separator(line: &str) -> Option<usize> {
    let bytes = line.as_bytes();
    bytes.iter().enumerate().find_map(|(i, &b)| match b {
        b':' => Some(i),
        b'=' => {
            let prev = i.checked_sub(1).map(|p| bytes[p]);
            let next = bytes.get(i + 1).copied();
            let comparison =
                next == Some(b'=') || matches!(prev, Some(b'=' | b'!' | b'<' | b'>'));
            (!comparison).then_some(i)
        }
        _ => None,
    })
}

/// Returns the body of the first fenced block, or the trimmed text if unfenced.
pub fn strip_code_fences(text: &str) -> String {
    let mut in_block = false;
    let mut block = Vec::new();

    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            if in_block {
                return block.join("\n").trim().to_string();
            }
            in_block = true;
            continue;
        }
        if in_block {
            block.push(line);
        }
    }

    if in_block {
        // unterminated fence
        block.join("\n").trim().to_string()
    } else {
        text.trim().to_string()
    }
}

/// Builds the constants and variables section of a Scenic program.
pub fn assemble(description: &str, refined_objects: &str, scenic_distributions: &str) -> String {
    let mut source = String::new();
    let _ = writeln!(source, "# Scenic program generated from the description:");
    for line in description.trim().lines() {
        let _ = writeln!(source, "#   {}", line.trim_end());
    }

    let mut names = BTreeSet::new();

    source.push_str("\n## CONSTANTS\n");
    for object in parse_objects(refined_objects) {
        let Some(name) = to_constant_name(&object) else {
            continue;
        };
        if names.insert(name.clone()) {
            let _ = writeln!(source, "{} = \"{}\"", name, escape_string(&object));
        }
    }

    source.push_str("\n## VARIABLES\n");
    let declarations = parse_declarations(scenic_distributions);
    if declarations.is_empty() {
        warn!("No distribution declarations found in step answer");
    }
    for decl in declarations {
        if !names.insert(decl.name.clone()) {
            warn!(name = %decl.name, "Skipping duplicate declaration");
            continue;
        }
        let _ = writeln!(source, "{} = {}", decl.name, decl.expr);
    }

    source
}

fn escape_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
