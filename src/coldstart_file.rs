//! Reading and comparing `.coldstart` documents
//!
//! A `.coldstart` file is the text report written by `coldtrace analyze`.
//! Sections are found by their header line; the rows follow after any blank
//! lines and run until the next blank line.

use crate::error::SectionError;
use crate::report::{JIT_HEADER, WORKER_ASSEMBLY_LOADER_HEADER, WORKER_JIT_HEADER};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;

const ROW_DELIMITER: &str = " : ";

/// Ledger sections that can be compared across documents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Jit,
    WorkerJit,
    WorkerAssemblyLoader,
}

impl Section {
    pub fn header(self) -> &'static str {
        match self {
            Section::Jit => JIT_HEADER,
            Section::WorkerJit => WORKER_JIT_HEADER,
            Section::WorkerAssemblyLoader => WORKER_ASSEMBLY_LOADER_HEADER,
        }
    }

    /// What the rows of this section name
    pub fn noun(self) -> &'static str {
        match self {
            Section::WorkerAssemblyLoader => "Assemblies",
            Section::Jit | Section::WorkerJit => "Jitted Methods",
        }
    }
}

/// One `name : value` row
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRow {
    pub name: String,
    pub value_ms: f64,
}

/// Rows of `section`, in document order
pub fn parse_section(text: &str, section: Section) -> Result<Vec<LedgerRow>, SectionError> {
    let header = section.header();
    let mut lines = text
        .lines()
        .enumerate()
        .skip_while(|(_, line)| line.trim_end() != header);

    if lines.next().is_none() {
        return Err(SectionError::MissingSection { header });
    }

    lines
        .skip_while(|(_, line)| line.trim().is_empty())
        .take_while(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| parse_row(line).ok_or_else(|| malformed(header, idx, line)))
        .collect()
}

fn parse_row(line: &str) -> Option<LedgerRow> {
    let (name, value) = line.trim_end().rsplit_once(ROW_DELIMITER)?;
    Some(LedgerRow {
        name: name.to_string(),
        value_ms: value.trim().parse().ok()?,
    })
}

fn malformed(header: &'static str, idx: usize, line: &str) -> SectionError {
    SectionError::MalformedRow {
        header,
        line: idx + 1,
        text: line.to_string(),
    }
}

/// Read a section straight from a file
pub fn read_section<P: AsRef<Path>>(path: P, section: Section) -> Result<Vec<LedgerRow>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read cold start file: {}", path.display()))?;
    parse_section(&text, section).with_context(|| format!("In {}", path.display()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Names present in both documents
    Shared,
    /// Names present in only one of them
    Diff,
    /// Every left name with both values
    MethodTimes,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ComparisonResult {
    Shared(Vec<String>),
    Diff {
        only_left: Vec<String>,
        only_right: Vec<String>,
    },
    MethodTimes(Vec<(String, f64, Option<f64>)>),
}

pub fn compare(left: &[LedgerRow], right: &[LedgerRow], mode: Comparison) -> ComparisonResult {
    let right_values: HashMap<&str, f64> = right
        .iter()
        .map(|row| (row.name.as_str(), row.value_ms))
        .collect();

    match mode {
        Comparison::Shared => ComparisonResult::Shared(
            left.iter()
                .filter(|row| right_values.contains_key(row.name.as_str()))
                .map(|row| row.name.clone())
                .collect(),
        ),
        Comparison::Diff => {
            let left_names: HashMap<&str, f64> = left
                .iter()
                .map(|row| (row.name.as_str(), row.value_ms))
                .collect();
            ComparisonResult::Diff {
                only_left: left
                    .iter()
                    .filter(|row| !right_values.contains_key(row.name.as_str()))
                    .map(|row| row.name.clone())
                    .collect(),
                only_right: right
                    .iter()
                    .filter(|row| !left_names.contains_key(row.name.as_str()))
                    .map(|row| row.name.clone())
                    .collect(),
            }
        }
        Comparison::MethodTimes => ComparisonResult::MethodTimes(
            left.iter()
                .map(|row| {
                    (
                        row.name.clone(),
                        row.value_ms,
                        right_values.get(row.name.as_str()).copied(),
                    )
                })
                .collect(),
        ),
    }
}

impl ComparisonResult {
    /// Plain-text rendering for the terminal
    pub fn render(&self, section: Section, left_name: &str, right_name: &str) -> String {
        let mut out = String::new();
        match self {
            ComparisonResult::Shared(names) => {
                out.push_str(&format!(
                    "Traces '{left_name}' and '{right_name}' share the following {}:\n\n",
                    section.noun()
                ));
                for name in names {
                    out.push_str(&format!("- {name}\n"));
                }
            }
            ComparisonResult::Diff {
                only_left,
                only_right,
            } => {
                for (trace, names) in [(left_name, only_left), (right_name, only_right)] {
                    out.push_str(&format!("{} only in '{trace}':\n\n", section.noun()));
                    for name in names {
                        out.push_str(&format!("- {name}\n"));
                    }
                    out.push('\n');
                }
            }
            ComparisonResult::MethodTimes(rows) => {
                out.push_str(&format!(
                    "Name{ROW_DELIMITER}{left_name}{ROW_DELIMITER}{right_name}\n"
                ));
                for (name, left, right) in rows {
                    let right = right.map_or_else(|| "-".to_string(), |v| v.to_string());
                    out.push_str(&format!("{name}{ROW_DELIMITER}{left}{ROW_DELIMITER}{right}\n"));
                }
            }
        }
        out
    }
}
