// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The task descriptor YAML format (§6): `title`, `description`,
//! `repo_setup[]`, `acceptance_criteria[]`, `timeout_seconds`, `tags[]`.

use serde::Deserialize;

/// The closed set of acceptance criterion kinds. An unknown `kind` fails
/// validation rather than being silently accepted (§6).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AcceptanceCriterion {
    FileExists { path: String },
    TestsPass { command: String },
    GrepMatch { path: String, pattern: String },
    CommandSucceeds { command: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskDescriptor {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub repo_setup: Vec<String>,
    #[serde(default)]
    pub acceptance_criteria: Vec<RawCriterion>,
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Deserialized first as an untyped map so an unrecognized `kind` can be
/// reported as a validation error instead of a generic serde parse
/// failure (serde's `#[serde(tag = ...)]` would otherwise reject the
/// whole document with a less actionable message).
#[derive(Debug, Clone, Deserialize)]
pub struct RawCriterion {
    pub kind: String,
    #[serde(flatten)]
    pub fields: serde_yaml::Mapping,
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unknown acceptance criterion kind {0:?} (expected one of file_exists, tests_pass, grep_match, command_succeeds)")]
    UnknownCriterionKind(String),
    #[error("acceptance criterion {kind:?} missing required field {field:?}")]
    MissingField { kind: String, field: &'static str },
}

fn field<'a>(raw: &'a RawCriterion, name: &'static str) -> Result<&'a str, ImportError> {
    raw.fields
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ImportError::MissingField { kind: raw.kind.clone(), field: name })
}

fn resolve_criterion(raw: &RawCriterion) -> Result<AcceptanceCriterion, ImportError> {
    match raw.kind.as_str() {
        "file_exists" => Ok(AcceptanceCriterion::FileExists { path: field(raw, "path")?.to_string() }),
        "tests_pass" => Ok(AcceptanceCriterion::TestsPass { command: field(raw, "command")?.to_string() }),
        "grep_match" => Ok(AcceptanceCriterion::GrepMatch {
            path: field(raw, "path")?.to_string(),
            pattern: field(raw, "pattern")?.to_string(),
        }),
        "command_succeeds" => Ok(AcceptanceCriterion::CommandSucceeds { command: field(raw, "command")?.to_string() }),
        other => Err(ImportError::UnknownCriterionKind(other.to_string())),
    }
}

/// Parse a task descriptor YAML document, validating every acceptance
/// criterion's `kind` against the closed set.
pub fn from_yaml(content: &str) -> Result<(TaskDescriptor, Vec<AcceptanceCriterion>), ImportError> {
    let descriptor: TaskDescriptor = serde_yaml::from_str(content)?;
    let criteria = descriptor.acceptance_criteria.iter().map(resolve_criterion).collect::<Result<Vec<_>, _>>()?;
    Ok((descriptor, criteria))
}
