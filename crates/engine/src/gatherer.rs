// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reads per-task completion collateral files out of each task's workspace
//! directory and aggregates them into a synthesis/review-ready report.

use loom_core::error::{LoomError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const COMPLETION_FILE_NAME: &str = "completion.json";
pub const SYNTHESIS_FILE_NAME: &str = "synthesis.json";

/// A single task's self-reported completion record, written by the worker
/// into its own workspace directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCompletionRecord {
    pub task_id: String,
    pub status: String,
    pub summary: String,
    #[serde(default)]
    pub modified_files: Vec<String>,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub new_dependencies: Vec<String>,
}

/// A synthesis/group-consolidation completion record, carrying the same
/// fields as [`TaskCompletionRecord`] plus cross-task integration notes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisRecord {
    #[serde(flatten)]
    pub base: TaskCompletionRecord,
    #[serde(default)]
    pub integration_notes: Vec<String>,
    #[serde(default)]
    pub verified: bool,
}

/// Aggregated view over every collected completion record, ready to feed
/// into a review/synthesis step.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GatheredContext {
    pub completions: Vec<TaskCompletionRecord>,
    pub synthesis: Vec<SynthesisRecord>,
}

impl GatheredContext {
    pub fn all_issues(&self) -> Vec<&str> {
        self.completions.iter().flat_map(|c| c.issues.iter().map(String::as_str)).collect()
    }

    pub fn all_modified_files(&self) -> Vec<&str> {
        self.completions.iter().flat_map(|c| c.modified_files.iter().map(String::as_str)).collect()
    }
}

/// Reads completion/synthesis files out of task workspace directories.
pub struct ContextGatherer {
    workspaces_root: PathBuf,
}

impl ContextGatherer {
    pub fn new(workspaces_root: impl Into<PathBuf>) -> Self {
        Self { workspaces_root: workspaces_root.into() }
    }

    /// Reads `<workspaces_root>/<task_id>/completion.json`, if present.
    pub fn read_completion(&self, task_id: &str) -> Result<Option<TaskCompletionRecord>> {
        self.read_json(&self.task_dir(task_id).join(COMPLETION_FILE_NAME))
    }

    /// Reads `<workspaces_root>/<task_id>/synthesis.json`, if present.
    pub fn read_synthesis(&self, task_id: &str) -> Result<Option<SynthesisRecord>> {
        self.read_json(&self.task_dir(task_id).join(SYNTHESIS_FILE_NAME))
    }

    /// Gathers every completion and synthesis record across `task_ids`,
    /// skipping tasks with no collateral file rather than failing the whole
    /// aggregation.
    pub fn gather(&self, task_ids: &[String]) -> Result<GatheredContext> {
        let mut context = GatheredContext::default();
        for task_id in task_ids {
            if let Some(record) = self.read_completion(task_id)? {
                context.completions.push(record);
            }
            if let Some(record) = self.read_synthesis(task_id)? {
                context.synthesis.push(record);
            }
        }
        Ok(context)
    }

    fn task_dir(&self, task_id: &str) -> PathBuf {
        self.workspaces_root.join(task_id)
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let record = serde_json::from_str(&contents).map_err(|e| {
                    LoomError::validation("completion_file", format!("{}: {e}", path.display()))
                })?;
                Ok(Some(record))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LoomError::MailboxIo { path: path.display().to_string(), source: e.into() }),
        }
    }
}
