// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy: domain errors, semantic errors, and the classification
//! helpers (`IsRetryable`, `IsUserFacing`, `GetSeverity`) callers use to
//! decide how to react to a failure without matching on every variant.

use std::fmt;
use thiserror::Error;

/// How serious an error is, independent of whether it is retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

crate::simple_display! {
    Severity {
        Debug => "debug",
        Info => "info",
        Warning => "warning",
        Error => "error",
        Critical => "critical",
    }
}

/// Domain-specific error kinds — each carries the identifiers needed to
/// explain *which* session/instance/coordinator-task/git operation failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("session error: {message}")]
    Session { message: String },

    #[error("instance error (instance={instance_id}): {message}")]
    Instance { instance_id: String, message: String },

    #[error("coordinator error (task={task_id:?}, group={group_index:?}, phase={phase:?}): {message}")]
    Coordinator {
        task_id: Option<String>,
        group_index: Option<usize>,
        phase: Option<String>,
        message: String,
    },

    #[error("git error (repo={repo:?}, branch={branch:?}, worktree={worktree:?}): {message}")]
    Git {
        repo: Option<String>,
        branch: Option<String>,
        worktree: Option<String>,
        message: String,
        /// Captured subprocess output, when the failure came from running `git`.
        output: Option<String>,
    },
}

/// Cross-cutting semantic error kinds shared by every domain.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SemanticError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("validation failed for field `{field}`: {value}")]
    Validation { field: String, value: String },

    #[error("operation `{operation}` timed out after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },
}

/// Sentinel error conditions matched by identity rather than by message —
/// used where callers need `matches!(err.sentinel(), Some(Sentinel::Locked))`
/// rather than string comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    NotFound,
    Locked,
    Corrupted,
    CycleDetected,
    Timeout,
    Canceled,
}

/// The top-level error type returned by every fallible public operation in
/// the coordination core.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoomError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Semantic(#[from] SemanticError),

    #[error("{path} is locked by {owner}")]
    Locked { path: String, owner: String },

    #[error("cycle detected among tasks: {0:?}")]
    CycleDetected(Vec<String>),

    #[error("operation canceled")]
    Canceled,

    #[error("mailbox I/O error for {path}: {source}")]
    MailboxIo { path: String, source: IoErrorMessage },
}

/// `std::io::Error` is not `Clone`/`PartialEq`, so I/O failures are captured
/// as their rendered message — the error is logged in full at the call site
/// via `tracing`, and the retained string is what callers see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoErrorMessage(pub String);

impl fmt::Display for IoErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<std::io::Error> for IoErrorMessage {
    fn from(e: std::io::Error) -> Self {
        Self(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LoomError>;

impl LoomError {
    pub fn validation(field: impl Into<String>, value: impl Into<String>) -> Self {
        SemanticError::Validation { field: field.into(), value: value.into() }.into()
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        SemanticError::NotFound(what.into()).into()
    }

    pub fn already_exists(what: impl Into<String>) -> Self {
        SemanticError::AlreadyExists(what.into()).into()
    }

    pub fn timeout(operation: impl Into<String>, duration_ms: u64) -> Self {
        SemanticError::Timeout { operation: operation.into(), duration_ms }.into()
    }

    pub fn coordinator(
        task_id: Option<String>,
        group_index: Option<usize>,
        phase: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        DomainError::Coordinator { task_id, group_index, phase, message: message.into() }.into()
    }

    /// Matches this error against a [`Sentinel`] condition by identity.
    pub fn sentinel(&self) -> Option<Sentinel> {
        match self {
            LoomError::Semantic(SemanticError::NotFound(_)) => Some(Sentinel::NotFound),
            LoomError::Locked { .. } => Some(Sentinel::Locked),
            LoomError::CycleDetected(_) => Some(Sentinel::CycleDetected),
            LoomError::Semantic(SemanticError::Timeout { .. }) => Some(Sentinel::Timeout),
            LoomError::Canceled => Some(Sentinel::Canceled),
            _ => None,
        }
    }

    /// Whether the caller may reasonably retry the operation that produced
    /// this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            LoomError::Semantic(SemanticError::Timeout { .. }) => true,
            LoomError::Locked { .. } => true,
            LoomError::MailboxIo { .. } => true,
            LoomError::Domain(_) => false,
            LoomError::Semantic(_) => false,
            LoomError::CycleDetected(_) => false,
            LoomError::Canceled => false,
        }
    }

    /// Whether this error's `Display` text is safe to render directly to a
    /// human (as opposed to being logged and replaced with a generic
    /// message at the UI boundary).
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            LoomError::Semantic(_) | LoomError::Locked { .. } | LoomError::CycleDetected(_)
        ) || matches!(self, LoomError::Domain(DomainError::Coordinator { .. }))
    }

    pub fn severity(&self) -> Severity {
        match self {
            LoomError::Semantic(SemanticError::NotFound(_)) => Severity::Info,
            LoomError::Semantic(SemanticError::Validation { .. }) => Severity::Warning,
            LoomError::Semantic(SemanticError::AlreadyExists(_)) => Severity::Info,
            LoomError::Semantic(SemanticError::Timeout { .. }) => Severity::Warning,
            LoomError::Locked { .. } => Severity::Info,
            LoomError::CycleDetected(_) => Severity::Critical,
            LoomError::Canceled => Severity::Debug,
            LoomError::MailboxIo { .. } => Severity::Error,
            LoomError::Domain(DomainError::Git { .. }) => Severity::Error,
            LoomError::Domain(_) => Severity::Error,
        }
    }

    pub fn is_domain_error(&self) -> bool {
        matches!(self, LoomError::Domain(_))
    }

    pub fn is_semantic_error(&self) -> bool {
        matches!(self, LoomError::Semantic(_))
    }
}
