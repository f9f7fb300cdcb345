// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed append-only mailbox log, one JSONL file per recipient.
//!
//! Disk layout:
//! ```text
//! mailbox/broadcast/index.jsonl
//! mailbox/<instanceID>/index.jsonl
//! ```

use loom_core::error::{IoErrorMessage, LoomError, Result};
use loom_core::{InstanceId, Message, BROADCAST_RECIPIENT};
use parking_lot::Mutex;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only per-recipient message log rooted at a session directory.
pub struct MailboxStore {
    root: PathBuf,
    /// Guards the open-append-write sequence; each record is small enough
    /// that POSIX append is atomic on its own, but serializing here keeps
    /// the on-disk ordering identical to the in-process `Send` call order.
    write_lock: Mutex<()>,
}

impl MailboxStore {
    pub fn new(session_root: impl Into<PathBuf>) -> Self {
        Self { root: session_root.into().join("mailbox"), write_lock: Mutex::new(()) }
    }

    fn dir_for(&self, recipient: &str) -> PathBuf {
        self.root.join(recipient)
    }

    fn log_path(&self, recipient: &str) -> PathBuf {
        self.dir_for(recipient).join("index.jsonl")
    }

    /// Validates sender/recipient/type, fills in ID and timestamp if unset,
    /// creates the recipient directory lazily (mode 0755), and appends the
    /// JSON-serialized message plus a newline under the write lock (mode
    /// 0644 on creation). Returns the normalized message actually stored.
    pub fn send(&self, message: Message) -> Result<Message> {
        let message = message.normalize()?;
        let _guard = self.write_lock.lock();

        let dir = self.dir_for(message.to.as_str());
        create_dir_mode_0755(&dir).map_err(|e| LoomError::MailboxIo {
            path: dir.display().to_string(),
            source: IoErrorMessage::from(e),
        })?;

        let path = self.log_path(message.to.as_str());
        let line = serde_json::to_string(&message)
            .map_err(|e| LoomError::MailboxIo { path: path.display().to_string(), source: IoErrorMessage(e.to_string()) })?;

        let mut file = open_append_mode_0644(&path).map_err(|e| LoomError::MailboxIo {
            path: path.display().to_string(),
            source: IoErrorMessage::from(e),
        })?;
        writeln!(file, "{line}").map_err(|e| LoomError::MailboxIo {
            path: path.display().to_string(),
            source: IoErrorMessage::from(e),
        })?;

        Ok(message)
    }

    /// Reads every broadcast message. Missing file returns an empty list,
    /// not an error; malformed lines are silently skipped.
    pub fn read_broadcast(&self) -> Result<Vec<Message>> {
        self.read_log(&self.log_path(BROADCAST_RECIPIENT))
    }

    /// Reads every message targeted directly at `instance` (excludes
    /// broadcast — callers wanting both use [`MailboxStore::read_all`]).
    pub fn read_for_instance(&self, instance: &InstanceId) -> Result<Vec<Message>> {
        self.read_log(&self.log_path(instance.as_str()))
    }

    /// Concatenates broadcast + targeted messages, sorted by timestamp
    /// ascending (P1: mailbox monotonicity).
    pub fn read_all(&self, instance: &InstanceId) -> Result<Vec<Message>> {
        let mut messages = self.read_broadcast()?;
        messages.extend(self.read_for_instance(instance)?);
        messages.sort_by_key(|m| m.timestamp);
        Ok(messages)
    }

    fn read_log(&self, path: &Path) -> Result<Vec<Message>> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(LoomError::MailboxIo {
                    path: path.display().to_string(),
                    source: IoErrorMessage::from(e),
                })
            }
        };

        let mut messages = Vec::new();
        for (lineno, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Message>(line) {
                Ok(message) => messages.push(message),
                Err(e) => {
                    tracing::warn!(path = %path.display(), lineno, error = %e, "skipping malformed mailbox record");
                }
            }
        }
        Ok(messages)
    }
}

#[cfg(unix)]
fn create_dir_mode_0755(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new().recursive(true).mode(0o755).create(dir)
}

#[cfg(not(unix))]
fn create_dir_mode_0755(dir: &Path) -> std::io::Result<()> {
    std::fs::DirBuilder::new().recursive(true).create(dir)
}

#[cfg(unix)]
fn open_append_mode_0644(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new().create(true).append(true).mode(0o644).open(path)
}

#[cfg(not(unix))]
fn open_append_mode_0644(path: &Path) -> std::io::Result<fs::File> {
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_core::MessageType;

    fn store() -> (tempfile::TempDir, MailboxStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MailboxStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn send_then_read_for_instance() {
        let (_dir, store) = store();
        let msg = Message::new(
            InstanceId::from_string("inst-1"),
            InstanceId::from_string("inst-2"),
            MessageType::Status,
            "hello",
        )
        .unwrap();
        store.send(msg.clone()).unwrap();

        let read = store.read_for_instance(&InstanceId::from_string("inst-2")).unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].body, "hello");
    }

    #[test]
    fn missing_mailbox_returns_empty_not_error() {
        let (_dir, store) = store();
        let read = store.read_for_instance(&InstanceId::from_string("nobody")).unwrap();
        assert!(read.is_empty());
    }

    #[test]
    fn malformed_line_is_skipped() {
        let (dir, store) = store();
        let msg_dir = dir.path().join("mailbox").join("inst-2");
        fs::create_dir_all(&msg_dir).unwrap();
        let path = msg_dir.join("index.jsonl");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "not json").unwrap();
        let good = Message::new(
            InstanceId::from_string("inst-1"),
            InstanceId::from_string("inst-2"),
            MessageType::Status,
            "ok",
        )
        .unwrap();
        writeln!(file, "{}", serde_json::to_string(&good).unwrap()).unwrap();

        let read = store.read_for_instance(&InstanceId::from_string("inst-2")).unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].body, "ok");
    }

    #[test]
    fn read_all_merges_broadcast_and_targeted_sorted_by_timestamp() {
        let (_dir, store) = store();
        let to_broadcast = Message::new(
            InstanceId::from_string("inst-1"),
            InstanceId::from_string(BROADCAST_RECIPIENT),
            MessageType::Discovery,
            "broadcast",
        )
        .unwrap();
        store.send(to_broadcast).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let targeted = Message::new(
            InstanceId::from_string("inst-1"),
            InstanceId::from_string("inst-2"),
            MessageType::Status,
            "targeted",
        )
        .unwrap();
        store.send(targeted).unwrap();

        let all = store.read_all(&InstanceId::from_string("inst-2")).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].timestamp <= all[1].timestamp);
    }
}
