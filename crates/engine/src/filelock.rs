// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exclusive file ownership arbitration between instances.

use loom_core::bus::{Event, EventBus};
use loom_core::error::{LoomError, Result};
use loom_core::InstanceId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Exclusive file ownership per instance. Arbitration is FIFO by caller
/// arrival on free paths (implicit in mutex acquisition order) and
/// last-writer-loses only in the sense that a path already owned always
/// rejects a different claimant — there is no queueing of blocked claims.
#[derive(Clone)]
pub struct FileLockRegistry {
    bus: Option<EventBus>,
    owners: Arc<Mutex<HashMap<PathBuf, InstanceId>>>,
}

impl FileLockRegistry {
    pub fn new(bus: Option<EventBus>) -> Self {
        Self { bus, owners: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Claims `path` for `instance`. Idempotent if already owned by the
    /// same instance; fails with [`LoomError::Locked`] if owned by a
    /// different one. Publishes `filelock.claimed` on success.
    pub fn claim(&self, instance: &InstanceId, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        {
            let mut owners = self.owners.lock();
            match owners.get(&path) {
                Some(owner) if owner == instance => return Ok(()),
                Some(owner) => {
                    return Err(LoomError::Locked {
                        path: path.display().to_string(),
                        owner: owner.to_string(),
                    })
                }
                None => {
                    owners.insert(path.clone(), instance.clone());
                }
            }
        }
        tracing::debug!(instance = %instance, path = %path.display(), "file lock claimed");
        self.publish(
            "filelock.claimed",
            serde_json::json!({ "instanceId": instance.as_str(), "filePath": path.display().to_string() }),
        );
        Ok(())
    }

    /// Releases `path`, failing if `instance` is not the current owner.
    /// Publishes `filelock.released` on success.
    pub fn release(&self, instance: &InstanceId, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        {
            let mut owners = self.owners.lock();
            match owners.get(&path) {
                Some(owner) if owner == instance => {
                    owners.remove(&path);
                }
                Some(owner) => {
                    return Err(LoomError::Locked {
                        path: path.display().to_string(),
                        owner: owner.to_string(),
                    })
                }
                None => return Err(LoomError::not_found(format!("lock on {}", path.display()))),
            }
        }
        tracing::debug!(instance = %instance, path = %path.display(), "file lock released");
        self.publish(
            "filelock.released",
            serde_json::json!({ "instanceId": instance.as_str(), "filePath": path.display().to_string() }),
        );
        Ok(())
    }

    pub fn owner(&self, path: impl AsRef<Path>) -> Option<InstanceId> {
        self.owners.lock().get(path.as_ref()).cloned()
    }

    pub fn is_available(&self, path: impl AsRef<Path>) -> bool {
        self.owner(path).is_none()
    }

    /// Releases every path owned by `instance` — called when an instance
    /// terminates.
    pub fn release_all(&self, instance: &InstanceId) {
        let released: Vec<PathBuf> = {
            let mut owners = self.owners.lock();
            let paths: Vec<PathBuf> = owners
                .iter()
                .filter(|(_, owner)| *owner == instance)
                .map(|(path, _)| path.clone())
                .collect();
            for path in &paths {
                owners.remove(path);
            }
            paths
        };
        for path in released {
            self.publish(
                "filelock.released",
                serde_json::json!({ "instanceId": instance.as_str(), "filePath": path.display().to_string() }),
            );
        }
    }

    fn publish(&self, topic: &str, payload: serde_json::Value) {
        if let Some(bus) = &self.bus {
            bus.publish(Event::new(topic, payload));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arbitration_scenario() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        bus.subscribe_all(move |e| s.lock().push(e.topic.clone()));
        let registry = FileLockRegistry::new(Some(bus));

        let inst1 = InstanceId::from_string("inst-1");
        let inst2 = InstanceId::from_string("inst-2");

        registry.claim(&inst1, "main.go").unwrap();
        let err = registry.claim(&inst2, "main.go").unwrap_err();
        assert_eq!(err.sentinel(), Some(loom_core::error::Sentinel::Locked));

        registry.release(&inst1, "main.go").unwrap();
        registry.claim(&inst2, "main.go").unwrap();

        assert_eq!(registry.owner("main.go"), Some(inst2));
        assert_eq!(*seen.lock(), vec!["filelock.claimed", "filelock.released", "filelock.claimed"]);
    }

    #[test]
    fn claim_is_idempotent_for_same_owner() {
        let registry = FileLockRegistry::new(None);
        let inst = InstanceId::from_string("inst-1");
        registry.claim(&inst, "a.rs").unwrap();
        registry.claim(&inst, "a.rs").unwrap();
        assert_eq!(registry.owner("a.rs"), Some(inst));
    }

    #[test]
    fn release_all_frees_every_path() {
        let registry = FileLockRegistry::new(None);
        let inst = InstanceId::from_string("inst-1");
        registry.claim(&inst, "a.rs").unwrap();
        registry.claim(&inst, "b.rs").unwrap();
        registry.release_all(&inst);
        assert!(registry.is_available("a.rs"));
        assert!(registry.is_available("b.rs"));
    }

    #[test]
    fn owner_at_most_one_per_path() {
        let registry = FileLockRegistry::new(None);
        let inst1 = InstanceId::from_string("inst-1");
        registry.claim(&inst1, "x.rs").unwrap();
        assert_eq!(registry.owner("x.rs"), Some(inst1));
        assert!(!registry.is_available("x.rs"));
    }
}
