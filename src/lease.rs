//! Per-target exclusive leases
//!
//! Only one controller may hold the inspection channel of a target at a
//! time. The registry makes that contention explicit: a second `acquire`
//! for a live target fails with `Error::ChannelBusy` instead of depending on
//! how the backend reacts to a double attach.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{Error, Result, TargetId};

/// Registry of targets that currently have a controller attached
#[derive(Debug, Clone, Default)]
pub struct LeaseRegistry {
    held: Arc<Mutex<HashSet<TargetId>>>,
}

impl LeaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lease for `target`, or fail if someone else holds it.
    pub fn acquire(&self, target: &TargetId) -> Result<Lease> {
        if !lock(&self.held).insert(target.clone()) {
            return Err(Error::ChannelBusy(target.to_string()));
        }
        Ok(Lease {
            target: target.clone(),
            held: Arc::clone(&self.held),
        })
    }

    pub fn is_held(&self, target: &TargetId) -> bool {
        lock(&self.held).contains(target)
    }
}

/// Exclusive hold on one target; released on drop
#[derive(Debug)]
pub struct Lease {
    target: TargetId,
    held: Arc<Mutex<HashSet<TargetId>>>,
}

impl Lease {
    pub fn target(&self) -> &TargetId {
        &self.target
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        lock(&self.held).remove(&self.target);
    }
}

// The set stays consistent even if a holder panicked mid-update.
fn lock(set: &Mutex<HashSet<TargetId>>) -> MutexGuard<'_, HashSet<TargetId>> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_busy_until_release() {
        let reg = LeaseRegistry::new();
        let target = TargetId::from("tab-1");

        let lease = reg.acquire(&target).unwrap();
        assert!(reg.is_held(&target));
        assert!(matches!(reg.acquire(&target), Err(Error::ChannelBusy(t)) if t == "tab-1"));

        drop(lease);
        assert!(!reg.is_held(&target));
        assert!(reg.acquire(&target).is_ok());
    }

    #[test]
    fn leases_on_different_targets_coexist() {
        let reg = LeaseRegistry::new();
        let _a = reg.acquire(&TargetId::from("a")).unwrap();
        let _b = reg.acquire(&TargetId::from("b")).unwrap();
        assert!(reg.is_held(&TargetId::from("a")));
        assert!(reg.is_held(&TargetId::from("b")));
    }
}
