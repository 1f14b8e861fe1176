use std::collections::HashMap;
use std::sync::Arc;

use cosme_core::RunTarget;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-`(genre, channel)` mutual exclusion for runs inside this process.
///
/// Selection and `mark_used` are separate store calls, so two runs for the
/// same pair must not overlap. Runs for different pairs proceed in parallel.
#[derive(Debug, Clone, Default)]
pub struct RunLocks {
    inner: Arc<Mutex<HashMap<RunTarget, Arc<Mutex<()>>>>>,
}

/// Held for the lifetime of one run; dropping it releases the pair.
#[derive(Debug)]
pub struct RunGuard {
    target: RunTarget,
    _guard: OwnedMutexGuard<()>,
}

impl RunGuard {
    #[must_use]
    pub fn target(&self) -> &RunTarget {
        &self.target
    }
}

impl RunLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other run holds `target`.
    pub async fn acquire(&self, target: &RunTarget) -> RunGuard {
        let lock = {
            let mut map = self.inner.lock().await;
            Arc::clone(map.entry(target.clone()).or_default())
        };
        let guard = lock.lock_owned().await;
        tracing::debug!(%target, "run lock acquired");
        RunGuard {
            target: target.clone(),
            _guard: guard,
        }
    }

    /// Returns `None` instead of waiting when the pair is busy.
    pub async fn try_acquire(&self, target: &RunTarget) -> Option<RunGuard> {
        let lock = {
            let mut map = self.inner.lock().await;
            Arc::clone(map.entry(target.clone()).or_default())
        };
        lock.try_lock_owned().ok().map(|guard| RunGuard {
            target: target.clone(),
            _guard: guard,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_target_is_exclusive_until_dropped() {
        let locks = RunLocks::new();
        let target = RunTarget::new("skincare", "drugstore");

        let guard = locks.acquire(&target).await;
        assert!(locks.try_acquire(&target).await.is_none());

        drop(guard);
        assert!(locks.try_acquire(&target).await.is_some());
    }

    #[tokio::test]
    async fn distinct_targets_do_not_block() {
        let locks = RunLocks::new();
        let _a = locks
            .acquire(&RunTarget::new("skincare", "drugstore"))
            .await;
        let b = locks
            .try_acquire(&RunTarget::new("skincare", "department"))
            .await;
        assert_eq!(
            b.as_ref().map(RunGuard::target),
            Some(&RunTarget::new("skincare", "department"))
        );
    }

    #[tokio::test]
    async fn clones_share_the_same_locks() {
        let locks = RunLocks::new();
        let other = locks.clone();
        let target = RunTarget::new("haircare", "drugstore");

        let _guard = locks.acquire(&target).await;
        assert!(other.try_acquire(&target).await.is_none());
    }
}
