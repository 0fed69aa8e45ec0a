//! Tracked child registry.
//!
//! The set of pids the orphan guard forwards signals to. Entries are added
//! when a child launches and removed when its termination chain fires; each
//! entry owns the child's watchdog process, if one was spawned.

use std::collections::HashMap;
use std::process::Child;
use std::sync::{Mutex, MutexGuard};

/// Concurrent set of tracked child pids.
#[derive(Debug, Default)]
pub struct ChildRegistry {
    children: Mutex<HashMap<u32, Option<Child>>>,
}

impl ChildRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u32, Option<Child>>> {
        self.children
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    /// Track `pid`, taking ownership of its watchdog.
    pub fn insert(&self, pid: u32, watchdog: Option<Child>) {
        let previous = self.lock().insert(pid, watchdog);
        // A reused pid means the earlier entry was never released.
        if let Some(Some(stale)) = previous {
            stop_watchdog(stale);
        }
    }

    /// Stop tracking `pid`. Its watchdog is terminated and reaped.
    ///
    /// Returns false if `pid` was not tracked.
    pub fn remove(&self, pid: u32) -> bool {
        let entry = self.lock().remove(&pid);
        match entry {
            Some(watchdog) => {
                if let Some(watchdog) = watchdog {
                    stop_watchdog(watchdog);
                }
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.lock().contains_key(&pid)
    }

    /// Snapshot of the tracked pids.
    pub fn pids(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = self.lock().keys().copied().collect();
        pids.sort_unstable();
        pids
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

fn stop_watchdog(mut watchdog: Child) {
    let pid = watchdog.id();
    if let Err(e) = watchdog.kill() {
        tracing::debug!(watchdog = pid, error = %e, "watchdog already gone");
    }
    if let Err(e) = watchdog.wait() {
        tracing::warn!(watchdog = pid, error = %e, "failed to reap watchdog");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::is_alive;
    use std::process::Command;
    use std::sync::Arc;

    #[test]
    fn insert_and_remove() {
        let registry = ChildRegistry::new();
        registry.insert(100, None);
        registry.insert(200, None);

        assert!(registry.contains(100));
        assert_eq!(registry.pids(), vec![100, 200]);

        assert!(registry.remove(100));
        assert!(!registry.remove(100));
        assert_eq!(registry.pids(), vec![200]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_reaps_watchdog() {
        let registry = ChildRegistry::new();
        let watchdog = Command::new("sleep").arg("30").spawn().unwrap();
        let watchdog_pid = watchdog.id();

        registry.insert(4242, Some(watchdog));
        assert!(is_alive(watchdog_pid));

        assert!(registry.remove(4242));
        assert!(!is_alive(watchdog_pid));
        assert!(registry.is_empty());
    }

    #[test]
    fn concurrent_insert_remove() {
        let registry = Arc::new(ChildRegistry::new());
        let handles: Vec<_> = (0..8u32)
            .map(|t| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let pid = t * 1000 + i + 1;
                        registry.insert(pid, None);
                        let _ = registry.pids();
                        assert!(registry.remove(pid));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(registry.is_empty());
    }
}
