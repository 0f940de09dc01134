//! Placeholder hostnames for candidate nodes.
//!
//! A candidate node needs a hostname before it exists so topology spread
//! over `kubernetes.io/hostname` can count it. Names come from an atomic
//! counter and are never reused.

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide generator used by [`crate::Node::new`].
static NODE_ID: HostnameGenerator = HostnameGenerator::new();

/// Hands out `hostname-placeholder-0001`, `-0002`, ...
#[derive(Debug)]
pub struct HostnameGenerator {
    counter: AtomicU64,
}

impl HostnameGenerator {
    pub const fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// The generator shared by the whole process.
    pub fn global() -> &'static HostnameGenerator {
        &NODE_ID
    }

    pub fn next_hostname(&self) -> String {
        let id = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("hostname-placeholder-{id:04}")
    }
}

impl Default for HostnameGenerator {
    fn default() -> Self {
        Self::new()
    }
}
