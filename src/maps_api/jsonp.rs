use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::error::TileError;

/// Table of callback names currently awaiting a JSONP response. Owned by a
/// single client; nothing is registered process-wide.
#[derive(Debug, Clone, Default)]
pub struct CallbackRegistry {
    next_id: Arc<AtomicU64>,
    pending: Arc<Mutex<HashSet<String>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a fresh callback name. The name is released when the
    /// returned guard drops, whichever way the request ended.
    pub fn register(&self) -> CallbackGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = format!("footprints_cb_{}", id);
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name.clone());
        CallbackGuard {
            name,
            pending: Arc::clone(&self.pending),
        }
    }

    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or_default()
    }

    /// Callback names handed out so far.
    #[cfg(test)]
    pub fn issued(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub fn is_pending(&self, name: &str) -> bool {
        self.pending.lock().map(|p| p.contains(name)).unwrap_or_default()
    }
}

#[derive(Debug)]
pub struct CallbackGuard {
    name: String,
    pending: Arc<Mutex<HashSet<String>>>,
}

impl CallbackGuard {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Strips `name( ... )` (optionally followed by `;`) from a response body.
    pub fn unwrap_payload<'a>(&self, body: &'a str) -> Result<&'a str, TileError> {
        let body = body.trim();
        let inner = body
            .strip_prefix(self.name.as_str())
            .map(str::trim_start)
            .and_then(|rest| rest.strip_prefix('('))
            .and_then(|rest| rest.trim_end().strip_suffix(';').unwrap_or(rest).trim_end().strip_suffix(')'))
            .ok_or_else(|| {
                let head: String = body.chars().take(80).collect();
                TileError::Jsonp(format!("expected {}(...), got {:?}", self.name, head))
            })?;
        Ok(inner)
    }
}

impl Drop for CallbackGuard {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&self.name);
        }
    }
}
