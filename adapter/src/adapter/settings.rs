//! Scoped settings and response-format overrides
//!
//! Each scope pushes a frame onto the calling thread's stack and gets back a
//! guard; dropping the guard removes exactly that frame. Drops happen on
//! normal exit, on `?` propagation and during unwinding alike. Frames opened
//! on one thread are never visible to requests made from another.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

use dashmap::DashMap;
use indexmap::IndexMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeFrame {
    pub settings: IndexMap<String, String>,
    pub format: Option<String>,
}

impl ScopeFrame {
    pub fn settings<K, V>(settings: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: ToString,
    {
        Self {
            settings: settings
                .into_iter()
                .map(|(k, v)| (k.into(), v.to_string()))
                .collect(),
            format: None,
        }
    }

    pub fn format(format: impl Into<String>) -> Self {
        Self {
            settings: IndexMap::new(),
            format: Some(format.into()),
        }
    }
}

/// Active scopes of one adapter instance, kept per thread
#[derive(Debug, Default)]
pub struct ScopedStack {
    frames: DashMap<ThreadId, Vec<(u64, ScopeFrame)>>,
    next_id: AtomicU64,
}

impl ScopedStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `frame` for the current thread; it stays active until the guard is dropped
    pub fn push(&self, frame: ScopeFrame) -> ScopeGuard<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let thread = thread::current().id();
        let mut frames = self.frames.entry(thread).or_default();
        frames.push((id, frame));
        tracing::trace!(id, depth = frames.len(), "Pushed settings scope");
        ScopeGuard {
            stack: self,
            thread,
            id,
        }
    }

    /// Number of scopes active on the current thread
    pub fn depth(&self) -> usize {
        self.frames
            .get(&thread::current().id())
            .map_or(0, |frames| frames.len())
    }

    /// Settings of the current thread's scopes; inner scopes win
    pub fn settings(&self) -> IndexMap<String, String> {
        let mut merged = IndexMap::new();
        if let Some(frames) = self.frames.get(&thread::current().id()) {
            for (_, frame) in frames.iter() {
                for (key, value) in &frame.settings {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }
        merged
    }

    /// Innermost response-format override on the current thread
    pub fn format(&self) -> Option<String> {
        self.frames
            .get(&thread::current().id())?
            .iter()
            .rev()
            .find_map(|(_, frame)| frame.format.clone())
    }

    fn remove(&self, thread: ThreadId, id: u64) {
        if let Some(mut frames) = self.frames.get_mut(&thread) {
            frames.retain(|(frame_id, _)| *frame_id != id);
        }
        self.frames.remove_if(&thread, |_, frames| frames.is_empty());
    }
}

/// Removes its own frame on drop, leaving every other frame in place
#[must_use = "the scope ends when the guard is dropped"]
pub struct ScopeGuard<'a> {
    stack: &'a ScopedStack,
    thread: ThreadId,
    id: u64,
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.stack.remove(self.thread, self.id);
        tracing::trace!(id = self.id, "Popped settings scope");
    }
}
