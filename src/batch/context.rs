//! Per-context request buffer.
//!
//! A context holds every id requested under one context key: ids waiting for
//! the next dispatch (`pending`), the waiter of every id not yet settled, the
//! tags accumulated for pending ids, and the batch window timer.

use std::collections::HashMap;

use serde_json::Value;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::batch::keys::Params;
use crate::batch::waiter::{Waiter, WaiterHandle};
use crate::resolver::BatchMetadata;

/// One dispatch unit: a chunk of ids snapshotted from a context.
#[derive(Debug, Clone)]
pub struct Batch {
    pub uid: Uuid,
    pub key: String,
    pub params: Params,
    pub ids: Vec<String>,
    /// Aligned with `ids`.
    pub waiters: Vec<Waiter>,
    pub metadata: BatchMetadata,
    /// Failed attempts so far.
    pub retry_step: u32,
}

#[derive(Debug)]
struct WindowTimer {
    window: u64,
    handle: JoinHandle<()>,
}

#[derive(Debug)]
pub struct RequestContext {
    params: Params,
    pending: Vec<String>,
    waiters: HashMap<String, Waiter>,
    metadata: BatchMetadata,
    timer: Option<WindowTimer>,
    windows: u64,
}

impl RequestContext {
    pub fn new(params: Params) -> Self {
        Self {
            params,
            pending: Vec::new(),
            waiters: HashMap::new(),
            metadata: BatchMetadata::new(),
            timer: None,
            windows: 0,
        }
    }

    /// Number the next batch window.
    pub fn open_window(&mut self) -> u64 {
        self.windows += 1;
        self.windows
    }

    pub fn arm_timer(&mut self, window: u64, handle: JoinHandle<()>) {
        self.cancel_timer();
        self.timer = Some(WindowTimer { window, handle });
    }

    pub fn has_timer(&self) -> bool {
        self.timer.is_some()
    }

    pub fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.handle.abort();
        }
    }

    /// Called by the timer of `window` when it fires. Returns false if that
    /// window was already flushed by the limit path.
    pub fn close_window(&mut self, window: u64) -> bool {
        match &self.timer {
            Some(timer) if timer.window == window => {
                self.timer = None;
                true
            }
            _ => false,
        }
    }

    /// Subscribe to an existing waiter for `id`, if any. A tag joins the
    /// next dispatch only while `id` is still pending.
    pub fn coalesce(&mut self, id: &str, tag: Option<&Value>) -> Option<WaiterHandle> {
        let handle = self.waiters.get(id).map(Waiter::subscribe)?;
        if let Some(tag) = tag {
            if self.pending.iter().any(|pending| pending == id) {
                self.add_tag(id, tag);
            }
        }
        Some(handle)
    }

    /// Add `id` as pending with a fresh waiter.
    pub fn register(&mut self, id: &str, tag: Option<&Value>) -> WaiterHandle {
        let waiter = Waiter::new();
        let handle = waiter.subscribe();
        self.pending.push(id.to_string());
        self.waiters.insert(id.to_string(), waiter);

        if let Some(tag) = tag {
            self.add_tag(id, tag);
        }
        handle
    }

    fn add_tag(&mut self, id: &str, tag: &Value) {
        let tags = self.metadata.entry(id.to_string()).or_default();
        if !tags.contains(tag) {
            tags.push(tag.clone());
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Move every pending id into batches of at most `chunk` ids.
    pub fn take_batches(&mut self, key: &str, chunk: usize) -> Vec<Batch> {
        let pending = std::mem::take(&mut self.pending);
        let mut metadata = std::mem::take(&mut self.metadata);

        pending
            .chunks(chunk.max(1))
            .map(|ids| {
                let waiters = ids
                    .iter()
                    .map(|id| self.waiters.get(id).cloned().unwrap_or_default())
                    .collect();
                let metadata = ids
                    .iter()
                    .filter_map(|id| metadata.remove_entry(id))
                    .collect();
                Batch {
                    uid: Uuid::new_v4(),
                    key: key.to_string(),
                    params: self.params.clone(),
                    ids: ids.to_vec(),
                    waiters,
                    metadata,
                    retry_step: 0,
                }
            })
            .collect()
    }

    /// Forget the waiter for `id` if it is still `waiter`.
    pub fn release(&mut self, id: &str, waiter: &Waiter) {
        if self.waiters.get(id).is_some_and(|current| current.same_as(waiter)) {
            self.waiters.remove(id);
        }
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.waiters.is_empty() && self.timer.is_none()
    }
}
