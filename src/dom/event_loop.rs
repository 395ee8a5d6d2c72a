//! Macrotask queue.

use crate::dom::DomError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// FIFO of deferred tasks. Clones share the same queue, so request objects
/// and spawned transport tasks can schedule work back onto the page.
#[derive(Clone, Default)]
pub struct EventLoop {
    queue: Arc<Mutex<VecDeque<Task>>>,
}

impl EventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `task` to run on a later turn (never synchronously).
    pub fn set_timeout<F>(&self, task: F) -> Result<(), DomError>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut queue = self.queue.lock().map_err(|_| DomError::QueueUnavailable)?;
        queue.push_back(Box::new(task));
        Ok(())
    }

    pub fn pop(&self) -> Option<Task> {
        self.queue.lock().ok()?.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run queued tasks until the queue is drained. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Some(task) = self.pop() {
            task();
            ran += 1;
        }
        ran
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("pending", &self.len())
            .finish()
    }
}
