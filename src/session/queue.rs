//! FIFO of raw data packets awaiting the render thread.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub(crate) struct IngressQueue {
    buffers: Mutex<VecDeque<Vec<u8>>>,
}

impl IngressQueue {
    fn lock(&self) -> MutexGuard<'_, VecDeque<Vec<u8>>> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn push(&self, buffer: Vec<u8>) {
        self.lock().push_back(buffer);
    }

    pub(crate) fn pop(&self) -> Option<Vec<u8>> {
        self.lock().pop_front()
    }

    /// Drop every queued buffer, returning how many were dropped.
    pub(crate) fn clear(&self) -> usize {
        let mut buffers = self.lock();
        let dropped = buffers.len();
        buffers.clear();
        dropped
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
