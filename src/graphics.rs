//! Graphics collaborator interface.
//!
//! A session owns one window created from its engine. The render thread
//! flushes pending draw operations through [`GraphicsEngine::execute`] after
//! every decoder `process()` step. Concrete engines live outside this crate;
//! [`HeadlessGraphics`] is provided for hosts without a display.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

use tracing::debug;

use crate::error::Result;

/// Opaque handle to a window created by a [`GraphicsEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub u32);

pub trait GraphicsEngine: Send + Sync {
    fn create_window(&self) -> Result<WindowHandle>;

    fn attach(&self, window: WindowHandle) -> Result<()>;

    fn detach(&self, window: WindowHandle);

    /// Flush pending draw operations.
    fn execute(&self);

    fn shutdown(&self);
}

/// Creates the graphics engine for a display.
pub trait GraphicsFactory: Send + Sync {
    fn create_engine(&self, display: &str) -> Result<Arc<dyn GraphicsEngine>>;
}

/// Engine that draws nothing and counts what it was asked to do.
#[derive(Debug, Default)]
pub struct HeadlessGraphics {
    next_window: AtomicU32,
    attached: AtomicUsize,
    flushes: AtomicU64,
}

impl HeadlessGraphics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    pub fn attached_windows(&self) -> usize {
        self.attached.load(Ordering::Relaxed)
    }
}

impl GraphicsEngine for HeadlessGraphics {
    fn create_window(&self) -> Result<WindowHandle> {
        Ok(WindowHandle(self.next_window.fetch_add(1, Ordering::Relaxed) + 1))
    }

    fn attach(&self, window: WindowHandle) -> Result<()> {
        debug!(window = window.0, "headless attach");
        self.attached.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn detach(&self, window: WindowHandle) {
        debug!(window = window.0, "headless detach");
        let _ = self
            .attached
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    fn execute(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    fn shutdown(&self) {
        debug!(flushes = self.flush_count(), "headless graphics shutdown");
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessGraphicsFactory;

impl GraphicsFactory for HeadlessGraphicsFactory {
    fn create_engine(&self, display_name: &str) -> Result<Arc<dyn GraphicsEngine>> {
        debug!(display = %display_name, "creating headless graphics engine");
        Ok(Arc::new(HeadlessGraphics::new()))
    }
}
