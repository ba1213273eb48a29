//! Render thread body.
//!
//! Two nested waits on the render condition variable: the outer one until
//! there is anything to do at all, the inner one for as long as the active
//! decoder asked to sleep between `process()` steps. Both end early on
//! shutdown, and the inner one also on any wake notification.

use std::sync::{Arc, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::dispatch::SessionShared;
use crate::protocol;

pub(crate) fn run(shared: Arc<SessionShared>) {
    info!(display = %shared.display, "render thread started");
    let mut flags = shared.lock_render();

    while !flags.quit {
        flags = shared
            .render_cond
            .wait_while(flags, |f| {
                !f.quit && !(shared.is_rendering_active() && !shared.queue.is_empty())
            })
            .unwrap_or_else(PoisonError::into_inner);

        while !flags.quit && shared.is_rendering_active() {
            flags.wake = false;
            drop(flags);

            let wait = process_data(&shared);
            shared.graphics.execute();

            flags = shared.lock_render();
            if wait.is_zero() {
                continue;
            }
            let (guard, _) = shared
                .render_cond
                .wait_timeout_while(flags, wait, |f| !f.quit && !f.wake)
                .unwrap_or_else(PoisonError::into_inner);
            flags = guard;
        }

        let dropped = shared.queue.clear();
        if dropped > 0 {
            debug!(display = %shared.display, dropped, "no active decoder, data queue cleared");
        }
    }

    info!(display = %shared.display, "render thread stopped");
}

/// Drain the ingress queue, then run one `process()` step of the active
/// decoder and return the time it wants to sleep.
fn process_data(shared: &SessionShared) -> Duration {
    while let Some(buffer) = shared.queue.pop() {
        match protocol::decode(&buffer) {
            Ok(packet) => {
                if let Err(e) = shared.dispatch(&packet) {
                    warn!(display = %shared.display, error = %e, "queued packet rejected");
                }
            }
            Err(e) => warn!(display = %shared.display, error = %e, "dropping malformed packet"),
        }
    }

    let mut state = shared.lock_decoder();
    match state.active.as_mut() {
        Some(decoder) => {
            let controller = decoder.controller();
            controller.process();
            controller.wait_time()
        }
        None => Duration::ZERO,
    }
}
