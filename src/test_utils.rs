//! Test doubles for the session engine's collaborators.
//!
//! [`MockControllerFactory`] builds controllers that record every call into a
//! shared, ordered event log, so tests can assert call order across decoder
//! generations. [`RecordingGraphics`] counts window and flush operations.

#![cfg(any(test, feature = "benchmark"))]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::controller::{ControllerFactory, DecoderContext, DecoderController, PrerenderedFontCache};
use crate::graphics::{GraphicsEngine, WindowHandle};
use crate::protocol::{Packet, PacketType};
use crate::types::{CcAttributes, SessionType};
use crate::{Result, SessionError};

/// One recorded controller call. `id` identifies the controller instance in
/// creation order, starting at 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    Created { id: usize, format: SessionType },
    Activated { id: usize, format: SessionType },
    AddData { id: usize, packet_type: PacketType, data: Vec<u8>, display_offset_ms: Option<i64> },
    Pause { id: usize },
    Resume { id: usize },
    Mute { id: usize, muted: bool },
    CcAttributes { id: usize, attributes: CcAttributes },
    Timestamp { id: usize, media_timestamp_ms: u64 },
    Info { id: usize, text: String },
    Preview { id: usize, text: String },
    TtmlStyling { id: usize, styling: String },
    Deactivated { id: usize },
}

#[derive(Debug)]
struct Shared {
    events: Mutex<Vec<ControllerEvent>>,
    wait_time: Mutex<Duration>,
    deactivate_delay: Mutex<Duration>,
    wants_reset: AtomicBool,
    fail_activation: AtomicBool,
    failing_formats: Mutex<HashSet<SessionType>>,
    process_calls: AtomicU64,
    live: AtomicUsize,
    max_live: AtomicUsize,
    font_caches: Mutex<Vec<Arc<PrerenderedFontCache>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl Shared {
    fn record(&self, event: ControllerEvent) {
        lock(&self.events).push(event);
    }
}

/// Factory producing [`MockController`]s for every format.
#[derive(Debug, Clone)]
pub struct MockControllerFactory {
    shared: Arc<Shared>,
    next_id: Arc<AtomicUsize>,
}

impl Default for MockControllerFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MockControllerFactory {
    /// Controllers ask to sleep 20ms between `process()` steps by default.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                events: Mutex::new(Vec::new()),
                wait_time: Mutex::new(Duration::from_millis(20)),
                deactivate_delay: Mutex::new(Duration::ZERO),
                wants_reset: AtomicBool::new(true),
                fail_activation: AtomicBool::new(false),
                failing_formats: Mutex::new(HashSet::new()),
                process_calls: AtomicU64::new(0),
                live: AtomicUsize::new(0),
                max_live: AtomicUsize::new(0),
                font_caches: Mutex::new(Vec::new()),
            }),
            next_id: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_wait_time(&self, wait: Duration) {
        *lock(&self.shared.wait_time) = wait;
    }

    /// Block every `deactivate()` for `delay`, like a decoder tearing down
    /// its surfaces.
    pub fn set_deactivate_delay(&self, delay: Duration) {
        *lock(&self.shared.deactivate_delay) = delay;
    }

    /// Answer for `wants_data` on RESET_CHANNEL.
    pub fn set_wants_reset(&self, wants: bool) {
        self.shared.wants_reset.store(wants, Ordering::SeqCst);
    }

    pub fn set_fail_activation(&self, fail: bool) {
        self.shared.fail_activation.store(fail, Ordering::SeqCst);
    }

    /// Make `create` fail for `format`.
    pub fn fail_format(&self, format: SessionType) {
        lock(&self.shared.failing_formats).insert(format);
    }

    pub fn events(&self) -> Vec<ControllerEvent> {
        lock(&self.shared.events).clone()
    }

    pub fn clear_events(&self) {
        lock(&self.shared.events).clear();
    }

    /// Data packets received by any controller, in order.
    pub fn data_events(&self) -> Vec<ControllerEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, ControllerEvent::AddData { .. }))
            .collect()
    }

    pub fn process_calls(&self) -> u64 {
        self.shared.process_calls.load(Ordering::SeqCst)
    }

    /// Controllers created and not yet deactivated.
    pub fn live_controllers(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }

    /// Highest number of controllers that were live at the same time.
    pub fn max_live_controllers(&self) -> usize {
        self.shared.max_live.load(Ordering::SeqCst)
    }

    /// Font caches handed to each created controller, in creation order.
    pub fn font_caches(&self) -> Vec<Arc<PrerenderedFontCache>> {
        lock(&self.shared.font_caches).clone()
    }
}

impl ControllerFactory for MockControllerFactory {
    fn create(&self, context: DecoderContext) -> Result<Box<dyn DecoderController>> {
        if lock(&self.shared.failing_formats).contains(&context.format) {
            return Err(SessionError::decoder_construction(context.format, "mock construction failure"));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let live = self.shared.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.max_live.fetch_max(live, Ordering::SeqCst);
        lock(&self.shared.font_caches).push(Arc::clone(&context.font_cache));
        self.shared.record(ControllerEvent::Created { id, format: context.format });
        Ok(Box::new(MockController {
            id,
            format: context.format,
            shared: Arc::clone(&self.shared),
            deactivated: false,
        }))
    }
}

/// Controller that records every call.
#[derive(Debug)]
pub struct MockController {
    id: usize,
    format: SessionType,
    shared: Arc<Shared>,
    deactivated: bool,
}

impl DecoderController for MockController {
    fn activate(&mut self, _selection: &Packet) -> Result<()> {
        if self.shared.fail_activation.load(Ordering::SeqCst) {
            return Err(SessionError::invalid_argument("mock activation failure"));
        }
        self.shared.record(ControllerEvent::Activated { id: self.id, format: self.format });
        Ok(())
    }

    fn add_data(&mut self, packet: &Packet) {
        self.shared.record(ControllerEvent::AddData {
            id: self.id,
            packet_type: packet.packet_type,
            data: packet.data().map(<[u8]>::to_vec).unwrap_or_default(),
            display_offset_ms: packet.display_offset_ms().ok(),
        });
    }

    fn process(&mut self) {
        self.shared.process_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn wait_time(&self) -> Duration {
        *lock(&self.shared.wait_time)
    }

    fn pause(&mut self) {
        self.shared.record(ControllerEvent::Pause { id: self.id });
    }

    fn resume(&mut self) {
        self.shared.record(ControllerEvent::Resume { id: self.id });
    }

    fn mute(&mut self, muted: bool) {
        self.shared.record(ControllerEvent::Mute { id: self.id, muted });
    }

    fn wants_data(&self, _packet: &Packet) -> bool {
        self.shared.wants_reset.load(Ordering::SeqCst)
    }

    fn deactivate(&mut self) {
        let delay = *lock(&self.shared.deactivate_delay);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if !self.deactivated {
            self.deactivated = true;
            self.shared.live.fetch_sub(1, Ordering::SeqCst);
        }
        self.shared.record(ControllerEvent::Deactivated { id: self.id });
    }

    fn process_set_cc_attributes(&mut self, packet: &Packet) {
        if let Ok(update) = packet.cc_attributes() {
            self.shared.record(ControllerEvent::CcAttributes { id: self.id, attributes: update.attributes() });
        }
    }

    fn process_timestamp(&mut self, packet: &Packet) {
        if let Ok(media_timestamp_ms) = packet.media_timestamp_ms() {
            self.shared.record(ControllerEvent::Timestamp { id: self.id, media_timestamp_ms });
        }
    }

    fn process_info(&mut self, packet: &Packet) {
        let text = packet.info_text().unwrap_or_default().to_string();
        self.shared.record(ControllerEvent::Info { id: self.id, text });
    }

    fn set_text_for_preview(&mut self, text: &str) {
        self.shared.record(ControllerEvent::Preview { id: self.id, text: text.to_string() });
    }

    fn set_custom_ttml_styling(&mut self, styling: &str) {
        self.shared.record(ControllerEvent::TtmlStyling { id: self.id, styling: styling.to_string() });
    }
}

/// Graphics engine counting every call, with switchable failures.
#[derive(Debug, Default)]
pub struct RecordingGraphics {
    windows: AtomicUsize,
    attached: AtomicUsize,
    detached: AtomicUsize,
    executes: AtomicU64,
    shutdowns: AtomicUsize,
    fail_create_window: AtomicBool,
}

impl RecordingGraphics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_create_window(&self, fail: bool) {
        self.fail_create_window.store(fail, Ordering::SeqCst);
    }

    pub fn windows_created(&self) -> usize {
        self.windows.load(Ordering::SeqCst)
    }

    pub fn attach_calls(&self) -> usize {
        self.attached.load(Ordering::SeqCst)
    }

    pub fn detach_calls(&self) -> usize {
        self.detached.load(Ordering::SeqCst)
    }

    pub fn execute_calls(&self) -> u64 {
        self.executes.load(Ordering::SeqCst)
    }

    pub fn shutdown_calls(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

impl GraphicsEngine for RecordingGraphics {
    fn create_window(&self) -> Result<WindowHandle> {
        if self.fail_create_window.load(Ordering::SeqCst) {
            return Err(SessionError::resource_acquisition("window"));
        }
        let id = self.windows.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(WindowHandle(id as u32))
    }

    fn attach(&self, _window: WindowHandle) -> Result<()> {
        self.attached.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn detach(&self, _window: WindowHandle) {
        self.detached.fetch_add(1, Ordering::SeqCst);
    }

    fn execute(&self) {
        self.executes.fetch_add(1, Ordering::SeqCst);
    }

    fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// Poll `condition` every few milliseconds until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// Unique socket path under the temp directory.
pub fn temp_socket_path(name: &str) -> std::path::PathBuf {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!("subtrack-{}-{}-{}.sock", name, std::process::id(), n))
}
