//! Render session engine.
//!
//! A [`RenderSession`] drives subtitle rendering for one display surface. It
//! owns at most one active decoder controller, a FIFO ingress queue of data
//! packets and a render thread that drains the queue and paces the decoder.
//!
//! Packets reach the session three ways, all funnelling into the same
//! dispatch function under the decoder lock:
//!
//! - data submitted through [`RenderSession::send_data`] or received on the
//!   session socket is queued and dispatched by the render thread
//! - control packets received on the socket are dispatched on arrival
//! - control calls such as [`RenderSession::mute`] synthesize a packet and
//!   dispatch it synchronously
//!
//! Order is FIFO within each path but not across them. Queued data waits for
//! the render thread, so a control call made right after `send_data` can
//! reach the decoder before that data does.
//!
//! ```rust
//! use std::sync::Arc;
//! use subtrack::{Configuration, DataType, HeadlessGraphics, RenderSession, SessionType};
//!
//! let mut session = RenderSession::builder("disp0")
//!     .config(Arc::new(Configuration::default()))
//!     .graphics(Arc::new(HeadlessGraphics::new()))
//!     .build();
//!
//! session.start()?;
//! assert_eq!(session.session_type(), SessionType::None);
//!
//! // Nothing selected yet, so data is dropped rather than queued.
//! assert!(!session.send_data(DataType::Webvtt, b"WEBVTT", 0));
//! session.stop();
//! # Ok::<(), subtrack::SessionError>(())
//! ```

mod dispatch;
mod queue;
mod render_loop;


use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use tracing::{debug, error, info};

use self::dispatch::SessionShared;
use crate::config::Configuration;
use crate::controller::ControllerFactory;
use crate::error::{Result, SessionError};
use crate::graphics::{GraphicsEngine, HeadlessGraphics};
use crate::protocol::{PacketCodec, PacketType};
use crate::source::{PacketReceiver, UnixSocketSource};
use crate::types::{CcAttributes, CcServiceType, DataType, SessionType};

/// Subtitle rendering session for one display surface.
///
/// Dropping the session stops it and shuts its graphics engine down.
pub struct RenderSession {
    shared: Arc<SessionShared>,
    socket_path: Option<PathBuf>,
    socket: Option<UnixSocketSource>,
    render_thread: Option<JoinHandle<()>>,
    started: bool,
}

/// Builder for [`RenderSession`].
pub struct RenderSessionBuilder {
    display: String,
    socket_path: Option<PathBuf>,
    config: Option<Arc<Configuration>>,
    graphics: Option<Arc<dyn GraphicsEngine>>,
    controllers: Option<Arc<dyn ControllerFactory>>,
    codec: Option<PacketCodec>,
}

impl RenderSessionBuilder {
    /// Bind a Unix datagram socket at `path` when the session starts.
    pub fn socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = Some(path.into());
        self
    }

    pub fn config(mut self, config: Arc<Configuration>) -> Self {
        self.config = Some(config);
        self
    }

    pub fn graphics(mut self, graphics: Arc<dyn GraphicsEngine>) -> Self {
        self.graphics = Some(graphics);
        self
    }

    pub fn controllers(mut self, controllers: Arc<dyn ControllerFactory>) -> Self {
        self.controllers = Some(controllers);
        self
    }

    /// Codec used for synthesized packets; pass one sharing a
    /// [`SequenceGenerator`](crate::SequenceGenerator) to number packets
    /// across sessions.
    pub fn codec(mut self, codec: PacketCodec) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Build the session. A missing graphics engine defaults to
    /// [`HeadlessGraphics`]; a missing controller factory yields a session that
    /// rejects every selection.
    pub fn build(self) -> RenderSession {
        let controllers = self.controllers.unwrap_or_else(|| Arc::new(NoControllers));
        let shared = SessionShared::new(
            self.display,
            self.config.unwrap_or_default(),
            self.codec.unwrap_or_default(),
            self.graphics.unwrap_or_else(|| Arc::new(HeadlessGraphics::new())),
            controllers,
        );
        RenderSession {
            shared: Arc::new(shared),
            socket_path: self.socket_path,
            socket: None,
            render_thread: None,
            started: false,
        }
    }
}

struct NoControllers;

impl ControllerFactory for NoControllers {
    fn create(
        &self,
        context: crate::controller::DecoderContext,
    ) -> Result<Box<dyn crate::controller::DecoderController>> {
        Err(SessionError::decoder_construction(context.format, "no controller factory configured"))
    }
}

impl RenderSession {
    pub fn builder(display: impl Into<String>) -> RenderSessionBuilder {
        RenderSessionBuilder {
            display: display.into(),
            socket_path: None,
            config: None,
            graphics: None,
            controllers: None,
            codec: None,
        }
    }

    pub fn display_name(&self) -> &str {
        &self.shared.display
    }

    pub fn socket_path(&self) -> Option<&Path> {
        self.socket_path.as_deref()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Allocate the window, bind the socket and spawn the render thread.
    ///
    /// On failure everything acquired so far is released again. Calling
    /// `start()` on a started session does nothing.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        info!(display = %self.shared.display, socket = ?self.socket_path, "starting session");

        let graphics = Arc::clone(&self.shared.graphics);
        let window = graphics.create_window()?;
        graphics.attach(window)?;
        self.shared.lock_decoder().window = Some(window);
        self.shared.set_quit(false);

        if let Some(path) = &self.socket_path {
            let receiver: Arc<dyn PacketReceiver> = self.shared.clone();
            match UnixSocketSource::start(path, self.shared.config.session.socket_buffer_size, receiver) {
                Ok(socket) => self.socket = Some(socket),
                Err(e) => {
                    error!(display = %self.shared.display, error = %e, "cannot create socket source");
                    self.release_window();
                    return Err(e);
                }
            }
        }

        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name(format!("render-{}", self.shared.display))
            .spawn(move || render_loop::run(shared));
        match spawned {
            Ok(handle) => self.render_thread = Some(handle),
            Err(e) => {
                error!(display = %self.shared.display, error = %e, "cannot spawn render thread");
                if let Some(mut socket) = self.socket.take() {
                    socket.stop();
                }
                self.release_window();
                return Err(SessionError::resource_acquisition_with_source("render thread", Box::new(e)));
            }
        }

        self.started = true;
        self.shared.touch();
        Ok(())
    }

    /// Tear the session down: stop the socket, join the render thread, drop
    /// queued data and the decoder, and detach the window.
    ///
    /// Joins unconditionally; a decoder call that never returns hangs here.
    pub fn stop(&mut self) {
        if !self.started {
            return;
        }
        self.started = false;
        info!(display = %self.shared.display, "stopping session");

        if let Some(mut socket) = self.socket.take() {
            socket.stop();
        }

        self.shared.set_quit(true);
        if let Some(handle) = self.render_thread.take() {
            if handle.join().is_err() {
                error!(display = %self.shared.display, "render thread panicked");
            }
        }

        self.shared.queue.clear();
        {
            let mut state = self.shared.lock_decoder();
            self.shared.release_decoder(&mut state, "session stop");
        }
        self.release_window();
    }

    fn release_window(&self) {
        let window = self.shared.lock_decoder().window.take();
        if let Some(window) = window {
            debug!(display = %self.shared.display, window = window.0, "detaching window");
            self.shared.graphics.detach(window);
        }
    }

    /// Release the decoder and queued data while keeping the thread, socket
    /// and window alive.
    pub fn close(&self) {
        self.shared.queue.clear();
        let mut state = self.shared.lock_decoder();
        self.shared.release_decoder(&mut state, "session close");
    }

    /// Queue subtitle data for the render thread.
    ///
    /// Returns `false` when the data was dropped because no decoder is active.
    /// Control calls made afterwards are not held back behind this data.
    pub fn send_data(&self, data_type: DataType, data: &[u8], display_offset_ms: i64) -> bool {
        let codec = &self.shared.codec;
        let buffer = match data_type {
            DataType::Pes => codec.encode_pes_data(data),
            DataType::Ttml => codec.encode_ttml_data(data, display_offset_ms),
            DataType::Webvtt => codec.encode_webvtt_data(data, display_offset_ms),
            DataType::Cc => codec.encode_cc_data(data),
        };
        self.shared.add_buffer(buffer)
    }

    /// Forward a media timestamp to a WebVTT or TTML decoder. Other formats
    /// ignore it.
    pub fn send_timestamp(&self, media_timestamp_ms: u64) -> Result<()> {
        let packet_type = match self.session_type() {
            SessionType::Webvtt => PacketType::WebvttTimestamp,
            SessionType::Ttml => PacketType::TtmlTimestamp,
            other => {
                debug!(display = %self.shared.display, session_type = %other, "timestamp ignored");
                return Ok(());
            }
        };
        let buffer = self.shared.codec.encode_media_timestamp(packet_type, media_timestamp_ms);
        self.shared.dispatch_encoded(&buffer)
    }

    fn send_control(&self, packet_type: PacketType) -> Result<()> {
        let buffer = self.shared.codec.encode_control(packet_type);
        self.shared.dispatch_encoded(&buffer)
    }

    pub fn pause(&self) -> Result<()> {
        self.send_control(PacketType::Pause)
    }

    pub fn resume(&self) -> Result<()> {
        self.send_control(PacketType::Resume)
    }

    pub fn mute(&self) -> Result<()> {
        self.send_control(PacketType::Mute)
    }

    pub fn unmute(&self) -> Result<()> {
        self.send_control(PacketType::Unmute)
    }

    /// Channel reset: the decoder is dropped only if it claims the reset.
    pub fn reset(&self) -> Result<()> {
        self.send_control(PacketType::ResetChannel)
    }

    /// Drop queued data and the decoder unconditionally.
    pub fn reset_all(&self) -> Result<()> {
        self.send_control(PacketType::ResetAll)
    }

    /// Select a closed-caption service. A custom session style is re-applied
    /// to the new decoder.
    pub fn select_cc_service(&self, service_type: CcServiceType, service_id: u32) -> Result<()> {
        let buffer = self.shared.codec.encode_cc_selection(service_type, service_id);
        self.shared.dispatch_encoded(&buffer)?;
        let custom = self.shared.lock_decoder().custom_cc_styling;
        if let Some(attributes) = custom {
            self.apply_cc_styling(&attributes)?;
        }
        Ok(())
    }

    pub fn select_ttx_service(&self, page: u16) -> Result<()> {
        let buffer = self.shared.codec.encode_teletext_selection(page);
        self.shared.dispatch_encoded(&buffer)
    }

    pub fn select_dvb_service(&self, composition_page: u16, ancillary_page: u16) -> Result<()> {
        let buffer = self.shared.codec.encode_dvb_selection(composition_page, ancillary_page);
        self.shared.dispatch_encoded(&buffer)
    }

    pub fn select_webvtt_service(&self, video_width: u32, video_height: u32) -> Result<()> {
        let buffer = self.shared.codec.encode_webvtt_selection(video_width, video_height);
        self.shared.dispatch_encoded(&buffer)
    }

    /// Select TTML. A custom session style is re-applied to the new decoder.
    pub fn select_ttml_service(&self, video_width: u32, video_height: u32) -> Result<()> {
        let buffer = self.shared.codec.encode_ttml_selection(video_width, video_height);
        self.shared.dispatch_encoded(&buffer)?;
        let mut state = self.shared.lock_decoder();
        let styling = state.custom_ttml_styling.clone();
        if styling.is_empty() {
            return Ok(());
        }
        if let Some(decoder) = state.active_for(SessionType::Ttml) {
            decoder.controller().set_custom_ttml_styling(&styling);
        }
        Ok(())
    }

    pub fn select_scte_service(&self) -> Result<()> {
        let buffer = self.shared.codec.encode_scte_selection();
        self.shared.dispatch_encoded(&buffer)
    }

    /// Forward TTML informational text to the active decoder.
    pub fn send_ttml_info(&self, text: &str) -> Result<()> {
        let buffer = self.shared.codec.encode_ttml_info(text);
        self.shared.dispatch_encoded(&buffer)
    }

    /// Push closed-caption attributes through the packet pipeline. Applies
    /// only while a closed-caption decoder is active.
    pub fn apply_cc_styling(&self, attributes: &CcAttributes) -> Result<()> {
        let buffer = self.shared.codec.encode_cc_attributes(attributes);
        self.shared.dispatch_encoded(&buffer)
    }

    /// Set or clear the session's own closed-caption style. While set, it is
    /// re-applied on every closed-caption selection and global style pushes
    /// skip this session.
    pub fn set_custom_cc_styling(&self, attributes: Option<CcAttributes>) -> Result<()> {
        self.shared.lock_decoder().custom_cc_styling = attributes;
        match attributes {
            Some(attributes) => self.apply_cc_styling(&attributes),
            None => Ok(()),
        }
    }

    pub fn has_custom_cc_styling(&self) -> bool {
        self.shared.lock_decoder().custom_cc_styling.is_some()
    }

    /// Set the session's own TTML style override. An empty string clears it.
    ///
    /// Fails with [`SessionError::NotSupported`] unless a TTML decoder is
    /// active.
    pub fn set_custom_ttml_styling(&self, styling: &str) -> Result<()> {
        let mut state = self.shared.lock_decoder();
        let format = state.format();
        let Some(decoder) = state.active_for(SessionType::Ttml) else {
            return Err(SessionError::not_supported("custom TTML styling", format));
        };
        decoder.controller().set_custom_ttml_styling(styling);
        state.custom_ttml_styling = styling.to_string();
        Ok(())
    }

    pub fn has_custom_ttml_styling(&self) -> bool {
        !self.shared.lock_decoder().custom_ttml_styling.is_empty()
    }

    /// Apply a TTML style override to the current decoder only. Returns
    /// whether a TTML decoder was there to take it.
    pub fn apply_ttml_styling(&self, styling: &str) -> bool {
        let mut state = self.shared.lock_decoder();
        match state.active_for(SessionType::Ttml) {
            Some(decoder) => {
                decoder.controller().set_custom_ttml_styling(styling);
                true
            }
            None => false,
        }
    }

    /// Remember `text` as the closed-caption preview and render it if a
    /// closed-caption decoder is active.
    pub fn set_text_for_cc_preview(&self, text: &str) {
        let mut state = self.shared.lock_decoder();
        state.preview_text = text.to_string();
        if let Some(decoder) = state.active_for(SessionType::Cc) {
            decoder.controller().set_text_for_preview(text);
        }
    }

    /// Re-render the stored preview text, if any.
    pub fn refresh_cc_preview(&self) {
        let mut state = self.shared.lock_decoder();
        let text = state.preview_text.clone();
        if text.is_empty() {
            return;
        }
        if let Some(decoder) = state.active_for(SessionType::Cc) {
            decoder.controller().set_text_for_preview(&text);
        }
    }

    /// Format of the active decoder.
    pub fn session_type(&self) -> SessionType {
        self.shared.lock_decoder().format()
    }

    pub fn is_rendering_active(&self) -> bool {
        self.shared.is_rendering_active()
    }

    /// Mute state last forwarded to the active decoder; `true` for a fresh
    /// decoder.
    pub fn is_muted(&self) -> bool {
        self.shared.lock_decoder().muted
    }

    pub fn queued_packets(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn touch(&self) {
        self.shared.touch();
    }

    pub fn last_active(&self) -> Instant {
        self.shared.last_active()
    }

    /// Shared STC provider handed to every decoder of this session.
    pub fn stc(&self) -> &crate::timing::StcProvider {
        &self.shared.stc
    }

    /// Receiver view of this session, for feeding it from a custom source.
    pub fn receiver(&self) -> Arc<dyn PacketReceiver> {
        self.shared.clone()
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        self.stop();
        self.shared.graphics.shutdown();
    }
}

impl std::fmt::Debug for RenderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSession")
            .field("display", &self.shared.display)
            .field("socket_path", &self.socket_path)
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}
