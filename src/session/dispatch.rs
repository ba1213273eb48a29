//! Packet classification and routing.
//!
//! Every packet, whether it arrived on the socket, was drained from the
//! ingress queue or was synthesized by the session API, is applied here with
//! the decoder lock held. Lock order is render -> decoder -> queue; the render
//! condition variable is only signalled after the decoder lock is released.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::{debug, error, info, trace, warn};

use super::queue::IngressQueue;
use crate::config::Configuration;
use crate::controller::{ActiveDecoder, ControllerFactory, DecoderContext, PrerenderedFontCache};
use crate::error::{Result, SessionError};
use crate::graphics::{GraphicsEngine, WindowHandle};
use crate::protocol::{self, Packet, PacketCodec, PacketType};
use crate::source::PacketReceiver;
use crate::timing::StcProvider;
use crate::types::{CcAttributes, SessionType};

/// Everything guarded by the decoder lock.
pub(crate) struct DecoderState {
    pub(crate) active: Option<ActiveDecoder>,
    pub(crate) window: Option<WindowHandle>,
    pub(crate) font_cache: Arc<PrerenderedFontCache>,
    pub(crate) preview_text: String,
    pub(crate) custom_cc_styling: Option<CcAttributes>,
    pub(crate) custom_ttml_styling: String,
    pub(crate) muted: bool,
}

impl DecoderState {
    fn new() -> Self {
        Self {
            active: None,
            window: None,
            font_cache: Arc::new(PrerenderedFontCache::new()),
            preview_text: String::new(),
            custom_cc_styling: None,
            custom_ttml_styling: String::new(),
            muted: true,
        }
    }

    pub(crate) fn format(&self) -> SessionType {
        self.active.as_ref().map_or(SessionType::None, ActiveDecoder::format)
    }

    /// Active controller, if it decodes `format`.
    pub(crate) fn active_for(&mut self, format: SessionType) -> Option<&mut ActiveDecoder> {
        self.active.as_mut().filter(|decoder| decoder.format() == format)
    }
}

#[derive(Debug, Default)]
pub(crate) struct RenderFlags {
    pub(crate) quit: bool,
    /// Set by every notification so the inner wait can end early.
    pub(crate) wake: bool,
}

/// State shared between the session handle, its render thread and its
/// socket source.
pub(crate) struct SessionShared {
    pub(crate) display: String,
    pub(crate) config: Arc<Configuration>,
    pub(crate) codec: PacketCodec,
    pub(crate) graphics: Arc<dyn GraphicsEngine>,
    controllers: Arc<dyn ControllerFactory>,
    pub(crate) stc: Arc<StcProvider>,
    last_active: Mutex<Instant>,
    decoder: Mutex<DecoderState>,
    pub(crate) queue: IngressQueue,
    render: Mutex<RenderFlags>,
    pub(crate) render_cond: Condvar,
}

/// Whether a data packet of `packet_type` belongs to a decoder of `format`.
fn data_matches(packet_type: PacketType, format: SessionType) -> bool {
    match packet_type {
        PacketType::PesData => {
            matches!(format, SessionType::Ttx | SessionType::Dvb | SessionType::Scte)
        }
        PacketType::TtmlData => format == SessionType::Ttml,
        PacketType::WebvttData => format == SessionType::Webvtt,
        PacketType::CcData => format == SessionType::Cc,
        _ => false,
    }
}

impl SessionShared {
    pub(crate) fn new(
        display: String,
        config: Arc<Configuration>,
        codec: PacketCodec,
        graphics: Arc<dyn GraphicsEngine>,
        controllers: Arc<dyn ControllerFactory>,
    ) -> Self {
        Self {
            display,
            config,
            codec,
            graphics,
            controllers,
            stc: Arc::new(StcProvider::new()),
            last_active: Mutex::new(Instant::now()),
            decoder: Mutex::new(DecoderState::new()),
            queue: IngressQueue::default(),
            render: Mutex::new(RenderFlags::default()),
            render_cond: Condvar::new(),
        }
    }

    pub(crate) fn lock_decoder(&self) -> MutexGuard<'_, DecoderState> {
        self.decoder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lock_render(&self) -> MutexGuard<'_, RenderFlags> {
        self.render.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn touch(&self) {
        *self.last_active.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub(crate) fn last_active(&self) -> Instant {
        *self.last_active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_rendering_active(&self) -> bool {
        self.lock_decoder().active.is_some()
    }

    /// Wake the render thread. Must not be called with the decoder lock held.
    pub(crate) fn wake(&self) {
        self.lock_render().wake = true;
        self.render_cond.notify_one();
    }

    pub(crate) fn set_quit(&self, quit: bool) {
        let mut flags = self.lock_render();
        flags.quit = quit;
        flags.wake = quit;
        drop(flags);
        if quit {
            self.render_cond.notify_all();
        }
    }

    /// Decode, dispatch and wake: the path for packets synthesized by the
    /// session API.
    pub(crate) fn dispatch_encoded(&self, buffer: &[u8]) -> Result<()> {
        let packet = protocol::decode(buffer)?;
        let result = self.dispatch(&packet);
        self.wake();
        result
    }

    pub(crate) fn dispatch(&self, packet: &Packet) -> Result<()> {
        let mut state = self.lock_decoder();
        self.dispatch_locked(&mut state, packet)
    }

    pub(crate) fn dispatch_locked(&self, state: &mut DecoderState, packet: &Packet) -> Result<()> {
        self.touch();
        trace!(
            display = %self.display,
            packet_type = ?packet.packet_type,
            sequence = packet.sequence,
            "dispatching packet"
        );

        match packet.packet_type {
            PacketType::SubtitleSelection
            | PacketType::TeletextSelection
            | PacketType::TtmlSelection
            | PacketType::WebvttSelection => self.select_decoder(state, packet),

            PacketType::PesData | PacketType::TtmlData | PacketType::WebvttData | PacketType::CcData => {
                match state.active.as_mut() {
                    Some(decoder) if data_matches(packet.packet_type, decoder.format()) => {
                        decoder.controller().add_data(packet);
                    }
                    Some(decoder) => trace!(
                        packet_type = ?packet.packet_type,
                        session_type = %decoder.format(),
                        "data for another format dropped"
                    ),
                    None => trace!(packet_type = ?packet.packet_type, "no active decoder, data dropped"),
                }
                Ok(())
            }

            PacketType::ResetAll => {
                let dropped = self.queue.clear();
                debug!(display = %self.display, dropped, "reset all");
                self.release_decoder(state, "reset all");
                Ok(())
            }

            PacketType::ResetChannel => {
                if state.active.as_ref().is_some_and(|decoder| decoder.wants_data(packet)) {
                    self.release_decoder(state, "channel reset");
                } else {
                    debug!(display = %self.display, "channel reset ignored by decoder");
                }
                Ok(())
            }

            PacketType::Timestamp => {
                let sample = packet.timestamp()?;
                self.stc.process_timestamp(sample.stc, sample.timestamp_ms);
                Ok(())
            }

            PacketType::TtmlTimestamp | PacketType::WebvttTimestamp => {
                let format = if packet.packet_type == PacketType::TtmlTimestamp {
                    SessionType::Ttml
                } else {
                    SessionType::Webvtt
                };
                if let Some(decoder) = state.active_for(format) {
                    decoder.controller().process_timestamp(packet);
                }
                Ok(())
            }

            PacketType::Pause => {
                if let Some(decoder) = state.active.as_mut() {
                    decoder.controller().pause();
                }
                Ok(())
            }

            PacketType::Resume => {
                if let Some(decoder) = state.active.as_mut() {
                    decoder.controller().resume();
                }
                Ok(())
            }

            PacketType::Mute | PacketType::Unmute => {
                let muted = packet.packet_type == PacketType::Mute;
                if let Some(decoder) = state.active.as_mut() {
                    debug!(display = %self.display, muted, session_type = %decoder.format(), "mute");
                    decoder.controller().mute(muted);
                    state.muted = muted;
                }
                Ok(())
            }

            PacketType::SetCcAttributes => {
                let preview = state.preview_text.clone();
                if let Some(decoder) = state.active_for(SessionType::Cc) {
                    decoder.controller().process_set_cc_attributes(packet);
                    if !preview.is_empty() {
                        decoder.controller().set_text_for_preview(&preview);
                    }
                }
                Ok(())
            }

            PacketType::TtmlInfo => {
                if let Some(decoder) = state.active.as_mut() {
                    decoder.controller().process_info(packet);
                }
                Ok(())
            }

            PacketType::Invalid => {
                error!(display = %self.display, raw_type = packet.raw_type, "invalid packet type");
                Err(SessionError::UnknownPacketType { raw: packet.raw_type })
            }
        }
    }

    /// Deactivate and drop the active decoder, if any.
    pub(crate) fn release_decoder(&self, state: &mut DecoderState, reason: &str) {
        if let Some(decoder) = state.active.take() {
            info!(display = %self.display, session_type = %decoder.format(), reason, "releasing decoder");
            decoder.release();
        }
    }

    fn select_decoder(&self, state: &mut DecoderState, packet: &Packet) -> Result<()> {
        if state.active.is_some() {
            let dropped = self.queue.clear();
            debug!(display = %self.display, dropped, "reselection, data queue cleared");
            self.release_decoder(state, "new selection");
        }

        let selection = packet.selection()?;
        let format = selection.session_type().ok_or_else(|| {
            error!(display = %self.display, ?selection, "unknown subtitle type");
            SessionError::decoder_construction(SessionType::None, format!("{:?}", selection))
        })?;

        if !self.config.is_enabled(format) {
            warn!(display = %self.display, session_type = %format, "decoder disabled by configuration");
            return Err(SessionError::decoder_construction(format, "disabled by configuration"));
        }

        let window = state
            .window
            .ok_or_else(|| SessionError::decoder_construction(format, "session is not started"))?;

        if format == SessionType::Cc {
            state.font_cache = Arc::new(PrerenderedFontCache::new());
        }

        let context = DecoderContext {
            format,
            window,
            graphics: Arc::clone(&self.graphics),
            stc: Arc::clone(&self.stc),
            font_cache: Arc::clone(&state.font_cache),
            config: Arc::clone(&self.config),
        };

        let mut controller = self.controllers.create(context).map_err(|e| match e {
            e @ SessionError::DecoderConstruction { .. } => e,
            other => SessionError::decoder_construction(format, other.to_string()),
        })?;

        if let Err(e) = controller.activate(packet) {
            error!(display = %self.display, session_type = %format, error = %e, "decoder activation failed");
            controller.deactivate();
            return Err(SessionError::decoder_construction(format, e.to_string()));
        }

        state.muted = true;
        state.active = Some(ActiveDecoder::new(format, controller));
        info!(display = %self.display, session_type = %format, ?selection, "decoder selected");
        Ok(())
    }
}

impl PacketReceiver for SessionShared {
    fn on_packet_received(&self, packet: &Packet) {
        if let Err(e) = self.dispatch(packet) {
            warn!(display = %self.display, error = %e, "packet rejected");
        }
        self.wake();
    }

    fn add_buffer(&self, buffer: Vec<u8>) -> bool {
        if !self.is_rendering_active() {
            trace!(display = %self.display, length = buffer.len(), "no active decoder, buffer dropped");
            return false;
        }
        self.queue.push(buffer);
        self.wake();
        true
    }

    fn on_stream_broken(&self) {
        error!(display = %self.display, "packet stream broken");
    }
}
