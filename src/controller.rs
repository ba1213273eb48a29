//! Decoder controller interface.
//!
//! Each subtitle format is implemented by a controller that owns its own
//! decode and render state. The session engine never looks inside a
//! controller: it creates one through a [`ControllerFactory`] when a selection
//! packet arrives, feeds it packets for its format, and asks it how long it
//! wants to sleep between `process()` steps.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::config::{Configuration, DecoderConfig};
use crate::error::Result;
use crate::graphics::{GraphicsEngine, WindowHandle};
use crate::protocol::Packet;
use crate::timing::StcProvider;
use crate::types::SessionType;

/// Format-specific decode/render state machine.
///
/// All calls are made with the session's decoder lock held and must return
/// promptly; a call that blocks stalls both the render thread and every
/// control call on the session.
pub trait DecoderController: Send {
    /// Apply the selection packet that created this controller.
    fn activate(&mut self, selection: &Packet) -> Result<()>;

    /// Queue one data packet of this controller's format.
    fn add_data(&mut self, packet: &Packet);

    /// Decode pending data and draw into the session window.
    fn process(&mut self);

    /// How long the render thread may sleep before the next `process()`.
    ///
    /// [`Duration::ZERO`] asks to be processed again immediately.
    fn wait_time(&self) -> Duration;

    fn pause(&mut self);

    fn resume(&mut self);

    fn mute(&mut self, muted: bool);

    /// Whether a RESET_CHANNEL packet applies to this controller.
    fn wants_data(&self, packet: &Packet) -> bool;

    /// Release everything drawn and stop decoding. Called exactly once before
    /// the controller is dropped.
    fn deactivate(&mut self);

    /// Closed captions only.
    fn process_set_cc_attributes(&mut self, _packet: &Packet) {}

    /// WebVTT and TTML media timestamps.
    fn process_timestamp(&mut self, _packet: &Packet) {}

    /// TTML only.
    fn process_info(&mut self, _packet: &Packet) {}

    /// Closed captions only: render `text` with the current style.
    fn set_text_for_preview(&mut self, _text: &str) {}

    /// TTML only.
    fn set_custom_ttml_styling(&mut self, _styling: &str) {}
}

/// Shared resources handed to a controller at construction.
#[derive(Clone)]
pub struct DecoderContext {
    pub format: SessionType,
    pub window: WindowHandle,
    pub graphics: Arc<dyn GraphicsEngine>,
    pub stc: Arc<StcProvider>,
    pub font_cache: Arc<PrerenderedFontCache>,
    pub config: Arc<Configuration>,
}

impl DecoderContext {
    /// Settings for this context's format.
    pub fn decoder_config(&self) -> Option<&DecoderConfig> {
        self.config.decoder(self.format)
    }
}

impl fmt::Debug for DecoderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderContext")
            .field("format", &self.format)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

/// Builds controllers for the formats a host supports.
pub trait ControllerFactory: Send + Sync {
    fn create(&self, context: DecoderContext) -> Result<Box<dyn DecoderController>>;
}

/// The active controller paired with its format tag.
pub struct ActiveDecoder {
    format: SessionType,
    controller: Box<dyn DecoderController>,
}

impl ActiveDecoder {
    pub fn new(format: SessionType, controller: Box<dyn DecoderController>) -> Self {
        Self { format, controller }
    }

    pub fn format(&self) -> SessionType {
        self.format
    }

    pub fn controller(&mut self) -> &mut dyn DecoderController {
        self.controller.as_mut()
    }

    pub fn wants_data(&self, packet: &Packet) -> bool {
        self.controller.wants_data(packet)
    }

    /// Deactivate and drop the controller.
    pub fn release(mut self) {
        self.controller.deactivate();
    }
}

impl fmt::Debug for ActiveDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveDecoder").field("format", &self.format).finish_non_exhaustive()
    }
}

/// Identifies one prerendered glyph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GlyphKey {
    pub font_family: String,
    pub font_size: u32,
    pub glyph: char,
}

/// Cache of prerendered glyph bitmaps shared by closed-caption controllers.
///
/// The session replaces it with an empty cache on every closed-caption
/// selection.
#[derive(Debug, Default)]
pub struct PrerenderedFontCache {
    glyphs: Mutex<HashMap<GlyphKey, Arc<[u8]>>>,
}

impl PrerenderedFontCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &GlyphKey) -> Option<Arc<[u8]>> {
        self.glyphs.lock().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
    }

    /// Look up a glyph, rendering and caching it on a miss.
    pub fn get_or_render(&self, key: GlyphKey, render: impl FnOnce(&GlyphKey) -> Vec<u8>) -> Arc<[u8]> {
        let mut glyphs = self.glyphs.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bitmap) = glyphs.get(&key) {
            return Arc::clone(bitmap);
        }
        let bitmap: Arc<[u8]> = render(&key).into();
        glyphs.insert(key, Arc::clone(&bitmap));
        bitmap
    }

    pub fn len(&self) -> usize {
        self.glyphs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
