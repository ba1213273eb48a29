//! Session packet-dispatch and render-loop engine for subtitle decoders.
//!
//! Subtrack drives subtitle and caption rendering for display surfaces. Each
//! [`RenderSession`] ingests a small binary packet protocol, either from a Unix
//! datagram socket or from direct API calls, selects one decoder out of six
//! mutually exclusive formats and paces it on a dedicated render thread.
//!
//! # Features
//!
//! - **One pipeline**: socket packets and API calls funnel into the same
//!   dispatch function; data is queued for the render thread while control
//!   is applied on arrival
//! - **Decoder selection**: CC, Teletext, DVB, WebVTT, TTML and SCTE decoders
//!   plug in through [`ControllerFactory`]
//! - **Pacing**: the render thread sleeps for as long as the decoder asks and
//!   wakes early on new data, control or shutdown
//! - **Registry**: [`SessionRegistry`] maps session ids to sessions and owns
//!   the global caption style
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use subtrack::{Configuration, DataType, HeadlessGraphicsFactory, SessionRegistry, SessionType};
//! # use subtrack::{ControllerFactory, DecoderContext, DecoderController, SessionError};
//! # struct Rejecting;
//! # impl ControllerFactory for Rejecting {
//! #     fn create(&self, context: DecoderContext) -> subtrack::Result<Box<dyn DecoderController>> {
//! #         Err(SessionError::decoder_construction(context.format, "none"))
//! #     }
//! # }
//!
//! let config = Configuration::from_yaml_str("session:\n  idle_timeout_secs: 60\n")?;
//! let registry = SessionRegistry::new(Arc::new(config), Arc::new(HeadlessGraphicsFactory), Arc::new(Rejecting));
//!
//! let id = registry.open_session("disp0")?;
//! assert_eq!(registry.session_type(id)?, SessionType::None);
//!
//! // The factory rejects every format, so the selection fails and data is dropped.
//! assert!(registry.set_session_webvtt_selection(id).is_err());
//! assert!(!registry.send_session_data(id, DataType::Webvtt, 0, b"WEBVTT")?);
//! # Ok::<(), subtrack::SessionError>(())
//! ```

// Core types and error handling
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Wire protocol and collaborators
pub mod config;
pub mod controller;
pub mod graphics;
pub mod protocol;
pub mod timing;

// Session engine
pub mod registry;
pub mod session;
pub mod source;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use config::{Configuration, DecoderConfig, SessionSettings};
pub use controller::{ControllerFactory, DecoderContext, DecoderController, PrerenderedFontCache};
pub use graphics::{GraphicsEngine, GraphicsFactory, HeadlessGraphics, HeadlessGraphicsFactory, WindowHandle};
pub use protocol::{Packet, PacketCodec, PacketType, SequenceGenerator};
pub use registry::{SessionRegistry, parse_cc_service};
pub use session::{RenderSession, RenderSessionBuilder};
pub use source::{PacketReceiver, UnixSocketSource};
pub use timing::StcProvider;
