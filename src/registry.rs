//! Session registry.
//!
//! Maps [`SessionId`]s to [`RenderSession`]s, routes external calls to them
//! and owns the process-wide closed-caption style and TTML style overrides.
//! Every lookup of an unknown id fails with [`SessionError::UnknownSession`].
//!
//! Global style changes are pushed to every session without a session
//! override and published on watch channels, so observers can follow them as
//! streams:
//!
//! ```rust
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use subtrack::{ClosedCaptionsStyle, Configuration, FontSize, HeadlessGraphicsFactory, SessionRegistry};
//! # use subtrack::{ControllerFactory, DecoderContext, DecoderController, SessionError};
//! # struct Rejecting;
//! # impl ControllerFactory for Rejecting {
//! #     fn create(&self, context: DecoderContext) -> subtrack::Result<Box<dyn DecoderController>> {
//! #         Err(SessionError::decoder_construction(context.format, "none"))
//! #     }
//! # }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let registry = SessionRegistry::new(
//!     Arc::new(Configuration::default()),
//!     Arc::new(HeadlessGraphicsFactory),
//!     Arc::new(Rejecting),
//! );
//! let mut styles = registry.closed_captions_style_updates();
//! assert_eq!(styles.next().await.unwrap().font_size, FontSize::ContentDefault);
//!
//! registry.set_closed_captions_style(ClosedCaptionsStyle {
//!     font_size: FontSize::Large,
//!     ..Default::default()
//! });
//! assert_eq!(styles.next().await.unwrap().font_size, FontSize::Large);
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Configuration;
use crate::controller::ControllerFactory;
use crate::error::{Result, SessionError};
use crate::graphics::GraphicsFactory;
use crate::protocol::{PacketCodec, SequenceGenerator};
use crate::session::RenderSession;
use crate::types::{CcServiceType, ClosedCaptionsStyle, DataType, SessionId, SessionType};

/// Parse a closed-caption service name.
///
/// `"SERVICEn"` selects CEA-708 service `n`. `"CCn"` and `"TEXTn"` select
/// CEA-608 services, numbered from 1000 and 1004 respectively.
pub fn parse_cc_service(service: &str) -> Result<(CcServiceType, u32)> {
    let (service_type, digits, base) = if let Some(rest) = service.strip_prefix("SERVICE") {
        (CcServiceType::Cea708, rest, 0)
    } else if let Some(rest) = service.strip_prefix("CC") {
        (CcServiceType::Cea608, rest, 999)
    } else if let Some(rest) = service.strip_prefix("TEXT") {
        (CcServiceType::Cea608, rest, 1003)
    } else {
        return Err(SessionError::invalid_argument(format!("unknown caption service '{}'", service)));
    };

    let number: u32 = digits
        .parse()
        .map_err(|_| SessionError::invalid_argument(format!("bad caption service number in '{}'", service)))?;
    let service_id = number
        .checked_add(base)
        .ok_or_else(|| SessionError::invalid_argument(format!("caption service '{}' out of range", service)))?;
    Ok((service_type, service_id))
}

/// Registry of render sessions.
pub struct SessionRegistry {
    config: Arc<Configuration>,
    graphics: Arc<dyn GraphicsFactory>,
    controllers: Arc<dyn ControllerFactory>,
    sequence: SequenceGenerator,
    sessions: Mutex<BTreeMap<SessionId, RenderSession>>,
    next_id: AtomicU32,
    cc_style: watch::Sender<Arc<ClosedCaptionsStyle>>,
    ttml_overrides: watch::Sender<Arc<str>>,
}

impl SessionRegistry {
    /// Global styles start from `config.closed_captions_style` and
    /// `config.ttml_style_overrides`.
    pub fn new(
        config: Arc<Configuration>,
        graphics: Arc<dyn GraphicsFactory>,
        controllers: Arc<dyn ControllerFactory>,
    ) -> Self {
        let (cc_style, _) = watch::channel(Arc::new(config.closed_captions_style.clone()));
        let (ttml_overrides, _) = watch::channel(Arc::<str>::from(config.ttml_style_overrides.as_str()));
        Self {
            config,
            graphics,
            controllers,
            sequence: SequenceGenerator::new(),
            sessions: Mutex::new(BTreeMap::new()),
            next_id: AtomicU32::new(1),
            cc_style,
            ttml_overrides,
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    fn lock_sessions(&self) -> MutexGuard<'_, BTreeMap<SessionId, RenderSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_session<T>(&self, id: SessionId, f: impl FnOnce(&mut RenderSession) -> Result<T>) -> Result<T> {
        let mut sessions = self.lock_sessions();
        let session = sessions.get_mut(&id).ok_or_else(|| SessionError::unknown_session(id.0))?;
        f(session)
    }

    /// Open a session on `display`, or reuse the one already there.
    pub fn open_session(&self, display: &str) -> Result<SessionId> {
        self.open(display, None)
    }

    /// Open a session on `display` fed by a datagram socket bound at
    /// `socket_path`.
    pub fn open_session_with_socket(&self, display: &str, socket_path: impl Into<PathBuf>) -> Result<SessionId> {
        self.open(display, Some(socket_path.into()))
    }

    fn open(&self, display_name: &str, socket_path: Option<PathBuf>) -> Result<SessionId> {
        if display_name.is_empty() {
            return Err(SessionError::invalid_argument("display name must not be empty"));
        }

        let mut sessions = self.lock_sessions();
        if let Some((id, session)) = sessions.iter_mut().find(|(_, s)| s.display_name() == display_name) {
            info!(session = %id, display = %display_name, "reopening session");
            session.start()?;
            session.touch();
            return Ok(*id);
        }

        let graphics = self.graphics.create_engine(display_name)?;
        let mut builder = RenderSession::builder(display_name)
            .config(Arc::clone(&self.config))
            .graphics(graphics)
            .controllers(Arc::clone(&self.controllers))
            .codec(PacketCodec::new(self.sequence.clone()));
        if let Some(path) = socket_path {
            builder = builder.socket(path);
        }
        let mut session = builder.build();
        session.start()?;

        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        info!(session = %id, display = %display_name, "session opened");
        sessions.insert(id, session);
        Ok(id)
    }

    /// Mute and release the decoder, keeping the session started.
    pub fn close_session(&self, id: SessionId) -> Result<()> {
        info!(session = %id, "closing session");
        self.with_session(id, |session| {
            session.mute()?;
            session.touch();
            session.close();
            Ok(())
        })
    }

    /// Stop and drop a session.
    pub fn remove_session(&self, id: SessionId) -> Result<()> {
        let session = self.lock_sessions().remove(&id).ok_or_else(|| SessionError::unknown_session(id.0))?;
        info!(session = %id, display = session.display_name(), "removing session");
        drop(session);
        Ok(())
    }

    pub fn reset_session(&self, id: SessionId) -> Result<()> {
        self.with_session(id, |session| session.reset())
    }

    pub fn pause_session(&self, id: SessionId) -> Result<()> {
        self.with_session(id, |session| session.pause())
    }

    pub fn resume_session(&self, id: SessionId) -> Result<()> {
        self.with_session(id, |session| session.resume())
    }

    pub fn mute_session(&self, id: SessionId) -> Result<()> {
        self.with_session(id, |session| session.mute())
    }

    pub fn unmute_session(&self, id: SessionId) -> Result<()> {
        self.with_session(id, |session| session.unmute())
    }

    /// Queue data on a session. Returns whether a decoder took it.
    pub fn send_session_data(
        &self,
        id: SessionId,
        data_type: DataType,
        display_offset_ms: i64,
        data: &[u8],
    ) -> Result<bool> {
        self.with_session(id, |session| Ok(session.send_data(data_type, data, display_offset_ms)))
    }

    pub fn send_session_timestamp(&self, id: SessionId, media_timestamp_ms: u64) -> Result<()> {
        self.with_session(id, |session| session.send_timestamp(media_timestamp_ms))
    }

    /// Select a caption service by name (see [`parse_cc_service`]) and apply
    /// the global caption style unless the session has its own.
    pub fn set_session_closed_captions_service(&self, id: SessionId, service: &str) -> Result<()> {
        let (service_type, service_id) = parse_cc_service(service)?;
        let style = self.cc_style.borrow().to_attributes();
        self.with_session(id, |session| {
            session.select_cc_service(service_type, service_id)?;
            if !session.has_custom_cc_styling() {
                session.apply_cc_styling(&style)?;
                session.refresh_cc_preview();
            }
            Ok(())
        })
    }

    pub fn set_session_teletext_selection(&self, id: SessionId, page: u16) -> Result<()> {
        self.with_session(id, |session| session.select_ttx_service(page))
    }

    pub fn set_session_dvb_selection(&self, id: SessionId, composition_page: u16, ancillary_page: u16) -> Result<()> {
        self.with_session(id, |session| session.select_dvb_service(composition_page, ancillary_page))
    }

    pub fn set_session_webvtt_selection(&self, id: SessionId) -> Result<()> {
        let (width, height) = self.default_video_size();
        self.with_session(id, |session| session.select_webvtt_service(width, height))
    }

    /// Select TTML and apply the global overrides unless the session has its
    /// own.
    pub fn set_session_ttml_selection(&self, id: SessionId) -> Result<()> {
        let (width, height) = self.default_video_size();
        let overrides = self.ttml_style_overrides();
        self.with_session(id, |session| {
            session.select_ttml_service(width, height)?;
            if !session.has_custom_ttml_styling() && !overrides.is_empty() {
                session.apply_ttml_styling(&overrides);
            }
            Ok(())
        })
    }

    pub fn set_session_scte_selection(&self, id: SessionId) -> Result<()> {
        self.with_session(id, |session| session.select_scte_service())
    }

    /// Render preview text on a closed-caption session.
    pub fn set_preview_text(&self, id: SessionId, text: &str) -> Result<()> {
        self.with_session(id, |session| {
            let session_type = session.session_type();
            if session_type != SessionType::Cc {
                return Err(SessionError::not_supported("preview text", session_type));
            }
            session.touch();
            session.set_text_for_cc_preview(text);
            Ok(())
        })
    }

    /// Give a session its own caption style; global style changes no longer
    /// reach it.
    pub fn apply_custom_cc_style_to_session(&self, id: SessionId, style: &ClosedCaptionsStyle) -> Result<()> {
        let attributes = style.to_attributes();
        self.with_session(id, |session| session.set_custom_cc_styling(Some(attributes)))
    }

    /// Give a TTML session its own style overrides.
    pub fn apply_custom_ttml_style_to_session(&self, id: SessionId, styling: &str) -> Result<()> {
        self.with_session(id, |session| session.set_custom_ttml_styling(styling))
    }

    pub fn session_type(&self, id: SessionId) -> Result<SessionType> {
        self.with_session(id, |session| Ok(session.session_type()))
    }

    pub fn is_rendering_active(&self, id: SessionId) -> Result<bool> {
        self.with_session(id, |session| Ok(session.is_rendering_active()))
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.lock_sessions().keys().copied().collect()
    }

    pub fn session_count(&self) -> usize {
        self.lock_sessions().len()
    }

    pub fn closed_captions_style(&self) -> ClosedCaptionsStyle {
        ClosedCaptionsStyle::clone(&self.cc_style.borrow())
    }

    /// Replace the global caption style and push it to every session without
    /// a custom style.
    pub fn set_closed_captions_style(&self, style: ClosedCaptionsStyle) {
        let attributes = style.to_attributes();
        let changed = **self.cc_style.borrow() != style;
        if changed {
            self.cc_style.send_replace(Arc::new(style));
        }

        let sessions = self.lock_sessions();
        debug!(changed, sessions = sessions.len(), "applying global caption style");
        for (id, session) in sessions.iter().filter(|(_, s)| !s.has_custom_cc_styling()) {
            if let Err(e) = session.apply_cc_styling(&attributes) {
                warn!(session = %id, error = %e, "caption style not applied");
            }
            session.refresh_cc_preview();
        }
    }

    pub fn ttml_style_overrides(&self) -> String {
        self.ttml_overrides.borrow().to_string()
    }

    /// Replace the global TTML overrides and push them to every session
    /// without custom TTML styling.
    pub fn set_ttml_style_overrides(&self, styling: &str) {
        if &**self.ttml_overrides.borrow() != styling {
            self.ttml_overrides.send_replace(Arc::from(styling));
        }

        let sessions = self.lock_sessions();
        for (id, session) in sessions.iter().filter(|(_, s)| !s.has_custom_ttml_styling()) {
            if session.apply_ttml_styling(styling) {
                debug!(session = %id, "TTML overrides applied");
            }
        }
    }

    /// Stream of global caption styles, starting with the current one.
    pub fn closed_captions_style_updates(&self) -> impl Stream<Item = Arc<ClosedCaptionsStyle>> + 'static {
        WatchStream::new(self.cc_style.subscribe())
    }

    /// Stream of global TTML overrides, starting with the current value.
    pub fn ttml_style_override_updates(&self) -> impl Stream<Item = Arc<str>> + 'static {
        WatchStream::new(self.ttml_overrides.subscribe())
    }

    /// Stop and drop every session idle for longer than `max_idle`. Returns
    /// the evicted ids.
    ///
    /// Sessions are stopped after the registry lock is released.
    pub fn evict_idle(&self, max_idle: Duration) -> Vec<SessionId> {
        let evicted: Vec<(SessionId, RenderSession)> = {
            let mut sessions = self.lock_sessions();
            let idle: Vec<SessionId> = sessions
                .iter()
                .filter(|(_, s)| s.last_active().elapsed() > max_idle)
                .map(|(id, _)| *id)
                .collect();
            idle.into_iter().filter_map(|id| sessions.remove(&id).map(|s| (id, s))).collect()
        };

        evicted
            .into_iter()
            .map(|(id, session)| {
                info!(session = %id, display = session.display_name(), "evicting idle session");
                drop(session);
                id
            })
            .collect()
    }

    /// Run [`evict_idle`](Self::evict_idle) with the configured idle timeout
    /// every `interval` on the current tokio runtime until the returned token
    /// is cancelled. Eviction joins render threads, so it runs on the
    /// blocking pool.
    pub fn spawn_idle_eviction(self: &Arc<Self>, interval: Duration) -> CancellationToken {
        let cancel = CancellationToken::new();
        let registry = Arc::clone(self);
        let token = cancel.clone();
        let max_idle = self.config.session.idle_timeout();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("idle eviction cancelled");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        let sweeper = Arc::clone(&registry);
                        match tokio::task::spawn_blocking(move || sweeper.evict_idle(max_idle)).await {
                            Ok(evicted) if !evicted.is_empty() => {
                                info!(count = evicted.len(), "idle sessions evicted");
                            }
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "idle eviction task failed"),
                        }
                    }
                }
            }
        });
        cancel
    }

    /// Stop and drop every session.
    pub fn shutdown(&self) {
        let sessions = std::mem::take(&mut *self.lock_sessions());
        info!(count = sessions.len(), "shutting down sessions");
        drop(sessions);
    }

    fn default_video_size(&self) -> (u32, u32) {
        (self.config.session.default_video_width, self.config.session.default_video_height)
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.session_ids())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::HeadlessGraphicsFactory;
    use crate::test_utils::{ControllerEvent, MockControllerFactory, wait_until};
    use crate::types::{CcAttributes, FontSize};
    use futures::StreamExt;
    use proptest::prelude::*;

    fn registry(factory: &MockControllerFactory) -> SessionRegistry {
        registry_with(factory, Configuration::default())
    }

    fn registry_with(factory: &MockControllerFactory, config: Configuration) -> SessionRegistry {
        let _ = tracing_subscriber::fmt::try_init();
        SessionRegistry::new(Arc::new(config), Arc::new(HeadlessGraphicsFactory), Arc::new(factory.clone()))
    }

    fn large_font() -> ClosedCaptionsStyle {
        ClosedCaptionsStyle { font_size: FontSize::Large, ..Default::default() }
    }

    #[test]
    fn parses_caption_service_names() {
        assert_eq!(parse_cc_service("SERVICE3").unwrap(), (CcServiceType::Cea708, 3));
        assert_eq!(parse_cc_service("CC1").unwrap(), (CcServiceType::Cea608, 1000));
        assert_eq!(parse_cc_service("CC4").unwrap(), (CcServiceType::Cea608, 1003));
        assert_eq!(parse_cc_service("TEXT1").unwrap(), (CcServiceType::Cea608, 1004));
        for bad in ["", "CC", "SERVICE", "TEXTx", "DVB1", "cc1"] {
            assert!(
                matches!(parse_cc_service(bad), Err(SessionError::InvalidArgument { .. })),
                "{bad} should not parse"
            );
        }
    }

    proptest! {
        #[test]
        fn cea608_services_are_offset(n in 0u32..100_000) {
            prop_assert_eq!(parse_cc_service(&format!("CC{}", n)).unwrap().1, n + 999);
            prop_assert_eq!(parse_cc_service(&format!("TEXT{}", n)).unwrap().1, n + 1003);
            prop_assert_eq!(parse_cc_service(&format!("SERVICE{}", n)).unwrap().1, n);
        }
    }

    #[test]
    fn open_reuses_display() {
        let factory = MockControllerFactory::new();
        let registry = registry(&factory);

        let first = registry.open_session("disp0").unwrap();
        let second = registry.open_session("disp1").unwrap();
        let again = registry.open_session("disp0").unwrap();

        assert_ne!(first, second);
        assert_eq!(first, again);
        assert_eq!(registry.session_count(), 2);
        assert!(matches!(registry.open_session(""), Err(SessionError::InvalidArgument { .. })));
    }

    #[test]
    fn unknown_ids_fail() {
        let factory = MockControllerFactory::new();
        let registry = registry(&factory);
        let missing = SessionId(42);

        assert!(matches!(registry.mute_session(missing), Err(SessionError::UnknownSession { id: 42 })));
        assert!(registry.send_session_data(missing, DataType::Cc, 0, &[1]).is_err());
        assert!(registry.remove_session(missing).is_err());
        assert!(registry.set_preview_text(missing, "x").is_err());
    }

    #[test]
    fn caption_selection_applies_global_style() {
        let factory = MockControllerFactory::new();
        let registry = registry(&factory);
        registry.set_closed_captions_style(large_font());
        let id = registry.open_session("disp0").unwrap();

        registry.set_session_closed_captions_service(id, "CC1").unwrap();

        assert_eq!(registry.session_type(id).unwrap(), SessionType::Cc);
        assert!(factory.events().contains(&ControllerEvent::CcAttributes {
            id: 0,
            attributes: large_font().to_attributes(),
        }));
    }

    #[test]
    fn custom_style_wins_over_global() {
        let factory = MockControllerFactory::new();
        let registry = registry(&factory);
        let id = registry.open_session("disp0").unwrap();
        let custom = ClosedCaptionsStyle { font_color: "#00ff00".to_string(), ..Default::default() };

        registry.apply_custom_cc_style_to_session(id, &custom).unwrap();
        registry.set_session_closed_captions_service(id, "SERVICE1").unwrap();
        factory.clear_events();
        registry.set_closed_captions_style(large_font());

        assert!(factory.events().is_empty());
        assert_eq!(registry.closed_captions_style(), large_font());
    }

    #[test]
    fn global_style_refreshes_preview() {
        let factory = MockControllerFactory::new();
        let registry = registry(&factory);
        let id = registry.open_session("disp0").unwrap();
        registry.set_session_closed_captions_service(id, "SERVICE1").unwrap();
        registry.set_preview_text(id, "Hi").unwrap();
        factory.clear_events();

        registry.set_closed_captions_style(large_font());

        let events = factory.events();
        let preview = ControllerEvent::Preview { id: 0, text: "Hi".to_string() };
        assert!(events.contains(&ControllerEvent::CcAttributes {
            id: 0,
            attributes: large_font().to_attributes(),
        }));
        assert!(events.contains(&preview));
        assert_ne!(large_font().to_attributes(), CcAttributes::default());
    }

    #[test]
    fn preview_requires_captions() {
        let factory = MockControllerFactory::new();
        let registry = registry(&factory);
        let id = registry.open_session("disp0").unwrap();
        registry.set_session_webvtt_selection(id).unwrap();

        let err = registry.set_preview_text(id, "Hi").unwrap_err();
        assert!(matches!(err, SessionError::NotSupported { session_type: SessionType::Webvtt, .. }));
    }

    #[test]
    fn ttml_selection_applies_global_overrides() {
        let factory = MockControllerFactory::new();
        let mut config = Configuration::default();
        config.ttml_style_overrides = "tts:fontSize=120%".to_string();
        let registry = registry_with(&factory, config);
        let id = registry.open_session("disp0").unwrap();

        registry.set_session_ttml_selection(id).unwrap();
        assert!(factory.events().contains(&ControllerEvent::TtmlStyling {
            id: 0,
            styling: "tts:fontSize=120%".to_string(),
        }));

        registry.apply_custom_ttml_style_to_session(id, "tts:color=red").unwrap();
        factory.clear_events();
        registry.set_ttml_style_overrides("tts:color=blue");
        registry.set_session_ttml_selection(id).unwrap();

        let styling: Vec<_> = factory
            .events()
            .into_iter()
            .filter(|e| matches!(e, ControllerEvent::TtmlStyling { .. }))
            .collect();
        assert_eq!(styling, [ControllerEvent::TtmlStyling { id: 1, styling: "tts:color=red".to_string() }]);
        assert_eq!(registry.ttml_style_overrides(), "tts:color=blue");
    }

    #[test]
    fn custom_ttml_needs_ttml_session() {
        let factory = MockControllerFactory::new();
        let registry = registry(&factory);
        let id = registry.open_session("disp0").unwrap();
        registry.set_session_scte_selection(id).unwrap();

        assert!(matches!(
            registry.apply_custom_ttml_style_to_session(id, "tts:color=red"),
            Err(SessionError::NotSupported { .. })
        ));
    }

    #[test]
    fn close_mutes_and_releases() {
        let factory = MockControllerFactory::new();
        let registry = registry(&factory);
        let id = registry.open_session("disp0").unwrap();
        registry.set_session_teletext_selection(id, 100).unwrap();
        registry.unmute_session(id).unwrap();

        registry.close_session(id).unwrap();

        assert_eq!(registry.session_type(id).unwrap(), SessionType::None);
        let events = factory.events();
        let tail = &events[events.len() - 2..];
        assert_eq!(tail, [ControllerEvent::Mute { id: 0, muted: true }, ControllerEvent::Deactivated { id: 0 }]);

        // Still started: a new selection works without reopening.
        registry.set_session_dvb_selection(id, 1, 2).unwrap();
        assert!(registry.is_rendering_active(id).unwrap());
    }

    #[test]
    fn data_and_timestamps_are_routed() {
        let factory = MockControllerFactory::new();
        let registry = registry(&factory);
        let id = registry.open_session("disp0").unwrap();

        assert!(!registry.send_session_data(id, DataType::Webvtt, 0, b"early").unwrap());
        registry.set_session_webvtt_selection(id).unwrap();
        assert!(registry.send_session_data(id, DataType::Webvtt, 500, b"cue").unwrap());
        registry.send_session_timestamp(id, 1234).unwrap();
        registry.pause_session(id).unwrap();
        registry.resume_session(id).unwrap();

        assert!(wait_until(Duration::from_secs(5), || factory.data_events().len() == 1));
        let events = factory.events();
        assert!(events.contains(&ControllerEvent::Timestamp { id: 0, media_timestamp_ms: 1234 }));
        assert!(events.contains(&ControllerEvent::Pause { id: 0 }));
        assert!(events.contains(&ControllerEvent::Resume { id: 0 }));

        factory.set_wants_reset(true);
        registry.reset_session(id).unwrap();
        assert_eq!(registry.session_type(id).unwrap(), SessionType::None);
    }

    #[test]
    fn evicts_only_idle_sessions() {
        let factory = MockControllerFactory::new();
        let registry = registry(&factory);
        let old = registry.open_session("disp0").unwrap();
        std::thread::sleep(Duration::from_millis(60));
        let fresh = registry.open_session("disp1").unwrap();

        let evicted = registry.evict_idle(Duration::from_millis(30));

        assert_eq!(evicted, [old]);
        assert_eq!(registry.session_ids(), [fresh]);
    }

    #[test]
    fn shutdown_drops_everything() {
        let factory = MockControllerFactory::new();
        let registry = registry(&factory);
        let id = registry.open_session("disp0").unwrap();
        registry.set_session_webvtt_selection(id).unwrap();

        registry.shutdown();

        assert_eq!(registry.session_count(), 0);
        assert_eq!(factory.live_controllers(), 0);
    }

    #[tokio::test]
    async fn style_streams_follow_changes() {
        let factory = MockControllerFactory::new();
        let registry = registry(&factory);
        let mut overrides = registry.ttml_style_override_updates();

        assert_eq!(&*overrides.next().await.unwrap(), "");
        registry.set_ttml_style_overrides("tts:color=red");
        assert_eq!(&*overrides.next().await.unwrap(), "tts:color=red");
    }

    #[tokio::test]
    async fn idle_eviction_task_runs_until_cancelled() {
        let factory = MockControllerFactory::new();
        let mut config = Configuration::default();
        config.session.idle_timeout_secs = 0;
        let registry = Arc::new(registry_with(&factory, config));
        registry.open_session("disp0").unwrap();

        let cancel = registry.spawn_idle_eviction(Duration::from_millis(10));
        tokio::time::timeout(Duration::from_secs(5), async {
            while registry.session_count() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        cancel.cancel();
    }

    #[tokio::test]
    async fn idle_eviction_keeps_runtime_responsive() {
        let factory = MockControllerFactory::new();
        factory.set_deactivate_delay(Duration::from_millis(500));
        let mut config = Configuration::default();
        config.session.idle_timeout_secs = 0;
        let registry = Arc::new(registry_with(&factory, config));
        let id = registry.open_session("disp0").unwrap();
        registry.set_session_webvtt_selection(id).unwrap();
        assert_eq!(factory.live_controllers(), 1);

        let cancel = registry.spawn_idle_eviction(Duration::from_millis(10));
        let mut longest_stall = Duration::ZERO;
        tokio::time::timeout(Duration::from_secs(5), async {
            while factory.live_controllers() > 0 {
                let before = std::time::Instant::now();
                tokio::time::sleep(Duration::from_millis(5)).await;
                longest_stall = longest_stall.max(before.elapsed());
            }
        })
        .await
        .unwrap();
        cancel.cancel();

        assert_eq!(registry.session_count(), 0);
        assert!(longest_stall < Duration::from_millis(300), "runtime stalled for {longest_stall:?}");
    }
}
