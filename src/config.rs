//! Engine configuration.
//!
//! Configuration is loaded from YAML. Every section has defaults, so an empty
//! document yields a usable configuration:
//!
//! ```rust
//! use subtrack::Configuration;
//!
//! let config = Configuration::from_yaml_str(
//!     r#"
//! session:
//!   default_video_width: 1280
//!   default_video_height: 720
//! teletext:
//!   font_family: "Bitstream Vera Sans Mono"
//! dvb:
//!   enabled: false
//! "#,
//! )?;
//!
//! assert_eq!(config.session.default_video_width, 1280);
//! assert!(!config.dvb.enabled);
//! assert!(config.ttml.enabled);
//! # Ok::<(), subtrack::SessionError>(())
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SessionError};
use crate::types::{ClosedCaptionsStyle, SessionType};

/// Session-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Video width handed to WebVTT and TTML selections made by the registry
    pub default_video_width: u32,
    pub default_video_height: u32,
    /// Sessions untouched for longer than this are evicted by
    /// [`SessionRegistry::evict_idle`](crate::SessionRegistry::evict_idle).
    pub idle_timeout_secs: u64,
    /// Largest datagram the socket source accepts.
    pub socket_buffer_size: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_video_width: 1920,
            default_video_height: 1080,
            idle_timeout_secs: 300,
            socket_buffer_size: 1024 * 1024,
        }
    }
}

impl SessionSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Per-format decoder settings. The engine only looks at `enabled`; the rest
/// is handed to the controller factory untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub enabled: bool,
    pub font_family: Option<String>,
    pub properties: BTreeMap<String, String>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self { enabled: true, font_family: None, properties: BTreeMap::new() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub session: SessionSettings,
    pub teletext: DecoderConfig,
    pub ttml: DecoderConfig,
    pub webvtt: DecoderConfig,
    pub cc: DecoderConfig,
    pub dvb: DecoderConfig,
    pub scte: DecoderConfig,
    /// Initial global closed-caption style
    pub closed_captions_style: ClosedCaptionsStyle,
    /// Initial global TTML style override string
    pub ttml_style_overrides: String,
}

impl Configuration {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml_ng::from_str(yaml).map_err(|e| {
            SessionError::configuration("Configuration deserialization", e.to_string())
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading configuration");
        let yaml = std::fs::read_to_string(path).map_err(|source| {
            SessionError::ConfigurationFile { path: path.to_path_buf(), source }
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Decoder settings for a format. [`SessionType::None`] has none.
    pub fn decoder(&self, format: SessionType) -> Option<&DecoderConfig> {
        match format {
            SessionType::None => None,
            SessionType::Cc => Some(&self.cc),
            SessionType::Ttx => Some(&self.teletext),
            SessionType::Dvb => Some(&self.dvb),
            SessionType::Webvtt => Some(&self.webvtt),
            SessionType::Ttml => Some(&self.ttml),
            SessionType::Scte => Some(&self.scte),
        }
    }

    pub fn is_enabled(&self, format: SessionType) -> bool {
        self.decoder(format).is_some_and(|cfg| cfg.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FontSize;

    #[test]
    fn empty_document_uses_defaults() {
        let config = Configuration::from_yaml_str("").unwrap();
        assert_eq!(config, Configuration::default());
        assert_eq!(config.session.default_video_width, 1920);
        assert_eq!(config.session.default_video_height, 1080);
        assert_eq!(config.session.idle_timeout(), Duration::from_secs(300));
        for format in SessionType::SELECTABLE {
            assert!(config.is_enabled(format), "{} should default to enabled", format);
        }
        assert!(!config.is_enabled(SessionType::None));
    }

    #[test]
    fn sections_override_independently() {
        let config = Configuration::from_yaml_str(
            r#"
session:
  idle_timeout_secs: 5
scte:
  enabled: false
ttml:
  font_family: Cinecav Sans
  properties:
    region: bottom
closed_captions_style:
  font_size: small
ttml_style_overrides: "tts:color=red"
"#,
        )
        .unwrap();

        assert_eq!(config.session.idle_timeout_secs, 5);
        assert_eq!(config.session.default_video_width, 1920);
        assert!(!config.is_enabled(SessionType::Scte));
        assert_eq!(config.ttml.font_family.as_deref(), Some("Cinecav Sans"));
        assert_eq!(config.ttml.properties.get("region").map(String::as_str), Some("bottom"));
        assert_eq!(config.closed_captions_style.font_size, FontSize::Small);
        assert_eq!(config.ttml_style_overrides, "tts:color=red");
    }

    #[test]
    fn invalid_yaml_is_a_configuration_error() {
        let result = Configuration::from_yaml_str("session: [1, 2");
        assert!(matches!(result, Err(SessionError::Configuration { .. })));
    }

    #[test]
    fn missing_file_reports_path() {
        let path = std::env::temp_dir().join("subtrack-config-does-not-exist.yaml");
        match Configuration::from_file(&path) {
            Err(SessionError::ConfigurationFile { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected ConfigurationFile error, got {:?}", other),
        }
    }
}
