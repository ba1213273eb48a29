//! Subtitle format and data classification

use serde::{Deserialize, Serialize};
use std::fmt;

/// Active subtitle format of a session.
///
/// A session starts at [`SessionType::None`] and only changes format through a
/// selection packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    #[default]
    None,
    /// Closed captions (CEA-608 / CEA-708)
    Cc,
    /// Teletext
    Ttx,
    /// DVB bitmap subtitles
    Dvb,
    Webvtt,
    Ttml,
    /// SCTE-27 subtitles
    Scte,
}

impl SessionType {
    /// All formats that can be selected, in declaration order.
    pub const SELECTABLE: [SessionType; 6] = [
        SessionType::Cc,
        SessionType::Ttx,
        SessionType::Dvb,
        SessionType::Webvtt,
        SessionType::Ttml,
        SessionType::Scte,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            SessionType::None => "NONE",
            SessionType::Cc => "CC",
            SessionType::Ttx => "TTX",
            SessionType::Dvb => "DVB",
            SessionType::Webvtt => "WEBVTT",
            SessionType::Ttml => "TTML",
            SessionType::Scte => "SCTE",
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of payload submitted through `send_data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// MPEG-2 PES carrying teletext, DVB or SCTE subtitles
    Pes,
    Ttml,
    Cc,
    Webvtt,
}

/// Closed-caption service family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum CcServiceType {
    Cea608 = 0,
    Cea708 = 1,
}

impl CcServiceType {
    pub const fn raw(self) -> u32 {
        self as u32
    }
}

/// Registry-assigned session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SessionId {
    fn from(value: u32) -> Self {
        SessionId(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_session_type_is_none() {
        assert_eq!(SessionType::default(), SessionType::None);
        assert!(!SessionType::SELECTABLE.contains(&SessionType::None));
    }

    #[test]
    fn session_type_display_matches_tags() {
        let rendered: Vec<String> = SessionType::SELECTABLE.iter().map(|t| t.to_string()).collect();
        assert_eq!(rendered, ["CC", "TTX", "DVB", "WEBVTT", "TTML", "SCTE"]);
    }

    #[test]
    fn session_type_serde_names() {
        let yaml = serde_yaml_ng::to_string(&SessionType::Webvtt).unwrap();
        assert_eq!(yaml.trim(), "webvtt");
        let parsed: SessionType = serde_yaml_ng::from_str("ttml").unwrap();
        assert_eq!(parsed, SessionType::Ttml);
    }

    #[test]
    fn cc_service_type_raw_values() {
        assert_eq!(CcServiceType::Cea608.raw(), 0);
        assert_eq!(CcServiceType::Cea708.raw(), 1);
    }
}
