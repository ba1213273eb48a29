//! Decoded packet records and typed views over their bodies.

use std::sync::Arc;

use crate::error::{Result, SessionError};
use crate::types::{CcAttributes, SessionType};

/// Size of the fixed packet header: type, sequence and payload length.
pub const HEADER_SIZE: usize = 12;

/// Offset of the payload length word inside the header.
pub const LENGTH_OFFSET: usize = 8;

/// Size of the channel id word that opens every payload.
pub const CHANNEL_WORD_SIZE: usize = 4;

/// Channel id used for packets synthesized by the session API.
pub const DEFAULT_CHANNEL_ID: u32 = 1;

/// Number of attribute words carried by a SET_CC_ATTRIBUTES packet.
pub const CC_ATTRIBUTE_WORDS: usize = 14;

/// Channel type word written ahead of closed-caption data.
pub const CC_CHANNEL_TYPE: u32 = 3;

/// Subtitle type discriminators carried by SUBTITLE_SELECTION.
pub mod subtitles_type {
    pub const DVB: u32 = 0;
    pub const TELETEXT: u32 = 1;
    pub const SCTE: u32 = 2;
    pub const CC: u32 = 3;
}

/// Bits of the SET_CC_ATTRIBUTES attribute mask.
pub mod cc_attribute {
    pub const FONT_COLOR: u32 = 0x0001;
    pub const BACKGROUND_COLOR: u32 = 0x0002;
    pub const FONT_OPACITY: u32 = 0x0004;
    pub const BACKGROUND_OPACITY: u32 = 0x0008;
    pub const FONT_STYLE: u32 = 0x0010;
    pub const FONT_SIZE: u32 = 0x0020;
    pub const FONT_ITALIC: u32 = 0x0040;
    pub const FONT_UNDERLINE: u32 = 0x0080;
    pub const BORDER_TYPE: u32 = 0x0100;
    pub const BORDER_COLOR: u32 = 0x0200;
    pub const WIN_COLOR: u32 = 0x0400;
    pub const WIN_OPACITY: u32 = 0x0800;
    pub const EDGE_TYPE: u32 = 0x1000;
    pub const EDGE_COLOR: u32 = 0x2000;

    /// Every attribute except the border ones.
    pub const STANDARD_MASK: u32 = FONT_COLOR
        | BACKGROUND_COLOR
        | FONT_OPACITY
        | BACKGROUND_OPACITY
        | FONT_STYLE
        | FONT_SIZE
        | FONT_ITALIC
        | FONT_UNDERLINE
        | WIN_COLOR
        | WIN_OPACITY
        | EDGE_TYPE
        | EDGE_COLOR;
}

/// Packet type tag.
///
/// Unknown raw values decode as [`PacketType::Invalid`]; the raw value stays
/// available on [`Packet::raw_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    PesData,
    Timestamp,
    ResetAll,
    ResetChannel,
    SubtitleSelection,
    TeletextSelection,
    Pause,
    Resume,
    Mute,
    Unmute,
    WebvttSelection,
    WebvttData,
    WebvttTimestamp,
    CcData,
    SetCcAttributes,
    TtmlSelection,
    TtmlData,
    TtmlTimestamp,
    TtmlInfo,
    Invalid,
}

impl PacketType {
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            1 => PacketType::PesData,
            2 => PacketType::Timestamp,
            3 => PacketType::ResetAll,
            4 => PacketType::ResetChannel,
            5 => PacketType::SubtitleSelection,
            6 => PacketType::TeletextSelection,
            7 => PacketType::Pause,
            8 => PacketType::Resume,
            9 => PacketType::Mute,
            10 => PacketType::Unmute,
            11 => PacketType::WebvttSelection,
            12 => PacketType::WebvttData,
            13 => PacketType::WebvttTimestamp,
            14 => PacketType::CcData,
            15 => PacketType::SetCcAttributes,
            16 => PacketType::TtmlSelection,
            17 => PacketType::TtmlData,
            18 => PacketType::TtmlTimestamp,
            19 => PacketType::TtmlInfo,
            _ => PacketType::Invalid,
        }
    }

    /// Wire value of this type. [`PacketType::Invalid`] maps to 0, which no
    /// valid packet uses.
    pub const fn raw(self) -> u32 {
        match self {
            PacketType::PesData => 1,
            PacketType::Timestamp => 2,
            PacketType::ResetAll => 3,
            PacketType::ResetChannel => 4,
            PacketType::SubtitleSelection => 5,
            PacketType::TeletextSelection => 6,
            PacketType::Pause => 7,
            PacketType::Resume => 8,
            PacketType::Mute => 9,
            PacketType::Unmute => 10,
            PacketType::WebvttSelection => 11,
            PacketType::WebvttData => 12,
            PacketType::WebvttTimestamp => 13,
            PacketType::CcData => 14,
            PacketType::SetCcAttributes => 15,
            PacketType::TtmlSelection => 16,
            PacketType::TtmlData => 17,
            PacketType::TtmlTimestamp => 18,
            PacketType::TtmlInfo => 19,
            PacketType::Invalid => 0,
        }
    }

    /// Data packets travel through the ingress queue; everything else is
    /// dispatched as soon as it arrives.
    pub const fn is_data(self) -> bool {
        matches!(
            self,
            PacketType::PesData | PacketType::TtmlData | PacketType::WebvttData | PacketType::CcData
        )
    }

    pub const fn is_selection(self) -> bool {
        matches!(
            self,
            PacketType::SubtitleSelection
                | PacketType::TeletextSelection
                | PacketType::TtmlSelection
                | PacketType::WebvttSelection
        )
    }

    /// Number of body words preceding the raw bytes of a data packet.
    const fn data_header_words(self) -> Option<usize> {
        match self {
            PacketType::PesData => Some(1),
            PacketType::TtmlData | PacketType::WebvttData => Some(2),
            PacketType::CcData => Some(3),
            _ => None,
        }
    }
}

/// Format requested by a selection packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Dvb { composition_page: u32, ancillary_page: u32 },
    Teletext { magazine: u32, page: u32 },
    Scte,
    Cc { service_type: u32, service_id: u32 },
    Webvtt { width: u32, height: u32 },
    Ttml { width: u32, height: u32 },
    /// SUBTITLE_SELECTION carrying an unknown subtitles type
    Unknown { subtitles_type: u32 },
}

impl Selection {
    /// Format the selection activates, or `None` for unknown subtitle types.
    pub fn session_type(&self) -> Option<SessionType> {
        match self {
            Selection::Dvb { .. } => Some(SessionType::Dvb),
            Selection::Teletext { .. } => Some(SessionType::Ttx),
            Selection::Scte => Some(SessionType::Scte),
            Selection::Cc { .. } => Some(SessionType::Cc),
            Selection::Webvtt { .. } => Some(SessionType::Webvtt),
            Selection::Ttml { .. } => Some(SessionType::Ttml),
            Selection::Unknown { .. } => None,
        }
    }
}

/// Body of a TIMESTAMP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampSample {
    pub timestamp_ms: u64,
    pub stc: u32,
}

/// Body of a SET_CC_ATTRIBUTES packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CcAttributeUpdate {
    pub cc_type: u32,
    pub attribute_mask: u32,
    pub words: [u32; CC_ATTRIBUTE_WORDS],
}

impl CcAttributeUpdate {
    /// Attribute words mapped back onto [`CcAttributes`], ignoring the italic,
    /// underline and border slots.
    pub fn attributes(&self) -> CcAttributes {
        let w = &self.words;
        CcAttributes {
            font_color: w[0],
            background_color: w[1],
            font_opacity: w[2],
            background_opacity: w[3],
            font_style: w[4],
            font_size: w[5],
            window_color: w[10],
            window_opacity: w[11],
            edge_type: w[12],
            edge_color: w[13],
        }
    }
}

/// A decoded packet.
///
/// `body` holds the payload after the channel id word. Typed accessors check
/// the packet type and fail with [`SessionError::MalformedPacket`] when a field
/// would be read past the end of the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub packet_type: PacketType,
    pub raw_type: u32,
    pub sequence: u32,
    pub channel_id: u32,
    pub payload_length: u32,
    body: Arc<[u8]>,
}

impl Packet {
    pub(crate) fn new(
        raw_type: u32,
        sequence: u32,
        channel_id: u32,
        payload_length: u32,
        body: Arc<[u8]>,
    ) -> Self {
        Self {
            packet_type: PacketType::from_raw(raw_type),
            raw_type,
            sequence,
            channel_id,
            payload_length,
            body,
        }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    fn word(&self, index: usize) -> Result<u32> {
        parse_u32_le(&self.body, index * 4)
    }

    fn split_u64(&self, index: usize) -> Result<u64> {
        let lo = self.word(index)? as u64;
        let hi = self.word(index + 1)? as u64;
        Ok((hi << 32) | lo)
    }

    fn expect_type(&self, accepted: &[PacketType], field: &str) -> Result<()> {
        if accepted.contains(&self.packet_type) {
            Ok(())
        } else {
            Err(SessionError::invalid_argument(format!(
                "{} is not carried by {:?} packets",
                field, self.packet_type
            )))
        }
    }

    /// Format requested by a selection packet.
    pub fn selection(&self) -> Result<Selection> {
        match self.packet_type {
            PacketType::SubtitleSelection => {
                let subtitles_type = self.word(0)?;
                let aux1 = self.word(1)?;
                let aux2 = self.word(2)?;
                Ok(match subtitles_type {
                    subtitles_type::DVB => Selection::Dvb { composition_page: aux1, ancillary_page: aux2 },
                    subtitles_type::TELETEXT => Selection::Teletext { magazine: aux1, page: aux2 },
                    subtitles_type::SCTE => Selection::Scte,
                    subtitles_type::CC => Selection::Cc { service_type: aux1, service_id: aux2 },
                    other => Selection::Unknown { subtitles_type: other },
                })
            }
            PacketType::TeletextSelection => {
                Ok(Selection::Teletext { magazine: self.word(0)?, page: self.word(1)? })
            }
            PacketType::WebvttSelection => {
                Ok(Selection::Webvtt { width: self.word(0)?, height: self.word(1)? })
            }
            PacketType::TtmlSelection => {
                Ok(Selection::Ttml { width: self.word(0)?, height: self.word(1)? })
            }
            _ => Err(SessionError::invalid_argument(format!(
                "{:?} is not a selection packet",
                self.packet_type
            ))),
        }
    }

    /// Signed display offset of a WebVTT or TTML data packet, as encoded.
    pub fn display_offset_ms(&self) -> Result<i64> {
        self.expect_type(&[PacketType::WebvttData, PacketType::TtmlData], "display offset")?;
        Ok(self.split_u64(0)? as i64)
    }

    /// Media timestamp of a WebVTT or TTML timestamp packet.
    pub fn media_timestamp_ms(&self) -> Result<u64> {
        self.expect_type(&[PacketType::WebvttTimestamp, PacketType::TtmlTimestamp], "media timestamp")?;
        self.split_u64(0)
    }

    pub fn timestamp(&self) -> Result<TimestampSample> {
        self.expect_type(&[PacketType::Timestamp], "timestamp")?;
        Ok(TimestampSample { timestamp_ms: self.split_u64(0)?, stc: self.word(2)? })
    }

    /// Channel type word of a PES or CC data packet.
    pub fn channel_type(&self) -> Result<u32> {
        self.expect_type(&[PacketType::PesData, PacketType::CcData], "channel type")?;
        self.word(0)
    }

    /// PTS of a CC data packet, if the producer marked one as present.
    pub fn cc_pts(&self) -> Result<Option<u32>> {
        self.expect_type(&[PacketType::CcData], "pts")?;
        let present = self.word(1)?;
        let pts = self.word(2)?;
        Ok((present != 0).then_some(pts))
    }

    /// Raw subtitle bytes of a data packet.
    pub fn data(&self) -> Result<&[u8]> {
        let words = self.packet_type.data_header_words().ok_or_else(|| {
            SessionError::invalid_argument(format!("{:?} is not a data packet", self.packet_type))
        })?;
        let start = words * 4;
        if start > self.body.len() {
            return Err(SessionError::malformed_packet(
                format!("data header needs {} bytes", start),
                self.body.len(),
            ));
        }
        Ok(&self.body[start..])
    }

    pub fn cc_attributes(&self) -> Result<CcAttributeUpdate> {
        self.expect_type(&[PacketType::SetCcAttributes], "closed-caption attributes")?;
        let mut words = [0u32; CC_ATTRIBUTE_WORDS];
        for (i, slot) in words.iter_mut().enumerate() {
            *slot = self.word(2 + i)?;
        }
        Ok(CcAttributeUpdate { cc_type: self.word(0)?, attribute_mask: self.word(1)?, words })
    }

    /// Informational text of a TTML_INFO packet.
    pub fn info_text(&self) -> Result<&str> {
        self.expect_type(&[PacketType::TtmlInfo], "info text")?;
        std::str::from_utf8(&self.body)
            .map_err(|e| SessionError::malformed_packet(format!("info text is not UTF-8: {}", e), self.body.len()))
    }
}

pub(crate) fn parse_u32_le(data: &[u8], offset: usize) -> Result<u32> {
    match data.get(offset..offset + 4) {
        Some(bytes) => Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        None => Err(SessionError::malformed_packet(
            format!("need 4 bytes for u32 at offset {}", offset),
            data.len(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(packet_type: PacketType, words: &[u32], tail: &[u8]) -> Packet {
        let mut body = Vec::new();
        for word in words {
            body.extend_from_slice(&word.to_le_bytes());
        }
        body.extend_from_slice(tail);
        let length = (body.len() + CHANNEL_WORD_SIZE) as u32;
        Packet::new(packet_type.raw(), 1, DEFAULT_CHANNEL_ID, length, body.into())
    }

    #[test]
    fn raw_type_mapping_is_consistent() {
        for raw in 1..=19 {
            let packet_type = PacketType::from_raw(raw);
            assert_ne!(packet_type, PacketType::Invalid);
            assert_eq!(packet_type.raw(), raw);
        }
        assert_eq!(PacketType::from_raw(0), PacketType::Invalid);
        assert_eq!(PacketType::from_raw(20), PacketType::Invalid);
        assert_eq!(PacketType::from_raw(u32::MAX), PacketType::Invalid);
    }

    #[test]
    fn data_and_selection_classes() {
        let data: Vec<_> = (1..=19).map(PacketType::from_raw).filter(|t| t.is_data()).collect();
        assert_eq!(
            data,
            [PacketType::PesData, PacketType::WebvttData, PacketType::CcData, PacketType::TtmlData]
        );
        let selections = (1..=19).map(PacketType::from_raw).filter(|t| t.is_selection()).count();
        assert_eq!(selections, 4);
    }

    #[test]
    fn subtitle_selection_variants() {
        let dvb = packet(PacketType::SubtitleSelection, &[subtitles_type::DVB, 10, 20], &[]);
        assert_eq!(dvb.selection().unwrap(), Selection::Dvb { composition_page: 10, ancillary_page: 20 });

        let cc = packet(PacketType::SubtitleSelection, &[subtitles_type::CC, 1, 5], &[]);
        assert_eq!(cc.selection().unwrap().session_type(), Some(SessionType::Cc));

        let unknown = packet(PacketType::SubtitleSelection, &[42, 0, 0], &[]);
        assert_eq!(unknown.selection().unwrap(), Selection::Unknown { subtitles_type: 42 });
        assert_eq!(unknown.selection().unwrap().session_type(), None);
    }

    #[test]
    fn truncated_selection_is_malformed() {
        let short = packet(PacketType::SubtitleSelection, &[subtitles_type::CC], &[]);
        assert!(matches!(short.selection(), Err(SessionError::MalformedPacket { .. })));
    }

    #[test]
    fn data_skips_per_type_header_words() {
        let pes = packet(PacketType::PesData, &[0], b"pes");
        assert_eq!(pes.data().unwrap(), b"pes");

        let ttml = packet(PacketType::TtmlData, &[5, 0], b"<tt/>");
        assert_eq!(ttml.data().unwrap(), b"<tt/>");
        assert_eq!(ttml.display_offset_ms().unwrap(), 5);

        let cc = packet(PacketType::CcData, &[CC_CHANNEL_TYPE, 1, 900], &[0xfc, 0x80]);
        assert_eq!(cc.data().unwrap(), &[0xfc, 0x80]);
        assert_eq!(cc.cc_pts().unwrap(), Some(900));
        assert_eq!(cc.channel_type().unwrap(), CC_CHANNEL_TYPE);

        let mute = packet(PacketType::Mute, &[], &[]);
        assert!(mute.data().is_err());
    }

    #[test]
    fn negative_offset_spans_both_words() {
        let offset = -3500i64 as u64;
        let words = [offset as u32, (offset >> 32) as u32];
        let webvtt = packet(PacketType::WebvttData, &words, b"WEBVTT");
        assert_eq!(webvtt.display_offset_ms().unwrap(), -3500);
    }

    #[test]
    fn timestamp_body() {
        let ts = 0x1_0000_0002u64;
        let pkt = packet(PacketType::Timestamp, &[ts as u32, (ts >> 32) as u32, 777], &[]);
        assert_eq!(pkt.timestamp().unwrap(), TimestampSample { timestamp_ms: ts, stc: 777 });
        assert!(pkt.media_timestamp_ms().is_err());
    }

    #[test]
    fn cc_attribute_words_map_back() {
        let mut words = vec![1, cc_attribute::STANDARD_MASK];
        words.extend(100..114u32);
        let pkt = packet(PacketType::SetCcAttributes, &words, &[]);
        let update = pkt.cc_attributes().unwrap();
        assert_eq!(update.cc_type, 1);
        assert_eq!(update.attribute_mask & cc_attribute::BORDER_TYPE, 0);
        let attrs = update.attributes();
        assert_eq!(attrs.font_color, 100);
        assert_eq!(attrs.background_color, 101);
        assert_eq!(attrs.window_color, 110);
        assert_eq!(attrs.edge_color, 113);
    }

    #[test]
    fn info_text_requires_utf8() {
        let ok = packet(PacketType::TtmlInfo, &[], "lang=en".as_bytes());
        assert_eq!(ok.info_text().unwrap(), "lang=en");
        let bad = packet(PacketType::TtmlInfo, &[], &[0xff, 0xfe]);
        assert!(matches!(bad.info_text(), Err(SessionError::MalformedPacket { .. })));
    }
}
