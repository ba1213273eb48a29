//! Packet encoding and decoding.
//!
//! Outbound packets are built by [`PacketBuilder`]: fields are appended to one
//! growable buffer and the payload length is patched in by its recorded index
//! when the packet is finished. [`PacketCodec`] wraps the builder with one
//! helper per packet kind the session API synthesizes, and decodes inbound
//! buffers into [`Packet`] records.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::trace;

use super::packet::{
    CC_ATTRIBUTE_WORDS, CC_CHANNEL_TYPE, CHANNEL_WORD_SIZE, DEFAULT_CHANNEL_ID, HEADER_SIZE,
    LENGTH_OFFSET, Packet, PacketType, cc_attribute, parse_u32_le, subtitles_type,
};
use crate::error::{Result, SessionError};
use crate::types::{CcAttributes, CcServiceType};

/// Monotonic packet sequence counter.
///
/// Clones share the same counter, so one generator can be handed to every
/// codec in a process. Sequence numbers are diagnostic only.
#[derive(Debug, Clone, Default)]
pub struct SequenceGenerator {
    counter: Arc<AtomicU32>,
}

impl SequenceGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next sequence number. The first value handed out is 1.
    pub fn next(&self) -> u32 {
        self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Last value handed out, or 0 if none.
    pub fn current(&self) -> u32 {
        self.counter.load(Ordering::Relaxed)
    }
}

/// Append-only packet builder.
#[derive(Debug)]
pub struct PacketBuilder {
    buf: Vec<u8>,
    length_index: usize,
}

impl PacketBuilder {
    pub fn new(packet_type: PacketType, sequence: u32) -> Self {
        Self::with_channel(packet_type, sequence, DEFAULT_CHANNEL_ID)
    }

    pub fn with_channel(packet_type: PacketType, sequence: u32, channel_id: u32) -> Self {
        let mut buf = Vec::with_capacity(HEADER_SIZE + CHANNEL_WORD_SIZE + 16);
        buf.extend_from_slice(&packet_type.raw().to_le_bytes());
        buf.extend_from_slice(&sequence.to_le_bytes());
        let length_index = buf.len();
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&channel_id.to_le_bytes());
        Self { buf, length_index }
    }

    pub fn u32(mut self, value: u32) -> Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Append a 64-bit value as two words, low word first.
    pub fn u64(self, value: u64) -> Self {
        self.u32(value as u32).u32((value >> 32) as u32)
    }

    pub fn i64(self, value: i64) -> Self {
        self.u64(value as u64)
    }

    pub fn bytes(mut self, data: &[u8]) -> Self {
        self.buf.extend_from_slice(data);
        self
    }

    /// Patch the payload length and hand out the encoded buffer.
    pub fn finish(mut self) -> Vec<u8> {
        let payload_length = (self.buf.len() - HEADER_SIZE) as u32;
        self.buf[self.length_index..self.length_index + 4]
            .copy_from_slice(&payload_length.to_le_bytes());
        self.buf
    }
}

/// Encoder/decoder for session packets.
#[derive(Debug, Clone, Default)]
pub struct PacketCodec {
    sequence: SequenceGenerator,
}

impl PacketCodec {
    pub fn new(sequence: SequenceGenerator) -> Self {
        Self { sequence }
    }

    pub fn sequence(&self) -> &SequenceGenerator {
        &self.sequence
    }

    /// Start a packet of the given type with the next sequence number.
    pub fn builder(&self, packet_type: PacketType) -> PacketBuilder {
        PacketBuilder::new(packet_type, self.sequence.next())
    }

    /// Encode a packet with an empty body (reset, pause, resume, mute, unmute).
    pub fn encode_control(&self, packet_type: PacketType) -> Vec<u8> {
        self.builder(packet_type).finish()
    }

    pub fn encode_pes_data(&self, data: &[u8]) -> Vec<u8> {
        self.builder(PacketType::PesData).u32(0).bytes(data).finish()
    }

    /// TTML data; the offset is encoded as given.
    pub fn encode_ttml_data(&self, data: &[u8], display_offset_ms: i64) -> Vec<u8> {
        self.builder(PacketType::TtmlData).i64(display_offset_ms).bytes(data).finish()
    }

    /// WebVTT data. WebVTT decoders read a positive offset as "earlier", so
    /// the caller's offset is negated.
    pub fn encode_webvtt_data(&self, data: &[u8], display_offset_ms: i64) -> Vec<u8> {
        self.builder(PacketType::WebvttData)
            .i64(display_offset_ms.wrapping_neg())
            .bytes(data)
            .finish()
    }

    pub fn encode_cc_data(&self, data: &[u8]) -> Vec<u8> {
        self.builder(PacketType::CcData).u32(CC_CHANNEL_TYPE).u32(0).u32(0).bytes(data).finish()
    }

    pub fn encode_timestamp(&self, timestamp_ms: u64, stc: u32) -> Vec<u8> {
        self.builder(PacketType::Timestamp).u64(timestamp_ms).u32(stc).finish()
    }

    pub fn encode_media_timestamp(&self, packet_type: PacketType, timestamp_ms: u64) -> Vec<u8> {
        self.builder(packet_type).u64(timestamp_ms).finish()
    }

    pub fn encode_subtitle_selection(&self, subtitles_type: u32, aux1: u32, aux2: u32) -> Vec<u8> {
        self.builder(PacketType::SubtitleSelection)
            .u32(subtitles_type)
            .u32(aux1)
            .u32(aux2)
            .finish()
    }

    pub fn encode_cc_selection(&self, service_type: CcServiceType, service_id: u32) -> Vec<u8> {
        self.encode_subtitle_selection(subtitles_type::CC, service_type.raw(), service_id)
    }

    /// Teletext selection by page number. Pages of 800 and above address
    /// magazine 0.
    pub fn encode_teletext_selection(&self, page: u16) -> Vec<u8> {
        let magazine = if page >= 800 { 0 } else { u32::from(page / 100) };
        let page = u32::from(page % 100);
        self.encode_subtitle_selection(subtitles_type::TELETEXT, magazine, page)
    }

    pub fn encode_dvb_selection(&self, composition_page: u16, ancillary_page: u16) -> Vec<u8> {
        self.encode_subtitle_selection(
            subtitles_type::DVB,
            u32::from(composition_page),
            u32::from(ancillary_page),
        )
    }

    pub fn encode_scte_selection(&self) -> Vec<u8> {
        self.encode_subtitle_selection(subtitles_type::SCTE, 0, 0)
    }

    pub fn encode_webvtt_selection(&self, width: u32, height: u32) -> Vec<u8> {
        self.builder(PacketType::WebvttSelection).u32(width).u32(height).finish()
    }

    pub fn encode_ttml_selection(&self, width: u32, height: u32) -> Vec<u8> {
        self.builder(PacketType::TtmlSelection).u32(width).u32(height).finish()
    }

    pub fn encode_ttml_info(&self, text: &str) -> Vec<u8> {
        self.builder(PacketType::TtmlInfo).bytes(text.as_bytes()).finish()
    }

    /// SET_CC_ATTRIBUTES for CEA-708 carrying every standard attribute.
    pub fn encode_cc_attributes(&self, attributes: &CcAttributes) -> Vec<u8> {
        let words: [u32; CC_ATTRIBUTE_WORDS] = [
            attributes.font_color,
            attributes.background_color,
            attributes.font_opacity,
            attributes.background_opacity,
            attributes.font_style,
            attributes.font_size,
            u32::MAX, // italic
            u32::MAX, // underline
            u32::MAX, // border type
            0xff00_0000, // border color
            attributes.window_color,
            attributes.window_opacity,
            attributes.edge_type,
            attributes.edge_color,
        ];
        words
            .iter()
            .fold(
                self.builder(PacketType::SetCcAttributes)
                    .u32(CcServiceType::Cea708.raw())
                    .u32(cc_attribute::STANDARD_MASK),
                |builder, word| builder.u32(*word),
            )
            .finish()
    }

    /// Decode one packet buffer.
    ///
    /// Unknown type values decode successfully as [`PacketType::Invalid`].
    pub fn decode(&self, buffer: &[u8]) -> Result<Packet> {
        decode(buffer)
    }
}

/// Decode one packet buffer.
pub fn decode(buffer: &[u8]) -> Result<Packet> {
    if buffer.len() < HEADER_SIZE + CHANNEL_WORD_SIZE {
        return Err(SessionError::malformed_packet(
            format!("buffer shorter than {} byte header and channel id", HEADER_SIZE),
            buffer.len(),
        ));
    }

    let raw_type = parse_u32_le(buffer, 0)?;
    let sequence = parse_u32_le(buffer, 4)?;
    let payload_length = parse_u32_le(buffer, LENGTH_OFFSET)?;
    let actual = buffer.len() - HEADER_SIZE;
    if payload_length as usize != actual {
        return Err(SessionError::malformed_packet(
            format!("payload length field {} disagrees with {} payload bytes", payload_length, actual),
            buffer.len(),
        ));
    }

    let channel_id = parse_u32_le(buffer, HEADER_SIZE)?;
    let body: Arc<[u8]> = Arc::from(&buffer[HEADER_SIZE + CHANNEL_WORD_SIZE..]);
    trace!(raw_type, sequence, payload_length, "decoded packet");
    Ok(Packet::new(raw_type, sequence, channel_id, payload_length, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::packet::Selection;
    use proptest::prelude::*;

    fn word(buf: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn builder_patches_length_after_fields() {
        let buf = PacketBuilder::new(PacketType::Pause, 7).finish();
        assert_eq!(buf.len(), 16);
        assert_eq!(word(&buf, 0), PacketType::Pause.raw());
        assert_eq!(word(&buf, 4), 7);
        assert_eq!(word(&buf, 8), 4);
        assert_eq!(word(&buf, 12), DEFAULT_CHANNEL_ID);

        let buf = PacketBuilder::new(PacketType::PesData, 1).u32(0).bytes(b"abc").finish();
        assert_eq!(word(&buf, 8), 11);
    }

    #[test]
    fn sequence_is_shared_between_codecs() {
        let sequence = SequenceGenerator::new();
        let first = PacketCodec::new(sequence.clone());
        let second = PacketCodec::new(sequence.clone());

        let a = decode(&first.encode_control(PacketType::Mute)).unwrap();
        let b = decode(&second.encode_control(PacketType::Unmute)).unwrap();
        let c = decode(&first.encode_control(PacketType::Pause)).unwrap();
        assert_eq!((a.sequence, b.sequence, c.sequence), (1, 2, 3));
        assert_eq!(sequence.current(), 3);
    }

    #[test]
    fn webvtt_offset_is_negated_ttml_is_not() {
        let codec = PacketCodec::default();

        let webvtt = decode(&codec.encode_webvtt_data(b"WEBVTT", 3000)).unwrap();
        assert_eq!(webvtt.display_offset_ms().unwrap(), -3000);
        assert_eq!(webvtt.data().unwrap(), b"WEBVTT");

        let ttml = decode(&codec.encode_ttml_data(b"<tt/>", -3500)).unwrap();
        assert_eq!(ttml.display_offset_ms().unwrap(), -3500);
        assert_eq!(ttml.data().unwrap(), b"<tt/>");
    }

    #[test]
    fn teletext_page_split() {
        let codec = PacketCodec::default();
        let cases = [(100u16, 1u32, 0u32), (199, 1, 99), (777, 7, 77), (800, 0, 0), (888, 0, 88)];
        for (page, magazine, sub_page) in cases {
            let pkt = decode(&codec.encode_teletext_selection(page)).unwrap();
            assert_eq!(pkt.packet_type, PacketType::SubtitleSelection);
            assert_eq!(pkt.selection().unwrap(), Selection::Teletext { magazine, page: sub_page });
        }
    }

    #[test]
    fn cc_attributes_layout() {
        let codec = PacketCodec::default();
        let attrs = CcAttributes::default();
        let buf = codec.encode_cc_attributes(&attrs);
        // header + channel + cc type + mask + 14 words
        assert_eq!(buf.len(), HEADER_SIZE + 4 + 4 + 4 + 14 * 4);

        let update = decode(&buf).unwrap().cc_attributes().unwrap();
        assert_eq!(update.cc_type, CcServiceType::Cea708.raw());
        assert_eq!(update.attribute_mask, cc_attribute::STANDARD_MASK);
        assert_eq!(update.words[6], u32::MAX);
        assert_eq!(update.words[9], 0xff00_0000);
        assert_eq!(update.attributes(), attrs);
    }

    #[test]
    fn cc_data_layout() {
        let codec = PacketCodec::default();
        let pkt = decode(&codec.encode_cc_data(&[1, 2, 3])).unwrap();
        assert_eq!(pkt.channel_type().unwrap(), CC_CHANNEL_TYPE);
        assert_eq!(pkt.cc_pts().unwrap(), None);
        assert_eq!(pkt.data().unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn short_buffers_are_malformed() {
        for len in 0..HEADER_SIZE + CHANNEL_WORD_SIZE {
            let buf = vec![0u8; len];
            assert!(matches!(decode(&buf), Err(SessionError::MalformedPacket { .. })));
        }
    }

    #[test]
    fn unknown_type_decodes_as_invalid() {
        let mut buf = PacketCodec::default().encode_control(PacketType::Mute);
        buf[0..4].copy_from_slice(&0xbeefu32.to_le_bytes());
        let pkt = decode(&buf).unwrap();
        assert_eq!(pkt.packet_type, PacketType::Invalid);
        assert_eq!(pkt.raw_type, 0xbeef);
    }

    proptest! {
        #[test]
        fn length_mismatch_is_rejected(extra in 1usize..64, truncate in 1usize..4) {
            let codec = PacketCodec::default();
            let mut longer = codec.encode_pes_data(&[0xaa; 8]);
            longer.extend(std::iter::repeat_n(0u8, extra));
            prop_assert!(
                matches!(decode(&longer), Err(SessionError::MalformedPacket { .. })),
                "trailing bytes must be rejected"
            );

            let mut shorter = codec.encode_pes_data(&[0xaa; 8]);
            shorter.truncate(shorter.len() - truncate);
            prop_assert!(
                matches!(decode(&shorter), Err(SessionError::MalformedPacket { .. })),
                "missing bytes must be rejected"
            );
        }

        #[test]
        fn payload_bytes_survive_encoding(
            data in proptest::collection::vec(any::<u8>(), 0..512),
            offset in any::<i64>()
        ) {
            let codec = PacketCodec::default();
            let ttml = decode(&codec.encode_ttml_data(&data, offset)).unwrap();
            prop_assert_eq!(ttml.data().unwrap(), data.as_slice());
            prop_assert_eq!(ttml.display_offset_ms().unwrap(), offset);
            prop_assert_eq!(ttml.payload_length as usize, CHANNEL_WORD_SIZE + 8 + data.len());

            let webvtt = decode(&codec.encode_webvtt_data(&data, offset)).unwrap();
            prop_assert_eq!(webvtt.display_offset_ms().unwrap(), offset.wrapping_neg());
        }

        #[test]
        fn arbitrary_bytes_never_panic(buf in proptest::collection::vec(any::<u8>(), 0..64)) {
            if let Ok(pkt) = decode(&buf) {
                prop_assert_eq!(pkt.payload_length as usize, buf.len() - HEADER_SIZE);
                let _ = pkt.selection();
                let _ = pkt.data();
                let _ = pkt.timestamp();
                let _ = pkt.cc_attributes();
            }
        }
    }
}
