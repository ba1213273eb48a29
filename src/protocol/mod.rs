//! Session wire protocol.
//!
//! Every packet is a 12-byte little-endian header followed by a payload:
//!
//! ```text
//! +--------+----------+----------------+------------+----------------+
//! | type   | sequence | payload length | channel id | type body ...  |
//! | u32    | u32      | u32            | u32        |                |
//! +--------+----------+----------------+------------+----------------+
//! ```
//!
//! The payload length counts the channel id word and the body. Packets are a
//! process-internal representation shared by the socket source and the
//! session API; see [`PacketCodec`] for the body layout of each type.

mod codec;
mod packet;

pub use codec::{PacketBuilder, PacketCodec, SequenceGenerator, decode};
pub use packet::{
    CC_ATTRIBUTE_WORDS, CC_CHANNEL_TYPE, CHANNEL_WORD_SIZE, CcAttributeUpdate, DEFAULT_CHANNEL_ID,
    HEADER_SIZE, Packet, PacketType, Selection, TimestampSample, cc_attribute, subtitles_type,
};
