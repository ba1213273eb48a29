//! Packet sources feeding a session.
//!
//! A source classifies every packet it receives: data packets go to the
//! receiver's ingress queue through [`PacketReceiver::add_buffer`], everything
//! else is decoded and dispatched synchronously through
//! [`PacketReceiver::on_packet_received`].

mod socket;

pub use socket::UnixSocketSource;

use tracing::warn;

use crate::protocol::{self, PacketType};

/// Consumer side of a packet source.
pub trait PacketReceiver: Send + Sync {
    /// Dispatch a decoded control packet.
    fn on_packet_received(&self, packet: &protocol::Packet);

    /// Queue a raw data packet. Returns `false` when the buffer was dropped
    /// because no decoder is active.
    fn add_buffer(&self, buffer: Vec<u8>) -> bool;

    /// The source can no longer deliver packets.
    fn on_stream_broken(&self);
}

/// Route one raw packet to `receiver` according to its type.
pub fn route_packet(buffer: &[u8], receiver: &dyn PacketReceiver) {
    let raw_type = buffer
        .get(..4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .unwrap_or(0);

    if PacketType::from_raw(raw_type).is_data() {
        receiver.add_buffer(buffer.to_vec());
        return;
    }

    match protocol::decode(buffer) {
        Ok(packet) => receiver.on_packet_received(&packet),
        Err(e) => warn!(error = %e, length = buffer.len(), "dropping malformed packet"),
    }
}
