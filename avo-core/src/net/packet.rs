//! Datagram wire format and fragmentation.
//!
//! Every datagram starts with a fixed 29-byte header; all integer
//! fields are big-endian:
//!
//! ```text
//! magic:         [u8; 4]  "AVOS"
//! version:       u8       (1)
//! frame_id:      u32      (4)
//! packet_id:     u32      (4)
//! total_packets: u32      (4)
//! width:         u32      (4)
//! height:        u32      (4)
//! data_size:     u32      (4)
//! payload:       [u8]     (data_size bytes)
//! ```
//!
//! Datagrams with an unknown magic or version are rejected outright.
//! Payloads above
//! [`MAX_PAYLOAD`] are split into chunks sharing `frame_id`, `width`,
//! `height` and `total_packets`, with `packet_id` numbering them
//! `0..total_packets`.

use crate::error::AvoError;

/// Leading magic bytes of every datagram.
pub const PACKET_MAGIC: [u8; 4] = *b"AVOS";

/// Current wire protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Encoded header size: magic + version + six `u32` fields.
pub const HEADER_LEN: usize = 29;

/// Largest payload carried by a single datagram before fragmentation.
pub const MAX_PAYLOAD: usize = 60_000;

/// Largest UDP datagram the receive loop will accept.
pub const MAX_DATAGRAM: usize = 65_507;

// ── PacketHeader ─────────────────────────────────────────────────

/// Fixed per-datagram header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Monotonically increasing per-server frame counter.
    pub frame_id: u32,
    /// Chunk index within the frame, `0..total_packets`.
    pub packet_id: u32,
    /// Number of chunks the frame was split into.
    pub total_packets: u32,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Payload bytes following the header.
    pub data_size: u32,
}

impl PacketHeader {
    /// Serialize to the wire layout.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&PACKET_MAGIC);
        buf[4] = PROTOCOL_VERSION;
        buf[5..9].copy_from_slice(&self.frame_id.to_be_bytes());
        buf[9..13].copy_from_slice(&self.packet_id.to_be_bytes());
        buf[13..17].copy_from_slice(&self.total_packets.to_be_bytes());
        buf[17..21].copy_from_slice(&self.width.to_be_bytes());
        buf[21..25].copy_from_slice(&self.height.to_be_bytes());
        buf[25..29].copy_from_slice(&self.data_size.to_be_bytes());
        buf
    }

    /// Deserialize and validate a header.
    pub fn decode(data: &[u8]) -> Result<Self, AvoError> {
        if data.len() < HEADER_LEN {
            return Err(AvoError::PacketTooShort {
                len: data.len(),
                need: HEADER_LEN,
            });
        }
        if data[0..4] != PACKET_MAGIC {
            return Err(AvoError::InvalidMagic);
        }
        if data[4] != PROTOCOL_VERSION {
            return Err(AvoError::UnsupportedVersion(data[4]));
        }
        Ok(Self {
            frame_id: u32::from_be_bytes(data[5..9].try_into().unwrap()),
            packet_id: u32::from_be_bytes(data[9..13].try_into().unwrap()),
            total_packets: u32::from_be_bytes(data[13..17].try_into().unwrap()),
            width: u32::from_be_bytes(data[17..21].try_into().unwrap()),
            height: u32::from_be_bytes(data[21..25].try_into().unwrap()),
            data_size: u32::from_be_bytes(data[25..29].try_into().unwrap()),
        })
    }
}

// ── Packet assembly / parsing ────────────────────────────────────

/// Build one wire datagram around a payload chunk.
pub fn create_packet(
    data: &[u8],
    frame_id: u32,
    packet_id: u32,
    total_packets: u32,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let header = PacketHeader {
        frame_id,
        packet_id,
        total_packets,
        width,
        height,
        data_size: data.len() as u32,
    };
    let mut packet = Vec::with_capacity(HEADER_LEN + data.len());
    packet.extend_from_slice(&header.encode());
    packet.extend_from_slice(data);
    packet
}

/// Parse a received datagram into its header and payload slice.
///
/// Rejects datagrams shorter than the header, with a bad magic or
/// version, or shorter than `HEADER_LEN + data_size`.
pub fn parse_packet(packet: &[u8]) -> Result<(PacketHeader, &[u8]), AvoError> {
    let header = PacketHeader::decode(packet)?;
    let need = HEADER_LEN + header.data_size as usize;
    if packet.len() < need {
        return Err(AvoError::PacketTooShort {
            len: packet.len(),
            need,
        });
    }
    Ok((header, &packet[HEADER_LEN..need]))
}

/// Number of chunks a payload of `len` bytes fragments into.
///
/// Even an empty payload occupies one datagram.
pub fn chunk_count(len: usize) -> usize {
    if len == 0 {
        1
    } else {
        len.div_ceil(MAX_PAYLOAD)
    }
}

/// Split a payload into its wire chunks, in `packet_id` order.
pub fn fragment(data: &[u8]) -> Vec<&[u8]> {
    if data.is_empty() {
        vec![&[]]
    } else {
        data.chunks(MAX_PAYLOAD).collect()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let header = PacketHeader {
            frame_id: 42,
            packet_id: 3,
            total_packets: 8,
            width: 640,
            height: 480,
            data_size: 60_000,
        };
        let decoded = PacketHeader::decode(&header.encode()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn packet_roundtrip() {
        let payload = vec![0xAB; 5000];
        let packet = create_packet(&payload, 7, 0, 1, 320, 240);
        let (header, data) = parse_packet(&packet).unwrap();
        assert_eq!(header.frame_id, 7);
        assert_eq!(header.total_packets, 1);
        assert_eq!(header.width, 320);
        assert_eq!(header.height, 240);
        assert_eq!(data, &payload[..]);
    }

    #[test]
    fn short_header_rejected() {
        let short = [0u8; 10];
        assert!(matches!(
            PacketHeader::decode(&short),
            Err(AvoError::PacketTooShort { .. })
        ));
    }

    #[test]
    fn bad_magic_rejected() {
        let mut packet = create_packet(&[1, 2, 3], 0, 0, 1, 4, 1);
        packet[0] = b'X';
        assert!(matches!(parse_packet(&packet), Err(AvoError::InvalidMagic)));
    }

    #[test]
    fn unknown_version_rejected() {
        let mut packet = create_packet(&[1, 2, 3], 0, 0, 1, 4, 1);
        packet[4] = 9;
        assert!(matches!(
            parse_packet(&packet),
            Err(AvoError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn truncated_payload_rejected() {
        let packet = create_packet(&[1, 2, 3, 4], 0, 0, 1, 4, 1);
        assert!(matches!(
            parse_packet(&packet[..packet.len() - 2]),
            Err(AvoError::PacketTooShort { .. })
        ));
    }

    #[test]
    fn fragment_boundaries() {
        assert_eq!(chunk_count(0), 1);
        assert_eq!(chunk_count(1), 1);
        assert_eq!(chunk_count(MAX_PAYLOAD), 1);
        assert_eq!(chunk_count(MAX_PAYLOAD + 1), 2);

        let exact = vec![0u8; MAX_PAYLOAD];
        assert_eq!(fragment(&exact).len(), 1);

        let over = vec![0u8; MAX_PAYLOAD + 1];
        let chunks = fragment(&over);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), MAX_PAYLOAD);
        assert_eq!(chunks[1].len(), 1);
    }
}
