/// RTP protocol version written into every packet.
pub const RTP_VERSION: u8 = 2;

/// Size of the RTP fixed header without CSRCs or extensions.
pub const FIXED_HEADER_LEN: usize = 12;

/// An RTP packet carrying one H.264 payload (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The payload is the region after the header, with padding, CSRCs and
/// extensions already stripped. Packets are immutable once built; the
/// packetizer decides the marker bit at construction time.
///
/// Version is always 2. Padding, extension, and CSRC count are always 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    marker: bool,
    payload_type: u8,
    sequence_number: u16,
    timestamp: u32,
    ssrc: u32,
    payload: Vec<u8>,
}

impl RtpPacket {
    /// Build a packet with the marker bit cleared.
    ///
    /// `payload_type` is truncated to its 7 wire bits.
    pub fn new(
        payload_type: u8,
        sequence_number: u16,
        timestamp: u32,
        ssrc: u32,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            marker: false,
            payload_type: payload_type & 0x7f,
            sequence_number,
            timestamp,
            ssrc,
            payload,
        }
    }

    /// Set the marker bit (last packet of an access unit, RFC 6184 §5.1).
    pub fn with_marker(mut self, marker: bool) -> Self {
        self.marker = marker;
        self
    }

    pub fn marker(&self) -> bool {
        self.marker
    }

    pub fn payload_type(&self) -> u8 {
        self.payload_type
    }

    pub fn sequence_number(&self) -> u16 {
        self.sequence_number
    }

    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// The RTP payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Serialize the 12-byte fixed header followed by the payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let first_byte: u8 = RTP_VERSION << 6;
        let second_byte: u8 = ((self.marker as u8) << 7) | self.payload_type;

        let mut packet = Vec::with_capacity(FIXED_HEADER_LEN + self.payload.len());
        packet.push(first_byte);
        packet.push(second_byte);
        packet.extend_from_slice(&self.sequence_number.to_be_bytes());
        packet.extend_from_slice(&self.timestamp.to_be_bytes());
        packet.extend_from_slice(&self.ssrc.to_be_bytes());
        packet.extend_from_slice(&self.payload);
        packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_packet() -> RtpPacket {
        RtpPacket::new(96, 0x1234, 90_000, 0xAABBCCDD, vec![0x65, 0x88])
    }

    #[test]
    fn version_is_2() {
        let buf = make_packet().to_bytes();
        assert_eq!(buf[0] >> 6, 2);
        // P, X and CC are zero
        assert_eq!(buf[0] & 0x3f, 0);
    }

    #[test]
    fn marker_bit() {
        let no_marker = make_packet().to_bytes();
        assert_eq!(no_marker[1] & 0x80, 0);

        let with_marker = make_packet().with_marker(true).to_bytes();
        assert_eq!(with_marker[1] & 0x80, 0x80);
    }

    #[test]
    fn payload_type_is_seven_bits() {
        let buf = make_packet().to_bytes();
        assert_eq!(buf[1] & 0x7f, 96);

        let p = RtpPacket::new(0xE0, 0, 0, 0, vec![]);
        assert_eq!(p.payload_type(), 0x60);
        assert_eq!(p.to_bytes()[1] & 0x80, 0);
    }

    #[test]
    fn fields_written_big_endian() {
        let buf = make_packet().to_bytes();
        assert_eq!(u16::from_be_bytes([buf[2], buf[3]]), 0x1234);
        assert_eq!(u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]), 90_000);
        assert_eq!(
            u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            0xAABBCCDD
        );
    }

    #[test]
    fn payload_follows_header() {
        let buf = make_packet().to_bytes();
        assert_eq!(buf.len(), FIXED_HEADER_LEN + 2);
        assert_eq!(&buf[FIXED_HEADER_LEN..], &[0x65, 0x88]);
    }
}
