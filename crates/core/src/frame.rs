//! Access-unit packet collections.
//!
//! The packetizer and depacketizer only need a handful of capabilities from
//! whatever holds the packets of one frame, captured by [`FrameLike`].
//! [`Frame`] is the in-crate implementation: an ordered map keyed by
//! sequence number, so iteration is ascending and duplicates collapse.

use std::collections::BTreeMap;

use crate::rtp::RtpPacket;

/// The capabilities the packetizer and depacketizer depend on.
///
/// Callers must not share one frame between concurrent packetize or
/// depacketize calls.
pub trait FrameLike {
    /// Packets in ascending sequence-number order, one per sequence number.
    fn distinct_packets(&self) -> impl Iterator<Item = &RtpPacket>;

    /// Highest sequence number stored, or `None` when empty.
    fn highest_sequence_number(&self) -> Option<u16>;

    /// Sequence number to use for the next packet added to this frame.
    fn next_sequence_number(&self) -> u16;

    fn ssrc(&self) -> u32;

    fn payload_type(&self) -> u8;

    /// RTP timestamp shared by every packet of the frame.
    fn timestamp(&self) -> u32;

    /// Store a packet. Returns `false` if its sequence number is already
    /// present, in which case the stored packet is kept.
    fn add_packet(&mut self, packet: RtpPacket) -> bool;
}

/// Packets of one access unit, keyed by sequence number.
///
/// Keys are extended (unwrapped) sequence numbers: each packet is placed at
/// the highest stored key plus its signed 16-bit distance from that
/// packet's sequence number. A frame that straddles the 16-bit wrap, or
/// holds more than 32768 packets, still iterates in transmission order.
#[derive(Debug, Clone)]
pub struct Frame {
    payload_type: u8,
    ssrc: u32,
    timestamp: u32,
    initial_sequence: u16,
    packets: BTreeMap<i64, RtpPacket>,
}

impl Frame {
    /// Create an empty frame with explicit payload type and SSRC.
    pub fn new(payload_type: u8, ssrc: u32) -> Self {
        Self {
            payload_type: payload_type & 0x7f,
            ssrc,
            timestamp: 0,
            initial_sequence: 0,
            packets: BTreeMap::new(),
        }
    }

    /// Create with a random SSRC (RFC 3550 §8.1).
    pub fn with_random_ssrc(payload_type: u8) -> Self {
        let ssrc = rand::random::<u32>();
        tracing::debug!(
            payload_type,
            ssrc = format_args!("{:#010X}", ssrc),
            "frame created with random SSRC"
        );
        Self::new(payload_type, ssrc)
    }

    /// Set the RTP timestamp used for packets built into this frame.
    pub fn with_timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Sequence number given to the first packet packetized into an empty
    /// frame.
    pub fn with_initial_sequence(mut self, sequence: u16) -> Self {
        self.initial_sequence = sequence;
        self
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Drop all packets, keeping SSRC, payload type and timestamp. The next
    /// packetized packet continues after the previous highest sequence.
    pub fn clear(&mut self) {
        if let Some(highest) = self.highest_sequence_number() {
            self.initial_sequence = highest.wrapping_add(1);
        }
        self.packets.clear();
    }

    fn key(&self, sequence: u16) -> i64 {
        match self.packets.last_key_value() {
            Some((&highest, packet)) => {
                let delta = sequence.wrapping_sub(packet.sequence_number()) as i16;
                highest + i64::from(delta)
            }
            None => 0,
        }
    }
}

impl FrameLike for Frame {
    fn distinct_packets(&self) -> impl Iterator<Item = &RtpPacket> {
        self.packets.values()
    }

    fn highest_sequence_number(&self) -> Option<u16> {
        self.packets
            .last_key_value()
            .map(|(_, packet)| packet.sequence_number())
    }

    fn next_sequence_number(&self) -> u16 {
        self.highest_sequence_number()
            .map_or(self.initial_sequence, |highest| highest.wrapping_add(1))
    }

    fn ssrc(&self) -> u32 {
        self.ssrc
    }

    fn payload_type(&self) -> u8 {
        self.payload_type
    }

    fn timestamp(&self) -> u32 {
        self.timestamp
    }

    fn add_packet(&mut self, packet: RtpPacket) -> bool {
        let sequence = packet.sequence_number();
        let key = self.key(sequence);
        if self.packets.contains_key(&key) {
            tracing::trace!(seq = sequence, "duplicate RTP packet ignored");
            return false;
        }
        self.packets.insert(key, packet);
        true
    }
}
