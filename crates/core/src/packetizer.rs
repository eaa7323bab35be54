//! NAL unit → RTP packetization (RFC 6184 §5.6, §5.8).

use crate::error::{PayloadError, Result};
use crate::frame::FrameLike;
use crate::nal;
use crate::rtp::RtpPacket;

/// Default fragmentation threshold in bytes.
pub const DEFAULT_MTU: usize = 1500;

/// Smallest MTU whose first FU-A fragment still carries NAL data. With an
/// MTU of 1 the start fragment would be the bare 2-byte FU header, which
/// receivers discard.
pub const MIN_MTU: usize = 2;

const FU_START: u8 = 0x80;
const FU_END: u8 = 0x40;

/// H.264 RTP packetizer.
///
/// Supports two packetization modes from RFC 6184:
///
/// - **Single NAL Unit** (§5.6): a NAL shorter than the MTU is sent as-is
///   in one RTP packet with the marker bit set.
///
/// - **FU-A Fragmentation** (§5.8): a NAL of MTU bytes or more is split
///   across several RTP packets. Each fragment carries a 2-byte FU
///   header before up to MTU bytes of NAL data:
///
///   ```text
///   FU indicator:  [F|NRI|Type=28]     (1 byte)
///   FU header:     [S|E|R|NAL_Type]    (1 byte)
///   Fragment data: [...]               (up to MTU bytes)
///   ```
///
///   Fragment `k` covers NAL bytes `k*mtu .. (k+1)*mtu`. The first
///   fragment omits the NAL header byte, which the FU indicator and FU
///   header carry instead, so a NAL of `n` bytes yields `ceil(n / mtu)`
///   packets.
///
/// Packets are appended to a [`FrameLike`] collection, which supplies the
/// payload type, SSRC, timestamp and next sequence number.
#[derive(Debug, Clone, Copy)]
pub struct Packetizer {
    mtu: usize,
}

impl Default for Packetizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Packetizer {
    /// Create with the default MTU of 1500 bytes.
    pub fn new() -> Self {
        Self { mtu: DEFAULT_MTU }
    }

    /// Create with an explicit MTU of at least [`MIN_MTU`] bytes.
    pub fn with_mtu(mtu: usize) -> Result<Self> {
        if mtu < MIN_MTU {
            return Err(PayloadError::InvalidMtu(mtu));
        }
        Ok(Self { mtu })
    }

    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Packetize one NAL unit into `frame`. Returns the number of packets
    /// added; an empty NAL adds none.
    ///
    /// Every call ends an access unit: the final packet carries the marker
    /// bit.
    pub fn packetize<F: FrameLike>(&self, nal_unit: &[u8], frame: &mut F) -> usize {
        self.packetize_nal(nal_unit, true, frame)
    }

    /// Packetize every NAL unit of an Annex B access unit into `frame`.
    ///
    /// Only the final packet of the last NAL unit carries the marker bit.
    pub fn packetize_access_unit<F: FrameLike>(&self, annex_b: &[u8], frame: &mut F) -> usize {
        let nal_units = nal::split_annex_b(annex_b);
        let mut added = 0;

        for (i, nal_unit) in nal_units.iter().enumerate() {
            let is_last = i + 1 == nal_units.len();
            added += self.packetize_nal(nal_unit, is_last, frame);
        }

        tracing::trace!(
            nal_count = nal_units.len(),
            rtp_packets = added,
            access_unit_bytes = annex_b.len(),
            next_seq = frame.next_sequence_number(),
            "access unit packetized"
        );

        added
    }

    fn packetize_nal<F: FrameLike>(
        &self,
        nal_unit: &[u8],
        is_last_nal: bool,
        frame: &mut F,
    ) -> usize {
        if nal_unit.is_empty() {
            return 0;
        }

        if nal_unit.len() < self.mtu {
            // Single NAL Unit mode (RFC 6184 §5.6)
            return usize::from(push_packet(frame, nal_unit.to_vec(), is_last_nal));
        }

        // FU-A fragmentation (RFC 6184 §5.8)
        let nal_header = nal_unit[0];
        let nal_type = nal::nal_type(nal_header);

        // FU indicator: F and NRI from original NAL, type = 28 (FU-A)
        let fu_indicator = (nal_header & (nal::FORBIDDEN_BIT | nal::NRI_MASK)) | nal::FU_A;

        let mut offset = 0usize;
        let mut fragments = 0usize;
        let mut added = 0usize;

        while offset < nal_unit.len() {
            let end = (offset + self.mtu).min(nal_unit.len());
            let last_fragment = end == nal_unit.len();
            // The header byte travels in the FU indicator/header.
            let chunk = &nal_unit[offset.max(1)..end];

            // FU header: S=start, E=end, R=0, Type=original NAL type
            let start_bit = if offset == 0 { FU_START } else { 0x00 };
            let end_bit = if last_fragment { FU_END } else { 0x00 };
            let fu_header = start_bit | end_bit | nal_type;

            let mut payload = Vec::with_capacity(2 + chunk.len());
            payload.push(fu_indicator);
            payload.push(fu_header);
            payload.extend_from_slice(chunk);
            added += usize::from(push_packet(frame, payload, is_last_nal && last_fragment));

            offset = end;
            fragments += 1;
        }

        tracing::trace!(
            nal_type,
            nal_size = nal_unit.len(),
            fragments,
            added,
            "FU-A fragmented NAL unit"
        );

        added
    }
}

/// Packetize `nal_unit` into `frame` with the given MTU.
pub fn packetize<F: FrameLike>(nal_unit: &[u8], mtu: usize, frame: &mut F) -> Result<usize> {
    Ok(Packetizer::with_mtu(mtu)?.packetize(nal_unit, frame))
}

/// Append one packet at the frame's next sequence number. Returns `false`
/// when the frame already held that sequence number and kept its packet.
fn push_packet<F: FrameLike>(frame: &mut F, payload: Vec<u8>, marker: bool) -> bool {
    let seq = frame.next_sequence_number();
    let packet = RtpPacket::new(frame.payload_type(), seq, frame.timestamp(), frame.ssrc(), payload)
        .with_marker(marker);
    let added = frame.add_packet(packet);
    if !added {
        tracing::warn!(seq, "frame rejected packetized RTP packet as a duplicate");
    }
    added
}
