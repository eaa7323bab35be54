//! H.264 NAL unit header helpers and stream classification.
//!
//! Every NAL unit starts with a one-byte header:
//!
//! ```text
//! +---------------+
//! |0|1|2|3|4|5|6|7|
//! +-+-+-+-+-+-+-+-+
//! |F|NRI|  Type   |
//! +---------------+
//! ```
//!
//! Types 1–23 are defined by H.264 itself. Types 24–29 only exist inside
//! RTP payloads (RFC 6184 §5.2) and never reach the reconstructed Annex B
//! stream.

/// Annex B start code written in front of every reconstructed NAL unit.
pub const START_CODE: [u8; 3] = [0x00, 0x00, 0x01];

pub const TYPE_MASK: u8 = 0x1f;
pub const NRI_MASK: u8 = 0x60;
pub const FORBIDDEN_BIT: u8 = 0x80;

pub const SLICE: u8 = 1;
pub const IDR: u8 = 5;
pub const SEI: u8 = 6;
pub const SPS: u8 = 7;
pub const PPS: u8 = 8;

pub const STAP_A: u8 = 24;
pub const STAP_B: u8 = 25;
pub const MTAP16: u8 = 26;
pub const MTAP24: u8 = 27;
pub const FU_A: u8 = 28;
pub const FU_B: u8 = 29;

/// NAL unit type (low 5 bits of the header).
#[inline]
pub fn nal_type(header: u8) -> u8 {
    header & TYPE_MASK
}

/// Whether the forbidden_zero_bit is set.
#[inline]
pub fn forbidden_bit(header: u8) -> bool {
    header & FORBIDDEN_BIT != 0
}

/// Whether a NAL unit of this type is written with a leading zero byte
/// when the legacy buffer layout is requested.
#[inline]
pub(crate) fn is_parameter_set_or_sei(nal_type: u8) -> bool {
    matches!(nal_type, SEI | SPS | PPS)
}

/// Content classification accumulated across a depacketization call.
///
/// Flags only ever go from `false` to `true` within one call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NalFlags {
    pub contains_sps: bool,
    pub contains_pps: bool,
    pub contains_sei: bool,
    pub contains_slice: bool,
    pub is_idr: bool,
}

impl NalFlags {
    /// Record the NAL unit whose header byte is `header`.
    pub fn classify(&mut self, header: u8) {
        match nal_type(header) {
            SEI => self.contains_sei = true,
            SPS => self.contains_sps = true,
            PPS => self.contains_pps = true,
            SLICE => self.contains_slice = true,
            IDR => self.is_idr = true,
            _ => {}
        }
    }

    /// OR-accumulate another set of flags into this one.
    pub fn merge(&mut self, other: NalFlags) {
        self.contains_sps |= other.contains_sps;
        self.contains_pps |= other.contains_pps;
        self.contains_sei |= other.contains_sei;
        self.contains_slice |= other.contains_slice;
        self.is_idr |= other.is_idr;
    }

    /// A decoder can start from this access unit.
    pub fn is_decodable_start(&self) -> bool {
        self.contains_sps && self.contains_pps && self.is_idr
    }
}

/// Split an Annex B byte stream into NAL units, without start codes.
///
/// Both `00 00 01` and `00 00 00 01` delimit units. Bytes before the first
/// start code are ignored, as are empty units between adjacent start codes.
pub fn split_annex_b(data: &[u8]) -> Vec<&[u8]> {
    let mut nal_units = Vec::new();
    let mut current: Option<usize> = None;
    let mut i = 0usize;

    while i + START_CODE.len() <= data.len() {
        if data[i..i + START_CODE.len()] != START_CODE {
            i += 1;
            continue;
        }

        // A zero just before the 3-byte code belongs to a 4-byte code.
        let floor = current.unwrap_or(0);
        let code_start = if i > floor && data[i - 1] == 0 { i - 1 } else { i };
        if let Some(begin) = current.filter(|&begin| begin < code_start) {
            nal_units.push(&data[begin..code_start]);
        }

        i += START_CODE.len();
        current = Some(i);
    }

    if let Some(begin) = current.filter(|&begin| begin < data.len()) {
        nal_units.push(&data[begin..]);
    }
    nal_units
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_fields() {
        assert_eq!(nal_type(0x65), IDR);
        assert_eq!(nal_type(0x7c), FU_A);
        assert!(!forbidden_bit(0x65));
        assert!(forbidden_bit(0xe5));
    }

    #[test]
    fn classify_follows_h264_types() {
        let mut flags = NalFlags::default();
        flags.classify(0x67);
        assert!(flags.contains_sps);
        assert!(!flags.contains_pps);

        flags.classify(0x68);
        assert!(flags.contains_pps);

        flags.classify(0x06);
        assert!(flags.contains_sei);

        flags.classify(0x41);
        assert!(flags.contains_slice);
        assert!(!flags.is_idr);

        flags.classify(0x65);
        assert!(flags.is_idr);
    }

    #[test]
    fn classify_ignores_other_types() {
        let mut flags = NalFlags::default();
        for header in [0x09, 0x0c, 0x18, 0x1c, 0x1e] {
            flags.classify(header);
        }
        assert_eq!(flags, NalFlags::default());
    }

    #[test]
    fn merge_is_or() {
        let mut a = NalFlags {
            contains_sps: true,
            ..Default::default()
        };
        let b = NalFlags {
            is_idr: true,
            ..Default::default()
        };
        a.merge(b);
        assert!(a.contains_sps && a.is_idr);
        a.merge(NalFlags::default());
        assert!(a.contains_sps && a.is_idr);
    }

    #[test]
    fn decodable_start_needs_parameter_sets_and_idr() {
        let mut flags = NalFlags::default();
        flags.classify(0x65);
        assert!(!flags.is_decodable_start());
        flags.classify(0x67);
        flags.classify(0x68);
        assert!(flags.is_decodable_start());
    }

    #[test]
    fn split_mixed_start_codes() {
        let mut data = vec![0, 0, 0, 1, 0x67, 0x42];
        data.extend_from_slice(&[0, 0, 1, 0x68, 0xCE]);
        let nals = split_annex_b(&data);
        assert_eq!(nals, vec![&[0x67, 0x42][..], &[0x68, 0xCE][..]]);
    }

    #[test]
    fn split_skips_leading_bytes_and_empty_units() {
        let data = [0xAB, 0, 0, 0, 1, 0, 0, 1, 0x09, 0x10, 0, 0, 0, 1, 0x65, 0x88];
        let nals = split_annex_b(&data);
        assert_eq!(nals, vec![&[0x09, 0x10][..], &[0x65, 0x88][..]]);
    }

    #[test]
    fn split_start_code_at_end() {
        let data = [0, 0, 1, 0x67, 0x42, 0, 0, 0, 1];
        assert_eq!(split_annex_b(&data), vec![&[0x67, 0x42][..]]);
    }

    #[test]
    fn split_without_start_code() {
        assert!(split_annex_b(&[]).is_empty());
        assert!(split_annex_b(&[0xFF, 0xFE]).is_empty());
    }
}
