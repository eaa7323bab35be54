//! Per-packet RTP payload parser (RFC 6184 §5.6–§5.8).
//!
//! Dispatches on the type field of the first payload byte and turns one
//! payload into the NAL units (or NAL fragments) it carries. Nothing is
//! written here; the caller commits the units only if the whole payload
//! parsed.

use crate::error::{MalformedKind, PayloadError, Result};
use crate::nal;

const FU_START: u8 = 0x80;
const FU_END: u8 = 0x40;

/// A piece of the Annex B stream carried by one RTP payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Unit<'a> {
    /// A complete NAL unit, header byte included.
    Nal { data: &'a [u8], don: Option<u16> },
    /// First fragment of a NAL unit; `header` is the reconstructed NAL
    /// header and `data` the bytes that follow it.
    FragmentStart {
        header: u8,
        data: &'a [u8],
        end: bool,
        don: Option<u16>,
    },
    /// Later fragment, appended verbatim to the open NAL unit.
    FragmentContinuation { data: &'a [u8], end: bool },
}

/// Byte layout of an aggregation packet type.
#[derive(Debug)]
struct AggregationLayout {
    name: &'static str,
    /// 16-bit DON (STAP-B) or DONB (MTAP) after the indicator byte.
    don: bool,
    /// 8-bit DOND after each unit size (MTAP only).
    dond: bool,
    /// Timestamp offset length after DOND.
    ts_offset_len: usize,
}

impl AggregationLayout {
    /// Bytes between a unit's size field and its NAL data.
    fn unit_extra(&self) -> usize {
        usize::from(self.dond) + self.ts_offset_len
    }
}

/// Indexed by `nal_type - STAP_A`.
static AGGREGATION_LAYOUTS: [AggregationLayout; 4] = [
    AggregationLayout {
        name: "STAP-A",
        don: false,
        dond: false,
        ts_offset_len: 0,
    },
    AggregationLayout {
        name: "STAP-B",
        don: true,
        dond: false,
        ts_offset_len: 0,
    },
    AggregationLayout {
        name: "MTAP16",
        don: true,
        dond: true,
        ts_offset_len: 2,
    },
    AggregationLayout {
        name: "MTAP24",
        don: true,
        dond: true,
        ts_offset_len: 3,
    },
];

/// Parse one RTP payload into the units it carries.
///
/// Reserved types (0, 30, 31) yield no units. Payloads of 2 bytes or less
/// are rejected as too short.
pub(super) fn parse_payload(payload: &[u8], strict: bool) -> Result<Vec<Unit<'_>>> {
    if payload.len() <= 2 {
        return Err(MalformedKind::TooShort { len: payload.len() }.into());
    }

    let first_byte = payload[0];
    let nal_type = nal::nal_type(first_byte);
    check_forbidden_bit(first_byte, strict)?;

    match nal_type {
        1..=23 => Ok(vec![Unit::Nal {
            data: payload,
            don: None,
        }]),
        nal::STAP_A..=nal::MTAP24 => parse_aggregation(payload, nal_type, strict),
        nal::FU_A | nal::FU_B => parse_fragment(payload, nal_type).map(|unit| vec![unit]),
        _ => {
            tracing::debug!(nal_type, len = payload.len(), "reserved NAL unit type ignored");
            Ok(Vec::new())
        }
    }
}

fn check_forbidden_bit(header: u8, strict: bool) -> Result<()> {
    if strict && nal::forbidden_bit(header) {
        return Err(PayloadError::ForbiddenBit {
            nal_type: nal::nal_type(header),
        });
    }
    Ok(())
}

fn read_u16(payload: &[u8], offset: usize) -> Option<u16> {
    payload
        .get(offset..offset + 2)
        .map(|bytes| u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// STAP-A, STAP-B, MTAP16 and MTAP24 (RFC 6184 §5.7).
///
/// ```text
/// STAP-A:          [indicator][ {size16, NAL} ]*
/// STAP-B:          [indicator][DON16][ {size16, NAL} ]*
/// MTAP16 / MTAP24: [indicator][DONB16][ {size16, DOND8, TS16|TS24, NAL} ]*
/// ```
fn parse_aggregation(payload: &[u8], nal_type: u8, strict: bool) -> Result<Vec<Unit<'_>>> {
    let layout = &AGGREGATION_LAYOUTS[usize::from(nal_type - nal::STAP_A)];
    let mut offset = 1usize;

    let don = if layout.don {
        let don = read_u16(payload, offset).ok_or(MalformedKind::TruncatedHeader {
            nal_type,
            len: payload.len(),
        })?;
        offset += 2;
        Some(don)
    } else {
        None
    };

    let extra = layout.unit_extra();
    let mut units = Vec::new();
    let mut index: u16 = 0;

    while offset < payload.len() {
        let size = read_u16(payload, offset).ok_or(MalformedKind::TruncatedSize {
            remaining: payload.len() - offset,
        })?;
        let size = usize::from(size);
        offset += 2;

        let remaining = payload.len() - offset;
        if remaining < extra + size {
            return Err(MalformedKind::TruncatedUnit {
                declared: size,
                remaining: remaining.saturating_sub(extra),
            }
            .into());
        }

        // STAP-B: DON of the first unit, +1 per following unit.
        // MTAP: DONB + DOND.
        let unit_don = don.map(|don| {
            if layout.dond {
                don.wrapping_add(u16::from(payload[offset]))
            } else {
                don.wrapping_add(index)
            }
        });
        offset += extra;

        let data = &payload[offset..offset + size];
        offset += size;
        index = index.wrapping_add(1);

        if data.is_empty() {
            tracing::trace!(kind = layout.name, index, "empty aggregation unit skipped");
            continue;
        }
        check_forbidden_bit(data[0], strict)?;
        units.push(Unit::Nal {
            data,
            don: unit_don,
        });
    }

    tracing::trace!(kind = layout.name, nal_count = units.len(), "aggregation packet parsed");
    Ok(units)
}

/// FU-A and FU-B (RFC 6184 §5.8).
///
/// ```text
/// FU-A: [FU indicator][FU header][fragment]
/// FU-B: [FU indicator][FU header][DON16][fragment]
/// ```
fn parse_fragment(payload: &[u8], nal_type: u8) -> Result<Unit<'_>> {
    let fu_indicator = payload[0];
    let fu_header = payload[1];
    let mut offset = 2usize;

    let don = if nal_type == nal::FU_B {
        let don = read_u16(payload, offset).ok_or(MalformedKind::TruncatedHeader {
            nal_type,
            len: payload.len(),
        })?;
        offset += 2;
        Some(don)
    } else {
        None
    };

    let start = fu_header & FU_START != 0;
    let end = fu_header & FU_END != 0;
    let data = &payload[offset..];

    if start {
        // F and NRI from the indicator, type from the FU header
        let header =
            (fu_indicator & (nal::FORBIDDEN_BIT | nal::NRI_MASK)) | nal::nal_type(fu_header);
        tracing::trace!(nal_type = nal::nal_type(header), end, "fragmented NAL unit started");
        Ok(Unit::FragmentStart {
            header,
            data,
            end,
            don,
        })
    } else {
        Ok(Unit::FragmentContinuation { data, end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn malformed(payload: &[u8]) -> MalformedKind {
        match parse_payload(payload, false) {
            Err(PayloadError::Malformed { kind }) => kind,
            other => panic!("expected malformed payload, got {other:?}"),
        }
    }

    #[test]
    fn short_payload_rejected() {
        assert_eq!(malformed(&[0x65, 0x88]), MalformedKind::TooShort { len: 2 });
        assert_eq!(malformed(&[]), MalformedKind::TooShort { len: 0 });
    }

    #[test]
    fn reserved_types_yield_nothing() {
        for first in [0x00, 0x1e, 0x1f, 0x7e] {
            assert!(parse_payload(&[first, 1, 2, 3], false).unwrap().is_empty());
        }
    }

    #[test]
    fn single_nal_passes_through() {
        let payload = [0x41, 0x9a, 0x02, 0x03];
        assert_eq!(
            parse_payload(&payload, false).unwrap(),
            vec![Unit::Nal {
                data: &payload[..],
                don: None
            }]
        );
    }

    #[test]
    fn stap_a_units() {
        let payload = [0x18, 0x00, 0x03, 0x67, 0x42, 0x00, 0x00, 0x02, 0x68, 0xce];
        let units = parse_payload(&payload, false).unwrap();
        assert_eq!(
            units,
            vec![
                Unit::Nal {
                    data: &[0x67, 0x42, 0x00][..],
                    don: None
                },
                Unit::Nal {
                    data: &[0x68, 0xce][..],
                    don: None
                },
            ]
        );
    }

    #[test]
    fn stap_b_skips_don_once() {
        let payload = [0x19, 0x00, 0x10, 0x00, 0x02, 0x06, 0x05, 0x00, 0x02, 0x41, 0x9a];
        let units = parse_payload(&payload, false).unwrap();
        assert_eq!(
            units,
            vec![
                Unit::Nal {
                    data: &[0x06, 0x05][..],
                    don: Some(0x10)
                },
                Unit::Nal {
                    data: &[0x41, 0x9a][..],
                    don: Some(0x11)
                },
            ]
        );
    }

    #[test]
    fn mtap16_skips_dond_and_ts_offset() {
        let payload = [
            0x1a, 0x00, 0x05, // indicator, DONB = 5
            0x00, 0x02, 0x03, 0xAA, 0xBB, 0x41, 0x01, // size, DOND = 3, TS16, NAL
            0x00, 0x02, 0x01, 0xCC, 0xDD, 0x41, 0x02,
        ];
        let units = parse_payload(&payload, false).unwrap();
        assert_eq!(
            units,
            vec![
                Unit::Nal {
                    data: &[0x41, 0x01][..],
                    don: Some(8)
                },
                Unit::Nal {
                    data: &[0x41, 0x02][..],
                    don: Some(6)
                },
            ]
        );
    }

    #[test]
    fn mtap24_skips_dond_and_ts_offset() {
        let payload = [
            0x1b, 0xFF, 0xFF, // DONB = 65535
            0x00, 0x03, 0x02, 0x00, 0x00, 0x10, 0x65, 0x88, 0x84,
        ];
        let units = parse_payload(&payload, false).unwrap();
        assert_eq!(
            units,
            vec![Unit::Nal {
                data: &[0x65, 0x88, 0x84][..],
                don: Some(1)
            }]
        );
    }

    #[test]
    fn empty_aggregation_unit_skipped() {
        let payload = [0x18, 0x00, 0x00, 0x00, 0x02, 0x41, 0x9a];
        let units = parse_payload(&payload, false).unwrap();
        assert_eq!(
            units,
            vec![Unit::Nal {
                data: &[0x41, 0x9a][..],
                don: None
            }]
        );
    }

    #[test]
    fn truncated_aggregation_unit_rejected() {
        let payload = [0x18, 0x00, 0x09, 0x67, 0x42];
        assert_eq!(
            malformed(&payload),
            MalformedKind::TruncatedUnit {
                declared: 9,
                remaining: 2
            }
        );
    }

    #[test]
    fn trailing_byte_rejected() {
        let payload = [0x18, 0x00, 0x01, 0x09, 0x00];
        assert_eq!(malformed(&payload), MalformedKind::TruncatedSize { remaining: 1 });
    }

    #[test]
    fn aggregation_with_only_don_is_empty() {
        assert!(parse_payload(&[0x19, 0x00, 0x07], false).unwrap().is_empty());
        assert!(parse_payload(&[0x1a, 0x00, 0x07], false).unwrap().is_empty());
    }

    #[test]
    fn fu_a_start_reconstructs_header() {
        let payload = [0x7c, 0x85, 0x88, 0x84];
        assert_eq!(
            parse_payload(&payload, false).unwrap(),
            vec![Unit::FragmentStart {
                header: 0x65,
                data: &[0x88, 0x84][..],
                end: false,
                don: None
            }]
        );
    }

    #[test]
    fn fu_a_continuation_and_end() {
        let payload = [0x7c, 0x45, 0x01, 0x02];
        assert_eq!(
            parse_payload(&payload, false).unwrap(),
            vec![Unit::FragmentContinuation {
                data: &[0x01, 0x02][..],
                end: true
            }]
        );
    }

    #[test]
    fn fu_b_reads_don() {
        let payload = [0x5d, 0x81, 0x12, 0x34, 0xAA];
        assert_eq!(
            parse_payload(&payload, false).unwrap(),
            vec![Unit::FragmentStart {
                header: 0x41,
                data: &[0xAA][..],
                end: false,
                don: Some(0x1234)
            }]
        );
    }

    #[test]
    fn fu_b_truncated_don_rejected() {
        assert_eq!(
            malformed(&[0x5d, 0x81, 0x12]),
            MalformedKind::TruncatedHeader {
                nal_type: 29,
                len: 3
            }
        );
    }

    #[test]
    fn forbidden_bit_only_enforced_when_strict() {
        let payload = [0xe1, 0x9a, 0x02];
        assert!(parse_payload(&payload, false).is_ok());
        assert!(matches!(
            parse_payload(&payload, true),
            Err(PayloadError::ForbiddenBit { nal_type: 1 })
        ));

        let stap = [0x18, 0x00, 0x02, 0xe7, 0x42];
        assert!(parse_payload(&stap, false).is_ok());
        assert!(matches!(
            parse_payload(&stap, true),
            Err(PayloadError::ForbiddenBit { nal_type: 7 })
        ));
    }
}
