//! Error types for the RFC 6184 payload library.

use std::fmt;

/// Errors that can occur while packetizing or depacketizing H.264 over RTP.
///
/// Variants map to specific failure modes:
///
/// - **Packetizer**: [`InvalidMtu`](Self::InvalidMtu) — an MTU that cannot
///   make progress through a NAL unit.
/// - **Depacketizer, per packet**: [`Malformed`](Self::Malformed) and
///   [`ForbiddenBit`](Self::ForbiddenBit). These never abort a whole
///   depacketization call; the offending packet is skipped and counted.
/// - **Lifecycle**: [`BufferReleased`](Self::BufferReleased) — reading the
///   depacketizer output after it was released (or before it was produced).
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    /// The MTU must be at least two bytes.
    #[error("invalid MTU: {0}")]
    InvalidMtu(usize),

    /// An RTP payload does not follow the RFC 6184 layout.
    #[error("malformed RTP payload: {kind}")]
    Malformed { kind: MalformedKind },

    /// The forbidden_zero_bit is set (only reported in strict mode).
    #[error("forbidden_zero_bit set on NAL unit type {nal_type}")]
    ForbiddenBit { nal_type: u8 },

    /// The depacketizer buffer was released or has not been produced yet.
    #[error("depacketizer buffer is not available (released or never produced)")]
    BufferReleased,
}

/// Specific kind of malformed RTP payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedKind {
    /// Payload of 2 bytes or less.
    TooShort { len: usize },
    /// The fixed header of an aggregation or fragmentation packet
    /// (indicator, FU header, DON) does not fit in the payload.
    TruncatedHeader { nal_type: u8, len: usize },
    /// Fewer than 2 bytes left where an aggregation unit size was expected.
    TruncatedSize { remaining: usize },
    /// An aggregation unit declares more bytes than the payload holds.
    TruncatedUnit { declared: usize, remaining: usize },
    /// A continuation fragment arrived with no fragmented NAL unit open.
    FragmentWithoutStart,
}

impl fmt::Display for MalformedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { len } => write!(f, "payload too short ({len} bytes)"),
            Self::TruncatedHeader { nal_type, len } => {
                write!(f, "type {nal_type} header truncated ({len} bytes)")
            }
            Self::TruncatedSize { remaining } => {
                write!(f, "{remaining} bytes left while expecting a 2-byte unit size")
            }
            Self::TruncatedUnit {
                declared,
                remaining,
            } => write!(
                f,
                "aggregation unit declares {declared} bytes but only {remaining} remain"
            ),
            Self::FragmentWithoutStart => write!(f, "fragment without a start fragment"),
        }
    }
}

impl From<MalformedKind> for PayloadError {
    fn from(kind: MalformedKind) -> Self {
        Self::Malformed { kind }
    }
}

/// Convenience alias for `Result<T, PayloadError>`.
pub type Result<T> = std::result::Result<T, PayloadError>;
