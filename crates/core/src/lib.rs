//! H.264 RTP payload format (RFC 6184).
//!
//! - [`Packetizer`] splits NAL units into single-NAL or FU-A RTP packets.
//! - [`Depacketizer`] rebuilds an Annex B stream from the packets of one
//!   frame (single NAL, STAP-A/B, MTAP16/24, FU-A/B) and classifies it.

pub mod depacketizer;
pub mod error;
pub mod frame;
pub mod nal;
pub mod packetizer;
pub mod rtp;

pub use depacketizer::{Depacketizer, DepacketizerConfig};
pub use error::{MalformedKind, PayloadError, Result};
pub use frame::{Frame, FrameLike};
pub use nal::NalFlags;
pub use packetizer::{DEFAULT_MTU, MIN_MTU, Packetizer, packetize};
pub use rtp::RtpPacket;
