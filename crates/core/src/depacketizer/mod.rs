//! RTP → Annex B depacketization (RFC 6184).
//!
//! A [`Depacketizer`] consumes every packet of one frame in ascending
//! sequence order and produces:
//!
//! - a byte buffer of `00 00 01`-prefixed NAL units, in the order they were
//!   found (or in decoding order when [`DepacketizerConfig::don_ordering`]
//!   is set), and
//! - [`NalFlags`] telling whether SPS, PPS, SEI, slice or IDR data was seen.
//!
//! Malformed packets are skipped whole: a packet either contributes all of
//! its NAL units and flags or nothing.

mod parser;

use std::io::Cursor;

use crate::error::{MalformedKind, PayloadError, Result};
use crate::frame::FrameLike;
use crate::nal::{self, NalFlags};

use parser::Unit;

/// Depacketizer behaviour switches.
#[derive(Debug, Clone, Default)]
pub struct DepacketizerConfig {
    /// Sort NAL units by decoding order number (STAP-B, MTAP, FU-B) before
    /// writing them, for interleaved packetization mode. When `false`,
    /// NAL units are written in sequence-number order.
    pub don_ordering: bool,
    /// Skip packets whose NAL headers have the forbidden_zero_bit set.
    pub strict_forbidden_bit: bool,
    /// Write an extra zero byte before SEI, SPS and PPS NAL units, giving
    /// them a 4-byte start code. Matches the layout produced by older
    /// depacketizers.
    pub parameter_set_zero_prefix: bool,
}

/// One NAL unit on its way into the output buffer.
#[derive(Debug)]
struct NalRecord {
    don: Option<u16>,
    data: Vec<u8>,
}

/// NAL units collected during one depacketization call.
#[derive(Debug, Default)]
struct Assembly {
    records: Vec<NalRecord>,
    /// Index of the fragmented NAL unit still expecting fragments.
    open_fragment: Option<usize>,
    flags: NalFlags,
}

impl Assembly {
    /// Apply the units of one packet. Validation happens before any state
    /// changes, so a rejected packet leaves the assembly untouched.
    fn commit(&mut self, units: Vec<Unit<'_>>) -> Result<()> {
        let continues = units
            .iter()
            .any(|unit| matches!(unit, Unit::FragmentContinuation { .. }));
        if continues && self.open_fragment.is_none() {
            return Err(MalformedKind::FragmentWithoutStart.into());
        }

        for unit in units {
            match unit {
                Unit::Nal { data, don } => {
                    self.flags.classify(data[0]);
                    self.open_fragment = None;
                    self.records.push(NalRecord {
                        don,
                        data: data.to_vec(),
                    });
                }
                Unit::FragmentStart {
                    header,
                    data,
                    end,
                    don,
                } => {
                    self.flags.classify(header);
                    let mut nal_unit = Vec::with_capacity(1 + data.len());
                    nal_unit.push(header);
                    nal_unit.extend_from_slice(data);
                    self.records.push(NalRecord {
                        don,
                        data: nal_unit,
                    });
                    self.open_fragment = (!end).then_some(self.records.len() - 1);
                }
                Unit::FragmentContinuation { data, end } => {
                    if let Some(index) = self.open_fragment {
                        self.records[index].data.extend_from_slice(data);
                    }
                    if end {
                        self.open_fragment = None;
                    }
                }
            }
        }
        Ok(())
    }

    /// Stable-sort records by wrap-aware distance from the first DON.
    /// Records without a DON follow the record before them.
    fn sort_by_don(&mut self) {
        let mut previous: Option<u16> = None;
        let mut keyed: Vec<(u16, NalRecord)> = self
            .records
            .drain(..)
            .map(|record| {
                let don = record
                    .don
                    .or_else(|| previous.map(|don| don.wrapping_add(1)))
                    .unwrap_or(0);
                previous = Some(don);
                (don, record)
            })
            .collect();

        if let Some(&(first, _)) = keyed.first() {
            keyed.sort_by_key(|(don, _)| don.wrapping_sub(first) as i16);
        }
        self.records = keyed.into_iter().map(|(_, record)| record).collect();
    }

    fn into_buffer(mut self, config: &DepacketizerConfig) -> (Vec<u8>, NalFlags) {
        if config.don_ordering {
            self.sort_by_don();
        }

        let len = self.records.iter().map(|r| 4 + r.data.len()).sum();
        let mut buffer = Vec::with_capacity(len);
        for record in &self.records {
            if config.parameter_set_zero_prefix
                && nal::is_parameter_set_or_sei(nal::nal_type(record.data[0]))
            {
                buffer.push(0);
            }
            buffer.extend_from_slice(&nal::START_CODE);
            buffer.extend_from_slice(&record.data);
        }
        (buffer, self.flags)
    }
}

/// H.264 RTP depacketizer.
///
/// The output buffer belongs to the depacketizer: it is replaced on every
/// [`depacketize`](Self::depacketize) call and freed by
/// [`release_buffer`](Self::release_buffer) or on drop. Reading it while
/// released fails with [`PayloadError::BufferReleased`].
#[derive(Debug, Default)]
pub struct Depacketizer {
    config: DepacketizerConfig,
    buffer: Option<Vec<u8>>,
    flags: NalFlags,
    skipped: usize,
}

impl Depacketizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a depacketizer with custom behaviour switches.
    pub fn with_config(config: DepacketizerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &DepacketizerConfig {
        &self.config
    }

    /// Rebuild the Annex B buffer from every distinct packet of `frame`
    /// and return the classification flags.
    ///
    /// The previous buffer is released first. Malformed packets are logged,
    /// counted in [`skipped_packets`](Self::skipped_packets) and otherwise
    /// ignored.
    pub fn depacketize<F: FrameLike>(&mut self, frame: &F) -> NalFlags {
        self.release_buffer();

        let mut assembly = Assembly::default();
        let mut packets = 0usize;
        let mut skipped = 0usize;

        for packet in frame.distinct_packets() {
            packets += 1;
            let seq = packet.sequence_number();
            let result = parser::parse_payload(packet.payload(), self.config.strict_forbidden_bit)
                .and_then(|units| assembly.commit(units));

            if let Err(e) = result {
                skipped += 1;
                tracing::warn!(seq, len = packet.payload().len(), error = %e, "RTP packet skipped");
            }
        }

        let (buffer, flags) = assembly.into_buffer(&self.config);

        tracing::debug!(
            packets,
            skipped,
            bytes = buffer.len(),
            sps = flags.contains_sps,
            pps = flags.contains_pps,
            sei = flags.contains_sei,
            slice = flags.contains_slice,
            idr = flags.is_idr,
            "frame depacketized"
        );

        self.buffer = Some(buffer);
        self.flags = flags;
        self.skipped = skipped;
        flags
    }

    /// The Annex B buffer from the last call, positioned at its start.
    pub fn buffer(&self) -> Result<Cursor<&[u8]>> {
        self.bytes().map(Cursor::new)
    }

    /// The Annex B bytes from the last call.
    pub fn bytes(&self) -> Result<&[u8]> {
        self.buffer.as_deref().ok_or(PayloadError::BufferReleased)
    }

    /// Move the buffer out, leaving the depacketizer released.
    pub fn take_buffer(&mut self) -> Result<Vec<u8>> {
        self.buffer.take().ok_or(PayloadError::BufferReleased)
    }

    /// Flags from the last call.
    pub fn flags(&self) -> NalFlags {
        self.flags
    }

    /// Packets the last call dropped as malformed.
    pub fn skipped_packets(&self) -> usize {
        self.skipped
    }

    /// Free the buffer. Safe to call repeatedly.
    pub fn release_buffer(&mut self) {
        if self.buffer.take().is_some() {
            tracing::trace!("depacketizer buffer released");
        }
    }

    pub fn is_released(&self) -> bool {
        self.buffer.is_none()
    }
}
