use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use rfc6184::{
    DEFAULT_MTU, Depacketizer, DepacketizerConfig, Frame, FrameLike, NalFlags, Packetizer, nal,
};

#[derive(Parser)]
#[command(
    name = "rfc6184",
    about = "Packetize H.264 Annex B streams into RTP (RFC 6184) and back"
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the RTP packets produced for every NAL unit of a file
    Packetize {
        /// Annex B input file
        input: PathBuf,
        /// Fragmentation threshold in bytes
        #[arg(long, default_value_t = DEFAULT_MTU)]
        mtu: usize,
        /// RTP payload type
        #[arg(long, default_value_t = 96)]
        payload_type: u8,
    },
    /// Packetize and depacketize every NAL unit, then compare with the input
    Roundtrip {
        /// Annex B input file
        input: PathBuf,
        /// Fragmentation threshold in bytes
        #[arg(long, default_value_t = DEFAULT_MTU)]
        mtu: usize,
        /// Write the reconstructed Annex B stream here
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Prefix SEI/SPS/PPS with a 4-byte start code
        #[arg(long)]
        zero_prefix: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let result = match args.command {
        Command::Packetize {
            input,
            mtu,
            payload_type,
        } => packetize(&input, mtu, payload_type),
        Command::Roundtrip {
            input,
            mtu,
            output,
            zero_prefix,
        } => roundtrip(&input, mtu, output.as_deref(), zero_prefix),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

type CliResult = Result<ExitCode, Box<dyn std::error::Error>>;

fn packetize(input: &std::path::Path, mtu: usize, payload_type: u8) -> CliResult {
    let data = fs::read(input)?;
    let packetizer = Packetizer::with_mtu(mtu)?;
    let mut frame = Frame::with_random_ssrc(payload_type);

    println!("ssrc={:#010X} mtu={}", frame.ssrc(), mtu);
    for (index, nal_unit) in nal::split_annex_b(&data).into_iter().enumerate() {
        packetizer.packetize(nal_unit, &mut frame);
        for packet in frame.distinct_packets() {
            let payload = packet.payload();
            let kind = match nal::nal_type(payload[0]) {
                nal::FU_A => {
                    let fu_header = payload[1];
                    format!(
                        "FU-A{}{} type={}",
                        if fu_header & 0x80 != 0 { " S" } else { "" },
                        if fu_header & 0x40 != 0 { " E" } else { "" },
                        nal::nal_type(fu_header)
                    )
                }
                t => format!("single type={t}"),
            };
            println!(
                "nal={index} seq={} marker={} bytes={} {kind}",
                packet.sequence_number(),
                u8::from(packet.marker()),
                packet.to_bytes().len(),
            );
        }
        frame.clear();
    }

    Ok(ExitCode::SUCCESS)
}

fn roundtrip(
    input: &std::path::Path,
    mtu: usize,
    output: Option<&std::path::Path>,
    zero_prefix: bool,
) -> CliResult {
    let data = fs::read(input)?;
    let packetizer = Packetizer::with_mtu(mtu)?;
    let mut depacketizer = Depacketizer::with_config(DepacketizerConfig {
        parameter_set_zero_prefix: zero_prefix,
        ..Default::default()
    });
    let mut frame = Frame::with_random_ssrc(96);

    let mut rebuilt = Vec::with_capacity(data.len());
    let mut expected = Vec::with_capacity(data.len());
    let mut flags = NalFlags::default();
    let mut packets = 0usize;
    let mut skipped = 0usize;

    let nal_units = nal::split_annex_b(&data);
    for nal_unit in &nal_units {
        if zero_prefix && matches!(nal::nal_type(nal_unit[0]), nal::SEI | nal::SPS | nal::PPS) {
            expected.push(0);
        }
        expected.extend_from_slice(&nal::START_CODE);
        expected.extend_from_slice(nal_unit);

        packets += packetizer.packetize(nal_unit, &mut frame);
        flags.merge(depacketizer.depacketize(&frame));
        skipped += depacketizer.skipped_packets();
        rebuilt.extend(depacketizer.take_buffer()?);
        frame.clear();
    }

    tracing::info!(
        nal_units = nal_units.len(),
        packets,
        skipped,
        bytes = rebuilt.len(),
        "roundtrip finished"
    );
    println!(
        "nal_units={} packets={} sps={} pps={} sei={} slice={} idr={}",
        nal_units.len(),
        packets,
        flags.contains_sps,
        flags.contains_pps,
        flags.contains_sei,
        flags.contains_slice,
        flags.is_idr
    );

    if let Some(path) = output {
        fs::write(path, &rebuilt)?;
    }

    if rebuilt != expected {
        eprintln!("reconstructed stream differs from input");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
