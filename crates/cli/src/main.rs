use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use rtsp_push::media::{NAL_TYPE_PPS, NAL_TYPE_SPS, extract_nal_units};
use rtsp_push::{AccessUnit, ParameterSets, Publisher, PublisherConfig, SessionEvent};

#[derive(Parser)]
#[command(
    name = "rtsp-push",
    about = "Publish an Annex B H.264 file to an RTSP server"
)]
struct Args {
    /// Target URL, rtsp://host[:port]/app/stream
    url: String,

    /// Annex B H.264 elementary stream (.h264)
    #[arg(long, short)]
    input: PathBuf,

    #[arg(long, short, requires = "password")]
    user: Option<String>,

    #[arg(long, short, requires = "user")]
    password: Option<String>,

    /// Frames per second used for timestamps and pacing
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Largest RTP datagram in bytes
    #[arg(long, default_value_t = 1300)]
    mtu: usize,

    /// Start over at the end of the file
    #[arg(long = "loop")]
    repeat: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let data = match std::fs::read(&args.input) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("Failed to read {}: {}", args.input.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let Some(parameter_sets) = ParameterSets::from_annex_b(&data) else {
        eprintln!("{}: no SPS/PPS found", args.input.display());
        return ExitCode::FAILURE;
    };
    let nal_units = extract_nal_units(&data);

    let mut config = PublisherConfig::new(&args.url);
    config.fps = args.fps.max(1);
    config.mtu = args.mtu;
    if let (Some(user), Some(password)) = (&args.user, &args.password) {
        config = config.with_credentials(user, password);
    }
    let fps = config.fps;

    let publisher = match Publisher::new(config) {
        Ok(publisher) => publisher,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let Some(events) = publisher.events() else {
        return ExitCode::FAILURE;
    };

    publisher.on_parameter_sets(parameter_sets);
    match events.recv_timeout(Duration::from_secs(30)) {
        Ok(SessionEvent::Connected) => {}
        Ok(SessionEvent::Failed(e)) => {
            eprintln!("Failed to publish to {}: {}", args.url, e);
            return ExitCode::FAILURE;
        }
        Ok(event) => {
            eprintln!("Unexpected session event: {:?}", event);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("No answer from {}: {}", args.url, e);
            publisher.stop();
            return ExitCode::FAILURE;
        }
    }

    println!("Publishing {} to {}", args.input.display(), args.url);

    let frame_us = 1_000_000 / u64::from(fps);
    let started = Instant::now();
    let mut pts_us = 0u64;
    let mut frames = 0u64;
    loop {
        for nal in &nal_units {
            let nal_type = nal.first().map(|b| b & 0x1f).unwrap_or(0);
            // Parameter sets already travel in the STAP-A ahead of each IDR.
            if nal_type == NAL_TYPE_SPS || nal_type == NAL_TYPE_PPS {
                continue;
            }

            let due = started + Duration::from_micros(pts_us);
            if let Some(wait) = due.checked_duration_since(Instant::now()) {
                thread::sleep(wait);
            }
            publisher.on_access_unit(&AccessUnit::from_nal(nal, pts_us));

            // Slice NAL units (types 1-5) each carry one picture.
            if (1..=5).contains(&nal_type) {
                pts_us += frame_us;
                frames += 1;
            }
        }
        if !args.repeat {
            break;
        }
    }

    tracing::info!(frames, "end of input");
    publisher.stop();
    ExitCode::SUCCESS
}
