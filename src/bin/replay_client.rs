//! Replays scripted synthetic gestures to a running server and prints
//! every non-empty reply.

use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use nng::{Protocol, Socket};
use serde_json::Value;
use tracing::info;

use silentvoice::synthetic::{synthetic_raw_hand, trajectory, DemoShape, Trajectory};
use silentvoice::transport::{ClientMessage, Envelope, HolisticLandmarks, DEFAULT_ADDRESS};

#[derive(Parser, Debug)]
#[command(name = "replay_client", about = "Replay synthetic gestures against silentvoice")]
struct Cli {
    #[arg(long, default_value = DEFAULT_ADDRESS)]
    address: String,

    #[arg(long, default_value = "replay")]
    session: String,

    /// Frames per clip
    #[arg(long, default_value_t = 30)]
    frames: usize,

    /// Delay between frames in milliseconds
    #[arg(long, default_value_t = 33)]
    delay_ms: u64,
}

const CLIPS: [(&str, DemoShape, Trajectory); 4] = [
    ("fist hold", DemoShape::Fist, Trajectory::Hold),
    ("open wave", DemoShape::Open, Trajectory::Wave),
    ("pointing hold", DemoShape::Pointing, Trajectory::Hold),
    ("i-love-you hold", DemoShape::ILoveYou, Trajectory::Hold),
];

fn request(socket: &Socket, envelope: &Envelope) -> anyhow::Result<Vec<Value>> {
    let body = serde_json::to_vec(envelope)?;
    socket
        .send(body.as_slice())
        .map_err(|(_, err)| err)
        .context("sending request")?;
    let reply = socket.recv().context("waiting for reply")?;
    Ok(serde_json::from_slice(reply.as_slice())?)
}

fn print_events(events: &[Value]) {
    for event in events {
        println!("{}", event);
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "replay_client=info".into()),
        )
        .init();

    let socket = Socket::new(Protocol::Req0)?;
    socket
        .dial(&cli.address)
        .with_context(|| format!("dialing {}", cli.address))?;
    info!(address = %cli.address, session = %cli.session, "connected");

    print_events(&request(&socket, &Envelope::new(cli.session.as_str(), ClientMessage::Connect))?);

    let mut timestamp = 0.0;
    for (name, shape, kind) in CLIPS {
        info!(clip = name, frames = cli.frames, "replaying");
        for wrist in trajectory(kind, cli.frames, (0.5, 0.45)) {
            let message = ClientMessage::Holistic {
                data: HolisticLandmarks {
                    right_hand_landmarks: Some(synthetic_raw_hand(shape, wrist)),
                    ..Default::default()
                },
                timestamp: Some(timestamp),
            };
            print_events(&request(&socket, &Envelope::new(cli.session.as_str(), message))?);
            timestamp += cli.delay_ms as f64 / 1000.0;
            std::thread::sleep(Duration::from_millis(cli.delay_ms));
        }

        // hands down between clips
        let gap = ClientMessage::Landmarks {
            data: Default::default(),
        };
        print_events(&request(&socket, &Envelope::new(cli.session.as_str(), gap))?);
    }

    print_events(&request(
        &socket,
        &Envelope::new(cli.session.as_str(), ClientMessage::Sentence { clear: false }),
    )?);
    print_events(&request(&socket, &Envelope::new(cli.session.as_str(), ClientMessage::Disconnect))?);
    Ok(())
}
