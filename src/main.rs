use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

use lumen_voice::capture::{CaptureEvent, TransportSender, device_lost};
use lumen_voice::device::{self, AudioInput, MixerSink, OutputArbiter};
use lumen_voice::playback::ClipPlayer;
use lumen_voice::session::{ServerEvent, Transport, VoiceSession};
use lumen_voice::{Config, Result, TransportPacket};

/// Lumen - real-time voice duplex engine for AI assistants
#[derive(Parser)]
#[command(name = "lumen", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List audio devices
    Devices {
        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Record microphone audio to a WAV file
    Record {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Output file
        #[arg(short, long, default_value = "capture.wav")]
        out: PathBuf,
    },
    /// Play a WAV file through the single-clip player
    Play {
        /// 16-bit PCM WAV file
        file: PathBuf,
    },
    /// Run the full duplex path against a local echo transport
    Loopback {
        /// Duration in seconds
        #[arg(short, long, default_value = "10")]
        duration: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,lumen_voice=info",
        1 => "info,lumen_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Devices { json } => devices(json),
        Command::Record { duration, out } => record(duration, &out).await,
        Command::Play { file } => play(&file).await,
        Command::Loopback { duration } => loopback(duration).await,
    }
}

fn devices(json: bool) -> anyhow::Result<()> {
    let inventory = device::list_devices()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&inventory)?);
        return Ok(());
    }

    println!("Input devices:");
    for name in &inventory.inputs {
        println!("  {name}");
    }
    println!("Output devices:");
    for name in &inventory.outputs {
        println!("  {name}");
    }
    Ok(())
}

#[allow(clippy::future_not_send)]
async fn record(duration: u64, out: &PathBuf) -> anyhow::Result<()> {
    let config = Config::load()?;
    let rate = config.audio.capture_sample_rate;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut input = AudioInput::open(rate, config.audio.input_device.as_deref())?;
    input.start(config.audio.block_samples, tx)?;

    println!("Recording {duration}s at {rate} Hz...");

    let deadline = Instant::now() + Duration::from_secs(duration);
    let mut samples = Vec::new();
    loop {
        tokio::select! {
            () = tokio::time::sleep_until(deadline) => break,
            event = rx.recv() => match event {
                Some(CaptureEvent::Block(block)) => samples.extend_from_slice(&block),
                Some(CaptureEvent::DeviceLost(detail)) => anyhow::bail!(device_lost(&detail)),
                None => break,
            },
        }
    }
    input.stop();

    let wav = device::samples_to_wav(&samples, rate)?;
    std::fs::write(out, wav)?;
    println!("Wrote {} samples to {}", samples.len(), out.display());
    Ok(())
}

#[allow(clippy::future_not_send)]
async fn play(file: &PathBuf) -> anyhow::Result<()> {
    let config = Config::load()?;
    let frame = device::read_wav(file)?;
    let duration = frame.duration_secs();

    let arbiter = OutputArbiter::default();
    let lease = arbiter
        .lease()
        .ok_or_else(|| anyhow::anyhow!("output device is busy"))?;
    let (completions_tx, mut completions_rx) = mpsc::unbounded_channel();
    let sink = MixerSink::open(
        frame.sample_rate(),
        config.audio.output_device.clone(),
        completions_tx,
        lease,
    )?;

    let mut player = ClipPlayer::new(sink);
    player.play(frame)?;
    println!("Playing {} ({duration:.1}s)...", file.display());

    while let Some(id) = completions_rx.recv().await {
        if player.on_complete(id).is_some() {
            break;
        }
    }
    println!("Done");
    Ok(())
}

/// Echo transport: every capture packet comes straight back as a server
/// audio event, exercising encode, decode, and scheduling end to end.
struct LoopbackTransport {
    sample_rate: u32,
}

struct LoopbackSender {
    events: mpsc::UnboundedSender<ServerEvent>,
    sample_rate: u32,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn open(
        &self,
    ) -> Result<(Arc<dyn TransportSender>, mpsc::UnboundedReceiver<ServerEvent>)> {
        let (events, server_rx) = mpsc::unbounded_channel();
        let sender = Arc::new(LoopbackSender {
            events,
            sample_rate: self.sample_rate,
        });
        Ok((sender, server_rx))
    }
}

#[async_trait]
impl TransportSender for LoopbackSender {
    async fn send_frame(&self, packet: TransportPacket) -> Result<()> {
        let _ = self.events.send(ServerEvent::Audio {
            packet,
            sample_rate: self.sample_rate,
            channels: 1,
        });
        Ok(())
    }
}

#[allow(clippy::future_not_send)]
async fn loopback(duration: u64) -> anyhow::Result<()> {
    let config = Config::load()?;
    let rate = config.audio.capture_sample_rate;

    let arbiter = OutputArbiter::default();
    let lease = arbiter
        .lease()
        .ok_or_else(|| anyhow::anyhow!("output device is busy"))?;
    let (completions_tx, mut completions_rx) = mpsc::unbounded_channel();
    // The echo plays back at the capture rate, so one mixer covers both ends
    let sink = MixerSink::open(rate, config.audio.output_device.clone(), completions_tx, lease)?;

    let transport = LoopbackTransport { sample_rate: rate };
    let mut session = VoiceSession::new(sink, rate);
    let mut server_rx = session.connect(&transport).await?;
    session.on_remote_ready();

    let (capture_tx, mut capture_rx) = mpsc::unbounded_channel();
    let mut input = AudioInput::open(rate, config.audio.input_device.as_deref())?;
    input.start(config.audio.block_samples, capture_tx)?;

    println!("Loopback running for {duration}s; speak into the microphone...");

    let deadline = Instant::now() + Duration::from_secs(duration);
    loop {
        tokio::select! {
            () = tokio::time::sleep_until(deadline) => break,
            Some(event) = capture_rx.recv() => match event {
                CaptureEvent::Block(block) => {
                    session.on_capture_block(&block).await?;
                }
                CaptureEvent::DeviceLost(detail) => {
                    session.fail(&device_lost(&detail));
                    anyhow::bail!("capture device lost: {detail}");
                }
            },
            Some(event) = server_rx.recv() => session.on_server_event(event),
            Some(id) = completions_rx.recv() => session.on_playback_complete(id),
        }
    }

    input.stop();
    session.disconnect();
    println!("Loopback finished");
    Ok(())
}
