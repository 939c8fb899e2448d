use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use voxloop::api::ApiServerBuilder;
use voxloop::audio::{AudioSource, Microphone, SAMPLE_RATE, rms};
use voxloop::{Config, Orchestrator, SessionId};

/// voxloop - turn-based voice conversation orchestrator
#[derive(Parser)]
#[command(name = "voxloop", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/voxloop/config.toml)
    #[arg(short, long, env = "VOXLOOP_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Run a conversation turn in the terminal and print the result
    Turn {
        /// Keep taking turns until a stop command or a failure
        #[arg(long)]
        continuous: bool,
    },
    /// Speak the greeting and print the result
    Greeting,
    /// Delete all published audio files
    Sweep,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,voxloop=info",
        1 => "info,voxloop=debug",
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

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&Config::load(config_path)?, cli.port).await,
        Command::Turn { continuous } => take_turns(&Config::load(config_path)?, continuous).await,
        Command::Greeting => greeting(&Config::load(config_path)?).await,
        Command::Sweep => sweep(&Config::load(config_path)?),
        Command::TestMic { duration } => test_mic(duration).await,
    }
}

async fn serve(config: &Config, port: Option<u16>) -> anyhow::Result<()> {
    let port = port.unwrap_or(config.server.port);
    tracing::info!(port, model = %config.llm.model, "starting voxloop");

    let orchestrator = Orchestrator::from_config(config)?;

    // Leftovers from a previous run
    if let Err(e) = orchestrator.sweep() {
        tracing::warn!(error = %e, "startup sweep failed");
    }

    ApiServerBuilder::new(orchestrator)
        .port(port)
        .static_dir(config.server.static_dir.clone())
        .sweep_interval(config.server.sweep_interval)
        .build()
        .run()
        .await?;

    Ok(())
}

async fn take_turns(config: &Config, continuous: bool) -> anyhow::Result<()> {
    let mut orchestrator = Orchestrator::from_config(config)?;
    let session = SessionId::default_session();

    loop {
        println!("Listening...");
        let result = orchestrator.run_turn(&session).await;
        println!("{}", serde_json::to_string_pretty(&result)?);

        if result.is_failure() {
            anyhow::bail!("turn failed ({})", orchestrator.last_state());
        }
        if !continuous || result.should_stop() {
            return Ok(());
        }
    }
}

async fn greeting(config: &Config) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::from_config(config)?;
    let greeting = orchestrator.greeting().await?;
    println!("{}", serde_json::to_string_pretty(&greeting)?);
    Ok(())
}

fn sweep(config: &Config) -> anyhow::Result<()> {
    let publisher =
        voxloop::audio::AudioPublisher::new(&config.audio.public_dir, config.audio.url_prefix.clone())?;
    let removed = publisher.sweep()?;
    println!("Removed {removed} audio file(s) from {}", publisher.dir().display());
    Ok(())
}

/// Test microphone input
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");
    println!("Sample rate: {SAMPLE_RATE} Hz");
    println!("---");

    let mic: Arc<dyn AudioSource> = Arc::new(Microphone::new());

    for i in 0..duration {
        let source = Arc::clone(&mic);
        let samples =
            tokio::task::spawn_blocking(move || source.record(Duration::from_secs(1), SAMPLE_RATE))
                .await??;

        let energy = rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]", i + 1);
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}
