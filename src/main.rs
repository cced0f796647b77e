use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use screen_companion::capture::{CommandCapture, ScreenCapture};
use screen_companion::daemon::build_speech_gateway;
use screen_companion::voice::{AudioSource, CpalSink, SpeechBackend, SpeechSession};
use screen_companion::{Config, Daemon, LoadOptions};

/// Companion - an on-screen character that comments on what you are doing
#[derive(Parser)]
#[command(name = "companion", version, about)]
struct Cli {
    /// Character to start with (e.g., "kangel")
    #[arg(short, long, env = "COMPANION_CHARACTER")]
    character: Option<String>,

    /// Pause between commentary cycles, in milliseconds
    #[arg(long)]
    cycle_delay_ms: Option<u64>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable voice output (text only)
    #[arg(long, env = "COMPANION_DISABLE_VOICE")]
    disable_voice: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// List the available characters
    Characters,
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output in the current character's voice
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// Take one screenshot and save it
    Capture {
        /// Where to write the image
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,screen_companion=info",
        1 => "info,screen_companion=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
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
    let options = LoadOptions {
        character: cli.character,
        cycle_delay_ms: cli.cycle_delay_ms,
        disable_voice: cli.disable_voice,
    };

    // Handle subcommands
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Characters => list_characters(&options),
            Command::TestSpeaker => test_speaker().await,
            Command::TestTts { text } => test_tts(&options, &text).await,
            Command::Capture { path } => capture_once(&options, &path).await,
        };
    }

    let config = Config::load(&options)?;
    tracing::debug!(?config, "loaded configuration");
    tracing::info!(
        character = %config.character,
        cycle_delay = ?config.timing.cycle_delay,
        voice = config.voice.enabled,
        "starting companion"
    );

    let daemon = Daemon::new(&config)?;
    println!("Type to chat. Commands: /pause /resume /character <id> /characters /history /quit");

    daemon.run().await?;

    Ok(())
}

/// List the configured characters
fn list_characters(options: &LoadOptions) -> anyhow::Result<()> {
    let config = Config::load(options)?;
    for profile in &config.characters {
        let marker = if profile.id == config.character { "*" } else { " " };
        let voice = if profile.has_remote_voice() {
            "remote voice"
        } else {
            "fallback voice"
        };
        println!("{marker} {:<12} {:<16} {voice}", profile.id, profile.name);
    }
    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sink = CpalSink::new()?;

    let sample_rate = 24000_u32;
    let frequency = 440.0_f32;
    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..sample_rate * 2)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {sample_rate} Hz...", samples.len());

    let mut session = SpeechSession::new(0, SpeechBackend::Fallback);
    let completion = session.start(
        &sink,
        AudioSource::Pcm {
            samples,
            sample_rate,
        },
    )?;
    let outcome = completion
        .wait(tokio::time::Instant::now() + Duration::from_secs(10))
        .await;
    session.finish(outcome);

    println!("\n---");
    println!("Playback {outcome:?}.");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Speak `text` through the speech gateway
async fn test_tts(options: &LoadOptions, text: &str) -> anyhow::Result<()> {
    let config = Config::load(options)?;
    let character = config.roster()?.current();

    println!("Testing TTS as {} with text: \"{text}\"\n", character.name);

    let gateway = build_speech_gateway(&config)
        .ok_or_else(|| anyhow::anyhow!("voice is disabled or no audio output is available"))?;

    let report = gateway
        .speak(text, &character, &CancellationToken::new())
        .await;

    println!("\n---");
    println!("Result: {report:?}");

    Ok(())
}

/// Capture one screenshot to `path`
async fn capture_once(options: &LoadOptions, path: &std::path::Path) -> anyhow::Result<()> {
    let config = Config::load(options)?;
    let capture = match config.capture_command {
        Some(argv) => CommandCapture::new(argv)?,
        None => CommandCapture::platform_default(),
    };

    println!("Capturing with `{}`...", capture.program());
    let screenshot = capture.capture().await?;
    tokio::fs::write(path, screenshot.bytes()).await?;

    println!(
        "Wrote {} bytes ({}) to {}",
        screenshot.bytes().len(),
        screenshot.mime_type(),
        path.display()
    );
    Ok(())
}
