use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use voicelink::voice::{
    self, AudioCapture, AudioPlayback, FRAME_SAMPLES, FrameSource, PLAYBACK_SAMPLE_RATE,
    PlaybackSink, SAMPLE_RATE, SpeechStreamClient, VoiceClassifier,
};
use voicelink::{Config, Orchestrator, shutdown};

/// voicelink - talk to a language model, hands-free
#[derive(Parser)]
#[command(name = "voicelink", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/voicelink/config.toml)
    #[arg(short, long, env = "VOICELINK_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the conversation loop (default)
    Run,
    /// Test microphone input and voice detection
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Synthesize text and play it
    Speak {
        /// Text to speak
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,voicelink=info",
        1 => "info,voicelink=debug",
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
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => converse(&config).await,
        Command::TestMic { duration } => test_mic(&config, duration).await,
        Command::TestSpeaker => test_speaker().await,
        Command::Speak { text } => speak(&config, &text).await,
    }
}

/// Run the conversation loop until interrupted
#[allow(clippy::future_not_send)]
async fn converse(config: &Config) -> anyhow::Result<()> {
    let mut capture = AudioCapture::new()?;
    let playback = AudioPlayback::new()?;
    let mut orchestrator = Orchestrator::from_config(config, Box::new(playback))?;

    let token = CancellationToken::new();
    let _interrupt = shutdown::cancel_on_interrupt(token.clone());

    capture.start()?;
    tracing::info!("voicelink ready - start talking");

    let result = shutdown::run_until_shutdown(
        orchestrator.run(&mut capture, &token),
        token.clone(),
        config.shutdown_grace,
    )
    .await;

    capture.stop();

    match result {
        Some(result) => result?,
        None => tracing::info!("exiting without waiting for in-flight requests"),
    }

    Ok(())
}

/// Print per-second level and voice-activity ratio
#[allow(clippy::future_not_send)]
async fn test_mic(config: &Config, duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut classifier = voice::build_classifier(
        config.segmenter.classifier,
        SAMPLE_RATE,
        config.segmenter.energy_threshold,
    )?;

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    println!("Sample rate: {} Hz", capture.sample_rate());
    println!("---");

    let frames_per_second = SAMPLE_RATE as usize / FRAME_SAMPLES;

    for i in 0..duration {
        let mut samples = Vec::with_capacity(SAMPLE_RATE as usize);
        let mut voiced = 0usize;

        for _ in 0..frames_per_second {
            let frame = capture.next_frame().await?;
            if classifier
                .classify(SAMPLE_RATE, &frame.to_le_bytes())
                .unwrap_or(false)
            {
                voiced += 1;
            }
            samples.extend(frame.samples().iter().copied().map(voice::pcm::pcm16_to_f32));
        }

        let energy = voice::pcm::rms(&samples);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        #[allow(clippy::cast_precision_loss)]
        let ratio = voiced as f32 / frames_per_second as f32;

        println!(
            "[{:2}s] RMS: {:.4} | Voice: {:3.0}% | [{}]",
            i + 1,
            energy,
            ratio * 100.0,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If Voice stayed at 0% while talking, try:");
    println!("  1. segmenter.classifier = \"energy\" in the config file");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Try: pavucontrol (to check levels)");

    Ok(())
}

/// Play a 440Hz tone through the synthesis output path
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let mut playback = AudioPlayback::new()?;

    let frequency = 440.0_f32;
    let num_samples = PLAYBACK_SAMPLE_RATE as usize * 2;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<i16> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / PLAYBACK_SAMPLE_RATE as f32;
            voice::pcm::f32_to_pcm16((2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3)
        })
        .collect();

    println!(
        "Playing {} samples at {} Hz...",
        samples.len(),
        PLAYBACK_SAMPLE_RATE
    );

    playback.write(&voice::pcm::pcm16_to_bytes(&samples))?;
    playback.finish().await;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Send text straight to the synthesis stream
async fn speak(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Speaking: \"{text}\"\n");

    let client = SpeechStreamClient::new(
        config.synthesis.url.clone(),
        config.synthesis.language.clone(),
        config.synthesis.speed,
    )?;

    let mut playback = AudioPlayback::new()?;
    let end = client.speak(text, &mut playback).await?;
    playback.finish().await;

    println!("\n---");
    if end.is_success() {
        println!("If you heard the speech, synthesis is working!");
    } else {
        println!("Stream ended early: {end:?}");
    }

    Ok(())
}
