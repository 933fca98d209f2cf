//! # Voice Client
//!
//! Speaks WAV files to a voice-turn-backend server, one utterance per file,
//! and plays the replies through an external player as they stream in.
//!
//! ```text
//! voice-client question1.wav question2.wav --url ws://127.0.0.1:8080/ws
//! ```

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voice_turn_backend::audio::encode_wav;
use voice_turn_backend::client::{CommandPlayer, PlaybackQueue, Speaker, VoiceConnection};
use voice_turn_backend::protocol::{
    Command, ServerMessage, STATUS_CLEARED, STATUS_IDLE, STATUS_LISTENING, STATUS_READY,
};

#[derive(Debug, Parser)]
#[command(name = "voice-client", version, about = "Send spoken utterances to a voice-turn-backend server")]
struct Args {
    /// WAV files to send, one utterance each, in order
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// WebSocket endpoint of the server
    #[arg(long, env = "VOICE_SERVER_URL", default_value = "ws://127.0.0.1:8080/ws")]
    url: String,

    /// Program used to play synthesized audio; the file path is appended
    #[arg(long, default_value = "ffplay")]
    player: String,

    /// Extra arguments for the player (defaults suit ffplay)
    #[arg(long = "player-arg", allow_hyphen_values = true)]
    player_args: Vec<String>,

    /// Clear the server-side conversation before the first utterance
    #[arg(long)]
    clear: bool,

    /// Seconds to wait for the server to finish one turn
    #[arg(long, default_value_t = 120)]
    turn_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_client=info,voice_turn_backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("installing tracing subscriber")?;

    let args = Args::parse();
    let turn_timeout = Duration::from_secs(args.turn_timeout_secs);

    let player = if args.player == "ffplay" && args.player_args.is_empty() {
        CommandPlayer::ffplay()
    } else {
        CommandPlayer::new(args.player.clone(), args.player_args.clone())
    };
    let queue = PlaybackQueue::new(Arc::new(player));

    let mut connection = VoiceConnection::connect(&args.url, queue.clone()).await?;
    connection.wait_for_status(STATUS_READY, Duration::from_secs(10)).await?;
    queue.unlock().await.context("preparing audio output")?;

    if args.clear {
        connection.send_command(Command::Clear).await?;
        connection.wait_for_status(STATUS_CLEARED, Duration::from_secs(10)).await?;
    }

    for path in &args.files {
        let owned = path.clone();
        let wav = tokio::task::spawn_blocking(move || load_utterance(&owned)).await??;
        info!(file = %path.display(), bytes = wav.len(), "Sending utterance");

        connection.send_command(Command::Listen).await?;
        connection.wait_for_status(STATUS_LISTENING, Duration::from_secs(10)).await?;
        connection.send_utterance(wav).await?;

        let messages = connection.wait_for_status(STATUS_IDLE, turn_timeout).await?;
        for message in &messages {
            if let ServerMessage::Error { text } = message {
                warn!(file = %path.display(), "Turn error: {}", text);
            }
        }
        queue.wait_idle().await;
    }

    let transcript = connection.transcript();
    for entry in transcript.lock().unwrap().entries() {
        let who = match entry.speaker {
            Speaker::User => "you",
            Speaker::Assistant => "assistant",
        };
        println!("{:>9}: {}", who, entry.text);
    }

    connection.close().await?;
    Ok(())
}

/// Read any PCM/float WAV file and re-encode it as canonical mono PCM16.
fn load_utterance(path: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let (header, data) = wav::read(&mut file).with_context(|| format!("reading {}", path.display()))?;

    let samples: Vec<f32> = match data {
        wav::BitDepth::Eight(samples) => samples.iter().map(|&s| (s as f32 - 128.0) / 128.0).collect(),
        wav::BitDepth::Sixteen(samples) => samples.iter().map(|&s| s as f32 / 32768.0).collect(),
        wav::BitDepth::TwentyFour(samples) => samples.iter().map(|&s| s as f32 / 8_388_608.0).collect(),
        wav::BitDepth::ThirtyTwoFloat(samples) => samples,
        _ => bail!("{} contains no audio samples", path.display()),
    };

    let channels = header.channel_count.max(1) as usize;
    let mono: Vec<f32> = samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();

    encode_wav(&mono, header.sampling_rate).map_err(|e| anyhow!("{}: {}", path.display(), e))
}
