//! # Voice Connection
//!
//! Client side of `/ws`. A reader task applies every server message to the
//! transcript and playback queue, then hands it to the caller through
//! [`VoiceConnection::next_message`].

use super::playback::{AudioQueueItem, PlaybackQueue};
use super::transcript::Transcript;
use crate::protocol::{decode_audio, ClientMessage, Command, ServerMessage, STATUS_CLEARED};
use anyhow::{Context, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct VoiceConnection {
    sink: SplitSink<Socket, Message>,
    messages: mpsc::UnboundedReceiver<ServerMessage>,
    transcript: Arc<Mutex<Transcript>>,
    reader: JoinHandle<()>,
}

impl VoiceConnection {
    pub async fn connect(url: &str, queue: PlaybackQueue) -> Result<Self> {
        let (socket, response) = connect_async(url)
            .await
            .with_context(|| format!("connecting to {}", url))?;
        info!(url, status = %response.status(), "Connected");

        let (sink, stream) = socket.split();
        let (tx, messages) = mpsc::unbounded_channel();
        let transcript = Arc::new(Mutex::new(Transcript::new()));
        let reader = tokio::spawn(read_loop(stream, queue, transcript.clone(), tx));

        Ok(Self {
            sink,
            messages,
            transcript,
            reader,
        })
    }

    /// Send one WAV-encoded utterance.
    pub async fn send_utterance(&mut self, wav: Vec<u8>) -> Result<()> {
        debug!(bytes = wav.len(), "Sending utterance");
        self.sink.send(Message::Binary(wav.into())).await.context("sending utterance")
    }

    pub async fn send_command(&mut self, command: Command) -> Result<()> {
        let json = ClientMessage::Cmd { data: command }.to_json();
        self.sink.send(Message::Text(json.into())).await.context("sending command")
    }

    /// The next server message, or `None` once the connection has closed.
    pub async fn next_message(&mut self) -> Option<ServerMessage> {
        self.messages.recv().await
    }

    /// Wait for a specific status, returning every message seen on the way.
    pub async fn wait_for_status(&mut self, status: &str, timeout: Duration) -> Result<Vec<ServerMessage>> {
        let mut seen = Vec::new();
        tokio::time::timeout(timeout, async {
            while let Some(message) = self.next_message().await {
                let done = matches!(&message, ServerMessage::Status { text } if text == status);
                seen.push(message);
                if done {
                    return Ok(());
                }
            }
            anyhow::bail!("connection closed while waiting for status '{}'", status)
        })
        .await
        .with_context(|| format!("timed out waiting for status '{}'", status))??;
        Ok(seen)
    }

    pub fn transcript(&self) -> Arc<Mutex<Transcript>> {
        self.transcript.clone()
    }

    pub async fn close(mut self) -> Result<()> {
        self.sink.send(Message::Close(None)).await.context("closing connection")?;
        Ok(())
    }
}

impl Drop for VoiceConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(
    mut stream: SplitStream<Socket>,
    queue: PlaybackQueue,
    transcript: Arc<Mutex<Transcript>>,
    messages: mpsc::UnboundedSender<ServerMessage>,
) {
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(frame)) => {
                info!(?frame, "Server closed the connection");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "Connection error");
                break;
            }
        };

        let message: ServerMessage = match serde_json::from_str(&text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable server message");
                continue;
            }
        };

        apply_message(&message, &queue, &transcript);
        let _ = messages.send(message);
    }
}

/// Update the transcript and playback queue for one server message.
pub fn apply_message(message: &ServerMessage, queue: &PlaybackQueue, transcript: &Mutex<Transcript>) {
    match message {
        ServerMessage::Status { text } => {
            info!(status = %text, "Server status");
            if text == STATUS_CLEARED {
                transcript.lock().unwrap().clear();
            }
        }
        ServerMessage::Text { text } => {
            info!(text = %text, "You said");
            transcript.lock().unwrap().push_user(text.clone());
        }
        ServerMessage::Audio { text, audio } => {
            let audio = match decode_audio(audio) {
                Ok(audio) => audio,
                Err(e) => {
                    warn!(error = %e, "Dropping undecodable audio chunk");
                    return;
                }
            };
            info!(text = %text, "Assistant");
            // Sample before queueing so a fresh reply after silence starts a new entry.
            let speaking = queue.is_speaking();
            transcript.lock().unwrap().apply_speech(text, speaking);
            queue.enqueue(AudioQueueItem {
                text: text.clone(),
                audio,
            });
        }
        ServerMessage::Error { text } => warn!(error = %text, "Server reported an error"),
    }
}
