//! Plays chunks through an external command-line player (`ffplay` by default).

use super::playback::AudioOutput;
use crate::audio::AudioContainer;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use tokio::process::Command;
use tracing::debug;
use uuid::Uuid;

pub struct CommandPlayer {
    program: String,
    args: Vec<String>,
    /// Scratch directory for payloads, created on unlock
    scratch: Mutex<Option<PathBuf>>,
}

impl CommandPlayer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            scratch: Mutex::new(None),
        }
    }

    /// `ffplay -nodisp -autoexit -loglevel quiet <file>`
    pub fn ffplay() -> Self {
        Self::new(
            "ffplay",
            ["-nodisp", "-autoexit", "-loglevel", "quiet"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }

    fn scratch_dir(&self) -> Option<PathBuf> {
        self.scratch.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioOutput for CommandPlayer {
    async fn unlock(&self) -> Result<()> {
        let dir = std::env::temp_dir().join(format!("voice-client-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating scratch directory {}", dir.display()))?;

        // Fail early if the player program is missing.
        let version_check = Command::new(&self.program)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Err(e) = version_check {
            let _ = tokio::fs::remove_dir_all(&dir).await;
            return Err(e).with_context(|| format!("audio player '{}' is not available", self.program));
        }

        *self.scratch.lock().unwrap() = Some(dir);
        Ok(())
    }

    async fn play(&self, audio: &[u8], container: AudioContainer) -> Result<()> {
        let Some(dir) = self.scratch_dir() else {
            bail!("audio output used before unlock");
        };
        let path = dir.join(format!("{}.{}", Uuid::new_v4(), container.extension()));
        tokio::fs::write(&path, audio)
            .await
            .with_context(|| format!("writing {}", path.display()))?;

        debug!(path = %path.display(), "Running audio player");
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(&path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        // The payload is transient whatever the outcome.
        let _ = tokio::fs::remove_file(&path).await;

        let status = status.with_context(|| format!("running {}", self.program))?;
        if !status.success() {
            bail!("{} exited with {}", self.program, status);
        }
        Ok(())
    }
}

impl Drop for CommandPlayer {
    fn drop(&mut self) {
        if let Some(dir) = self.scratch_dir() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_play_before_unlock_fails() {
        let player = CommandPlayer::new("true", Vec::new());
        assert!(player.play(b"RIFF", AudioContainer::Wav).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_plays_through_command_and_cleans_up() {
        let player = CommandPlayer::new("true", Vec::new());
        player.unlock().await.unwrap();
        player.play(b"ID3 payload", AudioContainer::Mpeg).await.unwrap();

        let dir = player.scratch_dir().unwrap();
        let leftovers = std::fs::read_dir(&dir).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_player_is_an_error() {
        let player = CommandPlayer::new("false", Vec::new());
        player.unlock().await.unwrap();
        assert!(player.play(b"data", AudioContainer::Wav).await.is_err());
    }
}
