//! # Playback Queue
//!
//! Buffers synthesized chunks and plays exactly one at a time, in arrival order.
//!
//! ## Rules:
//! - a chunk arriving while idle starts immediately; while busy it waits in line
//! - a finished chunk (or one that failed to play) releases the next
//! - nothing plays until [`PlaybackQueue::unlock`] has succeeded once; chunks
//!   received before that wait and start draining on unlock
//!
//! A single play loop task exists while the queue is busy. It pops items under
//! the state lock and clears `playing` under the same lock when the queue runs
//! dry, so an enqueue can never be stranded between the two.

use crate::audio::{classify, AudioContainer};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, OnceCell};
use tracing::{debug, info, warn};

/// Where audio actually goes.
#[async_trait]
pub trait AudioOutput: Send + Sync + 'static {
    /// One-time preparation before the first playback.
    async fn unlock(&self) -> Result<()>;

    /// Play one payload to completion.
    async fn play(&self, audio: &[u8], container: AudioContainer) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioQueueItem {
    pub text: String,
    pub audio: Vec<u8>,
}

#[derive(Default)]
struct QueueState {
    items: VecDeque<AudioQueueItem>,
    playing: bool,
    completed: u64,
}

struct Inner {
    output: Arc<dyn AudioOutput>,
    state: Mutex<QueueState>,
    unlocked: OnceCell<()>,
    /// Mirrors "item playing or queue non-empty"
    speaking: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct PlaybackQueue {
    inner: Arc<Inner>,
}

impl PlaybackQueue {
    pub fn new(output: Arc<dyn AudioOutput>) -> Self {
        let (speaking, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                output,
                state: Mutex::new(QueueState::default()),
                unlocked: OnceCell::new(),
                speaking,
            }),
        }
    }

    /// Prepare the output once. Later calls are no-ops; a failed attempt may be retried.
    pub async fn unlock(&self) -> Result<()> {
        self.inner
            .unlocked
            .get_or_try_init(|| async {
                self.inner.output.unlock().await?;
                info!("Audio output unlocked");
                Ok::<(), anyhow::Error>(())
            })
            .await?;
        self.kick();
        Ok(())
    }

    pub fn is_unlocked(&self) -> bool {
        self.inner.unlocked.initialized()
    }

    /// Add a chunk at the tail; starts playback if the queue was idle.
    pub fn enqueue(&self, item: AudioQueueItem) {
        {
            let mut state = self.inner.state.lock().unwrap();
            state.items.push_back(item);
            self.inner.speaking.send_replace(true);
        }
        self.kick();
    }

    /// True while an item is playing or waiting to play.
    pub fn is_speaking(&self) -> bool {
        let state = self.inner.state.lock().unwrap();
        state.playing || !state.items.is_empty()
    }

    pub fn queued(&self) -> usize {
        self.inner.state.lock().unwrap().items.len()
    }

    /// Items whose playback has finished (successfully or not).
    pub fn completed(&self) -> u64 {
        self.inner.state.lock().unwrap().completed
    }

    /// Resolves once nothing is playing or queued.
    pub async fn wait_idle(&self) {
        let mut speaking = self.inner.speaking.subscribe();
        let _ = speaking.wait_for(|speaking| !*speaking).await;
    }

    /// Start the play loop unless it is already running or there is nothing to play.
    fn kick(&self) {
        if !self.is_unlocked() {
            return;
        }
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.playing || state.items.is_empty() {
                return;
            }
            state.playing = true;
        }
        tokio::spawn(play_loop(self.inner.clone()));
    }
}

async fn play_loop(inner: Arc<Inner>) {
    loop {
        let item = {
            let mut state = inner.state.lock().unwrap();
            match state.items.pop_front() {
                Some(item) => item,
                None => {
                    state.playing = false;
                    inner.speaking.send_replace(false);
                    return;
                }
            }
        };

        let container = classify(&item.audio);
        debug!(chars = item.text.len(), bytes = item.audio.len(), mime = container.mime_type(), "Playing chunk");
        if let Err(e) = inner.output.play(&item.audio, container).await {
            warn!(error = %e, "Playback failed, moving on");
        }

        inner.state.lock().unwrap().completed += 1;
    }
}
