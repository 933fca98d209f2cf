//! # Ordered Speech Synthesis
//!
//! Turns sentence units into audio messages on the session's outbound channel,
//! always in submission order, whatever order the synthesis calls finish in.
//!
//! ## How ordering is kept:
//! Units flow through one long-lived task as a stream. `buffered(n)` polls up
//! to `n` synthesis futures at once but yields their outputs strictly in input
//! order, so a fast sentence 3 waits behind a slow sentence 2. With `n = 1` this
//! is a single in-order slot; larger `n` behaves as a reorder buffer.
//!
//! ## Failure policy:
//! A unit whose synthesis errors, times out, or returns no bytes is dropped and
//! logged. Later units are unaffected and the dispatcher keeps running.
//!
//! ## Drain detection:
//! A `watch` channel counts units submitted but not yet emitted or dropped.
//! The count is decremented only after the audio message has been queued on
//! the outbound channel, so "idle" means every chunk is already in front of
//! any status sent afterwards.

use super::{SentenceUnit, SpeechChunk};
use crate::protocol::ServerMessage;
use crate::providers::SpeechSynthesizer;
use crate::state::AppState;
use futures_util::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, warn};

/// Per-session synthesis queue. Dropping it aborts in-flight synthesis.
pub struct SynthesisDispatcher {
    units: mpsc::UnboundedSender<SentenceUnit>,
    pending: Arc<watch::Sender<usize>>,
    task: JoinHandle<()>,
}

impl SynthesisDispatcher {
    pub fn spawn(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        outbound: mpsc::UnboundedSender<ServerMessage>,
        parallelism: usize,
        timeout: Duration,
        state: AppState,
    ) -> Self {
        let (units_tx, units_rx) = mpsc::unbounded_channel();
        let (pending_tx, _) = watch::channel(0usize);
        let pending = Arc::new(pending_tx);

        let task = tokio::spawn(run(
            units_rx,
            synthesizer,
            outbound,
            pending.clone(),
            parallelism.max(1),
            timeout,
            state,
        ));

        Self {
            units: units_tx,
            pending,
            task,
        }
    }

    /// Queue a unit for synthesis behind everything submitted before it.
    pub fn submit(&self, unit: SentenceUnit) {
        self.pending.send_modify(|pending| *pending += 1);
        if self.units.send(unit).is_err() {
            warn!("Synthesis task has stopped, dropping sentence");
            self.pending.send_modify(|pending| *pending = pending.saturating_sub(1));
        }
    }

    /// Units submitted but not yet emitted or dropped.
    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Resolves once nothing is queued or in flight. The future does not
    /// borrow the dispatcher, so it can be awaited from another task.
    pub fn wait_idle(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut pending = self.pending.subscribe();
        async move {
            // A closed channel means the dispatcher is gone, which is idle too.
            let _ = pending.wait_for(|count| *count == 0).await;
        }
    }
}

impl Drop for SynthesisDispatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    units: mpsc::UnboundedReceiver<SentenceUnit>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    outbound: mpsc::UnboundedSender<ServerMessage>,
    pending: Arc<watch::Sender<usize>>,
    parallelism: usize,
    timeout: Duration,
    state: AppState,
) {
    let mut results = UnboundedReceiverStream::new(units)
        .map(move |unit| {
            let synthesizer = synthesizer.clone();
            async move {
                let outcome = tokio::time::timeout(timeout, synthesizer.synthesize(unit.text.clone())).await;
                (unit, outcome)
            }
        })
        .buffered(parallelism);

    while let Some((unit, outcome)) = results.next().await {
        match outcome {
            Ok(Ok(Some(audio))) if !audio.is_empty() => {
                let chunk = SpeechChunk {
                    sequence: unit.sequence,
                    text: unit.text,
                    audio,
                };
                debug!(sequence = chunk.sequence, bytes = chunk.audio.len(), "Emitting speech chunk");
                if outbound.send(ServerMessage::audio(&chunk)).is_ok() {
                    state.record_chunk_sent();
                }
            }
            Ok(Ok(_)) => {
                warn!(sequence = unit.sequence, "Synthesis produced no audio, dropping sentence");
                state.record_synthesis_dropped();
            }
            Ok(Err(e)) => {
                warn!(sequence = unit.sequence, error = %e, kind = e.kind(), "Synthesis failed, dropping sentence");
                state.record_synthesis_dropped();
            }
            Err(_) => {
                warn!(sequence = unit.sequence, timeout_secs = timeout.as_secs_f64(), "Synthesis timed out, dropping sentence");
                state.record_synthesis_dropped();
            }
        }
        pending.send_modify(|count| *count = count.saturating_sub(1));
    }
}
