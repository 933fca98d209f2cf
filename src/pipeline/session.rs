//! # Session Controller
//!
//! One conversation, run as an isolated tokio task that owns its state and
//! turn history. The WebSocket actor forwards raw frames in through a
//! [`SessionHandle`] and relays [`ServerMessage`]s from the outbound channel.
//!
//! ## State machine:
//! ```text
//!   Idle ──listen──► Listening
//!   Idle | Listening ──utterance──► Processing
//!   Processing ──first sentence──► Speaking
//!   Processing | Speaking ──turn ended──► Idle
//! ```
//! `clear` is accepted in every state and never changes it. An utterance that
//! arrives while a turn is still Processing or Speaking is rejected.
//!
//! ## Turn lifecycle:
//! 1. transcription runs in a spawned task and reports back
//! 2. completion streaming runs in a spawned task that segments deltas and
//!    reports each sentence; the controller forwards them to the dispatcher
//! 3. once the stream has ended, a waiter reports when the dispatcher drains
//! 4. the assistant turn is committed and `Idle` is sent
//!
//! Background tasks report through an internal channel tagged with the turn id,
//! so every mutation of history and state happens on this task.

use super::dispatcher::SynthesisDispatcher;
use super::segmenter::SentenceSegmenter;
use super::{ConversationTurn, SentenceUnit};
use crate::audio::decode_pcm16_wav;
use crate::config::PipelineConfig;
use crate::error::PipelineResult;
use crate::protocol::{
    ClientMessage, Command, ServerMessage, STATUS_CLEARED, STATUS_IDLE, STATUS_LISTENING,
    STATUS_PROCESSING, STATUS_READY, STATUS_SPEAKING,
};
use crate::providers::{ChatCompleter, Providers};
use crate::state::AppState;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Listening,
    Processing,
    Speaking,
}

/// Things that move a session between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    ListenRequested,
    UtteranceReceived,
    FirstSentence,
    TurnEnded,
}

impl SessionState {
    /// The transition table. `None` means the event is not accepted in this state.
    pub fn on(self, event: SessionEvent) -> Option<SessionState> {
        use SessionEvent::*;
        use SessionState::*;

        match (self, event) {
            (Idle | Listening, ListenRequested) => Some(Listening),
            (Idle | Listening, UtteranceReceived) => Some(Processing),
            (Processing, FirstSentence) => Some(Speaking),
            (Processing | Speaking, TurnEnded) => Some(Idle),
            _ => None,
        }
    }

    pub fn is_busy(self) -> bool {
        matches!(self, SessionState::Processing | SessionState::Speaking)
    }
}

/// Raw input from the transport.
#[derive(Debug)]
pub enum SessionInput {
    /// A binary frame: one WAV-encoded utterance
    Audio(Vec<u8>),
    /// A text frame, parsed by the controller
    Text(String),
    /// Snapshot of the turn history
    History(oneshot::Sender<Vec<ConversationTurn>>),
}

/// Owner side of a running session. Dropping it stops the session.
pub struct SessionHandle {
    id: Uuid,
    inputs: mpsc::UnboundedSender<SessionInput>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns false once the session task has stopped.
    pub fn send(&self, input: SessionInput) -> bool {
        self.inputs.send(input).is_ok()
    }

    pub async fn history(&self) -> Option<Vec<ConversationTurn>> {
        let (tx, rx) = oneshot::channel();
        if !self.send(SessionInput::History(tx)) {
            return None;
        }
        rx.await.ok()
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// What a background turn task reports back.
#[derive(Debug)]
enum TurnEvent {
    Transcribed(PipelineResult<Option<String>>),
    Sentence(SentenceUnit),
    CompletionEnded(PipelineResult<()>),
    Drained,
}

#[derive(Debug)]
struct Tagged {
    turn: u64,
    event: TurnEvent,
}

/// Bookkeeping for the turn in progress.
struct ActiveTurn {
    id: u64,
    /// `clear` generation when the turn started
    epoch: u64,
    sentences: Vec<String>,
    failed: bool,
    task: Option<JoinHandle<()>>,
}

pub struct SessionController {
    id: Uuid,
    state: SessionState,
    history: Vec<ConversationTurn>,
    providers: Providers,
    config: PipelineConfig,
    app: AppState,
    dispatcher: SynthesisDispatcher,
    outbound: mpsc::UnboundedSender<ServerMessage>,
    events_tx: mpsc::UnboundedSender<Tagged>,
    turn: Option<ActiveTurn>,
    next_turn_id: u64,
    epoch: u64,
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(task) = self.turn.as_mut().and_then(|turn| turn.task.take()) {
            task.abort();
        }
    }
}

impl SessionController {
    /// Start a session task. Sends `ready` immediately.
    pub fn spawn(
        providers: Providers,
        config: PipelineConfig,
        app: AppState,
        outbound: mpsc::UnboundedSender<ServerMessage>,
    ) -> SessionHandle {
        let id = Uuid::new_v4();
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let dispatcher = SynthesisDispatcher::spawn(
            providers.synthesizer.clone(),
            outbound.clone(),
            config.synthesis_parallelism,
            Duration::from_secs(config.synthesis_timeout_secs),
            app.clone(),
        );

        let controller = SessionController {
            id,
            state: SessionState::Idle,
            history: Vec::new(),
            providers,
            config,
            app,
            dispatcher,
            outbound,
            events_tx,
            turn: None,
            next_turn_id: 0,
            epoch: 0,
        };

        let span = info_span!("session", id = %id);
        let task = tokio::spawn(controller.run(inputs_rx, events_rx).instrument(span));

        SessionHandle {
            id,
            inputs: inputs_tx,
            task,
        }
    }

    async fn run(
        mut self,
        mut inputs: mpsc::UnboundedReceiver<SessionInput>,
        mut events: mpsc::UnboundedReceiver<Tagged>,
    ) {
        info!("Session started");
        self.emit(ServerMessage::status(STATUS_READY));

        loop {
            tokio::select! {
                input = inputs.recv() => match input {
                    Some(input) => self.handle_input(input),
                    None => break,
                },
                Some(tagged) = events.recv() => self.handle_turn_event(tagged),
            }
        }

        info!(session = %self.id, turns = self.history.len(), "Session closed");
    }

    fn emit(&self, message: ServerMessage) {
        // The receiver only disappears when the connection is closing.
        let _ = self.outbound.send(message);
    }

    fn transition(&mut self, event: SessionEvent) -> bool {
        match self.state.on(event) {
            Some(next) => {
                debug!(from = ?self.state, to = ?next, ?event, "Session transition");
                self.state = next;
                true
            }
            None => false,
        }
    }

    fn handle_input(&mut self, input: SessionInput) {
        match input {
            SessionInput::Audio(bytes) => self.handle_utterance(bytes),
            SessionInput::Text(text) => match ClientMessage::parse(&text) {
                Ok(ClientMessage::Cmd { data: Command::Clear }) => self.clear(),
                Ok(ClientMessage::Cmd { data: Command::Listen }) => {
                    if self.transition(SessionEvent::ListenRequested) {
                        self.emit(ServerMessage::status(STATUS_LISTENING));
                    } else {
                        debug!(state = ?self.state, "Ignoring listen while a turn is active");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Malformed client message");
                    self.app.record_pipeline_error();
                    self.emit(ServerMessage::error(e.to_string()));
                }
            },
            SessionInput::History(reply) => {
                let _ = reply.send(self.history.clone());
            }
        }
    }

    fn clear(&mut self) {
        info!(turns = self.history.len(), "Clearing conversation");
        self.history.clear();
        self.epoch += 1;
        self.emit(ServerMessage::status(STATUS_CLEARED));
    }

    fn handle_utterance(&mut self, wav: Vec<u8>) {
        if !self.transition(SessionEvent::UtteranceReceived) {
            warn!(state = ?self.state, "Rejecting utterance while a turn is active");
            self.emit(ServerMessage::error(
                "Still responding to the previous utterance; wait for Idle before speaking again",
            ));
            return;
        }

        match decode_pcm16_wav(&wav) {
            Ok(decoded) => debug!(
                bytes = wav.len(),
                seconds = decoded.duration_seconds(),
                sample_rate = decoded.sample_rate,
                "Utterance received"
            ),
            Err(reason) => debug!(bytes = wav.len(), %reason, "Utterance is not canonical PCM16 WAV"),
        }

        self.emit(ServerMessage::status(STATUS_PROCESSING));

        let id = self.next_turn_id;
        self.next_turn_id += 1;

        let transcriber = self.providers.transcriber.clone();
        let events = self.events_tx.clone();
        let task = tokio::spawn(
            async move {
                let result = transcriber.transcribe(wav).await;
                let _ = events.send(Tagged {
                    turn: id,
                    event: TurnEvent::Transcribed(result),
                });
            }
            .in_current_span(),
        );

        self.turn = Some(ActiveTurn {
            id,
            epoch: self.epoch,
            sentences: Vec::new(),
            failed: false,
            task: Some(task),
        });
    }

    fn handle_turn_event(&mut self, tagged: Tagged) {
        let Some(turn) = self.turn.as_ref() else {
            debug!(turn = tagged.turn, "Event for a finished turn");
            return;
        };
        if turn.id != tagged.turn {
            debug!(turn = tagged.turn, current = turn.id, "Event for a stale turn");
            return;
        }

        match tagged.event {
            TurnEvent::Transcribed(result) => self.on_transcribed(result),
            TurnEvent::Sentence(unit) => self.on_sentence(unit),
            TurnEvent::CompletionEnded(result) => self.on_completion_ended(result),
            TurnEvent::Drained => self.on_drained(),
        }
    }

    fn on_transcribed(&mut self, result: PipelineResult<Option<String>>) {
        let text = match result {
            Ok(Some(text)) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                info!("Nothing recognizable in utterance");
                self.end_turn();
                return;
            }
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "Transcription failed");
                self.app.record_pipeline_error();
                self.emit(ServerMessage::error(e.to_string()));
                self.end_turn();
                return;
            }
        };

        info!(chars = text.len(), "Transcription received");
        self.emit(ServerMessage::text(text.clone()));

        let mut request = Vec::with_capacity(self.history.len() + 2);
        if !self.config.system_prompt.trim().is_empty() {
            request.push(ConversationTurn::system(self.config.system_prompt.clone()));
        }
        request.extend(self.history.iter().cloned());
        request.push(ConversationTurn::user(text.clone()));

        // A turn that straddles a clear leaves nothing in the new history.
        let cleared = self.turn.as_ref().map_or(false, |turn| turn.epoch != self.epoch);
        if !cleared {
            self.history.push(ConversationTurn::user(text));
        }

        let completer = self.providers.completer.clone();
        let events = self.events_tx.clone();
        let max_chars = self.config.max_sentence_chars;
        let Some(turn) = self.turn.as_mut() else {
            return;
        };
        let id = turn.id;

        turn.task = Some(tokio::spawn(
            async move {
                let result = stream_sentences(completer, request, max_chars, id, &events).await;
                let _ = events.send(Tagged {
                    turn: id,
                    event: TurnEvent::CompletionEnded(result),
                });
            }
            .in_current_span(),
        ));
    }

    fn on_sentence(&mut self, unit: SentenceUnit) {
        let Some(turn) = self.turn.as_mut() else {
            return;
        };
        let first = turn.sentences.is_empty();
        turn.sentences.push(unit.text.clone());

        if first && self.transition(SessionEvent::FirstSentence) {
            self.emit(ServerMessage::status(STATUS_SPEAKING));
        }
        debug!(sequence = unit.sequence, "Sentence ready for synthesis");
        self.dispatcher.submit(unit);
    }

    fn on_completion_ended(&mut self, result: PipelineResult<()>) {
        if let Err(e) = result {
            warn!(error = %e, kind = e.kind(), "Completion failed, reply will not be kept");
            self.app.record_pipeline_error();
            self.emit(ServerMessage::error(e.to_string()));
            if let Some(turn) = self.turn.as_mut() {
                turn.failed = true;
            }
        }

        let Some(turn) = self.turn.as_mut() else {
            return;
        };
        let id = turn.id;
        let drained = self.dispatcher.wait_idle();
        let events = self.events_tx.clone();
        turn.task = Some(tokio::spawn(
            async move {
                drained.await;
                let _ = events.send(Tagged {
                    turn: id,
                    event: TurnEvent::Drained,
                });
            }
            .in_current_span(),
        ));
    }

    fn on_drained(&mut self) {
        let Some(turn) = self.turn.take() else {
            return;
        };

        if turn.epoch != self.epoch {
            info!("Conversation was cleared during the turn, reply not kept");
        } else if !turn.failed && !turn.sentences.is_empty() {
            let reply = turn.sentences.join(" ");
            info!(sentences = turn.sentences.len(), chars = reply.len(), "Assistant turn committed");
            self.history.push(ConversationTurn::assistant(reply));
            self.app.record_turn_completed();
        }

        self.end_turn();
    }

    fn end_turn(&mut self) {
        self.turn = None;
        self.transition(SessionEvent::TurnEnded);
        self.emit(ServerMessage::status(STATUS_IDLE));
    }
}

/// Stream a completion, reporting each sentence as soon as it is complete.
async fn stream_sentences(
    completer: Arc<dyn ChatCompleter>,
    request: Vec<ConversationTurn>,
    max_chars: usize,
    turn: u64,
    events: &mpsc::UnboundedSender<Tagged>,
) -> PipelineResult<()> {
    let mut deltas = completer.complete_chat(request).await?;
    let mut segmenter = SentenceSegmenter::new(max_chars);

    let report = |unit: SentenceUnit| {
        let _ = events.send(Tagged {
            turn,
            event: TurnEvent::Sentence(unit),
        });
    };

    while let Some(delta) = deltas.next().await {
        let delta = delta?;
        for unit in segmenter.push(&delta) {
            report(unit);
        }
    }

    if let Some(unit) = segmenter.finish() {
        report(unit);
    }

    if segmenter.emitted() == 0 {
        debug!("Completion stream ended without any speakable text");
    }
    Ok(())
}
