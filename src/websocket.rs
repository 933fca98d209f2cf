//! # Voice WebSocket Handler
//!
//! Clients connect to `/ws`; each connection is one voice session.
//!
//! ## Actor Model:
//! Every connection is an independent actix actor. On start it spawns a
//! [`SessionController`] task and attaches the controller's outbound channel
//! to itself as a stream, so server messages are written to the socket in the
//! order the session produced them.
//!
//! ## Frames:
//! - **Binary** → one utterance, forwarded to the session untouched
//! - **Text** → forwarded to the session, which parses and answers errors
//! - **Ping/Pong** → heartbeat bookkeeping
//! - **Close** or protocol error → stop the actor, which drops the session

use crate::error::AppError;
use crate::pipeline::{SessionController, SessionHandle, SessionInput};
use crate::protocol::ServerMessage;
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, warn};

/// How often the server pings an idle client.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// WebSocket actor for one voice session.
pub struct VoiceSocket {
    state: AppState,

    /// Set in `started`, dropped in `stopped`
    session: Option<SessionHandle>,

    /// Last ping/pong seen from the client
    last_heartbeat: Instant,

    client_timeout: Duration,
}

impl VoiceSocket {
    pub fn new(state: AppState) -> Self {
        let client_timeout = Duration::from_secs(state.get_config().performance.client_timeout_secs);
        Self {
            state,
            session: None,
            last_heartbeat: Instant::now(),
            client_timeout,
        }
    }

    fn forward(&mut self, input: SessionInput, ctx: &mut ws::WebsocketContext<Self>) {
        let delivered = self
            .session
            .as_ref()
            .map(|session| session.send(input))
            .unwrap_or(false);
        if !delivered {
            warn!("Session task is gone, closing connection");
            ctx.stop();
        }
    }
}

impl Actor for VoiceSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let config = self.state.get_config();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        ctx.add_stream(UnboundedReceiverStream::new(outbound_rx));

        let session = SessionController::spawn(
            self.state.providers.clone(),
            config.pipeline,
            self.state.clone(),
            outbound_tx,
        );
        info!(session = %session.id(), "Voice session opened");
        self.session = Some(session);

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > act.client_timeout {
                warn!("WebSocket heartbeat timeout, closing connection");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(session) = self.session.take() {
            info!(session = %session.id(), "Voice session closed");
        }
        self.state.close_session();
    }
}

/// Messages produced by the session, written out as JSON text frames.
impl StreamHandler<ServerMessage> for VoiceSocket {
    fn handle(&mut self, msg: ServerMessage, ctx: &mut Self::Context) {
        ctx.text(msg.to_json());
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        debug!("Session output ended");
        ctx.stop();
    }
}

/// Frames arriving from the client.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for VoiceSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Binary(data)) => {
                debug!(bytes = data.len(), "Utterance frame received");
                self.forward(SessionInput::Audio(data.to_vec()), ctx);
            }
            Ok(ws::Message::Text(text)) => {
                self.forward(SessionInput::Text(text.to_string()), ctx);
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!("WebSocket closed: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!("WebSocket protocol error: {}", err);
                ctx.stop();
            }
        }
    }
}

/// WebSocket endpoint handler.
///
/// Refuses the upgrade with 503 once `max_concurrent_sessions` sessions are open.
pub async fn voice_websocket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let max_sessions = state.get_config().performance.max_concurrent_sessions;
    if !state.try_open_session(max_sessions) {
        warn!(max_sessions, "Refusing voice session, server is full");
        return Err(AppError::Unavailable(format!(
            "all {} voice sessions are in use",
            max_sessions
        )));
    }

    info!(peer = ?req.connection_info().peer_addr(), "New voice connection");

    ws::start(VoiceSocket::new(state.get_ref().clone()), &req, stream).map_err(|e| {
        state.close_session();
        AppError::BadRequest(format!("WebSocket handshake failed: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_rejects_when_full() {
        let state = test_support::state();
        let max = state.get_config().performance.max_concurrent_sessions;
        for _ in 0..max {
            assert!(state.try_open_session(max));
        }

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/ws", web::get().to(voice_websocket)),
        )
        .await;

        let req = test::TestRequest::get().uri("/ws").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(state.get_metrics_snapshot().sessions_rejected, 1);
    }

    #[actix_web::test]
    async fn test_failed_handshake_releases_slot() {
        let state = test_support::state();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/ws", web::get().to(voice_websocket)),
        )
        .await;

        // No upgrade headers, so the handshake is refused.
        let req = test::TestRequest::get().uri("/ws").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
        assert_eq!(state.get_metrics_snapshot().active_sessions, 0);
    }
}
