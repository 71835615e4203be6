//! WebSocket client for the server channel.
//!
//! The channel carries internally tagged JSON messages in both directions.
//! One reader loop dispatches inbound messages; builds run on their own task
//! and push state reports through a channel drained by the same loop, so the
//! sink has a single writer.

use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use gale_protocol::{AgentMessage, BuildSpec, ServerMessage};

use crate::session::BuildSession;
use crate::{AgentError, Config};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Agent-side endpoint of the server channel.
pub struct Client {
    config: Config,
    http: reqwest::Client,
}

struct ActiveBuild {
    build_id: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Client {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Open the WebSocket channel.
    pub async fn connect(&self) -> crate::Result<WsStream> {
        info!("Connecting to server at {}", self.config.server_url);
        let (stream, _) = connect_async(self.config.server_url.as_str())
            .await
            .map_err(|e| AgentError::Connection(e.to_string()))?;
        Ok(stream)
    }

    /// Serve one connection until the channel ends. The caller owns the
    /// reconnect loop.
    pub async fn handle_stream(&self, ws: WsStream) -> crate::Result<()> {
        let (mut sink, mut stream) = ws.split();

        // State reports from the build task and protocol replies funnel
        // through one channel so this loop is the sink's only writer.
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<AgentMessage>(100);
        let mut active: Option<ActiveBuild> = None;

        self.send(&mut sink, &self.register_message()).await?;

        let mut ping = interval(Duration::from_millis(self.config.ping_interval_ms));
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                inbound = stream.next() => match inbound {
                    Some(Ok(Message::Text(text))) => {
                        self.handle_message(&text, &outbound_tx, &mut active);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        warn!("server closed the channel");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        return Err(AgentError::Connection(e.to_string()));
                    }
                },
                Some(report) = outbound_rx.recv() => {
                    if let Err(e) = self.send(&mut sink, &report).await {
                        warn!("state report lost: {e}");
                        break;
                    }
                }
                _ = ping.tick() => {
                    if let Err(e) = self.send(&mut sink, &AgentMessage::Ping).await {
                        warn!("ping failed: {e}");
                        break;
                    }
                }
            }
        }

        // Job state does not survive a lost channel; abort any build still
        // running.
        if let Some(active) = active.take() {
            active.cancel.cancel();
            let _ = active.handle.await;
        }
        Ok(())
    }

    fn handle_message(
        &self,
        text: &str,
        outbound: &mpsc::Sender<AgentMessage>,
        active: &mut Option<ActiveBuild>,
    ) {
        match serde_json::from_str::<ServerMessage>(text) {
            Ok(ServerMessage::Build(spec)) => self.start_build(spec, outbound, active),
            Ok(ServerMessage::Cancel { build_id }) => match active {
                Some(current) if current.build_id == build_id => {
                    warn!("cancelling build {build_id}");
                    current.cancel.cancel();
                }
                _ => debug!("cancel for build {build_id} ignored: not running"),
            },
            Ok(ServerMessage::Reregister) => {
                if outbound.try_send(self.register_message()).is_err() {
                    warn!("re-registration dropped: outbound queue full");
                }
            }
            Ok(ServerMessage::Ping) => debug!("server ping"),
            Err(e) => warn!("unparseable server message: {e}"),
        }
    }

    fn start_build(
        &self,
        spec: BuildSpec,
        outbound: &mpsc::Sender<AgentMessage>,
        active: &mut Option<ActiveBuild>,
    ) {
        if let Some(current) = active {
            if !current.handle.is_finished() {
                warn!(
                    "build {} rejected: build {} is still running",
                    spec.build_id, current.build_id
                );
                return;
            }
        }

        let cancel = CancellationToken::new();
        let config = self.config.clone();
        let http = self.http.clone();
        let reports = outbound.clone();
        let token = cancel.clone();
        let build_id = spec.build_id.clone();

        let handle = tokio::spawn(async move {
            let mut session = BuildSession::new(&config, http, &spec, reports, token);
            session.run(&spec.root).await;
        });

        *active = Some(ActiveBuild {
            build_id,
            cancel,
            handle,
        });
    }

    fn register_message(&self) -> AgentMessage {
        AgentMessage::Register {
            agent_id: self.config.agent_id.clone(),
            hostname: self.config.hostname.clone(),
        }
    }

    async fn send(&self, sink: &mut WsSink, message: &AgentMessage) -> crate::Result<()> {
        let json =
            serde_json::to_string(message).map_err(|e| AgentError::Connection(e.to_string()))?;
        sink.send(Message::Text(json))
            .await
            .map_err(|e| AgentError::Connection(e.to_string()))
    }
}
