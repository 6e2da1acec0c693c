use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::decision::types::TradingDecision;
use crate::decision::wire::{parse_frame, InboundMessage};
use crate::execution::executor::OrderExecutor;
use crate::execution::risk::RiskPolicy;
use crate::execution::types::{ExecutionStatus, OrderExecutionResult};
use crate::relay::connection::{Backoff, ConnectionState};
use crate::relay::events::RelayEvent;

type DecisionStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Gave up reconnecting after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
}

enum ListenOutcome {
    Shutdown,
    PeerClosed,
}

/// Resolves once the shutdown flag is raised or its sender is gone.
pub async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Sleep for `delay`; false if shutdown arrived first.
async fn pause(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = time::sleep(delay) => true,
        _ = shutdown_requested(shutdown) => false,
    }
}

/// Relays decisions from a single upstream source to an order executor.
///
/// Owns its connection for its whole lifetime; callers drive it through
/// [`DecisionRelay::run`] and stop it through the shutdown watch channel.
pub struct DecisionRelay {
    uri: String,
    state: ConnectionState,
    backoff: Backoff,
    policy: RiskPolicy,
    executor: Box<dyn OrderExecutor>,
    execution_timeout: Option<Duration>,
    events: mpsc::UnboundedSender<RelayEvent>,
}

impl DecisionRelay {
    pub fn new(
        uri: String,
        backoff: Backoff,
        policy: RiskPolicy,
        executor: Box<dyn OrderExecutor>,
        execution_timeout: Option<Duration>,
        events: mpsc::UnboundedSender<RelayEvent>,
    ) -> Self {
        Self {
            uri,
            state: ConnectionState::Disconnected,
            backoff,
            policy,
            executor,
            execution_timeout,
            events,
        }
    }

    pub fn from_config(
        config: &Config,
        executor: Box<dyn OrderExecutor>,
        events: mpsc::UnboundedSender<RelayEvent>,
    ) -> Self {
        Self::new(
            config.relay.uri.clone(),
            Backoff::new(&config.reconnect),
            RiskPolicy::new(config.risk.clone()),
            executor,
            config.relay.execution_timeout(),
            events,
        )
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn emit(&self, event: RelayEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        debug!("Connection state: {} -> {}", self.state, state);
        self.state = state;
        self.emit(RelayEvent::StateChanged(state));
    }

    /// Connect, listen and reconnect until shutdown or until the reconnect
    /// budget runs out.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), RelayError> {
        info!("Decision relay starting, source: {}", self.uri);

        loop {
            let attempt = tokio::select! {
                result = self.connect() => Some(result),
                _ = shutdown_requested(&mut shutdown) => None,
            };
            let Some(attempt) = attempt else { break };

            match attempt {
                Ok(stream) => match self.listen(stream, &mut shutdown).await {
                    ListenOutcome::Shutdown => break,
                    ListenOutcome::PeerClosed => {
                        self.set_state(ConnectionState::Disconnected);
                        let delay = self.backoff.initial_delay();
                        warn!("Decision source disconnected, reconnecting in {:?}", delay);
                        if !pause(delay, &mut shutdown).await {
                            break;
                        }
                    }
                },
                Err(e) => match self.backoff.next_delay() {
                    Some(delay) => {
                        warn!(
                            "Connection attempt {}/{} failed: {}. Retrying in {:?}",
                            self.backoff.attempts(),
                            self.backoff.max_attempts(),
                            e,
                            delay
                        );
                        if !pause(delay, &mut shutdown).await {
                            break;
                        }
                    }
                    None => {
                        let attempts = self.backoff.attempts();
                        error!(
                            "Connection attempt {} failed: {}. Reconnection exhausted, relay stays disconnected until restarted",
                            attempts, e
                        );
                        self.emit(RelayEvent::ReconnectExhausted { attempts });
                        return Err(RelayError::ReconnectExhausted { attempts });
                    }
                },
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!("Decision relay stopped");
        Ok(())
    }

    pub async fn connect(&mut self) -> Result<DecisionStream, RelayError> {
        self.set_state(ConnectionState::Connecting);
        info!("Connecting to decision source at {}", self.uri);

        match tokio_tungstenite::connect_async(self.uri.as_str()).await {
            Ok((stream, response)) => {
                debug!("Handshake status: {:?}", response.status());
                self.backoff.reset();
                self.set_state(ConnectionState::Connected);
                info!("✅ Connected to decision source");
                Ok(stream)
            }
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                Err(e.into())
            }
        }
    }

    async fn listen(
        &mut self,
        stream: DecisionStream,
        shutdown: &mut watch::Receiver<bool>,
    ) -> ListenOutcome {
        let (mut write, mut read) = stream.split();

        loop {
            tokio::select! {
                _ = shutdown_requested(shutdown) => {
                    info!("Shutdown requested, closing decision channel");
                    if let Err(e) = write.close().await {
                        debug!("Close handshake failed: {}", e);
                    }
                    return ListenOutcome::Shutdown;
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.handle_text(&text).await,
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(e) = write.send(Message::Pong(payload)).await {
                            warn!("Failed to answer ping: {}", e);
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        debug!("Dropping {} byte binary frame", data.len());
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!("Decision source closed the channel: {:?}", frame);
                        return ListenOutcome::PeerClosed;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        return ListenOutcome::PeerClosed;
                    }
                    None => return ListenOutcome::PeerClosed,
                },
            }
        }
    }

    async fn handle_text(&mut self, text: &str) {
        match parse_frame(text) {
            Ok(InboundMessage::TradingDecision(payload)) => match TradingDecision::try_from(payload) {
                Ok(decision) => self.process_decision(decision).await,
                Err(e) => {
                    warn!("Dropping invalid decision: {}", e);
                    self.emit(RelayEvent::DecisionRejected {
                        id: String::new(),
                        reason: e.to_string(),
                    });
                }
            },
            Ok(InboundMessage::Status(status)) => {
                info!(
                    "Source status at {}: connected={:?}, trading={:?}, total decisions={:?}",
                    status.timestamp.as_deref().unwrap_or("-"),
                    status.connected,
                    status.is_trading,
                    status.total_decisions
                );
                self.emit(RelayEvent::StatusReceived(status));
            }
            Ok(InboundMessage::Error(message)) => {
                error!("Decision source reported an error: {}", message);
                self.emit(RelayEvent::UpstreamError(message));
            }
            Ok(InboundMessage::Unknown(kind)) => {
                warn!("Ignoring frame of unknown type {:?}", kind);
            }
            Err(e) => {
                warn!("Dropping malformed frame: {}", e);
            }
        }
    }

    async fn process_decision(&mut self, decision: TradingDecision) {
        info!(
            "Decision {} received: {} {} @ {:.4} (buy {:.2} / sell {:.2}, fraction {:.4})",
            decision.id,
            decision.action,
            decision.symbol,
            decision.current_price,
            decision.probability_buy,
            decision.probability_sell,
            decision.position_fraction
        );
        self.emit(RelayEvent::DecisionReceived(decision.clone()));

        let adjusted = self.apply_risk_policy(&decision);
        if !self.is_valid(&adjusted) {
            return;
        }

        self.execute(&adjusted).await;
    }

    pub fn apply_risk_policy(&self, decision: &TradingDecision) -> TradingDecision {
        self.policy.apply(decision)
    }

    /// Rejections are logged and reported as `DecisionRejected`.
    pub fn is_valid(&self, decision: &TradingDecision) -> bool {
        match self.policy.validate(decision) {
            Ok(()) => true,
            Err(reason) => {
                info!("Decision {} rejected: {}", decision.id, reason);
                self.emit(RelayEvent::DecisionRejected {
                    id: decision.id.clone(),
                    reason: reason.to_string(),
                });
                false
            }
        }
    }

    /// Place an order for `decision`. FLAT decisions never reach the executor.
    pub async fn execute(&mut self, decision: &TradingDecision) -> Option<OrderExecutionResult> {
        if decision.is_flat() {
            debug!("Decision {} is FLAT, no order placed", decision.id);
            return None;
        }

        let result = match self.execution_timeout {
            Some(limit) => match time::timeout(limit, self.executor.execute(decision)).await {
                Ok(result) => result,
                Err(_) => OrderExecutionResult::failed(
                    String::new(),
                    decision,
                    &format!("execution timed out after {:?}", limit),
                ),
            },
            None => self.executor.execute(decision).await,
        };

        match result.status {
            ExecutionStatus::Filled => info!(
                "Order {} FILLED: {} {} size {:.4} @ {:.4}",
                result.order_id, result.action, result.symbol, result.position_size, result.execution_price
            ),
            ExecutionStatus::Failed => error!(
                "Order {} FAILED: {} {} - {}",
                result.order_id,
                result.action,
                result.symbol,
                result.error_message.as_deref().unwrap_or("unknown error")
            ),
        }

        self.emit(RelayEvent::OrderExecuted(result.clone()));
        Some(result)
    }
}
