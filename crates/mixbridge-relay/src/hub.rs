//! Relay and gating hub.
//!
//! The [`Hub`] is the single logical control flow of the bridge. One Tokio
//! task owns the [`ConsoleSession`] (and therefore the registry and the
//! liveness monitor) and multiplexes, with `tokio::select!`:
//!
//! - datagrams from the console link,
//! - the keep-alive, return-poll, meter-renewal and liveness-recompute
//!   intervals,
//! - client commands (attach, detach, requests) from [`HubHandle`]s,
//! - the one-shot recovery callback,
//! - shutdown via a [`CancellationToken`].
//!
//! Clients are represented by bounded outboxes. Broadcasts use `try_send`,
//! so a slow or vanished client never stalls the loop: a full outbox drops
//! the message, a closed one detaches the client.
//!
//! # Gating
//!
//! Control writes (`setFader`, `setMute`, `setBusAssignment`,
//! `toggleChannelMute`) are forwarded only while the session is LIVE, as
//! derived from receipt ages when the request is handled.
//! Otherwise the originating client alone receives
//! `error{code: SAFE_STATE_BLOCK}`. Accepted writes are validated next;
//! malformed ones are dropped without a reply. A write that reaches the
//! console is echoed to every client straight away.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use mixbridge_console::liveness::LivenessThresholds;
use mixbridge_console::session::{ConsoleSession, SessionOptions};
use mixbridge_core::error::{Error, Result};
use mixbridge_core::transport::ConsoleLink;
use mixbridge_core::types::TargetType;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::protocol::{ClientMessage, PROTOCOL_VERSION, ServerMessage};
use crate::schedule::ScheduledTask;

/// Receive buffer for console datagrams.
const RECV_BUFFER_SIZE: usize = 8192;

/// Capacity of the hub's command queue.
const COMMAND_CHANNEL_CAPACITY: usize = 256;

/// Default per-client outbox capacity.
pub const DEFAULT_CLIENT_BUFFER: usize = 256;

/// Pause after a failed console receive before trying again.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Identifier assigned to each attached client.
pub type ClientId = u64;

/// Options for the hub.
#[derive(Debug, Clone)]
pub struct HubOptions {
    pub session: SessionOptions,
    pub liveness: LivenessThresholds,
    /// Messages buffered per client before broadcasts to it are dropped.
    pub client_buffer: usize,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self {
            session: SessionOptions::default(),
            liveness: LivenessThresholds::default(),
            client_buffer: DEFAULT_CLIENT_BUFFER,
        }
    }
}

enum Command {
    Attach {
        id: ClientId,
        outbox: mpsc::Sender<ServerMessage>,
    },
    Detach {
        id: ClientId,
    },
    Request {
        id: ClientId,
        message: ClientMessage,
    },
    RecoveryDue {
        generation: u64,
    },
}

/// An attached client's end of the hub.
#[derive(Debug)]
pub struct ClientConnection {
    pub id: ClientId,
    /// Messages for this client, starting with the connect snapshot.
    pub outbox: mpsc::Receiver<ServerMessage>,
}

/// Cloneable handle for talking to a running [`Hub`].
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<Command>,
    next_id: Arc<AtomicU64>,
    client_buffer: usize,
}

impl HubHandle {
    async fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| Error::ConnectionLost)
    }

    /// Attach a new client. Its outbox receives the current state first.
    pub async fn attach(&self) -> Result<ClientConnection> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (outbox_tx, outbox) = mpsc::channel(self.client_buffer);
        self.send(Command::Attach {
            id,
            outbox: outbox_tx,
        })
        .await?;
        Ok(ClientConnection { id, outbox })
    }

    pub async fn detach(&self, id: ClientId) -> Result<()> {
        self.send(Command::Detach { id }).await
    }

    /// Submit a decoded client message on behalf of `id`.
    pub async fn request(&self, id: ClientId, message: ClientMessage) -> Result<()> {
        self.send(Command::Request { id, message }).await
    }
}

/// The bridge's central event loop.
pub struct Hub {
    link: Arc<dyn ConsoleLink>,
    session: ConsoleSession,
    options: HubOptions,
    clients: BTreeMap<ClientId, mpsc::Sender<ServerMessage>>,
    commands_tx: mpsc::Sender<Command>,
    recovery: Option<ScheduledTask>,
    recovery_generation: u64,
}

/// Spawn a hub on the current runtime.
///
/// The hub runs until `cancel` fires. Returns a handle for clients and the
/// hub's join handle.
pub fn spawn_hub(
    link: Arc<dyn ConsoleLink>,
    options: HubOptions,
    cancel: CancellationToken,
) -> (HubHandle, JoinHandle<()>) {
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let handle = HubHandle {
        tx: commands_tx.clone(),
        next_id: Arc::new(AtomicU64::new(1)),
        client_buffer: options.client_buffer.max(1),
    };

    let hub = Hub {
        session: ConsoleSession::new(link.clone(), options.session.clone(), options.liveness),
        link,
        options,
        clients: BTreeMap::new(),
        commands_tx,
        recovery: None,
        recovery_generation: 0,
    };

    let task = tokio::spawn(hub.run(commands_rx, cancel));
    (handle, task)
}

/// An interval whose first tick is one period from now.
fn periodic(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Receive errors that say nothing about the socket itself, such as an
/// ICMP port-unreachable surfacing on the next `recv_from`.
fn is_transient(error: &Error) -> bool {
    match error {
        Error::Io(e) => matches!(
            e.kind(),
            std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::Interrupted
        ),
        _ => false,
    }
}

fn log_send_error(what: &str, result: Result<()>) {
    if let Err(e) = result {
        tracing::warn!(what = what, error = %e, "Console send failed");
    }
}

impl Hub {
    async fn run(mut self, mut commands_rx: mpsc::Receiver<Command>, cancel: CancellationToken) {
        tracing::debug!("Hub starting");

        log_send_error("start", self.session.start().await);
        log_send_error("keepalive", self.session.send_keepalive().await);

        let session_options = self.options.session.clone();
        let mut keepalive = periodic(session_options.keepalive_interval);
        let mut poll = periodic(session_options.poll_interval);
        let mut renew = periodic(session_options.renew_interval);
        let mut recompute = periodic(self.options.liveness.recompute_interval);

        let link = self.link.clone();
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        // Receive pauses after a hard error without stalling the other arms.
        let backoff = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(backoff);
        let mut backing_off = false;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                result = link.recv(&mut buf), if !backing_off => match result {
                    Ok(n) => self.on_datagram(&buf[..n]),
                    Err(e) if is_transient(&e) => {
                        tracing::debug!(error = %e, "Console receive interrupted");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Console receive failed");
                        backoff.as_mut().reset(Instant::now() + RECV_ERROR_BACKOFF);
                        backing_off = true;
                    }
                },

                () = &mut backoff, if backing_off => backing_off = false,

                command = commands_rx.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => break,
                },

                _ = recompute.tick() => self.evaluate_liveness(),

                _ = keepalive.tick() => {
                    log_send_error("keepalive", self.session.send_keepalive().await);
                }

                _ = poll.tick() => {
                    log_send_error("poll", self.session.poll_returns().await);
                }

                _ = renew.tick() => {
                    log_send_error("renew", self.session.renew_meters().await);
                }
            }
        }

        self.cancel_recovery();
        tracing::debug!("Hub stopped");
    }

    // -----------------------------------------------------------------
    // Console side
    // -----------------------------------------------------------------

    fn on_datagram(&mut self, datagram: &[u8]) {
        let now = Instant::now().into_std();
        for event in self.session.ingest(datagram, now) {
            self.broadcast(event.into());
        }
        self.evaluate_liveness();
    }

    fn evaluate_liveness(&mut self) {
        let Some(transition) = self.session.evaluate_liveness(Instant::now().into_std()) else {
            return;
        };

        if transition.cancel_recovery {
            self.cancel_recovery();
        }
        if transition.schedule_recovery {
            self.schedule_recovery();
        }

        self.broadcast(self.session.liveness().event().into());
    }

    fn schedule_recovery(&mut self) {
        self.cancel_recovery();
        let generation = self.recovery_generation;
        let tx = self.commands_tx.clone();
        tracing::debug!(
            delay_ms = self.options.liveness.recovery_debounce.as_millis() as u64,
            "Scheduling recovery"
        );
        self.recovery = Some(ScheduledTask::after(
            self.options.liveness.recovery_debounce,
            async move {
                let _ = tx.send(Command::RecoveryDue { generation }).await;
            },
        ));
    }

    fn cancel_recovery(&mut self) {
        if let Some(task) = self.recovery.take() {
            if !task.is_finished() {
                tracing::debug!("Canceling pending recovery");
            }
            task.cancel();
        }
        self.recovery_generation += 1;
    }

    async fn on_recovery_due(&mut self, generation: u64) {
        if generation != self.recovery_generation {
            return;
        }
        // Leaving STALE here cancels the recovery and bumps the generation.
        self.evaluate_liveness();
        if generation != self.recovery_generation {
            return;
        }
        self.recovery = None;
        match self.session.run_scheduled_recovery().await {
            Ok(true) => tracing::info!("Recovery commands sent"),
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "Recovery send failed"),
        }
    }

    // -----------------------------------------------------------------
    // Client side
    // -----------------------------------------------------------------

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Attach { id, outbox } => {
                tracing::info!(client = id, "Client attached");
                self.clients.insert(id, outbox);
                self.send_snapshot(id);
            }
            Command::Detach { id } => {
                if self.clients.remove(&id).is_some() {
                    tracing::info!(client = id, "Client detached");
                }
            }
            Command::Request { id, message } => self.on_request(id, message).await,
            Command::RecoveryDue { generation } => self.on_recovery_due(generation).await,
        }
    }

    async fn on_request(&mut self, id: ClientId, message: ClientMessage) {
        tracing::trace!(client = id, message = ?message, "Client request");

        // Gate on the state as of now, not as of the last tick.
        self.evaluate_liveness();

        if message.is_control_write() {
            let state = self.session.state();
            if !state.permits_writes() {
                tracing::debug!(client = id, state = %state, "Blocking control write");
                self.send_to(id, ServerMessage::safe_state_block(state));
                return;
            }
        }

        match message {
            ClientMessage::Hello {
                client_id,
                protocol_version,
            } => {
                tracing::info!(
                    client = id,
                    client_id = client_id.as_deref().unwrap_or(""),
                    protocol_version = protocol_version,
                    "Client hello"
                );
                self.send_to(
                    id,
                    ServerMessage::Welcome {
                        protocol_version: PROTOCOL_VERSION,
                    },
                );
            }

            ClientMessage::RequestFullState => {
                log_send_error("full poll", self.session.poll_full().await);
                self.send_snapshot(id);
            }

            ClientMessage::RegisterTarget {
                target_type: TargetType::Channel,
                target_index,
            } => self.register_channel(id, target_index).await,

            ClientMessage::SetFader {
                target_index,
                value,
            } => {
                let Some(index) = self.target_index(id, target_index) else {
                    return;
                };
                let result = self.session.set_return_fader(index, value).await;
                self.finish_write(id, result.map(ServerMessage::ReturnState));
            }

            ClientMessage::SetMute { target_index, mute } => {
                let Some(index) = self.target_index(id, target_index) else {
                    return;
                };
                let result = self.session.set_return_mute(index, mute).await;
                self.finish_write(id, result.map(ServerMessage::ReturnState));
            }

            ClientMessage::SetBusAssignment {
                target_index,
                bus_slot,
                assigned,
            } => {
                let Some(index) = self.target_index(id, target_index) else {
                    return;
                };
                let result = self.session.set_return_bus(index, bus_slot, assigned).await;
                self.finish_write(id, result.map(ServerMessage::ReturnState));
            }

            ClientMessage::ToggleChannelMute {
                target_type: TargetType::Channel,
                target_index,
            } => {
                let Some(index) = self.target_index(id, target_index) else {
                    return;
                };
                let result = self.session.toggle_channel_mute(index).await;
                self.finish_write(id, result.map(ServerMessage::ChannelState));
            }
        }
    }

    fn target_index(&self, id: ClientId, raw: i64) -> Option<u8> {
        let index = u8::try_from(raw).ok();
        if index.is_none() {
            tracing::debug!(client = id, index = raw, "Dropping request with invalid index");
        }
        index
    }

    async fn register_channel(&mut self, id: ClientId, raw: i64) {
        let Some(index) = self.target_index(id, raw) else {
            return;
        };
        match self.session.register_channel(index).await {
            Ok(_) => {}
            Err(Error::InvalidParameter(reason)) => {
                tracing::debug!(client = id, reason = %reason, "Dropping registration");
                return;
            }
            Err(e) => tracing::warn!(client = id, error = %e, "Channel query failed"),
        }

        // Replay what is already known to the registering client.
        let known = self
            .session
            .registry()
            .channel(index)
            .map(|c| c.snapshot())
            .filter(|p| !p.is_empty());
        if let Some(patch) = known {
            self.send_to(id, ServerMessage::ChannelState(patch));
        }
    }

    /// Broadcast an accepted write's echo, or log why it was not sent.
    fn finish_write(&mut self, id: ClientId, result: Result<ServerMessage>) {
        match result {
            Ok(echo) => self.broadcast(echo),
            Err(Error::InvalidParameter(reason)) => {
                tracing::debug!(client = id, reason = %reason, "Dropping invalid control write");
            }
            Err(e) => {
                tracing::warn!(client = id, error = %e, "Control write failed");
            }
        }
    }

    // -----------------------------------------------------------------
    // Outbound to clients
    // -----------------------------------------------------------------

    fn snapshot(&self) -> Vec<ServerMessage> {
        let registry = self.session.registry();
        let mut messages = vec![self.session.liveness().event().into()];

        let names = registry.bus_names_snapshot();
        if !names.is_empty() {
            messages.push(ServerMessage::BusNames(names));
        }
        messages.extend(
            registry
                .return_snapshots()
                .into_iter()
                .map(ServerMessage::ReturnState),
        );
        messages.extend(
            registry
                .channel_snapshots()
                .into_iter()
                .map(ServerMessage::ChannelState),
        );
        messages
    }

    fn send_snapshot(&mut self, id: ClientId) {
        for message in self.snapshot() {
            self.send_to(id, message);
        }
    }

    /// Deliver to one client. Returns `false` if the client is gone.
    fn deliver(id: ClientId, outbox: &mpsc::Sender<ServerMessage>, message: ServerMessage) -> bool {
        match outbox.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(client = id, "Client outbox full, dropping message");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    fn send_to(&mut self, id: ClientId, message: ServerMessage) {
        let Some(outbox) = self.clients.get(&id) else {
            return;
        };
        if !Self::deliver(id, outbox, message) {
            tracing::debug!(client = id, "Client gone");
            self.clients.remove(&id);
        }
    }

    fn broadcast(&mut self, message: ServerMessage) {
        self.clients
            .retain(|&id, outbox| Self::deliver(id, outbox, message.clone()));
    }
}
