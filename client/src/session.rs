//! Room Session
//!
//! Drives one user's membership in one room: the negotiation sequence up
//! front (capabilities, transports, producing, join), then a reactive loop
//! that subscribes to peer tracks as they appear and releases them as they
//! close. All transitions for a session run on a single task; the embedder
//! watches the session through a stream of [`AgentEvent`]s.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vv_proto::{
    ClientCommand, MediaKind, ProducerId, RoomId, RtpCapabilities, ServerEvent,
    TransportDirection, TransportId, UserId,
};

use crate::error::ClientError;
use crate::media::MediaBridge;
use crate::socket::{self, Socket};

/// How long to wait for the direct reply to a command.
const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// How long `leave` waits for the server's confirmation before giving up.
const LEAVE_GRACE: Duration = Duration::from_secs(1);

/// Where and who to join as.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Server base URL (`http://…` or `ws://…`).
    pub server_url: String,
    /// Room to join.
    pub room_id: RoomId,
    /// Identity to join under.
    pub user_id: UserId,
}

/// What the embedder sees of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// The negotiation sequence completed and the session is live.
    Joined,
    /// A peer track is attached and playing through the bridge.
    PeerMediaAdded {
        /// Publishing user.
        user_id: UserId,
        /// Producer the attached consumer forwards.
        producer_id: ProducerId,
        /// Track kind.
        kind: MediaKind,
    },
    /// A peer track went away and was detached. Paired with an earlier
    /// [`AgentEvent::PeerMediaAdded`] for the same producer; a producer
    /// that closes before its consumer attached is released silently.
    PeerMediaRemoved {
        /// The closed producer.
        producer_id: ProducerId,
    },
    /// The server answered something with an error; the session stays up.
    ServerError {
        /// Stable error code.
        code: String,
        /// Human-readable message.
        message: String,
    },
    /// The connection is gone. The server has already torn the session
    /// down; start a fresh one to rejoin.
    Disconnected,
}

/// A live membership in one room.
pub struct RoomSession {
    commands: mpsc::Sender<ClientCommand>,
    bridge: Arc<dyn MediaBridge>,
    room_id: RoomId,
    user_id: UserId,
    pump: JoinHandle<()>,
    reactor: JoinHandle<()>,
}

impl RoomSession {
    /// Connect to the server and join the room.
    ///
    /// Runs the full negotiation sequence: fetch capabilities, load the
    /// bridge, create and connect the send transport, publish every
    /// outgoing track, create and connect the receive transport, join, and
    /// request a consumer for each already-present peer track. Returns once
    /// the join is acknowledged; consumer attachments then surface as
    /// [`AgentEvent::PeerMediaAdded`].
    pub async fn connect(
        config: SessionConfig,
        bridge: Arc<dyn MediaBridge>,
    ) -> Result<(Self, mpsc::Receiver<AgentEvent>), ClientError> {
        let socket = socket::connect(&config.server_url).await?;
        Self::establish(socket, config, bridge).await
    }

    /// Run the negotiation over an already-open socket. The bridge is
    /// released if any step fails.
    async fn establish(
        socket: Socket,
        config: SessionConfig,
        bridge: Arc<dyn MediaBridge>,
    ) -> Result<(Self, mpsc::Receiver<AgentEvent>), ClientError> {
        match Self::negotiate(socket, config, Arc::clone(&bridge)).await {
            Ok(established) => Ok(established),
            Err(e) => {
                bridge.close().await;
                Err(e)
            }
        }
    }

    async fn negotiate(
        socket: Socket,
        config: SessionConfig,
        bridge: Arc<dyn MediaBridge>,
    ) -> Result<(Self, mpsc::Receiver<AgentEvent>), ClientError> {
        let Socket {
            commands,
            events,
            pump,
        } = socket;
        let mut negotiation = Negotiation {
            commands: commands.clone(),
            events,
            backlog: VecDeque::new(),
        };
        let room_id = config.room_id;
        let user_id = config.user_id;

        // Capabilities first; the bridge cannot load without them.
        negotiation.send(ClientCommand::GetCapabilities).await?;
        let router_capabilities = negotiation
            .wait_for("capabilities", |event| match event {
                ServerEvent::Capabilities { rtp_capabilities } => Ok(rtp_capabilities),
                other => Err(other),
            })
            .await?;
        bridge.load(router_capabilities).await?;
        let device_capabilities = bridge.rtp_capabilities();

        // Send side, skipped entirely for view-only agents.
        let tracks = bridge.outgoing_tracks();
        if !tracks.is_empty() {
            negotiation
                .send(ClientCommand::CreateTransport {
                    room_id: room_id.clone(),
                    user_id: user_id.clone(),
                    direction: TransportDirection::Send,
                })
                .await?;
            let transport = negotiation
                .wait_for("transport-created", |event| match event {
                    ServerEvent::TransportCreated {
                        direction: TransportDirection::Send,
                        transport,
                        ..
                    } => Ok(transport),
                    other => Err(other),
                })
                .await?;
            let dtls_parameters = bridge.bind_send_transport(&transport).await?;
            negotiation
                .send(ClientCommand::ConnectTransport {
                    room_id: room_id.clone(),
                    transport_id: transport.id.clone(),
                    dtls_parameters,
                })
                .await?;
            negotiation
                .wait_for("transport-connected", |event| match event {
                    ServerEvent::TransportConnected { .. } => Ok(()),
                    other => Err(other),
                })
                .await?;

            for track in tracks {
                negotiation
                    .send(ClientCommand::Produce {
                        room_id: room_id.clone(),
                        user_id: user_id.clone(),
                        transport_id: transport.id.clone(),
                        kind: track.kind,
                        rtp_parameters: track.rtp_parameters,
                    })
                    .await?;
                let (producer_id, kind) = negotiation
                    .wait_for("produced", |event| match event {
                        ServerEvent::Produced {
                            producer_id, kind, ..
                        } => Ok((producer_id, kind)),
                        other => Err(other),
                    })
                    .await?;
                info!(producer_id = %producer_id, kind = %kind, "Published track");
            }
        }

        // Receive side, always: even a silent agent consumes.
        negotiation
            .send(ClientCommand::CreateTransport {
                room_id: room_id.clone(),
                user_id: user_id.clone(),
                direction: TransportDirection::Recv,
            })
            .await?;
        let recv_transport = negotiation
            .wait_for("transport-created", |event| match event {
                ServerEvent::TransportCreated {
                    direction: TransportDirection::Recv,
                    transport,
                    ..
                } => Ok(transport),
                other => Err(other),
            })
            .await?;
        let dtls_parameters = bridge.bind_recv_transport(&recv_transport).await?;
        negotiation
            .send(ClientCommand::ConnectTransport {
                room_id: room_id.clone(),
                transport_id: recv_transport.id.clone(),
                dtls_parameters,
            })
            .await?;
        negotiation
            .wait_for("transport-connected", |event| match event {
                ServerEvent::TransportConnected { .. } => Ok(()),
                other => Err(other),
            })
            .await?;

        // Join. The reply snapshots every peer track that existed before
        // this point; anything newer arrives as a push.
        negotiation
            .send(ClientCommand::JoinRoom {
                room_id: room_id.clone(),
                user_id: user_id.clone(),
            })
            .await?;
        let existing = negotiation
            .wait_for("existing-producers", |event| match event {
                ServerEvent::ExistingProducers { producers, .. } => Ok(producers),
                other => Err(other),
            })
            .await?;
        info!(
            room_id = %room_id,
            user_id = %user_id,
            existing_producers = existing.len(),
            "Joined room"
        );

        // Request a consumer per snapshot entry. Inserting into the
        // consumed set at request time makes a racing push for the same
        // producer a no-op.
        let mut consumed = HashSet::new();
        let mut owners = HashMap::new();
        for info in existing {
            if consumed.insert(info.producer_id.clone()) {
                owners.insert(info.producer_id.clone(), info.user_id);
                negotiation
                    .send(ClientCommand::Consume {
                        room_id: room_id.clone(),
                        user_id: user_id.clone(),
                        transport_id: recv_transport.id.clone(),
                        producer_id: info.producer_id,
                        rtp_capabilities: device_capabilities.clone(),
                    })
                    .await?;
            }
        }

        let (agent_tx, agent_rx) = mpsc::channel(64);
        let reactor = Reactor {
            events: negotiation.events,
            backlog: negotiation.backlog,
            commands: commands.clone(),
            bridge: Arc::clone(&bridge),
            room_id: room_id.clone(),
            user_id: user_id.clone(),
            recv_transport_id: recv_transport.id,
            device_capabilities,
            consumed,
            owners,
            attached: HashSet::new(),
        };
        let reactor = tokio::spawn(reactor.run(agent_tx));

        Ok((
            Self {
                commands,
                bridge,
                room_id,
                user_id,
                pump,
                reactor,
            },
            agent_rx,
        ))
    }

    /// Room this session is in.
    #[must_use]
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Identity this session joined under.
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Leave the room and release the bridge.
    ///
    /// The leave command is best-effort: if the connection is already gone
    /// the server's disconnect detection has torn the session down anyway.
    /// The bridge is always released.
    pub async fn leave(mut self) {
        let _ = self
            .commands
            .send(ClientCommand::Leave {
                room_id: self.room_id.clone(),
                user_id: self.user_id.clone(),
            })
            .await;

        // Give the server a moment to confirm; the reactor ends on `left`.
        if tokio::time::timeout(LEAVE_GRACE, &mut self.reactor)
            .await
            .is_err()
        {
            self.reactor.abort();
        }
        self.pump.abort();
        self.bridge.close().await;
        debug!(room_id = %self.room_id, user_id = %self.user_id, "Session closed");
    }
}

/// Sequential request/reply phase over the raw event stream.
struct Negotiation {
    commands: mpsc::Sender<ClientCommand>,
    events: mpsc::Receiver<ServerEvent>,
    backlog: VecDeque<ServerEvent>,
}

impl Negotiation {
    async fn send(&self, command: ClientCommand) -> Result<(), ClientError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ClientError::Disconnected)
    }

    /// Wait for the direct reply to the last command. Room pushes arriving
    /// in between are backlogged for the reactive loop; an error event is
    /// the reply's failure form.
    async fn wait_for<T>(
        &mut self,
        what: &str,
        mut extract: impl FnMut(ServerEvent) -> Result<T, ServerEvent>,
    ) -> Result<T, ClientError> {
        loop {
            let event = tokio::time::timeout(REPLY_TIMEOUT, self.events.recv())
                .await
                .map_err(|_| ClientError::Protocol(format!("timed out waiting for {what}")))?
                .ok_or(ClientError::Disconnected)?;
            match extract(event) {
                Ok(value) => return Ok(value),
                Err(ServerEvent::Error { code, message }) => {
                    return Err(ClientError::Server { code, message });
                }
                Err(other) => self.backlog.push_back(other),
            }
        }
    }
}

/// The reactive phase: consumes pushes and late replies for the life of
/// the session.
struct Reactor {
    events: mpsc::Receiver<ServerEvent>,
    backlog: VecDeque<ServerEvent>,
    commands: mpsc::Sender<ClientCommand>,
    bridge: Arc<dyn MediaBridge>,
    room_id: RoomId,
    user_id: UserId,
    recv_transport_id: TransportId,
    device_capabilities: RtpCapabilities,
    /// Producers a consume was requested for. Checked before every
    /// request, so a snapshot entry and a push for the same producer yield
    /// one consumer.
    consumed: HashSet<ProducerId>,
    /// Producer to publishing user, for attach notifications.
    owners: HashMap<ProducerId, UserId>,
    /// Producers whose consumer reached the bridge. Only these detach and
    /// notify on close; a request still in flight has nothing to remove.
    attached: HashSet<ProducerId>,
}

impl Reactor {
    async fn run(mut self, agent: mpsc::Sender<AgentEvent>) {
        if agent.send(AgentEvent::Joined).await.is_err() {
            return;
        }

        loop {
            // Pushes backlogged during negotiation come first.
            let event = match self.backlog.pop_front() {
                Some(event) => event,
                None => match self.events.recv().await {
                    Some(event) => event,
                    None => {
                        let _ = agent.send(AgentEvent::Disconnected).await;
                        return;
                    }
                },
            };

            match event {
                ServerEvent::NewProducer {
                    producer_id,
                    user_id,
                    ..
                } => {
                    if self.consumed.insert(producer_id.clone()) {
                        self.owners.insert(producer_id.clone(), user_id);
                        if self.request_consume(&producer_id).await.is_err() {
                            let _ = agent.send(AgentEvent::Disconnected).await;
                            return;
                        }
                    }
                }
                ServerEvent::Consumed { consumer, .. } => {
                    let Some(owner) = self.owners.get(&consumer.producer_id).cloned() else {
                        debug!(
                            producer_id = %consumer.producer_id,
                            "Consumer for a producer we no longer track"
                        );
                        continue;
                    };
                    match self.bridge.attach_consumer(&owner, &consumer).await {
                        Ok(()) => {
                            self.attached.insert(consumer.producer_id.clone());
                            let added = AgentEvent::PeerMediaAdded {
                                user_id: owner,
                                producer_id: consumer.producer_id.clone(),
                                kind: consumer.kind,
                            };
                            if agent.send(added).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            warn!(
                                error = %e,
                                producer_id = %consumer.producer_id,
                                "Failed to attach consumer"
                            );
                            self.consumed.remove(&consumer.producer_id);
                            self.owners.remove(&consumer.producer_id);
                        }
                    }
                }
                ServerEvent::ProducerClosed { producer_id, .. } => {
                    let requested = self.consumed.remove(&producer_id);
                    self.owners.remove(&producer_id);
                    if self.attached.remove(&producer_id) {
                        self.bridge.detach_consumer(&producer_id).await;
                        if agent
                            .send(AgentEvent::PeerMediaRemoved { producer_id })
                            .await
                            .is_err()
                        {
                            return;
                        }
                    } else if requested {
                        // The consume was still in flight; the server's
                        // failure reply settles it. Nothing was attached,
                        // so nothing detaches or notifies.
                        debug!(
                            producer_id = %producer_id,
                            "Producer closed before its consumer attached"
                        );
                    }
                    // Unknown producers are a no-op.
                }
                ServerEvent::Error { code, message } => {
                    if agent
                        .send(AgentEvent::ServerError { code, message })
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                ServerEvent::Left { .. } => {
                    debug!(room_id = %self.room_id, "Leave confirmed");
                    return;
                }
                other => {
                    debug!(?other, "Ignoring out-of-phase event");
                }
            }
        }
    }

    async fn request_consume(&self, producer_id: &ProducerId) -> Result<(), ClientError> {
        self.commands
            .send(ClientCommand::Consume {
                room_id: self.room_id.clone(),
                user_id: self.user_id.clone(),
                transport_id: self.recv_transport_id.clone(),
                producer_id: producer_id.clone(),
                rtp_capabilities: self.device_capabilities.clone(),
            })
            .await
            .map_err(|_| ClientError::Disconnected)
    }
}
