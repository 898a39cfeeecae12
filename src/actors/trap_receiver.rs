//! TrapReceiverActor - Accepts SNMP notifications from storage devices
//!
//! The actor owns the UDP socket and the alert source table. Decoding and
//! authentication run inline in the accept loop; normalization and export run
//! on a spawned task per notification, bounded by a semaphore, so one slow
//! device never holds up the others.
//!
//! ## Message Flow
//!
//! ```text
//! Datagram → decode → authenticate (source table) → attribute map → AlertProcessor
//!     ↑                                   └── v2c InformRequest → Response
//!     └─── Commands (AddSource, RemoveSource, GetStats, Shutdown)
//! ```

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tracing::{debug, info, instrument, trace, warn};

use super::messages::{TrapCommand, TrapStats};
use crate::alerts::AlertProcessor;
use crate::config::TrapReceiverConfig;
use crate::error::ConfigurationError;
use crate::snmp::attribute_map;
use crate::snmp::dictionary::Dictionary;
use crate::snmp::message::{CommunityMessage, Message, Version};
use crate::snmp::pdu::{Pdu, PduType};
use crate::snmp::security::{AlertSource, SourceTable};

/// Largest UDP payload
const MAX_DATAGRAM: usize = 65_535;

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    rejected: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    acknowledged: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> TrapStats {
        TrapStats {
            received: self.received.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            acknowledged: self.acknowledged.load(Ordering::Relaxed),
        }
    }
}

pub struct TrapReceiverActor {
    socket: UdpSocket,
    local_addr: SocketAddr,
    sources: SourceTable,
    dictionary: Arc<Dictionary>,
    processor: AlertProcessor,
    permits: Arc<Semaphore>,
    counters: Arc<Counters>,
    command_rx: mpsc::Receiver<TrapCommand>,
}

impl TrapReceiverActor {
    /// Loads the dictionaries, localises source credentials and binds the socket
    ///
    /// Any failure here means the listener cannot run.
    pub async fn configure(
        config: &TrapReceiverConfig,
        sources: Vec<AlertSource>,
        processor: AlertProcessor,
        command_rx: mpsc::Receiver<TrapCommand>,
    ) -> Result<Self, ConfigurationError> {
        let dictionary = Dictionary::load(&config.dictionary_path, &config.dictionaries)?;

        let mut table = SourceTable::new();
        for source in sources {
            let host = source.host;
            table
                .insert(source)
                .map_err(|e| ConfigurationError::Invalid(format!("alert source {host}: {e}")))?;
        }

        let addr = SocketAddr::new(config.address, config.port);
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| ConfigurationError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = socket.local_addr()?;

        debug!(
            %local_addr,
            sources = table.len(),
            objects = dictionary.len(),
            "trap receiver configured"
        );

        Ok(Self {
            socket,
            local_addr,
            sources: table,
            dictionary: Arc::new(dictionary),
            processor,
            permits: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            counters: Arc::new(Counters::default()),
            command_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run the actor's main loop
    ///
    /// Runs until a Shutdown command arrives or every handle is dropped. The
    /// socket is released before the shutdown is acknowledged.
    #[instrument(skip(self), fields(addr = %self.local_addr))]
    pub async fn run(mut self) {
        info!("trap receiver listening");

        let mut buf = vec![0u8; MAX_DATAGRAM];
        let mut shutdown_ack = None;

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, from)) => self.handle_datagram(&buf[..len], from).await,
                        Err(e) => warn!("failed to receive datagram: {e}"),
                    }
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(TrapCommand::AddSource { source, respond_to }) => {
                            let host = source.host;
                            let result = self.sources.insert(source);
                            match &result {
                                Ok(()) => info!(%host, "alert source added"),
                                Err(e) => warn!(%host, "rejected alert source: {e}"),
                            }
                            let _ = respond_to.send(result);
                        }

                        Some(TrapCommand::RemoveSource { host, respond_to }) => {
                            let removed = self.sources.remove(&host);
                            if removed.is_some() {
                                info!(%host, "alert source removed");
                            }
                            let _ = respond_to.send(removed);
                        }

                        Some(TrapCommand::GetStats { respond_to }) => {
                            let _ = respond_to.send(self.counters.snapshot());
                        }

                        Some(TrapCommand::Shutdown { respond_to }) => {
                            debug!("received shutdown command");
                            shutdown_ack = Some(respond_to);
                            break;
                        }

                        None => {
                            warn!("command channel closed, shutting down");
                            break;
                        }
                    }
                }
            }
        }

        let stats = self.counters.snapshot();
        drop(self);
        info!(
            received = stats.received,
            processed = stats.processed,
            "trap receiver stopped"
        );
        if let Some(ack) = shutdown_ack {
            let _ = ack.send(());
        }
    }

    /// Decodes and authenticates one datagram, then hands it off
    ///
    /// Every failure is logged and the datagram dropped; nothing here may
    /// end the accept loop.
    async fn handle_datagram(&self, datagram: &[u8], from: SocketAddr) {
        Counters::bump(&self.counters.received);

        let message = match Message::decode(datagram) {
            Ok(message) => message,
            Err(e) => {
                Counters::bump(&self.counters.rejected);
                warn!(%from, "dropping undecodable datagram: {e}");
                return;
            }
        };

        let inform_community = match &message {
            Message::Community(msg)
                if msg.version == Version::V2c && msg.pdu.pdu_type == PduType::InformRequest =>
            {
                Some(msg.community.clone())
            }
            _ => None,
        };

        let (ctx, pdu) = match self.sources.authenticate(from, datagram, message) {
            Ok(accepted) => accepted,
            Err(e) => {
                Counters::bump(&self.counters.rejected);
                warn!(%from, "dropping notification: {e}");
                return;
            }
        };

        if let Some(community) = inform_community {
            self.acknowledge(community, &pdu, from).await;
        }

        let attrs = attribute_map(&self.dictionary, &pdu.var_binds);
        trace!(%from, attributes = attrs.len(), "notification accepted");

        let Ok(permit) = self.permits.clone().acquire_owned().await else {
            return;
        };
        let processor = self.processor.clone();
        let counters = self.counters.clone();

        tokio::spawn(async move {
            let _permit = permit;
            match processor.process(&attrs, &ctx).await {
                Ok(_) => Counters::bump(&counters.processed),
                Err(e) => {
                    Counters::bump(&counters.failed);
                    warn!(
                        storage_id = %ctx.storage_id,
                        source = %ctx.source,
                        "dropping notification: {e}"
                    );
                }
            }
        });
    }

    async fn acknowledge(&self, community: Vec<u8>, inform: &Pdu, to: SocketAddr) {
        let response = CommunityMessage {
            version: Version::V2c,
            community,
            pdu: inform.response_to(),
        };
        match self.socket.send_to(&response.encode(), to).await {
            Ok(_) => {
                Counters::bump(&self.counters.acknowledged);
                trace!(%to, request_id = inform.request_id, "inform acknowledged");
            }
            Err(e) => warn!(%to, "failed to acknowledge inform: {e}"),
        }
    }
}

/// Handle for controlling a TrapReceiverActor
///
/// Cheap to clone; every clone talks to the same actor.
#[derive(Clone)]
pub struct TrapReceiverHandle {
    sender: mpsc::Sender<TrapCommand>,
    local_addr: SocketAddr,
}

impl TrapReceiverHandle {
    /// Configure the listener and start accepting on a tokio task
    pub async fn spawn(
        config: &TrapReceiverConfig,
        sources: Vec<AlertSource>,
        processor: AlertProcessor,
    ) -> Result<Self, ConfigurationError> {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let actor = TrapReceiverActor::configure(config, sources, processor, cmd_rx).await?;
        let local_addr = actor.local_addr();

        tokio::spawn(actor.run());

        Ok(Self {
            sender: cmd_tx,
            local_addr,
        })
    }

    /// Address the socket is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn add_source(&self, source: AlertSource) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(TrapCommand::AddSource {
                source,
                respond_to: tx,
            })
            .await
            .context("failed to send AddSource command")?;

        rx.await.context("failed to receive response")??;
        Ok(())
    }

    pub async fn remove_source(&self, host: IpAddr) -> Result<Option<AlertSource>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(TrapCommand::RemoveSource {
                host,
                respond_to: tx,
            })
            .await
            .context("failed to send RemoveSource command")?;

        rx.await.context("failed to receive response")
    }

    pub async fn stats(&self) -> Result<TrapStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(TrapCommand::GetStats { respond_to: tx })
            .await
            .context("failed to send GetStats command")?;

        rx.await.context("failed to receive response")
    }

    /// Stop accepting and release the socket
    ///
    /// Safe to call repeatedly and after the actor has already exited.
    pub async fn stop(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(TrapCommand::Shutdown { respond_to: tx })
            .await
            .is_err()
        {
            trace!("trap receiver already stopped");
            return;
        }
        let _ = rx.await;
    }

    pub fn is_stopped(&self) -> bool {
        self.sender.is_closed()
    }
}
