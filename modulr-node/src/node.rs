// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use crate::{
    accounts::{AccountError, AccountManager},
    dispatcher,
    messages::ConsensusMsg,
    state::{NodeState, StateEvent},
    workers,
};
use modulr_config::{ChainEnv, ConfigError, NodeConfig, RunRules};
use modulr_consensus::{
    chain_store::ChainStore,
    finalization::FinalizationTracker,
    leader_rotation::RotationTracker,
    epoch_rollover::RolloverTracker,
    leader_schedule::derive_leaders_sequence,
};
use modulr_crypto::{CryptoHandler, Ed25519Handler, HashValue, KeyPair};
use modulr_infallible::{unix_millis, unix_secs, Mutex, RwLock};
use modulr_logger::prelude::*;
use modulr_mempool::CoreMempool;
use modulr_network::{TcpTransport, Transport};
use modulr_reliability::ReliabilityEngine;
use modulr_safety_rules::{PersistentSafetyStorage, SafetyRules};
use modulr_types::{
    account::AccountId,
    epoch::EpochHandler,
    thread_metadata::{ApprovementThreadMetadata, GenerationThreadMetadata},
};
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::Arc,
};
use thiserror::Error;
use tokio::{sync::mpsc, sync::watch, task::JoinHandle};

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("persisted state claims core version {persisted}, this build is {running}")]
    StaleCoreVersion { persisted: i64, running: i64 },
    #[error("identity failure: {0}")]
    Identity(#[from] AccountError),
    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
    #[error("runtime self-corruption detected")]
    SelfCorruption,
}

impl NodeError {
    /// CLI exit code: 1 for fatal configuration, 2 for self-corruption.
    pub fn exit_code(&self) -> i32 {
        match self {
            NodeError::SelfCorruption => 2,
            _ => 1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PeerInfo {
    pub last_seen_ms: u64,
    pub throttled_until_ms: u64,
}

/// The finalized frontier of the current epoch, shared by voters and the
/// rotation logic.
#[derive(Clone, Debug)]
pub struct FinalizedTip {
    pub next_index: u64,
    pub prev_hash: HashValue,
    pub last_time: u64,
}

/// Everything the worker tasks share. Single-writer rules from the
/// concurrency model apply per field: the mempool has one drainer, the
/// approvement snapshot is replaced only by the rollover path, trackers
/// belong to the inbox worker plus the cadence task that feeds them.
pub struct NodeContext {
    pub config: NodeConfig,
    pub network_id: String,
    pub chaindata: Arc<ChainStore>,
    pub handler: Arc<dyn CryptoHandler>,
    pub author: AccountId,
    pub keypair: KeyPair,
    pub safety: SafetyRules,
    pub run_rules: Option<RunRules>,

    pub mempool: Mutex<CoreMempool>,
    pub approvement: RwLock<Arc<ApprovementThreadMetadata>>,
    pub generation: Mutex<GenerationThreadMetadata>,
    pub reliability: Mutex<ReliabilityEngine>,
    pub state: Mutex<NodeState>,
    pub peers: Mutex<HashMap<SocketAddr, PeerInfo>>,

    pub finalized_tip: Mutex<FinalizedTip>,
    pub nonce_base: Mutex<HashMap<AccountId, u64>>,
    pub finalization: Mutex<FinalizationTracker>,
    pub rotation: Mutex<RotationTracker>,
    pub rollover: Mutex<RolloverTracker>,
}

impl NodeContext {
    /// Consistent copy-on-write snapshot of the approvement thread.
    pub fn approvement_snapshot(&self) -> Arc<ApprovementThreadMetadata> {
        self.approvement.read().clone()
    }

    /// Replaces the approvement snapshot; rollover path only.
    pub fn replace_approvement(&self, next: ApprovementThreadMetadata) {
        *self.approvement.write() = Arc::new(next);
    }

    pub fn touch_peer(&self, peer: SocketAddr) {
        let now = unix_millis();
        let mut peers = self.peers.lock();
        let entry = peers.entry(peer).or_insert(PeerInfo {
            last_seen_ms: now,
            throttled_until_ms: 0,
        });
        entry.last_seen_ms = now;
    }

    pub fn throttle_peer(&self, peer: SocketAddr, window_ms: u64) {
        let now = unix_millis();
        let mut peers = self.peers.lock();
        let entry = peers.entry(peer).or_insert(PeerInfo {
            last_seen_ms: now,
            throttled_until_ms: 0,
        });
        entry.throttled_until_ms = now + window_ms;
        debug!(peer = %peer, window_ms = window_ms, "Peer asked us to throttle");
    }

    pub fn advance_state(&self, event: StateEvent) -> NodeState {
        let mut state = self.state.lock();
        *state = state.advance(event);
        *state
    }

    pub fn current_state(&self) -> NodeState {
        *self.state.lock()
    }

    /// Admission gate for an enrolling peer, per the run-rules floors.
    pub fn admit_validator(&self, candidate: &str) -> bool {
        let floor = self
            .run_rules
            .as_ref()
            .map(|rules| rules.min_validator_score())
            .unwrap_or(modulr_config::DEFAULT_MIN_SCORE);
        self.reliability.lock().meets_threshold(candidate, floor)
    }

    pub fn admit_partner(&self, candidate: &str) -> bool {
        let floor = self
            .run_rules
            .as_ref()
            .map(|rules| rules.min_partner_score())
            .unwrap_or(modulr_config::DEFAULT_MIN_SCORE);
        self.reliability.lock().meets_threshold(candidate, floor)
    }
}

pub struct Node {
    ctx: Arc<NodeContext>,
    handles: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

/// Builds the genesis epoch handler from the genesis file's epoch section.
fn genesis_epoch(env: &ChainEnv) -> Option<EpochHandler> {
    let section = env.genesis.epoch.as_ref()?;
    let pools = section.pools.iter().cloned().collect();
    let hash = HashValue::sha256_of(format!("genesis{}", env.genesis.network_id).as_bytes());
    let leaders_sequence = if section.leaders_sequence.is_empty() {
        derive_leaders_sequence(&pools, &HashValue::zero(), &env.genesis.network_id, "genesis")
    } else {
        section.leaders_sequence.clone()
    };
    Some(EpochHandler {
        id: 0,
        hash,
        pools_registry: pools,
        quorum: section.quorum.clone(),
        leaders_sequence,
        start_timestamp: section.start_timestamp,
        current_leader_index: 0,
    })
}

impl Node {
    /// Brings the process from configuration to a runnable (not yet
    /// started) node: environment discovery, database recovery or genesis
    /// seeding, identity loading. Everything fatal happens here.
    pub fn init(config: NodeConfig, env: ChainEnv, run_rules: Option<RunRules>) -> Result<Node, NodeError> {
        let handler: Arc<dyn CryptoHandler> = Arc::new(Ed25519Handler::new());
        let network_id = env.genesis.network_id.clone();

        let chaindata = Arc::new(ChainStore::open(&env.chaindata_path, network_id.clone())?);
        let (generation, approvement) = chaindata.prepare(
            env.core_major_version,
            genesis_epoch(&env),
            env.genesis.network_parameters.clone(),
        )?;
        if approvement.is_core_version_old(env.core_major_version) {
            return Err(NodeError::StaleCoreVersion {
                persisted: approvement.core_major_version,
                running: env.core_major_version,
            });
        }

        let accounts = AccountManager::new(config.network.identity_dir.clone(), handler.clone());
        let (keypair, author) = accounts.load_or_create(&config.network.identity_label)?;
        info!(author = author.short_str(), network_id = %network_id, "Node identity loaded");

        let safety = SafetyRules::new(
            author.clone(),
            keypair.private.clone(),
            handler.clone(),
            PersistentSafetyStorage::on_disk(chaindata.db()),
            network_id.clone(),
        );

        let mempool = CoreMempool::new(config.consensus.mempool_capacity, 1, handler.clone());
        let (shutdown_tx, _) = watch::channel(false);

        let ctx = Arc::new(NodeContext {
            config,
            network_id,
            chaindata,
            handler,
            author,
            keypair,
            safety,
            run_rules,
            mempool: Mutex::new(mempool),
            approvement: RwLock::new(Arc::new(approvement)),
            generation: Mutex::new(generation),
            reliability: Mutex::new(ReliabilityEngine::default()),
            state: Mutex::new(NodeState::Discovery),
            peers: Mutex::new(HashMap::new()),
            finalized_tip: Mutex::new(FinalizedTip {
                next_index: 0,
                prev_hash: HashValue::zero(),
                last_time: 0,
            }),
            nonce_base: Mutex::new(HashMap::new()),
            finalization: Mutex::new(FinalizationTracker::new()),
            rotation: Mutex::new(RotationTracker::new()),
            rollover: Mutex::new(RolloverTracker::new()),
        });

        Ok(Node {
            ctx,
            handles: Vec::new(),
            shutdown_tx,
        })
    }

    pub fn context(&self) -> Arc<NodeContext> {
        self.ctx.clone()
    }

    /// Spawns the listener, the egress task and the six workers.
    pub async fn start(&mut self) -> Result<(), NodeError> {
        let shutdown_rx = self.shutdown_tx.subscribe();
        let (inbox_tx, inbox_rx) =
            mpsc::channel::<ConsensusMsg>(self.ctx.config.network.inbound_queue_size);
        let (outbound_tx, outbound_rx) =
            mpsc::channel::<ConsensusMsg>(self.ctx.config.consensus.channel_size);

        self.handles.push(tokio::spawn(listener_task(
            self.ctx.clone(),
            inbox_tx.clone(),
            shutdown_rx.clone(),
        )));
        self.handles.push(tokio::spawn(egress_task(
            self.ctx.clone(),
            outbound_rx,
            shutdown_rx.clone(),
        )));
        self.handles.extend(workers::spawn_all(
            self.ctx.clone(),
            inbox_rx,
            inbox_tx,
            outbound_tx,
            shutdown_rx,
        ));
        info!(workers = self.handles.len() as u64, "Node started");
        Ok(())
    }

    /// Cancels every task and awaits completion. The KV layer rolls back
    /// any in-flight batch on drop.
    pub async fn shutdown(mut self) {
        self.ctx.advance_state(StateEvent::GracefulShutdown);
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
        info!("Node stopped");
    }
}

async fn listener_task(
    ctx: Arc<NodeContext>,
    inbox_tx: mpsc::Sender<ConsensusMsg>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let addr = SocketAddr::new(ctx.config.network.listen_address, ctx.config.network.listen_port);
    let transport = TcpTransport;
    // Bind failures right after a restart are usually transient (the old
    // socket lingering in TIME_WAIT), so back off before giving up.
    let bound = modulr_retrier::retry_async(modulr_retrier::ExponentialBackoff::default(), || {
        transport.listen(addr)
    })
    .await;
    let mut listener = match bound {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %addr, error = %e, "Failed to bind listener");
            ctx.advance_state(StateEvent::FatalInvariant);
            return;
        }
    };

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            accepted = listener.accept() => {
                let (mut conn, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "Accept failed");
                        continue;
                    }
                };
                let ctx = ctx.clone();
                let inbox_tx = inbox_tx.clone();
                let mut shutdown_rx = shutdown_rx.clone();
                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            _ = shutdown_rx.changed() => break,
                            received = conn.recv() => match received {
                                Ok(Some(packet)) => {
                                    if let Some(reply) =
                                        dispatcher::dispatch(&ctx, &inbox_tx, peer, packet).await
                                    {
                                        if conn.send(&reply).await.is_err() {
                                            break;
                                        }
                                    }
                                }
                                Ok(None) => break,
                                Err(e) => {
                                    debug!(peer = %peer, error = %e, "Dropping connection");
                                    break;
                                }
                            }
                        }
                    }
                });
            }
        }
    }
}

/// Pushes consensus messages to every known validator, bounded by the RPC
/// deadline; a peer that does not answer in time is simply skipped this
/// round, which is exactly what leader rotation depends on.
async fn egress_task(
    ctx: Arc<NodeContext>,
    mut outbound_rx: mpsc::Receiver<ConsensusMsg>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let transport = TcpTransport;
    let deadline = std::time::Duration::from_millis(ctx.config.consensus.rpc_timeout_ms);
    let seeds: Vec<SocketAddr> = ctx
        .run_rules
        .as_ref()
        .map(|rules| {
            rules
                .known_validators()
                .iter()
                .filter_map(|seed| {
                    format!("{}:{}", seed.contact.ip, seed.contact.port).parse().ok()
                })
                .collect()
        })
        .unwrap_or_default();

    let mut heartbeat = tokio::time::interval(std::time::Duration::from_millis(
        ctx.config.consensus.worker_tick_ms,
    ));

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            _ = heartbeat.tick() => {
                // Dial every seed so discovery can count live peers.
                let header = modulr_network::PacketHeader::new(
                    crate::messages::WIRE_VERSION,
                    unix_secs(),
                    modulr_network::PacketType::Heartbeat as u16,
                    modulr_network::UserType::Validator,
                );
                let packet = modulr_network::WirePacket::new(header, Vec::new());
                for peer in &seeds {
                    if broadcast_one(&ctx, &transport, deadline, *peer, &packet).await {
                        ctx.touch_peer(*peer);
                    }
                }
            }
            msg = outbound_rx.recv() => {
                let msg = match msg {
                    Some(msg) => msg,
                    None => break,
                };
                let now_secs = unix_secs();
                let packet = match msg.into_packet(now_secs) {
                    Ok(packet) => packet,
                    Err(e) => {
                        error!(error = %e, "Failed to encode outbound message");
                        continue;
                    }
                };
                for peer in &seeds {
                    broadcast_one(&ctx, &transport, deadline, *peer, &packet).await;
                }
            }
        }
    }
}

/// One bounded send. Throttled peers are skipped; a peer that misses the
/// deadline counts as "no response" this round.
async fn broadcast_one(
    ctx: &Arc<NodeContext>,
    transport: &TcpTransport,
    deadline: std::time::Duration,
    peer: SocketAddr,
    packet: &modulr_network::WirePacket,
) -> bool {
    let throttled = {
        let peers = ctx.peers.lock();
        peers
            .get(&peer)
            .map(|info| info.throttled_until_ms > unix_millis())
            .unwrap_or(false)
    };
    if throttled {
        return false;
    }
    let send = async {
        let mut conn = transport.connect(peer).await?;
        conn.send(packet).await?;
        conn.disconnect().await
    };
    match tokio::time::timeout(deadline, send).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(peer = %peer, error = %e, "Send failed");
            false
        }
        Err(_) => {
            debug!(peer = %peer, "Send deadline expired");
            false
        }
    }
}
