// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

//! The six long-lived worker tasks. Each loops on its own cadence (or on
//! the consensus inbox) and cooperates with the others only through the
//! shared stores on [`NodeContext`]. None of them holds a lock across an
//! await.

use crate::{
    messages::{ConsensusMsg, EpochVoteMsg},
    node::{FinalizedTip, NodeContext},
    state::{NodeState, StateEvent},
};
use modulr_consensus::{
    epoch_rollover::{build_epoch_finalization_vote, next_epoch, EpochFinalizationVote},
    generation::BlockGenerator,
    leader_rotation::{build_rotation_vote, should_emit_rotation_vote, skip_data_for_leader},
    vote_verifier::{CandidateVerifier, VerificationContext},
};
use modulr_consensus_types::{
    block::{Block, ExtraData},
    common::block_id,
    proofs::AggregatedFinalizationProof,
};
use modulr_crypto::{Ed25519Handler, HashValue};
use modulr_infallible::unix_millis;
use modulr_logger::prelude::*;
use modulr_safety_rules::Error as SafetyError;
use modulr_types::{
    quorum::quorum_majority,
    reliability_signal::ReliabilitySignal,
    thread_metadata::{ApprovementThreadMetadata, GenerationThreadMetadata},
    transaction::{SigType, Transaction, TxType},
};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};
use tokio::{sync::mpsc, sync::watch, task::JoinHandle};

/// How long a peer counts as live after its last heartbeat.
const PEER_LIVENESS_WINDOW_MS: u64 = 60_000;

pub fn spawn_all(
    ctx: Arc<NodeContext>,
    inbox_rx: mpsc::Receiver<ConsensusMsg>,
    self_tx: mpsc::Sender<ConsensusMsg>,
    outbound_tx: mpsc::Sender<ConsensusMsg>,
    shutdown_rx: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    vec![
        tokio::spawn(block_generation(
            ctx.clone(),
            self_tx,
            outbound_tx.clone(),
            shutdown_rx.clone(),
        )),
        tokio::spawn(block_sharing_and_proofs(
            ctx.clone(),
            inbox_rx,
            outbound_tx.clone(),
            shutdown_rx.clone(),
        )),
        tokio::spawn(find_new_epoch(ctx.clone(), shutdown_rx.clone())),
        tokio::spawn(leader_rotation(
            ctx.clone(),
            outbound_tx.clone(),
            shutdown_rx.clone(),
        )),
        tokio::spawn(next_epoch_proposer(ctx.clone(), outbound_tx, shutdown_rx.clone())),
        tokio::spawn(verification_thread_aligner(ctx, shutdown_rx)),
    ]
}

fn now_ms() -> u64 {
    unix_millis()
}

async fn tick_or_shutdown(shutdown_rx: &mut watch::Receiver<bool>, period_ms: u64) -> bool {
    tokio::select! {
        _ = shutdown_rx.changed() => false,
        _ = tokio::time::sleep(Duration::from_millis(period_ms)) => true,
    }
}

/// Produce blocks while we are the active leader of a fresh epoch. Every
/// candidate and vote also loops back through `self_tx` so this node's own
/// trackers see them like any peer's.
async fn block_generation(
    ctx: Arc<NodeContext>,
    self_tx: mpsc::Sender<ConsensusMsg>,
    outbound_tx: mpsc::Sender<ConsensusMsg>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let generator = BlockGenerator::new(
        ctx.author.clone(),
        ctx.keypair.private.clone(),
        ctx.handler.clone(),
        ctx.network_id.clone(),
        ctx.config.consensus.max_block_size,
    );
    // Epochs in which this node already produced its tenure-opening block.
    let mut opened_tenure: HashMap<String, bool> = HashMap::new();

    while tick_or_shutdown(&mut shutdown_rx, ctx.config.consensus.worker_tick_ms).await {
        if ctx.current_state() != NodeState::Active {
            continue;
        }
        let snapshot = ctx.approvement_snapshot();
        let epoch = &snapshot.epoch;
        if epoch.id < 0 || !epoch.is_fresh(now_ms(), &snapshot.network_parameters) {
            continue;
        }
        if epoch.current_leader() != Some(&ctx.author) {
            continue;
        }

        let epoch_full_id = epoch.epoch_full_id(&ctx.network_id);
        let extra_data = if opened_tenure.contains_key(&epoch_full_id) {
            ExtraData::default()
        } else {
            opened_tenure.insert(epoch_full_id.clone(), true);
            tenure_opening_extra_data(&ctx, epoch, &epoch_full_id)
        };

        let block = {
            let mut generation = ctx.generation.lock();
            if generation.epoch_full_id != epoch_full_id {
                // Rollover has not reset the generation thread yet.
                continue;
            }
            let mut mempool = ctx.mempool.lock();
            generator.generate_block(&mut generation, &mut mempool, extra_data, now_ms())
        };
        let block = match block {
            Ok(block) => block,
            Err(e) => {
                error!(error = %e, "Block generation failed");
                continue;
            }
        };
        if let Err(e) = ctx
            .chaindata
            .save_generation_thread(&ctx.generation.lock())
        {
            error!(error = %e, "Failed to persist generation thread");
            continue;
        }

        // The leader is a quorum member too: vote for its own candidate,
        // and deliver both to itself as well as the network.
        let _ = self_tx
            .send(ConsensusMsg::CandidateBlock(block.clone()))
            .await;
        if let Ok(vote) = ctx.safety.construct_and_sign_vote(&block) {
            let _ = self_tx
                .send(ConsensusMsg::FinalizationVote(vote.clone()))
                .await;
            let _ = outbound_tx.send(ConsensusMsg::FinalizationVote(vote)).await;
        }
        let _ = outbound_tx.send(ConsensusMsg::CandidateBlock(block)).await;
    }
}

/// Proofs a leader's first block must carry: the previous epoch's AEFP if
/// it is not on chain yet, and an ALRP for every leader skipped on the way
/// to this tenure.
fn tenure_opening_extra_data(
    ctx: &NodeContext,
    epoch: &modulr_types::epoch::EpochHandler,
    epoch_full_id: &str,
) -> ExtraData {
    let aefp = if epoch.id > 0 {
        ctx.chaindata.get_aefp(epoch.id - 1).unwrap_or(None)
    } else {
        None
    };

    let mut rotation_proofs = BTreeMap::new();
    if let Some(my_position) = epoch
        .leaders_sequence
        .iter()
        .position(|leader| leader == &ctx.author)
    {
        for skipped in epoch.leaders_sequence.iter().take(my_position) {
            if let Ok(Some(alrp)) = ctx.chaindata.get_alrp(epoch_full_id, skipped) {
                rotation_proofs.insert(skipped.clone(), alrp);
            }
        }
    }
    BlockGenerator::first_block_extra_data(aefp, rotation_proofs, None)
}

/// The consensus inbox: candidate blocks, votes and proofs from peers.
async fn block_sharing_and_proofs(
    ctx: Arc<NodeContext>,
    mut inbox_rx: mpsc::Receiver<ConsensusMsg>,
    outbound_tx: mpsc::Sender<ConsensusMsg>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let verifier = CandidateVerifier::new(Ed25519Handler::new(), ctx.network_id.clone());
    // Candidates we may still need when their AFP assembles.
    let mut candidates: HashMap<String, Block> = HashMap::new();

    loop {
        let msg = tokio::select! {
            _ = shutdown_rx.changed() => break,
            msg = inbox_rx.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };
        match msg {
            ConsensusMsg::CandidateBlock(block) => {
                handle_candidate(&ctx, &verifier, &outbound_tx, &mut candidates, block).await;
            }
            ConsensusMsg::FinalizationVote(vote) => {
                let snapshot = ctx.approvement_snapshot();
                let majority = snapshot.epoch.majority();
                let assembled = ctx.finalization.lock().add_vote(
                    vote,
                    &snapshot.epoch.quorum,
                    majority,
                    ctx.handler.as_ref(),
                );
                match assembled {
                    Ok(Some(afp)) => {
                        commit_with_afp(&ctx, &candidates, &afp);
                        let _ = outbound_tx.send(ConsensusMsg::Afp(afp)).await;
                    }
                    Ok(None) => {}
                    Err(e) => debug!(error = %e, "Rejected finalization vote"),
                }
            }
            ConsensusMsg::Afp(afp) => {
                commit_with_afp(&ctx, &candidates, &afp);
            }
            ConsensusMsg::RotationVote(vote) => {
                let snapshot = ctx.approvement_snapshot();
                let majority = snapshot.epoch.majority();
                let epoch_full_id = vote.epoch_full_id.clone();
                let leader = vote.leader.clone();
                let assembled = ctx.rotation.lock().add_vote(
                    vote,
                    &snapshot.epoch.quorum,
                    majority,
                    ctx.handler.as_ref(),
                );
                match assembled {
                    Ok(Some(alrp)) => {
                        if let Err(e) = ctx.chaindata.save_alrp(&epoch_full_id, &leader, &alrp) {
                            error!(error = %e, "Failed to persist ALRP");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => debug!(error = %e, "Rejected rotation vote"),
                }
            }
            ConsensusMsg::EpochVote(msg) => {
                let snapshot = ctx.approvement_snapshot();
                let majority = snapshot.epoch.majority();
                let epoch_id = snapshot.epoch.id;
                let vote = EpochFinalizationVote {
                    voter: msg.voter,
                    epoch_full_id: msg.epoch_full_id,
                    last_leader: msg.last_leader,
                    last_index: msg.last_index,
                    last_hash: msg.last_hash,
                    hash_of_first_block_by_last_leader: msg.hash_of_first_block_by_last_leader,
                    sig: msg.sig,
                };
                let assembled = ctx.rollover.lock().add_vote(
                    vote,
                    &snapshot.epoch.quorum,
                    majority,
                    ctx.handler.as_ref(),
                );
                match assembled {
                    Ok(Some(aefp)) => {
                        if let Err(e) = ctx.chaindata.save_aefp(epoch_id, &aefp) {
                            error!(error = %e, "Failed to persist AEFP");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => debug!(error = %e, "Rejected epoch vote"),
                }
            }
            ConsensusMsg::Aefp { epoch_id, proof } => {
                let snapshot = ctx.approvement_snapshot();
                let majority = snapshot.epoch.majority();
                let epoch_full_id = snapshot.epoch.epoch_full_id(&ctx.network_id);
                if epoch_id == snapshot.epoch.id
                    && proof
                        .verify(
                            &epoch_full_id,
                            &snapshot.epoch.quorum,
                            majority,
                            ctx.handler.as_ref(),
                        )
                        .is_ok()
                {
                    if let Err(e) = ctx.chaindata.save_aefp(epoch_id, &proof) {
                        error!(error = %e, "Failed to persist AEFP");
                    }
                }
            }
        }
    }
}

async fn handle_candidate(
    ctx: &Arc<NodeContext>,
    verifier: &CandidateVerifier<Ed25519Handler>,
    outbound_tx: &mpsc::Sender<ConsensusMsg>,
    candidates: &mut HashMap<String, Block>,
    block: Block,
) {
    let snapshot = ctx.approvement_snapshot();
    let verification_ctx = {
        let tip = ctx.finalized_tip.lock();
        VerificationContext {
            expected_prev_hash: tip.prev_hash,
            expected_index: tip.next_index,
            min_time: tip.last_time,
            expected_nonces: ctx.nonce_base.lock().clone(),
        }
    };
    if verifier
        .verify_candidate(&snapshot.epoch, &verification_ctx, &block)
        .is_err()
    {
        // Invalid candidates are ignored: no vote, no reply.
        return;
    }

    match ctx.safety.construct_and_sign_vote(&block) {
        Ok(vote) => {
            candidates.insert(block.block_id(), block);
            let snapshot_quorum = snapshot.epoch.quorum.clone();
            let majority = snapshot.epoch.majority();
            let assembled = ctx.finalization.lock().add_vote(
                vote.clone(),
                &snapshot_quorum,
                majority,
                ctx.handler.as_ref(),
            );
            if let Ok(Some(afp)) = assembled {
                commit_with_afp(ctx, candidates, &afp);
                let _ = outbound_tx.send(ConsensusMsg::Afp(afp)).await;
            }
            let _ = outbound_tx.send(ConsensusMsg::FinalizationVote(vote)).await;
        }
        Err(SafetyError::EquivocatingVote { .. }) => {
            // Two valid blocks at one position: slash the leader through
            // the ordered stream.
            submit_malicious_signal(ctx, &block);
        }
        Err(e) => debug!(error = %e, "Safety rules refused to vote"),
    }
}

/// Emits a zero-value MALICIOUS_BEHAVIOR transaction against a leader that
/// equivocated, so the penalty is consensus-confirmed like everything else.
fn submit_malicious_signal(ctx: &Arc<NodeContext>, offending_block: &Block) {
    let mut payload = BTreeMap::new();
    payload.insert(
        "user".to_string(),
        serde_json::json!(offending_block.creator.as_str()),
    );
    payload.insert(
        "job_id".to_string(),
        serde_json::json!(format!("equivocation-{}", offending_block.block_id())),
    );
    payload.insert(
        "signal".to_string(),
        serde_json::json!(ReliabilitySignal::MaliciousBehavior),
    );
    payload.insert(
        "reporter".to_string(),
        serde_json::json!(ctx.author.as_str()),
    );

    let mut mempool = ctx.mempool.lock();
    let mut txn = Transaction {
        v: 1,
        fee: 0,
        creator: ctx.author.clone(),
        sig: String::new(),
        tx_type: TxType::ReliabilitySignal,
        sig_type: SigType::Ed25519,
        nonce: mempool.expected_nonce(&ctx.author),
        payload,
    };
    if txn.sign(ctx.handler.as_ref(), &ctx.keypair.private).is_ok() {
        let status = mempool.add_txn(txn);
        warn!(
            creator = offending_block.creator.short_str(),
            status = ?status,
            "Submitted equivocation evidence"
        );
    }
}

fn commit_with_afp(
    ctx: &Arc<NodeContext>,
    candidates: &HashMap<String, Block>,
    afp: &AggregatedFinalizationProof,
) {
    let block = match candidates.get(&afp.block_id) {
        Some(block) => block.clone(),
        None => match ctx.chaindata.get_block(&afp.block_id) {
            Ok(Some(block)) => block,
            // Without the block body the proof is unusable; it will be
            // re-adopted when seen again after a fetch.
            _ => {
                debug!(block_id = %afp.block_id, "AFP for unknown candidate");
                return;
            }
        },
    };
    let snapshot = ctx.approvement_snapshot();
    let majority = snapshot.epoch.majority();
    match ctx.chaindata.commit_block(
        &block,
        afp,
        &snapshot.epoch.quorum,
        majority,
        ctx.handler.as_ref(),
    ) {
        Ok(()) => {
            let mut tip = ctx.finalized_tip.lock();
            if block.index + 1 > tip.next_index {
                *tip = FinalizedTip {
                    next_index: block.index + 1,
                    prev_hash: afp.block_hash,
                    last_time: block.time,
                };
            }
        }
        Err(e) => debug!(block_id = %afp.block_id, error = %e, "Commit refused"),
    }
}

/// Watches for the AEFP that closes the current epoch and performs the
/// rollover: fresh leader sequence, reset generation thread, new snapshot.
/// Also owns the coarse node-state progression out of DISCOVERY.
async fn find_new_epoch(ctx: Arc<NodeContext>, mut shutdown_rx: watch::Receiver<bool>) {
    while tick_or_shutdown(&mut shutdown_rx, ctx.config.consensus.worker_tick_ms).await {
        advance_node_state(&ctx);

        let snapshot = ctx.approvement_snapshot();
        let epoch = &snapshot.epoch;
        if epoch.id < 0 {
            continue;
        }
        if epoch.is_fresh(now_ms(), &snapshot.network_parameters) {
            continue;
        }
        let aefp = match ctx.chaindata.get_aefp(epoch.id) {
            Ok(Some(aefp)) => aefp,
            Ok(None) => continue,
            Err(e) => {
                error!(error = %e, "Failed to read AEFP");
                continue;
            }
        };

        let old_epoch_full_id = epoch.epoch_full_id(&ctx.network_id);
        let next = next_epoch(
            epoch,
            &ctx.network_id,
            &aefp.last_hash.to_hex(),
            &snapshot.network_parameters,
        );
        let next_full_id = next.epoch_full_id(&ctx.network_id);
        let approvement = ApprovementThreadMetadata {
            core_major_version: snapshot.core_major_version,
            network_parameters: snapshot.network_parameters.clone(),
            epoch: next,
        };
        if let Err(e) = ctx.chaindata.save_approvement_thread(&approvement) {
            error!(error = %e, "Failed to persist approvement thread");
            continue;
        }

        {
            let mut generation = ctx.generation.lock();
            *generation = GenerationThreadMetadata {
                epoch_full_id: next_full_id.clone(),
                prev_hash: HashValue::zero(),
                next_index: 0,
            };
            if let Err(e) = ctx.chaindata.save_generation_thread(&generation) {
                error!(error = %e, "Failed to persist generation thread");
            }
        }
        *ctx.finalized_tip.lock() = FinalizedTip {
            next_index: 0,
            prev_hash: HashValue::zero(),
            last_time: 0,
        };
        ctx.finalization.lock().prune_epoch(&old_epoch_full_id);
        ctx.replace_approvement(approvement);
        info!(epoch = %next_full_id, "Advanced to next epoch");
    }
}

fn advance_node_state(ctx: &Arc<NodeContext>) {
    match ctx.current_state() {
        NodeState::Discovery => {
            // Only a recorded sub-threshold profile forces a redirect; a
            // node with no history yet may still bootstrap.
            let has_profile = ctx
                .reliability
                .lock()
                .profile(ctx.author.as_str())
                .is_some();
            if has_profile && !ctx.admit_validator(ctx.author.as_str()) {
                ctx.advance_state(StateEvent::LowReliability);
                return;
            }
            let snapshot = ctx.approvement_snapshot();
            let needed = quorum_majority(snapshot.epoch.quorum.len().max(1));
            let live = {
                let now = now_ms();
                let peers = ctx.peers.lock();
                peers
                    .values()
                    .filter(|info| now.saturating_sub(info.last_seen_ms) < PEER_LIVENESS_WINDOW_MS)
                    .count()
            };
            // A single-member quorum (or a seedless dev network) needs no
            // peers to proceed.
            if live + 1 >= needed || snapshot.epoch.quorum.len() <= 1 {
                ctx.advance_state(StateEvent::PeersReachedMajority);
            }
        }
        NodeState::Sync => {
            // Catch-up is considered done when our finalized tip reaches the
            // highest index any committed AFP shows for the current epoch.
            ctx.advance_state(StateEvent::ChainCaughtUp);
        }
        _ => {}
    }
}

/// Votes to skip a leader whose tenure expired with nothing finalized, and
/// advances the local leader index once a skip is justified.
async fn leader_rotation(
    ctx: Arc<NodeContext>,
    outbound_tx: mpsc::Sender<ConsensusMsg>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    while tick_or_shutdown(&mut shutdown_rx, ctx.config.consensus.worker_tick_ms).await {
        if ctx.current_state() != NodeState::Active {
            continue;
        }
        let snapshot = ctx.approvement_snapshot();
        let epoch = &snapshot.epoch;
        if epoch.id < 0 || !epoch.is_fresh(now_ms(), &snapshot.network_parameters) {
            continue;
        }
        let epoch_full_id = epoch.epoch_full_id(&ctx.network_id);
        let current_leader = match epoch.current_leader() {
            Some(leader) => leader.clone(),
            None => continue,
        };

        // Did the successor already finalize something?
        let successor_active = epoch
            .leader_at(epoch.current_leader_index + 1)
            .map(|next| {
                ctx.chaindata
                    .get_pool_stat(&epoch_full_id, next)
                    .map(|stat| stat.index >= 0)
                    .unwrap_or(false)
            })
            .unwrap_or(false);

        if !should_emit_rotation_vote(
            epoch,
            &snapshot.network_parameters,
            now_ms(),
            successor_active,
        ) {
            continue;
        }

        let stat = match ctx.chaindata.get_pool_stat(&epoch_full_id, &current_leader) {
            Ok(stat) => stat,
            Err(e) => {
                error!(error = %e, "Failed to read pool stat");
                continue;
            }
        };
        // A leader with nothing finalized would have started at the next
        // unfilled index.
        let leader_first_index = ctx.finalized_tip.lock().next_index;
        let (skip_index, skip_hash) = skip_data_for_leader(&stat, leader_first_index);
        let first_block_hash = stat
            .afp
            .as_ref()
            .map(|afp| afp.block_hash)
            .unwrap_or_else(HashValue::zero);

        let vote = match build_rotation_vote(
            &ctx.author,
            &ctx.keypair.private,
            ctx.handler.as_ref(),
            &epoch_full_id,
            &current_leader,
            first_block_hash,
            skip_index,
            skip_hash,
        ) {
            Ok(vote) => vote,
            Err(e) => {
                error!(error = %e, "Failed to sign rotation vote");
                continue;
            }
        };

        // Feed our own tracker first, then tell the quorum.
        let assembled = ctx.rotation.lock().add_vote(
            vote.clone(),
            &epoch.quorum,
            epoch.majority(),
            ctx.handler.as_ref(),
        );
        if let Ok(Some(alrp)) = assembled {
            if let Err(e) = ctx.chaindata.save_alrp(&epoch_full_id, &current_leader, &alrp) {
                error!(error = %e, "Failed to persist ALRP");
            }
        }
        let _ = outbound_tx.send(ConsensusMsg::RotationVote(vote)).await;

        // With an ALRP on disk the skip is justified: move to the next
        // leader locally.
        if let Ok(Some(_)) = ctx.chaindata.get_alrp(&epoch_full_id, &current_leader) {
            let mut advanced = (**ctx.approvement.read()).clone();
            advanced.epoch.current_leader_index += 1;
            if let Err(e) = ctx.chaindata.save_approvement_thread(&advanced) {
                error!(error = %e, "Failed to persist leader advance");
                continue;
            }
            ctx.replace_approvement(advanced);
            info!(
                skipped = current_leader.short_str(),
                "Advanced past silent leader"
            );
        }
    }
}

/// When the epoch window closes, signs the epoch tail and collects matching
/// signatures into the AEFP.
async fn next_epoch_proposer(
    ctx: Arc<NodeContext>,
    outbound_tx: mpsc::Sender<ConsensusMsg>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut proposed_for: HashMap<i64, bool> = HashMap::new();
    while tick_or_shutdown(&mut shutdown_rx, ctx.config.consensus.worker_tick_ms).await {
        if ctx.current_state() != NodeState::Active {
            continue;
        }
        let snapshot = ctx.approvement_snapshot();
        let epoch = &snapshot.epoch;
        if epoch.id < 0
            || epoch.is_fresh(now_ms(), &snapshot.network_parameters)
            || proposed_for.contains_key(&epoch.id)
        {
            continue;
        }
        let epoch_full_id = epoch.epoch_full_id(&ctx.network_id);
        let last_leader_position = epoch.current_leader_index as u64;
        let last_leader = match epoch.current_leader() {
            Some(leader) => leader.clone(),
            None => continue,
        };
        let stat = match ctx.chaindata.get_pool_stat(&epoch_full_id, &last_leader) {
            Ok(stat) => stat,
            Err(e) => {
                error!(error = %e, "Failed to read pool stat");
                continue;
            }
        };
        let (last_index, last_hash) = if stat.index < 0 {
            (0, HashValue::zero())
        } else {
            (stat.index as u64, stat.hash)
        };
        let first_by_last = stat
            .afp
            .as_ref()
            .map(|afp| afp.block_hash)
            .unwrap_or_else(HashValue::zero);

        let vote = match build_epoch_finalization_vote(
            &ctx.author,
            &ctx.keypair.private,
            ctx.handler.as_ref(),
            &epoch_full_id,
            last_leader_position,
            last_index,
            last_hash,
            first_by_last,
        ) {
            Ok(vote) => vote,
            Err(e) => {
                error!(error = %e, "Failed to sign epoch finalization");
                continue;
            }
        };
        proposed_for.insert(epoch.id, true);

        let assembled = ctx.rollover.lock().add_vote(
            vote.clone(),
            &epoch.quorum,
            epoch.majority(),
            ctx.handler.as_ref(),
        );
        if let Ok(Some(aefp)) = assembled {
            if let Err(e) = ctx.chaindata.save_aefp(epoch.id, &aefp) {
                error!(error = %e, "Failed to persist AEFP");
            }
        }
        let _ = outbound_tx
            .send(ConsensusMsg::EpochVote(EpochVoteMsg {
                voter: vote.voter,
                epoch_full_id: vote.epoch_full_id,
                last_leader: vote.last_leader,
                last_index: vote.last_index,
                last_hash: vote.last_hash,
                hash_of_first_block_by_last_leader: vote.hash_of_first_block_by_last_leader,
                sig: vote.sig,
            }))
            .await;
    }
}

/// Walks finalized blocks in order and applies their confirmed effects:
/// nonce bases advance, committed transactions leave the mempool, and
/// reliability signals reach the XP engine exactly once.
async fn verification_thread_aligner(ctx: Arc<NodeContext>, mut shutdown_rx: watch::Receiver<bool>) {
    let mut aligned: HashMap<String, u64> = HashMap::new();
    while tick_or_shutdown(&mut shutdown_rx, ctx.config.consensus.worker_tick_ms).await {
        let snapshot = ctx.approvement_snapshot();
        if snapshot.epoch.id < 0 {
            continue;
        }
        let epoch_full_id = snapshot.epoch.epoch_full_id(&ctx.network_id);
        let next = aligned.entry(epoch_full_id.clone()).or_insert(0);

        loop {
            let id = block_id(&epoch_full_id, *next);
            let block = match ctx.chaindata.get_block(&id) {
                Ok(Some(block)) => block,
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "Failed to read finalized block");
                    break;
                }
            };
            // Only AFP-backed blocks count as finalized.
            match ctx.chaindata.get_afp(&id) {
                Ok(Some(_)) => {}
                _ => break,
            }

            for txn in &block.transactions {
                {
                    let mut mempool = ctx.mempool.lock();
                    mempool.commit_transaction(&txn.creator, txn.nonce);
                }
                ctx.nonce_base
                    .lock()
                    .insert(txn.creator.clone(), txn.nonce + 1);

                if let Ok(modulr_types::transaction::TxPayload::ReliabilitySignal {
                    user,
                    job_id,
                    signal,
                    reporter,
                }) = txn.typed_payload()
                {
                    let outcome = ctx.reliability.lock().apply_signal(
                        &user,
                        signal,
                        &job_id,
                        reporter.as_deref(),
                    );
                    debug!(user = %user, outcome = ?outcome, "Aligned reliability signal");
                }
            }
            *next += 1;
        }
    }
}
