//! Block consensus: proposing, verifying and co-signing casts, collecting
//! partial signatures and committing recovered blocks.
use super::cache::{select_group, GroupInfoFetcher, GroupInfoUpdater, NodeInfoFetcher};
use super::consensus::{BlockContext, SharedVerifyContext, SlotStatus, VerifyContext};
use super::context::NodeContext;
use super::dkg::GroupCreator;
use super::election::{draw_ticket, verify_group_seed, verify_ticket};
use super::errors::{NodeError, NodeResult};
use super::future::FutureMessageHolder;
use super::messages::{CastBody, ConsensusMessage, VerifiedBody};
use super::types::{CastOutcome, VerifiedOutcome};
use crate::chain::errors::ChainError;
use crate::chain::types::{
    AddBlockResult, Block, BlockHeader, BlockRequest, Transaction, TxCompleteness,
};
use dkg_core::messages::{SignPubKey, SignPubKeyRequest};
use dkg_core::primitives::GroupInfo;
use dkg_core::{DkgMessage, SignedMessage};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use threshold_bls::hash::DataHasher;
use threshold_bls::{Hash, Id, Signature};
use tracing::{debug, info, warn};

type HeldCommit = (Arc<BlockContext>, SharedVerifyContext);

pub struct Processor {
    ctx: NodeContext,
    group_creator: GroupCreator,
    block_contexts: RwLock<HashMap<Id, Arc<BlockContext>>>,
    /// Blocks whose parent is missing, by parent hash.
    future_blocks: FutureMessageHolder<Block>,
    /// Recovered blocks whose parent is missing, by parent hash.
    future_commits: FutureMessageHolder<HeldCommit>,
    /// Casts whose parent is missing, by parent hash.
    future_casts: FutureMessageHolder<SignedMessage<CastBody>>,
    /// Partials waiting on their slot (by block hash) or on the signer's
    /// signing key (by `sign_pk_key`).
    future_verified: FutureMessageHolder<SignedMessage<VerifiedBody>>,
    /// When a signing key was last asked for, by `(group, member)`.
    sign_pk_requests: RwLock<HashMap<(Id, Id), u64>>,
    last_proposed: RwLock<Option<(u64, Hash)>>,
}

fn sign_pk_key(group_id: &Id, member: &Id) -> Hash {
    DataHasher::with_domain(b"sign-pk-wait")
        .update_fixed(group_id.as_bytes())
        .update_fixed(member.as_bytes())
        .finalize()
}

impl Processor {
    /// Seeds the group directory from the group chain.
    pub fn new(ctx: NodeContext) -> Self {
        ctx.directory.write().refresh(ctx.chain_groups());

        Processor {
            group_creator: GroupCreator::new(ctx.clone()),
            ctx,
            block_contexts: RwLock::new(HashMap::new()),
            future_blocks: FutureMessageHolder::new(),
            future_commits: FutureMessageHolder::new(),
            future_casts: FutureMessageHolder::new(),
            future_verified: FutureMessageHolder::new(),
            sign_pk_requests: RwLock::new(HashMap::new()),
            last_proposed: RwLock::new(None),
        }
    }

    pub fn context(&self) -> &NodeContext {
        &self.ctx
    }

    pub fn group_creator(&self) -> &GroupCreator {
        &self.group_creator
    }

    pub fn id(&self) -> Id {
        self.ctx.my_id()
    }

    pub fn held_casts(&self) -> usize {
        self.future_casts.size()
    }

    pub fn held_blocks(&self) -> usize {
        self.future_blocks.size()
    }

    fn known_group(&self, group_id: &Id) -> Option<GroupInfo> {
        self.ctx
            .directory
            .read()
            .get_group(group_id)
            .cloned()
            .or_else(|| self.ctx.group_chain.get_group_by_id(group_id))
    }

    /// The context of a group this node is a member of, created on first
    /// use.
    pub fn block_context(&self, group_id: &Id) -> Option<Arc<BlockContext>> {
        if let Some(ctx) = self.block_contexts.read().get(group_id) {
            return Some(ctx.clone());
        }

        if !self.ctx.store.is_joined(group_id) {
            return None;
        }

        let group = self.known_group(group_id)?;

        let ctx = self
            .block_contexts
            .write()
            .entry(*group_id)
            .or_insert_with(|| Arc::new(BlockContext::new(group)))
            .clone();

        Some(ctx)
    }

    pub fn verify_context(&self, group_id: &Id, block_hash: &Hash) -> Option<SharedVerifyContext> {
        self.block_context(group_id)?.get_by_hash(block_hash)
    }

    /// Verify group for `height` on top of `pre`: the directory's pick,
    /// checked against the group chain. A disagreement refreshes the
    /// directory.
    pub fn select_verify_group(&self, pre: &BlockHeader, height: u64) -> NodeResult<GroupInfo> {
        let seed = verify_group_seed(&pre.random);

        let cached = self
            .ctx
            .directory
            .read()
            .select_verify_group(&seed, height)
            .map(|g| g.group_id());

        let groups = self.ctx.chain_groups();

        let selected = select_group(groups.iter(), &seed, height)
            .cloned()
            .ok_or(NodeError::NoVerifyGroup(height))?;

        if cached != Some(selected.group_id()) {
            debug!(height, "group directory out of date, refreshing from chain");

            let release_delay = self.ctx.params.group.release_delay;

            self.ctx.directory.write().refresh(
                groups
                    .into_iter()
                    .filter(|g| !g.should_release(height, release_delay))
                    .collect(),
            );
        }

        Ok(selected)
    }

    /// Entry point for every decoded message.
    pub fn handle_message(&self, msg: ConsensusMessage) -> NodeResult<()> {
        match msg {
            ConsensusMessage::Dkg(m) => self.on_dkg(m),
            ConsensusMessage::Cast(m) => self.on_cast(m).map(|_| ()),
            ConsensusMessage::Verified(m) => self.on_verified(m).map(|_| ()),
            ConsensusMessage::NewBlock(b) => self.on_new_block(b),
            ConsensusMessage::Transactions(txs) => {
                self.on_transactions(txs);

                Ok(())
            }
        }
    }

    fn on_dkg(&self, msg: DkgMessage) -> NodeResult<()> {
        let signer = msg.signer();

        let miner = self
            .ctx
            .miners
            .get_miner(&signer)
            .ok_or(NodeError::UnknownMiner(signer))?;

        if !msg.verify(&miner.public_key) {
            return Err(NodeError::InvalidSignature(msg.name()));
        }

        match msg {
            DkgMessage::SignPubKey(m) => self.on_sign_pub_key(m),
            DkgMessage::SignPubKeyRequest(m) => self.on_sign_pub_key_request(m),
            other => {
                if let Some(group) = self.group_creator.handle(other)? {
                    self.on_group_accepted(&group);
                }

                Ok(())
            }
        }
    }

    fn on_group_accepted(&self, group: &GroupInfo) {
        if self.block_context(&group.group_id()).is_some() {
            info!(group = ?group.group_id(), "joined a new verify group");
        }
    }

    fn on_sign_pub_key(&self, msg: SignedMessage<SignPubKey>) -> NodeResult<()> {
        let body = &msg.body;

        let signer = msg.signer();

        if !body.verify_pop() {
            return Err(NodeError::InvalidSignature("sign_pubkey"));
        }

        if let Some(group) = self.known_group(&body.group_id) {
            if !group.is_member(&signer) {
                return Err(NodeError::NotGroupMember(signer));
            }
        }

        match self.ctx.store.get(&body.group_id) {
            Some(joined) if joined.group_hash == body.group_hash => {
                self.ctx
                    .store
                    .add_member_sign_pk(&body.group_id, signer, body.sign_pk)?;
            }
            Some(_) => return Err(NodeError::InvalidSignature("sign_pubkey")),
            None => {
                if !self
                    .group_creator
                    .add_member_sign_pk(&body.group_hash, signer, body.sign_pk)
                {
                    return Ok(());
                }
            }
        }

        debug!(group = ?body.group_id, member = ?signer, "member sign key learned");

        for held in self.future_verified.take(&sign_pk_key(&body.group_id, &signer)) {
            if let Err(e) = self.on_verified(held) {
                debug!("held verified message dropped: {}", e);
            }
        }

        Ok(())
    }

    fn on_sign_pub_key_request(&self, msg: SignedMessage<SignPubKeyRequest>) -> NodeResult<()> {
        let group_id = msg.body.group_id;

        let joined = match self.ctx.store.get(&group_id) {
            Some(joined) => joined,
            None => return Ok(()),
        };

        if let Some(group) = self.known_group(&group_id) {
            if !group.is_member(&msg.signer()) {
                return Err(NodeError::NotGroupMember(msg.signer()));
            }
        }

        let reply = self.ctx.sign(SignPubKey {
            group_hash: joined.group_hash,
            group_id,
            sign_pk: joined.sign_public(),
            pop: joined.sign_secret.sign(joined.group_hash.as_bytes()),
        });

        self.ctx.network.send(
            msg.signer(),
            ConsensusMessage::Dkg(DkgMessage::SignPubKey(reply)),
        );

        Ok(())
    }

    /// Asks `member` for its signing key unless asked recently.
    fn request_sign_pk(&self, group_id: Id, member: Id) {
        let now = self.ctx.now();

        {
            let mut requests = self.sign_pk_requests.write();

            if let Some(sent) = requests.get(&(group_id, member)) {
                if now < sent + self.ctx.params.sign_pk_request_timeout_ms {
                    return;
                }
            }

            requests.insert((group_id, member), now);
        }

        debug!(group = ?group_id, member = ?member, "requesting sign public key");

        let request = self.ctx.sign(SignPubKeyRequest { group_id });

        self.ctx.network.send(
            member,
            ConsensusMessage::Dkg(DkgMessage::SignPubKeyRequest(request)),
        );
    }

    /// Draws a ticket and assembles a cast for the current height without
    /// sending it.
    pub fn build_cast(&self) -> NodeResult<Option<SignedMessage<CastBody>>> {
        let params = &self.ctx.params;

        let top = self.ctx.chain.top_block();

        let now = self.ctx.now();

        let height = params.cast_height(top.timestamp, top.height, now);

        let my_id = self.ctx.my_id();

        let miner = match self.ctx.miners.get_miner(&my_id) {
            Some(miner) => miner,
            None => return Ok(None),
        };

        let ticket = draw_ticket(
            self.ctx.node.get_vrf_secret_key(),
            &miner,
            self.ctx.miners.total_stake(height),
            &top,
            height,
            params,
        )?;

        let (proof, qn) = match ticket {
            Some(ticket) => ticket,
            None => return Ok(None),
        };

        let group = self.select_verify_group(&top, height)?;

        let block = self.ctx.chain.generate_block(BlockRequest {
            height,
            pre_hash: top.hash,
            timestamp: now,
            castor: my_id,
            group_id: group.group_id(),
            prove_value: proof.to_bytes().to_vec(),
            total_qn: top.total_qn + qn,
            max_transactions: params.max_transactions,
        })?;

        Ok(Some(self.ctx.sign(CastBody {
            header: block.header,
        })))
    }

    /// Proposes once per `(height, parent)`. Returns the proposed hash.
    pub fn try_propose(&self) -> NodeResult<Option<Hash>> {
        let top = self.ctx.chain.top_block();

        let height = self
            .ctx
            .params
            .cast_height(top.timestamp, top.height, self.ctx.now());

        if *self.last_proposed.read() == Some((height, top.hash)) {
            return Ok(None);
        }

        let cast = match self.build_cast()? {
            Some(cast) => cast,
            None => return Ok(None),
        };

        *self.last_proposed.write() = Some((height, top.hash));

        let header = &cast.body.header;

        let hash = header.hash;

        let group = self
            .known_group(&header.group_id)
            .ok_or(NodeError::GroupNotExisted(header.group_id))?;

        info!(
            height = header.height,
            hash = %hash,
            total_qn = header.total_qn,
            txs = header.tx_hashes.len(),
            "proposing block"
        );

        self.ctx
            .network
            .send_to_group(group.members(), ConsensusMessage::Cast(cast.clone()));

        if group.is_member(&self.ctx.my_id()) {
            if let Err(e) = self.on_cast(cast) {
                warn!(hash = %hash, "could not verify own cast: {}", e);
            }
        }

        Ok(Some(hash))
    }

    /// Verifies a cast and, when everything checks out, signs it once.
    pub fn on_cast(&self, cast: SignedMessage<CastBody>) -> NodeResult<CastOutcome> {
        let header = cast.body.header.clone();

        let castor = header.castor;

        if cast.signer() != castor {
            return Err(NodeError::InvalidSignature("cast"));
        }

        let miner = self
            .ctx
            .miners
            .get_miner(&castor)
            .ok_or(NodeError::UnknownMiner(castor))?;

        if !cast.verify(&miner.public_key) {
            return Err(NodeError::InvalidSignature("cast"));
        }

        if !header.is_hash_valid() {
            return Err(ChainError::HashMismatch.into());
        }

        let block_ctx = match self.block_context(&header.group_id) {
            Some(ctx) => ctx,
            None => return Ok(CastOutcome::Ignored),
        };

        if self.ctx.chain.has_block(&header.hash) {
            return Err(NodeError::BlockExisted(header.hash));
        }

        block_ctx.check_castor(castor, header.height, header.hash)?;

        let now = self.ctx.now();

        let pre = match self.ctx.chain.query_block_header_by_hash(&header.pre_hash) {
            Some(pre) => pre,
            None => {
                debug!(hash = %header.hash, pre = %header.pre_hash, "cast parent missing, holding");

                self.future_casts.add(header.pre_hash, cast, now);

                return Ok(CastOutcome::Deferred);
            }
        };

        if header.height <= pre.height {
            return Err(ChainError::HeightMismatch {
                parent: pre.height,
                actual: header.height,
            }
            .into());
        }

        let params = &self.ctx.params;

        let deadline = params.cast_deadline(pre.timestamp, pre.height, header.height);

        if now > deadline {
            return Err(NodeError::DeadlineExceeded { deadline, now });
        }

        let qn = verify_ticket(
            &pre,
            &header,
            &miner,
            self.ctx.miners.total_stake(header.height),
            params,
        )?;

        if header.total_qn != pre.total_qn + qn {
            return Err(NodeError::QnMismatch {
                expected: pre.total_qn + qn,
                actual: header.total_qn,
            });
        }

        let group = self.select_verify_group(&pre, header.height)?;

        if group.group_id() != header.group_id {
            return Err(NodeError::WrongVerifyGroup {
                expected: group.group_id(),
                actual: header.group_id,
            });
        }

        let key = (header.height, header.pre_hash, header.hash);

        let (vctx, created) = block_ctx.get_or_create(key, || {
            VerifyContext::new(cast.clone(), &pre, &group, deadline, now)
        });

        if created {
            debug!(height = header.height, hash = %header.hash, "verify context created");
        }

        let outcome = match self.ctx.chain.check_transactions(&header) {
            TxCompleteness::Complete(transactions) => {
                self.ctx.chain.verify_block(&header, &transactions)?;

                self.sign_block(&block_ctx, &vctx, &pre)?
            }
            TxCompleteness::Missing(missing) => {
                let mut v = vctx.lock();

                if matches!(v.status(), SlotStatus::Initing | SlotStatus::Waiting) {
                    v.slot_mut().set_waiting(missing.len())?;
                }

                debug!(hash = %header.hash, missing = missing.len(), "waiting for transactions");

                CastOutcome::Waiting
            }
        };

        if created {
            self.replay_verified(&header.hash);
        }

        Ok(outcome)
    }

    fn sign_block(
        &self,
        block_ctx: &BlockContext,
        vctx: &SharedVerifyContext,
        pre: &BlockHeader,
    ) -> NodeResult<CastOutcome> {
        let group_id = block_ctx.group_id();

        let joined = self
            .ctx
            .store
            .get(&group_id)
            .ok_or(NodeError::SignKeyMissing(group_id))?;

        let verified = {
            let mut v = vctx.lock();

            if v.status() == SlotStatus::Failed {
                return Err(NodeError::SlotFailed);
            }

            if v.has_signed() || v.status().is_recovered() {
                return Ok(CastOutcome::Ignored);
            }

            block_ctx.try_sign_qn(v.height(), v.header().total_qn)?;

            v.slot_mut().transition(SlotStatus::Signed)?;
            v.mark_signed();

            let body = VerifiedBody {
                block_hash: v.block_hash(),
                group_id,
                height: v.height(),
                pre_hash: v.pre_hash(),
                block_sign: joined.sign_secret.sign(v.block_hash().as_bytes()),
                random_sign: joined.sign_secret.sign(&pre.random),
            };

            SignedMessage::new(body, &joined.sign_secret, self.ctx.my_id())
        };

        info!(
            height = verified.body.height,
            hash = %verified.body.block_hash,
            "block signed"
        );

        self.ctx.network.send_to_group(
            block_ctx.group().members(),
            ConsensusMessage::Verified(verified.clone()),
        );

        self.on_verified(verified)?;

        Ok(CastOutcome::Signed)
    }

    fn replay_verified(&self, block_hash: &Hash) {
        for held in self.future_verified.take(block_hash) {
            if let Err(e) = self.on_verified(held) {
                debug!(hash = %block_hash, "held verified message dropped: {}", e);
            }
        }
    }

    /// Feeds one member's partials into the slot they are for.
    pub fn on_verified(&self, msg: SignedMessage<VerifiedBody>) -> NodeResult<VerifiedOutcome> {
        let body = msg.body.clone();

        let signer = msg.signer();

        let block_ctx = match self.block_context(&body.group_id) {
            Some(ctx) => ctx,
            None => return Ok(VerifiedOutcome::Ignored),
        };

        if !block_ctx.group().is_member(&signer) {
            return Err(NodeError::NotGroupMember(signer));
        }

        let sign_pk = self
            .ctx
            .store
            .get(&body.group_id)
            .and_then(|joined| joined.member_sign_pk(&signer));

        let sign_pk = match sign_pk {
            Some(pk) => pk,
            None => {
                self.request_sign_pk(body.group_id, signer);

                self.future_verified.add(
                    sign_pk_key(&body.group_id, &signer),
                    msg,
                    self.ctx.now(),
                );

                return Ok(VerifiedOutcome::Deferred);
            }
        };

        if !msg.verify(&sign_pk) {
            return Err(NodeError::InvalidSignature("verified"));
        }

        let vctx = match block_ctx.get_by_hash(&body.block_hash) {
            Some(vctx) => vctx,
            None => {
                debug!(hash = %body.block_hash, "partials before the cast, holding");

                self.future_verified
                    .add(body.block_hash, msg, self.ctx.now());

                return Ok(VerifiedOutcome::Deferred);
            }
        };

        let recovered = {
            let mut v = vctx.lock();

            if v.status().is_recovered() {
                return Ok(VerifiedOutcome::Ignored);
            }

            if !v
                .slot()
                .verify_partials(&sign_pk, &body.block_sign, &body.random_sign)
            {
                return Err(NodeError::InvalidSignature("verified partials"));
            }

            v.slot_mut()
                .add_partials(signer, body.block_sign, body.random_sign)?
        };

        if !recovered {
            return Ok(VerifiedOutcome::Collected);
        }

        debug!(height = body.height, hash = %body.block_hash, "group signatures recovered");

        if self.try_commit(&block_ctx, &vctx)? {
            Ok(VerifiedOutcome::Committed)
        } else {
            Ok(VerifiedOutcome::Collected)
        }
    }

    /// Attaches the recovered signatures and adds the block to the chain.
    /// Returns `true` when this call committed it.
    fn try_commit(&self, block_ctx: &Arc<BlockContext>, vctx: &SharedVerifyContext) -> NodeResult<bool> {
        let block = {
            let mut v = vctx.lock();

            if !matches!(v.status(), SlotStatus::Recovered | SlotStatus::Verified) {
                return Ok(false);
            }

            let (block_sign, random_sign) = v.slot_mut().verify_group_sign()?;

            let transactions = match self.ctx.chain.check_transactions(v.header()) {
                TxCompleteness::Complete(transactions) => transactions,
                TxCompleteness::Missing(missing) => {
                    return Err(NodeError::MissingTransactions(missing.len()))
                }
            };

            let mut header = v.header().clone();
            header.signature = Some(block_sign);
            header.random = random_sign.to_bytes().to_vec();

            if !block_ctx.try_mark_success(header.height, header.pre_hash, header.hash) {
                v.slot_mut().transition(SlotStatus::Failed)?;

                warn!(height = header.height, hash = %header.hash, "another block won this slot");

                return Ok(false);
            }

            let block = Block {
                header,
                transactions,
            };

            match self.ctx.chain.add_block_on_chain(block.clone()) {
                AddBlockResult::Added | AddBlockResult::AlreadyExists => {
                    v.slot_mut().transition(SlotStatus::Success)?;
                }
                AddBlockResult::ParentMissing => {
                    block_ctx.release_success(block.height(), v.pre_hash(), block.hash());

                    debug!(hash = %block.hash(), "recovered block lacks its parent, holding");

                    self.future_commits.add(
                        v.pre_hash(),
                        (block_ctx.clone(), vctx.clone()),
                        self.ctx.now(),
                    );

                    return Ok(false);
                }
                AddBlockResult::Rejected(reason) => {
                    block_ctx.release_success(block.height(), v.pre_hash(), block.hash());

                    v.slot_mut().transition(SlotStatus::Failed)?;

                    return Err(NodeError::BlockRejected(reason));
                }
            }

            block
        };

        info!(
            height = block.height(),
            hash = %block.hash(),
            total_qn = block.header.total_qn,
            txs = block.transactions.len(),
            "block committed"
        );

        if block_ctx.should_broadcast(block.height(), block.header.total_qn) {
            self.ctx
                .network
                .broadcast(ConsensusMessage::NewBlock(block.clone()));
        }

        self.on_block_added(&block);

        Ok(true)
    }

    /// A block committed by a verify group elsewhere.
    pub fn on_new_block(&self, block: Block) -> NodeResult<()> {
        let header = &block.header;

        if self.ctx.chain.has_block(&header.hash) {
            return Ok(());
        }

        if !header.is_hash_valid() {
            return Err(ChainError::HashMismatch.into());
        }

        let pre = match self.ctx.chain.query_block_header_by_hash(&header.pre_hash) {
            Some(pre) => pre,
            None => {
                debug!(hash = %header.hash, pre = %header.pre_hash, "block parent missing, holding");

                self.future_blocks
                    .add(header.pre_hash, block.clone(), self.ctx.now());

                return Ok(());
            }
        };

        let group = self
            .known_group(&header.group_id)
            .ok_or(NodeError::GroupNotExisted(header.group_id))?;

        let signature = header.signature.ok_or(ChainError::Unsigned)?;

        if !group.group_pk().verify(header.hash.as_bytes(), &signature) {
            return Err(NodeError::InvalidSignature("block"));
        }

        let random = Signature::from_bytes(&header.random)?;

        if !group.group_pk().verify(&pre.random, &random) {
            return Err(NodeError::InvalidSignature("block random"));
        }

        match self.ctx.chain.add_block_on_chain(block.clone()) {
            AddBlockResult::Added => {
                debug!(height = block.height(), hash = %block.hash(), "block added");

                self.on_block_added(&block);
            }
            AddBlockResult::AlreadyExists => {}
            AddBlockResult::ParentMissing => {
                self.future_blocks
                    .add(block.header.pre_hash, block.clone(), self.ctx.now());
            }
            AddBlockResult::Rejected(reason) => return Err(NodeError::BlockRejected(reason)),
        }

        Ok(())
    }

    /// Replays everything that waited on `block` and drives group creation.
    fn on_block_added(&self, block: &Block) {
        let hash = block.hash();

        for child in self.future_blocks.take(&hash) {
            if let Err(e) = self.on_new_block(child) {
                debug!("held block dropped: {}", e);
            }
        }

        for (block_ctx, vctx) in self.future_commits.take(&hash) {
            if let Err(e) = self.try_commit(&block_ctx, &vctx) {
                debug!("held commit dropped: {}", e);
            }
        }

        for cast in self.future_casts.take(&hash) {
            let cast_hash = cast.body.header.hash;

            match self.on_cast(cast) {
                Ok(outcome) => debug!(hash = %cast_hash, ?outcome, "held cast replayed"),
                Err(e) => debug!(hash = %cast_hash, "held cast dropped: {}", e),
            }
        }

        for group in self.group_creator.on_block(&block.header) {
            self.on_group_accepted(&group);
        }
    }

    /// New transactions may complete casts waiting on them or recovered
    /// blocks that could not be assembled yet.
    pub fn on_transactions(&self, transactions: Vec<Transaction>) {
        let added: HashSet<Hash> = self
            .ctx
            .chain
            .add_transactions(transactions)
            .into_iter()
            .collect();

        if added.is_empty() {
            return;
        }

        let block_contexts: Vec<Arc<BlockContext>> =
            self.block_contexts.read().values().cloned().collect();

        for block_ctx in block_contexts {
            for vctx in block_ctx.contexts() {
                let (status, cast, wanted) = {
                    let v = vctx.lock();

                    let wanted = v.header().tx_hashes.iter().any(|h| added.contains(h));

                    (v.status(), v.cast().clone(), wanted)
                };

                if !wanted {
                    continue;
                }

                let result = match status {
                    SlotStatus::Waiting => self.on_cast(cast).map(|_| ()),
                    SlotStatus::Recovered | SlotStatus::Verified => {
                        self.try_commit(&block_ctx, &vctx).map(|_| ())
                    }
                    _ => Ok(()),
                };

                if let Err(e) = result {
                    debug!("re-verification after transactions failed: {}", e);
                }
            }
        }
    }

    /// Releases dismissed groups, sweeps old verify contexts and expires
    /// held messages and request records.
    pub fn release_and_sweep(&self) -> NodeResult<()> {
        let params = &self.ctx.params;

        let height = self.ctx.chain.top_block().height;

        let now = self.ctx.now();

        let released = self
            .ctx
            .directory
            .write()
            .remove_released(height, params.group.release_delay);

        for group in released {
            let group_id = group.group_id();

            self.block_contexts.write().remove(&group_id);

            if self.ctx.store.is_joined(&group_id) {
                self.ctx.store.remove(&group_id)?;
            }

            info!(group = ?group_id, height, "group released");
        }

        let min_height = height.saturating_sub(params.context_keep_heights);

        let block_contexts: Vec<Arc<BlockContext>> =
            self.block_contexts.read().values().cloned().collect();

        for block_ctx in block_contexts {
            block_ctx.sweep(min_height);
        }

        let ttl = params.future_message_ttl_ms;

        let dropped = self.future_blocks.forget_expired(now, ttl)
            + self.future_commits.forget_expired(now, ttl)
            + self.future_casts.forget_expired(now, ttl)
            + self.future_verified.forget_expired(now, ttl)
            + self.group_creator.forget_expired(now, ttl);

        if dropped > 0 {
            debug!(dropped, "expired held messages");
        }

        let timeout = params.sign_pk_request_timeout_ms;

        self.sign_pk_requests
            .write()
            .retain(|_, sent| now < *sent + timeout);

        Ok(())
    }
}
