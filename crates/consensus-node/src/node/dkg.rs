//! Drives group formation on top of the pure contexts in `dkg_core`: kings
//! ping candidates and collect the parent co-signature, members exchange
//! shares, every node collects `GroupInited` reports.
use super::cache::{select_group, GroupInfoUpdater, NodeInfoFetcher};
use super::context::NodeContext;
use super::errors::{NodeError, NodeResult};
use super::future::FutureMessageHolder;
use super::messages::ConsensusMessage;
use super::types::JoinedGroupInfo;
use crate::chain::errors::ChainError;
use crate::chain::types::BlockHeader;
use dkg_core::creating::build_header;
use dkg_core::messages::{
    CreateGroupRaw, CreateGroupSign, GroupInit, GroupInited, Ping, Pong, SharePieceMessage,
    ShareRequest, SignPubKey,
};
use dkg_core::primitives::{DKGError, GroupHeader, GroupInfo, GroupInitInfo};
use dkg_core::selection::{select_candidates, select_kings, CandidateInfo};
use dkg_core::{
    CreatingGroupContext, CreatingStatus, DkgMessage, DkgSession, InitedGroupContext,
    InitedOutcome, SessionStatus, SignedMessage,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use threshold_bls::{Hash, Id, PublicKey};
use tracing::{debug, info, warn};

pub struct GroupCreator {
    ctx: NodeContext,
    /// King side, by create height.
    creating: RwLock<HashMap<u64, CreatingGroupContext>>,
    /// Header hash this parent member co-signed, by create height.
    parent_signed: RwLock<HashMap<u64, Hash>>,
    sessions: RwLock<HashMap<Hash, DkgSession>>,
    inited: RwLock<HashMap<Hash, InitedGroupContext>>,
    /// Accepted group hashes and their ready heights.
    accepted: RwLock<HashMap<Hash, u64>>,
    /// Messages waiting on a base block or on a `GroupInit`.
    pending: FutureMessageHolder<DkgMessage>,
}

impl GroupCreator {
    pub fn new(ctx: NodeContext) -> Self {
        GroupCreator {
            ctx,
            creating: RwLock::new(HashMap::new()),
            parent_signed: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            inited: RwLock::new(HashMap::new()),
            accepted: RwLock::new(HashMap::new()),
            pending: FutureMessageHolder::new(),
        }
    }

    pub fn session_status(&self, group_hash: &Hash) -> Option<SessionStatus> {
        self.sessions.read().get(group_hash).map(|s| s.status())
    }

    pub fn is_accepted(&self, group_hash: &Hash) -> bool {
        self.accepted.read().contains_key(group_hash)
    }

    pub fn pending_size(&self) -> usize {
        self.pending.size()
    }

    pub fn forget_expired(&self, now: u64, ttl: u64) -> usize {
        self.pending.forget_expired(now, ttl)
    }

    fn send(&self, to: Id, msg: DkgMessage) {
        self.ctx.network.send(to, ConsensusMessage::Dkg(msg));
    }

    fn parent_group(&self, base: &BlockHeader) -> NodeResult<GroupInfo> {
        let groups = self.ctx.chain_groups();

        select_group(groups.iter(), &base.hash, base.height)
            .cloned()
            .ok_or(NodeError::NoVerifyGroup(base.height))
    }

    fn candidates(&self, base: &BlockHeader) -> NodeResult<Vec<Id>> {
        let pool: Vec<CandidateInfo> = self
            .ctx
            .miners
            .miners(base.height)
            .into_iter()
            .filter(|m| m.is_active(base.height))
            .map(|m| CandidateInfo {
                id: m.id,
                stake: m.stake,
                group_count: self.ctx.chain_groups_of(&m.id, base.height),
            })
            .collect();

        Ok(select_candidates(&pool, &base.hash, &self.ctx.params.group)?)
    }

    /// The base block for a create height, or `None` after holding `msg`
    /// until it arrives.
    fn base_block(&self, base_hash: &Hash, msg: DkgMessage) -> Option<BlockHeader> {
        let base = self.ctx.chain.query_block_header_by_hash(base_hash);

        if base.is_none() {
            debug!(base = %base_hash, msg = msg.name(), "base block missing, holding");

            self.pending.add(*base_hash, msg, self.ctx.now());
        }

        base
    }

    /// Called for every block added to the chain. Replays messages that
    /// waited on it, starts a creation at create heights and runs the
    /// height-driven timeouts.
    pub fn on_block(&self, header: &BlockHeader) -> Vec<GroupInfo> {
        let mut accepted = self.replay(&header.hash);

        if self.ctx.params.group.is_create_height(header.height) {
            if let Err(e) = self.start_creating(header) {
                warn!(height = header.height, "could not start group creation: {}", e);
            }
        }

        self.check_progress(header.height);

        accepted
    }

    fn replay(&self, key: &Hash) -> Vec<GroupInfo> {
        let mut accepted = vec![];

        for msg in self.pending.take(key) {
            let name = msg.name();

            match self.handle(msg) {
                Ok(Some(group)) => accepted.push(group),
                Ok(None) => {}
                Err(e) => debug!(msg = name, "replayed message dropped: {}", e),
            }
        }

        accepted
    }

    fn start_creating(&self, base: &BlockHeader) -> NodeResult<()> {
        if self.creating.read().contains_key(&base.height) {
            return Ok(());
        }

        let parent = self.parent_group(base)?;

        let my_id = self.ctx.my_id();

        if !select_kings(parent.members(), &base.hash).contains(&my_id) {
            return Ok(());
        }

        let candidates = self.candidates(base)?;

        let pre_group_id = self.ctx.group_chain.last_group().map(|g| g.group_id());

        self.creating.write().entry(base.height).or_insert_with(|| {
            CreatingGroupContext::new(
                base.hash,
                base.height,
                parent.clone(),
                pre_group_id,
                candidates.clone(),
            )
        });

        info!(
            height = base.height,
            parent = ?parent.group_id(),
            candidates = candidates.len(),
            "pinging candidates as king"
        );

        for candidate in candidates {
            let ping = self.ctx.sign(Ping {
                base_hash: base.hash,
                create_height: base.height,
            });

            self.send(candidate, DkgMessage::Ping(ping));
        }

        Ok(())
    }

    fn check_progress(&self, height: u64) {
        let params = &self.ctx.params.group;

        let mut raws = vec![];

        {
            let mut creating = self.creating.write();

            for ctx in creating.values_mut() {
                match ctx.try_build_header(height, params) {
                    Ok(Some(header)) => raws.push(raw_request(ctx, header)),
                    Ok(None) => {}
                    Err(e) => warn!(height = ctx.create_height(), "group creation failed: {}", e),
                }
            }

            creating.retain(|create_height, ctx| {
                ctx.status() != CreatingStatus::Failed && height < create_height + params.ready_gap
            });
        }

        for (parent_members, raw) in raws {
            self.request_parent_sign(&parent_members, raw);
        }

        self.parent_signed
            .write()
            .retain(|create_height, _| height < create_height + params.ready_gap);

        let mut requests = vec![];

        {
            let mut sessions = self.sessions.write();

            sessions.retain(|hash, session| {
                if !session.init_info().ready_timeout(height) {
                    return true;
                }

                if !session.is_done() {
                    warn!(group_hash = %hash, status = ?session.status(), "key exchange abandoned");
                }

                false
            });

            for (hash, session) in sessions.iter_mut() {
                if session.status() == SessionStatus::SendShare
                    && height > session.init_info().header.create_height
                {
                    let due = session.take_share_requests(height, params.share_request_expiry);

                    for member in due {
                        requests.push((*hash, member));
                    }
                }
            }
        }

        for (group_hash, member) in requests {
            debug!(group_hash = %group_hash, member = ?member, "requesting share piece");

            let request = self.ctx.sign(ShareRequest {
                group_hash,
                receiver: member,
            });

            self.send(member, DkgMessage::ShareRequest(request));
        }

        self.inited.write().retain(|hash, ctx| {
            let failed = ctx.check_timeout(height);

            if failed {
                warn!(group_hash = %hash, reports = ctx.report_count(), "group was not accepted in time");
            }

            !failed && !ctx.init_info().ready_timeout(height)
        });

        self.accepted
            .write()
            .retain(|_, ready_height| height < *ready_height + params.ready_gap);
    }

    /// Handles every group-formation message except the sign public key
    /// exchange. The identity signature must already be checked. Returns
    /// the group this message got accepted, if any.
    pub fn handle(&self, msg: DkgMessage) -> NodeResult<Option<GroupInfo>> {
        match msg {
            DkgMessage::Ping(m) => self.handle_ping(m).map(|_| None),
            DkgMessage::Pong(m) => self.handle_pong(m).map(|_| None),
            DkgMessage::CreateGroupRaw(m) => self.handle_create_group_raw(m).map(|_| None),
            DkgMessage::CreateGroupSign(m) => self.handle_create_group_sign(m).map(|_| None),
            DkgMessage::GroupInit(m) => self.handle_group_init(m),
            DkgMessage::SharePiece(m) => self.handle_share_piece(m),
            DkgMessage::ShareRequest(m) => self.handle_share_request(m).map(|_| None),
            DkgMessage::GroupInited(m) => self.handle_group_inited(m),
            DkgMessage::SignPubKey(_) | DkgMessage::SignPubKeyRequest(_) => Ok(None),
        }
    }

    fn handle_ping(&self, msg: SignedMessage<Ping>) -> NodeResult<()> {
        let base = match self.base_block(&msg.body.base_hash, DkgMessage::Ping(msg.clone())) {
            Some(base) => base,
            None => return Ok(()),
        };

        if base.height != msg.body.create_height {
            return Err(NodeError::CreateHeightMismatch {
                expected: base.height,
                actual: msg.body.create_height,
            });
        }

        let parent = self.parent_group(&base)?;

        if !select_kings(parent.members(), &base.hash).contains(&msg.signer()) {
            return Err(NodeError::NotGroupMember(msg.signer()));
        }

        let pong = self.ctx.sign(Pong {
            base_hash: base.hash,
            create_height: base.height,
        });

        self.send(msg.signer(), DkgMessage::Pong(pong));

        Ok(())
    }

    fn handle_pong(&self, msg: SignedMessage<Pong>) -> NodeResult<()> {
        let height = self.ctx.chain.top_block().height;

        let raw = {
            let mut creating = self.creating.write();

            let ctx = match creating.get_mut(&msg.body.create_height) {
                Some(ctx) if ctx.base_hash() == msg.body.base_hash => ctx,
                _ => return Ok(()),
            };

            match ctx.add_pong(msg.signer()) {
                Ok(true) => {}
                Ok(false) | Err(DKGError::AlreadyFinished) => return Ok(()),
                Err(e) => return Err(e.into()),
            }

            ctx.try_build_header(height, &self.ctx.params.group)?
                .map(|header| raw_request(ctx, header))
        };

        if let Some((parent_members, raw)) = raw {
            self.request_parent_sign(&parent_members, raw);
        }

        Ok(())
    }

    fn request_parent_sign(&self, parent_members: &[Id], raw: CreateGroupRaw) {
        info!(
            group_hash = %raw.header.hash,
            members = raw.members.len(),
            "requesting parent co-signature"
        );

        for member in parent_members {
            self.send(*member, DkgMessage::CreateGroupRaw(self.ctx.sign(raw.clone())));
        }
    }

    fn handle_create_group_raw(&self, msg: SignedMessage<CreateGroupRaw>) -> NodeResult<()> {
        let body = &msg.body;

        let base = match self.base_block(&body.base_hash, DkgMessage::CreateGroupRaw(msg.clone()))
        {
            Some(base) => base,
            None => return Ok(()),
        };

        let parent = self.parent_group(&base)?;

        if !parent.is_member(&self.ctx.my_id()) {
            return Ok(());
        }

        if !select_kings(parent.members(), &base.hash).contains(&msg.signer()) {
            return Err(NodeError::NotGroupMember(msg.signer()));
        }

        let params = &self.ctx.params.group;

        let expected: GroupHeader = build_header(
            base.height,
            Some(parent.group_id()),
            body.header.pre_group_id,
            &body.members,
            params,
        );

        if expected.hash != body.header.hash {
            return Err(DKGError::HeaderHashMismatch.into());
        }

        if body.members.len() < params.member_min || body.members.len() > params.member_max {
            return Err(DKGError::InvalidGroupSize(body.members.len()).into());
        }

        let candidates = self.candidates(&base)?;

        if let Some(stranger) = body.members.iter().find(|m| !candidates.contains(m)) {
            return Err(NodeError::NotGroupMember(*stranger));
        }

        {
            let mut signed = self.parent_signed.write();

            let header_hash = signed.entry(base.height).or_insert(body.header.hash);

            if *header_hash != body.header.hash {
                warn!(
                    height = base.height,
                    signed = %header_hash,
                    asked = %body.header.hash,
                    "refusing to co-sign a second header"
                );

                return Ok(());
            }
        }

        let joined = self
            .ctx
            .store
            .get(&parent.group_id())
            .ok_or(NodeError::SignKeyMissing(parent.group_id()))?;

        let sign = self.ctx.sign(CreateGroupSign {
            group_hash: body.header.hash,
            partial: joined.sign_secret.sign(body.header.hash.as_bytes()),
        });

        self.send(msg.signer(), DkgMessage::CreateGroupSign(sign));

        Ok(())
    }

    fn handle_create_group_sign(&self, msg: SignedMessage<CreateGroupSign>) -> NodeResult<()> {
        let body = &msg.body;

        let init_info = {
            let mut creating = self.creating.write();

            let ctx = match creating
                .values_mut()
                .find(|c| c.header().map(|h| h.hash) == Some(body.group_hash))
            {
                Some(ctx) => ctx,
                None => return Ok(()),
            };

            // an unknown signing key is caught by the final verification
            let sign_pk = self
                .ctx
                .store
                .get(&ctx.parent().group_id())
                .and_then(|joined| joined.member_sign_pk(&msg.signer()));

            if let Some(pk) = sign_pk {
                if !pk.verify(body.group_hash.as_bytes(), &body.partial) {
                    return Err(NodeError::InvalidSignature("create_group_sign"));
                }
            }

            ctx.add_parent_sign(msg.signer(), body.partial)?
        };

        if let Some(info) = init_info {
            info!(group_hash = %info.group_hash(), "parent co-signed, sending group init");

            for member in info.members.iter() {
                let init = self.ctx.sign(GroupInit {
                    init_info: info.clone(),
                });

                self.send(*member, DkgMessage::GroupInit(init));
            }
        }

        Ok(())
    }

    fn validate_init_info(&self, info: &GroupInitInfo) -> NodeResult<()> {
        let parent_id = info
            .header
            .parent_id
            .ok_or(DKGError::HeaderHashMismatch)?;

        let parent = self
            .ctx
            .group_chain
            .get_group_by_id(&parent_id)
            .ok_or(NodeError::GroupNotExisted(parent_id))?;

        Ok(info.validate(parent.group_pk())?)
    }

    fn ensure_collector(&self, info: &GroupInitInfo) -> NodeResult<()> {
        let group_hash = info.group_hash();

        if self.inited.read().contains_key(&group_hash) || self.is_accepted(&group_hash) {
            return Ok(());
        }

        self.validate_init_info(info)?;

        let threshold = self.ctx.params.group.threshold(info.member_size());

        self.inited
            .write()
            .entry(group_hash)
            .or_insert_with(|| InitedGroupContext::new(info.clone(), threshold));

        Ok(())
    }

    fn handle_group_init(&self, msg: SignedMessage<GroupInit>) -> NodeResult<Option<GroupInfo>> {
        let info = msg.body.init_info;

        let group_hash = info.group_hash();

        let my_id = self.ctx.my_id();

        if !info.is_member(&my_id) || self.sessions.read().contains_key(&group_hash) {
            return Ok(None);
        }

        self.ensure_collector(&info)?;

        let threshold = self.ctx.params.group.threshold(info.member_size());

        let mut session = DkgSession::new(info, my_id, self.ctx.node.get_secret_key(), threshold)?;

        let pieces = session.gen_share_pieces()?;

        {
            let mut sessions = self.sessions.write();

            if sessions.contains_key(&group_hash) {
                return Ok(None);
            }

            sessions.insert(group_hash, session);
        }

        info!(group_hash = %group_hash, threshold, "key exchange started");

        for (receiver, piece) in pieces {
            let msg = self.ctx.sign(SharePieceMessage {
                group_hash,
                receiver,
                piece,
            });

            self.send(receiver, DkgMessage::SharePiece(msg));
        }

        let mut accepted = self.replay(&group_hash);

        if let Some(group) = self.finish_exchange(&group_hash)? {
            accepted.push(group);
        }

        Ok(accepted.pop())
    }

    fn handle_share_piece(
        &self,
        msg: SignedMessage<SharePieceMessage>,
    ) -> NodeResult<Option<GroupInfo>> {
        let body = &msg.body;

        if body.receiver != self.ctx.my_id() {
            return Ok(None);
        }

        let complete = self
            .sessions
            .write()
            .get_mut(&body.group_hash)
            .map(|session| session.handle_share_piece(msg.signer(), body.piece.clone()))
            .transpose()?;

        match complete {
            Some(true) => self.finish_exchange(&body.group_hash),
            Some(false) => Ok(None),
            None => {
                debug!(group_hash = %body.group_hash, "share piece before group init, holding");

                self.pending
                    .add(body.group_hash, DkgMessage::SharePiece(msg.clone()), self.ctx.now());

                Ok(None)
            }
        }
    }

    fn handle_share_request(&self, msg: SignedMessage<ShareRequest>) -> NodeResult<()> {
        let body = &msg.body;

        if body.receiver != self.ctx.my_id() {
            return Ok(());
        }

        let piece = match self.sessions.read().get(&body.group_hash) {
            Some(session) if session.status() >= SessionStatus::SendShare => {
                session.share_piece_for(&msg.signer())?
            }
            _ => return Ok(()),
        };

        let reply = self.ctx.sign(SharePieceMessage {
            group_hash: body.group_hash,
            receiver: msg.signer(),
            piece,
        });

        self.send(msg.signer(), DkgMessage::SharePiece(reply));

        Ok(())
    }

    /// Aggregates once every piece is in, persists the joined group and
    /// announces the signing key and the group key.
    fn finish_exchange(&self, group_hash: &Hash) -> NodeResult<Option<GroupInfo>> {
        let (keys, info, member_sign_pks) = {
            let mut sessions = self.sessions.write();

            let session = match sessions.get_mut(group_hash) {
                Some(s) if s.status() == SessionStatus::SendShare && s.has_all_pieces() => s,
                _ => return Ok(None),
            };

            let keys = session.aggregate()?;

            session.advance(SessionStatus::SendInited)?;

            (
                keys,
                session.init_info().clone(),
                session.member_sign_pks().clone(),
            )
        };

        let group_id = Id::from_public_key(&keys.group_pk);

        self.ctx.store.save(JoinedGroupInfo {
            group_id,
            group_hash: *group_hash,
            group_pk: keys.group_pk,
            sign_secret: keys.sign_secret.clone(),
            member_sign_pks,
        })?;

        info!(group = ?group_id, group_hash = %group_hash, "key exchange finished");

        let sign_pk = self.ctx.sign(SignPubKey {
            group_hash: *group_hash,
            group_id,
            sign_pk: keys.sign_public,
            pop: keys.sign_secret.sign(group_hash.as_bytes()),
        });

        self.ctx.network.send_to_group(
            &info.members,
            ConsensusMessage::Dkg(DkgMessage::SignPubKey(sign_pk)),
        );

        let inited = self.ctx.sign(GroupInited {
            init_info: info,
            group_pk: keys.group_pk,
            member_sign: keys.sign_secret.sign(group_hash.as_bytes()),
        });

        self.ctx
            .network
            .broadcast(ConsensusMessage::Dkg(DkgMessage::GroupInited(inited.clone())));

        let accepted = self.handle_group_inited(inited)?;

        // accepted on other members' reports before this exchange finished
        if accepted.is_none() && self.is_accepted(group_hash) {
            self.mark_done(group_hash)?;
        }

        Ok(accepted)
    }

    fn mark_done(&self, group_hash: &Hash) -> NodeResult<()> {
        if let Some(session) = self.sessions.write().get_mut(group_hash) {
            if session.status() == SessionStatus::SendInited {
                session.advance(SessionStatus::Done)?;
            }
        }

        Ok(())
    }

    /// Keeps a member's signing key announced before this node finished its
    /// own exchange. Returns `false` when no session matches.
    pub fn add_member_sign_pk(&self, group_hash: &Hash, member: Id, sign_pk: PublicKey) -> bool {
        match self.sessions.write().get_mut(group_hash) {
            Some(session) => session.add_member_sign_pk(member, sign_pk).is_ok(),
            None => false,
        }
    }

    fn handle_group_inited(&self, msg: SignedMessage<GroupInited>) -> NodeResult<Option<GroupInfo>> {
        let body = &msg.body;

        let group_hash = body.init_info.group_hash();

        if self.is_accepted(&group_hash) {
            return Ok(None);
        }

        self.ensure_collector(&body.init_info)?;

        let outcome = match self.inited.write().get_mut(&group_hash) {
            Some(ctx) => ctx.add_inited(msg.signer(), body.group_pk, body.member_sign),
            None => return Ok(None),
        };

        match outcome {
            Ok(InitedOutcome::Accepted(group)) => self.accept(group).map(Some),
            Ok(InitedOutcome::Waiting) | Err(DKGError::AlreadyFinished) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn accept(&self, group: GroupInfo) -> NodeResult<GroupInfo> {
        let group_hash = group.group_hash();

        self.accepted
            .write()
            .insert(group_hash, group.header().ready_height);

        self.inited.write().remove(&group_hash);

        self.mark_done(&group_hash)?;

        match self.ctx.group_chain.add_group(group.clone()) {
            Ok(()) | Err(ChainError::GroupExisted(_)) => {}
            Err(e) => return Err(e.into()),
        }

        self.ctx.directory.write().add_group_info(group.clone());

        info!(
            group = ?group.group_id(),
            members = group.member_size(),
            work_height = group.work_height(),
            "group accepted"
        );

        Ok(group)
    }
}

fn raw_request(ctx: &CreatingGroupContext, header: GroupHeader) -> (Vec<Id>, CreateGroupRaw) {
    let raw = CreateGroupRaw {
        base_hash: ctx.base_hash(),
        header,
        members: ctx.members().to_vec(),
    };

    (ctx.parent().members().to_vec(), raw)
}
