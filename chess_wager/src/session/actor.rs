//! Session actor implementation with async message handling.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use uuid::Uuid;

use super::{
    config::SessionConfig,
    errors::{PreconditionError, SessionError, SessionResult},
    messages::{CloseReport, CommandResponse, SessionMessage, SessionNotice},
    state::{
        ConfirmedOutcome, Funding, JoinOffer, LocalExit, MatchIntent, MatchProgress, Role, Score,
        SessionPhase, SessionState,
    },
};
use crate::{
    channel::{
        ChannelEvent, ChannelResult, ClientCommand, ConnectionState, CreateRequest, GameInfo,
        MatchResult, MoveUpdate, RealtimeChannel, RoundOutcome, ServerEvent, StartInfo,
        Subscription,
    },
    constants::SESSION_INBOX_CAPACITY,
    escrow::{EscrowClient, EscrowError, EscrowReceipt, EscrowService, WalletSnapshot},
    types::{Colour, GameId},
};

/// Session actor handle for sending messages
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionMessage>,
    state: watch::Receiver<SessionState>,
    notices: broadcast::Sender<SessionNotice>,
}

impl SessionHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionMessage,
    ) -> SessionResult<T> {
        let (response, rx) = oneshot::channel();
        self.sender
            .send(build(response))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    async fn command(
        &self,
        build: impl FnOnce(CommandResponse) -> SessionMessage,
    ) -> SessionResult<()> {
        Ok(self.request(build).await??)
    }

    /// Open a new match. Rejected unless idle or ended.
    pub async fn submit(&self, intent: MatchIntent) -> SessionResult<()> {
        self.command(|response| SessionMessage::Submit { intent, response })
            .await
    }

    /// Ask the server for the terms of the game behind `code`.
    pub async fn join(&self, code: impl Into<String>) -> SessionResult<()> {
        let code = code.into();
        self.command(|response| SessionMessage::Join { code, response })
            .await
    }

    /// Fund the received join offer and accept the game.
    pub async fn accept_join(&self) -> SessionResult<()> {
        self.command(|response| SessionMessage::AcceptJoin { response })
            .await
    }

    pub async fn offer_draw(&self) -> SessionResult<()> {
        self.command(|response| SessionMessage::OfferDraw { response })
            .await
    }

    pub async fn accept_draw(&self) -> SessionResult<()> {
        self.command(|response| SessionMessage::AcceptDraw { response })
            .await
    }

    pub async fn resign(&self) -> SessionResult<()> {
        self.command(|response| SessionMessage::Resign { response })
            .await
    }

    pub async fn cancel(&self) -> SessionResult<()> {
        self.command(|response| SessionMessage::Cancel { response })
            .await
    }

    /// Leave the session. The actor stops once no escrow transaction is
    /// left in flight.
    pub async fn close(&self) -> SessionResult<CloseReport> {
        self.request(|response| SessionMessage::Close { response })
            .await
    }

    pub async fn update_wallet(&self, wallet: WalletSnapshot) -> SessionResult<()> {
        self.sender
            .send(SessionMessage::Wallet(wallet))
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Latest published state.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    pub fn notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.notices.subscribe()
    }

    /// Resolve once the actor has stopped, after `close` left no escrow
    /// transaction in flight or every handle was dropped.
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        while state.changed().await.is_ok() {}
    }

    /// Wait until the published state satisfies `predicate`.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&SessionState) -> bool,
    ) -> SessionResult<SessionState> {
        let mut state = self.state.clone();
        let matched = state
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| SessionError::Closed)?;
        Ok(matched.clone())
    }
}

/// Escrow funding the session walked away from before it settled.
#[derive(Debug)]
struct Orphan {
    game_id: GameId,
    role: Role,
}

/// Session actor coordinating escrow funding and server lifecycle events
/// for one player.
pub struct SessionActor {
    id: Uuid,

    config: SessionConfig,

    escrow: Arc<EscrowClient>,

    channel: Arc<dyn RealtimeChannel>,

    state: SessionState,

    inbox: mpsc::Receiver<SessionMessage>,

    /// Used by spawned tasks to post results back without keeping the
    /// inbox open on their own.
    outbox: mpsc::WeakSender<SessionMessage>,

    published: watch::Sender<SessionState>,

    notices: broadcast::Sender<SessionNotice>,

    next_attempt: u64,

    /// Escrow attempts abandoned by cancel or close, by attempt number
    orphans: HashMap<u64, Orphan>,

    /// Games this session left; events tagged for them are dropped
    retired: HashSet<GameId>,

    /// Abandoned game whose compensating cancel the server has not
    /// acknowledged yet. The server resolves a cancel by connection, so no
    /// new game may be opened until then.
    compensating: Option<GameId>,

    gas_task: Option<JoinHandle<()>>,

    closing: bool,
}

impl SessionActor {
    /// Create a new session actor
    ///
    /// # Arguments
    ///
    /// * `config` - Session configuration
    /// * `service` - Escrow contract transport
    /// * `channel` - Realtime channel to the matchmaking server
    ///
    /// # Returns
    ///
    /// * `(SessionActor, SessionHandle)` - Actor and handle for sending messages
    pub fn new(
        config: SessionConfig,
        service: Arc<dyn EscrowService>,
        channel: Arc<dyn RealtimeChannel>,
    ) -> (Self, SessionHandle) {
        let (sender, inbox) = mpsc::channel(SESSION_INBOX_CAPACITY);
        let (published, state_rx) = watch::channel(SessionState::new());
        let (notices, _) = broadcast::channel(SESSION_INBOX_CAPACITY);

        let escrow = Arc::new(EscrowClient::new(
            service,
            config.commission_percentage,
            config.gas_limit,
        ));

        let actor = Self {
            id: Uuid::new_v4(),
            config,
            escrow,
            channel,
            state: SessionState::new(),
            inbox,
            outbox: sender.downgrade(),
            published,
            notices: notices.clone(),
            next_attempt: 1,
            orphans: HashMap::new(),
            retired: HashSet::new(),
            compensating: None,
            gas_task: None,
            closing: false,
        };

        let handle = SessionHandle {
            sender,
            state: state_rx,
            notices,
        };

        (actor, handle)
    }

    /// Create an actor and run it on the current runtime.
    pub fn spawn(
        config: SessionConfig,
        service: Arc<dyn EscrowService>,
        channel: Arc<dyn RealtimeChannel>,
    ) -> SessionHandle {
        let (actor, handle) = Self::new(config, service, channel);
        tokio::spawn(actor.run());
        handle
    }

    /// Run the session actor event loop
    pub async fn run(mut self) {
        log::info!("Session {} starting", self.id);

        // Subscribe before connecting so no early event is missed
        let mut subscription = Some(self.channel.subscribe());
        if let Err(e) = self.channel.connect().await {
            log::error!("Session {}: channel connect failed: {}", self.id, e);
            self.notify(SessionNotice::ChannelError(e.to_string()));
        }

        let mut gas_refresh = interval(self.config.gas_refresh);
        gas_refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                message = self.inbox.recv() => match message {
                    Some(message) => self.handle_message(message).await,
                    None => break,
                },

                event = next_event(&mut subscription) => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        log::warn!("Session {}: channel event stream ended", self.id);
                        subscription = None;
                    }
                },

                _ = gas_refresh.tick(), if !self.closing => self.refresh_gas(),
            }

            self.publish();

            if self.closing && self.orphans.is_empty() {
                break;
            }
        }

        if let Some(task) = self.gas_task.take() {
            task.abort();
        }
        drop(subscription);
        if let Err(e) = self.channel.disconnect().await {
            log::warn!("Session {}: channel disconnect failed: {}", self.id, e);
        }

        log::info!("Session {} closed ({})", self.id, self.state.phase());
    }

    fn publish(&self) {
        self.published.send_if_modified(|current| {
            if *current == self.state {
                false
            } else {
                *current = self.state.clone();
                true
            }
        });
    }

    fn notify(&self, notice: SessionNotice) {
        // Nobody listening is fine
        let _ = self.notices.send(notice);
    }

    /// Handle a session message
    async fn handle_message(&mut self, message: SessionMessage) {
        let is_command = !matches!(
            message,
            SessionMessage::Wallet(_)
                | SessionMessage::GasQuote(_)
                | SessionMessage::EscrowSettled { .. }
        );
        if self.closing && is_command {
            log::debug!("Session {} closing, dropping {:?}", self.id, message);
            return;
        }

        match message {
            SessionMessage::Submit { intent, response } => {
                let result = self.handle_submit(intent).await;
                self.reply("submit", response, result);
            }

            SessionMessage::Join { code, response } => {
                let result = self.handle_join(&code).await;
                self.reply("join", response, result);
            }

            SessionMessage::AcceptJoin { response } => {
                let result = self.handle_accept_join();
                self.reply("accept join", response, result);
            }

            SessionMessage::OfferDraw { response } => {
                let result = self.handle_offer_draw().await;
                self.reply("offer draw", response, result);
            }

            SessionMessage::AcceptDraw { response } => {
                let result = self.handle_accept_draw().await;
                self.reply("accept draw", response, result);
            }

            SessionMessage::Resign { response } => {
                let result = self.handle_resign().await;
                self.reply("resign", response, result);
            }

            SessionMessage::Cancel { response } => {
                let result = self.handle_cancel().await;
                self.reply("cancel", response, result);
            }

            SessionMessage::Close { response } => {
                let report = self.handle_close().await;
                self.publish();
                let _ = response.send(report);
            }

            SessionMessage::Wallet(wallet) => {
                log::debug!(
                    "Session {}: wallet {:?} balance {}",
                    self.id,
                    wallet.address,
                    wallet.balance
                );
                self.state.set_wallet(wallet);
            }

            SessionMessage::GasQuote(result) => {
                self.gas_task = None;
                match result {
                    Ok(quote) => self.state.set_gas_quote(quote),
                    Err(e) => log::warn!(
                        "Session {}: gas price refresh failed, keeping previous quote: {}",
                        self.id,
                        e
                    ),
                }
            }

            SessionMessage::EscrowSettled {
                attempt,
                game_id,
                result,
            } => self.handle_escrow_settled(attempt, game_id, result).await,
        }
    }

    fn reply(
        &self,
        action: &str,
        response: CommandResponse,
        result: Result<(), PreconditionError>,
    ) {
        if let Err(e) = &result {
            log::debug!("Session {}: {} rejected: {}", self.id, action, e);
        }
        // Callers observe the transition as soon as their command returns
        self.publish();
        let _ = response.send(result);
    }

    fn invalid(&self, action: &'static str) -> PreconditionError {
        PreconditionError::InvalidAction {
            action,
            phase: self.state.phase(),
        }
    }

    fn busy(&self) -> PreconditionError {
        match self.state.details() {
            SessionPhase::Idle { .. } => PreconditionError::CancelPending,
            other => PreconditionError::SessionBusy(other.kind()),
        }
    }

    /// An abandoned escrow is still unresolved or its cancel unacknowledged.
    fn settling(&self) -> bool {
        !self.orphans.is_empty() || self.compensating.is_some()
    }

    fn take_attempt(&mut self) -> u64 {
        let attempt = self.next_attempt;
        self.next_attempt += 1;
        attempt
    }

    /// Stop listening to the current game, if any.
    fn retire_current(&mut self) {
        if let Some(game_id) = self.state.game_id().cloned() {
            self.retired.insert(game_id);
        }
    }

    /// Send, reopening a dropped connection first.
    ///
    /// Subscriptions survive the reconnect, so events the server replays
    /// afterwards reach the session unchanged.
    async fn transmit(&self, command: ClientCommand) -> ChannelResult<()> {
        if self.channel.state() == ConnectionState::Disconnected {
            log::info!("Session {}: channel down, reconnecting", self.id);
            self.channel.connect().await?;
        }
        self.channel.send(command).await
    }

    async fn send(&self, command: ClientCommand) -> Result<(), PreconditionError> {
        self.transmit(command)
            .await
            .map_err(|e| PreconditionError::ChannelUnavailable(e.to_string()))
    }

    async fn send_best_effort(&self, command: ClientCommand) {
        if let Err(e) = self.transmit(command.clone()).await {
            log::warn!("Session {}: failed to send {}: {}", self.id, command, e);
        }
    }

    async fn handle_submit(&mut self, intent: MatchIntent) -> Result<(), PreconditionError> {
        if !self.state.accepts_intent() {
            return Err(self.busy());
        }
        if self.settling() {
            return Err(PreconditionError::EscrowSettling);
        }

        let wallet = self.state.wallet().clone();
        let address = wallet
            .address
            .clone()
            .ok_or(PreconditionError::WalletNotConnected)?;
        let quote = self
            .state
            .gas_quote()
            .cloned()
            .ok_or(PreconditionError::GasPriceUnavailable)?;
        intent.validate(self.config.max_wager)?;
        self.escrow
            .check_affordable(intent.wager, &wallet, Some(&quote))?;

        self.send(ClientCommand::Create(CreateRequest {
            time_control: intent.time_control,
            wager_amount: intent.wager,
            address,
            rounds: intent.rounds,
        }))
        .await?;

        self.retire_current();
        let attempt = self.take_attempt();
        log::info!(
            "Session {}: create sent (attempt {}, wager {}, {} rounds)",
            self.id,
            attempt,
            intent.wager,
            intent.rounds
        );

        self.state.set_error(None);
        self.state.enter(SessionPhase::CreatingEscrow {
            funding: Funding::Create(intent),
            game_id: None,
            attempt,
        });
        Ok(())
    }

    async fn handle_join(&mut self, code: &str) -> Result<(), PreconditionError> {
        if !self.state.accepts_intent() {
            return Err(self.busy());
        }
        if self.settling() {
            return Err(PreconditionError::EscrowSettling);
        }
        let game_id = GameId::parse_code(code).map_err(|_| PreconditionError::InvalidGameCode)?;

        self.send(ClientCommand::GetGameDetails {
            game_id: game_id.clone(),
        })
        .await?;

        self.retire_current();
        self.retired.remove(&game_id);
        self.state.set_error(None);
        self.state.enter(SessionPhase::Idle {
            cancelling: None,
            requested_join: Some(game_id),
            join_offer: None,
        });
        Ok(())
    }

    fn handle_accept_join(&mut self) -> Result<(), PreconditionError> {
        let offer = match self.state.details() {
            SessionPhase::Idle {
                cancelling: Some(_),
                ..
            } => return Err(PreconditionError::CancelPending),
            SessionPhase::Idle {
                join_offer: Some(offer),
                ..
            } => offer.clone(),
            SessionPhase::Idle { .. } | SessionPhase::Ended { .. } => {
                return Err(PreconditionError::NoJoinOffer);
            }
            other => return Err(PreconditionError::SessionBusy(other.kind())),
        };
        if self.settling() {
            return Err(PreconditionError::EscrowSettling);
        }

        let wallet = self.state.wallet().clone();
        if !wallet.is_connected() {
            return Err(PreconditionError::WalletNotConnected);
        }
        let quote = self
            .state
            .gas_quote()
            .ok_or(PreconditionError::GasPriceUnavailable)?;
        self.escrow
            .check_affordable(offer.wager, &wallet, Some(quote))?;

        let attempt = self.take_attempt();
        log::info!(
            "Session {}: funding join of game {} (attempt {})",
            self.id,
            offer.game_id,
            attempt
        );

        let game_id = offer.game_id.clone();
        let funding = Funding::Join(offer);
        self.state.set_error(None);
        self.state.enter(SessionPhase::CreatingEscrow {
            funding: funding.clone(),
            game_id: Some(game_id.clone()),
            attempt,
        });
        self.spawn_funding(attempt, funding, game_id);
        Ok(())
    }

    async fn handle_offer_draw(&mut self) -> Result<(), PreconditionError> {
        let allowed = matches!(
            self.state.details(),
            SessionPhase::Playing { progress, .. } if !progress.between_rounds && !progress.draw_offered
        );
        if !allowed {
            return Err(self.invalid("offer a draw"));
        }

        self.send(ClientCommand::OfferDraw).await?;
        if let SessionPhase::Playing { progress, .. } = self.state.phase_mut() {
            progress.draw_offered = true;
        }
        Ok(())
    }

    async fn handle_accept_draw(&mut self) -> Result<(), PreconditionError> {
        if !matches!(
            self.state.details(),
            SessionPhase::DrawOffered {
                accepted: false,
                ..
            }
        ) {
            return Err(self.invalid("accept a draw"));
        }

        self.send(ClientCommand::AcceptDraw).await?;
        if let SessionPhase::DrawOffered { accepted, .. } = self.state.phase_mut() {
            *accepted = true;
        }
        Ok(())
    }

    async fn handle_resign(&mut self) -> Result<(), PreconditionError> {
        let (receipt, progress) = match self.state.details() {
            SessionPhase::Playing { receipt, progress }
            | SessionPhase::DrawOffered {
                receipt, progress, ..
            } => (receipt.clone(), progress.clone()),
            _ => return Err(self.invalid("resign")),
        };

        self.send_best_effort(ClientCommand::Resign).await;
        log::info!("Session {}: resigned game {}", self.id, receipt.game_id);

        self.state.enter(SessionPhase::Ended {
            receipt,
            progress,
            local_exit: Some(LocalExit::Resigned),
            confirmed: None,
        });
        Ok(())
    }

    async fn handle_cancel(&mut self) -> Result<(), PreconditionError> {
        match self.state.details().clone() {
            SessionPhase::Idle {
                cancelling: Some(_),
                ..
            } => Err(PreconditionError::CancelPending),

            // Declining a join offer needs no server round trip
            SessionPhase::Idle {
                requested_join,
                join_offer,
                ..
            } if requested_join.is_some() || join_offer.is_some() => {
                self.retire_current();
                self.state.enter(SessionPhase::idle());
                Ok(())
            }

            SessionPhase::CreatingEscrow {
                funding: Funding::Create(_),
                game_id: None,
                ..
            } => {
                self.send_best_effort(ClientCommand::Cancel {
                    created_on_contract: false,
                })
                .await;
                log::info!("Session {}: create cancelled before a game id", self.id);
                self.state.enter(SessionPhase::idle());
                self.notify(SessionNotice::Cancelled);
                Ok(())
            }

            // The transaction cannot be recalled; settle it once it resolves
            SessionPhase::CreatingEscrow {
                funding: Funding::Create(_),
                game_id: Some(game_id),
                attempt,
            } => {
                log::info!(
                    "Session {}: cancel of game {} deferred until its escrow settles",
                    self.id,
                    game_id
                );
                self.retired.insert(game_id.clone());
                self.orphans.insert(
                    attempt,
                    Orphan {
                        game_id,
                        role: Role::Creator,
                    },
                );
                self.state.enter(SessionPhase::idle());
                self.notify(SessionNotice::Cancelled);
                Ok(())
            }

            SessionPhase::AwaitingOpponent {
                receipt,
                role: Role::Creator,
            } => {
                self.send(ClientCommand::Cancel {
                    created_on_contract: true,
                })
                .await?;
                log::info!("Session {}: cancelling funded game {}", self.id, receipt.game_id);
                self.state.enter(SessionPhase::Idle {
                    cancelling: Some(receipt),
                    requested_join: None,
                    join_offer: None,
                });
                Ok(())
            }

            _ => Err(self.invalid("cancel")),
        }
    }

    async fn handle_close(&mut self) -> CloseReport {
        let mut report = CloseReport {
            clean: self.state.is_settled(),
            phase: self.state.phase(),
            settling: false,
        };

        match self.state.details().clone() {
            SessionPhase::CreatingEscrow {
                funding,
                game_id: Some(game_id),
                attempt,
            } => {
                self.retired.insert(game_id.clone());
                self.orphans.insert(
                    attempt,
                    Orphan {
                        game_id,
                        role: funding.role(),
                    },
                );
                self.state.enter(SessionPhase::idle());
            }
            SessionPhase::CreatingEscrow { game_id: None, .. } => {
                self.send_best_effort(ClientCommand::Cancel {
                    created_on_contract: false,
                })
                .await;
                self.state.enter(SessionPhase::idle());
            }
            SessionPhase::AwaitingOpponent {
                role: Role::Creator,
                ..
            } => {
                self.send_best_effort(ClientCommand::Cancel {
                    created_on_contract: true,
                })
                .await;
            }
            SessionPhase::AwaitingOpponent {
                role: Role::Joiner,
                ..
            } => self.send_best_effort(ClientCommand::Exit).await,
            SessionPhase::Playing { receipt, progress }
            | SessionPhase::DrawOffered {
                receipt, progress, ..
            } => {
                self.send_best_effort(ClientCommand::Exit).await;
                self.state.enter(SessionPhase::Ended {
                    receipt,
                    progress,
                    local_exit: Some(LocalExit::Abandoned),
                    confirmed: None,
                });
            }
            SessionPhase::Idle { .. } | SessionPhase::Ended { .. } => {}
        }

        if !report.clean {
            log::warn!(
                "Session {} closed while {}, the wager may be left unsettled",
                self.id,
                report.phase
            );
        }
        self.closing = true;
        report.settling = !self.orphans.is_empty();
        report
    }

    fn spawn_funding(&mut self, attempt: u64, funding: Funding, game_id: GameId) {
        let Some(outbox) = self.outbox.upgrade() else {
            log::error!("Session {}: inbox closed, not funding {}", self.id, game_id);
            return;
        };
        let escrow = self.escrow.clone();
        let wallet = self.state.wallet().clone();
        let quote = self.state.gas_quote().cloned();

        tokio::spawn(async move {
            let result = match funding {
                Funding::Create(intent) => {
                    escrow
                        .fund_game(&game_id, intent.wager, &wallet, quote.as_ref())
                        .await
                }
                Funding::Join(offer) => {
                    escrow
                        .join_game(&game_id, offer.wager, &wallet, quote.as_ref())
                        .await
                }
            };
            let _ = outbox
                .send(SessionMessage::EscrowSettled {
                    attempt,
                    game_id,
                    result,
                })
                .await;
        });
    }

    fn refresh_gas(&mut self) {
        if self.gas_task.is_some() {
            return;
        }
        let Some(outbox) = self.outbox.upgrade() else {
            return;
        };
        let escrow = self.escrow.clone();

        self.gas_task = Some(tokio::spawn(async move {
            let result = escrow.estimate_gas_price().await;
            let _ = outbox.send(SessionMessage::GasQuote(result)).await;
        }));
    }

    async fn handle_escrow_settled(
        &mut self,
        attempt: u64,
        game_id: GameId,
        result: Result<EscrowReceipt, EscrowError>,
    ) {
        let current = match self.state.details() {
            SessionPhase::CreatingEscrow {
                funding,
                attempt: current,
                ..
            } if *current == attempt => Some(funding.clone()),
            _ => None,
        };

        if let Some(funding) = current {
            match result {
                Ok(receipt) => self.on_funded(funding, receipt).await,
                Err(e) => {
                    let reason = e.reason();
                    log::warn!(
                        "Session {}: escrow for game {} failed: {}",
                        self.id,
                        game_id,
                        reason
                    );
                    // Tear down the unfunded server record
                    if funding.role() == Role::Creator {
                        self.send_best_effort(ClientCommand::Cancel {
                            created_on_contract: false,
                        })
                        .await;
                    }
                    self.retired.insert(game_id);
                    self.state.set_error(Some(reason.clone()));
                    self.state.enter(SessionPhase::idle());
                    self.notify(SessionNotice::EscrowFailed(reason));
                }
            }
            return;
        }

        let Some(orphan) = self.orphans.remove(&attempt) else {
            log::warn!(
                "Session {}: ignoring escrow result for unknown attempt {}",
                self.id,
                attempt
            );
            return;
        };

        match (result, orphan.role) {
            (Ok(_), Role::Creator) => {
                log::warn!(
                    "Session {}: abandoned game {} was funded, cancelling on contract",
                    self.id,
                    orphan.game_id
                );
                self.compensate(orphan.game_id.clone(), true).await;
                self.notify(SessionNotice::CompensatingCancel(orphan.game_id));
            }
            (Ok(_), Role::Joiner) => {
                log::error!(
                    "Session {}: joined game {} was funded after the session left it",
                    self.id,
                    orphan.game_id
                );
                self.send_best_effort(ClientCommand::Exit).await;
            }
            (Err(_), Role::Creator) => self.compensate(orphan.game_id, false).await,
            (Err(e), Role::Joiner) => log::debug!(
                "Session {}: abandoned join of {} failed: {}",
                self.id,
                orphan.game_id,
                e
            ),
        }
    }

    /// Cancel an abandoned game on the server and hold new games until the
    /// cancel is acknowledged.
    async fn compensate(&mut self, game_id: GameId, created_on_contract: bool) {
        let command = ClientCommand::Cancel {
            created_on_contract,
        };
        match self.transmit(command).await {
            Ok(()) => self.compensating = Some(game_id),
            Err(e) => log::error!(
                "Session {}: cancel of abandoned game {} not sent: {}",
                self.id,
                game_id,
                e
            ),
        }
    }

    /// Consume the acknowledgement of a compensating cancel.
    fn take_compensation_ack(&mut self, event: &ChannelEvent) -> bool {
        let Some(pending) = &self.compensating else {
            return false;
        };
        if event.event != ServerEvent::GameCancelled {
            return false;
        }
        if event.game_id.as_ref().is_some_and(|tagged| tagged != pending) {
            return false;
        }

        log::info!("Session {}: cancel of abandoned game {} acknowledged", self.id, pending);
        self.compensating = None;
        true
    }

    async fn on_funded(&mut self, funding: Funding, receipt: EscrowReceipt) {
        let game_id = receipt.game_id.clone();
        match funding.role() {
            Role::Creator => {
                log::info!("Session {}: game {} funded, awaiting opponent", self.id, game_id);
                self.state.enter(SessionPhase::AwaitingOpponent {
                    receipt,
                    role: Role::Creator,
                });
                self.notify(SessionNotice::GameCreated(game_id));
            }
            Role::Joiner => {
                match self.state.wallet().address.clone() {
                    Some(address) => {
                        if let Err(e) = self
                            .send(ClientCommand::AcceptGame {
                                game_id: game_id.clone(),
                                address,
                            })
                            .await
                        {
                            log::error!("Session {}: accept of {} not sent: {}", self.id, game_id, e);
                            self.state.set_error(Some(e.to_string()));
                        }
                    }
                    None => {
                        log::error!(
                            "Session {}: wallet disconnected before accepting {}",
                            self.id,
                            game_id
                        );
                        self.state
                            .set_error(Some(PreconditionError::WalletNotConnected.to_string()));
                    }
                }
                log::info!("Session {}: joined game {}, awaiting start", self.id, game_id);
                self.state.enter(SessionPhase::AwaitingOpponent {
                    receipt,
                    role: Role::Joiner,
                });
            }
        }
    }

    fn is_stale(&self, event: &ChannelEvent) -> bool {
        let Some(tagged) = &event.game_id else {
            return false;
        };
        if self.retired.contains(tagged) {
            return true;
        }
        matches!(self.state.game_id(), Some(current) if current != tagged)
    }

    /// Handle an inbound channel event
    async fn handle_event(&mut self, event: ChannelEvent) {
        if self.take_compensation_ack(&event) {
            return;
        }
        if self.is_stale(&event) {
            log::debug!(
                "Session {}: dropping {} for stale game {:?}",
                self.id,
                event.event.name(),
                event.game_id
            );
            return;
        }

        match event.event {
            ServerEvent::GameId(token) => self.on_game_id(token),
            ServerEvent::GameInfo(info) => self.on_game_info(info),
            ServerEvent::Start(info) => self.on_start(info),
            ServerEvent::DrawOffer => self.on_draw_offer(),
            ServerEvent::Move(update) => self.on_move(update),
            ServerEvent::MatchEnded(result) => self.on_match_ended(result),
            ServerEvent::GameCancelled => self.on_game_cancelled(),
            ServerEvent::Error(message) => self.on_server_error(message),
        }
    }

    fn on_game_id(&mut self, token: GameId) {
        let (funding, attempt) = match self.state.details() {
            SessionPhase::CreatingEscrow {
                funding: funding @ Funding::Create(_),
                game_id: None,
                attempt,
            } => (funding.clone(), *attempt),
            other => {
                log::debug!(
                    "Session {}: ignoring game id {} while {}",
                    self.id,
                    token,
                    other.kind()
                );
                return;
            }
        };

        log::info!("Session {}: server issued game {}, funding escrow", self.id, token);
        self.retired.remove(&token);
        if let SessionPhase::CreatingEscrow { game_id, .. } = self.state.phase_mut() {
            *game_id = Some(token.clone());
        }
        self.spawn_funding(attempt, funding, token);
    }

    fn on_game_info(&mut self, info: GameInfo) {
        let offer = match self.state.phase_mut() {
            SessionPhase::Idle {
                cancelling: None,
                requested_join,
                join_offer,
            } => match requested_join.take() {
                Some(game_id) => {
                    let offer = JoinOffer::from_info(game_id, info);
                    *join_offer = Some(offer.clone());
                    offer
                }
                None => return,
            },
            _ => {
                log::debug!("Session {}: unsolicited game info ignored", self.id);
                return;
            }
        };

        log::info!(
            "Session {}: offer for game {}: wager {}, {}, {} rounds",
            self.id,
            offer.game_id,
            offer.wager,
            offer.time_control,
            offer.total_rounds
        );
        self.notify(SessionNotice::JoinOfferReceived(offer));
    }

    fn on_start(&mut self, info: StartInfo) {
        let next = match self.state.details().clone() {
            SessionPhase::AwaitingOpponent { receipt, .. } => SessionPhase::Playing {
                receipt,
                progress: MatchProgress::from_start(&info),
            },

            // Start wins over a cancellation the server never acknowledged
            SessionPhase::Idle {
                cancelling: Some(receipt),
                ..
            } => {
                log::warn!(
                    "Session {}: game {} started before the cancel was acknowledged",
                    self.id,
                    receipt.game_id
                );
                SessionPhase::Playing {
                    receipt,
                    progress: MatchProgress::from_start(&info),
                }
            }

            SessionPhase::Playing {
                receipt,
                mut progress,
            }
            | SessionPhase::DrawOffered {
                receipt,
                mut progress,
                ..
            } => {
                if info.round <= progress.round && !progress.between_rounds {
                    log::debug!("Session {}: duplicate start of round {}", self.id, info.round);
                    return;
                }
                progress.next_round(&info);
                SessionPhase::Playing { receipt, progress }
            }

            other => {
                log::warn!("Session {}: ignoring start while {}", self.id, other.kind());
                return;
            }
        };

        log::info!(
            "Session {}: round {}/{} started as {}",
            self.id,
            info.round,
            info.total_rounds,
            info.colour
        );
        self.state.mark_starting();
        self.state.enter(next);
        self.notify(SessionNotice::RoundStarted {
            round: info.round,
            total_rounds: info.total_rounds,
        });
    }

    fn on_draw_offer(&mut self) {
        match self.state.details().clone() {
            SessionPhase::Playing { receipt, progress } if !progress.between_rounds => {
                self.state.enter(SessionPhase::DrawOffered {
                    receipt,
                    progress,
                    accepted: false,
                });
                self.notify(SessionNotice::DrawOffered);
            }
            other => log::debug!(
                "Session {}: ignoring draw offer while {}",
                self.id,
                other.kind()
            ),
        }
    }

    fn on_move(&mut self, update: MoveUpdate) {
        // Plain board moves do not concern the session
        let Some(outcome) = update.outcome else {
            return;
        };
        let (receipt, mut progress) = match self.state.details() {
            SessionPhase::Playing { receipt, progress }
            | SessionPhase::DrawOffered {
                receipt, progress, ..
            } => (receipt.clone(), progress.clone()),
            other => {
                log::debug!(
                    "Session {}: ignoring round result while {}",
                    self.id,
                    other.kind()
                );
                return;
            }
        };
        let winner = update.winner.and_then(Colour::from_player_index);

        if outcome == RoundOutcome::Abandoned {
            // The match result follows; the score is left as it was
            if winner != Some(progress.colour) {
                log::warn!(
                    "Session {}: abandonment of game {} names {:?} as winner",
                    self.id,
                    receipt.game_id,
                    winner
                );
                return;
            }
            log::info!("Session {}: opponent abandoned game {}", self.id, receipt.game_id);
            progress.between_rounds = true;
            self.state.enter(SessionPhase::Playing { receipt, progress });
            self.notify(SessionNotice::OpponentAbandoned);
            return;
        }

        if progress.between_rounds {
            log::debug!("Session {}: duplicate result of round {}", self.id, progress.round);
            return;
        }
        if let Some(winner) = winner {
            progress.score.credit(winner, progress.colour);
        }
        progress.between_rounds = true;
        log::info!(
            "Session {}: round {} ended ({}), score {}",
            self.id,
            progress.round,
            outcome,
            progress.score
        );

        let score = progress.score;
        self.state
            .enter(SessionPhase::Playing { receipt, progress });
        self.notify(SessionNotice::RoundEnded(score));
    }

    fn on_match_ended(&mut self, result: MatchResult) {
        let (receipt, progress, local_exit) = match self.state.details() {
            SessionPhase::Playing { receipt, progress }
            | SessionPhase::DrawOffered {
                receipt, progress, ..
            } => (receipt.clone(), progress.clone(), None),
            SessionPhase::Ended {
                receipt,
                progress,
                local_exit,
                confirmed: None,
            } => (receipt.clone(), progress.clone(), *local_exit),
            SessionPhase::Ended {
                confirmed: Some(_), ..
            } => {
                log::debug!("Session {}: match result already confirmed", self.id);
                return;
            }
            other => {
                log::warn!(
                    "Session {}: ignoring match result while {}",
                    self.id,
                    other.kind()
                );
                return;
            }
        };

        let Some(confirmed) = ConfirmedOutcome::from_result(&result, progress.colour, progress.score)
        else {
            log::warn!(
                "Session {}: match result with unknown winner {:?}",
                self.id,
                result.overall_winner
            );
            return;
        };

        log::info!(
            "Session {}: game {} ended, {} ({})",
            self.id,
            receipt.game_id,
            confirmed.outcome,
            confirmed.score
        );
        self.state.enter(SessionPhase::Ended {
            receipt,
            progress,
            local_exit,
            confirmed: Some(confirmed.clone()),
        });
        self.notify(SessionNotice::MatchEnded(confirmed));
    }

    fn on_game_cancelled(&mut self) {
        match self.state.details().clone() {
            SessionPhase::Idle {
                cancelling: Some(receipt),
                ..
            } => {
                log::info!("Session {}: cancel of {} acknowledged", self.id, receipt.game_id);
                self.retired.insert(receipt.game_id);
                self.state.enter(SessionPhase::idle());
                self.notify(SessionNotice::Cancelled);
            }
            SessionPhase::AwaitingOpponent { receipt, .. } => {
                log::warn!("Session {}: server cancelled game {}", self.id, receipt.game_id);
                self.retired.insert(receipt.game_id);
                self.state.enter(SessionPhase::idle());
                self.notify(SessionNotice::Cancelled);
            }
            SessionPhase::CreatingEscrow { game_id: None, .. } => {
                self.state.enter(SessionPhase::idle());
                self.notify(SessionNotice::Cancelled);
            }
            other => log::debug!(
                "Session {}: ignoring cancellation while {}",
                self.id,
                other.kind()
            ),
        }
    }

    fn on_server_error(&mut self, message: String) {
        log::warn!("Session {}: server error: {}", self.id, message);

        if let Some(game_id) = self.compensating.take() {
            log::warn!(
                "Session {}: no acknowledgement for the cancel of abandoned game {}",
                self.id,
                game_id
            );
        }

        // Server refused the create or the join code
        let refused = matches!(
            self.state.details(),
            SessionPhase::CreatingEscrow { game_id: None, .. }
                | SessionPhase::Idle {
                    cancelling: None,
                    requested_join: Some(_),
                    ..
                }
        );
        if refused {
            self.state.enter(SessionPhase::idle());
        }

        self.state.set_error(Some(message.clone()));
        self.notify(SessionNotice::ServerError(message));
    }
}

async fn next_event(subscription: &mut Option<Subscription>) -> Option<ChannelEvent> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}
