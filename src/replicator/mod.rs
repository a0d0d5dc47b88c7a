//! Keeps one puzzle's solver state consistent between the local cache, this
//! session's observers and the backend copy shared with other sessions.
//!
//! Local edits are written to the cache, published, then pushed without
//! waiting. The backend copy wins whenever it was written by another session:
//! on start-up, on every push notification and on the periodic reconcile.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::api::CloverApi;
use crate::feedback::{classify_layout, CardState};
use crate::puzzle::{share_text, BoardError, GuessRecord, Puzzle, PuzzleId, Selection};
use crate::realtime::{GameUpdateFeed, PushMessage, Subscription};
use crate::spawn_named_task;
use crate::state::{BoardState, ClientId, RemoteState, ReplicatedState};
use crate::storage::{load_usable_state, save_state, KeyValueStore};

mod error;

pub use error::ReplicatorError;

const LOG_TARGET: &str = "clover::replicator";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_INBOX_CAPACITY: usize = 64;
const DEFAULT_PLAY_URL_BASE: &str = "http://localhost:3000/games/";

#[derive(Debug, Clone)]
pub struct ReplicatorConfig {
    /// Period of the reconcile timer. The first tick is one full period after
    /// start, and every push notification pushes the next tick a full period
    /// out.
    pub poll_interval: Duration,
    pub inbox_capacity: usize,
    /// Prefix of the link included in share text; the puzzle id is appended.
    pub play_url_base: String,
}

impl Default for ReplicatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
            play_url_base: DEFAULT_PLAY_URL_BASE.to_string(),
        }
    }
}

impl ReplicatorConfig {
    pub fn play_url(&self, puzzle_id: &PuzzleId) -> String {
        format!("{}{}", self.play_url_base, puzzle_id)
    }
}

/// Starts replication sessions against one set of collaborators.
pub struct StateReplicator {
    cfg: ReplicatorConfig,
    api: Arc<dyn CloverApi>,
    feed: Arc<dyn GameUpdateFeed>,
    store: Arc<dyn KeyValueStore>,
    client_id: Option<ClientId>,
}

impl StateReplicator {
    pub fn new(
        cfg: ReplicatorConfig,
        api: Arc<dyn CloverApi>,
        feed: Arc<dyn GameUpdateFeed>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            cfg,
            api,
            feed,
            store,
            client_id: None,
        }
    }

    /// Token the api sends with every request. Remote copies carrying it
    /// count as this session's own from the start instead of after the first
    /// push echo.
    pub fn with_client_id(mut self, client_id: ClientId) -> Self {
        self.client_id = Some(client_id);
        self
    }

    pub fn config(&self) -> &ReplicatorConfig {
        &self.cfg
    }

    /// Loads the puzzle, settles the initial state and starts listening.
    ///
    /// Only a failure to fetch the puzzle itself is an error. An unreachable
    /// remote copy or push channel leaves the session running on local state
    /// with polling as the backstop.
    pub async fn initialize(&self, puzzle_id: PuzzleId) -> Result<SessionHandle, ReplicatorError> {
        let puzzle = self
            .api
            .fetch_puzzle(&puzzle_id)
            .await
            .map_err(ReplicatorError::Puzzle)?;

        let local = load_usable_state(self.store.as_ref(), &puzzle)
            .unwrap_or_else(|| ReplicatedState::for_puzzle(&puzzle));
        if let Err(err) = save_state(self.store.as_ref(), &puzzle_id, &local) {
            warn!(target: LOG_TARGET, %puzzle_id, error = %err, "failed to cache initial state");
        }

        let (state_tx, _) = watch::channel(local);
        let shared = Arc::new(Shared {
            play_url: self.cfg.play_url(&puzzle_id),
            puzzle_id: puzzle_id.clone(),
            puzzle,
            api: Arc::clone(&self.api),
            store: Arc::clone(&self.store),
            state: state_tx,
            write_lock: Mutex::new(()),
            own_client: Mutex::new(self.client_id.clone()),
            selection: Mutex::new(Selection::default()),
            stop: CancellationToken::new(),
            pushes: TaskTracker::new(),
        });

        let remote = match self.api.fetch_remote_state(&puzzle_id).await {
            Ok(remote) => remote,
            Err(err) => {
                warn!(target: LOG_TARGET, %puzzle_id, error = %err, "remote state unavailable; treating as absent");
                None
            }
        };
        let adopted = match remote {
            Some(remote) => {
                debug!(target: LOG_TARGET, %puzzle_id, writer = %remote.client_id, "adopting remote state");
                shared.overwrite(remote)
            }
            None => false,
        };
        if !adopted {
            debug!(target: LOG_TARGET, %puzzle_id, "seeding remote state");
            shared.push(shared.snapshot().board).await;
        }

        let (inbox_tx, inbox_rx) = mpsc::channel(self.cfg.inbox_capacity);
        let subscription = match self.feed.subscribe(&puzzle_id, inbox_tx.clone()).await {
            Ok(subscription) => Some(subscription),
            Err(err) => {
                warn!(target: LOG_TARGET, %puzzle_id, error = %err, "push channel unavailable; relying on polling");
                None
            }
        };

        let driver = spawn_named_task(
            format!("clover-replicator-{puzzle_id}"),
            drive(Arc::clone(&shared), inbox_rx, self.cfg.poll_interval),
        );

        info!(target: LOG_TARGET, %puzzle_id, "replication session started");
        Ok(SessionHandle {
            shared,
            inbox: inbox_tx,
            subscription,
            driver: Some(driver),
        })
    }
}

struct Shared {
    puzzle_id: PuzzleId,
    puzzle: Puzzle,
    play_url: String,
    api: Arc<dyn CloverApi>,
    store: Arc<dyn KeyValueStore>,
    state: watch::Sender<ReplicatedState>,
    // serializes cache writes with publication and with teardown
    write_lock: Mutex<()>,
    own_client: Mutex<Option<ClientId>>,
    selection: Mutex<Selection>,
    stop: CancellationToken,
    pushes: TaskTracker,
}

impl Shared {
    fn snapshot(&self) -> ReplicatedState {
        self.state.borrow().clone()
    }

    fn is_own(&self, writer: &ClientId) -> bool {
        self.own_client.lock().as_ref() == Some(writer)
    }

    fn try_commit<E, F>(&self, mutate: F) -> Result<ReplicatedState, E>
    where
        F: FnOnce(&ReplicatedState) -> Result<ReplicatedState, E>,
    {
        let _guard = self.write_lock.lock();
        let next = mutate(&self.snapshot())?;
        Ok(self.store_and_publish(next))
    }

    fn commit<F>(&self, mutate: F) -> ReplicatedState
    where
        F: FnOnce(&ReplicatedState) -> ReplicatedState,
    {
        match self.try_commit(|current| Ok::<_, Infallible>(mutate(current))) {
            Ok(next) => next,
            Err(never) => match never {},
        }
    }

    /// Applies a change that originated at the backend. Ignored once the
    /// session is torn down.
    fn commit_remote<F>(&self, mutate: F) -> bool
    where
        F: FnOnce(&ReplicatedState) -> ReplicatedState,
    {
        let _guard = self.write_lock.lock();
        if self.stop.is_cancelled() {
            debug!(target: LOG_TARGET, puzzle_id = %self.puzzle_id, "dropping late backend result");
            return false;
        }
        let next = mutate(&self.snapshot());
        self.store_and_publish(next);
        true
    }

    fn store_and_publish(&self, next: ReplicatedState) -> ReplicatedState {
        if let Err(err) = save_state(self.store.as_ref(), &self.puzzle_id, &next) {
            warn!(target: LOG_TARGET, puzzle_id = %self.puzzle_id, error = %err, "failed to cache state");
        }
        self.state.send_replace(next.clone());
        next
    }

    /// Adopts a remote copy wholesale. A board that is not a layout of this
    /// puzzle is refused and the current state stays.
    fn overwrite(&self, remote: RemoteState) -> bool {
        if let Err(err) = remote.data.validate(&self.puzzle) {
            warn!(target: LOG_TARGET, puzzle_id = %self.puzzle_id, writer = %remote.client_id, error = %err, "ignoring invalid remote state");
            return false;
        }
        self.commit_remote(|current| current.superseded_by(remote))
    }

    async fn push(&self, board: BoardState) {
        match self.api.push_remote_state(&self.puzzle_id, &board).await {
            Ok(echo) => self.record_echo(echo.client_id),
            Err(err) => {
                warn!(target: LOG_TARGET, puzzle_id = %self.puzzle_id, error = %err, "failed to push state");
            }
        }
    }

    fn record_echo(&self, writer: ClientId) {
        let recorded = self.commit_remote(|current| ReplicatedState {
            client_id: Some(writer.clone()),
            ..current.clone()
        });
        if recorded {
            *self.own_client.lock() = Some(writer);
        }
    }

    fn spawn_push(self: &Arc<Self>) {
        let shared = Arc::clone(self);
        let board = self.snapshot().board;
        spawn_named_task(
            format!("clover-push-{}", self.puzzle_id),
            self.pushes.track_future(async move { shared.push(board).await }),
        );
    }

    async fn pull(&self) {
        match self.api.fetch_remote_state(&self.puzzle_id).await {
            Ok(Some(remote)) => {
                self.overwrite(remote);
            }
            Ok(None) => {
                debug!(target: LOG_TARGET, puzzle_id = %self.puzzle_id, "notified but no remote state present");
            }
            Err(err) => {
                warn!(target: LOG_TARGET, puzzle_id = %self.puzzle_id, error = %err, "failed to pull remote state");
            }
        }
    }

    async fn on_push(&self, message: PushMessage) {
        match message {
            PushMessage::GameUpdate(Some(remote)) => {
                self.overwrite(remote);
            }
            PushMessage::GameUpdate(None) => self.pull().await,
        }
    }

    async fn reconcile(&self) {
        let remote = match self.api.fetch_remote_state(&self.puzzle_id).await {
            Ok(remote) => remote,
            Err(err) => {
                warn!(target: LOG_TARGET, puzzle_id = %self.puzzle_id, error = %err, "reconcile fetch failed");
                return;
            }
        };
        if let Some(remote) = remote {
            if !self.is_own(&remote.client_id) {
                debug!(target: LOG_TARGET, puzzle_id = %self.puzzle_id, writer = %remote.client_id, "remote state written elsewhere; pulling");
                if self.overwrite(remote) {
                    return;
                }
            }
        }
        // no usable foreign copy: ours replaces it
        if self.stop.is_cancelled() {
            return;
        }
        let board = self.snapshot().board;
        self.push(board).await;
    }
}

async fn drive(shared: Arc<Shared>, mut inbox: mpsc::Receiver<PushMessage>, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shared.stop.cancelled() => break,
            message = inbox.recv() => {
                let Some(message) = message else { break };
                shared.on_push(message).await;
                ticker.reset();
            }
            _ = ticker.tick() => shared.reconcile().await,
        }
    }
    debug!(target: LOG_TARGET, puzzle_id = %shared.puzzle_id, "replication driver stopped");
}

/// Owned handle on a running session. Dropping it tears the session down.
pub struct SessionHandle {
    shared: Arc<Shared>,
    inbox: mpsc::Sender<PushMessage>,
    subscription: Option<Subscription>,
    driver: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn puzzle_id(&self) -> &PuzzleId {
        &self.shared.puzzle_id
    }

    pub fn puzzle(&self) -> &Puzzle {
        &self.shared.puzzle
    }

    pub fn state(&self) -> ReplicatedState {
        self.shared.snapshot()
    }

    /// Yields every time the state changes.
    pub fn subscribe(&self) -> watch::Receiver<ReplicatedState> {
        self.shared.state.subscribe()
    }

    pub fn card_states(&self) -> Vec<CardState> {
        let state = self.shared.state.borrow();
        classify_layout(&state.board.previous_guesses, state.board.placements())
    }

    /// Token the backend recorded for this session's pushes, once one has
    /// been echoed back.
    pub fn own_client_id(&self) -> Option<ClientId> {
        self.shared.own_client.lock().clone()
    }

    pub fn selected(&self) -> Option<usize> {
        self.shared.selection.lock().selected()
    }

    pub fn is_active(&self) -> bool {
        !self.shared.stop.is_cancelled()
    }

    pub fn apply_local_mutation<F>(&self, mutator: F) -> ReplicatedState
    where
        F: FnOnce(&ReplicatedState) -> ReplicatedState,
    {
        let next = self.shared.commit(mutator);
        self.shared.spawn_push();
        next
    }

    /// Like [`apply_local_mutation`](Self::apply_local_mutation) for edits
    /// that can be rejected. A rejected edit changes nothing.
    pub fn try_apply_local_mutation<F>(&self, mutator: F) -> Result<ReplicatedState, ReplicatorError>
    where
        F: FnOnce(&ReplicatedState) -> Result<ReplicatedState, BoardError>,
    {
        let next = self.shared.try_commit(mutator)?;
        self.shared.spawn_push();
        Ok(next)
    }

    pub fn swap(&self, a: usize, b: usize) -> Result<ReplicatedState, ReplicatorError> {
        self.try_apply_local_mutation(|current| {
            let mut next = current.clone();
            next.board.swap(a, b)?;
            Ok(next)
        })
    }

    /// One click of the two-click swap. Returns the new state when the click
    /// completed a swap.
    pub fn select(&self, slot: usize) -> Result<Option<ReplicatedState>, ReplicatorError> {
        let len = self.shared.state.borrow().board.placements().len();
        if slot >= len {
            return Err(BoardError::SlotOutOfRange { slot, len }.into());
        }
        let pair = self.shared.selection.lock().click(slot);
        match pair {
            Some((a, b)) => self.swap(a, b).map(Some),
            None => Ok(None),
        }
    }

    pub fn rotate(&self, slot: usize, steps: i32) -> Result<ReplicatedState, ReplicatorError> {
        self.shared.selection.lock().clear();
        self.try_apply_local_mutation(|current| {
            let mut next = current.clone();
            next.board.rotate(slot, steps)?;
            Ok(next)
        })
    }

    /// Submits the primary slots and records the scored guess. Backend
    /// failures are returned and leave the state untouched.
    pub async fn submit_guess(&self) -> Result<GuessRecord, ReplicatorError> {
        let placements = self.state().board.primary_placements();
        let feedback = self
            .shared
            .api
            .submit_guess(&self.shared.puzzle_id, &placements)
            .await
            .map_err(ReplicatorError::Api)?;
        let record = GuessRecord::new(placements, feedback)?;
        info!(
            target: LOG_TARGET,
            puzzle_id = %self.shared.puzzle_id,
            solved = record.is_solved(),
            "guess scored"
        );
        self.apply_local_mutation(|current| {
            let mut next = current.clone();
            next.board.record_guess(record.clone());
            next.copied_to_clipboard = false;
            next
        });
        Ok(record)
    }

    pub fn share_text(&self) -> String {
        let state = self.shared.state.borrow();
        share_text(
            &self.shared.puzzle,
            &state.board.previous_guesses,
            &self.shared.play_url,
        )
    }

    /// Flags the share text as copied and returns it. The flag never leaves
    /// this session.
    pub fn mark_copied(&self) -> String {
        self.shared.commit(|current| ReplicatedState {
            copied_to_clipboard: true,
            ..current.clone()
        });
        self.share_text()
    }

    /// Feeds a push-channel message to the session as if the feed had
    /// delivered it.
    pub async fn notify(&self, message: PushMessage) {
        if self.inbox.send(message).await.is_err() {
            debug!(target: LOG_TARGET, puzzle_id = %self.shared.puzzle_id, "session no longer accepts notifications");
        }
    }

    /// Runs one reconcile now, outside the timer.
    pub async fn reconcile(&self) {
        self.shared.reconcile().await;
    }

    /// Waits for every push started so far to finish.
    pub async fn settle(&self) {
        let pushes = &self.shared.pushes;
        pushes.close();
        pushes.wait().await;
        pushes.reopen();
    }

    pub fn teardown(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let driver = self.driver.take();
        if driver.is_none() && self.subscription.is_none() {
            return;
        }
        {
            let _guard = self.shared.write_lock.lock();
            self.shared.stop.cancel();
        }
        if let Some(mut subscription) = self.subscription.take() {
            subscription.cancel();
        }
        // the driver finishes any request already in flight, then sees the
        // stop token; its late result is refused by `commit_remote`
        drop(driver);
        self.shared.pushes.close();
        info!(target: LOG_TARGET, puzzle_id = %self.shared.puzzle_id, "replication session stopped");
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
