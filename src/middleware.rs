//! Hook into the session store's action pipeline.
//!
//! The session store calls [`ActionObserver::on_action`] synchronously for
//! every action it dispatches. [`LifecycleMiddleware`] only copies the action
//! onto an ordered channel and returns; the [`LifecycleAdapter`] task then
//! applies each action in order to the LRU queue, the auto-grouper, the
//! group cache and the expansion store.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::expansion::GroupExpansionStore;
use crate::groups::{GroupCache, GroupEvent};
use crate::heuristic::{AutoGrouper, Candidate, DeclineReason, GroupingOutcome};
use crate::lru::LruQueue;
use crate::model::{PrivacyScope, TabId};
use crate::session::SessionAction;

/// Callback registered against the session store's dispatch function.
///
/// Implementations must not block; the pipeline waits for them.
pub trait ActionObserver: Send + Sync {
    fn on_action(&self, action: &SessionAction);
}

enum Message {
    Action(SessionAction),
    Settle(oneshot::Sender<()>),
}

/// Observer half of the adapter. Cheap to clone; clones feed the same task.
#[derive(Debug, Clone)]
pub struct LifecycleMiddleware {
    tx: mpsc::UnboundedSender<Message>,
}

impl ActionObserver for LifecycleMiddleware {
    fn on_action(&self, action: &SessionAction) {
        if self.tx.send(Message::Action(action.clone())).is_err() {
            debug!("lifecycle adapter stopped, action ignored");
        }
    }
}

impl LifecycleMiddleware {
    /// Waits until every action observed before this call has been applied.
    ///
    /// Returns `false` if the adapter task has stopped.
    pub async fn settled(&self) -> bool {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Message::Settle(ack_tx)).is_err() {
            return false;
        }
        ack_rx.await.is_ok()
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Action(action) => f.debug_tuple("Action").field(action).finish(),
            Message::Settle(_) => f.write_str("Settle"),
        }
    }
}

/// A new tab that has not loaded a web page yet.
#[derive(Debug, Clone)]
struct PendingTab {
    source: TabId,
    scope: PrivacyScope,
}

/// Task that applies observed actions.
pub struct LifecycleAdapter {
    cache: GroupCache,
    lru: LruQueue,
    expansion: GroupExpansionStore,
    grouper: Arc<AutoGrouper>,
    group_events: broadcast::Receiver<GroupEvent>,
    pending: HashMap<TabId, PendingTab>,
    rx: mpsc::UnboundedReceiver<Message>,
}

impl LifecycleAdapter {
    /// Creates the adapter and the observer that feeds it.
    pub fn new(
        cache: GroupCache,
        lru: LruQueue,
        expansion: GroupExpansionStore,
        grouper: Arc<AutoGrouper>,
    ) -> (Self, LifecycleMiddleware) {
        let (tx, rx) = mpsc::unbounded_channel();
        let group_events = cache.subscribe_events();
        let adapter = Self {
            cache,
            lru,
            expansion,
            grouper,
            group_events,
            pending: HashMap::new(),
            rx,
        };
        (adapter, LifecycleMiddleware { tx })
    }

    /// Runs until every middleware handle is dropped or `shutdown_rx` fires.
    /// Actions already queued at shutdown are still applied.
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                message = self.rx.recv() => {
                    match message {
                        Some(message) => self.dispatch(message).await,
                        None => break,
                    }
                }
                event = self.group_events.recv() => {
                    self.on_group_event(event);
                }
                _ = shutdown_rx.recv() => {
                    info!("lifecycle adapter shutting down");
                    self.rx.close();
                    while let Some(message) = self.rx.recv().await {
                        self.dispatch(message).await;
                    }
                    break;
                }
            }
        }
        debug!("lifecycle adapter stopped");
    }

    async fn dispatch(&mut self, message: Message) {
        match message {
            Message::Action(action) => {
                self.handle(action).await;
                self.drain_group_events();
            }
            Message::Settle(ack) => {
                self.drain_group_events();
                let _ = ack.send(());
            }
        }
    }

    async fn handle(&mut self, action: SessionAction) {
        trace!(?action, "applying session action");
        match action {
            SessionAction::TabAdded {
                tab,
                previously_selected,
            } => {
                let Some(source) = previously_selected else {
                    return;
                };
                self.pending.insert(
                    tab.id.clone(),
                    PendingTab {
                        source,
                        scope: tab.scope.clone(),
                    },
                );
                self.evaluate(tab.id, tab.url, tab.scope).await;
            }
            SessionAction::TabUrlChanged { tab_id, url } => {
                if let Some(pending) = self.pending.get(&tab_id) {
                    let scope = pending.scope.clone();
                    self.evaluate(tab_id, url, scope).await;
                }
            }
            SessionAction::TabSelected { tab_id } => {
                self.lru.on_tab_selected(&tab_id).await;
            }
            SessionAction::TabClosed { tab_id } => {
                self.pending.remove(&tab_id);
                self.grouper.forget_tab(&tab_id);
                self.lru.on_tab_closed(&tab_id).await;
                self.cache.on_tab_closed(&tab_id).await;
            }
            SessionAction::RestoreComplete { tab_ids } => {
                self.pending.retain(|tab, _| tab_ids.contains(tab));
                self.lru.synchronize(tab_ids.iter().cloned()).await;
                let removed = self.cache.synchronize(tab_ids).await;
                let live = self.cache.all_groups().into_iter().map(|g| g.id);
                let pruned = self.expansion.prune(live);
                info!(removed, pruned, "session restore reconciled");
            }
        }
    }

    async fn evaluate(&mut self, tab_id: TabId, url: String, scope: PrivacyScope) {
        let Some(source) = self.pending.get(&tab_id).map(|p| p.source.clone()) else {
            return;
        };
        let candidate = Candidate { tab_id, url, scope };
        let outcome = self.grouper.evaluate(&candidate, Some(&source)).await;
        if !still_loading(&outcome) {
            self.pending.remove(&candidate.tab_id);
        }
    }

    fn drain_group_events(&mut self) {
        loop {
            match self.group_events.try_recv() {
                Ok(event) => self.on_group_event(Ok(event)),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    self.on_group_event(Err(broadcast::error::RecvError::Lagged(skipped)));
                }
                Err(_) => break,
            }
        }
    }

    fn on_group_event(&mut self, event: Result<GroupEvent, broadcast::error::RecvError>) {
        match event {
            Ok(event) => {
                if let Some(group_id) = event.removed_group() {
                    self.expansion.collapse(group_id);
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "adapter lagged behind group events, pruning expansion state");
                let live = self.cache.all_groups().into_iter().map(|g| g.id);
                self.expansion.prune(live);
            }
            Err(broadcast::error::RecvError::Closed) => {}
        }
    }
}

/// A tab is re-evaluated on later navigations only while it shows an
/// internal page or a URL without a host. The first real page decides.
fn still_loading(outcome: &GroupingOutcome) -> bool {
    matches!(
        outcome,
        GroupingOutcome::Declined(
            DeclineReason::InternalUrl
                | DeclineReason::UnknownDomain
                | DeclineReason::AlreadyEvaluated
        )
    )
}
