//! The engine owning the published catalog state
//!
//! [`Engine`] coordinates everything: it owns the currently published
//! snapshot (or the error that replaced it), runs background refreshes, and
//! exposes the query/perform entry points used by callers. All writes to the
//! published cell flow through one worker task fed by a channel, so "refresh
//! published" happens-before "subsequent reads observe it" by construction.
//! Queries only take a brief shared lock to clone the published pointer and
//! never block on an in-flight refresh.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, RwLock};

use crate::action::{Action, LINK_ACTION_ID};
use crate::bridge::{BridgeAccess, ConnectionProvider};
use crate::catalog::Snapshot;
use crate::index::Resolver;
use crate::query::parse_queries;
use crate::rank::RankedAction;

/// Errors surfaced by the engine.
///
/// "No bridge linked yet" is deliberately not an error on the query path: it
/// surfaces as the link [`crate::action::SpecialAction`] instead, keeping
/// the interface always-actionable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// One or more catalog fetches failed during a refresh. Stored and
    /// surfaced on every query until a later refresh succeeds.
    #[error("catalog refresh failed: {0}")]
    SourceFetchFailed(String),

    /// A refresh was requested before any bridge was linked.
    #[error("no bridge linked")]
    NotLinked,

    /// The action matches neither a known entity/change shape nor a known
    /// special id.
    #[error("invalid action")]
    InvalidAction,

    /// The bridge rejected an action; never retried automatically.
    #[error("executing {target}: {message}")]
    ExecutionFailed { target: String, message: String },

    /// Link was requested but no connection provider is configured.
    #[error("no connection provider configured")]
    NoConnect,

    /// The connection provider failed; returned synchronously, not retried.
    #[error("bridge link failed: {0}")]
    LinkFailed(String),
}

/// The published index cell. Exactly one variant is meaningful at a time;
/// only the refresh worker (and link/set_bridge) replace it.
#[derive(Debug, Clone, Default)]
enum IndexState {
    #[default]
    Unpublished,
    Ready(Arc<Snapshot>),
    Failed(EngineError),
}

#[derive(Default)]
struct State {
    bridge: Option<Arc<dyn BridgeAccess>>,
    connector: Option<Arc<dyn ConnectionProvider>>,
    index: IndexState,
}

struct Shared {
    state: RwLock<State>,
    /// Set once the first link succeeds; afterwards command execution only
    /// ever needs the shared lock.
    linked: AtomicBool,
}

enum RefreshCmd {
    Refresh(Option<oneshot::Sender<Result<(), EngineError>>>),
    SetInterval(Option<Duration>),
}

/// Command-resolution engine over a dynamically refreshed catalog.
///
/// Must be constructed inside a Tokio runtime; construction spawns the
/// refresh worker, which exits when the engine is dropped.
pub struct Engine {
    shared: Arc<Shared>,
    refresh_tx: mpsc::UnboundedSender<RefreshCmd>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Create an engine with no bridge and no connection provider.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create an engine that can link itself through the given provider.
    pub fn with_connector(connector: Arc<dyn ConnectionProvider>) -> Self {
        Self::build(Some(connector))
    }

    fn build(connector: Option<Arc<dyn ConnectionProvider>>) -> Self {
        let shared = Arc::new(Shared {
            state: RwLock::new(State {
                connector,
                ..State::default()
            }),
            linked: AtomicBool::new(false),
        });

        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
        tokio::spawn(refresh_worker(Arc::clone(&shared), refresh_rx));

        Engine { shared, refresh_tx }
    }

    /// Whether a bridge has been linked at least once.
    pub fn is_linked(&self) -> bool {
        self.shared.linked.load(Ordering::SeqCst)
    }

    /// Publish a bridge handle directly and schedule a refresh.
    ///
    /// Queries issued while that refresh is in flight keep observing the
    /// last published state and never block on it.
    pub async fn set_bridge(&self, bridge: Arc<dyn BridgeAccess>) {
        {
            let mut state = self.shared.state.write().await;
            state.bridge = Some(bridge);
            state.index = IndexState::Unpublished;
        }
        self.shared.linked.store(true, Ordering::SeqCst);
        let _ = self.refresh_tx.send(RefreshCmd::Refresh(None));
    }

    /// Resolve input text into a ranked action list.
    ///
    /// Without a linked bridge (or before the first refresh has published
    /// anything) this returns exactly one link special action; a stored
    /// refresh failure is surfaced as-is until a refresh succeeds.
    pub async fn query(&self, input: &str) -> Result<Vec<RankedAction>, EngineError> {
        let snapshot = {
            let state = self.shared.state.read().await;
            if state.bridge.is_none() {
                return Ok(vec![RankedAction::link_special()]);
            }
            match &state.index {
                IndexState::Unpublished => return Ok(vec![RankedAction::link_special()]),
                IndexState::Failed(err) => return Err(err.clone()),
                IndexState::Ready(snapshot) => Arc::clone(snapshot),
            }
        };

        let queries = parse_queries(input);
        Ok(Resolver::new().resolve(&snapshot, &queries))
    }

    /// Perform a resolved action.
    ///
    /// The link special action links the bridge; any other action is
    /// delegated to the bridge under a shared lock. Execution failures are
    /// wrapped with the target context and never retried.
    pub async fn perform(&self, action: &Action) -> Result<(), EngineError> {
        if let Ok(json) = serde_json::to_string(action) {
            log::info!("performing action {json}");
        }

        let command = match action {
            Action::Special(special) if special.id == LINK_ACTION_ID => return self.link().await,
            Action::Special(_) => return Err(EngineError::InvalidAction),
            Action::Command(command) => command,
        };

        if !self.is_linked() {
            return Err(EngineError::InvalidAction);
        }

        let state = self.shared.state.read().await;
        let Some(bridge) = state.bridge.as_ref() else {
            return Err(EngineError::InvalidAction);
        };
        bridge
            .execute(command)
            .await
            .map_err(|err| EngineError::ExecutionFailed {
                target: command.to_string(),
                message: format!("{err:#}"),
            })
    }

    /// Link the bridge through the connection provider.
    ///
    /// Holds the exclusive lock across the connect call so concurrent link
    /// attempts cannot race; a no-op once a bridge is present. On success a
    /// background refresh is scheduled.
    pub async fn link(&self) -> Result<(), EngineError> {
        let mut state = self.shared.state.write().await;
        if state.bridge.is_some() {
            return Ok(());
        }
        let connector = state.connector.clone().ok_or(EngineError::NoConnect)?;
        let bridge = connector
            .connect()
            .await
            .map_err(|err| EngineError::LinkFailed(format!("{err:#}")))?;

        state.bridge = Some(bridge);
        drop(state);
        self.shared.linked.store(true, Ordering::SeqCst);

        let _ = self.refresh_tx.send(RefreshCmd::Refresh(None));
        Ok(())
    }

    /// Trigger a refresh and wait for its outcome.
    pub async fn refresh_now(&self) -> Result<(), EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.refresh_tx
            .send(RefreshCmd::Refresh(Some(reply_tx)))
            .map_err(|_| EngineError::SourceFetchFailed("refresh worker unavailable".to_string()))?;
        reply_rx
            .await
            .map_err(|_| EngineError::SourceFetchFailed("refresh worker unavailable".to_string()))?
    }

    /// Install or clear the periodic refresh timer.
    ///
    /// Failed periodic refreshes are not retried before the next tick.
    pub fn set_periodic_refresh(&self, interval: Option<Duration>) {
        let _ = self.refresh_tx.send(RefreshCmd::SetInterval(interval));
    }
}

/// The single task owning writes to the published index cell.
async fn refresh_worker(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<RefreshCmd>) {
    let mut timer: Option<tokio::time::Interval> = None;

    loop {
        let cmd = if let Some(active) = timer.as_mut() {
            tokio::select! {
                cmd = rx.recv() => cmd,
                _ = active.tick() => {
                    // Failures are stored in the cell and surface on the
                    // next query; the timer itself never retries early.
                    let _ = refresh(&shared).await;
                    continue;
                }
            }
        } else {
            rx.recv().await
        };

        match cmd {
            None => break,
            Some(RefreshCmd::Refresh(reply)) => {
                let result = refresh(&shared).await;
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            Some(RefreshCmd::SetInterval(interval)) => {
                timer = interval.map(|period| {
                    tokio::time::interval_at(tokio::time::Instant::now() + period, period)
                });
            }
        }
    }
}

/// Run one refresh round: fetch outside the lock, publish under it.
///
/// All-or-nothing: a failed fetch publishes `Failed` and replaces whatever
/// was there before (last-writer-wins), so the engine never silently serves
/// stale data behind a failed refresh.
async fn refresh(shared: &Shared) -> Result<(), EngineError> {
    let bridge = shared.state.read().await.bridge.clone();
    let Some(bridge) = bridge else {
        return Err(EngineError::NotLinked);
    };

    log::info!("refreshing catalog");
    let fetched = Snapshot::fetch(bridge.as_ref()).await;

    let mut state = shared.state.write().await;
    match fetched {
        Ok(snapshot) => {
            log::info!(
                "catalog refreshed: {} groups, {} lights, {} scenes",
                snapshot.groups.len(),
                snapshot.lights.len(),
                snapshot.scenes.len()
            );
            state.index = IndexState::Ready(Arc::new(snapshot));
            Ok(())
        }
        Err(err) => {
            let err = EngineError::SourceFetchFailed(format!("{err:#}"));
            log::error!("{err}");
            state.index = IndexState::Failed(err.clone());
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Change, CommandAction, SpecialAction, Target};
    use crate::catalog::{Group, Light, Scene};

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tokio::sync::Semaphore;

    #[derive(Default)]
    struct FakeBridge {
        fail_scenes: AtomicBool,
        executed: Mutex<Vec<CommandAction>>,
        /// When present, every fetch takes one permit before returning.
        gate: Option<Semaphore>,
    }

    impl FakeBridge {
        fn gated() -> Self {
            FakeBridge {
                gate: Some(Semaphore::new(0)),
                ..FakeBridge::default()
            }
        }

        async fn wait_gate(&self) {
            if let Some(gate) = &self.gate {
                gate.acquire().await.expect("gate closed").forget();
            }
        }
    }

    #[async_trait]
    impl BridgeAccess for FakeBridge {
        async fn fetch_groups(&self) -> Result<Vec<Group>> {
            self.wait_gate().await;
            Ok(vec![Group {
                id: 1,
                name: "Kitchen".to_string(),
            }])
        }

        async fn fetch_lights(&self) -> Result<Vec<Light>> {
            self.wait_gate().await;
            Ok(vec![Light {
                id: 10,
                name: "Lamp".to_string(),
            }])
        }

        async fn fetch_scenes(&self) -> Result<Vec<Scene>> {
            self.wait_gate().await;
            if self.fail_scenes.load(Ordering::SeqCst) {
                return Err(anyhow!("scenes endpoint unavailable"));
            }
            Ok(vec![Scene {
                id: "5".to_string(),
                name: "Reading".to_string(),
                group: "1".to_string(),
            }])
        }

        async fn execute(&self, action: &CommandAction) -> Result<()> {
            self.executed.lock().unwrap().push(action.clone());
            Ok(())
        }
    }

    struct FakeConnector {
        bridge: Arc<FakeBridge>,
        connects: AtomicUsize,
    }

    impl FakeConnector {
        fn new(bridge: Arc<FakeBridge>) -> Self {
            FakeConnector {
                bridge,
                connects: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ConnectionProvider for FakeConnector {
        async fn connect(&self) -> Result<Arc<dyn BridgeAccess>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::clone(&self.bridge) as Arc<dyn BridgeAccess>)
        }
    }

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn kitchen_off() -> Action {
        Action::command(
            Target::Group {
                id: 1,
                name: "Kitchen".to_string(),
            },
            Change::Off,
        )
    }

    #[tokio::test]
    async fn test_query_before_link_returns_single_special() {
        init_logs();
        let engine = Engine::new();

        let results = engine.query("turn off kitchen").await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].action.is_special());

        let results = engine.query("").await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].action.is_special());
    }

    #[tokio::test]
    async fn test_perform_command_before_link_is_invalid() {
        init_logs();
        let engine = Engine::new();
        let err = engine.perform(&kitchen_off()).await.unwrap_err();
        assert_eq!(err, EngineError::InvalidAction);
    }

    #[tokio::test]
    async fn test_link_without_connector_fails() {
        init_logs();
        let engine = Engine::new();
        let err = engine
            .perform(&Action::Special(SpecialAction::link()))
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::NoConnect);
    }

    #[tokio::test]
    async fn test_unknown_special_is_invalid() {
        init_logs();
        let engine = Engine::new();
        let action = Action::Special(SpecialAction {
            id: "frobnicate".to_string(),
            message: String::new(),
        });
        let err = engine.perform(&action).await.unwrap_err();
        assert_eq!(err, EngineError::InvalidAction);
    }

    #[tokio::test]
    async fn test_link_query_perform_round_trip() {
        init_logs();
        let bridge = Arc::new(FakeBridge::default());
        let connector = Arc::new(FakeConnector::new(Arc::clone(&bridge)));
        let engine = Engine::with_connector(Arc::clone(&connector) as Arc<dyn ConnectionProvider>);

        engine
            .perform(&Action::Special(SpecialAction::link()))
            .await
            .unwrap();
        assert!(engine.is_linked());
        engine.refresh_now().await.unwrap();

        let results = engine.query("turn off kitchen").await.unwrap();
        let first = results[0].action.as_command().unwrap();
        assert_eq!(first.target.id(), 1);
        assert_eq!(first.change, Change::Off);

        engine.perform(&results[0].action).await.unwrap();
        let executed = bridge.executed.lock().unwrap();
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0].change, Change::Off);
    }

    #[tokio::test]
    async fn test_link_connects_at_most_once() {
        init_logs();
        let bridge = Arc::new(FakeBridge::default());
        let connector = Arc::new(FakeConnector::new(bridge));
        let engine = Engine::with_connector(Arc::clone(&connector) as Arc<dyn ConnectionProvider>);

        engine.link().await.unwrap();
        engine.link().await.unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_rejects_whole_refresh() {
        init_logs();
        let bridge = Arc::new(FakeBridge::default());
        bridge.fail_scenes.store(true, Ordering::SeqCst);
        let engine = Engine::new();
        engine
            .set_bridge(Arc::clone(&bridge) as Arc<dyn BridgeAccess>)
            .await;

        let err = engine.refresh_now().await.unwrap_err();
        assert!(matches!(err, EngineError::SourceFetchFailed(_)));

        // Groups and lights succeeded, but no partial catalog is published.
        let err = engine.query("kitchen").await.unwrap_err();
        assert!(matches!(err, EngineError::SourceFetchFailed(_)));

        // A later successful refresh clears the stored failure.
        bridge.fail_scenes.store(false, Ordering::SeqCst);
        engine.refresh_now().await.unwrap();
        assert!(engine.query("kitchen").await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_refresh_replaces_previous_snapshot() {
        init_logs();
        let bridge = Arc::new(FakeBridge::default());
        let engine = Engine::new();
        engine
            .set_bridge(Arc::clone(&bridge) as Arc<dyn BridgeAccess>)
            .await;
        engine.refresh_now().await.unwrap();
        assert!(engine.query("kitchen").await.is_ok());

        bridge.fail_scenes.store(true, Ordering::SeqCst);
        engine.refresh_now().await.unwrap_err();

        // Never silently serve stale data behind a failed refresh.
        let err = engine.query("kitchen").await.unwrap_err();
        assert!(matches!(err, EngineError::SourceFetchFailed(_)));
    }

    #[tokio::test]
    async fn test_refresh_without_bridge_fails() {
        init_logs();
        let engine = Engine::new();
        let err = engine.refresh_now().await.unwrap_err();
        assert_eq!(err, EngineError::NotLinked);
    }

    #[tokio::test]
    async fn test_queries_do_not_block_on_inflight_refresh() {
        init_logs();
        let bridge = Arc::new(FakeBridge::gated());
        let engine = Engine::new();
        engine
            .set_bridge(Arc::clone(&bridge) as Arc<dyn BridgeAccess>)
            .await;

        // The scheduled refresh is stuck on the gate; queries still answer
        // with the last published state.
        let results = engine.query("kitchen").await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].action.is_special());

        // Release the stuck refresh and run another to completion.
        if let Some(gate) = &bridge.gate {
            gate.add_permits(6);
        }
        engine.refresh_now().await.unwrap();

        let results = engine.query("turn off kitchen").await.unwrap();
        assert!(!results[0].action.is_special());
    }

    #[tokio::test]
    async fn test_query_idempotent_against_unchanged_snapshot() {
        init_logs();
        let bridge = Arc::new(FakeBridge::default());
        let engine = Engine::new();
        engine.set_bridge(bridge as Arc<dyn BridgeAccess>).await;
        engine.refresh_now().await.unwrap();

        let first = engine.query("kitchen to reading").await.unwrap();
        let second = engine.query("kitchen to reading").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_periodic_refresh_publishes() {
        init_logs();
        let bridge = Arc::new(FakeBridge::default());
        bridge.fail_scenes.store(true, Ordering::SeqCst);
        let engine = Engine::new();
        engine
            .set_bridge(Arc::clone(&bridge) as Arc<dyn BridgeAccess>)
            .await;
        engine.refresh_now().await.unwrap_err();

        // Only the ticker can publish the snapshot from here on.
        bridge.fail_scenes.store(false, Ordering::SeqCst);
        engine.set_periodic_refresh(Some(Duration::from_millis(10)));

        // Wait for at least one tick to land.
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if engine.query("kitchen").await.is_ok()
                && !engine.query("kitchen").await.unwrap()[0].action.is_special()
            {
                return;
            }
        }
        panic!("periodic refresh never published a snapshot");
    }
}
