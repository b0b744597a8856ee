//! # Token Cache
//!
//! Holds the current session token in memory for the lifetime of a client
//! session and publishes its state through a `watch` channel.
//!
//! ## State machine
//!
//! ```text
//! mount ──► Loading ──► Ready(Some(token))
//!              ▲    ├─► Ready(None)        no session; not an error
//!              │    └─► Failed(message)
//!              └──── refresh()
//! ```
//!
//! ## Invariants
//! - Exactly one fetch per mount; further fetches only on `refresh()`
//! - While `Loading`, no token is presented, not even the previous one
//! - Overlapping refreshes: the last fetch to settle wins
//! - Nothing settles after `teardown()`, or after every handle is dropped
//! - Every fetch settles, even one that panics or is aborted

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::errors::ClientResult;
use super::token_source::TokenSource;
use crate::observability::Event;

pub const TORN_DOWN: &str = "token cache torn down";
const FETCH_ABORTED: &str = "token fetch aborted";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    Loading,
    Ready(Option<String>),
    Failed(String),
}

impl TokenState {
    pub fn is_loading(&self) -> bool {
        matches!(self, TokenState::Loading)
    }

    /// The token, only when settled with one
    pub fn token(&self) -> Option<&str> {
        match self {
            TokenState::Ready(Some(token)) => Some(token),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            TokenState::Failed(message) => Some(message),
            _ => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            TokenState::Loading => "loading",
            TokenState::Ready(Some(_)) => "ready",
            TokenState::Ready(None) => "anonymous",
            TokenState::Failed(_) => "failed",
        }
    }
}

/// Flat view of the state: `{token, is_loading, error}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSnapshot {
    pub token: Option<String>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl From<&TokenState> for TokenSnapshot {
    fn from(state: &TokenState) -> Self {
        Self {
            token: state.token().map(str::to_string),
            is_loading: state.is_loading(),
            error: state.error().map(str::to_string),
        }
    }
}

struct Shared {
    source: Arc<dyn TokenSource>,
    state: watch::Sender<TokenState>,
    torn_down: AtomicBool,
}

impl Shared {
    /// Publish a fetch outcome unless the cache is torn down. The check runs
    /// under the channel's write lock so it cannot race `teardown`.
    fn settle(&self, next: TokenState) {
        let label = next.label();
        let applied = self.state.send_if_modified(|state| {
            if self.torn_down.load(Ordering::Acquire) {
                return false;
            }
            *state = next;
            true
        });

        if applied {
            tracing::debug!(event = %Event::TokenCacheSettled, outcome = label, "token fetch settled");
        } else {
            tracing::debug!(outcome = label, "token fetch settled after teardown; discarded");
        }
    }
}

/// Settles the fetch when dropped: with the outcome if one was recorded,
/// otherwise as failed.
struct SettleGuard {
    shared: Weak<Shared>,
    outcome: Option<TokenState>,
}

impl SettleGuard {
    fn record(&mut self, outcome: ClientResult<Option<String>>) {
        self.outcome = Some(match outcome {
            Ok(token) => TokenState::Ready(token),
            Err(e) => TokenState::Failed(e.to_string()),
        });
    }
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let next = self
            .outcome
            .take()
            .unwrap_or_else(|| TokenState::Failed(FETCH_ABORTED.to_string()));
        shared.settle(next);
    }
}

#[derive(Clone)]
pub struct TokenCache {
    shared: Arc<Shared>,
}

impl TokenCache {
    /// Start in `Loading` and fetch once. Must be called inside a Tokio runtime.
    pub fn mount(source: impl TokenSource) -> Self {
        Self::mount_shared(Arc::new(source))
    }

    pub fn mount_shared(source: Arc<dyn TokenSource>) -> Self {
        let (state, _) = watch::channel(TokenState::Loading);
        let cache = Self {
            shared: Arc::new(Shared {
                source,
                state,
                torn_down: AtomicBool::new(false),
            }),
        };
        cache.spawn_fetch();
        cache
    }

    /// Re-enter `Loading`, fetch again, and return once that fetch settled.
    ///
    /// Safe to call while other fetches are in flight. Dropping the returned
    /// future does not cancel the fetch.
    pub async fn refresh(&self) -> TokenSnapshot {
        if let Some(fetch) = self.begin_fetch() {
            // The fetch settles itself, even on panic.
            let _ = fetch.await;
        }
        self.snapshot()
    }

    fn begin_fetch(&self) -> Option<JoinHandle<()>> {
        let entered = self.shared.state.send_if_modified(|state| {
            if self.shared.torn_down.load(Ordering::Acquire) {
                return false;
            }
            *state = TokenState::Loading;
            true
        });
        entered.then(|| self.spawn_fetch())
    }

    fn spawn_fetch(&self) -> JoinHandle<()> {
        let source = Arc::clone(&self.shared.source);
        let mut guard = SettleGuard {
            shared: Arc::downgrade(&self.shared),
            outcome: None,
        };

        tokio::spawn(async move {
            let outcome = source.fetch_token().await;
            guard.record(outcome);
        })
    }

    pub fn current(&self) -> TokenState {
        self.shared.state.borrow().clone()
    }

    pub fn snapshot(&self) -> TokenSnapshot {
        TokenSnapshot::from(&*self.shared.state.borrow())
    }

    /// Current token; `None` while loading, without a session, or after a failure
    pub fn token(&self) -> Option<String> {
        self.shared.state.borrow().token().map(str::to_string)
    }

    pub fn subscribe(&self) -> watch::Receiver<TokenState> {
        self.shared.state.subscribe()
    }

    /// Wait until the state is not `Loading`
    pub async fn settled(&self) -> TokenState {
        let mut rx = self.subscribe();
        let settled = match rx.wait_for(|state| !state.is_loading()).await {
            Ok(state) => state.clone(),
            Err(_) => self.current(),
        };
        settled
    }

    /// Stop accepting results. In-flight fetches are discarded when they settle.
    pub fn teardown(&self) {
        self.shared.state.send_modify(|state| {
            self.shared.torn_down.store(true, Ordering::Release);
            *state = TokenState::Failed(TORN_DOWN.to_string());
        });
    }

    pub fn is_torn_down(&self) -> bool {
        self.shared.torn_down.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::errors::ClientError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    type Reply = ClientResult<Option<String>>;

    /// Each fetch waits on the next queued reply channel
    struct ControlledSource {
        replies: Mutex<VecDeque<oneshot::Receiver<Reply>>>,
        started: Arc<AtomicUsize>,
    }

    fn controlled(n: usize) -> (ControlledSource, Vec<oneshot::Sender<Reply>>, Arc<AtomicUsize>) {
        let (senders, receivers): (Vec<_>, VecDeque<_>) =
            (0..n).map(|_| oneshot::channel()).unzip();
        let started = Arc::new(AtomicUsize::new(0));
        let source = ControlledSource {
            replies: Mutex::new(receivers),
            started: started.clone(),
        };
        (source, senders, started)
    }

    #[async_trait]
    impl TokenSource for ControlledSource {
        async fn fetch_token(&self) -> ClientResult<Option<String>> {
            let reply = self.replies.lock().unwrap().pop_front();
            self.started.fetch_add(1, Ordering::SeqCst);
            match reply {
                Some(rx) => rx
                    .await
                    .unwrap_or_else(|_| Err(ClientError::Transport("reply dropped".into()))),
                None => Err(ClientError::Transport("unexpected fetch".into())),
            }
        }
    }

    struct Fixed(Reply);

    #[async_trait]
    impl TokenSource for Fixed {
        async fn fetch_token(&self) -> ClientResult<Option<String>> {
            self.0.clone()
        }
    }

    struct Panicking;

    #[async_trait]
    impl TokenSource for Panicking {
        async fn fetch_token(&self) -> ClientResult<Option<String>> {
            panic!("token source exploded")
        }
    }

    async fn wait_started(started: &AtomicUsize, n: usize) {
        while started.load(Ordering::SeqCst) < n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_mount_starts_loading_then_ready() {
        let (source, mut replies, _) = controlled(1);
        let cache = TokenCache::mount(source);

        assert_eq!(
            cache.snapshot(),
            TokenSnapshot {
                token: None,
                is_loading: true,
                error: None
            }
        );

        replies.remove(0).send(Ok(Some("t1".into()))).unwrap();
        assert_eq!(cache.settled().await, TokenState::Ready(Some("t1".into())));
        assert_eq!(cache.token().as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn test_no_session_is_ready_none_not_failure() {
        let cache = TokenCache::mount(Fixed(Ok(None)));

        assert_eq!(cache.settled().await, TokenState::Ready(None));
        let snapshot = cache.snapshot();
        assert_eq!(snapshot.token, None);
        assert_eq!(snapshot.error, None);
        assert!(!snapshot.is_loading);
    }

    #[tokio::test]
    async fn test_failure_captures_message_and_clears_token() {
        let cache = TokenCache::mount(Fixed(Err(ClientError::http(503, ""))));

        assert_eq!(
            cache.settled().await,
            TokenState::Failed("Request failed with 503".into())
        );
        assert_eq!(cache.token(), None);
    }

    #[tokio::test]
    async fn test_fetches_once_per_mount() {
        let (source, replies, started) = controlled(2);
        let cache = TokenCache::mount(source);
        drop(replies);

        cache.settled().await;
        tokio::task::yield_now().await;
        assert_eq!(started.load(Ordering::SeqCst), 1);

        cache.refresh().await;
        assert_eq!(started.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_loading_hides_previous_token() {
        let (source, mut replies, started) = controlled(2);
        let cache = TokenCache::mount(source);
        replies.remove(0).send(Ok(Some("old".into()))).unwrap();
        cache.settled().await;

        let refreshing = tokio::spawn({
            let cache = cache.clone();
            async move { cache.refresh().await }
        });
        wait_started(&started, 2).await;

        assert!(cache.current().is_loading());
        assert_eq!(cache.token(), None);

        replies.remove(0).send(Ok(Some("new".into()))).unwrap();
        let snapshot = refreshing.await.unwrap();
        assert_eq!(snapshot.token.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_last_settled_refresh_wins_in_every_order() {
        const ORDERS: [[usize; 3]; 6] = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];

        for order in ORDERS {
            let (source, replies, started) = controlled(4);
            let mut replies: Vec<Option<oneshot::Sender<Reply>>> =
                replies.into_iter().map(Some).collect();
            let cache = TokenCache::mount(source);

            replies[0]
                .take()
                .unwrap()
                .send(Ok(Some("mount".into())))
                .unwrap();
            cache.settled().await;

            let refreshes: Vec<_> = (0..3)
                .map(|_| {
                    let cache = cache.clone();
                    tokio::spawn(async move { cache.refresh().await })
                })
                .collect();
            wait_started(&started, 4).await;

            let mut rx = cache.subscribe();
            for &i in &order {
                let value = format!("t{}", i);
                replies[i + 1]
                    .take()
                    .unwrap()
                    .send(Ok(Some(value.clone())))
                    .unwrap();
                rx.wait_for(|s| *s == TokenState::Ready(Some(value.clone())))
                    .await
                    .unwrap();
            }

            for refresh in refreshes {
                refresh.await.unwrap();
            }
            let last = format!("t{}", order[2]);
            assert_eq!(
                cache.current(),
                TokenState::Ready(Some(last)),
                "order {:?}",
                order
            );
        }
    }

    #[tokio::test]
    async fn test_teardown_discards_late_result() {
        let (source, mut replies, started) = controlled(1);
        let cache = TokenCache::mount(source);
        wait_started(&started, 1).await;

        cache.teardown();
        replies.remove(0).send(Ok(Some("late".into()))).unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert!(cache.is_torn_down());
        assert_eq!(cache.current(), TokenState::Failed(TORN_DOWN.into()));
        assert_eq!(cache.token(), None);

        // No new fetch after teardown.
        cache.refresh().await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropped_cache_ignores_inflight_fetch() {
        let (source, mut replies, started) = controlled(1);
        let source = Arc::new(source);
        let cache = TokenCache::mount_shared(source.clone());
        let rx = cache.subscribe();
        wait_started(&started, 1).await;
        drop(cache);

        replies.remove(0).send(Ok(Some("orphan".into()))).unwrap();

        // The fetch task holds the last other handle on the source.
        while Arc::strong_count(&source) > 1 {
            tokio::task::yield_now().await;
        }

        assert!(rx.has_changed().is_err());
        assert_eq!(*rx.borrow(), TokenState::Loading);
    }

    #[tokio::test]
    async fn test_panicking_source_settles_as_failed() {
        let cache = TokenCache::mount(Panicking);
        assert_eq!(cache.settled().await, TokenState::Failed(FETCH_ABORTED.into()));
    }
}
