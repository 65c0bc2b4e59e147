//! Start-up state machine that gates account operations on storage readiness.
//!
//! ```text
//! Uninitialized -> Initializing -> Ready
//!                       |
//!                       v
//!                    Failed --retry--> Initializing
//! ```
//!
//! `Ready` is terminal. Failures of individual account operations after that
//! point are reported to their caller and never move the gate back.

use std::fmt;

use ledger_core::{AccountStore, StoreError};
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq)]
pub enum InitState {
    Uninitialized,
    Initializing { attempt: u32 },
    Ready { attempt: u32 },
    Failed { attempt: u32, error: StoreError },
}

impl InitState {
    /// Number of the most recent initialization attempt, 0 before the first.
    pub fn attempt(&self) -> u32 {
        match self {
            InitState::Uninitialized => 0,
            InitState::Initializing { attempt }
            | InitState::Ready { attempt }
            | InitState::Failed { attempt, .. } => *attempt,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, InitState::Ready { .. })
    }

    pub fn error(&self) -> Option<&StoreError> {
        match self {
            InitState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl fmt::Display for InitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitState::Uninitialized => f.write_str("uninitialized"),
            InitState::Initializing { attempt } => write!(f, "initializing (attempt {attempt})"),
            InitState::Ready { .. } => f.write_str("ready"),
            InitState::Failed { attempt, error } => write!(f, "failed (attempt {attempt}): {error}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("account store is not ready: {state}")]
pub struct NotReady {
    pub state: InitState,
}

/// Owns an [`AccountStore`] and hands it out only once it is ready.
pub struct StoreGate<S> {
    store: S,
    state: watch::Sender<InitState>,
}

impl<S: AccountStore> StoreGate<S> {
    pub fn new(store: S) -> Self {
        let (state, _) = watch::channel(InitState::Uninitialized);
        Self { store, state }
    }

    pub fn state(&self) -> InitState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<InitState> {
        self.state.subscribe()
    }

    /// The store, available once initialization has succeeded.
    pub fn accounts(&self) -> Result<&S, NotReady> {
        let state = self.state.borrow();
        if state.is_ready() {
            Ok(&self.store)
        } else {
            Err(NotReady { state: state.clone() })
        }
    }

    /// Run the first initialization attempt.
    ///
    /// After a failure this keeps reporting the same error until [`retry`]
    /// is called. Callers that overlap an in-flight attempt wait for it.
    ///
    /// [`retry`]: StoreGate::retry
    pub async fn initialize(&self) -> Result<(), StoreError> {
        self.attempt(false).await
    }

    /// Start a new attempt after a failure. Behaves like
    /// [`initialize`](StoreGate::initialize) in every other state.
    pub async fn retry(&self) -> Result<(), StoreError> {
        self.attempt(true).await
    }

    async fn attempt(&self, retry: bool) -> Result<(), StoreError> {
        let mut attempt = 0;
        let started = self.state.send_if_modified(|state| {
            let restart = match state {
                InitState::Uninitialized => true,
                InitState::Failed { .. } => retry,
                _ => false,
            };
            if restart {
                attempt = state.attempt() + 1;
                *state = InitState::Initializing { attempt };
            }
            restart
        });
        if !started {
            return self.settled().await;
        }

        if attempt > 1 {
            tracing::info!(attempt, "retrying account store initialization");
        } else {
            tracing::info!(attempt, "initializing account store");
        }

        let mut guard = AttemptGuard { state: &self.state, attempt, settled: false };
        let result = self.store.initialize().await;
        guard.settled = true;

        let next = match &result {
            Ok(()) => InitState::Ready { attempt },
            Err(error) => {
                tracing::error!(attempt, kind = ?error.kind(), error = %error, "account store unavailable");
                InitState::Failed { attempt, error: error.clone() }
            }
        };
        self.state.send_replace(next);
        result
    }

    /// Outcome of the current or most recent attempt. Only called once an
    /// attempt has started, and the state never returns to `Uninitialized`.
    async fn settled(&self) -> Result<(), StoreError> {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the wait cannot be cut short.
        let failure = match rx.wait_for(|s| !matches!(s, InitState::Initializing { .. })).await {
            Ok(state) => state.error().cloned(),
            Err(_) => self.state().error().cloned(),
        };
        failure.map_or(Ok(()), Err)
    }
}

/// Marks an attempt as failed if its future is dropped before finishing, so
/// the gate does not stay in `Initializing` forever.
struct AttemptGuard<'a> {
    state: &'a watch::Sender<InitState>,
    attempt: u32,
    settled: bool,
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let attempt = self.attempt;
        self.state.send_if_modified(|state| match state {
            InitState::Initializing { attempt: current } if *current == attempt => {
                *state = InitState::Failed {
                    attempt,
                    error: StoreError::storage("account store initialization", "abandoned before completion"),
                };
                true
            }
            _ => false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ledger_core::{Account, AccountId, AccountInput, ErrorKind};
    use std::{
        sync::{
            atomic::{AtomicBool, AtomicU32, Ordering},
            Arc,
        },
        time::Duration,
    };

    /// Store whose initialization fails a fixed number of times.
    #[derive(Debug, Default)]
    struct FakeStore {
        init_failures: AtomicU32,
        init_calls: Arc<AtomicU32>,
        fail_list: AtomicBool,
        permission_denied: bool,
    }

    #[async_trait]
    impl AccountStore for FakeStore {
        async fn initialize(&self) -> Result<(), StoreError> {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            let remaining = self.init_failures.load(Ordering::SeqCst);
            if remaining == 0 {
                return Ok(());
            }
            self.init_failures.store(remaining - 1, Ordering::SeqCst);
            if self.permission_denied {
                Err(StoreError::Permission("app_data.db: access denied".into()))
            } else {
                Err(StoreError::storage("failed to open account store", "database is locked"))
            }
        }

        async fn list(&self) -> Result<Vec<Account>, StoreError> {
            if self.fail_list.load(Ordering::SeqCst) {
                Err(StoreError::storage("failed to get accounts", "disk I/O error"))
            } else {
                Ok(Vec::new())
            }
        }

        async fn create(&self, _input: &AccountInput) -> Result<Option<AccountId>, StoreError> {
            Ok(Some(AccountId(1)))
        }

        async fn delete(&self, _id: AccountId) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn failing(times: u32, permission_denied: bool) -> FakeStore {
        FakeStore {
            init_failures: AtomicU32::new(times),
            permission_denied,
            ..FakeStore::default()
        }
    }

    #[tokio::test]
    async fn test_uninitialized_to_ready() {
        let gate = StoreGate::new(FakeStore::default());
        assert_eq!(gate.state(), InitState::Uninitialized);
        assert!(gate.accounts().is_err());

        gate.initialize().await.unwrap();
        assert_eq!(gate.state(), InitState::Ready { attempt: 1 });
        assert!(gate.accounts().unwrap().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_blocks_accounts_until_retry() {
        let gate = StoreGate::new(failing(1, true));

        let err = gate.initialize().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);
        assert!(matches!(gate.state(), InitState::Failed { attempt: 1, .. }));

        let not_ready = gate.accounts().unwrap_err();
        assert_eq!(not_ready.state.error(), Some(&err));

        // Without an explicit retry the failure sticks.
        assert_eq!(gate.initialize().await.unwrap_err(), err);
        assert_eq!(gate.store.init_calls.load(Ordering::SeqCst), 1);

        gate.retry().await.unwrap();
        assert_eq!(gate.state(), InitState::Ready { attempt: 2 });
        assert_eq!(gate.store.init_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retries_are_numbered() {
        let gate = StoreGate::new(failing(2, false));
        assert!(gate.initialize().await.is_err());
        assert!(gate.retry().await.is_err());
        assert_eq!(gate.state().attempt(), 2);
        gate.retry().await.unwrap();
        assert_eq!(gate.state(), InitState::Ready { attempt: 3 });
    }

    #[tokio::test]
    async fn test_ready_survives_operation_failures() {
        let gate = StoreGate::new(FakeStore::default());
        gate.initialize().await.unwrap();

        gate.store.fail_list.store(true, Ordering::SeqCst);
        let err = gate.accounts().unwrap().list().await.unwrap_err();
        assert!(err.is_retryable());
        assert!(gate.state().is_ready());

        gate.retry().await.unwrap();
        assert_eq!(gate.state(), InitState::Ready { attempt: 1 });
        assert_eq!(gate.store.init_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_overlapping_initialize_shares_attempt() {
        let gate = StoreGate::new(failing(1, false));
        let (a, b) = tokio::join!(gate.initialize(), gate.initialize());
        assert!(a.is_err());
        assert_eq!(a, b);
        assert_eq!(gate.store.init_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_subscriber_sees_final_state() {
        let gate = StoreGate::new(FakeStore::default());
        let mut rx = gate.subscribe();
        gate.initialize().await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), InitState::Ready { attempt: 1 });
    }

    #[tokio::test]
    async fn test_abandoned_attempt_can_be_retried() {
        let gate = StoreGate::new(FakeStore::default());
        let abandoned = tokio::time::timeout(Duration::from_millis(1), gate.initialize()).await;
        assert!(abandoned.is_err());
        assert!(matches!(gate.state(), InitState::Failed { attempt: 1, .. }));

        gate.retry().await.unwrap();
        assert_eq!(gate.state(), InitState::Ready { attempt: 2 });
    }
}
