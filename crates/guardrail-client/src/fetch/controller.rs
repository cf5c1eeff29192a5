//! Fetch controller - owns the lifecycle of one asynchronous data-producing operation.
//!
//! At most one attempt cycle is live per controller. Starting a cycle cancels
//! the previous one first, and every state mutation checks the cycle's token
//! while holding the control lock, so a superseded attempt can never write
//! over a newer one.

use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use guardrail_core::FetchError;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::{AsyncDataState, RetryPolicy};

type Producer<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, FetchError>> + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&FetchError) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleStart {
    /// Retry counter reset, first attempt shown as `loading`.
    Fresh,
    /// Retry counter kept, first attempt shown as `is_retrying`.
    Retry,
}

enum Settlement {
    Done,
    Backoff(Duration),
    Failed(FetchError),
}

struct CycleControl {
    live: Option<CancellationToken>,
    retry_count: u32,
    enabled: bool,
    disposed: bool,
    dependencies: Option<u64>,
    cycles_started: u64,
}

struct Inner<T> {
    producer: Producer<T>,
    policy: RetryPolicy,
    on_error: Option<ErrorCallback>,
    state: watch::Sender<AsyncDataState<T>>,
    control: Mutex<CycleControl>,
    /// Cancelled once on dispose.
    teardown: CancellationToken,
}

/// Retrying fetch controller.
///
/// Must be started and driven inside a tokio runtime. Dropping the controller
/// tears it down: the live attempt is cancelled and no further state changes happen.
pub struct FetchController<T> {
    inner: Arc<Inner<T>>,
}

/// Builder for [`FetchController`].
pub struct FetchControllerBuilder<T> {
    producer: Producer<T>,
    policy: RetryPolicy,
    enabled: bool,
    on_error: Option<ErrorCallback>,
    dependencies: Option<u64>,
}

fn fingerprint<D: Hash + ?Sized>(dependencies: &D) -> u64 {
    let mut hasher = DefaultHasher::new();
    dependencies.hash(&mut hasher);
    hasher.finish()
}

impl<T> FetchControllerBuilder<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.policy.max_retries = max_retries;
        self
    }

    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.policy.base_delay = base_delay;
        self
    }

    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.policy.attempt_timeout = Some(timeout);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Called once for every cycle that ends in a terminal error.
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&FetchError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Initial dependency set; see [`FetchController::set_dependencies`].
    pub fn dependencies<D: Hash + ?Sized>(mut self, dependencies: &D) -> Self {
        self.dependencies = Some(fingerprint(dependencies));
        self
    }

    /// Build the controller and, when enabled, start the first cycle.
    pub fn start(self) -> FetchController<T> {
        let (state, _) = watch::channel(AsyncDataState::default());
        let inner = Arc::new(Inner {
            producer: self.producer,
            policy: self.policy,
            on_error: self.on_error,
            state,
            control: Mutex::new(CycleControl {
                live: None,
                retry_count: 0,
                enabled: self.enabled,
                disposed: false,
                dependencies: self.dependencies,
                cycles_started: 0,
            }),
            teardown: CancellationToken::new(),
        });

        if self.enabled {
            inner.start_cycle(CycleStart::Fresh);
        }

        FetchController { inner }
    }
}

impl<T> FetchController<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Start building a controller around a zero-argument producer.
    ///
    /// The producer is cancelled by dropping its future, so it must not hold
    /// on to work that outlives the future.
    pub fn builder<F, Fut>(producer: F) -> FetchControllerBuilder<T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        FetchControllerBuilder {
            producer: Arc::new(move || producer().boxed()),
            policy: RetryPolicy::default(),
            enabled: true,
            on_error: None,
            dependencies: None,
        }
    }

    /// Current state snapshot.
    pub fn state(&self) -> AsyncDataState<T> {
        self.inner.state.borrow().clone()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<AsyncDataState<T>> {
        self.inner.state.subscribe()
    }

    /// Wait until the live cycle (if any) has nothing left to do.
    ///
    /// Returns the frozen state as soon as the controller is disposed, even
    /// if that leaves the phase at `Loading` or `Retrying`.
    pub async fn settled(&self) -> AsyncDataState<T> {
        let mut receiver = self.subscribe();
        tokio::select! {
            settled = receiver.wait_for(|state| state.phase.is_settled()) => {
                if let Ok(state) = settled {
                    return (*state).clone();
                }
            }
            _ = self.inner.teardown.cancelled() => {}
        }
        self.state()
    }

    pub fn retry_count(&self) -> u32 {
        self.inner.lock_control().retry_count
    }

    /// Reset the retry counter and start a new cycle, superseding any live one.
    pub fn refetch(&self) {
        self.inner.start_cycle(CycleStart::Fresh);
    }

    /// Start a new cycle marked as a retry. Existing `data` stays visible.
    pub fn retry(&self) {
        self.inner.start_cycle(CycleStart::Retry);
    }

    /// Disabling cancels the live attempt and clears `loading`; enabling starts a fresh cycle.
    pub fn set_enabled(&self, enabled: bool) {
        {
            let mut control = self.inner.lock_control();
            if control.disposed || control.enabled == enabled {
                return;
            }
            control.enabled = enabled;
            if !enabled {
                if let Some(live) = control.live.take() {
                    live.cancel();
                }
                self.inner.state.send_modify(|state| state.go_idle());
                tracing::debug!("Fetch controller disabled");
                return;
            }
        }
        self.inner.start_cycle(CycleStart::Fresh);
    }

    /// Start a fresh cycle when `dependencies` differs from the last declared set.
    pub fn set_dependencies<D: Hash + ?Sized>(&self, dependencies: &D) {
        let fingerprint = fingerprint(dependencies);
        {
            let mut control = self.inner.lock_control();
            if control.disposed || control.dependencies == Some(fingerprint) {
                return;
            }
            control.dependencies = Some(fingerprint);
        }
        self.inner.start_cycle(CycleStart::Fresh);
    }

    /// Tear down: cancel the live attempt and freeze the state.
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}

impl<T> Drop for FetchController<T> {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl<T> Inner<T> {
    fn lock_control(&self) -> MutexGuard<'_, CycleControl> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispose(&self) {
        let mut control = self.lock_control();
        if control.disposed {
            return;
        }
        control.disposed = true;
        if let Some(live) = control.live.take() {
            live.cancel();
        }
        self.teardown.cancel();
    }
}

impl<T> Inner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn start_cycle(self: &Arc<Self>, start: CycleStart) {
        let (token, cycle) = {
            let mut control = self.lock_control();
            if control.disposed || !control.enabled {
                return;
            }
            if let Some(previous) = control.live.take() {
                previous.cancel();
                tracing::debug!(
                    cycle = control.cycles_started,
                    "Superseding in-flight fetch cycle"
                );
            }
            if start == CycleStart::Fresh {
                control.retry_count = 0;
            }
            control.cycles_started += 1;

            let token = CancellationToken::new();
            control.live = Some(token.clone());
            self.state
                .send_modify(|state| state.begin_attempt(start == CycleStart::Retry));
            (token, control.cycles_started)
        };

        tokio::spawn(Arc::clone(self).run_cycle(token, cycle));
    }

    async fn run_cycle(self: Arc<Self>, token: CancellationToken, cycle: u64) {
        loop {
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                outcome = self.attempt() => outcome,
            };

            let settlement = {
                let mut control = self.lock_control();
                if token.is_cancelled() {
                    return;
                }
                self.settle(&mut control, outcome, cycle)
            };

            match settlement {
                Settlement::Done => return,
                Settlement::Failed(error) => {
                    if let Some(callback) = &self.on_error {
                        callback(&error);
                    }
                    return;
                }
                Settlement::Backoff(delay) => {
                    // A superseded cycle skips the rest of its wait.
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }

                    let _control = self.lock_control();
                    if token.is_cancelled() {
                        return;
                    }
                    self.state.send_modify(|state| state.begin_attempt(true));
                }
            }
        }
    }

    async fn attempt(&self) -> Result<T, FetchError> {
        let attempt = (self.producer)();
        match self.policy.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, attempt)
                .await
                .unwrap_or(Err(FetchError::Timeout(limit))),
            None => attempt.await,
        }
    }

    fn settle(
        &self,
        control: &mut CycleControl,
        outcome: Result<T, FetchError>,
        cycle: u64,
    ) -> Settlement {
        match outcome {
            Ok(data) => {
                control.retry_count = 0;
                control.live = None;
                self.state.send_modify(|state| state.succeed(data));
                tracing::debug!(cycle, "Fetch cycle succeeded");
                Settlement::Done
            }
            Err(error) if error.is_cancellation() => {
                control.live = None;
                self.state.send_modify(|state| state.go_idle());
                tracing::debug!(cycle, "Producer reported cancellation, result dropped");
                Settlement::Done
            }
            Err(error)
                if error.is_retryable() && control.retry_count < self.policy.max_retries =>
            {
                control.retry_count += 1;
                let delay = self.policy.delay_for(control.retry_count);
                self.state.send_modify(|state| state.await_retry());
                tracing::warn!(
                    cycle,
                    retry = control.retry_count,
                    max_retries = self.policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Fetch attempt failed, will retry"
                );
                Settlement::Backoff(delay)
            }
            Err(error) => {
                control.live = None;
                let terminal = if error.is_retryable() {
                    FetchError::RetriesExhausted {
                        retries: control.retry_count,
                        last: Box::new(error),
                    }
                } else {
                    error
                };
                self.state.send_modify(|state| state.fail(terminal.clone()));
                tracing::error!(cycle, error = %terminal, "Fetch cycle failed");
                Settlement::Failed(terminal)
            }
        }
    }
}
