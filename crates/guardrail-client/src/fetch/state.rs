use guardrail_core::FetchError;

/// Where the controller is in its attempt cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPhase {
    /// Nothing in flight (never started, disabled, or a cancelled attempt settled).
    Idle,
    /// Initial attempt in flight.
    Loading,
    /// Waiting out a backoff delay, or a retry attempt in flight.
    Retrying,
    Succeeded,
    Failed,
}

impl FetchPhase {
    /// True once the cycle has nothing left to do.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Idle | Self::Succeeded | Self::Failed)
    }
}

/// Snapshot of a controller's observable state.
///
/// `loading` and `is_retrying` are never both true, and both are false at rest.
#[derive(Debug, Clone, PartialEq)]
pub struct AsyncDataState<T> {
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<FetchError>,
    pub is_retrying: bool,
    pub phase: FetchPhase,
}

impl<T> Default for AsyncDataState<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
            is_retrying: false,
            phase: FetchPhase::Idle,
        }
    }
}

impl<T> AsyncDataState<T> {
    pub(crate) fn begin_attempt(&mut self, retrying: bool) {
        self.error = None;
        self.loading = !retrying;
        self.is_retrying = retrying;
        self.phase = if retrying {
            FetchPhase::Retrying
        } else {
            FetchPhase::Loading
        };
    }

    pub(crate) fn succeed(&mut self, data: T) {
        self.data = Some(data);
        self.error = None;
        self.rest(FetchPhase::Succeeded);
    }

    pub(crate) fn await_retry(&mut self) {
        self.loading = false;
        self.is_retrying = true;
        self.phase = FetchPhase::Retrying;
    }

    pub(crate) fn fail(&mut self, error: FetchError) {
        self.error = Some(error);
        self.rest(FetchPhase::Failed);
    }

    /// Stop without touching `data` or `error`.
    pub(crate) fn go_idle(&mut self) {
        self.rest(FetchPhase::Idle);
    }

    fn rest(&mut self, phase: FetchPhase) {
        self.loading = false;
        self.is_retrying = false;
        self.phase = phase;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_clears_previous_error() {
        let mut state = AsyncDataState::<u32>::default();
        state.fail(FetchError::transient("boom"));
        assert_eq!(state.phase, FetchPhase::Failed);

        state.begin_attempt(false);
        assert_eq!(state.error, None);
        assert!(state.loading && !state.is_retrying);
        assert_eq!(state.phase, FetchPhase::Loading);
    }

    #[test]
    fn test_retry_attempt_keeps_data() {
        let mut state = AsyncDataState::default();
        state.succeed("cached");

        state.begin_attempt(true);
        assert_eq!(state.data, Some("cached"));
        assert!(!state.loading && state.is_retrying);

        state.await_retry();
        assert!(!state.loading && state.is_retrying);

        state.succeed("fresh");
        assert_eq!(state.data, Some("fresh"));
        assert!(!state.loading && !state.is_retrying);
        assert!(state.phase.is_settled());
    }
}
