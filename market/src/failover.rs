//! Provider failover as an explicit state machine.
//!
//! ```text
//! TRYING_PRIMARY ──fail──► RETRYING(p, n) ──max attempts──► FALLING_BACK(p+1)
//!                                 ▲                               │
//!                                 └──────────────fail─────────────┘
//! last provider exhausted ──► DEGRADED
//! ```
//!
//! The machine only decides *what to try next*; sleeping, timeouts and I/O
//! belong to the caller.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverState {
    /// First attempt against the highest-priority provider.
    TryingPrimary,
    /// Attempt `attempt` (2..=max) against provider `provider`.
    Retrying { provider: usize, attempt: usize },
    /// First attempt against a lower-priority provider.
    FallingBack { provider: usize },
    /// Every provider used up its attempts.
    Degraded,
}

#[derive(Debug, Clone)]
pub struct Failover {
    providers: usize,
    max_attempts: usize,
    state: FailoverState,
}

impl Failover {
    pub fn new(providers: usize, max_attempts: usize) -> Self {
        let state = if providers == 0 {
            FailoverState::Degraded
        } else {
            FailoverState::TryingPrimary
        };

        Self {
            providers,
            max_attempts: max_attempts.max(1),
            state,
        }
    }

    pub fn state(&self) -> FailoverState {
        self.state
    }

    /// `(provider index, 1-based attempt)` to run next, `None` once degraded.
    pub fn target(&self) -> Option<(usize, usize)> {
        match self.state {
            FailoverState::TryingPrimary => Some((0, 1)),
            FailoverState::Retrying { provider, attempt } => Some((provider, attempt)),
            FailoverState::FallingBack { provider } => Some((provider, 1)),
            FailoverState::Degraded => None,
        }
    }

    /// Advance after a failed attempt.
    pub fn on_failure(&mut self) -> FailoverState {
        self.state = match self.target() {
            None => FailoverState::Degraded,
            Some((provider, attempt)) if attempt < self.max_attempts => FailoverState::Retrying {
                provider,
                attempt: attempt + 1,
            },
            Some((provider, _)) if provider + 1 < self.providers => FailoverState::FallingBack {
                provider: provider + 1,
            },
            Some(_) => FailoverState::Degraded,
        };

        self.state
    }

    /// Advance past the current provider without spending its remaining
    /// attempts. Used when a provider reports it has no more data.
    pub fn on_drained(&mut self) -> FailoverState {
        self.state = match self.target() {
            Some((provider, _)) if provider + 1 < self.providers => FailoverState::FallingBack {
                provider: provider + 1,
            },
            _ => FailoverState::Degraded,
        };

        self.state
    }
}
