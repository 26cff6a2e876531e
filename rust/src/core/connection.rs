use std::time::Duration;

/// What to do after the push channel dropped or failed to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ReconnectPlan {
    /// Arm a timer; `token` must still be current when it fires.
    Retry {
        attempt: u32,
        delay: Duration,
        token: u64,
    },
    /// Attempts just ran out. Reported once.
    GiveUp,
    /// Nothing to do: suspended for credentials, already given up, or no session.
    Ignore,
}

/// Push channel reconnect policy: bounded exponential backoff, and a latch on
/// authentication failure that holds until the credential changes.
#[derive(Debug)]
pub(crate) struct ConnectionSupervisor {
    base_delay: Duration,
    max_attempts: u32,
    attempts: u32,
    token: u64,
    active: bool,
    auth_suspended: bool,
    exhausted: bool,
    // The channel dropped at some point since the last successful connect.
    interrupted: bool,
}

impl ConnectionSupervisor {
    pub(crate) fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
            attempts: 0,
            token: 0,
            active: false,
            auth_suspended: false,
            exhausted: false,
            interrupted: false,
        }
    }

    /// A session started; the first connect is about to be requested.
    pub(crate) fn start(&mut self) {
        self.active = true;
        self.interrupted = false;
        self.reset_attempts();
    }

    pub(crate) fn stop(&mut self) {
        self.active = false;
        self.interrupted = false;
        self.reset_attempts();
    }

    fn reset_attempts(&mut self) {
        self.attempts = 0;
        self.auth_suspended = false;
        self.exhausted = false;
        self.token += 1;
    }

    /// Returns true when this connect ends an interruption, so state
    /// missed while offline needs fetching.
    pub(crate) fn on_connected(&mut self) -> bool {
        self.attempts = 0;
        self.exhausted = false;
        // Any reconnect timer still armed is now pointless.
        self.token += 1;
        std::mem::take(&mut self.interrupted)
    }

    pub(crate) fn on_connection_lost(&mut self) -> ReconnectPlan {
        if !self.active {
            return ReconnectPlan::Ignore;
        }
        self.interrupted = true;
        if self.auth_suspended || self.exhausted {
            return ReconnectPlan::Ignore;
        }
        if self.attempts >= self.max_attempts {
            self.exhausted = true;
            self.token += 1;
            return ReconnectPlan::GiveUp;
        }
        let factor = 1u32 << self.attempts.min(16);
        let delay = self.base_delay.saturating_mul(factor);
        self.attempts += 1;
        self.token += 1;
        ReconnectPlan::Retry {
            attempt: self.attempts,
            delay,
            token: self.token,
        }
    }

    /// Returns true the first time, so the failure is surfaced once.
    pub(crate) fn on_auth_failed(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.token += 1;
        self.interrupted = true;
        let first = !self.auth_suspended;
        self.auth_suspended = true;
        first
    }

    /// New credential: lift the suspension and start counting afresh.
    pub(crate) fn on_credentials_changed(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.reset_attempts();
        true
    }

    /// Returning to the foreground gives an exhausted channel a fresh budget.
    /// Auth suspension is not lifted.
    pub(crate) fn on_foregrounded(&mut self) -> bool {
        if !self.active || self.auth_suspended || !self.exhausted {
            return false;
        }
        self.reset_attempts();
        true
    }

    pub(crate) fn is_current(&self, token: u64) -> bool {
        self.active && !self.auth_suspended && self.token == token
    }

    #[cfg(test)]
    pub(crate) fn is_auth_suspended(&self) -> bool {
        self.auth_suspended
    }
}
