//! Reconnect budget and teardown orchestration spanning the datagram
//! channel, signalling channel and handshake state machine (spec §4.9).

use crate::session::error::{ConnectError, TaskError};
use crate::session::VoiceSession;
use tracing::{instrument, warn};

/// Owns the retry budget for one guild's voice session and decides when a
/// failure should trigger a reconnect versus a full give-up.
pub struct Supervisor {
    current_tries: u32,
    max_tries: u32,
    quit: bool,
}

impl Supervisor {
    pub fn new(max_tries: u32) -> Self {
        Self {
            current_tries: 0,
            max_tries,
            quit: false,
        }
    }

    pub fn has_quit(&self) -> bool {
        self.quit
    }

    pub fn reset(&mut self) {
        self.current_tries = 0;
    }

    /// Attempts the initial handshake, retrying (tearing down and
    /// re-entering `CollectingInitData`) up to the configured budget.
    #[instrument(skip(self, session))]
    pub async fn establish(&mut self, session: &mut VoiceSession) -> Result<(), ConnectError> {
        loop {
            match session.connect().await {
                Ok(()) => {
                    self.reset();
                    return Ok(());
                },
                Err(e) => {
                    warn!(error = %e, "voice session handshake failed");
                    if !self.record_failure_and_check_budget() {
                        return Err(e);
                    }
                    session.reset_for_reconnect();
                },
            }
        }
    }

    /// Reacts to a steady-state task error: reconnects (resume-based) if
    /// under budget and the error warrants it, otherwise signals the
    /// caller to tear the session down for good.
    #[instrument(skip(self, session))]
    pub async fn handle_task_error(
        &mut self,
        session: &mut VoiceSession,
        error: TaskError,
    ) -> bool {
        if !error.should_trigger_reconnect() {
            warn!(error = %error, "steady-state error handled without reconnecting");
            return true;
        }

        warn!(error = %error, "voice session failure, attempting reconnect");
        if !self.record_failure_and_check_budget() {
            return false;
        }

        session.reset_for_reconnect();
        match self.establish(session).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "reconnect exhausted budget");
                false
            },
        }
    }

    fn record_failure_and_check_budget(&mut self) -> bool {
        self.current_tries += 1;
        if self.current_tries > self.max_tries {
            self.quit = true;
            false
        } else {
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_exhausts_after_max_tries() {
        let mut sup = Supervisor::new(2);
        assert!(sup.record_failure_and_check_budget());
        assert!(sup.record_failure_and_check_budget());
        assert!(!sup.record_failure_and_check_budget());
        assert!(sup.has_quit());
    }

    #[test]
    fn reset_clears_try_counter() {
        let mut sup = Supervisor::new(1);
        sup.record_failure_and_check_budget();
        sup.reset();
        assert!(sup.record_failure_and_check_budget());
    }
}
