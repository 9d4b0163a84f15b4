//! Consecutive-loss cooldown

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Loss streak tracking; trading is blocked while `in_cooldown`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownState {
    pub consecutive_losses: u32,
    pub last_loss_time: Option<DateTime<Utc>>,
    pub in_cooldown: bool,
}

impl CooldownState {
    /// Count a loss at `at`; returns true when this loss starts the cooldown
    pub fn record_loss(&mut self, at: DateTime<Utc>, threshold: u32) -> bool {
        self.consecutive_losses += 1;
        self.last_loss_time = Some(at);
        if !self.in_cooldown && self.consecutive_losses >= threshold {
            self.in_cooldown = true;
            return true;
        }
        false
    }

    /// A non-losing trade ends the streak and any cooldown
    pub fn record_non_loss(&mut self) {
        self.consecutive_losses = 0;
        self.in_cooldown = false;
    }

    /// Time left in the cooldown at `now`
    ///
    /// An elapsed cooldown is cleared here, resetting the loss streak.
    pub fn remaining_at(&mut self, now: DateTime<Utc>, duration: Duration) -> Option<Duration> {
        if !self.in_cooldown {
            return None;
        }

        let elapsed = self.last_loss_time.map(|t| now - t).unwrap_or(duration);
        if elapsed < duration {
            return Some(duration - elapsed);
        }

        self.in_cooldown = false;
        self.consecutive_losses = 0;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_enters_cooldown_at_threshold() {
        let mut state = CooldownState::default();
        assert!(!state.record_loss(t0(), 3));
        assert!(!state.record_loss(t0(), 3));
        assert!(state.record_loss(t0(), 3));
        assert!(state.in_cooldown);
        assert_eq!(state.consecutive_losses, 3);
    }

    #[test]
    fn test_cooldown_expires_lazily() {
        let mut state = CooldownState::default();
        state.record_loss(t0(), 1);

        let hour = Duration::hours(1);
        let remaining = state.remaining_at(t0() + Duration::minutes(20), hour);
        assert_eq!(remaining, Some(Duration::minutes(40)));
        assert!(state.in_cooldown);

        assert!(state.remaining_at(t0() + hour, hour).is_none());
        assert!(!state.in_cooldown);
        assert_eq!(state.consecutive_losses, 0);
    }

    #[test]
    fn test_non_loss_clears_everything() {
        let mut state = CooldownState::default();
        state.record_loss(t0(), 2);
        state.record_loss(t0(), 2);
        state.record_non_loss();
        assert_eq!(state.consecutive_losses, 0);
        assert!(!state.in_cooldown);
        // Loss time is kept for reporting
        assert_eq!(state.last_loss_time, Some(t0()));
    }
}
