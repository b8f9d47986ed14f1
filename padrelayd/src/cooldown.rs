//! Per-session, per-macro rate limiting
//!
//! A macro that fires starts a cooldown window of `base`. Triggers inside the
//! window are suppressed and grow the window by `increment` (up to `max`)
//! without moving its start, so sustained spam is throttled harder.

use padrelay_common::MacroId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownPolicy {
    base: Duration,
    increment: Duration,
    max: Duration,
}

impl CooldownPolicy {
    /// `max` is raised to `base` if configured below it
    pub fn new(base: Duration, increment: Duration, max: Duration) -> Self {
        Self {
            base,
            increment,
            max: max.max(base),
        }
    }

    #[cfg(test)]
    pub fn base(&self) -> Duration {
        self.base
    }

    #[cfg(test)]
    pub fn max(&self) -> Duration {
        self.max
    }
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(500),
            Duration::from_secs(1),
            Duration::from_secs(3),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownState {
    pub last_trigger: Instant,
    pub current: Duration,
}

/// Outcome of a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Play,
    Suppressed { cooldown: Duration },
}

/// Cooldown state for every macro one session has triggered
#[derive(Debug, Default)]
pub struct CooldownTracker {
    entries: HashMap<MacroId, CooldownState>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a trigger of `id` at `now` and decide whether it may play
    pub fn evaluate(&mut self, id: MacroId, now: Instant, policy: &CooldownPolicy) -> Verdict {
        let fresh = CooldownState {
            last_trigger: now,
            current: policy.base,
        };

        match self.entries.get_mut(&id) {
            None => {
                self.entries.insert(id, fresh);
                Verdict::Play
            }
            Some(state) if now.saturating_duration_since(state.last_trigger) >= state.current => {
                *state = fresh;
                Verdict::Play
            }
            Some(state) => {
                state.current = (state.current + policy.increment).min(policy.max);
                Verdict::Suppressed {
                    cooldown: state.current,
                }
            }
        }
    }

    #[cfg(test)]
    pub fn get(&self, id: &MacroId) -> Option<&CooldownState> {
        self.entries.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use padrelay_common::digest;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_spam_then_recover() {
        let policy = CooldownPolicy::new(ms(500), ms(500), ms(3000));
        let mut tracker = CooldownTracker::new();
        let id = digest("M");
        let t0 = Instant::now();

        assert_eq!(tracker.evaluate(id, t0, &policy), Verdict::Play);
        assert_eq!(tracker.get(&id).unwrap().current, ms(500));

        assert_eq!(
            tracker.evaluate(id, t0 + ms(200), &policy),
            Verdict::Suppressed { cooldown: ms(1000) }
        );
        // The window still starts at t0
        assert_eq!(tracker.get(&id).unwrap().last_trigger, t0);

        assert_eq!(tracker.evaluate(id, t0 + ms(1200), &policy), Verdict::Play);
        let state = tracker.get(&id).unwrap();
        assert_eq!(state.last_trigger, t0 + ms(1200));
        assert_eq!(state.current, ms(500));
    }

    #[test]
    fn test_cooldown_capped_at_max() {
        let policy = CooldownPolicy::default();
        let mut tracker = CooldownTracker::new();
        let id = digest("M");
        let t0 = Instant::now();

        tracker.evaluate(id, t0, &policy);
        let mut seen = Vec::new();
        for step in 1..=5 {
            match tracker.evaluate(id, t0 + ms(step * 10), &policy) {
                Verdict::Suppressed { cooldown } => seen.push(cooldown),
                Verdict::Play => panic!("trigger {} should be suppressed", step),
            }
        }
        assert_eq!(seen, vec![ms(1500), ms(2500), ms(3000), ms(3000), ms(3000)]);

        // Exactly at the window edge counts as elapsed
        assert_eq!(tracker.evaluate(id, t0 + ms(3000), &policy), Verdict::Play);
    }

    #[test]
    fn test_macros_are_independent() {
        let policy = CooldownPolicy::default();
        let mut tracker = CooldownTracker::new();
        let t0 = Instant::now();

        assert_eq!(tracker.evaluate(digest("a"), t0, &policy), Verdict::Play);
        assert_eq!(tracker.evaluate(digest("b"), t0, &policy), Verdict::Play);
        assert!(matches!(
            tracker.evaluate(digest("a"), t0 + ms(1), &policy),
            Verdict::Suppressed { .. }
        ));
    }

    #[test]
    fn test_policy_max_below_base() {
        let policy = CooldownPolicy::new(ms(800), ms(100), ms(200));
        assert_eq!(policy.max(), ms(800));
        assert_eq!(policy.base(), ms(800));
    }
}
