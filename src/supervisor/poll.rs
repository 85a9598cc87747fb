use crate::domain::worktree::WorktreeStatus;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::Duration;

/// Fast lane while the user is actively typing into a pane.
pub const INTERACTIVE_FAST: Duration = Duration::from_millis(50);
pub const INTERACTIVE_MEDIUM: Duration = Duration::from_millis(200);
pub const INTERACTIVE_SLOW: Duration = Duration::from_millis(500);
/// Quick re-capture right after a keystroke lands in the pane.
pub const DEBOUNCE: Duration = Duration::from_millis(20);

const INITIAL: Duration = Duration::from_millis(500);
const ACTIVE_BURST: Duration = Duration::from_millis(500);
const IDLE: Duration = Duration::from_secs(4);
const WAITING: Duration = Duration::from_secs(5);
const DONE: Duration = Duration::from_secs(12);
const HIDDEN: Duration = Duration::from_secs(6);
const UNFOCUSED: Duration = Duration::from_secs(16);

/// Bound on the deterministic per-session offset.
const STAGGER_WINDOW_MS: u64 = 400;

/// Where a session sits in the polling cadence when its next tick is
/// scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollContext {
    /// Agent just started; converge on its real status quickly.
    Initial,
    /// Last capture changed the buffer.
    OutputChanged,
    /// Last capture was a no-op; cadence follows the settled status.
    Idle(WorktreeStatus),
    /// Output pane not visible (another view has the screen).
    Hidden,
    /// The whole app is unfocused.
    Unfocused,
    /// User is driving this pane; cadence decays with keyboard idleness.
    Interactive { since_last_key: Duration },
    /// Immediate re-capture after forwarding a keystroke.
    Debounce,
}

/// Base interval for a context, before staggering.
pub fn interval_for(ctx: PollContext) -> Duration {
    match ctx {
        PollContext::Initial => INITIAL,
        PollContext::OutputChanged => ACTIVE_BURST,
        PollContext::Idle(WorktreeStatus::Waiting) => WAITING,
        PollContext::Idle(WorktreeStatus::Done) => DONE,
        PollContext::Idle(_) => IDLE,
        PollContext::Hidden => HIDDEN,
        PollContext::Unfocused => UNFOCUSED,
        PollContext::Interactive { since_last_key } => {
            if since_last_key < Duration::from_secs(2) {
                INTERACTIVE_FAST
            } else if since_last_key < Duration::from_secs(10) {
                INTERACTIVE_MEDIUM
            } else {
                INTERACTIVE_SLOW
            }
        }
        PollContext::Debounce => DEBOUNCE,
    }
}

/// Deterministic per-session offset so co-started sessions never align
/// their ticks into one thundering herd.
pub fn stagger(session_name: &str) -> Duration {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    session_name.hash(&mut hasher);
    Duration::from_millis(hasher.finish() % STAGGER_WINDOW_MS)
}

/// Interval plus stagger: the actual delay to schedule.
pub fn delay_for(session_name: &str, ctx: PollContext) -> Duration {
    interval_for(ctx) + stagger(session_name)
}

/// Per-session generation counters. A tick scheduled under an old
/// generation is dead on arrival, which cleanly cancels a stale poll chain
/// without interrupting any in-flight subprocess.
#[derive(Debug, Default)]
pub struct PollScheduler {
    generations: HashMap<String, u64>,
}

impl PollScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self, worktree: &str) -> u64 {
        self.generations.get(worktree).copied().unwrap_or(0)
    }

    /// Invalidate every outstanding tick for this worktree and return the
    /// new current generation.
    pub fn bump(&mut self, worktree: &str) -> u64 {
        let counter = self.generations.entry(worktree.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    pub fn is_current(&self, worktree: &str, generation: u64) -> bool {
        self.generation(worktree) == generation
    }

    pub fn forget(&mut self, worktree: &str) {
        self.generations.remove(worktree);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_table() {
        assert_eq!(interval_for(PollContext::Initial), Duration::from_millis(500));
        assert_eq!(
            interval_for(PollContext::OutputChanged),
            Duration::from_millis(500)
        );
        assert_eq!(
            interval_for(PollContext::Idle(WorktreeStatus::Active)),
            Duration::from_secs(4)
        );
        assert_eq!(
            interval_for(PollContext::Idle(WorktreeStatus::Waiting)),
            Duration::from_secs(5)
        );
        assert_eq!(
            interval_for(PollContext::Idle(WorktreeStatus::Done)),
            Duration::from_secs(12)
        );
        assert_eq!(interval_for(PollContext::Hidden), Duration::from_secs(6));
        assert_eq!(interval_for(PollContext::Unfocused), Duration::from_secs(16));
        assert_eq!(interval_for(PollContext::Debounce), Duration::from_millis(20));
    }

    #[test]
    fn interactive_cadence_decays() {
        let fast = PollContext::Interactive {
            since_last_key: Duration::from_millis(100),
        };
        let medium = PollContext::Interactive {
            since_last_key: Duration::from_secs(5),
        };
        let slow = PollContext::Interactive {
            since_last_key: Duration::from_secs(30),
        };
        assert_eq!(interval_for(fast), INTERACTIVE_FAST);
        assert_eq!(interval_for(medium), INTERACTIVE_MEDIUM);
        assert_eq!(interval_for(slow), INTERACTIVE_SLOW);
    }

    #[test]
    fn stagger_is_deterministic_and_bounded() {
        let a = stagger("sidecar-wt-feat-x");
        let b = stagger("sidecar-wt-feat-x");
        assert_eq!(a, b);
        assert!(a < Duration::from_millis(STAGGER_WINDOW_MS));
    }

    #[test]
    fn delay_includes_stagger() {
        let name = "sidecar-wt-feat-x";
        assert_eq!(
            delay_for(name, PollContext::Initial),
            interval_for(PollContext::Initial) + stagger(name)
        );
    }

    #[test]
    fn generations_start_at_zero_and_bump() {
        let mut sched = PollScheduler::new();
        assert_eq!(sched.generation("wt"), 0);
        assert!(sched.is_current("wt", 0));

        let bumped = sched.bump("wt");
        assert_eq!(bumped, 1);
        assert!(!sched.is_current("wt", 0));
        assert!(sched.is_current("wt", 1));
    }

    #[test]
    fn forget_resets_generation() {
        let mut sched = PollScheduler::new();
        sched.bump("wt");
        sched.forget("wt");
        assert_eq!(sched.generation("wt"), 0);
    }
}
