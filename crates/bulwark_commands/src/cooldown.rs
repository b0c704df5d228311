//! Per-(command, actor) cooldown bookkeeping.

use crate::actor::ActorId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Result of asking the tracker to admit an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    OnCooldown { seconds_remaining: u64 },
    Denied,
}

/// Last successful invocation time per (command id, actor).
///
/// The check and the record happen under the map's entry lock, so two
/// concurrent invocations for the same key cannot both be admitted within one
/// window. Rejected invocations never touch the stored timestamp.
#[derive(Debug, Default)]
pub struct CooldownTracker {
    last: DashMap<(String, ActorId), Instant>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks the window for `command`/`actor` and, if the caller is
    /// `permitted`, records the invocation.
    ///
    /// `cooldown_secs <= 0` disables the window and nothing is stored.
    pub fn try_admit(
        &self,
        command: &str,
        actor: ActorId,
        cooldown_secs: i32,
        permitted: bool,
    ) -> Admission {
        if cooldown_secs <= 0 {
            return if permitted {
                Admission::Admitted
            } else {
                Admission::Denied
            };
        }

        let window = Duration::from_secs(cooldown_secs as u64);
        let now = Instant::now();

        match self.last.entry((command.to_string(), actor)) {
            Entry::Occupied(mut entry) => {
                let elapsed = now.saturating_duration_since(*entry.get());
                if elapsed < window {
                    return Admission::OnCooldown {
                        seconds_remaining: ceil_secs(window - elapsed),
                    };
                }
                if !permitted {
                    return Admission::Denied;
                }
                entry.insert(now);
                Admission::Admitted
            }
            Entry::Vacant(entry) => {
                if !permitted {
                    return Admission::Denied;
                }
                entry.insert(now);
                Admission::Admitted
            }
        }
    }

    /// Drops all state for an actor, e.g. when a player disconnects.
    pub fn forget_actor(&self, actor: ActorId) {
        self.last.retain(|(_, owner), _| *owner != actor);
    }

    /// Drops all state for a command that is no longer registered.
    pub fn forget_command(&self, command: &str) {
        self.last.retain(|(id, _), _| id != command);
    }

    pub fn len(&self) -> usize {
        self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs.max(1)
    }
}
