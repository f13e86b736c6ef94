//! Ephemeral "is typing" state for one conversation.
//!
//! The tracker is a pure state machine driven by explicit instants. It never
//! sleeps or emits on its own: callers feed it keystrokes and remote signals,
//! ask for [`TypingTracker::next_deadline`], and call [`TypingTracker::poll`]
//! when that deadline passes. Outbound signals come back as return values.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use parley_types::id::UserId;

/// What a [`TypingTracker::poll`] found due.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TypingTick {
    /// A local signal to emit, if the idle window elapsed.
    pub local_signal: Option<bool>,
    /// Whether any remote entry expired.
    pub remote_changed: bool,
}

#[derive(Debug)]
pub struct TypingTracker {
    self_id: UserId,
    idle: Duration,
    remote_ttl: Duration,
    local_typing: bool,
    idle_deadline: Option<Instant>,
    /// Active remote typers and when each entry expires.
    remote: HashMap<UserId, Instant>,
}

impl TypingTracker {
    pub fn new(self_id: UserId, idle: Duration, remote_ttl: Duration) -> Self {
        Self {
            self_id,
            idle,
            remote_ttl,
            local_typing: false,
            idle_deadline: None,
            remote: HashMap::new(),
        }
    }

    pub fn is_local_typing(&self) -> bool {
        self.local_typing
    }

    /// Record local typing activity.
    ///
    /// A burst of `true` calls yields one `Some(true)`; each call pushes the
    /// idle deadline out. `false` yields `Some(false)` only if a `true` was
    /// emitted before.
    pub fn set_local(&mut self, is_typing: bool, now: Instant) -> Option<bool> {
        if is_typing {
            self.idle_deadline = Some(now + self.idle);
            if self.local_typing {
                return None;
            }
            self.local_typing = true;
            Some(true)
        } else {
            self.stop_local()
        }
    }

    /// The local user sent a message: withdraw the signal immediately.
    pub fn on_send(&mut self) -> Option<bool> {
        self.stop_local()
    }

    fn stop_local(&mut self) -> Option<bool> {
        self.idle_deadline = None;
        if self.local_typing {
            self.local_typing = false;
            Some(false)
        } else {
            None
        }
    }

    /// Apply everything due at `now`.
    pub fn poll(&mut self, now: Instant) -> TypingTick {
        let mut tick = TypingTick::default();

        if self.idle_deadline.is_some_and(|deadline| deadline <= now) {
            tick.local_signal = self.stop_local();
        }

        let before = self.remote.len();
        self.remote.retain(|_, expires| *expires > now);
        tick.remote_changed = self.remote.len() != before;

        tick
    }

    /// The earliest instant at which [`poll`](Self::poll) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.remote
            .values()
            .copied()
            .chain(self.idle_deadline)
            .min()
    }

    /// Apply a typing signal from another participant.
    ///
    /// Signals about the local user are ignored. Returns whether the active
    /// set changed.
    pub fn on_remote_typing(&mut self, user: &UserId, is_typing: bool, now: Instant) -> bool {
        if user == &self.self_id {
            return false;
        }
        if is_typing {
            self.remote
                .insert(user.clone(), now + self.remote_ttl)
                .is_none()
        } else {
            self.remote.remove(user).is_some()
        }
    }

    /// A real message from `user` arrived; they are no longer typing.
    pub fn on_remote_message(&mut self, user: &UserId) -> bool {
        self.remote.remove(user).is_some()
    }

    pub fn is_active(&self, user: &UserId) -> bool {
        self.remote.contains_key(user)
    }

    /// Read-only snapshot of the active remote typers, sorted.
    pub fn active(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.remote.keys().cloned().collect();
        users.sort();
        users
    }

    /// Forget all state. Returns `Some(false)` if the local user was typing.
    pub fn clear(&mut self) -> Option<bool> {
        self.remote.clear();
        self.stop_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDLE: Duration = Duration::from_millis(2_000);
    const TTL: Duration = Duration::from_millis(5_000);

    fn tracker() -> TypingTracker {
        TypingTracker::new(UserId::from("u1"), IDLE, TTL)
    }

    #[test]
    fn keystrokes_coalesce_into_one_true() {
        let mut t = tracker();
        let start = Instant::now();
        assert_eq!(t.set_local(true, start), Some(true));
        assert_eq!(t.set_local(true, start + Duration::from_millis(300)), None);
        assert_eq!(t.set_local(true, start + Duration::from_millis(900)), None);
        assert!(t.is_local_typing());
    }

    #[test]
    fn idle_window_emits_false_exactly_once() {
        let mut t = tracker();
        let start = Instant::now();
        t.set_local(true, start);

        assert_eq!(t.poll(start + Duration::from_millis(1_999)).local_signal, None);
        let deadline = t.next_deadline().unwrap();
        assert_eq!(deadline, start + IDLE);
        assert_eq!(t.poll(deadline).local_signal, Some(false));
        assert_eq!(t.poll(deadline + IDLE).local_signal, None);
        assert!(t.next_deadline().is_none());
    }

    #[test]
    fn activity_extends_the_idle_window() {
        let mut t = tracker();
        let start = Instant::now();
        t.set_local(true, start);
        t.set_local(true, start + Duration::from_millis(1_500));

        assert_eq!(t.poll(start + IDLE).local_signal, None);
        assert_eq!(
            t.poll(start + Duration::from_millis(3_500)).local_signal,
            Some(false)
        );
    }

    #[test]
    fn send_withdraws_immediately() {
        let mut t = tracker();
        t.set_local(true, Instant::now());
        assert_eq!(t.on_send(), Some(false));
        assert_eq!(t.on_send(), None);
        assert!(t.next_deadline().is_none());
    }

    #[test]
    fn false_without_prior_true_emits_nothing() {
        let mut t = tracker();
        assert_eq!(t.set_local(false, Instant::now()), None);
    }

    #[test]
    fn remote_typing_adds_and_removes() {
        let mut t = tracker();
        let now = Instant::now();
        let u2 = UserId::from("u2");

        assert!(t.on_remote_typing(&u2, true, now));
        assert_eq!(t.active(), vec![u2.clone()]);
        assert!(!t.on_remote_typing(&u2, true, now));
        assert!(t.on_remote_typing(&u2, false, now));
        assert!(t.active().is_empty());
    }

    #[test]
    fn self_is_never_in_the_active_set() {
        let mut t = tracker();
        assert!(!t.on_remote_typing(&UserId::from("u1"), true, Instant::now()));
        assert!(t.active().is_empty());
    }

    #[test]
    fn remote_entries_expire_after_silence() {
        let mut t = tracker();
        let now = Instant::now();
        let u2 = UserId::from("u2");
        t.on_remote_typing(&u2, true, now);

        assert!(!t.poll(now + Duration::from_millis(4_999)).remote_changed);
        assert!(t.poll(now + TTL).remote_changed);
        assert!(!t.is_active(&u2));
    }

    #[test]
    fn real_message_clears_remote_typing() {
        let mut t = tracker();
        let u2 = UserId::from("u2");
        t.on_remote_typing(&u2, true, Instant::now());
        assert!(t.on_remote_message(&u2));
        assert!(!t.on_remote_message(&u2));
    }

    #[test]
    fn clear_reports_pending_local_signal() {
        let mut t = tracker();
        let now = Instant::now();
        t.set_local(true, now);
        t.on_remote_typing(&UserId::from("u2"), true, now);
        assert_eq!(t.clear(), Some(false));
        assert!(t.active().is_empty());
        assert_eq!(t.clear(), None);
    }
}
