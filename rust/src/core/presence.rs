use std::collections::{BTreeMap, HashMap};

/// Online flags and per-chat typing sets.
///
/// Typing entries carry a generation token. Expiry timers are scheduled by the
/// actor and report back with the token they were armed with; any later start
/// or stop for the same pair makes that token stale.
#[derive(Debug, Default)]
pub(crate) struct PresenceTracker {
    online: HashMap<String, bool>,
    // chat_id -> user_id -> token
    typing: HashMap<String, BTreeMap<String, u64>>,
    next_token: u64,
}

impl PresenceTracker {
    pub(crate) fn set_bulk_presence(&mut self, snapshot: HashMap<String, bool>) {
        self.online = snapshot;
    }

    /// Returns true when the flag changed.
    pub(crate) fn set_online(&mut self, user_id: &str, online: bool) -> bool {
        self.online.insert(user_id.to_string(), online) != Some(online)
    }

    pub(crate) fn is_online(&self, user_id: &str) -> bool {
        self.online.get(user_id).copied().unwrap_or(false)
    }

    pub(crate) fn presence(&self) -> &HashMap<String, bool> {
        &self.online
    }

    /// Adds (or refreshes) the pair and returns the token to arm its expiry with.
    pub(crate) fn start_typing(&mut self, chat_id: &str, user_id: &str) -> u64 {
        self.next_token += 1;
        let token = self.next_token;
        self.typing
            .entry(chat_id.to_string())
            .or_default()
            .insert(user_id.to_string(), token);
        token
    }

    pub(crate) fn stop_typing(&mut self, chat_id: &str, user_id: &str) -> bool {
        let Some(users) = self.typing.get_mut(chat_id) else {
            return false;
        };
        let removed = users.remove(user_id).is_some();
        if users.is_empty() {
            self.typing.remove(chat_id);
        }
        removed
    }

    /// Expiry timer fired. Only the timer armed by the latest start counts.
    pub(crate) fn expire_typing(&mut self, chat_id: &str, user_id: &str, token: u64) -> bool {
        let current = self
            .typing
            .get(chat_id)
            .and_then(|users| users.get(user_id))
            .copied();
        if current != Some(token) {
            return false;
        }
        self.stop_typing(chat_id, user_id)
    }

    pub(crate) fn typing_users(&self, chat_id: &str) -> Vec<String> {
        self.typing
            .get(chat_id)
            .map(|users| users.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn clear_chat(&mut self, chat_id: &str) {
        self.typing.remove(chat_id);
    }

    pub(crate) fn clear(&mut self) {
        self.online.clear();
        self.typing.clear();
    }
}

/// Debounce for the local user's own stop-typing signal.
///
/// Every composer change emits `typing` and re-arms a timer; `stop-typing` is
/// emitted when the timer for the latest change fires, or right away on send.
#[derive(Debug, Default)]
pub(crate) struct LocalTypingDebounce {
    pending: HashMap<String, u64>,
    next_token: u64,
}

impl LocalTypingDebounce {
    pub(crate) fn note_input(&mut self, chat_id: &str) -> u64 {
        self.next_token += 1;
        self.pending.insert(chat_id.to_string(), self.next_token);
        self.next_token
    }

    /// Timer fired; true when it belongs to the latest input and stop-typing
    /// should go out now.
    pub(crate) fn take_if_current(&mut self, chat_id: &str, token: u64) -> bool {
        if self.pending.get(chat_id) == Some(&token) {
            self.pending.remove(chat_id);
            return true;
        }
        false
    }

    /// Cancels the pending debounce; true if a stop-typing is owed.
    pub(crate) fn flush(&mut self, chat_id: &str) -> bool {
        self.pending.remove(chat_id).is_some()
    }

    pub(crate) fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_snapshot_replaces_presence() {
        let mut t = PresenceTracker::default();
        assert!(t.set_online("u1", true));
        assert!(!t.set_online("u1", true));
        t.set_bulk_presence(HashMap::from([("u2".to_string(), true)]));
        assert!(!t.is_online("u1"));
        assert!(t.is_online("u2"));
        assert!(t.set_online("u2", false));
        assert!(!t.is_online("u2"));
    }

    #[test]
    fn expiry_removes_typing_user() {
        let mut t = PresenceTracker::default();
        let token = t.start_typing("c1", "u1");
        assert_eq!(t.typing_users("c1"), vec!["u1".to_string()]);
        assert!(t.expire_typing("c1", "u1", token));
        assert!(t.typing_users("c1").is_empty());
    }

    #[test]
    fn restart_makes_earlier_expiry_stale() {
        let mut t = PresenceTracker::default();
        let first = t.start_typing("c1", "u1");
        let second = t.start_typing("c1", "u1");
        assert!(!t.expire_typing("c1", "u1", first));
        assert_eq!(t.typing_users("c1"), vec!["u1".to_string()]);
        assert!(t.expire_typing("c1", "u1", second));

        let third = t.start_typing("c1", "u1");
        assert!(t.stop_typing("c1", "u1"));
        assert!(!t.expire_typing("c1", "u1", third));
        assert!(!t.stop_typing("c1", "u1"));
    }

    #[test]
    fn typing_sets_are_per_chat() {
        let mut t = PresenceTracker::default();
        t.start_typing("c1", "u2");
        t.start_typing("c1", "u1");
        t.start_typing("c2", "u1");
        assert_eq!(t.typing_users("c1"), vec!["u1".to_string(), "u2".to_string()]);
        t.clear_chat("c1");
        assert!(t.typing_users("c1").is_empty());
        assert_eq!(t.typing_users("c2"), vec!["u1".to_string()]);
    }

    #[test]
    fn local_debounce_only_fires_for_latest_input() {
        let mut d = LocalTypingDebounce::default();
        let a = d.note_input("c1");
        let b = d.note_input("c1");
        assert!(!d.take_if_current("c1", a));
        assert!(d.take_if_current("c1", b));
        assert!(!d.take_if_current("c1", b));

        let c = d.note_input("c1");
        assert!(d.flush("c1"));
        assert!(!d.flush("c1"));
        assert!(!d.take_if_current("c1", c));
    }
}
