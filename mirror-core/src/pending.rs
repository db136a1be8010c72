//! Pending/deferred messages retried on later ticks.
//!
//! A message whose dependency (parent or target entity) is not registered
//! yet is kept here and re-attempted every tick until it applies. There is
//! no retry limit unless an expiry age is configured.

use std::collections::VecDeque;

/// Result of trying to apply one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    /// Applied (or deliberately consumed); drop the message.
    Applied,
    /// Waiting on the named entity; keep the message.
    Deferred(String),
}

/// A message kept across ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEntry<T> {
    /// The deferred message.
    pub message: T,
    /// Entity the message is waiting on, once an attempt has failed.
    pub waiting_on: Option<String>,
    /// Tick the message entered the queue.
    pub since_tick: u64,
    /// Failed attempts so far.
    pub attempts: u32,
}

impl<T> PendingEntry<T> {
    fn new(message: T, tick: u64) -> Self {
        Self {
            message,
            waiting_on: None,
            since_tick: tick,
            attempts: 0,
        }
    }
}

/// Counts from one [`PendingQueue::process`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessStats {
    /// Messages applied and dropped.
    pub applied: usize,
    /// Messages kept for the next tick.
    pub deferred: usize,
}

/// Ordered queue of messages for one kind.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingQueue<T> {
    entries: VecDeque<PendingEntry<T>>,
}

impl<T> Default for PendingQueue<T> {
    fn default() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }
}

impl<T> PendingQueue<T> {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message.
    pub fn push_back(&mut self, message: T, tick: u64) {
        self.entries.push_back(PendingEntry::new(message, tick));
    }

    /// Prepend a message so it is attempted before everything queued.
    pub fn push_front(&mut self, message: T, tick: u64) {
        self.entries.push_front(PendingEntry::new(message, tick));
    }

    /// Append several messages in order.
    pub fn extend(&mut self, messages: impl IntoIterator<Item = T>, tick: u64) {
        self.entries
            .extend(messages.into_iter().map(|m| PendingEntry::new(m, tick)));
    }

    /// Append `message`, dropping any queued message that `same` matches.
    pub fn replace(&mut self, message: T, tick: u64, same: impl Fn(&T) -> bool) {
        self.entries.retain(|e| !same(&e.message));
        self.push_back(message, tick);
    }

    /// Prepend `message` unless a queued message already matches `same`.
    ///
    /// Returns whether the message was queued.
    pub fn push_front_unless(&mut self, message: T, tick: u64, same: impl Fn(&T) -> bool) -> bool {
        if self.entries.iter().any(|e| same(&e.message)) {
            return false;
        }
        self.push_front(message, tick);
        true
    }

    /// Move every entry of `other` to the back of this queue.
    pub fn append(&mut self, other: &mut Self) {
        self.entries.append(&mut other.entries);
    }

    /// Stable sort by a key.
    pub fn sort_by_key<K: Ord>(&mut self, mut key: impl FnMut(&T) -> K) {
        self.entries
            .make_contiguous()
            .sort_by_key(|e| key(&e.message));
    }

    /// Attempt every entry in order, keeping the deferred ones.
    pub fn process(&mut self, mut apply: impl FnMut(&T) -> Attempt) -> ProcessStats {
        let mut stats = ProcessStats::default();
        let mut kept = VecDeque::with_capacity(self.entries.len());
        for mut entry in self.entries.drain(..) {
            match apply(&entry.message) {
                Attempt::Applied => stats.applied += 1,
                Attempt::Deferred(dependency) => {
                    entry.attempts = entry.attempts.saturating_add(1);
                    entry.waiting_on = Some(dependency);
                    kept.push_back(entry);
                    stats.deferred += 1;
                }
            }
        }
        self.entries = kept;
        stats
    }

    /// Drop entries queued at least `max_age` ticks before `tick`.
    ///
    /// Returns the dropped entries.
    pub fn expire(&mut self, tick: u64, max_age: u64) -> Vec<PendingEntry<T>> {
        let (expired, kept): (VecDeque<_>, VecDeque<_>) = self
            .entries
            .drain(..)
            .partition(|e| tick.saturating_sub(e.since_tick) >= max_age);
        self.entries = kept;
        expired.into()
    }

    /// Queued entries in order.
    pub fn iter(&self) -> impl Iterator<Item = &PendingEntry<T>> {
        self.entries.iter()
    }

    /// Number of queued messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_keeps_deferred_in_order() {
        let mut queue = PendingQueue::new();
        queue.extend(["a", "b", "c", "d"], 0);

        let stats = queue.process(|m| {
            if *m == "b" || *m == "d" {
                Attempt::Deferred(format!("{m}-parent"))
            } else {
                Attempt::Applied
            }
        });

        assert_eq!(stats, ProcessStats { applied: 2, deferred: 2 });
        let kept: Vec<_> = queue.iter().map(|e| e.message).collect();
        assert_eq!(kept, vec!["b", "d"]);
        let first = queue.iter().next().expect("entry");
        assert_eq!(first.attempts, 1);
        assert_eq!(first.waiting_on.as_deref(), Some("b-parent"));
    }

    #[test]
    fn test_retries_until_applied() {
        let mut queue = PendingQueue::new();
        queue.push_back("child", 0);
        let mut parent_exists = false;

        for _ in 0..5 {
            queue.process(|_| {
                if parent_exists {
                    Attempt::Applied
                } else {
                    Attempt::Deferred("parent".into())
                }
            });
        }
        assert_eq!(queue.iter().next().map(|e| e.attempts), Some(5));

        parent_exists = true;
        queue.process(|_| {
            if parent_exists {
                Attempt::Applied
            } else {
                Attempt::Deferred("parent".into())
            }
        });
        assert!(queue.is_empty());
    }

    #[test]
    fn test_replace_and_push_front_unless() {
        let mut queue = PendingQueue::new();
        queue.push_back(("box", 1), 0);
        queue.replace(("box", 2), 0, |m| m.0 == "box");
        assert_eq!(queue.len(), 1);

        assert!(!queue.push_front_unless(("box", 0), 0, |m| m.0 == "box"));
        assert!(queue.push_front_unless(("link", 0), 0, |m| m.0 == "link"));
        let order: Vec<_> = queue.iter().map(|e| e.message).collect();
        assert_eq!(order, vec![("link", 0), ("box", 2)]);
    }

    #[test]
    fn test_sort_is_stable() {
        let mut queue = PendingQueue::new();
        queue.extend(["a::b", "bb", "a", "cc"], 0);
        queue.sort_by_key(|m| m.len());
        let order: Vec<_> = queue.iter().map(|e| e.message).collect();
        assert_eq!(order, vec!["a", "bb", "cc", "a::b"]);
    }

    #[test]
    fn test_expire_by_age() {
        let mut queue = PendingQueue::new();
        queue.push_back("old", 1);
        queue.push_back("new", 8);

        let expired = queue.expire(10, 5);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].message, "old");
        assert_eq!(queue.len(), 1);
    }
}
