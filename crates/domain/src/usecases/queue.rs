//! Two-class publish queue: breaking items first, scheduled items one per interval

use std::collections::VecDeque;
use time::{Duration, OffsetDateTime};

use crate::model::Item;

/// Queue of items waiting to be published.
///
/// Breaking items are released immediately, in arrival order. Scheduled items
/// are released in arrival order, one per `interval`; the first one is due
/// immediately. Releasing a breaking item does not move the interval slot.
#[derive(Debug)]
pub struct PublishQueue {
    breaking: VecDeque<Item>,
    scheduled: VecDeque<Item>,
    interval: Duration,
    next_slot: Option<OffsetDateTime>,
}

impl PublishQueue {
    pub fn new(interval: Duration) -> Self {
        Self {
            breaking: VecDeque::new(),
            scheduled: VecDeque::new(),
            interval,
            next_slot: None,
        }
    }

    pub fn push(&mut self, item: Item) {
        if item.breaking {
            self.breaking.push_back(item);
        } else {
            self.scheduled.push_back(item);
        }
    }

    pub fn len(&self) -> usize {
        self.breaking.len() + self.scheduled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the next item that may be published at `now`.
    ///
    /// A scheduled item that is not due yet stays at the front of its queue.
    pub fn pop_due(&mut self, now: OffsetDateTime) -> Option<Item> {
        if let Some(item) = self.breaking.pop_front() {
            return Some(item);
        }

        if self.scheduled.is_empty() || !self.slot_open(now) {
            return None;
        }

        let item = self.scheduled.pop_front()?;
        self.next_slot = Some(now + self.interval);
        Some(item)
    }

    /// Take the next item whether or not its slot is open, breaking first
    pub fn pop_next(&mut self) -> Option<Item> {
        self.breaking
            .pop_front()
            .or_else(|| self.scheduled.pop_front())
    }

    /// When the queue next has something to release.
    ///
    /// `None` means nothing is waiting; a time at or before `now` means an item
    /// is due already.
    pub fn next_wakeup(&self, now: OffsetDateTime) -> Option<OffsetDateTime> {
        if !self.breaking.is_empty() {
            return Some(now);
        }
        if self.scheduled.is_empty() {
            return None;
        }
        Some(self.next_slot.map_or(now, |slot| slot.max(now)))
    }

    fn slot_open(&self, now: OffsetDateTime) -> bool {
        self.next_slot.is_none_or(|slot| now >= slot)
    }
}
