use crate::time::MonitorClock;
use crate::value::{DataValue, ServiceError};
use std::fmt;
use std::sync::Arc;

struct QueueEntry {
    value: DataValue,
    error: Option<ServiceError>,
}

/// Fixed-capacity FIFO of pending (value, error) notifications with OPC UA
/// overflow semantics.
///
/// Storage is a slot vector with explicit `head`/`len` counters; `overflow`
/// is the absolute index of the single entry that must carry the overflow
/// info bit on its next delivery (the oldest undelivered entry under
/// discard-oldest, or the most recently written entry when a newer value was
/// rejected).
///
/// The resample gate in [`queue_value`](Self::queue_value) bounds growth to
/// at most one entry per sampling interval: values arriving early overwrite
/// the most recently enqueued entry in place instead of growing the queue.
///
/// Not internally synchronized; the owning [`MonitoredItem`]
/// (crate::item::MonitoredItem) serializes access under its lock.
pub struct NotificationQueue {
    clock: Arc<dyn MonitorClock>,
    slots: Vec<Option<QueueEntry>>,
    head: usize,
    len: usize,
    overflow: Option<usize>,
    discard_oldest: bool,
    keep_errors: bool,
    /// Next tick at which a new entry may be accepted; 0 until the first
    /// accepted sample when no interval is configured.
    next_sample_time: i64,
    sampling_interval: i64,
}

impl NotificationQueue {
    /// An empty queue. Callers must apply [`set_size`](Self::set_size)
    /// before queueing values.
    pub fn new(clock: Arc<dyn MonitorClock>) -> Self {
        Self {
            clock,
            slots: Vec::new(),
            head: 0,
            len: 0,
            overflow: None,
            discard_oldest: false,
            keep_errors: false,
            next_sample_time: 0,
            sampling_interval: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reconfigure capacity and discard policy, preserving queued entries.
    ///
    /// Entries are re-enqueued in their original order into the new buffer;
    /// when the new capacity is smaller than the number of pending entries,
    /// drops follow the NEW discard policy. Error slots are only retained
    /// when `keep_errors` is set (diagnostics requested); without it errors
    /// are discarded silently.
    pub fn set_size(&mut self, capacity: u32, discard_oldest: bool, keep_errors: bool) {
        let capacity = capacity.max(1) as usize;

        if capacity == self.slots.len() && keep_errors == self.keep_errors {
            self.discard_oldest = discard_oldest;
            return;
        }

        let mut pending = Vec::with_capacity(self.len);
        while let Some(entry) = self.take_oldest() {
            pending.push(entry);
        }

        self.slots = (0..capacity).map(|_| None).collect();
        self.head = 0;
        self.len = 0;
        self.overflow = None;
        self.discard_oldest = discard_oldest;
        self.keep_errors = keep_errors;

        for entry in pending {
            self.enqueue(entry.value, entry.error);
        }
    }

    /// Update the resample interval, preserving the current phase: the old
    /// interval's contribution is subtracted from the deadline before the
    /// new one is added, so an interval change never resets the periodic
    /// clock to "now".
    pub fn set_sampling_interval(&mut self, sampling_interval_ms: f64) {
        if self.sampling_interval < self.next_sample_time {
            self.next_sample_time -= self.sampling_interval;
        }

        self.sampling_interval = sampling_interval_ms.max(0.0) as i64;

        if self.sampling_interval > 0 {
            self.next_sample_time += self.sampling_interval;
        } else {
            self.next_sample_time = 0;
        }
    }

    /// Accept a value through the resample gate.
    ///
    /// Within a sampling interval the most recently enqueued entry is
    /// overwritten in place; otherwise the deadline is advanced by an
    /// integral number of interval steps past now (catch-up, not reset) and
    /// the value is enqueued as a new entry.
    pub fn queue_value(&mut self, value: DataValue, error: Option<ServiceError>) {
        let now = self.clock.now_ms();

        if self.len > 0 && self.sampling_interval > 0 && now < self.next_sample_time {
            let last = (self.head + self.len - 1) % self.slots.len();
            self.slots[last] = Some(QueueEntry {
                value,
                error: if self.keep_errors { error } else { None },
            });
            return;
        }

        if self.next_sample_time > 0 {
            let delta = now - self.next_sample_time;
            if self.sampling_interval > 0 && delta >= 0 {
                self.next_sample_time += (delta / self.sampling_interval + 1) * self.sampling_interval;
            }
        } else {
            self.next_sample_time = now + self.sampling_interval;
        }

        self.enqueue(value, error);
    }

    /// Dequeue the oldest entry. When the dequeued slot carries the pending
    /// overflow marker, the returned value's (and error's) status code has
    /// the overflow bit set and the marker is cleared.
    pub fn publish(&mut self) -> Option<(DataValue, Option<ServiceError>)> {
        let at_overflow = self.overflow == Some(self.head);
        let mut entry = self.take_oldest()?;

        if at_overflow {
            entry.value.status = entry.value.status.with_overflow();
            if let Some(error) = entry.error.as_mut() {
                error.status = error.status.with_overflow();
            }
            self.overflow = None;
        }

        Some((entry.value, entry.error))
    }

    fn take_oldest(&mut self) -> Option<QueueEntry> {
        if self.len == 0 {
            return None;
        }
        let entry = self.slots[self.head].take();
        debug_assert!(entry.is_some(), "occupied slot must hold an entry");
        self.head = (self.head + 1) % self.slots.len();
        self.len -= 1;
        entry
    }

    fn enqueue(&mut self, value: DataValue, error: Option<ServiceError>) {
        let capacity = self.slots.len();
        debug_assert!(capacity >= 1, "set_size must run before enqueue");

        let entry = QueueEntry {
            value,
            error: if self.keep_errors { error } else { None },
        };

        if self.len == 0 {
            self.head = 0;
            self.slots[0] = Some(entry);
            self.len = 1;
            self.overflow = None;
            return;
        }

        if self.len == capacity {
            if !self.discard_oldest {
                // reject the newest value but flag the entry it would have
                // displaced so the client still learns data was lost.
                self.overflow = Some((self.head + self.len - 1) % capacity);
                tracing::trace!(capacity, "notification rejected, queue full");
                return;
            }

            // evict the oldest entry; the overflow marker moves to the new
            // oldest so the next delivery reports the loss.
            self.slots[self.head] = None;
            self.head = (self.head + 1) % capacity;
            self.len -= 1;
            self.overflow = Some(self.head);
            tracing::trace!(capacity, "oldest notification discarded, queue full");
        }

        let tail = (self.head + self.len) % capacity;
        self.slots[tail] = Some(entry);
        self.len += 1;
    }
}

impl fmt::Debug for NotificationQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationQueue")
            .field("capacity", &self.slots.len())
            .field("len", &self.len)
            .field("head", &self.head)
            .field("overflow", &self.overflow)
            .field("discard_oldest", &self.discard_oldest)
            .field("keep_errors", &self.keep_errors)
            .field("next_sample_time", &self.next_sample_time)
            .field("sampling_interval", &self.sampling_interval)
            .finish()
    }
}
