use std::collections::VecDeque;

use crate::Packet;

/// Backpressure policy for a bounded `Queue`. Per spec, dropping is only
/// ever appropriate for keepalive traffic; everything else must make the
/// producer wait (surfaced here as `Full` rather than blocking, since the
/// event loop is cooperative and never actually blocks).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePolicy {
    /// Reject pushes once the queue is at capacity; caller retries later.
    Backpressure,
    /// Drop the oldest queued packet to make room. Only ever configured for
    /// keepalive/echo queues.
    DropOldest,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct QueueStats {
    pub pushed: u64,
    pub popped: u64,
    pub dropped: u64,
    pub rejected: u64,
}

/// A FIFO of packets with a soft capacity and a configured overflow policy.
pub struct Queue {
    inner: VecDeque<Packet>,
    cap: usize,
    policy: QueuePolicy,
    next_slot: usize,
    stats: QueueStats,
}

impl Queue {
    pub fn new(cap: usize, policy: QueuePolicy) -> Self {
        Self { inner: VecDeque::with_capacity(cap.min(256)), cap, policy, next_slot: 0, stats: QueueStats::default() }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.inner.len() >= self.cap
    }

    pub fn stats(&self) -> QueueStats {
        self.stats
    }

    /// Attempt to enqueue `pkt`. On a full `Backpressure` queue the packet
    /// is handed back to the caller unchanged so it can be retried once
    /// space frees up (staying at the head of whatever upstream queue it
    /// came from, per the transport manager's write-side contract).
    pub fn try_push(&mut self, mut pkt: Packet) -> Result<(), Packet> {
        if self.is_full() {
            match self.policy {
                QueuePolicy::Backpressure => {
                    self.stats.rejected += 1;
                    return Err(pkt);
                }
                QueuePolicy::DropOldest => {
                    if self.inner.pop_front().is_some() {
                        self.stats.dropped += 1;
                    }
                }
            }
        }
        pkt.set_queue_slot(Some(self.next_slot));
        self.next_slot = self.next_slot.wrapping_add(1);
        self.inner.push_back(pkt);
        self.stats.pushed += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Packet> {
        let mut pkt = self.inner.pop_front()?;
        pkt.set_queue_slot(None);
        self.stats.popped += 1;
        Some(pkt)
    }

    pub fn front(&self) -> Option<&Packet> {
        self.inner.front()
    }

    /// Drop every packet currently queued, e.g. on session close.
    pub fn drain_and_drop(&mut self) {
        self.stats.dropped += self.inner.len() as u64;
        self.inner.clear();
    }
}

impl Packet {
    pub(crate) fn set_queue_slot(&mut self, slot: Option<usize>) {
        self.queue_slot = slot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Origin;

    #[test]
    fn backpressure_rejects_when_full() {
        let mut q = Queue::new(1, QueuePolicy::Backpressure);
        q.try_push(Packet::from_payload(Origin::Interface, b"a").unwrap()).unwrap();
        let rejected = q.try_push(Packet::from_payload(Origin::Interface, b"b").unwrap());
        assert!(rejected.is_err());
        assert_eq!(q.stats().rejected, 1);
    }

    #[test]
    fn drop_oldest_keeps_capacity() {
        let mut q = Queue::new(1, QueuePolicy::DropOldest);
        q.try_push(Packet::from_payload(Origin::Internal, b"a").unwrap()).unwrap();
        q.try_push(Packet::from_payload(Origin::Internal, b"b").unwrap()).unwrap();
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop().unwrap().payload(), b"b");
        assert_eq!(q.stats().dropped, 1);
    }

    #[test]
    fn fifo_order_preserved() {
        let mut q = Queue::new(4, QueuePolicy::Backpressure);
        for b in [b'a', b'b', b'c'] {
            q.try_push(Packet::from_payload(Origin::Interface, &[b]).unwrap()).unwrap();
        }
        assert_eq!(q.pop().unwrap().payload(), b"a");
        assert_eq!(q.pop().unwrap().payload(), b"b");
        assert_eq!(q.pop().unwrap().payload(), b"c");
        assert!(q.pop().is_none());
    }
}
