//! FIFO buffer for outbound frames written while the socket is not open.
//!
//! Frames are released in order once the socket is marked open. A frame that
//! stays queued longer than the timeout is expired and handed back so the
//! caller can report the loss to the user.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::frames::OutboundFrame;

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq)]
pub struct QueuedFrame {
    pub frame: OutboundFrame,
    pub queued_at: Instant,
}

#[derive(Debug)]
pub struct Outbox {
    queue: VecDeque<QueuedFrame>,
    timeout: Duration,
    open: bool,
}

impl Outbox {
    pub fn new(timeout: Duration) -> Self {
        Self {
            queue: VecDeque::new(),
            timeout,
            open: false,
        }
    }

    pub fn push(&mut self, frame: OutboundFrame, now: Instant) {
        self.queue.push_back(QueuedFrame {
            frame,
            queued_at: now,
        });
    }

    pub fn set_open(&mut self, open: bool) {
        self.open = open;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Next frame to write, only while the socket is open.
    pub fn pop_ready(&mut self) -> Option<QueuedFrame> {
        if self.open {
            self.queue.pop_front()
        } else {
            None
        }
    }

    /// Puts back a frame whose write failed; the socket is considered closed until reopened.
    pub fn requeue(&mut self, queued: QueuedFrame) {
        self.queue.push_front(queued);
        self.open = false;
    }

    /// Removes and returns the frames queued for longer than the timeout.
    pub fn expire(&mut self, now: Instant) -> Vec<OutboundFrame> {
        let timeout = self.timeout;
        let (expired, kept): (Vec<_>, Vec<_>) = self
            .queue
            .drain(..)
            .partition(|q| now.saturating_duration_since(q.queued_at) >= timeout);
        self.queue = kept.into();
        expired.into_iter().map(|q| q.frame).collect()
    }

    /// Time until the oldest frame expires, if any frame is queued.
    pub fn next_deadline(&self, now: Instant) -> Option<Duration> {
        self.queue
            .front()
            .map(|q| self.timeout.saturating_sub(now.saturating_duration_since(q.queued_at)))
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new(DEFAULT_SEND_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_wait_until_open_and_flush_in_order() {
        let now = Instant::now();
        let mut outbox = Outbox::default();
        outbox.push(OutboundFrame::user_text("un"), now);
        outbox.push(OutboundFrame::user_text("deux"), now);

        assert!(outbox.pop_ready().is_none());
        assert_eq!(outbox.len(), 2);

        outbox.set_open(true);
        assert_eq!(outbox.pop_ready().unwrap().frame, OutboundFrame::user_text("un"));
        assert_eq!(outbox.pop_ready().unwrap().frame, OutboundFrame::user_text("deux"));
        assert!(outbox.pop_ready().is_none());
    }

    #[test]
    fn test_requeue_keeps_head_and_closes() {
        let now = Instant::now();
        let mut outbox = Outbox::default();
        outbox.set_open(true);
        outbox.push(OutboundFrame::user_text("un"), now);
        outbox.push(OutboundFrame::Close, now);

        let head = outbox.pop_ready().unwrap();
        outbox.requeue(head);

        assert!(!outbox.is_open());
        outbox.set_open(true);
        assert_eq!(outbox.pop_ready().unwrap().frame, OutboundFrame::user_text("un"));
    }

    #[test]
    fn test_expire_drops_only_stale_frames() {
        let start = Instant::now();
        let mut outbox = Outbox::new(Duration::from_secs(5));
        outbox.push(OutboundFrame::user_text("vieux"), start);
        outbox.push(OutboundFrame::user_text("récent"), start + Duration::from_secs(3));

        assert!(outbox.expire(start + Duration::from_secs(4)).is_empty());
        assert_eq!(
            outbox.next_deadline(start + Duration::from_secs(4)),
            Some(Duration::from_secs(1))
        );

        let expired = outbox.expire(start + Duration::from_secs(6));
        assert_eq!(expired, vec![OutboundFrame::user_text("vieux")]);
        assert_eq!(outbox.len(), 1);
    }
}
