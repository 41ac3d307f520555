use std::time::Duration;

use tokio::time::Instant;

/// Missed acknowledges tolerated before the connection is considered dead
pub(crate) const MAX_MISSED_ACKS: u32 = 3;

/// What to do when the heartbeat timer fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Beat {
    /// send a heartbeat frame
    Send,
    /// too many heartbeats unacknowledged, close the connection
    Dead,
}

/// Heartbeat bookkeeping of one connected session
#[derive(Debug)]
pub(crate) struct Heartbeat {
    interval: Duration,
    awaiting_ack: bool,
    missed: u32,
    next_beat: Instant,
}

impl Heartbeat {
    /// first beat is due immediately
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            awaiting_ack: false,
            missed: 0,
            next_beat: Instant::now(),
        }
    }

    pub fn next_beat(&self) -> Instant {
        self.next_beat
    }

    pub fn missed(&self) -> u32 {
        self.missed
    }

    /// Called when the timer fires, schedules the next beat
    pub fn tick(&mut self) -> Beat {
        if self.awaiting_ack {
            self.missed += 1;
            log::debug!("Heartbeat not acknowledged, missed {}", self.missed);
            if self.missed >= MAX_MISSED_ACKS {
                return Beat::Dead;
            }
        }

        self.awaiting_ack = true;
        self.next_beat = Instant::now() + self.interval;
        log::trace!("Next heartbeat at {:?}", self.next_beat);

        Beat::Send
    }

    pub fn ack(&mut self) {
        self.awaiting_ack = false;
        self.missed = 0;
    }
}
