use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DormancyState {
    Awake,
    /// Waiting to go quiet before closing with a dormancy reason
    Pending,
    /// The dormancy close has been sent
    Dormant,
}

/// Hysteresis guard for the sending side of an entity channel
pub struct Dormancy {
    state: DormancyState,
    last_update: Instant,
    pending_delta: bool,
}

impl Dormancy {
    pub fn new(now: Instant) -> Self {
        Self {
            state: DormancyState::Awake,
            last_update: now,
            pending_delta: false,
        }
    }

    pub fn state(&self) -> DormancyState {
        self.state
    }

    pub fn request(&mut self) {
        if self.state == DormancyState::Awake {
            self.state = DormancyState::Pending;
        }
    }

    pub fn wake(&mut self) {
        if self.state == DormancyState::Pending {
            self.state = DormancyState::Awake;
        }
    }

    /// A property delta exists that has not been sent yet
    pub fn mark_pending_delta(&mut self, now: Instant) {
        self.pending_delta = true;
        self.last_update = now;
    }

    /// Content went out on the channel
    pub fn note_update(&mut self, now: Instant) {
        self.pending_delta = false;
        self.last_update = now;
    }

    pub fn set_dormant(&mut self) {
        self.state = DormancyState::Dormant;
    }

    pub fn ready_to_close(&self, now: Instant, hysteresis: Duration, has_unacked: bool) -> bool {
        self.state == DormancyState::Pending
            && !self.pending_delta
            && !has_unacked
            && now.saturating_duration_since(self.last_update) >= hysteresis
    }
}
