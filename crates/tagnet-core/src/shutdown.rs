//! Two-phase session shutdown.
//!
//! Peers must despawn what they own before the host goes away, or they never
//! see the despawn. The host broadcasts `EndGame`, waits for the broadcast to
//! clear, and only then tears itself down.

/// Host-side sequencer: broadcast first, local teardown after `ack_ticks`.
#[derive(Debug, Clone)]
pub struct ShutdownSequencer {
    ack_ticks: u32,
    remaining: Option<u32>,
    complete: bool,
}

impl ShutdownSequencer {
    pub fn new(ack_ticks: u32) -> Self {
        Self {
            ack_ticks,
            remaining: None,
            complete: false,
        }
    }

    /// Start the sequence. Returns false if it was already started.
    pub fn begin(&mut self) -> bool {
        if self.remaining.is_some() || self.complete {
            return false;
        }
        self.remaining = Some(self.ack_ticks);
        true
    }

    /// Advance one scheduling tick. Returns true exactly once, on the tick
    /// where host teardown is due.
    pub fn on_tick(&mut self) -> bool {
        let Some(remaining) = self.remaining.as_mut() else {
            return false;
        };
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            self.remaining = None;
            self.complete = true;
            return true;
        }
        false
    }

    pub fn is_pending(&self) -> bool {
        self.remaining.is_some()
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

/// Guards a "game ended" callback so it fires once, whichever path gets
/// there first (EndGame, host teardown, or lost connection).
#[derive(Debug, Clone, Copy, Default)]
pub struct GameEndLatch {
    fired: bool,
}

impl GameEndLatch {
    /// Returns true the first time only.
    pub fn fire(&mut self) -> bool {
        !std::mem::replace(&mut self.fired, true)
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teardown_waits_one_tick_by_default() {
        let mut seq = ShutdownSequencer::new(1);
        assert!(!seq.on_tick());
        assert!(seq.begin());
        assert!(seq.is_pending());
        assert!(seq.on_tick());
        assert!(seq.is_complete());
        assert!(!seq.on_tick());
    }

    #[test]
    fn longer_ack_window() {
        let mut seq = ShutdownSequencer::new(3);
        seq.begin();
        assert!(!seq.on_tick());
        assert!(!seq.on_tick());
        assert!(seq.on_tick());
    }

    #[test]
    fn zero_ack_ticks_tears_down_on_next_tick() {
        let mut seq = ShutdownSequencer::new(0);
        seq.begin();
        assert!(seq.on_tick());
    }

    #[test]
    fn begin_is_one_shot() {
        let mut seq = ShutdownSequencer::new(1);
        assert!(seq.begin());
        assert!(!seq.begin());
        seq.on_tick();
        assert!(!seq.begin());
    }

    #[test]
    fn latch_fires_once() {
        let mut latch = GameEndLatch::default();
        assert!(!latch.has_fired());
        assert!(latch.fire());
        assert!(!latch.fire());
        assert!(latch.has_fired());
    }
}
