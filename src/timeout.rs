//! Run timeouts for continue/step actions.
//!
//! A timeout is either a wall-clock duration or a target cycle-count delta;
//! setting one kind replaces the other. The server stamps the timeout just
//! before resuming the target and polls [`Timeout::timed_out`] from inside
//! the wait loop.

use std::time::{Duration, Instant};

use crate::target::Target;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    /// Run forever.
    None,
    /// Wall-clock limit.
    Real(Duration),
    /// Target cycle-count limit.
    Cycle(u64),
}

/// Wall-clock *or* cycle-count deadline for a resumed target.
#[derive(Debug, Clone)]
pub struct Timeout {
    kind: Kind,
    real_stamp: Instant,
    cycle_stamp: u64,
}

impl Timeout {
    /// A timeout that never fires.
    pub fn new() -> Self {
        Timeout {
            kind: Kind::None,
            real_stamp: Instant::now(),
            cycle_stamp: 0,
        }
    }

    /// Remove any configured timeout.
    pub fn clear(&mut self) {
        self.kind = Kind::None;
    }

    /// Configure a wall-clock timeout, clearing any cycle timeout.
    pub fn set_real(&mut self, limit: Duration) {
        self.kind = Kind::Real(limit);
    }

    /// Configure a cycle-count timeout, clearing any wall-clock timeout.
    pub fn set_cycle(&mut self, limit: u64) {
        self.kind = Kind::Cycle(limit);
    }

    pub fn have_timeout(&self) -> bool {
        self.kind != Kind::None
    }

    pub fn is_real(&self) -> bool {
        matches!(self.kind, Kind::Real(_))
    }

    pub fn is_cycle(&self) -> bool {
        matches!(self.kind, Kind::Cycle(_))
    }

    /// Capture the reference point the deadline is measured from.
    pub fn stamp(&mut self, cpu: &dyn Target) {
        self.real_stamp = Instant::now();
        self.cycle_stamp = cpu.cycle_count();
    }

    /// Has the configured deadline passed since the last [`stamp`](Self::stamp)?
    pub fn timed_out(&self, cpu: &dyn Target) -> bool {
        match self.kind {
            Kind::None => false,
            Kind::Real(limit) => self.real_stamp.elapsed() > limit,
            Kind::Cycle(limit) => cpu.cycle_count() > self.cycle_stamp + limit,
        }
    }
}

impl Default for Timeout {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::test_stub::StubTarget;

    #[test]
    fn no_timeout_never_fires() {
        let cpu = StubTarget::new(1);
        let mut timeout = Timeout::new();
        assert!(!timeout.have_timeout());
        timeout.stamp(&cpu);
        assert!(!timeout.timed_out(&cpu));
    }

    #[test]
    fn setting_one_kind_clears_the_other() {
        let mut timeout = Timeout::new();

        timeout.set_real(Duration::from_secs(5));
        assert!(timeout.is_real());
        assert!(!timeout.is_cycle());

        timeout.set_cycle(1000);
        assert!(timeout.is_cycle());
        assert!(!timeout.is_real());
        assert!(timeout.have_timeout());

        timeout.clear();
        assert!(!timeout.have_timeout());
    }

    #[test]
    fn cycle_timeout_fires_when_count_advances() {
        let mut cpu = StubTarget::new(1);
        let mut timeout = Timeout::new();
        timeout.set_cycle(10);

        timeout.stamp(&cpu);
        assert!(!timeout.timed_out(&cpu));

        cpu.cycles = 5;
        assert!(!timeout.timed_out(&cpu));

        cpu.cycles = 11;
        assert!(timeout.timed_out(&cpu));
    }

    #[test]
    fn real_timeout_fires_after_elapsed() {
        let cpu = StubTarget::new(1);
        let mut timeout = Timeout::new();
        timeout.set_real(Duration::from_secs(0));
        let mut t = timeout.clone();
        t.stamp(&cpu);
        std::thread::sleep(Duration::from_millis(2));
        assert!(t.timed_out(&cpu));
    }
}
