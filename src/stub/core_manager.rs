//! Per-core liveness and stop-event bookkeeping.
//!
//! Each core is mapped 1:1 to a GDB process: pid = core index + 1. Every
//! core carries at most one pending (unreported) stop event; a second stop
//! arriving before the first is reported is an invariant violation the
//! server aborts on.

use core::ops::{Index, IndexMut};

use log::warn;

use crate::target::{ResumeRes, ResumeType};

/// Dynamic state of one target core.
#[derive(Debug, Clone)]
pub struct CoreState {
    stop_reason: ResumeRes,
    resume_type: ResumeType,
    stop_reported: bool,
    live: bool,
}

impl Default for CoreState {
    fn default() -> Self {
        // A fresh core looks like it just stopped with an interrupt that
        // has already been reported, so `?` has something to say.
        CoreState {
            stop_reason: ResumeRes::Interrupted,
            resume_type: ResumeType::None,
            stop_reported: true,
            live: true,
        }
    }
}

impl CoreState {
    pub fn kill(&mut self) {
        self.live = false;
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn stop_reason(&self) -> ResumeRes {
        self.stop_reason
    }

    /// A core is running iff it has been given a resume action.
    pub fn is_running(&self) -> bool {
        self.resume_type != ResumeType::None
    }

    pub fn has_unreported_stop(&self) -> bool {
        !self.stop_reported
    }

    /// Mark the current stop reason as surfaced to the client.
    pub fn report_stop(&mut self) {
        self.stop_reported = true;
    }

    pub fn set_stop_reason(&mut self, res: ResumeRes) {
        self.stop_reason = res;
        self.stop_reported = res == ResumeRes::None;
    }

    pub fn set_resume_type(&mut self, resume_type: ResumeType) {
        self.resume_type = resume_type;
    }
}

/// Tracks how many cores exist and which are still alive.
pub struct CoreManager {
    num_cores: usize,
    live_cores: usize,
    states: Vec<CoreState>,
}

impl CoreManager {
    pub fn new(count: usize) -> Self {
        CoreManager {
            num_cores: count,
            live_cores: count,
            states: vec![CoreState::default(); count],
        }
    }

    pub fn cpu_count(&self) -> usize {
        self.num_cores
    }

    pub fn live_core_count(&self) -> usize {
        self.live_cores
    }

    pub fn pid_to_core(pid: u32) -> usize {
        pid as usize - 1
    }

    pub fn core_to_pid(core: usize) -> u32 {
        core as u32 + 1
    }

    pub fn is_core_live(&self, core: usize) -> bool {
        self.states[core].is_live()
    }

    /// Mark a core as killed (exited). Returns `false` for an out-of-range
    /// core. Killing an already-dead core still decrements the live count.
    pub fn kill(&mut self, core: usize) -> bool {
        if core >= self.num_cores {
            return false;
        }
        if !self.states[core].is_live() {
            warn!("core {} killed twice", core);
        }
        self.states[core].kill();
        self.live_cores = self.live_cores.saturating_sub(1);
        true
    }

    /// Restore every core to life with fresh state, as on reset or a new
    /// client connection.
    pub fn reset(&mut self) {
        self.live_cores = self.num_cores;
        self.states.clear();
        self.states.resize(self.num_cores, CoreState::default());
    }

    /// The next stop event owed to the client, if any.
    ///
    /// Cores are scanned in index order, but any pending host-syscall
    /// request trumps other stop reasons: the syscalling core is blocked
    /// until the client services it.
    pub fn next_unreported_stop(&self) -> Option<(usize, ResumeRes)> {
        let mut first_other: Option<(usize, ResumeRes)> = None;

        for (core, state) in self.states.iter().enumerate() {
            if !state.is_running() || !state.has_unreported_stop() {
                continue;
            }

            let res = state.stop_reason();
            if res == ResumeRes::None {
                continue;
            }
            if res == ResumeRes::Syscall {
                return Some((core, res));
            }
            if first_other.is_none() {
                first_other = Some((core, res));
            }
        }

        first_other
    }
}

impl Index<usize> for CoreManager {
    type Output = CoreState;

    fn index(&self, core: usize) -> &CoreState {
        &self.states[core]
    }
}

impl IndexMut<usize> for CoreManager {
    fn index_mut(&mut self, core: usize) -> &mut CoreState {
        &mut self.states[core]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_with_stop(mgr: &mut CoreManager, core: usize, res: ResumeRes) {
        mgr[core].set_resume_type(ResumeType::Continue);
        mgr[core].set_stop_reason(res);
    }

    #[test]
    fn fresh_core_has_reported_interrupt() {
        let mgr = CoreManager::new(2);
        assert_eq!(mgr[0].stop_reason(), ResumeRes::Interrupted);
        assert!(!mgr[0].has_unreported_stop());
        assert!(!mgr[0].is_running());
        assert_eq!(mgr.live_core_count(), 2);
    }

    #[test]
    fn pid_mapping() {
        assert_eq!(CoreManager::pid_to_core(1), 0);
        assert_eq!(CoreManager::core_to_pid(0), 1);
        assert_eq!(CoreManager::pid_to_core(4), 3);
    }

    #[test]
    fn kill_and_reset() {
        let mut mgr = CoreManager::new(2);
        assert!(mgr.kill(1));
        assert!(!mgr.is_core_live(1));
        assert_eq!(mgr.live_core_count(), 1);
        assert!(!mgr.kill(5));

        mgr.reset();
        assert!(mgr.is_core_live(1));
        assert_eq!(mgr.live_core_count(), 2);
    }

    #[test]
    fn repeated_kill_still_decrements() {
        let mut mgr = CoreManager::new(2);
        assert!(mgr.kill(0));
        assert!(mgr.kill(0));
        assert_eq!(mgr.live_core_count(), 0);
    }

    #[test]
    fn stop_reason_none_counts_as_reported() {
        let mut state = CoreState::default();
        state.set_stop_reason(ResumeRes::None);
        assert!(!state.has_unreported_stop());
        state.set_stop_reason(ResumeRes::Stepped);
        assert!(state.has_unreported_stop());
        state.report_stop();
        assert!(!state.has_unreported_stop());
    }

    #[test]
    fn syscall_beats_earlier_interrupt() {
        let mut mgr = CoreManager::new(3);
        running_with_stop(&mut mgr, 0, ResumeRes::Interrupted);
        running_with_stop(&mut mgr, 2, ResumeRes::Syscall);
        assert_eq!(mgr.next_unreported_stop(), Some((2, ResumeRes::Syscall)));
    }

    #[test]
    fn first_core_wins_without_syscall() {
        let mut mgr = CoreManager::new(3);
        running_with_stop(&mut mgr, 1, ResumeRes::Stepped);
        running_with_stop(&mut mgr, 2, ResumeRes::Interrupted);
        assert_eq!(mgr.next_unreported_stop(), Some((1, ResumeRes::Stepped)));
    }

    #[test]
    fn reported_and_idle_cores_skipped() {
        let mut mgr = CoreManager::new(2);
        // Not running: pending reason is ignored.
        mgr[0].set_stop_reason(ResumeRes::Stepped);
        mgr[0].set_resume_type(ResumeType::None);
        assert_eq!(mgr.next_unreported_stop(), None);

        running_with_stop(&mut mgr, 1, ResumeRes::Stepped);
        mgr[1].report_stop();
        assert_eq!(mgr.next_unreported_stop(), None);
    }
}
