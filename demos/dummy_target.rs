//! A minimal loadable target: one core, a flat RAM, and no real execution.
//!
//! Handy for bringing the server up and exercising the wire protocol with
//! a live GDB before a real CPU model exists:
//!
//! ```text
//! cargo build --example dummy-target
//! gdbserve --soname target/debug/examples/libdummy_target.so 3333
//! (gdb) target remote :3333
//! ```
//!
//! Steps complete instantly; continues stop immediately with an interrupt.
//! Memory reads of unwritten addresses return zero.

use std::collections::HashMap;

use gdbserve::target::{
    MatchType, ResetType, ResumeRes, ResumeType, WaitRes, TARGET_API_VERSION,
};
use gdbserve::{Addr, RegVal, Target, TraceFlags};

const NUM_REGS: usize = 33;
const REG_SIZE: usize = 4;

struct DummyTarget {
    regs: [RegVal; NUM_REGS],
    mem: HashMap<Addr, u8>,
    actions: Vec<ResumeType>,
    cycles: u64,
    instrs: u64,
}

impl DummyTarget {
    fn new() -> Self {
        DummyTarget {
            regs: [0; NUM_REGS],
            mem: HashMap::new(),
            actions: vec![ResumeType::None],
            cycles: 0,
            instrs: 0,
        }
    }
}

impl Target for DummyTarget {
    fn cpu_count(&self) -> usize {
        1
    }

    fn current_cpu(&self) -> usize {
        0
    }

    fn set_current_cpu(&mut self, cpu: usize) {
        debug_assert_eq!(cpu, 0);
    }

    fn register_count(&self) -> usize {
        NUM_REGS
    }

    fn register_size(&self) -> usize {
        REG_SIZE
    }

    fn read_register(&mut self, reg: usize) -> (RegVal, usize) {
        (self.regs.get(reg).copied().unwrap_or(0), REG_SIZE)
    }

    fn write_register(&mut self, reg: usize, value: RegVal) -> usize {
        match self.regs.get_mut(reg) {
            Some(slot) => {
                *slot = value;
                REG_SIZE
            }
            None => 0,
        }
    }

    fn read(&mut self, addr: Addr, buf: &mut [u8]) -> usize {
        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = self.mem.get(&(addr + i as Addr)).copied().unwrap_or(0);
        }
        buf.len()
    }

    fn write(&mut self, addr: Addr, buf: &[u8]) -> usize {
        for (i, b) in buf.iter().enumerate() {
            self.mem.insert(addr + i as Addr, *b);
        }
        buf.len()
    }

    fn insert_matchpoint(&mut self, _addr: Addr, _kind: MatchType) -> bool {
        // No hardware debug support.
        false
    }

    fn remove_matchpoint(&mut self, _addr: Addr, _kind: MatchType) -> bool {
        false
    }

    fn prepare(&mut self, actions: &[ResumeType]) -> bool {
        self.actions = actions.to_vec();
        true
    }

    fn resume(&mut self) -> bool {
        true
    }

    fn wait(&mut self, results: &mut Vec<ResumeRes>) -> WaitRes {
        self.cycles += 1;
        self.instrs += 1;
        *results = self
            .actions
            .iter()
            .map(|action| match action {
                ResumeType::Step => ResumeRes::Stepped,
                ResumeType::Continue => ResumeRes::Interrupted,
                ResumeType::None => ResumeRes::None,
            })
            .collect();
        WaitRes::EventOccurred
    }

    fn halt(&mut self) -> bool {
        true
    }

    fn reset(&mut self, _kind: ResetType) -> ResumeRes {
        self.regs = [0; NUM_REGS];
        self.mem.clear();
        self.cycles = 0;
        self.instrs = 0;
        ResumeRes::Success
    }

    fn cycle_count(&self) -> u64 {
        self.cycles
    }

    fn instr_count(&self) -> u64 {
        self.instrs
    }

    fn time_stamp(&self) -> f64 {
        self.cycles as f64
    }

    fn command(&mut self, _cmd: &str, _out: &mut String) -> bool {
        false
    }
}

#[no_mangle]
pub extern "C" fn target_api_version() -> u64 {
    TARGET_API_VERSION
}

/// # Safety
///
/// `_flags` must be a valid [`TraceFlags`] pointer for the duration of the
/// call (the dummy target does not retain it).
#[no_mangle]
pub unsafe extern "C" fn create_target(_flags: *const TraceFlags) -> *mut Box<dyn Target> {
    Box::into_raw(Box::new(Box::new(DummyTarget::new()) as Box<dyn Target>))
}
