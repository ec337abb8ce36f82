//! A scriptable in-memory target used by unit tests.

use std::collections::{HashMap, VecDeque};

use super::*;
use crate::common::{Addr, RegVal};

/// Number of registers the stub models.
pub const STUB_NUM_REGS: usize = 33;
/// Register width, in bytes.
pub const STUB_REG_SIZE: usize = 4;

/// A fake multi-core target backed by plain collections.
///
/// `wait` pops scripted results from a queue; tests push the sequence of
/// events a scenario needs before driving the server.
pub struct StubTarget {
    pub cores: usize,
    pub current: usize,
    pub regs: Vec<Vec<RegVal>>,
    pub mem: HashMap<Addr, u8>,
    pub cycles: u64,
    pub instrs: u64,
    pub wait_script: VecDeque<(WaitRes, Vec<ResumeRes>)>,
    pub prepared: Vec<Vec<ResumeType>>,
    pub resume_calls: usize,
    pub halt_calls: usize,
    pub reset_calls: usize,
    pub hw_matchpoints: Vec<(Addr, MatchType)>,
    pub xml: Option<String>,
    pub with_syscall_locs: bool,
}

impl StubTarget {
    pub fn new(cores: usize) -> Self {
        StubTarget {
            cores,
            current: 0,
            regs: vec![vec![0; STUB_NUM_REGS]; cores],
            mem: HashMap::new(),
            cycles: 0,
            instrs: 0,
            wait_script: VecDeque::new(),
            prepared: Vec::new(),
            resume_calls: 0,
            halt_calls: 0,
            reset_calls: 0,
            hw_matchpoints: Vec::new(),
            xml: None,
            with_syscall_locs: true,
        }
    }

    /// Preload memory at `addr`.
    pub fn poke(&mut self, addr: Addr, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            self.mem.insert(addr + i as Addr, *b);
        }
    }

    /// Queue a wait result where `core` stops with `res` and the rest
    /// report nothing.
    pub fn script_stop(&mut self, core: usize, res: ResumeRes) {
        let mut results = vec![ResumeRes::None; self.cores];
        results[core] = res;
        self.wait_script.push_back((WaitRes::EventOccurred, results));
    }
}

impl Target for StubTarget {
    fn cpu_count(&self) -> usize {
        self.cores
    }

    fn current_cpu(&self) -> usize {
        self.current
    }

    fn set_current_cpu(&mut self, cpu: usize) {
        assert!(cpu < self.cores);
        self.current = cpu;
    }

    fn register_count(&self) -> usize {
        STUB_NUM_REGS
    }

    fn register_size(&self) -> usize {
        STUB_REG_SIZE
    }

    fn read_register(&mut self, reg: usize) -> (RegVal, usize) {
        (self.regs[self.current][reg], STUB_REG_SIZE)
    }

    fn write_register(&mut self, reg: usize, value: RegVal) -> usize {
        self.regs[self.current][reg] = value;
        STUB_REG_SIZE
    }

    fn read(&mut self, addr: Addr, buf: &mut [u8]) -> usize {
        for (i, slot) in buf.iter_mut().enumerate() {
            match self.mem.get(&(addr + i as Addr)) {
                Some(b) => *slot = *b,
                None => return i,
            }
        }
        buf.len()
    }

    fn write(&mut self, addr: Addr, buf: &[u8]) -> usize {
        self.poke(addr, buf);
        buf.len()
    }

    fn insert_matchpoint(&mut self, addr: Addr, kind: MatchType) -> bool {
        self.hw_matchpoints.push((addr, kind));
        true
    }

    fn remove_matchpoint(&mut self, addr: Addr, kind: MatchType) -> bool {
        match self.hw_matchpoints.iter().position(|mp| *mp == (addr, kind)) {
            Some(at) => {
                self.hw_matchpoints.remove(at);
                true
            }
            None => false,
        }
    }

    fn prepare(&mut self, actions: &[ResumeType]) -> bool {
        self.prepared.push(actions.to_vec());
        true
    }

    fn resume(&mut self) -> bool {
        self.resume_calls += 1;
        true
    }

    fn wait(&mut self, results: &mut Vec<ResumeRes>) -> WaitRes {
        match self.wait_script.pop_front() {
            Some((res, scripted)) => {
                *results = scripted;
                res
            }
            None => {
                // Model time passing while nothing interesting happens, so
                // cycle-timeout tests make progress.
                self.cycles += 100;
                *results = Vec::new();
                WaitRes::Timeout
            }
        }
    }

    fn halt(&mut self) -> bool {
        self.halt_calls += 1;
        true
    }

    fn reset(&mut self, _kind: ResetType) -> ResumeRes {
        self.reset_calls += 1;
        ResumeRes::Success
    }

    fn cycle_count(&self) -> u64 {
        self.cycles
    }

    fn instr_count(&self) -> u64 {
        self.instrs
    }

    fn time_stamp(&self) -> f64 {
        self.cycles as f64 * 1e-6
    }

    fn command(&mut self, cmd: &str, out: &mut String) -> bool {
        if cmd == "stub-ping" {
            out.push_str("pong\n");
            true
        } else {
            false
        }
    }

    fn syscall_arg_locations(&self) -> Option<SyscallArgLocs> {
        if !self.with_syscall_locs {
            return None;
        }
        // RISC-V style: a0-a2 carry arguments, a7 the id, a0 the result.
        Some(SyscallArgLocs {
            id: SyscallArgLoc::Register(17),
            args: vec![
                SyscallArgLoc::Register(10),
                SyscallArgLoc::Register(11),
                SyscallArgLoc::Register(12),
            ],
            ret: SyscallArgLoc::Register(10),
        })
    }

    fn supports_target_xml(&self) -> bool {
        self.xml.is_some()
    }

    fn get_target_xml(&mut self, name: &str) -> Option<String> {
        if name == "target.xml" {
            self.xml.clone()
        } else {
            None
        }
    }
}
