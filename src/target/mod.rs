//! The contract between the server and a debuggable target.
//!
//! A target models one or more CPU cores plus their shared memory. The
//! server never interprets instructions; it reads and writes state, arms
//! per-core resume actions, and waits for stop events. Targets are usually
//! compiled into a shared object and loaded by the driver at startup, so
//! the trait deliberately sticks to simple argument types.

use core::fmt;

use crate::common::{Addr, RegVal};
use crate::trace::TraceFlags;

/// Version number of this target contract.
///
/// Dynamically loaded targets export a `target_api_version` symbol; the
/// driver refuses to load a library built against a different version.
pub const TARGET_API_VERSION: u64 = 1;

/// Type of the `target_api_version` symbol a target library exports.
pub type TargetApiVersionFn = unsafe extern "C" fn() -> u64;

/// Type of the `create_target` symbol a target library exports.
///
/// The returned pointer is an owning, double-boxed trait object: the
/// caller reclaims it with `Box::from_raw` and unwraps one level. Double
/// boxing keeps the exported pointer thin and FFI-safe.
pub type CreateTargetFn =
    unsafe extern "C" fn(flags: *const TraceFlags) -> *mut Box<dyn Target>;

/// What a core was last asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeType {
    /// Single-step one instruction.
    Step,
    /// Run until something interesting happens.
    Continue,
    /// Stay halted.
    None,
}

/// Why a core stopped (or didn't).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeRes {
    /// Placeholder when a core has nothing to report.
    None,
    /// Execution was successful.
    Success,
    /// Execution failed.
    Failure,
    /// Execution interrupted (e.g. breakpoint).
    Interrupted,
    /// Execution hit a time limit.
    Timeout,
    /// The core needs some host I/O performed on its behalf.
    Syscall,
    /// A single step completed.
    Stepped,
    /// Lockstep divergence detected.
    Lockstep,
}

/// Result of a [`Target::wait`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitRes {
    /// Some core halted; per-core results are filled in.
    EventOccurred,
    /// Something went wrong inside the target.
    Error,
    /// Nothing yet; the caller should poll for breaks/timeouts and retry.
    Timeout,
}

/// How thorough a reset should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetType {
    /// Equivalent to recreating the target from scratch.
    Cold,
    /// Reset architectural state only.
    Warm,
}

/// Matchpoint kinds, with their `Z`/`z` packet digit values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchType {
    /// Software (memory) breakpoint.
    BreakSw = 0,
    /// Hardware breakpoint.
    BreakHw = 1,
    /// Write watchpoint.
    WatchWrite = 2,
    /// Read watchpoint.
    WatchRead = 3,
    /// Access (read/write) watchpoint.
    WatchAccess = 4,
}

/// Where a syscall argument (or the syscall id / return value) lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallArgLoc {
    /// A register, by number.
    Register(usize),
    /// A fixed memory address.
    Memory(Addr),
}

/// The target's ABI description for host-syscall forwarding.
#[derive(Debug, Clone)]
pub struct SyscallArgLocs {
    /// Where the syscall id is found.
    pub id: SyscallArgLoc,
    /// Argument locations, in order.
    pub args: Vec<SyscallArgLoc>,
    /// Where the return value is written.
    pub ret: SyscallArgLoc,
}

/// The set of operations a CPU model must provide to be debugged.
///
/// Reads and writes are addressed to the *current* cpu; multi-core targets
/// switch cores through [`set_current_cpu`](Target::set_current_cpu).
pub trait Target {
    /// Number of cores. Always at least one.
    fn cpu_count(&self) -> usize;

    /// Index of the core that reads and writes currently address.
    fn current_cpu(&self) -> usize;

    /// Select the core for subsequent reads and writes. Passing an index
    /// at or above [`cpu_count`](Target::cpu_count) is undefined.
    fn set_current_cpu(&mut self, cpu: usize);

    /// Number of registers visible to the client.
    fn register_count(&self) -> usize;

    /// Width of one register, in bytes.
    fn register_size(&self) -> usize;

    /// Is the target little-endian? Governs register packing and the byte
    /// order of software breakpoints written into memory.
    fn is_little_endian(&self) -> bool {
        true
    }

    /// Read a register; returns the value and its width in bytes.
    fn read_register(&mut self, reg: usize) -> (RegVal, usize);

    /// Write a register; returns the number of bytes written.
    fn write_register(&mut self, reg: usize, value: RegVal) -> usize;

    /// Read memory into `buf`, returning how many bytes were actually
    /// read. A short count is not an error at this level.
    fn read(&mut self, addr: Addr, buf: &mut [u8]) -> usize;

    /// Write memory from `buf`, returning how many bytes were actually
    /// written.
    fn write(&mut self, addr: Addr, buf: &[u8]) -> usize;

    /// Install a hardware matchpoint. Software breakpoints are handled by
    /// the server and never reach this.
    fn insert_matchpoint(&mut self, addr: Addr, kind: MatchType) -> bool;

    /// Remove a hardware matchpoint.
    fn remove_matchpoint(&mut self, addr: Addr, kind: MatchType) -> bool;

    /// Arm each core with its intended resume action. `actions` has
    /// exactly [`cpu_count`](Target::cpu_count) entries.
    fn prepare(&mut self, actions: &[ResumeType]) -> bool;

    /// Start all armed cores.
    fn resume(&mut self) -> bool;

    /// Block until a core halts (or the target's internal poll interval
    /// expires). On [`WaitRes::EventOccurred`], `results` holds one entry
    /// per core. The target halts peer cores itself once one halts.
    fn wait(&mut self, results: &mut Vec<ResumeRes>) -> WaitRes;

    /// Force all running cores to stop.
    fn halt(&mut self) -> bool;

    /// Reset the target.
    fn reset(&mut self, kind: ResetType) -> ResumeRes;

    /// Cycles executed since creation.
    fn cycle_count(&self) -> u64;

    /// Instructions executed since creation.
    fn instr_count(&self) -> u64;

    /// Simulated wall-clock time, in seconds.
    fn time_stamp(&self) -> f64;

    /// Target-specific monitor command hook. Output appended to `out` is
    /// relayed to the client; returning `false` reports failure.
    fn command(&mut self, cmd: &str, out: &mut String) -> bool;

    /// ABI description for host-syscall forwarding, if supported.
    fn syscall_arg_locations(&self) -> Option<SyscallArgLocs> {
        None
    }

    /// Does the target supply an XML target description?
    fn supports_target_xml(&self) -> bool {
        false
    }

    /// Fetch a target description document by annex name (normally
    /// `target.xml`).
    fn get_target_xml(&mut self, _name: &str) -> Option<String> {
        None
    }
}

impl fmt::Display for ResumeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResumeType::Step => "step",
            ResumeType::Continue => "continue",
            ResumeType::None => "none",
        };
        write!(f, "{}", name)
    }
}

impl fmt::Display for ResumeRes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResumeRes::None => "none",
            ResumeRes::Success => "success",
            ResumeRes::Failure => "failure",
            ResumeRes::Interrupted => "interrupted",
            ResumeRes::Timeout => "timeout",
            ResumeRes::Syscall => "syscall",
            ResumeRes::Stepped => "stepped",
            ResumeRes::Lockstep => "lockstep",
        };
        write!(f, "{}", name)
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchType::BreakSw => "breakpoint",
            MatchType::BreakHw => "hardware breakpoint",
            MatchType::WatchWrite => "write watchpoint",
            MatchType::WatchRead => "read watchpoint",
            MatchType::WatchAccess => "access watchpoint",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
pub(crate) mod test_stub;
