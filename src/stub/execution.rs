//! The execution coordinator: prepare/resume/wait, stop-event reporting,
//! and host-syscall forwarding.
//!
//! Once `vCont` has armed every core, [`GdbServer::do_core_actions`] drives
//! the target until a stop event is owed to the client, polling for client
//! breaks and the configured timeout while the target runs. Stop events are
//! consumed one per reply; host-syscall requests take priority so a blocked
//! core gets its I/O serviced first.

use log::{info, warn};

use crate::common::{Addr, RegVal, Signal};
use crate::conn::Connection;
use crate::protocol::syscall_reply::SyscallReply;
use crate::stub::core_manager::CoreManager;
use crate::stub::GdbServer;
use crate::target::{ResumeRes, SyscallArgLoc, WaitRes};
use crate::util::fatal_error;

/// Host syscall numbers forwarded to the client.
mod sys {
    pub const CLOSE: u64 = 57;
    pub const LSEEK: u64 = 62;
    pub const READ: u64 = 63;
    pub const WRITE: u64 = 64;
    pub const FSTAT: u64 = 80;
    pub const EXIT: u64 = 93;
    pub const GETTIMEOFDAY: u64 = 169;
    pub const OPEN: u64 = 1024;
    pub const UNLINK: u64 = 1026;
    pub const STAT: u64 = 1038;
}

impl<'a, C: Connection> GdbServer<'a, C> {
    /// Run the armed resume actions until a stop event has been reported.
    ///
    /// Also used to carry on after a syscall reply: any cores still running
    /// from the interrupted continue just keep going.
    pub(super) fn do_core_actions(&mut self) {
        // A break that arrived while we were processing packets takes
        // precedence over resuming.
        if self.rsp.have_break() {
            if self.flags.trace_exec() {
                info!("break detected in gdbserver, halting all cores");
            }
            self.cpu.halt();
            self.report_exception(Signal::Int);
            return;
        }

        // Stops may already be pending (e.g. two cores halted at once, and
        // only one has been reported so far).
        if self.process_stop_events() {
            return;
        }

        // Stopping on timeout always takes some non-zero time, so the
        // deadline is only ever approximate.
        self.timeout.stamp(&*self.cpu);

        if !self.cpu.resume() {
            fatal_error("error while resuming target");
        }

        let mut results: Vec<ResumeRes> = Vec::new();
        loop {
            match self.cpu.wait(&mut results) {
                WaitRes::Timeout => {
                    let have_break = self.rsp.have_break();

                    if have_break || self.timeout.timed_out(&*self.cpu) {
                        if self.flags.trace_exec() {
                            info!("break detected in gdbserver, halting all cores");
                        }
                        self.cpu.halt();
                        let sig = if have_break {
                            Signal::Int
                        } else {
                            Signal::Xcpu
                        };
                        self.report_exception(sig);
                        return;
                    }
                }
                WaitRes::Error => fatal_error("error returned from call to wait"),
                WaitRes::EventOccurred => break,
            }
        }

        // The target has halted for some reason.
        let count = self.core_manager.cpu_count();
        if results.len() != count {
            fatal_error(&format!(
                "wait returned incorrect number of results, got {} expected {}",
                results.len(),
                count
            ));
        }

        for core in 0..count {
            if self.core_manager[core].is_running() {
                if self.core_manager[core].has_unreported_stop() {
                    fatal_error(&format!(
                        "core {} stopped, but already has a stop event pending",
                        core
                    ));
                }
                self.core_manager[core].set_stop_reason(results[core]);
            }
        }

        if self.process_stop_events() {
            return;
        }

        fatal_error("no stop event found");
    }

    /// Report the next pending stop event, if there is one. Returns whether
    /// an event was handled (and hence a reply sent or requested).
    pub(super) fn process_stop_events(&mut self) -> bool {
        let Some((core, res)) = self.core_manager.next_unreported_stop() else {
            return false;
        };

        self.core_manager[core].report_stop();
        // Reads and writes triggered by the reply (syscall arguments, stop
        // context) must address the stopped core.
        self.cpu.set_current_cpu(core);

        match res {
            ResumeRes::Syscall => {
                if self.flags.trace_exec() {
                    info!("stop event: syscall (core {})", core);
                }
                self.syscall_request();
            }
            ResumeRes::Interrupted => {
                if self.flags.trace_exec() {
                    info!("stop event: interrupt (core {})", core);
                }
                self.report_exception(Signal::Int);
            }
            ResumeRes::Stepped => {
                if self.flags.trace_exec() {
                    info!("stop event: stepped (core {})", core);
                }
                self.report_exception(Signal::Trap);
            }
            ResumeRes::Lockstep => {
                if self.flags.trace_exec() {
                    info!("stop event: lockstep (core {})", core);
                }
                self.report_exception(Signal::Usr1);
            }
            res => fatal_error(&format!("unknown stop event type {}", res)),
        }

        true
    }

    /// Number of bytes in the NUL-terminated string at `addr`, including
    /// the terminator. Used for syscalls that pass pathnames.
    fn string_length(&mut self, addr: Addr) -> usize {
        let mut count = 0;
        let mut byte = [0u8; 1];
        while self.cpu.read(addr + count as Addr, &mut byte) == 1 {
            count += 1;
            if byte[0] == 0 {
                break;
            }
        }
        count
    }

    /// Read a syscall argument from wherever the target ABI puts it.
    fn read_arg_loc(&mut self, loc: &SyscallArgLoc) -> RegVal {
        match *loc {
            SyscallArgLoc::Register(reg) => self.cpu.read_register(reg).0,
            SyscallArgLoc::Memory(addr) => {
                let mut buf = [0u8; 8];
                let size = self.cpu.register_size().min(buf.len());
                if self.cpu.read(addr, &mut buf[..size]) != size {
                    warn!("failed to read syscall argument at {:#x}", addr);
                }
                u64::from_le_bytes(buf)
            }
        }
    }

    /// The `n`th syscall argument, or 0 when the ABI names fewer.
    fn syscall_arg(&mut self, locs: &crate::target::SyscallArgLocs, n: usize) -> RegVal {
        match locs.args.get(n) {
            Some(loc) => self.read_arg_loc(loc),
            None => 0,
        }
    }

    /// Write the syscall return value to wherever the target ABI puts it.
    fn write_arg_loc(&mut self, loc: &SyscallArgLoc, value: RegVal) {
        match *loc {
            SyscallArgLoc::Register(reg) => {
                self.cpu.write_register(reg, value);
            }
            SyscallArgLoc::Memory(addr) => {
                let size = self.cpu.register_size().min(8);
                let bytes = value.to_le_bytes();
                if self.cpu.write(addr, &bytes[..size]) != size {
                    warn!("failed to write syscall result at {:#x}", addr);
                }
            }
        }
    }

    /// Forward the current core's host-syscall request as an `F` packet.
    ///
    /// The arguments were placed by the target run-time in its ABI-defined
    /// locations before it raised the syscall stop.
    pub(super) fn syscall_request(&mut self) {
        if self.handling_syscall {
            warn!("there's already a syscall pending, first one lost?");
        }
        self.handling_syscall = true;

        let Some(locs) = self.cpu.syscall_arg_locations() else {
            // No ABI description: nothing we can forward.
            warn!("target cannot describe syscall arguments: reporting trap");
            self.handling_syscall = false;
            self.report_exception(Signal::Trap);
            return;
        };

        let id = self.read_arg_loc(&locs.id);
        let a0 = self.syscall_arg(&locs, 0);
        let a1 = self.syscall_arg(&locs, 1);
        let a2 = self.syscall_arg(&locs, 2);

        let body = match id {
            sys::CLOSE => format!("Fclose,{:x}", a0),
            sys::LSEEK => format!("Flseek,{:x},{:x},{:x}", a0, a1, a2),
            sys::READ => format!("Fread,{:x},{:x},{:x}", a0, a1, a2),
            sys::WRITE => format!("Fwrite,{:x},{:x},{:x}", a0, a1, a2),
            sys::FSTAT => format!("Ffstat,{:x},{:x}", a0, a1),
            sys::GETTIMEOFDAY => format!("Fgettimeofday,{:x},{:x}", a0, a1),
            sys::OPEN => {
                let len = self.string_length(a0);
                format!("Fopen,{:x}/{:x},{:x},{:x}", a0, len, a1, a2)
            }
            sys::UNLINK => {
                let len = self.string_length(a0);
                format!("Funlink,{:x}/{:x}", a0, len)
            }
            sys::STAT => {
                let len = self.string_length(a0);
                format!("Fstat,{:x}/{:x},{:x}", a0, len, a1)
            }
            sys::EXIT => {
                let core = self.cpu.current_cpu();
                if self.flags.trace_exec() {
                    info!(
                        "exit syscall on core {}, halting all other cores",
                        core
                    );
                }
                self.cpu.halt();

                let body = if self.have_multiproc {
                    format!(
                        "W{:x};process:{:x}",
                        a0,
                        CoreManager::core_to_pid(core)
                    )
                } else {
                    format!("W{:x}", a0)
                };

                // An exit syscall never gets a reply, so there is no
                // continuation state to keep.
                self.handling_syscall = false;
                if self.kill_core_on_exit {
                    self.core_manager.kill(core);
                }

                self.pkt.pack_str(&body);
                self.put_pkt();
                return;
            }
            id => {
                warn!("unrecognised host syscall {}: reporting trap", id);
                self.handling_syscall = false;
                self.report_exception(Signal::Trap);
                return;
            }
        };

        self.pkt.pack_str(&body);
        self.put_pkt();
    }

    /// Handle the client's `F` reply and resume whatever was running.
    pub(super) fn syscall_reply(&mut self, body: &[u8]) {
        // We're finished with the syscall either way.
        self.handling_syscall = false;

        if let Some(reply) = SyscallReply::parse(body) {
            if reply.retcode() != -1 {
                if let Some(locs) = self.cpu.syscall_arg_locations() {
                    self.write_arg_loc(&locs.ret, reply.retcode() as u64);
                }
            }

            if reply.has_ctrl_c() {
                // An interrupt can race the reply and arrive both through
                // the Ctrl-C marker and as a break byte. Report the stop
                // first, then drain any pending break so it is not seen
                // twice.
                if self.flags.trace_exec() {
                    info!("break detected in gdbserver, halting all cores");
                }
                self.cpu.halt();
                self.report_exception(Signal::Int);
                let _ = self.rsp.have_break();
                return;
            }
        }

        self.do_core_actions();
    }
}
