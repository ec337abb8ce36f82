//! The GDB server itself: packet dispatch and session state.
//!
//! A [`GdbServer`] owns the framer, the reply packet, the matchpoint table,
//! and all per-core bookkeeping; the target and the trace flags are borrowed
//! for the server's lifetime. One server serves one client at a time, in
//! strict receive order, on a single thread.

mod core_manager;
mod execution;
mod matchpoints;
mod monitor;

#[cfg(test)]
mod tests;

use std::io::Write as _;
use std::rc::Rc;

use log::{info, warn};
use thiserror::Error;

use crate::common::{Addr, Signal};
use crate::conn::{Connection, RspStream, StdioConnection, TcpConnection};
use crate::protocol::commands::{Command, MatchpointRequest, Query, SetRequest, VRequest};
use crate::protocol::hex;
use crate::protocol::vcont::VContActions;
use crate::protocol::{Packet, Ptid, MAX_PACKET};
use crate::stub::core_manager::CoreManager;
use crate::stub::matchpoints::MatchpointTable;
use crate::target::{MatchType, ResumeType, Target};
use crate::timeout::Timeout;
use crate::trace::TraceFlags;
use crate::util::fatal_error;

/// How to behave when the client kills the last core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillBehaviour {
    /// Reset the target, but remain alive for the next client.
    ResetOnKill,
    /// Stop the target, close the connection and return.
    ExitOnKill,
}

/// Whether one core halting stops its peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    AllStop,
    NonStop,
}

/// Why the server loop gave up.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("unable to establish a client connection")]
    ConnectFailed,
}

/// Default PID when the client asks for "any": core 0.
pub const PID_DEFAULT: i64 = 1;
/// Default (and only) TID.
pub const TID_DEFAULT: i64 = 1;

/// The software breakpoint instruction written over code (RISC-V `EBREAK`).
const BREAK_INSTR: u32 = 0x0010_0073;
/// Width of the breakpoint instruction, in bytes.
const BREAK_INSTR_LEN: usize = 4;

/// A GDB RSP server bound to one target and one transport.
pub struct GdbServer<'a, C: Connection> {
    cpu: &'a mut dyn Target,
    flags: Rc<TraceFlags>,
    rsp: RspStream<C>,
    pkt: Packet,
    matchpoints: MatchpointTable,
    timeout: Timeout,
    kill_behaviour: KillBehaviour,
    exit_server: bool,
    have_multiproc: bool,
    stop_mode: StopMode,
    ptid: Ptid,
    next_process: u32,
    handling_syscall: bool,
    kill_core_on_exit: bool,
    core_manager: CoreManager,
}

impl<'a, C: Connection> GdbServer<'a, C> {
    pub fn new(
        conn: C,
        cpu: &'a mut dyn Target,
        flags: Rc<TraceFlags>,
        kill_behaviour: KillBehaviour,
    ) -> Self {
        let core_manager = CoreManager::new(cpu.cpu_count());
        GdbServer {
            cpu,
            flags: flags.clone(),
            rsp: RspStream::new(conn, flags),
            pkt: Packet::new(),
            matchpoints: MatchpointTable::new(),
            timeout: Timeout::new(),
            kill_behaviour,
            exit_server: false,
            have_multiproc: false,
            stop_mode: StopMode::AllStop,
            ptid: Ptid::new(PID_DEFAULT, TID_DEFAULT),
            next_process: 1,
            handling_syscall: false,
            kill_core_on_exit: false,
            core_manager,
        }
    }

    /// Serve clients until asked to exit.
    ///
    /// Only a failure to (re-)establish a connection terminates the loop
    /// with an error; everything else is handled per-request.
    pub fn serve(&mut self) -> Result<(), ServerError> {
        while !self.exit_server {
            while !self.rsp.is_connected() {
                if !self.rsp.connect() {
                    return Err(ServerError::ConnectFailed);
                }
                // A fresh client starts from a fully live machine, even if
                // the previous session ran cores to exit.
                self.core_manager.reset();
            }

            self.client_request();
        }

        Ok(())
    }

    /// Receive and dispatch a single request packet.
    fn client_request(&mut self) {
        if !self.rsp.get_pkt(&mut self.pkt) {
            // Comms failure.
            self.rsp.close();
            return;
        }

        match Command::from_packet(&self.pkt) {
            Command::ExtendedMode => self.put_str_pkt("OK"),
            Command::LastSignal => self.last_signal(),
            Command::Argv => {
                warn!("RSP 'A' packet not supported: ignored");
                self.put_str_pkt("E01");
            }
            Command::BaudRate => {
                warn!("RSP 'b' packet is deprecated and not supported: ignored");
            }
            Command::LegacyBreakpoint => {
                warn!("RSP 'B' packet is deprecated (use 'Z'/'z' packets instead): ignored");
            }
            Command::LegacyResume(letter) => {
                warn!("RSP '{}' packet is not supported: ignored", letter as char);
            }
            Command::DisableDebug => {
                warn!("RSP 'd' packet is deprecated (define a 'Q' packet instead): ignored");
            }
            Command::Detach => {
                // Detach by closing the client; execution continues.
                self.put_str_pkt("OK");
                self.rsp.close();
            }
            Command::SyscallReply(body) => self.syscall_reply(&body),
            Command::ReadAllRegs => self.read_all_regs(),
            Command::WriteAllRegs(data) => self.write_all_regs(&data),
            Command::SetThreadContinue => {
                // Hc is deprecated in favour of vCont; ignore it.
                self.put_str_pkt("");
            }
            Command::SetThread(blob) => self.set_thread(&blob),
            Command::SetThreadUnknown => self.put_str_pkt("E02"),
            Command::CycleStep => {
                // Single cycle step is not modelled; report a trap.
                self.report_exception(Signal::Trap);
            }
            Command::Kill => {
                warn!("RSP 'k' packet is not supported: ignored");
            }
            Command::ReadMem { addr, len } => self.read_mem(addr, len),
            Command::WriteMem { addr, len, data } => self.write_mem(addr, len, &data),
            Command::ReadReg(reg) => self.read_reg(reg),
            Command::WriteReg { reg, value } => self.write_reg(reg, &value),
            Command::Query(query) => self.query(query),
            Command::Set(set) => self.set(set),
            Command::Reset => {
                warn!("RSP 'r' packet is deprecated (use 'R' packet instead): ignored");
            }
            Command::Restart => {
                // Restart is not supported; no reply is defined.
            }
            Command::Search => {
                warn!("RSP 't' packet not supported: ignored");
            }
            Command::ThreadAlive(_) => {
                // Bare metal: every thread the client knows about is alive.
                self.put_str_pkt("OK");
            }
            Command::V(request) => self.v_packet(request),
            Command::WriteMemBin { addr, len, data } => self.write_mem_bin(addr, len, &data),
            Command::RemoveMatchpoint(req) => self.remove_matchpoint(req),
            Command::InsertMatchpoint(req) => self.insert_matchpoint(req),
            Command::Malformed { what, code } => {
                warn!("failed to recognize RSP {} command: {}", what, self.pkt);
                self.put_str_pkt(code);
            }
            Command::Unsupported(body) => {
                warn!(
                    "unknown RSP request: {}",
                    String::from_utf8_lossy(&body)
                );
                self.put_str_pkt("");
            }
        }
    }

    /// Pack a string body and transmit it.
    fn put_str_pkt(&mut self, body: &str) {
        self.pkt.pack_str(body);
        self.rsp.put_pkt(&self.pkt);
    }

    /// Transmit the current contents of the reply packet.
    fn put_pkt(&mut self) {
        self.rsp.put_pkt(&self.pkt);
    }

    /// Send a stop-reply for the current cpu: `T<sig>thread:...;` when the
    /// client speaks multiprocess, plain `S<sig>` otherwise.
    fn report_exception(&mut self, sig: Signal) {
        let body = if self.have_multiproc {
            format!(
                "T{:02x}thread:p{:x}.1;",
                sig as u8,
                CoreManager::core_to_pid(self.cpu.current_cpu())
            )
        } else {
            format!("S{:02x}", sig as u8)
        };
        self.pkt.pack_str(&body);
        self.put_pkt();
    }

    /// `?`: report the last stop reason of the current cpu.
    fn last_signal(&mut self) {
        use crate::target::ResumeRes;

        let reason = self.core_manager[self.cpu.current_cpu()].stop_reason();
        match reason {
            ResumeRes::Interrupted => self.report_exception(Signal::Int),
            ResumeRes::Stepped => self.report_exception(Signal::Trap),
            ResumeRes::Lockstep => self.report_exception(Signal::Usr1),
            ResumeRes::Timeout => self.report_exception(Signal::Xcpu),
            reason => fatal_error(&format!("unexpected stop reason: {}", reason)),
        }
    }

    /// `g`: read every register, packed in target byte order.
    fn read_all_regs(&mut self) {
        let little_endian = self.cpu.is_little_endian();
        let mut body = String::new();
        for reg in 0..self.cpu.register_count() {
            let (val, size) = self.cpu.read_register(reg);
            body.push_str(&hex::reg_to_hex(val, size, little_endian));
        }
        self.pkt.pack_str(&body);
        self.put_pkt();
    }

    /// `G`: write every register from one concatenated hex blob.
    fn write_all_regs(&mut self, data: &[u8]) {
        let little_endian = self.cpu.is_little_endian();
        let reg_size = self.cpu.register_size();

        for reg in 0..self.cpu.register_count() {
            let chunk = match data.get(reg * reg_size * 2..(reg + 1) * reg_size * 2) {
                Some(chunk) => chunk,
                None => {
                    warn!("too few digits in RSP write all registers: ignored");
                    self.put_str_pkt("E01");
                    return;
                }
            };
            let val = match hex::hex_to_reg(chunk, reg_size, little_endian) {
                Some(val) => val,
                None => {
                    warn!("bad digits in RSP write all registers: ignored");
                    self.put_str_pkt("E01");
                    return;
                }
            };
            if self.cpu.write_register(reg, val) != reg_size {
                warn!("size != {} when writing reg {}", reg_size, reg);
            }
        }

        self.put_str_pkt("OK");
    }

    /// `p`: read one register.
    fn read_reg(&mut self, reg: usize) {
        if reg >= self.cpu.register_count() {
            warn!("RSP read of unknown register {}", reg);
            self.put_str_pkt("E01");
            return;
        }

        let little_endian = self.cpu.is_little_endian();
        let (val, size) = self.cpu.read_register(reg);
        let body = hex::reg_to_hex(val, size, little_endian);
        self.pkt.pack_str(&body);
        self.put_pkt();
    }

    /// `P`: write one register.
    fn write_reg(&mut self, reg: usize, value: &[u8]) {
        let reg_size = self.cpu.register_size();
        let little_endian = self.cpu.is_little_endian();

        let val = match hex::hex_to_reg(value, reg_size, little_endian) {
            Some(val) => val,
            None => {
                warn!("failed to recognize RSP write register command: {}", self.pkt);
                self.put_str_pkt("E01");
                return;
            }
        };

        if self.cpu.write_register(reg, val) != reg_size {
            warn!("size != {} when writing reg {}", reg_size, reg);
        }
        self.put_str_pkt("OK");
    }

    /// `m`: read memory, two hex digits per byte, lowest address first.
    fn read_mem(&mut self, addr: Addr, mut len: usize) {
        // Two digits per byte must fit the reply buffer.
        if len >= MAX_PACKET / 2 {
            warn!("memory read at {:#x} too large for RSP packet: truncated", addr);
            len = (MAX_PACKET - 1) / 2;
        }

        let mut buf = vec![0u8; len];
        let read = self.cpu.read(addr, &mut buf);
        if read < len {
            warn!(
                "only read {} of {} bytes of memory at {:#x}",
                read, len, addr
            );
        }

        let mut body = String::with_capacity(read * 2);
        for b in &buf[..read] {
            body.push_str(&format!("{:02x}", b));
        }
        self.pkt.pack_str(&body);
        self.put_pkt();
    }

    /// `M`: write memory supplied as hex digits.
    fn write_mem(&mut self, addr: Addr, len: usize, data: &[u8]) {
        if data.len() != len.saturating_mul(2) {
            warn!(
                "write of {} digits requested, but {} digits supplied: packet ignored",
                len.saturating_mul(2),
                data.len()
            );
            self.put_str_pkt("E01");
            return;
        }

        let bytes = match hex::hex_to_ascii(data) {
            Some(bytes) => bytes,
            None => {
                warn!("failed to recognize RSP write memory: {}", self.pkt);
                self.put_str_pkt("E01");
                return;
            }
        };

        if self.cpu.write(addr, &bytes) != len {
            warn!("failed to write {} bytes to {:#x}", len, addr);
        }
        self.put_str_pkt("OK");
    }

    /// `X`: write memory supplied as (already unescaped) raw binary.
    fn write_mem_bin(&mut self, addr: Addr, len: usize, data: &[u8]) {
        let mut data = data;
        if data.len() != len {
            let min_len = len.min(data.len());
            warn!(
                "write of {} bytes requested, but {} bytes supplied. {} will be written",
                len,
                data.len(),
                min_len
            );
            data = &data[..min_len];
        }

        if self.cpu.write(addr, data) != data.len() {
            warn!("failed to write {} bytes to {:#x}", data.len(), addr);
        }
        self.put_str_pkt("OK");
    }

    /// `Hg`: select the current thread (and with it, the current cpu).
    fn set_thread(&mut self, blob: &[u8]) {
        let crystalized = self
            .ptid
            .decode(blob)
            .and_then(|ptid| ptid.crystalize(PID_DEFAULT, TID_DEFAULT));

        match crystalized {
            Some(ptid) => {
                let pid = ptid.pid();
                if pid < 1 || pid > self.core_manager.cpu_count() as i64 {
                    self.put_str_pkt("E01");
                    return;
                }
                self.ptid = ptid;
                self.cpu.set_current_cpu(CoreManager::pid_to_core(pid as u32));
                self.put_str_pkt("OK");
            }
            None => self.put_str_pkt("E01"),
        }
    }

    /// Dispatch a `q` query.
    fn query(&mut self, query: Query) {
        match query {
            Query::CurrentThread => match self.ptid.encode() {
                Some(encoded) => self.put_str_pkt(&format!("QC{}", encoded)),
                None => self.put_str_pkt("E01"),
            },
            Query::ThreadInfoFirst => {
                // One thread per process, one process per core; enumeration
                // restarts from the first core.
                self.next_process = 1;
                self.write_next_thread_info();
            }
            Query::ThreadInfoNext => self.write_next_thread_info(),
            Query::LegacyThreadInfo => {
                warn!("RSP qL deprecated: no info returned");
                self.put_str_pkt("qM001");
            }
            Query::Rcmd(payload) => match hex::hex_to_ascii(&payload) {
                Some(cmd) => {
                    let cmd = String::from_utf8_lossy(&cmd).into_owned();
                    self.monitor_command(&cmd);
                }
                None => self.put_str_pkt("E01"),
            },
            Query::Supported(features) => self.query_supported(&features),
            Query::Symbol => {
                // Decline symbol lookup.
                self.put_str_pkt("OK");
            }
            Query::ThreadExtraInfo => {
                let body = hex::ascii_to_hex(b"Runnable\0");
                self.put_str_pkt(&body);
            }
            Query::TargetXml { offset, length } => self.xfer_features_read(offset, length),
            Query::Unknown => self.put_str_pkt(""),
        }
    }

    /// `qSupported`: advertise our features, mirroring some client ones.
    fn query_supported(&mut self, features: &[String]) {
        // Offering multiprocess or XML descriptions to a client that did
        // not ask for them causes some truly weird behavior.
        self.have_multiproc = false;
        let mut multiproc = "";
        let mut xml_regs = "";

        for feature in features {
            if feature.starts_with("multiprocess+") {
                self.have_multiproc = true;
                multiproc = ";multiprocess+";
            } else if feature.starts_with("xmlRegisters=")
                || feature.starts_with("qXfer:features:read")
            {
                if self.cpu.supports_target_xml() {
                    xml_regs = ";qXfer:features:read+";
                }
            }
        }

        let body = format!(
            "PacketSize={:x};QNonStop+;VContSupported+;QStartNoAckMode+{}{}",
            MAX_PACKET, multiproc, xml_regs
        );
        self.put_str_pkt(&body);
    }

    /// Serve one window of the target description document.
    fn xfer_features_read(&mut self, offset: usize, length: usize) {
        let Some(xml) = self.cpu.get_target_xml("target.xml") else {
            self.put_str_pkt("E00");
            return;
        };

        let doc = xml.as_bytes();
        let start = offset.min(doc.len());
        let end = start.saturating_add(length).min(doc.len());

        let mut body = Vec::with_capacity(end - start + 1);
        body.push(if end < doc.len() { b'm' } else { b'l' });
        body.extend_from_slice(&doc[start..end]);

        self.pkt.clear();
        self.pkt.append(&body);
        self.put_pkt();
    }

    /// Emit the next `qfThreadInfo`/`qsThreadInfo` reply.
    fn write_next_thread_info(&mut self) {
        // Skip cores that have exited, but only when exited cores are
        // being reported as killed.
        let count = self.core_manager.cpu_count();
        let core = loop {
            let core = CoreManager::pid_to_core(self.next_process);
            self.next_process += 1;
            if core >= count
                || !(self.kill_core_on_exit && !self.core_manager.is_core_live(core))
            {
                break core;
            }
        };

        if core < count {
            let ptid = Ptid::new(CoreManager::core_to_pid(core) as i64, TID_DEFAULT);
            match ptid.encode() {
                Some(encoded) => self.put_str_pkt(&format!("m{}", encoded)),
                None => self.put_str_pkt("E01"),
            }
        } else {
            // All done.
            self.put_str_pkt("l");
        }
    }

    /// Dispatch a `Q` set request.
    fn set(&mut self, set: SetRequest) {
        match set {
            SetRequest::NonStop(enabled) => {
                self.stop_mode = if enabled {
                    StopMode::NonStop
                } else {
                    StopMode::AllStop
                };
                info!("stop mode now {:?}", self.stop_mode);
                self.put_str_pkt("OK");
            }
            SetRequest::NonStopInvalid => self.put_str_pkt("E01"),
            SetRequest::StartNoAck => {
                // Switch framing first: the client acks our OK, but we no
                // longer wait for it.
                self.rsp.set_no_ack_mode(true);
                self.put_str_pkt("OK");
            }
            SetRequest::Unknown => self.put_str_pkt(""),
        }
    }

    /// Dispatch a `v` packet.
    fn v_packet(&mut self, request: VRequest) {
        match request {
            VRequest::ContQuery => {
                // Claiming 'c'/'C' is what makes GDB use vCont at all.
                self.put_str_pkt("vCont;c;C;s;S");
            }
            VRequest::Cont(actions) => self.vcont(actions),
            VRequest::ContInvalid => self.put_str_pkt("E01"),
            VRequest::Kill(pid) => self.vkill(&pid),
            VRequest::Unknown => self.put_str_pkt(""),
        }
    }

    /// `vCont`: resolve per-core actions and hand over to the execution
    /// coordinator. This is the only path that resumes a core.
    fn vcont(&mut self, actions: VContActions) {
        let count = self.core_manager.cpu_count();
        let mut core_actions = Vec::with_capacity(count);

        for core in 0..count {
            let action = actions.core_action(CoreManager::core_to_pid(core));
            let mut resume_type = match action {
                None => ResumeType::None,
                Some(b'c') | Some(b'C') => ResumeType::Continue,
                Some(b's') | Some(b'S') => ResumeType::Step,
                Some(_) => {
                    self.put_str_pkt("E01");
                    return;
                }
            };

            // A core that has exited can no longer run.
            if resume_type != ResumeType::None && !self.core_manager[core].is_live() {
                warn!(
                    "core {} already exited, ignoring request to: {}",
                    core, resume_type
                );
                resume_type = ResumeType::None;
            }

            self.core_manager[core].set_resume_type(resume_type);
            core_actions.push(resume_type);
        }

        if core_actions.len() != count {
            fatal_error(&format!(
                "mismatch between action and core count ({} vs {})",
                core_actions.len(),
                count
            ));
        }

        if !self.cpu.prepare(&core_actions) {
            warn!("target failed to prepare resume actions");
        }
        self.do_core_actions();
    }

    /// `vKill`: kill one core by pid.
    fn vkill(&mut self, pid: &[u8]) {
        if !hex::is_hex(pid) {
            self.put_str_pkt("E01");
            return;
        }
        let pid = match hex::hex_to_val(pid) {
            Some(pid) if pid >= 1 && pid <= u32::MAX as u64 => pid as u32,
            _ => {
                self.put_str_pkt("E01");
                return;
            }
        };

        if !self.core_manager.kill(CoreManager::pid_to_core(pid)) {
            self.put_str_pkt("E01");
            return;
        }

        self.put_str_pkt("OK");

        if self.core_manager.live_core_count() == 0 {
            self.rsp.close();
            if self.kill_behaviour == KillBehaviour::ExitOnKill {
                self.exit_server = true;
            }
        }
    }

    /// `Z`: insert a matchpoint.
    ///
    /// Software breakpoints are implemented here by saving the displaced
    /// instruction and writing a break instruction over it; everything else
    /// is delegated to the target's hardware support.
    fn insert_matchpoint(&mut self, req: MatchpointRequest) {
        if req.len > core::mem::size_of::<u64>() {
            warn!(
                "RSP set breakpoint instruction length {} exceeds maximum of {}",
                req.len,
                core::mem::size_of::<u64>()
            );
            self.put_str_pkt("E01");
            return;
        }

        match req.kind {
            MatchType::BreakSw => {
                let mut saved = [0u8; 8];
                if self.cpu.read(req.addr, &mut saved[..req.len]) != req.len {
                    warn!("failed to read memory when inserting breakpoint");
                }
                let saved = u64::from_le_bytes(saved);
                self.matchpoints.insert(req.kind, req.addr, saved);

                if self.flags.trace_break() {
                    info!(
                        "inserting a breakpoint over the instruction ({:#x}) at {:#x}",
                        saved, req.addr
                    );
                }

                let instr = if self.cpu.is_little_endian() {
                    BREAK_INSTR.to_le_bytes()
                } else {
                    BREAK_INSTR.to_be_bytes()
                };
                if self.cpu.write(req.addr, &instr) != BREAK_INSTR_LEN {
                    warn!("failed to write BREAK instruction");
                }

                if self.flags.trace_rsp() {
                    info!(
                        "software (memory) breakpoint inserted at {:#x}",
                        req.addr
                    );
                }
                self.put_str_pkt("OK");
            }

            kind => {
                // Hardware matchpoints carry no displaced instruction.
                self.matchpoints.insert(kind, req.addr, 0);

                if self.cpu.insert_matchpoint(req.addr, kind) {
                    if self.flags.trace_rsp() {
                        info!("{} set at {:#x}", kind, req.addr);
                    }
                    self.put_str_pkt("OK");
                } else {
                    warn!("failed to set {} at {:#x}", kind, req.addr);
                    self.put_str_pkt("E01");
                }
            }
        }
    }

    /// `z`: remove a matchpoint, restoring the displaced instruction for
    /// software breakpoints.
    fn remove_matchpoint(&mut self, req: MatchpointRequest) {
        if req.len > core::mem::size_of::<u64>() {
            warn!(
                "RSP remove breakpoint instruction length {} exceeds maximum of {}",
                req.len,
                core::mem::size_of::<u64>()
            );
            self.put_str_pkt("E01");
            return;
        }

        match req.kind {
            MatchType::BreakSw => {
                let Some(saved) = self.matchpoints.remove(req.kind, req.addr) else {
                    warn!(
                        "failed to remove software (memory) breakpoint from {:#x}",
                        req.addr
                    );
                    self.put_str_pkt("E01");
                    return;
                };

                if self.flags.trace_break() {
                    info!(
                        "putting back the instruction ({:#x}) at {:#x}",
                        saved, req.addr
                    );
                }

                // The saved bytes go back in the order they were read.
                let bytes = saved.to_le_bytes();
                if self.cpu.write(req.addr, &bytes[..req.len]) != req.len {
                    warn!("failed to write memory removing breakpoint");
                }

                if self.flags.trace_rsp() {
                    info!(
                        "software (memory) breakpoint removed from {:#x}",
                        req.addr
                    );
                }
                self.put_str_pkt("OK");
            }

            kind => {
                if self.matchpoints.remove(kind, req.addr).is_none() {
                    warn!("failed to remove {} from {:#x}", kind, req.addr);
                    self.put_str_pkt("E01");
                    return;
                }

                if self.cpu.remove_matchpoint(req.addr, kind) {
                    if self.flags.trace_rsp() {
                        info!("{} removed from {:#x}", kind, req.addr);
                    }
                    self.put_str_pkt("OK");
                } else {
                    warn!("failed to remove {} from {:#x}", kind, req.addr);
                    self.put_str_pkt("E01");
                }
            }
        }
    }
}

/// Wire a target and transport into a server and run it.
///
/// This is the library entry point the driver calls once the target library
/// is loaded and flags are parsed. Stream mode announces `READY` on stdout
/// so harnesses know the server is listening.
pub fn init(
    target: &mut dyn Target,
    flags: Rc<TraceFlags>,
    use_stdio: bool,
    port: u16,
    write_port: bool,
) -> Result<(), ServerError> {
    if use_stdio {
        let conn = StdioConnection::new(flags.clone());
        let mut server = GdbServer::new(conn, target, flags, KillBehaviour::ExitOnKill);
        println!("\nREADY");
        let _ = std::io::stdout().flush();
        server.serve()
    } else {
        let conn = TcpConnection::new(port, write_port, flags.clone());
        let mut server = GdbServer::new(conn, target, flags, KillBehaviour::ResetOnKill);
        server.serve()
    }
}
