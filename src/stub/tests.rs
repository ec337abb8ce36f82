//! End-to-end server tests, driven packet-by-packet over a scripted
//! connection against a scriptable stub target.

use std::rc::Rc;

use crate::conn::test_conn::ScriptedConnection;
use crate::protocol::hex;
use crate::stub::{GdbServer, KillBehaviour, ServerError};
use crate::target::test_stub::StubTarget;
use crate::target::{ResumeRes, ResumeType};
use crate::trace::TraceFlags;

fn flags() -> Rc<TraceFlags> {
    Rc::new(TraceFlags::new())
}

/// Frame a packet body with its checksum.
fn frame(body: &[u8]) -> Vec<u8> {
    let checksum = body.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    let mut out = vec![b'$'];
    out.extend_from_slice(body);
    out.extend_from_slice(format!("#{:02x}", checksum).as_bytes());
    out
}

/// The reply bytes expected for `body` in no-ack mode.
fn reply(body: &[u8]) -> Vec<u8> {
    frame(body)
}

/// Frame a `qRcmd` monitor command.
fn rcmd(cmd: &str) -> Vec<u8> {
    let mut body = b"qRcmd,".to_vec();
    body.extend_from_slice(hex::ascii_to_hex(cmd.as_bytes()).as_bytes());
    frame(&body)
}

fn server<'a>(
    cpu: &'a mut StubTarget,
    input: &[u8],
) -> GdbServer<'a, ScriptedConnection> {
    GdbServer::new(
        ScriptedConnection::new(input),
        cpu,
        flags(),
        KillBehaviour::ResetOnKill,
    )
}

/// Same, with acks already disabled: scripts don't need `+` bytes.
fn server_no_ack<'a>(
    cpu: &'a mut StubTarget,
    input: &[u8],
) -> GdbServer<'a, ScriptedConnection> {
    let mut server = server(cpu, input);
    server.rsp.set_no_ack_mode(true);
    server
}

// --- the literal wire scenarios ---

#[test]
fn handshake_with_no_ack() {
    let mut cpu = StubTarget::new(1);
    let mut server = server(&mut cpu, b"$!#21+$QStartNoAckMode#b0");

    server.client_request();
    server.client_request();
    assert_eq!(server.rsp.inner().sent(), b"+$OK#9a+$OK#9a");

    // No further acks in either direction.
    server.rsp.inner_mut().feed(b"$!#21");
    server.client_request();
    assert_eq!(server.rsp.inner().sent(), b"+$OK#9a+$OK#9a$OK#9a");
}

#[test]
fn register_read() {
    let mut cpu = StubTarget::new(1);
    cpu.regs[0][0] = 0xbeef;
    let mut server = server(&mut cpu, b"$p0#a0+");

    server.client_request();
    assert_eq!(server.rsp.inner().sent(), b"+$efbe0000#52");
}

#[test]
fn memory_read() {
    let mut cpu = StubTarget::new(1);
    cpu.poke(0x124, &[0xbe, 0xef]);
    let mut server = server(&mut cpu, b"$m124,2#62+");

    server.client_request();
    assert_eq!(server.rsp.inner().sent(), b"+$beef#92");
}

#[test]
fn memory_binary_write() {
    let mut cpu = StubTarget::new(1);
    let mut server = server(&mut cpu, b"$X88,4:\x11\x22\x33\x44#0c+");

    server.client_request();
    assert_eq!(server.rsp.inner().sent(), b"+$OK#9a");

    let mut buf = [0u8; 4];
    assert_eq!(server.cpu.read(0x88, &mut buf), 4);
    assert_eq!(buf, [0x11, 0x22, 0x33, 0x44]);
}

#[test]
fn vcont_step_reports_sigtrap() {
    let mut cpu = StubTarget::new(1);
    cpu.script_stop(0, ResumeRes::Stepped);
    let mut server = server(&mut cpu, b"$vCont;s#b8+");

    server.client_request();
    assert_eq!(server.rsp.inner().sent(), b"+$S05#b8");

    assert_eq!(cpu.prepared, vec![vec![ResumeType::Step]]);
    assert_eq!(cpu.resume_calls, 1);
}

#[test]
fn host_syscall_open() {
    let mut cpu = StubTarget::new(1);
    cpu.regs[0][17] = 1024; // open
    cpu.regs[0][10] = 0xbeef;
    cpu.regs[0][11] = 0;
    cpu.regs[0][12] = 0;
    cpu.poke(0xbeef, b"neat\0");
    cpu.script_stop(0, ResumeRes::Syscall);
    // After the reply the target runs on until interrupted.
    cpu.script_stop(0, ResumeRes::Interrupted);

    let mut server = server(&mut cpu, b"$vCont;c#a8+$F0#76+");

    server.client_request();
    server.client_request();
    assert_eq!(
        server.rsp.inner().sent(),
        b"+$Fopen,beef/5,0,0#d2+$S02#b5".as_slice()
    );

    // Return value written to a0, and execution was resumed again.
    assert_eq!(cpu.regs[0][10], 0);
    assert_eq!(cpu.resume_calls, 2);
}

// --- dispatch and session behavior ---

#[test]
fn extended_mode_and_thread_alive() {
    let mut cpu = StubTarget::new(1);
    let mut input = frame(b"!");
    input.extend(frame(b"Tp1.1"));
    let mut server = server_no_ack(&mut cpu, &input);

    server.client_request();
    server.client_request();

    let mut expect = reply(b"OK");
    expect.extend(reply(b"OK"));
    assert_eq!(server.rsp.inner().sent(), expect);
}

#[test]
fn detach_closes_connection() {
    let mut cpu = StubTarget::new(1);
    let mut server = server_no_ack(&mut cpu, &frame(b"D"));

    server.client_request();
    assert_eq!(server.rsp.inner().sent(), reply(b"OK"));
    assert!(!server.rsp.is_connected());
}

#[test]
fn unsupported_packet_gets_empty_reply() {
    let mut cpu = StubTarget::new(1);
    let mut server = server_no_ack(&mut cpu, &frame(b"~odd"));

    server.client_request();
    assert_eq!(server.rsp.inner().sent(), reply(b""));
}

#[test]
fn qsupported_negotiates_multiprocess() {
    let mut cpu = StubTarget::new(1);
    let mut input = frame(b"qSupported:multiprocess+;swbreak+");
    input.extend(frame(b"?"));
    let mut server = server_no_ack(&mut cpu, &input);

    server.client_request();
    server.client_request();

    let mut expect = reply(
        b"PacketSize=2710;QNonStop+;VContSupported+;QStartNoAckMode+;multiprocess+",
    );
    // With multiprocess negotiated, stop replies carry the thread.
    expect.extend(reply(b"T02thread:p1.1;"));
    assert_eq!(server.rsp.inner().sent(), expect);
}

#[test]
fn qsupported_offers_xml_only_when_target_has_it() {
    let mut cpu = StubTarget::new(1);
    cpu.xml = Some("<target version=\"1.0\"/>".to_owned());
    let mut server = server_no_ack(&mut cpu, &frame(b"qSupported:xmlRegisters=riscv"));

    server.client_request();
    assert_eq!(
        server.rsp.inner().sent(),
        reply(b"PacketSize=2710;QNonStop+;VContSupported+;QStartNoAckMode+;qXfer:features:read+")
    );
}

#[test]
fn current_thread_query() {
    let mut cpu = StubTarget::new(1);
    let mut server = server_no_ack(&mut cpu, &frame(b"qC"));

    server.client_request();
    assert_eq!(server.rsp.inner().sent(), reply(b"QCp1.1"));
}

#[test]
fn thread_info_enumeration() {
    let mut cpu = StubTarget::new(2);
    let mut input = frame(b"qfThreadInfo");
    input.extend(frame(b"qsThreadInfo"));
    input.extend(frame(b"qsThreadInfo"));
    let mut server = server_no_ack(&mut cpu, &input);

    server.client_request();
    server.client_request();
    server.client_request();

    let mut expect = reply(b"mp1.1");
    expect.extend(reply(b"mp2.1"));
    expect.extend(reply(b"l"));
    assert_eq!(server.rsp.inner().sent(), expect);
}

#[test]
fn thread_extra_info_is_runnable() {
    let mut cpu = StubTarget::new(1);
    let mut server = server_no_ack(&mut cpu, &frame(b"qThreadExtraInfo,p1.1"));

    server.client_request();
    // "Runnable" plus its terminator, hex encoded.
    assert_eq!(
        server.rsp.inner().sent(),
        reply(b"52756e6e61626c6500")
    );
}

#[test]
fn set_thread_selects_core() {
    let mut cpu = StubTarget::new(2);
    let mut input = frame(b"Hgp2.1");
    input.extend(frame(b"Hgp7.1"));
    let mut server = server_no_ack(&mut cpu, &input);

    server.client_request();
    assert_eq!(server.cpu.current_cpu(), 1);

    // Out of range pid.
    server.client_request();
    let mut expect = reply(b"OK");
    expect.extend(reply(b"E01"));
    assert_eq!(server.rsp.inner().sent(), expect);
}

#[test]
fn register_write() {
    let mut cpu = StubTarget::new(1);
    let mut server = server_no_ack(&mut cpu, &frame(b"P2=efbe0000"));

    server.client_request();
    assert_eq!(server.rsp.inner().sent(), reply(b"OK"));
    assert_eq!(cpu.regs[0][2], 0xbeef);
}

#[test]
fn write_mem_length_mismatch_rejected() {
    let mut cpu = StubTarget::new(1);
    let mut server = server_no_ack(&mut cpu, &frame(b"M88,4:beef"));

    server.client_request();
    assert_eq!(server.rsp.inner().sent(), reply(b"E01"));
}

#[test]
fn write_then_read_memory() {
    let mut cpu = StubTarget::new(1);
    let mut input = frame(b"M88,2:beef");
    input.extend(frame(b"m88,2"));
    let mut server = server_no_ack(&mut cpu, &input);

    server.client_request();
    server.client_request();

    let mut expect = reply(b"OK");
    expect.extend(reply(b"beef"));
    assert_eq!(server.rsp.inner().sent(), expect);
}

// --- matchpoints ---

#[test]
fn software_breakpoint_roundtrip() {
    let mut cpu = StubTarget::new(1);
    cpu.poke(0x1234, &[0xaa, 0xbb, 0xcc, 0xdd]);

    let mut input = frame(b"Z0,1234,4");
    input.extend(frame(b"z0,1234,4"));
    let mut server = server_no_ack(&mut cpu, &input);

    server.client_request();
    // The break instruction has been written over the original code.
    let mut buf = [0u8; 4];
    server.cpu.read(0x1234, &mut buf);
    assert_eq!(buf, 0x0010_0073u32.to_le_bytes());

    server.client_request();
    // Removal restores the original bytes exactly.
    server.cpu.read(0x1234, &mut buf);
    assert_eq!(buf, [0xaa, 0xbb, 0xcc, 0xdd]);

    let mut expect = reply(b"OK");
    expect.extend(reply(b"OK"));
    assert_eq!(server.rsp.inner().sent(), expect);
}

#[test]
fn hardware_watchpoint_forwarded_to_target() {
    let mut cpu = StubTarget::new(1);
    let mut input = frame(b"Z2,80,8");
    input.extend(frame(b"z2,80,8"));
    let mut server = server_no_ack(&mut cpu, &input);

    server.client_request();
    server.client_request();

    // Remove only succeeds against the target if insert reached it first.
    let mut expect = reply(b"OK");
    expect.extend(reply(b"OK"));
    assert_eq!(server.rsp.inner().sent(), expect);
    assert!(cpu.hw_matchpoints.is_empty());
}

#[test]
fn remove_absent_matchpoint_is_error() {
    let mut cpu = StubTarget::new(1);
    let mut server = server_no_ack(&mut cpu, &frame(b"z0,999,4"));

    server.client_request();
    assert_eq!(server.rsp.inner().sent(), reply(b"E01"));
}

// --- execution control ---

#[test]
fn stop_event_priority_prefers_syscall() {
    let mut cpu = StubTarget::new(2);
    cpu.regs[1][17] = 57; // close
    cpu.regs[1][10] = 3;
    // Both cores stop at once; the syscalling one must be serviced first.
    cpu.wait_script.push_back((
        crate::target::WaitRes::EventOccurred,
        vec![ResumeRes::Interrupted, ResumeRes::Syscall],
    ));
    let mut server = server_no_ack(&mut cpu, &frame(b"vCont;c"));

    server.client_request();
    assert_eq!(server.rsp.inner().sent(), reply(b"Fclose,3"));
    assert_eq!(server.cpu.current_cpu(), 1);
}

#[test]
fn vcont_downgrades_dead_core() {
    let mut cpu = StubTarget::new(2);
    cpu.script_stop(0, ResumeRes::Stepped);

    let mut input = frame(b"vKill;2");
    input.extend(frame(b"vCont;s"));
    let mut server = server_no_ack(&mut cpu, &input);

    server.client_request();
    server.client_request();

    assert_eq!(
        cpu.prepared,
        vec![vec![ResumeType::Step, ResumeType::None]]
    );
}

#[test]
fn vkill_last_core_closes_and_exits() {
    let mut cpu = StubTarget::new(1);
    let mut server = GdbServer::new(
        ScriptedConnection::new(&frame(b"vKill;1")),
        &mut cpu,
        flags(),
        KillBehaviour::ExitOnKill,
    );
    server.rsp.set_no_ack_mode(true);

    server.client_request();
    assert_eq!(server.rsp.inner().sent(), reply(b"OK"));
    assert!(!server.rsp.is_connected());
    assert!(server.exit_server);
}

#[test]
fn vkill_bad_pid_is_error() {
    let mut cpu = StubTarget::new(1);
    let mut input = frame(b"vKill;0");
    input.extend(frame(b"vKill;zz"));
    let mut server = server_no_ack(&mut cpu, &input);

    server.client_request();
    server.client_request();

    let mut expect = reply(b"E01");
    expect.extend(reply(b"E01"));
    assert_eq!(server.rsp.inner().sent(), expect);
}

#[test]
fn break_preempts_resume() {
    let mut cpu = StubTarget::new(1);
    let mut input = frame(b"vCont;c");
    input.push(0x03); // break already waiting when vCont arrives
    let mut server = server_no_ack(&mut cpu, &input);

    server.client_request();
    assert_eq!(server.rsp.inner().sent(), reply(b"S02"));
    assert_eq!(cpu.resume_calls, 0);
    assert_eq!(cpu.halt_calls, 1);
}

#[test]
fn cycle_timeout_reports_sigxcpu() {
    let mut cpu = StubTarget::new(1);
    let mut input = rcmd("cycle-timeout 1");
    input.extend(frame(b"vCont;c"));
    let mut server = server_no_ack(&mut cpu, &input);

    server.client_request();
    server.client_request();

    // O-packet free commands: cycle-timeout just replies OK; the stalled
    // continue then halts with SIGXCPU once the cycle budget is burned.
    let mut expect = reply(b"OK");
    expect.extend(reply(b"S18"));
    assert_eq!(server.rsp.inner().sent(), expect);
    assert_eq!(cpu.halt_calls, 1);
}

#[test]
fn syscall_exit_reports_w_packet() {
    let mut cpu = StubTarget::new(1);
    cpu.regs[0][17] = 93; // exit
    cpu.regs[0][10] = 2;
    cpu.script_stop(0, ResumeRes::Syscall);
    let mut server = server_no_ack(&mut cpu, &frame(b"vCont;c"));

    server.client_request();
    assert_eq!(server.rsp.inner().sent(), reply(b"W2"));
    // By default the core lives on, looking like a fresh inferior.
    assert!(server.core_manager.is_core_live(0));
    assert_eq!(cpu.halt_calls, 1);
}

#[test]
fn syscall_exit_kills_core_when_configured() {
    let mut cpu = StubTarget::new(1);
    cpu.regs[0][17] = 93;
    cpu.regs[0][10] = 0;
    cpu.script_stop(0, ResumeRes::Syscall);
    let mut server = server_no_ack(&mut cpu, &frame(b"vCont;c"));
    server.kill_core_on_exit = true;

    server.client_request();
    assert_eq!(server.rsp.inner().sent(), reply(b"W0"));
    assert!(!server.core_manager.is_core_live(0));
}

// --- target description ---

#[test]
fn target_xml_served_in_windows() {
    let mut cpu = StubTarget::new(1);
    cpu.xml = Some("<target/>".to_owned());

    let mut input = frame(b"qXfer:features:read:target.xml:0,4");
    input.extend(frame(b"qXfer:features:read:target.xml:4,100"));
    let mut server = server_no_ack(&mut cpu, &input);

    server.client_request();
    server.client_request();

    let mut expect = reply(b"m<tar");
    expect.extend(reply(b"lget/>"));
    assert_eq!(server.rsp.inner().sent(), expect);
}

#[test]
fn missing_target_xml_is_e00() {
    let mut cpu = StubTarget::new(1);
    let mut server = server_no_ack(&mut cpu, &frame(b"qXfer:features:read:target.xml:0,4"));

    server.client_request();
    assert_eq!(server.rsp.inner().sent(), reply(b"E00"));
}

// --- monitor commands ---

#[test]
fn monitor_echo_acknowledges() {
    let mut cpu = StubTarget::new(1);
    let mut server = server_no_ack(&mut cpu, &rcmd("echo hello"));

    server.client_request();
    assert_eq!(server.rsp.inner().sent(), reply(b"OK"));
}

#[test]
fn monitor_set_and_show_debug() {
    let mut cpu = StubTarget::new(1);
    let mut input = rcmd("set debug exec on");
    input.extend(rcmd("show debug exec"));
    let mut server = server_no_ack(&mut cpu, &input);

    server.client_request();
    assert!(server.flags.trace_exec());

    server.client_request();
    let sent = server.rsp.inner().sent().to_vec();
    // An O-prefixed hex payload, then OK.
    let shown = reply(b"OK")
        .into_iter()
        .chain({
            let mut pkt = crate::protocol::Packet::new();
            pkt.pack_rcmd_str("exec: ON (associated val = \"\")\n", true);
            frame(pkt.as_bytes())
        })
        .chain(reply(b"OK"))
        .collect::<Vec<u8>>();
    assert_eq!(sent, shown);
}

#[test]
fn monitor_unknown_flag_is_error() {
    let mut cpu = StubTarget::new(1);
    let mut server = server_no_ack(&mut cpu, &rcmd("set debug bogus on"));

    server.client_request();
    assert_eq!(server.rsp.inner().sent(), reply(b"E01"));
}

#[test]
fn monitor_kill_core_on_exit_toggle() {
    let mut cpu = StubTarget::new(1);
    let mut input = rcmd("set kill-core-on-exit on");
    input.extend(rcmd("show kill-core-on-exit"));
    let mut server = server_no_ack(&mut cpu, &input);

    server.client_request();
    assert!(server.kill_core_on_exit);

    server.client_request();
    let mut expect = reply(b"OK");
    let mut pkt = crate::protocol::Packet::new();
    pkt.pack_rcmd_str("kill-core-on-exit: ON\n", true);
    expect.extend(frame(pkt.as_bytes()));
    expect.extend(reply(b"OK"));
    assert_eq!(server.rsp.inner().sent(), expect);
}

#[test]
fn monitor_reset_revives_cores() {
    let mut cpu = StubTarget::new(2);
    let mut input = frame(b"vKill;2");
    input.extend(rcmd("reset"));
    let mut server = server_no_ack(&mut cpu, &input);

    server.client_request();
    assert!(!server.core_manager.is_core_live(1));

    server.client_request();
    assert!(server.core_manager.is_core_live(1));
    assert_eq!(cpu.reset_calls, 1);
}

#[test]
fn monitor_fallthrough_to_target() {
    let mut cpu = StubTarget::new(1);
    let mut input = rcmd("stub-ping");
    input.extend(rcmd("no-such-command"));
    let mut server = server_no_ack(&mut cpu, &input);

    server.client_request();
    server.client_request();

    let mut expect = Vec::new();
    let mut pkt = crate::protocol::Packet::new();
    pkt.pack_rcmd_str("pong\n", true);
    expect.extend(frame(pkt.as_bytes()));
    expect.extend(reply(b"OK"));
    expect.extend(reply(b"E04"));
    assert_eq!(server.rsp.inner().sent(), expect);
}

#[test]
fn serve_exits_cleanly_on_monitor_exit() {
    let mut cpu = StubTarget::new(1);
    let mut server = server_no_ack(&mut cpu, &rcmd("exit"));

    assert!(server.serve().is_ok());
    assert!(server.exit_server);
    // "exit" sends no reply.
    assert_eq!(server.rsp.inner().sent(), b"");
}

#[test]
fn serve_fails_when_client_cannot_reconnect() {
    let mut cpu = StubTarget::new(1);
    // EOF mid-session closes the connection; the scripted transport can
    // never accept another client.
    let mut server = server_no_ack(&mut cpu, b"$p0");

    match server.serve() {
        Err(ServerError::ConnectFailed) => {}
        other => panic!("unexpected result: {:?}", other.err()),
    }
}
