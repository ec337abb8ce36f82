//! Parsing of request packets into a typed [`Command`].
//!
//! The first byte of a packet body selects the command; everything after it
//! is command-specific syntax. Parsing happens up front so the server's
//! dispatch is a single total `match`, and so malformed packets are
//! rejected in one place with a uniform error reply.

use crate::common::Addr;
use crate::protocol::hex;
use crate::protocol::packet::Packet;
use crate::protocol::vcont::VContActions;
use crate::target::MatchType;

/// A parsed request packet.
#[derive(Debug, Clone)]
pub enum Command {
    /// `!`: enable extended remote mode.
    ExtendedMode,
    /// `?`: report the last stop reason.
    LastSignal,
    /// `A`: argv initialisation (unsupported).
    Argv,
    /// `b`: deprecated baud-rate packet.
    BaudRate,
    /// `B`: deprecated breakpoint packet.
    LegacyBreakpoint,
    /// `c`/`C`/`s`/`S`: legacy resume packets, superseded by `vCont`.
    LegacyResume(u8),
    /// `d`: deprecated debug toggle.
    DisableDebug,
    /// `D`: detach from the target.
    Detach,
    /// `F...`: syscall reply (raw body, parsed by the syscall layer).
    SyscallReply(Vec<u8>),
    /// `g`: read all registers.
    ReadAllRegs,
    /// `G<hex>`: write all registers.
    WriteAllRegs(Vec<u8>),
    /// `Hc<ptid>`: deprecated thread-for-continue selection.
    SetThreadContinue,
    /// `Hg<ptid>`: select the current thread.
    SetThread(Vec<u8>),
    /// `H` with an unknown operation byte.
    SetThreadUnknown,
    /// `i`/`I`: single-cycle step (stubbed).
    CycleStep,
    /// `k`: legacy kill, superseded by `vKill`.
    Kill,
    /// `m<addr>,<len>`: read memory.
    ReadMem { addr: Addr, len: usize },
    /// `M<addr>,<len>:<hex>`: write memory (hex digits still encoded).
    WriteMem {
        addr: Addr,
        len: usize,
        data: Vec<u8>,
    },
    /// `p<reg>`: read one register.
    ReadReg(usize),
    /// `P<reg>=<hex>`: write one register.
    WriteReg { reg: usize, value: Vec<u8> },
    /// `q...`: query packets.
    Query(Query),
    /// `Q...`: set packets.
    Set(SetRequest),
    /// `r`: deprecated reset.
    Reset,
    /// `R`: restart (ignored).
    Restart,
    /// `t`: search (unsupported, no reply defined).
    Search,
    /// `T<ptid>`: thread-alive probe.
    ThreadAlive(Vec<u8>),
    /// `v...`: execution-control packets.
    V(VRequest),
    /// `X<addr>,<len>:<bin>`: binary memory write (payload unescaped).
    WriteMemBin {
        addr: Addr,
        len: usize,
        data: Vec<u8>,
    },
    /// `z<t>,<a>,<l>`: remove matchpoint.
    RemoveMatchpoint(MatchpointRequest),
    /// `Z<t>,<a>,<l>`: insert matchpoint.
    InsertMatchpoint(MatchpointRequest),
    /// A recognised packet with unparseable syntax; `code` is the error
    /// reply owed to the client.
    Malformed {
        what: &'static str,
        code: &'static str,
    },
    /// An unrecognised packet.
    Unsupported(Vec<u8>),
}

/// The `q` query family.
#[derive(Debug, Clone)]
pub enum Query {
    /// `qC`
    CurrentThread,
    /// `qfThreadInfo`
    ThreadInfoFirst,
    /// `qsThreadInfo`
    ThreadInfoNext,
    /// `qL...` (deprecated)
    LegacyThreadInfo,
    /// `qRcmd,<hex>`: the decoded payload bytes are still hex pairs.
    Rcmd(Vec<u8>),
    /// `qSupported[:feature;feature...]`
    Supported(Vec<String>),
    /// `qSymbol:...`
    Symbol,
    /// `qThreadExtraInfo,...`
    ThreadExtraInfo,
    /// `qXfer:features:read:target.xml:<offset>,<length>`
    TargetXml { offset: usize, length: usize },
    /// Any other query.
    Unknown,
}

/// The `Q` set family.
#[derive(Debug, Clone)]
pub enum SetRequest {
    /// `QNonStop:0|1`
    NonStop(bool),
    /// `QNonStop:` with a bad argument.
    NonStopInvalid,
    /// `QStartNoAckMode`
    StartNoAck,
    /// Any other set packet.
    Unknown,
}

/// The `v` execution-control family.
#[derive(Debug, Clone)]
pub enum VRequest {
    /// `vCont?`
    ContQuery,
    /// `vCont;<actions>`
    Cont(VContActions),
    /// `vCont` with an unparseable action list.
    ContInvalid,
    /// `vKill;<pid-hex>`
    Kill(Vec<u8>),
    /// Any other `v` packet.
    Unknown,
}

/// A parsed `Z`/`z` packet.
#[derive(Debug, Clone, Copy)]
pub struct MatchpointRequest {
    pub kind: MatchType,
    pub addr: Addr,
    pub len: usize,
}

impl Command {
    /// Parse a packet body. Bodies are never empty by the time they reach
    /// here (the framer only delivers `$...#cc` packets); an empty body is
    /// treated as unsupported.
    pub fn from_packet(pkt: &Packet) -> Command {
        let body = pkt.as_bytes();
        let Some((&first, rest)) = body.split_first() else {
            return Command::Unsupported(Vec::new());
        };

        match first {
            b'!' => Command::ExtendedMode,
            b'?' => Command::LastSignal,
            b'A' => Command::Argv,
            b'b' => Command::BaudRate,
            b'B' => Command::LegacyBreakpoint,
            b'c' | b'C' | b's' | b'S' => Command::LegacyResume(first),
            b'd' => Command::DisableDebug,
            b'D' => Command::Detach,
            b'F' => Command::SyscallReply(body.to_vec()),
            b'g' => Command::ReadAllRegs,
            b'G' => Command::WriteAllRegs(rest.to_vec()),
            b'H' => parse_set_thread(rest),
            b'i' | b'I' => Command::CycleStep,
            b'k' => Command::Kill,
            b'm' => parse_read_mem(rest),
            b'M' => parse_write_mem(rest),
            b'p' => parse_read_reg(rest),
            b'P' => parse_write_reg(rest),
            b'q' => Command::Query(parse_query(body)),
            b'Q' => Command::Set(parse_set(body)),
            b'r' => Command::Reset,
            b'R' => Command::Restart,
            b't' => Command::Search,
            b'T' => Command::ThreadAlive(rest.to_vec()),
            b'v' => Command::V(parse_v(body)),
            b'X' => parse_write_mem_bin(rest),
            b'z' => parse_matchpoint(rest, false),
            b'Z' => parse_matchpoint(rest, true),
            _ => Command::Unsupported(body.to_vec()),
        }
    }
}

fn parse_set_thread(rest: &[u8]) -> Command {
    match rest.split_first() {
        Some((b'c', _)) => Command::SetThreadContinue,
        Some((b'g', ptid)) => Command::SetThread(ptid.to_vec()),
        _ => Command::SetThreadUnknown,
    }
}

/// Split `<hex>,<hex>` into two values.
fn parse_addr_len(buf: &[u8]) -> Option<(Addr, usize)> {
    let comma = buf.iter().position(|b| *b == b',')?;
    let addr = hex::hex_to_val(&buf[..comma])?;
    let len = hex::hex_to_val(&buf[comma + 1..])?;
    Some((addr, len as usize))
}

fn parse_read_mem(rest: &[u8]) -> Command {
    match parse_addr_len(rest) {
        Some((addr, len)) => Command::ReadMem { addr, len },
        None => Command::Malformed {
            what: "read memory",
            code: "E01",
        },
    }
}

fn parse_write_mem(rest: &[u8]) -> Command {
    let malformed = Command::Malformed {
        what: "write memory",
        code: "E01",
    };
    let Some(colon) = rest.iter().position(|b| *b == b':') else {
        return malformed;
    };
    match parse_addr_len(&rest[..colon]) {
        Some((addr, len)) => Command::WriteMem {
            addr,
            len,
            data: rest[colon + 1..].to_vec(),
        },
        None => malformed,
    }
}

fn parse_read_reg(rest: &[u8]) -> Command {
    match hex::hex_to_val(rest) {
        Some(reg) => Command::ReadReg(reg as usize),
        None => Command::Malformed {
            what: "read register",
            code: "E01",
        },
    }
}

fn parse_write_reg(rest: &[u8]) -> Command {
    let malformed = Command::Malformed {
        what: "write register",
        code: "E01",
    };
    let Some(eq) = rest.iter().position(|b| *b == b'=') else {
        return malformed;
    };
    match hex::hex_to_val(&rest[..eq]) {
        Some(reg) => Command::WriteReg {
            reg: reg as usize,
            value: rest[eq + 1..].to_vec(),
        },
        None => malformed,
    }
}

fn parse_write_mem_bin(rest: &[u8]) -> Command {
    let malformed = Command::Malformed {
        what: "binary write memory",
        code: "E01",
    };
    let Some(colon) = rest.iter().position(|b| *b == b':') else {
        return malformed;
    };
    match parse_addr_len(&rest[..colon]) {
        Some((addr, len)) => {
            // The payload is raw binary with RSP escaping still applied.
            let mut data = rest[colon + 1..].to_vec();
            let unescaped = hex::rsp_unescape(&mut data);
            data.truncate(unescaped);
            Command::WriteMemBin { addr, len, data }
        }
        None => malformed,
    }
}

fn parse_matchpoint(rest: &[u8], insert: bool) -> Command {
    let malformed = Command::Malformed {
        what: if insert {
            "matchpoint insertion"
        } else {
            "matchpoint deletion"
        },
        code: "E01",
    };

    let mut fields = rest.split(|b| *b == b',');
    let (Some(kind), Some(addr), Some(len)) = (fields.next(), fields.next(), fields.next()) else {
        return malformed;
    };
    if fields.next().is_some() {
        return malformed;
    }

    let kind = match kind {
        b"0" => MatchType::BreakSw,
        b"1" => MatchType::BreakHw,
        b"2" => MatchType::WatchWrite,
        b"3" => MatchType::WatchRead,
        b"4" => MatchType::WatchAccess,
        _ => return malformed,
    };
    let (Some(addr), Some(len)) = (hex::hex_to_val(addr), hex::hex_to_val(len)) else {
        return malformed;
    };

    let req = MatchpointRequest {
        kind,
        addr,
        len: len as usize,
    };
    if insert {
        Command::InsertMatchpoint(req)
    } else {
        Command::RemoveMatchpoint(req)
    }
}

fn parse_query(body: &[u8]) -> Query {
    match body {
        b"qC" => return Query::CurrentThread,
        b"qfThreadInfo" => return Query::ThreadInfoFirst,
        b"qsThreadInfo" => return Query::ThreadInfoNext,
        _ => {}
    }

    if body.starts_with(b"qL") {
        Query::LegacyThreadInfo
    } else if let Some(hex) = body.strip_prefix(b"qRcmd,") {
        Query::Rcmd(hex.to_vec())
    } else if body.starts_with(b"qSupported") {
        let features = match body.strip_prefix(b"qSupported:") {
            Some(list) => String::from_utf8_lossy(list)
                .split(';')
                .filter(|t| !t.is_empty())
                .map(str::to_owned)
                .collect(),
            None => Vec::new(),
        };
        Query::Supported(features)
    } else if body.starts_with(b"qSymbol:") {
        Query::Symbol
    } else if body.starts_with(b"qThreadExtraInfo,") {
        Query::ThreadExtraInfo
    } else if let Some(window) = body.strip_prefix(b"qXfer:features:read:target.xml:") {
        match parse_addr_len(window) {
            Some((offset, length)) => Query::TargetXml {
                offset: offset as usize,
                length,
            },
            None => Query::Unknown,
        }
    } else {
        Query::Unknown
    }
}

fn parse_set(body: &[u8]) -> SetRequest {
    if let Some(arg) = body.strip_prefix(b"QNonStop:") {
        match arg {
            b"0" => SetRequest::NonStop(false),
            b"1" => SetRequest::NonStop(true),
            _ => SetRequest::NonStopInvalid,
        }
    } else if body == b"QStartNoAckMode" {
        SetRequest::StartNoAck
    } else {
        SetRequest::Unknown
    }
}

fn parse_v(body: &[u8]) -> VRequest {
    if body == b"vCont?" {
        VRequest::ContQuery
    } else if let Some(actions) = body.strip_prefix(b"vCont") {
        match VContActions::parse(actions) {
            Some(actions) => VRequest::Cont(actions),
            None => VRequest::ContInvalid,
        }
    } else if let Some(pid) = body.strip_prefix(b"vKill;") {
        VRequest::Kill(pid.to_vec())
    } else {
        VRequest::Unknown
    }
}
