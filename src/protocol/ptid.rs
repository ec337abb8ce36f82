//! Process/thread ID pairs, as used by GDB's multiprocess extension.
//!
//! The wire syntax is `<tid>`, `p<pid>`, or `p<pid>.<tid>`, where each
//! field is `0` (any), `-1` (all), or a positive hex number. An additional
//! internal sentinel marks decode failure and is never valid externally.

use core::fmt;

use log::warn;

use crate::protocol::hex;

/// "Any process/thread" wire value.
pub const PTID_ANY: i64 = 0;
/// "All processes/threads" wire value.
pub const PTID_ALL: i64 = -1;
/// Internal decode-failure sentinel. Never valid in a constructed [`Ptid`].
pub const PTID_INV: i64 = -2;

/// A (pid, tid) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ptid {
    pid: i64,
    tid: i64,
}

impl Ptid {
    pub fn new(pid: i64, tid: i64) -> Self {
        let ptid = Ptid { pid, tid };
        if !ptid.validate() {
            warn!("invalid PTID created: {}", ptid);
        }
        ptid
    }

    pub fn pid(&self) -> i64 {
        self.pid
    }

    pub fn tid(&self) -> i64 {
        self.tid
    }

    pub fn set_pid(&mut self, pid: i64) {
        self.pid = pid;
    }

    pub fn set_tid(&mut self, tid: i64) {
        self.tid = tid;
    }

    /// Sanity check: each field is positive or a known sentinel.
    fn validate(&self) -> bool {
        let field_ok = |v: i64| v > 0 || v == PTID_ANY || v == PTID_ALL || v == PTID_INV;
        field_ok(self.pid) && field_ok(self.tid)
    }

    /// Decode a PTID, using `self` for fields the syntax leaves implicit:
    /// a bare `<tid>` keeps the current pid; `p<pid>` sets tid to ALL.
    ///
    /// Returns `None` (leaving `self` untouched) on malformed input or the
    /// invalid combination of pid = ALL with tid ∈ {ALL, ANY}.
    pub fn decode(&self, buf: &[u8]) -> Option<Ptid> {
        let (pid, tid) = if !buf.starts_with(b"p") {
            let tid = decode_field(buf);
            if tid == PTID_INV {
                warn!("invalid TID, {}: ignored", String::from_utf8_lossy(buf));
                return None;
            }
            (self.pid, tid)
        } else {
            let rest = &buf[1..];
            match rest.iter().position(|b| *b == b'.') {
                None => {
                    let pid = decode_field(rest);
                    if pid == PTID_INV {
                        warn!("invalid PID, {}: ignored", String::from_utf8_lossy(buf));
                        return None;
                    }
                    (pid, PTID_ALL)
                }
                Some(dot) => {
                    let pid = decode_field(&rest[..dot]);
                    let tid = decode_field(&rest[dot + 1..]);
                    if pid == PTID_INV || tid == PTID_INV {
                        warn!("invalid PTID, {}: ignored", String::from_utf8_lossy(buf));
                        return None;
                    }
                    (pid, tid)
                }
            }
        };

        if pid == PTID_ALL && (tid == PTID_ALL || tid == PTID_ANY) {
            warn!("invalid PTID, {}: ignored", String::from_utf8_lossy(buf));
            return None;
        }

        Some(Ptid { pid, tid })
    }

    /// Encode as `p<pid>.<tid>`. Fails for fields below ALL (i.e. the
    /// internal invalid sentinel).
    pub fn encode(&self) -> Option<String> {
        let mut out = String::from("p");
        out.push_str(&encode_field(self.pid)?);
        out.push('.');
        out.push_str(&encode_field(self.tid)?);
        Some(out)
    }

    /// Resolve ANY fields against the given defaults, yielding a concrete
    /// pair. ALL and invalid fields cannot be crystalized.
    pub fn crystalize(&self, default_pid: i64, default_tid: i64) -> Option<Ptid> {
        if !self.validate() {
            warn!("attempt to crystalize invalid PTID: {}", self);
            return None;
        }

        let pid = match self.pid {
            PTID_INV | PTID_ALL => {
                warn!("can't crystalize PID: {}", self);
                return None;
            }
            PTID_ANY => default_pid,
            pid => pid,
        };

        let tid = match self.tid {
            PTID_INV | PTID_ALL => {
                warn!("can't crystalize TID: {}", self);
                return None;
            }
            PTID_ANY => default_tid,
            tid => tid,
        };

        Some(Ptid { pid, tid })
    }
}

/// Decode one field: `0` = ANY, `-1` = ALL, otherwise positive hex.
/// Returns [`PTID_INV`] on failure.
fn decode_field(buf: &[u8]) -> i64 {
    match buf {
        b"0" => PTID_ANY,
        b"-1" => PTID_ALL,
        _ => match hex::hex_to_val(buf) {
            Some(v) if v <= i64::MAX as u64 => v as i64,
            _ => PTID_INV,
        },
    }
}

/// Encode one field: ANY as `0`, ALL as `-1`, otherwise minimal lowercase
/// hex.
fn encode_field(field: i64) -> Option<String> {
    if field < PTID_ALL {
        return None;
    }
    Some(match field {
        PTID_ALL => "-1".to_owned(),
        PTID_ANY => "0".to_owned(),
        _ => hex::val_to_hex(field as u64),
    })
}

impl fmt::Display for Ptid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{},{}}}", self.pid, self.tid)
    }
}
