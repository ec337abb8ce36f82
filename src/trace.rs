//! Named tracing knobs controlling diagnostic output.
//!
//! Flags are established once at startup (from `-t/--trace` arguments) and
//! may be flipped at runtime through the `monitor set debug` command. The
//! set of recognised names is fixed; attempting to set an unknown flag is a
//! fatal configuration error.
//!
//! The server is single-threaded, so flag state lives behind a [`RefCell`]
//! and a [`TraceFlags`] handle is shared by reference (typically
//! `Rc<TraceFlags>`) between the server, the framer, and the target.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::util::fatal_error;

#[derive(Debug, Clone, Default)]
struct FlagInfo {
    state: bool,
    val: String,
    numeric_val: i32,
}

/// Registry of named boolean/numeric trace flags.
pub struct TraceFlags {
    flags: RefCell<BTreeMap<&'static str, FlagInfo>>,
}

/// All recognised flag names.
const FLAG_NAMES: &[&str] = &[
    "rsp", "conn", "break", "vcd", "silent", "disas", "qdisas", "dflush", "mem", "exec",
    "verbosity", "ipg",
];

/// Flags whose value is decoded as an integer.
const NUMERIC_FLAGS: &[&str] = &["verbosity", "ipg"];

/// Default instructions-per-gdb-poll for the `ipg` flag.
const IPG_DEFAULT: i32 = 50;

impl TraceFlags {
    pub fn new() -> Self {
        let mut flags = BTreeMap::new();
        for name in FLAG_NAMES {
            let mut info = FlagInfo::default();
            if *name == "ipg" {
                info.numeric_val = IPG_DEFAULT;
            }
            flags.insert(*name, info);
        }
        TraceFlags {
            flags: RefCell::new(flags),
        }
    }

    /// Is this a recognised flag name?
    pub fn is_flag(&self, name: &str) -> bool {
        self.flags.borrow().contains_key(name)
    }

    /// Does this flag carry an integer value?
    pub fn is_numeric_flag(&self, name: &str) -> bool {
        NUMERIC_FLAGS.contains(&name)
    }

    /// Set a flag's state and associated value.
    ///
    /// Fatal if the name is unknown, or if a numeric flag is given a value
    /// that does not parse as an integer.
    pub fn set(&self, name: &str, state: bool, val: &str, numeric: bool) {
        let mut flags = self.flags.borrow_mut();
        let Some(info) = flags.get_mut(name) else {
            fatal_error(&format!("attempt to set bad trace flag '{}'", name));
        };

        let numeric_val = if numeric {
            match val.parse::<i32>() {
                Ok(v) => v,
                Err(_) => fatal_error(&format!(
                    "failed to parse numeric value of trace flag '{}' from '{}'",
                    name, val
                )),
            }
        } else {
            0
        };

        info.state = state;
        info.val = val.to_owned();
        info.numeric_val = numeric_val;
    }

    /// Set a flag's state, leaving its value unchanged. Fatal on unknown
    /// names.
    pub fn set_state(&self, name: &str, state: bool) {
        let mut flags = self.flags.borrow_mut();
        let Some(info) = flags.get_mut(name) else {
            fatal_error(&format!("attempt to set state of bad trace flag '{}'", name));
        };
        info.state = state;
    }

    /// Get a flag's state. Fatal on unknown names.
    pub fn state(&self, name: &str) -> bool {
        match self.flags.borrow().get(name) {
            Some(info) => info.state,
            None => fatal_error(&format!("attempt to get state of bad trace flag '{}'", name)),
        }
    }

    /// Get a flag's associated string value. Fatal on unknown names.
    pub fn val(&self, name: &str) -> String {
        match self.flags.borrow().get(name) {
            Some(info) => info.val.clone(),
            None => fatal_error(&format!("attempt to get value of bad trace flag '{}'", name)),
        }
    }

    /// Get a flag's associated integer value. Fatal on unknown names.
    pub fn numeric_val(&self, name: &str) -> i32 {
        match self.flags.borrow().get(name) {
            Some(info) => info.numeric_val,
            None => fatal_error(&format!("attempt to get value of bad trace flag '{}'", name)),
        }
    }

    /// Parse a `-t/--trace` argument: either `<flag>` or `<flag>=<value>`.
    ///
    /// Returns `false` (without touching any state) if the flag name is not
    /// recognised, letting the driver print usage rather than aborting.
    pub fn parse_arg(&self, arg: &str) -> bool {
        match arg.split_once('=') {
            None => {
                if self.is_flag(arg) {
                    self.set(arg, true, "", false);
                    true
                } else {
                    false
                }
            }
            Some((key, value)) => {
                if self.is_flag(key) {
                    self.set(key, true, value, self.is_numeric_flag(key));
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Render every flag and its state, one per line.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (name, info) in self.flags.borrow().iter() {
            let _ = write!(
                out,
                "{}: {} (associated val = \"{}\" / {})\n",
                name,
                if info.state { "ON" } else { "OFF" },
                info.val,
                info.numeric_val
            );
        }
        out
    }

    pub fn trace_rsp(&self) -> bool {
        self.state("rsp")
    }

    pub fn trace_conn(&self) -> bool {
        self.state("conn")
    }

    pub fn trace_break(&self) -> bool {
        self.state("break")
    }

    pub fn trace_vcd(&self) -> bool {
        self.state("vcd")
    }

    pub fn trace_silent(&self) -> bool {
        self.state("silent")
    }

    pub fn trace_disas(&self) -> bool {
        self.state("disas")
    }

    pub fn trace_qdisas(&self) -> bool {
        self.state("qdisas")
    }

    pub fn trace_dflush(&self) -> bool {
        self.state("dflush")
    }

    pub fn trace_mem(&self) -> bool {
        self.state("mem")
    }

    pub fn trace_exec(&self) -> bool {
        self.state("exec")
    }

    pub fn verbosity(&self) -> i32 {
        self.numeric_val("verbosity")
    }

    pub fn ipg(&self) -> i32 {
        self.numeric_val("ipg")
    }
}

impl Default for TraceFlags {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_default_off() {
        let flags = TraceFlags::new();
        assert!(!flags.trace_rsp());
        assert!(!flags.trace_exec());
        assert_eq!(flags.ipg(), 50);
    }

    #[test]
    fn parse_bare_flag() {
        let flags = TraceFlags::new();
        assert!(flags.parse_arg("rsp"));
        assert!(flags.trace_rsp());
        assert_eq!(flags.val("rsp"), "");
    }

    #[test]
    fn parse_flag_with_value() {
        let flags = TraceFlags::new();
        assert!(flags.parse_arg("disas=trace.out"));
        assert!(flags.trace_disas());
        assert_eq!(flags.val("disas"), "trace.out");
    }

    #[test]
    fn parse_numeric_flag() {
        let flags = TraceFlags::new();
        assert!(flags.parse_arg("verbosity=3"));
        assert_eq!(flags.verbosity(), 3);
        assert!(flags.parse_arg("ipg=100"));
        assert_eq!(flags.ipg(), 100);
    }

    #[test]
    fn unknown_flag_rejected() {
        let flags = TraceFlags::new();
        assert!(!flags.parse_arg("nonsense"));
        assert!(!flags.parse_arg("nonsense=1"));
    }

    #[test]
    fn set_state_roundtrip() {
        let flags = TraceFlags::new();
        flags.set_state("exec", true);
        assert!(flags.trace_exec());
        flags.set_state("exec", false);
        assert!(!flags.trace_exec());
    }

    #[test]
    fn dump_lists_every_flag() {
        let flags = TraceFlags::new();
        let dump = flags.dump();
        for name in super::FLAG_NAMES {
            assert!(dump.contains(name), "missing {} in dump", name);
        }
    }
}
