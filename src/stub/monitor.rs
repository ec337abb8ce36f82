//! `qRcmd` (monitor) command handling.
//!
//! Replies follow the RSP convention for command output: an `O`-prefixed
//! hex payload the client prints verbatim, followed by a plain `OK`.
//! Anything not recognised here is offered to the target's own command
//! hook before being rejected.

use std::time::Duration;

use chrono::Local;
use log::info;

use crate::conn::Connection;
use crate::protocol::hex;
use crate::stub::GdbServer;
use crate::target::{ResetType, ResumeRes};
use crate::util::fatal_error;

/// The generic command summary printed by `monitor help`.
const HELP_TEXT: &[&str] = &[
    "The following generic monitor commands are supported:\n",
    "  help\n",
    "    Produce this message\n",
    "  reset [cold | warm]\n",
    "    Reset the simulator (default warm)\n",
    "  exit\n",
    "    Exit the GDB server\n",
    "  timeout <interval>\n",
    "    Maximum wall-clock time (hex seconds) taken by continue packet\n",
    "  real-timeout <interval>\n",
    "    Synonym for timeout\n",
    "  cycle-timeout <cycles>\n",
    "    Maximum cycle count (hex) taken by continue packet\n",
    "  real-timestamp\n",
    "    Report the wallclock time in the target\n",
    "  timestamp\n",
    "    Report the current execution time in the target\n",
    "  cyclecount\n",
    "    Report cycles executed since reset\n",
    "  instrcount\n",
    "    Report instructions executed since reset\n",
    "  set debug <flag> [on|off|0|1] [<value>]\n",
    "    Set debug flag in target and optional associated value\n",
    "  show debug [<flag>]\n",
    "    Show debug for one flag or all flags in target\n",
    "  set kill-core-on-exit on|off\n",
    "    Mark cores as killed when they perform an exit syscall\n",
    "  show kill-core-on-exit\n",
    "    Show how an exit syscall treats its core\n",
    "  echo <message>\n",
    "    Echo <message> on stdout of the gdbserver\n",
];

/// Parse a `on|off|0|1|true|false` token.
fn parse_on_off(token: &str) -> Option<bool> {
    if token.eq_ignore_ascii_case("0")
        || token.eq_ignore_ascii_case("off")
        || token.eq_ignore_ascii_case("false")
    {
        Some(false)
    } else if token.eq_ignore_ascii_case("1")
        || token.eq_ignore_ascii_case("on")
        || token.eq_ignore_ascii_case("true")
    {
        Some(true)
    } else {
        None
    }
}

/// `<prefix> <hex>` argument extraction for the timeout commands.
fn parse_hex_arg(cmd: &str, prefix: &str) -> Option<u64> {
    hex::hex_to_val(cmd.strip_prefix(prefix)?.trim().as_bytes())
}

impl<'a, C: Connection> GdbServer<'a, C> {
    /// Dispatch a decoded `qRcmd` command string.
    pub(super) fn monitor_command(&mut self, cmd: &str) {
        if self.flags.trace_rsp() {
            info!("qRcmd,{}", cmd);
        }

        if cmd == "help" {
            self.monitor_help();
        } else if cmd == "reset" || cmd == "reset warm" {
            self.monitor_reset(ResetType::Warm);
        } else if cmd == "reset cold" {
            self.monitor_reset(ResetType::Cold);
        } else if cmd == "exit" {
            // No reply: the client's connection is about to go away.
            self.exit_server = true;
        } else if let Some(secs) =
            parse_hex_arg(cmd, "timeout ").or_else(|| parse_hex_arg(cmd, "real-timeout "))
        {
            self.timeout.set_real(Duration::from_secs(secs));
            self.put_str_pkt("OK");
        } else if let Some(cycles) = parse_hex_arg(cmd, "cycle-timeout ") {
            self.timeout.set_cycle(cycles);
            self.put_str_pkt("OK");
        } else if cmd == "real-timestamp" {
            let now = Local::now().format("%F %T");
            self.pkt.pack_hex_str(&format!("{}\n", now));
            self.put_pkt();
            self.put_str_pkt("OK");
        } else if cmd == "timestamp" {
            let stamp = self.cpu.time_stamp();
            self.pkt.pack_hex_str(&format!("{}\n", stamp));
            self.put_pkt();
            self.put_str_pkt("OK");
        } else if cmd == "cyclecount" {
            let cycles = self.cpu.cycle_count();
            self.pkt.pack_hex_str(&format!("{}\n", cycles));
            self.put_pkt();
            self.put_str_pkt("OK");
        } else if cmd == "instrcount" {
            let instrs = self.cpu.instr_count();
            self.pkt.pack_hex_str(&format!("{}\n", instrs));
            self.put_pkt();
            self.put_str_pkt("OK");
        } else if let Some(msg) = cmd.strip_prefix("echo") {
            println!("{}", msg.trim_start());
            self.put_str_pkt("OK");
        } else if let Some(rest) = cmd.strip_prefix("set ") {
            let rest = rest.trim_start().to_owned();
            self.monitor_set(&rest);
        } else if let Some(rest) = cmd.strip_prefix("show ") {
            let rest = rest.trim_start().to_owned();
            self.monitor_show(&rest);
        } else {
            self.target_command(cmd);
        }
    }

    /// `monitor help`: the generic summary, then whatever the target has.
    fn monitor_help(&mut self) {
        for line in HELP_TEXT {
            self.pkt.pack_rcmd_str(line, true);
            self.put_pkt();
        }

        let mut out = String::new();
        if self.cpu.command("help", &mut out) {
            self.pkt.pack_rcmd_str(
                "The following target specific monitor commands are supported:\n",
                true,
            );
            self.put_pkt();
            for line in out.lines() {
                self.pkt.pack_rcmd_str(&format!("{}\n", line), true);
                self.put_pkt();
            }
        } else {
            self.pkt
                .pack_rcmd_str("There are no target specific monitor commands\n", true);
            self.put_pkt();
        }

        self.put_str_pkt("OK");
    }

    /// `monitor reset [cold|warm]`: revive all cores, then reset the
    /// target. A target that cannot reset cannot be debugged any further.
    fn monitor_reset(&mut self, kind: ResetType) {
        self.core_manager.reset();

        if self.cpu.reset(kind) != ResumeRes::Success {
            fatal_error("failed to reset: terminating");
        }

        self.put_str_pkt("OK");
    }

    /// `monitor set ...`
    fn monitor_set(&mut self, cmd: &str) {
        let tokens: Vec<&str> = cmd.split_whitespace().collect();

        if (2..=4).contains(&tokens.len()) && tokens[0] == "debug" {
            // Three flavors:
            // - set debug <flag>
            // - set debug <flag> 1|0|on|off|true|false
            // - set debug <flag> 1|0|on|off|true|false <value>
            let flag = tokens[1];
            if !self.flags.is_flag(flag) {
                self.put_str_pkt("E01");
                return;
            }

            let state = if tokens.len() == 2 {
                true
            } else {
                match parse_on_off(tokens[2]) {
                    Some(state) => state,
                    None => {
                        self.put_str_pkt("E02");
                        return;
                    }
                }
            };

            if tokens.len() == 4 {
                let numeric = self.flags.is_numeric_flag(flag);
                self.flags.set(flag, state, tokens[3], numeric);
            } else {
                self.flags.set_state(flag, state);
            }

            self.put_str_pkt("OK");
        } else if tokens.len() == 2 && tokens[0] == "kill-core-on-exit" {
            match parse_on_off(tokens[1]) {
                Some(state) => {
                    self.kill_core_on_exit = state;
                    self.put_str_pkt("OK");
                }
                None => self.put_str_pkt("E02"),
            }
        } else {
            self.target_command(&format!("set {}", cmd));
        }
    }

    /// `monitor show ...`
    fn monitor_show(&mut self, cmd: &str) {
        let tokens: Vec<&str> = cmd.split_whitespace().collect();

        if tokens == ["debug"] {
            let dump = self.flags.dump();
            self.pkt.pack_rcmd_str(&dump, true);
            self.put_pkt();
            self.put_str_pkt("OK");
        } else if tokens.len() == 2 && tokens[0] == "debug" {
            let flag = tokens[1];
            if !self.flags.is_flag(flag) {
                self.put_str_pkt("E01");
                return;
            }

            let line = format!(
                "{}: {} (associated val = \"{}\")\n",
                flag,
                if self.flags.state(flag) { "ON" } else { "OFF" },
                self.flags.val(flag)
            );
            self.pkt.pack_rcmd_str(&line, true);
            self.put_pkt();
            self.put_str_pkt("OK");
        } else if tokens == ["kill-core-on-exit"] {
            let line = format!(
                "kill-core-on-exit: {}\n",
                if self.kill_core_on_exit { "ON" } else { "OFF" }
            );
            self.pkt.pack_rcmd_str(&line, true);
            self.put_pkt();
            self.put_str_pkt("OK");
        } else {
            self.target_command(&format!("show {}", cmd));
        }
    }

    /// Offer an unrecognised command to the target's hook.
    fn target_command(&mut self, cmd: &str) {
        let mut out = String::new();
        if self.cpu.command(cmd, &mut out) {
            self.pkt.pack_rcmd_str(&out, true);
            self.put_pkt();
            self.put_str_pkt("OK");
        } else {
            self.put_str_pkt("E04");
        }
    }
}
