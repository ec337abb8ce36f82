//! Driver binary: parse the command line, load the target's shared object,
//! and hand everything to the server loop.

use std::process::ExitCode;
use std::rc::Rc;

use clap::Parser;
use libloading::{Library, Symbol};
use thiserror::Error;

use gdbserve::target::{CreateTargetFn, TargetApiVersionFn, TARGET_API_VERSION};
use gdbserve::{init, Target, TraceFlags};

const TRACE_HELP: &str = "\
The -t/--trace option may appear multiple times. Trace flags are:

  rsp               Trace RSP packets
  conn              Trace RSP connection handling
  break             Trace breakpoint handling
  vcd               Generate a Value Change Dump
  silent            Minimize informative messages (synonym for -q)
  disas=<filename>  Disassemble each instruction executed
  qdisas            Make 'disas' quieter, only trace instructions
  dflush            Flush disassembly to file after each step
  mem               Trace multicore memory access
  exec              Trace core execution and halting
  verbosity=<n>     Trace verbosity level
  ipg=<n>           Instructions per gdbserver poll";

#[derive(Parser)]
#[command(
    name = "gdbserve",
    about = "GDB Remote Serial Protocol server",
    version,
    disable_version_flag = true,
    after_help = TRACE_HELP
)]
struct Cli {
    /// Don't emit informational messages on stdout
    #[arg(short = 'q', long)]
    silent: bool,

    /// Trace item, <flag> or <flag>=<value>
    #[arg(short = 't', long = "trace", value_name = "flag")]
    trace: Vec<String>,

    /// Communicate with GDB via pipe instead of TCP socket
    #[arg(short = 's', long = "stdin")]
    stdin: bool,

    /// Show version information
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: Option<bool>,

    /// Shared object containing the target model
    #[arg(long, value_name = "shared object")]
    soname: Option<String>,

    /// Port to listen on (0 means an ephemeral port)
    #[arg(value_name = "rsp-port")]
    rsp_port: Option<String>,
}

#[derive(Debug, Error)]
enum LoadError {
    #[error("failed to load {0}: {1}")]
    Library(String, #[source] libloading::Error),

    #[error("failed to look up {0}: {1}")]
    Symbol(&'static str, #[source] libloading::Error),

    #[error("incompatible target versions: target declared version {0}, expected {1}")]
    Version(u64, u64),
}

/// A target model together with the library that owns its code.
///
/// The library must stay loaded for as long as the target is alive, so the
/// two travel together; field order drops the target first.
struct LoadedTarget {
    target: Box<dyn Target>,
    _lib: Library,
}

/// Expand a bare target name to the platform's library file name.
fn expand_soname(soname: &str) -> String {
    if cfg!(target_os = "macos") {
        if soname.contains(".dylib") {
            soname.to_owned()
        } else {
            format!("libgdbserve-target-{}.dylib", soname)
        }
    } else if soname.contains(".so") {
        soname.to_owned()
    } else {
        format!("libgdbserve-target-{}.so", soname)
    }
}

/// Load a target library, probe its contract version, and create the
/// target.
fn load_target(soname: &str, flags: &Rc<TraceFlags>) -> Result<LoadedTarget, LoadError> {
    unsafe {
        let lib = Library::new(soname)
            .map_err(|err| LoadError::Library(soname.to_owned(), err))?;

        // Refuse to call into a target built against another contract.
        let api_version: Symbol<TargetApiVersionFn> = lib
            .get(b"target_api_version")
            .map_err(|err| LoadError::Symbol("target_api_version", err))?;
        let declared = api_version();
        if declared != TARGET_API_VERSION {
            return Err(LoadError::Version(declared, TARGET_API_VERSION));
        }

        let create_target: Symbol<CreateTargetFn> = lib
            .get(b"create_target")
            .map_err(|err| LoadError::Symbol("create_target", err))?;
        let target = *Box::from_raw(create_target(Rc::as_ptr(flags)));

        Ok(LoadedTarget { target, _lib: lib })
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();

    let flags = Rc::new(TraceFlags::new());
    if cli.silent {
        flags.set_state("silent", true);
    }
    for arg in &cli.trace {
        if !flags.parse_arg(arg) {
            eprintln!("ERROR: bad trace flag {}", arg);
            return ExitCode::FAILURE;
        }
    }

    let port: u16 = match &cli.rsp_port {
        Some(token) => {
            // 'target remote :PORT' syntax sticks in people's fingers, so
            // accept a leading colon on the port number too.
            let token = token.strip_prefix(':').unwrap_or(token);
            match token.parse() {
                Ok(port) => port,
                Err(_) => {
                    eprintln!("ERROR: failed to parse port number from: {}", token);
                    return ExitCode::FAILURE;
                }
            }
        }
        None => {
            eprintln!("NOTE: no port number found - using ephemeral port");
            0
        }
    };

    let Some(soname) = cli.soname.as_deref() else {
        eprintln!("No soname specified, cannot create target");
        return ExitCode::FAILURE;
    };
    let soname = expand_soname(soname);

    eprintln!("Loading target interface from dynamic library: {}", soname);
    let mut loaded = match load_target(&soname, &flags) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    // An ephemeral port is only useful if its number can be found somewhere.
    let write_port = port == 0;

    match init(loaded.target.as_mut(), flags, cli.stdin, port, write_port) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("*** Unable to continue: {}: EXITING", err);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soname_expansion() {
        if cfg!(target_os = "macos") {
            assert_eq!(expand_soname("riscv"), "libgdbserve-target-riscv.dylib");
        } else {
            assert_eq!(expand_soname("riscv"), "libgdbserve-target-riscv.so");
            assert_eq!(expand_soname("libfoo.so"), "libfoo.so");
            assert_eq!(expand_soname("libfoo.so.2"), "libfoo.so.2");
        }
    }

    #[test]
    fn cli_parses_port_and_flags() {
        let cli = Cli::parse_from(["gdbserve", "--soname", "riscv", "-t", "rsp", ":4242"]);
        assert_eq!(cli.rsp_port.as_deref(), Some(":4242"));
        assert_eq!(cli.soname.as_deref(), Some("riscv"));
        assert_eq!(cli.trace, vec!["rsp"]);
        assert!(!cli.stdin);
    }
}
