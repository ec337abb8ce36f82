use std::process;

/// Report an unrecoverable error and abort the process.
///
/// Used for invariant violations and target failures, where continuing
/// would serve the client stale or corrupt state. Protocol and transport
/// errors are never routed through here.
pub fn fatal_error(msg: &str) -> ! {
    log::error!("*** ABORT: {}", msg);
    eprintln!("*** ABORT: {}", msg);
    process::abort();
}
