//! Transport over the process's standard streams.
//!
//! Used when the debugger launches the server itself (`target remote |
//! gdbserve --stdin ...`). The session is "connected" from the start and
//! cannot be re-established once stdin closes.

use std::io::{ErrorKind, Read, Write};
use std::os::fd::AsFd;
use std::rc::Rc;

use log::warn;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use crate::conn::Connection;
use crate::trace::TraceFlags;

/// A [`Connection`] over stdin/stdout.
pub struct StdioConnection {
    connected: bool,
    #[allow(dead_code)]
    flags: Rc<TraceFlags>,
}

impl StdioConnection {
    pub fn new(flags: Rc<TraceFlags>) -> Self {
        StdioConnection {
            connected: true,
            flags,
        }
    }
}

impl Connection for StdioConnection {
    fn connect(&mut self) -> bool {
        // The streams were handed to us at spawn; once they close there is
        // nothing to reconnect to.
        false
    }

    fn close(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn put_byte(&mut self, byte: u8) -> bool {
        let mut stdout = std::io::stdout();
        match stdout.write_all(&[byte]).and_then(|_| stdout.flush()) {
            Ok(()) => true,
            Err(err) => {
                warn!("RSP write to stdout failed: {}", err);
                false
            }
        }
    }

    fn get_byte(&mut self, blocking: bool) -> Option<u8> {
        let stdin = std::io::stdin();

        if !blocking {
            // Anything waiting on stdin right now?
            let mut fds = [PollFd::new(stdin.as_fd(), PollFlags::POLLIN)];
            match poll(&mut fds, PollTimeout::ZERO) {
                Ok(n) if n > 0 => {
                    let readable = fds[0]
                        .revents()
                        .map_or(false, |revents| revents.contains(PollFlags::POLLIN));
                    if !readable {
                        return None;
                    }
                }
                _ => return None,
            }
        }

        let mut byte = [0u8; 1];
        loop {
            match stdin.lock().read(&mut byte) {
                Ok(0) => return None,
                Ok(_) => return Some(byte[0]),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!("RSP read from stdin failed: {}", err);
                    return None;
                }
            }
        }
    }
}
