//! TCP transport: listens for a single GDB client at a time.

use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::rc::Rc;

use log::{info, warn};
use nix::sys::signal::{signal, SigHandler, Signal};
use nix::sys::socket::setsockopt;
use nix::sys::socket::sockopt;

use crate::conn::Connection;
use crate::trace::TraceFlags;

/// File the bound port number is written to when requested, so harnesses
/// started with an ephemeral port can find the server.
const PORT_FILE: &str = "simulation_ready.txt";

/// A [`Connection`] over a freshly accepted TCP client.
pub struct TcpConnection {
    port: u16,
    write_port: bool,
    flags: Rc<TraceFlags>,
    stream: Option<TcpStream>,
}

impl TcpConnection {
    /// `port` 0 requests an ephemeral port; `write_port` records whichever
    /// port was bound in [`PORT_FILE`].
    pub fn new(port: u16, write_port: bool, flags: Rc<TraceFlags>) -> Self {
        TcpConnection {
            port,
            write_port,
            flags,
            stream: None,
        }
    }
}

impl Connection for TcpConnection {
    fn connect(&mut self) -> bool {
        // A dying client must not take the server with it.
        unsafe {
            let _ = signal(Signal::SIGPIPE, SigHandler::SigIgn);
        }

        let listener = match TcpListener::bind(("0.0.0.0", self.port)) {
            Ok(listener) => listener,
            Err(err) => {
                warn!("cannot bind RSP socket on port {}: {}", self.port, err);
                return false;
            }
        };

        let bound_port = match listener.local_addr() {
            Ok(addr) => addr.port(),
            Err(err) => {
                warn!("cannot read bound RSP socket address: {}", err);
                return false;
            }
        };

        if self.write_port {
            if let Err(err) = fs::write(PORT_FILE, format!("{}\n", bound_port)) {
                warn!("cannot write port file {}: {}", PORT_FILE, err);
            }
        }

        if !self.flags.trace_silent() {
            eprintln!("Listening for RSP on port {}", bound_port);
        }

        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!("cannot accept RSP client: {}", err);
                return false;
            }
        };

        if self.flags.trace_conn() {
            info!("RSP client connected from {}", peer);
        }

        // Interactive protocol with many tiny packets.
        if let Err(err) = stream.set_nodelay(true) {
            warn!("cannot set TCP_NODELAY: {}", err);
        }
        if let Err(err) = setsockopt(&stream, sockopt::KeepAlive, &true) {
            warn!("cannot set SO_KEEPALIVE: {}", err);
        }

        self.stream = Some(stream);
        true
    }

    fn close(&mut self) {
        if self.stream.take().is_some() && self.flags.trace_conn() {
            info!("RSP client connection closed");
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn put_byte(&mut self, byte: u8) -> bool {
        let Some(stream) = self.stream.as_mut() else {
            return false;
        };
        match stream.write_all(&[byte]) {
            Ok(()) => true,
            Err(err) => {
                warn!("RSP write failed: {}", err);
                false
            }
        }
    }

    fn get_byte(&mut self, blocking: bool) -> Option<u8> {
        let stream = self.stream.as_mut()?;
        let mut byte = [0u8; 1];

        if blocking {
            loop {
                match stream.read(&mut byte) {
                    Ok(0) => return None,
                    Ok(_) => return Some(byte[0]),
                    Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                    Err(err) => {
                        warn!("RSP read failed: {}", err);
                        return None;
                    }
                }
            }
        }

        // Non-blocking peek for a pending break byte.
        if stream.set_nonblocking(true).is_err() {
            return None;
        }
        let result = stream.read(&mut byte);
        let _ = stream.set_nonblocking(false);

        match result {
            Ok(0) => None,
            Ok(_) => Some(byte[0]),
            Err(err) if err.kind() == ErrorKind::WouldBlock => None,
            Err(err) => {
                warn!("RSP non-blocking read failed: {}", err);
                None
            }
        }
    }
}
