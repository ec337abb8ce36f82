//! An in-memory [`Connection`] for exercising the framer and server.

use std::collections::VecDeque;

use crate::conn::Connection;

/// Replays a fixed byte script as input and records everything sent.
///
/// Once the script is exhausted, blocking reads report EOF, which the
/// framer treats as the client disconnecting.
pub struct ScriptedConnection {
    input: VecDeque<u8>,
    output: Vec<u8>,
    connected: bool,
}

impl ScriptedConnection {
    pub fn new(input: &[u8]) -> Self {
        ScriptedConnection {
            input: input.iter().copied().collect(),
            output: Vec::new(),
            connected: true,
        }
    }

    /// Everything the server has transmitted so far.
    pub fn sent(&self) -> &[u8] {
        &self.output
    }

    /// Append more scripted input.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.input.extend(bytes.iter().copied());
    }
}

impl Connection for ScriptedConnection {
    fn connect(&mut self) -> bool {
        // One-shot: the script is a single session.
        false
    }

    fn close(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn put_byte(&mut self, byte: u8) -> bool {
        self.output.push(byte);
        true
    }

    fn get_byte(&mut self, _blocking: bool) -> Option<u8> {
        self.input.pop_front()
    }
}
