//! Byte-level transports and the RSP framing layer built on them.
//!
//! A [`Connection`] moves single bytes between the server and one debugger
//! client; [`RspStream`] turns that byte stream into checksummed packets.
//! Two transports are provided: a TCP listener and the process's standard
//! streams.

mod rsp;
mod stdio;
mod tcp;

pub use self::rsp::{RspStream, BREAK_CHAR};
pub use self::stdio::StdioConnection;
pub use self::tcp::TcpConnection;

#[cfg(test)]
pub(crate) mod test_conn;

/// In-order, serial, byte-wise I/O to a single debugger client.
///
/// Implementations are free to buffer internally, but a byte accepted by
/// [`put_byte`](Connection::put_byte) must eventually reach the client
/// without further prompting.
pub trait Connection {
    /// Wait for a client. Returns `false` if no client can ever be
    /// obtained (a fatal condition for the server loop).
    fn connect(&mut self) -> bool;

    /// Drop the current client, if any.
    fn close(&mut self);

    /// Is a client currently attached?
    fn is_connected(&self) -> bool;

    /// Write a single byte. `false` signals a communications failure.
    fn put_byte(&mut self, byte: u8) -> bool;

    /// Read a single byte.
    ///
    /// Blocking: `None` means EOF or a communications failure.
    /// Non-blocking: `None` means no byte is currently available.
    fn get_byte(&mut self, blocking: bool) -> Option<u8>;
}
