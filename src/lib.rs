//! An implementation of the server side of the [GDB Remote Serial
//! Protocol](https://sourceware.org/gdb/onlinedocs/gdb/Remote-Protocol.html)
//! for driving multi-core simulated and remote targets.
//!
//! The crate is split into three loosely coupled layers:
//!
//! - [`conn`]: byte-level transports (TCP, stdio) and the RSP packet
//!   framer that sits on top of them.
//! - [`target`]: the [`Target`](target::Target) trait: the contract a CPU
//!   model must implement to be debugged. Targets are typically compiled
//!   into shared objects and loaded at runtime by the driver binary.
//! - [`stub`]: the [`GdbServer`](stub::GdbServer) itself: packet dispatch,
//!   execution control, matchpoints, and host-syscall forwarding.
//!
//! A minimal session looks like:
//!
//! ```rust,ignore
//! let flags = Rc::new(TraceFlags::new());
//! let conn = TcpConnection::new(3333, false, flags.clone());
//! let mut server = GdbServer::new(conn, &mut target, flags, KillBehaviour::ResetOnKill);
//! server.serve()?;
//! ```

pub mod common;
pub mod conn;
pub mod protocol;
pub mod stub;
pub mod target;
pub mod timeout;
pub mod trace;

mod util;

pub use crate::common::{Addr, RegVal, Signal};
pub use crate::conn::{Connection, StdioConnection, TcpConnection};
pub use crate::stub::{init, GdbServer, KillBehaviour, ServerError};
pub use crate::target::Target;
pub use crate::timeout::Timeout;
pub use crate::trace::TraceFlags;
