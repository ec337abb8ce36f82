//! Parsing of `F` packets: the client's reply to a forwarded host syscall.
//!
//! Syntax is `F<retcode>[,<errno>[,C]]`, all values signed hex. A non-zero
//! errno requires retcode = -1 and folds into the return value as a
//! negative errno, matching what newlib-style run-times expect to find in
//! the return register.

use crate::protocol::hex;

/// A successfully parsed syscall reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallReply {
    retcode: i64,
    ctrl_c: bool,
}

impl SyscallReply {
    /// Parse the body of an `F` packet (including the leading `F`).
    pub fn parse(data: &[u8]) -> Option<SyscallReply> {
        let data = data.strip_prefix(b"F")?;
        let mut fields = data.split(|b| *b == b',');

        let retcode = parse_value(fields.next()?)?;

        let Some(errno_field) = fields.next() else {
            return Some(SyscallReply {
                retcode,
                ctrl_c: false,
            });
        };

        let errno = parse_value(errno_field)?;
        if errno < 0 {
            return None;
        }
        let retcode = if errno > 0 {
            // An error reply must carry retcode -1; the register gets the
            // negative errno.
            if retcode != -1 {
                return None;
            }
            -errno
        } else {
            retcode
        };

        let Some(marker) = fields.next() else {
            return Some(SyscallReply {
                retcode,
                ctrl_c: false,
            });
        };

        if marker != b"C" || fields.next().is_some() {
            return None;
        }

        Some(SyscallReply {
            retcode,
            ctrl_c: true,
        })
    }

    /// The value destined for the syscall return register.
    pub fn retcode(&self) -> i64 {
        self.retcode
    }

    /// Did the reply carry a Ctrl-C marker (interrupt raced the reply)?
    pub fn has_ctrl_c(&self) -> bool {
        self.ctrl_c
    }
}

/// Parse a signed hex field.
fn parse_value(field: &[u8]) -> Option<i64> {
    let (negative, digits) = match field.strip_prefix(b"-") {
        Some(rest) => (true, rest),
        None => (false, field),
    };
    let val = hex::hex_to_val(digits)? as i64;
    Some(if negative { -val } else { val })
}
