//! RSP packet framing over a byte-level [`Connection`].
//!
//! Inbound, the framer hunts for `$`, accumulates the body while summing a
//! running checksum, validates the two trailing hex digits, and acks with
//! `+`/`-` (until no-ack mode is negotiated). Outbound, it escapes the
//! reserved bytes, appends the checksum, and waits for the client's ack,
//! retransmitting on `-`.
//!
//! A single `0x03` byte *between* packets is a client break. The framer
//! latches it on a non-blocking peek; any other peeked byte is held in a
//! one-byte lookahead that the next read consumes first.

use log::{trace, warn};
use std::rc::Rc;

use crate::conn::Connection;
use crate::protocol::hex::{char_to_nybble, nybble_to_char};
use crate::protocol::Packet;
use crate::trace::TraceFlags;

/// The out-of-band interrupt byte (Ctrl-C).
pub const BREAK_CHAR: u8 = 0x03;

/// Packet framing state layered over a transport.
pub struct RspStream<C: Connection> {
    conn: C,
    flags: Rc<TraceFlags>,
    no_ack_mode: bool,
    pending_break: bool,
    lookahead: Option<u8>,
}

impl<C: Connection> RspStream<C> {
    pub fn new(conn: C, flags: Rc<TraceFlags>) -> Self {
        RspStream {
            conn,
            flags,
            no_ack_mode: false,
            pending_break: false,
            lookahead: None,
        }
    }

    pub fn connect(&mut self) -> bool {
        self.conn.connect()
    }

    pub fn close(&mut self) {
        self.conn.close();
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Stop producing and expecting `+`/`-` acks (negotiated through
    /// `QStartNoAckMode`).
    pub fn set_no_ack_mode(&mut self, enabled: bool) {
        self.no_ack_mode = enabled;
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &C {
        &self.conn
    }

    #[cfg(test)]
    pub(crate) fn inner_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    /// Read one byte, draining the lookahead buffer first.
    ///
    /// Break bytes are *not* special here: inside a packet they are just
    /// payload.
    fn get_char(&mut self) -> Option<u8> {
        match self.lookahead.take() {
            Some(ch) => Some(ch),
            None => self.conn.get_byte(true),
        }
    }

    /// Receive the next well-formed packet into `pkt`.
    ///
    /// Bad-checksum packets are nacked and retried internally; `false`
    /// means the connection failed and the session is over.
    pub fn get_pkt(&mut self, pkt: &mut Packet) -> bool {
        // Keep going until a packet with a valid checksum arrives.
        loop {
            // Hunt for the start character, discarding everything else.
            let mut ch = match self.get_char() {
                Some(ch) => ch,
                None => return false,
            };
            while ch != b'$' {
                ch = match self.get_char() {
                    Some(ch) => ch,
                    None => return false,
                };
            }

            // Accumulate the body until '#', restarting if a stray '$'
            // appears mid-packet.
            let mut checksum: u8 = 0;
            let mut terminated = false;
            pkt.clear();
            while pkt.remaining() > 0 {
                ch = match self.get_char() {
                    Some(ch) => ch,
                    None => return false,
                };

                if ch == b'$' {
                    checksum = 0;
                    pkt.clear();
                    continue;
                }
                if ch == b'#' {
                    terminated = true;
                    break;
                }

                checksum = checksum.wrapping_add(ch);
                pkt.push(ch);
            }

            if !terminated {
                warn!("RSP packet overran buffer");
                continue;
            }

            // Two hex digits of expected checksum.
            let mut xmit_ok = true;
            let mut xmitsum: u8 = 0;
            for _ in 0..2 {
                ch = match self.get_char() {
                    Some(ch) => ch,
                    None => return false,
                };
                match char_to_nybble(ch) {
                    Some(nybble) => xmitsum = (xmitsum << 4) | nybble,
                    None => xmit_ok = false,
                }
            }

            if self.no_ack_mode {
                if self.flags.trace_rsp() {
                    trace!("getPkt: {}", pkt);
                }
                return true;
            }

            if !xmit_ok || checksum != xmitsum {
                warn!(
                    "bad RSP checksum: computed {:#04x}, received {:#04x}",
                    checksum, xmitsum
                );
                if !self.conn.put_byte(b'-') {
                    return false;
                }
                continue;
            }

            if !self.conn.put_byte(b'+') {
                return false;
            }
            if self.flags.trace_rsp() {
                trace!("getPkt: {}", pkt);
            }
            return true;
        }
    }

    /// Transmit `pkt`, escaping reserved bytes and retransmitting until the
    /// client acks (unless in no-ack mode). `false` means the connection
    /// failed.
    pub fn put_pkt(&mut self, pkt: &Packet) -> bool {
        loop {
            let mut checksum: u8 = 0;

            if !self.conn.put_byte(b'$') {
                return false;
            }

            for &byte in pkt.as_bytes() {
                let mut ch = byte;
                if matches!(ch, b'$' | b'#' | b'*' | b'}') {
                    checksum = checksum.wrapping_add(b'}');
                    if !self.conn.put_byte(b'}') {
                        return false;
                    }
                    ch ^= 0x20;
                }
                checksum = checksum.wrapping_add(ch);
                if !self.conn.put_byte(ch) {
                    return false;
                }
            }

            if !self.conn.put_byte(b'#') {
                return false;
            }
            // Both digits are valid nybbles by construction.
            if !self.conn.put_byte(nybble_to_char(checksum >> 4).unwrap_or(b'0')) {
                return false;
            }
            if !self.conn.put_byte(nybble_to_char(checksum & 0xf).unwrap_or(b'0')) {
                return false;
            }

            if self.no_ack_mode {
                break;
            }

            let mut ch = match self.get_char() {
                Some(ch) => ch,
                None => return false,
            };
            if ch == BREAK_CHAR {
                // A break arriving while we wait for the ack. Only a single
                // pending break is supported.
                self.pending_break = true;
                ch = match self.get_char() {
                    Some(ch) => ch,
                    None => return false,
                };
                debug_assert!(ch != BREAK_CHAR);
            }

            if ch == b'+' {
                break;
            }
            // '-' (or anything unexpected): retransmit.
        }

        if self.flags.trace_rsp() {
            trace!("putPkt: {}", pkt);
        }
        true
    }

    /// Has the client sent a break?
    ///
    /// Performs a non-blocking peek; a non-break byte found this way is
    /// stashed in the lookahead buffer for the next packet read. A latched
    /// break is consumed by this call.
    pub fn have_break(&mut self) -> bool {
        if !self.pending_break && self.lookahead.is_none() {
            if let Some(ch) = self.conn.get_byte(false) {
                if ch == BREAK_CHAR {
                    self.pending_break = true;
                } else {
                    self.lookahead = Some(ch);
                }
            }
        }

        if self.pending_break {
            self.pending_break = false;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::test_conn::ScriptedConnection;

    fn stream(input: &[u8]) -> RspStream<ScriptedConnection> {
        RspStream::new(
            ScriptedConnection::new(input),
            Rc::new(TraceFlags::new()),
        )
    }

    #[test]
    fn get_pkt_valid_checksum_acked() {
        let mut rsp = stream(b"$p0#a0");
        let mut pkt = Packet::new();
        assert!(rsp.get_pkt(&mut pkt));
        assert_eq!(pkt.as_bytes(), b"p0");
        assert_eq!(rsp.conn.sent(), b"+");
    }

    #[test]
    fn get_pkt_skips_leading_garbage() {
        let mut rsp = stream(b"xx++$OK#9a");
        let mut pkt = Packet::new();
        assert!(rsp.get_pkt(&mut pkt));
        assert_eq!(pkt.as_bytes(), b"OK");
    }

    #[test]
    fn get_pkt_bad_checksum_nacked_then_retried() {
        let mut rsp = stream(b"$p0#ff$p0#a0");
        let mut pkt = Packet::new();
        assert!(rsp.get_pkt(&mut pkt));
        assert_eq!(pkt.as_bytes(), b"p0");
        assert_eq!(rsp.conn.sent(), b"-+");
    }

    #[test]
    fn get_pkt_restart_on_stray_dollar() {
        // A '$' mid-body discards the partial packet.
        let mut rsp = stream(b"$garbage$p0#a0");
        let mut pkt = Packet::new();
        assert!(rsp.get_pkt(&mut pkt));
        assert_eq!(pkt.as_bytes(), b"p0");
    }

    #[test]
    fn get_pkt_eof_is_failure() {
        let mut rsp = stream(b"$p0");
        let mut pkt = Packet::new();
        assert!(!rsp.get_pkt(&mut pkt));
    }

    #[test]
    fn put_pkt_frames_and_waits_for_ack() {
        let mut rsp = stream(b"+");
        let mut pkt = Packet::new();
        pkt.pack_str("OK");
        assert!(rsp.put_pkt(&pkt));
        assert_eq!(rsp.conn.sent(), b"$OK#9a");
    }

    #[test]
    fn put_pkt_retransmits_on_nack() {
        let mut rsp = stream(b"-+");
        let mut pkt = Packet::new();
        pkt.pack_str("OK");
        assert!(rsp.put_pkt(&pkt));
        assert_eq!(rsp.conn.sent(), b"$OK#9a$OK#9a");
    }

    #[test]
    fn put_pkt_escapes_reserved_bytes() {
        let mut rsp = stream(b"+");
        let mut pkt = Packet::new();
        pkt.append(b"a$b");
        assert!(rsp.put_pkt(&pkt));
        // '$' -> "}\x04"; checksum covers the on-wire escaped bytes.
        let sent = rsp.conn.sent();
        assert!(sent.starts_with(b"$a}\x04b#"));
        let body_sum = b'a'
            .wrapping_add(b'}')
            .wrapping_add(0x04)
            .wrapping_add(b'b');
        let expect = format!("{:02x}", body_sum);
        assert_eq!(&sent[sent.len() - 2..], expect.as_bytes());
    }

    #[test]
    fn put_pkt_break_during_ack_is_latched() {
        let mut rsp = stream(b"\x03+");
        let mut pkt = Packet::new();
        pkt.pack_str("OK");
        assert!(rsp.put_pkt(&pkt));
        assert!(rsp.have_break());
        assert!(!rsp.have_break());
    }

    #[test]
    fn no_ack_mode_expects_no_ack() {
        let mut rsp = stream(b"");
        rsp.set_no_ack_mode(true);
        let mut pkt = Packet::new();
        pkt.pack_str("OK");
        // No ack byte available, yet transmission succeeds.
        assert!(rsp.put_pkt(&pkt));
        assert_eq!(rsp.conn.sent(), b"$OK#9a");
    }

    #[test]
    fn no_ack_mode_skips_inbound_ack() {
        let mut rsp = stream(b"$p0#ff");
        rsp.set_no_ack_mode(true);
        let mut pkt = Packet::new();
        // Bad checksum is delivered unconditionally, with no nack sent.
        assert!(rsp.get_pkt(&mut pkt));
        assert_eq!(pkt.as_bytes(), b"p0");
        assert_eq!(rsp.conn.sent(), b"");
    }

    #[test]
    fn have_break_latches_break_byte() {
        let mut rsp = stream(b"\x03");
        assert!(rsp.have_break());
        assert!(!rsp.have_break());
    }

    #[test]
    fn have_break_stashes_other_bytes() {
        let mut rsp = stream(b"$p0#a0");
        assert!(!rsp.have_break());
        // The peeked '$' must not be lost.
        let mut pkt = Packet::new();
        assert!(rsp.get_pkt(&mut pkt));
        assert_eq!(pkt.as_bytes(), b"p0");
    }

    #[test]
    fn framing_roundtrip() {
        // Sending a body and re-reading our own bytes yields the body.
        let payloads: [&[u8]; 4] = [b"OK", b"m124,2", b"", b"T05thread:p1.1;"];
        for payload in payloads {
            let mut out = stream(b"+");
            let mut pkt = Packet::new();
            pkt.append(payload);
            assert!(out.put_pkt(&pkt));

            let wire = out.conn.sent().to_vec();
            let mut inp = stream(&wire);
            let mut got = Packet::new();
            assert!(inp.get_pkt(&mut got));
            assert_eq!(got.as_bytes(), payload);
        }
    }

    #[test]
    fn framing_roundtrip_with_escapes() {
        let payload = b"bin}\x03$#*data";
        let mut out = stream(b"+");
        let mut pkt = Packet::new();
        pkt.append(payload);
        assert!(out.put_pkt(&pkt));

        let wire = out.conn.sent().to_vec();
        let mut inp = stream(&wire);
        let mut got = Packet::new();
        assert!(inp.get_pkt(&mut got));
        // The receive side delivers escaped bytes verbatim; unescaping is
        // the command layer's job.
        let mut body = got.as_bytes().to_vec();
        let len = crate::protocol::hex::rsp_unescape(&mut body);
        assert_eq!(&body[..len], payload);
    }
}
