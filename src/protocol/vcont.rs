//! Decoding of `vCont` action lists.
//!
//! A `vCont` packet carries `;action[:ptid]` groups, e.g.
//! `vCont;c:p1.-1;s:p2.1`. Actions apply to the first matching ptid in
//! list order, which is how GDB expresses "step this core, leave the rest
//! alone".

use log::warn;

use crate::protocol::ptid::{Ptid, PTID_ALL, PTID_ANY};

/// The parsed, ordered action list of a `vCont` packet.
#[derive(Debug, Clone)]
pub struct VContActions {
    /// Action token (e.g. `c`, `C05`, `s`) paired with the ptid it applies
    /// to. Tokens are kept whole; only the leading letter matters for
    /// resolution, signals are currently ignored.
    actions: Vec<(Vec<u8>, Ptid)>,
}

impl VContActions {
    /// Parse the tail of a `vCont` packet (everything after the `vCont`
    /// prefix, including the leading `;`).
    ///
    /// Returns `None` on any malformed group, a missing action list, or a
    /// ptid with pid = 0 (ANY), which has no meaning when resuming.
    pub fn parse(body: &[u8]) -> Option<VContActions> {
        let body = body.strip_prefix(b";")?;

        let mut actions = Vec::new();
        for group in body.split(|b| *b == b';') {
            if group.is_empty() {
                continue;
            }

            let (token, ptid) = match group.iter().position(|b| *b == b':') {
                None => (group.to_vec(), Ptid::new(PTID_ALL, PTID_ALL)),
                Some(colon) => {
                    let base = Ptid::new(PTID_ALL, PTID_ALL);
                    let ptid = base.decode(&group[colon + 1..])?;
                    if ptid.pid() == PTID_ANY {
                        warn!(
                            "found pid == 0 in vCont '{}'",
                            String::from_utf8_lossy(body)
                        );
                        return None;
                    }
                    (group[..colon].to_vec(), ptid)
                }
            };

            actions.push((token, ptid));
        }

        if actions.is_empty() {
            return None;
        }
        Some(VContActions { actions })
    }

    /// The action letter applying to the core with the given pid: the first
    /// action whose ptid names that pid, or all pids. `None` if no action
    /// applies.
    pub fn core_action(&self, pid: u32) -> Option<u8> {
        for (token, ptid) in &self.actions {
            if ptid.pid() == PTID_ALL || ptid.pid() == i64::from(pid) {
                return token.first().copied();
            }
        }
        None
    }
}
