use crate::{Error, Result};
use rsip::prelude::{HeadersExt, UntypedHeader};
use rsip::Response;

pub mod call;
pub mod dialog;
pub mod events;
pub mod status;
pub mod subscription;
pub mod update;

#[cfg(test)]
mod tests;

/// Role a user agent plays for the INVITE transaction that establishes or
/// refreshes a dialog.
///
/// A record-routing proxy that tracks dialogs observes the same messages the
/// UAC does, so it shares the UAC's view of the establishing exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Uac,
    Uas,
    Proxy,
}

impl Role {
    pub(crate) fn is_uac_side(&self) -> bool {
        matches!(self, Role::Uac | Role::Proxy)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Uac => write!(f, "uac"),
            Role::Uas => write!(f, "uas"),
            Role::Proxy => write!(f, "proxy"),
        }
    }
}

/// SIP Dialog Identifier
///
/// Per RFC 3261 a dialog is identified by the Call-ID plus the local and
/// remote tags. Which message tag is "local" depends on the role: the UAC's
/// local tag is the From tag, the UAS's is the To tag. The id is a pure
/// function of the role and the establishing response, so re-deriving it for
/// retransmissions yields the same value.
///
/// During early dialog establishment `remote_tag` may still be empty.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DialogId {
    pub call_id: String,
    pub local_tag: String,
    pub remote_tag: String,
}

impl DialogId {
    pub fn from_response(role: Role, resp: &Response) -> Result<Self> {
        let call_id = resp.call_id_header()?.value().to_string();
        let from_tag = match resp.from_header()?.tag()? {
            Some(tag) => tag.value().to_string(),
            None => return Err(Error::Error("from tag not found".to_string())),
        };
        let to_tag = match resp.to_header()?.tag()? {
            Some(tag) => tag.value().to_string(),
            None => "".to_string(),
        };
        let (local_tag, remote_tag) = if role.is_uac_side() {
            (from_tag, to_tag)
        } else {
            (to_tag, from_tag)
        };
        Ok(DialogId {
            call_id,
            local_tag,
            remote_tag,
        })
    }
}

impl std::fmt::Display for DialogId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.call_id, self.local_tag, self.remote_tag)
    }
}

/// Timer kinds armed per dialog: response retransmission while waiting for
/// an ACK, and the inactivity timeout covering every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Retrans,
    Timeout,
}

impl std::fmt::Display for TimerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimerKind::Retrans => write!(f, "retrans"),
            TimerKind::Timeout => write!(f, "timeout"),
        }
    }
}

/// Value stored in the timer queue; delivered back to the dispatcher when
/// it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogTimer {
    pub kind: TimerKind,
    pub dialog_id: DialogId,
}
