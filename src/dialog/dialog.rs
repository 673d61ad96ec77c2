use super::subscription::Subscription;
use super::{DialogId, Role};
use crate::sdp::Sdp;
use crate::timer::TimerHandle;
use crate::{Error, Result};
use rsip::prelude::{HeadersExt, ToTypedHeader, UntypedHeader};
use rsip::{Request, Response};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

static ACTIVE_DIALOGS: AtomicU64 = AtomicU64::new(0);

/// Number of live dialogs in this process. Incremented on create,
/// decremented when a dialog reaches its stop status.
pub fn active_dialog_count() -> u64 {
    ACTIVE_DIALOGS.load(Ordering::Relaxed)
}

pub(super) fn inc_active_dialogs() {
    ACTIVE_DIALOGS.fetch_add(1, Ordering::Relaxed);
}

pub(super) fn dec_active_dialogs() {
    ACTIVE_DIALOGS.fetch_sub(1, Ordering::Relaxed);
}

/// SIP Dialog Status
///
/// The proceeding and accepted phases are role-specific: the side that sent
/// the INVITE goes through the `Uac` variants, the side that answers it
/// through the `Uas` variants. `Stop` carries the reason the dialog ended so
/// that "any stop" branches stay a single pattern.
///
/// ```text
/// init → proceeding_uac/uas → accepted_uac/uas → confirmed → bye → stop
///   └───────────────────────────────────────────────────────────────┘
///                     (timeout from any non-terminal state)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Init,
    ProceedingUac,
    ProceedingUas,
    AcceptedUac,
    AcceptedUas,
    Confirmed,
    Bye,
    Stop(StopReason),
}

impl Status {
    pub fn is_stop(&self) -> bool {
        matches!(self, Status::Stop(_))
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Status::AcceptedUac | Status::AcceptedUas)
    }

    /// The transaction role encoded in the proceeding/accepted phases.
    pub fn class(&self) -> Option<Role> {
        match self {
            Status::ProceedingUac | Status::AcceptedUac => Some(Role::Uac),
            Status::ProceedingUas | Status::AcceptedUas => Some(Role::Uas),
            _ => None,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Init => write!(f, "init"),
            Status::ProceedingUac => write!(f, "proceeding_uac"),
            Status::ProceedingUas => write!(f, "proceeding_uas"),
            Status::AcceptedUac => write!(f, "accepted_uac"),
            Status::AcceptedUas => write!(f, "accepted_uas"),
            Status::Confirmed => write!(f, "confirmed"),
            Status::Bye => write!(f, "bye"),
            Status::Stop(reason) => write!(f, "stop({})", reason),
        }
    }
}

/// Why a dialog stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Busy,
    Cancelled,
    ServiceUnavailable,
    Declined,
    Timeout,
    AckTimeout,
    Code(u16),
}

impl StopReason {
    /// Collapse well-known SIP status codes into their symbolic reasons;
    /// anything else passes through numerically.
    pub fn from_code(code: u16) -> Self {
        match code {
            486 => StopReason::Busy,
            487 => StopReason::Cancelled,
            503 => StopReason::ServiceUnavailable,
            603 => StopReason::Declined,
            _ => StopReason::Code(code),
        }
    }

    pub(super) fn normalize(self) -> Self {
        match self {
            StopReason::Code(code) => StopReason::from_code(code),
            other => other,
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Busy => write!(f, "busy"),
            StopReason::Cancelled => write!(f, "cancelled"),
            StopReason::ServiceUnavailable => write!(f, "service_unavailable"),
            StopReason::Declined => write!(f, "declined"),
            StopReason::Timeout => write!(f, "timeout"),
            StopReason::AckTimeout => write!(f, "ack_timeout"),
            StopReason::Code(code) => write!(f, "{}", code),
        }
    }
}

/// Which side produced a pending offer or answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Local,
    Remote,
}

/// Message that carried a pending offer or answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpSource {
    Request,
    Response,
    Ack,
}

/// A pending offer or answer: who sent it, in which message, and the SDP
/// itself.
#[derive(Debug, Clone, PartialEq)]
pub struct SdpSlot {
    pub party: Party,
    pub source: SdpSource,
    pub sdp: Sdp,
}

/// State of one RFC 3261 dialog.
///
/// The record is treated as a value: state-machine calls take a dialog, make
/// a new version, and hand it back to the call store. The owning transaction
/// layer maintains the `invite_*` slots as the INVITE exchange progresses and
/// fills `sdp_offer`/`sdp_answer` as bodies arrive; everything else is
/// maintained by the status and update functions in this module tree.
///
/// Targets start out as the `invalid.invalid` sentinel until the first
/// Contact is adopted, which lets target refresh distinguish "first
/// population" from a genuine change worth notifying about.
#[derive(Debug, Clone)]
pub struct Dialog {
    pub id: DialogId,
    pub app_id: String,
    pub call_id: String,

    pub created: Instant,
    pub updated: Instant,
    pub answered: Option<Instant>,

    pub status: Status,
    pub local_seq: u32,
    pub remote_seq: u32,
    pub local_uri: rsip::Uri,
    pub remote_uri: rsip::Uri,
    pub local_target: rsip::Uri,
    pub remote_target: rsip::Uri,
    pub route_set: Vec<rsip::Uri>,
    pub secure: bool,
    pub early: bool,
    pub caller_tag: String,

    pub local_sdp: Option<Sdp>,
    pub remote_sdp: Option<Sdp>,
    pub media_started: bool,
    pub sdp_offer: Option<SdpSlot>,
    pub sdp_answer: Option<SdpSlot>,

    pub invite_req: Option<Request>,
    pub invite_resp: Option<Response>,
    pub invite_class: Option<Role>,
    pub ack_req: Option<Request>,

    pub retrans_timer: Option<TimerHandle>,
    pub timeout_timer: Option<TimerHandle>,
    pub next_retrans: Option<Duration>,

    pub stop_reason: Option<StopReason>,
    pub subs: Vec<Subscription>,
}

/// Create a fresh dialog from the establishing request and the first
/// response that carries a dialog-forming tag.
///
/// CSeq counters and From/To URIs are assigned by role: the UAC starts with
/// its own CSeq as `local_seq` and learns the remote one later, the UAS the
/// other way around. `secure` is decided once, here: the Request-URI must be
/// `sips` and the request must have arrived over TLS.
///
/// The returned dialog has no timers armed. The caller must follow up with
/// [`status_update`](super::status::status_update) — passing
/// [`Status::Init`] when no establishing response has been processed yet —
/// so the inactivity timeout gets armed. A dialog left in `init` without
/// that call never stops with `timeout` and keeps its slot in the dialog
/// counter.
pub fn create(role: Role, req: &Request, resp: &Response, app_id: &str) -> Result<Dialog> {
    let id = DialogId::from_response(role, resp)?;
    let cseq = req.cseq_header()?.seq()?;
    let from_uri = req.from_header()?.typed()?.uri;
    let to_uri = req.to_header()?.typed()?.uri;
    let caller_tag = match req.from_header()?.tag()? {
        Some(tag) => tag.value().to_string(),
        None => return Err(Error::Error("from tag not found".to_string())),
    };
    let (local_seq, remote_seq, local_uri, remote_uri) = if role.is_uac_side() {
        (cseq, 0, from_uri, to_uri)
    } else {
        (0, cseq, to_uri, from_uri)
    };

    let now = Instant::now();
    inc_active_dialogs();
    debug!(id = %id, role = %role, "dialog created");

    Ok(Dialog {
        call_id: id.call_id.clone(),
        id,
        app_id: app_id.to_string(),
        created: now,
        updated: now,
        answered: None,
        status: Status::Init,
        local_seq,
        remote_seq,
        local_uri,
        remote_uri,
        local_target: sentinel_target(),
        remote_target: sentinel_target(),
        route_set: Vec::new(),
        secure: is_secure(req),
        early: true,
        caller_tag,
        local_sdp: None,
        remote_sdp: None,
        media_started: false,
        sdp_offer: None,
        sdp_answer: None,
        invite_req: Some(req.clone()),
        invite_resp: None,
        invite_class: Some(role),
        ack_req: None,
        retrans_timer: None,
        timeout_timer: None,
        next_retrans: None,
        stop_reason: None,
        subs: Vec::new(),
    })
}

impl Dialog {
    /// True while the remote target still holds the creation sentinel.
    pub fn remote_target_is_unset(&self) -> bool {
        is_sentinel(&self.remote_target)
    }
}

const SENTINEL_DOMAIN: &str = "invalid.invalid";

pub(super) fn sentinel_target() -> rsip::Uri {
    rsip::Uri {
        scheme: Some(rsip::Scheme::Sip),
        host_with_port: rsip::HostWithPort {
            host: rsip::Host::Domain(SENTINEL_DOMAIN.to_string().into()),
            port: None,
        },
        ..Default::default()
    }
}

pub(super) fn is_sentinel(uri: &rsip::Uri) -> bool {
    uri.host_with_port.host.to_string() == SENTINEL_DOMAIN
}

fn is_secure(req: &Request) -> bool {
    let sips = matches!(req.uri.scheme, Some(rsip::Scheme::Sips));
    let tls = req
        .via_header()
        .ok()
        .and_then(|via| via.typed().ok())
        .map(|via| via.transport == rsip::transport::Transport::Tls)
        .unwrap_or(false);
    sips && tls
}
