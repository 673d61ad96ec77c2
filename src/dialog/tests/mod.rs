//! Dialog layer tests
//!
//! Shared builders for INVITE requests/responses and a mock transport; the
//! scenarios live in the `test_*` modules.

use crate::config::CallConfig;
use crate::dialog::call::Call;
use crate::dialog::events::{DialogEvent, DialogEventReceiver};
use crate::dialog::{DialogId, DialogTimer};
use crate::timer::TimerQueue;
use crate::transport::SipTransport;
use async_trait::async_trait;
use rsip::headers::*;
use rsip::{Request, Response, StatusCode};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::unbounded_channel;

mod test_timers;

pub(super) const OFFER_SDP: &str =
    "v=0\r\no=alice 2890844526 2890844526 IN IP4 host.atlanta.com\r\ns=-\r\n";
pub(super) const ANSWER_SDP: &str =
    "v=0\r\no=bob 2890844527 2890844527 IN IP4 host.biloxi.com\r\ns=-\r\n";

pub(super) struct MockTransport {
    local_hosts: Vec<String>,
    pub resent: AtomicUsize,
    pub fail_resend: AtomicBool,
}

impl MockTransport {
    pub fn new(local_hosts: &[&str]) -> Arc<Self> {
        Arc::new(MockTransport {
            local_hosts: local_hosts.iter().map(|h| h.to_string()).collect(),
            resent: AtomicUsize::new(0),
            fail_resend: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl SipTransport for MockTransport {
    fn is_local(&self, _app_id: &str, uri: &rsip::Uri) -> bool {
        let host = uri.host_with_port.host.to_string();
        self.local_hosts.iter().any(|local| *local == host)
    }

    async fn resend_response(
        &self,
        _response: &Response,
        _dialog_id: &DialogId,
    ) -> crate::Result<()> {
        if self.fail_resend.load(Ordering::Relaxed) {
            return Err(crate::Error::TransportError(
                "connection refused".to_string(),
            ));
        }
        self.resent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

pub(super) fn test_call(transport: Arc<MockTransport>) -> (Call, DialogEventReceiver) {
    let (sender, receiver) = unbounded_channel();
    let call = Call::new(
        "app",
        "test-call-id-123",
        CallConfig::default(),
        Arc::new(TimerQueue::new()),
        sender,
        transport,
    );
    (call, receiver)
}

/// Mock INVITE request in the shape the transaction layer stores it.
pub(super) fn invite_request(from_tag: &str, to_tag: &str, call_id: &str) -> Request {
    let to = if to_tag.is_empty() {
        "Bob <sip:bob@example.com>".to_string()
    } else {
        format!("Bob <sip:bob@example.com>;tag={}", to_tag)
    };
    Request {
        method: rsip::Method::Invite,
        uri: rsip::Uri::try_from("sip:bob@example.com:5060").unwrap(),
        headers: vec![
            Via::new("SIP/2.0/UDP alice.example.com:5060;branch=z9hG4bKnashds").into(),
            CSeq::new("1 INVITE").into(),
            From::new(&format!("Alice <sip:alice@example.com>;tag={}", from_tag)).into(),
            To::new(&to).into(),
            CallId::new(call_id).into(),
            Contact::new("<sip:alice@alice.example.com:5060>").into(),
            MaxForwards::new("70").into(),
        ]
        .into(),
        version: rsip::Version::V2,
        body: OFFER_SDP.as_bytes().to_vec(),
    }
}

/// Mock response for the INVITE above.
pub(super) fn invite_response(
    status: StatusCode,
    from_tag: &str,
    to_tag: &str,
    call_id: &str,
    contact: Option<&str>,
    body: &[u8],
) -> Response {
    let from = if from_tag.is_empty() {
        "Alice <sip:alice@example.com>".to_string()
    } else {
        format!("Alice <sip:alice@example.com>;tag={}", from_tag)
    };
    let to = if to_tag.is_empty() {
        "Bob <sip:bob@example.com>".to_string()
    } else {
        format!("Bob <sip:bob@example.com>;tag={}", to_tag)
    };
    let mut headers: Vec<rsip::Header> = vec![
        Via::new("SIP/2.0/UDP alice.example.com:5060;branch=z9hG4bKnashds").into(),
        CSeq::new("1 INVITE").into(),
        From::new(&from).into(),
        To::new(&to).into(),
        CallId::new(call_id).into(),
    ];
    if let Some(contact) = contact {
        headers.push(Contact::new(contact).into());
    }
    Response {
        status_code: status,
        version: rsip::Version::V2,
        headers: headers.into(),
        body: body.to_vec(),
    }
}

pub(super) fn with_record_routes(mut resp: Response, hops: &[&str]) -> Response {
    for hop in hops {
        resp.headers.push(RecordRoute::new(*hop).into());
    }
    resp
}

pub(super) fn drain(receiver: &mut DialogEventReceiver) -> Vec<DialogEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

pub(super) fn host_of(uri: &rsip::Uri) -> String {
    uri.host_with_port.host.to_string()
}
