use super::*;
use crate::dialog::call::Hibernate;
use crate::dialog::dialog::{Status, StopReason};
use crate::dialog::events::DialogNotice;
use crate::dialog::status::{status_update, timer};
use crate::dialog::{Role, TimerKind};
use std::time::{Duration, Instant};

fn accepted_uas(call: &mut Call, call_id: &str) -> crate::dialog::DialogId {
    let req = invite_request("a", "", call_id);
    let resp = invite_response(
        StatusCode::OK,
        "a",
        "b",
        call_id,
        Some("<sip:bob@bob.example.com:5060>"),
        ANSWER_SDP.as_bytes(),
    );
    let id = call.create_dialog(Role::Uas, &req, &resp).unwrap();
    let mut dialog = call.find(&id).unwrap().clone();
    dialog.invite_resp = Some(resp);
    let dialog = status_update(Status::AcceptedUas, dialog, call);
    call.store(dialog);
    id
}

fn poll_one(call: &mut Call, kind: TimerKind) -> (u64, crate::dialog::DialogTimer) {
    let due: Vec<_> = call
        .timers
        .poll(Instant::now() + Duration::from_secs(86400))
        .into_iter()
        .filter(|(_, t)| t.kind == kind)
        .collect();
    assert_eq!(due.len(), 1, "expected exactly one {} fire", kind);
    due.into_iter().next().unwrap()
}

#[tokio::test]
async fn test_retransmission_backoff_and_exhaust() {
    let transport = MockTransport::new(&[]);
    let (mut call, mut rx) = test_call(transport.clone());
    // keep the inactivity timeout far away from the polling horizon
    call.config.dialog_timeout = Duration::from_secs(86400 * 30);

    let id = accepted_uas(&mut call, "tm-1");
    assert_eq!(
        call.find(&id).unwrap().next_retrans,
        Some(Duration::from_millis(1000))
    );
    drain(&mut rx);

    // arm periods double from T1 up to the T2 ceiling: the re-arm interval
    // for fire n is next_retrans as left by fire n-1
    let expected_next = [
        2000u64, 4000, 4000, 4000, 4000, 4000, 4000, 4000, 4000, 4000,
    ];
    for (n, expected) in expected_next.iter().enumerate() {
        let (handle, fired) = poll_one(&mut call, TimerKind::Retrans);
        timer(handle, fired, &mut call).await;
        assert_eq!(
            call.find(&id).unwrap().next_retrans,
            Some(Duration::from_millis(*expected)),
            "after firing {}",
            n + 1
        );
    }
    assert_eq!(transport.resent.load(std::sync::atomic::Ordering::Relaxed), 10);
    assert!(drain(&mut rx).is_empty());

    // a failed resend gives up on the ACK
    transport
        .fail_resend
        .store(true, std::sync::atomic::Ordering::Relaxed);
    let (handle, fired) = poll_one(&mut call, TimerKind::Retrans);
    timer(handle, fired, &mut call).await;

    assert!(call.find(&id).is_none());
    assert_eq!(call.hibernate, Hibernate::DialogStop);
    let events = drain(&mut rx);
    assert_eq!(
        events,
        vec![DialogEvent::Dialog {
            id: id.clone(),
            notice: DialogNotice::Stop(StopReason::AckTimeout)
        }]
    );
    assert!(call.timers.is_empty());
}

#[tokio::test]
async fn test_timeout_while_accepted_is_ack_timeout() {
    let (mut call, mut rx) = test_call(MockTransport::new(&[]));
    let req = invite_request("a", "", "tm-2");
    let resp = invite_response(
        StatusCode::OK,
        "a",
        "b",
        "tm-2",
        Some("<sip:bob@bob.example.com:5060>"),
        b"",
    );
    let id = call.create_dialog(Role::Uac, &req, &resp).unwrap();
    let mut dialog = call.find(&id).unwrap().clone();
    dialog.invite_resp = Some(resp);
    let dialog = status_update(Status::AcceptedUac, dialog, &call);
    call.store(dialog);
    drain(&mut rx);

    let (handle, fired) = poll_one(&mut call, TimerKind::Timeout);
    timer(handle, fired, &mut call).await;

    assert!(call.find(&id).is_none());
    assert_eq!(call.take_hibernate(), Hibernate::DialogStop);
    let events = drain(&mut rx);
    assert_eq!(
        events,
        vec![DialogEvent::Dialog {
            id: id.clone(),
            notice: DialogNotice::Stop(StopReason::AckTimeout)
        }]
    );
}

#[tokio::test]
async fn test_timeout_while_proceeding_is_timeout() {
    let (mut call, mut rx) = test_call(MockTransport::new(&[]));
    let req = invite_request("a", "", "tm-3");
    let resp = invite_response(StatusCode::Ringing, "a", "b", "tm-3", None, b"");
    let id = call.create_dialog(Role::Uac, &req, &resp).unwrap();
    let mut dialog = call.find(&id).unwrap().clone();
    dialog.invite_resp = Some(resp);
    let dialog = status_update(Status::ProceedingUac, dialog, &call);
    call.store(dialog);
    drain(&mut rx);

    let (handle, fired) = poll_one(&mut call, TimerKind::Timeout);
    timer(handle, fired, &mut call).await;

    assert!(call.find(&id).is_none());
    let events = drain(&mut rx);
    assert_eq!(
        events,
        vec![DialogEvent::Dialog {
            id: id.clone(),
            notice: DialogNotice::Stop(StopReason::Timeout)
        }]
    );
}

#[tokio::test]
async fn test_timeout_never_received_response() {
    // a dialog that stays in init until the timeout stops it
    let (mut call, mut rx) = test_call(MockTransport::new(&[]));
    let req = invite_request("a", "", "tm-4");
    let resp = invite_response(StatusCode::Ringing, "a", "b", "tm-4", None, b"");
    let id = call.create_dialog(Role::Uac, &req, &resp).unwrap();
    let dialog = call.find(&id).unwrap().clone();
    // the transaction layer re-enters with init to arm the timeout
    let dialog = status_update(Status::Init, dialog, &call);
    call.store(dialog);
    drain(&mut rx);

    let (handle, fired) = poll_one(&mut call, TimerKind::Timeout);
    timer(handle, fired, &mut call).await;
    assert!(call.find(&id).is_none());
    // the stop transition still sees status init, so the dialog is
    // announced again before the stop notice
    let events = drain(&mut rx);
    assert_eq!(
        events,
        vec![
            DialogEvent::Dialog {
                id: id.clone(),
                notice: DialogNotice::Start
            },
            DialogEvent::Dialog {
                id: id.clone(),
                notice: DialogNotice::Stop(StopReason::Timeout)
            },
        ]
    );
}

#[tokio::test]
async fn test_stale_retrans_fire_dropped() {
    let transport = MockTransport::new(&[]);
    let (mut call, mut rx) = test_call(transport.clone());
    let id = accepted_uas(&mut call, "tm-5");
    let old_handle = call.find(&id).unwrap().retrans_timer.unwrap();

    // confirming cancels and drains the armed retransmission timer
    let dialog = call.find(&id).unwrap().clone();
    let dialog = status_update(Status::Confirmed, dialog, &call);
    call.store(dialog);
    assert_eq!(call.timers.len(), 1);
    drain(&mut rx);

    // replay the old fire anyway: it must be recognized as stale
    timer(
        old_handle,
        crate::dialog::DialogTimer {
            kind: TimerKind::Retrans,
            dialog_id: id.clone(),
        },
        &mut call,
    )
    .await;

    assert_eq!(transport.resent.load(std::sync::atomic::Ordering::Relaxed), 0);
    assert_eq!(call.find(&id).unwrap().status, Status::Confirmed);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_fire_for_unknown_dialog_dropped() {
    let (mut call, mut rx) = test_call(MockTransport::new(&[]));
    timer(
        99,
        crate::dialog::DialogTimer {
            kind: TimerKind::Timeout,
            dialog_id: crate::dialog::DialogId {
                call_id: "nope".to_string(),
                local_tag: "x".to_string(),
                remote_tag: "y".to_string(),
            },
        },
        &mut call,
    )
    .await;
    assert!(drain(&mut rx).is_empty());
}
