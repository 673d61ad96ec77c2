use super::call::Call;
use super::dialog::{dec_active_dialogs, Dialog, Status, StopReason};
use super::events::{cast_dialog, cast_session, DialogNotice, SessionNotice};
use super::update::{route_update, session_update, target_update};
use super::{DialogId, DialogTimer, Role, TimerKind};
use crate::timer::TimerHandle;
use std::time::Instant;
use tracing::{debug, warn};

/// Drive a dialog to a new status.
///
/// This is the single entry point the transaction layer uses once it has
/// matched a request or response to a dialog: it emits the application
/// notifications, re-arms the inactivity timeout, runs the route, target and
/// session refreshes appropriate for the new status, and hands back the new
/// version of the dialog for storing.
///
/// A dialog that already stopped is never mutated again; the call is logged
/// and the record returned unchanged.
pub fn status_update(new_status: Status, mut dialog: Dialog, call: &Call) -> Dialog {
    if dialog.status.is_stop() {
        warn!(
            id = %dialog.id,
            "dialog already stopped, ignoring transition to {}", new_status
        );
        return dialog;
    }
    if dialog.status == Status::Init {
        cast_dialog(&call.events, &dialog.id, DialogNotice::Start);
    }

    // cancelling also drains a fire that is queued but not yet dispatched
    if let Some(handle) = dialog.retrans_timer.take() {
        call.timers.cancel(handle);
    }
    if let Some(handle) = dialog.timeout_timer.take() {
        call.timers.cancel(handle);
    }

    let old_status = dialog.status.clone();
    match new_status {
        Status::Stop(reason) => {
            let reason = reason.normalize();
            debug!(id = %dialog.id, "transitioning status: {} -> stop({})", old_status, reason);
            cast_dialog(&call.events, &dialog.id, DialogNotice::Stop(reason.clone()));
            dialog.stop_reason = Some(reason.clone());
            dialog.status = Status::Stop(reason);
        }
        new_status => {
            if new_status != old_status {
                debug!(id = %dialog.id, "transitioning status: {} -> {}", old_status, new_status);
                cast_dialog(
                    &call.events,
                    &dialog.id,
                    DialogNotice::Status(new_status.clone()),
                );
            }
            dialog.status = new_status;
            dialog.timeout_timer = Some(start_timer(call, TimerKind::Timeout, &dialog.id));
        }
    }
    dialog.updated = Instant::now();

    if dialog.media_started && matches!(dialog.status, Status::Bye | Status::Stop(_)) {
        cast_session(&call.events, &dialog.id, SessionNotice::Stop);
        dialog.media_started = false;
    }

    match dialog.status.clone() {
        Status::ProceedingUac | Status::AcceptedUac => {
            route_update(Role::Uac, &mut dialog, call);
            target_update(Role::Uac, &mut dialog, call);
            session_update(&mut dialog, call);
        }
        Status::ProceedingUas => {
            route_update(Role::Uas, &mut dialog, call);
            target_update(Role::Uas, &mut dialog, call);
            session_update(&mut dialog, call);
        }
        Status::AcceptedUas => {
            route_update(Role::Uas, &mut dialog, call);
            target_update(Role::Uas, &mut dialog, call);
            session_update(&mut dialog, call);
            dialog.retrans_timer = Some(start_retrans(call, call.config.t1, &dialog.id));
            dialog.next_retrans = Some(2 * call.config.t1);
        }
        Status::Confirmed => {
            session_update(&mut dialog, call);
            dialog.invite_req = None;
            dialog.invite_resp = None;
            dialog.invite_class = None;
        }
        Status::Bye => {}
        Status::Stop(_) => {
            dec_active_dialogs();
        }
        Status::Init => {}
    }
    dialog
}

fn start_timer(call: &Call, kind: TimerKind, id: &DialogId) -> TimerHandle {
    call.timers.start(
        call.config.dialog_timeout,
        DialogTimer {
            kind,
            dialog_id: id.clone(),
        },
    )
}

fn start_retrans(call: &Call, after: std::time::Duration, id: &DialogId) -> TimerHandle {
    call.timers.start(
        after,
        DialogTimer {
            kind: TimerKind::Retrans,
            dialog_id: id.clone(),
        },
    )
}

/// Map a fired timer back into a state-machine input.
///
/// Fires are matched against the handle the dialog currently has armed, so
/// an event that raced with a cancel (or outlived its dialog) is dropped
/// here instead of acting on stale state.
pub async fn timer(handle: TimerHandle, fired: DialogTimer, call: &mut Call) {
    let DialogTimer { kind, dialog_id } = fired;
    match kind {
        TimerKind::Retrans => retrans_fired(handle, dialog_id, call).await,
        TimerKind::Timeout => timeout_fired(handle, dialog_id, call),
    }
}

async fn retrans_fired(handle: TimerHandle, id: DialogId, call: &mut Call) {
    let (response, next) = match call.find(&id) {
        Some(dialog)
            if dialog.status == Status::AcceptedUas && dialog.retrans_timer == Some(handle) =>
        {
            match dialog.invite_resp.clone() {
                Some(response) => (
                    response,
                    dialog.next_retrans.unwrap_or(call.config.t1),
                ),
                None => {
                    warn!(id = %id, "retransmission timer fired without a stored response");
                    return;
                }
            }
        }
        Some(_) => {
            debug!(id = %id, "stale retransmission timer, dropping");
            return;
        }
        None => {
            debug!(id = %id, "retransmission timer for unknown dialog, dropping");
            return;
        }
    };

    match call.transport.resend_response(&response, &id).await {
        Ok(()) => {
            let t2 = call.config.t2;
            let new_handle = call.timers.start(
                next,
                DialogTimer {
                    kind: TimerKind::Retrans,
                    dialog_id: id.clone(),
                },
            );
            match call.find_mut(&id) {
                Some(dialog) => {
                    dialog.retrans_timer = Some(new_handle);
                    dialog.next_retrans = Some((next * 2).min(t2));
                }
                None => {
                    call.timers.cancel(new_handle);
                }
            }
        }
        Err(e) => {
            warn!(id = %id, "response retransmission failed: {}", e);
            force_stop(StopReason::AckTimeout, id, call);
        }
    }
}

fn timeout_fired(handle: TimerHandle, id: DialogId, call: &mut Call) {
    let reason = match call.find(&id) {
        Some(dialog) if dialog.timeout_timer == Some(handle) => {
            if dialog.status.is_accepted() {
                StopReason::AckTimeout
            } else {
                StopReason::Timeout
            }
        }
        Some(_) => {
            debug!(id = %id, "stale timeout timer, dropping");
            return;
        }
        None => {
            debug!(id = %id, "timeout timer for unknown dialog, dropping");
            return;
        }
    };
    warn!(id = %id, reason = %reason, "dialog timed out");
    force_stop(reason, id, call);
}

fn force_stop(reason: StopReason, id: DialogId, call: &mut Call) {
    if let Some(dialog) = call.find(&id).cloned() {
        let dialog = status_update(Status::Stop(reason), dialog, call);
        call.store(dialog);
    }
}
