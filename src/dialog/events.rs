use super::dialog::{Status, StopReason};
use super::DialogId;
use crate::sdp::Sdp;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Dialog-level notification argument.
#[derive(Debug, Clone, PartialEq)]
pub enum DialogNotice {
    /// The dialog exists; emitted once, before any other notification.
    Start,
    /// The dialog moved to a new non-terminal status.
    Status(Status),
    /// The remote target changed after the dialog was first established.
    TargetUpdate,
    /// The dialog is over; the reason is already normalized.
    Stop(StopReason),
}

/// Session-level notification argument.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    Start { local_sdp: Sdp, remote_sdp: Sdp },
    Update { local_sdp: Sdp, remote_sdp: Sdp },
    Stop,
}

/// Out-of-band event delivered to the owning application handler.
///
/// Events are emitted synchronously from the call's serialized context, so
/// their order on the channel is exactly the order of the state changes that
/// produced them.
#[derive(Debug, Clone, PartialEq)]
pub enum DialogEvent {
    Dialog { id: DialogId, notice: DialogNotice },
    Session { id: DialogId, notice: SessionNotice },
}

pub type DialogEventSender = UnboundedSender<DialogEvent>;
pub type DialogEventReceiver = UnboundedReceiver<DialogEvent>;

pub(super) fn cast_dialog(sender: &DialogEventSender, id: &DialogId, notice: DialogNotice) {
    sender
        .send(DialogEvent::Dialog {
            id: id.clone(),
            notice,
        })
        .ok();
}

pub(super) fn cast_session(sender: &DialogEventSender, id: &DialogId, notice: SessionNotice) {
    sender
        .send(DialogEvent::Session {
            id: id.clone(),
            notice,
        })
        .ok();
}
