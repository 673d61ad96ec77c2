use super::dialog::{self, Dialog, Status};
use super::events::DialogEventSender;
use super::{DialogId, DialogTimer, Role};
use crate::config::CallConfig;
use crate::timer::TimerQueue;
use crate::transport::SipTransport;
use crate::{Error, Result};
use rsip::{Request, Response};
use std::sync::Arc;
use tracing::debug;

/// Hint to the outer scheduler that the call state just shrank or settled
/// and is worth compacting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Hibernate {
    #[default]
    None,
    DialogStop,
    DialogConfirmed,
}

/// One call: the dialogs sharing a Call-ID, in most-recently-used order,
/// plus the collaborators the dialog layer needs (timer queue, notifier,
/// transport view).
///
/// All mutation of a call happens from a single serialized context; the
/// collaborators are shared handles and safe to touch from there.
pub struct Call {
    pub app_id: String,
    pub call_id: String,
    pub dialogs: Vec<Dialog>,
    pub hibernate: Hibernate,
    pub config: CallConfig,
    pub timers: Arc<TimerQueue<DialogTimer>>,
    pub events: DialogEventSender,
    pub transport: Arc<dyn SipTransport>,
}

impl Call {
    pub fn new(
        app_id: impl Into<String>,
        call_id: impl Into<String>,
        config: CallConfig,
        timers: Arc<TimerQueue<DialogTimer>>,
        events: DialogEventSender,
        transport: Arc<dyn SipTransport>,
    ) -> Self {
        Call {
            app_id: app_id.into(),
            call_id: call_id.into(),
            dialogs: Vec::new(),
            hibernate: Hibernate::None,
            config,
            timers,
            events,
            transport,
        }
    }

    /// Create a dialog from the establishing exchange and insert it at the
    /// head of the list. Exactly one dialog may exist per id.
    ///
    /// The new dialog carries no armed timers yet: follow up with
    /// [`status_update`](super::status::status_update) (with
    /// [`Status::Init`](super::dialog::Status) when no establishing response
    /// has been processed yet) to arm the inactivity timeout, then
    /// [`store`](Call::store) the result. Skipping that step leaves the
    /// dialog in `init` forever, with no `stop(timeout)` transition to
    /// reclaim it.
    pub fn create_dialog(&mut self, role: Role, req: &Request, resp: &Response) -> Result<DialogId> {
        let dialog = dialog::create(role, req, resp, &self.app_id)?;
        let id = dialog.id.clone();
        if self.find(&id).is_some() {
            dialog::dec_active_dialogs();
            return Err(Error::DialogError("dialog already exists".to_string(), id));
        }
        self.dialogs.insert(0, dialog);
        Ok(id)
    }

    pub fn find(&self, id: &DialogId) -> Option<&Dialog> {
        self.dialogs.iter().find(|dialog| dialog.id == *id)
    }

    pub fn find_mut(&mut self, id: &DialogId) -> Option<&mut Dialog> {
        self.dialogs.iter_mut().find(|dialog| dialog.id == *id)
    }

    /// Write a dialog back into the call.
    ///
    /// The dialog being stored is usually the one whose transaction just
    /// progressed, which is the head of the list, so that slot is checked
    /// before scanning by id. A stopped dialog is removed instead of stored;
    /// removal or confirmation of the head also records the hibernate hint
    /// the outer scheduler uses to compact call state.
    pub fn store(&mut self, dialog: Dialog) {
        let stopped = dialog.status.is_stop();
        let confirmed = dialog.status == Status::Confirmed;
        if self.dialogs.first().map(|d| d.id == dialog.id).unwrap_or(false) {
            if stopped {
                debug!(id = %dialog.id, "dialog removed");
                self.dialogs.remove(0);
                self.hibernate = Hibernate::DialogStop;
            } else {
                if confirmed {
                    self.hibernate = Hibernate::DialogConfirmed;
                }
                self.dialogs[0] = dialog;
            }
            return;
        }
        match self.dialogs.iter().position(|d| d.id == dialog.id) {
            Some(pos) => {
                if stopped {
                    debug!(id = %dialog.id, "dialog removed");
                    self.dialogs.remove(pos);
                } else {
                    if confirmed {
                        self.hibernate = Hibernate::DialogConfirmed;
                    }
                    self.dialogs[pos] = dialog;
                }
            }
            None => {
                if !stopped {
                    if confirmed {
                        self.hibernate = Hibernate::DialogConfirmed;
                    }
                    self.dialogs.insert(0, dialog);
                }
            }
        }
    }

    /// Read and reset the hibernate hint.
    pub fn take_hibernate(&mut self) -> Hibernate {
        std::mem::take(&mut self.hibernate)
    }
}
