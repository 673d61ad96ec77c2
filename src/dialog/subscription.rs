use super::dialog::Dialog;
use std::time::Instant;
use tracing::debug;

/// Event subscription sharing a dialog's identity (an RFC 6665 usage).
/// Identified by its event id within the owning dialog.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: String,
    pub event: String,
    pub status: SubscriptionStatus,
    pub created: Instant,
    pub updated: Instant,
}

impl Subscription {
    pub fn new(id: impl Into<String>, event: impl Into<String>, status: SubscriptionStatus) -> Self {
        let now = Instant::now();
        Subscription {
            id: id.into(),
            event: event.into(),
            status,
            created: now,
            updated: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Active,
    Pending,
    Terminated(SubTerminatedReason),
}

impl SubscriptionStatus {
    pub fn is_terminated(&self) -> bool {
        matches!(self, SubscriptionStatus::Terminated(_))
    }
}

/// RFC 6665 §4.1.3 termination reasons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubTerminatedReason {
    Deactivated,
    Probation,
    Rejected,
    Timeout,
    GiveUp,
    NoResource,
    Other(String),
}

impl Dialog {
    pub fn find_sub(&self, event_id: &str) -> Option<&Subscription> {
        self.subs.iter().find(|sub| sub.id == event_id)
    }

    /// Write a subscription back into the dialog. The most recently touched
    /// subscription is usually at the head of the list, so that slot is
    /// checked before scanning. A terminated subscription is removed instead
    /// of stored.
    pub fn store_sub(&mut self, sub: Subscription) {
        let terminated = sub.status.is_terminated();
        if self.subs.first().map(|s| s.id == sub.id).unwrap_or(false) {
            if terminated {
                debug!(id = %self.id, event_id = %sub.id, "subscription removed");
                self.subs.remove(0);
            } else {
                self.subs[0] = sub;
            }
            return;
        }
        match self.subs.iter().position(|s| s.id == sub.id) {
            Some(pos) => {
                if terminated {
                    debug!(id = %self.id, event_id = %sub.id, "subscription removed");
                    self.subs.remove(pos);
                } else {
                    self.subs[pos] = sub;
                }
            }
            None => {
                if !terminated {
                    self.subs.insert(0, sub);
                }
            }
        }
    }
}
