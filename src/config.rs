use std::time::Duration;

/// Timer constants scoped to one call.
///
/// `t1` and `t2` are the RFC 3261 base retransmission interval and its
/// ceiling. `dialog_timeout` bounds how long a dialog may sit in any
/// non-terminal state without progress before it is stopped.
#[derive(Debug, Clone)]
pub struct CallConfig {
    pub t1: Duration,
    pub t2: Duration,
    pub dialog_timeout: Duration,
}

impl Default for CallConfig {
    fn default() -> Self {
        CallConfig {
            t1: Duration::from_millis(500),
            t2: Duration::from_secs(4),
            dialog_timeout: Duration::from_secs(1800),
        }
    }
}

impl CallConfig {
    pub fn with_t1(mut self, t1: Duration) -> Self {
        self.t1 = t1;
        self
    }

    pub fn with_t2(mut self, t2: Duration) -> Self {
        self.t2 = t2;
        self
    }

    pub fn with_dialog_timeout(mut self, dialog_timeout: Duration) -> Self {
        self.dialog_timeout = dialog_timeout;
        self
    }
}
