use crate::dialog::DialogId;
use crate::Result;
use async_trait::async_trait;

/// Narrow view of the transport layer consumed by the dialog layer.
///
/// `is_local` tells route construction whether a Record-Route hop points at
/// one of this application's own listening addresses. `resend_response`
/// retransmits the stored 2xx of a dialog that is still waiting for its ACK.
#[async_trait]
pub trait SipTransport: Send + Sync {
    fn is_local(&self, app_id: &str, uri: &rsip::Uri) -> bool;

    async fn resend_response(&self, response: &rsip::Response, dialog_id: &DialogId)
        -> Result<()>;
}
