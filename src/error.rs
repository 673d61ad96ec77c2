use crate::dialog::DialogId;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("SIP message error: {0}")]
    SipMessageError(#[from] rsip::Error),

    #[error("Dialog error: {0}: {1}")]
    DialogError(String, DialogId),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Channel send error: {0}")]
    ChannelSendError(String),

    #[error("Error: {0}")]
    Error(String),
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(e: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::ChannelSendError(e.to_string())
    }
}
