use std::fmt;

use km_channel::ChannelError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MsgqError {
    /// CHANNEL-level or transport failure.
    Channel(ChannelError),
    /// `msg_recv` found the opposite queue empty.
    NoData,
    /// A reply shorter than a `MsgHdr` cannot be a message fragment.
    ShortReply,
    /// `msg_send` exhausted its bounded retry count on repeated `BadLen`.
    SendRetriesExhausted,
    /// `msg_recv` exhausted its bounded retry count without matching
    /// the requested tag.
    TagRetriesExhausted,
}

impl fmt::Display for MsgqError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel(e) => write!(f, "{e}"),
            Self::NoData => write!(f, "no data available on queue"),
            Self::ShortReply => write!(f, "reply too short to contain a message header"),
            Self::SendRetriesExhausted => write!(f, "msg_send retries exhausted"),
            Self::TagRetriesExhausted => write!(f, "msg_recv tag-filter retries exhausted"),
        }
    }
}

impl std::error::Error for MsgqError {}

impl From<ChannelError> for MsgqError {
    fn from(e: ChannelError) -> Self {
        Self::Channel(e)
    }
}
