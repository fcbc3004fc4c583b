use std::fmt;

use km_channel::ChannelError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppStateError {
    Channel(ChannelError),
    /// The peer's reply was too short to carry a 16-bit mask.
    ShortReply,
}

impl fmt::Display for AppStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel(e) => write!(f, "{e}"),
            Self::ShortReply => write!(f, "app-state reply too short to carry a mask"),
        }
    }
}

impl std::error::Error for AppStateError {}

impl From<ChannelError> for AppStateError {
    fn from(e: ChannelError) -> Self {
        Self::Channel(e)
    }
}
