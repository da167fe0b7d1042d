//! Errors surfaced to callers of user intents

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("no room selected")]
    NoRoomSelected,

    #[error("no channel open for room '{0}'")]
    NoChannel(String),

    #[error("room '{0}' is not connected yet, message not sent")]
    NotJoined(String),

    #[error("connection to the server is closed")]
    TransportClosed,

    #[error("'{0}' is not a room location, use /room/NAME or /")]
    UnknownLocation(String),

    #[error("unknown command '/{0}', try /help")]
    UnknownCommand(String),

    #[error("/{0} needs an argument")]
    MissingArgument(&'static str),
}
