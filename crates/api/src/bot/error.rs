use core::fmt::{self, Display};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    UnsupportedInteraction,
    UnknownCommandName,
    InvalidParams,
    UnknownUser,
    /// Discord sent a payload that does not fit the components we rendered.
    Schema,
    /// Poll storage is temporarily unreachable.
    Storage,
    Fatal,
}

impl From<db::error::Error> for Error {
    fn from(err: db::error::Error) -> Self {
        match err {
            db::error::Error::Unavailable => {
                log::warn!("poll storage is unavailable");
                Self::Storage
            }
            db::error::Error::Corrupted => Self::Fatal,
        }
    }
}

impl From<model::error::Error> for Error {
    fn from(err: model::error::Error) -> Self {
        match err {
            model::error::Error::BadInput => Self::InvalidParams,
            model::error::Error::Corrupted => {
                log::error!("refusing to vote on an inconsistent poll");
                Self::Fatal
            }
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UnsupportedInteraction => "Unsupported interaction.",
            Self::UnknownCommandName => "Unknown command name.",
            Self::InvalidParams => "Invalid parameter list.",
            Self::UnknownUser => "Unknown user.",
            Self::Schema => "Discord provided an unexpected interaction schema.",
            Self::Storage => "Something went wrong. Please try again later.",
            Self::Fatal => "Oops! We have encountered an unrecoverable error on our end.",
        })
    }
}

pub type Result<T> = core::result::Result<T, Error>;
