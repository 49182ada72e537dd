use core::fmt::{self, Display};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// The backing store failed to serve the request.
    Unavailable,
    /// Stored data could not be decoded or violates the poll invariants.
    Corrupted,
}

impl From<tokio_postgres::Error> for Error {
    fn from(_: tokio_postgres::Error) -> Self {
        Self::Unavailable
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unavailable => "poll storage is unavailable",
            Self::Corrupted => "stored poll is corrupted",
        })
    }
}

pub type Result<T> = core::result::Result<T, Error>;
