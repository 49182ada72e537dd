use core::fmt::{self, Display};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// Empty choice key or voter ID.
    BadInput,
    /// The vote index disagrees with the vote counts. This is a bug or tampered data.
    Corrupted,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BadInput => "choice keys and voter IDs must not be empty",
            Self::Corrupted => "poll state is internally inconsistent",
        })
    }
}

pub type Result<T> = core::result::Result<T, Error>;
