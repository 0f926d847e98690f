use std::fmt::Display;

use miette::miette;

#[derive(Debug)]
pub enum Error {
    /// The file is over the destination size ceiling but cannot be segmented.
    ///
    /// Kept separate from the generic report so that the orchestrator can
    /// surface a message explaining *why* splitting was impossible instead
    /// of a plain "download failed".
    CannotSplit(String),

    Miette(miette::Report),
}

impl From<miette::Report> for Error {
    fn from(err: miette::Report) -> Self {
        Error::Miette(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Miette(miette::Report::msg(err))
    }
}

impl From<Error> for miette::Report {
    fn from(err: Error) -> Self {
        match err {
            Error::CannotSplit(reason) => miette!("Cannot split file: {reason}"),
            Error::Miette(err) => err,
        }
    }
}

impl Error {
    pub fn wrap_err_with<D, F>(self, f: F) -> Error
    where
        D: Display + Send + Sync + 'static,
        F: FnOnce() -> D,
    {
        match self {
            Error::Miette(report) => Error::Miette(report.wrap_err(f())),
            err => err,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::CannotSplit(reason) => write!(f, "Cannot split file: {reason}"),
            Error::Miette(report) => write!(f, "{report}"),
        }
    }
}

/// Build an [`Error`] from a simple message
pub fn err_msg(msg: impl Display) -> Error {
    Error::Miette(miette!("{msg}"))
}

/// Shortcut for `Err(err_msg(msg))`
pub fn bail<T>(msg: impl Display) -> Result<T> {
    Err(err_msg(msg))
}

pub type Result<T> = std::result::Result<T, Error>;
