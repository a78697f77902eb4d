use std::{
    error::Error as StdError,
    fmt::{self, Display},
};

/// The result type for region construction. The errors are fail-stop;
/// transactional aborts are ordinary return values on the operations
/// themselves and never surface here.
pub type Result<T> = std::result::Result<T, Error>;

/// An error encountered while creating a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The system has been used in an unsupported way.
    Unsupported(&'static str),
    /// The host allocator could not provide the requested memory.
    OutOfMemory,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Unsupported(why) => {
                write!(f, "Unsupported: {}", why)
            }
            Error::OutOfMemory => {
                write!(f, "OutOfMemory: allocator failure")
            }
        }
    }
}

impl StdError for Error {}
