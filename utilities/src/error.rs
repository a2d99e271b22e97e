use std::error::Error;
use std::fmt::Display;

pub const STATUS_OK: i32 = 0;

/// Error kinds shared by the master, the chunk servers and the client. Every RPC reply
/// carries the matching status code so the kind survives the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FsError {
    NotFound(String),
    AlreadyExists(String),
    NotEmpty(String),
    BadPath(String),
    NoCapacity(String),
    Unreachable(String),
    Timeout(String),
    Rejected(String),
    BadOffset(String),
    Internal(String),
}

impl FsError {
    pub fn code(&self) -> i32 {
        match self {
            FsError::NotFound(_) => -1,
            FsError::AlreadyExists(_) => -2,
            FsError::NotEmpty(_) => -3,
            FsError::BadPath(_) => -4,
            FsError::NoCapacity(_) => -5,
            FsError::Unreachable(_) => -6,
            FsError::Timeout(_) => -7,
            FsError::Rejected(_) => -8,
            FsError::BadOffset(_) => -9,
            FsError::Internal(_) => -10,
        }
    }
    /// Rebuilds an error from a reply status. `None` for a success status.
    pub fn from_code(code: i32, message: impl Into<String>) -> Option<Self> {
        let message = message.into();
        let err = match code {
            STATUS_OK => return None,
            -1 => FsError::NotFound(message),
            -2 => FsError::AlreadyExists(message),
            -3 => FsError::NotEmpty(message),
            -4 => FsError::BadPath(message),
            -5 => FsError::NoCapacity(message),
            -6 => FsError::Unreachable(message),
            -7 => FsError::Timeout(message),
            -8 => FsError::Rejected(message),
            -9 => FsError::BadOffset(message),
            _ => FsError::Internal(message),
        };
        Some(err)
    }
    pub fn message(&self) -> &str {
        match self {
            FsError::NotFound(msg)
            | FsError::AlreadyExists(msg)
            | FsError::NotEmpty(msg)
            | FsError::BadPath(msg)
            | FsError::NoCapacity(msg)
            | FsError::Unreachable(msg)
            | FsError::Timeout(msg)
            | FsError::Rejected(msg)
            | FsError::BadOffset(msg)
            | FsError::Internal(msg) => msg,
        }
    }
}

/// Converts a reply `(status, message)` pair into a result.
pub fn check_status(status: i32, message: &str) -> Result<(), FsError> {
    match FsError::from_code(status, message) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

impl Display for FsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FsError::NotFound(msg) => write!(f, "Not found : {msg}"),
            FsError::AlreadyExists(msg) => write!(f, "Already exists : {msg}"),
            FsError::NotEmpty(msg) => write!(f, "Directory not empty : {msg}"),
            FsError::BadPath(msg) => write!(f, "Bad path : {msg}"),
            FsError::NoCapacity(msg) => write!(f, "No capacity : {msg}"),
            FsError::Unreachable(msg) => write!(f, "Unreachable : {msg}"),
            FsError::Timeout(msg) => write!(f, "Timed out : {msg}"),
            FsError::Rejected(msg) => write!(f, "Rejected : {msg}"),
            FsError::BadOffset(msg) => write!(f, "Bad offset : {msg}"),
            FsError::Internal(msg) => write!(f, "Internal error : {msg}"),
        }
    }
}

impl Error for FsError {}

impl From<tonic::Status> for FsError {
    fn from(status: tonic::Status) -> Self {
        let message = status.message().to_owned();
        match status.code() {
            tonic::Code::Unavailable => FsError::Unreachable(message),
            tonic::Code::DeadlineExceeded | tonic::Code::Cancelled => FsError::Timeout(message),
            tonic::Code::NotFound => FsError::NotFound(message),
            tonic::Code::AlreadyExists => FsError::AlreadyExists(message),
            _ => FsError::Internal(format!("{:?} {message}", status.code())),
        }
    }
}

impl From<tonic::transport::Error> for FsError {
    fn from(value: tonic::transport::Error) -> Self {
        FsError::Unreachable(value.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for FsError {
    fn from(value: tokio::time::error::Elapsed) -> Self {
        FsError::Timeout(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_survive_the_wire() {
        let errors = [
            FsError::NotFound("a".into()),
            FsError::AlreadyExists("a".into()),
            FsError::NotEmpty("a".into()),
            FsError::BadPath("a".into()),
            FsError::NoCapacity("a".into()),
            FsError::Unreachable("a".into()),
            FsError::Timeout("a".into()),
            FsError::Rejected("a".into()),
            FsError::BadOffset("a".into()),
            FsError::Internal("a".into()),
        ];
        for err in errors {
            assert!(err.code() < 0);
            assert_eq!(FsError::from_code(err.code(), err.message()), Some(err));
        }
        assert_eq!(FsError::from_code(STATUS_OK, "fine"), None);
        assert!(check_status(STATUS_OK, "").is_ok());
        assert_eq!(
            check_status(-3, "/a"),
            Err(FsError::NotEmpty("/a".to_owned()))
        );
    }

    #[test]
    fn grpc_status_maps_to_transport_kinds() {
        let unavailable: FsError = tonic::Status::unavailable("down").into();
        assert_eq!(unavailable, FsError::Unreachable("down".to_owned()));
        let deadline: FsError = tonic::Status::deadline_exceeded("slow").into();
        assert_eq!(deadline, FsError::Timeout("slow".to_owned()));
        let other: FsError = tonic::Status::internal("boom").into();
        assert_eq!(other.code(), -10);
    }
}
