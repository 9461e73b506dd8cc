use thiserror::Error;

/// The eight failure kinds a `vfscore` operation can report.
#[derive(Error, Debug)]
pub enum FsError {
    #[error("'{0}': no such file or directory")]
    NotFound(String),

    #[error("'{0}': not a directory")]
    NotADir(String),

    #[error("'{0}': not a regular file")]
    NotAFile(String),

    #[error("'{0}': already exists")]
    Exists(String),

    #[error("'{0}': permission denied")]
    PermDenied(String),

    #[error("no space left on device")]
    NoSpace,

    #[error("invalid argument: {0}")]
    Invalid(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad image: {0}")]
    BadImage(String),
}

pub type FsResult<T> = Result<T, FsError>;
