use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Everything a codec operation can fail with.
///
/// Nothing is retried internally; every error bubbles to the caller.
/// `HeaderNotEnough` and `BodyNotEnough` are the two kinds a framing loop is
/// expected to recover from by buffering more bytes and calling again.
#[derive(Debug, Error)]
pub enum Error {
    #[error("fewer than 16 bytes buffered at header-read time")]
    HeaderNotEnough,
    #[error("frame body length exceeds the buffered bytes")]
    BodyNotEnough,
    #[error("illegal package: {0}")]
    IllegalPackage(&'static str),
    #[error("unexpected tag {tag:#04x} at offset {offset}")]
    UnexpectedTag { tag: u8, offset: usize },
    #[error("input ends in the middle of a value")]
    TruncatedInput,
    #[error("string chunk is not valid UTF-8")]
    InvalidUtf8,
    #[error("class {0:?} is not registered")]
    UnknownClass(String),
    #[error("reference index {index} is out of table range")]
    DanglingRef { index: usize },
    #[error("unsupported type: {0}")]
    UnsupportedType(String),
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("java exception: {0}")]
    JavaException(String),
    /// Transport passthrough: the frame codec pulls bytes from a
    /// [`std::io::Read`], whose failures are not codec errors.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
