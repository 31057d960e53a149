//! # Loader Error Type
//!
//! Loader-wide error type and its conversions to/from firmware status codes.

use uefi::Status;

/// Every failure kind the loader can surface, per the error-handling design.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// Bad CLI, malformed header, unsupported kernel version, non-relocatable kernel.
    #[error("invalid: {0}")]
    Invalid(&'static str),

    /// A filesystem device or file could not be resolved.
    #[error("not found: {0}")]
    NotFound(&'static str),

    /// The staging allocator or firmware pool/page allocator is out of resources.
    #[error("out of resources: {0}")]
    OutOfResources(&'static str),

    /// A firmware call failed with the given status.
    #[error("firmware call failed: {0:?}")]
    Firmware(Status),

    /// A caller-owned buffer was too small for a firmware-reported size.
    #[error("buffer too small")]
    BufferTooSmall,
}

impl From<Status> for LoaderError {
    fn from(status: Status) -> Self {
        match status {
            Status::NOT_FOUND => LoaderError::NotFound("firmware reported not found"),
            Status::OUT_OF_RESOURCES => LoaderError::OutOfResources("firmware reported OOM"),
            Status::BUFFER_TOO_SMALL => LoaderError::BufferTooSmall,
            Status::INVALID_PARAMETER => LoaderError::Invalid("firmware rejected parameter"),
            other => LoaderError::Firmware(other),
        }
    }
}

impl From<LoaderError> for Status {
    fn from(err: LoaderError) -> Self {
        match err {
            LoaderError::Invalid(_) => Status::INVALID_PARAMETER,
            LoaderError::NotFound(_) => Status::NOT_FOUND,
            LoaderError::OutOfResources(_) => Status::OUT_OF_RESOURCES,
            LoaderError::Firmware(status) => status,
            LoaderError::BufferTooSmall => Status::BUFFER_TOO_SMALL,
        }
    }
}

pub type Result<T> = core::result::Result<T, LoaderError>;
