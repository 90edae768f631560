//! Error handling for the NovaDE buffer manager.
//!
//! The main type is [`SurfaceError`]; it is what producers, the allocator and
//! the request dispatcher report, and every variant has a stable wire status
//! (see [`SurfaceError::code`]) so that a reply parcel can carry it across
//! the process boundary.
//!
//! [`HalError`] describes failures of the vendor allocator entry points and
//! [`WireError`] describes truncated or malformed parcels. Configuration and
//! logging setup have their own error types, [`ConfigError`] and
//! [`LoggingError`].

use std::path::PathBuf;
use thiserror::Error;

/// Wire status written for a successful operation.
pub const SURFACE_ERROR_OK: i32 = 0;

/// Error type shared by the allocator, the descriptor and the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SurfaceError {
    /// The queue had no buffer to hand out.
    #[error("No buffer available")]
    NoBuffer,

    /// Storage could not be allocated, or the extension store is full.
    #[error("System error")]
    SystemError,

    /// A null, malformed or mismatched argument.
    #[error("Invalid parameter")]
    InvalidParam,

    /// The allocator has not been brought up, or bring-up failed.
    #[error("Buffer allocator is not ready")]
    NotReady,

    /// The pixel format or usage has no allocator-specific counterpart.
    #[error("Format or usage is not supported by the allocator")]
    Unsupported,

    /// The request code is outside the dispatch table.
    #[error("Request code {0} is not supported")]
    InvalidRequest(u32),
}

impl SurfaceError {
    /// Returns the wire status for this error. Always negative.
    pub fn code(self) -> i32 {
        match self {
            SurfaceError::NoBuffer => -1,
            SurfaceError::SystemError => -2,
            SurfaceError::InvalidParam => -3,
            SurfaceError::NotReady => -4,
            SurfaceError::Unsupported => -5,
            SurfaceError::InvalidRequest(_) => -6,
        }
    }

    /// Maps a wire status back to a result.
    ///
    /// Unknown negative codes are reported as [`SurfaceError::SystemError`].
    /// `InvalidRequest` loses its request code on the wire and comes back as
    /// `InvalidRequest(u32::MAX)`.
    pub fn from_code(code: i32) -> Result<(), SurfaceError> {
        match code {
            SURFACE_ERROR_OK => Ok(()),
            -1 => Err(SurfaceError::NoBuffer),
            -3 => Err(SurfaceError::InvalidParam),
            -4 => Err(SurfaceError::NotReady),
            -5 => Err(SurfaceError::Unsupported),
            -6 => Err(SurfaceError::InvalidRequest(u32::MAX)),
            _ => Err(SurfaceError::SystemError),
        }
    }
}

/// Converts a result into the status written to a reply parcel.
pub fn status_of(result: Result<(), SurfaceError>) -> i32 {
    match result {
        Ok(()) => SURFACE_ERROR_OK,
        Err(e) => e.code(),
    }
}

/// Failure of a hardware allocator (HAL) entry point.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HalError {
    /// The vendor table does not provide this entry point.
    #[error("HAL entry point `{0}` is not provided")]
    EntryMissing(&'static str),

    /// The allocator ran out of backing memory.
    #[error("HAL is out of memory (requested {requested} bytes)")]
    OutOfMemory { requested: u64 },

    /// The handle does not describe a live allocation.
    #[error("HAL does not know buffer key {key} at physical address {phy_addr:#x}")]
    UnknownHandle { key: i32, phy_addr: u64 },

    /// The allocation request cannot be satisfied as described.
    #[error("Invalid allocation request: {0}")]
    InvalidRequest(String),

    /// One-time bring-up of the vendor allocator failed.
    #[error("HAL bring-up failed: {0}")]
    InitFailed(String),

    /// Vendor-specific failure status.
    #[error("HAL call failed with status {0}")]
    Status(i32),
}

impl From<HalError> for SurfaceError {
    fn from(err: HalError) -> Self {
        match err {
            HalError::EntryMissing(_) => SurfaceError::Unsupported,
            HalError::UnknownHandle { .. } | HalError::InvalidRequest(_) => SurfaceError::InvalidParam,
            HalError::InitFailed(_) => SurfaceError::NotReady,
            HalError::OutOfMemory { .. } | HalError::Status(_) => SurfaceError::SystemError,
        }
    }
}

/// Error raised while reading a parcel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("Not enough data: need {needed} bytes, {remaining} remaining")]
    NotEnoughData { needed: usize, remaining: usize },

    #[error("Invalid string in parcel: {0}")]
    InvalidString(String),

    #[error("Descriptor declares {fds} reserved fds and {ints} reserved ints, more than {max} slots")]
    TooManyReservedSlots { fds: u32, ints: u32, max: u32 },
}

impl From<WireError> for SurfaceError {
    fn from(_: WireError) -> Self {
        SurfaceError::InvalidParam
    }
}

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read configuration file from {path:?}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid TOML or has unknown fields.
    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// The configuration parsed but holds unusable values.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Error type for logging initialization.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to initialize logging: {0}")]
    InitializationFailure(String),

    #[error("Failed to set log filter: {0}")]
    FilterError(String),

    #[error("Logging I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
