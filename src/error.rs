//! Crate-wide error taxonomy.

use core::fmt;

/// Result alias used throughout this crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Closed error taxonomy shared by every layer.
///
/// Several variants are reserved for future use and unreachable from the
/// current core (`Retry`, `TooManySeries`, `InvalidRange`, `FlashWear`,
/// `Unsupported`, `IterEnd`); they exist so callers can match exhaustively
/// against the stable set of kinds a future version might actually return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The ring was full on `write`.
    Busy,
    /// Reserved for transient transport errors; unused in the core.
    Retry,
    /// No free segment, or a block does not fit into the pre-header region.
    NoSpace,
    /// `query_latest` found no matching sample.
    MetricUnknown,
    /// Reserved; unused in the core.
    TooManySeries,
    /// Reserved; unused in the core.
    InvalidRange,
    /// Magic/version mismatch, CRC mismatch, or no header present on verify.
    Corrupt,
    /// A bad sector intersected a read, program, or erase.
    FlashIo,
    /// Reserved; unused in the core.
    FlashWear,
    /// Alignment, bounds, an illegal 0→1 bit transition, or a null/empty
    /// input.
    InvalidArg,
    /// Reserved; unused in the core.
    Unsupported,
    /// Reserved; unused in the core.
    IterEnd,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::Busy => "ring is full",
            Error::Retry => "transient failure, retry",
            Error::NoSpace => "no space left",
            Error::MetricUnknown => "metric not found",
            Error::TooManySeries => "too many series",
            Error::InvalidRange => "invalid range",
            Error::Corrupt => "corrupt or uncommitted segment",
            Error::FlashIo => "flash I/O error (bad sector)",
            Error::FlashWear => "flash wear limit",
            Error::InvalidArg => "invalid argument",
            Error::Unsupported => "unsupported operation",
            Error::IterEnd => "iterator exhausted",
        };
        f.write_str(msg)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "embedded-storage")]
impl embedded_storage::nor_flash::NorFlashError for Error {
    fn kind(&self) -> embedded_storage::nor_flash::NorFlashErrorKind {
        use embedded_storage::nor_flash::NorFlashErrorKind::*;
        match self {
            Error::InvalidArg => NotAligned,
            _ => Other,
        }
    }
}
