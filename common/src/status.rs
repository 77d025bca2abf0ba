// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! The uniform success/error carrier used throughout the chassis manager.
//!
//! A [`Status`] is either `Ok` or an error record carrying a named error
//! space, a vendor-specific [`ErrorCode`] within that space, the matching
//! [`CanonicalCode`], a message, and an optional opaque payload.  `Ok` is a
//! plain unit variant, so success costs no allocation and no reference
//! counting.  Error records live behind an `Arc`: cloning a non-OK status
//! bumps a refcount, and any mutation goes through copy-on-write so aliased
//! statuses never observe each other's edits.
//!
//! Functions that produce a value conditionally return
//! [`HalResult<T>`](HalResult), i.e. `Result<T, Status>`.  The `Ok` arm of
//! the result always carries a value, so the "OK with no value" shape is
//! unrepresentable.

use std::fmt;
use std::sync::Arc;

/// Result alias used by every fallible operation in the manager.
pub type HalResult<T> = Result<T, Status>;

/// The error space for statuses originating in the HAL itself.
pub const HAL_ERROR_SPACE: &str = "hal";

/// The error space for statuses derived from SDK/PHAL-layer failures.
pub const BAL_ERROR_SPACE: &str = "bal";

/// Canonical status codes, one per gRPC-style code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CanonicalCode {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    Unauthenticated,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
}

impl fmt::Display for CanonicalCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            CanonicalCode::Ok => "OK",
            CanonicalCode::Cancelled => "CANCELLED",
            CanonicalCode::Unknown => "UNKNOWN",
            CanonicalCode::InvalidArgument => "INVALID_ARGUMENT",
            CanonicalCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            CanonicalCode::NotFound => "NOT_FOUND",
            CanonicalCode::AlreadyExists => "ALREADY_EXISTS",
            CanonicalCode::PermissionDenied => "PERMISSION_DENIED",
            CanonicalCode::Unauthenticated => "UNAUTHENTICATED",
            CanonicalCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            CanonicalCode::FailedPrecondition => "FAILED_PRECONDITION",
            CanonicalCode::Aborted => "ABORTED",
            CanonicalCode::OutOfRange => "OUT_OF_RANGE",
            CanonicalCode::Unimplemented => "UNIMPLEMENTED",
            CanonicalCode::Internal => "INTERNAL",
            CanonicalCode::Unavailable => "UNAVAILABLE",
            CanonicalCode::DataLoss => "DATA_LOSS",
        };
        write!(f, "{name}")
    }
}

/// Vendor-specific error codes within the HAL error space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    Unknown,
    Internal,
    InvalidParam,
    EntryNotFound,
    NotInitialized,
    /// The pushed config cannot be applied without rebooting the stack.
    /// Callers treat this as guidance rather than a failure.
    RebootRequired,
    Cancelled,
    Aborted,
    Unimplemented,
}

impl ErrorCode {
    /// The canonical code this vendor code maps onto.
    pub fn canonical(&self) -> CanonicalCode {
        match self {
            ErrorCode::Unknown => CanonicalCode::Unknown,
            ErrorCode::Internal => CanonicalCode::Internal,
            ErrorCode::InvalidParam => CanonicalCode::InvalidArgument,
            ErrorCode::EntryNotFound => CanonicalCode::NotFound,
            ErrorCode::NotInitialized => CanonicalCode::FailedPrecondition,
            ErrorCode::RebootRequired => CanonicalCode::FailedPrecondition,
            ErrorCode::Cancelled => CanonicalCode::Cancelled,
            ErrorCode::Aborted => CanonicalCode::Aborted,
            ErrorCode::Unimplemented => CanonicalCode::Unimplemented,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ErrorCode::Unknown => "UNKNOWN",
            ErrorCode::Internal => "INTERNAL",
            ErrorCode::InvalidParam => "INVALID_PARAM",
            ErrorCode::EntryNotFound => "ENTRY_NOT_FOUND",
            ErrorCode::NotInitialized => "NOT_INITIALIZED",
            ErrorCode::RebootRequired => "REBOOT_REQUIRED",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::Aborted => "ABORTED",
            ErrorCode::Unimplemented => "UNIMPLEMENTED",
        };
        write!(f, "{name}")
    }
}

/// The error record behind a non-OK [`Status`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusRepr {
    space: &'static str,
    code: ErrorCode,
    canonical: CanonicalCode,
    message: String,
    payload: Option<String>,
}

/// A success/error value.  Cheap to clone in both arms: `Ok` is a unit and
/// errors share their record through an `Arc`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Status {
    #[default]
    Ok,
    Error(Arc<StatusRepr>),
}

impl Status {
    /// The OK status.
    pub fn ok() -> Status {
        Status::Ok
    }

    /// Construct a non-OK status in the given error space.
    pub fn new(
        space: &'static str,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Status {
        Status::Error(Arc::new(StatusRepr {
            space,
            code,
            canonical: code.canonical(),
            message: message.into(),
            payload: None,
        }))
    }

    pub fn internal(message: impl Into<String>) -> Status {
        Status::new(HAL_ERROR_SPACE, ErrorCode::Internal, message)
    }

    pub fn invalid_param(message: impl Into<String>) -> Status {
        Status::new(HAL_ERROR_SPACE, ErrorCode::InvalidParam, message)
    }

    pub fn entry_not_found(message: impl Into<String>) -> Status {
        Status::new(HAL_ERROR_SPACE, ErrorCode::EntryNotFound, message)
    }

    pub fn not_initialized() -> Status {
        Status::new(HAL_ERROR_SPACE, ErrorCode::NotInitialized, "Not initialized!")
    }

    pub fn reboot_required(message: impl Into<String>) -> Status {
        Status::new(HAL_ERROR_SPACE, ErrorCode::RebootRequired, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Status {
        Status::new(HAL_ERROR_SPACE, ErrorCode::Cancelled, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Status {
        Status::new(HAL_ERROR_SPACE, ErrorCode::Unimplemented, message)
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }

    /// The canonical code; `Ok` for the OK status.
    pub fn canonical_code(&self) -> CanonicalCode {
        match self {
            Status::Ok => CanonicalCode::Ok,
            Status::Error(repr) => repr.canonical,
        }
    }

    /// The vendor code, if this is an error.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Status::Ok => None,
            Status::Error(repr) => Some(repr.code),
        }
    }

    /// The error space, if this is an error.
    pub fn error_space(&self) -> Option<&'static str> {
        match self {
            Status::Ok => None,
            Status::Error(repr) => Some(repr.space),
        }
    }

    /// The error message; empty for OK.
    pub fn message(&self) -> &str {
        match self {
            Status::Ok => "",
            Status::Error(repr) => &repr.message,
        }
    }

    pub fn payload(&self) -> Option<&str> {
        match self {
            Status::Ok => None,
            Status::Error(repr) => repr.payload.as_deref(),
        }
    }

    /// Attach an opaque payload.  Copy-on-write: aliases of this status are
    /// unaffected.  No-op on OK.
    pub fn set_payload(&mut self, payload: impl Into<String>) {
        if let Status::Error(repr) = self {
            Arc::make_mut(repr).payload = Some(payload.into());
        }
    }

    /// Append detail to the error message.  Copy-on-write: aliases of this
    /// status are unaffected.  No-op on OK.
    pub fn append_message(&mut self, extra: &str) {
        if let Status::Error(repr) = self {
            let repr = Arc::make_mut(repr);
            if !repr.message.is_empty() {
                repr.message.push_str("; ");
            }
            repr.message.push_str(extra);
        }
    }

    /// Accumulate another status into this one.  If this status is OK it
    /// becomes `other`; otherwise `other`'s message (if any) is appended
    /// and this status keeps its own codes.  Used where multiple cleanup
    /// steps must all run and every failure must be reported.
    pub fn append(&mut self, other: Status) {
        if other.is_ok() {
            return;
        }
        if self.is_ok() {
            *self = other;
            return;
        }
        let extra = other.message().to_string();
        self.append_message(&extra);
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Status::Ok => write!(f, "OK"),
            Status::Error(repr) => write!(
                f,
                "{}:{} ({}): {}",
                repr.space, repr.code, repr.canonical, repr.message
            ),
        }
    }
}

impl std::error::Error for Status {}

impl From<std::io::Error> for Status {
    fn from(err: std::io::Error) -> Self {
        Status::internal(format!("I/O error: {err}"))
    }
}
