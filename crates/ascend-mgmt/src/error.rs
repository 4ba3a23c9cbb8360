//! Error types for Ascend management operations

use thiserror::Error;

/// Result type alias for Ascend management operations
pub type Result<T> = std::result::Result<T, AscendError>;

/// Errors that can occur while managing Ascend devices
#[derive(Debug, Error)]
pub enum AscendError {
    /// Driver init failed or the device list cannot be retrieved.
    /// Fatal for the session; never retried.
    #[error("DCMI driver unavailable: {reason}")]
    DriverUnavailable {
        /// Why the driver could not be used
        reason: String,
    },

    /// Queried card/device/vdev does not exist, or the vdev was already
    /// destroyed. Proven absence is answered locally without a driver call.
    #[error("not found: {what}")]
    NotFound {
        /// What was looked up
        what: String,
    },

    /// Vdev creation rejected for lack of free quota. Retryable by the
    /// caller after releasing other vdevs; never retried automatically.
    #[error("insufficient free resource: requested {requested} aicore, {available} free")]
    ResourceExhausted {
        /// Aicore count the template asked for
        requested: f32,
        /// Aicore count the device reports free
        available: f32,
    },

    /// Vdev ID collision detected client-side; the driver is not called.
    #[error("vdev {vdev_id} already active on card {card_id} device {device_id}")]
    DuplicateId {
        /// Card owning the device
        card_id: i32,
        /// Device within the card
        device_id: i32,
        /// The colliding vdev ID
        vdev_id: u32,
    },

    /// No response within the caller's deadline. The operation's true
    /// outcome is unknown; reconcile before trusting tracked state.
    #[error("operation timeout after {duration_ms}ms; driver-side outcome unknown")]
    Timeout {
        /// Deadline that elapsed, in milliseconds
        duration_ms: u64,
    },

    /// The driver returned a struct whose declared counts exceed its fixed
    /// array capacity — a client/driver version mismatch. Never retried.
    #[error("malformed driver response: {reason}")]
    MalformedResponse {
        /// What did not fit
        reason: String,
    },

    /// A vendor call failed with an opaque nonzero code.
    #[error("{function} failed with driver code {code}")]
    Call {
        /// Vendor entry point that failed
        function: &'static str,
        /// Raw driver code, kept for diagnostics
        code: i32,
    },
}

impl AscendError {
    /// Create a driver-unavailable error
    pub fn driver_unavailable(reason: impl Into<String>) -> Self {
        Self::DriverUnavailable {
            reason: reason.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a malformed-response error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            reason: reason.into(),
        }
    }

    /// Create a raw vendor-call error
    pub const fn call(function: &'static str, code: i32) -> Self {
        Self::Call { function, code }
    }

    /// True for the raw vendor failures the lifecycle manager may retry
    /// on read-only queries.
    pub const fn is_retryable_read(&self) -> bool {
        matches!(self, Self::Call { .. })
    }
}

impl From<ascend_dcmi::LoadError> for AscendError {
    fn from(err: ascend_dcmi::LoadError) -> Self {
        Self::DriverUnavailable {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_raw_call_failures_are_read_retryable() {
        assert!(AscendError::call("dcmi_get_device_info", -8020).is_retryable_read());
        assert!(!AscendError::not_found("vdev 3").is_retryable_read());
        assert!(!AscendError::malformed("vdev_num 20 > 16").is_retryable_read());
        assert!(!AscendError::Timeout { duration_ms: 50 }.is_retryable_read());
    }

    #[test]
    fn call_error_keeps_raw_code() {
        let err = AscendError::call("dcmi_create_vdevice", -99997);
        assert_eq!(err.to_string(), "dcmi_create_vdevice failed with driver code -99997");
    }
}
