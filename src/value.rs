use crate::status::StatusCode;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A strongly-typed runtime value for monitored attributes.
///
/// Cloning is cheap by construction: strings share storage through
/// `Arc<str>` and byte strings through `Bytes`. This is what makes the
/// defensive copy in the queueing path affordable — a caller mutating its
/// own buffer after queueing a value can never alter a stored notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Variant {
    Boolean(bool),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(Arc<str>),
    ByteString(Bytes),
    DateTime(DateTime<Utc>),
}

impl Variant {
    /// Numeric view used by deadband evaluation. Non-numeric variants return
    /// `None` and fall back to equality comparison.
    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Variant::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
            Variant::Int32(v) => Some(*v as f64),
            Variant::UInt32(v) => Some(*v as f64),
            Variant::Int64(v) => Some(*v as f64),
            Variant::UInt64(v) => Some(*v as f64),
            Variant::Float(v) => Some(*v as f64),
            Variant::Double(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<i32> for Variant {
    fn from(v: i32) -> Self {
        Variant::Int32(v)
    }
}

impl From<i64> for Variant {
    fn from(v: i64) -> Self {
        Variant::Int64(v)
    }
}

impl From<f64> for Variant {
    fn from(v: f64) -> Self {
        Variant::Double(v)
    }
}

impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Variant::Boolean(v)
    }
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Variant::String(Arc::<str>::from(v))
    }
}

/// An attribute value together with its quality and timestamps.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataValue {
    pub value: Option<Variant>,
    pub status: StatusCode,
    pub source_timestamp: Option<DateTime<Utc>>,
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl DataValue {
    pub fn new(value: impl Into<Variant>) -> Self {
        Self {
            value: Some(value.into()),
            status: StatusCode::GOOD,
            source_timestamp: None,
            server_timestamp: None,
        }
    }

    /// A value carrying only a status code, used when the attribute read
    /// failed and the failure itself becomes the delivered notification.
    pub fn from_status(status: StatusCode) -> Self {
        Self {
            value: None,
            status,
            source_timestamp: None,
            server_timestamp: None,
        }
    }
}

/// Service-level operation result attached to a queued value.
///
/// This is deliberately data, not a Rust error: read failures are delivered
/// to the client as degraded notifications, never raised through the
/// monitoring path.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceError {
    pub status: StatusCode,
    pub description: Option<Arc<str>>,
}

impl ServiceError {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            description: None,
        }
    }

    pub fn with_description(status: StatusCode, description: impl Into<Arc<str>>) -> Self {
        Self {
            status,
            description: Some(description.into()),
        }
    }

    #[inline]
    pub fn is_bad(&self) -> bool {
        self.status.is_bad()
    }
}

/// Diagnostic information reported alongside a notification when the
/// client's diagnostics mask requests operation-level diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticInfo {
    pub status: StatusCode,
    pub text: Option<Arc<str>>,
}

/// A single data-change notification handed to the publish engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub client_handle: u32,
    pub value: DataValue,
}
