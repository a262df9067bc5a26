//! The change-predicate seam. The engine consumes the comparison as a pure
//! predicate; the default implementation covers status/value equality and
//! absolute/percent deadbands, which is enough for most hosts.

use crate::status::StatusCode;
use crate::types::{DataChangeFilter, DataChangeTrigger, DeadbandType};
use crate::value::{DataValue, ServiceError};

/// Inputs to a single change decision.
#[derive(Debug, Clone, Copy)]
pub struct ChangeCheck<'a> {
    pub value: Option<&'a DataValue>,
    pub error: Option<&'a ServiceError>,
    pub last_value: Option<&'a DataValue>,
    pub last_error: Option<&'a ServiceError>,
    pub filter: Option<&'a DataChangeFilter>,
    /// Engineering-unit span used to scale percent deadbands.
    pub range_span: f64,
}

/// Pure predicate deciding whether a new (value, error) pair constitutes a
/// reportable change relative to the last delivered pair.
pub trait ChangeDetector: Send + Sync {
    fn has_changed(&self, check: &ChangeCheck<'_>) -> bool;
}

/// Default comparison: status change always reports; value changes are
/// compared by deadband when one is configured and by equality otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultChangeDetector;

impl DefaultChangeDetector {
    fn effective_status(
        value: Option<&DataValue>,
        error: Option<&ServiceError>,
    ) -> Option<StatusCode> {
        error
            .map(|e| e.status)
            .or_else(|| value.map(|v| v.status))
            .map(|s| StatusCode(s.code()))
    }
}

impl ChangeDetector for DefaultChangeDetector {
    fn has_changed(&self, check: &ChangeCheck<'_>) -> bool {
        // nothing was ever delivered: the first value is always a change.
        if check.last_value.is_none() && check.last_error.is_none() {
            return true;
        }

        let last_status = Self::effective_status(check.last_value, check.last_error);
        let new_status = Self::effective_status(check.value, check.error);
        if new_status != last_status {
            return true;
        }

        let trigger = check
            .filter
            .map(|f| f.trigger)
            .unwrap_or(DataChangeTrigger::StatusValue);
        if trigger == DataChangeTrigger::Status {
            return false;
        }

        if trigger == DataChangeTrigger::StatusValueTimestamp {
            let new_ts = check.value.and_then(|v| v.source_timestamp);
            let last_ts = check.last_value.and_then(|v| v.source_timestamp);
            if new_ts != last_ts {
                return true;
            }
        }

        let new_variant = check.value.and_then(|v| v.value.as_ref());
        let last_variant = check.last_value.and_then(|v| v.value.as_ref());
        match (new_variant, last_variant) {
            (None, None) => false,
            (Some(new), Some(last)) => {
                if let Some(filter) = check.filter {
                    if filter.deadband_type != DeadbandType::None {
                        if let (Some(a), Some(b)) = (new.as_f64(), last.as_f64()) {
                            let threshold = match filter.deadband_type {
                                DeadbandType::Absolute => filter.deadband_value,
                                DeadbandType::Percent => {
                                    filter.deadband_value / 100.0 * check.range_span.abs()
                                }
                                DeadbandType::None => 0.0,
                            };
                            return (a - b).abs() > threshold;
                        }
                    }
                }
                new != last
            }
            _ => true,
        }
    }
}
