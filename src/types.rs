use crate::status::StatusCode;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use std::fmt::{self, Display, Formatter};

/// Identifier of a node in the server address space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    pub namespace: u16,
    pub identifier: Identifier,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identifier {
    Numeric(u32),
    String(String),
}

impl NodeId {
    pub fn numeric(namespace: u16, value: u32) -> Self {
        Self {
            namespace,
            identifier: Identifier::Numeric(value),
        }
    }

    pub fn string(namespace: u16, value: impl Into<String>) -> Self {
        Self {
            namespace,
            identifier: Identifier::String(value.into()),
        }
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.identifier {
            Identifier::Numeric(v) => write!(f, "ns={};i={}", self.namespace, v),
            Identifier::String(v) => write!(f, "ns={};s={}", self.namespace, v),
        }
    }
}

/// Identifier of the attribute being monitored on a node.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeId(pub u32);

impl AttributeId {
    pub const NODE_ID: AttributeId = AttributeId(1);
    pub const DISPLAY_NAME: AttributeId = AttributeId(4);
    pub const DESCRIPTION: AttributeId = AttributeId(5);
    pub const VALUE: AttributeId = AttributeId(13);
    pub const DATA_TYPE: AttributeId = AttributeId(14);

    #[inline]
    pub fn is_value(self) -> bool {
        self == Self::VALUE
    }
}

/// Index range selecting a subset of an array value. `None` at the use sites
/// means the entire value. Interpretation is up to the attribute reader.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRange {
    pub start: u32,
    pub end: u32,
}

/// Monitoring mode of an item. `Reporting` is a superset of `Sampling` that
/// additionally makes the item eligible for delivery to the publish engine;
/// `Sampling` accumulates and filters but never becomes ready to publish.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum MonitoringMode {
    Disabled = 0,
    Sampling = 1,
    Reporting = 2,
}

/// Which timestamps the client wants back on delivered values.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum TimestampsToReturn {
    Source = 0,
    Server = 1,
    Both = 2,
    Neither = 3,
}

impl TimestampsToReturn {
    #[inline]
    pub fn wants_server(self) -> bool {
        matches!(self, TimestampsToReturn::Server | TimestampsToReturn::Both)
    }

    #[inline]
    pub fn wants_source(self) -> bool {
        matches!(self, TimestampsToReturn::Source | TimestampsToReturn::Both)
    }
}

/// Diagnostics selection mask from the client request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiagnosticsMask(pub u16);

impl DiagnosticsMask {
    pub const NONE: DiagnosticsMask = DiagnosticsMask(0);
    pub const OPERATION_ALL: DiagnosticsMask = DiagnosticsMask(0x03E0);

    /// True when any operation-level diagnostic bit is requested; gates both
    /// error retention in the queue and diagnostic-info creation on publish.
    #[inline]
    pub fn wants_operation_diagnostics(self) -> bool {
        self.0 & Self::OPERATION_ALL.0 != 0
    }
}

/// Kind-of-change mask reported by the node layer on a state change.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeChangeMask(pub u8);

impl NodeChangeMask {
    pub const NONE: NodeChangeMask = NodeChangeMask(0);
    pub const NON_VALUE: NodeChangeMask = NodeChangeMask(0x01);
    pub const VALUE: NodeChangeMask = NodeChangeMask(0x02);
    pub const DELETED: NodeChangeMask = NodeChangeMask(0x04);

    #[inline]
    pub fn contains(self, other: NodeChangeMask) -> bool {
        self.0 & other.0 != 0
    }
}

impl std::ops::BitOr for NodeChangeMask {
    type Output = NodeChangeMask;

    fn bitor(self, rhs: NodeChangeMask) -> NodeChangeMask {
        NodeChangeMask(self.0 | rhs.0)
    }
}

/// What kind of change triggers a report.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum DataChangeTrigger {
    Status = 0,
    StatusValue = 1,
    StatusValueTimestamp = 2,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum DeadbandType {
    None = 0,
    Absolute = 1,
    Percent = 2,
}

/// Client-requested data change filter. The comparison itself is performed
/// by an external [`ChangeDetector`](crate::predicate::ChangeDetector); the
/// engine only stores and forwards the filter.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataChangeFilter {
    pub trigger: DataChangeTrigger,
    pub deadband_type: DeadbandType,
    pub deadband_value: f64,
}

/// Engineering-unit range of the monitored value, used to scale percent
/// deadbands.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct EuRange {
    pub low: f64,
    pub high: f64,
}

impl EuRange {
    #[inline]
    pub fn span(&self) -> f64 {
        self.high - self.low
    }
}

/// Full parameter set for creating a data-change monitored item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredItemCreateParams {
    pub attribute_id: AttributeId,
    pub index_range: Option<IndexRange>,
    pub data_encoding: Option<String>,
    pub diagnostics_mask: DiagnosticsMask,
    pub timestamps_to_return: TimestampsToReturn,
    pub monitoring_mode: MonitoringMode,
    pub client_handle: u32,
    /// Requested sampling interval in milliseconds. Zero or negative means
    /// report-on-change with no minimum spacing (subject to server limits).
    pub sampling_interval_ms: f64,
    pub queue_size: u32,
    pub discard_oldest: bool,
    pub filter: Option<DataChangeFilter>,
    pub range: Option<EuRange>,
    pub always_report_updates: bool,
}

impl Default for MonitoredItemCreateParams {
    fn default() -> Self {
        Self {
            attribute_id: AttributeId::VALUE,
            index_range: None,
            data_encoding: None,
            diagnostics_mask: DiagnosticsMask::NONE,
            timestamps_to_return: TimestampsToReturn::Both,
            monitoring_mode: MonitoringMode::Reporting,
            client_handle: 0,
            sampling_interval_ms: 0.0,
            queue_size: 1,
            discard_oldest: true,
            filter: None,
            range: None,
            always_report_updates: false,
        }
    }
}

/// Revised parameters reported back for a create request. The server is
/// permitted to revise client-requested values and must report what it
/// actually applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredItemCreateResult {
    pub monitored_item_id: u32,
    pub status: StatusCode,
    pub revised_sampling_interval_ms: f64,
    pub revised_queue_size: u32,
    pub filter_result: Option<DataChangeFilter>,
}

/// Parameter set for modifying an existing monitored item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredItemModifyParams {
    pub diagnostics_mask: DiagnosticsMask,
    pub timestamps_to_return: TimestampsToReturn,
    pub client_handle: u32,
    pub sampling_interval_ms: f64,
    pub queue_size: u32,
    pub discard_oldest: bool,
    pub filter: Option<DataChangeFilter>,
    pub range: Option<EuRange>,
}

/// Revised parameters reported back for a modify request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredItemModifyResult {
    pub status: StatusCode,
    pub revised_sampling_interval_ms: f64,
    pub revised_queue_size: u32,
    pub filter_result: Option<DataChangeFilter>,
}
