//! Server-side OPC UA monitored item engine.
//!
//! This crate implements the data-change monitoring core of an industrial
//! telemetry server: for each (node, attribute) pair a client subscribes to,
//! the server samples or is notified of value changes, filters out
//! non-changes, buffers a bounded history of pending notifications per item,
//! and hands ready notifications to a subscription's publish cycle.
//!
//! Three components make up the core:
//!
//! - [`NotificationQueue`] — fixed-capacity FIFO of (value, error) pairs with
//!   OPC UA overflow and discard-oldest/reject-newest semantics.
//! - [`MonitoredItem`] — per (node, attribute) sampling state machine that
//!   decides whether a new value constitutes a reportable change and when it
//!   may be delivered.
//! - [`MonitoredNode`] — per-node registry that fans out change and event
//!   notifications to the monitored items attached to one node.
//!
//! Wire protocol encoding, the address space, the publish-request cycle and
//! session management are external collaborators reached through the traits
//! in [`source`] and [`predicate`]. All operations are synchronous and
//! bounded; any producer thread may queue values concurrently while a single
//! publish-engine thread drains each item.

pub mod error;
pub mod item;
pub mod limits;
pub mod node;
pub mod predicate;
pub mod queue;
pub mod source;
pub mod status;
pub mod time;
pub mod types;
pub mod value;

pub use error::{MonitorError, MonitorResult};
pub use item::MonitoredItem;
pub use limits::MonitorLimits;
pub use node::{MonitorRegistry, MonitoredNode};
pub use predicate::{ChangeCheck, ChangeDetector, DefaultChangeDetector};
pub use queue::NotificationQueue;
pub use source::{
    AttributeSource, BasicDiagnosticsProvider, DiagnosticsProvider, EventSubscriber,
    NodeChangeObserver, NodeEventObserver, ObserverList, RequestContext, SubscriptionHandle,
    UaEvent,
};
pub use status::StatusCode;
pub use time::{ManualClock, MonitorClock, SystemClock};
pub use types::{
    AttributeId, DataChangeFilter, DataChangeTrigger, DeadbandType, DiagnosticsMask, EuRange,
    Identifier, IndexRange, MonitoredItemCreateParams, MonitoredItemCreateResult,
    MonitoredItemModifyParams, MonitoredItemModifyResult, MonitoringMode, NodeChangeMask, NodeId,
    TimestampsToReturn,
};
pub use value::{DataValue, DiagnosticInfo, Notification, ServiceError, Variant};
