//! Collaborator seams between the monitoring core and the rest of the
//! server: the node layer that owns attribute values, the subscription layer
//! that owns publish cycles, and the diagnostics machinery.

use crate::status::StatusCode;
use crate::types::{AttributeId, IndexRange, NodeChangeMask, NodeId};
use crate::value::{DataValue, DiagnosticInfo, ServiceError};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

/// Per-request context threaded through reads and diagnostics creation.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub session_id: Option<u64>,
}

/// Observer notified when a node's state changes. Implemented by
/// [`MonitoredNode`](crate::node::MonitoredNode); registered with the source
/// node while data-change items are attached.
pub trait NodeChangeObserver: Send + Sync {
    fn on_node_change(&self, ctx: &RequestContext, mask: NodeChangeMask);
}

/// Observer notified when a node reports an event. Registered with the
/// source node while event subscribers are attached.
pub trait NodeEventObserver: Send + Sync {
    fn on_report_event(&self, ctx: &RequestContext, event: &UaEvent);
}

/// Consumer of routed events on the subscription side.
pub trait EventSubscriber: Send + Sync {
    fn enqueue_event(&self, event: UaEvent);
}

/// The monitored source node as seen by this core: an attribute reader plus
/// explicit observer registration.
///
/// Registration replaces the classic single mutable callback pointer so a
/// node can host several registries cleanly. Observers are held weakly; the
/// node must drop dead entries on its own schedule.
pub trait AttributeSource: Send + Sync {
    fn node_id(&self) -> NodeId;

    /// Read one attribute. Failures are reported through the returned error
    /// and a bad status on the value, never panicked or thrown.
    fn read_attribute(
        &self,
        ctx: &RequestContext,
        attribute_id: AttributeId,
        index_range: Option<IndexRange>,
    ) -> (DataValue, Option<ServiceError>);

    fn register_change_observer(&self, observer: Weak<dyn NodeChangeObserver>);
    fn unregister_change_observer(&self, observer: &Weak<dyn NodeChangeObserver>);
    fn register_event_observer(&self, observer: Weak<dyn NodeEventObserver>);
    fn unregister_event_observer(&self, observer: &Weak<dyn NodeEventObserver>);

    /// Events retained by the node for condition refresh. Nodes without
    /// condition state report nothing.
    fn retained_events(&self, _ctx: &RequestContext) -> Vec<UaEvent> {
        Vec::new()
    }
}

/// Snapshot of a reported event routed to subscribers.
#[derive(Debug, Clone)]
pub struct UaEvent {
    pub event_type: NodeId,
    pub source_node: NodeId,
    pub severity: u16,
    pub message: Arc<str>,
    pub time: DateTime<Utc>,
}

/// Weak handle to the subscription owning a monitored item, for identifier
/// lookup only — never lifetime management.
pub trait SubscriptionHandle: Send + Sync {
    fn id(&self) -> u32;

    fn session_id(&self) -> Option<u64> {
        None
    }
}

/// Builds diagnostic info entries from recorded errors when the client's
/// diagnostics mask asks for them.
pub trait DiagnosticsProvider: Send + Sync {
    fn create_diagnostic_info(
        &self,
        ctx: &RequestContext,
        error: &ServiceError,
    ) -> Option<DiagnosticInfo>;
}

/// Default provider: status code plus the error's description text.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicDiagnosticsProvider;

impl DiagnosticsProvider for BasicDiagnosticsProvider {
    fn create_diagnostic_info(
        &self,
        _ctx: &RequestContext,
        error: &ServiceError,
    ) -> Option<DiagnosticInfo> {
        if error.status == StatusCode::GOOD && error.description.is_none() {
            return None;
        }
        Some(DiagnosticInfo {
            status: error.status,
            text: error.description.clone(),
        })
    }
}

/// Reusable weak-observer collection for node implementations.
///
/// Registration is idempotent by pointer identity; dead observers are
/// dropped lazily during notification.
pub struct ObserverList<T: ?Sized> {
    inner: RwLock<Vec<Weak<T>>>,
}

impl<T: ?Sized> Default for ObserverList<T> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Vec::new()),
        }
    }
}

impl<T: ?Sized> ObserverList<T> {
    pub fn register(&self, observer: Weak<T>) {
        let mut inner = self.inner.write();
        if !inner.iter().any(|o| o.ptr_eq(&observer)) {
            inner.push(observer);
        }
    }

    pub fn unregister(&self, observer: &Weak<T>) {
        self.inner.write().retain(|o| !o.ptr_eq(observer));
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Invoke `f` for every live observer, pruning dead ones.
    pub fn notify(&self, mut f: impl FnMut(&Arc<T>)) {
        let observers: Vec<Weak<T>> = self.inner.read().clone();
        let mut saw_dead = false;
        for weak in &observers {
            match weak.upgrade() {
                Some(observer) => f(&observer),
                None => saw_dead = true,
            }
        }
        if saw_dead {
            self.inner.write().retain(|o| o.strong_count() > 0);
        }
    }
}
