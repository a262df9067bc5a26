//! Per-node fan-out and the registry that owns it.
//!
//! A [`MonitoredNode`] wraps one source node and dispatches its change and
//! event notifications to the monitored items and event subscribers attached
//! to it. The [`MonitorRegistry`] maps node identifiers to their wrappers
//! and assigns item identifiers from a single process-wide counter.

use crate::error::{MonitorError, MonitorResult};
use crate::item::MonitoredItem;
use crate::limits::MonitorLimits;
use crate::predicate::{ChangeDetector, DefaultChangeDetector};
use crate::source::{
    AttributeSource, BasicDiagnosticsProvider, DiagnosticsProvider, EventSubscriber,
    NodeChangeObserver, NodeEventObserver, RequestContext, SubscriptionHandle, UaEvent,
};
use crate::status::StatusCode;
use crate::time::{MonitorClock, SystemClock};
use crate::types::{
    AttributeId, MonitoredItemCreateParams, MonitoredItemCreateResult, MonitoringMode,
    NodeChangeMask, NodeId,
};
use crate::value::{DataValue, ServiceError};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

/// One source node together with everything monitoring it.
pub struct MonitoredNode {
    source: Arc<dyn AttributeSource>,
    limits: MonitorLimits,
    clock: Arc<dyn MonitorClock>,
    detector: Arc<dyn ChangeDetector>,
    diagnostics: Arc<dyn DiagnosticsProvider>,
    next_item_id: Arc<AtomicU32>,
    items: RwLock<Vec<Arc<MonitoredItem>>>,
    event_subscribers: RwLock<Vec<Arc<dyn EventSubscriber>>>,
}

impl MonitoredNode {
    fn new(
        source: Arc<dyn AttributeSource>,
        limits: MonitorLimits,
        clock: Arc<dyn MonitorClock>,
        detector: Arc<dyn ChangeDetector>,
        diagnostics: Arc<dyn DiagnosticsProvider>,
        next_item_id: Arc<AtomicU32>,
    ) -> Self {
        Self {
            source,
            limits,
            clock,
            detector,
            diagnostics,
            next_item_id,
            items: RwLock::new(Vec::new()),
            event_subscribers: RwLock::new(Vec::new()),
        }
    }

    #[inline]
    pub fn node_id(&self) -> NodeId {
        self.source.node_id()
    }

    #[inline]
    pub fn source(&self) -> &Arc<dyn AttributeSource> {
        &self.source
    }

    pub fn item_count(&self) -> usize {
        self.items.read().len()
    }

    pub fn get_item(&self, monitored_item_id: u32) -> Option<Arc<MonitoredItem>> {
        self.items
            .read()
            .iter()
            .find(|i| i.id() == monitored_item_id)
            .cloned()
    }

    /// Create a data-change monitored item on this node.
    ///
    /// The first item wires this node up as a change observer on the source.
    /// The observer stays registered for the node's whole lifetime; deleting
    /// the last item does not unwire it.
    pub fn create_data_change_item(
        self: &Arc<Self>,
        params: MonitoredItemCreateParams,
        subscription: Weak<dyn SubscriptionHandle>,
    ) -> MonitorResult<(Arc<MonitoredItem>, MonitoredItemCreateResult)> {
        let mut items = self.items.write();

        let limit = self.limits.max_monitored_items_per_node;
        if limit > 0 && items.len() >= limit {
            return Err(MonitorError::TooManyMonitoredItems {
                node: self.node_id(),
                limit,
            });
        }

        let id = self.next_item_id.fetch_add(1, Ordering::Relaxed);
        let item = Arc::new(MonitoredItem::new(
            id,
            Arc::clone(&self.source),
            Arc::clone(&self.clock),
            Arc::clone(&self.detector),
            Arc::clone(&self.diagnostics),
            self.limits,
            params,
            subscription,
        ));

        let first = items.is_empty();
        items.push(Arc::clone(&item));
        drop(items);

        if first {
            let observer =
                Arc::downgrade(self) as Weak<dyn NodeChangeObserver>;
            self.source.register_change_observer(observer);
        }

        tracing::debug!(
            node_id = %self.node_id(),
            monitored_item_id = id,
            "monitored item created"
        );

        let result = item.create_result();
        Ok((item, result))
    }

    /// Remove a monitored item. The change observer registration is left in
    /// place even when this was the last item.
    pub fn delete_item(&self, monitored_item_id: u32) -> MonitorResult<()> {
        let mut items = self.items.write();
        let before = items.len();
        items.retain(|i| i.id() != monitored_item_id);
        if items.len() == before {
            return Err(MonitorError::UnknownMonitoredItem(monitored_item_id));
        }

        tracing::debug!(
            node_id = %self.node_id(),
            monitored_item_id,
            "monitored item deleted"
        );
        Ok(())
    }

    /// True while any non-disabled item monitors the given attribute. Hosts
    /// use this to skip change notification work entirely.
    pub fn is_monitoring_required(&self, attribute_id: AttributeId) -> bool {
        self.items.read().iter().any(|i| {
            i.attribute_id() == attribute_id && i.monitoring_mode() != MonitoringMode::Disabled
        })
    }

    /// Attach an event subscriber. The first subscriber wires this node up
    /// as an event observer on the source; unlike the data-change side, the
    /// last unsubscribe unwires it again.
    pub fn subscribe_to_events(self: &Arc<Self>, subscriber: Arc<dyn EventSubscriber>) {
        let mut subscribers = self.event_subscribers.write();
        if subscribers.iter().any(|s| Arc::ptr_eq(s, &subscriber)) {
            return;
        }
        let first = subscribers.is_empty();
        subscribers.push(subscriber);
        drop(subscribers);

        if first {
            let observer = Arc::downgrade(self) as Weak<dyn NodeEventObserver>;
            self.source.register_event_observer(observer);
        }
    }

    pub fn unsubscribe_from_events(self: &Arc<Self>, subscriber: &Arc<dyn EventSubscriber>) {
        let mut subscribers = self.event_subscribers.write();
        subscribers.retain(|s| !Arc::ptr_eq(s, subscriber));
        let empty = subscribers.is_empty();
        drop(subscribers);

        if empty {
            let observer = Arc::downgrade(self) as Weak<dyn NodeEventObserver>;
            self.source.unregister_event_observer(&observer);
        }
    }

    pub fn event_subscriber_count(&self) -> usize {
        self.event_subscribers.read().len()
    }

    /// Replay the source's retained condition events to one subscriber.
    pub fn condition_refresh(&self, ctx: &RequestContext, subscriber: &Arc<dyn EventSubscriber>) {
        for event in self.source.retained_events(ctx) {
            subscriber.enqueue_event(event);
        }
    }
}

impl NodeChangeObserver for MonitoredNode {
    fn on_node_change(&self, ctx: &RequestContext, mask: NodeChangeMask) {
        let items = self.items.read();

        if mask.contains(NodeChangeMask::DELETED) {
            // the node is gone: every item gets a final bad-status value
            // instead of a fresh read, whatever attribute it watches.
            for item in items.iter() {
                let mut value = DataValue::from_status(StatusCode::BAD_NODE_ID_UNKNOWN);
                value.server_timestamp = Some(self.clock.now_utc());
                item.queue_value(value, Some(ServiceError::new(StatusCode::BAD_NODE_ID_UNKNOWN)));
            }
            return;
        }

        for item in items.iter() {
            let relevant = if item.attribute_id().is_value() {
                mask.contains(NodeChangeMask::VALUE)
            } else {
                mask.contains(NodeChangeMask::NON_VALUE)
            };
            if relevant {
                item.value_changed(ctx);
            }
        }
    }
}

impl NodeEventObserver for MonitoredNode {
    fn on_report_event(&self, _ctx: &RequestContext, event: &UaEvent) {
        let subscribers: Vec<_> = self.event_subscribers.read().clone();
        for subscriber in subscribers {
            subscriber.enqueue_event(event.clone());
        }
    }
}

impl fmt::Debug for MonitoredNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitoredNode")
            .field("node_id", &self.node_id())
            .field("items", &self.item_count())
            .finish_non_exhaustive()
    }
}

/// Registry mapping node identifiers to their monitoring wrappers.
///
/// Item identifiers come from a single counter shared by all nodes, so an
/// identifier alone pins down the item across the whole registry.
pub struct MonitorRegistry {
    nodes: DashMap<NodeId, Arc<MonitoredNode>>,
    limits: MonitorLimits,
    clock: Arc<dyn MonitorClock>,
    detector: Arc<dyn ChangeDetector>,
    diagnostics: Arc<dyn DiagnosticsProvider>,
    next_item_id: Arc<AtomicU32>,
}

impl MonitorRegistry {
    pub fn new(limits: MonitorLimits) -> Self {
        Self {
            nodes: DashMap::new(),
            limits,
            clock: Arc::new(SystemClock),
            detector: Arc::new(DefaultChangeDetector),
            diagnostics: Arc::new(BasicDiagnosticsProvider),
            next_item_id: Arc::new(AtomicU32::new(1)),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn MonitorClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_change_detector(mut self, detector: Arc<dyn ChangeDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_diagnostics_provider(mut self, diagnostics: Arc<dyn DiagnosticsProvider>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    #[inline]
    pub fn limits(&self) -> &MonitorLimits {
        &self.limits
    }

    /// The monitoring wrapper for a source node, created on first use.
    pub fn monitored_node(&self, source: Arc<dyn AttributeSource>) -> Arc<MonitoredNode> {
        let node_id = source.node_id();
        self.nodes
            .entry(node_id)
            .or_insert_with(|| {
                Arc::new(MonitoredNode::new(
                    source,
                    self.limits,
                    Arc::clone(&self.clock),
                    Arc::clone(&self.detector),
                    Arc::clone(&self.diagnostics),
                    Arc::clone(&self.next_item_id),
                ))
            })
            .clone()
    }

    pub fn get(&self, node_id: &NodeId) -> Option<Arc<MonitoredNode>> {
        self.nodes.get(node_id).map(|n| Arc::clone(&n))
    }

    /// Drop a node's wrapper and all of its items.
    pub fn remove(&self, node_id: &NodeId) -> Option<Arc<MonitoredNode>> {
        self.nodes.remove(node_id).map(|(_, node)| node)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl fmt::Debug for MonitorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorRegistry")
            .field("nodes", &self.nodes.len())
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}
