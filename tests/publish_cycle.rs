//! End-to-end monitoring flow: source change notifications fanning out
//! through a registry into monitored items, drained by a publish cycle.

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::thread;
use ua_monitor::{
    AttributeId, AttributeSource, DataChangeFilter, DataChangeTrigger, DataValue, DeadbandType,
    DiagnosticInfo, DiagnosticsMask, EventSubscriber, ManualClock, MonitorClock, MonitorLimits,
    MonitorRegistry, MonitoredItemCreateParams, MonitoringMode, NodeChangeMask,
    NodeChangeObserver, NodeEventObserver, NodeId, Notification, ObserverList, RequestContext,
    ServiceError, StatusCode, SubscriptionHandle, UaEvent, Variant,
};

/// In-memory source node with working observer lists.
struct SimNode {
    node_id: NodeId,
    value: Mutex<DataValue>,
    change_observers: ObserverList<dyn NodeChangeObserver>,
    event_observers: ObserverList<dyn NodeEventObserver>,
}

impl SimNode {
    fn new(node_id: NodeId) -> Arc<Self> {
        Arc::new(Self {
            node_id,
            value: Mutex::new(DataValue::new(0i64)),
            change_observers: ObserverList::default(),
            event_observers: ObserverList::default(),
        })
    }

    fn write_value(&self, ctx: &RequestContext, value: DataValue) {
        *self.value.lock() = value;
        self.change_observers
            .notify(|o| o.on_node_change(ctx, NodeChangeMask::VALUE));
    }
}

impl AttributeSource for SimNode {
    fn node_id(&self) -> NodeId {
        self.node_id.clone()
    }

    fn read_attribute(
        &self,
        _ctx: &RequestContext,
        attribute_id: AttributeId,
        _index_range: Option<ua_monitor::IndexRange>,
    ) -> (DataValue, Option<ServiceError>) {
        if attribute_id.is_value() {
            (self.value.lock().clone(), None)
        } else {
            (
                DataValue::from_status(StatusCode::BAD_ATTRIBUTE_ID_INVALID),
                Some(ServiceError::new(StatusCode::BAD_ATTRIBUTE_ID_INVALID)),
            )
        }
    }

    fn register_change_observer(&self, observer: Weak<dyn NodeChangeObserver>) {
        self.change_observers.register(observer);
    }

    fn unregister_change_observer(&self, observer: &Weak<dyn NodeChangeObserver>) {
        self.change_observers.unregister(observer);
    }

    fn register_event_observer(&self, observer: Weak<dyn NodeEventObserver>) {
        self.event_observers.register(observer);
    }

    fn unregister_event_observer(&self, observer: &Weak<dyn NodeEventObserver>) {
        self.event_observers.unregister(observer);
    }
}

struct SimSubscription {
    id: u32,
}

impl SubscriptionHandle for SimSubscription {
    fn id(&self) -> u32 {
        self.id
    }

    fn session_id(&self) -> Option<u64> {
        Some(77)
    }
}

fn drain(
    item: &ua_monitor::MonitoredItem,
) -> (Vec<Notification>, Vec<Option<DiagnosticInfo>>) {
    let mut notifications = Vec::new();
    let mut diagnostics = Vec::new();
    item.publish(&RequestContext::default(), &mut notifications, &mut diagnostics);
    (notifications, diagnostics)
}

fn int_of(n: &Notification) -> i64 {
    match n.value.value {
        Some(Variant::Int64(v)) => v,
        ref other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn write_to_publish_round_trip() {
    let clock = Arc::new(ManualClock::new(1_000));
    let registry =
        MonitorRegistry::new(MonitorLimits::default()).with_clock(Arc::clone(&clock) as Arc<dyn MonitorClock>);

    let source = SimNode::new(NodeId::numeric(2, 10));
    let node = registry.monitored_node(Arc::clone(&source) as Arc<dyn AttributeSource>);

    let subscription = Arc::new(SimSubscription { id: 9 });
    let (item, result) = node
        .create_data_change_item(
            MonitoredItemCreateParams {
                client_handle: 555,
                queue_size: 10,
                ..Default::default()
            },
            Arc::downgrade(&subscription) as Weak<dyn SubscriptionHandle>,
        )
        .unwrap();
    assert!(result.status.is_good());
    assert_eq!(result.revised_queue_size, 10);
    assert_eq!(item.subscription_id(), 9);
    assert_eq!(item.session_id(), Some(77));

    let ctx = RequestContext::default();
    source.write_value(&ctx, DataValue::new(1i64));
    source.write_value(&ctx, DataValue::new(2i64));
    source.write_value(&ctx, DataValue::new(2i64)); // unchanged, suppressed
    source.write_value(&ctx, DataValue::new(3i64));

    let (out, diags) = drain(&item);
    assert_eq!(out.iter().map(int_of).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert!(out.iter().all(|n| n.client_handle == 555));
    assert!(out.iter().all(|n| n.value.server_timestamp.is_some()));
    assert_eq!(diags.len(), 3);
    assert!(diags.iter().all(Option::is_none));

    // exhaustively drained.
    let (out, _) = drain(&item);
    assert!(out.is_empty());
}

#[test]
fn overflow_reaches_the_client() {
    let clock = Arc::new(ManualClock::new(1_000));
    let registry =
        MonitorRegistry::new(MonitorLimits::default()).with_clock(clock as Arc<dyn MonitorClock>);

    let source = SimNode::new(NodeId::numeric(2, 11));
    let node = registry.monitored_node(Arc::clone(&source) as Arc<dyn AttributeSource>);
    let subscription = Arc::new(SimSubscription { id: 1 });
    let (item, _) = node
        .create_data_change_item(
            MonitoredItemCreateParams {
                queue_size: 3,
                discard_oldest: true,
                ..Default::default()
            },
            Arc::downgrade(&subscription) as Weak<dyn SubscriptionHandle>,
        )
        .unwrap();

    let ctx = RequestContext::default();
    for v in [1i64, 2, 3, 4] {
        source.write_value(&ctx, DataValue::new(v));
    }

    let (out, _) = drain(&item);
    assert_eq!(out.iter().map(int_of).collect::<Vec<_>>(), vec![2, 3, 4]);
    assert!(out[0].value.status.has_overflow());
    assert!(!out[1].value.status.has_overflow());
    assert!(!out[2].value.status.has_overflow());
}

#[test]
fn limits_revise_requested_parameters() {
    let limits = MonitorLimits {
        min_sampling_interval_ms: 250.0,
        max_queue_size: 8,
        max_monitored_items_per_node: 0,
    };
    let clock = Arc::new(ManualClock::new(0));
    let registry = MonitorRegistry::new(limits).with_clock(clock as Arc<dyn MonitorClock>);

    let source = SimNode::new(NodeId::numeric(2, 12));
    let node = registry.monitored_node(source as Arc<dyn AttributeSource>);
    let subscription = Arc::new(SimSubscription { id: 1 });
    let (item, result) = node
        .create_data_change_item(
            MonitoredItemCreateParams {
                sampling_interval_ms: 50.0,
                queue_size: 100,
                ..Default::default()
            },
            Arc::downgrade(&subscription) as Weak<dyn SubscriptionHandle>,
        )
        .unwrap();

    assert_eq!(result.revised_sampling_interval_ms, 250.0);
    assert_eq!(result.revised_queue_size, 8);
    assert_eq!(item.sampling_interval_ms(), 250.0);
}

#[test]
fn deadband_filters_small_moves() {
    let clock = Arc::new(ManualClock::new(0));
    let registry =
        MonitorRegistry::new(MonitorLimits::default()).with_clock(clock as Arc<dyn MonitorClock>);

    let source = SimNode::new(NodeId::numeric(2, 13));
    let node = registry.monitored_node(Arc::clone(&source) as Arc<dyn AttributeSource>);
    let subscription = Arc::new(SimSubscription { id: 1 });
    let (item, _) = node
        .create_data_change_item(
            MonitoredItemCreateParams {
                queue_size: 10,
                filter: Some(DataChangeFilter {
                    trigger: DataChangeTrigger::StatusValue,
                    deadband_type: DeadbandType::Absolute,
                    deadband_value: 5.0,
                }),
                ..Default::default()
            },
            Arc::downgrade(&subscription) as Weak<dyn SubscriptionHandle>,
        )
        .unwrap();

    let ctx = RequestContext::default();
    source.write_value(&ctx, DataValue::new(100.0));
    source.write_value(&ctx, DataValue::new(102.0)); // within deadband
    source.write_value(&ctx, DataValue::new(110.0));

    let (out, _) = drain(&item);
    let values: Vec<f64> = out
        .iter()
        .map(|n| match n.value.value {
            Some(Variant::Double(v)) => v,
            ref other => panic!("unexpected variant: {other:?}"),
        })
        .collect();
    assert_eq!(values, vec![100.0, 110.0]);
}

#[test]
fn disabled_items_do_not_consume_changes() {
    let clock = Arc::new(ManualClock::new(0));
    let registry =
        MonitorRegistry::new(MonitorLimits::default()).with_clock(clock as Arc<dyn MonitorClock>);

    let source = SimNode::new(NodeId::numeric(2, 14));
    let node = registry.monitored_node(Arc::clone(&source) as Arc<dyn AttributeSource>);
    let subscription = Arc::new(SimSubscription { id: 1 });
    let (item, _) = node
        .create_data_change_item(
            Default::default(),
            Arc::downgrade(&subscription) as Weak<dyn SubscriptionHandle>,
        )
        .unwrap();

    item.set_monitoring_mode(MonitoringMode::Disabled);
    let ctx = RequestContext::default();
    source.write_value(&ctx, DataValue::new(1i64));
    // the node-level fast path reflects the disabled item.
    assert!(!node.is_monitoring_required(AttributeId::VALUE));
    let (out, _) = drain(&item);
    assert!(out.is_empty());

    item.set_monitoring_mode(MonitoringMode::Reporting);
    source.write_value(&ctx, DataValue::new(2i64));
    let (out, _) = drain(&item);
    assert_eq!(out.iter().map(int_of).collect::<Vec<_>>(), vec![2]);
}

#[test]
fn concurrent_producers_single_consumer() {
    let clock = Arc::new(ManualClock::new(0));
    let registry = Arc::new(
        MonitorRegistry::new(MonitorLimits {
            max_queue_size: 100_000,
            ..MonitorLimits::default()
        })
        .with_clock(clock as Arc<dyn MonitorClock>),
    );

    let source = SimNode::new(NodeId::numeric(2, 15));
    let node = registry.monitored_node(Arc::clone(&source) as Arc<dyn AttributeSource>);
    let subscription = Arc::new(SimSubscription { id: 1 });
    let (item, _) = node
        .create_data_change_item(
            MonitoredItemCreateParams {
                queue_size: 100_000,
                always_report_updates: true,
                ..Default::default()
            },
            Arc::downgrade(&subscription) as Weak<dyn SubscriptionHandle>,
        )
        .unwrap();

    const PRODUCERS: i64 = 4;
    const PER_PRODUCER: i64 = 500;

    let mut handles = Vec::new();
    for p in 0..PRODUCERS {
        let item = Arc::clone(&item);
        handles.push(thread::spawn(move || {
            for i in 0..PER_PRODUCER {
                item.queue_value(DataValue::new(p * PER_PRODUCER + i), None);
            }
        }));
    }

    let consumer = {
        let item = Arc::clone(&item);
        thread::spawn(move || {
            let ctx = RequestContext::default();
            let mut seen: Vec<i64> = Vec::new();
            while (seen.len() as i64) < PRODUCERS * PER_PRODUCER {
                let mut notifications = Vec::new();
                let mut diagnostics = Vec::new();
                if item.publish(&ctx, &mut notifications, &mut diagnostics) {
                    seen.extend(notifications.iter().map(int_of));
                }
                thread::yield_now();
            }
            seen
        })
    };

    for handle in handles {
        handle.join().unwrap();
    }
    let seen = consumer.join().unwrap();

    assert_eq!(seen.len() as i64, PRODUCERS * PER_PRODUCER);
    // no value lost or duplicated.
    let mut sorted = seen.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len() as i64, PRODUCERS * PER_PRODUCER);
    // per-producer FIFO order survives interleaving.
    for p in 0..PRODUCERS {
        let lane: Vec<i64> = seen
            .iter()
            .copied()
            .filter(|v| v / PER_PRODUCER == p)
            .collect();
        assert!(lane.windows(2).all(|w| w[0] < w[1]), "producer {p} reordered");
    }
}

#[test]
fn events_route_to_subscribers() {
    struct Collector {
        events: Mutex<Vec<UaEvent>>,
    }
    impl EventSubscriber for Collector {
        fn enqueue_event(&self, event: UaEvent) {
            self.events.lock().push(event);
        }
    }

    let clock = Arc::new(ManualClock::new(0));
    let registry =
        MonitorRegistry::new(MonitorLimits::default()).with_clock(clock as Arc<dyn MonitorClock>);
    let source = SimNode::new(NodeId::numeric(2, 16));
    let node = registry.monitored_node(Arc::clone(&source) as Arc<dyn AttributeSource>);

    let collector = Arc::new(Collector {
        events: Mutex::new(Vec::new()),
    });
    node.subscribe_to_events(Arc::clone(&collector) as Arc<dyn EventSubscriber>);

    let event = UaEvent {
        event_type: NodeId::numeric(0, 2041),
        source_node: source.node_id(),
        severity: 800,
        message: "pressure limit exceeded".into(),
        time: Utc::now(),
    };
    source
        .event_observers
        .notify(|o| o.on_report_event(&RequestContext::default(), &event));

    let events = collector.events.lock();
    assert_eq!(events.len(), 1);
    assert_eq!(&*events[0].message, "pressure limit exceeded");
    assert_eq!(events[0].severity, 800);
}

#[test]
fn diagnostics_follow_the_mask() {
    struct FailingNode {
        node_id: NodeId,
        change_observers: ObserverList<dyn NodeChangeObserver>,
    }
    impl AttributeSource for FailingNode {
        fn node_id(&self) -> NodeId {
            self.node_id.clone()
        }
        fn read_attribute(
            &self,
            _ctx: &RequestContext,
            _attribute_id: AttributeId,
            _index_range: Option<ua_monitor::IndexRange>,
        ) -> (DataValue, Option<ServiceError>) {
            (
                DataValue::from_status(StatusCode::BAD_INTERNAL_ERROR),
                Some(ServiceError::with_description(
                    StatusCode::BAD_INTERNAL_ERROR,
                    "backing store unavailable",
                )),
            )
        }
        fn register_change_observer(&self, observer: Weak<dyn NodeChangeObserver>) {
            self.change_observers.register(observer);
        }
        fn unregister_change_observer(&self, observer: &Weak<dyn NodeChangeObserver>) {
            self.change_observers.unregister(observer);
        }
        fn register_event_observer(&self, _o: Weak<dyn NodeEventObserver>) {}
        fn unregister_event_observer(&self, _o: &Weak<dyn NodeEventObserver>) {}
    }

    let clock = Arc::new(ManualClock::new(0));
    let registry =
        MonitorRegistry::new(MonitorLimits::default()).with_clock(clock as Arc<dyn MonitorClock>);
    let source = Arc::new(FailingNode {
        node_id: NodeId::numeric(2, 17),
        change_observers: ObserverList::default(),
    });
    let node = registry.monitored_node(Arc::clone(&source) as Arc<dyn AttributeSource>);
    let subscription = Arc::new(SimSubscription { id: 1 });
    let (item, _) = node
        .create_data_change_item(
            MonitoredItemCreateParams {
                diagnostics_mask: DiagnosticsMask::OPERATION_ALL,
                ..Default::default()
            },
            Arc::downgrade(&subscription) as Weak<dyn SubscriptionHandle>,
        )
        .unwrap();

    source
        .change_observers
        .notify(|o| o.on_node_change(&RequestContext::default(), NodeChangeMask::VALUE));

    let (out, diags) = drain(&item);
    assert_eq!(out.len(), 1);
    assert!(out[0].value.status.is_bad());
    let info = diags[0].as_ref().expect("diagnostic info expected");
    assert_eq!(info.status, StatusCode::BAD_INTERNAL_ERROR);
    assert_eq!(info.text.as_deref(), Some("backing store unavailable"));
}
