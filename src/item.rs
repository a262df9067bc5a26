use crate::limits::MonitorLimits;
use crate::predicate::{ChangeCheck, ChangeDetector};
use crate::queue::NotificationQueue;
use crate::source::{
    AttributeSource, DiagnosticsProvider, RequestContext, SubscriptionHandle,
};
use crate::status::StatusCode;
use crate::time::MonitorClock;
use crate::types::{
    AttributeId, DataChangeFilter, DiagnosticsMask, IndexRange, MonitoredItemCreateParams,
    MonitoredItemCreateResult, MonitoredItemModifyParams, MonitoredItemModifyResult,
    MonitoringMode, TimestampsToReturn,
};
use crate::value::{DataValue, DiagnosticInfo, Notification, ServiceError};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};

/// Mutable state of a monitored item, guarded by a single lock.
struct ItemState {
    monitoring_mode: MonitoringMode,
    diagnostics_mask: DiagnosticsMask,
    timestamps_to_return: TimestampsToReturn,
    client_handle: u32,
    sampling_interval_ms: f64,
    /// Next scheduled sample tick; 0 means uninitialized (no interval).
    next_sample_time: i64,
    last_value: Option<DataValue>,
    last_error: Option<ServiceError>,
    filter: Option<DataChangeFilter>,
    range_span: f64,
    always_report_updates: bool,
    ready_to_publish: bool,
    ready_to_trigger: bool,
    semantics_changed: bool,
    structure_changed: bool,
    queue: Option<NotificationQueue>,
}

/// Server-side record tracking one client's subscription to one
/// (node, attribute) pair.
///
/// Any producer thread may call [`value_changed`](Self::value_changed) and
/// [`queue_value`](Self::queue_value) concurrently with the publish engine
/// calling [`publish`](Self::publish); a single internal mutex guards all
/// mutable state for the full duration of each operation. Attribute reads
/// happen outside the critical section; the decide-and-enqueue step is
/// atomic.
pub struct MonitoredItem {
    id: u32,
    attribute_id: AttributeId,
    index_range: Option<IndexRange>,
    data_encoding: Option<String>,
    source: Arc<dyn AttributeSource>,
    clock: Arc<dyn MonitorClock>,
    detector: Arc<dyn ChangeDetector>,
    diagnostics: Arc<dyn DiagnosticsProvider>,
    limits: MonitorLimits,
    subscription: Mutex<Weak<dyn SubscriptionHandle>>,
    state: Mutex<ItemState>,
}

impl MonitoredItem {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u32,
        source: Arc<dyn AttributeSource>,
        clock: Arc<dyn MonitorClock>,
        detector: Arc<dyn ChangeDetector>,
        diagnostics: Arc<dyn DiagnosticsProvider>,
        limits: MonitorLimits,
        params: MonitoredItemCreateParams,
        subscription: Weak<dyn SubscriptionHandle>,
    ) -> Self {
        let revised_interval = limits.revise_sampling_interval(params.sampling_interval_ms);
        let revised_queue_size = limits.revise_queue_size(params.queue_size);

        let queue = if revised_queue_size > 1 {
            let mut queue = NotificationQueue::new(Arc::clone(&clock));
            queue.set_size(
                revised_queue_size,
                params.discard_oldest,
                params.diagnostics_mask.wants_operation_diagnostics(),
            );
            queue.set_sampling_interval(revised_interval);
            Some(queue)
        } else {
            None
        };

        let state = ItemState {
            monitoring_mode: params.monitoring_mode,
            diagnostics_mask: params.diagnostics_mask,
            timestamps_to_return: params.timestamps_to_return,
            client_handle: params.client_handle,
            sampling_interval_ms: revised_interval,
            next_sample_time: clock.now_ms(),
            last_value: None,
            last_error: None,
            filter: params.filter,
            range_span: params.range.map(|r| r.span()).unwrap_or(0.0),
            always_report_updates: params.always_report_updates,
            ready_to_publish: false,
            ready_to_trigger: false,
            semantics_changed: false,
            structure_changed: false,
            queue,
        };

        Self {
            id,
            attribute_id: params.attribute_id,
            index_range: params.index_range,
            data_encoding: params.data_encoding,
            source,
            clock,
            detector,
            diagnostics,
            limits,
            subscription: Mutex::new(subscription),
            state: Mutex::new(state),
        }
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn attribute_id(&self) -> AttributeId {
        self.attribute_id
    }

    #[inline]
    pub fn index_range(&self) -> Option<IndexRange> {
        self.index_range
    }

    #[inline]
    pub fn data_encoding(&self) -> Option<&str> {
        self.data_encoding.as_deref()
    }

    pub fn monitoring_mode(&self) -> MonitoringMode {
        self.state.lock().monitoring_mode
    }

    pub fn sampling_interval_ms(&self) -> f64 {
        self.state.lock().sampling_interval_ms
    }

    pub fn client_handle(&self) -> u32 {
        self.state.lock().client_handle
    }

    pub fn always_report_updates(&self) -> bool {
        self.state.lock().always_report_updates
    }

    pub fn set_always_report_updates(&self, always: bool) {
        self.state.lock().always_report_updates = always;
    }

    /// Attach the owning subscription handle. Held weakly: the item never
    /// extends the subscription's lifetime.
    pub fn set_subscription(&self, subscription: Weak<dyn SubscriptionHandle>) {
        *self.subscription.lock() = subscription;
    }

    /// Identifier of the owning subscription; 0 when it is gone.
    pub fn subscription_id(&self) -> u32 {
        self.subscription
            .lock()
            .upgrade()
            .map(|s| s.id())
            .unwrap_or(0)
    }

    pub fn session_id(&self) -> Option<u64> {
        self.subscription
            .lock()
            .upgrade()
            .and_then(|s| s.session_id())
    }

    /// Milliseconds until the next scheduled sample: `i64::MAX` when
    /// disabled, 0 when the deadline has already elapsed.
    pub fn time_to_next_sample(&self) -> i64 {
        let state = self.state.lock();
        if state.monitoring_mode == MonitoringMode::Disabled {
            return i64::MAX;
        }
        let now = self.clock.now_ms();
        if state.next_sample_time <= now {
            return 0;
        }
        state.next_sample_time - now
    }

    /// True only if a change is pending, the mode is `Reporting`, and the
    /// scheduled sample time has arrived. The timing gate decouples "a
    /// change occurred" from "it is time to tell the client".
    pub fn is_ready_to_publish(&self) -> bool {
        let state = self.state.lock();
        Self::ready_locked(&state, self.clock.now_ms())
    }

    fn ready_locked(state: &ItemState, now: i64) -> bool {
        if !state.ready_to_publish {
            return false;
        }
        if state.monitoring_mode != MonitoringMode::Reporting {
            return false;
        }
        state.next_sample_time <= now
    }

    /// Trigger readiness for linked items; forced false while disabled
    /// regardless of the stored flag.
    pub fn is_ready_to_trigger(&self) -> bool {
        let state = self.state.lock();
        if state.monitoring_mode == MonitoringMode::Disabled {
            return false;
        }
        state.ready_to_trigger
    }

    pub fn set_ready_to_trigger(&self, ready: bool) {
        self.state.lock().ready_to_trigger = ready;
    }

    /// The next delivered notification will carry the SemanticsChanged
    /// status bit; consumed exactly once.
    pub fn set_semantics_changed(&self) {
        self.state.lock().semantics_changed = true;
    }

    /// The next delivered notification will carry the StructureChanged
    /// status bit; consumed exactly once.
    pub fn set_structure_changed(&self) {
        self.state.lock().structure_changed = true;
    }

    /// Change the monitoring mode, returning the previous mode.
    ///
    /// Leaving `Disabled` re-anchors the sample schedule at "now" and clears
    /// the last delivered value so the next value is always treated as a
    /// change. Entering `Disabled` clears both ready flags; queued entries
    /// are retained and will replay if the item is re-enabled unmodified.
    pub fn set_monitoring_mode(&self, mode: MonitoringMode) -> MonitoringMode {
        let mut state = self.state.lock();
        let previous = state.monitoring_mode;

        if previous == mode {
            return previous;
        }

        if previous == MonitoringMode::Disabled {
            state.next_sample_time = self.clock.now_ms();
            state.last_value = None;
            state.last_error = None;
        }

        state.monitoring_mode = mode;

        if mode == MonitoringMode::Disabled {
            state.ready_to_publish = false;
            state.ready_to_trigger = false;
        }

        tracing::debug!(
            monitored_item_id = self.id,
            ?previous,
            new_mode = ?mode,
            "monitoring mode changed"
        );

        previous
    }

    /// Atomically update the item's configuration. A concurrent `publish`
    /// never observes a half-updated configuration.
    pub fn modify(&self, params: MonitoredItemModifyParams) -> MonitoredItemModifyResult {
        let mut state = self.state.lock();

        state.diagnostics_mask = params.diagnostics_mask;
        state.timestamps_to_return = params.timestamps_to_return;
        state.client_handle = params.client_handle;

        // phase-preserving interval change: remove the old interval's
        // contribution before adding the new one.
        let old_interval = state.sampling_interval_ms as i64;
        if old_interval < state.next_sample_time {
            state.next_sample_time -= old_interval;
        }

        let revised_interval = self.limits.revise_sampling_interval(params.sampling_interval_ms);
        state.sampling_interval_ms = revised_interval;

        let new_interval = revised_interval as i64;
        if revised_interval > 0.0 {
            state.next_sample_time += new_interval;
        } else {
            state.next_sample_time = 0;
        }

        state.filter = params.filter;
        state.range_span = params.range.map(|r| r.span()).unwrap_or(0.0);

        let revised_queue_size = self.limits.revise_queue_size(params.queue_size);
        if revised_queue_size > 1 {
            let keep_errors = state.diagnostics_mask.wants_operation_diagnostics();
            let queue = state
                .queue
                .get_or_insert_with(|| NotificationQueue::new(Arc::clone(&self.clock)));
            queue.set_size(revised_queue_size, params.discard_oldest, keep_errors);
            queue.set_sampling_interval(revised_interval);
        } else {
            state.queue = None;
        }

        tracing::debug!(
            monitored_item_id = self.id,
            sampling_interval_ms = revised_interval,
            queue_size = revised_queue_size,
            "monitored item modified"
        );

        Self::modify_result_locked(&state)
    }

    /// Revised parameters for the create response.
    pub fn create_result(&self) -> MonitoredItemCreateResult {
        let state = self.state.lock();
        MonitoredItemCreateResult {
            monitored_item_id: self.id,
            status: StatusCode::GOOD,
            revised_sampling_interval_ms: state.sampling_interval_ms,
            revised_queue_size: state.queue.as_ref().map(|q| q.capacity()).unwrap_or(0),
            filter_result: None,
        }
    }

    /// Revised parameters for the modify response.
    pub fn modify_result(&self) -> MonitoredItemModifyResult {
        Self::modify_result_locked(&self.state.lock())
    }

    fn modify_result_locked(state: &ItemState) -> MonitoredItemModifyResult {
        MonitoredItemModifyResult {
            status: StatusCode::GOOD,
            revised_sampling_interval_ms: state.sampling_interval_ms,
            revised_queue_size: state.queue.as_ref().map(|q| q.capacity()).unwrap_or(0),
            filter_result: None,
        }
    }

    /// React to a change of the monitored attribute: re-read it from the
    /// source node and queue the result. A failed read is not fatal — it
    /// becomes a queued value carrying only the bad status code.
    pub fn value_changed(&self, ctx: &RequestContext) {
        let (mut value, error) =
            self.source
                .read_attribute(ctx, self.attribute_id, self.index_range);

        if error.as_ref().is_some_and(|e| e.is_bad()) {
            value = DataValue::from_status(error.as_ref().map(|e| e.status).unwrap_or_default());
        }

        value.server_timestamp = Some(self.clock.now_utc());

        self.queue_value(value, error);
    }

    /// Queue a new value if it constitutes a reportable change.
    ///
    /// Unless `always_report_updates` is set, the external change predicate
    /// decides reportability against the last delivered pair; a suppressed
    /// value leaves all state untouched. An accepted value is stored (the
    /// clone keeps later caller mutation from reaching the stored copy),
    /// reconciled with a bad error's status code, forwarded to the owned
    /// queue when one exists, and flags the item ready to publish and
    /// trigger.
    pub fn queue_value(&self, value: DataValue, error: Option<ServiceError>) {
        let mut state = self.state.lock();

        if !state.always_report_updates {
            let check = ChangeCheck {
                value: Some(&value),
                error: error.as_ref(),
                last_value: state.last_value.as_ref(),
                last_error: state.last_error.as_ref(),
                filter: state.filter.as_ref(),
                range_span: state.range_span,
            };
            if !self.detector.has_changed(&check) {
                return;
            }
        }

        let mut value = value;
        if let Some(error) = error.as_ref() {
            // the delivered value must reflect the error's status code.
            if error.status != StatusCode::GOOD {
                value.status = error.status;
            }
        }

        state.last_value = Some(value.clone());
        state.last_error = error.clone();

        if let Some(queue) = state.queue.as_mut() {
            queue.queue_value(value, error);
        }

        state.ready_to_publish = true;
        state.ready_to_trigger = true;
    }

    fn increment_sample_time(&self, state: &mut ItemState) {
        let now = self.clock.now_ms();
        let interval = state.sampling_interval_ms as i64;

        if state.next_sample_time > 0 {
            let delta = now - state.next_sample_time;
            if interval > 0 && delta >= 0 {
                state.next_sample_time += (delta / interval + 1) * interval;
            }
        } else {
            state.next_sample_time = now + interval;
        }
    }

    /// Drain all ready notifications into the caller-supplied output lists.
    ///
    /// Returns false without touching the outputs when the item is not ready
    /// to publish. A queue-less item emits exactly one notification from the
    /// last value; a queued item drains every pending entry in FIFO order.
    pub fn publish(
        &self,
        ctx: &RequestContext,
        notifications: &mut Vec<Notification>,
        diagnostics: &mut Vec<Option<DiagnosticInfo>>,
    ) -> bool {
        let mut state = self.state.lock();

        if !Self::ready_locked(&state, self.clock.now_ms()) {
            return false;
        }

        self.increment_sample_time(&mut state);

        state.ready_to_publish = false;
        state.ready_to_trigger = false;

        // detach the queue while draining so emitting never overlaps a
        // borrow of the rest of the state.
        let mut queue = state.queue.take();
        match queue.as_mut() {
            None => {
                if let Some(value) = state.last_value.clone() {
                    self.emit(&mut state, ctx, value, notifications, diagnostics);
                }
            }
            Some(queue) => {
                let mut drained = Vec::with_capacity(queue.len());
                while let Some((value, _error)) = queue.publish() {
                    drained.push(value);
                }
                for value in drained {
                    self.emit(&mut state, ctx, value, notifications, diagnostics);
                }
            }
        }
        state.queue = queue;

        true
    }

    /// Emit one notification, applying the pending semantics/structure bits
    /// (consumed once), the timestamp selection, and a parallel diagnostic
    /// entry derived from the last recorded error.
    fn emit(
        &self,
        state: &mut ItemState,
        ctx: &RequestContext,
        mut value: DataValue,
        notifications: &mut Vec<Notification>,
        diagnostics: &mut Vec<Option<DiagnosticInfo>>,
    ) {
        if state.semantics_changed {
            value.status = value.status.with_semantics_changed();
            state.semantics_changed = false;
        }

        if state.structure_changed {
            value.status = value.status.with_structure_changed();
            state.structure_changed = false;
        }

        if !state.timestamps_to_return.wants_server() {
            value.server_timestamp = None;
        }
        if !state.timestamps_to_return.wants_source() {
            value.source_timestamp = None;
        }

        notifications.push(Notification {
            client_handle: state.client_handle,
            value,
        });

        let mut diagnostic_info = None;
        if state.diagnostics_mask.wants_operation_diagnostics() {
            if let Some(error) = state.last_error.as_ref() {
                diagnostic_info = self.diagnostics.create_diagnostic_info(ctx, error);
            }
        }
        diagnostics.push(diagnostic_info);
    }
}

impl fmt::Debug for MonitoredItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitoredItem")
            .field("id", &self.id)
            .field("attribute_id", &self.attribute_id)
            .finish_non_exhaustive()
    }
}
