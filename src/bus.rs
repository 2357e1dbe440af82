//! Publish/subscribe event bus with middleware (v0.1)
//!
//! Decouples producers of state changes from consumers while letting
//! cross-cutting concerns (logging, timing, analytics) observe every event
//! uniformly through an ordered middleware chain.
//!
//! Failure semantics:
//! - Handler errors are isolated per handler: logged, then surfaced as a
//!   secondary `error:occurred` event. They never reach the emitter.
//! - Middleware errors abort the chain and propagate to `emit`'s caller.
//!
//! Dispatch snapshots the handler tables under a short lock and fans out
//! lock-free, so handlers may subscribe, unsubscribe and emit re-entrantly.
//! FIFO order per handler is preserved for events emitted from one thread.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ScoutError;
use crate::event::{Event, EventKind, EventName};

/// Default bound on the recording buffer (ring semantics)
pub const DEFAULT_MAX_HISTORY: usize = 1000;

/// Subscriber callback. Errors are contained by the bus.
pub type Handler = Arc<dyn Fn(&Event) -> Result<(), ScoutError> + Send + Sync>;

/// Opaque token returned by `on`/`once`/`on_any`, used for `off`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Chain-of-responsibility observer. Call `next.run()` to continue
/// delivery; drop it to short-circuit (no listener runs). Returning an
/// error aborts the chain and propagates to the emitter.
pub trait Middleware: Send + Sync {
    fn handle(&self, event: &Event, next: Next<'_>) -> Result<(), ScoutError>;
}

/// Continuation of the middleware chain
pub struct Next<'a> {
    event: &'a Event,
    chain: &'a [Arc<dyn Middleware>],
    terminal: &'a dyn Fn(&Event),
}

impl<'a> Next<'a> {
    /// Run the rest of the chain, then the listener fan-out
    pub fn run(self) -> Result<(), ScoutError> {
        match self.chain.split_first() {
            Some((head, rest)) => head.handle(
                self.event,
                Next {
                    event: self.event,
                    chain: rest,
                    terminal: self.terminal,
                },
            ),
            None => {
                (self.terminal)(self.event);
                Ok(())
            }
        }
    }
}

struct Subscriber {
    id: u64,
    once: bool,
    handler: Handler,
}

/// Process-wide publish/subscribe dispatcher
pub struct EventBus {
    start: Instant,
    next_seq: AtomicU64,
    next_handler_id: AtomicU64,
    handlers: RwLock<HashMap<EventName, Vec<Subscriber>>>,
    wildcard: RwLock<Vec<Subscriber>>,
    middleware: RwLock<Vec<Arc<dyn Middleware>>>,
    recording: AtomicBool,
    history: Mutex<VecDeque<Event>>,
    max_history: usize,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Self::with_max_history(DEFAULT_MAX_HISTORY)
    }

    /// Create a bus with a custom recording buffer bound
    pub fn with_max_history(max_history: usize) -> Arc<Self> {
        Arc::new(Self {
            start: Instant::now(),
            next_seq: AtomicU64::new(0),
            next_handler_id: AtomicU64::new(0),
            handlers: RwLock::new(HashMap::new()),
            wildcard: RwLock::new(Vec::new()),
            middleware: RwLock::new(Vec::new()),
            recording: AtomicBool::new(false),
            history: Mutex::new(VecDeque::new()),
            max_history: max_history.max(1),
        })
    }

    // ─────────────────────────────────────────────────────────────
    // Subscriptions
    // ─────────────────────────────────────────────────────────────

    /// Subscribe to one event type
    pub fn on<F>(&self, name: EventName, handler: F) -> HandlerId
    where
        F: Fn(&Event) -> Result<(), ScoutError> + Send + Sync + 'static,
    {
        self.subscribe(Some(name), Arc::new(handler), false)
    }

    /// Subscribe to one event type; removed automatically after the first
    /// invocation, even when that invocation is triggered from inside
    /// another handler's execution.
    pub fn once<F>(&self, name: EventName, handler: F) -> HandlerId
    where
        F: Fn(&Event) -> Result<(), ScoutError> + Send + Sync + 'static,
    {
        self.subscribe(Some(name), Arc::new(handler), true)
    }

    /// Subscribe to every event (wildcard channel)
    pub fn on_any<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&Event) -> Result<(), ScoutError> + Send + Sync + 'static,
    {
        self.subscribe(None, Arc::new(handler), false)
    }

    fn subscribe(&self, name: Option<EventName>, handler: Handler, once: bool) -> HandlerId {
        let id = self.next_handler_id.fetch_add(1, Ordering::SeqCst);
        let sub = Subscriber { id, once, handler };
        match name {
            Some(name) => self.handlers.write().entry(name).or_default().push(sub),
            None => self.wildcard.write().push(sub),
        }
        HandlerId(id)
    }

    /// Unsubscribe. Returns false if the id was not registered (or its
    /// once-handler already fired).
    pub fn off(&self, id: HandlerId) -> bool {
        {
            let mut handlers = self.handlers.write();
            for subs in handlers.values_mut() {
                if let Some(idx) = subs.iter().position(|s| s.id == id.0) {
                    subs.remove(idx);
                    return true;
                }
            }
        }
        let mut wildcard = self.wildcard.write();
        if let Some(idx) = wildcard.iter().position(|s| s.id == id.0) {
            wildcard.remove(idx);
            return true;
        }
        false
    }

    /// Number of live subscribers for one event type
    pub fn handler_count(&self, name: EventName) -> usize {
        self.handlers.read().get(&name).map_or(0, Vec::len)
    }

    // ─────────────────────────────────────────────────────────────
    // Middleware
    // ─────────────────────────────────────────────────────────────

    /// Append to the middleware chain (append-only; registration order
    /// is execution order)
    pub fn use_middleware(&self, middleware: Arc<dyn Middleware>) {
        self.middleware.write().push(middleware);
    }

    // ─────────────────────────────────────────────────────────────
    // Emission
    // ─────────────────────────────────────────────────────────────

    /// Construct and dispatch an event. Returns the event's seq.
    pub fn emit(&self, kind: EventKind, source: impl Into<String>) -> Result<u64, ScoutError> {
        self.emit_inner(kind, source.into(), None)
    }

    /// Emit with key-value annotations attached
    pub fn emit_with_metadata(
        &self,
        kind: EventKind,
        source: impl Into<String>,
        metadata: HashMap<String, Value>,
    ) -> Result<u64, ScoutError> {
        self.emit_inner(kind, source.into(), Some(metadata))
    }

    fn emit_inner(
        &self,
        kind: EventKind,
        source: String,
        metadata: Option<HashMap<String, Value>>,
    ) -> Result<u64, ScoutError> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let event = Event {
            seq,
            timestamp_ms: self.start.elapsed().as_millis() as u64,
            source,
            kind,
            metadata,
        };

        if self.recording.load(Ordering::SeqCst) {
            let mut history = self.history.lock();
            if history.len() >= self.max_history {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        let chain: Vec<Arc<dyn Middleware>> = self.middleware.read().clone();
        let terminal = |event: &Event| self.fan_out(event);
        Next {
            event: &event,
            chain: &chain,
            terminal: &terminal,
        }
        .run()?;

        Ok(seq)
    }

    /// Deliver to type subscribers first, then wildcard subscribers,
    /// each group in subscription order. Once-handlers are claimed while
    /// snapshotting, so nested emits cannot fire them twice.
    fn fan_out(&self, event: &Event) {
        let mut snapshot: Vec<Handler> = Vec::new();

        {
            let mut handlers = self.handlers.write();
            if let Some(subs) = handlers.get_mut(&event.name()) {
                snapshot.extend(subs.iter().map(|s| Arc::clone(&s.handler)));
                subs.retain(|s| !s.once);
            }
        }
        {
            let mut wildcard = self.wildcard.write();
            snapshot.extend(wildcard.iter().map(|s| Arc::clone(&s.handler)));
            wildcard.retain(|s| !s.once);
        }

        for handler in snapshot {
            if let Err(err) = handler(event) {
                warn!(event = %event.name(), error = %err, "handler failed");
                // One failing handler must not block the others, and
                // failures inside error:occurred subscribers stay logged-only.
                if event.name() != EventName::ErrorOccurred {
                    let secondary = EventKind::ErrorOccurred {
                        origin: event.name().to_string(),
                        error: err.to_string(),
                    };
                    if let Err(err) = self.emit(secondary, "bus") {
                        warn!(error = %err, "error event emission failed");
                    }
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Recording and replay
    // ─────────────────────────────────────────────────────────────

    /// Begin capturing emitted events into the bounded history buffer
    pub fn start_recording(&self) {
        self.history.lock().clear();
        self.recording.store(true, Ordering::SeqCst);
    }

    /// Stop capturing; returns and clears the accumulated buffer
    pub fn stop_recording(&self) -> Vec<Event> {
        self.recording.store(false, Ordering::SeqCst);
        self.history.lock().drain(..).collect()
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// Re-deliver a captured sequence to current subscribers, preserving
    /// relative inter-event timing scaled by `speed`. Replays go straight
    /// to listeners: middleware is skipped so logging/analytics side
    /// effects are not double-counted, and the history buffer is untouched.
    pub async fn replay(&self, events: &[Event], speed: f64) -> Result<usize, ScoutError> {
        if !(speed > 0.0) {
            return Err(ScoutError::ReplaySpeed { speed });
        }

        let mut prev_ts: Option<u64> = None;
        for event in events {
            if let Some(prev) = prev_ts {
                let delta = event.timestamp_ms.saturating_sub(prev);
                let scaled = (delta as f64 / speed).round() as u64;
                if scaled > 0 {
                    tokio::time::sleep(Duration::from_millis(scaled)).await;
                }
            }
            prev_ts = Some(event.timestamp_ms);
            debug!(event = %event.name(), seq = event.seq, "replay");
            self.fan_out(event);
        }
        Ok(events.len())
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("recording", &self.is_recording())
            .field("max_history", &self.max_history)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter_handler(counter: Arc<AtomicUsize>) -> impl Fn(&Event) -> Result<(), ScoutError> {
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn toast() -> EventKind {
        EventKind::ToastShown {
            message: "hi".into(),
            level: "info".into(),
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Subscribe / unsubscribe
    // ─────────────────────────────────────────────────────────────

    #[test]
    fn emit_reaches_type_and_wildcard_subscribers() {
        let bus = EventBus::new();
        let typed = Arc::new(AtomicUsize::new(0));
        let any = Arc::new(AtomicUsize::new(0));

        bus.on(EventName::ToastShown, counter_handler(typed.clone()));
        bus.on_any(counter_handler(any.clone()));

        bus.emit(toast(), "test").unwrap();
        bus.emit(
            EventKind::ZoneRemoved {
                zone_id: "z1".into(),
            },
            "test",
        )
        .unwrap();

        assert_eq!(typed.load(Ordering::SeqCst), 1);
        assert_eq!(any.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn offed_handler_never_fires_again() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let id = bus.on(EventName::ToastShown, counter_handler(count.clone()));

        bus.emit(toast(), "test").unwrap();
        assert!(bus.off(id));
        bus.emit(toast(), "test").unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!bus.off(id), "double off reports false");
    }

    #[test]
    fn once_fires_exactly_once_across_two_emits() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.once(EventName::ToastShown, counter_handler(count.clone()));

        bus.emit(toast(), "test").unwrap();
        bus.emit(toast(), "test").unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.handler_count(EventName::ToastShown), 0);
    }

    #[test]
    fn once_survives_nested_emit_exactly_once() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.once(EventName::ToastShown, counter_handler(count.clone()));

        // A zone:removed handler that re-emits toast while the first toast
        // is still dispatching would double-fire a naive once.
        let bus2 = Arc::clone(&bus);
        bus.on(EventName::ZoneRemoved, move |_| {
            bus2.emit(
                EventKind::ToastShown {
                    message: "nested".into(),
                    level: "info".into(),
                },
                "nested",
            )?;
            Ok(())
        });

        bus.emit(toast(), "test").unwrap();
        bus.emit(
            EventKind::ZoneRemoved {
                zone_id: "z1".into(),
            },
            "test",
        )
        .unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn typed_handlers_run_before_wildcard_regardless_of_registration() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        // Wildcard registered first must still run after the typed handler.
        let o = Arc::clone(&order);
        bus.on_any(move |_| {
            o.lock().push("wildcard");
            Ok(())
        });
        let o = Arc::clone(&order);
        bus.on(EventName::ToastShown, move |_| {
            o.lock().push("typed");
            Ok(())
        });

        bus.emit(toast(), "test").unwrap();
        assert_eq!(*order.lock(), vec!["typed", "wildcard"]);
    }

    #[test]
    fn handlers_run_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            bus.on(EventName::ToastShown, move |_| {
                order.lock().push(tag);
                Ok(())
            });
        }

        bus.emit(toast(), "test").unwrap();
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    // ─────────────────────────────────────────────────────────────
    // Middleware
    // ─────────────────────────────────────────────────────────────

    struct Tag {
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Middleware for Tag {
        fn handle(&self, _event: &Event, next: Next<'_>) -> Result<(), ScoutError> {
            self.log.lock().push(self.label);
            next.run()
        }
    }

    struct Drop_;

    impl Middleware for Drop_ {
        fn handle(&self, _event: &Event, _next: Next<'_>) -> Result<(), ScoutError> {
            // Short-circuit: never call next
            Ok(())
        }
    }

    struct Fail;

    impl Middleware for Fail {
        fn handle(&self, _event: &Event, _next: Next<'_>) -> Result<(), ScoutError> {
            Err(ScoutError::Source("middleware down".into()))
        }
    }

    #[test]
    fn middleware_runs_in_registration_order_before_listeners() {
        let bus = EventBus::new();
        let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        bus.use_middleware(Arc::new(Tag {
            label: "mw1",
            log: log.clone(),
        }));
        bus.use_middleware(Arc::new(Tag {
            label: "mw2",
            log: log.clone(),
        }));
        let log2 = log.clone();
        bus.on(EventName::ToastShown, move |_| {
            log2.lock().push("listener");
            Ok(())
        });

        bus.emit(toast(), "test").unwrap();
        assert_eq!(*log.lock(), vec!["mw1", "mw2", "listener"]);
    }

    #[test]
    fn middleware_short_circuit_blocks_listeners() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.use_middleware(Arc::new(Drop_));
        bus.on(EventName::ToastShown, counter_handler(count.clone()));

        bus.emit(toast(), "test").unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn middleware_error_propagates_to_emitter() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.use_middleware(Arc::new(Fail));
        bus.on(EventName::ToastShown, counter_handler(count.clone()));

        let result = bus.emit(toast(), "test");
        assert!(result.is_err());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    // ─────────────────────────────────────────────────────────────
    // Handler fault isolation
    // ─────────────────────────────────────────────────────────────

    #[test]
    fn failing_handler_does_not_block_others() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        bus.on(EventName::ToastShown, |_| {
            Err(ScoutError::Handler("boom".into()))
        });
        bus.on(EventName::ToastShown, counter_handler(count.clone()));

        bus.emit(toast(), "test").unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_handler_triggers_error_event() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        bus.on(EventName::ToastShown, |_| {
            Err(ScoutError::Handler("boom".into()))
        });
        let seen2 = seen.clone();
        bus.on(EventName::ErrorOccurred, move |event| {
            if let EventKind::ErrorOccurred { origin, error } = &event.kind {
                seen2.lock().push((origin.clone(), error.clone()));
            }
            Ok(())
        });

        bus.emit(toast(), "test").unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "ui:toast");
        assert!(seen[0].1.contains("boom"));
    }

    #[test]
    fn failing_error_handler_does_not_recurse() {
        let bus = EventBus::new();
        bus.on(EventName::ToastShown, |_| {
            Err(ScoutError::Handler("boom".into()))
        });
        bus.on(EventName::ErrorOccurred, |_| {
            Err(ScoutError::Handler("meta-boom".into()))
        });

        // Must terminate: error-handler failures are logged only.
        bus.emit(toast(), "test").unwrap();
    }

    // ─────────────────────────────────────────────────────────────
    // Recording and replay
    // ─────────────────────────────────────────────────────────────

    #[test]
    fn recording_captures_emits_in_order() {
        let bus = EventBus::new();
        bus.start_recording();
        assert!(bus.is_recording());

        for _ in 0..3 {
            bus.emit(toast(), "test").unwrap();
        }
        let events = bus.stop_recording();

        assert!(!bus.is_recording());
        assert_eq!(events.len(), 3);
        assert!(events.windows(2).all(|w| w[0].seq < w[1].seq));
        assert!(events.iter().all(|e| e.name() == EventName::ToastShown));
    }

    #[test]
    fn recording_buffer_is_bounded_ring() {
        let bus = EventBus::with_max_history(2);
        bus.start_recording();
        let s1 = bus.emit(toast(), "test").unwrap();
        let s2 = bus.emit(toast(), "test").unwrap();
        let s3 = bus.emit(toast(), "test").unwrap();

        let events = bus.stop_recording();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].seq, s2);
        assert_eq!(events[1].seq, s3);
        let _ = s1;
    }

    #[test]
    fn stop_recording_clears_buffer() {
        let bus = EventBus::new();
        bus.start_recording();
        bus.emit(toast(), "test").unwrap();
        assert_eq!(bus.stop_recording().len(), 1);

        bus.start_recording();
        assert_eq!(bus.stop_recording().len(), 0);
    }

    #[tokio::test]
    async fn replay_hits_listeners_not_middleware() {
        let bus = EventBus::new();
        let mw_log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        bus.use_middleware(Arc::new(Tag {
            label: "mw",
            log: mw_log.clone(),
        }));

        bus.start_recording();
        bus.emit(toast(), "test").unwrap();
        bus.emit(toast(), "test").unwrap();
        let events = bus.stop_recording();
        let mw_calls_before = mw_log.lock().len();

        let count = Arc::new(AtomicUsize::new(0));
        bus.on(EventName::ToastShown, counter_handler(count.clone()));

        let replayed = bus.replay(&events, 1000.0).await.unwrap();

        assert_eq!(replayed, 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(mw_log.lock().len(), mw_calls_before, "no double-counting");
    }

    #[tokio::test]
    async fn replay_rejects_non_positive_speed() {
        let bus = EventBus::new();
        assert!(matches!(
            bus.replay(&[], 0.0).await,
            Err(ScoutError::ReplaySpeed { .. })
        ));
        assert!(matches!(
            bus.replay(&[], -1.0).await,
            Err(ScoutError::ReplaySpeed { .. })
        ));
    }

    #[test]
    fn seq_is_monotonic_across_threads() {
        use std::thread;

        let bus = EventBus::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let bus = Arc::clone(&bus);
                thread::spawn(move || bus.emit(EventKind::DashboardDestroyed {
                    dashboard_id: "d".into(),
                }, "t").unwrap())
            })
            .collect();

        let mut seqs: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        seqs.sort_unstable();
        seqs.dedup();
        assert_eq!(seqs.len(), 8);
    }
}
