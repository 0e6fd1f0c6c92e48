use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;

use crate::types::{Event, EventKind};

struct Subscriber {
    tx: mpsc::UnboundedSender<Event>,
    filter: Option<HashSet<EventKind>>,
    pending: Arc<AtomicUsize>,
}

impl Subscriber {
    fn accepts(&self, kind: EventKind) -> bool {
        self.filter.as_ref().map_or(true, |f| f.contains(&kind))
    }
}

/// Ordered broadcast channel from the engine to its consumers.
///
/// Every subscriber gets its own queue, so a slow consumer never causes
/// another one to miss events. `put` is fire-and-forget; `put_and_wait`
/// additionally waits (up to a timeout) for consumers to drain.
pub struct EventChannel {
    subscribers: Mutex<Vec<Subscriber>>,
    changed: Arc<Notify>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            changed: Arc::new(Notify::new()),
        }
    }

    /// Subscribe to every event.
    pub fn subscribe(&self) -> EventStream {
        self.add_subscriber(None)
    }

    /// Subscribe to events of the given kinds only, in publish order.
    pub fn subscribe_filtered(&self, kinds: impl IntoIterator<Item = EventKind>) -> EventStream {
        self.add_subscriber(Some(kinds.into_iter().collect()))
    }

    fn add_subscriber(&self, filter: Option<HashSet<EventKind>>) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        self.subscribers.lock().unwrap().push(Subscriber {
            tx,
            filter,
            pending: pending.clone(),
        });
        self.changed.notify_waiters();
        EventStream {
            rx,
            pending,
            changed: self.changed.clone(),
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        let mut subs = self.subscribers.lock().unwrap();
        subs.retain(|s| !s.tx.is_closed());
        subs.len()
    }

    /// Publish an event to every matching subscriber.
    pub fn put(&self, event: Event) {
        let kind = event.kind();
        let mut subs = self.subscribers.lock().unwrap();
        subs.retain(|sub| {
            if !sub.accepts(kind) {
                return !sub.tx.is_closed();
            }
            sub.pending.fetch_add(1, Ordering::SeqCst);
            if sub.tx.send(event.clone()).is_err() {
                sub.pending.fetch_sub(1, Ordering::SeqCst);
                return false;
            }
            true
        });
    }

    /// Publish an event and wait for consumers to catch up.
    ///
    /// With no subscriber yet, first waits for one to appear. The timeout is
    /// advisory: when it elapses the event has still been sent.
    pub async fn put_and_wait(&self, event: Event, timeout: Duration) {
        let deadline = Instant::now() + timeout;

        let _ = tokio::time::timeout_at(deadline, async {
            loop {
                let notified = self.changed.notified();
                if self.subscriber_count() > 0 {
                    break;
                }
                notified.await;
            }
        })
        .await;

        self.put(event);

        let waited = tokio::time::timeout_at(deadline, async {
            loop {
                let notified = self.changed.notified();
                if self.is_drained() {
                    break;
                }
                notified.await;
            }
        })
        .await;
        if waited.is_err() {
            tracing::debug!("Event consumers did not drain before timeout");
        }
    }

    fn is_drained(&self) -> bool {
        let subs = self.subscribers.lock().unwrap();
        subs.iter()
            .all(|s| s.tx.is_closed() || s.pending.load(Ordering::SeqCst) == 0)
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer side of an [`EventChannel`] subscription.
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<Event>,
    pending: Arc<AtomicUsize>,
    changed: Arc<Notify>,
}

impl EventStream {
    /// Wait for the next event. Returns `None` once the channel is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        let event = self.rx.recv().await?;
        self.mark_consumed();
        Some(event)
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<Event> {
        let event = self.rx.try_recv().ok()?;
        self.mark_consumed();
        Some(event)
    }

    fn mark_consumed(&self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
        self.changed.notify_waiters();
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.rx.close();
        self.changed.notify_waiters();
    }
}

/// Producer handle that optionally restricts which kinds get published.
///
/// The engine publishes through a sink so that, for example, a single-node
/// preview run can forward only its results to the shared channel.
#[derive(Clone)]
pub struct EventSink {
    channel: Arc<EventChannel>,
    allow: Option<Arc<HashSet<EventKind>>>,
}

impl EventSink {
    pub fn new(channel: Arc<EventChannel>) -> Self {
        Self {
            channel,
            allow: None,
        }
    }

    pub fn filtered(channel: Arc<EventChannel>, kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self {
            channel,
            allow: Some(Arc::new(kinds.into_iter().collect())),
        }
    }

    pub fn put(&self, event: Event) {
        if self.allows(event.kind()) {
            self.channel.put(event);
        }
    }

    pub async fn put_and_wait(&self, event: Event, timeout: Duration) {
        if self.allows(event.kind()) {
            self.channel.put_and_wait(event, timeout).await;
        }
    }

    pub fn channel(&self) -> &Arc<EventChannel> {
        &self.channel
    }

    fn allows(&self, kind: EventKind) -> bool {
        self.allow.as_ref().map_or(true, |a| a.contains(&kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeId;

    fn start(id: &str) -> Event {
        Event::node_start(NodeId::new(id))
    }

    #[tokio::test]
    async fn test_broadcast_to_all_subscribers() {
        let channel = EventChannel::new();
        let mut a = channel.subscribe();
        let mut b = channel.subscribe();

        channel.put(start("x"));
        channel.put(Event::finish("done"));

        for stream in [&mut a, &mut b] {
            assert_eq!(stream.recv().await.unwrap().kind(), EventKind::NodeStart);
            assert_eq!(stream.recv().await.unwrap().kind(), EventKind::Finish);
        }
    }

    #[tokio::test]
    async fn test_filtered_subscriber_preserves_order() {
        let channel = EventChannel::new();
        let mut starts_and_finish = channel.subscribe_filtered([EventKind::Finish, EventKind::NodeStart]);

        channel.put(start("a"));
        channel.put(Event::BackendReady);
        channel.put(start("b"));
        channel.put(Event::finish("done"));

        let mut kinds = Vec::new();
        while let Some(event) = starts_and_finish.try_recv() {
            kinds.push((event.kind(), event.node_id().cloned()));
        }
        assert_eq!(
            kinds,
            vec![
                (EventKind::NodeStart, Some(NodeId::new("a"))),
                (EventKind::NodeStart, Some(NodeId::new("b"))),
                (EventKind::Finish, None),
            ]
        );
    }

    #[tokio::test]
    async fn test_slow_consumer_does_not_affect_others() {
        let channel = EventChannel::new();
        let mut fast = channel.subscribe();
        let _slow = channel.subscribe();

        for i in 0..1000 {
            channel.put(start(&i.to_string()));
        }
        let mut count = 0;
        while fast.try_recv().is_some() {
            count += 1;
        }
        assert_eq!(count, 1000);
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let channel = EventChannel::new();
        let stream = channel.subscribe();
        assert_eq!(channel.subscriber_count(), 1);
        drop(stream);
        channel.put(Event::BackendReady);
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_put_and_wait_times_out_without_consumer_draining() {
        let channel = EventChannel::new();
        let mut stream = channel.subscribe();

        let started = Instant::now();
        channel
            .put_and_wait(Event::BackendStarted, Duration::from_millis(50))
            .await;
        assert!(started.elapsed() >= Duration::from_millis(50));
        // The event was delivered regardless.
        assert_eq!(stream.try_recv(), Some(Event::BackendStarted));
    }

    #[tokio::test]
    async fn test_put_and_wait_returns_once_drained() {
        let channel = Arc::new(EventChannel::new());
        let mut stream = channel.subscribe();

        let consumer = tokio::spawn(async move { stream.recv().await });

        tokio::time::timeout(
            Duration::from_secs(5),
            channel.put_and_wait(Event::BackendReady, Duration::from_secs(30)),
        )
        .await
        .expect("put_and_wait should return before its own timeout");

        assert_eq!(consumer.await.unwrap(), Some(Event::BackendReady));
    }

    #[tokio::test]
    async fn test_put_and_wait_waits_for_late_subscriber() {
        let channel = Arc::new(EventChannel::new());
        let producer = {
            let channel = channel.clone();
            tokio::spawn(async move {
                channel
                    .put_and_wait(Event::BackendStarted, Duration::from_secs(10))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        let mut stream = channel.subscribe();
        assert_eq!(stream.recv().await, Some(Event::BackendStarted));
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn test_sink_filters_on_producer_side() {
        let channel = Arc::new(EventChannel::new());
        let mut stream = channel.subscribe();
        let sink = EventSink::filtered(channel.clone(), [EventKind::Finish]);

        sink.put(start("a"));
        sink.put(Event::finish("ok"));

        assert_eq!(stream.try_recv().map(|e| e.kind()), Some(EventKind::Finish));
        assert!(stream.try_recv().is_none());
    }
}
