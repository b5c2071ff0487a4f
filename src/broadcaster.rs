use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::TransportFailure;
use crate::reading::Reading;

/// A serialized message, shared between all sinks it is delivered to
pub type Frame = Arc<str>;

/// Identity of a subscribed sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkId(u64);

/// Somewhere readings can be pushed to, e.g. a WebSocket connection.
///
/// `deliver` must not block. Sinks which need to do I/O should queue the frame
/// and let another task drain the queue.
pub trait Sink: Send + Sync {
    fn deliver(&self, frame: Frame) -> Result<(), TransportFailure>;
}

impl Sink for mpsc::UnboundedSender<Frame> {
    fn deliver(&self, frame: Frame) -> Result<(), TransportFailure> {
        self.send(frame).map_err(|_| TransportFailure)
    }
}

/// Messages pushed to live subscribers
#[derive(Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
enum Outbound<'a> {
    Measurement(&'a Reading),
}

/// Fan-out of readings to any number of subscribers.
///
/// Delivery is best effort. A sink that fails is dropped and the remaining
/// sinks still receive the frame. Each sink sees frames in publish order.
/// Nothing is replayed to sinks that subscribe later.
#[derive(Default)]
pub struct Broadcaster {
    next_id: AtomicU64,
    sinks: Mutex<HashMap<SinkId, Box<dyn Sink>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an identity for a sink which has not been subscribed yet
    pub fn next_sink_id(&self) -> SinkId {
        SinkId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a sink. Returns false, leaving the existing sink in place, if
    /// `id` is already subscribed.
    pub fn subscribe(&self, id: SinkId, sink: impl Sink + 'static) -> bool {
        let mut sinks = self.sinks.lock();
        if sinks.contains_key(&id) {
            return false;
        }
        sinks.insert(id, Box::new(sink));
        log::debug!("Subscriber {id:?} added. Total: {}", sinks.len());
        true
    }

    /// Remove a sink. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SinkId) {
        let mut sinks = self.sinks.lock();
        if sinks.remove(&id).is_some() {
            log::debug!("Subscriber {id:?} removed. Total: {}", sinks.len());
        }
    }

    /// Subscribe a new in-memory channel and return its receiving end.
    ///
    /// The sink is pruned on the next publish after the receiver is dropped.
    pub fn open_channel(&self) -> (SinkId, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_sink_id();
        self.subscribe(id, tx);
        (id, rx)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sinks.lock().len()
    }

    /// Push a reading to every subscriber, returning how many accepted it
    pub fn publish(&self, reading: &Reading) -> usize {
        let mut sinks = self.sinks.lock();
        if sinks.is_empty() {
            return 0;
        }

        let frame: Frame = match serde_json::to_string(&Outbound::Measurement(reading)) {
            Ok(json) => json.into(),
            Err(e) => {
                log::error!("Failed to serialize reading: {e}");
                return 0;
            }
        };

        let mut delivered = 0;
        sinks.retain(|id, sink| match sink.deliver(frame.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(e) => {
                log::warn!("Dropping subscriber {id:?}: {e}");
                false
            }
        });
        delivered
    }
}

#[cfg(test)]
fn test_reading(raw: &str) -> Reading {
    let raw = hex::decode(raw).unwrap();
    Reading::decode(&crate::message::Decoder::default(), &raw, chrono::Local::now()).unwrap()
}

#[cfg(test)]
struct ClosedSink;

#[cfg(test)]
impl Sink for ClosedSink {
    fn deliver(&self, _frame: Frame) -> Result<(), TransportFailure> {
        Err(TransportFailure)
    }
}

#[test]
fn test_publish_without_subscribers() {
    let broadcaster = Broadcaster::new();
    assert_eq!(broadcaster.publish(&test_reading("fd9600500048")), 0);
    assert_eq!(broadcaster.subscriber_count(), 0);
}

#[test]
fn test_publish_frame_format() {
    let broadcaster = Broadcaster::new();
    let (_, mut rx) = broadcaster.open_channel();
    let reading = test_reading("fd9600500048");
    assert_eq!(broadcaster.publish(&reading), 1);

    let frame = rx.try_recv().unwrap();
    let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(json["type"], "measurement");
    assert_eq!(json["data"], serde_json::to_value(&reading).unwrap());
}

#[test]
fn test_failing_sink_is_pruned() {
    let broadcaster = Broadcaster::new();
    let (_, mut rx_a) = broadcaster.open_channel();
    let closed = broadcaster.next_sink_id();
    broadcaster.subscribe(closed, ClosedSink);
    let (_, mut rx_b) = broadcaster.open_channel();
    assert_eq!(broadcaster.subscriber_count(), 3);

    assert_eq!(broadcaster.publish(&test_reading("fd9600500048")), 2);
    assert_eq!(broadcaster.subscriber_count(), 2);
    assert!(rx_a.try_recv().is_ok());
    assert!(rx_b.try_recv().is_ok());

    assert_eq!(broadcaster.publish(&test_reading("fd7800460041")), 2);
    assert!(rx_a.try_recv().is_ok());
    assert!(rx_b.try_recv().is_ok());
}

#[test]
fn test_dropped_receiver_is_pruned() {
    let broadcaster = Broadcaster::new();
    let (_, rx) = broadcaster.open_channel();
    drop(rx);
    assert_eq!(broadcaster.publish(&test_reading("fd9600500048")), 0);
    assert_eq!(broadcaster.subscriber_count(), 0);
}

#[test]
fn test_subscribe_is_idempotent() {
    let broadcaster = Broadcaster::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = broadcaster.next_sink_id();
    assert!(broadcaster.subscribe(id, tx.clone()));
    assert!(!broadcaster.subscribe(id, tx));
    assert_eq!(broadcaster.subscriber_count(), 1);

    broadcaster.publish(&test_reading("fd9600500048"));
    assert!(rx.try_recv().is_ok());
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_unsubscribe_twice() {
    let broadcaster = Broadcaster::new();
    let (id, mut rx) = broadcaster.open_channel();
    broadcaster.unsubscribe(id);
    broadcaster.unsubscribe(id);
    assert_eq!(broadcaster.publish(&test_reading("fd9600500048")), 0);
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_frames_arrive_in_publish_order() {
    let broadcaster = Broadcaster::new();
    let (_, mut rx) = broadcaster.open_channel();
    for raw in ["fd7800460041", "fd8c005a0042", "fdb4006e0043"] {
        broadcaster.publish(&test_reading(raw));
    }
    let pulses: Vec<u64> = std::iter::from_fn(|| rx.try_recv().ok())
        .map(|frame| {
            let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
            json["data"]["pulse"].as_u64().unwrap()
        })
        .collect();
    assert_eq!(pulses, vec![0x41, 0x42, 0x43]);
}
