use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::broadcaster::Broadcaster;
use crate::reading::Reading;

/// Identifies one connect..disconnect span of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionId(u64);

/// A consistent copy of the connection state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub connected: bool,
    pub last_measurement: Option<Reading>,
}

#[derive(Default)]
struct Inner {
    connected: bool,
    session: u64,
    last_measurement: Option<Reading>,
}

/// Whether the device is connected, and the most recent reading.
///
/// There is one of these per process. Recording a reading and publishing it to
/// subscribers happen under the same lock, so a reading is never stored without
/// being published or published without being stored, and concurrent recordings
/// reach every subscriber in the order they were stored.
pub struct ConnectionState {
    inner: RwLock<Inner>,
    broadcaster: Arc<Broadcaster>,
}

impl ConnectionState {
    pub fn new(broadcaster: Arc<Broadcaster>) -> Self {
        Self { inner: RwLock::new(Inner::default()), broadcaster }
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    pub fn set_connected(&self, connected: bool) {
        self.inner.write().connected = connected;
    }

    pub fn is_connected(&self) -> bool {
        self.inner.read().connected
    }

    /// Store a reading as the latest one and publish it to all subscribers.
    ///
    /// Returns the number of subscribers the reading was delivered to.
    pub fn record_reading(&self, reading: Reading) -> usize {
        let mut inner = self.inner.write();
        self.store_and_publish(&mut inner, reading)
    }

    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.read();
        Snapshot { connected: inner.connected, last_measurement: inner.last_measurement.clone() }
    }

    /// Mark the device connected and start a new session. Any earlier session
    /// can no longer record readings.
    pub fn begin_session(&self) -> SessionId {
        let mut inner = self.inner.write();
        inner.session += 1;
        inner.connected = true;
        SessionId(inner.session)
    }

    /// Mark the device disconnected if `session` is still the current session
    pub fn end_session(&self, session: SessionId) {
        let mut inner = self.inner.write();
        if inner.session == session.0 {
            inner.session += 1;
            inner.connected = false;
        }
    }

    /// Like [`ConnectionState::record_reading`] but refuses readings from a session
    /// which has ended. Returns false if the reading was refused.
    pub fn record_session_reading(&self, session: SessionId, reading: Reading) -> bool {
        let mut inner = self.inner.write();
        if !inner.connected || inner.session != session.0 {
            return false;
        }
        self.store_and_publish(&mut inner, reading);
        true
    }

    fn store_and_publish(&self, inner: &mut Inner, reading: Reading) -> usize {
        let delivered = self.broadcaster.publish(&reading);
        inner.last_measurement = Some(reading);
        delivered
    }
}

#[cfg(test)]
fn test_reading(raw: &str) -> Reading {
    let raw = hex::decode(raw).unwrap();
    Reading::decode(&crate::message::Decoder::default(), &raw, chrono::Local::now()).unwrap()
}

#[test]
fn test_initial_snapshot() {
    let state = ConnectionState::new(Arc::new(Broadcaster::new()));
    assert_eq!(state.snapshot(), Snapshot { connected: false, last_measurement: None });
}

#[test]
fn test_record_reading_overwrites_and_publishes() {
    let broadcaster = Arc::new(Broadcaster::new());
    let (_, mut rx) = broadcaster.open_channel();
    let state = ConnectionState::new(broadcaster);

    let first = test_reading("fd7800460041");
    let second = test_reading("fd9600500048");
    assert_eq!(state.record_reading(first), 1);
    assert_eq!(state.record_reading(second.clone()), 1);

    assert_eq!(state.snapshot().last_measurement, Some(second));
    assert!(rx.try_recv().is_ok());
    assert!(rx.try_recv().is_ok());
}

#[test]
fn test_set_connected_keeps_reading() {
    let state = ConnectionState::new(Arc::new(Broadcaster::new()));
    let reading = test_reading("fd9600500048");
    state.record_reading(reading.clone());
    state.set_connected(true);
    assert!(state.is_connected());
    state.set_connected(false);
    assert_eq!(state.snapshot(), Snapshot { connected: false, last_measurement: Some(reading) });
}

#[test]
fn test_ended_session_cannot_record() {
    let state = ConnectionState::new(Arc::new(Broadcaster::new()));
    let session = state.begin_session();
    assert!(state.record_session_reading(session, test_reading("fd7800460041")));

    state.end_session(session);
    assert!(!state.is_connected());
    assert!(!state.record_session_reading(session, test_reading("fd9600500048")));
    assert_eq!(state.snapshot().last_measurement.unwrap().systolic(), 120);
}

#[test]
fn test_stale_session_cannot_record_or_disconnect() {
    let state = ConnectionState::new(Arc::new(Broadcaster::new()));
    let old = state.begin_session();
    let new = state.begin_session();

    assert!(!state.record_session_reading(old, test_reading("fd7800460041")));
    state.end_session(old);
    assert!(state.is_connected());
    assert!(state.record_session_reading(new, test_reading("fd9600500048")));
}

#[test]
fn test_concurrent_snapshots_are_consistent() {
    let state = ConnectionState::new(Arc::new(Broadcaster::new()));
    // only ever stored while connected
    let a = test_reading("fd7800460041");
    let b = test_reading("fd9600500048");
    let c = test_reading("fd6e0046003c");

    // The writer cycles through (true, c) (true, a) (true, b) (false, b) (false, c).
    // A snapshot taking the flag and the reading separately could see (false, a).
    std::thread::scope(|s| {
        s.spawn(|| {
            for _ in 0..2000 {
                let session = state.begin_session();
                assert!(state.record_session_reading(session, a.clone()));
                state.record_reading(b.clone());
                state.end_session(session);
                state.record_reading(c.clone());
            }
        });
        s.spawn(|| {
            for _ in 0..20000 {
                let snapshot = state.snapshot();
                if let Some(reading) = snapshot.last_measurement {
                    assert!(reading == a || reading == b || reading == c);
                    assert!(snapshot.connected || reading != a, "disconnected snapshot paired with {reading:?}");
                }
            }
        });
    });
}
