use std::fmt::Display;
use std::sync::Arc;

use chrono::Local;
use futures_util::Stream;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::connection_state::ConnectionState;
use crate::connection_state::SessionId;
use crate::message::DecodeFailure;
use crate::message::Decoder;
use crate::reading::Reading;
use crate::reading_log::ReadingLog;

/// What became of one notification
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Stored as the latest reading and published
    Recorded(Reading),
    /// Could not be decoded. Nothing was stored or published.
    Rejected(DecodeFailure),
    /// Decoded, but the session it arrived on has ended
    SessionEnded,
}

/// Turns raw notifications into recorded readings.
pub struct Pipeline {
    decoder: Decoder,
    state: Arc<ConnectionState>,
    log: Option<ReadingLog>,
}

impl Pipeline {
    pub fn new(decoder: Decoder, state: Arc<ConnectionState>, log: Option<ReadingLog>) -> Self {
        Self { decoder, state, log }
    }

    pub fn state(&self) -> &Arc<ConnectionState> {
        &self.state
    }

    /// Decode, classify and record a single notification received during `session`
    pub fn process(&self, session: SessionId, data: &[u8]) -> Outcome {
        let h = hex::encode(data);
        log::debug!("RX notification: 0x{h}");

        let reading = match Reading::decode(&self.decoder, data, Local::now()) {
            Ok(reading) => reading,
            Err(e) => {
                log::warn!("Discarding notification 0x{h}: {e}");
                return Outcome::Rejected(e);
            }
        };

        if !self.state.record_session_reading(session, reading.clone()) {
            log::info!("Discarding reading from ended session");
            return Outcome::SessionEnded;
        }

        log::info!(
            "Measurement: {}/{} mmHg, HR: {} ({})",
            reading.systolic(),
            reading.diastolic(),
            reading.pulse(),
            reading.classification().name()
        );

        if let Some(reading_log) = &self.log {
            if let Err(e) = reading_log.append(&reading) {
                log::warn!("Failed to append reading to {}: {e:#}", reading_log.path().display());
            }
        }

        Outcome::Recorded(reading)
    }

    /// Process notifications one at a time, in arrival order, until the stream
    /// ends or `cancel` fires.
    ///
    /// The end of the stream means the connection was lost, so the session is
    /// ended. On cancellation the session is left for the canceller to end.
    pub async fn run<S, E>(&self, session: SessionId, mut notifications: S, cancel: CancellationToken)
    where
        S: Stream<Item = Result<Vec<u8>, E>> + Unpin,
        E: Display,
    {
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    log::debug!("Notification processing cancelled");
                    return;
                }
                next = notifications.next() => next,
            };

            match next {
                Some(Ok(data)) => {
                    if self.process(session, &data) == Outcome::SessionEnded {
                        return;
                    }
                }
                Some(Err(err)) => {
                    log::warn!("Notification error: {err}");
                }
                None => {
                    log::info!("End of notification stream");
                    self.state.end_session(session);
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
fn test_pipeline() -> Pipeline {
    let broadcaster = Arc::new(crate::broadcaster::Broadcaster::new());
    let state = Arc::new(ConnectionState::new(broadcaster));
    Pipeline::new(Decoder::default(), state, None)
}

#[test]
fn test_process_end_to_end() {
    let pipeline = test_pipeline();
    let (_, mut rx) = pipeline.state().broadcaster().open_channel();
    let session = pipeline.state().begin_session();

    let outcome = pipeline.process(session, &[0xFD, 0x96, 0x00, 0x50, 0x00, 0x48]);
    let reading = match outcome {
        Outcome::Recorded(reading) => reading,
        other => panic!("expected a reading, got {other:?}"),
    };
    assert_eq!((reading.systolic(), reading.diastolic(), reading.pulse()), (150, 80, 72));
    assert_eq!(reading.classification(), crate::classification::SeverityTier::Stage1High);
    assert_eq!(reading.classification().color(), "#FF9800");

    assert_eq!(pipeline.state().snapshot().last_measurement, Some(reading));
    assert!(rx.try_recv().is_ok());
}

#[test]
fn test_process_rejects_without_publishing() {
    let pipeline = test_pipeline();
    let (_, mut rx) = pipeline.state().broadcaster().open_channel();
    let session = pipeline.state().begin_session();

    let outcome = pipeline.process(session, &[0xFD, 0x0A, 0x00, 0x50, 0x00, 0x48]);
    assert!(matches!(outcome, Outcome::Rejected(DecodeFailure::Implausible(_))));
    assert_eq!(pipeline.process(session, &[0xFD]), Outcome::Rejected(DecodeFailure::TooShort { len: 1 }));

    assert_eq!(pipeline.state().snapshot().last_measurement, None);
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_process_after_disconnect() {
    let pipeline = test_pipeline();
    let session = pipeline.state().begin_session();
    pipeline.state().end_session(session);

    let outcome = pipeline.process(session, &[0xFD, 0x96, 0x00, 0x50, 0x00, 0x48]);
    assert_eq!(outcome, Outcome::SessionEnded);
    assert_eq!(pipeline.state().snapshot().last_measurement, None);
}

#[tokio::test]
async fn test_run_processes_in_order_and_ends_session() {
    let pipeline = test_pipeline();
    let (_, mut rx) = pipeline.state().broadcaster().open_channel();
    let session = pipeline.state().begin_session();

    let notifications = futures_util::stream::iter(vec![
        Ok(hex::decode("fd7800460041").unwrap()),
        Ok(hex::decode("fd0a00").unwrap()),
        Err("link hiccup"),
        Ok(hex::decode("fd9600500048").unwrap()),
    ]);
    pipeline.run(session, notifications, CancellationToken::new()).await;

    let snapshot = pipeline.state().snapshot();
    assert!(!snapshot.connected);
    assert_eq!(snapshot.last_measurement.unwrap().systolic(), 150);

    let systolics: Vec<u64> = std::iter::from_fn(|| rx.try_recv().ok())
        .map(|frame| {
            let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
            json["data"]["systolic"].as_u64().unwrap()
        })
        .collect();
    assert_eq!(systolics, vec![120, 150]);
}

#[tokio::test]
async fn test_run_stops_when_cancelled() {
    let pipeline = test_pipeline();
    let session = pipeline.state().begin_session();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let notifications = futures_util::stream::pending::<Result<Vec<u8>, String>>();
    pipeline.run(session, notifications, cancel).await;

    assert!(pipeline.state().is_connected());
}

#[test]
fn test_process_appends_to_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("readings.jsonl");
    let state = Arc::new(ConnectionState::new(Arc::new(crate::broadcaster::Broadcaster::new())));
    let pipeline = Pipeline::new(Decoder::default(), state, Some(ReadingLog::new(&path)));
    let session = pipeline.state().begin_session();

    pipeline.process(session, &[0xFD, 0x96, 0x00, 0x50, 0x00, 0x48]);
    pipeline.process(session, &[0xFD]);

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents.lines().count(), 1);
}
