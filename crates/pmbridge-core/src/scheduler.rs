//! Periodic notify step.
//!
//! Each tick drains whatever the UART has buffered through the frame parser
//! and pushes the latest measurement to the connected central. Ticks while
//! disconnected or latched are no-ops.

use embedded_io::{Error as _, Read, ReadReady};
use log::{debug, warn};

use crate::error::BridgeError;
use crate::measurement::{Measurement, PAYLOAD_LEN};
use crate::state::DeviceState;

/// Bytes pulled from the serial source per read call.
const DRAIN_CHUNK: usize = 32;

/// Read failures in a row after which a tick stops draining.
const MAX_CONSECUTIVE_READ_ERRORS: usize = 4;

/// Outbound notification channel to the connected central.
pub trait Notifier {
    type Error: core::fmt::Debug;

    /// Push one payload. Fire-and-forget: no acknowledgement is expected.
    fn notify(
        &mut self,
        payload: &[u8; PAYLOAD_LEN],
    ) -> impl Future<Output = Result<(), Self::Error>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disconnected,
    Abnormal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Nothing was read or sent.
    Skipped(SkipReason),
    /// The current measurement was sent.
    Notified {
        /// Valid frames decoded during this tick
        frames: usize,
        measurement: Measurement,
    },
}

/// Run one scheduler tick.
pub async fn run_tick<S, N>(
    state: &mut DeviceState,
    serial: &mut S,
    notifier: &mut N,
) -> Result<TickOutcome, BridgeError>
where
    S: Read + ReadReady,
    N: Notifier,
{
    if state.is_abnormal() {
        return Ok(TickOutcome::Skipped(SkipReason::Abnormal));
    }
    if !state.is_connected() {
        return Ok(TickOutcome::Skipped(SkipReason::Disconnected));
    }

    state.set_notifying(true);

    let frames = drain(state, serial);

    let measurement = state.measurement();
    let sent = match measurement.to_payload() {
        Ok(payload) => notifier.notify(&payload).await.map_err(|e| {
            warn!("Notify failed: {:?}", e);
            BridgeError::Notify
        }),
        Err(e) => Err(BridgeError::from(e)),
    };

    state.set_notifying(false);
    sent?;

    debug!(
        "Notified {:.1} ug/m3 ({} new frame(s))",
        measurement.pm25, frames
    );
    Ok(TickOutcome::Notified {
        frames,
        measurement,
    })
}

/// Feed every buffered serial byte to the parser without blocking.
///
/// A failed read is logged and draining continues while the source still
/// reports data, up to `MAX_CONSECUTIVE_READ_ERRORS` failures in a row.
/// Returns the number of valid frames decoded.
fn drain<S>(state: &mut DeviceState, serial: &mut S) -> usize
where
    S: Read + ReadReady,
{
    let mut frames = 0;
    let mut errors = 0;
    let mut chunk = [0u8; DRAIN_CHUNK];

    while errors < MAX_CONSECUTIVE_READ_ERRORS {
        let n = match serial.read_ready().and_then(|ready| {
            if ready { serial.read(&mut chunk) } else { Ok(0) }
        }) {
            Ok(0) => return frames,
            Ok(n) => n,
            Err(e) => {
                errors += 1;
                warn!("{}", BridgeError::Serial(e.kind()));
                continue;
            }
        };
        errors = 0;

        frames += chunk[..n]
            .iter()
            .filter(|&&b| state.ingest(b).is_some())
            .count();
    }

    warn!("Serial drain gave up after {} consecutive read errors", errors);
    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::state::ConnectionEvent;
    use embassy_futures::block_on;
    use embedded_io::{ErrorKind, ErrorType};

    /// Serial source over a fixed byte script, handing out a few bytes per
    /// read like a UART FIFO would.
    struct ScriptedSerial<'a> {
        bytes: &'a [u8],
        reads: usize,
        fail: bool,
        /// Number of upcoming `read` calls that fail before data flows
        failed_reads: usize,
    }

    impl<'a> ScriptedSerial<'a> {
        fn new(bytes: &'a [u8]) -> Self {
            Self {
                bytes,
                reads: 0,
                fail: false,
                failed_reads: 0,
            }
        }

        fn flaky(bytes: &'a [u8], failed_reads: usize) -> Self {
            Self {
                failed_reads,
                ..Self::new(bytes)
            }
        }

        fn failing() -> Self {
            Self {
                bytes: &[],
                reads: 0,
                fail: true,
                failed_reads: 0,
            }
        }
    }

    impl ErrorType for ScriptedSerial<'_> {
        type Error = ErrorKind;
    }

    impl ReadReady for ScriptedSerial<'_> {
        fn read_ready(&mut self) -> Result<bool, Self::Error> {
            if self.fail {
                return Err(ErrorKind::Other);
            }
            Ok(!self.bytes.is_empty())
        }
    }

    impl Read for ScriptedSerial<'_> {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            self.reads += 1;
            if self.failed_reads > 0 {
                self.failed_reads -= 1;
                return Err(ErrorKind::Other);
            }
            let n = buf.len().min(self.bytes.len()).min(5);
            buf[..n].copy_from_slice(&self.bytes[..n]);
            self.bytes = &self.bytes[n..];
            Ok(n)
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: [[u8; PAYLOAD_LEN]; 8],
        count: usize,
        fail: bool,
    }

    impl Notifier for RecordingNotifier {
        type Error = ();

        async fn notify(&mut self, payload: &[u8; PAYLOAD_LEN]) -> Result<(), ()> {
            if self.fail {
                return Err(());
            }
            self.sent[self.count] = *payload;
            self.count += 1;
            Ok(())
        }
    }

    fn connected() -> DeviceState {
        let mut state = DeviceState::new();
        state.apply(ConnectionEvent::Connected);
        state
    }

    #[test]
    fn test_tick_while_disconnected_is_noop() {
        let mut state = DeviceState::new();
        let frame = Frame::encode(256, 0);
        let mut serial = ScriptedSerial::new(&frame);
        let mut notifier = RecordingNotifier::default();

        let outcome = block_on(run_tick(&mut state, &mut serial, &mut notifier)).unwrap();

        assert_eq!(outcome, TickOutcome::Skipped(SkipReason::Disconnected));
        assert_eq!(serial.reads, 0);
        assert_eq!(serial.bytes.len(), frame.len());
        assert_eq!(notifier.count, 0);
    }

    #[test]
    fn test_tick_drains_and_notifies() {
        let mut state = connected();
        let mut bytes = [0u8; 14];
        bytes[..7].copy_from_slice(&Frame::encode(100, 0));
        bytes[7..].copy_from_slice(&Frame::encode(256, 0));
        let mut serial = ScriptedSerial::new(&bytes);
        let mut notifier = RecordingNotifier::default();

        let outcome = block_on(run_tick(&mut state, &mut serial, &mut notifier)).unwrap();

        assert_eq!(
            outcome,
            TickOutcome::Notified {
                frames: 2,
                measurement: Measurement::new(875.0),
            }
        );
        assert!(serial.bytes.is_empty());
        assert_eq!(notifier.count, 1);
        assert_eq!(notifier.sent[0], 875.0f64.to_le_bytes());
        assert_eq!(state.run_state(), crate::RunState::ConnectedIdle);
    }

    #[test]
    fn test_stale_value_is_resent() {
        let mut state = connected();
        let frame = Frame::encode(256, 0);
        let mut notifier = RecordingNotifier::default();

        let mut serial = ScriptedSerial::new(&frame);
        block_on(run_tick(&mut state, &mut serial, &mut notifier)).unwrap();

        let mut idle = ScriptedSerial::new(&[]);
        let outcome = block_on(run_tick(&mut state, &mut idle, &mut notifier)).unwrap();

        assert_eq!(
            outcome,
            TickOutcome::Notified {
                frames: 0,
                measurement: Measurement::new(875.0),
            }
        );
        assert_eq!(notifier.count, 2);
        assert_eq!(notifier.sent[0], notifier.sent[1]);
    }

    #[test]
    fn test_first_tick_without_data_sends_zero() {
        let mut state = connected();
        let mut serial = ScriptedSerial::new(&[]);
        let mut notifier = RecordingNotifier::default();

        block_on(run_tick(&mut state, &mut serial, &mut notifier)).unwrap();

        assert_eq!(notifier.sent[0], 0.0f64.to_le_bytes());
    }

    #[test]
    fn test_invalid_frame_keeps_previous_value() {
        let mut state = connected();
        let mut notifier = RecordingNotifier::default();

        let good = Frame::encode(256, 0);
        block_on(run_tick(&mut state, &mut ScriptedSerial::new(&good), &mut notifier)).unwrap();

        let mut bad = Frame::encode(512, 0);
        bad[6] = 0x00;
        let outcome =
            block_on(run_tick(&mut state, &mut ScriptedSerial::new(&bad), &mut notifier)).unwrap();

        assert_eq!(
            outcome,
            TickOutcome::Notified {
                frames: 0,
                measurement: Measurement::new(875.0),
            }
        );
    }

    #[test]
    fn test_partial_frame_completes_next_tick() {
        let mut state = connected();
        let mut notifier = RecordingNotifier::default();
        let frame = Frame::encode(256, 0);

        block_on(run_tick(
            &mut state,
            &mut ScriptedSerial::new(&frame[..3]),
            &mut notifier,
        ))
        .unwrap();
        assert_eq!(state.measurement(), Measurement::default());

        let outcome = block_on(run_tick(
            &mut state,
            &mut ScriptedSerial::new(&frame[3..]),
            &mut notifier,
        ))
        .unwrap();
        assert_eq!(
            outcome,
            TickOutcome::Notified {
                frames: 1,
                measurement: Measurement::new(875.0),
            }
        );
    }

    #[test]
    fn test_latched_state_skips_tick() {
        let mut state = connected();
        state.latch_abnormal();
        let frame = Frame::encode(256, 0);
        let mut serial = ScriptedSerial::new(&frame);
        let mut notifier = RecordingNotifier::default();

        let outcome = block_on(run_tick(&mut state, &mut serial, &mut notifier)).unwrap();

        assert_eq!(outcome, TickOutcome::Skipped(SkipReason::Abnormal));
        assert_eq!(serial.reads, 0);
        assert_eq!(notifier.count, 0);
    }

    #[test]
    fn test_serial_error_still_notifies() {
        let mut state = connected();
        let mut notifier = RecordingNotifier::default();

        let outcome =
            block_on(run_tick(&mut state, &mut ScriptedSerial::failing(), &mut notifier)).unwrap();

        assert!(matches!(outcome, TickOutcome::Notified { frames: 0, .. }));
        assert_eq!(notifier.count, 1);
    }

    #[test]
    fn test_notify_failure_is_reported() {
        let mut state = connected();
        let mut notifier = RecordingNotifier {
            fail: true,
            ..Default::default()
        };

        let result = block_on(run_tick(
            &mut state,
            &mut ScriptedSerial::new(&[]),
            &mut notifier,
        ));

        assert!(matches!(result, Err(BridgeError::Notify)));
        assert_eq!(state.run_state(), crate::RunState::ConnectedIdle);
    }

    #[test]
    fn test_read_error_does_not_stop_drain() {
        let mut state = connected();
        let frame = Frame::encode(256, 0);
        let mut serial = ScriptedSerial::flaky(&frame, 1);
        let mut notifier = RecordingNotifier::default();

        let outcome = block_on(run_tick(&mut state, &mut serial, &mut notifier)).unwrap();

        assert_eq!(
            outcome,
            TickOutcome::Notified {
                frames: 1,
                measurement: Measurement::new(875.0),
            }
        );
        assert!(serial.bytes.is_empty());
        assert_eq!(notifier.sent[0], 875.0f64.to_le_bytes());
    }

    #[test]
    fn test_persistent_read_errors_are_bounded() {
        let mut state = connected();
        let frame = Frame::encode(256, 0);
        let mut serial = ScriptedSerial::flaky(&frame, 100);
        let mut notifier = RecordingNotifier::default();

        let outcome = block_on(run_tick(&mut state, &mut serial, &mut notifier)).unwrap();

        assert!(matches!(outcome, TickOutcome::Notified { frames: 0, .. }));
        assert_eq!(serial.reads, MAX_CONSECUTIVE_READ_ERRORS);
        assert_eq!(notifier.count, 1);

        // Once the source recovers the buffered frame is picked up
        serial.failed_reads = 0;
        block_on(run_tick(&mut state, &mut serial, &mut notifier)).unwrap();
        assert_eq!(state.measurement(), Measurement::new(875.0));
    }
}
