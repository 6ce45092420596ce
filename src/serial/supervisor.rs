//! Serial reader supervisor.
//!
//! One blocking activity owns the device for the life of the process and
//! drives every port transition:
//!
//! ```text
//! Closed -> Opening -> Open -> Faulted -> (reopen delay) -> Opening -> ...
//!              \________________/
//!               open failure
//! ```
//!
//! There is no terminal state other than shutdown, which closes the handle
//! and leaves the port `Closed`.

use super::{Device, DeviceError, DeviceStream};
use crate::decoder::FrameDecoder;
use crate::framing::{DelimiterFramer, RawFrame};
use crate::store::LatestReading;
use std::io::{self, ErrorKind, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default wait between a fault and the next open attempt.
pub const DEFAULT_REOPEN_DELAY: Duration = Duration::from_secs(2);

/// Granularity at which an interruptible wait checks for shutdown.
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Bytes requested from the device per read.
const READ_BUFFER_SIZE: usize = 256;

/// Lifecycle of the device handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PortState {
    Closed,
    Opening,
    Open,
    Faulted,
}

/// Shutdown flag shared between the supervisor and whoever stops it.
#[derive(Debug, Clone, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Sleep for `duration` unless shutdown is triggered first.
    ///
    /// Returns `true` if the wait was cut short by shutdown.
    fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_triggered() {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            std::thread::sleep(remaining.min(SHUTDOWN_POLL_INTERVAL));
        }
    }
}

/// Owns the device, frames its output and publishes decoded readings.
pub struct Supervisor<D: Device> {
    device: D,
    decoder: FrameDecoder,
    framer: DelimiterFramer,
    store: LatestReading,
    shutdown: Shutdown,
    reopen_delay: Duration,
    state: PortState,
    stream: Option<DeviceStream>,
    buf: [u8; READ_BUFFER_SIZE],
}

impl<D: Device> Supervisor<D> {
    pub fn new(
        device: D,
        decoder: FrameDecoder,
        framer: DelimiterFramer,
        store: LatestReading,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            device,
            decoder,
            framer,
            store,
            shutdown,
            reopen_delay: DEFAULT_REOPEN_DELAY,
            state: PortState::Closed,
            stream: None,
            buf: [0; READ_BUFFER_SIZE],
        }
    }

    pub fn with_reopen_delay(mut self, reopen_delay: Duration) -> Self {
        self.reopen_delay = reopen_delay;
        self
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> PortState {
        self.state
    }

    /// Run until shutdown is triggered, then close the device.
    ///
    /// Blocks the calling thread; run it on a dedicated thread or via
    /// `tokio::task::spawn_blocking`.
    pub fn run(mut self) {
        info!(device = %self.device.name(), "serial supervisor started");
        while !self.shutdown.is_triggered() {
            self.step();
        }
        self.close();
    }

    /// Perform one lifecycle step from the current state.
    pub(crate) fn step(&mut self) {
        match self.state {
            PortState::Closed => self.transition(PortState::Opening),
            PortState::Opening => match self.device.open() {
                Ok(stream) => {
                    self.stream = Some(stream);
                    self.framer.reset();
                    self.transition(PortState::Open);
                }
                Err(error) => self.fault(error),
            },
            PortState::Open => {
                if let Err(error) = self.read_once() {
                    self.fault(error);
                }
            }
            PortState::Faulted => {
                if !self.shutdown.wait(self.reopen_delay) {
                    self.transition(PortState::Opening);
                }
            }
        }
    }

    fn transition(&mut self, next: PortState) {
        debug!(device = %self.device.name(), from = ?self.state, to = ?next, "port state");
        self.state = next;
    }

    fn fault(&mut self, error: DeviceError) {
        warn!(
            %error,
            retry_in = ?self.reopen_delay,
            "serial device fault"
        );
        self.stream = None;
        self.transition(PortState::Faulted);
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            info!(device = %self.device.name(), "serial port closed");
        }
        self.transition(PortState::Closed);
    }

    fn read_once(&mut self) -> Result<(), DeviceError> {
        let runtime = |device: &D, source: io::Error| DeviceError::Runtime {
            device: device.name().to_string(),
            source,
        };

        let Some(stream) = self.stream.as_mut() else {
            return Err(runtime(
                &self.device,
                io::Error::new(ErrorKind::NotConnected, "no open stream"),
            ));
        };

        let n = match stream.read(&mut self.buf) {
            Ok(0) => {
                return Err(runtime(
                    &self.device,
                    io::Error::new(ErrorKind::UnexpectedEof, "device closed the stream"),
                ));
            }
            Ok(n) => n,
            // Timeouts only mean the scale was quiet
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                return Ok(());
            }
            Err(e) => return Err(runtime(&self.device, e)),
        };

        for frame in self.framer.feed(&self.buf[..n]) {
            self.handle_frame(&frame);
        }
        Ok(())
    }

    fn handle_frame(&self, frame: &RawFrame) {
        match self.decoder.decode(frame) {
            Ok(reading) => {
                debug!(value_kg = reading.value_kg, trailer = %reading.trailer, "reading");
                self.store.update(reading);
            }
            Err(error) => warn!(%error, "discarding frame"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::DEFAULT_MAX_FRAME_LENGTH;
    use crate::protocol::Preset;
    use crate::test_utils::{FakeDevice, Session};

    fn supervisor(device: FakeDevice, store: &LatestReading) -> Supervisor<FakeDevice> {
        Supervisor::new(
            device,
            FrameDecoder::new(&Preset::A.protocol()).unwrap(),
            DelimiterFramer::new(0x0D, DEFAULT_MAX_FRAME_LENGTH),
            store.clone(),
            Shutdown::new(),
        )
        .with_reopen_delay(Duration::ZERO)
    }

    fn value(store: &LatestReading) -> Option<f64> {
        store.current().map(|r| r.value_kg)
    }

    #[test]
    fn test_open_and_decode() {
        let store = LatestReading::new();
        let device = FakeDevice::new(vec![Session::reads(&["\x02+p`0001390000\r"])]);
        let mut sup = supervisor(device, &store);

        assert_eq!(sup.state(), PortState::Closed);
        sup.step();
        assert_eq!(sup.state(), PortState::Opening);
        sup.step();
        assert_eq!(sup.state(), PortState::Open);
        sup.step();
        assert_eq!(sup.state(), PortState::Open);
        assert_eq!(value(&store), Some(13.9));
    }

    #[test]
    fn test_frame_across_reads() {
        let store = LatestReading::new();
        let device = FakeDevice::new(vec![Session::reads(&[
            "\x02+p`00",
            "0205",
            "0000\r",
        ])]);
        let mut sup = supervisor(device, &store);

        sup.step();
        sup.step();
        sup.step();
        sup.step();
        assert_eq!(value(&store), None);
        sup.step();
        assert_eq!(value(&store), Some(20.5));
    }

    #[test]
    fn test_idle_timeouts_are_not_faults() {
        let store = LatestReading::new();
        let device = FakeDevice::new(vec![Session::reads(&[])]);
        let mut sup = supervisor(device, &store);

        sup.step();
        sup.step();
        for _ in 0..3 {
            sup.step();
            assert_eq!(sup.state(), PortState::Open);
        }
    }

    #[test]
    fn test_mismatched_frames_leave_store_untouched() {
        let store = LatestReading::new();
        let device = FakeDevice::new(vec![Session::reads(&[
            "0001390000\r",
            ";p`000205000000\r",
            "+p`00013\r",
            "\x02+p`0004560000\r",
        ])]);
        let mut sup = supervisor(device, &store);

        sup.step();
        sup.step();
        for _ in 0..3 {
            sup.step();
            assert_eq!(sup.state(), PortState::Open);
            assert_eq!(value(&store), None);
        }
        sup.step();
        assert_eq!(value(&store), Some(45.6));
    }

    #[test]
    fn test_open_failure_then_reopen() {
        let store = LatestReading::new();
        let device = FakeDevice::new(vec![
            Session::open_error("device busy"),
            Session::reads(&["+p`0001390000\r"]),
        ]);
        let opens = device.opens();
        let mut sup = supervisor(device, &store);

        sup.step();
        sup.step();
        assert_eq!(sup.state(), PortState::Faulted);
        sup.step();
        assert_eq!(sup.state(), PortState::Opening);
        sup.step();
        assert_eq!(sup.state(), PortState::Open);
        sup.step();
        assert_eq!(value(&store), Some(13.9));
        assert_eq!(opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_runtime_error_then_reopen() {
        let store = LatestReading::new();
        let device = FakeDevice::new(vec![
            Session::reads(&["+p`0001390000\r+p`00"])
                .then_error(ErrorKind::BrokenPipe),
            Session::reads(&["0205\r", "+p`0002050000\r"]),
        ]);
        let mut sup = supervisor(device, &store);

        sup.step();
        sup.step();
        sup.step();
        assert_eq!(value(&store), Some(13.9));
        sup.step();
        assert_eq!(sup.state(), PortState::Faulted);
        // Store keeps the last good reading through a fault
        assert_eq!(value(&store), Some(13.9));

        sup.step();
        sup.step();
        assert_eq!(sup.state(), PortState::Open);
        // The partial frame from the dead session is not glued to new bytes
        sup.step();
        assert_eq!(value(&store), Some(13.9));
        sup.step();
        assert_eq!(value(&store), Some(20.5));
    }

    #[test]
    fn test_end_of_stream_is_a_fault() {
        let store = LatestReading::new();
        let device = FakeDevice::new(vec![Session::reads(&[""])]);
        let mut sup = supervisor(device, &store);

        sup.step();
        sup.step();
        sup.step();
        assert_eq!(sup.state(), PortState::Faulted);
    }

    #[test]
    fn test_shutdown_during_reopen_delay() {
        let store = LatestReading::new();
        let shutdown = Shutdown::new();
        let device = FakeDevice::new(vec![Session::open_error("absent")]);
        let opens = device.opens();
        let mut sup = Supervisor::new(
            device,
            FrameDecoder::new(&Preset::A.protocol()).unwrap(),
            DelimiterFramer::new(0x0D, DEFAULT_MAX_FRAME_LENGTH),
            store,
            shutdown.clone(),
        )
        .with_reopen_delay(Duration::from_secs(3600));

        sup.step();
        sup.step();
        assert_eq!(sup.state(), PortState::Faulted);

        shutdown.trigger();
        let started = Instant::now();
        sup.step();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(sup.state(), PortState::Faulted);

        sup.run();
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_run_stops_on_shutdown() {
        let store = LatestReading::new();
        let shutdown = Shutdown::new();
        let device = FakeDevice::new(vec![Session::reads(&["+p`0001390000\r"])]);
        let closed = device.closed();
        let sup = Supervisor::new(
            device,
            FrameDecoder::new(&Preset::A.protocol()).unwrap(),
            DelimiterFramer::new(0x0D, DEFAULT_MAX_FRAME_LENGTH),
            store.clone(),
            shutdown.clone(),
        );

        let handle = std::thread::spawn(move || sup.run());
        let deadline = Instant::now() + Duration::from_secs(5);
        while store.current().is_none() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        shutdown.trigger();
        handle.join().unwrap();

        assert_eq!(value(&store), Some(13.9));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_shutdown_wait() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.wait(Duration::ZERO));
        shutdown.trigger();
        assert!(shutdown.wait(Duration::from_secs(3600)));
    }
}
