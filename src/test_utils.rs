use crate::framing::RawFrame;
use crate::protocol::STX;
use crate::serial::{Device, DeviceError, DeviceStream};
use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Build a frame from its ASCII text.
pub fn frame(text: &str) -> RawFrame {
    RawFrame::new(text.as_bytes().to_vec())
}

/// Build a frame with a leading STX control byte.
pub fn stx_frame(text: &str) -> RawFrame {
    let mut bytes = vec![STX];
    bytes.extend_from_slice(text.as_bytes());
    RawFrame::new(bytes)
}

/// One scripted `read()` on a fake stream.
#[derive(Debug)]
pub enum ReadStep {
    Chunk(Vec<u8>),
    Fail(io::Error),
    /// Block the reading thread, like a driver that never returns
    Stall(Duration),
}

/// Scripted outcome of one `open()` call on a [`FakeDevice`].
#[derive(Debug)]
pub enum Session {
    OpenError(String),
    Reads(VecDeque<ReadStep>),
}

impl Session {
    pub fn open_error(reason: &str) -> Self {
        Session::OpenError(reason.to_string())
    }

    /// One read result per chunk; an empty chunk reads as end-of-stream.
    pub fn reads(chunks: &[&str]) -> Self {
        Session::Reads(
            chunks
                .iter()
                .map(|c| ReadStep::Chunk(c.as_bytes().to_vec()))
                .collect(),
        )
    }

    /// Fail the read after the scripted chunks with `kind`.
    pub fn then_error(mut self, kind: ErrorKind) -> Self {
        if let Session::Reads(reads) = &mut self {
            reads.push_back(ReadStep::Fail(io::Error::new(kind, "scripted failure")));
        }
        self
    }

    /// Block the next read after the scripted chunks for `duration`.
    pub fn then_stall(mut self, duration: Duration) -> Self {
        if let Session::Reads(reads) = &mut self {
            reads.push_back(ReadStep::Stall(duration));
        }
        self
    }
}

/// Device double that replays scripted sessions.
///
/// Once the script is exhausted, `open()` fails as if the device were absent.
/// Once a session's reads run out, the stream idles with read timeouts like a
/// quiet serial port.
#[derive(Debug)]
pub struct FakeDevice {
    sessions: VecDeque<Session>,
    opens: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl FakeDevice {
    pub fn new(sessions: Vec<Session>) -> Self {
        Self {
            sessions: sessions.into(),
            opens: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Counter of `open()` calls.
    pub fn opens(&self) -> Arc<AtomicUsize> {
        self.opens.clone()
    }

    /// Set once a stream handed out by this device has been dropped.
    pub fn closed(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }
}

impl Device for FakeDevice {
    fn name(&self) -> &str {
        "fake-scale"
    }

    fn open(&mut self) -> Result<DeviceStream, DeviceError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        match self.sessions.pop_front() {
            Some(Session::Reads(reads)) => Ok(Box::new(FakeStream {
                reads,
                pending: Vec::new(),
                closed: self.closed.clone(),
            })),
            Some(Session::OpenError(reason)) => Err(DeviceError::Open {
                device: self.name().to_string(),
                reason,
            }),
            None => Err(DeviceError::Open {
                device: self.name().to_string(),
                reason: "no such device".to_string(),
            }),
        }
    }
}

struct FakeStream {
    reads: VecDeque<ReadStep>,
    pending: Vec<u8>,
    closed: Arc<AtomicBool>,
}

impl Read for FakeStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.reads.pop_front() {
                Some(ReadStep::Chunk(chunk)) if chunk.is_empty() => return Ok(0),
                Some(ReadStep::Chunk(chunk)) => self.pending = chunk,
                Some(ReadStep::Fail(e)) => return Err(e),
                Some(ReadStep::Stall(duration)) => {
                    std::thread::sleep(duration);
                    return Err(io::Error::new(ErrorKind::TimedOut, "stalled"));
                }
                None => {
                    std::thread::sleep(Duration::from_millis(5));
                    return Err(io::Error::new(ErrorKind::TimedOut, "idle"));
                }
            }
        }
        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

impl Drop for FakeStream {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
