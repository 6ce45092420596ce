//! `scale-bridge` library.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing, logging setup and
//! process exit codes. Decoding, framing and the device lifecycle live here
//! where they can be tested with a scripted fake device.

pub mod app;
pub mod decoder;
pub mod duration;
pub mod framing;
pub mod http;
pub mod logging;
pub mod protocol;
pub mod query;
pub mod reading;
pub mod serial;
pub mod store;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use decoder::{DecodeError, FrameDecoder, ReadingResult, weight_from_digits};
pub use framing::{DelimiterFramer, RawFrame};
pub use protocol::{FrameProtocol, Preset, ProtocolError, WeightLimits};
pub use query::{ReadingUnavailable, WeightResponse, get_weight};
pub use reading::Reading;
pub use serial::{Device, DeviceError, SerialDevice, SerialSettings, Shutdown, Supervisor};
pub use store::LatestReading;
