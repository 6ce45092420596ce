//! Frame protocol configuration for the supported scale models.
//!
//! Scales in the field differ in the prefix literal that opens each frame and
//! in how many status digits trail the weight field. A deployment picks one
//! [`FrameProtocol`]; the decoder never tries to detect the variant itself.

use thiserror::Error;

/// Default frame delimiter (carriage return).
pub const DEFAULT_DELIMITER: u8 = 0x0D;

/// Leading control byte some scales put before the prefix literal.
pub const STX: u8 = 0x02;

/// Layout of one scale frame (after the delimiter has been stripped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameProtocol {
    /// Literal sequence identifying a frame for this scale model (e.g. "+p`")
    pub prefix: String,
    /// Number of digits in the weight field; the last one is the first decimal
    pub weight_digits: usize,
    /// Number of digits after the weight field
    pub trailing_digits: usize,
}

/// Errors raised while validating protocol settings.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("weight field must have at least one digit")]
    NoWeightDigits,
    #[error("weight limits are inverted: min {min} > max {max}")]
    InvertedLimits { min: f64, max: f64 },
    #[error("invalid frame pattern: {0}")]
    Pattern(String),
}

/// Protocol variants observed in deployed scales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Preset {
    /// Prefix "+p`", 6 weight digits, 4 trailing digits
    #[default]
    A,
    /// Prefix ";p`", 6 weight digits, 6 trailing digits
    B,
}

impl Preset {
    pub fn protocol(self) -> FrameProtocol {
        match self {
            Preset::A => FrameProtocol::new("+p`", 6, 4),
            Preset::B => FrameProtocol::new(";p`", 6, 6),
        }
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Preset::A => write!(f, "a"),
            Preset::B => write!(f, "b"),
        }
    }
}

impl FrameProtocol {
    pub fn new(prefix: impl Into<String>, weight_digits: usize, trailing_digits: usize) -> Self {
        Self {
            prefix: prefix.into(),
            weight_digits,
            trailing_digits,
        }
    }

    /// Build the anchored frame pattern.
    ///
    /// Any run of non-printable bytes (STX, a stray LF from CRLF line ends)
    /// may precede the prefix. Capture groups: 1 = weight digits,
    /// 2 = trailing digits.
    pub fn pattern(&self) -> Result<String, ProtocolError> {
        if self.weight_digits == 0 {
            return Err(ProtocolError::NoWeightDigits);
        }
        Ok(format!(
            r"^[^\x20-\x7E]*{}([0-9]{{{}}})([0-9]{{{}}})$",
            regex::escape(&self.prefix),
            self.weight_digits,
            self.trailing_digits
        ))
    }
}

/// Optional inclusive bounds on accepted weights, in kilograms.
///
/// Either side may be open. Without limits every decoded value is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WeightLimits {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl WeightLimits {
    pub fn new(min: Option<f64>, max: Option<f64>) -> Result<Self, ProtocolError> {
        if let (Some(min), Some(max)) = (min, max)
            && min > max
        {
            return Err(ProtocolError::InvertedLimits { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }
}

/// Parse a delimiter byte given as decimal ("13") or hex ("0x0D").
///
/// # Example
/// ```
/// use scale_bridge::protocol::parse_delimiter;
///
/// assert_eq!(parse_delimiter("0x0D").unwrap(), 0x0D);
/// assert_eq!(parse_delimiter("10").unwrap(), 0x0A);
/// ```
pub fn parse_delimiter(src: &str) -> Result<u8, String> {
    let src = src.trim();
    let parsed = match src
        .strip_prefix("0x")
        .or_else(|| src.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => src.parse::<u8>(),
    };
    parsed.map_err(|_| format!("invalid delimiter byte: {}", src))
}
