//! # IEC 61850-90-5 Common Definitions
//!
//! Enumerations, constants, option structs and the error taxonomy shared by every
//! codec in this module. Wire values follow the IEC 61850-90-5 implementation
//! agreement layered over IEEE C37.118 timing conventions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Leading byte of every plain (C37.118 style) frame.
pub const SYNC_BYTE: u8 = 0xAA;

/// Connectionless transport protocol (CLTP) tag, found at offset 1 of a session frame.
pub const CLTP_TAG: u8 = 0x40;

/// Declared size of the fixed session header.
pub const SESSION_HEADER_SIZE: u8 = 0x18;

/// Marker preceding the user payload inside the SPDU.
pub const PAYLOAD_TYPE_TAG: u8 = 0x82;

/// Marker preceding the signature hash bytes at the end of a session frame.
pub const SIGNATURE_TAG: u8 = 0x85;

/// Size of the plain header: sync, type/version, length, id code, SOC and fraction.
pub const FIXED_HEADER_LENGTH: usize = 14;

/// Default size of a session header up to and including the `SequenceOfAsdu` tag.
pub const IEC_FIXED_LENGTH: usize = 49;

/// Ticks per second used by the fraction-of-second field (2^24).
pub const TIMEBASE: u32 = 16_777_216;

/// Time quality flags and indicator code occupy the top byte of the fraction word.
pub const TIME_QUALITY_FLAGS_MASK: u32 = 0xFF00_0000;

/// Size of the key identifier in the session header.
pub const KEY_SIZE: usize = 4;

/// Station name used when an ASDU carries an empty MSVID.
pub const DEFAULT_STATION_NAME: &str = "IEC61850Dataset";

/// Category of a [`ParseError`]. Consumers branch on this instead of individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    ProtocolViolation,
    ChecksumMismatch,
    SignatureMismatch,
    MissingSignatureTag,
    SampleSizeMismatch,
    ValueTooLarge,
    UnsupportedType,
    InvalidConfiguration,
    Io,
}

/// Represents errors that can occur during parsing and generation of frames
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid length: {message}")]
    InvalidLength { message: String },

    #[error("Encountered out-of-sequence or unknown sampled value tag 0x{found:02X} at offset {offset}, expected {expected}")]
    UnexpectedTag {
        expected: SampledValueTag,
        found: u8,
        offset: usize,
    },

    #[error("Unexpected length for tag {tag}: {length} bytes, need at least {minimum}")]
    TagTooShort {
        tag: SampledValueTag,
        length: usize,
        minimum: usize,
    },

    #[error("Unsupported session type 0x{0:02X}, only sampled values (0xA2) are supported")]
    UnsupportedSessionType(u8),

    #[error("Invalid session header size 0x{0:02X}, expected 0x18")]
    InvalidSessionHeader(u8),

    #[error("Unsupported payload type 0x{0:02X}, expected 0x82")]
    UnsupportedPayloadType(u8),

    #[error("Invalid signature algorithm 0x{0:02X}")]
    InvalidSignatureAlgorithm(u8),

    #[error("Invalid security algorithm 0x{0:02X}")]
    InvalidSecurityAlgorithm(u8),

    #[error("ASDU count must be at least one")]
    EmptyAsduSequence,

    #[error("Invalid frame type: {message}")]
    InvalidFrameType { message: String },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    #[error("Invalid signal order: {message}")]
    InvalidSignalOrder { message: String },

    #[error("CRC checksum mismatch: expected {expected:04X}, got {found:04X}")]
    ChecksumMismatch { expected: u16, found: u16 },

    #[error("Signature mismatch for {algorithm} signature")]
    SignatureMismatch { algorithm: SignatureAlgorithm },

    #[error("Expected signature tag 0x85 for {algorithm} signature, found 0x{found:02X}")]
    MissingSignatureTag {
        algorithm: SignatureAlgorithm,
        found: u8,
    },

    #[error("Configuration does not match data sample size: expected {expected} bytes, got {found}")]
    SampleSizeMismatch { expected: usize, found: usize },

    #[error("Value too large to encode: {length} bytes exceeds 65535")]
    ValueTooLarge { length: usize },

    #[error("Type {type_name} cannot be encoded as a sampled value tag")]
    UnsupportedType { type_name: &'static str },

    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("Failed to parse associated ETR configuration \"{}\": {source}", .path.display())]
    EtrFile {
        path: PathBuf,
        #[source]
        source: Box<ParseError>,
    },

    #[error("Invalid parse options: {0}")]
    Options(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ParseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ParseError::InvalidLength { .. }
            | ParseError::UnexpectedTag { .. }
            | ParseError::TagTooShort { .. }
            | ParseError::UnsupportedSessionType(_)
            | ParseError::InvalidSessionHeader(_)
            | ParseError::UnsupportedPayloadType(_)
            | ParseError::InvalidSignatureAlgorithm(_)
            | ParseError::InvalidSecurityAlgorithm(_)
            | ParseError::EmptyAsduSequence
            | ParseError::InvalidFrameType { .. }
            | ParseError::InvalidFormat { .. }
            | ParseError::InvalidSignalOrder { .. } => ErrorKind::ProtocolViolation,
            ParseError::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
            ParseError::SignatureMismatch { .. } => ErrorKind::SignatureMismatch,
            ParseError::MissingSignatureTag { .. } => ErrorKind::MissingSignatureTag,
            ParseError::SampleSizeMismatch { .. } => ErrorKind::SampleSizeMismatch,
            ParseError::ValueTooLarge { .. } => ErrorKind::ValueTooLarge,
            ParseError::UnsupportedType { .. } => ErrorKind::UnsupportedType,
            ParseError::InvalidConfiguration { .. } | ParseError::Options(_) => {
                ErrorKind::InvalidConfiguration
            }
            ParseError::EtrFile { source, .. } => source.kind(),
            ParseError::Io(_) => ErrorKind::Io,
        }
    }

    /// Shorthand used by bounds checks throughout the codecs.
    pub(crate) fn short_buffer(what: &str, needed: usize, available: usize) -> Self {
        ParseError::InvalidLength {
            message: format!(
                "{} needs {} bytes, only {} available",
                what, needed, available
            ),
        }
    }
}

/// Outcome of a decode call over a possibly partial buffer.
///
/// `Incomplete` is the streaming reassembly signal: the caller should append more
/// bytes and try again. It is never an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    Complete(T),
    Incomplete { required: usize },
}

impl<T> Decoded<T> {
    pub fn is_complete(&self) -> bool {
        matches!(self, Decoded::Complete(_))
    }

    pub fn complete(self) -> Option<T> {
        match self {
            Decoded::Complete(value) => Some(value),
            Decoded::Incomplete { .. } => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Decoded<U> {
        match self {
            Decoded::Complete(value) => Decoded::Complete(f(value)),
            Decoded::Incomplete { required } => Decoded::Incomplete { required },
        }
    }
}

/// Frame type carried in the upper nibble of byte 1 of a plain header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameType {
    DataFrame,
    ConfigurationFrame,
    CommandFrame,
}

impl FrameType {
    const TYPE_MASK: u8 = 0x70;

    pub fn from_byte(byte: u8) -> Result<FrameType, ParseError> {
        match byte & Self::TYPE_MASK {
            0x00 => Ok(FrameType::DataFrame),
            0x30 => Ok(FrameType::ConfigurationFrame),
            0x40 => Ok(FrameType::CommandFrame),
            other => Err(ParseError::InvalidFrameType {
                message: format!("Unrecognized frame type bits 0x{:02X}", other),
            }),
        }
    }

    pub fn to_byte(&self) -> u8 {
        match self {
            FrameType::DataFrame => 0x00,
            FrameType::ConfigurationFrame => 0x30,
            FrameType::CommandFrame => 0x40,
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameType::DataFrame => write!(f, "IEC 61850-90-5 Data Frame"),
            FrameType::ConfigurationFrame => write!(f, "IEC 61850-90-5 Configuration Frame"),
            FrameType::CommandFrame => write!(f, "IEC 61850-90-5 Command Frame"),
        }
    }
}

/// Version nibble of a plain header.
pub const VERSION_NUMBER_MASK: u8 = 0x0F;

/// Session protocol identifiers. Only sampled values are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionType {
    Tunnelled,
    Goose,
    SampledValues,
}

impl SessionType {
    pub fn from_byte(byte: u8) -> Option<SessionType> {
        match byte {
            0xA0 => Some(SessionType::Tunnelled),
            0xA1 => Some(SessionType::Goose),
            0xA2 => Some(SessionType::SampledValues),
            _ => None,
        }
    }

    pub fn to_byte(&self) -> u8 {
        match self {
            SessionType::Tunnelled => 0xA0,
            SessionType::Goose => 0xA1,
            SessionType::SampledValues => 0xA2,
        }
    }
}

/// Signature (MAC) algorithm applied to a session frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    #[default]
    None,
    Sha80,
    Sha128,
    Sha256,
    Aes64,
    Aes128,
}

impl SignatureAlgorithm {
    pub const ALL: [SignatureAlgorithm; 6] = [
        SignatureAlgorithm::None,
        SignatureAlgorithm::Sha80,
        SignatureAlgorithm::Sha128,
        SignatureAlgorithm::Sha256,
        SignatureAlgorithm::Aes64,
        SignatureAlgorithm::Aes128,
    ];

    pub fn from_byte(byte: u8) -> Result<Self, ParseError> {
        match byte {
            0 => Ok(SignatureAlgorithm::None),
            1 => Ok(SignatureAlgorithm::Sha80),
            2 => Ok(SignatureAlgorithm::Sha128),
            3 => Ok(SignatureAlgorithm::Sha256),
            4 => Ok(SignatureAlgorithm::Aes64),
            5 => Ok(SignatureAlgorithm::Aes128),
            other => Err(ParseError::InvalidSignatureAlgorithm(other)),
        }
    }

    pub fn to_byte(&self) -> u8 {
        match self {
            SignatureAlgorithm::None => 0,
            SignatureAlgorithm::Sha80 => 1,
            SignatureAlgorithm::Sha128 => 2,
            SignatureAlgorithm::Sha256 => 3,
            SignatureAlgorithm::Aes64 => 4,
            SignatureAlgorithm::Aes128 => 5,
        }
    }

    /// Number of MAC bytes carried after the signature tag.
    pub fn hash_length(&self) -> usize {
        match self {
            SignatureAlgorithm::None => 0,
            SignatureAlgorithm::Aes64 => 8,
            SignatureAlgorithm::Sha80 => 10,
            SignatureAlgorithm::Sha128 | SignatureAlgorithm::Aes128 => 16,
            SignatureAlgorithm::Sha256 => 32,
        }
    }

    /// Bytes reserved at the end of the frame: signature tag plus hash.
    pub fn trailer_length(&self) -> usize {
        match self {
            SignatureAlgorithm::None => 0,
            _ => 1 + self.hash_length(),
        }
    }

    pub fn is_aes(&self) -> bool {
        matches!(self, SignatureAlgorithm::Aes64 | SignatureAlgorithm::Aes128)
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureAlgorithm::None => write!(f, "None"),
            SignatureAlgorithm::Sha80 => write!(f, "SHA-80"),
            SignatureAlgorithm::Sha128 => write!(f, "SHA-128"),
            SignatureAlgorithm::Sha256 => write!(f, "SHA-256"),
            SignatureAlgorithm::Aes64 => write!(f, "AES-GMAC-64"),
            SignatureAlgorithm::Aes128 => write!(f, "AES-GMAC-128"),
        }
    }
}

/// Payload encryption algorithm. Recorded only, payloads are never decrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SecurityAlgorithm {
    #[default]
    None,
    Aes128,
    Aes256,
}

impl SecurityAlgorithm {
    pub fn from_byte(byte: u8) -> Result<Self, ParseError> {
        match byte {
            0 => Ok(SecurityAlgorithm::None),
            1 => Ok(SecurityAlgorithm::Aes128),
            2 => Ok(SecurityAlgorithm::Aes256),
            other => Err(ParseError::InvalidSecurityAlgorithm(other)),
        }
    }

    pub fn to_byte(&self) -> u8 {
        match self {
            SecurityAlgorithm::None => 0,
            SecurityAlgorithm::Aes128 => 1,
            SecurityAlgorithm::Aes256 => 2,
        }
    }
}

impl fmt::Display for SecurityAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityAlgorithm::None => write!(f, "None"),
            SecurityAlgorithm::Aes128 => write!(f, "AES-128"),
            SecurityAlgorithm::Aes256 => write!(f, "AES-256"),
        }
    }
}

/// Tag byte of a sampled value TLV field.
///
/// Several tags share a value (`ASDU_COUNT` and `MSV_ID` are both 0x80), their meaning
/// depends on nesting level, so this is a newtype rather than an enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampledValueTag(pub u8);

impl SampledValueTag {
    pub const SV_PDU: SampledValueTag = SampledValueTag(0x60);
    pub const ASDU_COUNT: SampledValueTag = SampledValueTag(0x80);
    pub const SEQUENCE_OF_ASDU: SampledValueTag = SampledValueTag(0xA2);
    pub const ASDU_SEQUENCE: SampledValueTag = SampledValueTag(0x30);
    pub const MSV_ID: SampledValueTag = SampledValueTag(0x80);
    pub const DATASET: SampledValueTag = SampledValueTag(0x81);
    pub const SMP_CNT: SampledValueTag = SampledValueTag(0x82);
    pub const CONF_REV: SampledValueTag = SampledValueTag(0x83);
    pub const REFR_TM: SampledValueTag = SampledValueTag(0x84);
    pub const SMP_SYNCH: SampledValueTag = SampledValueTag(0x85);
    pub const SMP_RATE: SampledValueTag = SampledValueTag(0x86);
    pub const SAMPLES: SampledValueTag = SampledValueTag(0x87);
    pub const SMP_MOD: SampledValueTag = SampledValueTag(0x88);
    pub const UTC_TIMESTAMP: SampledValueTag = SampledValueTag(0x89);
}

impl fmt::Display for SampledValueTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// Flags in bits 28-31 of the fraction-of-second word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeQualityFlags(pub u32);

impl TimeQualityFlags {
    pub const RESERVED: u32 = 1 << 31;
    pub const LEAP_SECOND_DIRECTION: u32 = 1 << 30;
    pub const LEAP_SECOND_OCCURRED: u32 = 1 << 29;
    pub const LEAP_SECOND_PENDING: u32 = 1 << 28;
    pub const INDICATOR_CODE_MASK: u32 = 0x0F00_0000;

    /// Extracts the flag bits from a raw fraction-of-second word.
    pub fn from_fraction_word(word: u32) -> Self {
        TimeQualityFlags(word & TIME_QUALITY_FLAGS_MASK & !Self::INDICATOR_CODE_MASK)
    }

    pub fn leap_second_pending(&self) -> bool {
        self.0 & Self::LEAP_SECOND_PENDING != 0
    }

    pub fn leap_second_occurred(&self) -> bool {
        self.0 & Self::LEAP_SECOND_OCCURRED != 0
    }

    /// True when the pending/occurred leap second is subtracted.
    pub fn leap_second_negative(&self) -> bool {
        self.0 & Self::LEAP_SECOND_DIRECTION != 0
    }
}

/// Clock quality reported in bits 24-27 of the fraction-of-second word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeQualityIndicatorCode {
    #[default]
    Locked,
    UnlockedWithin1Nanosecond,
    UnlockedWithin10Nanoseconds,
    UnlockedWithin100Nanoseconds,
    UnlockedWithin1Microsecond,
    UnlockedWithin10Microseconds,
    UnlockedWithin100Microseconds,
    UnlockedWithin1Millisecond,
    UnlockedWithin10Milliseconds,
    UnlockedWithin100Milliseconds,
    UnlockedWithin1Second,
    UnlockedWithin10Seconds,
    Failure,
    Reserved(u8),
}

impl TimeQualityIndicatorCode {
    pub fn from_fraction_word(word: u32) -> Self {
        match ((word & TimeQualityFlags::INDICATOR_CODE_MASK) >> 24) as u8 {
            0x0 => TimeQualityIndicatorCode::Locked,
            0x1 => TimeQualityIndicatorCode::UnlockedWithin1Nanosecond,
            0x2 => TimeQualityIndicatorCode::UnlockedWithin10Nanoseconds,
            0x3 => TimeQualityIndicatorCode::UnlockedWithin100Nanoseconds,
            0x4 => TimeQualityIndicatorCode::UnlockedWithin1Microsecond,
            0x5 => TimeQualityIndicatorCode::UnlockedWithin10Microseconds,
            0x6 => TimeQualityIndicatorCode::UnlockedWithin100Microseconds,
            0x7 => TimeQualityIndicatorCode::UnlockedWithin1Millisecond,
            0x8 => TimeQualityIndicatorCode::UnlockedWithin10Milliseconds,
            0x9 => TimeQualityIndicatorCode::UnlockedWithin100Milliseconds,
            0xA => TimeQualityIndicatorCode::UnlockedWithin1Second,
            0xB => TimeQualityIndicatorCode::UnlockedWithin10Seconds,
            0xF => TimeQualityIndicatorCode::Failure,
            other => TimeQualityIndicatorCode::Reserved(other),
        }
    }

    /// Indicator code positioned in bits 24-27.
    pub fn to_fraction_bits(&self) -> u32 {
        let code: u8 = match self {
            TimeQualityIndicatorCode::Locked => 0x0,
            TimeQualityIndicatorCode::UnlockedWithin1Nanosecond => 0x1,
            TimeQualityIndicatorCode::UnlockedWithin10Nanoseconds => 0x2,
            TimeQualityIndicatorCode::UnlockedWithin100Nanoseconds => 0x3,
            TimeQualityIndicatorCode::UnlockedWithin1Microsecond => 0x4,
            TimeQualityIndicatorCode::UnlockedWithin10Microseconds => 0x5,
            TimeQualityIndicatorCode::UnlockedWithin100Microseconds => 0x6,
            TimeQualityIndicatorCode::UnlockedWithin1Millisecond => 0x7,
            TimeQualityIndicatorCode::UnlockedWithin10Milliseconds => 0x8,
            TimeQualityIndicatorCode::UnlockedWithin100Milliseconds => 0x9,
            TimeQualityIndicatorCode::UnlockedWithin1Second => 0xA,
            TimeQualityIndicatorCode::UnlockedWithin10Seconds => 0xB,
            TimeQualityIndicatorCode::Failure => 0xF,
            TimeQualityIndicatorCode::Reserved(code) => *code & 0x0F,
        };
        (code as u32) << 24
    }
}

// STAT word of a data cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusFlags(pub u16);

impl StatusFlags {
    pub const DATA_IS_VALID: u16 = 0x8000; // Bit 15, set means invalid
    pub const DEVICE_ERROR: u16 = 0x4000; // Bit 14
    pub const SYNC_ERROR: u16 = 0x2000; // Bit 13
    pub const DATA_SORTING_BY_ARRIVAL: u16 = 0x1000; // Bit 12
    pub const TRIGGER_DETECTED: u16 = 0x0800; // Bit 11
    pub const CONFIGURATION_CHANGED: u16 = 0x0400; // Bit 10
    pub const UNLOCKED_TIME_MASK: u16 = 0x0030; // Bits 5-4
    pub const TRIGGER_REASON_MASK: u16 = 0x000F; // Bits 3-0

    /// Status word sent by devices that have nothing valid to report.
    pub const NO_DATA: u16 = 0xFFFF;

    pub fn data_is_valid(&self) -> bool {
        self.0 & Self::DATA_IS_VALID == 0
    }

    pub fn device_error(&self) -> bool {
        self.0 & Self::DEVICE_ERROR != 0
    }

    pub fn sync_error(&self) -> bool {
        self.0 & Self::SYNC_ERROR != 0
    }

    pub fn sorted_by_arrival(&self) -> bool {
        self.0 & Self::DATA_SORTING_BY_ARRIVAL != 0
    }

    pub fn trigger_detected(&self) -> bool {
        self.0 & Self::TRIGGER_DETECTED != 0
    }

    pub fn configuration_changed(&self) -> bool {
        self.0 & Self::CONFIGURATION_CHANGED != 0
    }

    pub fn unlocked_time(&self) -> u8 {
        ((self.0 & Self::UNLOCKED_TIME_MASK) >> 4) as u8
    }

    pub fn trigger_reason(&self) -> u8 {
        (self.0 & Self::TRIGGER_REASON_MASK) as u8
    }

    /// A configuration change is only trusted from a device that reports no error
    /// and is not sending the all-ones "no data" word.
    pub fn signals_configuration_change(&self) -> bool {
        self.0 != Self::NO_DATA && self.configuration_changed() && !self.device_error()
    }
}

/// Unit of phasor angles on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AngleFormat {
    #[default]
    Degrees,
    Radians,
}

impl AngleFormat {
    pub fn to_radians(&self, angle: f32) -> f32 {
        match self {
            AngleFormat::Degrees => angle.to_radians(),
            AngleFormat::Radians => angle,
        }
    }

    pub fn from_radians(&self, angle: f32) -> f32 {
        match self {
            AngleFormat::Degrees => angle.to_degrees(),
            AngleFormat::Radians => angle,
        }
    }
}

impl fmt::Display for AngleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AngleFormat::Degrees => write!(f, "Degrees"),
            AngleFormat::Radians => write!(f, "Radians"),
        }
    }
}

/// Connection level parsing behavior. Not wire data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    pub use_etr_configuration: bool,
    pub guess_configuration: bool,
    pub parse_redundant_asdus: bool,
    pub ignore_signature_validation_failures: bool,
    pub ignore_sample_size_validation_failures: bool,
    pub phasor_angle_format: AngleFormat,
    /// Directory searched for `<MSVID>.etr` sidecar files.
    pub etr_directory: PathBuf,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            use_etr_configuration: false,
            guess_configuration: false,
            parse_redundant_asdus: false,
            ignore_signature_validation_failures: true,
            ignore_sample_size_validation_failures: false,
            phasor_angle_format: AngleFormat::Degrees,
            etr_directory: PathBuf::from("."),
        }
    }
}

impl ParseOptions {
    pub fn from_json_file(path: &Path) -> Result<Self, ParseError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_type_bits() {
        for frame_type in [
            FrameType::DataFrame,
            FrameType::ConfigurationFrame,
            FrameType::CommandFrame,
        ] {
            // Version nibble must not disturb the type
            let byte = frame_type.to_byte() | 0x01;
            assert_eq!(FrameType::from_byte(byte).unwrap(), frame_type);
        }
        assert!(FrameType::from_byte(0x10).is_err());
        assert!(FrameType::from_byte(0x20).is_err());
    }

    #[test]
    fn test_signature_trailer_lengths() {
        let expected = [
            (SignatureAlgorithm::None, 0),
            (SignatureAlgorithm::Aes64, 9),
            (SignatureAlgorithm::Sha80, 11),
            (SignatureAlgorithm::Sha128, 17),
            (SignatureAlgorithm::Aes128, 17),
            (SignatureAlgorithm::Sha256, 33),
        ];
        for (algorithm, length) in expected {
            assert_eq!(
                algorithm.trailer_length(),
                length,
                "Trailer length wrong for {}",
                algorithm
            );
            assert_eq!(
                SignatureAlgorithm::from_byte(algorithm.to_byte()).unwrap(),
                algorithm
            );
        }
        assert!(matches!(
            SignatureAlgorithm::from_byte(6),
            Err(ParseError::InvalidSignatureAlgorithm(6))
        ));
    }

    #[test]
    fn test_time_quality_split() {
        let word = 0x5B00_1234u32;
        let flags = TimeQualityFlags::from_fraction_word(word);
        assert!(flags.leap_second_pending());
        assert!(!flags.leap_second_occurred());
        assert!(flags.leap_second_negative());
        assert_eq!(
            TimeQualityIndicatorCode::from_fraction_word(word),
            TimeQualityIndicatorCode::UnlockedWithin10Seconds
        );
        assert_eq!(
            TimeQualityIndicatorCode::UnlockedWithin10Seconds.to_fraction_bits(),
            0x0B00_0000
        );
    }

    #[test]
    fn test_status_configuration_change() {
        assert!(StatusFlags(0x0400).signals_configuration_change());
        assert!(!StatusFlags(0x4400).signals_configuration_change());
        assert!(!StatusFlags(0xFFFF).signals_configuration_change());
        assert!(!StatusFlags(0x0000).signals_configuration_change());
        assert_eq!(StatusFlags(0x0035).unlocked_time(), 3);
        assert_eq!(StatusFlags(0x0035).trigger_reason(), 5);
    }

    #[test]
    fn test_default_options() {
        let options = ParseOptions::default();
        assert!(!options.use_etr_configuration);
        assert!(!options.guess_configuration);
        assert!(!options.parse_redundant_asdus);
        assert!(options.ignore_signature_validation_failures);
        assert!(!options.ignore_sample_size_validation_failures);
        assert_eq!(options.phasor_angle_format, AngleFormat::Degrees);

        // Partial documents keep defaults for missing fields
        let parsed: ParseOptions = serde_json::from_str(r#"{"guess_configuration": true}"#).unwrap();
        assert!(parsed.guess_configuration);
        assert!(parsed.ignore_signature_validation_failures);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ParseError::EmptyAsduSequence.kind(),
            ErrorKind::ProtocolViolation
        );
        let wrapped = ParseError::EtrFile {
            path: PathBuf::from("x.etr"),
            source: Box::new(ParseError::InvalidSignalOrder {
                message: "FREQ cannot follow FLAG".to_string(),
            }),
        };
        assert_eq!(wrapped.kind(), ErrorKind::ProtocolViolation);
        assert!(wrapped.to_string().contains("x.etr"));
    }
}
