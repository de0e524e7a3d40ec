//! # Command Frame
//!
//! Plain-header frame used to control a publishing device:
//!
//! `[header 14][CMD 2][extended data]*[CHK 2]`
//!
//! Commands switch a device on and off physically, so a checksum failure is always fatal
//! for this frame type regardless of parse options.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::common::{Decoded, FrameType, ParseError, ParseOptions, FIXED_HEADER_LENGTH};
use super::header::{ChannelFrame, CommonFrameHeader};
use super::utils::{calculate_crc, validate_checksum};

/// Command words of a command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    TurnOffTransmission,
    TurnOnTransmission,
    SendHeaderFrame,
    SendConfigFrame1,
    SendConfigFrame2,
    SendConfigFrame3,
    ExtendedFrame,
    /// Reserved or user defined word, kept as received.
    Other(u16),
}

impl Command {
    pub fn from_word(word: u16) -> Self {
        match word {
            1 => Command::TurnOffTransmission,
            2 => Command::TurnOnTransmission,
            3 => Command::SendHeaderFrame,
            4 => Command::SendConfigFrame1,
            5 => Command::SendConfigFrame2,
            6 => Command::SendConfigFrame3,
            8 => Command::ExtendedFrame,
            other => Command::Other(other),
        }
    }

    pub fn to_word(&self) -> u16 {
        match self {
            Command::TurnOffTransmission => 1,
            Command::TurnOnTransmission => 2,
            Command::SendHeaderFrame => 3,
            Command::SendConfigFrame1 => 4,
            Command::SendConfigFrame2 => 5,
            Command::SendConfigFrame3 => 6,
            Command::ExtendedFrame => 8,
            Command::Other(word) => *word,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::TurnOffTransmission => write!(f, "Turn off transmission"),
            Command::TurnOnTransmission => write!(f, "Turn on transmission"),
            Command::SendHeaderFrame => write!(f, "Send header frame"),
            Command::SendConfigFrame1 => write!(f, "Send configuration frame 1"),
            Command::SendConfigFrame2 => write!(f, "Send configuration frame 2"),
            Command::SendConfigFrame3 => write!(f, "Send configuration frame 3"),
            Command::ExtendedFrame => write!(f, "Extended frame"),
            Command::Other(word) => write!(f, "Command 0x{:04X}", word),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandFrame {
    pub header: CommonFrameHeader,
    pub command: Command,
    pub extended_data: Option<Vec<u8>>,
    pub chk: u16,
}

impl CommandFrame {
    pub fn new(id_code: u16, timestamp: DateTime<Utc>, command: Command) -> Self {
        CommandFrame {
            header: CommonFrameHeader::new(FrameType::CommandFrame, id_code, timestamp),
            command,
            extended_data: None,
            chk: 0,
        }
    }

    pub fn turn_off_transmission(id_code: u16, timestamp: DateTime<Utc>) -> Self {
        Self::new(id_code, timestamp, Command::TurnOffTransmission)
    }

    pub fn turn_on_transmission(id_code: u16, timestamp: DateTime<Utc>) -> Self {
        Self::new(id_code, timestamp, Command::TurnOnTransmission)
    }

    pub fn send_header_frame(id_code: u16, timestamp: DateTime<Utc>) -> Self {
        Self::new(id_code, timestamp, Command::SendHeaderFrame)
    }

    pub fn send_config_frame1(id_code: u16, timestamp: DateTime<Utc>) -> Self {
        Self::new(id_code, timestamp, Command::SendConfigFrame1)
    }

    pub fn send_config_frame2(id_code: u16, timestamp: DateTime<Utc>) -> Self {
        Self::new(id_code, timestamp, Command::SendConfigFrame2)
    }

    pub fn send_config_frame3(id_code: u16, timestamp: DateTime<Utc>) -> Self {
        Self::new(id_code, timestamp, Command::SendConfigFrame3)
    }

    pub fn extended_frame(id_code: u16, timestamp: DateTime<Utc>, data: Vec<u8>) -> Self {
        let mut frame = Self::new(id_code, timestamp, Command::ExtendedFrame);
        frame.extended_data = Some(data);
        frame
    }

    /// Parses a command frame from the front of `bytes`.
    pub fn from_hex(bytes: &[u8]) -> Result<Decoded<Self>, ParseError> {
        match CommonFrameHeader::parse(bytes, None, &ParseOptions::default())? {
            Decoded::Complete(header) => Self::from_header(header, bytes).map(Decoded::Complete),
            Decoded::Incomplete { required } => Ok(Decoded::Incomplete { required }),
        }
    }

    pub fn from_header(header: CommonFrameHeader, bytes: &[u8]) -> Result<Self, ParseError> {
        if header.session.is_some() || header.frame_type != FrameType::CommandFrame {
            return Err(ParseError::InvalidFrameType {
                message: format!("Expected a command frame, got {}", header.frame_type),
            });
        }

        // Header, command word, checksum
        let minimum = FIXED_HEADER_LENGTH + 4;
        let frame_length = header.frame_length;
        if frame_length < minimum {
            return Err(ParseError::short_buffer("Command frame", minimum, frame_length));
        }
        if bytes.len() < frame_length {
            return Err(ParseError::short_buffer("Command frame", frame_length, bytes.len()));
        }

        let frame = &bytes[..frame_length];
        validate_checksum(frame)?;

        let command = Command::from_word(u16::from_be_bytes([
            frame[FIXED_HEADER_LENGTH],
            frame[FIXED_HEADER_LENGTH + 1],
        ]));
        let extended_data = if frame_length > minimum {
            Some(frame[FIXED_HEADER_LENGTH + 2..frame_length - 2].to_vec())
        } else {
            None
        };
        let chk = u16::from_be_bytes([frame[frame_length - 2], frame[frame_length - 1]]);

        Ok(CommandFrame {
            header,
            command,
            extended_data,
            chk,
        })
    }

    pub fn to_hex(&self) -> Result<Vec<u8>, ParseError> {
        let extended = self.extended_data.as_deref().unwrap_or_default();
        let mut header = self.header.clone();
        header.frame_type = FrameType::CommandFrame;
        header.frame_length = FIXED_HEADER_LENGTH + 4 + extended.len();

        let mut result = Vec::with_capacity(header.frame_length);
        result.extend_from_slice(&header.to_hex()?);
        result.extend_from_slice(&self.command.to_word().to_be_bytes());
        result.extend_from_slice(extended);

        let chk = calculate_crc(&result);
        result.extend_from_slice(&chk.to_be_bytes());
        Ok(result)
    }
}

impl ChannelFrame for CommandFrame {
    fn header(&self) -> &CommonFrameHeader {
        &self.header
    }
}
