//! # Frame Parser
//!
//! Stateful front end for one stream or connection. It classifies each frame, dispatches
//! it to the matching codec and keeps the configuration used to interpret later data
//! frames. Each connection needs its own parser; nothing here is shared.
//!
//! Two entry points are offered:
//!
//! - [`FrameParser::parse`] decodes the frame at the start of a caller owned buffer and
//!   reports `Decoded::Incomplete` until the whole frame is present.
//! - [`FrameParser::push`] appends bytes to an internal buffer and drains every complete
//!   frame, skipping corrupt frames and garbage between frames.

use serde::{Deserialize, Serialize};

use super::command::CommandFrame;
use super::common::{Decoded, FrameType, ParseError, ParseOptions};
use super::config::ConfigurationFrame;
use super::data_frame::DataFrame;
use super::header::{ChannelFrame, CommonFrameHeader};
use super::utils::{find_frame_starts, frame_length_at};

/// A decoded frame of any type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Frame {
    Data(DataFrame),
    Configuration(ConfigurationFrame),
    Command(CommandFrame),
}

impl ChannelFrame for Frame {
    fn header(&self) -> &CommonFrameHeader {
        match self {
            Frame::Data(frame) => &frame.header,
            Frame::Configuration(frame) => &frame.header,
            Frame::Command(frame) => &frame.header,
        }
    }
}

/// Result of parsing one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFrame {
    pub frame: Frame,
    /// Older ASDUs of a data frame, oldest first, when redundant parsing is enabled.
    pub redundant: Vec<DataFrame>,
    /// Set on the first data frame reporting a configuration change, until it clears.
    pub configuration_changed: bool,
    /// Bytes the frame occupied in the input.
    pub length: usize,
}

/// Running counters for a parser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserStatistics {
    pub data_frames: u64,
    pub configuration_frames: u64,
    pub command_frames: u64,
    pub redundant_frames: u64,
    /// Signature mismatches tolerated because of the parse options.
    pub signature_failures: u64,
    /// Sample size mismatches tolerated because of the parse options.
    pub sample_size_failures: u64,
    pub configuration_changes: u64,
    pub errors: u64,
    pub discarded_bytes: u64,
}

#[derive(Debug, Default)]
pub struct FrameParser {
    options: ParseOptions,
    configuration: Option<ConfigurationFrame>,
    statistics: ParserStatistics,
    configuration_change_reported: bool,
    pending: Vec<u8>,
}

impl FrameParser {
    pub fn new(options: ParseOptions) -> Self {
        FrameParser {
            options,
            ..Default::default()
        }
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// Configuration used to interpret data frames, received or derived.
    pub fn configuration(&self) -> Option<&ConfigurationFrame> {
        self.configuration.as_ref()
    }

    /// Binds a configuration obtained out of band.
    pub fn set_configuration(&mut self, configuration: ConfigurationFrame) {
        self.configuration = Some(configuration);
    }

    pub fn statistics(&self) -> ParserStatistics {
        self.statistics.clone()
    }

    /// Bytes buffered by [`FrameParser::push`] that do not yet form a complete frame.
    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }

    /// Decodes the frame at the start of `buffer`.
    ///
    /// Errors are fatal for this frame only: the cached configuration is left untouched.
    pub fn parse(&mut self, buffer: &[u8]) -> Result<Decoded<ParsedFrame>, ParseError> {
        match self.parse_frame(buffer) {
            Ok(decoded) => Ok(decoded),
            Err(e) => {
                self.statistics.errors += 1;
                Err(e)
            }
        }
    }

    fn parse_frame(&mut self, buffer: &[u8]) -> Result<Decoded<ParsedFrame>, ParseError> {
        let header =
            match CommonFrameHeader::parse(buffer, self.configuration.as_ref(), &self.options)? {
                Decoded::Complete(header) => header,
                Decoded::Incomplete { required } => return Ok(Decoded::Incomplete { required }),
            };
        let length = header.frame_length;

        let parsed = match (header.frame_type, header.session.is_some()) {
            (FrameType::DataFrame, true) => {
                let signature_valid = header
                    .session
                    .as_ref()
                    .map_or(true, |session| session.signature_valid);

                let result = DataFrame::from_header(
                    header,
                    buffer,
                    self.configuration.as_ref(),
                    &self.options,
                )?;

                if !signature_valid {
                    self.statistics.signature_failures += 1;
                }
                if !result.frame.sample_size_valid {
                    self.statistics.sample_size_failures += 1;
                }
                if let Some(derived) = result.derived_configuration {
                    log::info!(
                        "Using derived configuration with {} cells for \"{}\"",
                        derived.cells.len(),
                        result.frame.msvid
                    );
                    self.configuration = Some(derived);
                }

                self.statistics.data_frames += 1;
                self.statistics.redundant_frames += result.redundant.len() as u64;
                let configuration_changed = self.track_configuration_change(&result.frame);

                ParsedFrame {
                    frame: Frame::Data(result.frame),
                    redundant: result.redundant,
                    configuration_changed,
                    length,
                }
            }
            (FrameType::ConfigurationFrame, false) => {
                let configuration = ConfigurationFrame::from_header(header, buffer)?;
                log::debug!(
                    "Received configuration frame for ID code {} with {} cells",
                    configuration.id_code(),
                    configuration.cells.len()
                );
                self.statistics.configuration_frames += 1;
                self.configuration = Some(configuration.clone());
                self.configuration_change_reported = false;
                Self::simple(Frame::Configuration(configuration), length)
            }
            (FrameType::CommandFrame, false) => {
                let command = CommandFrame::from_header(header, buffer)?;
                log::warn!(
                    "Unexpected command frame \"{}\" from ID code {}",
                    command.command,
                    command.id_code()
                );
                self.statistics.command_frames += 1;
                Self::simple(Frame::Command(command), length)
            }
            (frame_type, _) => {
                return Err(ParseError::InvalidFrameType {
                    message: format!("{} is not valid with this header form", frame_type),
                })
            }
        };

        Ok(Decoded::Complete(parsed))
    }

    fn simple(frame: Frame, length: usize) -> ParsedFrame {
        ParsedFrame {
            frame,
            redundant: Vec::new(),
            configuration_changed: false,
            length,
        }
    }

    // Reports a change once, then stays quiet until no cell signals it anymore.
    fn track_configuration_change(&mut self, frame: &DataFrame) -> bool {
        let signalled = frame
            .cells
            .iter()
            .any(|cell| cell.status.signals_configuration_change());

        if !signalled {
            self.configuration_change_reported = false;
            return false;
        }
        if self.configuration_change_reported {
            return false;
        }

        log::info!(
            "Configuration change reported by \"{}\" at sample {}",
            frame.msvid,
            frame.sample_count
        );
        self.configuration_change_reported = true;
        self.statistics.configuration_changes += 1;
        true
    }

    /// Buffers `bytes` and decodes every complete frame now available.
    ///
    /// A frame that fails to decode is skipped when its length is known, otherwise the
    /// parser scans forward to the next plausible frame start.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<ParsedFrame, ParseError>> {
        let mut pending = std::mem::take(&mut self.pending);
        pending.extend_from_slice(bytes);

        let mut results = Vec::new();
        let mut offset = 0;

        while offset < pending.len() {
            match self.parse(&pending[offset..]) {
                Ok(Decoded::Complete(parsed)) => {
                    offset += parsed.length;
                    results.push(Ok(parsed));
                }
                Ok(Decoded::Incomplete { .. }) => break,
                Err(e) => {
                    let next = match frame_length_at(&pending, offset) {
                        Some(length) if length > 0 && offset + length <= pending.len() => {
                            offset + length
                        }
                        _ => Self::resynchronize(&pending, offset),
                    };
                    log::warn!("Skipping {} bytes after parse error: {}", next - offset, e);
                    self.statistics.discarded_bytes += (next - offset) as u64;
                    offset = next;
                    results.push(Err(e));
                }
            }
        }

        pending.drain(..offset);
        self.pending = pending;
        results
    }

    // Next frame start after `offset`. Without one, keep the last byte: it may be the
    // length indicator of a session frame whose tag has not arrived yet.
    fn resynchronize(buffer: &[u8], offset: usize) -> usize {
        let from = offset + 1;
        match find_frame_starts(&buffer[from..]) {
            Ok(starts) => starts.first().map_or(buffer.len(), |(start, _)| from + start),
            Err(_) => (buffer.len() - 1).max(from),
        }
    }
}
