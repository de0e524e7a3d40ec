//! # Common Frame Header
//!
//! Every frame starts with one of two headers:
//!
//! * a plain 14 byte C37.118 style header (sync byte 0xAA) used by configuration and
//!   command frames:
//!   `[sync][type|version][frame length][id code][second of century][fraction + quality]`
//! * a session header (CLTP tag 0x40 at offset 1) used by sampled value data frames,
//!   followed by the `SvPdu`, `AsduCount` and `SequenceOfAsdu` tags.
//!
//! [`CommonFrameHeader::parse`] sniffs the format, sizes the frame and, for signed
//! session frames, verifies the signature once the whole frame is available.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::{
    Decoded, FrameType, ParseError, ParseOptions, SampledValueTag, SecurityAlgorithm,
    SessionType, SignatureAlgorithm, TimeQualityFlags, TimeQualityIndicatorCode, CLTP_TAG,
    FIXED_HEADER_LENGTH, IEC_FIXED_LENGTH, PAYLOAD_TYPE_TAG, SESSION_HEADER_SIZE, SYNC_BYTE,
    TIMEBASE, VERSION_NUMBER_MASK,
};
use super::config::ConfigurationFrame;
use super::signature::{signing_key, verify_signature, SignatureCheck};
use super::tags::{parse_byte_tag, validate_tag};
use super::timetag::{from_wire_time, to_wire_time, to_wire_time_high_precision};
use super::utils::to_hex_string;

/// CLTP length indicator written by this encoder.
const CLTP_LENGTH_INDICATOR: u8 = 0x01;

/// Session header fields that only exist on session (data) frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionHeader {
    /// CLTP length indicator plus one.
    pub cltp_length: usize,
    pub spdu_length: u32,
    pub packet_number: u32,
    pub spdu_version: u16,
    pub time_of_current_key: u32,
    pub time_to_next_key: u16,
    pub security_algorithm: SecurityAlgorithm,
    pub signature_algorithm: SignatureAlgorithm,
    pub key_id: u32,
    pub data_length: u32,
    pub simulated: bool,
    pub application_id: u16,
    pub payload_size: u16,
    pub asdu_count: u8,
    /// Bytes from frame start up to the first ASDU.
    pub header_length: usize,
    #[serde(skip)]
    pub signature: SignatureCheck,
    /// False when a signature mismatch was tolerated.
    pub signature_valid: bool,
}

/// Parameters a publisher chooses for each outgoing session frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionParameters {
    pub packet_number: u32,
    pub time_of_current_key: u32,
    pub time_to_next_key: u16,
    pub security_algorithm: SecurityAlgorithm,
    pub signature_algorithm: SignatureAlgorithm,
    pub key_id: u32,
    pub simulated: bool,
    pub application_id: u16,
    pub asdu_count: u8,
}

impl Default for SessionParameters {
    fn default() -> Self {
        SessionParameters {
            packet_number: 0,
            time_of_current_key: 0,
            time_to_next_key: 100,
            security_algorithm: SecurityAlgorithm::None,
            signature_algorithm: SignatureAlgorithm::None,
            key_id: 0,
            simulated: false,
            application_id: 0,
            asdu_count: 1,
        }
    }
}

impl SessionParameters {
    /// Builds the fixed session header for a sequence of ASDUs `sequence_length` bytes long.
    ///
    /// Every length field is derived from `sequence_length`, so the ASDU images must be
    /// generated first.
    pub fn header_image(&self, sequence_length: usize) -> Result<Vec<u8>, ParseError> {
        if self.asdu_count == 0 {
            return Err(ParseError::EmptyAsduSequence);
        }
        // The whole frame, and so every nested length, must fit 16 bits
        if self.frame_length(sequence_length) > u16::MAX as usize {
            return Err(ParseError::ValueTooLarge {
                length: sequence_length,
            });
        }

        let cltp_length = CLTP_LENGTH_INDICATOR as usize + 1;
        let spdu_length = (IEC_FIXED_LENGTH + sequence_length - cltp_length - 8) as u32;
        let data_length = (sequence_length + 17) as u32;
        let payload_size = (sequence_length + 11) as u16;

        let mut image = Vec::with_capacity(IEC_FIXED_LENGTH);
        image.push(CLTP_LENGTH_INDICATOR);
        image.push(CLTP_TAG);
        image.push(SessionType::SampledValues.to_byte());
        image.push(SESSION_HEADER_SIZE);
        // Common session header parameter tag and length
        image.push(0x80);
        image.push(0x16);
        image.extend_from_slice(&spdu_length.to_be_bytes());
        image.extend_from_slice(&self.packet_number.to_be_bytes());
        image.extend_from_slice(&1u16.to_be_bytes());
        image.extend_from_slice(&self.time_of_current_key.to_be_bytes());
        image.extend_from_slice(&self.time_to_next_key.to_be_bytes());
        image.push(self.security_algorithm.to_byte());
        image.push(self.signature_algorithm.to_byte());
        image.extend_from_slice(&self.key_id.to_be_bytes());
        image.extend_from_slice(&data_length.to_be_bytes());
        image.push(PAYLOAD_TYPE_TAG);
        image.push(self.simulated as u8);
        image.extend_from_slice(&self.application_id.to_be_bytes());
        image.extend_from_slice(&payload_size.to_be_bytes());
        image.push(SampledValueTag::SV_PDU.0);
        image.push(0x82);
        image.extend_from_slice(&((sequence_length + 7) as u16).to_be_bytes());
        image.push(SampledValueTag::ASDU_COUNT.0);
        image.push(0x01);
        image.push(self.asdu_count);
        image.push(SampledValueTag::SEQUENCE_OF_ASDU.0);
        image.push(0x82);
        image.extend_from_slice(&(sequence_length as u16).to_be_bytes());

        debug_assert_eq!(image.len(), IEC_FIXED_LENGTH);
        Ok(image)
    }

    /// Total frame length for a sequence of ASDUs, signature trailer included.
    pub fn frame_length(&self, sequence_length: usize) -> usize {
        IEC_FIXED_LENGTH + sequence_length + self.signature_algorithm.trailer_length()
    }
}

/// Access to the header of a decoded frame, implemented by every frame type.
pub trait ChannelFrame {
    fn header(&self) -> &CommonFrameHeader;

    fn frame_type(&self) -> FrameType {
        self.header().frame_type
    }

    fn id_code(&self) -> u16 {
        self.header().id_code
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.header().timestamp
    }
}

/// Header shared by all frame types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonFrameHeader {
    pub frame_type: FrameType,
    /// Version nibble, only meaningful for plain frames.
    pub version: u8,
    /// Total on-wire length of the frame.
    pub frame_length: usize,
    pub id_code: u16,
    pub timestamp: DateTime<Utc>,
    /// Top byte of the fraction-of-second word: flags and indicator code.
    pub time_quality: u8,
    /// Frame rate of the bound configuration, enables frame aligned fractions on encode.
    pub frames_per_second: Option<u16>,
    pub session: Option<SessionHeader>,
}

impl CommonFrameHeader {
    /// Header for an outgoing plain frame. The frame length is filled in on encode.
    pub fn new(frame_type: FrameType, id_code: u16, timestamp: DateTime<Utc>) -> Self {
        CommonFrameHeader {
            frame_type,
            version: 1,
            frame_length: FIXED_HEADER_LENGTH,
            id_code,
            timestamp,
            time_quality: 0,
            frames_per_second: None,
            session: None,
        }
    }

    /// Classifies and parses the header at the start of `buffer`.
    ///
    /// Returns `Decoded::Incomplete` until the whole frame is present. `configuration`
    /// is the frame currently bound to the stream, if any.
    pub fn parse(
        buffer: &[u8],
        configuration: Option<&ConfigurationFrame>,
        options: &ParseOptions,
    ) -> Result<Decoded<CommonFrameHeader>, ParseError> {
        match buffer.first() {
            None => Ok(Decoded::Incomplete {
                required: FIXED_HEADER_LENGTH,
            }),
            Some(&SYNC_BYTE) => Self::parse_plain(buffer, configuration),
            Some(_) if buffer.len() < 2 => Ok(Decoded::Incomplete {
                required: FIXED_HEADER_LENGTH,
            }),
            Some(_) if buffer[1] == CLTP_TAG => Self::parse_session(buffer, options),
            Some(&first) => Err(ParseError::InvalidFormat {
                message: format!(
                    "Bad data stream, expected sync byte 0xAA or CLTP tag 0x40 at the start of a frame, got 0x{:02X} 0x{:02X}",
                    first, buffer[1]
                ),
            }),
        }
    }

    fn parse_plain(
        buffer: &[u8],
        configuration: Option<&ConfigurationFrame>,
    ) -> Result<Decoded<CommonFrameHeader>, ParseError> {
        if buffer.len() < FIXED_HEADER_LENGTH {
            return Ok(Decoded::Incomplete {
                required: FIXED_HEADER_LENGTH,
            });
        }

        let frame_type = FrameType::from_byte(buffer[1] & !VERSION_NUMBER_MASK)?;
        let version = buffer[1] & VERSION_NUMBER_MASK;
        let frame_length = u16::from_be_bytes([buffer[2], buffer[3]]) as usize;
        let id_code = u16::from_be_bytes([buffer[4], buffer[5]]);
        let second_of_century = u32::from_be_bytes([buffer[6], buffer[7], buffer[8], buffer[9]]);
        let fraction_word = u32::from_be_bytes([buffer[10], buffer[11], buffer[12], buffer[13]]);

        if frame_length < FIXED_HEADER_LENGTH {
            return Err(ParseError::InvalidLength {
                message: format!(
                    "Declared frame length {} is shorter than the {} byte header",
                    frame_length, FIXED_HEADER_LENGTH
                ),
            });
        }

        if buffer.len() < frame_length {
            return Ok(Decoded::Incomplete {
                required: frame_length,
            });
        }

        Ok(Decoded::Complete(CommonFrameHeader {
            frame_type,
            version,
            frame_length,
            id_code,
            timestamp: from_wire_time(second_of_century, fraction_word, TIMEBASE),
            time_quality: (fraction_word >> 24) as u8,
            frames_per_second: configuration.map(|config| config.frames_per_second()),
            session: None,
        }))
    }

    fn parse_session(
        buffer: &[u8],
        options: &ParseOptions,
    ) -> Result<Decoded<CommonFrameHeader>, ParseError> {
        let cltp_length = buffer[0] as usize + 1;

        // Session type through key ID
        let fixed = cltp_length + SESSION_HEADER_SIZE as usize + 2;
        if buffer.len() < fixed {
            return Ok(Decoded::Incomplete { required: fixed });
        }

        let mut index = cltp_length;
        let session_type = buffer[index];
        if SessionType::from_byte(session_type) != Some(SessionType::SampledValues) {
            return Err(ParseError::UnsupportedSessionType(session_type));
        }
        index += 1;

        let header_size = buffer[index];
        if header_size != SESSION_HEADER_SIZE {
            return Err(ParseError::InvalidSessionHeader(header_size));
        }
        // Header size plus the common session header tag and length
        index += 3;

        let spdu_length = read_u32(buffer, index);
        index += 4;

        let packet_number = read_u32(buffer, index);
        let spdu_version = u16::from_be_bytes([buffer[index + 4], buffer[index + 5]]);
        let time_of_current_key = read_u32(buffer, index + 6);
        let time_to_next_key = u16::from_be_bytes([buffer[index + 10], buffer[index + 11]]);
        let security_algorithm = SecurityAlgorithm::from_byte(buffer[index + 12])?;
        let signature_algorithm = SignatureAlgorithm::from_byte(buffer[index + 13])?;
        let key_id = read_u32(buffer, index + 14);

        let trailer_length = signature_algorithm.trailer_length();
        let frame_length = cltp_length + spdu_length as usize + 8 + trailer_length;
        // Frame lengths are 16-bit on the wire, anything larger is not a real session header
        if frame_length > u16::MAX as usize {
            return Err(ParseError::InvalidLength {
                message: format!(
                    "Session frame length {} from SPDU length {} exceeds {} bytes",
                    frame_length,
                    spdu_length,
                    u16::MAX
                ),
            });
        }

        if buffer.len() < frame_length {
            return Ok(Decoded::Incomplete {
                required: frame_length,
            });
        }
        let frame = &buffer[..frame_length];

        let mut signature = SignatureCheck::default();
        let mut signature_valid = true;

        if signature_algorithm != SignatureAlgorithm::None {
            let signed_end = frame_length - trailer_length;
            signature = verify_signature(
                signature_algorithm,
                signing_key(key_id),
                &frame[cltp_length..signed_end],
                &frame[signed_end..],
            )?;

            if !signature.is_valid() {
                if !options.ignore_signature_validation_failures {
                    return Err(ParseError::SignatureMismatch {
                        algorithm: signature_algorithm,
                    });
                }
                log::warn!(
                    "Ignoring {} signature mismatch on packet {}: parsed [{}], calculated [{}]",
                    signature_algorithm,
                    packet_number,
                    to_hex_string(&signature.source_hash),
                    to_hex_string(&signature.calculated_hash)
                );
                signature_valid = false;
            }
        }

        if security_algorithm != SecurityAlgorithm::None {
            log::debug!(
                "Packet {} declares {} payload security, parsing payload as-is",
                packet_number,
                security_algorithm
            );
        }

        index += 18;
        let payload_fixed = index + 10;
        if frame.len() < payload_fixed {
            return Err(ParseError::short_buffer(
                "Session payload header",
                payload_fixed,
                frame.len(),
            ));
        }

        let data_length = read_u32(frame, index);
        index += 4;

        if frame[index] != PAYLOAD_TYPE_TAG {
            return Err(ParseError::UnsupportedPayloadType(frame[index]));
        }
        index += 1;

        let simulated = frame[index] != 0;
        index += 1;

        let application_id = u16::from_be_bytes([frame[index], frame[index + 1]]);
        index += 2;

        let payload_size = u16::from_be_bytes([frame[index], frame[index + 1]]);
        index += 2;

        validate_tag(frame, SampledValueTag::SV_PDU, &mut index)?;

        let asdu_count = parse_byte_tag(frame, SampledValueTag::ASDU_COUNT, &mut index)?;
        if asdu_count == 0 {
            return Err(ParseError::EmptyAsduSequence);
        }

        validate_tag(frame, SampledValueTag::SEQUENCE_OF_ASDU, &mut index)?;

        Ok(Decoded::Complete(CommonFrameHeader {
            frame_type: FrameType::DataFrame,
            version: 0,
            frame_length,
            // Data frame identity and time come from the ASDUs
            id_code: 1,
            timestamp: from_wire_time(time_of_current_key, 0, TIMEBASE),
            time_quality: 0,
            frames_per_second: None,
            session: Some(SessionHeader {
                cltp_length,
                spdu_length,
                packet_number,
                spdu_version,
                time_of_current_key,
                time_to_next_key,
                security_algorithm,
                signature_algorithm,
                key_id,
                data_length,
                simulated,
                application_id,
                payload_size,
                asdu_count,
                header_length: index,
                signature,
                signature_valid,
            }),
        }))
    }

    /// Header length: 14 for plain frames, the parsed session header length for data
    /// frames (or the standard 49 bytes when nothing has been parsed).
    pub fn length(&self) -> usize {
        match (&self.frame_type, &self.session) {
            (FrameType::DataFrame, Some(session)) => session.header_length,
            (FrameType::DataFrame, None) => IEC_FIXED_LENGTH,
            _ => FIXED_HEADER_LENGTH,
        }
    }

    pub fn asdu_count(&self) -> u8 {
        self.session.as_ref().map_or(1, |session| session.asdu_count)
    }

    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        self.session
            .as_ref()
            .map_or(SignatureAlgorithm::None, |session| session.signature_algorithm)
    }

    pub fn security_algorithm(&self) -> SecurityAlgorithm {
        self.session
            .as_ref()
            .map_or(SecurityAlgorithm::None, |session| session.security_algorithm)
    }

    pub fn time_quality_flags(&self) -> TimeQualityFlags {
        TimeQualityFlags::from_fraction_word((self.time_quality as u32) << 24)
    }

    pub fn time_quality_indicator_code(&self) -> TimeQualityIndicatorCode {
        TimeQualityIndicatorCode::from_fraction_word((self.time_quality as u32) << 24)
    }

    /// Second of century and fraction word for the header timestamp.
    ///
    /// With a known frame rate the fraction is aligned to the nearest frame boundary.
    pub fn wire_time(&self) -> (u32, u32) {
        let wire = match self.frames_per_second {
            Some(fps) => to_wire_time_high_precision(&self.timestamp, TIMEBASE, fps),
            None => to_wire_time(&self.timestamp, TIMEBASE),
        };
        (
            wire.second_of_century,
            wire.fraction | ((self.time_quality as u32) << 24),
        )
    }

    /// Plain 14 byte header image.
    pub fn to_hex(&self) -> Result<[u8; 14], ParseError> {
        if self.frame_type == FrameType::DataFrame {
            return Err(ParseError::InvalidFrameType {
                message: "Data frames use the session header, not the plain header".to_string(),
            });
        }
        let frame_length = u16::try_from(self.frame_length).map_err(|_| {
            ParseError::ValueTooLarge {
                length: self.frame_length,
            }
        })?;
        let (second_of_century, fraction_word) = self.wire_time();

        let mut result = [0u8; 14];
        result[0] = SYNC_BYTE;
        result[1] = self.frame_type.to_byte() | (self.version & VERSION_NUMBER_MASK);
        result[2..4].copy_from_slice(&frame_length.to_be_bytes());
        result[4..6].copy_from_slice(&self.id_code.to_be_bytes());
        result[6..10].copy_from_slice(&second_of_century.to_be_bytes());
        result[10..14].copy_from_slice(&fraction_word.to_be_bytes());
        Ok(result)
    }

    /// Name/value pairs describing the header, for diagnostics.
    pub fn header_attributes(&self) -> Vec<(String, String)> {
        let mut attributes = vec![
            ("Frame Type".to_string(), self.frame_type.to_string()),
            ("Frame Length".to_string(), self.frame_length.to_string()),
            ("Version".to_string(), self.version.to_string()),
            ("ID Code".to_string(), self.id_code.to_string()),
            ("Timestamp".to_string(), self.timestamp.to_rfc3339()),
            (
                "Time Quality Flags".to_string(),
                format!("0x{:08X}", self.time_quality_flags().0),
            ),
            (
                "Time Quality Indicator Code".to_string(),
                format!("{:?}", self.time_quality_indicator_code()),
            ),
        ];

        if let Some(session) = &self.session {
            let fields = [
                ("SPDU Length", session.spdu_length.to_string()),
                ("Packet Number", session.packet_number.to_string()),
                ("SPDU Version", session.spdu_version.to_string()),
                ("Time of Current Key", session.time_of_current_key.to_string()),
                ("Time to Next Key", session.time_to_next_key.to_string()),
                ("Security Algorithm", session.security_algorithm.to_string()),
                ("Signature Algorithm", session.signature_algorithm.to_string()),
                ("Key ID", format!("{:08X}", session.key_id)),
                ("Data Length", session.data_length.to_string()),
                ("Simulated Data", session.simulated.to_string()),
                ("Application ID", session.application_id.to_string()),
                ("Payload Size", session.payload_size.to_string()),
                ("ASDU Count", session.asdu_count.to_string()),
                ("Header Length", session.header_length.to_string()),
                ("Signature Valid", session.signature_valid.to_string()),
                ("Parsed Signature Hash", hash_or_null(&session.signature.source_hash)),
                (
                    "Calculated Signature Hash",
                    hash_or_null(&session.signature.calculated_hash),
                ),
            ];
            attributes.extend(
                fields
                    .into_iter()
                    .map(|(name, value)| (name.to_string(), value)),
            );
        }

        attributes
    }
}

fn hash_or_null(hash: &[u8]) -> String {
    if hash.is_empty() {
        "null".to_string()
    } else {
        to_hex_string(hash)
    }
}

// Callers check bounds first
fn read_u32(buffer: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buffer[at], buffer[at + 1], buffer[at + 2], buffer[at + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iec61850_90_5::common::ErrorKind;
    use crate::iec61850_90_5::signature::{signature_trailer, DUMMY_KEY};

    fn session_frame(parameters: &SessionParameters, sequence: &[u8]) -> Vec<u8> {
        let mut frame = parameters.header_image(sequence.len()).unwrap();
        frame.extend_from_slice(sequence);
        let trailer =
            signature_trailer(parameters.signature_algorithm, &DUMMY_KEY, &frame[2..]).unwrap();
        frame.extend_from_slice(&trailer);
        frame
    }

    #[test]
    fn test_plain_configuration_header() {
        let mut buffer = vec![0xAA, 0x31, 0x00, 0x0E, 0x00, 0x07];
        buffer.extend_from_slice(&1_700_000_000u32.to_be_bytes());
        buffer.extend_from_slice(&0u32.to_be_bytes());

        let header = CommonFrameHeader::parse(&buffer, None, &ParseOptions::default())
            .unwrap()
            .complete()
            .unwrap();
        assert_eq!(header.frame_type, FrameType::ConfigurationFrame);
        assert_eq!(header.version, 1);
        assert_eq!(header.id_code, 7);
        assert_eq!(header.frame_length, 14);
        assert_eq!(header.timestamp.timestamp(), 1_700_000_000);
        assert_eq!(header.timestamp.timestamp_subsec_nanos(), 0);
        assert_eq!(header.length(), FIXED_HEADER_LENGTH);
        assert!(header.session.is_none());
    }

    #[test]
    fn test_plain_header_round_trip() {
        let timestamp = DateTime::from_timestamp(1_700_000_000, 250_000_000).unwrap();
        let mut header = CommonFrameHeader::new(FrameType::CommandFrame, 42, timestamp);
        header.frame_length = 18;
        header.time_quality = 0x1A;

        let mut image = header.to_hex().unwrap().to_vec();
        image.extend_from_slice(&[0, 0, 0, 0]);
        let parsed = CommonFrameHeader::parse(&image, None, &ParseOptions::default())
            .unwrap()
            .complete()
            .unwrap();
        assert_eq!(parsed.frame_type, FrameType::CommandFrame);
        assert_eq!(parsed.id_code, 42);
        assert_eq!(parsed.timestamp, timestamp);
        assert_eq!(parsed.time_quality, 0x1A);
        assert!(parsed.time_quality_flags().leap_second_pending());
        assert_eq!(
            parsed.time_quality_indicator_code(),
            TimeQualityIndicatorCode::UnlockedWithin1Second
        );
    }

    #[test]
    fn test_short_buffers_need_more_data() {
        let options = ParseOptions::default();
        for buffer in [
            vec![],
            vec![0xAA],
            vec![0xAA, 0x31, 0x00, 0x0E, 0x00, 0x07, 0x00],
            vec![0x01],
            vec![0x01, 0x40, 0xA2, 0x18],
        ] {
            let result = CommonFrameHeader::parse(&buffer, None, &options).unwrap();
            assert!(
                !result.is_complete(),
                "Buffer of {} bytes should need more data",
                buffer.len()
            );
        }

        // Header present but declared frame longer than buffer
        let mut buffer = vec![0xAA, 0x41, 0x00, 0x20, 0x00, 0x07];
        buffer.extend_from_slice(&[0u8; 8]);
        assert_eq!(
            CommonFrameHeader::parse(&buffer, None, &options).unwrap(),
            Decoded::Incomplete { required: 0x20 }
        );
    }

    #[test]
    fn test_unknown_leading_bytes_are_rejected() {
        let err = CommonFrameHeader::parse(&[0x12, 0x34, 0x56], None, &ParseOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
    }

    #[test]
    fn test_session_header_without_signature() {
        let parameters = SessionParameters {
            packet_number: 77,
            application_id: 0x4000,
            asdu_count: 2,
            ..Default::default()
        };
        let sequence = vec![0u8; 20];
        let frame = session_frame(&parameters, &sequence);
        assert_eq!(frame.len(), parameters.frame_length(sequence.len()));

        let header = CommonFrameHeader::parse(&frame, None, &ParseOptions::default())
            .unwrap()
            .complete()
            .unwrap();
        let session = header.session.as_ref().unwrap();
        assert_eq!(header.frame_type, FrameType::DataFrame);
        assert_eq!(header.frame_length, frame.len());
        assert_eq!(header.length(), IEC_FIXED_LENGTH);
        assert_eq!(session.signature_algorithm, SignatureAlgorithm::None);
        assert_eq!(session.signature_algorithm.trailer_length(), 0);
        assert!(session.signature.source_hash.is_empty());
        assert_eq!(session.packet_number, 77);
        assert_eq!(session.spdu_version, 1);
        assert_eq!(session.application_id, 0x4000);
        assert_eq!(session.asdu_count, 2);
        assert_eq!(session.spdu_length as usize, sequence.len() + 39);
        assert_eq!(session.payload_size as usize, sequence.len() + 11);
        assert_eq!(session.data_length as usize, sequence.len() + 17);
    }

    #[test]
    fn test_signed_session_frames() {
        let sequence = vec![0x5Au8; 12];
        for algorithm in SignatureAlgorithm::ALL {
            let parameters = SessionParameters {
                signature_algorithm: algorithm,
                ..Default::default()
            };
            let frame = session_frame(&parameters, &sequence);
            assert_eq!(
                frame.len(),
                IEC_FIXED_LENGTH + sequence.len() + algorithm.trailer_length()
            );

            let strict = ParseOptions {
                ignore_signature_validation_failures: false,
                ..Default::default()
            };
            let header = CommonFrameHeader::parse(&frame, None, &strict)
                .unwrap()
                .complete()
                .unwrap();
            let session = header.session.unwrap();
            assert!(session.signature_valid, "Valid {} frame rejected", algorithm);
            assert_eq!(session.signature.calculated_hash.len(), algorithm.hash_length());
            assert_eq!(header.frame_length, frame.len());
        }
    }

    #[test]
    fn test_signature_mismatch_handling() {
        let parameters = SessionParameters {
            signature_algorithm: SignatureAlgorithm::Sha256,
            ..Default::default()
        };
        let mut frame = session_frame(&parameters, &[0x11u8; 8]);
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;

        let strict = ParseOptions {
            ignore_signature_validation_failures: false,
            ..Default::default()
        };
        let err = CommonFrameHeader::parse(&frame, None, &strict).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SignatureMismatch);

        let lenient = ParseOptions::default();
        let header = CommonFrameHeader::parse(&frame, None, &lenient)
            .unwrap()
            .complete()
            .unwrap();
        assert!(!header.session.unwrap().signature_valid);

        // A missing marker is never tolerated
        let marker = frame.len() - parameters.signature_algorithm.trailer_length();
        frame[marker] = 0x00;
        let err = CommonFrameHeader::parse(&frame, None, &lenient).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingSignatureTag);
    }

    #[test]
    fn test_session_header_violations() {
        let parameters = SessionParameters::default();
        let frame = session_frame(&parameters, &[0u8; 4]);
        let options = ParseOptions::default();

        let mut bad_type = frame.clone();
        bad_type[2] = 0xA1;
        assert!(matches!(
            CommonFrameHeader::parse(&bad_type, None, &options),
            Err(ParseError::UnsupportedSessionType(0xA1))
        ));

        let mut bad_size = frame.clone();
        bad_size[3] = 0x10;
        assert!(matches!(
            CommonFrameHeader::parse(&bad_size, None, &options),
            Err(ParseError::InvalidSessionHeader(0x10))
        ));

        let mut bad_payload = frame.clone();
        bad_payload[32] = 0x81;
        assert!(matches!(
            CommonFrameHeader::parse(&bad_payload, None, &options),
            Err(ParseError::UnsupportedPayloadType(0x81))
        ));

        let mut empty = frame.clone();
        empty[44] = 0;
        assert!(matches!(
            CommonFrameHeader::parse(&empty, None, &options),
            Err(ParseError::EmptyAsduSequence)
        ));

        let mut bad_signature = frame.clone();
        bad_signature[23] = 0x09;
        assert!(matches!(
            CommonFrameHeader::parse(&bad_signature, None, &options),
            Err(ParseError::InvalidSignatureAlgorithm(0x09))
        ));

        // Truncated session frame defers instead of failing
        assert_eq!(
            CommonFrameHeader::parse(&frame[..frame.len() - 1], None, &options).unwrap(),
            Decoded::Incomplete {
                required: frame.len()
            }
        );
    }

    #[test]
    fn test_frame_length_limit() {
        let parameters = SessionParameters {
            signature_algorithm: SignatureAlgorithm::Sha256,
            ..Default::default()
        };
        let largest = u16::MAX as usize - IEC_FIXED_LENGTH - 33;
        assert_eq!(parameters.frame_length(largest), u16::MAX as usize);
        assert!(parameters.header_image(largest).is_ok());
        assert_eq!(
            parameters.header_image(largest + 1).unwrap_err().kind(),
            ErrorKind::ValueTooLarge
        );

        // An SPDU length no 16-bit frame can hold is rejected, not waited for
        let mut oversized = session_frame(&SessionParameters::default(), &[0u8; 4]);
        oversized[6..10].copy_from_slice(&0x0001_0000u32.to_be_bytes());
        let err = CommonFrameHeader::parse(&oversized, None, &ParseOptions::default()).unwrap_err();
        assert!(matches!(err, ParseError::InvalidLength { .. }));
        assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
    }

    #[test]
    fn test_header_attributes() {
        let frame = session_frame(&SessionParameters::default(), &[0u8; 4]);
        let header = CommonFrameHeader::parse(&frame, None, &ParseOptions::default())
            .unwrap()
            .complete()
            .unwrap();
        let attributes = header.header_attributes();
        assert!(attributes
            .iter()
            .any(|(name, value)| name == "Parsed Signature Hash" && value == "null"));
        assert!(attributes
            .iter()
            .any(|(name, value)| name == "ASDU Count" && value == "1"));
    }
}
