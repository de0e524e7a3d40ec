//! # Sampled Value Data Frame
//!
//! A data frame is a session header followed by `AsduCount` ASDUs, oldest first. Each ASDU
//! carries one sample:
//!
//! `AsduSequence{ MsvID, SmpCnt, ConfRev, RefrTm, SmpSynch, [SmpRate], Samples, [SmpMod], [UtcTimestamp] }`
//!
//! Publishers repeat the last N ASDUs in every datagram so a subscriber can recover from
//! lost packets. [`AsduEncoder`] keeps that history; on decode the newest ASDU becomes the
//! frame and older ones are optionally surfaced as redundant frames.
//!
//! When no configuration is bound the sample body layout is derived from an ETR sidecar
//! file or guessed from its length, if the parse options allow it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::{
    AngleFormat, FrameType, ParseError, ParseOptions, SampledValueTag, DEFAULT_STATION_NAME,
    TIMEBASE,
};
use super::config::{ConfigurationCell, ConfigurationFrame, FLOAT_POLAR_FORMAT};
use super::etr::load_etr_configuration;
use super::header::{ChannelFrame, CommonFrameHeader, SessionParameters};
use super::phasors::DataCell;
use super::signature::{signature_trailer, signing_key};
use super::tags::{
    encode_fixed_tag_header, encode_tag_value, parse_byte_tag, parse_string_tag, parse_u16_tag,
    parse_u32_tag, validate_tag, write_fixed_tag_length,
};
use super::timetag::from_wire_time;
use super::units::{NominalFrequency, PhasorUnits};

/// Sample synchronisation value written on encode (synchronised to a global clock).
pub const SAMPLE_SYNCHRONIZED: u8 = 0x01;

/// Splits an MSVID into an ID code and station name.
///
/// `"<id>_<name>"` yields both parts when `<id>` is numeric. Anything else keeps ID code 1
/// with the whole string as station name, and a blank MSVID gets a placeholder name.
pub fn parse_msvid(msvid: &str) -> (u16, String) {
    if msvid.trim().is_empty() {
        return (1, DEFAULT_STATION_NAME.to_string());
    }

    match msvid.find('_') {
        Some(underscore) if underscore > 0 => match msvid[..underscore].parse::<u16>() {
            Ok(id_code) => (id_code, msvid[underscore + 1..].to_string()),
            Err(_) => (1, msvid.to_string()),
        },
        _ => (1, msvid.to_string()),
    }
}

/// Derives a single-cell configuration from the sample body length alone.
///
/// The body is assumed to be status (2), frequency and dF/dt (4 each) followed by float
/// polar phasors (8 each) and then digital words (2 each). Phasors are taken greedily and
/// the guess is only accepted when the remainder divides into digital words exactly. The
/// first half of the phasors are voltages, the rest currents.
pub fn guess_configuration(
    sample_length: usize,
    id_code: u16,
    station_name: &str,
    frames_per_second: u16,
    timestamp: DateTime<Utc>,
) -> Option<ConfigurationFrame> {
    if sample_length < 10 {
        return None;
    }

    let variable = sample_length - 10;
    let phasors = variable / 8;
    let remainder = variable % 8;
    if remainder % 2 != 0 {
        return None;
    }
    let digitals = remainder / 2;

    let voltages = phasors / 2;
    let phasor_definitions = (0..phasors)
        .map(|index| {
            let units = if index < voltages {
                PhasorUnits::voltage()
            } else {
                PhasorUnits::current()
            };
            (format!("Phasor {}", index + 1), units)
        })
        .collect();
    let digital_definitions = (0..digitals)
        .map(|index| format!("Digital {}", index + 1))
        .collect();

    let cell = ConfigurationCell::new(
        station_name,
        id_code,
        FLOAT_POLAR_FORMAT,
        phasor_definitions,
        Vec::new(),
        digital_definitions,
        NominalFrequency::Hz60,
    );

    log::info!(
        "Guessed configuration for \"{}\": {} phasors, {} digitals from {} byte samples",
        station_name,
        phasors,
        digitals,
        sample_length
    );

    Some(ConfigurationFrame::new(1, timestamp, frames_per_second, vec![cell]))
}

/// One decoded (or to be encoded) ASDU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    /// Session header of the datagram; id code, timestamp and time quality come from the ASDU.
    pub header: CommonFrameHeader,
    pub msvid: String,
    pub station_name: String,
    pub sample_count: u16,
    pub configuration_revision: u32,
    pub sample_synchronization: u8,
    pub sample_rate: Option<u16>,
    /// Empty when no configuration was available to interpret the samples.
    pub cells: Vec<DataCell>,
    /// False when a sample length mismatch was tolerated.
    pub sample_size_valid: bool,
}

/// Everything produced by decoding one data frame datagram.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFrameParse {
    /// Newest ASDU.
    pub frame: DataFrame,
    /// Older ASDUs, oldest first. Only filled when redundant parsing is enabled.
    pub redundant: Vec<DataFrame>,
    /// Configuration derived from an ETR file or guessed while decoding.
    pub derived_configuration: Option<ConfigurationFrame>,
}

impl DataFrame {
    pub fn new(msvid: &str, timestamp: DateTime<Utc>, cells: Vec<DataCell>) -> Self {
        let (id_code, station_name) = parse_msvid(msvid);
        let mut header = CommonFrameHeader::new(FrameType::DataFrame, id_code, timestamp);
        header.frame_length = 0;
        DataFrame {
            header,
            msvid: msvid.to_string(),
            station_name,
            sample_count: 0,
            configuration_revision: 1,
            sample_synchronization: SAMPLE_SYNCHRONIZED,
            sample_rate: None,
            cells,
            sample_size_valid: true,
        }
    }

    /// Decodes every ASDU of a data frame whose session header is already parsed.
    ///
    /// `bytes` starts at the frame's first byte and must hold the whole frame.
    pub fn from_header(
        header: CommonFrameHeader,
        bytes: &[u8],
        configuration: Option<&ConfigurationFrame>,
        options: &ParseOptions,
    ) -> Result<DataFrameParse, ParseError> {
        let session = header.session.as_ref().ok_or_else(|| ParseError::InvalidFrameType {
            message: "Data frames require a session header".to_string(),
        })?;

        let frame_length = header.frame_length;
        if bytes.len() < frame_length {
            return Err(ParseError::short_buffer("Data frame", frame_length, bytes.len()));
        }
        let asdu_end = frame_length - session.signature_algorithm.trailer_length();
        let buffer = &bytes[..asdu_end];
        let asdu_count = session.asdu_count;

        let mut index = header.length();
        let mut derived: Option<ConfigurationFrame> = None;
        let mut redundant = Vec::new();
        let mut newest = None;

        for i in 0..asdu_count {
            let active = derived.as_ref().or(configuration);
            let (frame, guessed) =
                Self::parse_asdu(&header, buffer, &mut index, active, options)?;

            if guessed.is_some() {
                derived = guessed;
            }

            if i + 1 < asdu_count {
                if options.parse_redundant_asdus {
                    redundant.push(frame);
                }
            } else {
                newest = Some(frame);
            }
        }

        let frame = newest.ok_or(ParseError::EmptyAsduSequence)?;
        log::debug!(
            "Parsed data frame \"{}\" sample {} with {} cells and {} redundant ASDUs",
            frame.msvid,
            frame.sample_count,
            frame.cells.len(),
            redundant.len()
        );

        Ok(DataFrameParse {
            frame,
            redundant,
            derived_configuration: derived,
        })
    }

    // Parses the ASDU at `index`, returning it with any configuration derived on the way.
    fn parse_asdu(
        header: &CommonFrameHeader,
        buffer: &[u8],
        index: &mut usize,
        configuration: Option<&ConfigurationFrame>,
        options: &ParseOptions,
    ) -> Result<(DataFrame, Option<ConfigurationFrame>), ParseError> {
        validate_tag(buffer, SampledValueTag::ASDU_SEQUENCE, index)?;

        let msvid = parse_string_tag(buffer, SampledValueTag::MSV_ID, index)?;
        let (id_code, station_name) = parse_msvid(&msvid);

        let sample_count = parse_u16_tag(buffer, SampledValueTag::SMP_CNT, index)?;
        let configuration_revision = parse_u32_tag(buffer, SampledValueTag::CONF_REV, index)?;

        // RefrTm: SOC (4), fraction (3), time quality (1)
        let length = validate_tag(buffer, SampledValueTag::REFR_TM, index)?;
        if length < 8 {
            return Err(ParseError::TagTooShort {
                tag: SampledValueTag::REFR_TM,
                length,
                minimum: 8,
            });
        }
        if *index + length > buffer.len() {
            return Err(ParseError::short_buffer("RefrTm value", *index + length, buffer.len()));
        }
        let at = *index;
        let second_of_century =
            u32::from_be_bytes([buffer[at], buffer[at + 1], buffer[at + 2], buffer[at + 3]]);
        let fraction = u32::from_be_bytes([0, buffer[at + 4], buffer[at + 5], buffer[at + 6]]);
        let time_quality = buffer[at + 7];
        *index += length;

        let sample_synchronization = parse_byte_tag(buffer, SampledValueTag::SMP_SYNCH, index)?;

        let sample_rate = if buffer.get(*index) == Some(&SampledValueTag::SMP_RATE.0) {
            Some(parse_u16_tag(buffer, SampledValueTag::SMP_RATE, index)?)
        } else {
            None
        };

        let sample_length = validate_tag(buffer, SampledValueTag::SAMPLES, index)?;
        if *index + sample_length > buffer.len() {
            return Err(ParseError::short_buffer(
                "Samples value",
                *index + sample_length,
                buffer.len(),
            ));
        }
        let samples = &buffer[*index..*index + sample_length];
        *index += sample_length;

        let timestamp = from_wire_time(second_of_century, fraction, TIMEBASE);

        let mut derived = None;
        if configuration.is_none() {
            if options.use_etr_configuration {
                match load_etr_configuration(
                    &options.etr_directory,
                    &msvid,
                    id_code,
                    &station_name,
                    sample_rate.unwrap_or(0),
                    timestamp,
                ) {
                    Ok(Some(config)) => derived = Some(config),
                    Ok(None) => log::debug!("No ETR configuration found for \"{}\"", msvid),
                    Err(e) => log::warn!("{}", e),
                }
            }
            if derived.is_none() && options.guess_configuration {
                derived = guess_configuration(
                    sample_length,
                    id_code,
                    &station_name,
                    sample_rate.unwrap_or(0),
                    timestamp,
                );
            }
        }

        let mut sample_size_valid = true;
        let cells = match configuration.or(derived.as_ref()) {
            None => Vec::new(),
            Some(config) => {
                let expected = config.calculated_sample_length();
                if sample_length == expected {
                    parse_cells(samples, config, options.phasor_angle_format)?
                } else if options.ignore_sample_size_validation_failures {
                    sample_size_valid = false;
                    log::warn!(
                        "Ignoring sample size mismatch for \"{}\": expected {} bytes, got {}",
                        msvid,
                        expected,
                        sample_length
                    );
                    if sample_length > expected {
                        parse_cells(samples, config, options.phasor_angle_format)?
                    } else {
                        Vec::new()
                    }
                } else {
                    return Err(ParseError::SampleSizeMismatch {
                        expected,
                        found: sample_length,
                    });
                }
            }
        };

        for optional in [SampledValueTag::SMP_MOD, SampledValueTag::UTC_TIMESTAMP] {
            if buffer.get(*index) == Some(&optional.0) {
                let length = validate_tag(buffer, optional, index)?;
                *index = (*index + length).min(buffer.len());
            }
        }

        let mut frame_header = header.clone();
        frame_header.id_code = id_code;
        frame_header.timestamp = timestamp;
        frame_header.time_quality = time_quality;
        frame_header.frames_per_second = configuration
            .or(derived.as_ref())
            .map(ConfigurationFrame::frames_per_second);

        Ok((
            DataFrame {
                header: frame_header,
                msvid,
                station_name,
                sample_count,
                configuration_revision,
                sample_synchronization,
                sample_rate,
                cells,
                sample_size_valid,
            },
            derived,
        ))
    }

    /// Encodes this frame's ASDU, cells laid out by `configuration`.
    pub fn asdu_image(
        &self,
        configuration: &ConfigurationFrame,
        angle_format: AngleFormat,
    ) -> Result<Vec<u8>, ParseError> {
        if self.cells.len() != configuration.cells.len() {
            return Err(ParseError::InvalidConfiguration {
                message: format!(
                    "Data frame has {} cells, configuration defines {}",
                    self.cells.len(),
                    configuration.cells.len()
                ),
            });
        }

        let mut samples = Vec::with_capacity(configuration.calculated_sample_length());
        for (cell, definition) in self.cells.iter().zip(&configuration.cells) {
            samples.extend_from_slice(&cell.to_hex(definition, angle_format)?);
        }
        let sample_length =
            u16::try_from(samples.len()).map_err(|_| ParseError::ValueTooLarge {
                length: samples.len(),
            })?;

        let mut header = self.header.clone();
        if configuration.frames_per_second() > 0 {
            header.frames_per_second = Some(configuration.frames_per_second());
        }
        let (second_of_century, fraction_word) = header.wire_time();
        let refresh_time = ((second_of_century as u64) << 32)
            | (((fraction_word & 0x00FF_FFFF) as u64) << 8)
            | self.header.time_quality as u64;

        let mut image = Vec::with_capacity(64 + self.msvid.len() + samples.len());
        // Length back-patched once the body is known
        encode_fixed_tag_header(SampledValueTag::ASDU_SEQUENCE, 0, &mut image);
        encode_tag_value(SampledValueTag::MSV_ID, self.msvid.as_str(), &mut image)?;
        encode_tag_value(SampledValueTag::SMP_CNT, &self.sample_count, &mut image)?;
        encode_tag_value(SampledValueTag::CONF_REV, &self.configuration_revision, &mut image)?;
        encode_tag_value(SampledValueTag::REFR_TM, &refresh_time, &mut image)?;
        encode_tag_value(SampledValueTag::SMP_SYNCH, &self.sample_synchronization, &mut image)?;
        if let Some(sample_rate) = &self.sample_rate {
            encode_tag_value(SampledValueTag::SMP_RATE, sample_rate, &mut image)?;
        }
        encode_fixed_tag_header(SampledValueTag::SAMPLES, sample_length, &mut image);
        image.extend_from_slice(&samples);

        let body_length = image.len() - 4;
        let body_length = u16::try_from(body_length)
            .map_err(|_| ParseError::ValueTooLarge { length: body_length })?;
        write_fixed_tag_length(SampledValueTag::ASDU_SEQUENCE, body_length, &mut image, 0)?;

        Ok(image)
    }
}

impl ChannelFrame for DataFrame {
    fn header(&self) -> &CommonFrameHeader {
        &self.header
    }
}

fn parse_cells(
    samples: &[u8],
    configuration: &ConfigurationFrame,
    angle_format: AngleFormat,
) -> Result<Vec<DataCell>, ParseError> {
    let mut offset = 0;
    let mut cells = Vec::with_capacity(configuration.cells.len());
    for definition in &configuration.cells {
        let (cell, consumed) = DataCell::from_hex(&samples[offset..], definition, angle_format)?;
        cells.push(cell);
        offset += consumed;
    }
    Ok(cells)
}

/// Publisher side of a sampled value stream.
///
/// Keeps the last `asdu_count` encoded ASDUs and emits all of them, oldest first, in every
/// datagram. Not shared between streams.
#[derive(Debug, Clone)]
pub struct AsduEncoder {
    session: SessionParameters,
    angle_format: AngleFormat,
    images: Vec<Option<Vec<u8>>>,
}

impl AsduEncoder {
    pub fn new(session: SessionParameters, angle_format: AngleFormat) -> Result<Self, ParseError> {
        if session.asdu_count == 0 {
            return Err(ParseError::EmptyAsduSequence);
        }
        Ok(AsduEncoder {
            images: vec![None; session.asdu_count as usize],
            session,
            angle_format,
        })
    }

    pub fn asdu_count(&self) -> u8 {
        self.session.asdu_count
    }

    /// Number of history slots holding an image. Equals the ASDU count after the first encode.
    pub fn filled_slots(&self) -> usize {
        self.images.iter().filter(|image| image.is_some()).count()
    }

    pub fn packet_number(&self) -> u32 {
        self.session.packet_number
    }

    /// Encodes `frame` and returns the complete datagram including the signature trailer.
    pub fn encode(
        &mut self,
        frame: &DataFrame,
        configuration: &ConfigurationFrame,
    ) -> Result<Vec<u8>, ParseError> {
        let image = frame.asdu_image(configuration, self.angle_format)?;

        // History as it will be after this sample, newest last. Empty slots repeat the
        // newest image.
        let mut sequence = Vec::with_capacity(image.len() * self.images.len());
        for slot in self.images.iter().skip(1) {
            sequence.extend_from_slice(slot.as_deref().unwrap_or(image.as_slice()));
        }
        sequence.extend_from_slice(&image);

        let mut parameters = self.session.clone();
        parameters.time_of_current_key = frame.header.wire_time().0;

        let mut datagram = parameters.header_image(sequence.len())?;
        datagram.extend_from_slice(&sequence);

        let cltp_length = datagram[0] as usize + 1;
        let trailer = signature_trailer(
            parameters.signature_algorithm,
            signing_key(parameters.key_id),
            &datagram[cltp_length..],
        )?;
        datagram.extend_from_slice(&trailer);

        // The ring only advances once the datagram exists
        self.images.rotate_left(1);
        let newest = self.images.len() - 1;
        self.images[newest] = Some(image.clone());
        for slot in self.images.iter_mut() {
            if slot.is_none() {
                *slot = Some(image.clone());
            }
        }

        self.session.packet_number = self.session.packet_number.wrapping_add(1);
        Ok(datagram)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iec61850_90_5::common::{Decoded, ErrorKind, SignatureAlgorithm, StatusFlags};
    use crate::iec61850_90_5::phasors::{PhasorFloatPolar, PhasorValue};

    fn configuration() -> ConfigurationFrame {
        let cell = ConfigurationCell::new(
            "Substation1",
            42,
            FLOAT_POLAR_FORMAT,
            vec![
                ("VA".to_string(), PhasorUnits::voltage()),
                ("IA".to_string(), PhasorUnits::current()),
            ],
            Vec::new(),
            Vec::new(),
            NominalFrequency::Hz60,
        );
        ConfigurationFrame::new(1, DateTime::from_timestamp(1_700_000_000, 0).unwrap(), 30, vec![cell])
    }

    fn frame(sample_count: u16, config: &ConfigurationFrame) -> DataFrame {
        let mut cell = DataCell::empty(&config.cells[0]);
        cell.frequency = 60.0 + sample_count as f32 / 1000.0;
        cell.phasors[0] = PhasorValue::FloatPolar(PhasorFloatPolar {
            magnitude: 132_790.0,
            angle: 0.5,
        });
        let timestamp =
            DateTime::from_timestamp(1_700_000_000, sample_count as u32 * 33_333_333).unwrap();
        let mut frame = DataFrame::new("42_Substation1", timestamp, vec![cell]);
        frame.sample_count = sample_count;
        frame
    }

    fn decode(
        datagram: &[u8],
        config: Option<&ConfigurationFrame>,
        options: &ParseOptions,
    ) -> Result<DataFrameParse, ParseError> {
        let header = match CommonFrameHeader::parse(datagram, config, options)? {
            Decoded::Complete(header) => header,
            Decoded::Incomplete { required } => panic!("Need {} bytes", required),
        };
        DataFrame::from_header(header, datagram, config, options)
    }

    #[test]
    fn test_msvid_convention() {
        assert_eq!(parse_msvid("42_Substation1"), (42, "Substation1".to_string()));
        assert_eq!(parse_msvid("NoUnderscore"), (1, "NoUnderscore".to_string()));
        assert_eq!(parse_msvid(""), (1, DEFAULT_STATION_NAME.to_string()));
        assert_eq!(parse_msvid("   "), (1, DEFAULT_STATION_NAME.to_string()));
        assert_eq!(parse_msvid("ABC_Station"), (1, "ABC_Station".to_string()));
        assert_eq!(parse_msvid("_Leading"), (1, "_Leading".to_string()));
        assert_eq!(parse_msvid("70000_TooBig"), (1, "70000_TooBig".to_string()));
    }

    #[test]
    fn test_guess_configuration_partition() {
        let timestamp = DateTime::from_timestamp(0, 0).unwrap();

        let guessed = guess_configuration(26, 42, "Substation1", 30, timestamp).unwrap();
        let cell = &guessed.cells[0];
        assert_eq!(cell.phnmr, 2);
        assert_eq!(cell.dgnmr, 0);
        assert_eq!(cell.idcode, 42);
        assert_eq!(cell.station_name(), "Substation1");
        assert!(!cell.phunit[0].is_current);
        assert!(cell.phunit[1].is_current);
        assert_eq!(guessed.calculated_sample_length(), 26);

        assert!(guess_configuration(27, 42, "Substation1", 30, timestamp).is_none());
        assert!(guess_configuration(9, 42, "Substation1", 30, timestamp).is_none());

        // 10 fixed + 3 phasors + 2 digital words
        let mixed = guess_configuration(10 + 24 + 4, 1, "X", 0, timestamp).unwrap();
        assert_eq!(mixed.cells[0].phnmr, 3);
        assert_eq!(mixed.cells[0].dgnmr, 2);
        assert_eq!(mixed.cells[0].phunit.iter().filter(|u| u.is_current).count(), 2);
    }

    #[test]
    fn test_asdu_layout() {
        let config = configuration();
        let image = frame(3, &config).asdu_image(&config, AngleFormat::Degrees).unwrap();

        assert_eq!(image[0], SampledValueTag::ASDU_SEQUENCE.0);
        assert_eq!(image[1], 0x82);
        assert_eq!(u16::from_be_bytes([image[2], image[3]]) as usize, image.len() - 4);
        assert_eq!(image[4], SampledValueTag::MSV_ID.0);
        assert_eq!(image[5] as usize, "42_Substation1".len());

        // Samples tag uses the fixed two byte length form
        let samples_at = image.len() - config.calculated_sample_length() - 4;
        assert_eq!(image[samples_at], SampledValueTag::SAMPLES.0);
        assert_eq!(image[samples_at + 1], 0x82);
    }

    #[test]
    fn test_redundancy_ring() {
        let config = configuration();
        let mut encoder = AsduEncoder::new(
            SessionParameters {
                asdu_count: 3,
                ..Default::default()
            },
            AngleFormat::Degrees,
        )
        .unwrap();
        assert_eq!(encoder.filled_slots(), 0);

        let options = ParseOptions {
            parse_redundant_asdus: true,
            ..Default::default()
        };

        for sample in 0..5u16 {
            let datagram = encoder.encode(&frame(sample, &config), &config).unwrap();
            assert_eq!(encoder.filled_slots(), 3);

            let parsed = decode(&datagram, Some(&config), &options).unwrap();
            assert_eq!(parsed.frame.sample_count, sample);
            assert_eq!(parsed.redundant.len(), 2);

            // Cold start fills empty slots with the newest sample
            let expected: Vec<u16> = match sample {
                0 | 1 => vec![0, 0],
                s => vec![s - 2, s - 1],
            };
            let history: Vec<u16> = parsed.redundant.iter().map(|f| f.sample_count).collect();
            assert_eq!(history, expected, "History wrong at sample {}", sample);
        }
        assert_eq!(encoder.packet_number(), 5);
    }

    #[test]
    fn test_failed_encode_leaves_ring_untouched() {
        let config = configuration();
        let session = SessionParameters {
            asdu_count: 3,
            ..Default::default()
        };
        let mut encoder = AsduEncoder::new(session.clone(), AngleFormat::Degrees).unwrap();
        let mut reference = AsduEncoder::new(session, AngleFormat::Degrees).unwrap();

        encoder.encode(&frame(0, &config), &config).unwrap();
        reference.encode(&frame(0, &config), &config).unwrap();

        // One ASDU fits, three copies overflow the 16-bit SvPdu length
        let phasors = (0..4000)
            .map(|index| (format!("V{}", index), PhasorUnits::voltage()))
            .collect();
        let oversized = ConfigurationFrame::new(
            1,
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            30,
            vec![ConfigurationCell::new(
                "Substation1",
                42,
                FLOAT_POLAR_FORMAT,
                phasors,
                Vec::new(),
                Vec::new(),
                NominalFrequency::Hz60,
            )],
        );
        let err = encoder
            .encode(&frame(9, &oversized), &oversized)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueTooLarge);
        assert_eq!(encoder.packet_number(), 1);

        let datagram = encoder.encode(&frame(1, &config), &config).unwrap();
        assert_eq!(datagram, reference.encode(&frame(1, &config), &config).unwrap());

        let options = ParseOptions {
            parse_redundant_asdus: true,
            ..Default::default()
        };
        let parsed = decode(&datagram, Some(&config), &options).unwrap();
        let history: Vec<u16> = parsed.redundant.iter().map(|f| f.sample_count).collect();
        assert_eq!(history, vec![0, 0]);
    }

    #[test]
    fn test_decode_with_configuration() {
        let config = configuration();
        let mut encoder =
            AsduEncoder::new(SessionParameters::default(), AngleFormat::Degrees).unwrap();
        let original = frame(7, &config);
        let datagram = encoder.encode(&original, &config).unwrap();

        let parsed = decode(&datagram, Some(&config), &ParseOptions::default()).unwrap();
        let decoded = parsed.frame;
        assert!(parsed.redundant.is_empty());
        assert!(parsed.derived_configuration.is_none());
        assert_eq!(decoded.msvid, "42_Substation1");
        assert_eq!(decoded.header.id_code, 42);
        assert_eq!(decoded.station_name, "Substation1");
        assert_eq!(decoded.configuration_revision, 1);
        assert_eq!(decoded.sample_synchronization, SAMPLE_SYNCHRONIZED);
        assert_eq!(decoded.cells.len(), 1);
        assert_eq!(decoded.cells[0].frequency, original.cells[0].frequency);

        let error = (decoded.header.timestamp - original.header.timestamp)
            .num_nanoseconds()
            .unwrap()
            .abs();
        assert!(error < 100, "Timestamp off by {} ns", error);

        match decoded.cells[0].phasors[0] {
            PhasorValue::FloatPolar(polar) => assert!((polar.angle - 0.5).abs() < 1e-5),
            other => panic!("Unexpected phasor kind {:?}", other),
        }
    }

    #[test]
    fn test_redundant_asdus_skipped_by_default() {
        let config = configuration();
        let mut encoder = AsduEncoder::new(
            SessionParameters {
                asdu_count: 2,
                ..Default::default()
            },
            AngleFormat::Degrees,
        )
        .unwrap();
        encoder.encode(&frame(1, &config), &config).unwrap();
        let datagram = encoder.encode(&frame(2, &config), &config).unwrap();

        let parsed = decode(&datagram, Some(&config), &ParseOptions::default()).unwrap();
        assert_eq!(parsed.frame.sample_count, 2);
        assert!(parsed.redundant.is_empty());
    }

    #[test]
    fn test_missing_configuration_fallbacks() {
        let config = configuration();
        let mut encoder =
            AsduEncoder::new(SessionParameters::default(), AngleFormat::Degrees).unwrap();
        let datagram = encoder.encode(&frame(1, &config), &config).unwrap();

        // No configuration and no fallback: samples skipped
        let parsed = decode(&datagram, None, &ParseOptions::default()).unwrap();
        assert!(parsed.frame.cells.is_empty());
        assert!(parsed.derived_configuration.is_none());
        assert_eq!(parsed.frame.sample_count, 1);

        // Guessing recovers the two phasor layout
        let options = ParseOptions {
            guess_configuration: true,
            ..Default::default()
        };
        let parsed = decode(&datagram, None, &options).unwrap();
        let guessed = parsed.derived_configuration.unwrap();
        assert_eq!(guessed.cells[0].phnmr, 2);
        assert_eq!(guessed.cells[0].idcode, 42);
        assert_eq!(parsed.frame.cells.len(), 1);
        assert_eq!(parsed.frame.cells[0].status, StatusFlags(0));
    }

    #[test]
    fn test_sample_size_mismatch() {
        let config = configuration();
        let mut encoder =
            AsduEncoder::new(SessionParameters::default(), AngleFormat::Degrees).unwrap();
        let datagram = encoder.encode(&frame(1, &config), &config).unwrap();

        let mut wider = config.clone();
        wider.cells[0].dgnmr = 1;
        wider.cells[0].digunit.push(0);

        let err = decode(&datagram, Some(&wider), &ParseOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SampleSizeMismatch);

        let lenient = ParseOptions {
            ignore_sample_size_validation_failures: true,
            ..Default::default()
        };
        let parsed = decode(&datagram, Some(&wider), &lenient).unwrap();
        assert!(!parsed.frame.sample_size_valid);
        assert!(parsed.frame.cells.is_empty());
    }

    #[test]
    fn test_signed_datagram_round_trip() {
        let config = configuration();
        let mut encoder = AsduEncoder::new(
            SessionParameters {
                signature_algorithm: SignatureAlgorithm::Aes128,
                asdu_count: 2,
                ..Default::default()
            },
            AngleFormat::Radians,
        )
        .unwrap();
        let datagram = encoder.encode(&frame(9, &config), &config).unwrap();

        let strict = ParseOptions {
            ignore_signature_validation_failures: false,
            phasor_angle_format: AngleFormat::Radians,
            ..Default::default()
        };
        let parsed = decode(&datagram, Some(&config), &strict).unwrap();
        assert_eq!(parsed.frame.sample_count, 9);
        assert!(parsed.frame.header.session.as_ref().unwrap().signature_valid);
    }

    #[test]
    fn test_optional_trailing_tags_are_skipped() {
        let config = configuration();
        let mut image = frame(4, &config).asdu_image(&config, AngleFormat::Degrees).unwrap();
        image.extend_from_slice(&[SampledValueTag::SMP_MOD.0, 0x02, 0x00, 0x01]);
        image.extend_from_slice(&[SampledValueTag::UTC_TIMESTAMP.0, 0x08]);
        image.extend_from_slice(&[0u8; 8]);
        let body_length = (image.len() - 4) as u16;
        write_fixed_tag_length(SampledValueTag::ASDU_SEQUENCE, body_length, &mut image, 0).unwrap();

        let mut datagram = SessionParameters::default().header_image(image.len()).unwrap();
        datagram.extend_from_slice(&image);

        let parsed = decode(&datagram, Some(&config), &ParseOptions::default()).unwrap();
        assert_eq!(parsed.frame.sample_count, 4);
    }

    #[test]
    fn test_cell_count_must_match_configuration() {
        let config = configuration();
        let mut data = frame(1, &config);
        data.cells.clear();
        assert!(matches!(
            data.asdu_image(&config, AngleFormat::Degrees),
            Err(ParseError::InvalidConfiguration { .. })
        ));
    }
}
