//! # Configuration Frame
//!
//! Plain-header configuration frame describing the layout of the sample body carried by
//! data frames. The body uses the C37.118 CFG-2 layout:
//!
//! `[TIME_BASE 4][NUM_CELLS 2]{cell}*[DATA_RATE 2][CHK 2]`
//!
//! where each cell is
//!
//! `[STN 16][IDCODE 2][FORMAT 2][PHNMR 2][ANNMR 2][DGNMR 2][CHNAM 16*n][PHUNIT][ANUNIT][DIGUNIT][FNOM 2][CFGCNT 2]`
//!
//! Configurations derived from ETR files or guessed from sample sizes use the same types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::{
    Decoded, FrameType, ParseError, ParseOptions, FIXED_HEADER_LENGTH, TIMEBASE,
};
use super::header::{ChannelFrame, CommonFrameHeader};
use super::phasors::PhasorType;
use super::units::{AnalogUnits, DataRate, NominalFrequency, PhasorUnits};
use super::utils::{calculate_crc, validate_checksum};

const NAME_LENGTH: usize = 16;

/// Format word used by derived configurations: float frequency, analogs and polar phasors.
pub const FLOAT_POLAR_FORMAT: u16 = 0x000F;

fn fixed_name(name: &str) -> [u8; NAME_LENGTH] {
    let mut bytes = [b' '; NAME_LENGTH];
    for (slot, byte) in bytes.iter_mut().zip(name.bytes()) {
        *slot = byte;
    }
    bytes
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

/// Layout of one device's data cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationCell {
    pub stn: [u8; 16],
    pub idcode: u16,
    pub format: u16,
    pub phnmr: u16,
    pub annmr: u16,
    pub dgnmr: u16,
    // 16 bytes per phasor and analog, 16 * 16 per digital word
    pub chnam: Vec<u8>,
    pub phunit: Vec<PhasorUnits>,
    pub anunit: Vec<AnalogUnits>,
    pub digunit: Vec<u32>,
    pub fnom: NominalFrequency,
    pub cfgcnt: u16,
}

impl ConfigurationCell {
    /// Builds a cell from labels. Each digital label names one 16-bit word, its bits are
    /// labelled `<label> <bit>`.
    pub fn new(
        station_name: &str,
        idcode: u16,
        format: u16,
        phasors: Vec<(String, PhasorUnits)>,
        analogs: Vec<String>,
        digitals: Vec<String>,
        fnom: NominalFrequency,
    ) -> Self {
        let mut chnam = Vec::new();
        let mut phunit = Vec::with_capacity(phasors.len());
        for (label, units) in &phasors {
            chnam.extend_from_slice(&fixed_name(label));
            phunit.push(units.clone());
        }
        for label in &analogs {
            chnam.extend_from_slice(&fixed_name(label));
        }
        for label in &digitals {
            for bit in 0..16 {
                chnam.extend_from_slice(&fixed_name(&format!("{} {}", label, bit)));
            }
        }

        ConfigurationCell {
            stn: fixed_name(station_name),
            idcode,
            format,
            phnmr: phasors.len() as u16,
            annmr: analogs.len() as u16,
            dgnmr: digitals.len() as u16,
            chnam,
            phunit,
            anunit: vec![AnalogUnits::default(); analogs.len()],
            digunit: vec![0; digitals.len()],
            fnom,
            cfgcnt: 0,
        }
    }

    /// Parses one cell from the front of `bytes`, returning it with the bytes consumed.
    pub fn from_hex(bytes: &[u8]) -> Result<(Self, usize), ParseError> {
        if bytes.len() < 26 {
            return Err(ParseError::short_buffer("Configuration cell", 26, bytes.len()));
        }

        let phnmr = read_u16(bytes, 20);
        let annmr = read_u16(bytes, 22);
        let dgnmr = read_u16(bytes, 24);
        let length = Self::encoded_length(phnmr, annmr, dgnmr);
        if bytes.len() < length {
            return Err(ParseError::short_buffer("Configuration cell", length, bytes.len()));
        }

        let mut stn = [0u8; 16];
        stn.copy_from_slice(&bytes[0..16]);
        let idcode = read_u16(bytes, 16);
        let format = read_u16(bytes, 18);
        let mut offset = 26;

        let chnam_len = NAME_LENGTH * (phnmr as usize + annmr as usize + 16 * dgnmr as usize);
        let chnam = bytes[offset..offset + chnam_len].to_vec();
        offset += chnam_len;

        let mut phunit = Vec::with_capacity(phnmr as usize);
        for _ in 0..phnmr {
            phunit.push(PhasorUnits::from_hex(&bytes[offset..offset + 4])?);
            offset += 4;
        }

        let mut anunit = Vec::with_capacity(annmr as usize);
        for _ in 0..annmr {
            anunit.push(AnalogUnits::from_hex(&bytes[offset..offset + 4])?);
            offset += 4;
        }

        let mut digunit = Vec::with_capacity(dgnmr as usize);
        for _ in 0..dgnmr {
            digunit.push(u32::from_be_bytes([
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ]));
            offset += 4;
        }

        let fnom = NominalFrequency::from_hex(&bytes[offset..offset + 2])?;
        offset += 2;
        let cfgcnt = read_u16(bytes, offset);
        offset += 2;

        Ok((
            ConfigurationCell {
                stn,
                idcode,
                format,
                phnmr,
                annmr,
                dgnmr,
                chnam,
                phunit,
                anunit,
                digunit,
                fnom,
                cfgcnt,
            },
            offset,
        ))
    }

    pub fn to_hex(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(self.length());
        result.extend_from_slice(&self.stn);
        result.extend_from_slice(&self.idcode.to_be_bytes());
        result.extend_from_slice(&self.format.to_be_bytes());
        result.extend_from_slice(&self.phnmr.to_be_bytes());
        result.extend_from_slice(&self.annmr.to_be_bytes());
        result.extend_from_slice(&self.dgnmr.to_be_bytes());
        result.extend_from_slice(&self.chnam);
        for ph in &self.phunit {
            result.extend_from_slice(&ph.to_hex());
        }
        for an in &self.anunit {
            result.extend_from_slice(&an.to_hex());
        }
        for dg in &self.digunit {
            result.extend_from_slice(&dg.to_be_bytes());
        }
        result.extend_from_slice(&self.fnom.to_hex());
        result.extend_from_slice(&self.cfgcnt.to_be_bytes());
        result
    }

    fn encoded_length(phnmr: u16, annmr: u16, dgnmr: u16) -> usize {
        let (phnmr, annmr, dgnmr) = (phnmr as usize, annmr as usize, dgnmr as usize);
        26 + NAME_LENGTH * (phnmr + annmr + 16 * dgnmr) + 4 * (phnmr + annmr + dgnmr) + 4
    }

    pub fn length(&self) -> usize {
        Self::encoded_length(self.phnmr, self.annmr, self.dgnmr)
    }

    pub fn station_name(&self) -> String {
        String::from_utf8_lossy(&self.stn).trim().to_string()
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.chnam
            .chunks(NAME_LENGTH)
            .map(|chunk| String::from_utf8_lossy(chunk).trim().to_string())
            .collect()
    }

    pub fn freq_dfreq_size(&self) -> usize {
        if self.format & 0x0008 != 0 {
            4
        } else {
            2
        }
    }

    pub fn analog_size(&self) -> usize {
        if self.format & 0x0004 != 0 {
            4
        } else {
            2
        }
    }

    pub fn phasor_type(&self) -> PhasorType {
        PhasorType::from_format(self.format)
    }

    /// Bytes of one data cell: status, phasors, frequency, dF/dt, analogs, digitals.
    pub fn data_cell_length(&self) -> usize {
        2 + self.phasor_type().size() * self.phnmr as usize
            + 2 * self.freq_dfreq_size()
            + self.analog_size() * self.annmr as usize
            + 2 * self.dgnmr as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationFrame {
    pub header: CommonFrameHeader,
    pub time_base: u32,
    pub cells: Vec<ConfigurationCell>,
    pub data_rate: DataRate,
    pub chk: u16,
}

impl ConfigurationFrame {
    pub fn new(
        id_code: u16,
        timestamp: DateTime<Utc>,
        frames_per_second: u16,
        cells: Vec<ConfigurationCell>,
    ) -> Self {
        let mut header = CommonFrameHeader::new(FrameType::ConfigurationFrame, id_code, timestamp);
        header.frames_per_second = Some(frames_per_second);
        ConfigurationFrame {
            header,
            time_base: TIMEBASE,
            cells,
            data_rate: DataRate {
                value: frames_per_second.min(i16::MAX as u16) as i16,
            },
            chk: 0,
        }
    }

    /// Parses a complete configuration frame from the front of `bytes`.
    ///
    /// Returns `Decoded::Incomplete` while the declared frame length is not yet available.
    pub fn from_hex(bytes: &[u8]) -> Result<Decoded<Self>, ParseError> {
        let header = match CommonFrameHeader::parse(bytes, None, &ParseOptions::default())? {
            Decoded::Complete(header) => header,
            Decoded::Incomplete { required } => return Ok(Decoded::Incomplete { required }),
        };
        Self::from_header(header, bytes).map(Decoded::Complete)
    }

    /// Parses the body of a frame whose header has already been classified.
    pub fn from_header(header: CommonFrameHeader, bytes: &[u8]) -> Result<Self, ParseError> {
        if header.session.is_some() || header.frame_type != FrameType::ConfigurationFrame {
            return Err(ParseError::InvalidFrameType {
                message: format!("Expected a configuration frame, got {}", header.frame_type),
            });
        }

        let frame_length = header.frame_length;
        let minimum = FIXED_HEADER_LENGTH + 10;
        if frame_length < minimum {
            return Err(ParseError::short_buffer("Configuration frame", minimum, frame_length));
        }
        if bytes.len() < frame_length {
            return Err(ParseError::short_buffer("Configuration frame", frame_length, bytes.len()));
        }
        let frame = &bytes[..frame_length];
        validate_checksum(frame)?;

        let mut offset = FIXED_HEADER_LENGTH;
        let time_base = u32::from_be_bytes([
            frame[offset],
            frame[offset + 1],
            frame[offset + 2],
            frame[offset + 3],
        ]);
        offset += 4;
        let num_cells = read_u16(frame, offset);
        offset += 2;

        // Cells may not run into the trailing data rate and checksum
        let cells_end = frame_length - 4;
        let mut cells = Vec::with_capacity(num_cells as usize);
        for index in 0..num_cells {
            let (cell, consumed) = ConfigurationCell::from_hex(&frame[offset..cells_end])
                .map_err(|e| ParseError::InvalidConfiguration {
                    message: format!("Configuration cell {}: {}", index, e),
                })?;
            log::debug!(
                "Configuration cell {} ({}): {} phasors, {} analogs, {} digitals",
                cell.idcode,
                cell.station_name(),
                cell.phnmr,
                cell.annmr,
                cell.dgnmr
            );
            cells.push(cell);
            offset += consumed;
        }

        if offset != cells_end {
            return Err(ParseError::InvalidLength {
                message: format!(
                    "Configuration frame declares {} bytes but cells end at {}",
                    frame_length,
                    offset + 4
                ),
            });
        }

        let data_rate = DataRate::from_hex(&[frame[offset], frame[offset + 1]]);
        let chk = read_u16(frame, offset + 2);

        let mut header = header;
        header.frames_per_second = Some(data_rate.frames_per_second());

        Ok(ConfigurationFrame {
            header,
            time_base,
            cells,
            data_rate,
            chk,
        })
    }

    pub fn to_hex(&self) -> Result<Vec<u8>, ParseError> {
        let frame_size = FIXED_HEADER_LENGTH
            + 6
            + self.cells.iter().map(ConfigurationCell::length).sum::<usize>()
            + 4;

        let mut header = self.header.clone();
        header.frame_type = FrameType::ConfigurationFrame;
        header.frame_length = frame_size;

        let mut result = Vec::with_capacity(frame_size);
        result.extend_from_slice(&header.to_hex()?);
        result.extend_from_slice(&self.time_base.to_be_bytes());
        result.extend_from_slice(&(self.cells.len() as u16).to_be_bytes());
        for cell in &self.cells {
            result.extend_from_slice(&cell.to_hex());
        }
        result.extend_from_slice(&self.data_rate.to_hex());

        let chk = calculate_crc(&result);
        result.extend_from_slice(&chk.to_be_bytes());
        Ok(result)
    }

    /// Expected sample body length for a data frame described by this configuration.
    pub fn calculated_sample_length(&self) -> usize {
        self.cells.iter().map(ConfigurationCell::data_cell_length).sum()
    }

    pub fn frames_per_second(&self) -> u16 {
        self.data_rate.frames_per_second()
    }
}

impl ChannelFrame for ConfigurationFrame {
    fn header(&self) -> &CommonFrameHeader {
        &self.header
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iec61850_90_5::common::ErrorKind;

    fn sample_frame() -> ConfigurationFrame {
        let cell = ConfigurationCell::new(
            "SUBSTATION1",
            42,
            FLOAT_POLAR_FORMAT,
            vec![
                ("VA".to_string(), PhasorUnits::voltage()),
                ("VB".to_string(), PhasorUnits::voltage()),
                ("IA".to_string(), PhasorUnits::current()),
            ],
            vec!["MW".to_string()],
            vec!["BRK".to_string()],
            NominalFrequency::Hz60,
        );
        let timestamp = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        ConfigurationFrame::new(1, timestamp, 30, vec![cell])
    }

    #[test]
    fn test_configuration_round_trip() {
        let frame = sample_frame();
        let bytes = frame.to_hex().unwrap();
        assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]) as usize, bytes.len());

        let parsed = ConfigurationFrame::from_hex(&bytes).unwrap().complete().unwrap();
        assert_eq!(parsed.cells.len(), 1);
        assert_eq!(parsed.time_base, TIMEBASE);
        assert_eq!(parsed.frames_per_second(), 30);
        assert_eq!(parsed.cells[0], frame.cells[0]);
        assert_eq!(parsed.cells[0].station_name(), "SUBSTATION1");
        assert_eq!(parsed.cells[0].channel_names()[2], "IA");
        assert_eq!(parsed.cells[0].channel_names()[4], "BRK 0");
        assert_eq!(parsed.header.timestamp, frame.header.timestamp);
    }

    #[test]
    fn test_calculated_sample_length() {
        let frame = sample_frame();
        // 2 status + 3 * 8 phasors + 4 + 4 freq/dfdt + 4 analog + 2 digital
        assert_eq!(frame.calculated_sample_length(), 40);

        let mut integer = frame.cells[0].clone();
        integer.format = 0x0000;
        // 2 + 3 * 4 + 2 + 2 + 2 + 2
        assert_eq!(integer.data_cell_length(), 22);
    }

    #[test]
    fn test_configuration_checksum_failure() {
        let mut bytes = sample_frame().to_hex().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let err = ConfigurationFrame::from_hex(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChecksumMismatch);
    }

    #[test]
    fn test_configuration_partial_buffer() {
        let bytes = sample_frame().to_hex().unwrap();
        let result = ConfigurationFrame::from_hex(&bytes[..bytes.len() - 3]).unwrap();
        assert_eq!(
            result,
            Decoded::Incomplete {
                required: bytes.len()
            }
        );
    }

    #[test]
    fn test_wrong_frame_type() {
        let mut bytes = sample_frame().to_hex().unwrap();
        bytes[1] = 0x41;
        let crc = calculate_crc(&bytes[..bytes.len() - 2]);
        let at = bytes.len() - 2;
        bytes[at..].copy_from_slice(&crc.to_be_bytes());
        assert!(matches!(
            ConfigurationFrame::from_hex(&bytes),
            Err(ParseError::InvalidFrameType { .. })
        ));
    }
}
