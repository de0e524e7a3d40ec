//! # Phasor and Data Cell Values
//!
//! The sample body of an ASDU is a sequence of data cells, one per configuration cell:
//!
//! `[STAT 2][phasors][FREQ][DFREQ][analogs][digital words 2 each]`
//!
//! Field widths come from the cell's format word. Phasor kinds are a closed set chosen by
//! [`PhasorType::from_format`].

use serde::{Deserialize, Serialize};
use std::fmt;

use super::common::{AngleFormat, ParseError, StatusFlags};
use super::config::ConfigurationCell;

// PHUNIT scale is in 10^-5 V or A per bit
const SCALE_DENOMINATOR_INVERSE: f32 = 0.00001;

// Integer polar angles are radians * 10^4
const INT_ANGLE_SCALE: f32 = 10_000.0;

fn scale_phasor_value(value: f32, factor: u32) -> f32 {
    value * SCALE_DENOMINATOR_INVERSE * factor as f32
}

fn calc_magnitude(real: f32, imag: f32) -> f32 {
    (real * real + imag * imag).sqrt()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhasorType {
    FloatPolar,
    FloatRect,
    IntRect,
    IntPolar,
}

impl PhasorType {
    /// Selects the phasor kind from bits 0 (polar) and 1 (float) of a format word.
    pub fn from_format(format: u16) -> Self {
        match (format & 0x0002 != 0, format & 0x0001 != 0) {
            (false, false) => PhasorType::IntRect,
            (false, true) => PhasorType::IntPolar,
            (true, false) => PhasorType::FloatRect,
            (true, true) => PhasorType::FloatPolar,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            PhasorType::FloatPolar | PhasorType::FloatRect => 8,
            PhasorType::IntPolar | PhasorType::IntRect => 4,
        }
    }
}

impl fmt::Display for PhasorType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PhasorType::FloatPolar => write!(f, "FloatPolar"),
            PhasorType::FloatRect => write!(f, "FloatRect"),
            PhasorType::IntRect => write!(f, "IntRect"),
            PhasorType::IntPolar => write!(f, "IntPolar"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PhasorValue {
    FloatPolar(PhasorFloatPolar),
    FloatRect(PhasorFloatRect),
    IntPolar(PhasorIntPolar),
    IntRect(PhasorIntRect),
}

impl PhasorValue {
    pub fn from_hex(bytes: &[u8], phasor_type: PhasorType) -> Result<Self, ParseError> {
        match phasor_type {
            PhasorType::FloatPolar => Ok(PhasorValue::FloatPolar(PhasorFloatPolar::from_hex(bytes)?)),
            PhasorType::FloatRect => Ok(PhasorValue::FloatRect(PhasorFloatRect::from_hex(bytes)?)),
            PhasorType::IntPolar => Ok(PhasorValue::IntPolar(PhasorIntPolar::from_hex(bytes)?)),
            PhasorType::IntRect => Ok(PhasorValue::IntRect(PhasorIntRect::from_hex(bytes)?)),
        }
    }

    pub fn to_hex(&self) -> Vec<u8> {
        match self {
            PhasorValue::FloatPolar(phasor) => phasor.to_hex().to_vec(),
            PhasorValue::FloatRect(phasor) => phasor.to_hex().to_vec(),
            PhasorValue::IntPolar(phasor) => phasor.to_hex().to_vec(),
            PhasorValue::IntRect(phasor) => phasor.to_hex().to_vec(),
        }
    }

    pub fn get_type(&self) -> PhasorType {
        match self {
            PhasorValue::FloatPolar(_) => PhasorType::FloatPolar,
            PhasorValue::FloatRect(_) => PhasorType::FloatRect,
            PhasorValue::IntRect(_) => PhasorType::IntRect,
            PhasorValue::IntPolar(_) => PhasorType::IntPolar,
        }
    }

    /// Magnitude and angle in radians. Integer kinds are scaled by the PHUNIT factor.
    pub fn to_float_polar(&self, scale_factor: u32) -> PhasorFloatPolar {
        match self {
            PhasorValue::FloatRect(phasor) => phasor.to_float_polar(),
            PhasorValue::FloatPolar(phasor) => *phasor,
            PhasorValue::IntRect(phasor) => phasor.to_float_polar(scale_factor),
            PhasorValue::IntPolar(phasor) => phasor.to_float_polar(scale_factor),
        }
    }

    pub fn to_float_rect(&self, scale_factor: u32) -> PhasorFloatRect {
        match self {
            PhasorValue::FloatRect(phasor) => *phasor,
            PhasorValue::FloatPolar(phasor) => phasor.to_float_rect(),
            PhasorValue::IntRect(phasor) => phasor.to_float_rect(scale_factor),
            PhasorValue::IntPolar(phasor) => phasor.to_float_polar(scale_factor).to_float_rect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhasorFloatPolar {
    pub magnitude: f32,
    pub angle: f32,
}

impl PhasorFloatPolar {
    pub fn from_hex(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < 8 {
            return Err(ParseError::short_buffer("Float polar phasor", 8, bytes.len()));
        }
        let magnitude = f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let angle = f32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Ok(PhasorFloatPolar { magnitude, angle })
    }

    pub fn to_hex(&self) -> [u8; 8] {
        let mut result = [0u8; 8];
        result[0..4].copy_from_slice(&self.magnitude.to_be_bytes());
        result[4..8].copy_from_slice(&self.angle.to_be_bytes());
        result
    }

    pub fn to_float_rect(&self) -> PhasorFloatRect {
        PhasorFloatRect {
            real: self.magnitude * self.angle.cos(),
            imag: self.magnitude * self.angle.sin(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhasorFloatRect {
    pub real: f32,
    pub imag: f32,
}

impl PhasorFloatRect {
    pub fn from_hex(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < 8 {
            return Err(ParseError::short_buffer("Float rectangular phasor", 8, bytes.len()));
        }
        let real = f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let imag = f32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Ok(PhasorFloatRect { real, imag })
    }

    pub fn to_hex(&self) -> [u8; 8] {
        let mut result = [0u8; 8];
        result[0..4].copy_from_slice(&self.real.to_be_bytes());
        result[4..8].copy_from_slice(&self.imag.to_be_bytes());
        result
    }

    pub fn to_float_polar(&self) -> PhasorFloatPolar {
        PhasorFloatPolar {
            magnitude: calc_magnitude(self.real, self.imag),
            angle: self.imag.atan2(self.real),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhasorIntPolar {
    pub magnitude: u16,
    // radians * 10^4
    pub angle: i16,
}

impl PhasorIntPolar {
    pub fn from_hex(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < 4 {
            return Err(ParseError::short_buffer("Integer polar phasor", 4, bytes.len()));
        }
        Ok(PhasorIntPolar {
            magnitude: u16::from_be_bytes([bytes[0], bytes[1]]),
            angle: i16::from_be_bytes([bytes[2], bytes[3]]),
        })
    }

    pub fn to_hex(&self) -> [u8; 4] {
        let mut result = [0u8; 4];
        result[0..2].copy_from_slice(&self.magnitude.to_be_bytes());
        result[2..4].copy_from_slice(&self.angle.to_be_bytes());
        result
    }

    pub fn to_float_polar(&self, scale_factor: u32) -> PhasorFloatPolar {
        PhasorFloatPolar {
            magnitude: scale_phasor_value(self.magnitude as f32, scale_factor),
            angle: self.angle as f32 / INT_ANGLE_SCALE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhasorIntRect {
    pub real: i16,
    pub imag: i16,
}

impl PhasorIntRect {
    pub fn from_hex(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < 4 {
            return Err(ParseError::short_buffer("Integer rectangular phasor", 4, bytes.len()));
        }
        Ok(PhasorIntRect {
            real: i16::from_be_bytes([bytes[0], bytes[1]]),
            imag: i16::from_be_bytes([bytes[2], bytes[3]]),
        })
    }

    pub fn to_hex(&self) -> [u8; 4] {
        let mut result = [0u8; 4];
        result[0..2].copy_from_slice(&self.real.to_be_bytes());
        result[2..4].copy_from_slice(&self.imag.to_be_bytes());
        result
    }

    pub fn to_float_polar(&self, scale_factor: u32) -> PhasorFloatPolar {
        PhasorFloatPolar {
            magnitude: scale_phasor_value(
                calc_magnitude(self.real as f32, self.imag as f32),
                scale_factor,
            ),
            angle: (self.imag as f32).atan2(self.real as f32),
        }
    }

    pub fn to_float_rect(&self, scale_factor: u32) -> PhasorFloatRect {
        PhasorFloatRect {
            real: scale_phasor_value(self.real as f32, scale_factor),
            imag: scale_phasor_value(self.imag as f32, scale_factor),
        }
    }
}

/// Measurements of one device for one sample.
///
/// Float polar angles are held in radians regardless of the wire angle format.
/// Frequency is absolute in Hz, dF/dt in Hz/s.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataCell {
    pub status: StatusFlags,
    pub phasors: Vec<PhasorValue>,
    pub frequency: f32,
    pub dfdt: f32,
    pub analogs: Vec<f32>,
    pub digitals: Vec<u16>,
}

impl DataCell {
    /// A zeroed cell shaped by `cell`.
    pub fn empty(cell: &ConfigurationCell) -> Self {
        let zero = match cell.phasor_type() {
            PhasorType::FloatPolar => PhasorValue::FloatPolar(PhasorFloatPolar {
                magnitude: 0.0,
                angle: 0.0,
            }),
            PhasorType::FloatRect => PhasorValue::FloatRect(PhasorFloatRect { real: 0.0, imag: 0.0 }),
            PhasorType::IntPolar => PhasorValue::IntPolar(PhasorIntPolar { magnitude: 0, angle: 0 }),
            PhasorType::IntRect => PhasorValue::IntRect(PhasorIntRect { real: 0, imag: 0 }),
        };
        DataCell {
            status: StatusFlags::default(),
            phasors: vec![zero; cell.phnmr as usize],
            frequency: cell.fnom.hertz(),
            dfdt: 0.0,
            analogs: vec![0.0; cell.annmr as usize],
            digitals: vec![0; cell.dgnmr as usize],
        }
    }

    /// Parses one cell from the front of `bytes`, returning it with the bytes consumed.
    pub fn from_hex(
        bytes: &[u8],
        cell: &ConfigurationCell,
        angle_format: AngleFormat,
    ) -> Result<(Self, usize), ParseError> {
        let length = cell.data_cell_length();
        if bytes.len() < length {
            return Err(ParseError::short_buffer(
                "Data cell",
                length,
                bytes.len(),
            ));
        }

        let mut offset = 0;
        let status = StatusFlags(u16::from_be_bytes([bytes[0], bytes[1]]));
        offset += 2;

        let phasor_type = cell.phasor_type();
        let phasor_size = phasor_type.size();
        let mut phasors = Vec::with_capacity(cell.phnmr as usize);
        for _ in 0..cell.phnmr {
            let mut phasor = PhasorValue::from_hex(&bytes[offset..offset + phasor_size], phasor_type)?;
            if let PhasorValue::FloatPolar(polar) = &mut phasor {
                polar.angle = angle_format.to_radians(polar.angle);
            }
            phasors.push(phasor);
            offset += phasor_size;
        }

        let freq_size = cell.freq_dfreq_size();
        let (frequency, dfdt) = if freq_size == 4 {
            (read_f32(bytes, offset), read_f32(bytes, offset + 4))
        } else {
            // Fixed point: deviation from nominal in mHz, ROCOF in hundredths of Hz/s
            let deviation = i16::from_be_bytes([bytes[offset], bytes[offset + 1]]);
            let rocof = i16::from_be_bytes([bytes[offset + 2], bytes[offset + 3]]);
            (
                cell.fnom.hertz() + deviation as f32 / 1000.0,
                rocof as f32 / 100.0,
            )
        };
        offset += 2 * freq_size;

        let analog_size = cell.analog_size();
        let mut analogs = Vec::with_capacity(cell.annmr as usize);
        for _ in 0..cell.annmr {
            analogs.push(if analog_size == 4 {
                read_f32(bytes, offset)
            } else {
                i16::from_be_bytes([bytes[offset], bytes[offset + 1]]) as f32
            });
            offset += analog_size;
        }

        let mut digitals = Vec::with_capacity(cell.dgnmr as usize);
        for _ in 0..cell.dgnmr {
            digitals.push(u16::from_be_bytes([bytes[offset], bytes[offset + 1]]));
            offset += 2;
        }

        Ok((
            DataCell {
                status,
                phasors,
                frequency,
                dfdt,
                analogs,
                digitals,
            },
            offset,
        ))
    }

    /// Encodes the cell in the layout `cell` describes.
    pub fn to_hex(
        &self,
        cell: &ConfigurationCell,
        angle_format: AngleFormat,
    ) -> Result<Vec<u8>, ParseError> {
        if self.phasors.len() != cell.phnmr as usize
            || self.analogs.len() != cell.annmr as usize
            || self.digitals.len() != cell.dgnmr as usize
        {
            return Err(ParseError::InvalidConfiguration {
                message: format!(
                    "Data cell has {}/{}/{} phasors/analogs/digitals, configuration cell {} expects {}/{}/{}",
                    self.phasors.len(),
                    self.analogs.len(),
                    self.digitals.len(),
                    cell.idcode,
                    cell.phnmr,
                    cell.annmr,
                    cell.dgnmr
                ),
            });
        }

        let phasor_type = cell.phasor_type();
        let mut result = Vec::with_capacity(cell.data_cell_length());
        result.extend_from_slice(&self.status.0.to_be_bytes());

        for (index, phasor) in self.phasors.iter().enumerate() {
            if phasor.get_type() != phasor_type {
                return Err(ParseError::InvalidConfiguration {
                    message: format!(
                        "Phasor {} is {}, configuration cell {} expects {}",
                        index,
                        phasor.get_type(),
                        cell.idcode,
                        phasor_type
                    ),
                });
            }
            match phasor {
                PhasorValue::FloatPolar(polar) => {
                    let wire = PhasorFloatPolar {
                        magnitude: polar.magnitude,
                        angle: angle_format.from_radians(polar.angle),
                    };
                    result.extend_from_slice(&wire.to_hex());
                }
                other => result.extend_from_slice(&other.to_hex()),
            }
        }

        if cell.freq_dfreq_size() == 4 {
            result.extend_from_slice(&self.frequency.to_be_bytes());
            result.extend_from_slice(&self.dfdt.to_be_bytes());
        } else {
            let deviation = ((self.frequency - cell.fnom.hertz()) * 1000.0).round() as i16;
            let rocof = (self.dfdt * 100.0).round() as i16;
            result.extend_from_slice(&deviation.to_be_bytes());
            result.extend_from_slice(&rocof.to_be_bytes());
        }

        for analog in &self.analogs {
            if cell.analog_size() == 4 {
                result.extend_from_slice(&analog.to_be_bytes());
            } else {
                result.extend_from_slice(&(analog.round() as i16).to_be_bytes());
            }
        }

        for digital in &self.digitals {
            result.extend_from_slice(&digital.to_be_bytes());
        }

        Ok(result)
    }
}

fn read_f32(bytes: &[u8], at: usize) -> f32 {
    f32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
