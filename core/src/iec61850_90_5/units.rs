// Channel unit words carried by configuration cells.
use super::common::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhasorUnits {
    // Most significant byte: 0 => voltage, 1 => current
    pub is_current: bool,

    // Unsigned 24-bit scale in 10^-5 V or A per bit, ignored for floating point data.
    pub scale_factor: u32,
}

impl PhasorUnits {
    pub fn voltage() -> Self {
        PhasorUnits {
            is_current: false,
            scale_factor: 0,
        }
    }

    pub fn current() -> Self {
        PhasorUnits {
            is_current: true,
            scale_factor: 0,
        }
    }

    pub fn from_hex(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() != 4 {
            return Err(ParseError::short_buffer("Phasor unit", 4, bytes.len()));
        }
        Ok(PhasorUnits {
            is_current: bytes[0] == 1,
            scale_factor: u32::from_be_bytes([0, bytes[1], bytes[2], bytes[3]]),
        })
    }

    pub fn to_hex(&self) -> [u8; 4] {
        let mut bytes = self.scale_factor.to_be_bytes();
        bytes[0] = self.is_current as u8;
        bytes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeasurementType {
    SinglePointOnWave,
    RmsOfAnalogInput,
    PeakOfAnalogInput,
}

impl fmt::Display for MeasurementType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MeasurementType::SinglePointOnWave => write!(f, "Single Point-On-Wave"),
            MeasurementType::RmsOfAnalogInput => write!(f, "RMS"),
            MeasurementType::PeakOfAnalogInput => write!(f, "Peak"),
        }
    }
}

impl MeasurementType {
    fn from_hex(byte: u8) -> Result<Self, ParseError> {
        match byte {
            0 => Ok(MeasurementType::SinglePointOnWave),
            1 => Ok(MeasurementType::RmsOfAnalogInput),
            2 => Ok(MeasurementType::PeakOfAnalogInput),
            other => Err(ParseError::InvalidFormat {
                message: format!("Unknown analog measurement type {}", other),
            }),
        }
    }

    fn to_hex(self) -> u8 {
        match self {
            MeasurementType::SinglePointOnWave => 0,
            MeasurementType::RmsOfAnalogInput => 1,
            MeasurementType::PeakOfAnalogInput => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalogUnits {
    pub measurement_type: MeasurementType,
    // Signed 24-bit user defined scaling, sign extended
    pub scale_factor: i32,
}

impl Default for AnalogUnits {
    fn default() -> Self {
        AnalogUnits {
            measurement_type: MeasurementType::SinglePointOnWave,
            scale_factor: 0,
        }
    }
}

impl AnalogUnits {
    pub fn from_hex(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() != 4 {
            return Err(ParseError::short_buffer("Analog unit", 4, bytes.len()));
        }
        let measurement_type = MeasurementType::from_hex(bytes[0])?;
        let sign = if bytes[1] & 0x80 != 0 { 0xFF } else { 0x00 };
        let scale_factor = i32::from_be_bytes([sign, bytes[1], bytes[2], bytes[3]]);
        Ok(AnalogUnits {
            measurement_type,
            scale_factor,
        })
    }

    pub fn to_hex(&self) -> [u8; 4] {
        let mut bytes = [0u8; 4];
        bytes[0] = self.measurement_type.to_hex();
        bytes[1..].copy_from_slice(&self.scale_factor.to_be_bytes()[1..]);
        bytes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NominalFrequency {
    Hz50,
    Hz60,
}

impl NominalFrequency {
    pub fn from_hex(bytes: &[u8]) -> Result<Self, ParseError> {
        // Bit 0 of the 16-bit word, 1 => 50 Hz
        match bytes {
            [_, low] if low & 0x01 != 0 => Ok(NominalFrequency::Hz50),
            [_, _] => Ok(NominalFrequency::Hz60),
            _ => Err(ParseError::short_buffer("Nominal frequency", 2, bytes.len())),
        }
    }

    pub fn to_hex(&self) -> [u8; 2] {
        match self {
            NominalFrequency::Hz50 => [0, 1],
            NominalFrequency::Hz60 => [0, 0],
        }
    }

    pub fn hertz(&self) -> f32 {
        match self {
            NominalFrequency::Hz50 => 50.0,
            NominalFrequency::Hz60 => 60.0,
        }
    }
}

impl fmt::Display for NominalFrequency {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NominalFrequency::Hz50 => write!(f, "50 Hz"),
            NominalFrequency::Hz60 => write!(f, "60 Hz"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRate {
    // > 0: frames per second, < 0: seconds per frame
    pub value: i16,
}

impl DataRate {
    pub fn from_hex(bytes: &[u8; 2]) -> Self {
        DataRate {
            value: i16::from_be_bytes(*bytes),
        }
    }

    pub fn to_hex(&self) -> [u8; 2] {
        self.value.to_be_bytes()
    }

    pub fn frequency(&self) -> f32 {
        match self.value {
            0 => 0.0,
            v if v > 0 => v as f32,
            v => 1.0 / (-(v as f32)),
        }
    }

    /// Whole frames per second, 0 for sub-hertz rates.
    pub fn frames_per_second(&self) -> u16 {
        self.value.max(0) as u16
    }
}
