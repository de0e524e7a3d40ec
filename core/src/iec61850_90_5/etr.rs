//! # ETR Sidecar Configurations
//!
//! An ETR file describes the sample body of an MSVID as records of two lines:
//!
//! ```text
//! <anything>-<label>      e.g. PMU1MMXU1.MX.PhV.phsA.cVal.mag.f-VA Magnitude
//! <data type>             i2 or f4
//! ```
//!
//! The logical node path before the label decides the signal type. Signals must follow the
//! synchrophasor order: status, one or more magnitude/angle pairs, frequency, dF/dt,
//! optional analogs, optional digitals. A second status signal starts another device.

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};

use super::common::ParseError;
use super::config::{ConfigurationCell, ConfigurationFrame, FLOAT_POLAR_FORMAT};
use super::units::{NominalFrequency, PhasorUnits};

/// Subdirectory of the ETR directory searched after the directory itself.
pub const CONFIGURATION_CACHE: &str = "ConfigurationCache";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalType {
    Flag,
    VoltageMagnitude,
    VoltageAngle,
    CurrentMagnitude,
    CurrentAngle,
    Frequency,
    Dfdt,
    Analog,
    Digital,
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let code = match self {
            SignalType::Flag => "FLAG",
            SignalType::VoltageMagnitude => "VPHM",
            SignalType::VoltageAngle => "VPHA",
            SignalType::CurrentMagnitude => "IPHM",
            SignalType::CurrentAngle => "IPHA",
            SignalType::Frequency => "FREQ",
            SignalType::Dfdt => "DFDT",
            SignalType::Analog => "ALOG",
            SignalType::Digital => "DIGI",
        };
        write!(f, "{}", code)
    }
}

impl SignalType {
    fn expected_data_type(&self) -> &'static str {
        match self {
            SignalType::Flag | SignalType::Digital => "i2",
            _ => "f4",
        }
    }

    // Whether this signal may directly follow `last` within one device
    fn may_follow(&self, last: Option<SignalType>) -> bool {
        use SignalType::*;
        match self {
            Flag => last.is_none(),
            VoltageMagnitude | CurrentMagnitude => {
                matches!(last, Some(Flag | VoltageAngle | CurrentAngle))
            }
            VoltageAngle => last == Some(VoltageMagnitude),
            CurrentAngle => last == Some(CurrentMagnitude),
            Frequency => matches!(last, Some(VoltageAngle | CurrentAngle)),
            Dfdt => last == Some(Frequency),
            Analog => matches!(last, Some(Dfdt | Analog)),
            Digital => matches!(last, Some(Dfdt | Analog | Digital)),
        }
    }
}

/// One record of an ETR file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleDefinition {
    pub signal_type: SignalType,
    pub label: String,
}

fn unknown_signal(definition: &str, data_type: &str) -> ParseError {
    ParseError::InvalidFormat {
        message: format!(
            "Unable to determine ETR signal type for {} ({})",
            definition, data_type
        ),
    }
}

/// Classifies one record from its definition line and data type line.
pub fn classify_signal(definition: &str, data_type: &str) -> Result<SampleDefinition, ParseError> {
    let data_type = data_type.trim().to_lowercase();
    let label = match definition.find('-') {
        Some(dash) => definition[dash + 1..].trim().to_string(),
        None => definition.trim().to_string(),
    };

    let signal_type = if let Some(at) = definition.find(".ST.").filter(|&at| at > 0) {
        let detail = &definition[at + 4..];
        if detail.starts_with("Ind1") {
            SignalType::Flag
        } else if detail.starts_with("Ind2") {
            SignalType::Digital
        } else {
            return Err(unknown_signal(definition, &data_type));
        }
    } else if let Some(at) = definition.find(".MX.").filter(|&at| at > 0) {
        let detail = &definition[at + 4..];
        let phase = |magnitude, angle| {
            if detail.contains(".mag.") {
                Ok(magnitude)
            } else if detail.contains(".ang.") {
                Ok(angle)
            } else {
                Err(unknown_signal(definition, &data_type))
            }
        };

        // HzRte must be tested before Hz
        if detail.starts_with("HzRte") {
            SignalType::Dfdt
        } else if detail.starts_with("Hz") {
            SignalType::Frequency
        } else if detail.starts_with("PhV") || detail.starts_with("SeqV") {
            phase(SignalType::VoltageMagnitude, SignalType::VoltageAngle)?
        } else if detail.starts_with("SeqA") || detail.starts_with('A') {
            phase(SignalType::CurrentMagnitude, SignalType::CurrentAngle)?
        } else {
            return Err(unknown_signal(definition, &data_type));
        }
    } else {
        SignalType::Analog
    };

    if data_type != signal_type.expected_data_type() {
        return Err(ParseError::InvalidFormat {
            message: format!(
                "Invalid data type size {} specified for signal type {} parsed from {}",
                data_type, signal_type, definition
            ),
        });
    }

    Ok(SampleDefinition { signal_type, label })
}

#[derive(Default)]
struct DeviceBuilder {
    phasors: Vec<(String, PhasorUnits)>,
    analogs: Vec<String>,
    digitals: Vec<String>,
    magnitudes: usize,
    angles: usize,
    frequency_defined: bool,
}

impl DeviceBuilder {
    fn add(&mut self, definition: SampleDefinition) {
        match definition.signal_type {
            SignalType::VoltageMagnitude => {
                self.phasors.push((definition.label, PhasorUnits::voltage()));
                self.magnitudes += 1;
            }
            SignalType::CurrentMagnitude => {
                self.phasors.push((definition.label, PhasorUnits::current()));
                self.magnitudes += 1;
            }
            SignalType::VoltageAngle | SignalType::CurrentAngle => self.angles += 1,
            SignalType::Dfdt => self.frequency_defined = true,
            SignalType::Analog => self.analogs.push(definition.label),
            SignalType::Digital => self.digitals.push(definition.label),
            SignalType::Flag | SignalType::Frequency => {}
        }
    }

    fn finish(self, id_code: u16, station_name: &str) -> Result<ConfigurationCell, ParseError> {
        let invalid = |message: &str| ParseError::InvalidConfiguration {
            message: message.to_string(),
        };
        if self.phasors.is_empty() {
            return Err(invalid("No phasor magnitude/angle signal pairs were defined"));
        }
        if self.magnitudes != self.angles {
            return Err(invalid(
                "Phasor magnitude/angle signal pair mismatch, every magnitude needs exactly one angle",
            ));
        }
        if !self.frequency_defined {
            return Err(invalid("No frequency and dF/dt signal pair was defined"));
        }

        Ok(ConfigurationCell::new(
            station_name,
            id_code,
            FLOAT_POLAR_FORMAT,
            self.phasors,
            self.analogs,
            self.digitals,
            NominalFrequency::Hz60,
        ))
    }
}

/// Builds configuration cells from the text of an ETR file.
///
/// Cell `n` (zero based) gets ID code `id_code + n` and station name
/// `station_name` followed by `n + 1`.
pub fn parse_etr(
    text: &str,
    id_code: u16,
    station_name: &str,
) -> Result<Vec<ConfigurationCell>, ParseError> {
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());
    let mut cells = Vec::new();
    let mut device = DeviceBuilder::default();
    let mut last: Option<SignalType> = None;

    let finish_device = |device: DeviceBuilder, cells: &mut Vec<ConfigurationCell>| {
        let index = cells.len();
        let cell = device.finish(
            id_code.wrapping_add(index as u16),
            &format!("{}{}", station_name, index + 1),
        )?;
        cells.push(cell);
        Ok::<(), ParseError>(())
    };

    while let Some(definition) = lines.next() {
        let data_type = lines.next().ok_or_else(|| ParseError::InvalidFormat {
            message: format!("Signal \"{}\" has no data type line", definition.trim()),
        })?;
        let sample = classify_signal(definition, data_type)?;
        let signal_type = sample.signal_type;

        let starts_device = signal_type == SignalType::Flag && last.is_some();
        let in_order = if starts_device {
            matches!(
                last,
                Some(SignalType::Dfdt | SignalType::Analog | SignalType::Digital)
            )
        } else {
            signal_type.may_follow(last)
        };

        if !in_order {
            return Err(ParseError::InvalidSignalOrder {
                message: format!(
                    "{} cannot follow {}. Standard synchrophasor order is: status flags, one or more phasor magnitude/angle pairs, frequency, dF/dt, optional analogs, optional digitals",
                    signal_type,
                    last.map_or("start of file".to_string(), |t| t.to_string())
                ),
            });
        }

        if starts_device {
            finish_device(std::mem::take(&mut device), &mut cells)?;
        }

        device.add(sample);
        last = Some(signal_type);
    }

    if last.is_none() {
        return Err(ParseError::InvalidConfiguration {
            message: "No status flag signal was defined".to_string(),
        });
    }
    finish_device(device, &mut cells)?;

    Ok(cells)
}

/// Looks for `<msvid>.etr` in `directory`, then in its configuration cache subdirectory.
pub fn find_etr_file(directory: &Path, msvid: &str) -> Option<PathBuf> {
    if msvid.trim().is_empty() {
        return None;
    }
    let file_name = format!("{}.etr", msvid);
    [
        directory.join(&file_name),
        directory.join(CONFIGURATION_CACHE).join(&file_name),
    ]
    .into_iter()
    .find(|path| path.is_file())
}

/// Loads the ETR configuration for `msvid`, if a file exists.
///
/// Failures reading or parsing an existing file are wrapped with its path.
pub fn load_etr_configuration(
    directory: &Path,
    msvid: &str,
    id_code: u16,
    station_name: &str,
    frames_per_second: u16,
    timestamp: DateTime<Utc>,
) -> Result<Option<ConfigurationFrame>, ParseError> {
    let Some(path) = find_etr_file(directory, msvid) else {
        return Ok(None);
    };

    let wrap = |source: ParseError| ParseError::EtrFile {
        path: path.clone(),
        source: Box::new(source),
    };

    let text = std::fs::read_to_string(&path).map_err(|e| wrap(ParseError::Io(e)))?;
    let cells = parse_etr(&text, id_code, station_name).map_err(wrap)?;

    log::info!(
        "Loaded {} cell ETR configuration for \"{}\" from {}",
        cells.len(),
        msvid,
        path.display()
    );

    Ok(Some(ConfigurationFrame::new(
        1,
        timestamp,
        frames_per_second,
        cells,
    )))
}
