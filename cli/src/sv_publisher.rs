// Mock IEC 61850-90-5 publisher.
//
// Generates a random PMU system (one configuration frame) and streams sampled value
// session datagrams for it over UDP at a fixed rate. Every datagram carries the last
// `asdu_count` samples and is signed with the requested algorithm using the dummy key.
//
// When `send_configuration` is set the configuration frame is also sent once per second
// so a listener without an ETR file can decode the samples.

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use log::{error, info};
use rand::Rng;
use tokio::io;
use tokio::net::UdpSocket;
use tokio::time::{self, Duration, MissedTickBehavior};

use sv_pmu_core::iec61850_90_5::common::{AngleFormat, SignatureAlgorithm, StatusFlags};
use sv_pmu_core::iec61850_90_5::config::{
    ConfigurationCell, ConfigurationFrame, FLOAT_POLAR_FORMAT,
};
use sv_pmu_core::iec61850_90_5::data_frame::{parse_msvid, AsduEncoder, DataFrame};
use sv_pmu_core::iec61850_90_5::header::SessionParameters;
use sv_pmu_core::iec61850_90_5::phasors::{DataCell, PhasorFloatPolar, PhasorValue};
use sv_pmu_core::iec61850_90_5::units::{NominalFrequency, PhasorUnits};

const NOMINAL_VOLTAGE: f32 = 7_200.0;
const NOMINAL_CURRENT: f32 = 400.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SignatureArg {
    None,
    Sha80,
    Sha128,
    Sha256,
    Aes64,
    Aes128,
}

impl From<SignatureArg> for SignatureAlgorithm {
    fn from(arg: SignatureArg) -> Self {
        match arg {
            SignatureArg::None => SignatureAlgorithm::None,
            SignatureArg::Sha80 => SignatureAlgorithm::Sha80,
            SignatureArg::Sha128 => SignatureAlgorithm::Sha128,
            SignatureArg::Sha256 => SignatureAlgorithm::Sha256,
            SignatureArg::Aes64 => SignatureAlgorithm::Aes64,
            SignatureArg::Aes128 => SignatureAlgorithm::Aes128,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub address: String,
    pub data_rate: u16,
    pub num_pmus: usize,
    pub msvid: String,
    pub session: SessionParameters,
    pub send_configuration: bool,
    pub count: Option<u64>,
}

impl PublisherConfig {
    pub fn new(
        ip: String,
        port: u16,
        data_rate: u16,
        num_pmus: usize,
        msvid: String,
        asdu_count: u8,
        signature: SignatureAlgorithm,
    ) -> Result<Self, String> {
        if data_rate == 0 {
            return Err("Data rate must be at least 1 frame per second".to_string());
        }
        if num_pmus == 0 {
            return Err("At least one PMU is required".to_string());
        }
        if asdu_count == 0 {
            return Err("ASDU count must be at least 1".to_string());
        }

        let session = SessionParameters {
            signature_algorithm: signature,
            asdu_count,
            application_id: parse_msvid(&msvid).0,
            ..Default::default()
        };

        Ok(PublisherConfig {
            address: format!("{}:{}", ip, port),
            data_rate,
            num_pmus,
            msvid,
            session,
            send_configuration: false,
            count: None,
        })
    }
}

/// Random PMU system: every PMU has three voltages, three currents, one analog and one
/// digital word in floating point polar format.
pub fn random_configuration(msvid: &str, num_pmus: usize, data_rate: u16) -> ConfigurationFrame {
    let mut rng = rand::rng();
    let (id_code, station_name) = parse_msvid(msvid);

    let cells = (0..num_pmus)
        .map(|index| {
            let mut phasors = Vec::new();
            for phase in ["A", "B", "C"] {
                phasors.push((format!("V{}", phase), PhasorUnits::voltage()));
            }
            for phase in ["A", "B", "C"] {
                phasors.push((format!("I{}", phase), PhasorUnits::current()));
            }
            let fnom = if rng.random_bool(0.5) {
                NominalFrequency::Hz60
            } else {
                NominalFrequency::Hz50
            };
            ConfigurationCell::new(
                &format!("{}{}", station_name, index + 1),
                id_code.wrapping_add(index as u16),
                FLOAT_POLAR_FORMAT,
                phasors,
                vec!["MW".to_string()],
                vec!["BRK".to_string()],
                fnom,
            )
        })
        .collect();

    ConfigurationFrame::new(id_code, Utc::now(), data_rate, cells)
}

/// Balanced three phase measurements with a little noise on every value.
pub fn random_data_frame(
    configuration: &ConfigurationFrame,
    msvid: &str,
    sample_count: u16,
    timestamp: DateTime<Utc>,
) -> DataFrame {
    let mut rng = rand::rng();

    let cells = configuration
        .cells
        .iter()
        .map(|cell| {
            let nominal = cell.fnom.hertz();
            let phasors = cell
                .phunit
                .iter()
                .enumerate()
                .map(|(index, units)| {
                    let base = if units.is_current {
                        NOMINAL_CURRENT
                    } else {
                        NOMINAL_VOLTAGE
                    };
                    // A, B, C at 0, -120, 120 degrees
                    let angle = -((index % 3) as f32) * 2.0 * std::f32::consts::FRAC_PI_3;
                    PhasorValue::FloatPolar(PhasorFloatPolar {
                        magnitude: base * (1.0 + rng.random_range(-0.01..0.01)),
                        angle: angle + rng.random_range(-0.01..0.01),
                    })
                })
                .collect();

            DataCell {
                status: StatusFlags(0),
                phasors,
                frequency: nominal + rng.random_range(-0.05..0.05),
                dfdt: rng.random_range(-0.01..0.01),
                analogs: (0..cell.annmr).map(|_| rng.random_range(0.0..100.0)).collect(),
                digitals: (0..cell.dgnmr).map(|_| rng.random::<u16>()).collect(),
            }
        })
        .collect();

    let mut frame = DataFrame::new(msvid, timestamp, cells);
    frame.sample_count = sample_count;
    frame.sample_rate = Some(configuration.frames_per_second());
    frame
}

pub async fn run_mock_publisher(config: PublisherConfig) -> io::Result<()> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(&config.address).await?;
    info!(
        "Publishing \"{}\" to {} at {} frames per second",
        config.msvid, config.address, config.data_rate
    );
    info!(
        "{} PMUs, {} ASDUs per datagram, {} signature",
        config.num_pmus, config.session.asdu_count, config.session.signature_algorithm
    );

    let configuration = random_configuration(&config.msvid, config.num_pmus, config.data_rate);
    let configuration_bytes = configuration
        .to_hex()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    let mut encoder = AsduEncoder::new(config.session.clone(), AngleFormat::Degrees)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

    let mut interval = time::interval(Duration::from_secs_f64(1.0 / config.data_rate as f64));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut sample_count: u16 = 0;
    let mut sent: u64 = 0;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if config.send_configuration && sample_count == 0 {
                    if let Err(e) = socket.send(&configuration_bytes).await {
                        error!("Failed to send configuration frame: {}", e);
                    }
                }

                let frame = random_data_frame(&configuration, &config.msvid, sample_count, Utc::now());
                match encoder.encode(&frame, &configuration) {
                    Ok(datagram) => {
                        if let Err(e) = socket.send(&datagram).await {
                            error!("Failed to send data frame: {}", e);
                        }
                    }
                    Err(e) => {
                        error!("Failed to encode data frame: {}", e);
                        break;
                    }
                }

                // Sample counter restarts every second
                sample_count = (sample_count + 1) % config.data_rate;
                sent += 1;
                if config.count.is_some_and(|count| sent >= count) {
                    info!("Sent {} data frames, stopping", sent);
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping publisher after {} data frames", sent);
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sv_pmu_core::iec61850_90_5::common::ParseOptions;
    use sv_pmu_core::iec61850_90_5::parser::{Frame, FrameParser};

    #[test]
    fn test_publisher_config_validation() {
        let config = PublisherConfig::new(
            "127.0.0.1".to_string(),
            8123,
            30,
            2,
            "12_Mock".to_string(),
            3,
            SignatureAlgorithm::Sha256,
        )
        .unwrap();
        assert_eq!(config.address, "127.0.0.1:8123");
        assert_eq!(config.session.asdu_count, 3);
        assert_eq!(config.session.application_id, 12);

        let invalid = |rate, pmus, asdus| {
            PublisherConfig::new(
                "127.0.0.1".to_string(),
                8123,
                rate,
                pmus,
                "Mock".to_string(),
                asdus,
                SignatureAlgorithm::None,
            )
            .is_err()
        };
        assert!(invalid(0, 1, 1));
        assert!(invalid(30, 0, 1));
        assert!(invalid(30, 1, 0));
    }

    #[test]
    fn test_random_frames_decode() {
        let configuration = random_configuration("5_Mock", 3, 60);
        assert_eq!(configuration.cells.len(), 3);
        assert_eq!(configuration.cells[2].idcode, 7);

        let session = SessionParameters {
            signature_algorithm: SignatureAlgorithm::Aes128,
            asdu_count: 2,
            ..Default::default()
        };
        let mut encoder = AsduEncoder::new(session, AngleFormat::Degrees).unwrap();

        let mut parser = FrameParser::new(ParseOptions {
            ignore_signature_validation_failures: false,
            ..Default::default()
        });
        let results = parser.push(&configuration.to_hex().unwrap());
        assert!(results.iter().all(|result| result.is_ok()));

        for sample in 0..3 {
            let frame = random_data_frame(&configuration, "5_Mock", sample, Utc::now());
            let datagram = encoder.encode(&frame, &configuration).unwrap();
            let parsed = parser.parse(&datagram).unwrap().complete().unwrap();
            match parsed.frame {
                Frame::Data(decoded) => {
                    assert_eq!(decoded.sample_count, sample);
                    assert_eq!(decoded.cells.len(), 3);
                    assert_eq!(decoded.cells[0].phasors.len(), 6);
                }
                _ => panic!("Expected a data frame"),
            }
        }
        assert_eq!(parser.statistics().errors, 0);
    }
}
