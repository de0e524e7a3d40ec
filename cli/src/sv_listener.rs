// Command line debugging tool for IEC 61850-90-5 sampled value streams.
//
// Binds a UDP socket (optionally joining a multicast group) and decodes every datagram
// with a frame parser. It reports:
// - Data and configuration frame rates every N seconds.
// - Signature and sample size failures tolerated by the parse options.
// - Configuration change notifications raised by the publisher.
// - Frames that fail to decode, with their error kind.
//
// Parse options come from an optional JSON file, individual flags override it.
// The listener stops after a timeout without data or on ctrl-c.

use clap::{Args, ValueEnum};
use log::{error, info, warn};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::io;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use sv_pmu_core::iec61850_90_5::common::{AngleFormat, ParseError, ParseOptions};
use sv_pmu_core::iec61850_90_5::header::ChannelFrame;
use sv_pmu_core::iec61850_90_5::parser::{Frame, FrameParser};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AngleFormatArg {
    Degrees,
    Radians,
}

impl From<AngleFormatArg> for AngleFormat {
    fn from(arg: AngleFormatArg) -> Self {
        match arg {
            AngleFormatArg::Degrees => AngleFormat::Degrees,
            AngleFormatArg::Radians => AngleFormat::Radians,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct ListenerArgs {
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, default_value_t = 8123)]
    pub port: u16,

    /// Treat `host` as a multicast group to join.
    #[arg(long, default_value_t = false)]
    pub multicast: bool,

    #[arg(long, default_value_t = 10.0)]
    pub timeout: f64,

    #[arg(long, default_value_t = 5.0)]
    pub stats_interval: f64,

    /// JSON file with parse options, overridden by the flags below.
    #[arg(long)]
    pub options: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub use_etr: bool,

    #[arg(long)]
    pub etr_directory: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub guess_configuration: bool,

    #[arg(long, default_value_t = false)]
    pub parse_redundant: bool,

    /// Reject frames with a signature mismatch instead of flagging them.
    #[arg(long, default_value_t = false)]
    pub strict_signatures: bool,

    #[arg(long, default_value_t = false)]
    pub ignore_sample_size: bool,

    #[arg(long)]
    pub angle_format: Option<AngleFormatArg>,
}

/// Parse options from the optional file with the command line flags layered on top.
pub fn build_options(args: &ListenerArgs) -> Result<ParseOptions, ParseError> {
    let mut options = match &args.options {
        Some(path) => ParseOptions::from_json_file(path)?,
        None => ParseOptions::default(),
    };

    options.use_etr_configuration |= args.use_etr;
    options.guess_configuration |= args.guess_configuration;
    options.parse_redundant_asdus |= args.parse_redundant;
    options.ignore_sample_size_validation_failures |= args.ignore_sample_size;
    if args.strict_signatures {
        options.ignore_signature_validation_failures = false;
    }
    if let Some(angle_format) = args.angle_format {
        options.phasor_angle_format = angle_format.into();
    }
    if let Some(directory) = &args.etr_directory {
        options.etr_directory = directory.clone();
    }

    Ok(options)
}

#[derive(Debug, Default)]
struct Counters {
    data_frames: AtomicUsize,
    config_frames: AtomicUsize,
    errors: AtomicUsize,
    tolerated: AtomicUsize,
}

pub async fn run_sv_listener(args: ListenerArgs) -> io::Result<()> {
    info!("Starting sampled value listener with args: {:?}", args);

    let options = build_options(&args)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
    info!("Parse options: {:?}", options);

    let counters = Arc::new(Counters::default());
    let should_stop = Arc::new(AtomicBool::new(false));

    // Spawn statistics reporting thread
    let stats_counters = Arc::clone(&counters);
    let stats_should_stop = Arc::clone(&should_stop);
    let stats_interval = args.stats_interval;
    thread::spawn(move || {
        while !stats_should_stop.load(Ordering::Relaxed) {
            thread::sleep(Duration::from_secs_f64(stats_interval));
            let data_count = stats_counters.data_frames.swap(0, Ordering::Relaxed);
            info!(
                "Stats ~ Data Frames: {}/s, Config Frames: {}, Tolerated Failures: {}, Errors: {}",
                data_count as f64 / stats_interval,
                stats_counters.config_frames.load(Ordering::Relaxed),
                stats_counters.tolerated.load(Ordering::Relaxed),
                stats_counters.errors.load(Ordering::Relaxed)
            );
        }
    });

    let socket = if args.multicast {
        let group: Ipv4Addr = args.host.parse().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Invalid multicast group {}: {}", args.host, e),
            )
        })?;
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, args.port)).await?;
        socket.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)?;
        info!("Joined multicast group {} on port {}", group, args.port);
        socket
    } else {
        let socket = UdpSocket::bind(format!("{}:{}", args.host, args.port)).await?;
        info!("Listening on {}:{}", args.host, args.port);
        socket
    };

    let mut parser = FrameParser::new(options);
    let mut buffer = vec![0; 65535];
    let timeout_duration = Duration::from_secs_f64(args.timeout);
    let mut last_data_time = Instant::now();

    loop {
        tokio::select! {
            received = timeout(timeout_duration, socket.recv_from(&mut buffer)) => {
                match received {
                    Ok(Ok((bytes_read, _addr))) if bytes_read > 0 => {
                        last_data_time = Instant::now();
                        process_datagram(&mut parser, &buffer[..bytes_read], &counters);
                    }
                    Ok(Ok(_)) => warn!("Received empty datagram"),
                    Ok(Err(e)) => {
                        error!("UDP receive error: {}", e);
                        break;
                    }
                    Err(_) => {
                        if last_data_time.elapsed() > timeout_duration {
                            error!("Timeout: No data received for {} seconds", args.timeout);
                            break;
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down listener");
                break;
            }
        }
    }

    should_stop.store(true, Ordering::Relaxed);
    match serde_json::to_string(&parser.statistics()) {
        Ok(json) => info!("Final statistics: {}", json),
        Err(e) => warn!("Failed to serialize statistics: {}", e),
    }
    Ok(())
}

fn process_datagram(parser: &mut FrameParser, datagram: &[u8], counters: &Counters) {
    for result in parser.push(datagram) {
        match result {
            Ok(parsed) => {
                if parsed.configuration_changed {
                    warn!(
                        "Configuration change reported by ID code {}",
                        parsed.frame.id_code()
                    );
                }
                match &parsed.frame {
                    Frame::Data(frame) => {
                        let count = counters.data_frames.fetch_add(1, Ordering::Relaxed);
                        if count == 0 {
                            info!(
                                "Received Data Frame \"{}\" (ID: {}, {} cells)",
                                frame.msvid,
                                frame.id_code(),
                                frame.cells.len()
                            );
                        }
                        let signature_valid = frame
                            .header
                            .session
                            .as_ref()
                            .map_or(true, |session| session.signature_valid);
                        if !signature_valid || !frame.sample_size_valid {
                            counters.tolerated.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Frame::Configuration(frame) => {
                        counters.config_frames.fetch_add(1, Ordering::Relaxed);
                        info!(
                            "Received Configuration Frame (ID: {}, {} cells, {} fps)",
                            frame.id_code(),
                            frame.cells.len(),
                            frame.frames_per_second()
                        );
                    }
                    Frame::Command(frame) => {
                        info!(
                            "Received Command Frame (ID: {}): {}",
                            frame.id_code(),
                            frame.command
                        );
                    }
                }
            }
            Err(e) => {
                counters.errors.fetch_add(1, Ordering::Relaxed);
                warn!("Failed to decode frame ({:?}): {}", e.kind(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args() -> ListenerArgs {
        ListenerArgs {
            host: "127.0.0.1".to_string(),
            port: 0,
            multicast: false,
            timeout: 1.0,
            stats_interval: 1.0,
            options: None,
            use_etr: false,
            etr_directory: None,
            guess_configuration: false,
            parse_redundant: false,
            strict_signatures: false,
            ignore_sample_size: false,
            angle_format: None,
        }
    }

    #[test]
    fn test_default_options() {
        assert_eq!(build_options(&args()).unwrap(), ParseOptions::default());
    }

    #[test]
    fn test_flags_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"guess_configuration": true, "phasor_angle_format": "Radians", "etr_directory": "/srv/etr"}}"#
        )
        .unwrap();

        let mut args = args();
        args.options = Some(file.path().to_path_buf());
        let options = build_options(&args).unwrap();
        assert!(options.guess_configuration);
        assert_eq!(options.phasor_angle_format, AngleFormat::Radians);
        assert_eq!(options.etr_directory, PathBuf::from("/srv/etr"));
        assert!(options.ignore_signature_validation_failures);

        args.strict_signatures = true;
        args.parse_redundant = true;
        args.angle_format = Some(AngleFormatArg::Degrees);
        args.etr_directory = Some(PathBuf::from("etr"));
        let options = build_options(&args).unwrap();
        assert!(options.guess_configuration);
        assert!(options.parse_redundant_asdus);
        assert!(!options.ignore_signature_validation_failures);
        assert_eq!(options.phasor_angle_format, AngleFormat::Degrees);
        assert_eq!(options.etr_directory, PathBuf::from("etr"));
    }

    #[test]
    fn test_bad_options_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let mut args = args();
        args.options = Some(file.path().to_path_buf());
        assert!(matches!(build_options(&args), Err(ParseError::Options(_))));
    }
}
