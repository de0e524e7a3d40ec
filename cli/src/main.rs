mod sv_listener;
mod sv_publisher;

use clap::{Parser, Subcommand};
use sv_publisher::{run_mock_publisher, PublisherConfig, SignatureArg};
use tokio::io;

#[derive(Debug, Parser)]
#[command(name = "svpmu")]
#[command(about = "IEC 61850-90-5 sampled value test tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Stream random PMU data as session datagrams over UDP.
    MockPublisher {
        #[arg(long, default_value = "127.0.0.1")]
        ip: String,

        #[arg(long, default_value_t = 8123)]
        port: u16,

        #[arg(long, default_value_t = 30)]
        data_rate: u16,

        #[arg(long, default_value_t = 1)]
        num_pmus: usize,

        #[arg(long, default_value = "1_MockPMU")]
        msvid: String,

        #[arg(long, default_value_t = 1)]
        asdu_count: u8,

        #[arg(long, value_enum, default_value_t = SignatureArg::None)]
        signature: SignatureArg,

        /// Also send the configuration frame once per second.
        #[arg(long, default_value_t = false)]
        send_configuration: bool,

        /// Stop after this many data frames.
        #[arg(long)]
        count: Option<u64>,
    },
    /// Decode and report on a sampled value stream.
    Listen(sv_listener::ListenerArgs),
}

#[tokio::main]
async fn main() -> io::Result<()> {
    // Initialize logging early to ensure all log messages are captured
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Cli::parse();

    match args.command {
        Commands::MockPublisher {
            ip,
            port,
            data_rate,
            num_pmus,
            msvid,
            asdu_count,
            signature,
            send_configuration,
            count,
        } => {
            let mut config = PublisherConfig::new(
                ip,
                port,
                data_rate,
                num_pmus,
                msvid,
                asdu_count,
                signature.into(),
            )
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
            config.send_configuration = send_configuration;
            config.count = count;

            if let Err(e) = run_mock_publisher(config).await {
                log::error!("Mock publisher error: {}", e);
                return Err(e);
            }
        }
        Commands::Listen(listener_args) => {
            if let Err(e) = sv_listener::run_sv_listener(listener_args).await {
                log::error!("Listener error: {}", e);
                return Err(e);
            }
        }
    }
    Ok(())
}
