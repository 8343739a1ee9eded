use std::net::UdpSocket;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use portalbox::backend::{FixedBackoff, HttpBackend};
use portalbox::config::{read_mac_address, Config};
use portalbox::device::{Device, GpioPins, RaspberryPiDevice};
use portalbox::fsm::Fsm;
use portalbox::input::InputAssembler;
use portalbox::notifier::{NullNotifier, Notifier, SmtpNotifier};
use portalbox::supervisor::{self, TICK_INTERVAL};

/// RFID-gated equipment power controller.
#[derive(Parser)]
#[command(name = "portalbox")]
struct Cli {
    /// Path to the INI configuration file.
    #[arg(default_value = "./config.ini")]
    config_path: PathBuf,
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(&cli.config_path).context("loading configuration")?;

    let _logging_guard = init_logging(&config.logging);

    let mac_address = read_mac_address(&config.network.interface).context("reading MAC address")?;

    let backend = HttpBackend::new(&config.db.website, &config.db.bearer_token);

    let mut device = RaspberryPiDevice::new(GpioPins {
        power: config.gpio.power,
        red: config.gpio.red,
        green: config.gpio.green,
        blue: config.gpio.blue,
        buzzer: config.gpio.buzzer,
        button: config.gpio.button,
    })
    .context("initializing device driver")?;

    let notifier: Box<dyn Notifier> = if config.email.enabled {
        Box::new(
            SmtpNotifier::new(
                &config.email.smtp_host,
                &config.email.smtp_username,
                &config.email.smtp_password,
                &config.email.from_address,
            )
            .context("initializing SMTP notifier")?,
        )
    } else {
        Box::new(NullNotifier)
    };

    let local_ip = outbound_ip_address();

    let fsm = Fsm::setup(&mut device, &backend, &mac_address, &local_ip, config.grace_period, config.display)
        .inspect_err(|_| device.cleanup())
        .context("equipment setup failed")?;

    let shutdown = supervisor::install_shutdown_flag()
        .inspect_err(|_| device.cleanup())
        .context("installing signal handlers")?;

    let assembler = InputAssembler::new(Box::new(FixedBackoff::default()));

    supervisor::run(fsm, Box::new(device), Box::new(backend), notifier, assembler, shutdown, TICK_INTERVAL);

    Ok(())
}

/// Logs to stdout and, for a box running unattended in a workshop, to a
/// daily-rotating file under `logging.directory`. The returned guard must
/// stay alive for the process lifetime — dropping it flushes the
/// non-blocking file writer.
fn init_logging(logging: &portalbox::config::LoggingConfig) -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(&logging.directory, "portalbox.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let filter = EnvFilter::new(logging.level.to_string());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    guard
}

/// Best-effort local IP for `record_ip`, found the usual connect-a-UDP-socket
/// way rather than pulling in an interface-enumeration crate for one value.
fn outbound_ip_address() -> String {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|_| "0.0.0.0".to_string())
}
