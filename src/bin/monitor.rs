//! NETSGP Monitor
//!
//! Polls NETSGP micro-inverters through an LC12S bridge on a serial port and
//! prints every reading with a timestamp.
//!
//! Usage: cargo run --features cli --bin netsgp-monitor -- --port /dev/ttyUSB0 -i 11223344
//! Simulation: cargo run --features cli --bin netsgp-monitor -- --simulate

use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use voltage_netsgp::{
    ByteChannel, Command, CommandFrame, DeviceId, InverterStatus, MemoryChannel, NetsgpClient,
    NetsgpResult, NoPin, PollConfig, PollScheduler, ProgramPin, SerialChannel, SystemClock,
    DEFAULT_PACING_GAP_MS, DEFAULT_POLL_INTERVAL_MS,
};

/// Inverters answered by `--simulate` when none are given
const SIMULATED_INVERTERS: [DeviceId; 3] = [0x11223344, 0x11223345, 0x40001234];

#[derive(Debug, Parser)]
#[command(name = "netsgp-monitor", author, version, about)]
struct Args {
    /// Serial port of the LC12S bridge
    #[arg(short, long, env = "NETSGP_PORT", default_value = "/dev/ttyUSB0")]
    port: String,

    /// Serial baudrate
    #[arg(short, long, default_value_t = 9600)]
    baud: u32,

    /// Inverter id to poll, hexadecimal (repeatable)
    #[arg(short = 'i', long = "inverter", value_parser = parse_device_id)]
    inverters: Vec<DeviceId>,

    /// Poll interval in milliseconds
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    interval_ms: u32,

    /// Minimum spacing between two polls in milliseconds
    #[arg(long, default_value_t = DEFAULT_PACING_GAP_MS)]
    pacing_gap_ms: u32,

    /// Scheduler tick period in milliseconds
    #[arg(long, default_value_t = 10)]
    tick_ms: u64,

    /// Rewrite the bridge settings to the default profile if needed
    #[arg(long)]
    ensure_defaults: bool,

    /// Run against simulated inverters instead of a serial port
    #[arg(long)]
    simulate: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info", env = "RUST_LOG")]
    log_level: String,
}

fn parse_device_id(raw: &str) -> Result<DeviceId, String> {
    let digits = raw.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(digits, 16).map_err(|e| format!("invalid inverter id '{}': {}", raw, e))
}

fn print_status(status: &InverterStatus) {
    println!(
        "{} {:08X} state={} temp={} total={:.2} DC {:.2} V {:.2} A {:.1} W | AC {:.2} V {:.2} A {:.1} W",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        status.device_id,
        status.state,
        status.temperature,
        status.total_generated_power,
        status.dc_voltage,
        status.dc_current,
        status.dc_power,
        status.ac_voltage,
        status.ac_current,
        status.ac_power
    );
}

/// In-memory inverters: STATUS gets a drifting reading, other commands an echo
fn simulated_channel() -> MemoryChannel {
    let mut round: u32 = 0;
    MemoryChannel::with_responder(move |frame| {
        let command = CommandFrame::parse(frame).ok()?;
        match command.command {
            Command::Status => {
                round = round.wrapping_add(1);
                let drift = (round % 20) as f32 * 0.05;
                let status = InverterStatus {
                    device_id: command.device_id,
                    state: 1,
                    temperature: 38,
                    total_generated_power: 125.0 + round as f32 * 0.01,
                    dc_voltage: 31.2 + drift,
                    dc_current: 7.4 - drift,
                    ac_voltage: 230.1,
                    ac_current: 0.95 + drift / 10.0,
                    ..Default::default()
                };
                Some(status.to_frame().to_vec())
            }
            Command::Control | Command::PowerGrade => Some(frame.to_vec()),
        }
    })
}

async fn run<C: ByteChannel, P: ProgramPin>(
    client: NetsgpClient<C, P, SystemClock>,
    args: &Args,
    inverters: &[DeviceId],
) -> NetsgpResult<()> {
    let config = PollConfig::new()
        .with_interval_ms(args.interval_ms)
        .with_pacing_gap_ms(args.pacing_gap_ms);
    if !config.rounds_fit_interval(inverters.len()) {
        warn!(
            "{} inverters need up to {} ms per round, longer than the {} ms interval",
            inverters.len(),
            config.round_duration_ms(inverters.len()),
            config.interval_ms
        );
    }

    let mut scheduler = PollScheduler::new(client, config);
    scheduler.set_status_callback(print_status);
    for &id in inverters {
        scheduler.register_inverter(id);
    }
    info!("Polling {} inverters every {} ms", inverters.len(), config.interval_ms);

    let mut ticker = tokio::time::interval(Duration::from_millis(args.tick_ms.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = scheduler.tick() {
                    warn!("Poll tick failed: {}", err);
                }
            }
            _ = &mut shutdown => {
                info!("Shutting down");
                break;
            }
        }
    }

    info!("Final statistics: {:?}", scheduler.client().stats());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let env_filter = EnvFilter::try_new(&args.log_level).or_else(|_| EnvFilter::try_new("info"))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    info!("{}", voltage_netsgp::info());

    if args.simulate {
        let inverters = if args.inverters.is_empty() {
            SIMULATED_INVERTERS.to_vec()
        } else {
            args.inverters.clone()
        };
        if args.ensure_defaults {
            warn!("--ensure-defaults ignored in simulation");
        }
        let client = NetsgpClient::new(simulated_channel(), NoPin, SystemClock::new())?;
        run(client, &args, &inverters).await?;
        return Ok(());
    }

    if args.inverters.is_empty() {
        return Err("no inverters given, use --inverter <HEX_ID>".into());
    }

    let channel = SerialChannel::open(&args.port, args.baud, Duration::from_millis(100))?;
    let pin = channel.program_line()?;
    let mut client = NetsgpClient::new(channel, pin, SystemClock::new())?;

    if args.ensure_defaults {
        if client.ensure_default_bridge_settings()? {
            info!("Bridge reconfigured to default profile");
        } else {
            info!("Bridge already at default profile");
        }
    }

    run(client, &args, &args.inverters).await?;
    Ok(())
}
