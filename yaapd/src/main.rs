//! # YAAP Debug-Access Daemon
//!
//! Serves the YAAP object tree of a board on a TCP port so that remote
//! debuggers can drive the CPU debug header, relays, I2C and LPC taps.
//!
//! ## Overview
//!
//! The daemon wires a board backend into [`yaap_server`] and runs the server
//! until a client resets the device or the process is interrupted. The only
//! backend shipped here is an in-memory simulation of a board, see
//! [`backends::sim`].
pub mod backends;
pub mod platform;

use std::net::{Ipv6Addr, SocketAddr};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use env_logger::Env;
use log::LevelFilter;
use yaap_server::server::{Builder, DEFAULT_PORT, Shutdown};

use crate::backends::sim::{JtagMode, SimBoard};
use crate::platform::ShiftClocks;

fn verbosity(s: &str) -> Result<u8, String> {
    clap_num::number_range(s, 0, 5)
}

fn port(s: &str) -> Result<u16, String> {
    clap_num::number_range(s, 1, 65535)
}

#[derive(Parser)]
#[command(about = "YAAP debug-access server for BMC managed CPU debug", long_about = None)]
struct Args {
    /// Log verbosity from 0 (fatal) to 5 (trace)
    #[arg(short, value_parser = verbosity)]
    v: Option<u8>,

    #[arg(short, long, default_value_t = DEFAULT_PORT, value_parser = port)]
    port: u16,

    /// TCK cycles issued before every shift
    #[arg(long, default_value = "5")]
    pre: u32,

    /// TCK cycles issued after every shift
    #[arg(long, default_value = "5")]
    post: u32,

    /// Seconds without a request after which a connection is closed
    #[arg(long, default_value = "1800")]
    timeout: u64,

    /// Bit-bang JTAG instead of using the shift engine
    #[arg(long = "jtag_sw_mode", conflicts_with = "default_jtag_hw_mode")]
    jtag_sw_mode: bool,

    /// Use the hardware shift engine (the default)
    #[arg(long = "default_jtag_hw_mode")]
    default_jtag_hw_mode: bool,

    /// Host slot served by this daemon
    #[arg(long)]
    slot: Option<u8>,

    /// FRU id of the host served by this daemon
    #[arg(long)]
    fruid: Option<u8>,

    /// Log every frame sent and received
    #[arg(short)]
    d: bool,
}

/// Log level selected by `-v`.
fn level_filter(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 | 1 => LevelFilter::Error,
        2 => LevelFilter::Warn,
        3 => LevelFilter::Info,
        4 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn init_logger(args: &Args) {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    if let Some(verbosity) = args.v {
        builder.filter_level(level_filter(verbosity));
    }
    if args.d {
        builder.filter_module("yaap_server::server", LevelFilter::Trace);
    }
    builder.init();
}

fn device_name(args: &Args) -> String {
    match (args.slot, args.fruid) {
        (Some(slot), _) => format!("yaapd-sim-slot{}", slot),
        (None, Some(fruid)) => format!("yaapd-sim-fru{}", fruid),
        (None, None) => "yaapd-sim".to_owned(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logger(&args);
    log::info!("Starting YAAP server");
    log::debug!(
        "Parsed arguments: port={}, pre={}, post={}, timeout={}s",
        args.port,
        args.pre,
        args.post,
        args.timeout
    );

    let mode = match (args.jtag_sw_mode, args.default_jtag_hw_mode) {
        (true, _) => JtagMode::Software,
        (false, _) => JtagMode::Hardware,
    };
    log::info!("JTAG transfer mode: {:?}", mode);

    let board = SimBoard::new(device_name(&args), mode);
    board.power_on();
    let system = platform::system_hal(&board);
    let clocks = ShiftClocks {
        pre: args.pre,
        post: args.post,
    };
    let registry = platform::build_registry(&board, &system, clocks);

    let server = Builder::new()
        .idle_timeout(Duration::from_secs(args.timeout))
        .build(registry, system);
    let addr = SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), args.port);
    log::info!("Binding to address: {}", addr);

    tokio::select! {
        result = server.listen(addr) => match result {
            Ok(Shutdown::Reset) => {
                log::info!("Exiting after device reset");
                ExitCode::SUCCESS
            }
            Err(err) => {
                log::error!("{}", err);
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            log::info!("Interrupted, shutting down");
            ExitCode::SUCCESS
        }
    }
}

#[cfg(test)]
mod test {
    use clap::Parser;
    use log::LevelFilter;
    use rstest::rstest;

    use super::{Args, level_filter};

    #[rstest]
    #[case(0, LevelFilter::Error)]
    #[case(1, LevelFilter::Error)]
    #[case(2, LevelFilter::Warn)]
    #[case(3, LevelFilter::Info)]
    #[case(4, LevelFilter::Debug)]
    #[case(5, LevelFilter::Trace)]
    fn verbosity_selects_level(#[case] verbosity: u8, #[case] expected: LevelFilter) {
        assert_eq!(level_filter(verbosity), expected);
    }

    #[test]
    fn defaults_match_documented_values() {
        let args = Args::try_parse_from(["yaapd"]).unwrap();
        assert_eq!(args.port, 5555);
        assert_eq!((args.pre, args.post), (5, 5));
        assert_eq!(args.timeout, 1800);
        assert!(!args.jtag_sw_mode);
    }

    #[test]
    fn rejects_out_of_range_and_conflicting_flags() {
        assert!(Args::try_parse_from(["yaapd", "-v", "6"]).is_err());
        assert!(Args::try_parse_from(["yaapd", "-p", "0"]).is_err());
        assert!(
            Args::try_parse_from(["yaapd", "--jtag_sw_mode", "--default_jtag_hw_mode"]).is_err()
        );
        let args = Args::try_parse_from(["yaapd", "-v", "4", "--slot", "2", "-d"]).unwrap();
        assert_eq!(args.v, Some(4));
        assert_eq!(args.slot, Some(2));
        assert!(args.d);
    }
}
