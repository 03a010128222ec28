// candriver/src/bin/canwatch.rs
//
// Prints the frames received on a CAN interface.
//
// This file is part of the Rust 'candriver' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Simple CLI tool to watch the traffic on a CAN interface, through a
//! filtered session.
//!
//! ```text
//! $ canwatch vcan0 --filter 489:7FF --errors --own --relative --telemetry
//! ```

use anyhow::{anyhow, Context, Result};
use candriver::{FilterSet, Session, SessionConfig};
use clap::{arg, value_parser, ArgAction, ArgMatches, Command};
use env_logger::Env;
use std::{
    process,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

// Make the app version the same as the package.
const VERSION: &str = env!("CARGO_PKG_VERSION");

// --------------------------------------------------------------------------

/// Parses a hex number, with or without a "0x" prefix.
fn parse_hex(s: &str) -> Result<u32> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(digits, 16).with_context(|| format!("Invalid hex number: '{}'", s))
}

/// Parses a filter given as "ID:MASK" or "~ID:MASK" (inverted).
fn parse_filter(filters: &mut FilterSet, s: &str) -> Result<()> {
    let (inverted, s) = match s.strip_prefix('~') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (id, mask) = s
        .split_once(':')
        .ok_or_else(|| anyhow!("Filters are given as ID:MASK, not '{}'", s))?;
    let (id, mask) = (parse_hex(id)?, parse_hex(mask)?);

    if inverted {
        filters.add_inverted(id, mask)?;
    } else {
        filters.add(id, mask)?;
    }
    Ok(())
}

/// Parses the payload of a frame to send, like "DEADBEEF" or "DE.AD.BE.EF".
fn parse_data(s: &str) -> Result<Vec<u8>> {
    let digits: String = s.chars().filter(|c| c.is_ascii_hexdigit()).collect();
    if digits.len() % 2 != 0 {
        return Err(anyhow!("Odd number of hex digits in '{}'", s));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).map_err(Into::into))
        .collect()
}

fn flag(opts: &ArgMatches, name: &str) -> bool {
    opts.get_one::<bool>(name).copied().unwrap_or(false)
}

/// Builds the session configuration from the command line.
fn session_config(opts: &ArgMatches) -> Result<SessionConfig> {
    let mut config = SessionConfig::new();

    if let Some(sender) = opts.get_one::<String>("sender") {
        let id = candriver::id::id_from_raw(parse_hex(sender)?)
            .ok_or_else(|| anyhow!("Sender id out of range: '{}'", sender))?;
        config = config.with_default_sender(id);
    }

    if let Some(specs) = opts.get_many::<String>("filter") {
        let mut filters = FilterSet::new();
        for spec in specs {
            parse_filter(&mut filters, spec)?;
        }
        config = config.with_filters(filters);
    }

    if flag(opts, "join") {
        config = config.with_join_filters();
    }
    if flag(opts, "errors") {
        config = config.with_error_filter();
    }
    if flag(opts, "own") {
        config = config.with_receive_own_messages();
    }
    if flag(opts, "telemetry") {
        config = config.with_telemetry();
    }
    if flag(opts, "relative") {
        config = config.with_relative_timestamps();
    }
    Ok(config)
}

/// Prints frames until the user hits ^C.
fn watch(opts: &ArgMatches) -> Result<()> {
    let iface = opts
        .get_one::<String>("iface")
        .ok_or_else(|| anyhow!("Need an interface"))?;
    let poll = Duration::from_millis(*opts.get_one::<u64>("poll").unwrap_or(&100));

    let config = session_config(opts)?;
    let mut session = Session::open_with(iface, &config)?;

    let quit = Arc::new(AtomicBool::new(false));
    let q = quit.clone();
    ctrlc::set_handler(move || q.store(true, Ordering::SeqCst))
        .context("Unable to set the ^C handler")?;

    if let Some(data) = opts.get_one::<String>("send") {
        session.send_data(&parse_data(data)?)?;
    }

    println!("Waiting for CAN frames on {}. Hit ^C to exit.", iface);

    while !quit.load(Ordering::Relaxed) {
        if !session.wait_for_messages(poll)? {
            continue;
        }
        let msg = session.read_message()?;
        if msg.is_error_frame() {
            match msg.error() {
                Ok(err) => eprintln!("Received an error frame: {} ({})", msg, err),
                Err(_) => eprintln!("Received an error frame: {}", msg),
            }
        } else {
            println!("{}", msg);
        }
    }

    if config.collect_telemetry {
        println!("{:#?}", session.telemetry());
    }
    Ok(())
}

// --------------------------------------------------------------------------

fn main() {
    let env = Env::default().default_filter_or("info");
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();

    let opts = Command::new("canwatch")
        .version(VERSION)
        .about("Prints the frames received on a CAN interface")
        .disable_help_flag(true)
        .arg(
            arg!(--help "Print help information")
                .short('?')
                .action(ArgAction::Help),
        )
        .arg(
            arg!(<iface> "The CAN interface to use, like 'can0', 'vcan0', etc")
                .required(true)
                .index(1),
        )
        .arg(
            arg!(-f --filter <FILTER> "A receive filter as hex ID:MASK, or ~ID:MASK to invert")
                .required(false)
                .action(ArgAction::Append),
        )
        .arg(arg!(-j --join "Frames must match all the filters").action(ArgAction::SetTrue))
        .arg(arg!(-e --errors "Receive error frames").action(ArgAction::SetTrue))
        .arg(arg!(-o --own "Receive the frames sent by this session").action(ArgAction::SetTrue))
        .arg(arg!(-r --relative "Timestamp frames relative to the previous one").action(ArgAction::SetTrue))
        .arg(arg!(-t --telemetry "Print the session telemetry on exit").action(ArgAction::SetTrue))
        .arg(
            arg!(-s --sender <ID> "The hex id to send data with")
                .required(false),
        )
        .arg(
            arg!(--send <DATA> "Hex data to send once, with the sender id")
                .required(false)
                .requires("sender"),
        )
        .arg(
            arg!(-p --poll <MS> "The time to wait for frames in each poll, in ms")
                .required(false)
                .value_parser(value_parser!(u64))
                .default_value("100"),
        )
        .get_matches();

    if let Err(err) = watch(&opts) {
        eprintln!("{:#}", err);
        process::exit(1);
    }
}
