use crate::error::AppError;
use aesa_backends::LoopbackConfig;
use aesa_core::constants::{artifacts, timing};
use aesa_core::memory::MemoryLayout;
use aesa_core::Timing;
use std::path::PathBuf;
use std::time::Duration;

/// Where the protocol runs
pub enum Backend {
    Hardware { mem: PathBuf, layout: MemoryLayout },
    Loopback(LoopbackConfig),
}

/// Everything one invocation needs
pub struct Config {
    pub input: PathBuf,
    pub output: PathBuf,
    pub dump_input: Option<PathBuf>,
    pub timing: Timing,
    pub backend: Backend,
}

fn is_number(value: String) -> Result<(), String> {
    value
        .parse::<u64>()
        .map(|_| ())
        .map_err(|_| format!("'{}' is not a whole number", value))
}

fn is_hex(value: String) -> Result<(), String> {
    parse_hex(&value)
        .map(|_| ())
        .ok_or_else(|| format!("'{}' is not a hex address", value))
}

fn parse_hex(value: &str) -> Option<u64> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u64::from_str_radix(&digits.replace('_', ""), 16).ok()
}

fn number_arg(name: &'static str, help: &'static str) -> clap::Arg<'static, 'static> {
    clap::Arg::with_name(name)
        .long(name)
        .takes_value(true)
        .validator(is_number)
        .help(help)
}

fn address_arg(name: &'static str, help: &'static str) -> clap::Arg<'static, 'static> {
    clap::Arg::with_name(name)
        .long(name)
        .takes_value(true)
        .validator(is_hex)
        .help(help)
}

/// Configures command-line interface using clap
fn get_cli_config<'a>() -> Result<clap::ArgMatches<'a>, clap::Error> {
    let description = "Streams a packed data cube to the AESA FPGA fabric and collects the results";

    clap::App::new("AESA HPS bridge")
        .version("0.1")
        .about(description)
        .setting(clap::AppSettings::SubcommandRequiredElseHelp)
        .arg(
            clap::Arg::with_name("input")
                .long("input")
                .takes_value(true)
                .default_value(artifacts::DEFAULT_INPUT)
                .help("Cube file, one 512-character binary record per line"),
        )
        .arg(
            clap::Arg::with_name("output")
                .long("output")
                .takes_value(true)
                .default_value(artifacts::DEFAULT_OUTPUT)
                .help("Result file"),
        )
        .arg(
            clap::Arg::with_name("dump-input")
                .long("dump-input")
                .takes_value(true)
                .help("Also write the packed input words to this file"),
        )
        .arg(
            number_arg("ack-delay-us", "Wait before checking the device acknowledgment")
                .default_value("10"),
        )
        .arg(number_arg("poll-interval-us", "DONE polling period").default_value("1"))
        .arg(number_arg(
            "done-timeout-ms",
            "Give up waiting for DONE after this long (default: never)",
        ))
        .subcommand(
            clap::SubCommand::with_name("run")
                .about("Run against the FPGA through physical memory")
                .arg(
                    clap::Arg::with_name("mem")
                        .long("mem")
                        .takes_value(true)
                        .default_value(artifacts::DEFAULT_MEMORY_DEVICE)
                        .help("Physical memory device"),
                )
                .arg(address_arg("lw-base", "Lightweight bridge base address"))
                .arg(address_arg("frame-base", "Frame bridge base address"))
                .arg(address_arg("device-base", "Device memory base address")),
        )
        .subcommand(
            clap::SubCommand::with_name("simulate")
                .about("Run against the in-process loopback device")
                .arg(number_arg("done-after-ms", "Simulated processing time").default_value("1"))
                .arg(
                    clap::Arg::with_name("no-start")
                        .long("no-start")
                        .help("Device never leaves idle"),
                )
                .arg(
                    clap::Arg::with_name("no-ack")
                        .long("no-ack")
                        .help("Device never acknowledges the transfer"),
                ),
        )
        .get_matches_safe()
}

fn number_of(matches: &clap::ArgMatches, arg: &'static str) -> Result<Option<u64>, AppError> {
    match matches.value_of(arg) {
        Some(value) => value.parse().map(Some).map_err(|_| AppError::Config {
            arg,
            value: value.to_string(),
        }),
        None => Ok(None),
    }
}

fn address_of(matches: &clap::ArgMatches, arg: &'static str) -> Result<Option<u64>, AppError> {
    match matches.value_of(arg) {
        Some(value) => parse_hex(value).map(Some).ok_or_else(|| AppError::Config {
            arg,
            value: value.to_string(),
        }),
        None => Ok(None),
    }
}

fn timing_from(matches: &clap::ArgMatches) -> Result<Timing, AppError> {
    let ack_delay_us = number_of(matches, "ack-delay-us")?.unwrap_or(timing::ACK_DELAY_US);
    let poll_interval_us =
        number_of(matches, "poll-interval-us")?.unwrap_or(timing::POLL_INTERVAL_US);
    Ok(Timing {
        ack_delay: Duration::from_micros(ack_delay_us),
        poll_interval: Duration::from_micros(poll_interval_us),
        done_timeout: number_of(matches, "done-timeout-ms")?.map(Duration::from_millis),
    })
}

fn hardware_from(matches: &clap::ArgMatches) -> Result<Backend, AppError> {
    let mut layout = MemoryLayout::default();
    if let Some(base) = address_of(matches, "lw-base")? {
        layout.lw.base = base;
    }
    if let Some(base) = address_of(matches, "frame-base")? {
        layout.frame.base = base;
    }
    if let Some(base) = address_of(matches, "device-base")? {
        layout.device.base = base;
    }
    let mem = PathBuf::from(matches.value_of("mem").unwrap_or(artifacts::DEFAULT_MEMORY_DEVICE));
    Ok(Backend::Hardware { mem, layout })
}

fn loopback_from(matches: &clap::ArgMatches) -> Result<Backend, AppError> {
    let mut config = LoopbackConfig::default();
    if let Some(ms) = number_of(matches, "done-after-ms")? {
        config.done_after = Duration::from_millis(ms);
    }
    config.start = !matches.is_present("no-start");
    config.ack = !matches.is_present("no-ack");
    Ok(Backend::Loopback(config))
}

/// Parses the command line into a `Config`
///
/// Help and version requests exit here with status 0.
pub fn load() -> Result<Config, AppError> {
    let matches = match get_cli_config() {
        Ok(matches) => matches,
        Err(e) => match e.kind {
            clap::ErrorKind::HelpDisplayed | clap::ErrorKind::VersionDisplayed => e.exit(),
            _ => return Err(AppError::Usage(e.message)),
        },
    };

    let backend = match matches.subcommand() {
        ("run", Some(sub)) => hardware_from(sub)?,
        ("simulate", Some(sub)) => loopback_from(sub)?,
        (other, _) => return Err(AppError::Usage(format!("unknown command '{}'", other))),
    };

    Ok(Config {
        input: PathBuf::from(matches.value_of("input").unwrap_or(artifacts::DEFAULT_INPUT)),
        output: PathBuf::from(matches.value_of("output").unwrap_or(artifacts::DEFAULT_OUTPUT)),
        dump_input: matches.value_of("dump-input").map(PathBuf::from),
        timing: timing_from(&matches)?,
        backend,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_accepts_common_spellings() {
        assert_eq!(parse_hex("0xFF200000"), Some(0xFF20_0000));
        assert_eq!(parse_hex("ff20_0000"), Some(0xFF20_0000));
        assert_eq!(parse_hex("0X30000000"), Some(0x3000_0000));
        assert_eq!(parse_hex("0xzz"), None);
    }

    #[test]
    fn validators_reject_garbage() {
        assert!(is_number("12".to_string()).is_ok());
        assert!(is_number("-1".to_string()).is_err());
        assert!(is_hex("0x10".to_string()).is_ok());
        assert!(is_hex("ten".to_string()).is_err());
    }
}
