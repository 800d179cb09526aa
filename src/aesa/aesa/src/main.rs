use log::{error, info, warn};
use std::fs::File;
use std::io::BufReader;

// Internal project modules
use aesa_backends::{LoopbackDevice, Mapping};
use aesa_core::memory::{RegisterCell, WordMemory};
use aesa_core::shutdown::{self, ResetHook, ShutdownSignal, ShutdownTrigger};
use aesa_core::{Channels, Handshake, ProtocolError, RunReport};

mod cli;
mod error;

use cli::{Backend, Config};
use error::AppError;

/// Routes Ctrl-C into the shutdown channel; a second Ctrl-C clears RESETN
/// through `reset` and exits at once
fn install_interrupt_handler(trigger: ShutdownTrigger, reset: ResetHook) -> Result<(), AppError> {
    let mut presses = 0u32;
    ctrlc::set_handler(move || {
        presses += 1;
        if presses > 1 {
            // Emergency exit if shutdown is stuck
            if !reset.fire() {
                warn!("Forced exit before the device was reachable");
            }
            std::process::exit(-1);
        }
        let _requested = trigger.request();
    })?;
    Ok(())
}

/// One protocol run over whichever backend provided the channels
fn execute<H, D, W>(
    config: &Config,
    channels: &mut Channels<H, D, W>,
    signal: ShutdownSignal,
) -> Result<RunReport, AppError>
where
    H: RegisterCell,
    D: RegisterCell,
    W: WordMemory,
{
    let result = {
        let mut handshake = Handshake::new(channels, config.timing, signal);
        if let Some(path) = &config.dump_input {
            let file = File::create(path).map_err(|source| AppError::Trace {
                path: path.clone(),
                source,
            })?;
            handshake = handshake.with_input_trace(Box::new(file));
        }

        info!("Reading input file {}", config.input.display());
        handshake.run(
            || File::open(&config.input).map(BufReader::new),
            || File::create(&config.output),
        )
    };
    match result {
        Ok(report) => Ok(report),
        Err(e) => {
            if let ProtocolError::Cancelled { .. } = e {
                // Best-effort deactivation; no wait for the device
                shutdown::deactivate(&mut channels.host);
            }
            Err(e.into())
        }
    }
}

fn run() -> Result<RunReport, AppError> {
    let config = cli::load()?;

    let (trigger, signal) = shutdown::channel();
    let reset = ResetHook::default();
    install_interrupt_handler(trigger, reset.clone())?;

    match &config.backend {
        Backend::Hardware { mem, layout } => {
            let mapping = Mapping::open(mem, *layout)?;
            let result = {
                // SAFETY: the guard is dropped at the end of this block,
                // before the mapping is released
                let _armed = match unsafe { mapping.reset_line() } {
                    Ok(line) => Some(reset.arm(line)),
                    Err(e) => {
                        warn!("No forced-exit reset path: {}", e);
                        None
                    }
                };
                match mapping.channels() {
                    Ok(mut channels) => execute(&config, &mut channels, signal),
                    Err(e) => Err(e.into()),
                }
            };
            mapping.release();
            result
        }
        Backend::Loopback(device_config) => {
            let device = LoopbackDevice::new(*device_config);
            let _armed = reset.arm(device.host_port());
            let mut channels = device.channels();
            execute(&config, &mut channels, signal)
        }
    }
}

/// Main entry point for the HPS side of the AESA bridge
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let code = match run() {
        Ok(report) => {
            info!(
                "Saved {} result words ({} records packed, device busy {:?})",
                report.results, report.pack.records, report.completion
            );
            0
        }
        Err(AppError::Protocol(ProtocolError::Cancelled { state })) => {
            warn!("Stopped by interrupt while {:?}", state);
            0
        }
        Err(e) => {
            error!("{}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}
