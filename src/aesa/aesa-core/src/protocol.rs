use crate::constants::{timing, CUBE_WORDS};
use crate::error::{ProtocolError, Result};
use crate::extractor::write_results;
use crate::memory::{Channels, DeviceFlag, FlagMode, HostFlag, RegisterCell, WordMemory};
use crate::packer::{dump_words, pack_cube, PackSummary};
use crate::shutdown::ShutdownSignal;
use crate::transfer::stream_window;
use log::{debug, error, info, warn};
use std::io::{self, BufRead, BufWriter, Write};
use std::time::{Duration, Instant};

/// Handshake states, in the order a successful run visits them
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Init,
    Reset,
    Transferring,
    AwaitingDeviceStart,
    Sent,
    AwaitingAck,
    AwaitingCompletion,
    ResultsReady,
    Acknowledged,

    // Terminal failures
    DeviceNotStarted,
    DeviceNoAck,
}

/// Delays used at the two suspension points
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timing {
    pub ack_delay: Duration,     // Single wait before checking RECEIVED
    pub poll_interval: Duration, // Period of the DONE poll
    pub done_timeout: Option<Duration>, // None waits forever
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            ack_delay: Duration::from_micros(timing::ACK_DELAY_US),
            poll_interval: Duration::from_micros(timing::POLL_INTERVAL_US),
            done_timeout: None,
        }
    }
}

/// What a successful run did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunReport {
    pub pack: PackSummary,
    pub transferred: usize,
    pub results: usize,
    pub completion: Duration, // Time spent waiting for DONE
}

/// Host side of the register handshake
///
/// One instance drives one run. Every transition moves forward only; any
/// failure leaves the machine where it stopped and is returned to the caller.
pub struct Handshake<'a, H: RegisterCell, D: RegisterCell, W: WordMemory> {
    channels: &'a mut Channels<H, D, W>,
    timing: Timing,
    signal: ShutdownSignal,
    state: State,
    input_trace: Option<Box<dyn Write + 'a>>,
}

impl<'a, H: RegisterCell, D: RegisterCell, W: WordMemory> Handshake<'a, H, D, W> {
    pub fn new(
        channels: &'a mut Channels<H, D, W>,
        timing: Timing,
        signal: ShutdownSignal,
    ) -> Self {
        Self {
            channels,
            timing,
            signal,
            state: State::Init,
            input_trace: None,
        }
    }

    /// Dumps the packed input words to `sink` before they are streamed
    pub fn with_input_trace(mut self, sink: Box<dyn Write + 'a>) -> Self {
        self.input_trace = Some(sink);
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    fn advance(&mut self, next: State) {
        debug!("Handshake {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn cancelled(&self) -> ProtocolError {
        warn!("Shutdown requested while {:?}", self.state);
        ProtocolError::Cancelled { state: self.state }
    }

    /// Runs the whole exchange: reset, pack, stream, start, acknowledge,
    /// wait for completion, save results, confirm receipt.
    ///
    /// `open_input` is called once the device is held in reset; `open_output`
    /// only after the device reports DONE.
    pub fn run<R, S, FI, FO>(&mut self, open_input: FI, open_output: FO) -> Result<RunReport>
    where
        R: BufRead,
        S: Write,
        FI: FnOnce() -> io::Result<R>,
        FO: FnOnce() -> io::Result<S>,
    {
        // Hold the device in reset before any data is visible to it
        self.channels.host.set_flag(HostFlag::Resetn, FlagMode::Clear);
        self.advance(State::Reset);

        let reader = open_input().map_err(ProtocolError::InputOpen)?;
        self.advance(State::Transferring);
        let pack = pack_cube(reader, &mut self.channels.input, &self.signal)?;
        self.trace_input(pack.words);
        let transferred = stream_window(
            &self.channels.input,
            &mut self.channels.window,
            CUBE_WORDS,
            &self.signal,
        )?;

        // Release reset, then declare the host ready
        self.channels.host.set_flag(HostFlag::Resetn, FlagMode::Set);
        self.channels.host.set_flag(HostFlag::Active, FlagMode::Set);
        self.advance(State::AwaitingDeviceStart);

        let device = &self.channels.device;
        if !device.flag(DeviceFlag::Active) || device.flag(DeviceFlag::Idle) {
            let status = self.channels.device.raw();
            error!("Device did not start (status 0x{:02x})", status);
            self.advance(State::DeviceNotStarted);
            return Err(ProtocolError::DeviceNotStarted { status });
        }
        info!("Device active");

        self.channels.host.set_flag(HostFlag::Sent, FlagMode::Set);
        self.advance(State::Sent);

        // One fixed wait and one check; the device gets no second chance
        self.advance(State::AwaitingAck);
        if self.signal.wait(self.timing.ack_delay) {
            return Err(self.cancelled());
        }
        if !self.channels.device.flag(DeviceFlag::Received) {
            let status = self.channels.device.raw();
            error!("Device did not acknowledge (status 0x{:02x})", status);
            self.advance(State::DeviceNoAck);
            return Err(ProtocolError::DeviceNoAck { status });
        }
        info!("Device received");

        self.advance(State::AwaitingCompletion);
        let completion = self.wait_done()?;
        info!("Device done after {:?}", completion);
        self.advance(State::ResultsReady);

        let results = self.save_results(open_output)?;

        self.channels.host.set_flag(HostFlag::Received, FlagMode::Set);
        self.advance(State::Acknowledged);

        Ok(RunReport {
            pack,
            transferred,
            results,
            completion,
        })
    }

    /// Polls DONE until it is observed, the timeout expires, or shutdown is
    /// requested. Returns the time spent waiting.
    pub fn wait_done(&mut self) -> Result<Duration> {
        let start = Instant::now();
        loop {
            if self.channels.device.flag(DeviceFlag::Done) {
                return Ok(start.elapsed());
            }
            if let Some(limit) = self.timing.done_timeout {
                let waited = start.elapsed();
                if waited >= limit {
                    error!("Device did not finish within {:?}", limit);
                    return Err(ProtocolError::DoneTimeout { waited });
                }
            }
            if self.signal.wait(self.timing.poll_interval) {
                return Err(self.cancelled());
            }
        }
    }

    fn save_results<S, FO>(&mut self, open_output: FO) -> Result<usize>
    where
        S: Write,
        FO: FnOnce() -> io::Result<S>,
    {
        let sink = open_output().map_err(ProtocolError::OutputOpen)?;
        info!("Saving results");
        let mut out = BufWriter::new(sink);
        write_results(&mut out, &self.channels.output, CUBE_WORDS)
            .map_err(ProtocolError::OutputWrite)
    }

    fn trace_input(&mut self, words: usize) {
        if let Some(sink) = self.input_trace.as_mut() {
            let mut out = BufWriter::new(sink);
            if let Err(e) = dump_words(&mut out, &self.channels.input, words) {
                warn!("Input trace failed: {}", e);
            }
        }
    }
}
