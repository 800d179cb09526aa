use crate::protocol::State;
use std::io;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Ways a handshake run can end other than `Acknowledged`
///
/// None of these are retried; the run stops where it failed.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("cannot open input records: {0}")]
    InputOpen(#[source] io::Error),

    #[error("cannot read input records: {0}")]
    InputRead(#[source] io::Error),

    /// Device did not raise ACTIVE (or still reports IDLE) after reset release
    #[error("device did not start (status 0x{status:02x})")]
    DeviceNotStarted { status: u8 },

    /// Device did not raise RECEIVED within the acknowledgment delay
    #[error("device did not acknowledge the transfer (status 0x{status:02x})")]
    DeviceNoAck { status: u8 },

    #[error("device did not report DONE within {waited:?}")]
    DoneTimeout { waited: Duration },

    #[error("cannot create result file: {0}")]
    OutputOpen(#[source] io::Error),

    #[error("cannot write result file: {0}")]
    OutputWrite(#[source] io::Error),

    #[error("shutdown requested while {state:?}")]
    Cancelled { state: State },
}
