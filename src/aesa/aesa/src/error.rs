use aesa_backends::MapError;
use aesa_core::ProtocolError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Map(#[from] MapError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("cannot install interrupt handler: {0}")]
    Handler(#[from] ctrlc::Error),

    #[error("cannot create input trace {path}: {source}")]
    Trace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value for --{arg}: {value}")]
    Config { arg: &'static str, value: String },

    #[error("{0}")]
    Usage(String),
}

impl AppError {
    /// Process exit status; one value per failure category
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Map(MapError::Open { .. }) => 1,
            AppError::Map(_) => 4,
            AppError::Protocol(e) => match e {
                ProtocolError::Cancelled { .. } => 0,
                ProtocolError::DeviceNotStarted { .. } => 2,
                ProtocolError::OutputOpen(_) => 3,
                ProtocolError::DeviceNoAck { .. } => 5,
                ProtocolError::InputOpen(_) => 6,
                ProtocolError::DoneTimeout { .. } => 7,
                ProtocolError::InputRead(_) | ProtocolError::OutputWrite(_) => 8,
            },
            AppError::Trace { .. } => 8,
            AppError::Handler(_) => 9,
            AppError::Config { .. } | AppError::Usage(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::time::Duration;

    fn io_error() -> io::Error {
        io::Error::new(io::ErrorKind::Other, "boom")
    }

    #[test]
    fn failure_categories_stay_distinct() {
        let codes = [
            AppError::Map(MapError::Open {
                path: PathBuf::from("/dev/mem"),
                source: io_error(),
            })
            .exit_code(),
            AppError::Map(MapError::Layout("input buffer")).exit_code(),
            AppError::from(ProtocolError::InputOpen(io_error())).exit_code(),
            AppError::from(ProtocolError::DeviceNotStarted { status: 1 }).exit_code(),
            AppError::from(ProtocolError::DeviceNoAck { status: 2 }).exit_code(),
            AppError::from(ProtocolError::OutputOpen(io_error())).exit_code(),
            AppError::from(ProtocolError::DoneTimeout {
                waited: Duration::from_secs(1),
            })
            .exit_code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            assert_ne!(*a, 0);
            for b in codes[i + 1..].iter() {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn handshake_failure_codes_are_fixed() {
        assert_eq!(AppError::from(ProtocolError::DeviceNotStarted { status: 0 }).exit_code(), 2);
        assert_eq!(AppError::from(ProtocolError::OutputOpen(io_error())).exit_code(), 3);
        assert_eq!(AppError::from(ProtocolError::DeviceNoAck { status: 0 }).exit_code(), 5);
    }
}
