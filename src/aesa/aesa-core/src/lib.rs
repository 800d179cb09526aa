pub mod constants;
pub mod error;
pub mod extractor;
pub mod memory;
pub mod packer;
pub mod protocol;
pub mod shutdown;
pub mod transfer;
pub mod utils;

pub use error::{ProtocolError, Result};
pub use memory::Channels;
pub use protocol::{Handshake, RunReport, State, Timing};
