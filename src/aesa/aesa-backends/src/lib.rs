pub mod devmem;
pub mod loopback;

pub use devmem::{MapError, Mapping, ResetLine};
pub use loopback::{LoopbackConfig, LoopbackDevice};
