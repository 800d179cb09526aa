mod layout;
pub mod registers;
pub mod shared;

pub use layout::{MemoryLayout, RegionSpec};
pub use registers::{DeviceFlag, DeviceStatusRegister, FlagMode, HostFlag, HostStatusRegister};

/// Single shared byte as seen from the host
///
/// `store` takes `&mut self` so a cell handed to a register wrapper has
/// exactly one writer on the host side.
pub trait RegisterCell {
    fn load(&self) -> u8;
    fn store(&mut self, value: u8);
}

/// Word-addressed view onto a buffer the host and device both see
pub trait WordMemory {
    fn len(&self) -> usize;
    fn read(&self, idx: usize) -> u32;
    fn write(&mut self, idx: usize, value: u32);

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The context every protocol stage works on
///
/// Replaces module-wide pointers: it is built once from a mapped backend and
/// passed explicitly to the handshake and, afterwards, to the shutdown path.
pub struct Channels<H: RegisterCell, D: RegisterCell, W: WordMemory> {
    pub host: HostStatusRegister<H>,
    pub device: DeviceStatusRegister<D>,
    pub input: W,  // Packed cube (device memory)
    pub window: W, // 16-slot streaming port (frame window)
    pub output: W, // Results written by the device
}

impl<H: RegisterCell, D: RegisterCell, W: WordMemory> Channels<H, D, W> {
    pub fn new(host: H, device: D, input: W, window: W, output: W) -> Self {
        Self {
            host: HostStatusRegister::new(host),
            device: DeviceStatusRegister::new(device),
            input,
            window,
            output,
        }
    }
}
