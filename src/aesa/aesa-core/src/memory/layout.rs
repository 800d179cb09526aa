use crate::constants::{address_space, CUBE_WORDS, WINDOW_SLOTS};

/// Physical placement of one mapped window
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegionSpec {
    pub name: &'static str,
    pub base: u64,
    pub span: usize,
}

impl RegionSpec {
    /// True if `len` bytes starting at `offset` stay inside the region
    pub fn contains(&self, offset: usize, len: usize) -> bool {
        match offset.checked_add(len) {
            Some(end) => end <= self.span,
            None => false,
        }
    }
}

/// Where the registers and buffers live
///
/// Defaults reproduce the DE10 memory map bit for bit; the bases can be
/// overridden for other boards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryLayout {
    pub lw: RegionSpec,
    pub frame: RegionSpec,
    pub device: RegionSpec,

    pub host_reg: usize,   // lw
    pub device_reg: usize, // lw
    pub window: usize,     // frame
    pub input: usize,      // device
    pub output: usize,     // device
}

impl Default for MemoryLayout {
    fn default() -> Self {
        Self {
            lw: RegionSpec {
                name: "lw",
                base: address_space::LW_BRIDGE_BASE,
                span: address_space::LW_BRIDGE_SPAN,
            },
            frame: RegionSpec {
                name: "frame",
                base: address_space::FRAME_BRIDGE_BASE,
                span: address_space::FRAME_BRIDGE_SPAN,
            },
            device: RegionSpec {
                name: "device",
                base: address_space::DEVICE_MEM_BASE,
                span: address_space::DEVICE_MEM_SPAN,
            },
            host_reg: address_space::HOST_REG_OFFSET,
            device_reg: address_space::DEVICE_REG_OFFSET,
            window: address_space::WINDOW_OFFSET,
            input: address_space::INPUT_OFFSET,
            output: address_space::OUTPUT_OFFSET,
        }
    }
}

impl MemoryLayout {
    /// Checks that every register and buffer fits in its region.
    /// Returns the name of the first offender.
    pub fn validate(&self) -> Result<(), &'static str> {
        let word = core::mem::size_of::<u32>();
        let checks = [
            (self.lw, self.host_reg, 1, "host status register"),
            (self.lw, self.device_reg, 1, "device status register"),
            (self.frame, self.window, WINDOW_SLOTS * word, "transfer window"),
            (self.device, self.input, CUBE_WORDS * word, "input buffer"),
            (self.device, self.output, CUBE_WORDS * word, "output buffer"),
        ];
        for &(region, offset, len, what) in checks.iter() {
            if !region.contains(offset, len) {
                return Err(what);
            }
        }
        Ok(())
    }
}
