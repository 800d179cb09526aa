// Dataset geometry
pub const CUBE_RECORDS: usize = 8192;
pub const RECORD_BITS: usize = 512;
pub const WORD_BITS: usize = 32;
pub const WORDS_PER_RECORD: usize = RECORD_BITS / WORD_BITS; // 16
pub const CUBE_WORDS: usize = CUBE_RECORDS * WORDS_PER_RECORD; // 131072

// Streaming port
pub const WINDOW_SLOTS: usize = 16;

pub mod progress {
    // Reporting cadence
    pub const PACK_EVERY_RECORDS: usize = 1000;
    pub const TRANSFER_EVERY_WORDS: usize = 10000;
}

pub mod timing {
    pub const ACK_DELAY_US: u64 = 10; // Single wait before the RECEIVED check
    pub const POLL_INTERVAL_US: u64 = 1; // DONE polling period
}

pub mod flags {
    // Host status register (host writes, device reads)
    pub const HOST_ACTIVE: u8 = 0;
    pub const HOST_RESETN: u8 = 1;
    pub const HOST_SENT: u8 = 2;
    pub const HOST_RECEIVED: u8 = 3;

    // Device status register (device writes, host reads)
    pub const DEVICE_IDLE: u8 = 0;
    pub const DEVICE_ACTIVE: u8 = 1;
    pub const DEVICE_RECEIVED: u8 = 2;
    pub const DEVICE_DONE: u8 = 3;
}

pub mod address_space {
    // Lightweight HPS-to-FPGA bridge (control registers)
    pub const LW_BRIDGE_BASE: u64 = 0xFF20_0000;
    pub const LW_BRIDGE_SPAN: usize = 0x0020_0000;

    // Full HPS-to-FPGA bridge (frame window)
    pub const FRAME_BRIDGE_BASE: u64 = 0xC000_0000;
    pub const FRAME_BRIDGE_SPAN: usize = 0x3C00_0000;

    // Device-resident memory, 256 MiB
    pub const DEVICE_MEM_BASE: u64 = 0x3000_0000;
    pub const DEVICE_MEM_SPAN: usize = 0x1000_0000;

    // Offsets inside the regions above
    pub const HOST_REG_OFFSET: usize = 0x0000_0000; // lw
    pub const DEVICE_REG_OFFSET: usize = 0x0000_0010; // lw
    pub const WINDOW_OFFSET: usize = 0x0000_0000; // frame
    pub const INPUT_OFFSET: usize = 0x0000_0000; // device
    pub const OUTPUT_OFFSET: usize = 0x0800_0000; // device
}

pub mod artifacts {
    pub const DEFAULT_INPUT: &str = "vhdl_cube_discrete_bin.csv";
    pub const DEFAULT_OUTPUT: &str = "aesa_hps_result.txt";
    pub const DEFAULT_MEMORY_DEVICE: &str = "/dev/mem";
}
