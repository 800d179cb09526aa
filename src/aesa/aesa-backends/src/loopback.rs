//! In-process stand-in for the FPGA
//!
//! Follows the device half of the flag protocol against heap memory, so the
//! host handshake can be run end to end without hardware. Reactions to host
//! register writes (reset, start, acknowledgment) happen synchronously inside
//! the write, the way the fabric answers within a bus cycle; completion comes
//! from a worker thread after `done_after`.

use aesa_core::constants::{CUBE_WORDS, WINDOW_SLOTS, WORDS_PER_RECORD};
use aesa_core::memory::shared::{SharedCell, SharedWords};
use aesa_core::memory::{DeviceFlag, HostFlag, RegisterCell, WordMemory};
use aesa_core::Channels;
use log::{debug, info};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

// Results carry 20 significant bits (five hex digits)
const RESULT_MASK: u32 = 0x000F_FFFF;

/// How the simulated device behaves
#[derive(Clone, Copy, Debug)]
pub struct LoopbackConfig {
    pub start: bool,          // Raise ACTIVE when released from reset
    pub ack: bool,            // Raise RECEIVED on SENT
    pub done_after: Duration, // Processing time before DONE
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            start: true,
            ack: true,
            done_after: Duration::from_millis(1),
        }
    }
}

struct DeviceCore {
    config: LoopbackConfig,
    status: SharedCell,
    input: SharedWords,
    output: SharedWords,
    host_writes: AtomicUsize,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl DeviceCore {
    fn on_host_write(&self, host: u8) {
        self.host_writes.fetch_add(1, Ordering::SeqCst);
        let status = self.status.load();
        let has = |flag: DeviceFlag| status & flag.mask() != 0;
        let host_has = |flag: HostFlag| host & flag.mask() != 0;

        if !host_has(HostFlag::Resetn) {
            if status != DeviceFlag::Idle.mask() {
                debug!("Loopback held in reset");
            }
            self.status.set(DeviceFlag::Idle.mask());
            return;
        }

        if host_has(HostFlag::Active) && !has(DeviceFlag::Active) && self.config.start {
            debug!("Loopback active");
            self.status.set(DeviceFlag::Active.mask());
            return;
        }

        if host_has(HostFlag::Sent) && has(DeviceFlag::Active) && !has(DeviceFlag::Received) {
            if self.config.ack {
                debug!("Loopback received");
                self.status.set(status | DeviceFlag::Received.mask());
                self.spawn_worker();
            }
            return;
        }

        if host_has(HostFlag::Received) && has(DeviceFlag::Done) {
            debug!("Loopback idle");
            self.status.set(DeviceFlag::Idle.mask());
        }
    }

    fn spawn_worker(&self) {
        let status = self.status.clone();
        let input = self.input.clone();
        let mut output = self.output.clone();
        let done_after = self.config.done_after;

        let handle = std::thread::spawn(move || {
            let deadline = Instant::now() + done_after;
            loop {
                if !is_active(&status) {
                    return;
                }
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                std::thread::sleep((deadline - now).min(Duration::from_millis(1)));
            }
            if complete(&status, &input, &mut output) {
                info!("Loopback done");
            } else {
                debug!("Loopback job abandoned on reset");
            }
        });

        if let Ok(mut workers) = self.workers.lock() {
            workers.push(handle);
        }
    }
}

fn is_active(status: &SharedCell) -> bool {
    status.load() & DeviceFlag::Active.mask() != 0
}

/// Writes the results and raises DONE, unless a reset lands first
///
/// ACTIVE is re-checked per record while writing, and DONE is only raised
/// in the same atomic update that still sees ACTIVE.
fn complete(status: &SharedCell, input: &SharedWords, output: &mut SharedWords) -> bool {
    let words = input.len().min(output.len());
    for idx in 0..words {
        if idx % WORDS_PER_RECORD == 0 && !is_active(status) {
            return false;
        }
        output.write(idx, input.read(idx) & RESULT_MASK);
    }
    let active = DeviceFlag::Active.mask();
    status.set_bits_if(active, DeviceFlag::Done.mask())
}

/// Host status register as wired to the loopback device
pub struct HostPort {
    cell: SharedCell,
    core: Arc<DeviceCore>,
}

impl RegisterCell for HostPort {
    fn load(&self) -> u8 {
        self.cell.load()
    }

    fn store(&mut self, value: u8) {
        self.cell.store(value);
        self.core.on_host_write(value);
    }
}

pub type LoopbackChannels = Channels<HostPort, SharedCell, SharedWords>;

/// Software device plus the shared memory it exposes
pub struct LoopbackDevice {
    core: Arc<DeviceCore>,
    host: SharedCell,
    window: SharedWords,
}

impl LoopbackDevice {
    pub fn new(config: LoopbackConfig) -> Self {
        let core = DeviceCore {
            config,
            status: SharedCell::new(DeviceFlag::Idle.mask()),
            input: SharedWords::zeroed(CUBE_WORDS),
            output: SharedWords::zeroed(CUBE_WORDS),
            host_writes: AtomicUsize::new(0),
            workers: Mutex::new(Vec::new()),
        };
        Self {
            core: Arc::new(core),
            host: SharedCell::new(0),
            window: SharedWords::zeroed(WINDOW_SLOTS),
        }
    }

    /// Host-side view of the device's registers and memory
    pub fn channels(&self) -> LoopbackChannels {
        Channels::new(
            self.host_port(),
            self.core.status.clone(),
            self.core.input.clone(),
            self.window.clone(),
            self.core.output.clone(),
        )
    }

    /// Another handle on the host register, wired to the device like the
    /// one in `channels`
    pub fn host_port(&self) -> HostPort {
        HostPort {
            cell: self.host.clone(),
            core: Arc::clone(&self.core),
        }
    }

    pub fn host_status(&self) -> u8 {
        self.host.load()
    }

    pub fn device_status(&self) -> u8 {
        self.core.status.load()
    }

    /// Number of host register writes observed so far
    pub fn host_writes(&self) -> usize {
        self.core.host_writes.load(Ordering::SeqCst)
    }

    pub fn output(&self) -> Vec<u32> {
        self.core.output.to_vec()
    }

    /// Waits for any in-flight processing to finish
    pub fn join(&self) {
        let workers = match self.core.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(_) => return,
        };
        for worker in workers {
            let _ = worker.join();
        }
    }
}

impl Drop for LoopbackDevice {
    fn drop(&mut self) {
        self.join();
    }
}
