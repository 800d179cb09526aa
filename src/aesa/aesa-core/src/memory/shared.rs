use super::{RegisterCell, WordMemory};
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

/// Heap-backed register byte that can be observed from another thread
///
/// Clones alias the same byte, which is how a software device gets its side
/// of a register.
#[derive(Clone, Debug, Default)]
pub struct SharedCell(Arc<AtomicU8>);

impl SharedCell {
    pub fn new(value: u8) -> Self {
        Self(Arc::new(AtomicU8::new(value)))
    }

    /// Writes through a shared handle; for the simulated device side
    pub fn set(&self, value: u8) {
        self.0.store(value, Ordering::SeqCst)
    }

    /// Atomically ORs `mask` in, but only while every bit of `required` is
    /// set. Returns whether the update happened.
    pub fn set_bits_if(&self, required: u8, mask: u8) -> bool {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |value| {
                if value & required == required {
                    Some(value | mask)
                } else {
                    None
                }
            })
            .is_ok()
    }
}

impl RegisterCell for SharedCell {
    fn load(&self) -> u8 {
        self.0.load(Ordering::SeqCst)
    }

    fn store(&mut self, value: u8) {
        self.0.store(value, Ordering::SeqCst)
    }
}

/// Heap-backed word buffer shared between host and a software device
#[derive(Clone, Debug)]
pub struct SharedWords(Arc<[AtomicU32]>);

impl SharedWords {
    pub fn zeroed(len: usize) -> Self {
        Self((0..len).map(|_| AtomicU32::new(0)).collect())
    }

    pub fn from_slice(words: &[u32]) -> Self {
        Self(words.iter().map(|w| AtomicU32::new(*w)).collect())
    }

    pub fn to_vec(&self) -> Vec<u32> {
        self.0.iter().map(|w| w.load(Ordering::Relaxed)).collect()
    }
}

impl WordMemory for SharedWords {
    fn len(&self) -> usize {
        self.0.len()
    }

    fn read(&self, idx: usize) -> u32 {
        self.0[idx].load(Ordering::Relaxed)
    }

    fn write(&mut self, idx: usize, value: u32) {
        self.0[idx].store(value, Ordering::Relaxed)
    }
}
