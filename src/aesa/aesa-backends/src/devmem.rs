//! Physical memory backend
//!
//! Maps the three bridge windows out of `/dev/mem` and hands out volatile
//! byte and word views into them. Regions are unmapped when dropped, before
//! the memory handle is closed.

use aesa_core::constants::{CUBE_WORDS, WINDOW_SLOTS};
use aesa_core::memory::{MemoryLayout, RegionSpec, RegisterCell, WordMemory};
use aesa_core::Channels;
use log::{debug, info, trace, warn};
use rustix::fs::OFlags;
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use std::fs::{File, OpenOptions};
use std::marker::PhantomData;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MapError>;

#[derive(Debug, Error)]
pub enum MapError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot map {region} window: {source}")]
    Map {
        region: &'static str,
        #[source]
        source: rustix::io::Errno,
    },

    #[error("mmap returned a null address for the {region} window")]
    Null { region: &'static str },

    #[error("{len} bytes at offset 0x{offset:x} exceed the {region} window (span 0x{span:x})")]
    OutOfRange {
        region: &'static str,
        offset: usize,
        len: usize,
        span: usize,
    },

    #[error("offset 0x{offset:x} in the {region} window is not word aligned")]
    Misaligned { region: &'static str, offset: usize },

    #[error("memory layout puts the {0} outside its window")]
    Layout(&'static str),
}

/// Open handle on the physical memory device
#[derive(Debug)]
pub struct DevMem {
    file: File,
    path: PathBuf,
}

impl DevMem {
    /// Opens the device read-write with synchronous access
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(OFlags::SYNC.bits() as i32)
            .open(path)
            .map_err(|source| MapError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        debug!("Opened {}", path.display());
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

/// One shared, read-write mapping of a physical window
#[derive(Debug)]
pub struct MappedRegion {
    ptr: NonNull<u8>,
    spec: RegionSpec,
}

impl MappedRegion {
    pub fn map(mem: &DevMem, spec: RegionSpec) -> Result<Self> {
        // SAFETY: a fresh shared mapping of a valid descriptor; the kernel
        // picks the address and the length is the region span. Unmapped in
        // Drop, and every view borrows the region so none outlives it.
        let addr = unsafe {
            mmap(
                std::ptr::null_mut(),
                spec.span,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                &mem.file,
                spec.base,
            )
        }
        .map_err(|source| MapError::Map {
            region: spec.name,
            source,
        })?;
        let ptr = NonNull::new(addr.cast::<u8>()).ok_or(MapError::Null { region: spec.name })?;

        info!(
            "Mapped {} window 0x{:08x}+0x{:x} at {:p}",
            spec.name, spec.base, spec.span, ptr
        );
        Ok(Self { ptr, spec })
    }

    fn check(&self, offset: usize, len: usize) -> Result<()> {
        if self.spec.contains(offset, len) {
            Ok(())
        } else {
            Err(MapError::OutOfRange {
                region: self.spec.name,
                offset,
                len,
                span: self.spec.span,
            })
        }
    }

    /// Single register byte at `offset`
    pub fn byte(&self, offset: usize) -> Result<MmioByte<'_>> {
        self.check(offset, 1)?;
        Ok(MmioByte {
            // SAFETY: offset is inside the mapping (checked above)
            ptr: unsafe { self.ptr.as_ptr().add(offset) },
            _region: PhantomData,
        })
    }

    /// `count` consecutive 32-bit words starting at `offset`
    pub fn words(&self, offset: usize, count: usize) -> Result<MmioWords<'_>> {
        if offset % std::mem::align_of::<u32>() != 0 {
            return Err(MapError::Misaligned {
                region: self.spec.name,
                offset,
            });
        }
        self.check(offset, count * std::mem::size_of::<u32>())?;
        Ok(MmioWords {
            // SAFETY: the whole range is inside the mapping and aligned
            ptr: unsafe { self.ptr.as_ptr().add(offset).cast::<u32>() },
            len: count,
            _region: PhantomData,
        })
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // SAFETY: ptr/span are exactly what mmap returned; Drop runs once
        match unsafe { munmap(self.ptr.as_ptr().cast(), self.spec.span) } {
            Ok(()) => debug!("Unmapped {} window", self.spec.name),
            Err(e) => warn!("munmap of {} window failed: {}", self.spec.name, e),
        }
    }
}

/// Volatile view of one register byte
pub struct MmioByte<'a> {
    ptr: *mut u8,
    _region: PhantomData<&'a MappedRegion>,
}

impl<'a> RegisterCell for MmioByte<'a> {
    fn load(&self) -> u8 {
        // SAFETY: ptr points into a live mapping borrowed for 'a
        unsafe { self.ptr.read_volatile() }
    }

    fn store(&mut self, value: u8) {
        // SAFETY: as above; the host is the only writer of this byte
        unsafe { self.ptr.write_volatile(value) }
    }
}

/// Host status byte detached from the mapping's borrow
///
/// Lets the interrupt handler thread clear RESETN on a forced exit.
pub struct ResetLine {
    ptr: NonNull<u8>,
}

// SAFETY: a device register byte, touched only with volatile accesses
unsafe impl Send for ResetLine {}

impl RegisterCell for ResetLine {
    fn load(&self) -> u8 {
        // SAFETY: the creator of the line keeps the mapping alive
        unsafe { self.ptr.as_ptr().read_volatile() }
    }

    fn store(&mut self, value: u8) {
        // SAFETY: as in load
        unsafe { self.ptr.as_ptr().write_volatile(value) }
    }
}

/// Volatile view of a word buffer
pub struct MmioWords<'a> {
    ptr: *mut u32,
    len: usize,
    _region: PhantomData<&'a MappedRegion>,
}

impl<'a> WordMemory for MmioWords<'a> {
    fn len(&self) -> usize {
        self.len
    }

    fn read(&self, idx: usize) -> u32 {
        assert!(idx < self.len, "word {} past buffer of {}", idx, self.len);
        // SAFETY: idx is in bounds of a live, aligned mapping
        unsafe { self.ptr.add(idx).read_volatile() }
    }

    fn write(&mut self, idx: usize, value: u32) {
        assert!(idx < self.len, "word {} past buffer of {}", idx, self.len);
        // SAFETY: as in read
        unsafe { self.ptr.add(idx).write_volatile(value) }
    }
}

pub type MmioChannels<'a> = Channels<MmioByte<'a>, MmioByte<'a>, MmioWords<'a>>;

/// The memory handle and the three bridge windows
///
/// Field order is drop order: regions are unmapped first, then the handle
/// is closed.
pub struct Mapping {
    lw: MappedRegion,
    frame: MappedRegion,
    device: MappedRegion,
    layout: MemoryLayout,
    mem: DevMem,
}

impl Mapping {
    pub fn open(path: &Path, layout: MemoryLayout) -> Result<Self> {
        layout.validate().map_err(MapError::Layout)?;
        let mem = DevMem::open(path)?;
        let lw = MappedRegion::map(&mem, layout.lw)?;
        let frame = MappedRegion::map(&mem, layout.frame)?;
        let device = MappedRegion::map(&mem, layout.device)?;
        Ok(Self {
            lw,
            frame,
            device,
            layout,
            mem,
        })
    }

    /// Register and buffer views for one protocol run
    pub fn channels(&self) -> Result<MmioChannels<'_>> {
        let layout = &self.layout;
        trace!("Building channels from {:?}", layout);
        Ok(Channels::new(
            self.lw.byte(layout.host_reg)?,
            self.lw.byte(layout.device_reg)?,
            self.device.words(layout.input, CUBE_WORDS)?,
            self.frame.words(layout.window, WINDOW_SLOTS)?,
            self.device.words(layout.output, CUBE_WORDS)?,
        ))
    }

    /// Second handle on the host status register
    ///
    /// # Safety
    ///
    /// The line must not be used once this mapping is released or dropped.
    pub unsafe fn reset_line(&self) -> Result<ResetLine> {
        let host = self.lw.byte(self.layout.host_reg)?;
        let region = self.layout.lw.name;
        let ptr = NonNull::new(host.ptr).ok_or(MapError::Null { region })?;
        Ok(ResetLine { ptr })
    }

    /// Unmaps every window and closes the handle
    pub fn release(self) {
        let path = self.mem.path.clone();
        drop(self);
        info!("Released {}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_device_is_an_open_error() {
        let err = DevMem::open(Path::new("/nonexistent/aesa-mem")).unwrap_err();
        assert!(matches!(err, MapError::Open { .. }));
    }

    #[test]
    fn bad_layout_is_rejected_before_open() {
        let mut layout = MemoryLayout::default();
        layout.device_reg = layout.lw.span;
        match Mapping::open(Path::new("/nonexistent/aesa-mem"), layout) {
            Err(MapError::Layout(what)) => assert_eq!(what, "device status register"),
            Err(other) => panic!("unexpected {:?}", other),
            Ok(_) => panic!("layout accepted"),
        }
    }
}
