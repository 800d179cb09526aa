use super::RegisterCell;
use crate::constants::flags;
use log::trace;

/// Bits of the host status register
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostFlag {
    Active = flags::HOST_ACTIVE as isize,
    Resetn = flags::HOST_RESETN as isize,
    Sent = flags::HOST_SENT as isize,
    Received = flags::HOST_RECEIVED as isize,
}

/// Bits of the device status register
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceFlag {
    Idle = flags::DEVICE_IDLE as isize,
    Active = flags::DEVICE_ACTIVE as isize,
    Received = flags::DEVICE_RECEIVED as isize,
    Done = flags::DEVICE_DONE as isize,
}

/// Read-modify-write operation applied to one bit
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlagMode {
    Set,
    Clear,
    Toggle,
}

impl HostFlag {
    pub fn mask(self) -> u8 {
        1 << self as u8
    }
}

impl DeviceFlag {
    pub fn mask(self) -> u8 {
        1 << self as u8
    }
}

impl FlagMode {
    /// Applies the operation for `mask` to a register value
    pub fn apply(self, value: u8, mask: u8) -> u8 {
        match self {
            FlagMode::Set => value | mask,
            FlagMode::Clear => value & !mask,
            FlagMode::Toggle => value ^ mask,
        }
    }
}

/// Register the host owns and the device only reads
///
/// Writes are plain read-modify-write with no locking; that is sound only
/// because nothing else writes this byte.
pub struct HostStatusRegister<C: RegisterCell> {
    cell: Option<C>,
}

impl<C: RegisterCell> HostStatusRegister<C> {
    pub fn new(cell: C) -> Self {
        Self { cell: Some(cell) }
    }

    /// Register with no backing memory; writes are dropped, reads are false
    pub fn unmapped() -> Self {
        Self { cell: None }
    }

    pub fn is_mapped(&self) -> bool {
        self.cell.is_some()
    }

    /// Detaches the backing cell. Later writes become no-ops.
    pub fn unmap(&mut self) -> Option<C> {
        self.cell.take()
    }

    pub fn set_flag(&mut self, flag: HostFlag, mode: FlagMode) {
        let cell = match &mut self.cell {
            Some(cell) => cell,
            None => return,
        };
        let old = cell.load();
        let new = mode.apply(old, flag.mask());
        cell.store(new);
        trace!("host {:?} {:?}: 0x{:02x} -> 0x{:02x}", flag, mode, old, new);
    }

    pub fn flag(&self, flag: HostFlag) -> bool {
        self.raw() & flag.mask() != 0
    }

    pub fn raw(&self) -> u8 {
        match &self.cell {
            Some(cell) => cell.load(),
            None => 0,
        }
    }
}

/// Register the device owns; the host side can only observe it
///
/// There is no way back to the backing cell, so no write can reach it:
///
/// ```compile_fail
/// use aesa_core::memory::shared::SharedCell;
/// use aesa_core::memory::{DeviceStatusRegister, RegisterCell};
///
/// let mut reg = DeviceStatusRegister::new(SharedCell::new(0));
/// reg.unmap().map(|mut cell| cell.store(0x08));
/// ```
pub struct DeviceStatusRegister<C: RegisterCell> {
    cell: Option<C>,
}

impl<C: RegisterCell> DeviceStatusRegister<C> {
    pub fn new(cell: C) -> Self {
        Self { cell: Some(cell) }
    }

    pub fn unmapped() -> Self {
        Self { cell: None }
    }

    pub fn flag(&self, flag: DeviceFlag) -> bool {
        self.raw() & flag.mask() != 0
    }

    pub fn raw(&self) -> u8 {
        match &self.cell {
            Some(cell) => cell.load(),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::shared::SharedCell;
    use crate::memory::RegisterCell;

    const HOST_FLAGS: [HostFlag; 4] = [
        HostFlag::Active,
        HostFlag::Resetn,
        HostFlag::Sent,
        HostFlag::Received,
    ];

    #[test]
    fn set_is_visible_to_the_reader() {
        for flag in HOST_FLAGS.iter().copied() {
            let cell = SharedCell::new(0);
            let mut reg = HostStatusRegister::new(cell.clone());
            reg.set_flag(flag, FlagMode::Set);
            assert_eq!(cell.load(), flag.mask());
            assert!(reg.flag(flag));
        }
    }

    #[test]
    fn clear_removes_only_the_bit() {
        for flag in HOST_FLAGS.iter().copied() {
            let cell = SharedCell::new(0xFF);
            let mut reg = HostStatusRegister::new(cell.clone());
            reg.set_flag(flag, FlagMode::Clear);
            assert_eq!(cell.load(), 0xFF & !flag.mask());
        }
    }

    #[test]
    fn toggle_flips_exactly_one_bit() {
        for start in [0x00u8, 0xA5, 0xFF].iter().copied() {
            for flag in HOST_FLAGS.iter().copied() {
                let cell = SharedCell::new(start);
                let mut reg = HostStatusRegister::new(cell.clone());
                reg.set_flag(flag, FlagMode::Toggle);
                assert_eq!(cell.load() ^ start, flag.mask());
                reg.set_flag(flag, FlagMode::Toggle);
                assert_eq!(cell.load(), start);
            }
        }
    }

    #[test]
    fn clear_twice_is_idempotent() {
        let cell = SharedCell::new(0x0F);
        let mut reg = HostStatusRegister::new(cell.clone());
        reg.set_flag(HostFlag::Resetn, FlagMode::Clear);
        assert_eq!(cell.load(), 0x0D);
        reg.set_flag(HostFlag::Resetn, FlagMode::Clear);
        assert_eq!(cell.load(), 0x0D);
        assert!(!reg.flag(HostFlag::Resetn));
    }

    #[test]
    fn unmapped_registers_are_inert() {
        let mut host: HostStatusRegister<SharedCell> = HostStatusRegister::unmapped();
        host.set_flag(HostFlag::Active, FlagMode::Set);
        assert!(!host.flag(HostFlag::Active));
        assert!(!host.is_mapped());

        let device: DeviceStatusRegister<SharedCell> = DeviceStatusRegister::unmapped();
        assert!(!device.flag(DeviceFlag::Done));
    }

    #[test]
    fn writes_after_unmap_are_dropped() {
        let cell = SharedCell::new(0);
        let mut reg = HostStatusRegister::new(cell.clone());
        assert!(reg.unmap().is_some());
        reg.set_flag(HostFlag::Sent, FlagMode::Set);
        assert_eq!(cell.load(), 0);
    }

    #[test]
    fn device_bits_decode() {
        let mut cell = SharedCell::new(0);
        let reg = DeviceStatusRegister::new(cell.clone());
        cell.store(DeviceFlag::Active.mask() | DeviceFlag::Done.mask());
        assert!(reg.flag(DeviceFlag::Active));
        assert!(reg.flag(DeviceFlag::Done));
        assert!(!reg.flag(DeviceFlag::Idle));
        assert!(!reg.flag(DeviceFlag::Received));
    }
}
