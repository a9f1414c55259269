//! MPU sub-region manager.
//!
//! The RAM partition used for task stacks and heap allocations is split into
//! five fixed regions of eight sub-regions each (512 or 1024 bytes per
//! sub-region), addressed in region-major order by a 64-bit bitmap (5
//! regions * 8 bits = 40 meaningful bits).
//!
//! Two distinct types exist on purpose, per the design note in spec §9:
//! `SrdPermissionMask` is a *permission* bitmap (bit set = allowed), stored
//! in every TCB. `SrdDisableMask` is the hardware-facing *disable* bitmap
//! (bit set = disabled) that actually gets written into the MPU's SRD
//! fields. `apply_mask` is the only place the inversion between the two
//! happens; nothing else in the kernel is allowed to build a disable mask
//! directly.

use core::ptr::{read_volatile, write_volatile};

/// One of the five SRAM sub-windows the heap allocator and task stacks live
/// in. Base addresses are derived from `HEAP_PARTITION_BASE`, matching the
/// contiguous 4K/8K/4K/4K/8K layout of the original memory manager.
#[derive(Copy, Clone)]
pub struct Region {
    pub base: u32,
    pub subregion_size: u32,
}

pub const SUBREGIONS_PER_REGION: u8 = 8;
pub const NUM_REGIONS: usize = 5;
pub const TOTAL_SUBREGIONS: usize = NUM_REGIONS * SUBREGIONS_PER_REGION as usize;

pub const REGIONS: [Region; NUM_REGIONS] = {
    use crate::config::HEAP_PARTITION_BASE as BASE;
    [
        Region { base: BASE, subregion_size: 512 },
        Region { base: BASE + 0x1000, subregion_size: 1024 },
        Region { base: BASE + 0x3000, subregion_size: 512 },
        Region { base: BASE + 0x4000, subregion_size: 512 },
        Region { base: BASE + 0x5000, subregion_size: 1024 },
    ]
};

/// Index of the region (0..NUM_REGIONS) a byte address falls into, if any.
pub fn region_of_address(addr: u32) -> Option<usize> {
    REGIONS.iter().position(|r| {
        let span = r.subregion_size * SUBREGIONS_PER_REGION as u32;
        addr >= r.base && addr < r.base + span
    })
}

/// Flat sub-region index (0..TOTAL_SUBREGIONS) a byte address starts at.
pub fn subregion_of_address(addr: u32) -> Option<usize> {
    let region_idx = region_of_address(addr)?;
    let region = REGIONS[region_idx];
    let offset = (addr - region.base) / region.subregion_size;
    Some(region_idx * SUBREGIONS_PER_REGION as usize + offset as usize)
}

/// Base address of a flat sub-region index.
pub fn address_of_subregion(index: usize) -> u32 {
    let region_idx = index / SUBREGIONS_PER_REGION as usize;
    let sub_idx = (index % SUBREGIONS_PER_REGION as usize) as u32;
    let region = REGIONS[region_idx];
    region.base + sub_idx * region.subregion_size
}

/// Permission bitmap stored per task: bit set means the task may access
/// that sub-region.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct SrdPermissionMask(pub u64);

impl SrdPermissionMask {
    pub const fn none() -> Self {
        SrdPermissionMask(0)
    }

    pub fn set_bit(&mut self, index: usize) {
        self.0 |= 1u64 << index;
    }

    pub fn clear_bit(&mut self, index: usize) {
        self.0 &= !(1u64 << index);
    }

    pub fn is_set(&self, index: usize) -> bool {
        (self.0 >> index) & 1 != 0
    }

    pub fn merge(&mut self, other: SrdPermissionMask) {
        self.0 |= other.0;
    }
}

/// Hardware-facing disable bitmap: bit set means that sub-region's access
/// is disabled. Only ever produced from a `SrdPermissionMask` by inversion.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct SrdDisableMask(pub u64);

impl From<SrdPermissionMask> for SrdDisableMask {
    fn from(perm: SrdPermissionMask) -> Self {
        // Only the 40 meaningful bits are inverted; the rest stay zero so
        // they never spuriously assert a disable bit outside the managed
        // regions.
        let meaningful = (1u64 << TOTAL_SUBREGIONS) - 1;
        SrdDisableMask(!perm.0 & meaningful)
    }
}

/// `createNoAccessMask()` — an empty permission mask.
pub fn create_no_access_mask() -> SrdPermissionMask {
    SrdPermissionMask::none()
}

/// `addWindow(mask, base, size)` — permit access to the sub-regions
/// spanned by `[base, base+size)`, accumulating into `mask`.
pub fn add_window(mask: &mut SrdPermissionMask, base: u32, size: u32) {
    let Some(start) = subregion_of_address(base) else {
        return;
    };
    let region_idx = start / SUBREGIONS_PER_REGION as usize;
    let subregion_size = REGIONS[region_idx].subregion_size;
    let count = size.div_ceil(subregion_size) as usize;
    for i in start..(start + count).min(TOTAL_SUBREGIONS) {
        mask.set_bit(i);
    }
}

/// `setWindow(base, size)` — convenience for `addWindow` against an empty mask.
pub fn set_window(base: u32, size: u32) -> SrdPermissionMask {
    let mut mask = create_no_access_mask();
    add_window(&mut mask, base, size);
    mask
}

// ---- MPU register programming ----
// STM32F407 (Cortex-M4) MPU register block, per the ARMv7-M MPU
// architecture: TYPE, CTRL, RNR, RBAR, RASR.

const MPU_TYPE: *mut u32 = 0xE000_ED90 as *mut u32;
const MPU_CTRL: *mut u32 = 0xE000_ED94 as *mut u32;
const MPU_RNR: *mut u32 = 0xE000_ED98 as *mut u32;
const MPU_RBAR: *mut u32 = 0xE000_ED9C as *mut u32;
const MPU_RASR: *mut u32 = 0xE000_EDA0 as *mut u32;

const MPU_CTRL_ENABLE: u32 = 1 << 0;
const MPU_CTRL_PRIVDEFENA: u32 = 1 << 2;
const MPU_RASR_ENABLE: u32 = 1 << 0;
const MPU_RASR_XN: u32 = 1 << 28;
const MPU_RASR_AP_FULL: u32 = 0b011 << 24;
const MPU_RASR_SRD_SHIFT: u32 = 8;

/// Static MPU region numbers, assigned once at boot and never reprogrammed
/// per-task. Regions 3..7 are the five SRAM sub-windows this module manages.
const REGION_BACKGROUND: u32 = 0;
const REGION_FLASH: u32 = 1;
const REGION_PERIPHERALS: u32 = 2;
const REGION_SRAM_FIRST: u32 = 3;

fn region_size_field(bytes: u32) -> u32 {
    // RASR.SIZE encodes region size as 2^(SIZE+1) bytes; SIZE >= 4.
    let mut size_field = 4u32;
    while (1u32 << (size_field + 1)) < bytes && size_field < 31 {
        size_field += 1;
    }
    size_field
}

unsafe fn program_region(number: u32, base: u32, size_field: u32, attrs: u32) {
    unsafe {
        write_volatile(MPU_RNR, number);
        write_volatile(MPU_RBAR, base & !0x1F);
        write_volatile(
            MPU_RASR,
            attrs | (size_field << 1) | MPU_RASR_ENABLE,
        );
    }
}

/// Programs the three static regions (deny-all background, executable
/// flash, and the five SRAM windows with an all-disabled SRD byte) and
/// enables the MPU. Called once at startup; never repeated.
pub fn init_static_regions() {
    unsafe {
        // Background: deny all, execute-never.
        program_region(
            REGION_BACKGROUND,
            0x0000_0000,
            region_size_field(0xFFFF_FFFF),
            MPU_RASR_XN,
        );

        // Flash: executable, read-only to unprivileged code, full size.
        program_region(
            REGION_FLASH,
            0x0000_0000,
            region_size_field(256 * 1024),
            MPU_RASR_AP_FULL,
        );

        let _ = REGION_PERIPHERALS; // reserved for a peripheral window; no peripherals mapped in this build.

        for (i, region) in REGIONS.iter().enumerate() {
            let span = region.subregion_size * SUBREGIONS_PER_REGION as u32;
            program_region(
                REGION_SRAM_FIRST + i as u32,
                region.base,
                region_size_field(span),
                MPU_RASR_XN | MPU_RASR_AP_FULL | (0xFFu32 << MPU_RASR_SRD_SHIFT),
            );
        }

        let ctrl = read_volatile(MPU_CTRL);
        write_volatile(MPU_CTRL, ctrl | MPU_CTRL_ENABLE | MPU_CTRL_PRIVDEFENA);
        let _ = read_volatile(MPU_TYPE);
    }
}

/// `applyMask(mask)` — programs each of the five SRAM regions' SRD byte
/// from the task's permission mask. The only place permission bits are
/// inverted into hardware disable bits.
pub fn apply_mask(mask: SrdPermissionMask) {
    let disable = SrdDisableMask::from(mask);
    for region in 0..NUM_REGIONS {
        let byte = ((disable.0 >> (region * 8)) & 0xFF) as u32;
        unsafe {
            write_volatile(MPU_RNR, REGION_SRAM_FIRST + region as u32);
            let rasr = read_volatile(MPU_RASR);
            let cleared = rasr & !(0xFFu32 << MPU_RASR_SRD_SHIFT);
            write_volatile(MPU_RASR, cleared | (byte << MPU_RASR_SRD_SHIFT));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disable_mask_inverts_permission_bits() {
        let mut perm = SrdPermissionMask::none();
        perm.set_bit(0);
        perm.set_bit(5);
        let disable = SrdDisableMask::from(perm);
        assert!(!((disable.0 >> 0) & 1 != 0));
        assert!((disable.0 >> 1) & 1 != 0);
        assert!(!((disable.0 >> 5) & 1 != 0));
    }

    #[test]
    fn add_window_sets_contiguous_bits() {
        let base = REGIONS[0].base;
        let mut mask = create_no_access_mask();
        add_window(&mut mask, base, 512 * 3);
        assert!(mask.is_set(0));
        assert!(mask.is_set(1));
        assert!(mask.is_set(2));
        assert!(!mask.is_set(3));
    }

    #[test]
    fn set_window_matches_add_window_from_empty() {
        let base = REGIONS[1].base + REGIONS[1].subregion_size;
        let a = set_window(base, 1024);
        let mut b = create_no_access_mask();
        add_window(&mut b, base, 1024);
        assert_eq!(a, b);
    }

    #[test]
    fn subregion_roundtrips_through_address() {
        for idx in 0..TOTAL_SUBREGIONS {
            let addr = address_of_subregion(idx);
            assert_eq!(subregion_of_address(addr), Some(idx));
        }
    }
}
