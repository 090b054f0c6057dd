//! DLC memory regions and their numeric encoding.
//!
//! The codes match the `enum { SMEM, HBM, VMEM, CMEM, IMEM, SEMAPHORE }`
//! declared by the DLC headers, so the generator can print either the enum
//! name or the raw code.

use std::fmt;

/// A memory region of the DLC device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AddressSpace {
    /// Shared memory.
    SharedMemory = 0,
    /// High bandwidth (global/device) memory.
    HighBandwidthMemory = 1,
    /// Per-unit vector scratch memory.
    VectorMemory = 2,
    /// Constant memory.
    ConstantMemory = 3,
    /// Instruction memory.
    InstructionMemory = 4,
    /// Storage for sync flags only.
    SemaphoreSpace = 5,
}

impl AddressSpace {
    pub const ALL: [AddressSpace; 6] = [
        AddressSpace::SharedMemory,
        AddressSpace::HighBandwidthMemory,
        AddressSpace::VectorMemory,
        AddressSpace::ConstantMemory,
        AddressSpace::InstructionMemory,
        AddressSpace::SemaphoreSpace,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        AddressSpace::ALL.into_iter().find(|space| space.code() == code)
    }

    /// Enum constant name in the DLC headers.
    pub fn c_name(self) -> &'static str {
        match self {
            AddressSpace::SharedMemory => "SMEM",
            AddressSpace::HighBandwidthMemory => "HBM",
            AddressSpace::VectorMemory => "VMEM",
            AddressSpace::ConstantMemory => "CMEM",
            AddressSpace::InstructionMemory => "IMEM",
            AddressSpace::SemaphoreSpace => "SEMAPHORE",
        }
    }

    /// Declaration qualifier for a local allocation in this space, if any.
    pub fn storage_qualifier(self) -> Option<&'static str> {
        match self {
            AddressSpace::VectorMemory => Some("VMEM_SPACE"),
            AddressSpace::SemaphoreSpace => Some("SEMAPHORE_SPACE"),
            _ => None,
        }
    }

    /// Whether DMA may move data in or out of this space.
    pub fn is_dma_capable(self) -> bool {
        !matches!(self, AddressSpace::SemaphoreSpace)
    }
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.c_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct_and_round_trip() {
        for (expected, space) in AddressSpace::ALL.iter().enumerate() {
            assert_eq!(space.code() as usize, expected);
            assert_eq!(AddressSpace::from_code(space.code()), Some(*space));
        }
        assert_eq!(AddressSpace::from_code(6), None);
    }

    #[test]
    fn test_semaphore_space_is_reserved() {
        assert!(!AddressSpace::SemaphoreSpace.is_dma_capable());
        assert!(AddressSpace::HighBandwidthMemory.is_dma_capable());
        assert_eq!(
            AddressSpace::SemaphoreSpace.storage_qualifier(),
            Some("SEMAPHORE_SPACE")
        );
        assert_eq!(AddressSpace::HighBandwidthMemory.storage_qualifier(), None);
    }
}
