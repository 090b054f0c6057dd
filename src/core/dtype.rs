// This module defines the element types a DLC buffer can hold and their spelling in the
// generated C source. DType is a closed enumeration: every variant has a width in bytes
// and exactly one C type name, so the dtype -> type-name table is total and injective by
// construction. Parsing a dtype name that is not in the enumeration (for example a
// float64 coming from an upstream pass) fails with UnmappedDType instead of falling back
// to some default spelling. The address-unit shift used by DMA descriptors is derived
// from the element width here as well.

//! Element types and their DLC C spellings.

use std::fmt;
use std::str::FromStr;

use super::error::CodegenError;

/// Element type of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float16,
    Float32,
    BFloat16,
}

impl DType {
    /// Every supported element type, in declaration order.
    pub const ALL: [DType; 11] = [
        DType::Int8,
        DType::UInt8,
        DType::Int16,
        DType::UInt16,
        DType::Int32,
        DType::UInt32,
        DType::Int64,
        DType::UInt64,
        DType::Float16,
        DType::Float32,
        DType::BFloat16,
    ];

    /// Width of one element in bytes.
    pub fn bytes(self) -> usize {
        match self {
            DType::Int8 | DType::UInt8 => 1,
            DType::Int16 | DType::UInt16 | DType::Float16 | DType::BFloat16 => 2,
            DType::Int32 | DType::UInt32 | DType::Float32 => 4,
            DType::Int64 | DType::UInt64 => 8,
        }
    }

    pub fn bits(self) -> u32 {
        (self.bytes() * 8) as u32
    }

    /// log2 of the element width, the `addr_unit_shift` of a DMA descriptor.
    pub fn addr_unit_shift(self) -> u32 {
        self.bytes().trailing_zeros()
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::Float16 | DType::Float32 | DType::BFloat16)
    }

    pub fn is_signed_int(self) -> bool {
        matches!(self, DType::Int8 | DType::Int16 | DType::Int32 | DType::Int64)
    }

    pub fn is_unsigned_int(self) -> bool {
        matches!(self, DType::UInt8 | DType::UInt16 | DType::UInt32 | DType::UInt64)
    }

    /// Canonical dtype name used by the upstream IR (e.g. "float32").
    pub fn name(self) -> &'static str {
        match self {
            DType::Int8 => "int8",
            DType::UInt8 => "uint8",
            DType::Int16 => "int16",
            DType::UInt16 => "uint16",
            DType::Int32 => "int32",
            DType::UInt32 => "uint32",
            DType::Int64 => "int64",
            DType::UInt64 => "uint64",
            DType::Float16 => "float16",
            DType::Float32 => "float32",
            DType::BFloat16 => "bfloat16",
        }
    }

    /// C type name understood by the DLC headers.
    pub fn c_type(self) -> &'static str {
        match self {
            DType::Int8 => "int8_t",
            DType::UInt8 => "uint8_t",
            DType::Int16 => "int16_t",
            DType::UInt16 => "uint16_t",
            DType::Int32 => "int",
            DType::UInt32 => "uint32_t",
            DType::Int64 => "int64_t",
            DType::UInt64 => "uint64_t",
            DType::Float16 => "half",
            DType::Float32 => "float",
            DType::BFloat16 => "bfloat16_t",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DType {
    type Err = CodegenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DType::ALL
            .iter()
            .copied()
            .find(|dt| dt.name() == s)
            .ok_or_else(|| CodegenError::UnmappedDType {
                dtype: s.to_string(),
            })
    }
}
