//! Error types for fock-hilbert.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpaceError {
    #[error("configuration needs {required_bits} bits, more than the 64-bit state word")]
    CapacityExceeded { required_bits: u32 },

    #[error("counted dimension {counted} does not match generated state count {generated}")]
    DimensionMismatch { counted: u64, generated: u64 },

    #[error("stabilizer size {stabilizer} does not divide symmetry group order {group_order}")]
    OrbitSizeInvalid { stabilizer: i32, group_order: i32 },

    #[error("symmetry group order {0} exceeds the packed sign word (64 elements)")]
    GroupTooLarge(i32),

    #[error("incompatible quantum numbers: {0}")]
    IncompatibleQuantumNumbers(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("bad magic or unsupported format version {found} (expected {expected})")]
    BadFileFormat { found: u32, expected: u32 },
}

pub type Result<T> = std::result::Result<T, SpaceError>;
