//! Bit-packed many-body Hilbert spaces for exact diagonalization.
//!
//! Basis states are `u64` words; each space fixes the conserved quantum
//! numbers (particle number, lattice momentum, spin projection, parity),
//! enumerates its states in strictly descending word order and resolves
//! word → index queries through a two-level lookup table. Creation and
//! annihilation operators act on indices and return the target index with
//! the fermionic sign or bosonic amplitude.
//!
//! Spaces:
//! - [`FermionMomentumSpace`]: spinful fermions on a periodic lattice,
//!   momentum-resolved modes.
//! - [`BosonMomentumSpace`]: bosons with bands, stars-and-bars packed.
//! - [`TranslationFermionSpace`]: real-space fermions reduced by
//!   translations and optional spin-flip parity, one representative per
//!   orbit.
//!
//! [`particle_entanglement`] traces a state over a particle partition.
//! Matrix storage and eigensolvers live in the companion `fock-matrix`
//! crate.

pub mod bits;
pub mod boson_momentum;
pub mod error;
pub mod fermion_momentum;
pub mod lookup;
pub mod particle_entanglement;
pub mod translation;

mod io;

pub use boson_momentum::{BosonAaResult, BosonMomentumSpace};
pub use error::SpaceError;
pub use fermion_momentum::{AaResult, FermionMomentumSpace};
pub use lookup::StateLookup;
pub use particle_entanglement::particle_partition_density_matrix;
pub use translation::{TranslationFermionSpace, TranslationParams};
