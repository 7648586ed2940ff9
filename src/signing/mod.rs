//! Commitment hashing and signer recovery for Safe accounts

pub mod hasher;
pub mod recover;

pub use hasher::Eip712SafeHasher;
pub use recover::{decode_blob, EcdsaIdentityResolver};
