//! Cryptographic primitives behind the KDBX4 pipeline.

pub mod cipher;
pub mod hash;
pub mod kdf;
