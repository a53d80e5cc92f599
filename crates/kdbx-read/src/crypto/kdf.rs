//! Key derivation functions
//!
//! KDBX4 stores the KDF choice and its parameters in the outer header's
//! variant map. Two families exist: the AES-KDF (repeated AES-256-ECB over
//! the composite key, then SHA-256) and Argon2 (d and id variants).
//! Parameter processing is fail-closed: any missing, mistyped or
//! out-of-range parameter leaves the KDF unusable.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes256;
use argon2::{Algorithm, Argon2, Params, Version};
use zeroize::Zeroizing;

use crate::crypto::hash::{CryptoHash, HashAlgorithm, SHA256_SIZE};
use crate::error::{Error, Result};
use crate::keepass2::{
    KDFPARAM_AES_ROUNDS, KDFPARAM_AES_SEED, KDFPARAM_ARGON2_ITERATIONS, KDFPARAM_ARGON2_MEMORY,
    KDFPARAM_ARGON2_PARALLELISM, KDFPARAM_ARGON2_SALT, KDFPARAM_ARGON2_VERSION, KDF_AES_KDBX3,
    KDF_AES_KDBX4, KDF_ARGON2D, KDF_ARGON2ID,
};
use crate::variant::VariantMap;

pub const KDF_MIN_SEED_SIZE: usize = 8;
pub const KDF_MAX_SEED_SIZE: usize = 32;

// 2^53 - 1, the largest round count older KeePass tooling can represent.
const KDF_MAX_ROUNDS: u64 = (1 << 53) - 1;

/// A parameterized KDF, ready to transform a composite key.
#[derive(Debug, Clone)]
pub enum Kdf {
    Aes(AesKdf),
    Argon2(Argon2Kdf),
}

impl Kdf {
    pub fn uuid(&self) -> uuid::Uuid {
        match self {
            Kdf::Aes(kdf) => kdf.uuid(),
            Kdf::Argon2(kdf) => kdf.uuid(),
        }
    }

    pub fn seed(&self) -> &[u8] {
        match self {
            Kdf::Aes(kdf) => &kdf.seed,
            Kdf::Argon2(kdf) => &kdf.salt,
        }
    }

    pub fn rounds(&self) -> u64 {
        match self {
            Kdf::Aes(kdf) => kdf.rounds,
            Kdf::Argon2(kdf) => kdf.iterations,
        }
    }

    /// True when the KDF predates the KDBX4 parameter map.
    pub fn is_legacy(&self) -> bool {
        matches!(self, Kdf::Aes(kdf) if kdf.legacy)
    }

    /// Absorbs the header's KDF parameters. Returns false when any required
    /// parameter is missing or out of range.
    pub fn process_parameters(&mut self, map: &VariantMap) -> bool {
        match self {
            Kdf::Aes(kdf) => kdf.process_parameters(map),
            Kdf::Argon2(kdf) => kdf.process_parameters(map),
        }
    }

    /// Derives the transformed key from a raw composite key.
    pub fn transform(&self, raw: &[u8]) -> Result<Vec<u8>> {
        match self {
            Kdf::Aes(kdf) => kdf.transform(raw),
            Kdf::Argon2(kdf) => kdf.transform(raw),
        }
    }
}

fn seed_in_bounds(seed: &[u8]) -> bool {
    (KDF_MIN_SEED_SIZE..=KDF_MAX_SEED_SIZE).contains(&seed.len())
}

fn rounds_in_bounds(rounds: u64) -> bool {
    (1..=KDF_MAX_ROUNDS).contains(&rounds)
}

/// The AES key derivation function, in its KDBX3 and KDBX4 guises.
#[derive(Debug, Clone)]
pub struct AesKdf {
    legacy: bool,
    seed: Zeroizing<Vec<u8>>,
    rounds: u64,
}

impl AesKdf {
    pub fn new() -> Self {
        Self {
            legacy: false,
            seed: Zeroizing::new(Vec::new()),
            rounds: 0,
        }
    }

    /// The KDBX3 variant, whose seed and rounds arrive through dedicated
    /// header fields rather than a parameter map.
    pub fn legacy() -> Self {
        Self {
            legacy: true,
            ..Self::new()
        }
    }

    pub fn uuid(&self) -> uuid::Uuid {
        if self.legacy {
            KDF_AES_KDBX3
        } else {
            KDF_AES_KDBX4
        }
    }

    pub fn set_seed(&mut self, seed: &[u8]) -> bool {
        if !seed_in_bounds(seed) {
            return false;
        }
        self.seed = Zeroizing::new(seed.to_vec());
        true
    }

    pub fn set_rounds(&mut self, rounds: u64) -> bool {
        if !rounds_in_bounds(rounds) {
            return false;
        }
        self.rounds = rounds;
        true
    }

    fn process_parameters(&mut self, map: &VariantMap) -> bool {
        let Some(rounds) = map.get_u64(KDFPARAM_AES_ROUNDS) else {
            return false;
        };
        if !self.set_rounds(rounds) {
            return false;
        }
        match map.get_bytes(KDFPARAM_AES_SEED) {
            Some(seed) => self.set_seed(seed),
            None => false,
        }
    }

    fn transform(&self, raw: &[u8]) -> Result<Vec<u8>> {
        if raw.len() != SHA256_SIZE {
            return Err(Error::InvalidKeyLength {
                expected: SHA256_SIZE,
                actual: raw.len(),
            });
        }
        if self.seed.len() != 32 {
            return Err(Error::InvalidKeyLength {
                expected: 32,
                actual: self.seed.len(),
            });
        }
        if !rounds_in_bounds(self.rounds) {
            return Err(Error::RoundsTooLarge(self.rounds));
        }

        let cipher = Aes256::new_from_slice(&self.seed)
            .map_err(|e| Error::KdfFailure(format!("AES-KDF init failed: {e}")))?;

        let mut state = Zeroizing::new([0u8; 32]);
        state.copy_from_slice(raw);
        for _ in 0..self.rounds {
            let (lo, hi) = state.split_at_mut(16);
            cipher.encrypt_block(GenericArray::from_mut_slice(lo));
            cipher.encrypt_block(GenericArray::from_mut_slice(hi));
        }

        Ok(CryptoHash::hash(&state[..], HashAlgorithm::Sha256))
    }
}

impl Default for AesKdf {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Argon2Type {
    Argon2d,
    Argon2id,
}

pub const ARGON2_VERSION_10: u32 = 0x10;
pub const ARGON2_VERSION_13: u32 = 0x13;

const ARGON2_MAX_PARALLELISM: u32 = 1 << 24;

/// Argon2d/Argon2id as KDBX4 parameterizes it. Memory arrives in bytes on
/// the wire and is held in KiB here.
#[derive(Debug, Clone)]
pub struct Argon2Kdf {
    kind: Argon2Type,
    salt: Zeroizing<Vec<u8>>,
    version: u32,
    parallelism: u32,
    memory_kib: u64,
    iterations: u64,
}

impl Argon2Kdf {
    pub fn new(kind: Argon2Type) -> Self {
        Self {
            kind,
            salt: Zeroizing::new(Vec::new()),
            version: ARGON2_VERSION_13,
            parallelism: 1,
            memory_kib: 0,
            iterations: 0,
        }
    }

    pub fn uuid(&self) -> uuid::Uuid {
        match self.kind {
            Argon2Type::Argon2d => KDF_ARGON2D,
            Argon2Type::Argon2id => KDF_ARGON2ID,
        }
    }

    fn set_version(&mut self, version: u32) -> bool {
        if (ARGON2_VERSION_10..=ARGON2_VERSION_13).contains(&version) {
            self.version = version;
            return true;
        }
        false
    }

    fn set_parallelism(&mut self, lanes: u32) -> bool {
        if (1..ARGON2_MAX_PARALLELISM).contains(&lanes) {
            self.parallelism = lanes;
            return true;
        }
        false
    }

    fn set_memory(&mut self, kibibytes: u64) -> bool {
        if (8..1u64 << 32).contains(&kibibytes) {
            self.memory_kib = kibibytes;
            return true;
        }
        false
    }

    fn process_parameters(&mut self, map: &VariantMap) -> bool {
        let salt_ok = match map.get_bytes(KDFPARAM_ARGON2_SALT) {
            Some(salt) if seed_in_bounds(salt) => {
                self.salt = Zeroizing::new(salt.to_vec());
                true
            }
            _ => false,
        };
        if !salt_ok {
            return false;
        }

        let Some(version) = map.get_u32(KDFPARAM_ARGON2_VERSION) else {
            return false;
        };
        if !self.set_version(version) {
            return false;
        }

        let Some(lanes) = map.get_u32(KDFPARAM_ARGON2_PARALLELISM) else {
            return false;
        };
        if !self.set_parallelism(lanes) {
            return false;
        }

        // The wire value is in bytes.
        let Some(memory_bytes) = map.get_u64(KDFPARAM_ARGON2_MEMORY) else {
            return false;
        };
        if !self.set_memory(memory_bytes / 1024) {
            return false;
        }

        let Some(iterations) = map.get_u64(KDFPARAM_ARGON2_ITERATIONS) else {
            return false;
        };
        if !rounds_in_bounds(iterations) {
            return false;
        }
        self.iterations = iterations;
        true
    }

    fn transform(&self, raw: &[u8]) -> Result<Vec<u8>> {
        let iterations =
            u32::try_from(self.iterations).map_err(|_| Error::RoundsTooLarge(self.iterations))?;
        let memory_kib =
            u32::try_from(self.memory_kib).map_err(|_| Error::MemoryTooLarge(self.memory_kib))?;

        let algorithm = match self.kind {
            Argon2Type::Argon2d => Algorithm::Argon2d,
            Argon2Type::Argon2id => Algorithm::Argon2id,
        };
        let version = Version::try_from(self.version)
            .map_err(|_| Error::KdfFailure(format!("unsupported Argon2 version {:#x}", self.version)))?;
        let params = Params::new(memory_kib, iterations, self.parallelism, Some(SHA256_SIZE))
            .map_err(|e| Error::KdfFailure(format!("invalid Argon2 parameters: {e}")))?;

        let mut out = vec![0u8; SHA256_SIZE];
        Argon2::new(algorithm, version, params)
            .hash_password_into(raw, &self.salt, &mut out)
            .map_err(|e| Error::KdfFailure(format!("Argon2 failed: {e}")))?;
        Ok(out)
    }
}
