//! Credential keys and their composition
//!
//! A database is unlocked by a composite key built from any mix of a
//! password, a key file and hardware challenge-response providers. Each
//! component reduces to a 32-byte raw key; the composite raw key is the
//! SHA-256 over the components in the order they were added.

use zeroize::Zeroizing;

use crate::crypto::hash::{CryptoHash, HashAlgorithm};
use crate::crypto::kdf::Kdf;
use crate::error::{Error, Result};

/// A password, reduced to the SHA-256 of its UTF-8 bytes.
pub struct PasswordKey {
    raw: Zeroizing<Vec<u8>>,
}

impl PasswordKey {
    pub fn new(password: &str) -> Self {
        Self {
            raw: Zeroizing::new(CryptoHash::hash(
                password.as_bytes(),
                HashAlgorithm::Sha256,
            )),
        }
    }

    pub fn raw_key(&self) -> &[u8] {
        &self.raw
    }
}

/// A key file, reduced to the SHA-256 of its contents.
///
/// TODO: detect the KeePass2 XML key file structure instead of always
/// hashing the raw bytes.
pub struct FileKey {
    raw: Zeroizing<Vec<u8>>,
}

impl FileKey {
    pub fn load(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::Malformed("key file is empty".into()));
        }
        Ok(Self {
            raw: Zeroizing::new(CryptoHash::hash(data, HashAlgorithm::Sha256)),
        })
    }

    pub fn raw_key(&self) -> &[u8] {
        &self.raw
    }
}

/// A hardware token that answers a challenge derived from the KDF seed.
pub trait ChallengeResponse {
    fn challenge(&self, seed: &[u8]) -> Result<Vec<u8>>;
}

/// One component of a composite key.
pub enum Key {
    Password(PasswordKey),
    File(FileKey),
    ChallengeResponse(Box<dyn ChallengeResponse>),
}

/// The ordered collection of credentials used to unlock a database.
pub struct CompositeKey {
    keys: Vec<Key>,
}

impl CompositeKey {
    pub fn new(keys: Vec<Key>) -> Self {
        Self { keys }
    }

    pub fn add_key(&mut self, key: Key) {
        self.keys.push(key);
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The composite raw key: SHA-256 over the static component raws in
    /// insertion order, plus the challenge-response digest when a transform
    /// seed is available.
    pub fn raw_key(&self, transform_seed: Option<&[u8]>) -> Result<Vec<u8>> {
        let mut hash = CryptoHash::new(HashAlgorithm::Sha256);
        for key in &self.keys {
            match key {
                Key::Password(key) => hash.add_data(key.raw_key()),
                Key::File(key) => hash.add_data(key.raw_key()),
                Key::ChallengeResponse(_) => {}
            }
        }

        if let Some(seed) = transform_seed {
            hash.add_data(&self.challenge(seed)?);
        }

        Ok(hash.result())
    }

    /// SHA-256 over all challenge-response answers, empty when no such key
    /// is present.
    fn challenge(&self, seed: &[u8]) -> Result<Vec<u8>> {
        let providers: Vec<&dyn ChallengeResponse> = self
            .keys
            .iter()
            .filter_map(|key| match key {
                Key::ChallengeResponse(provider) => Some(provider.as_ref()),
                _ => None,
            })
            .collect();
        if providers.is_empty() {
            return Ok(Vec::new());
        }

        let mut hash = CryptoHash::new(HashAlgorithm::Sha256);
        for provider in providers {
            let response = Zeroizing::new(provider.challenge(seed)?);
            hash.add_data(&response);
        }
        Ok(hash.result())
    }

    /// Runs the composite raw key through the KDF. The legacy KDBX3 AES-KDF
    /// folds challenge responses into the hash later, so it transforms the
    /// plain raw key; everything newer requires a non-empty transform seed.
    pub fn transform(&self, kdf: &Kdf) -> Result<Vec<u8>> {
        if kdf.is_legacy() {
            let raw = Zeroizing::new(self.raw_key(None)?);
            return kdf.transform(&raw);
        }

        let seed = kdf.seed();
        if seed.is_empty() {
            return Err(Error::SeedEmpty);
        }

        let raw = Zeroizing::new(self.raw_key(Some(seed))?);
        kdf.transform(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::SHA256_SIZE;

    struct FixedResponse(Vec<u8>);

    impl ChallengeResponse for FixedResponse {
        fn challenge(&self, _seed: &[u8]) -> Result<Vec<u8>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn password_key_is_sha256_of_utf8() {
        let key = PasswordKey::new("sample");
        assert_eq!(
            key.raw_key(),
            CryptoHash::hash(b"sample", HashAlgorithm::Sha256)
        );
        assert_eq!(key.raw_key().len(), SHA256_SIZE);
    }

    #[test]
    fn file_key_hashes_contents_and_rejects_empty() {
        let key = FileKey::load(b"binary key material").unwrap();
        assert_eq!(
            key.raw_key(),
            CryptoHash::hash(b"binary key material", HashAlgorithm::Sha256)
        );
        assert!(FileKey::load(&[]).is_err());
    }

    #[test]
    fn composite_raw_key_depends_on_component_order() {
        let ab = CompositeKey::new(vec![
            Key::Password(PasswordKey::new("a")),
            Key::Password(PasswordKey::new("b")),
        ]);
        let ba = CompositeKey::new(vec![
            Key::Password(PasswordKey::new("b")),
            Key::Password(PasswordKey::new("a")),
        ]);
        assert_ne!(ab.raw_key(None).unwrap(), ba.raw_key(None).unwrap());
    }

    #[test]
    fn challenge_response_only_contributes_with_a_seed() {
        let mut with_cr = CompositeKey::new(vec![Key::Password(PasswordKey::new("pw"))]);
        with_cr.add_key(Key::ChallengeResponse(Box::new(FixedResponse(vec![
            0xaa; 20
        ]))));
        let without_cr = CompositeKey::new(vec![Key::Password(PasswordKey::new("pw"))]);

        // No seed: the provider is skipped entirely.
        assert_eq!(
            with_cr.raw_key(None).unwrap(),
            without_cr.raw_key(None).unwrap()
        );

        // With a seed, the response digest is folded in.
        let seed = [0x11u8; 32];
        assert_ne!(
            with_cr.raw_key(Some(&seed)).unwrap(),
            without_cr.raw_key(None).unwrap()
        );

        let expected = {
            let pw_raw = CryptoHash::hash(b"pw", HashAlgorithm::Sha256);
            let cr_digest = CryptoHash::hash(&[0xaa; 20], HashAlgorithm::Sha256);
            CryptoHash::hash_parts(&[&pw_raw, &cr_digest], HashAlgorithm::Sha256)
        };
        assert_eq!(with_cr.raw_key(Some(&seed)).unwrap(), expected);
    }

    #[test]
    fn raw_key_with_seed_but_no_providers_matches_plain_raw_key() {
        let key = CompositeKey::new(vec![Key::Password(PasswordKey::new("pw"))]);
        assert_eq!(
            key.raw_key(Some(&[0x22; 32])).unwrap(),
            key.raw_key(None).unwrap()
        );
    }

    #[test]
    fn transform_requires_a_seed_for_modern_kdfs() {
        let kdf = Kdf::Aes(crate::crypto::kdf::AesKdf::new()); // no seed set
        let key = CompositeKey::new(vec![Key::Password(PasswordKey::new("pw"))]);
        assert!(matches!(key.transform(&kdf), Err(Error::SeedEmpty)));
    }

    #[test]
    fn is_empty_reflects_component_count() {
        assert!(CompositeKey::new(Vec::new()).is_empty());
        assert!(!CompositeKey::new(vec![Key::Password(PasswordKey::new("x"))]).is_empty());
    }
}
