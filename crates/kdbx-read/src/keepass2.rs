//! KeePass 2 format constants and shared helpers
//!
//! Magic words, version masks, cipher and KDF uuids, header field ids and
//! the HMAC key schedule shared by the header check and the block stream.

use uuid::{uuid, Uuid};

use crate::crypto::hash::{CryptoHash, HashAlgorithm};
use crate::crypto::kdf::{AesKdf, Argon2Kdf, Argon2Type, Kdf};
use crate::variant::VariantMap;

pub const SIGNATURE_1: u32 = 0x9aa2_d903;
pub const SIGNATURE_2: u32 = 0xb54b_fb67;

pub const FILE_VERSION_4_1: u32 = 0x0004_0001;
pub const FILE_VERSION_4: u32 = 0x0004_0000;
pub const FILE_VERSION_3_1: u32 = 0x0003_0001;
pub const FILE_VERSION_CRITICAL_MASK: u32 = 0xffff_0000;

pub const VARIANTMAP_VERSION: u16 = 0x0100;
pub const VARIANTMAP_CRITICAL_MASK: u16 = 0xff00;

pub const UUID_SIZE: usize = 16;

pub const CIPHER_AES128: Uuid = uuid!("61ab05a1-9464-41c3-8d74-3a563df8dd35");
pub const CIPHER_AES256: Uuid = uuid!("31c1f2e6-bf71-4350-be58-05216afc5aff");
pub const CIPHER_TWOFISH: Uuid = uuid!("ad68f29f-576f-4bb9-a36a-d47af965346c");
pub const CIPHER_CHACHA20: Uuid = uuid!("d6038a2b-8b6f-4cb5-a524-339a31dbb59a");

pub const KDF_AES_KDBX3: Uuid = uuid!("c9d9f39a-628a-4460-bf74-0d08c18a4fea");
pub const KDF_AES_KDBX4: Uuid = uuid!("7c02bb82-79a7-4ac0-927d-114a00648238");
pub const KDF_ARGON2D: Uuid = uuid!("ef636ddf-8c29-444b-91f7-a9a403e30a0c");
pub const KDF_ARGON2ID: Uuid = uuid!("9e298b19-56db-4773-b23d-fc3ec6f0a1e6");

pub const KDFPARAM_UUID: &str = "$UUID";
// AES-KDF parameters
pub const KDFPARAM_AES_ROUNDS: &str = "R";
pub const KDFPARAM_AES_SEED: &str = "S";
// Argon2 parameters
pub const KDFPARAM_ARGON2_SALT: &str = "S";
pub const KDFPARAM_ARGON2_PARALLELISM: &str = "P";
pub const KDFPARAM_ARGON2_MEMORY: &str = "M";
pub const KDFPARAM_ARGON2_ITERATIONS: &str = "I";
pub const KDFPARAM_ARGON2_VERSION: &str = "V";

/// The HMAC stream key: `SHA512(masterSeed || transformedKey || 0x01)`.
pub fn hmac_key(master_seed: &[u8], transformed_key: &[u8]) -> Vec<u8> {
    let mut hash = CryptoHash::new(HashAlgorithm::Sha512);
    hash.add_data(master_seed);
    hash.add_data(transformed_key);
    hash.add_data(&[0x01]);
    hash.result()
}

/// Outer header field ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderFieldId {
    EndOfHeader,
    Comment,
    CipherId,
    CompressionFlags,
    MasterSeed,
    TransformSeed,
    TransformRounds,
    EncryptionIv,
    ProtectedStreamKey,
    StreamStartBytes,
    InnerRandomStreamId,
    KdfParameters,
    PublicCustomData,
}

impl HeaderFieldId {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::EndOfHeader),
            1 => Some(Self::Comment),
            2 => Some(Self::CipherId),
            3 => Some(Self::CompressionFlags),
            4 => Some(Self::MasterSeed),
            5 => Some(Self::TransformSeed),
            6 => Some(Self::TransformRounds),
            7 => Some(Self::EncryptionIv),
            8 => Some(Self::ProtectedStreamKey),
            9 => Some(Self::StreamStartBytes),
            10 => Some(Self::InnerRandomStreamId),
            11 => Some(Self::KdfParameters),
            12 => Some(Self::PublicCustomData),
            _ => None,
        }
    }
}

/// Inner header field ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InnerHeaderFieldId {
    End,
    InnerRandomStreamId,
    InnerRandomStreamKey,
    Binary,
}

impl InnerHeaderFieldId {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::End),
            1 => Some(Self::InnerRandomStreamId),
            2 => Some(Self::InnerRandomStreamKey),
            3 => Some(Self::Binary),
            _ => None,
        }
    }
}

/// Inner random stream algorithm ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectedStreamAlgo {
    ArcFourVariant,
    Salsa20,
    ChaCha20,
}

impl ProtectedStreamAlgo {
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            1 => Some(Self::ArcFourVariant),
            2 => Some(Self::Salsa20),
            3 => Some(Self::ChaCha20),
            _ => None,
        }
    }
}

fn uuid_to_kdf(uuid: Uuid) -> Option<Kdf> {
    if uuid == KDF_AES_KDBX3 {
        Some(Kdf::Aes(AesKdf::legacy()))
    } else if uuid == KDF_AES_KDBX4 {
        Some(Kdf::Aes(AesKdf::new()))
    } else if uuid == KDF_ARGON2D {
        Some(Kdf::Argon2(Argon2Kdf::new(Argon2Type::Argon2d)))
    } else if uuid == KDF_ARGON2ID {
        Some(Kdf::Argon2(Argon2Kdf::new(Argon2Type::Argon2id)))
    } else {
        None
    }
}

/// Resolves a decoded variant map to a fully-parameterized KDF. `None` means
/// the caller must treat the file as using an unsupported KDF; a partially
/// valid parameter set never produces a KDF.
pub fn kdf_from_parameters(map: &VariantMap) -> Option<Kdf> {
    let uuid_bytes = map.get_bytes(KDFPARAM_UUID)?;
    if uuid_bytes.len() != UUID_SIZE {
        return None;
    }

    let mut kdf_uuid = Uuid::from_slice(uuid_bytes).ok()?;
    if kdf_uuid == KDF_AES_KDBX3 {
        // KDBX3 had no KDF parameter block of its own, so its uuid inside a
        // KDBX4 parameter map is upgraded to the KDBX4 AES-KDF.
        kdf_uuid = KDF_AES_KDBX4;
    }

    let mut kdf = uuid_to_kdf(kdf_uuid)?;
    if !kdf.process_parameters(map) {
        tracing::warn!(%kdf_uuid, "KDF parameter processing failed");
        return None;
    }

    Some(kdf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytes::CursorReader;
    use crate::hmac_stream::HmacBlockStream;
    use crate::keys::{CompositeKey, Key, PasswordKey};
    use crate::test_fixtures as fixtures;

    #[test]
    fn hmac_key_matches_sample_database() {
        let result = hmac_key(&fixtures::MASTER_SEED, &fixtures::TRANSFORMED_DATABASE_KEY);
        assert_eq!(result, fixtures::HMAC_KEY);
    }

    #[test]
    fn header_hmac_matches_sample_database() {
        let block_key = HmacBlockStream::get_hmac_key(u64::MAX, &fixtures::HMAC_KEY).unwrap();
        let result = CryptoHash::hmac(
            fixtures::header_data(),
            &block_key,
            HashAlgorithm::Sha256,
        )
        .unwrap();
        assert_eq!(result, fixtures::HEADER_HMAC_HASH);
    }

    #[test]
    fn kdf_parameters_from_sample_header_resolve_and_transform() {
        let mut cursor = CursorReader::new(fixtures::kdf_parameter_bytes());
        let map = VariantMap::read(&mut cursor).unwrap();

        let kdf = kdf_from_parameters(&map).expect("sample KDF parameters must resolve");
        // The KDBX3 AES-KDF uuid is upgraded to the KDBX4 one.
        assert_eq!(kdf.uuid(), KDF_AES_KDBX4);
        assert_eq!(kdf.rounds(), 1);

        let key = CompositeKey::new(vec![Key::Password(PasswordKey::new("sample"))]);
        let transformed = key.transform(&kdf).unwrap();
        assert_eq!(transformed, fixtures::TRANSFORMED_DATABASE_KEY);
    }

    #[test]
    fn field_id_range_checks_are_both_bounds() {
        assert!(HeaderFieldId::from_id(12).is_some());
        assert!(HeaderFieldId::from_id(13).is_none());
        assert!(InnerHeaderFieldId::from_id(3).is_some());
        assert!(InnerHeaderFieldId::from_id(4).is_none());
        assert!(ProtectedStreamAlgo::from_id(0).is_none());
        assert!(ProtectedStreamAlgo::from_id(3).is_some());
        assert!(ProtectedStreamAlgo::from_id(4).is_none());
    }
}
