//! KDBX4 container reader
//!
//! The top of the decode pipeline: magic numbers and version, the outer
//! header loop, the header hash and HMAC checks, the HMAC block stream, body
//! decryption and decompression, the inner header, and finally the XML
//! payload. Every integrity failure surfaces before any content is parsed.

use std::io::Read;

use flate2::read::GzDecoder;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::bytes::{ByteReader, CursorReader};
use crate::crypto::cipher::{CipherDirection, CipherMode, SymmetricCipher};
use crate::crypto::hash::{CryptoHash, HashAlgorithm, SHA256_SIZE};
use crate::database::{CompressionAlgorithm, Database};
use crate::error::{Error, Result};
use crate::hmac_stream::HmacBlockStream;
use crate::kdbx_xml::XmlDecoder;
use crate::keepass2::{
    self, HeaderFieldId, InnerHeaderFieldId, ProtectedStreamAlgo, FILE_VERSION_4,
    FILE_VERSION_CRITICAL_MASK, SIGNATURE_1, SIGNATURE_2, UUID_SIZE,
};
use crate::keys::CompositeKey;
use crate::random_stream::create_random_stream;
use crate::variant::VariantMap;

#[derive(Default)]
struct OuterHeader {
    master_seed: Option<Vec<u8>>,
    encryption_iv: Option<Vec<u8>>,
}

#[derive(Default)]
struct InnerHeader {
    stream_algo: Option<ProtectedStreamAlgo>,
    stream_key: Option<Zeroizing<Vec<u8>>>,
    binary_pool: std::collections::HashMap<String, Vec<u8>>,
}

/// Decodes and decrypts a complete KDBX4 database.
pub fn read_database(data: &[u8], key: CompositeKey) -> Result<Database> {
    let mut cursor = CursorReader::new(data);

    let signature_one = cursor.read_u32_le()?;
    let signature_two = cursor.read_u32_le()?;
    if signature_one != SIGNATURE_1 || signature_two != SIGNATURE_2 {
        return Err(Error::InvalidSignature);
    }

    let version = cursor.read_u32_le()?;
    if version & FILE_VERSION_CRITICAL_MASK != FILE_VERSION_4 {
        return Err(Error::UnsupportedVersion(version));
    }
    tracing::debug!(version = format_args!("{version:#010x}"), "reading KDBX4 database");

    let mut database = Database::new();
    database.set_format_version(version);

    let mut header = OuterHeader::default();
    while read_header_field(&mut cursor, &mut database, &mut header)? {}
    let header_data = cursor.processed();

    let master_seed = header
        .master_seed
        .ok_or_else(|| Error::Malformed("master seed header field missing".into()))?;
    let encryption_iv = header
        .encryption_iv
        .ok_or_else(|| Error::Malformed("encryption IV header field missing".into()))?;
    let cipher_uuid = database
        .cipher()
        .ok_or_else(|| Error::Malformed("cipher header field missing".into()))?;

    // Two 32-byte checks follow the header: the plain SHA-256 guards against
    // corruption, the keyed HMAC against a wrong key or tampering. The hash
    // is key-independent and is verified before the KDF runs.
    let header_sha256 = cursor.read_bytes(SHA256_SIZE)?;
    let header_hmac = cursor.read_bytes(SHA256_SIZE)?;
    if !ByteReader::equals(
        header_sha256,
        &CryptoHash::hash(header_data, HashAlgorithm::Sha256),
    ) {
        return Err(Error::HeaderHashMismatch);
    }

    database.set_key(key)?;

    let final_key = Zeroizing::new(CryptoHash::hash_parts(
        &[&master_seed, database.transformed_key()],
        HashAlgorithm::Sha256,
    ));

    let hmac_key = Zeroizing::new(keepass2::hmac_key(&master_seed, database.transformed_key()));
    let header_block_key = HmacBlockStream::get_hmac_key(u64::MAX, &hmac_key)?;
    let expected_hmac = CryptoHash::hmac(header_data, &header_block_key, HashAlgorithm::Sha256)?;
    if !ByteReader::equals(header_hmac, &expected_hmac) {
        return Err(Error::InvalidCredentials);
    }

    let ciphertext = HmacBlockStream::read_blocks(&mut cursor, &hmac_key)?;

    let mode = CipherMode::from_uuid(cipher_uuid)
        .ok_or_else(|| Error::UnsupportedCipher(cipher_uuid.to_string()))?;
    let cipher = SymmetricCipher::create(mode, CipherDirection::Decrypt, &final_key, &encryption_iv)?;
    let decrypted = Zeroizing::new(cipher.finish(&ciphertext)?);

    let buffer = match database.compression_algorithm() {
        CompressionAlgorithm::GZip => Zeroizing::new(gunzip(&decrypted)?),
        CompressionAlgorithm::None => decrypted,
    };

    let mut inner_cursor = CursorReader::new(&buffer);
    let mut inner = InnerHeader::default();
    while read_inner_header_field(&mut inner_cursor, &mut inner)? {}

    let stream_algo = inner
        .stream_algo
        .ok_or_else(|| Error::Malformed("inner random stream algorithm missing".into()))?;
    let stream_key = inner
        .stream_key
        .ok_or_else(|| Error::Malformed("inner random stream key missing".into()))?;
    let random_stream = create_random_stream(stream_algo, &stream_key)?;

    XmlDecoder::new(inner.binary_pool, random_stream)
        .read_database(inner_cursor.remaining(), &mut database)?;

    Ok(database)
}

fn read_header_field(
    cursor: &mut CursorReader<'_>,
    database: &mut Database,
    header: &mut OuterHeader,
) -> Result<bool> {
    let id = cursor.read_u8()?;
    let field = HeaderFieldId::from_id(id)
        .ok_or_else(|| Error::Malformed(format!("invalid header field id {id}")))?;

    let length = cursor.read_u32_le()? as usize;
    if length == 0 {
        return Err(Error::Malformed(format!(
            "zero-length header field {field:?}"
        )));
    }
    let data = cursor.read_bytes(length)?;

    match field {
        HeaderFieldId::EndOfHeader => return Ok(false),

        HeaderFieldId::Comment => {
            tracing::debug!("skipping comment header field");
        }

        HeaderFieldId::CipherId => {
            if data.len() != UUID_SIZE {
                return Err(Error::Malformed(format!(
                    "invalid cipher uuid length {}",
                    data.len()
                )));
            }
            let uuid = Uuid::from_slice(data).expect("length checked");
            if CipherMode::from_uuid(uuid).is_none() {
                return Err(Error::UnsupportedCipher(uuid.to_string()));
            }
            database.set_cipher(uuid);
        }

        HeaderFieldId::CompressionFlags => {
            if data.len() != 4 {
                return Err(Error::Malformed("invalid compression flags length".into()));
            }
            let id = u32::from_le_bytes(data.try_into().expect("length checked"));
            let algorithm = CompressionAlgorithm::from_id(id)
                .ok_or(Error::UnsupportedCompression(id))?;
            database.set_compression_algorithm(algorithm);
        }

        HeaderFieldId::MasterSeed => {
            if data.len() != 32 {
                return Err(Error::Malformed("invalid master seed size".into()));
            }
            header.master_seed = Some(data.to_vec());
        }

        HeaderFieldId::EncryptionIv => {
            header.encryption_iv = Some(data.to_vec());
        }

        HeaderFieldId::KdfParameters => {
            let mut reader = CursorReader::new(data);
            let parameters = VariantMap::read(&mut reader)?;
            let kdf = keepass2::kdf_from_parameters(&parameters).ok_or(Error::UnsupportedKdf)?;
            database.set_kdf(kdf);
        }

        HeaderFieldId::PublicCustomData => {
            let mut reader = CursorReader::new(data);
            database.set_public_custom_data(VariantMap::read(&mut reader)?);
        }

        HeaderFieldId::TransformSeed => return Err(Error::LegacyFieldInV4("TransformSeed")),
        HeaderFieldId::TransformRounds => return Err(Error::LegacyFieldInV4("TransformRounds")),
        HeaderFieldId::ProtectedStreamKey => {
            return Err(Error::LegacyFieldInV4("ProtectedStreamKey"))
        }
        HeaderFieldId::StreamStartBytes => return Err(Error::LegacyFieldInV4("StreamStartBytes")),
        HeaderFieldId::InnerRandomStreamId => {
            return Err(Error::LegacyFieldInV4("InnerRandomStreamID"))
        }
    }

    Ok(true)
}

fn read_inner_header_field(cursor: &mut CursorReader<'_>, inner: &mut InnerHeader) -> Result<bool> {
    let id = cursor.read_u8()?;
    let field = InnerHeaderFieldId::from_id(id)
        .ok_or_else(|| Error::Malformed(format!("invalid inner header field id {id}")))?;

    let length = cursor.read_u32_le()? as usize;
    if field == InnerHeaderFieldId::End {
        return Ok(false);
    }
    if length == 0 {
        return Err(Error::Malformed(format!(
            "zero-length inner header field {field:?}"
        )));
    }
    let data = cursor.read_bytes(length)?;

    match field {
        InnerHeaderFieldId::InnerRandomStreamId => {
            if data.len() != 4 {
                return Err(Error::Malformed("invalid random stream id size".into()));
            }
            let id = u32::from_le_bytes(data.try_into().expect("length checked"));
            let algo = ProtectedStreamAlgo::from_id(id)
                .filter(|algo| *algo != ProtectedStreamAlgo::ArcFourVariant)
                .ok_or_else(|| Error::Malformed("invalid inner random stream cipher".into()))?;
            inner.stream_algo = Some(algo);
        }

        InnerHeaderFieldId::InnerRandomStreamKey => {
            inner.stream_key = Some(Zeroizing::new(data.to_vec()));
        }

        InnerHeaderFieldId::Binary => {
            // The first byte is the memory-protection flag; only the content
            // is kept. Pool keys are the arrival index as a decimal string,
            // matching the Ref attributes in the XML.
            let key = inner.binary_pool.len().to_string();
            inner.binary_pool.insert(key, data[1..].to_vec());
        }

        InnerHeaderFieldId::End => unreachable!(),
    }

    Ok(true)
}

fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| Error::Decompression(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keepass2::{CIPHER_AES256, KDF_AES_KDBX4};
    use crate::test_fixtures as fixtures;

    #[test]
    fn sample_outer_header_parses_completely() {
        let mut cursor = CursorReader::new(fixtures::header_data());
        cursor.read_bytes(12).unwrap(); // signature and version

        let mut database = Database::new();
        let mut header = OuterHeader::default();
        while read_header_field(&mut cursor, &mut database, &mut header).unwrap() {}

        assert_eq!(cursor.position(), fixtures::header_data().len());
        assert_eq!(database.cipher(), Some(CIPHER_AES256));
        assert_eq!(
            database.compression_algorithm(),
            CompressionAlgorithm::GZip
        );
        assert_eq!(header.master_seed.as_deref(), Some(&fixtures::MASTER_SEED[..]));
        assert_eq!(header.encryption_iv.as_deref(), Some(&fixtures::ENCRYPTION_IV[..]));

        let kdf = database.kdf().unwrap();
        assert_eq!(kdf.uuid(), KDF_AES_KDBX4);
        assert_eq!(kdf.rounds(), 1);
        assert_eq!(kdf.seed(), fixtures::kdf_seed());
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let key = CompositeKey::new(Vec::new());
        let mut data = fixtures::header_data().to_vec();
        data[0] ^= 0x01;
        assert!(matches!(
            read_database(&data, key),
            Err(Error::InvalidSignature)
        ));
    }

    #[test]
    fn non_v4_version_is_rejected() {
        let key = CompositeKey::new(Vec::new());
        let mut data = fixtures::header_data().to_vec();
        data[10] = 0x03; // major version 3
        assert!(matches!(
            read_database(&data, key),
            Err(Error::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn legacy_header_fields_are_fatal() {
        // Signature, version, then a TransformSeed field.
        let mut data = fixtures::header_data()[..12].to_vec();
        data.push(5);
        data.extend_from_slice(&8u32.to_le_bytes());
        data.extend_from_slice(&[0u8; 8]);

        let key = CompositeKey::new(Vec::new());
        assert!(matches!(
            read_database(&data, key),
            Err(Error::LegacyFieldInV4("TransformSeed"))
        ));
    }

    #[test]
    fn zero_length_header_field_is_fatal() {
        let mut data = fixtures::header_data()[..12].to_vec();
        data.push(4); // MasterSeed
        data.extend_from_slice(&0u32.to_le_bytes());

        let key = CompositeKey::new(Vec::new());
        assert!(matches!(read_database(&data, key), Err(Error::Malformed(_))));
    }

    #[test]
    fn inner_header_binary_pool_indexes_by_arrival_order() {
        let mut data = Vec::new();
        // InnerRandomStreamID: ChaCha20
        data.push(1);
        data.extend_from_slice(&4u32.to_le_bytes());
        data.extend_from_slice(&3u32.to_le_bytes());
        // Two binaries, protection flags 0x01 and 0x00.
        for (flag, content) in [(0x01u8, b"first".as_slice()), (0x00, b"second".as_slice())] {
            data.push(3);
            data.extend_from_slice(&(1 + content.len() as u32).to_le_bytes());
            data.push(flag);
            data.extend_from_slice(content);
        }
        // End
        data.push(0);
        data.extend_from_slice(&0u32.to_le_bytes());

        let mut cursor = CursorReader::new(&data);
        let mut inner = InnerHeader::default();
        while read_inner_header_field(&mut cursor, &mut inner).unwrap() {}

        assert_eq!(inner.stream_algo, Some(ProtectedStreamAlgo::ChaCha20));
        assert_eq!(inner.binary_pool["0"], b"first");
        assert_eq!(inner.binary_pool["1"], b"second");
    }

    #[test]
    fn arcfour_inner_stream_is_rejected() {
        let mut data = Vec::new();
        data.push(1);
        data.extend_from_slice(&4u32.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes()); // ArcFourVariant

        let mut cursor = CursorReader::new(&data);
        let mut inner = InnerHeader::default();
        assert!(matches!(
            read_inner_header_field(&mut cursor, &mut inner),
            Err(Error::Malformed(_))
        ));
    }
}
