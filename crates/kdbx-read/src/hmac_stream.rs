//! HMAC-authenticated block stream
//!
//! The KDBX4 body after the header checks is a sequence of blocks, each
//! `[32-byte HMAC][u32 LE length][payload]`, terminated by a zero-length
//! block. Every block, the terminator included, is authenticated with a key
//! derived from the block index, so blocks cannot be dropped, duplicated or
//! reordered without detection.

use crate::bytes::{ByteReader, CursorReader};
use crate::crypto::hash::{CryptoHash, HashAlgorithm, SHA256_SIZE, SHA512_SIZE};
use crate::error::{Error, Result};

pub struct HmacBlockStream;

impl HmacBlockStream {
    /// Per-block HMAC key: `SHA512(blockIndex LE || key)`. The header check
    /// uses block index `u64::MAX`; payload blocks count up from zero.
    pub fn get_hmac_key(block_index: u64, key: &[u8]) -> Result<Vec<u8>> {
        if key.len() != SHA512_SIZE {
            return Err(Error::InvalidKeyLength {
                expected: SHA512_SIZE,
                actual: key.len(),
            });
        }
        Ok(CryptoHash::hash_parts(
            &[&block_index.to_le_bytes(), key],
            HashAlgorithm::Sha512,
        ))
    }

    /// Reads the whole stream from `cursor`, verifying each block before its
    /// payload is accepted. Returns the concatenated payload bytes.
    pub fn read_blocks(cursor: &mut CursorReader<'_>, hmac_key: &[u8]) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        let mut block_index: u64 = 0;

        loop {
            let stored_hmac = cursor
                .read_bytes(SHA256_SIZE)
                .map_err(|_| Error::TruncatedBlock)?;
            let length = cursor.read_u32_le().map_err(|_| Error::TruncatedBlock)? as usize;
            let block = cursor.read_bytes(length).map_err(|_| Error::TruncatedBlock)?;

            let block_key = Self::get_hmac_key(block_index, hmac_key)?;
            let mut mac = CryptoHash::new_hmac(HashAlgorithm::Sha256, &block_key)?;
            mac.add_data(&block_index.to_le_bytes());
            mac.add_data(&(length as u32).to_le_bytes());
            mac.add_data(block);
            if !ByteReader::equals(&mac.result(), stored_hmac) {
                return Err(Error::IntegrityCheckFailed { block_index });
            }

            if length == 0 {
                break;
            }
            payload.extend_from_slice(block);
            block_index += 1;
        }

        Ok(payload)
    }
}
