//! Inner random stream
//!
//! Protected values inside the XML payload are encrypted with a stream
//! cipher whose state advances across values in document order. KDBX4
//! selects ChaCha20 and derives key and nonce from the SHA-512 of the inner
//! stream key carried in the inner header.

use zeroize::Zeroizing;

use crate::crypto::cipher::{CipherDirection, CipherMode, SymmetricCipher};
use crate::crypto::hash::{CryptoHash, HashAlgorithm};
use crate::error::{Error, Result};
use crate::keepass2::ProtectedStreamAlgo;

/// Creates the stream cipher protecting in-memory values.
pub fn create_random_stream(
    algo: ProtectedStreamAlgo,
    key: &[u8],
) -> Result<SymmetricCipher> {
    match algo {
        ProtectedStreamAlgo::ChaCha20 => {
            let key_iv = Zeroizing::new(CryptoHash::hash(key, HashAlgorithm::Sha512));
            SymmetricCipher::create(
                CipherMode::ChaCha20,
                CipherDirection::Encrypt,
                &key_iv[0..32],
                &key_iv[32..44],
            )
        }
        ProtectedStreamAlgo::Salsa20 => Err(Error::NotImplemented("Salsa20")),
        ProtectedStreamAlgo::ArcFourVariant => Err(Error::NotImplemented("ArcFourVariant")),
    }
}
