//! Symmetric cipher façade
//!
//! One handle type over the cipher modes the KDBX4 format can select: the
//! outer body cipher (AES-256-CBC or ChaCha20) and the inner random stream
//! (ChaCha20; Salsa20 is defined by the format but not supported here).
//! Block modes buffer through `process` and transform on `finish`, stream
//! modes transform as data arrives. Key material is zeroized when the handle
//! drops, so every exit path releases it.

use aes::Aes256;
use chacha20::ChaCha20;
use cipher::block_padding::Pkcs7;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, StreamCipher};
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::keepass2::{CIPHER_AES256, CIPHER_CHACHA20};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherMode {
    Aes256Cbc,
    ChaCha20,
    Salsa20,
}

impl CipherMode {
    /// Maps an outer-header cipher uuid to a mode, `None` when unsupported.
    pub fn from_uuid(uuid: uuid::Uuid) -> Option<CipherMode> {
        if uuid == CIPHER_AES256 {
            Some(CipherMode::Aes256Cbc)
        } else if uuid == CIPHER_CHACHA20 {
            Some(CipherMode::ChaCha20)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherDirection {
    Encrypt,
    Decrypt,
}

enum CipherState {
    Cbc {
        key: Zeroizing<Vec<u8>>,
        iv: Vec<u8>,
        buffered: Zeroizing<Vec<u8>>,
    },
    ChaCha20(Box<ChaCha20>),
}

/// A live cipher handle created from a mode, direction, key and IV.
pub struct SymmetricCipher {
    direction: CipherDirection,
    state: CipherState,
}

impl SymmetricCipher {
    pub fn create(
        mode: CipherMode,
        direction: CipherDirection,
        key: &[u8],
        iv: &[u8],
    ) -> Result<Self> {
        let state = match mode {
            CipherMode::Aes256Cbc => {
                if key.len() != 32 {
                    return Err(Error::InvalidKeyLength {
                        expected: 32,
                        actual: key.len(),
                    });
                }
                if iv.len() != 16 {
                    return Err(Error::Cipher(format!(
                        "invalid AES-CBC IV length: {}",
                        iv.len()
                    )));
                }
                CipherState::Cbc {
                    key: Zeroizing::new(key.to_vec()),
                    iv: iv.to_vec(),
                    buffered: Zeroizing::new(Vec::new()),
                }
            }
            CipherMode::ChaCha20 => {
                let cipher = ChaCha20::new_from_slices(key, iv)
                    .map_err(|e| Error::Cipher(format!("ChaCha20 init failed: {e}")))?;
                CipherState::ChaCha20(Box::new(cipher))
            }
            CipherMode::Salsa20 => return Err(Error::NotImplemented("Salsa20")),
        };

        Ok(Self { direction, state })
    }

    /// Feeds a chunk through the cipher. Stream modes return the transformed
    /// bytes immediately; block modes buffer until `finish`.
    pub fn process(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        match &mut self.state {
            CipherState::Cbc { buffered, .. } => {
                buffered.extend_from_slice(data);
                Ok(Vec::new())
            }
            CipherState::ChaCha20(cipher) => {
                let mut out = data.to_vec();
                cipher.apply_keystream(&mut out);
                Ok(out)
            }
        }
    }

    /// Consumes the handle and the final chunk. Block modes apply or strip
    /// PKCS#7 padding here; stream modes just transform, and a zero-length
    /// final chunk yields an empty result.
    pub fn finish(mut self, data: &[u8]) -> Result<Vec<u8>> {
        match &mut self.state {
            CipherState::Cbc { key, iv, buffered } => {
                let mut input = Zeroizing::new(Vec::with_capacity(buffered.len() + data.len()));
                input.extend_from_slice(buffered);
                input.extend_from_slice(data);
                match self.direction {
                    CipherDirection::Encrypt => {
                        let cipher = cbc::Encryptor::<Aes256>::new_from_slices(key, iv)
                            .map_err(|e| Error::Cipher(format!("AES init failed: {e}")))?;
                        Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(&input))
                    }
                    CipherDirection::Decrypt => {
                        let cipher = cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
                            .map_err(|e| Error::Cipher(format!("AES init failed: {e}")))?;
                        cipher
                            .decrypt_padded_vec_mut::<Pkcs7>(&input)
                            .map_err(|_| Error::Cipher("AES-CBC unpadding failed".into()))
                    }
                }
            }
            CipherState::ChaCha20(cipher) => {
                let mut out = data.to_vec();
                cipher.apply_keystream(&mut out);
                Ok(out)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x42; 32];
    const IV16: [u8; 16] = [0x24; 16];
    const IV12: [u8; 12] = [0x24; 12];

    #[test]
    fn aes_cbc_round_trip_through_facade() {
        let plaintext = b"attack at dawn, bring snacks";

        let enc =
            SymmetricCipher::create(CipherMode::Aes256Cbc, CipherDirection::Encrypt, &KEY, &IV16)
                .unwrap();
        let ciphertext = enc.finish(plaintext).unwrap();
        assert_ne!(&ciphertext[..plaintext.len().min(ciphertext.len())], plaintext);
        assert_eq!(ciphertext.len() % 16, 0);

        let mut dec =
            SymmetricCipher::create(CipherMode::Aes256Cbc, CipherDirection::Decrypt, &KEY, &IV16)
                .unwrap();
        // Block mode: process buffers, finish transforms.
        assert!(dec.process(&ciphertext[..16]).unwrap().is_empty());
        let decrypted = dec.finish(&ciphertext[16..]).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn chacha20_is_symmetric_and_stateful() {
        let mut enc =
            SymmetricCipher::create(CipherMode::ChaCha20, CipherDirection::Encrypt, &KEY, &IV12)
                .unwrap();
        let a = enc.process(b"first").unwrap();
        let b = enc.finish(b"second").unwrap();

        let mut dec =
            SymmetricCipher::create(CipherMode::ChaCha20, CipherDirection::Decrypt, &KEY, &IV12)
                .unwrap();
        assert_eq!(dec.process(&a).unwrap(), b"first");
        assert_eq!(dec.finish(&b).unwrap(), b"second");
    }

    #[test]
    fn chacha20_finish_on_empty_input_is_empty() {
        let cipher =
            SymmetricCipher::create(CipherMode::ChaCha20, CipherDirection::Decrypt, &KEY, &IV12)
                .unwrap();
        assert!(cipher.finish(&[]).unwrap().is_empty());
    }

    #[test]
    fn salsa20_is_not_implemented() {
        let result =
            SymmetricCipher::create(CipherMode::Salsa20, CipherDirection::Decrypt, &KEY, &IV12);
        assert!(matches!(result, Err(Error::NotImplemented("Salsa20"))));
    }

    #[test]
    fn bad_key_length_is_rejected() {
        let result = SymmetricCipher::create(
            CipherMode::Aes256Cbc,
            CipherDirection::Decrypt,
            &KEY[..16],
            &IV16,
        );
        assert!(matches!(result, Err(Error::InvalidKeyLength { .. })));
    }
}
