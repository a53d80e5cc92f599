//! kdbx-read - KeePass 2 (KDBX4) database decoder
//!
//! Reads and decrypts `.kdbx` files: outer header parsing, key
//! transformation (AES-KDF or Argon2), header authentication, the
//! HMAC-verified block stream, body decryption and decompression, and the
//! XML payload with its inner random stream for protected values.
//!
//! ```no_run
//! use kdbx_read::{read_database, CompositeKey, Key, PasswordKey};
//!
//! # fn main() -> kdbx_read::Result<()> {
//! let data = std::fs::read("vault.kdbx")?;
//! let key = CompositeKey::new(vec![Key::Password(PasswordKey::new("hunter2"))]);
//! let database = read_database(&data, key)?;
//! if let Some(root) = &database.root_group {
//!     for entry in root.iter_entries() {
//!         println!("{:?}", entry.title());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod bytes;
pub mod crypto;
mod database;
mod entry;
mod error;
mod group;
pub mod hmac_stream;
mod kdbx4;
mod kdbx_xml;
pub mod keepass2;
mod keys;
pub mod random_stream;
#[cfg(test)]
mod test_fixtures;
pub mod variant;
pub mod xml;

pub use crypto::kdf::{AesKdf, Argon2Kdf, Argon2Type, Kdf};
pub use database::{
    CompressionAlgorithm, CustomDataItem, Database, DeletedObject, Icon, MemoryProtection,
    Metadata,
};
pub use entry::{AutoType, AutoTypeAssociation, Entry, TimeInfo};
pub use error::{Error, Result};
pub use group::{Group, TriState};
pub use kdbx4::read_database;
pub use keys::{ChallengeResponse, CompositeKey, FileKey, Key, PasswordKey};
pub use variant::{VariantMap, VariantValue};

// Re-export types that users might need
pub use uuid::Uuid;
