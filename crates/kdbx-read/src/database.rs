//! Database model and unlock state
//!
//! [`Database`] carries the decoded content (metadata, the group tree,
//! deleted objects) together with the unlock configuration read from the
//! outer header (cipher, compression, KDF). The transformed composite key is
//! computed once when the key is set and zeroized on drop.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::crypto::kdf::Kdf;
use crate::error::{Error, Result};
use crate::group::Group;
use crate::keys::CompositeKey;
use crate::variant::VariantMap;

/// Body compression, selected by the CompressionFlags header field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum CompressionAlgorithm {
    None,
    #[default]
    GZip,
}

impl CompressionAlgorithm {
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(Self::None),
            1 => Some(Self::GZip),
            _ => None,
        }
    }
}

/// A plugin-defined key/value item, attached to the database, a group or an
/// entry.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CustomDataItem {
    pub value: String,
    pub last_modified: Option<DateTime<Utc>>,
}

/// A custom icon from the metadata pool.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Icon {
    pub data: Vec<u8>,
    pub name: Option<String>,
    pub last_modification_time: Option<DateTime<Utc>>,
}

/// A tombstone kept for synchronization after a group or entry is removed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeletedObject {
    pub uuid: Option<Uuid>,
    pub deletion_time: Option<DateTime<Utc>>,
}

/// In-memory protection switches from the Meta element. Only the password
/// is protected in a default KeePass 2 configuration.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryProtection {
    pub protect_title: bool,
    pub protect_username: bool,
    pub protect_password: bool,
    pub protect_url: bool,
    pub protect_notes: bool,
}

impl Default for MemoryProtection {
    fn default() -> Self {
        Self {
            protect_title: false,
            protect_username: false,
            protect_password: true,
            protect_url: false,
            protect_notes: false,
        }
    }
}

/// The Meta element of the XML payload.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Metadata {
    pub generator: Option<String>,
    pub header_hash: Option<Vec<u8>>,
    pub name: Option<String>,
    pub name_changed: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub description_changed: Option<DateTime<Utc>>,
    pub default_user_name: Option<String>,
    pub default_user_name_changed: Option<DateTime<Utc>>,
    pub maintenance_history_days: Option<u32>,
    pub color: Option<String>,
    pub master_key_changed: Option<DateTime<Utc>>,
    pub master_key_change_rec: Option<i32>,
    pub master_key_change_force: Option<i32>,
    pub memory_protection: MemoryProtection,
    pub custom_icons: HashMap<Uuid, Icon>,
    pub recycle_bin_enabled: Option<bool>,
    pub recycle_bin_uuid: Option<Uuid>,
    pub recycle_bin_changed: Option<DateTime<Utc>>,
    pub entry_templates_group: Option<Uuid>,
    pub entry_templates_group_changed: Option<DateTime<Utc>>,
    pub last_selected_group: Option<Uuid>,
    pub last_top_visible_group: Option<Uuid>,
    pub history_max_items: Option<u32>,
    pub history_max_size: Option<u32>,
    pub custom_data: HashMap<String, CustomDataItem>,
    pub settings_changed: Option<DateTime<Utc>>,
}

/// A decoded KeePass 2 database.
pub struct Database {
    cipher: Option<Uuid>,
    compression: CompressionAlgorithm,
    kdf: Option<Kdf>,
    key: Option<CompositeKey>,
    transformed_key: Zeroizing<Vec<u8>>,
    format_version: Option<u32>,
    pub metadata: Metadata,
    pub root_group: Option<Group>,
    pub deleted_objects: Vec<DeletedObject>,
    pub public_custom_data: VariantMap,
}

impl Database {
    pub fn new() -> Self {
        Self {
            cipher: None,
            compression: CompressionAlgorithm::default(),
            kdf: None,
            key: None,
            transformed_key: Zeroizing::new(Vec::new()),
            format_version: None,
            metadata: Metadata::default(),
            root_group: None,
            deleted_objects: Vec::new(),
            public_custom_data: VariantMap::new(),
        }
    }

    pub fn set_cipher(&mut self, uuid: Uuid) {
        self.cipher = Some(uuid);
    }

    pub fn cipher(&self) -> Option<Uuid> {
        self.cipher
    }

    pub fn set_compression_algorithm(&mut self, algorithm: CompressionAlgorithm) {
        self.compression = algorithm;
    }

    pub fn compression_algorithm(&self) -> CompressionAlgorithm {
        self.compression
    }

    pub fn set_kdf(&mut self, kdf: Kdf) {
        self.kdf = Some(kdf);
    }

    pub fn kdf(&self) -> Option<&Kdf> {
        self.kdf.as_ref()
    }

    pub fn set_format_version(&mut self, version: u32) {
        self.format_version = Some(version);
    }

    pub fn format_version(&self) -> Option<u32> {
        self.format_version
    }

    /// Installs the composite key and runs it through the configured KDF.
    /// The KDF must be set first.
    pub fn set_key(&mut self, key: CompositeKey) -> Result<()> {
        let kdf = self.kdf.as_ref().ok_or(Error::UnsupportedKdf)?;
        self.transformed_key = Zeroizing::new(key.transform(kdf)?);
        self.key = Some(key);
        Ok(())
    }

    pub fn transformed_key(&self) -> &[u8] {
        &self.transformed_key
    }

    pub fn set_public_custom_data(&mut self, map: VariantMap) {
        self.public_custom_data = map;
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

/// Key material (composite key, KDF seed, transformed key) never appears in
/// debug output.
impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("cipher", &self.cipher)
            .field("compression", &self.compression)
            .field("format_version", &self.format_version)
            .field("metadata", &self.metadata)
            .field("root_group", &self.root_group)
            .field("deleted_objects", &self.deleted_objects)
            .field("public_custom_data", &self.public_custom_data)
            .finish_non_exhaustive()
    }
}
