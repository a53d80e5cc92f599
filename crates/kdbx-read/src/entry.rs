//! Entry model

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::database::CustomDataItem;

/// Timestamps and usage counters shared by groups and entries.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TimeInfo {
    pub creation_time: Option<DateTime<Utc>>,
    pub last_modification_time: Option<DateTime<Utc>>,
    pub last_access_time: Option<DateTime<Utc>>,
    pub expiry_time: Option<DateTime<Utc>>,
    pub expires: Option<bool>,
    pub usage_count: Option<u32>,
    pub location_changed: Option<DateTime<Utc>>,
}

/// One auto-type window/sequence association.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AutoTypeAssociation {
    pub window: String,
    pub sequence: String,
}

/// Auto-type settings of an entry.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AutoType {
    pub enabled: Option<bool>,
    pub data_transfer_obfuscation: Option<i32>,
    pub default_sequence: Option<String>,
    pub associations: Vec<AutoTypeAssociation>,
}

/// A credential entry. String attributes are an open key/value set; the
/// well-known keys (Title, UserName, Password, URL, Notes) live in the same
/// map as user-defined ones. `protected_attributes` lists the keys that were
/// stored under the inner random stream.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Entry {
    pub uuid: Uuid,
    pub attributes: HashMap<String, String>,
    pub protected_attributes: Vec<String>,
    pub attachments: HashMap<String, Vec<u8>>,
    pub history: Vec<Entry>,
    pub time_info: Option<TimeInfo>,
    pub icon_number: Option<i32>,
    pub custom_icon: Option<Uuid>,
    pub foreground_color: Option<String>,
    pub background_color: Option<String>,
    pub override_url: Option<String>,
    pub tags: Option<String>,
    pub quality_check: Option<bool>,
    pub auto_type: Option<AutoType>,
    pub custom_data: HashMap<String, CustomDataItem>,
    pub previous_parent_group: Option<Uuid>,
}

impl Entry {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn is_attribute_protected(&self, key: &str) -> bool {
        self.protected_attributes.iter().any(|k| k == key)
    }

    pub fn title(&self) -> Option<&str> {
        self.attribute("Title")
    }

    pub fn username(&self) -> Option<&str> {
        self.attribute("UserName")
    }

    pub fn password(&self) -> Option<&str> {
        self.attribute("Password")
    }

    pub fn url(&self) -> Option<&str> {
        self.attribute("URL")
    }

    pub fn notes(&self) -> Option<&str> {
        self.attribute("Notes")
    }
}
