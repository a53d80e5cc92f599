//! XML payload decoder
//!
//! Turns the decrypted, decompressed XML document into the database model.
//! Protected values are decrypted with the inner random stream as they are
//! encountered, so document order is load-bearing here. Unknown elements
//! are skipped; structural inconsistencies (duplicate attributes, nested
//! history, missing uuids, unresolved binary references) are fatal.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use byteorder::{ByteOrder, LittleEndian};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::crypto::cipher::SymmetricCipher;
use crate::database::{CustomDataItem, Database, DeletedObject, Icon, Metadata};
use crate::entry::{AutoType, AutoTypeAssociation, Entry, TimeInfo};
use crate::error::{Error, Result};
use crate::group::{Group, TriState};
use crate::keepass2::UUID_SIZE;
use crate::xml::{XmlElement, XmlReader};

/// Decodes one database's XML payload. Holds the binary pool from the inner
/// header and the advancing random stream state.
pub struct XmlDecoder {
    binary_pool: HashMap<String, Vec<u8>>,
    random_stream: SymmetricCipher,
}

impl XmlDecoder {
    pub fn new(binary_pool: HashMap<String, Vec<u8>>, random_stream: SymmetricCipher) -> Self {
        Self {
            binary_pool,
            random_stream,
        }
    }

    pub fn read_database(mut self, data: &[u8], database: &mut Database) -> Result<()> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::Xml("payload is not valid UTF-8".into()))?;
        let mut reader = XmlReader::new(text)?;

        if !reader.current().is_meta {
            return Err(Error::Xml("no XML declaration found".into()));
        }
        if !reader.read_next_start_element()? {
            return Err(Error::Xml("empty document".into()));
        }

        self.parse_keepass_file(&mut reader, database)
    }

    fn parse_keepass_file(
        &mut self,
        reader: &mut XmlReader<'_>,
        database: &mut Database,
    ) -> Result<()> {
        expect_open(reader, "KeePassFile")?;

        let mut root_seen = false;
        while reader.read_next_start_element()? {
            match reader.current().name.as_str() {
                "Meta" => self.parse_meta(reader.read_from_current()?, database)?,
                "Root" => {
                    if root_seen {
                        return Err(Error::MultipleRootGroups);
                    }
                    self.parse_root(reader.read_from_current()?, database)?;
                    root_seen = true;
                }
                _ => reader.skip_current_element()?,
            }
        }
        Ok(())
    }

    fn parse_meta(&mut self, mut reader: XmlReader<'_>, database: &mut Database) -> Result<()> {
        expect_open(&reader, "Meta")?;
        let meta: &mut Metadata = &mut database.metadata;

        while reader.read_next_start_element()? {
            match reader.current().name.as_str() {
                "Generator" => meta.generator = Some(read_string(&mut reader)?),
                "HeaderHash" => meta.header_hash = Some(self.read_binary(&mut reader)?),
                "DatabaseName" => meta.name = Some(read_string(&mut reader)?),
                "DatabaseNameChanged" => meta.name_changed = Some(read_datetime(&mut reader)?),
                "DatabaseDescription" => meta.description = Some(read_string(&mut reader)?),
                "DatabaseDescriptionChanged" => {
                    meta.description_changed = Some(read_datetime(&mut reader)?)
                }
                "DefaultUserName" => meta.default_user_name = Some(read_string(&mut reader)?),
                "DefaultUserNameChanged" => {
                    meta.default_user_name_changed = Some(read_datetime(&mut reader)?)
                }
                "MaintenanceHistoryDays" => {
                    meta.maintenance_history_days = Some(read_u32(&mut reader)?)
                }
                "Color" => meta.color = read_color(&mut reader)?,
                "MasterKeyChanged" => meta.master_key_changed = Some(read_datetime(&mut reader)?),
                "MasterKeyChangeRec" => meta.master_key_change_rec = Some(read_i32(&mut reader)?),
                "MasterKeyChangeForce" => {
                    meta.master_key_change_force = Some(read_i32(&mut reader)?)
                }
                "MemoryProtection" => {
                    Self::parse_memory_protection(reader.read_from_current()?, meta)?
                }
                "CustomIcons" => self.parse_custom_icons(reader.read_from_current()?, meta)?,
                "RecycleBinEnabled" => meta.recycle_bin_enabled = Some(read_bool(&mut reader)?),
                "RecycleBinUUID" => meta.recycle_bin_uuid = Some(self.read_uuid(&mut reader)?),
                "RecycleBinChanged" => meta.recycle_bin_changed = Some(read_datetime(&mut reader)?),
                "EntryTemplatesGroup" => {
                    meta.entry_templates_group = Some(self.read_uuid(&mut reader)?)
                }
                "EntryTemplatesGroupChanged" => {
                    meta.entry_templates_group_changed = Some(read_datetime(&mut reader)?)
                }
                "LastSelectedGroup" => meta.last_selected_group = Some(self.read_uuid(&mut reader)?),
                "LastTopVisibleGroup" => {
                    meta.last_top_visible_group = Some(self.read_uuid(&mut reader)?)
                }
                "HistoryMaxItems" => meta.history_max_items = Some(read_u32(&mut reader)?),
                "HistoryMaxSize" => meta.history_max_size = Some(read_u32(&mut reader)?),
                "Binaries" => return Err(Error::NotImplemented("Meta binary pool")),
                "CustomData" => {
                    meta.custom_data = self.parse_custom_data(reader.read_from_current()?)?
                }
                "SettingsChanged" => meta.settings_changed = Some(read_datetime(&mut reader)?),
                _ => reader.skip_current_element()?,
            }
        }
        Ok(())
    }

    fn parse_memory_protection(mut reader: XmlReader<'_>, meta: &mut Metadata) -> Result<()> {
        expect_open(&reader, "MemoryProtection")?;
        let protection = &mut meta.memory_protection;

        while reader.read_next_start_element()? {
            match reader.current().name.as_str() {
                "ProtectTitle" => protection.protect_title = read_bool(&mut reader)?,
                "ProtectUserName" => protection.protect_username = read_bool(&mut reader)?,
                "ProtectPassword" => protection.protect_password = read_bool(&mut reader)?,
                "ProtectURL" => protection.protect_url = read_bool(&mut reader)?,
                "ProtectNotes" => protection.protect_notes = read_bool(&mut reader)?,
                _ => reader.skip_current_element()?,
            }
        }
        Ok(())
    }

    fn parse_custom_data(
        &mut self,
        mut reader: XmlReader<'_>,
    ) -> Result<HashMap<String, CustomDataItem>> {
        expect_open(&reader, "CustomData")?;
        let mut items = HashMap::new();

        while reader.read_next_start_element()? {
            match reader.current().name.as_str() {
                "Item" => {
                    let (key, item) = self.parse_custom_data_item(reader.read_from_current()?)?;
                    items.insert(key, item);
                }
                _ => reader.skip_current_element()?,
            }
        }
        Ok(items)
    }

    fn parse_custom_data_item(
        &mut self,
        mut reader: XmlReader<'_>,
    ) -> Result<(String, CustomDataItem)> {
        expect_open(&reader, "Item")?;

        let mut key = None;
        let mut value = None;
        let mut last_modified = None;

        while reader.read_next_start_element()? {
            match reader.current().name.as_str() {
                "Key" => key = Some(read_string(&mut reader)?),
                "Value" => value = Some(read_string(&mut reader)?),
                "LastModificationTime" => last_modified = Some(read_datetime(&mut reader)?),
                _ => reader.skip_current_element()?,
            }
        }

        match (key, value) {
            (Some(key), Some(value)) if !key.is_empty() => Ok((
                key,
                CustomDataItem {
                    value,
                    last_modified,
                },
            )),
            _ => Err(Error::Malformed("custom data key or value missing".into())),
        }
    }

    fn parse_custom_icons(&mut self, mut reader: XmlReader<'_>, meta: &mut Metadata) -> Result<()> {
        expect_open(&reader, "CustomIcons")?;

        while reader.read_next_start_element()? {
            match reader.current().name.as_str() {
                "Icon" => {
                    let (uuid, icon) = self.parse_icon(reader.read_from_current()?)?;
                    meta.custom_icons.insert(uuid, icon);
                }
                _ => reader.skip_current_element()?,
            }
        }
        Ok(())
    }

    fn parse_icon(&mut self, mut reader: XmlReader<'_>) -> Result<(Uuid, Icon)> {
        expect_open(&reader, "Icon")?;

        let mut uuid = None;
        let mut icon = Icon::default();

        while reader.read_next_start_element()? {
            match reader.current().name.as_str() {
                "UUID" => uuid = Some(self.read_uuid(&mut reader)?),
                "Data" => icon.data = self.read_binary(&mut reader)?,
                "Name" => icon.name = Some(read_string(&mut reader)?),
                "LastModificationTime" => {
                    icon.last_modification_time = Some(read_datetime(&mut reader)?)
                }
                _ => reader.skip_current_element()?,
            }
        }

        match uuid {
            Some(uuid) if !icon.data.is_empty() => Ok((uuid, icon)),
            _ => Err(Error::Malformed("icon uuid or data missing".into())),
        }
    }

    fn parse_root(&mut self, mut reader: XmlReader<'_>, database: &mut Database) -> Result<()> {
        expect_open(&reader, "Root")?;

        while reader.read_next_start_element()? {
            match reader.current().name.as_str() {
                "Group" => {
                    if database.root_group.is_some() {
                        return Err(Error::Xml("multiple top-level groups".into()));
                    }
                    database.root_group = Some(self.parse_group(reader.read_from_current()?)?);
                }
                "DeletedObjects" => {
                    database.deleted_objects =
                        self.parse_deleted_objects(reader.read_from_current()?)?
                }
                _ => reader.skip_current_element()?,
            }
        }
        Ok(())
    }

    fn parse_group(&mut self, mut reader: XmlReader<'_>) -> Result<Group> {
        expect_open(&reader, "Group")?;

        let mut group = Group::default();
        let mut uuid = None;

        while reader.read_next_start_element()? {
            match reader.current().name.as_str() {
                "UUID" => uuid = Some(self.read_uuid(&mut reader)?),
                "Name" => group.name = Some(read_string(&mut reader)?),
                "Notes" => group.notes = Some(read_string(&mut reader)?),
                "Tags" => group.tags = Some(read_string(&mut reader)?),
                "Times" => group.time_info = Some(self.parse_times(reader.read_from_current()?)?),
                "IconID" => group.icon_number = Some(read_i32(&mut reader)?),
                "CustomIconUUID" => group.custom_icon = Some(self.read_uuid(&mut reader)?),
                "Group" => group
                    .children
                    .push(self.parse_group(reader.read_from_current()?)?),
                "Entry" => group
                    .entries
                    .push(self.parse_entry(reader.read_from_current()?, false)?),
                "CustomData" => {
                    group.custom_data = self.parse_custom_data(reader.read_from_current()?)?
                }
                "IsExpanded" => group.is_expanded = Some(read_bool(&mut reader)?),
                "DefaultAutoTypeSequence" => {
                    group.default_auto_type_sequence = Some(read_string(&mut reader)?)
                }
                "EnableAutoType" => group.enable_auto_type = read_tristate(&mut reader)?,
                "EnableSearching" => group.enable_searching = read_tristate(&mut reader)?,
                "LastTopVisibleEntry" => {
                    group.last_top_visible_entry = Some(self.read_uuid(&mut reader)?)
                }
                "PreviousParentGroup" => {
                    group.previous_parent_group = Some(self.read_uuid(&mut reader)?)
                }
                _ => reader.skip_current_element()?,
            }
        }

        group.uuid = uuid.ok_or(Error::MissingUuid("group"))?;
        Ok(group)
    }

    fn parse_deleted_objects(&mut self, mut reader: XmlReader<'_>) -> Result<Vec<DeletedObject>> {
        expect_open(&reader, "DeletedObjects")?;
        let mut objects = Vec::new();

        if reader.current().is_close {
            return Ok(objects);
        }

        while reader.read_next_start_element()? {
            match reader.current().name.as_str() {
                "DeletedObject" => {
                    objects.push(self.parse_deleted_object(reader.read_from_current()?)?)
                }
                _ => reader.skip_current_element()?,
            }
        }
        Ok(objects)
    }

    fn parse_deleted_object(&mut self, mut reader: XmlReader<'_>) -> Result<DeletedObject> {
        expect_open(&reader, "DeletedObject")?;
        let mut deleted = DeletedObject::default();

        while reader.read_next_start_element()? {
            match reader.current().name.as_str() {
                "UUID" => deleted.uuid = Some(self.read_uuid(&mut reader)?),
                "DeletionTime" => deleted.deletion_time = Some(read_datetime(&mut reader)?),
                _ => reader.skip_current_element()?,
            }
        }
        Ok(deleted)
    }

    fn parse_entry(&mut self, mut reader: XmlReader<'_>, is_in_history: bool) -> Result<Entry> {
        expect_open(&reader, "Entry")?;

        let mut entry = Entry::default();
        let mut uuid = None;

        while reader.read_next_start_element()? {
            match reader.current().name.as_str() {
                "UUID" => uuid = Some(self.read_uuid(&mut reader)?),
                "String" => {
                    let (key, value, is_protected) =
                        self.parse_entry_string(reader.read_from_current()?)?;
                    if entry.attributes.contains_key(&key) {
                        return Err(Error::DuplicateAttribute(key));
                    }
                    if is_protected {
                        entry.protected_attributes.push(key.clone());
                    }
                    entry.attributes.insert(key, value);
                }
                "Binary" => {
                    let (key, data) = self.parse_entry_binary(reader.read_from_current()?)?;
                    entry.attachments.insert(key, data);
                }
                "AutoType" => {
                    entry.auto_type = Some(self.parse_auto_type(reader.read_from_current()?)?)
                }
                "Times" => entry.time_info = Some(self.parse_times(reader.read_from_current()?)?),
                "History" => {
                    if is_in_history {
                        return Err(Error::NestedHistory);
                    }
                    entry.history = self.parse_history(reader.read_from_current()?)?;
                }
                "CustomData" => {
                    entry.custom_data = self.parse_custom_data(reader.read_from_current()?)?
                }
                "IconID" => entry.icon_number = Some(read_i32(&mut reader)?),
                "CustomIconUUID" => entry.custom_icon = Some(self.read_uuid(&mut reader)?),
                "ForegroundColor" => entry.foreground_color = read_color(&mut reader)?,
                "BackgroundColor" => entry.background_color = read_color(&mut reader)?,
                "OverrideURL" => entry.override_url = Some(read_string(&mut reader)?),
                "Tags" => entry.tags = Some(read_string(&mut reader)?),
                "QualityCheck" => entry.quality_check = Some(read_bool(&mut reader)?),
                "PreviousParentGroup" => {
                    entry.previous_parent_group = Some(self.read_uuid(&mut reader)?)
                }
                _ => reader.skip_current_element()?,
            }
        }

        entry.uuid = uuid.ok_or(Error::MissingUuid("entry"))?;
        Ok(entry)
    }

    fn parse_history(&mut self, mut reader: XmlReader<'_>) -> Result<Vec<Entry>> {
        expect_open(&reader, "History")?;
        let mut history = Vec::new();

        while reader.read_next_start_element()? {
            match reader.current().name.as_str() {
                "Entry" => history.push(self.parse_entry(reader.read_from_current()?, true)?),
                _ => reader.skip_current_element()?,
            }
        }
        Ok(history)
    }

    fn parse_entry_string(
        &mut self,
        mut reader: XmlReader<'_>,
    ) -> Result<(String, String, bool)> {
        expect_open(&reader, "String")?;

        let mut key = None;
        let mut value = None;
        let mut is_protected = false;

        while reader.read_next_start_element()? {
            match reader.current().name.as_str() {
                "Key" => key = Some(read_string(&mut reader)?),
                "Value" => {
                    let (text, protected) = self.read_protected_string(&mut reader)?;
                    value = Some(text);
                    is_protected = protected;
                }
                _ => reader.skip_current_element()?,
            }
        }

        match (key, value) {
            (Some(key), Some(value)) => Ok((key, value, is_protected)),
            _ => Err(Error::Malformed("entry string key or value missing".into())),
        }
    }

    fn parse_entry_binary(&mut self, mut reader: XmlReader<'_>) -> Result<(String, Vec<u8>)> {
        expect_open(&reader, "Binary")?;

        let mut key = None;
        let mut data = None;

        while reader.read_next_start_element()? {
            match reader.current().name.as_str() {
                "Key" => key = Some(read_string(&mut reader)?),
                "Value" => {
                    data = Some(match reader.current().attribute("Ref") {
                        Some(reference) => {
                            let bytes = self
                                .binary_pool
                                .get(reference)
                                .ok_or_else(|| Error::UnknownBinaryRef(reference.to_owned()))?
                                .clone();
                            reader.skip_current_element()?;
                            bytes
                        }
                        None => self.read_binary(&mut reader)?,
                    });
                }
                _ => reader.skip_current_element()?,
            }
        }

        match (key, data) {
            (Some(key), Some(data)) => Ok((key, data)),
            _ => Err(Error::Malformed("attachment key or value missing".into())),
        }
    }

    fn parse_auto_type(&mut self, mut reader: XmlReader<'_>) -> Result<AutoType> {
        expect_open(&reader, "AutoType")?;
        let mut auto_type = AutoType::default();

        while reader.read_next_start_element()? {
            match reader.current().name.as_str() {
                "Enabled" => auto_type.enabled = Some(read_bool(&mut reader)?),
                "DataTransferObfuscation" => {
                    auto_type.data_transfer_obfuscation = Some(read_i32(&mut reader)?)
                }
                "DefaultSequence" => auto_type.default_sequence = Some(read_string(&mut reader)?),
                "Association" => auto_type
                    .associations
                    .push(Self::parse_auto_type_association(
                        reader.read_from_current()?,
                    )?),
                _ => reader.skip_current_element()?,
            }
        }
        Ok(auto_type)
    }

    fn parse_auto_type_association(mut reader: XmlReader<'_>) -> Result<AutoTypeAssociation> {
        expect_open(&reader, "Association")?;
        let mut association = AutoTypeAssociation::default();

        while reader.read_next_start_element()? {
            match reader.current().name.as_str() {
                "Window" => association.window = read_string(&mut reader)?,
                "KeystrokeSequence" => association.sequence = read_string(&mut reader)?,
                _ => reader.skip_current_element()?,
            }
        }
        Ok(association)
    }

    fn parse_times(&mut self, mut reader: XmlReader<'_>) -> Result<TimeInfo> {
        expect_open(&reader, "Times")?;
        let mut times = TimeInfo::default();

        while reader.read_next_start_element()? {
            match reader.current().name.as_str() {
                "CreationTime" => times.creation_time = Some(read_datetime(&mut reader)?),
                "LastModificationTime" => {
                    times.last_modification_time = Some(read_datetime(&mut reader)?)
                }
                "LastAccessTime" => times.last_access_time = Some(read_datetime(&mut reader)?),
                "ExpiryTime" => times.expiry_time = Some(read_datetime(&mut reader)?),
                "Expires" => times.expires = Some(read_bool(&mut reader)?),
                "UsageCount" => times.usage_count = Some(read_u32(&mut reader)?),
                "LocationChanged" => times.location_changed = Some(read_datetime(&mut reader)?),
                _ => reader.skip_current_element()?,
            }
        }
        Ok(times)
    }

    /// Base64-encoded binary content; decrypted when the element carries
    /// `Protected="True"`.
    fn read_binary(&mut self, reader: &mut XmlReader<'_>) -> Result<Vec<u8>> {
        let protected = is_protected(reader.current());
        let text = reader.read_element_text()?;
        let data = BASE64
            .decode(text.trim())
            .map_err(|e| Error::Xml(format!("invalid base64 value: {e}")))?;
        if protected {
            return self.random_stream.process(&data);
        }
        Ok(data)
    }

    fn read_uuid(&mut self, reader: &mut XmlReader<'_>) -> Result<Uuid> {
        let data = self.read_binary(reader)?;
        if data.len() != UUID_SIZE {
            return Err(Error::Xml(format!("invalid uuid length {}", data.len())));
        }
        Ok(Uuid::from_slice(&data).expect("length checked"))
    }

    fn read_protected_string(&mut self, reader: &mut XmlReader<'_>) -> Result<(String, bool)> {
        let protected = is_protected(reader.current());
        if reader.current().is_close {
            return Ok((String::new(), protected));
        }

        let text = reader.read_element_text()?;
        if !protected {
            return Ok((text, false));
        }

        let data = BASE64
            .decode(text.trim())
            .map_err(|e| Error::Xml(format!("invalid protected value: {e}")))?;
        let plain = self.random_stream.process(&data)?;
        let plain = String::from_utf8(plain)
            .map_err(|_| Error::Xml("protected value is not valid UTF-8".into()))?;
        Ok((plain, true))
    }
}

fn expect_open(reader: &XmlReader<'_>, name: &str) -> Result<()> {
    let current = reader.current();
    if !current.is_open || current.name != name {
        return Err(Error::Xml(format!(
            "expected {:?}, found {:?}",
            name, current.name
        )));
    }
    Ok(())
}

fn is_protected(element: &XmlElement) -> bool {
    element
        .attribute("Protected")
        .is_some_and(|value| value.eq_ignore_ascii_case("true"))
}

fn read_string(reader: &mut XmlReader<'_>) -> Result<String> {
    if reader.current().is_close {
        return Ok(String::new());
    }
    reader.read_element_text()
}

fn read_bool(reader: &mut XmlReader<'_>) -> Result<bool> {
    let value = read_string(reader)?;
    if value.is_empty() {
        return Ok(false);
    }
    if value.eq_ignore_ascii_case("true") {
        return Ok(true);
    }
    if value.eq_ignore_ascii_case("false") {
        return Ok(false);
    }
    Err(Error::Xml(format!("invalid bool value {value:?}")))
}

fn read_tristate(reader: &mut XmlReader<'_>) -> Result<TriState> {
    let value = read_string(reader)?;
    if value.eq_ignore_ascii_case("null") {
        Ok(TriState::Inherit)
    } else if value.eq_ignore_ascii_case("true") {
        Ok(TriState::Enable)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(TriState::Disable)
    } else {
        Err(Error::Xml(format!("invalid tri-state value {value:?}")))
    }
}

fn read_i32(reader: &mut XmlReader<'_>) -> Result<i32> {
    let value = read_string(reader)?;
    value
        .trim()
        .parse()
        .map_err(|_| Error::Xml(format!("invalid number {value:?}")))
}

fn read_u32(reader: &mut XmlReader<'_>) -> Result<u32> {
    let value = read_string(reader)?;
    value
        .trim()
        .parse()
        .map_err(|_| Error::Xml(format!("invalid unsigned number {value:?}")))
}

/// `#RRGGBB` or empty.
fn read_color(reader: &mut XmlReader<'_>) -> Result<Option<String>> {
    let value = read_string(reader)?;
    if value.is_empty() {
        return Ok(None);
    }

    let hex = value.strip_prefix('#').ok_or_else(color_error)?;
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(color_error());
    }
    Ok(Some(value))
}

fn color_error() -> Error {
    Error::Xml("invalid color value".into())
}

/// Timestamps are the base64 of a 64-bit little-endian count of seconds
/// since 0001-01-01T00:00:00Z.
fn read_datetime(reader: &mut XmlReader<'_>) -> Result<DateTime<Utc>> {
    let value = read_string(reader)?;
    let Ok(data) = BASE64.decode(value.trim()) else {
        return Err(Error::NotImplemented("textual datetime values"));
    };

    let mut bytes = [0u8; 8];
    let len = data.len().min(8);
    bytes[..len].copy_from_slice(&data[..len]);
    let seconds = LittleEndian::read_u64(&bytes);

    datetime_from_epoch_seconds(seconds)
}

fn datetime_from_epoch_seconds(seconds: u64) -> Result<DateTime<Utc>> {
    let epoch = Utc
        .with_ymd_and_hms(1, 1, 1, 0, 0, 0)
        .single()
        .expect("fixed epoch");
    i64::try_from(seconds)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|offset| epoch.checked_add_signed(offset))
        .ok_or(Error::DateOutOfRange(seconds))
}
