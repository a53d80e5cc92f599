//! Group model

use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::database::CustomDataItem;
use crate::entry::{Entry, TimeInfo};

/// Inheritable group switches: `null` in the XML means inherit from the
/// parent group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum TriState {
    #[default]
    Inherit,
    Enable,
    Disable,
}

/// A group node in the database tree.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Group {
    pub uuid: Uuid,
    pub name: Option<String>,
    pub notes: Option<String>,
    pub tags: Option<String>,
    pub icon_number: Option<i32>,
    pub custom_icon: Option<Uuid>,
    pub time_info: Option<TimeInfo>,
    pub is_expanded: Option<bool>,
    pub default_auto_type_sequence: Option<String>,
    pub enable_auto_type: TriState,
    pub enable_searching: TriState,
    pub last_top_visible_entry: Option<Uuid>,
    pub previous_parent_group: Option<Uuid>,
    pub custom_data: HashMap<String, CustomDataItem>,
    pub children: Vec<Group>,
    pub entries: Vec<Entry>,
}

impl Group {
    /// Depth-first iteration over this group and all descendants.
    pub fn iter_groups(&self) -> impl Iterator<Item = &Group> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let group = stack.pop()?;
            stack.extend(group.children.iter().rev());
            Some(group)
        })
    }

    /// All entries in this group and its descendants.
    pub fn iter_entries(&self) -> impl Iterator<Item = &Entry> {
        self.iter_groups().flat_map(|group| group.entries.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_is_depth_first_and_covers_entries() {
        let mut root = Group {
            name: Some("root".into()),
            ..Group::default()
        };
        let mut child = Group {
            name: Some("child".into()),
            ..Group::default()
        };
        child.children.push(Group {
            name: Some("grandchild".into()),
            ..Group::default()
        });
        child.entries.push(Entry::default());
        root.children.push(child);
        root.children.push(Group {
            name: Some("sibling".into()),
            ..Group::default()
        });
        root.entries.push(Entry::default());

        let names: Vec<_> = root
            .iter_groups()
            .map(|g| g.name.clone().unwrap())
            .collect();
        assert_eq!(names, ["root", "child", "grandchild", "sibling"]);
        assert_eq!(root.iter_entries().count(), 2);
    }
}
