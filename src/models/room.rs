use crate::codec::MessageComposer;
use crate::models::types::{HabboId, ItemId, RoomId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomType {
    Public,
    Private,
}

/// Who may enter without being let in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessState {
    Open,
    Locked,
    Password,
}

impl AccessState {
    pub fn to_wire(self) -> u32 {
        match self {
            AccessState::Open => 0,
            AccessState::Locked => 1,
            AccessState::Password => 2,
        }
    }
}

/// Navigator icon: a background, an optional foreground overlay, and a
/// sparse position -> item map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoomIcon {
    pub background: i32,
    pub foreground: i32,
    pub items: BTreeMap<i32, i32>,
}

/// A scheduled happening inside one room. Never persisted; expiry is checked
/// lazily wherever the event is read.
#[derive(Debug, Clone)]
pub struct RoomEvent {
    pub host: HabboId,
    pub name: String,
    pub description: String,
    pub category: i32,
    pub started_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
}

impl RoomEvent {
    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        self.ends_at.is_some_and(|end| now >= end)
    }
}

/// Per-instance room settings. Mutated by administrative operations and
/// persisted by the repository collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    pub id: RoomId,
    pub name: String,
    pub description: String,
    pub owner_id: HabboId,
    pub owner_name: String,
    pub room_type: RoomType,
    pub access: AccessState,
    pub password: String,
    pub capacity: u32,
    pub category: i32,
    pub tags: Vec<String>,
    pub model: String,
    pub allow_pets: bool,
    pub allow_walkthrough: bool,
    pub wallpaper: i32,
    pub floor: i32,
    pub landscape: String,
    pub icon: RoomIcon,
    pub score: i32,
}

impl RoomConfig {
    /// Serialize the navigator metadata block. The positional order is a
    /// client contract and must not change.
    pub fn compose_info(
        &self,
        c: &mut MessageComposer,
        event: Option<&RoomEvent>,
        current_users: u32,
    ) {
        c.append_uint(self.id.raw() as u32);
        c.append_bool(event.is_some());
        c.append_string(&self.name);
        c.append_string(&self.owner_name);
        c.append_uint(self.access.to_wire());
        c.append_uint(current_users);
        c.append_uint(self.capacity);
        c.append_string(&self.description);
        // Two legacy flags the client requires but never varies on.
        c.append_bool(true);
        c.append_bool(true);
        c.append_int(self.score);
        c.append_int(self.category);
        match event {
            Some(ev) => c.append_string(&ev.started_at.format("%d-%m-%Y %H:%M:%S").to_string()),
            None => c.append_string(""),
        };
        c.append_uint(self.tags.len() as u32);
        for tag in &self.tags {
            c.append_string(tag);
        }
        c.append_int(self.icon.background);
        c.append_int(self.icon.foreground);
        c.append_uint(self.icon.items.len() as u32);
        for (position, item) in &self.icon.items {
            c.append_int(*position);
            c.append_int(*item);
        }
        c.append_bool(true);
    }
}

/// State of the single moodlight (wall dimmer) a room may own.
#[derive(Debug, Clone)]
pub struct MoodlightState {
    pub item_id: ItemId,
    pub enabled: bool,
    pub preset: i32,
    pub background_only: bool,
    pub color: String,
    pub intensity: i32,
}

impl MoodlightState {
    pub fn new(item_id: ItemId) -> Self {
        Self {
            item_id,
            enabled: false,
            preset: 1,
            background_only: false,
            color: "#000000".into(),
            intensity: 255,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{b64_decode, vl64_decode};

    fn mk_config() -> RoomConfig {
        RoomConfig {
            id: RoomId(41),
            name: "Rooftop Cafe".into(),
            description: "Best view in the hotel.".into(),
            owner_id: HabboId(7),
            owner_name: "jibbi".into(),
            room_type: RoomType::Private,
            access: AccessState::Locked,
            password: String::new(),
            capacity: 25,
            category: 2,
            tags: vec!["cafe".into(), "chill".into()],
            model: "model_a".into(),
            allow_pets: false,
            allow_walkthrough: true,
            wallpaper: 110,
            floor: 221,
            landscape: "1.1".into(),
            icon: RoomIcon::default(),
            score: 12,
        }
    }

    #[test]
    fn info_block_starts_with_id_and_event_flag() {
        let cfg = mk_config();
        let mut c = MessageComposer::new(54);
        cfg.compose_info(&mut c, None, 3);
        let bytes = c.into_bytes();

        assert_eq!(b64_decode(&bytes[..2]), Some(54));
        let (id, used) = vl64_decode(&bytes[2..]).unwrap();
        assert_eq!(id, 41);
        let (has_event, _) = vl64_decode(&bytes[2 + used..]).unwrap();
        assert_eq!(has_event, 0);
    }

    #[test]
    fn event_expiry_is_lazy_timestamp_comparison() {
        let now = Utc::now();
        let ev = RoomEvent {
            host: HabboId(7),
            name: "pool party".into(),
            description: String::new(),
            category: 1,
            started_at: now,
            ends_at: Some(now - chrono::Duration::seconds(1)),
        };
        assert!(ev.has_expired(now));

        let open_ended = RoomEvent { ends_at: None, ..ev };
        assert!(!open_ended.has_expired(now));
    }
}
