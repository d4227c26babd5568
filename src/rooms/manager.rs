//! Lifecycle of loaded room instances.
//!
//! Rooms are loaded on first entry and unloaded once they have sat empty for
//! a configured number of ticks. Templates are parsed once per model name
//! and shared between every room instance built on that model.

use crate::config::Config;
use crate::error::{AppResult, DomainError};
use crate::models::types::{HabboId, RoomId};
use crate::repo::RoomRepo;
use crate::rooms::room::{Room, RoomDeps};
use crate::rooms::template::RoomTemplate;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;

pub struct RoomManager {
    rooms: DashMap<RoomId, Arc<Room>>,
    templates: DashMap<String, Arc<RoomTemplate>>,
    repo: Arc<dyn RoomRepo>,
    deps: RoomDeps,
}

impl RoomManager {
    pub fn new(repo: Arc<dyn RoomRepo>, deps: RoomDeps) -> Self {
        Self {
            rooms: DashMap::new(),
            templates: DashMap::new(),
            repo,
            deps,
        }
    }

    pub fn get(&self, id: RoomId) -> Option<Arc<Room>> {
        self.rooms.get(&id).map(|r| r.clone())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn loaded_rooms(&self) -> Vec<Arc<Room>> {
        self.rooms.iter().map(|r| r.clone()).collect()
    }

    /// The loaded room the user currently occupies, if any.
    pub fn user_room(&self, user: HabboId) -> Option<Arc<Room>> {
        self.rooms
            .iter()
            .find(|r| r.has_user(user))
            .map(|r| r.clone())
    }

    /// Fetch a loaded room or bring it up from the repository: config,
    /// template, items and rights. Two racing callers may both build the
    /// instance; the map keeps whichever lands first and the loser's copy is
    /// dropped.
    pub async fn get_or_load(&self, id: RoomId) -> AppResult<Arc<Room>> {
        if let Some(room) = self.get(id) {
            return Ok(room);
        }

        let Some(config) = self.repo.load_config(id).await? else {
            return Err(DomainError::RoomNotFound(id));
        };
        let template = self.template(&config.model).await?;

        let room = Arc::new(Room::new(config, template, self.deps.clone()));
        room.load_items(self.repo.load_items(id).await?);
        room.load_rights(self.repo.load_rights(id).await?);
        room.regenerate_grid();

        let room = self.rooms.entry(id).or_insert(room).clone();
        tracing::info!(room = %id, "room loaded");
        Ok(room)
    }

    /// Parse-once template cache. A missing model is logged and surfaced as
    /// an error; the caller decides whether that kills the room entry.
    pub async fn template(&self, name: &str) -> AppResult<Arc<RoomTemplate>> {
        if let Some(t) = self.templates.get(name) {
            return Ok(t.clone());
        }
        let Some(model) = self.repo.load_model(name).await? else {
            tracing::warn!(model = name, "unknown room model");
            return Err(DomainError::ModelNotFound(name.to_string()));
        };
        let mut template =
            RoomTemplate::parse(name, &model.heightmap, model.door, model.club_only);
        template.apply_static_furniture(&model.static_furniture);
        let template = Arc::new(template);
        self.templates.insert(name.to_string(), template.clone());
        Ok(template)
    }

    /// Drop a room instance, persisting bot and pet positions on the way
    /// out. Occupied rooms refuse to unload.
    pub async fn unload(&self, id: RoomId) -> AppResult<()> {
        let Some(room) = self.get(id) else {
            return Ok(());
        };
        if room.unit_count() > 0 {
            return Err(DomainError::PreconditionFailed("room still occupied"));
        }
        self.repo.save_config(&room.config()).await?;
        self.rooms.remove(&id);
        tracing::info!(room = %id, "room unloaded");
        Ok(())
    }

    /// Run one housekeeping tick over every loaded room, then unload the
    /// ones that have been empty past the grace period. A room flagged
    /// keep-alive (public rooms, mostly) survives regardless.
    pub async fn tick_all(&self, config: &Config) {
        let mut stale = Vec::new();
        for room in self.loaded_rooms() {
            room.tick(config.idle_sleep_ticks);
            if room.unit_count() == 0
                && !room.keep_alive.load(Ordering::Relaxed)
                && room.empty_ticks() >= config.room_unload_ticks
            {
                stale.push(room.id);
            }
        }
        for id in stale {
            if let Err(e) = self.unload(id).await {
                tracing::warn!(room = %id, error = %e, "unload failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::room::{AccessState, RoomConfig, RoomIcon, RoomType};
    use crate::repo::mem::{MemoryInventory, MemoryRoomRepo};
    use crate::repo::room::RoomModelData;
    use crate::rooms::template::DoorSpec;
    use crate::rooms::user::RoomUserKind;
    use crate::services::{BfsPathfinder, NullCommandHandler};
    use chrono::Duration;

    fn mk_repo() -> Arc<MemoryRoomRepo> {
        let repo = Arc::new(MemoryRoomRepo::new());
        repo.insert_model(
            "model_t",
            RoomModelData {
                heightmap: "000\r!000\r!000".into(),
                door: DoorSpec { x: 0, y: 0, z: 0.0, direction: 2 },
                static_furniture: Vec::new(),
                club_only: false,
            },
        );
        repo.insert_config(RoomConfig {
            id: RoomId(5),
            name: "Lobby".into(),
            description: String::new(),
            owner_id: HabboId(1),
            owner_name: "owner".into(),
            room_type: RoomType::Private,
            access: AccessState::Open,
            password: String::new(),
            capacity: 25,
            category: 1,
            tags: Vec::new(),
            model: "model_t".into(),
            allow_pets: false,
            allow_walkthrough: false,
            wallpaper: 0,
            floor: 0,
            landscape: "0.0".into(),
            icon: RoomIcon::default(),
            score: 0,
        });
        repo
    }

    fn mk_manager(repo: Arc<MemoryRoomRepo>) -> RoomManager {
        RoomManager::new(
            repo,
            RoomDeps {
                inventory: Arc::new(MemoryInventory::new()),
                pathfinder: Arc::new(BfsPathfinder),
                commands: Arc::new(NullCommandHandler),
                ban_ttl: Duration::seconds(900),
            },
        )
    }

    fn mk_human(name: &str) -> RoomUserKind {
        RoomUserKind::Human {
            username: name.into(),
            figure: String::new(),
            gender: "F".into(),
            motto: String::new(),
            channel: None,
            spectator: false,
        }
    }

    #[tokio::test]
    async fn loads_once_and_shares_the_template() {
        let manager = mk_manager(mk_repo());
        let first = manager.get_or_load(RoomId(5)).await.unwrap();
        let second = manager.get_or_load(RoomId(5)).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.room_count(), 1);
        assert!(Arc::ptr_eq(
            &first.template,
            &manager.template("model_t").await.unwrap()
        ));
    }

    #[tokio::test]
    async fn unknown_room_and_model_are_errors() {
        let manager = mk_manager(mk_repo());
        assert!(matches!(
            manager.get_or_load(RoomId(404)).await,
            Err(DomainError::RoomNotFound(_))
        ));
        assert!(matches!(
            manager.template("model_zz").await,
            Err(DomainError::ModelNotFound(_))
        ));
    }

    #[tokio::test]
    async fn empty_rooms_unload_after_the_grace_period() {
        let manager = mk_manager(mk_repo());
        let room = manager.get_or_load(RoomId(5)).await.unwrap();
        let user = HabboId(10);
        room.add_user(user, mk_human("alice"));

        let config = Config { room_unload_ticks: 2, ..Config::default() };
        manager.tick_all(&config).await;
        assert_eq!(manager.room_count(), 1, "occupied rooms stay");

        room.remove_user(user, false, false);
        manager.tick_all(&config).await;
        assert_eq!(manager.room_count(), 1, "grace period not yet over");
        manager.tick_all(&config).await;
        assert_eq!(manager.room_count(), 0);
    }

    #[tokio::test]
    async fn keep_alive_rooms_survive_being_empty() {
        let manager = mk_manager(mk_repo());
        let room = manager.get_or_load(RoomId(5)).await.unwrap();
        room.keep_alive.store(true, Ordering::Relaxed);

        let config = Config { room_unload_ticks: 1, ..Config::default() };
        for _ in 0..3 {
            manager.tick_all(&config).await;
        }
        assert_eq!(manager.room_count(), 1);
    }

    #[tokio::test]
    async fn finds_the_room_a_user_occupies() {
        let manager = mk_manager(mk_repo());
        let room = manager.get_or_load(RoomId(5)).await.unwrap();
        let user = HabboId(10);
        assert!(manager.user_room(user).is_none());
        room.add_user(user, mk_human("alice"));
        assert!(manager.user_room(user).is_some_and(|r| r.id == RoomId(5)));
    }
}
