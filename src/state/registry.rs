use crate::config::Config;
use crate::repo::{InventoryRepo, RoomRepo};
use crate::rooms::manager::RoomManager;
use crate::rooms::room::RoomDeps;
use crate::services::{BfsPathfinder, ChatCommandHandler, NullCommandHandler, Pathfinder};
use chrono::Duration;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct Repos {
    pub room: Arc<dyn RoomRepo>,
    pub inventory: Arc<dyn InventoryRepo>,
}

/// Shared server state. One instance lives behind an `Arc` for the lifetime
/// of the process; everything that handles traffic gets a clone.
pub struct Registry {
    pub config: Arc<Config>,
    pub repos: Arc<Repos>,
    pub rooms: Arc<RoomManager>,
    pub online: RwLock<BTreeSet<String>>,
}

impl Registry {
    pub fn new(repos: Arc<Repos>, config: Arc<Config>) -> Self {
        Self::with_collaborators(
            repos,
            config,
            Arc::new(BfsPathfinder),
            Arc::new(NullCommandHandler),
        )
    }

    /// Wire in a custom pathfinder or chat command handler.
    pub fn with_collaborators(
        repos: Arc<Repos>,
        config: Arc<Config>,
        pathfinder: Arc<dyn Pathfinder>,
        commands: Arc<dyn ChatCommandHandler>,
    ) -> Self {
        let deps = RoomDeps {
            inventory: repos.inventory.clone(),
            pathfinder,
            commands,
            ban_ttl: Duration::seconds(config.ban_ttl_secs),
        };
        let rooms = Arc::new(RoomManager::new(repos.room.clone(), deps));
        Self {
            config,
            repos,
            rooms,
            online: RwLock::new(BTreeSet::new()),
        }
    }

    pub fn set_online(&self, username: &str, online: bool) {
        let mut g = self.online.write();
        if online {
            g.insert(username.to_string());
        } else {
            g.remove(username);
        }
    }

    pub fn who(&self) -> Vec<String> {
        self.online.read().iter().cloned().collect()
    }
}
