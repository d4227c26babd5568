//! Background game loop: the periodic room tick plus the ambient behaviour
//! that rides on it.

use crate::state::Registry;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Chance per tick that an idle bot or pet wanders to a new tile.
const WANDER_CHANCE: f64 = 0.05;

/// Spawn the tick loop. It runs until the process exits; room housekeeping
/// and unloading all hang off this one task.
pub fn spawn_tick_loop(registry: Arc<Registry>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_millis(registry.config.tick_interval_ms));
        tracing::info!(interval_ms = registry.config.tick_interval_ms, "tick loop running");
        loop {
            interval.tick().await;
            wander_npcs(&registry);
            registry.rooms.tick_all(&registry.config).await;
        }
    })
}

/// Idle bots and pets occasionally pick a random tile and stroll over.
/// Unreachable picks simply fail to path and nothing moves.
fn wander_npcs(registry: &Registry) {
    let mut rng = rand::rng();
    for room in registry.rooms.loaded_rooms() {
        for npc in room.npc_ids() {
            let busy = room.with_user(npc, |u| u.is_walking()).unwrap_or(true);
            if busy || !rng.random_bool(WANDER_CHANCE) {
                continue;
            }
            let x = rng.random_range(0..room.template.width.max(1));
            let y = rng.random_range(0..room.template.height.max(1));
            room.walk_to(npc, x, y);
        }
    }
}
