//! The per-room aggregate: occupants, furniture, rights, bans and trades of
//! one loaded room instance.
//!
//! Handlers and the periodic tick call the same public operations, so
//! nothing here may assume single-threaded access. Collections are DashMaps
//! and copy-on-read locks; iteration is lock-free, structural mutation is
//! atomic. Cross-field ordering (say, regenerating the grid after an item
//! change) is the caller's contract, not enforced here. One rule keeps the
//! shard locks safe: copy what you need out of a map entry, drop the guard,
//! then act.

use crate::codec::{MessageComposer, opcodes};
use crate::models::item::{InteractionType, RoomItem};
use crate::models::room::{MoodlightState, RoomConfig, RoomEvent, RoomType};
use crate::models::types::{HabboId, ItemId, RoomId};
use crate::repo::InventoryRepo;
use crate::rooms::grid::TileGrid;
use crate::rooms::template::{RoomTemplate, TileState};
use crate::rooms::trade::{FlagOutcome, Trade, TradeStage};
use crate::rooms::user::{
    ChatType, Emotion, RoomUser, RoomUserKind, STATUS_LAY, STATUS_MOVE, STATUS_SIT, STATUS_TRADE,
    octant_towards,
};
use crate::services::{BotListener, ChatCommandHandler, Pathfinder};
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

/// Collaborators injected at construction; the room never reaches back into
/// a global registry to find them.
#[derive(Clone)]
pub struct RoomDeps {
    pub inventory: Arc<dyn InventoryRepo>,
    pub pathfinder: Arc<dyn Pathfinder>,
    pub commands: Arc<dyn ChatCommandHandler>,
    /// In-memory ban lifetime. Not persisted anywhere.
    pub ban_ttl: Duration,
}

pub struct Room {
    pub id: RoomId,
    pub template: Arc<RoomTemplate>,
    config: RwLock<RoomConfig>,
    users: DashMap<HabboId, RoomUser>,
    items: DashMap<ItemId, RoomItem>,
    rights: RwLock<BTreeSet<HabboId>>,
    bans: DashMap<HabboId, DateTime<Utc>>,
    trades: RwLock<Vec<Arc<Trade>>>,
    event: RwLock<Option<RoomEvent>>,
    moodlight: RwLock<Option<MoodlightState>>,
    grid: RwLock<TileGrid>,
    bot_listeners: RwLock<Vec<Arc<dyn BotListener>>>,
    pub keep_alive: AtomicBool,
    empty_ticks: AtomicU32,
    next_virtual_id: AtomicI32,
    deps: RoomDeps,
}

impl Room {
    pub fn new(config: RoomConfig, template: Arc<RoomTemplate>, deps: RoomDeps) -> Self {
        let grid = TileGrid::build(&template, &[], &[]);
        Self {
            id: config.id,
            template,
            config: RwLock::new(config),
            users: DashMap::new(),
            items: DashMap::new(),
            rights: RwLock::new(BTreeSet::new()),
            bans: DashMap::new(),
            trades: RwLock::new(Vec::new()),
            event: RwLock::new(None),
            moodlight: RwLock::new(None),
            grid: RwLock::new(grid),
            bot_listeners: RwLock::new(Vec::new()),
            keep_alive: AtomicBool::new(false),
            empty_ticks: AtomicU32::new(0),
            next_virtual_id: AtomicI32::new(0),
            deps,
        }
    }

    pub fn config(&self) -> RoomConfig {
        self.config.read().clone()
    }

    pub fn update_config(&self, f: impl FnOnce(&mut RoomConfig)) {
        f(&mut self.config.write());
    }

    pub fn add_bot_listener(&self, listener: Arc<dyn BotListener>) {
        self.bot_listeners.write().push(listener);
    }

    // ---- occupants --------------------------------------------------------

    /// Insert an occupant at the door and announce it. Returns the virtual
    /// id assigned for this visit.
    pub fn add_user(&self, habbo_id: HabboId, kind: RoomUserKind) -> i32 {
        let virtual_id = self.next_virtual_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut user = RoomUser::new(habbo_id, virtual_id, kind);
        let door = self.template.door;
        user.set_position(door.x, door.y, door.z);
        user.set_rotation(door.direction);
        let is_bot = user.is_bot();

        let mut c = MessageComposer::new(opcodes::ROOM_USERS);
        c.append_uint(1);
        user.compose(&mut c);
        let entry = c.into_bytes();

        self.users.insert(habbo_id, user);
        self.empty_ticks.store(0, Ordering::Relaxed);
        self.update_user_status(habbo_id);
        self.broadcast(entry);

        if is_bot {
            for listener in self.bot_listeners.read().iter() {
                listener.on_bot_deployed(self.id, habbo_id);
            }
        }
        virtual_id
    }

    /// Remove an occupant. A kick broadcasts the kick message before the
    /// occupant disappears from the map. Returns the removed state so the
    /// caller can persist bot/pet positions through the repository.
    pub fn remove_user(
        &self,
        habbo_id: HabboId,
        notify_client: bool,
        notify_kick: bool,
    ) -> Option<RoomUser> {
        self.cancel_trade(habbo_id);

        let virtual_id = self.virtual_id_of(habbo_id)?;
        if notify_kick {
            let mut c = MessageComposer::new(opcodes::KICK);
            c.append_int(virtual_id);
            self.broadcast(c.into_bytes());
        }

        let (_, user) = self.users.remove(&habbo_id)?;

        let mut c = MessageComposer::new(opcodes::USER_REMOVED);
        c.append_string(&virtual_id.to_string());
        let gone = c.into_bytes();
        if notify_client {
            if let Some(ch) = user.channel() {
                let _ = ch.send(gone.clone());
            }
        }
        self.broadcast(gone);

        if user.is_bot() {
            for listener in self.bot_listeners.read().iter() {
                listener.on_bot_removed(self.id, habbo_id);
            }
        }
        Some(user)
    }

    pub fn has_user(&self, habbo_id: HabboId) -> bool {
        self.users.contains_key(&habbo_id)
    }

    /// Humans in the room, spectators excluded; what capacity counts.
    pub fn user_count(&self) -> usize {
        self.users
            .iter()
            .filter(|u| u.is_human() && !u.is_spectator())
            .count()
    }

    pub fn unit_count(&self) -> usize {
        self.users.len()
    }

    /// Bots and pets currently in the room.
    pub fn npc_ids(&self) -> Vec<HabboId> {
        self.users
            .iter()
            .filter(|u| !u.is_human())
            .map(|u| u.habbo_id)
            .collect()
    }

    pub fn virtual_id_of(&self, habbo_id: HabboId) -> Option<i32> {
        self.users.get(&habbo_id).map(|u| u.virtual_id)
    }

    pub fn with_user<R>(&self, habbo_id: HabboId, f: impl FnOnce(&RoomUser) -> R) -> Option<R> {
        self.users.get(&habbo_id).map(|u| f(&u))
    }

    pub fn with_user_mut<R>(
        &self,
        habbo_id: HabboId,
        f: impl FnOnce(&mut RoomUser) -> R,
    ) -> Option<R> {
        self.users.get_mut(&habbo_id).map(|mut u| f(&mut u))
    }

    // ---- furniture --------------------------------------------------------

    /// Bulk insert at load time; no broadcasts. Callers regenerate the grid
    /// afterwards.
    pub fn load_items(&self, items: Vec<RoomItem>) {
        for item in items {
            if item.base.interaction == InteractionType::Dimmer {
                let mut moodlight = self.moodlight.write();
                if moodlight.is_none() {
                    *moodlight = Some(MoodlightState::new(item.id));
                }
            }
            self.items.insert(item.id, item);
        }
    }

    pub fn place_floor_item(&self, item: RoomItem) -> bool {
        if item.is_wall_item() {
            return false;
        }
        if item.base.interaction == InteractionType::Dimmer && !self.register_dimmer(item.id) {
            return false;
        }

        let mut c = MessageComposer::new(opcodes::ITEM_PLACED);
        item.compose(&mut c);
        let placed = c.into_bytes();

        let footprint = item.footprint();
        self.items.insert(item.id, item);
        self.broadcast(placed);
        self.refresh_statuses_on(&footprint);
        true
    }

    pub fn place_wall_item(&self, item: RoomItem) -> bool {
        if !item.is_wall_item() {
            return false;
        }
        if item.base.interaction == InteractionType::Dimmer && !self.register_dimmer(item.id) {
            return false;
        }
        let mut c = MessageComposer::new(opcodes::WALL_ITEM_PLACED);
        item.compose(&mut c);
        let placed = c.into_bytes();
        self.items.insert(item.id, item);
        self.broadcast(placed);
        true
    }

    /// The one-moodlight rule: a room keeps a single dimmer. A second
    /// placement is a silent no-op, the same answer an ineligible caller
    /// gets everywhere else.
    fn register_dimmer(&self, item_id: ItemId) -> bool {
        let mut moodlight = self.moodlight.write();
        if moodlight.is_some() {
            tracing::debug!(room = %self.id, "second dimmer rejected");
            return false;
        }
        *moodlight = Some(MoodlightState::new(item_id));
        true
    }

    pub fn remove_furniture(&self, item_id: ItemId) -> Option<RoomItem> {
        let (_, item) = self.items.remove(&item_id)?;
        {
            let mut moodlight = self.moodlight.write();
            if moodlight.as_ref().is_some_and(|m| m.item_id == item_id) {
                *moodlight = None;
            }
        }
        let mut c = MessageComposer::new(opcodes::ITEM_REMOVED);
        c.append_uint(item_id.raw() as u32);
        self.broadcast(c.into_bytes());
        self.refresh_statuses_on(&item.footprint());
        Some(item)
    }

    /// Every floor item whose footprint includes the tile.
    pub fn furni_objects_at(&self, x: i32, y: i32) -> Vec<RoomItem> {
        self.items
            .iter()
            .filter(|i| i.covers(x, y))
            .map(|i| i.clone())
            .collect()
    }

    pub fn item(&self, item_id: ItemId) -> Option<RoomItem> {
        self.items.get(&item_id).map(|i| i.clone())
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn moodlight(&self) -> Option<MoodlightState> {
        self.moodlight.read().clone()
    }

    pub fn update_moodlight(&self, f: impl FnOnce(&mut MoodlightState)) {
        if let Some(state) = self.moodlight.write().as_mut() {
            f(state);
        }
    }

    fn refresh_statuses_on(&self, tiles: &[(i32, i32)]) {
        let affected: Vec<HabboId> = self
            .users
            .iter()
            .filter(|u| tiles.contains(&(u.x, u.y)))
            .map(|u| u.habbo_id)
            .collect();
        for id in affected {
            self.update_user_status(id);
        }
    }

    // ---- rights -----------------------------------------------------------

    pub fn load_rights(&self, holders: Vec<HabboId>) {
        self.rights.write().extend(holders);
    }

    pub fn check_rights(&self, user: HabboId, require_ownership: bool) -> bool {
        if self.config.read().owner_id == user {
            return true;
        }
        if require_ownership {
            return false;
        }
        self.rights.read().contains(&user)
    }

    pub fn add_rights(&self, user: HabboId) {
        self.rights.write().insert(user);
    }

    pub fn remove_rights(&self, user: HabboId) {
        self.rights.write().remove(&user);
    }

    // ---- bans -------------------------------------------------------------
    // Bans are in-memory timestamps, never persisted and never swept; every
    // check compares against the TTL lazily.

    pub fn ban(&self, user: HabboId) {
        self.bans.insert(user, Utc::now());
    }

    pub fn is_banned(&self, user: HabboId) -> bool {
        match self.bans.get(&user) {
            Some(stamp) => Utc::now() - *stamp < self.deps.ban_ttl,
            None => false,
        }
    }

    pub fn has_ban_expired(&self, user: HabboId) -> bool {
        match self.bans.get(&user) {
            Some(stamp) => Utc::now() - *stamp >= self.deps.ban_ttl,
            None => true,
        }
    }

    pub fn remove_ban(&self, user: HabboId) {
        self.bans.remove(&user);
    }

    // ---- walkability ------------------------------------------------------

    /// Rebuild the derived grid from the template, current items and
    /// occupant positions. Callers sequence this after item mutations.
    pub fn regenerate_grid(&self) {
        let items: Vec<RoomItem> = self.items.iter().map(|i| i.clone()).collect();
        let occupants: Vec<(HabboId, i32, i32)> =
            self.users.iter().map(|u| (u.habbo_id, u.x, u.y)).collect();
        *self.grid.write() = TileGrid::build(&self.template, &items, &occupants);
    }

    pub fn with_grid<R>(&self, f: impl FnOnce(&TileGrid) -> R) -> R {
        f(&self.grid.read())
    }

    pub fn can_walk(&self, x: i32, y: i32, last_step: bool) -> bool {
        self.can_walk_excluding(x, y, last_step, None)
    }

    fn can_walk_excluding(
        &self,
        x: i32,
        y: i32,
        last_step: bool,
        exclude: Option<HabboId>,
    ) -> bool {
        if !self.template.in_bounds(x, y) {
            return false;
        }
        if self.template.tile_state(x, y) == TileState::Blocked {
            return false;
        }
        if !self.grid.read().is_walkable(x, y) {
            return false;
        }
        for u in self.users.iter() {
            if exclude == Some(u.habbo_id) {
                continue;
            }
            if u.x == x && u.y == y {
                // A tile being vacated this step may be claimed, but only as
                // the walker's final step.
                if last_step && u.is_vacating(x, y) {
                    continue;
                }
                return false;
            }
        }
        true
    }

    // ---- movement ---------------------------------------------------------

    /// Request a walk. Wakes and un-idles the occupant, then asks the path
    /// collaborator for a route; the room only keeps the cursor.
    pub fn walk_to(&self, habbo_id: HabboId, x: i32, y: i32) {
        let Some((from, woke, virtual_id, allowed)) = self.with_user_mut(habbo_id, |u| {
            u.idle_ticks = 0;
            let woke = std::mem::take(&mut u.asleep);
            ((u.x, u.y), woke, u.virtual_id, u.can_walk || u.walk_override)
        }) else {
            return;
        };
        if woke {
            self.broadcast_sleep(virtual_id, false);
        }
        if !allowed {
            return;
        }

        self.regenerate_grid();
        let path = {
            let grid = self.grid.read();
            self.deps.pathfinder.find_path(&grid, from, (x, y))
        };
        match path {
            Some(path) if !path.is_empty() => {
                self.with_user_mut(habbo_id, |u| {
                    u.goal = Some((x, y));
                    u.set_path(path);
                });
            }
            _ => {
                tracing::debug!(room = %self.id, user = %habbo_id, to_x = x, to_y = y, "no path");
            }
        }
    }

    fn process_movement(&self) {
        let ids: Vec<HabboId> = self.users.iter().map(|u| u.habbo_id).collect();
        for id in ids {
            // Commit the step announced last tick.
            let committed = self.with_user_mut(id, |u| u.stepping_to.take()).flatten();
            if let Some((nx, ny)) = committed {
                let height = self.grid.read().height_at(nx, ny);
                self.with_user_mut(id, |u| u.set_position(nx, ny, height));
            }

            let Some((walking, step)) =
                self.with_user(id, |u| (u.goal.is_some(), u.next_step()))
            else {
                continue;
            };
            match step {
                None => {
                    if walking && committed.is_some() {
                        // Arrived.
                        self.with_user_mut(id, |u| {
                            u.remove_status(STATUS_MOVE);
                            u.clear_path();
                        });
                        self.update_user_status(id);
                    }
                }
                Some(((nx, ny), is_last)) => {
                    if self.can_walk_excluding(nx, ny, is_last, Some(id)) {
                        let height = self.grid.read().height_at(nx, ny);
                        self.with_user_mut(id, |u| {
                            let rot = octant_towards(u.x, u.y, nx, ny);
                            u.set_rotation(rot);
                            u.set_status(STATUS_MOVE, &format!("{nx},{ny},{height:.1}"));
                            u.stepping_to = Some((nx, ny));
                            u.advance_step();
                        });
                    } else {
                        self.replan_or_stop(id);
                    }
                }
            }
        }
    }

    fn replan_or_stop(&self, habbo_id: HabboId) {
        let Some((from, goal)) = self.with_user(habbo_id, |u| ((u.x, u.y), u.goal)) else {
            return;
        };
        let Some(goal) = goal else {
            return;
        };
        self.regenerate_grid();
        let path = {
            let grid = self.grid.read();
            self.deps.pathfinder.find_path(&grid, from, goal)
        };
        match path {
            Some(path) if !path.is_empty() => {
                self.with_user_mut(habbo_id, |u| u.set_path(path));
            }
            _ => {
                self.with_user_mut(habbo_id, |u| {
                    u.remove_status(STATUS_MOVE);
                    u.clear_path();
                });
                self.update_user_status(habbo_id);
            }
        }
    }

    // ---- posture ----------------------------------------------------------

    /// Recompute sit/lay posture for one occupant. Run after any change to
    /// the occupant's tile or the items on it. A template seat applies
    /// first; items on the tile apply afterwards and may override it.
    pub fn update_user_status(&self, habbo_id: HabboId) {
        let Some((x, y)) = self.with_user(habbo_id, |u| (u.x, u.y)) else {
            return;
        };
        let items_here = self.furni_objects_at(x, y);
        let template = &self.template;

        self.with_user_mut(habbo_id, |u| {
            u.remove_status(STATUS_SIT);
            u.remove_status(STATUS_LAY);

            if template.tile_state(x, y) == TileState::Seat {
                let height = template.floor_height(x, y);
                u.set_status(STATUS_SIT, &format!("{height:.1}"));
                u.set_height(height);
                u.set_rotation(template.seat_rotation(x, y));
            }

            for item in &items_here {
                if item.base.interaction == InteractionType::Bed {
                    u.remove_status(STATUS_SIT);
                    u.set_status(STATUS_LAY, &format!("{:.1} null", item.base.height));
                    u.set_height(item.z);
                    u.set_rotation(item.rotation);
                } else if item.is_sittable() {
                    u.remove_status(STATUS_LAY);
                    u.set_status(STATUS_SIT, &format!("{:.1}", item.base.height));
                    u.set_height(item.z);
                    u.set_rotation(item.rotation);
                }
            }
        });
    }

    // ---- chat -------------------------------------------------------------

    pub fn chat(&self, habbo_id: HabboId, message: &str, chat_type: ChatType) {
        let Some((virtual_id, x, y, muted)) =
            self.with_user(habbo_id, |u| (u.virtual_id, u.x, u.y, u.muted))
        else {
            return;
        };
        if muted {
            return;
        }
        if let Some(command) = message.strip_prefix(':') {
            if self.deps.commands.handle(habbo_id, command) {
                return;
            }
        }

        let header = match chat_type {
            ChatType::Talk => opcodes::CHAT,
            ChatType::Shout => opcodes::SHOUT,
            ChatType::Whisper => opcodes::WHISPER,
        };
        let emotion = Emotion::detect(message);
        let mut c = MessageComposer::new(header);
        c.append_int(virtual_id);
        c.append_string(message);
        c.append_uint(emotion.to_wire());
        let msg = c.into_bytes();

        self.with_user_mut(habbo_id, |u| u.idle_ticks = 0);

        // Everyone looks at the speaker.
        let others: Vec<HabboId> = self
            .users
            .iter()
            .filter(|u| u.habbo_id != habbo_id)
            .map(|u| u.habbo_id)
            .collect();
        for other in others {
            self.with_user_mut(other, |u| {
                let target = octant_towards(u.x, u.y, x, y);
                u.turn_head_to(target);
            });
        }

        self.broadcast(msg);

        for listener in self.bot_listeners.read().iter() {
            listener.on_user_say(self.id, habbo_id, message);
        }
    }

    // ---- broadcast --------------------------------------------------------

    /// Fan out to every non-spectator human. Delivery is best-effort per
    /// occupant: a dead channel is logged and skipped, never fatal for the
    /// rest.
    pub fn broadcast(&self, msg: Bytes) {
        for u in self.users.iter() {
            if u.is_spectator() {
                continue;
            }
            if let Some(ch) = u.channel() {
                if ch.send(msg.clone()).is_err() {
                    tracing::debug!(room = %self.id, user = %u.habbo_id, "dropped broadcast");
                }
            }
        }
    }

    pub fn broadcast_to_rights_holders(&self, msg: Bytes) {
        let owner = self.config.read().owner_id;
        let rights = self.rights.read().clone();
        for u in self.users.iter() {
            if u.is_spectator() {
                continue;
            }
            if u.habbo_id != owner && !rights.contains(&u.habbo_id) {
                continue;
            }
            if let Some(ch) = u.channel() {
                if ch.send(msg.clone()).is_err() {
                    tracing::debug!(room = %self.id, user = %u.habbo_id, "dropped broadcast");
                }
            }
        }
    }

    fn send_to(&self, habbo_id: HabboId, msg: Bytes) {
        if let Some(u) = self.users.get(&habbo_id) {
            if let Some(ch) = u.channel() {
                let _ = ch.send(msg);
            }
        }
    }

    fn broadcast_sleep(&self, virtual_id: i32, asleep: bool) {
        let mut c = MessageComposer::new(opcodes::SLEEP);
        c.append_int(virtual_id);
        c.append_bool(asleep);
        self.broadcast(c.into_bytes());
    }

    // ---- trading ----------------------------------------------------------

    /// Open a trade between two occupants. Ineligible pairings (same user,
    /// public room, someone already trading, someone absent) are silent
    /// no-ops.
    pub fn start_trade(&self, initiator: HabboId, partner: HabboId) {
        if initiator == partner {
            return;
        }
        if self.config.read().room_type == RoomType::Public {
            tracing::debug!(room = %self.id, "trade refused in public room");
            return;
        }
        if self.user_trade(initiator).is_some() || self.user_trade(partner).is_some() {
            return;
        }
        let (Some(init_vid), Some(part_vid)) =
            (self.virtual_id_of(initiator), self.virtual_id_of(partner))
        else {
            return;
        };

        self.trades
            .write()
            .push(Arc::new(Trade::new(self.id, initiator, partner)));
        for id in [initiator, partner] {
            self.with_user_mut(id, |u| u.set_status(STATUS_TRADE, ""));
        }

        let mut c = MessageComposer::new(opcodes::TRADE_OPEN);
        c.append_int(init_vid);
        c.append_int(part_vid);
        let msg = c.into_bytes();
        self.send_to(initiator, msg.clone());
        self.send_to(partner, msg);
    }

    pub fn user_trade(&self, user: HabboId) -> Option<Arc<Trade>> {
        self.trades
            .read()
            .iter()
            .find(|t| t.involves(user) && t.stage() != TradeStage::Done)
            .cloned()
    }

    pub async fn offer_trade_item(&self, user: HabboId, item: ItemId) {
        let Some(trade) = self.user_trade(user) else {
            return;
        };
        // Only tradeable bases may enter an offer.
        let tradeable = matches!(
            self.deps.inventory.item_base(user, item).await,
            Ok(Some(base)) if base.can_trade
        );
        if !tradeable {
            return;
        }
        if trade.offer_item(user, item) {
            self.broadcast_trade_items(&trade);
        }
    }

    pub async fn take_back_trade_item(&self, user: HabboId, item: ItemId) {
        let Some(trade) = self.user_trade(user) else {
            return;
        };
        if trade.take_back_item(user, item) {
            self.broadcast_trade_items(&trade);
        }
    }

    pub fn accept_trade(&self, user: HabboId) {
        let Some(trade) = self.user_trade(user) else {
            return;
        };
        match trade.accept(user) {
            FlagOutcome::BothSides => {
                let msg = MessageComposer::new(opcodes::TRADE_CONFIRM).into_bytes();
                let (a, b) = trade.participants();
                self.send_to(a, msg.clone());
                self.send_to(b, msg);
            }
            FlagOutcome::OneSide => self.broadcast_trade_items(&trade),
            FlagOutcome::Ignored => {}
        }
    }

    pub fn unaccept_trade(&self, user: HabboId) {
        let Some(trade) = self.user_trade(user) else {
            return;
        };
        if trade.unaccept(user) {
            self.broadcast_trade_items(&trade);
        }
    }

    /// Final confirmation. When both sides have confirmed, verify every
    /// offered item is still in its owner's hand and swap the lot; any
    /// missing item aborts the whole delivery with both sides notified and
    /// the trade left in Confirming. There is no partial delivery.
    pub async fn complete_trade(&self, user: HabboId) -> bool {
        let Some(trade) = self.user_trade(user) else {
            return false;
        };
        if trade.confirm(user) != FlagOutcome::BothSides {
            return false;
        }

        let [a, b] = trade.sides();
        for side in [&a, &b] {
            for item in &side.offers {
                if !matches!(self.deps.inventory.owns(side.user_id, *item).await, Ok(true)) {
                    tracing::warn!(
                        room = %self.id, owner = %side.user_id, item = %item,
                        "trade aborted: offered item vanished"
                    );
                    trade.reset_confirmation();
                    self.broadcast_trade_items(&trade);
                    return false;
                }
            }
        }

        if !a.offers.is_empty() {
            if let Err(e) = self
                .deps
                .inventory
                .transfer(a.user_id, b.user_id, &a.offers)
                .await
            {
                tracing::warn!(room = %self.id, error = %e, "trade delivery failed");
                trade.reset_confirmation();
                self.broadcast_trade_items(&trade);
                return false;
            }
        }
        if !b.offers.is_empty() {
            if let Err(e) = self
                .deps
                .inventory
                .transfer(b.user_id, a.user_id, &b.offers)
                .await
            {
                // Undo the first leg so neither side is left half-delivered.
                tracing::warn!(room = %self.id, error = %e, "trade delivery failed, rolling back");
                if let Err(e) = self
                    .deps
                    .inventory
                    .transfer(b.user_id, a.user_id, &a.offers)
                    .await
                {
                    tracing::error!(room = %self.id, error = %e, "trade rollback failed");
                }
                trade.reset_confirmation();
                self.broadcast_trade_items(&trade);
                return false;
            }
        }

        trade.mark_done();
        self.trades.write().retain(|t| !Arc::ptr_eq(t, &trade));
        for id in [a.user_id, b.user_id] {
            self.with_user_mut(id, |u| u.remove_status(STATUS_TRADE));
        }

        let msg = MessageComposer::new(opcodes::TRADE_COMPLETED).into_bytes();
        self.send_to(a.user_id, msg.clone());
        self.send_to(b.user_id, msg);
        true
    }

    /// Abandon a trade from any state. No items move; the close message
    /// names the closing party.
    pub fn cancel_trade(&self, user: HabboId) {
        let Some(trade) = self.user_trade(user) else {
            return;
        };
        self.trades.write().retain(|t| !Arc::ptr_eq(t, &trade));
        let (a, b) = trade.participants();
        for id in [a, b] {
            self.with_user_mut(id, |u| u.remove_status(STATUS_TRADE));
        }
        let closer = self.virtual_id_of(user).unwrap_or(-1);
        let mut c = MessageComposer::new(opcodes::TRADE_CLOSE);
        c.append_int(closer);
        let msg = c.into_bytes();
        self.send_to(a, msg.clone());
        self.send_to(b, msg);
    }

    pub fn trade_count(&self) -> usize {
        self.trades.read().len()
    }

    fn broadcast_trade_items(&self, trade: &Arc<Trade>) {
        let mut c = MessageComposer::new(opcodes::TRADE_ITEMS);
        for side in trade.sides() {
            let vid = self.virtual_id_of(side.user_id).unwrap_or(-1);
            c.append_int(vid);
            c.append_bool(side.accepted);
            c.append_uint(side.offers.len() as u32);
            for item in &side.offers {
                c.append_uint(item.raw() as u32);
            }
        }
        let msg = c.into_bytes();
        let (a, b) = trade.participants();
        self.send_to(a, msg.clone());
        self.send_to(b, msg);
    }

    // ---- events & moodlight -----------------------------------------------

    pub fn set_event(&self, event: Option<RoomEvent>) {
        *self.event.write() = event;
    }

    /// Current event with lazy expiry: an elapsed event is dropped at read
    /// time, never by a sweeper.
    pub fn current_event(&self) -> Option<RoomEvent> {
        let now = Utc::now();
        let expired = self
            .event
            .read()
            .as_ref()
            .is_some_and(|ev| ev.has_expired(now));
        if expired {
            *self.event.write() = None;
            return None;
        }
        self.event.read().clone()
    }

    // ---- tick -------------------------------------------------------------

    /// One housekeeping pass: movement, idling, coalesced status flush and
    /// lazy event expiry. The tick drives the same public operations the
    /// handlers use.
    pub fn tick(&self, idle_sleep_ticks: u32) {
        self.process_movement();
        self.process_idle(idle_sleep_ticks);
        self.flush_status_updates();
        let _ = self.current_event();

        if self.unit_count() == 0 {
            self.empty_ticks.fetch_add(1, Ordering::Relaxed);
        } else {
            self.empty_ticks.store(0, Ordering::Relaxed);
        }
    }

    pub fn empty_ticks(&self) -> u32 {
        self.empty_ticks.load(Ordering::Relaxed)
    }

    fn process_idle(&self, idle_sleep_ticks: u32) {
        let mut fell_asleep = Vec::new();
        for mut u in self.users.iter_mut() {
            if !u.is_human() {
                continue;
            }
            u.idle_ticks = u.idle_ticks.saturating_add(1);
            if !u.asleep && u.idle_ticks >= idle_sleep_ticks {
                u.asleep = true;
                fell_asleep.push(u.virtual_id);
            }
        }
        for virtual_id in fell_asleep {
            self.broadcast_sleep(virtual_id, true);
        }
    }

    /// Send one status message covering every dirty occupant. Individual
    /// field changes are never sent on their own.
    fn flush_status_updates(&self) {
        let mut dirty = Vec::new();
        for mut u in self.users.iter_mut() {
            if u.take_needs_update() {
                dirty.push((u.virtual_id, u.status_string()));
            }
        }
        if dirty.is_empty() {
            return;
        }
        let mut c = MessageComposer::new(opcodes::USER_STATUS);
        c.append_uint(dirty.len() as u32);
        for (virtual_id, status) in dirty {
            c.append_int(virtual_id);
            c.append_string(&status);
        }
        self.broadcast(c.into_bytes());
    }

    // ---- serialization ----------------------------------------------------

    pub fn compose_info(&self, c: &mut MessageComposer) {
        let event = self.current_event();
        self.config
            .read()
            .compose_info(c, event.as_ref(), self.user_count() as u32);
    }

    pub fn compose_user_list(&self, c: &mut MessageComposer) {
        c.append_uint(self.users.len() as u32);
        for u in self.users.iter() {
            u.compose(c);
        }
    }

    pub fn compose_item_list(&self, c: &mut MessageComposer) {
        let floor: Vec<RoomItem> = self
            .items
            .iter()
            .filter(|i| !i.is_wall_item())
            .map(|i| i.clone())
            .collect();
        c.append_uint(floor.len() as u32);
        for item in floor {
            item.compose(c);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::item::ItemBase;
    use crate::models::room::{AccessState, RoomIcon};
    use crate::models::types::ItemBaseId;
    use crate::repo::mem::MemoryInventory;
    use crate::rooms::template::DoorSpec;
    use crate::services::{BfsPathfinder, NullCommandHandler};

    fn mk_deps(ban_ttl: Duration) -> RoomDeps {
        RoomDeps {
            inventory: Arc::new(MemoryInventory::new()),
            pathfinder: Arc::new(BfsPathfinder),
            commands: Arc::new(NullCommandHandler),
            ban_ttl,
        }
    }

    fn mk_config(room_type: RoomType) -> RoomConfig {
        RoomConfig {
            id: RoomId(9),
            name: "Test Room".into(),
            description: String::new(),
            owner_id: HabboId(1),
            owner_name: "owner".into(),
            room_type,
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
        }
    }

    fn mk_room_with(room_type: RoomType, ban_ttl: Duration) -> Room {
        let template = Arc::new(RoomTemplate::parse(
            "model_t",
            "0000\r!0000\r!0000\r!0000",
            DoorSpec { x: 0, y: 0, z: 0.0, direction: 2 },
            false,
        ));
        Room::new(mk_config(room_type), template, mk_deps(ban_ttl))
    }

    fn mk_room() -> Room {
        mk_room_with(RoomType::Private, Duration::seconds(900))
    }

    fn mk_human(name: &str) -> RoomUserKind {
        RoomUserKind::Human {
            username: name.into(),
            figure: String::new(),
            gender: "M".into(),
            motto: String::new(),
            channel: None,
            spectator: false,
        }
    }

    fn mk_base(interaction: InteractionType, can_sit: bool, height: f32) -> Arc<ItemBase> {
        Arc::new(ItemBase {
            id: ItemBaseId(500),
            sprite_id: 12,
            name: "test furni".into(),
            width: 1,
            length: 1,
            height,
            can_sit,
            can_trade: true,
            interaction,
        })
    }

    fn mk_floor_item(id: i64, base: Arc<ItemBase>, x: i32, y: i32, rotation: i32) -> RoomItem {
        RoomItem {
            id: ItemId(id),
            base,
            owner_id: HabboId(1),
            x,
            y,
            z: 0.0,
            rotation,
            wall_position: None,
        }
    }

    #[test]
    fn can_walk_rejects_out_of_bounds_and_blocked() {
        let room = mk_room();
        assert!(room.can_walk(1, 1, true));
        assert!(!room.can_walk(-1, 0, true));
        assert!(!room.can_walk(4, 4, true));

        let blocker = mk_floor_item(50, mk_base(InteractionType::Default, false, 1.0), 2, 2, 0);
        assert!(room.place_floor_item(blocker));
        room.regenerate_grid();
        assert!(!room.can_walk(2, 2, true));
    }

    #[test]
    fn occupied_tile_yields_only_to_a_final_step_onto_a_vacating_occupant() {
        let room = mk_room();
        let a = HabboId(10);
        room.add_user(a, mk_human("alice"));
        assert!(!room.can_walk(0, 0, true));

        room.with_user_mut(a, |u| u.stepping_to = Some((1, 0)));
        assert!(room.can_walk(0, 0, true));
        assert!(!room.can_walk(0, 0, false));
    }

    #[test]
    fn item_posture_overrides_template_seat() {
        let mut template = RoomTemplate::parse(
            "model_t",
            "0000\r!0000\r!0000\r!0000",
            DoorSpec { x: 0, y: 0, z: 0.0, direction: 2 },
            false,
        );
        // A built-in seat at (1,1) facing east.
        let mut stream = Vec::new();
        stream.extend(crate::codec::vl64_encode(1));
        stream.push(b'H');
        stream.extend(crate::codec::vl64_encode(101));
        stream.extend(b"park bench");
        stream.push(0x00);
        for v in [1, 1, 0, 2] {
            stream.extend(crate::codec::vl64_encode(v));
        }
        template.apply_static_furniture(&stream);

        let room = Room::new(
            mk_config(RoomType::Private),
            Arc::new(template),
            mk_deps(Duration::seconds(900)),
        );
        let a = HabboId(10);
        room.add_user(a, mk_human("alice"));
        room.with_user_mut(a, |u| u.set_position(1, 1, 0.0));
        room.update_user_status(a);
        let (sit, rot) = room
            .with_user(a, |u| (u.status(STATUS_SIT).map(String::from), u.body_rotation))
            .unwrap();
        assert_eq!(sit.as_deref(), Some("0.0"));
        assert_eq!(rot, 2);

        // A placed chair on the same tile wins over the template seat.
        let mut chair = mk_floor_item(60, mk_base(InteractionType::Seat, true, 1.0), 1, 1, 6);
        chair.z = 0.5;
        assert!(room.place_floor_item(chair));
        let (sit, z, rot) = room
            .with_user(a, |u| {
                (u.status(STATUS_SIT).map(String::from), u.z, u.body_rotation)
            })
            .unwrap();
        assert_eq!(sit.as_deref(), Some("1.0"));
        assert!((z - 0.5).abs() < f32::EPSILON);
        assert_eq!(rot, 6);
    }

    #[test]
    fn bed_lays_instead_of_sitting() {
        let room = mk_room();
        let a = HabboId(10);
        room.add_user(a, mk_human("alice"));
        room.with_user_mut(a, |u| u.set_position(2, 2, 0.0));

        let bed = mk_floor_item(61, mk_base(InteractionType::Bed, false, 1.5), 2, 2, 4);
        assert!(room.place_floor_item(bed));
        let (sit, lay) = room
            .with_user(a, |u| {
                (u.has_status(STATUS_SIT), u.status(STATUS_LAY).map(String::from))
            })
            .unwrap();
        assert!(!sit);
        assert_eq!(lay.as_deref(), Some("1.5 null"));
    }

    #[test]
    fn bans_expire_lazily_after_the_ttl() {
        let room = mk_room();
        let target = HabboId(99);
        assert!(room.has_ban_expired(target), "no ban counts as expired");

        room.ban(target);
        assert!(room.is_banned(target));
        assert!(!room.has_ban_expired(target));

        room.remove_ban(target);
        assert!(!room.is_banned(target));

        // Zero TTL: the ban is already stale the moment it lands.
        let strict = mk_room_with(RoomType::Private, Duration::zero());
        strict.ban(target);
        assert!(!strict.is_banned(target));
        assert!(strict.has_ban_expired(target));
    }

    #[test]
    fn second_dimmer_placement_is_refused() {
        let room = mk_room();
        let mut first = mk_floor_item(70, mk_base(InteractionType::Dimmer, false, 0.0), 0, 0, 0);
        first.wall_position = Some(":w=3,2 l=9,63 l".into());
        let mut second = mk_floor_item(71, mk_base(InteractionType::Dimmer, false, 0.0), 0, 0, 0);
        second.wall_position = Some(":w=1,4 l=10,30 r".into());

        assert!(room.place_wall_item(first));
        assert!(!room.place_wall_item(second));
        assert_eq!(room.moodlight().map(|m| m.item_id), Some(ItemId(70)));

        // Removing the dimmer frees the slot again.
        room.remove_furniture(ItemId(70));
        assert!(room.moodlight().is_none());
    }

    #[test]
    fn trades_need_a_private_room_and_free_partners() {
        let public = mk_room_with(RoomType::Public, Duration::seconds(900));
        let (a, b) = (HabboId(10), HabboId(11));
        public.add_user(a, mk_human("alice"));
        public.add_user(b, mk_human("bob"));
        public.start_trade(a, b);
        assert_eq!(public.trade_count(), 0);

        let private = mk_room();
        private.add_user(a, mk_human("alice"));
        private.add_user(b, mk_human("bob"));
        private.start_trade(a, a);
        assert_eq!(private.trade_count(), 0);

        private.start_trade(a, b);
        assert_eq!(private.trade_count(), 1);
        assert!(private.with_user(a, |u| u.has_status(STATUS_TRADE)).unwrap());
        assert!(private.with_user(b, |u| u.has_status(STATUS_TRADE)).unwrap());

        // Busy partners refuse a second table.
        let c = HabboId(12);
        private.add_user(c, mk_human("carol"));
        private.start_trade(c, b);
        assert_eq!(private.trade_count(), 1);
    }

    #[test]
    fn leaving_cancels_the_trade() {
        let room = mk_room();
        let (a, b) = (HabboId(10), HabboId(11));
        room.add_user(a, mk_human("alice"));
        room.add_user(b, mk_human("bob"));
        room.start_trade(a, b);

        room.remove_user(a, false, false);
        assert_eq!(room.trade_count(), 0);
        assert!(!room.with_user(b, |u| u.has_status(STATUS_TRADE)).unwrap());
    }

    #[test]
    fn steps_are_announced_one_tick_and_committed_the_next() {
        let room = mk_room();
        let a = HabboId(10);
        room.add_user(a, mk_human("alice"));
        room.walk_to(a, 2, 0);

        room.tick(1200);
        let (pos, stepping, mv) = room
            .with_user(a, |u| ((u.x, u.y), u.stepping_to, u.has_status(STATUS_MOVE)))
            .unwrap();
        assert_eq!(pos, (0, 0), "announced but not yet committed");
        assert_eq!(stepping, Some((1, 0)));
        assert!(mv);

        room.tick(1200);
        assert_eq!(room.with_user(a, |u| (u.x, u.y)).unwrap(), (1, 0));

        room.tick(1200);
        let (pos, mv, goal) = room
            .with_user(a, |u| ((u.x, u.y), u.has_status(STATUS_MOVE), u.goal))
            .unwrap();
        assert_eq!(pos, (2, 0));
        assert!(!mv, "arrival clears the walk status");
        assert_eq!(goal, None);
    }

    #[test]
    fn empty_room_accumulates_idle_ticks() {
        let room = mk_room();
        room.tick(1200);
        room.tick(1200);
        assert_eq!(room.empty_ticks(), 2);

        room.add_user(HabboId(10), mk_human("alice"));
        room.tick(1200);
        assert_eq!(room.empty_ticks(), 0);
    }
}
