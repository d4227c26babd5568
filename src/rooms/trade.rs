//! Two-party trade negotiation, scoped to one room.
//!
//! The stage machine is Negotiating -> Confirming -> Done, with cancellation
//! possible from anywhere. The aggregate (`rooms::room`) owns the inventory
//! side of delivery; this module only guards the negotiation invariants:
//! offer changes always reset both acceptances, and the stage only advances
//! when both sides have flagged.

use crate::models::types::{HabboId, ItemId, RoomId};
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeStage {
    Negotiating,
    Confirming,
    Done,
}

#[derive(Debug, Clone)]
pub struct TradeSide {
    pub user_id: HabboId,
    pub offers: Vec<ItemId>,
    pub accepted: bool,
}

impl TradeSide {
    fn new(user_id: HabboId) -> Self {
        Self {
            user_id,
            offers: Vec::new(),
            accepted: false,
        }
    }
}

#[derive(Debug)]
struct TradeState {
    stage: TradeStage,
    sides: [TradeSide; 2],
}

/// Outcome of an accept/confirm flag flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagOutcome {
    /// Caller was not a participant or the stage was wrong; nothing happened.
    Ignored,
    /// One side flagged, the other is still pending.
    OneSide,
    /// Both sides flagged; the stage has advanced (or delivery may begin).
    BothSides,
}

#[derive(Debug)]
pub struct Trade {
    pub room_id: RoomId,
    state: Mutex<TradeState>,
}

impl Trade {
    pub fn new(room_id: RoomId, first: HabboId, second: HabboId) -> Self {
        Self {
            room_id,
            state: Mutex::new(TradeState {
                stage: TradeStage::Negotiating,
                sides: [TradeSide::new(first), TradeSide::new(second)],
            }),
        }
    }

    pub fn involves(&self, user: HabboId) -> bool {
        let st = self.state.lock();
        st.sides.iter().any(|s| s.user_id == user)
    }

    pub fn stage(&self) -> TradeStage {
        self.state.lock().stage
    }

    pub fn participants(&self) -> (HabboId, HabboId) {
        let st = self.state.lock();
        (st.sides[0].user_id, st.sides[1].user_id)
    }

    /// Snapshot of both sides, for serialization and delivery.
    pub fn sides(&self) -> [TradeSide; 2] {
        let st = self.state.lock();
        [st.sides[0].clone(), st.sides[1].clone()]
    }

    /// Add an item to the caller's offer. Any offer change resets both
    /// acceptance flags, whatever state they were in.
    pub fn offer_item(&self, user: HabboId, item: ItemId) -> bool {
        let mut st = self.state.lock();
        if st.stage != TradeStage::Negotiating {
            return false;
        }
        let Some(side) = st.sides.iter_mut().find(|s| s.user_id == user) else {
            return false;
        };
        if side.offers.contains(&item) {
            return false;
        }
        side.offers.push(item);
        for side in &mut st.sides {
            side.accepted = false;
        }
        true
    }

    pub fn take_back_item(&self, user: HabboId, item: ItemId) -> bool {
        let mut st = self.state.lock();
        if st.stage != TradeStage::Negotiating {
            return false;
        }
        let Some(side) = st.sides.iter_mut().find(|s| s.user_id == user) else {
            return false;
        };
        let Some(pos) = side.offers.iter().position(|i| *i == item) else {
            return false;
        };
        side.offers.remove(pos);
        for side in &mut st.sides {
            side.accepted = false;
        }
        true
    }

    /// Flag one side as accepted. When both sides are flagged the trade moves
    /// to Confirming and both flags reset for the confirmation round.
    pub fn accept(&self, user: HabboId) -> FlagOutcome {
        let mut st = self.state.lock();
        if st.stage != TradeStage::Negotiating {
            return FlagOutcome::Ignored;
        }
        let Some(side) = st.sides.iter_mut().find(|s| s.user_id == user) else {
            return FlagOutcome::Ignored;
        };
        side.accepted = true;
        if st.sides.iter().all(|s| s.accepted) {
            st.stage = TradeStage::Confirming;
            for side in &mut st.sides {
                side.accepted = false;
            }
            FlagOutcome::BothSides
        } else {
            FlagOutcome::OneSide
        }
    }

    /// Withdraw an acceptance. Rejected once confirmation has been issued,
    /// i.e. the trade already left Negotiating.
    pub fn unaccept(&self, user: HabboId) -> bool {
        let mut st = self.state.lock();
        if st.stage != TradeStage::Negotiating {
            return false;
        }
        let Some(side) = st.sides.iter_mut().find(|s| s.user_id == user) else {
            return false;
        };
        side.accepted = false;
        true
    }

    /// Flag one side's final confirmation.
    pub fn confirm(&self, user: HabboId) -> FlagOutcome {
        let mut st = self.state.lock();
        if st.stage != TradeStage::Confirming {
            return FlagOutcome::Ignored;
        }
        let Some(side) = st.sides.iter_mut().find(|s| s.user_id == user) else {
            return FlagOutcome::Ignored;
        };
        side.accepted = true;
        if st.sides.iter().all(|s| s.accepted) {
            FlagOutcome::BothSides
        } else {
            FlagOutcome::OneSide
        }
    }

    /// Reset both confirmation flags after a failed delivery so the parties
    /// can retry once the inventories are sane again.
    pub fn reset_confirmation(&self) {
        let mut st = self.state.lock();
        for side in &mut st.sides {
            side.accepted = false;
        }
    }

    pub fn mark_done(&self) {
        self.state.lock().stage = TradeStage::Done;
    }
}
