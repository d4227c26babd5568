//! One occupant of a loaded room: a connected human, a scripted bot, or a
//! pet. The variants share movement and posture state; what differs is the
//! identity payload and how they serialize, so the split lives in
//! [`RoomUserKind`] and is dispatched where it matters instead of nullable
//! fields on one struct.

use crate::codec::MessageComposer;
use crate::models::types::HabboId;
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;

pub const STATUS_SIT: &str = "sit";
pub const STATUS_LAY: &str = "lay";
pub const STATUS_MOVE: &str = "mv";
pub const STATUS_TRADE: &str = "trd";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatType {
    Talk,
    Shout,
    Whisper,
}

/// Chat emotions, detected by ordered substring precedence: the first group
/// with a hit wins, and a message with none of them stays neutral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emotion {
    None,
    Happy,
    Angry,
    Surprised,
    Sad,
}

impl Emotion {
    pub fn detect(message: &str) -> Self {
        const HAPPY: [&str; 5] = [":)", ":-)", ":d", ";)", "=]"];
        const ANGRY: [&str; 3] = [":@", ">:(", ">:-("];
        const SURPRISED: [&str; 3] = [":o", ":-o", "o.o"];
        const SAD: [&str; 3] = [":(", ":-(", "=["];

        let lowered = message.to_lowercase();
        let hit = |set: &[&str]| set.iter().any(|s| lowered.contains(s));

        if hit(&HAPPY) {
            Emotion::Happy
        } else if hit(&ANGRY) {
            Emotion::Angry
        } else if hit(&SURPRISED) {
            Emotion::Surprised
        } else if hit(&SAD) {
            Emotion::Sad
        } else {
            Emotion::None
        }
    }

    pub fn to_wire(self) -> u32 {
        match self {
            Emotion::None => 0,
            Emotion::Happy => 1,
            Emotion::Angry => 2,
            Emotion::Surprised => 3,
            Emotion::Sad => 4,
        }
    }
}

/// Shortest signed octant difference, in `-4..=4` with ties kept positive.
pub fn octant_delta(from: i32, to: i32) -> i32 {
    let d = (to - from).rem_euclid(8);
    if d > 4 { d - 8 } else { d }
}

/// Octant an avatar at (x1,y1) faces to look at (x2,y2). 0 is north, 2 east,
/// 4 south, 6 west.
pub fn octant_towards(x1: i32, y1: i32, x2: i32, y2: i32) -> i32 {
    if x1 > x2 && y1 > y2 {
        7
    } else if x1 < x2 && y1 < y2 {
        3
    } else if x1 > x2 && y1 < y2 {
        5
    } else if x1 < x2 && y1 > y2 {
        1
    } else if x1 > x2 {
        6
    } else if x1 < x2 {
        2
    } else if y1 < y2 {
        4
    } else {
        0
    }
}

#[derive(Debug)]
pub enum RoomUserKind {
    Human {
        username: String,
        figure: String,
        gender: String,
        motto: String,
        /// Outbound channel; broadcasts are best-effort sends into it.
        channel: Option<UnboundedSender<Bytes>>,
        spectator: bool,
    },
    Bot {
        name: String,
        figure: String,
        motto: String,
    },
    Pet {
        name: String,
        breed: i32,
    },
}

#[derive(Debug)]
pub struct RoomUser {
    pub habbo_id: HabboId,
    pub virtual_id: i32,
    pub kind: RoomUserKind,

    pub x: i32,
    pub y: i32,
    pub z: f32,
    pub head_rotation: i32,
    pub body_rotation: i32,

    pub goal: Option<(i32, i32)>,
    path: Vec<(i32, i32)>,
    path_cursor: usize,
    /// Tile announced as this tick's step target; committed next tick. While
    /// set, the occupant counts as vacating its current tile.
    pub stepping_to: Option<(i32, i32)>,

    statuses: HashMap<String, String>,
    pub idle_ticks: u32,
    pub asleep: bool,
    pub muted: bool,
    pub can_walk: bool,
    pub walk_override: bool,
    needs_update: bool,
}

impl RoomUser {
    pub fn new(habbo_id: HabboId, virtual_id: i32, kind: RoomUserKind) -> Self {
        Self {
            habbo_id,
            virtual_id,
            kind,
            x: 0,
            y: 0,
            z: 0.0,
            head_rotation: 0,
            body_rotation: 0,
            goal: None,
            path: Vec::new(),
            path_cursor: 0,
            stepping_to: None,
            statuses: HashMap::new(),
            idle_ticks: 0,
            asleep: false,
            muted: false,
            can_walk: true,
            walk_override: false,
            needs_update: false,
        }
    }

    pub fn is_human(&self) -> bool {
        matches!(self.kind, RoomUserKind::Human { .. })
    }

    pub fn is_bot(&self) -> bool {
        matches!(self.kind, RoomUserKind::Bot { .. })
    }

    pub fn is_pet(&self) -> bool {
        matches!(self.kind, RoomUserKind::Pet { .. })
    }

    pub fn is_spectator(&self) -> bool {
        matches!(self.kind, RoomUserKind::Human { spectator: true, .. })
    }

    pub fn channel(&self) -> Option<&UnboundedSender<Bytes>> {
        match &self.kind {
            RoomUserKind::Human { channel, .. } => channel.as_ref(),
            _ => None,
        }
    }

    // ---- status set -------------------------------------------------------

    pub fn set_status(&mut self, key: &str, value: &str) {
        let prev = self.statuses.insert(key.to_string(), value.to_string());
        if prev.as_deref() != Some(value) {
            self.needs_update = true;
        }
    }

    pub fn remove_status(&mut self, key: &str) {
        if self.statuses.remove(key).is_some() {
            self.needs_update = true;
        }
    }

    pub fn has_status(&self, key: &str) -> bool {
        self.statuses.contains_key(key)
    }

    pub fn status(&self, key: &str) -> Option<&str> {
        self.statuses.get(key).map(String::as_str)
    }

    pub fn set_position(&mut self, x: i32, y: i32, z: f32) {
        if (self.x, self.y) != (x, y) || (self.z - z).abs() > f32::EPSILON {
            self.needs_update = true;
        }
        self.x = x;
        self.y = y;
        self.z = z;
    }

    pub fn set_height(&mut self, z: f32) {
        if (self.z - z).abs() > f32::EPSILON {
            self.z = z;
            self.needs_update = true;
        }
    }

    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    pub fn take_needs_update(&mut self) -> bool {
        std::mem::take(&mut self.needs_update)
    }

    // ---- walking path -----------------------------------------------------

    pub fn set_path(&mut self, path: Vec<(i32, i32)>) {
        self.path = path;
        self.path_cursor = 0;
    }

    pub fn clear_path(&mut self) {
        self.path.clear();
        self.path_cursor = 0;
        self.goal = None;
        self.stepping_to = None;
    }

    pub fn is_walking(&self) -> bool {
        self.stepping_to.is_some() || self.path_cursor < self.path.len()
    }

    /// Peek the next tile and whether it is the final one, without advancing.
    pub fn next_step(&self) -> Option<((i32, i32), bool)> {
        let tile = self.path.get(self.path_cursor)?;
        Some((*tile, self.path_cursor + 1 == self.path.len()))
    }

    pub fn advance_step(&mut self) {
        if self.path_cursor < self.path.len() {
            self.path_cursor += 1;
        }
    }

    /// True while mid-step off the given tile.
    pub fn is_vacating(&self, x: i32, y: i32) -> bool {
        self.x == x && self.y == y && self.stepping_to.is_some_and(|t| t != (x, y))
    }

    // ---- rotation ---------------------------------------------------------

    pub fn is_laying(&self) -> bool {
        self.has_status(STATUS_LAY)
    }

    pub fn is_sitting(&self) -> bool {
        self.has_status(STATUS_SIT)
    }

    /// Head-only turn, also used while seated: from an even body octant the
    /// head nudges one octant toward the target; from an odd octant it snaps
    /// back onto the body.
    pub fn turn_head_to(&mut self, target: i32) {
        if self.is_laying() || self.is_walking() {
            return;
        }
        let delta = octant_delta(self.body_rotation, target);
        let head = if self.body_rotation % 2 == 0 && delta != 0 {
            (self.body_rotation + delta.signum()).rem_euclid(8)
        } else {
            self.body_rotation
        };
        if head != self.head_rotation {
            self.head_rotation = head;
            self.needs_update = true;
        }
    }

    /// Full turn toward an octant: two or more octants away snaps head and
    /// body, exactly one away turns the head only.
    pub fn turn_to(&mut self, target: i32) {
        if self.is_laying() || self.is_walking() {
            return;
        }
        if self.is_sitting() {
            self.turn_head_to(target);
            return;
        }
        let delta = octant_delta(self.body_rotation, target);
        match delta.abs() {
            0 => {}
            1 => {
                if self.head_rotation != target {
                    self.head_rotation = target;
                    self.needs_update = true;
                }
            }
            _ => {
                self.head_rotation = target;
                self.body_rotation = target;
                self.needs_update = true;
            }
        }
    }

    pub fn set_rotation(&mut self, octant: i32) {
        let octant = octant.rem_euclid(8);
        if self.body_rotation != octant || self.head_rotation != octant {
            self.body_rotation = octant;
            self.head_rotation = octant;
            self.needs_update = true;
        }
    }

    // ---- serialization ----------------------------------------------------

    /// Coalesced status line: `x,y,z,head,body/key value/.../`.
    pub fn status_string(&self) -> String {
        let mut s = format!(
            "{},{},{:.1},{},{}",
            self.x, self.y, self.z, self.head_rotation, self.body_rotation
        );
        for (key, value) in &self.statuses {
            s.push('/');
            s.push_str(key);
            if !value.is_empty() {
                s.push(' ');
                s.push_str(value);
            }
        }
        s.push('/');
        s
    }

    /// Room-entry serialization; the layout differs per variant.
    pub fn compose(&self, c: &mut MessageComposer) {
        match &self.kind {
            RoomUserKind::Human {
                username,
                figure,
                gender,
                motto,
                ..
            } => {
                c.append_uint(self.habbo_id.raw() as u32);
                c.append_int(self.virtual_id);
                c.append_string(username);
                c.append_string(figure);
                c.append_string(gender);
                c.append_string(motto);
            }
            RoomUserKind::Bot { name, figure, motto } => {
                c.append_int(-1);
                c.append_int(self.virtual_id);
                c.append_string(name);
                c.append_string(figure);
                c.append_string("");
                c.append_string(motto);
            }
            RoomUserKind::Pet { name, breed } => {
                c.append_int(-1);
                c.append_int(self.virtual_id);
                c.append_string(name);
                c.append_int(*breed);
            }
        }
        c.append_int(self.x);
        c.append_int(self.y);
        c.append_string(&format!("{:.1}", self.z));
        c.append_int(self.body_rotation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk_bot() -> RoomUser {
        RoomUser::new(
            HabboId(-2),
            5,
            RoomUserKind::Bot {
                name: "Concierge".into(),
                figure: "bot-figure".into(),
                motto: "At your service".into(),
            },
        )
    }

    #[test]
    fn full_turn_snaps_on_two_or_more_octants() {
        let mut u = mk_bot();
        u.set_rotation(0);
        u.turn_to(4);
        assert_eq!((u.head_rotation, u.body_rotation), (4, 4));
    }

    #[test]
    fn one_octant_turn_moves_head_only() {
        let mut u = mk_bot();
        u.set_rotation(0);
        u.turn_to(1);
        assert_eq!((u.head_rotation, u.body_rotation), (1, 0));
    }

    #[test]
    fn seated_turn_nudges_head_from_even_body() {
        let mut u = mk_bot();
        u.set_rotation(2);
        u.set_status(STATUS_SIT, "1.0");
        u.turn_to(5);
        assert_eq!((u.head_rotation, u.body_rotation), (3, 2));
    }

    #[test]
    fn seated_turn_from_odd_body_keeps_head_on_body() {
        let mut u = mk_bot();
        u.set_rotation(3);
        u.set_status(STATUS_SIT, "1.0");
        u.turn_head_to(0);
        assert_eq!((u.head_rotation, u.body_rotation), (3, 3));
    }

    #[test]
    fn no_turning_while_laying_or_walking() {
        let mut u = mk_bot();
        u.set_rotation(0);
        u.set_status(STATUS_LAY, "1.0 null");
        u.turn_to(4);
        assert_eq!((u.head_rotation, u.body_rotation), (0, 0));

        let mut w = mk_bot();
        w.set_rotation(0);
        w.set_path(vec![(1, 0)]);
        w.turn_to(4);
        assert_eq!((w.head_rotation, w.body_rotation), (0, 0));
    }

    #[test]
    fn emotion_precedence_is_ordered() {
        assert_eq!(Emotion::detect("today was :( but now :)"), Emotion::Happy);
        assert_eq!(Emotion::detect("what :o no :("), Emotion::Surprised);
        assert_eq!(Emotion::detect(">:( grr"), Emotion::Angry);
        assert_eq!(Emotion::detect("so sad :("), Emotion::Sad);
        assert_eq!(Emotion::detect("hello there"), Emotion::None);
    }

    #[test]
    fn status_string_layout() {
        let mut u = mk_bot();
        u.set_position(3, 4, 1.0);
        u.set_rotation(2);
        u.set_status(STATUS_SIT, "1.0");
        u.set_status(STATUS_TRADE, "");
        let s = u.status_string();
        assert!(s.starts_with("3,4,1.0,2,2/"));
        assert!(s.contains("/sit 1.0"));
        assert!(s.contains("/trd"));
        assert!(!s.contains("/trd "));
        assert!(s.ends_with('/'));
    }

    #[test]
    fn status_changes_mark_dirty_once() {
        let mut u = mk_bot();
        assert!(!u.needs_update());
        u.set_status(STATUS_SIT, "0.5");
        assert!(u.take_needs_update());
        // Re-setting the identical value stays clean.
        u.set_status(STATUS_SIT, "0.5");
        assert!(!u.needs_update());
    }
}
