//! Immutable per-model room layout.
//!
//! A template is parsed once per model name from two legacy blobs: a
//! CR-separated heightmap text and a binary "static furniture map" describing
//! the built-in furniture of public rooms. Both formats predate this server
//! and have quirks that are reproduced deliberately, not cleaned up.

use crate::codec::WireReader;
use serde::{Deserialize, Serialize};

/// Substrings that mark a static furniture entry as sittable.
const SEAT_NAMES: [&str; 5] = ["bench", "chair", "stool", "seat", "sofa"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TileState {
    Open,
    Blocked,
    Seat,
}

/// Where avatars materialize when entering the room.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DoorSpec {
    pub x: i32,
    pub y: i32,
    pub z: f32,
    pub direction: i32,
}

#[derive(Debug, Clone)]
pub struct RoomTemplate {
    pub name: String,
    pub door: DoorSpec,
    pub width: i32,
    pub height: i32,
    pub club_only: bool,
    /// Heightmap rows as sent to the client (after the legacy first-character
    /// strip on rows past the first).
    rows: Vec<String>,
    tiles: Vec<TileState>,
    heights: Vec<f32>,
    seat_rotations: Vec<i32>,
}

impl RoomTemplate {
    /// Parse a heightmap blob. Rows are separated by CR (0x0D). Row 0 is used
    /// as-is; every later row has its first character stripped, an artifact
    /// of the legacy exporter that the client also relies on. `'x'` blocks a
    /// tile, a decimal digit opens it at that floor height, and anything
    /// unrecognized blocks it.
    pub fn parse(name: &str, heightmap: &str, door: DoorSpec, club_only: bool) -> Self {
        let rows: Vec<String> = heightmap
            .split('\r')
            .enumerate()
            .map(|(i, row)| {
                if i == 0 {
                    row.to_string()
                } else {
                    row.chars().skip(1).collect()
                }
            })
            .collect();

        let width = rows.first().map(|r| r.chars().count()).unwrap_or(0) as i32;
        let height = if width == 0 { 0 } else { rows.len() as i32 };

        let mut template = Self {
            name: name.to_string(),
            door,
            width,
            height,
            club_only,
            rows: if height == 0 { Vec::new() } else { rows },
            tiles: vec![TileState::Blocked; (width * height).max(0) as usize],
            heights: vec![0.0; (width * height).max(0) as usize],
            seat_rotations: vec![0; (width * height).max(0) as usize],
        };

        for y in 0..height {
            let row: Vec<char> = template.rows[y as usize].chars().collect();
            for x in 0..width {
                let (state, floor) = match row.get(x as usize) {
                    Some('x') => (TileState::Blocked, 0.0),
                    Some(c) => match c.to_digit(10) {
                        Some(d) => (TileState::Open, d as f32),
                        None => (TileState::Blocked, 0.0),
                    },
                    None => (TileState::Blocked, 0.0),
                };
                let idx = template.index(x, y);
                template.tiles[idx] = state;
                template.heights[idx] = floor;
            }
        }

        // The door's explicit Z wins over whatever the grid said.
        if template.in_bounds(door.x, door.y) {
            let idx = template.index(door.x, door.y);
            template.heights[idx] = door.z;
        }

        template
    }

    /// Overlay the static furniture map on the parsed grid. Each entry is an
    /// item id, a marker byte, a sprite id, a delimited name, x, y, one more
    /// integer and a rotation. In-bounds tiles become blocked, or seats when
    /// the name contains a seat word. A truncated or malformed stream stops
    /// silently and keeps whatever was already decoded; that resilience is
    /// the documented contract for this format.
    pub fn apply_static_furniture(&mut self, data: &[u8]) {
        let mut r = WireReader::new(data);
        loop {
            let Some(_item_id) = r.read_vl64() else { break };
            let Some(_marker) = r.read_byte() else { break };
            let Some(_sprite_id) = r.read_vl64() else { break };
            let Some(name) = r.read_text() else { break };
            let Some(x) = r.read_vl64() else { break };
            let Some(y) = r.read_vl64() else { break };
            let Some(_altitude) = r.read_vl64() else { break };
            let Some(rotation) = r.read_vl64() else { break };

            if self.in_bounds(x, y) {
                let lowered = name.to_lowercase();
                let idx = self.index(x, y);
                if SEAT_NAMES.iter().any(|w| lowered.contains(w)) {
                    self.tiles[idx] = TileState::Seat;
                    self.seat_rotations[idx] = rotation;
                } else {
                    self.tiles[idx] = TileState::Blocked;
                }
            }

            if r.remaining() == 0 {
                break;
            }
        }
    }

    #[inline]
    fn index(&self, x: i32, y: i32) -> usize {
        (x * self.height + y) as usize
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && x < self.width && y >= 0 && y < self.height
    }

    pub fn tile_state(&self, x: i32, y: i32) -> TileState {
        if !self.in_bounds(x, y) {
            return TileState::Blocked;
        }
        self.tiles[self.index(x, y)]
    }

    pub fn floor_height(&self, x: i32, y: i32) -> f32 {
        if !self.in_bounds(x, y) {
            return 0.0;
        }
        self.heights[self.index(x, y)]
    }

    pub fn seat_rotation(&self, x: i32, y: i32) -> i32 {
        if !self.in_bounds(x, y) {
            return 0;
        }
        self.seat_rotations[self.index(x, y)]
    }

    pub fn is_door(&self, x: i32, y: i32) -> bool {
        self.door.x == x && self.door.y == y
    }

    /// Heightmap as the client receives it: rows joined by CR.
    pub fn heightmap_string(&self) -> String {
        self.rows.join("\r")
    }

    /// Same as [`heightmap_string`](Self::heightmap_string) but with the door
    /// tile's character replaced by the door's integer Z.
    pub fn relative_heightmap_string(&self) -> String {
        let door_z = self.door.z as i32;
        self.rows
            .iter()
            .enumerate()
            .map(|(y, row)| {
                if y as i32 != self.door.y {
                    return row.clone();
                }
                row.chars()
                    .enumerate()
                    .map(|(x, c)| {
                        if x as i32 == self.door.x {
                            door_z.to_string()
                        } else {
                            c.to_string()
                        }
                    })
                    .collect()
            })
            .collect::<Vec<_>>()
            .join("\r")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::vl64_encode;

    fn mk_door(x: i32, y: i32, z: f32) -> DoorSpec {
        DoorSpec { x, y, z, direction: 2 }
    }

    fn push_entry(buf: &mut Vec<u8>, id: i32, name: &str, x: i32, y: i32, rot: i32) {
        buf.extend(vl64_encode(id));
        buf.push(b'H'); // marker byte, ignored
        buf.extend(vl64_encode(id + 100)); // sprite id
        buf.extend(name.as_bytes());
        buf.push(0x00);
        buf.extend(vl64_encode(x));
        buf.extend(vl64_encode(y));
        buf.extend(vl64_encode(0));
        buf.extend(vl64_encode(rot));
    }

    #[test]
    fn door_z_overwrites_parsed_floor_height() {
        let t = RoomTemplate::parse("model_t", "00\r00", mk_door(0, 0, 1.5), false);
        assert_eq!(t.width, 2);
        assert_eq!(t.height, 2);
        assert_eq!(t.floor_height(0, 0), 1.5);
        assert_eq!(t.floor_height(1, 0), 0.0);
        assert_eq!(t.floor_height(0, 1), 0.0);
        assert_eq!(t.floor_height(1, 1), 0.0);
    }

    #[test]
    fn rows_after_the_first_lose_their_first_character() {
        // Row 1 carries a junk prefix; classification must match the
        // unprefixed row. Even an 'x' prefix is discarded.
        let prefixed = RoomTemplate::parse("m", "07\rx07", mk_door(0, 0, 0.0), false);
        for x in 0..2 {
            for y in 0..2 {
                assert_eq!(prefixed.tile_state(x, y), TileState::Open, "tile ({x},{y})");
            }
        }
        assert_eq!(prefixed.floor_height(1, 1), 7.0);
    }

    #[test]
    fn unknown_characters_block_fail_safe() {
        let t = RoomTemplate::parse("m", "0x\r.0?", mk_door(0, 0, 0.0), false);
        assert_eq!(t.tile_state(0, 0), TileState::Open);
        assert_eq!(t.tile_state(1, 0), TileState::Blocked);
        // Row 1 after strip is "0?".
        assert_eq!(t.tile_state(0, 1), TileState::Open);
        assert_eq!(t.tile_state(1, 1), TileState::Blocked);
    }

    #[test]
    fn empty_heightmap_parses_to_zero_by_zero() {
        let t = RoomTemplate::parse("m", "", mk_door(0, 0, 0.0), false);
        assert_eq!((t.width, t.height), (0, 0));
        assert_eq!(t.tile_state(0, 0), TileState::Blocked);
        assert_eq!(t.heightmap_string(), "");
    }

    #[test]
    fn static_furniture_marks_seats_and_blocks() {
        let mut t = RoomTemplate::parse("m", "000\r0000", mk_door(0, 0, 0.0), false);
        let mut stream = Vec::new();
        push_entry(&mut stream, 1, "Throne Chair", 1, 1, 2);
        push_entry(&mut stream, 2, "potted plant", 2, 0, 0);
        push_entry(&mut stream, 3, "out of range", 9, 9, 0);
        t.apply_static_furniture(&stream);

        assert_eq!(t.tile_state(1, 1), TileState::Seat);
        assert_eq!(t.seat_rotation(1, 1), 2);
        assert_eq!(t.tile_state(2, 0), TileState::Blocked);
    }

    #[test]
    fn truncated_static_furniture_keeps_decoded_prefix() {
        let mut t = RoomTemplate::parse("m", "000\r0000", mk_door(0, 0, 0.0), false);
        let mut stream = Vec::new();
        push_entry(&mut stream, 1, "Park Bench", 0, 1, 4);
        push_entry(&mut stream, 2, "Cafe Stool", 2, 1, 6);
        stream.truncate(stream.len() - 3); // cut into the second entry

        t.apply_static_furniture(&stream);
        assert_eq!(t.tile_state(0, 1), TileState::Seat);
        assert_eq!(t.seat_rotation(0, 1), 4);
        // The mangled second entry left its tile untouched.
        assert_eq!(t.tile_state(2, 1), TileState::Open);
    }

    #[test]
    fn relative_heightmap_substitutes_door_tile() {
        let t = RoomTemplate::parse("m", "000\r0000", mk_door(1, 1, 3.0), false);
        assert_eq!(t.heightmap_string(), "000\r000");
        assert_eq!(t.relative_heightmap_string(), "000\r030");
    }
}
