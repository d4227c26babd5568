use crate::rooms::grid::TileGrid;
use std::collections::{HashMap, VecDeque};

/// Path search collaborator. The room core only stores the returned tile
/// sequence and advances a cursor over it; how the path is found is not its
/// business.
pub trait Pathfinder: Send + Sync {
    /// Ordered tiles from `from` (exclusive) to `to` (inclusive), or `None`
    /// when the goal is unreachable.
    fn find_path(&self, grid: &TileGrid, from: (i32, i32), to: (i32, i32))
    -> Option<Vec<(i32, i32)>>;
}

/// Plain breadth-first search over the eight neighbours. Good enough for the
/// demo boot and the tests; a production deployment would swap in something
/// diagonal-cost aware.
pub struct BfsPathfinder;

const NEIGHBOURS: [(i32, i32); 8] = [
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
];

impl Pathfinder for BfsPathfinder {
    fn find_path(
        &self,
        grid: &TileGrid,
        from: (i32, i32),
        to: (i32, i32),
    ) -> Option<Vec<(i32, i32)>> {
        if from == to {
            return Some(Vec::new());
        }
        if !grid.is_walkable(to.0, to.1) {
            return None;
        }

        let mut came_from: HashMap<(i32, i32), (i32, i32)> = HashMap::new();
        let mut queue = VecDeque::from([from]);

        while let Some(current) = queue.pop_front() {
            if current == to {
                let mut path = vec![current];
                let mut cursor = current;
                while let Some(prev) = came_from.get(&cursor) {
                    if *prev == from {
                        break;
                    }
                    path.push(*prev);
                    cursor = *prev;
                }
                path.reverse();
                return Some(path);
            }
            for (dx, dy) in NEIGHBOURS {
                let next = (current.0 + dx, current.1 + dy);
                if !grid.is_walkable(next.0, next.1) || came_from.contains_key(&next) || next == from
                {
                    continue;
                }
                came_from.insert(next, current);
                queue.push_back(next);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rooms::template::{DoorSpec, RoomTemplate};

    fn mk_grid(heightmap: &str) -> TileGrid {
        let t = RoomTemplate::parse(
            "m",
            heightmap,
            DoorSpec { x: 0, y: 0, z: 0.0, direction: 2 },
            false,
        );
        TileGrid::build(&t, &[], &[])
    }

    #[test]
    fn straight_line() {
        let grid = mk_grid("000\r0000\r0000");
        let path = BfsPathfinder.find_path(&grid, (0, 0), (2, 0)).unwrap();
        assert_eq!(path.last(), Some(&(2, 0)));
        assert!(!path.contains(&(0, 0)), "path excludes the start tile");
    }

    #[test]
    fn routes_around_blocked_tiles() {
        // Middle column blocked except the bottom row.
        let grid = mk_grid("0x0\r00x0\r0000");
        let path = BfsPathfinder.find_path(&grid, (0, 0), (2, 0)).unwrap();
        assert_eq!(path.last(), Some(&(2, 0)));
        assert!(path.iter().all(|&(x, y)| grid.is_walkable(x, y)));
    }

    #[test]
    fn unreachable_goal_is_none() {
        let grid = mk_grid("0x0\r!0x0\r!0x0");
        assert!(BfsPathfinder.find_path(&grid, (0, 0), (2, 0)).is_none());
    }

    #[test]
    fn same_tile_is_empty_path() {
        let grid = mk_grid("00\r00");
        assert_eq!(BfsPathfinder.find_path(&grid, (1, 1), (1, 1)), Some(vec![]));
    }
}
