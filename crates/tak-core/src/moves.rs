// Copyright 2019 Karl Sundequist Blomdahl <karl.sundequist.blomdahl@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use serde::{Deserialize, Serialize};

use crate::piece::Kind;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Left,
        Direction::Right,
        Direction::Up,
        Direction::Down,
    ];

    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
            Direction::Up => (0, 1),
            Direction::Down => (0, -1),
        }
    }

    pub fn from_delta(dx: i32, dy: i32) -> Option<Direction> {
        Direction::ALL.into_iter().find(|d| d.delta() == (dx, dy))
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Move {
    Place { x: usize, y: usize, kind: Kind },
    Slide { x: usize, y: usize, direction: Direction, drops: Vec<u32> },
}

impl Move {
    pub fn origin(&self) -> (usize, usize) {
        match *self {
            Move::Place { x, y, .. } => (x, y),
            Move::Slide { x, y, .. } => (x, y),
        }
    }
}

/// All drop-partitions of `n` pieces into one-or-more non-empty piles,
/// i.e. every non-empty tuple of positive integers summing to `n`. Mirrors
/// the recursive `ALL_SLIDES` table construction in the canonical
/// reference implementation.
pub fn slide_partitions(n: usize) -> Vec<Vec<u32>> {
    if n == 0 {
        return vec![];
    }

    let mut out = Vec::new();
    for first in 1..=n {
        out.push(vec![first as u32]);
        for rest in slide_partitions(n - first) {
            let mut whole = vec![first as u32];
            whole.extend(rest);
            out.push(whole);
        }
    }
    out
}

/// Every syntactically-valid move on a board of the given size: all three
/// placement kinds on every square, plus every slide whose drop-partition
/// fits between the origin and the edge of the board in that direction.
/// This is a fixed, size-dependent ordering used by the move encoder —
/// it is *not* filtered by legality from any particular position.
pub fn all_moves_for_size(size: usize) -> Vec<Move> {
    let mut out = Vec::new();

    for x in 0..size {
        for y in 0..size {
            out.push(Move::Place { x, y, kind: Kind::Flat });
            out.push(Move::Place { x, y, kind: Kind::Standing });
            out.push(Move::Place { x, y, kind: Kind::Capstone });

            let room = [
                (Direction::Left, x),
                (Direction::Right, size - x - 1),
                (Direction::Down, y),
                (Direction::Up, size - y - 1),
            ];

            // Pickup count ranges over every width from a single piece up
            // to the whole board (spec.md §4.2: "drop-partition with sum
            // <= size"), not just the maximal pickup.
            for pickup in 1..=size {
                for partition in slide_partitions(pickup) {
                    for &(direction, available) in &room {
                        if partition.len() <= available {
                            out.push(Move::Slide {
                                x,
                                y,
                                direction,
                                drops: partition.clone(),
                            });
                        }
                    }
                }
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_of_three() {
        let mut got = slide_partitions(3);
        got.sort();
        let mut want = vec![vec![1, 1, 1], vec![1, 2], vec![2, 1], vec![3]];
        want.sort();
        assert_eq!(got, want);
    }

    #[test]
    fn partitions_are_non_empty_and_sum_correctly() {
        for n in 1..=8 {
            for p in slide_partitions(n) {
                assert!(!p.is_empty());
                assert_eq!(p.iter().sum::<u32>(), n as u32);
                assert!(p.iter().all(|&d| d > 0));
            }
        }
    }

    #[test]
    fn all_moves_nonempty_for_every_size() {
        for size in 3..=8 {
            assert!(!all_moves_for_size(size).is_empty());
        }
    }
}
