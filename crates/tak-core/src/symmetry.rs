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

use crate::moves::{Direction, Move};
use crate::position::Position;

/// The 8 symmetries of a square board (the dihedral group D4): four
/// rotations, each optionally preceded by a horizontal flip. Indices
/// match the canonical reference's `SYMMETRIES` list, built as
/// `rotation^k` composed with either the identity or a flip.
pub const NUM_SYMMETRIES: usize = 8;

fn rotate_square(x: i32, y: i32, size: i32) -> (i32, i32) {
    (y, size - 1 - x)
}

fn flip_square(x: i32, y: i32, size: i32) -> (i32, i32) {
    (size - 1 - x, y)
}

fn rotate_dir(dx: i32, dy: i32) -> (i32, i32) {
    (dy, -dx)
}

fn flip_dir(dx: i32, dy: i32) -> (i32, i32) {
    (-dx, dy)
}

fn transform_square(index: usize, x: usize, y: usize, size: usize) -> (usize, usize) {
    let (size, mut cx, mut cy) = (size as i32, x as i32, y as i32);
    let rotations = index / 2;
    let flip = index % 2 == 1;

    if flip {
        let (nx, ny) = flip_square(cx, cy, size);
        cx = nx;
        cy = ny;
    }
    for _ in 0..rotations {
        let (nx, ny) = rotate_square(cx, cy, size);
        cx = nx;
        cy = ny;
    }

    (cx as usize, cy as usize)
}

fn transform_dir(index: usize, direction: Direction) -> Direction {
    let (mut dx, mut dy) = direction.delta();
    let rotations = index / 2;
    let flip = index % 2 == 1;

    if flip {
        let (ndx, ndy) = flip_dir(dx, dy);
        dx = ndx;
        dy = ndy;
    }
    for _ in 0..rotations {
        let (ndx, ndy) = rotate_dir(dx, dy);
        dx = ndx;
        dy = ndy;
    }

    Direction::from_delta(dx, dy).expect("symmetry maps axis-aligned directions to themselves")
}

/// Applies symmetry `index` (`0..NUM_SYMMETRIES`) to a position's board,
/// leaving ply and reserves untouched.
pub fn transform_position(index: usize, pos: &Position) -> Position {
    let size = pos.size;
    let mut board = vec![Vec::new(); size * size];

    for x in 0..size {
        for y in 0..size {
            let (ox, oy) = transform_square(index, x, y, size);
            board[oy * size + ox] = pos.square(x, y).to_vec();
        }
    }

    pos.with_board(board)
}

/// Applies symmetry `index` to a move, for translating self-play policy
/// targets back into the canonical orientation.
pub fn transform_move(index: usize, m: &Move, size: usize) -> Move {
    match *m {
        Move::Place { x, y, kind } => {
            let (ox, oy) = transform_square(index, x, y, size);
            Move::Place { x: ox, y: oy, kind }
        }
        Move::Slide { x, y, direction, ref drops } => {
            let (ox, oy) = transform_square(index, x, y, size);
            Move::Slide { x: ox, y: oy, direction: transform_dir(index, direction), drops: drops.clone() }
        }
    }
}

/// Returns the distinct positions reachable from `pos` under the 8 board
/// symmetries, paired with the symmetry index that produced each one.
/// Mirrors the reference `symmetries()` helper's deduplication (a
/// position with its own internal symmetry yields fewer than 8 entries).
pub fn distinct_symmetries(pos: &Position) -> Vec<(usize, Position)> {
    let mut out: Vec<(usize, Position)> = Vec::new();

    for index in 0..NUM_SYMMETRIES {
        let transformed = transform_position(index, pos);
        if out.iter().all(|(_, p)| p != &transformed) {
            out.push((index, transformed));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::piece::{Color, Kind, Piece};
    use crate::position::new_position;

    #[test]
    fn identity_symmetry_is_a_no_op() {
        let mut p = new_position(5).unwrap();
        p.board[7] = vec![Piece::new(Color::White, Kind::Flat)];
        assert_eq!(transform_position(0, &p), p);
    }

    #[test]
    fn four_rotations_return_to_start() {
        let mut p = new_position(5).unwrap();
        p.board[3] = vec![Piece::new(Color::Black, Kind::Capstone)];

        let mut rotated = p.clone();
        for _ in 0..4 {
            rotated = transform_position(2, &rotated);
        }
        assert_eq!(rotated, p);
    }

    #[test]
    fn distinct_symmetries_is_never_empty_and_bounded() {
        let p = new_position(4).unwrap();
        let all = distinct_symmetries(&p);
        assert!(!all.is_empty());
        assert!(all.len() <= NUM_SYMMETRIES);
    }

    #[test]
    fn transform_move_rotates_direction() {
        let m = Move::Slide { x: 1, y: 1, direction: Direction::Up, drops: vec![1] };
        let t = transform_move(2, &m, 5);
        match t {
            Move::Slide { direction, .. } => assert_eq!(direction, Direction::Right),
            _ => panic!("expected slide"),
        }
    }

    #[test]
    fn flip_preserves_vertical_directions() {
        let m = Move::Slide { x: 1, y: 1, direction: Direction::Up, drops: vec![1] };
        let t = transform_move(1, &m, 5);
        match t {
            Move::Slide { direction, .. } => assert_eq!(direction, Direction::Up),
            _ => panic!("expected slide"),
        }
    }
}
