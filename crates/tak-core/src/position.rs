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

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use tak_utils::config::default_reserves_for_size;
use tak_utils::error::{CoreError, IllegalMoveKind};

use crate::moves::{all_moves_for_size, Direction, Move};
use crate::piece::{Color, Kind, Piece};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Reserves {
    pub flats: u32,
    pub caps: u32,
}

impl Reserves {
    pub fn is_empty(self) -> bool {
        self.flats == 0 && self.caps == 0
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Config {
    pub size: usize,
    pub pieces: Option<u32>,
    pub capstones: Option<u32>,
}

impl Config {
    pub fn new(size: usize) -> Self {
        Self { size, pieces: None, capstones: None }
    }

    pub fn flat_count(&self) -> Result<u32, CoreError> {
        if let Some(pieces) = self.pieces {
            return Ok(pieces);
        }
        default_reserves_for_size(self.size).map(|(flats, _)| flats)
    }

    pub fn capstone_count(&self) -> Result<u32, CoreError> {
        if let Some(caps) = self.capstones {
            return Ok(caps);
        }
        default_reserves_for_size(self.size).map(|(_, caps)| caps)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WinReason {
    Road,
    Flats,
}

/// A single immutable board position. Squares are stored top-first (the
/// piece at index 0 of a square's stack is the one on top), matching the
/// canonical reference implementation's `stack[0]` convention.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub size: usize,
    pub ply: u32,
    pub board: Vec<Vec<Piece>>,
    reserves: [Reserves; 2],
}

impl Position {
    pub fn new(config: Config) -> Result<Self, CoreError> {
        let flats = config.flat_count()?;
        let caps = config.capstone_count()?;
        let reserves = Reserves { flats, caps };

        Ok(Self {
            size: config.size,
            ply: 0,
            board: vec![Vec::new(); config.size * config.size],
            reserves: [reserves, reserves],
        })
    }

    pub fn reserves(&self, color: Color) -> Reserves {
        self.reserves[color.index()]
    }

    pub fn to_move(&self) -> Color {
        if self.ply % 2 == 0 {
            Color::White
        } else {
            Color::Black
        }
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && (x as usize) < self.size && y >= 0 && (y as usize) < self.size
    }

    fn index(&self, x: usize, y: usize) -> usize {
        y * self.size + x
    }

    pub fn square(&self, x: usize, y: usize) -> &[Piece] {
        &self.board[self.index(x, y)]
    }

    /// Rebuilds a position with the same ply and reserves but a permuted
    /// board, for use by the symmetry transforms — reserves don't change
    /// under a board symmetry, only square contents do.
    pub fn with_board(&self, board: Vec<Vec<Piece>>) -> Position {
        Position { size: self.size, ply: self.ply, board, reserves: self.reserves }
    }

    fn is_road_square(&self, x: usize, y: usize) -> bool {
        self.square(x, y).first().map(|p| p.is_road()).unwrap_or(false)
    }

    /// Flood-fills from the given edge seeds, following road-piece
    /// squares of `color`, and returns whether the opposite edge was
    /// reached. Mirrors the reference `_walk` routine (a plain worklist,
    /// not a union-find).
    fn walk(&self, seeds: &[(i32, i32)], color: Color, horizontal: bool) -> bool {
        let mut seen: HashSet<(i32, i32)> = HashSet::new();
        let mut queue: Vec<(i32, i32)> = seeds.to_vec();

        while let Some((x, y)) = queue.pop() {
            if !seen.insert((x, y)) {
                continue;
            }
            if !self.in_bounds(x, y) {
                continue;
            }
            let (ux, uy) = (x as usize, y as usize);
            if !self.is_road_square(ux, uy) {
                continue;
            }
            if self.square(ux, uy)[0].color != color {
                continue;
            }

            if horizontal && ux == self.size - 1 {
                return true;
            }
            if !horizontal && uy == self.size - 1 {
                return true;
            }

            queue.push((x + 1, y));
            queue.push((x - 1, y));
            queue.push((x, y + 1));
            queue.push((x, y - 1));
        }

        false
    }

    /// Returns the color with a completed road, if any. When both colors
    /// have one simultaneously (only reachable via a slide that completes
    /// both at once) the player who just moved wins — `to_move().flip()`
    /// at this point, matching real Tak's tiebreak rule: the active
    /// player's road takes priority.
    fn has_road(&self) -> Option<Color> {
        let left: Vec<(i32, i32)> = (0..self.size as i32).map(|i| (0, i)).collect();
        let top: Vec<(i32, i32)> = (0..self.size as i32).map(|i| (i, 0)).collect();

        let white = self.walk(&left, Color::White, true) || self.walk(&top, Color::White, false);
        let black = self.walk(&left, Color::Black, true) || self.walk(&top, Color::Black, false);

        match (white, black) {
            (true, true) => Some(self.to_move().flip()),
            (true, false) => Some(Color::White),
            (false, true) => Some(Color::Black),
            (false, false) => None,
        }
    }

    fn flat_counts(&self) -> (u32, u32) {
        let mut white = 0;
        let mut black = 0;
        for square in &self.board {
            if let Some(top) = square.first() {
                if top.kind == Kind::Flat {
                    match top.color {
                        Color::White => white += 1,
                        Color::Black => black += 1,
                    }
                }
            }
        }
        (white, black)
    }

    fn flats_winner(&self) -> Color {
        let (white, black) = self.flat_counts();
        if white > black {
            Color::White
        } else if black > white {
            Color::Black
        } else {
            // ties go to the player who just moved (see `has_road`'s doc).
            self.to_move().flip()
        }
    }

    /// Returns `(winner, reason)`; `(None, None)` if the game continues.
    pub fn terminal(&self) -> (Option<Color>, Option<WinReason>) {
        if let Some(color) = self.has_road() {
            return (Some(color), Some(WinReason::Road));
        }

        let board_full = self.board.iter().all(|sq| !sq.is_empty());
        let out_of_reserves = self.reserves[0].is_empty() || self.reserves[1].is_empty();

        if board_full || out_of_reserves {
            return (Some(self.flats_winner()), Some(WinReason::Flats));
        }

        (None, None)
    }

    pub fn legal_moves(&self) -> Vec<Move> {
        all_moves_for_size(self.size)
            .into_iter()
            .filter(|m| self.apply(m).is_ok())
            .collect()
    }

    pub fn apply(&self, m: &Move) -> Result<Position, CoreError> {
        match *m {
            Move::Place { x, y, kind } => self.apply_place(x, y, kind),
            Move::Slide { x, y, direction, ref drops } => self.apply_slide(x, y, direction, drops),
        }
    }

    fn apply_place(&self, x: usize, y: usize, kind: Kind) -> Result<Position, CoreError> {
        if self.ply < 2 && kind != Kind::Flat {
            return Err(CoreError::IllegalMove(IllegalMoveKind::IllegalOpening));
        }

        let idx = self.index(x, y);
        if !self.board[idx].is_empty() {
            return Err(CoreError::IllegalMove(IllegalMoveKind::OccupiedSquare));
        }

        let mut color = self.to_move();
        if self.ply < 2 {
            color = color.flip();
        }

        let mut reserves = self.reserves;
        let cs = &mut reserves[color.index()];
        match kind {
            Kind::Capstone => {
                if cs.caps == 0 {
                    return Err(CoreError::IllegalMove(IllegalMoveKind::InsufficientReserves));
                }
                cs.caps -= 1;
            }
            _ => {
                if cs.flats == 0 {
                    return Err(CoreError::IllegalMove(IllegalMoveKind::InsufficientReserves));
                }
                cs.flats -= 1;
            }
        }

        let mut board = self.board.clone();
        board[idx] = vec![Piece::new(color, kind)];

        Ok(Position { size: self.size, ply: self.ply + 1, board, reserves })
    }

    fn apply_slide(
        &self,
        x: usize,
        y: usize,
        direction: Direction,
        drops: &[u32],
    ) -> Result<Position, CoreError> {
        if self.ply < 2 {
            return Err(CoreError::IllegalMove(IllegalMoveKind::IllegalOpening));
        }

        if drops.is_empty() || drops.iter().any(|&d| d == 0) {
            return Err(CoreError::IllegalMove(IllegalMoveKind::BadPickup));
        }

        let pickup: u32 = drops.iter().sum();
        let origin = self.index(x, y);
        let stack = &self.board[origin];

        if pickup as usize > self.size || (pickup as usize) > stack.len() {
            return Err(CoreError::IllegalMove(IllegalMoveKind::BadPickup));
        }
        if stack[0].color != self.to_move() {
            return Err(CoreError::IllegalMove(IllegalMoveKind::NotMoversStack));
        }

        let mut board = self.board.clone();
        let mut carry: Vec<Piece> = stack[..pickup as usize].to_vec();
        board[origin] = stack[pickup as usize..].to_vec();

        let (dx, dy) = direction.delta();
        let (mut cx, mut cy) = (x as i32, y as i32);

        for &drop in drops {
            cx += dx;
            cy += dy;
            if !self.in_bounds(cx, cy) {
                return Err(CoreError::IllegalMove(IllegalMoveKind::OutOfBounds));
            }

            let idx = self.index(cx as usize, cy as usize);
            let mut dest = board[idx].clone();

            if let Some(top) = dest.first() {
                if top.kind == Kind::Capstone {
                    return Err(CoreError::IllegalMove(IllegalMoveKind::OntoCapstone));
                }
                if top.kind == Kind::Standing {
                    let lone_capstone = carry.len() == 1 && carry[0].kind == Kind::Capstone;
                    if !lone_capstone {
                        return Err(CoreError::IllegalMove(IllegalMoveKind::OntoStanding));
                    }
                    dest[0] = Piece::new(top.color, Kind::Flat);
                }
            }

            let split_at = carry.len() - drop as usize;
            let dropped = carry.split_off(split_at);
            let mut new_square = dropped;
            new_square.extend(dest);
            board[idx] = new_square;
        }

        Ok(Position { size: self.size, ply: self.ply + 1, board, reserves: self.reserves })
    }
}

pub fn new_position(size: usize) -> Result<Position, CoreError> {
    Position::new(Config::new(size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moves::Move;

    #[test]
    fn opening_swap_places_opponents_flat() {
        let p = new_position(5).unwrap();
        let p = p.apply(&Move::Place { x: 0, y: 0, kind: Kind::Flat }).unwrap();

        assert_eq!(p.square(0, 0)[0].color, Color::Black);
        assert_eq!(p.ply, 1);
        assert_eq!(p.reserves(Color::White).flats, Config::new(5).flat_count().unwrap());

        let p = p.apply(&Move::Place { x: 4, y: 4, kind: Kind::Flat }).unwrap();
        assert_eq!(p.square(4, 4)[0].color, Color::White);
        assert_eq!(p.ply, 2);
    }

    #[test]
    fn illegal_opening_capstone() {
        let p = new_position(5).unwrap();
        let err = p.apply(&Move::Place { x: 0, y: 0, kind: Kind::Capstone }).unwrap_err();
        assert!(matches!(err, CoreError::IllegalMove(IllegalMoveKind::IllegalOpening)));
    }

    #[test]
    fn smash_flattens_standing_stone() {
        // reach ply 2 via the opening swap so slides become legal, then
        // hand-construct a capstone-over-standing-stone setup directly.
        let mut p = new_position(5).unwrap();
        p.ply = 2;
        p.board[0] = vec![Piece::new(Color::White, Kind::Capstone)];
        p.board[1] = vec![Piece::new(Color::Black, Kind::Standing)];

        let moved = p
            .apply(&Move::Slide { x: 0, y: 0, direction: Direction::Right, drops: vec![1] })
            .unwrap();

        assert!(moved.square(0, 0).is_empty());
        assert_eq!(moved.square(1, 0)[0].kind, Kind::Capstone);
        assert_eq!(moved.square(1, 0)[1].kind, Kind::Flat);
        assert_eq!(moved.square(1, 0)[1].color, Color::Black);
    }

    #[test]
    fn road_win_detects_full_rank() {
        let mut p = new_position(5).unwrap();
        p.ply = 2;
        for x in 0..5 {
            p.board[x] = vec![Piece::new(Color::White, Kind::Flat)];
        }
        assert_eq!(p.terminal(), (Some(Color::White), Some(WinReason::Road)));
    }

    #[test]
    fn reserves_are_conserved_across_legal_moves() {
        let p = new_position(4).unwrap();
        for m in p.legal_moves() {
            let next = p.apply(&m).unwrap();
            assert_eq!(next.ply, p.ply + 1);
        }
    }

    #[test]
    fn legal_moves_matches_apply_success() {
        let p = new_position(3).unwrap();
        let all = all_moves_for_size(3);
        let legal: HashSet<_> = p.legal_moves().into_iter().collect();
        for m in &all {
            assert_eq!(legal.contains(m), p.apply(m).is_ok());
        }
    }
}
