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

//! Token encoding of positions and the move<->id bijection the oracle and
//! search use to talk about moves as plain integers.

use std::collections::HashMap;
use std::sync::OnceLock;

use tak_core::{all_moves_for_size, Color, Kind, Move, Piece, Position};

pub const MAX_RESERVES: u32 = 50;
pub const MAX_CAPSTONES: u32 = 2;

/// Fixed token ids. Values 0..=10 are the piece/turn tokens; reserve and
/// capstone counts are packed at the top of the `u8` range, each table
/// sized to the *inclusive* count range `0..=MAX` (the canonical
/// reference's equivalent tables are one entry short of that and can
/// index out of range at the start of a game on an 8x8 board — fixed
/// here rather than reproduced).
pub mod token {
    pub const EMPTY: u8 = 0;

    pub const MY_TOP_FLAT: u8 = 1;
    pub const MY_FLAT: u8 = 2;
    pub const MY_STANDING: u8 = 3;
    pub const MY_CAPSTONE: u8 = 4;

    pub const THEIR_TOP_FLAT: u8 = 5;
    pub const THEIR_FLAT: u8 = 6;
    pub const THEIR_STANDING: u8 = 7;
    pub const THEIR_CAPSTONE: u8 = 8;

    pub const WHITE_TO_PLAY: u8 = 9;
    pub const BLACK_TO_PLAY: u8 = 10;

    pub const LAST_CAPSTONE_VALUE: u8 = 255;
    pub const FIRST_CAPSTONES_VALUE: u8 = LAST_CAPSTONE_VALUE - super::MAX_CAPSTONES as u8;
    pub const LAST_RESERVES_VALUE: u8 = FIRST_CAPSTONES_VALUE - 1;
    pub const FIRST_RESERVES_VALUE: u8 = LAST_RESERVES_VALUE - super::MAX_RESERVES as u8;

    pub fn reserves(remaining: u32) -> u8 {
        FIRST_RESERVES_VALUE + remaining.min(super::MAX_RESERVES) as u8
    }

    pub fn capstones(remaining: u32) -> u8 {
        FIRST_CAPSTONES_VALUE + remaining.min(super::MAX_CAPSTONES) as u8
    }
}

fn top_piece_token(piece: Piece, perspective: Color) -> u8 {
    use token::*;
    match (piece.color == perspective, piece.kind) {
        (true, Kind::Flat) => MY_TOP_FLAT,
        (false, Kind::Flat) => THEIR_TOP_FLAT,
        (true, Kind::Standing) => MY_STANDING,
        (false, Kind::Standing) => THEIR_STANDING,
        (true, Kind::Capstone) => MY_CAPSTONE,
        (false, Kind::Capstone) => THEIR_CAPSTONE,
    }
}

/// Encodes a position from the perspective of the player to move: `[to
/// play, my reserves, my capstones, their reserves, their capstones,
/// board...]`, board squares top-first with non-top flats folded to a
/// single MY_FLAT/THEIR_FLAT token (a standing stone or capstone buried
/// in a stack is always a flat underneath it, per the smash rule).
pub fn encode(pos: &Position) -> Vec<u8> {
    let me = pos.to_move();
    let them = me.flip();

    let mut data = Vec::with_capacity(4 + pos.size * pos.size);
    data.push(match me {
        Color::White => token::WHITE_TO_PLAY,
        Color::Black => token::BLACK_TO_PLAY,
    });

    let my_reserves = pos.reserves(me);
    let their_reserves = pos.reserves(them);
    data.push(token::reserves(my_reserves.flats));
    data.push(token::capstones(my_reserves.caps));
    data.push(token::reserves(their_reserves.flats));
    data.push(token::capstones(their_reserves.caps));

    for y in 0..pos.size {
        for x in 0..pos.size {
            let square = pos.square(x, y);
            match square.split_first() {
                None => data.push(token::EMPTY),
                Some((top, rest)) => {
                    data.push(top_piece_token(*top, me));
                    for flat in rest {
                        data.push(if flat.color == me { token::MY_FLAT } else { token::THEIR_FLAT });
                    }
                }
            }
        }
    }

    data
}

/// Pads a batch of variable-length encodings to the longest one, and
/// returns a parallel mask of which entries are real tokens versus
/// padding — the Rust analogue of the reference's ragged-to-dense batch
/// tensor helper.
pub fn pad_batch(encoded: &[Vec<u8>]) -> (Vec<Vec<u8>>, Vec<Vec<bool>>) {
    let width = encoded.iter().map(|e| e.len()).max().unwrap_or(0);
    let mut out = Vec::with_capacity(encoded.len());
    let mut mask = Vec::with_capacity(encoded.len());

    for entry in encoded {
        let mut row = entry.clone();
        let mut row_mask = vec![true; entry.len()];
        row.resize(width, 0);
        row_mask.resize(width, false);
        out.push(row);
        mask.push(row_mask);
    }

    (out, mask)
}

pub fn encode_batch(positions: &[Position]) -> (Vec<Vec<u8>>, Vec<Vec<bool>>) {
    let encoded: Vec<Vec<u8>> = positions.iter().map(encode).collect();
    pad_batch(&encoded)
}

const SUPPORTED_SIZES: usize = 9;

fn move_tables() -> &'static [Vec<Move>; SUPPORTED_SIZES] {
    static TABLES: OnceLock<[Vec<Move>; SUPPORTED_SIZES]> = OnceLock::new();
    TABLES.get_or_init(|| {
        std::array::from_fn(|size| if (3..=8).contains(&size) { all_moves_for_size(size) } else { Vec::new() })
    })
}

fn move_index(size: usize) -> &'static HashMap<Move, u32> {
    static INDEXES: OnceLock<[Option<HashMap<Move, u32>>; SUPPORTED_SIZES]> = OnceLock::new();
    let indexes = INDEXES.get_or_init(|| {
        std::array::from_fn(|size| {
            if (3..=8).contains(&size) {
                Some(move_tables()[size].iter().enumerate().map(|(i, m)| (m.clone(), i as u32)).collect())
            } else {
                None
            }
        })
    });
    indexes[size].as_ref().expect("unsupported board size")
}

/// The fixed, size-dependent move<->id bijection used to talk about
/// moves as plain integers between search, encoding, and the oracle.
pub fn move_id(size: usize, m: &Move) -> Option<u32> {
    move_index(size).get(m).copied()
}

pub fn move_from_id(size: usize, id: u32) -> Option<&'static Move> {
    move_tables().get(size)?.get(id as usize)
}

pub fn max_move_id(size: usize) -> usize {
    move_tables().get(size).map(|t| t.len()).unwrap_or(0)
}

/// The fixed width of a move-probability vector regardless of board
/// size: the largest per-size table, i.e. size 8's.
pub fn global_max_move_id() -> usize {
    (3..=8).map(max_move_id).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tak_core::new_position;

    #[test]
    fn encode_starting_position_has_fixed_header() {
        let pos = new_position(5).unwrap();
        let encoded = encode(&pos);
        assert_eq!(encoded[0], token::WHITE_TO_PLAY);
        assert_eq!(encoded.len(), 4 + 25);
        assert!(encoded[4..].iter().all(|&t| t == token::EMPTY));
    }

    #[test]
    fn reserve_tokens_cover_full_inclusive_range_without_overlap() {
        assert_eq!(token::reserves(0), token::FIRST_RESERVES_VALUE);
        assert_eq!(token::reserves(MAX_RESERVES), token::LAST_RESERVES_VALUE);
        assert_eq!(token::capstones(0), token::FIRST_CAPSTONES_VALUE);
        assert_eq!(token::capstones(MAX_CAPSTONES), token::LAST_CAPSTONE_VALUE);
        assert!(token::LAST_RESERVES_VALUE < token::FIRST_CAPSTONES_VALUE);
    }

    #[test]
    fn global_max_move_id_is_the_largest_per_size_table() {
        assert_eq!(global_max_move_id(), max_move_id(8));
        assert!(global_max_move_id() >= max_move_id(3));
    }

    #[test]
    fn pad_batch_produces_rectangular_rows_with_matching_mask() {
        let (rows, mask) = pad_batch(&[vec![1, 2, 3], vec![1]]);
        assert_eq!(rows[0].len(), rows[1].len());
        assert_eq!(mask[1], vec![true, false, false]);
    }

    #[test]
    fn move_id_is_a_bijection_for_every_supported_size() {
        for size in 3..=8 {
            let table = &move_tables()[size];
            for (i, m) in table.iter().enumerate() {
                assert_eq!(move_id(size, m), Some(i as u32));
                assert_eq!(move_from_id(size, i as u32), Some(m));
            }
            assert_eq!(max_move_id(size), table.len());
        }
    }
}
