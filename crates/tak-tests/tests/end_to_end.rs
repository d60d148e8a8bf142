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

//! The six literal end-to-end scenarios, exercised across crate
//! boundaries rather than against any single module's internals.

use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::SeedableRng;

use tak_core::{new_position, Color, Direction, Kind, Move, Piece, WinReason};
use tak_mcts::{Config as MctsConfig, Mcts};
use tak_oracle::local::{Local, PolicyValueModel};
use tak_oracle::Oracle;

#[test]
fn opening_swap_places_the_opponents_flat_on_the_first_two_plies() {
    let p = new_position(5).unwrap();
    let p = p.apply(&Move::Place { x: 0, y: 0, kind: Kind::Flat }).unwrap();
    assert_eq!(p.square(0, 0)[0].color, Color::Black);
    assert_eq!(p.ply, 1);
    assert_eq!(p.reserves(Color::White).flats, new_position(5).unwrap().reserves(Color::White).flats);

    let p = p.apply(&Move::Place { x: 4, y: 4, kind: Kind::Flat }).unwrap();
    assert_eq!(p.square(4, 4)[0].color, Color::White);
    assert_eq!(p.ply, 2);
}

#[test]
fn opening_capstone_placement_is_illegal() {
    let p = new_position(5).unwrap();
    assert!(p.apply(&Move::Place { x: 0, y: 0, kind: Kind::Capstone }).is_err());
}

#[test]
fn sliding_a_capstone_onto_a_standing_stone_smashes_it() {
    let mut p = new_position(5).unwrap();
    p.ply = 2;
    p.board[0] = vec![Piece::new(Color::White, Kind::Capstone)];
    p.board[1] = vec![Piece::new(Color::Black, Kind::Standing)];

    let after = p.apply(&Move::Slide { x: 0, y: 0, direction: Direction::Right, drops: vec![1] }).unwrap();

    assert!(after.square(0, 0).is_empty());
    assert_eq!(after.square(1, 0)[0].kind, Kind::Capstone);
    assert_eq!(after.square(1, 0)[1], Piece::new(Color::Black, Kind::Flat));
}

#[test]
fn a_full_rank_of_flats_is_a_road_win() {
    let mut p = new_position(5).unwrap();
    p.ply = 2;
    for x in 0..5 {
        p.board[x] = vec![Piece::new(Color::White, Kind::Flat)];
    }
    assert_eq!(p.terminal(), (Some(Color::White), Some(WinReason::Road)));
}

#[test]
fn every_legal_move_on_size_three_survives_an_encode_decode_round_trip() {
    let p = new_position(3).unwrap();
    for m in p.legal_moves() {
        let id = tak_encoding::move_id(3, &m).unwrap_or_else(|| panic!("{:?} has no id on size 3", m));
        assert_eq!(tak_encoding::move_from_id(3, id), Some(&m));
    }
}

#[test]
fn mcts_is_deterministic_given_a_fixed_oracle_and_seed() {
    struct Uniform(usize);
    impl PolicyValueModel for Uniform {
        fn evaluate(&self, _encoded_position: &[u8]) -> (Vec<f32>, f32) {
            (vec![1.0; self.0], 0.0)
        }
    }

    let oracle: Arc<dyn Oracle> = Arc::new(Local::new(Uniform(tak_encoding::max_move_id(3))));
    let engine = Mcts::new(oracle, MctsConfig { time_limit: None, simulation_limit: Some(5), ..MctsConfig::default() });

    let run = || {
        let mut rng = SmallRng::seed_from_u64(2026);
        let tree = engine.analyze(new_position(3).unwrap(), &mut rng).unwrap();
        engine.select_root_move(&tree, &mut SmallRng::seed_from_u64(7)).unwrap()
    };

    assert_eq!(run(), run());
}
