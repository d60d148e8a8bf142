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

//! Cross-cutting invariants from the testable-properties list: reserve
//! conservation, legality/apply agreement, symmetry equivariance, and
//! the policy solver's output contract, all driven through randomly
//! sampled legal play rather than hand-picked positions.

use std::collections::HashSet;
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use tak_core::{all_moves_for_size, distinct_symmetries, new_position, transform_move, transform_position};
use tak_mcts::policy::solve_policy;
use tak_mcts::{Config as MctsConfig, Mcts};
use tak_oracle::local::{Local, PolicyValueModel};
use tak_oracle::Oracle;
use tak_selfplay::play_one_game;

fn total_pieces(p: &tak_core::Position, color: tak_core::Color) -> u32 {
    let reserves = p.reserves(color);
    let mut on_board = 0u32;
    for x in 0..p.size {
        for y in 0..p.size {
            for piece in p.square(x, y) {
                if piece.color == color {
                    on_board += 1;
                }
            }
        }
    }
    reserves.flats + reserves.caps + on_board
}

/// Plays `plies` random legal moves from the start position, asserting
/// the reserve-conservation invariant at every step.
fn random_playout(size: usize, plies: usize, rng: &mut SmallRng) -> tak_core::Position {
    let initial = new_position(size).unwrap();
    let (white_total, black_total) =
        (total_pieces(&initial, tak_core::Color::White), total_pieces(&initial, tak_core::Color::Black));

    let mut p = initial;
    for _ in 0..plies {
        let legal = p.legal_moves();
        if legal.is_empty() || p.terminal().0.is_some() {
            break;
        }
        let m = legal.choose(rng).unwrap();
        let next = p.apply(m).unwrap();

        assert_eq!(next.ply, p.ply + 1);
        assert_eq!(total_pieces(&next, tak_core::Color::White), white_total);
        assert_eq!(total_pieces(&next, tak_core::Color::Black), black_total);

        p = next;
    }
    p
}

#[test]
fn reserves_and_board_pieces_are_conserved_across_a_random_game() {
    let mut rng = SmallRng::seed_from_u64(11);
    for _ in 0..20 {
        random_playout(4, 40, &mut rng);
    }
}

#[test]
fn legal_moves_is_exactly_the_set_apply_accepts() {
    for size in 3..=5 {
        let p = new_position(size).unwrap();
        let all = all_moves_for_size(size);
        let legal: HashSet<_> = p.legal_moves().into_iter().collect();
        for m in &all {
            assert_eq!(legal.contains(m), p.apply(m).is_ok(), "size {} move {:?}", size, m);
        }
    }
}

#[test]
fn symmetries_preserve_terminality_and_commute_with_apply() {
    let mut rng = SmallRng::seed_from_u64(99);
    let p = random_playout(4, 12, &mut rng);

    for (index, transformed) in distinct_symmetries(&p) {
        assert_eq!(transformed.size, p.size);
        assert_eq!(transformed.terminal().0, p.terminal().0);

        if let Some(m) = p.legal_moves().first() {
            let direct = p.apply(m).unwrap();
            let sym_move = transform_move(index, m, p.size);
            let via_symmetry = transformed.apply(&sym_move).unwrap();
            assert_eq!(transform_position(index, &direct), via_symmetry);
        }
    }
}

#[test]
fn solved_policy_is_a_valid_distribution_over_random_inputs() {
    let mut rng = SmallRng::seed_from_u64(3);
    for _ in 0..50 {
        let n = 2 + (rng.gen::<u8>() % 6) as usize;
        let mut pi_theta: Vec<f32> = (0..n).map(|_| rng.gen::<f32>() + 1e-3).collect();
        let sum: f32 = pi_theta.iter().sum();
        for p in &mut pi_theta {
            *p /= sum;
        }
        let q: Vec<f32> = (0..n).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect();

        let pi_alpha = solve_policy(&pi_theta, &q, 1.0).unwrap();
        assert!(pi_alpha.iter().all(|&p| p >= -1e-4));
        let total: f32 = pi_alpha.iter().sum();
        assert!((total - 1.0).abs() <= 1e-2, "sum was {}", total);
    }
}

#[test]
fn mcts_simulation_counts_are_conserved_between_root_and_children() {
    struct Uniform(usize);
    impl PolicyValueModel for Uniform {
        fn evaluate(&self, _encoded_position: &[u8]) -> (Vec<f32>, f32) {
            (vec![1.0; self.0], 0.0)
        }
    }

    let oracle: Arc<dyn Oracle> = Arc::new(Local::new(Uniform(tak_encoding::max_move_id(3))));
    let engine = Mcts::new(oracle, MctsConfig { time_limit: None, simulation_limit: Some(16), ..MctsConfig::default() });

    let mut rng = SmallRng::seed_from_u64(42);
    let tree = engine.analyze(new_position(3).unwrap(), &mut rng).unwrap();

    assert_eq!(tree.simulations, 16);
    // The first simulation's descent path is empty (it only expands the
    // root), so backup touches the root but no child; only the later
    // N-1 simulations reach a child.
    let children_total: u32 = tree.children.as_ref().unwrap().iter().map(|c| c.simulations).sum();
    assert_eq!(children_total, tree.simulations - 1);
    assert!(tree.value.abs() <= tree.simulations as f32);
}

#[test]
fn a_full_self_play_game_against_a_uniform_oracle_terminates_with_a_valid_result() {
    struct Uniform(usize);
    impl PolicyValueModel for Uniform {
        fn evaluate(&self, _encoded_position: &[u8]) -> (Vec<f32>, f32) {
            (vec![1.0; self.0], 0.0)
        }
    }

    let oracle: Arc<dyn Oracle> = Arc::new(Local::new(Uniform(tak_encoding::max_move_id(3))));
    let engine = Mcts::new(oracle, MctsConfig { time_limit: None, simulation_limit: Some(8), ..MctsConfig::default() });

    let mut rng = SmallRng::seed_from_u64(5);
    let transcript = play_one_game(&engine, 3, 0.99, 60, &mut rng).unwrap();

    assert_eq!(transcript.positions.len(), transcript.probs.len());
    assert_eq!(transcript.positions.len(), transcript.values.len());
    for probs in &transcript.probs {
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() <= 1e-2);
    }

    let batch = tak_selfplay::encode_games(std::slice::from_ref(&transcript));
    assert_eq!(batch.len(), transcript.positions.len());
    for result in &batch.results {
        assert!((-1.0..=1.0).contains(result));
    }
}
