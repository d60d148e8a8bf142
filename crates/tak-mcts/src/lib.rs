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

//! The regularized-policy MCTS search: selection by sampling from
//! [`policy::solve_policy`], oracle-driven expansion, alternating-sign
//! backup, root Dirichlet noise, and tree reuse across plies.

pub mod node;
pub mod policy;

use std::time::{Duration, Instant};

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rand_distr::Dirichlet;

use tak_core::{Move, Position};
use tak_oracle::Oracle;
use tak_utils::error::{CoreError, CoreResult};

pub use node::Node;

/// Search configuration. Either `time_limit` or `simulation_limit` (or
/// both) must be set; a `None` bound is simply ignored.
#[derive(Clone, Debug)]
pub struct Config {
    pub time_limit: Option<Duration>,
    pub simulation_limit: Option<u32>,
    pub c: f32,
    pub cutoff_prob: f32,
    pub root_noise_alpha: Option<f32>,
    pub root_noise_mix: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            time_limit: Some(Duration::from_secs(1)),
            simulation_limit: None,
            c: 4.0,
            cutoff_prob: 1e-6,
            root_noise_alpha: None,
            root_noise_mix: 0.25,
        }
    }
}

/// A single search engine bound to an [`Oracle`]. Stateless across calls
/// apart from the oracle and config; the tree itself is the only mutable
/// state and is threaded through by the caller (self-play, in practice).
pub struct Mcts {
    oracle: std::sync::Arc<dyn Oracle>,
    config: Config,
}

fn sample_index(probs: &[f32], rng: &mut impl Rng) -> CoreResult<usize> {
    // WeightedIndex requires at least one positive weight; a populated
    // node with children always has one (populate renormalizes).
    let weights: Vec<f32> = probs.iter().map(|&p| p.max(0.0)).collect();
    let dist = WeightedIndex::new(&weights)
        .map_err(|e| CoreError::InvariantFailure(format!("sampling from policy failed: {}", e)))?;
    Ok(dist.sample(rng))
}

fn node_at_mut<'a>(root: &'a mut Node, path: &[usize]) -> &'a mut Node {
    let mut node = root;
    for &i in path {
        node = &mut node.children.as_mut().expect("path only indexes expanded nodes")[i];
    }
    node
}

impl Mcts {
    pub fn new(oracle: std::sync::Arc<dyn Oracle>, config: Config) -> Self {
        Self { oracle, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs simulations against `tree` until the time or simulation
    /// budget is exhausted, then returns the (mutated in place,
    /// returned by value) tree.
    pub fn analyze_tree(&self, mut tree: Node, rng: &mut impl Rng) -> CoreResult<Node> {
        let deadline = self.config.time_limit.map(|d| Instant::now() + d);

        loop {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    break;
                }
            }
            if let Some(limit) = self.config.simulation_limit {
                if tree.simulations >= limit {
                    break;
                }
            }
            if deadline.is_none() && self.config.simulation_limit.is_none() {
                break;
            }

            let path = self.descend(&tree, rng)?;
            {
                let leaf = node_at_mut(&mut tree, &path);
                if !leaf.is_expanded() {
                    self.populate(leaf, path.is_empty(), rng)?;
                }
            }
            self.backup(&mut tree, &path);
        }

        Ok(tree)
    }

    pub fn analyze(&self, position: Position, rng: &mut impl Rng) -> CoreResult<Node> {
        self.analyze_tree(Node::root(position), rng)
    }

    /// Samples from `policy_probs` at every expanded node starting from
    /// `tree` until an unexpanded (or terminal, i.e. childless) node is
    /// reached, returning the child-index path taken.
    fn descend(&self, tree: &Node, rng: &mut impl Rng) -> CoreResult<Vec<usize>> {
        let mut path = Vec::new();
        let mut node = tree;

        loop {
            let Some(children) = node.children.as_ref() else {
                return Ok(path);
            };
            if children.is_empty() {
                return Ok(path);
            }

            let policy = node.policy_probs(self.config.c)?;
            let idx = sample_index(&policy, rng)?;
            path.push(idx);
            node = &children[idx];
        }
    }

    /// Expands a leaf node: terminal positions get a fixed `v_zero` and
    /// no children; otherwise the oracle is queried, the root gets
    /// Dirichlet noise mixed into its prior, low-probability and
    /// rule-illegal candidates are dropped, and survivors are
    /// renormalized into `child_probs`/`children`.
    fn populate(&self, node: &mut Node, is_root: bool, rng: &mut impl Rng) -> CoreResult<()> {
        let (winner, reason) = node.position.terminal();
        if reason.is_some() {
            node.v_zero = match winner {
                Some(w) if w == node.position.to_move() => 1.0,
                Some(_) => -1.0,
                None => 0.0,
            };
            node.children = Some(Vec::new());
            node.child_probs = Some(Vec::new());
            return Ok(());
        }

        let eval = self.oracle.evaluate(&node.position)?;
        node.v_zero = eval.value;

        let size = node.position.size;
        let n_moves = tak_encoding::max_move_id(size);
        let mut probs: Vec<f32> = eval.move_probs.iter().take(n_moves).copied().collect();
        probs.resize(n_moves, 0.0);

        if is_root {
            if let Some(alpha) = self.config.root_noise_alpha {
                mix_root_noise(&mut probs, alpha, self.config.root_noise_mix, rng)?;
            }
        }

        let mut child_probs = Vec::new();
        let mut children = Vec::new();

        for (mid, &p) in probs.iter().enumerate() {
            if p < self.config.cutoff_prob {
                continue;
            }
            let Some(mv) = tak_encoding::move_from_id(size, mid as u32) else {
                continue;
            };
            match node.position.apply(mv) {
                Ok(child_position) => {
                    child_probs.push(p);
                    children.push(Node::child(child_position, mv.clone()));
                }
                Err(_) => continue,
            }
        }

        let sum: f32 = child_probs.iter().sum();
        if sum > 0.0 {
            for p in &mut child_probs {
                *p /= sum;
            }
        }

        node.child_probs = Some(child_probs);
        node.children = Some(children);
        Ok(())
    }

    /// Walks `path` from leaf back to root, adding the alternating-sign
    /// value into each node's accumulator and incrementing its visit
    /// count.
    fn backup(&self, tree: &mut Node, path: &[usize]) {
        let mut value = node_at_mut(tree, path).v_zero;

        for depth in (0..=path.len()).rev() {
            let node = node_at_mut(tree, &path[..depth]);
            node.value += value;
            node.simulations += 1;
            value = -value;
        }
    }

    /// The regularized policy over the root's children, exposed for
    /// callers that want the training distribution without sampling a
    /// move (self-play records it verbatim as the policy target).
    pub fn tree_probs(&self, tree: &Node) -> CoreResult<Vec<f32>> {
        tree.policy_probs(self.config.c)
    }

    /// Samples a move from the root's regularized policy (not argmax —
    /// the policy is sampling-based by design, both for descent and for
    /// the final move choice).
    pub fn select_root_move(&self, tree: &Node, rng: &mut impl Rng) -> CoreResult<Move> {
        let policy = self.tree_probs(tree)?;
        let idx = sample_index(&policy, rng)?;
        let children = tree
            .children
            .as_ref()
            .ok_or_else(|| CoreError::InvariantFailure("select_root_move on unexpanded root".into()))?;
        children[idx]
            .mv
            .clone()
            .ok_or_else(|| CoreError::InvariantFailure("child node missing its move".into()))
    }

    /// Re-expands `root` (a subtree carried over from the previous
    /// ply's chosen child) with fresh root noise, then grafts back in
    /// any of its previous children whose move still matches — their
    /// statistics and further subtrees survive intact. The root's own
    /// accumulated `value`/`simulations` are left untouched.
    pub fn graft_root(&self, mut root: Node, rng: &mut impl Rng) -> CoreResult<Node> {
        let old_children = root.children.take();
        root.child_probs = None;

        self.populate(&mut root, true, rng)?;

        if let Some(old_children) = old_children {
            if let Some(new_children) = root.children.as_mut() {
                for old_child in old_children {
                    if let Some(slot) = new_children.iter_mut().find(|c| c.mv == old_child.mv) {
                        *slot = old_child;
                    }
                }
            }
        }

        Ok(root)
    }
}

/// Mixes Dirichlet(alpha) noise into the root prior: `pi' = mix * Dir(alpha)
/// + (1 - mix) * pi_theta`. A degenerate all-zero prior (e.g. every move
/// masked below machine epsilon) is left unmixed rather than dividing by
/// zero building the Dirichlet sample.
fn mix_root_noise(probs: &mut [f32], alpha: f32, mix: f32, rng: &mut impl Rng) -> CoreResult<()> {
    if probs.is_empty() {
        return Ok(());
    }

    let alphas = vec![alpha as f64; probs.len()];
    let dirichlet = Dirichlet::new(&alphas)
        .map_err(|e| CoreError::InvariantFailure(format!("invalid Dirichlet alpha: {}", e)))?;
    let noise: Vec<f64> = dirichlet.sample(rng);

    for (p, n) in probs.iter_mut().zip(noise) {
        *p = mix * (n as f32) + (1.0 - mix) * *p;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    use tak_core::new_position;
    use tak_oracle::local::{Local, PolicyValueModel};
    use tak_oracle::Oracle;

    use super::*;

    fn uniform_engine(size: usize) -> Mcts {
        struct Uniform(usize);
        impl PolicyValueModel for Uniform {
            fn evaluate(&self, _encoded_position: &[u8]) -> (Vec<f32>, f32) {
                (vec![1.0; self.0], 0.0)
            }
        }
        let oracle: Arc<dyn Oracle> = Arc::new(Local::new(Uniform(tak_encoding::max_move_id(size))));
        Mcts::new(
            oracle,
            Config { time_limit: None, simulation_limit: Some(5), ..Config::default() },
        )
    }

    #[test]
    fn simulations_counts_match_root_and_children() {
        let engine = uniform_engine(3);
        let mut rng = SmallRng::seed_from_u64(42);
        let tree = engine.analyze(new_position(3).unwrap(), &mut rng).unwrap();

        assert_eq!(tree.simulations, 5);
        // The first simulation's descent path is empty (it only expands the
        // root), so backup touches the root but no child; only the later
        // N-1 simulations reach a child.
        let total: u32 = tree.children.as_ref().unwrap().iter().map(|c| c.simulations).sum();
        assert_eq!(total, tree.simulations - 1);
    }

    #[test]
    fn backup_keeps_value_within_simulations_bound() {
        let engine = uniform_engine(3);
        let mut rng = SmallRng::seed_from_u64(7);
        let tree = engine.analyze(new_position(3).unwrap(), &mut rng).unwrap();

        assert!(tree.value.abs() <= tree.simulations as f32);
    }

    #[test]
    fn deterministic_given_fixed_oracle_and_seed() {
        let engine = uniform_engine(3);
        let p = new_position(3).unwrap();

        let mut rng_a = SmallRng::seed_from_u64(123);
        let tree_a = engine.analyze(p.clone(), &mut rng_a).unwrap();
        let mv_a = engine.select_root_move(&tree_a, &mut SmallRng::seed_from_u64(9)).unwrap();

        let mut rng_b = SmallRng::seed_from_u64(123);
        let tree_b = engine.analyze(p.clone(), &mut rng_b).unwrap();
        let mv_b = engine.select_root_move(&tree_b, &mut SmallRng::seed_from_u64(9)).unwrap();

        assert_eq!(mv_a, mv_b);
    }

    #[test]
    fn graft_root_preserves_matching_child_statistics() {
        let engine = uniform_engine(3);
        let mut rng = SmallRng::seed_from_u64(1);
        let tree = engine.analyze(new_position(3).unwrap(), &mut rng).unwrap();

        let chosen_idx = 0;
        let chosen_move = tree.children.as_ref().unwrap()[chosen_idx].mv.clone();
        let chosen = {
            let mut children = tree.children.unwrap();
            children.swap_remove(chosen_idx)
        };
        let preserved_sims = chosen.simulations;

        let grafted = engine.graft_root(chosen, &mut rng).unwrap();
        assert_eq!(grafted.mv, chosen_move);
        assert_eq!(grafted.simulations, preserved_sims);
    }
}
