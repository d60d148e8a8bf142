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

use tak_core::{Move, Position};
use tak_utils::error::CoreError;

use crate::policy::solve_policy;

/// One node of the search tree. `children`/`child_probs` are `None`
/// until the node has been populated by the Oracle; a populated node
/// with an empty `children` vector is a terminal position.
#[derive(Debug)]
pub struct Node {
    pub position: Position,
    pub mv: Option<Move>,

    pub v_zero: f32,
    pub value: f32,
    pub simulations: u32,

    pub child_probs: Option<Vec<f32>>,
    pub children: Option<Vec<Node>>,
}

impl Node {
    pub fn root(position: Position) -> Self {
        Self {
            position,
            mv: None,
            v_zero: 0.0,
            value: 0.0,
            simulations: 0,
            child_probs: None,
            children: None,
        }
    }

    pub fn child(position: Position, mv: Move) -> Self {
        Self {
            position,
            mv: Some(mv),
            v_zero: 0.0,
            value: 0.0,
            simulations: 0,
            child_probs: None,
            children: None,
        }
    }

    pub fn is_expanded(&self) -> bool {
        self.children.is_some()
    }

    /// The regularized policy over this node's children: the raw prior
    /// `child_probs` before the node has been visited, else the
    /// bisection-solved `pi_alpha` mixing empirical value with the prior.
    pub fn policy_probs(&self, c: f32) -> Result<Vec<f32>, CoreError> {
        let pi_theta = self
            .child_probs
            .as_ref()
            .ok_or_else(|| CoreError::InvariantFailure("policy_probs on an unpopulated node".into()))?;

        if self.simulations == 0 {
            return Ok(pi_theta.clone());
        }

        let children = self
            .children
            .as_ref()
            .ok_or_else(|| CoreError::InvariantFailure("policy_probs on an unpopulated node".into()))?;

        let q: Vec<f32> = children
            .iter()
            .map(|child| {
                if child.simulations > 0 {
                    -child.value / child.simulations as f32
                } else {
                    self.v_zero
                }
            })
            .collect();

        let lambda_n = c * (self.simulations as f32).sqrt() / (self.simulations as f32 + children.len() as f32);

        solve_policy(pi_theta, &q, lambda_n)
    }
}
