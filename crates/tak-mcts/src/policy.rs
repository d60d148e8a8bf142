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

use tak_utils::error::CoreError;

const ALPHA_EPSILON: f32 = 1e-3;
const BRACKET_EPSILON: f32 = 1e-6;
const MAX_ITERS: u32 = 32;

/// Solves for the regularizing temperature `alpha` and returns the
/// resulting policy `pi_alpha`, by bisection between the bracket
/// `[alpha_min, alpha_max]`. Pinned to the canonical reference's
/// `solve_policy`: same bracket initialization, same convergence
/// criteria, same iteration cap.
pub fn solve_policy(pi_theta: &[f32], q: &[f32], lambda_n: f32) -> Result<Vec<f32>, CoreError> {
    debug_assert_eq!(pi_theta.len(), q.len());

    let alpha_min_init = pi_theta
        .iter()
        .zip(q)
        .map(|(&pi, &qi)| qi + lambda_n * pi)
        .fold(f32::NEG_INFINITY, f32::max);
    let alpha_max_init = q.iter().map(|&qi| qi + lambda_n).fold(f32::NEG_INFINITY, f32::max);

    let mut alpha_min = alpha_min_init;
    let mut alpha_max = alpha_max_init;
    let mut alpha = (alpha_max + alpha_min) / 2.0;

    let mut pi_alpha = vec![0.0; pi_theta.len()];

    for _ in 0..MAX_ITERS {
        for i in 0..pi_theta.len() {
            pi_alpha[i] = lambda_n * pi_theta[i] / (alpha - q[i]);
        }
        let sigma: f32 = pi_alpha.iter().sum();

        if (1.0 - sigma).abs() <= ALPHA_EPSILON || (alpha_max - alpha_min) <= BRACKET_EPSILON {
            return Ok(pi_alpha);
        }

        if sigma > 1.0 {
            alpha_min = alpha;
            alpha = (alpha + alpha_max) / 2.0;
        } else {
            alpha_max = alpha;
            alpha = (alpha + alpha_min) / 2.0;
        }
    }

    Err(CoreError::InvariantFailure("solve_policy: bisection for alpha did not converge".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converges_on_uniform_prior_and_zero_value() {
        let pi_theta = vec![0.25; 4];
        let q = vec![0.0; 4];
        let pi_alpha = solve_policy(&pi_theta, &q, 1.0).unwrap();

        let sum: f32 = pi_alpha.iter().sum();
        assert!((sum - 1.0).abs() <= 1e-2);
        for p in pi_alpha {
            assert!((p - 0.25).abs() < 1e-2);
        }
    }

    #[test]
    fn concentrates_mass_on_the_highest_value_child() {
        let pi_theta = vec![0.5, 0.5];
        let q = vec![1.0, -1.0];
        let pi_alpha = solve_policy(&pi_theta, &q, 0.5).unwrap();

        assert!(pi_alpha[0] > pi_alpha[1]);
        let sum: f32 = pi_alpha.iter().sum();
        assert!((sum - 1.0).abs() <= 1e-2);
    }
}
