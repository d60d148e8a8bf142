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

use std::sync::{Arc, Mutex};

use tak_oracle::{softmax, TrainableModel};

/// How the batching loop actually runs a batch of encoded positions
/// through the model. Pulled out as a trait so tests can swap in an
/// immediately-resolving backend and exercise the queueing/batching
/// logic without a real thread pool.
#[async_trait::async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn evaluate_batch(&self, encoded: Vec<Vec<u8>>) -> Vec<(Vec<f32>, f32)>;
}

/// The real backend: holds the shared, mutably-swappable model behind a
/// blocking mutex and runs the forward pass on `spawn_blocking` so the
/// single-threaded event loop never stalls on it.
pub struct ModelBackend {
    model: Arc<Mutex<Box<dyn TrainableModel>>>,
}

impl ModelBackend {
    pub fn new(model: Arc<Mutex<Box<dyn TrainableModel>>>) -> Self {
        Self { model }
    }
}

#[async_trait::async_trait]
impl InferenceBackend for ModelBackend {
    async fn evaluate_batch(&self, encoded: Vec<Vec<u8>>) -> Vec<(Vec<f32>, f32)> {
        let model = self.model.clone();
        tokio::task::spawn_blocking(move || {
            let guard = model.lock().expect("model mutex poisoned");
            let mut results = guard.evaluate_batch(&encoded);
            for (probs, _value) in results.iter_mut() {
                softmax(probs);
            }
            results
        })
        .await
        .expect("inference task panicked")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tak_oracle::NullModel;

    #[tokio::test]
    async fn model_backend_softmaxes_the_raw_model_output() {
        let model: Arc<Mutex<Box<dyn TrainableModel>>> = Arc::new(Mutex::new(Box::new(NullModel::new(4))));
        let backend = ModelBackend::new(model);

        let results = backend.evaluate_batch(vec![vec![0, 1, 2]]).await;
        assert_eq!(results.len(), 1);
        let sum: f32 = results[0].0.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }
}
