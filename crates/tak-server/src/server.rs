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

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};

use tak_oracle::wire::{EvaluateRequest, EvaluateResponse};
use tak_utils::error::{CoreError, CoreResult};

use crate::backend::InferenceBackend;

/// Requests in flight get dropped on the floor during train mode rather
/// than served stale weights; the bound is where "pending, waiting for
/// serve mode" turns into backpressure on the callers.
const QUEUE_CAPACITY: usize = 80;
const BATCH_SIZE: usize = 8;
const BATCH_GRACE: Duration = Duration::from_millis(1);
const TRAIN_POLL: Duration = Duration::from_millis(1);

const MODE_SERVE: u8 = 0;
const MODE_TRAIN: u8 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Serve,
    Train,
}

struct Shared {
    mode: AtomicU8,
}

/// A cheaply-cloneable handle the trainer uses to flip the server
/// between `serve` (answer rollout workers) and `train` (pause so the
/// optimizer has the model to itself) between steps.
#[derive(Clone)]
pub struct ServerHandle {
    shared: Arc<Shared>,
}

impl ServerHandle {
    pub fn serve_mode(&self) {
        self.shared.mode.store(MODE_SERVE, Ordering::SeqCst);
    }

    pub fn train_mode(&self) {
        self.shared.mode.store(MODE_TRAIN, Ordering::SeqCst);
    }

    pub fn mode(&self) -> Mode {
        if self.shared.mode.load(Ordering::SeqCst) == MODE_TRAIN {
            Mode::Train
        } else {
            Mode::Serve
        }
    }
}

struct PendingRequest {
    encoded_position: Vec<u8>,
    respond_to: oneshot::Sender<(Vec<f32>, f32)>,
}

/// The inference server: one loopback TCP listener plus one batching
/// worker, both driven by a single-threaded tokio runtime on a dedicated
/// OS thread — single-threaded cooperative async, no `rt-multi-thread`.
pub struct InferenceServer {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl InferenceServer {
    pub fn start(addr: &str, backend: Arc<dyn InferenceBackend>) -> CoreResult<(Self, ServerHandle)> {
        let listener = std::net::TcpListener::bind(addr).map_err(CoreError::IoError)?;
        listener.set_nonblocking(true).map_err(CoreError::IoError)?;
        let local_addr = listener.local_addr().map_err(CoreError::IoError)?;

        let shared = Arc::new(Shared { mode: AtomicU8::new(MODE_SERVE) });
        let handle = ServerHandle { shared: shared.clone() };
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let join = thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to build inference server runtime");
            runtime.block_on(run(listener, shared, backend, shutdown_rx));
        });

        Ok((Self { local_addr, shutdown_tx: Some(shutdown_tx), join: Some(join) }, handle))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signals the accept loop to stop, drains in-flight connections,
    /// and joins the server's runtime thread.
    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

async fn run(
    std_listener: std::net::TcpListener,
    shared: Arc<Shared>,
    backend: Arc<dyn InferenceBackend>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let listener = TcpListener::from_std(std_listener).expect("tokio could not adopt listener socket");
    let (queue_tx, queue_rx) = mpsc::channel::<PendingRequest>(QUEUE_CAPACITY);

    let batcher = tokio::spawn(batch_worker(shared, backend, queue_rx));

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => {
                        tokio::spawn(handle_connection(stream, queue_tx.clone()));
                    }
                    Err(e) => log::warn!("inference server accept failed: {}", e),
                }
            }
            _ = &mut shutdown_rx => break,
        }
    }

    drop(queue_tx);
    let _ = batcher.await;
}

async fn handle_connection(mut stream: tokio::net::TcpStream, queue_tx: mpsc::Sender<PendingRequest>) {
    loop {
        let request = match read_request(&mut stream).await {
            Ok(r) => r,
            Err(_) => return,
        };

        let (respond_to, response_rx) = oneshot::channel();
        let pending = PendingRequest { encoded_position: request.encoded_position, respond_to };
        if queue_tx.send(pending).await.is_err() {
            return;
        }

        let Ok((move_probs, value)) = response_rx.await else { return };
        if write_response(&mut stream, &EvaluateResponse { move_probs, value }).await.is_err() {
            return;
        }
    }
}

async fn read_request(stream: &mut tokio::net::TcpStream) -> io::Result<EvaluateRequest> {
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes).await?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    bincode::deserialize(&payload).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

async fn write_response(stream: &mut tokio::net::TcpStream, response: &EvaluateResponse) -> io::Result<()> {
    let payload = bincode::serialize(response).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len()).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    stream.write_all(&len.to_le_bytes()).await?;
    stream.write_all(&payload).await?;
    stream.flush().await
}

/// Pinned to `original_source/python/tak/model/server.py`'s batching
/// loop: pop one request (blocking), then keep pulling more — either
/// immediately available or within a short grace window — until
/// [`BATCH_SIZE`] is reached or the queue goes dry, then run the whole
/// batch off the event loop in one call. While in train mode the loop
/// never drains the queue at all, so requests simply pile up (bounded by
/// [`QUEUE_CAPACITY`]) until `serve_mode` is restored.
async fn batch_worker(shared: Arc<Shared>, backend: Arc<dyn InferenceBackend>, mut queue_rx: mpsc::Receiver<PendingRequest>) {
    loop {
        if shared.mode.load(Ordering::SeqCst) == MODE_TRAIN {
            tokio::time::sleep(TRAIN_POLL).await;
            continue;
        }

        let Some(first) = queue_rx.recv().await else { return };
        let mut batch = vec![first];

        while batch.len() < BATCH_SIZE {
            match tokio::time::timeout(BATCH_GRACE, queue_rx.recv()).await {
                Ok(Some(req)) => batch.push(req),
                Ok(None) => break,
                Err(_) => break,
            }
        }

        let encoded: Vec<Vec<u8>> = batch.iter().map(|r| r.encoded_position.clone()).collect();
        let results = backend.evaluate_batch(encoded).await;

        for (req, (move_probs, value)) in batch.into_iter().zip(results) {
            let _ = req.respond_to.send((move_probs, value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ModelBackend;
    use std::sync::Mutex;
    use tak_oracle::{NullModel, TrainableModel};
    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
    use tokio::net::TcpStream;

    fn null_backend() -> Arc<dyn InferenceBackend> {
        let model: Arc<Mutex<Box<dyn TrainableModel>>> = Arc::new(Mutex::new(Box::new(NullModel::new(4))));
        Arc::new(ModelBackend::new(model))
    }

    #[test]
    fn server_answers_one_request_over_the_wire() {
        let (server, handle) = InferenceServer::start("127.0.0.1:0", null_backend()).unwrap();
        assert_eq!(handle.mode(), Mode::Serve);
        let addr = server.local_addr();

        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let response: EvaluateResponse = runtime.block_on(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            let request = EvaluateRequest { encoded_position: vec![1, 2, 3] };
            let payload = bincode::serialize(&request).unwrap();
            stream.write_all(&(payload.len() as u32).to_le_bytes()).await.unwrap();
            stream.write_all(&payload).await.unwrap();
            stream.flush().await.unwrap();

            let mut len_bytes = [0u8; 4];
            stream.read_exact(&mut len_bytes).await.unwrap();
            let len = u32::from_le_bytes(len_bytes) as usize;
            let mut buf = vec![0u8; len];
            stream.read_exact(&mut buf).await.unwrap();
            bincode::deserialize(&buf).unwrap()
        });

        assert_eq!(response.move_probs.len(), 4);
        server.shutdown();
    }

    #[test]
    fn train_mode_flag_round_trips_on_the_handle() {
        let (server, handle) = InferenceServer::start("127.0.0.1:0", null_backend()).unwrap();
        handle.train_mode();
        assert_eq!(handle.mode(), Mode::Train);
        handle.serve_mode();
        assert_eq!(handle.mode(), Mode::Serve);
        server.shutdown();
    }
}
