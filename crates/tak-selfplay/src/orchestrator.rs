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

//! The multiprocess self-play orchestrator: spawns one OS process per
//! worker, shuttles game ids down and transcripts up over each child's
//! stdio, and exposes `play_many`/`stop` to the trainer.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use tak_utils::error::{CoreError, CoreResult};

use crate::transcript::Transcript;
use crate::worker::WorkerCmd;

/// Parameters the orchestrator needs beyond the per-worker
/// [`crate::worker::WorkerSpec`]: how many worker processes to run and
/// what command spawns one — realized here as "re-exec this binary with
/// a hidden subcommand".
#[derive(Clone, Debug)]
pub struct SelfPlayConfig {
    pub workers: usize,
    pub worker_exe: std::path::PathBuf,
    pub worker_args: Vec<String>,
    pub worker_spec_json: String,
}

struct WorkerHandle {
    child: Child,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

/// Owns the `cmd`/`games` queues and the worker processes: the parent
/// enqueues monotonically-increasing game ids (or the `None` shutdown
/// sentinel) on `cmd`, each worker's forwarding thread
/// relays them down that worker's stdin, plays one game per command, and
/// relays the resulting transcript back up through `games`.
pub struct MultiprocessSelfPlayEngine {
    cmd_tx: Sender<WorkerCmd>,
    games_rx: Receiver<Transcript>,
    shutdown: Arc<AtomicBool>,
    workers: Vec<WorkerHandle>,
}

impl MultiprocessSelfPlayEngine {
    pub fn start(config: &SelfPlayConfig) -> CoreResult<Self> {
        let (cmd_tx, cmd_rx) = bounded::<WorkerCmd>(2 * config.workers);
        let (games_tx, games_rx) = bounded::<Transcript>(config.workers);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(config.workers);
        for id in 0..config.workers {
            workers.push(spawn_worker(config, id, cmd_rx.clone(), games_tx.clone())?);
        }

        Ok(Self { cmd_tx, games_rx, shutdown, workers })
    }

    /// Plays `n_games` games across the worker pool and returns their
    /// transcripts. Pushes ids while the `cmd` queue has room, then
    /// blocks on the `games` queue with a 1s timeout; on timeout it
    /// polls child exit codes and fails the whole call if any worker
    /// has died. On any error, all children are killed (not joined) and
    /// the error is propagated.
    pub fn play_many(&mut self, n_games: usize) -> CoreResult<Vec<Transcript>> {
        match self.play_many_inner(n_games) {
            Ok(results) => Ok(results),
            Err(err) => {
                self.kill_all();
                Err(err)
            }
        }
    }

    fn play_many_inner(&mut self, n_games: usize) -> CoreResult<Vec<Transcript>> {
        let mut next_id = 0u64;
        let mut results = Vec::with_capacity(n_games);

        loop {
            while next_id < n_games as u64 {
                match self.cmd_tx.try_send(Some(next_id)) {
                    Ok(()) => next_id += 1,
                    Err(TrySendError::Full(_)) => break,
                    Err(TrySendError::Disconnected(_)) => {
                        return Err(CoreError::InvariantFailure("self-play cmd queue closed".into()))
                    }
                }
            }

            if results.len() >= n_games {
                return Ok(results);
            }

            match self.games_rx.recv_timeout(Duration::from_secs(1)) {
                Ok(transcript) => results.push(transcript),
                Err(RecvTimeoutError::Timeout) => self.check_worker_health()?,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(CoreError::InvariantFailure("self-play games queue closed".into()))
                }
            }
        }
    }

    fn check_worker_health(&mut self) -> CoreResult<()> {
        for (i, worker) in self.workers.iter_mut().enumerate() {
            if let Ok(Some(status)) = worker.child.try_wait() {
                if !status.success() {
                    return Err(CoreError::WorkerCrash { worker: i, code: status.code() });
                }
            }
        }
        Ok(())
    }

    fn kill_all(&mut self) {
        for worker in &mut self.workers {
            let _ = worker.child.kill();
        }
    }

    /// Pushes one shutdown sentinel per worker, signals `shutdown`, and
    /// joins every child process and its forwarding threads.
    pub fn stop(mut self) {
        for _ in 0..self.workers.len() {
            let _ = self.cmd_tx.send(None);
        }
        self.shutdown.store(true, Ordering::Release);

        for mut worker in self.workers.drain(..) {
            let _ = worker.child.wait();
            let _ = worker.writer.join();
            let _ = worker.reader.join();
        }
    }
}

fn spawn_worker(
    config: &SelfPlayConfig,
    id: usize,
    cmd_rx: Receiver<WorkerCmd>,
    games_tx: Sender<Transcript>,
) -> CoreResult<WorkerHandle> {
    let mut command = Command::new(&config.worker_exe);
    command
        .args(&config.worker_args)
        .arg(&config.worker_spec_json)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());

    let mut child = command
        .spawn()
        .map_err(|e| CoreError::InvariantFailure(format!("could not spawn self-play worker {}: {}", id, e)))?;

    let mut stdin = child.stdin.take().expect("piped stdin");
    let stdout = child.stdout.take().expect("piped stdout");

    let writer = thread::spawn(move || {
        for cmd in cmd_rx.iter() {
            let line = serde_json::to_string(&cmd).unwrap_or_else(|_| "null".to_string());
            if stdin.write_all(line.as_bytes()).is_err() {
                break;
            }
            if stdin.write_all(b"\n").is_err() {
                break;
            }
            if stdin.flush().is_err() {
                break;
            }
            if cmd.is_none() {
                break;
            }
        }
    });

    let reader = thread::spawn(move || {
        let mut lines = BufReader::new(stdout).lines();
        while let Some(Ok(line)) = lines.next() {
            if let Ok(transcript) = serde_json::from_str::<Transcript>(&line) {
                if games_tx.send(transcript).is_err() {
                    break;
                }
            }
        }
    });

    Ok(WorkerHandle { child, writer, reader })
}
