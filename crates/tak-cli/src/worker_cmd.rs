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

use std::io::{BufReader, Write};

use tak_selfplay::{run_worker_loop, WorkerSpec};

/// The hidden `selfplay-worker` subcommand body: decode the
/// [`WorkerSpec`] the orchestrator passed on the command line, then speak
/// the newline-delimited JSON command/transcript protocol over stdio
/// until the shutdown sentinel arrives (design note §9).
pub fn run(spec_json: &str) -> anyhow::Result<()> {
    let spec: WorkerSpec = serde_json::from_str(spec_json)?;

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    run_worker_loop(&spec, BufReader::new(stdin.lock()), stdout.lock())?;
    stdout.lock().flush()?;
    Ok(())
}
