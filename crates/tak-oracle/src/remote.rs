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

use std::net::TcpStream;
use std::sync::Mutex;
use std::time::Duration;

use tak_core::Position;
use tak_utils::error::CoreResult;

use crate::wire::{read_frame, write_frame, EvaluateRequest, EvaluateResponse};
use crate::{Evaluation, Oracle};

/// spec.md §7: an `OracleUnavailable` RPC transport failure is retried
/// once, after a fixed backoff, before it's allowed to fail the worker.
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// A blocking client for the inference server's Oracle RPC. One TCP
/// connection is opened at construction and reused for every call —
/// this is the only networked dependency a self-play worker process
/// has.
pub struct Remote {
    stream: Mutex<TcpStream>,
}

impl Remote {
    pub fn connect(host: &str, port: u16) -> CoreResult<Self> {
        let stream = TcpStream::connect((host, port))?;
        stream.set_nodelay(true)?;
        Ok(Self { stream: Mutex::new(stream) })
    }

    fn call(&self, request: &EvaluateRequest) -> CoreResult<EvaluateResponse> {
        let mut stream = self.stream.lock().expect("oracle connection mutex poisoned");
        write_frame(&mut *stream, request)?;
        read_frame(&mut *stream)
    }
}

impl Oracle for Remote {
    fn evaluate(&self, pos: &Position) -> CoreResult<Evaluation> {
        let encoded_position = tak_encoding::encode(pos);
        let request = EvaluateRequest { encoded_position };

        let response = match self.call(&request) {
            Ok(response) => response,
            Err(_) => {
                std::thread::sleep(RETRY_BACKOFF);
                self.call(&request)?
            }
        };

        Ok(Evaluation { move_probs: response.move_probs, value: response.value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    use tak_core::new_position;

    #[test]
    fn evaluate_retries_once_over_the_same_connection_then_succeeds() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();

            // First request: read it, then answer with a frame whose
            // payload isn't valid bincode, so `read_frame` fails with an
            // `InvalidData` error but the connection stays open.
            let _: EvaluateRequest = read_frame(&mut conn).unwrap();
            let garbage = [0xffu8; 4];
            conn.write_all(&(garbage.len() as u32).to_le_bytes()).unwrap();
            conn.write_all(&garbage).unwrap();
            conn.flush().unwrap();

            // Retry, over the same connection: answer normally.
            let _: EvaluateRequest = read_frame(&mut conn).unwrap();
            let response = EvaluateResponse { move_probs: vec![0.5, 0.5], value: 0.1 };
            write_frame(&mut conn, &response).unwrap();
        });

        let client = Remote::connect("127.0.0.1", addr.port()).unwrap();
        let evaluation = client.evaluate(&new_position(3).unwrap()).unwrap();
        assert_eq!(evaluation.move_probs, vec![0.5, 0.5]);
        assert_eq!(evaluation.value, 0.1);

        server.join().unwrap();
    }

    #[test]
    fn evaluate_fails_after_the_retry_is_also_unsuccessful() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            // Drop the connection as soon as a request arrives, twice:
            // both the first attempt and the single retry see a
            // transport failure, so `evaluate` must return an error
            // rather than retrying forever.
            let mut buf = [0u8; 4];
            let _ = conn.read(&mut buf);
        });

        let client = Remote::connect("127.0.0.1", addr.port()).unwrap();
        assert!(client.evaluate(&new_position(3).unwrap()).is_err());

        server.join().unwrap();
    }
}
