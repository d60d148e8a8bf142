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

//! The Oracle RPC wire contract: a length-prefixed `bincode` request
//! followed by a length-prefixed `bincode` response, exchanged over a
//! single persistent loopback TCP connection per worker.

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvaluateRequest {
    pub encoded_position: Vec<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvaluateResponse {
    pub move_probs: Vec<f32>,
    pub value: f32,
}

fn bincode_error(e: bincode::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

pub fn write_frame<W: Write, T: Serialize>(w: &mut W, value: &T) -> io::Result<()> {
    let payload = bincode::serialize(value).map_err(bincode_error)?;
    let len = u32::try_from(payload.len())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    w.write_all(&len.to_le_bytes())?;
    w.write_all(&payload)?;
    w.flush()
}

pub fn read_frame<R: Read, T: for<'de> Deserialize<'de>>(r: &mut R) -> io::Result<T> {
    let mut len_bytes = [0u8; 4];
    r.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload)?;
    bincode::deserialize(&payload).map_err(bincode_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_through_a_frame() {
        let req = EvaluateRequest { encoded_position: vec![9, 1, 2, 3] };
        let mut buf = Vec::new();
        write_frame(&mut buf, &req).unwrap();

        let mut cursor = &buf[..];
        let got: EvaluateRequest = read_frame(&mut cursor).unwrap();
        assert_eq!(got.encoded_position, req.encoded_position);
    }
}
