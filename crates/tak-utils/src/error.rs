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

use std::fmt;

/// The reason a [`CoreError::IllegalMove`] was rejected, kept separate from
/// the error itself so that callers (e.g. MCTS expansion) can match on it
/// without string comparisons.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IllegalMoveKind {
    /// A placement used a kind other than FLAT on ply 0 or 1.
    IllegalOpening,
    /// A placement targeted a non-empty square.
    OccupiedSquare,
    /// The chosen reserve (flats or capstones) is already empty.
    InsufficientReserves,
    /// A slide stepped off the edge of the board.
    OutOfBounds,
    /// A slide attempted to land on top of a capstone.
    OntoCapstone,
    /// A slide attempted to land on a standing stone without a lone
    /// capstone carry.
    OntoStanding,
    /// A slide's drop counts were empty, non-positive, or summed to more
    /// than the board size or the stack height.
    BadPickup,
    /// A slide tried to move a stack whose top piece isn't the mover's.
    NotMoversStack,
}

impl fmt::Display for IllegalMoveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            IllegalMoveKind::IllegalOpening => "illegal opening move",
            IllegalMoveKind::OccupiedSquare => "square is occupied",
            IllegalMoveKind::InsufficientReserves => "not enough reserves",
            IllegalMoveKind::OutOfBounds => "slide out of bounds",
            IllegalMoveKind::OntoCapstone => "slide onto a capstone",
            IllegalMoveKind::OntoStanding => "slide onto a standing stone",
            IllegalMoveKind::BadPickup => "invalid pickup count",
            IllegalMoveKind::NotMoversStack => "can't move opponent's stack",
        };
        write!(f, "{}", msg)
    }
}

/// Error kinds shared across the workspace, per the error handling design
/// in the specification: `IllegalMove` and `InvariantFailure` are
/// recoverable in some contexts (MCTS expansion silently drops illegal
/// candidates) and hard errors in others (CLI game playback).
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("illegal move: {0}")]
    IllegalMove(IllegalMoveKind),

    #[error("oracle unavailable: {0}")]
    OracleUnavailable(#[from] std::io::Error),

    #[error("worker {worker} crashed (exit code {code:?})")]
    WorkerCrash { worker: usize, code: Option<i32> },

    #[error("invariant failure: {0}")]
    InvariantFailure(String),

    #[error("invalid configuration: {0}")]
    ConfigError(String),

    /// Disk I/O outside the Oracle RPC path (snapshot read/write, run-dir
    /// setup). Kept distinct from [`CoreError::OracleUnavailable`] per the
    /// error handling design: a snapshot write failure is logged and the
    /// step continues, whereas an RPC failure fails the worker.
    #[error("i/o error: {0}")]
    IoError(std::io::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
