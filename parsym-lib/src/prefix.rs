// BSD 2-Clause License
//
// Copyright (c) 2020 Alasdair Armstrong
//
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions are
// met:
//
// 1. Redistributions of source code must retain the above copyright
// notice, this list of conditions and the following disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright
// notice, this list of conditions and the following disclaimer in the
// documentation and/or other materials provided with the distribution.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS
// "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT
// LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR
// A PARTICULAR PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT
// HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT
// LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE,
// DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY
// THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT
// (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE
// OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! Path prefixes identify nodes in the symbolic path tree as the
//! sequence of branch outcomes taken from the entry point. They are
//! also the wire representation of work: a prefix task carries the
//! prefix bytes verbatim, and a stolen subtree travels as the prefix of
//! its root.

use std::fmt;

use crate::error::CoordError;
use crate::interp::{Interpreter, NullMonitor, RunOutcome, SearchMode};

/// Offload responses at most this long denote "nothing to steal". The
/// length sentinel is fragile (a genuine four-outcome prefix cannot be
/// offered) and is kept only because it is the established wire format;
/// a dedicated OffloadEmpty tag would be the fix.
pub const OFFER_EMPTY_MAX: usize = 4;

const OFFER_EMPTY_BYTE: u8 = b'x';

/// An ordered sequence of branch outcomes, one byte per symbolic
/// branch, each 0 or 1. Two prefixes compare only by equality of the
/// full sequence.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct PathPrefix {
    outcomes: Vec<u8>,
}

impl PathPrefix {
    pub fn empty() -> Self {
        PathPrefix { outcomes: Vec::new() }
    }

    pub fn from_outcomes(outcomes: &[u8]) -> Result<Self, CoordError> {
        for (i, b) in outcomes.iter().enumerate() {
            if *b > 1 {
                return Err(CoordError::BadPrefix(format!("outcome {} at position {} is not a branch side", b, i)));
            }
        }
        Ok(PathPrefix { outcomes: outcomes.to_vec() })
    }

    /// Decode a prefix from a task payload.
    pub fn decode(payload: &[u8]) -> Result<Self, CoordError> {
        PathPrefix::from_outcomes(payload)
    }

    /// The task payload is the outcome bytes themselves.
    pub fn encode(&self) -> Vec<u8> {
        self.outcomes.clone()
    }

    pub fn as_outcomes(&self) -> &[u8] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// The prefix extended by one branch outcome.
    pub fn child(&self, outcome: u8) -> Self {
        debug_assert!(outcome <= 1);
        let mut outcomes = Vec::with_capacity(self.outcomes.len() + 1);
        outcomes.extend_from_slice(&self.outcomes);
        outcomes.push(outcome);
        PathPrefix { outcomes }
    }

    pub fn is_prefix_of(&self, other: &PathPrefix) -> bool {
        other.outcomes.len() >= self.outcomes.len() && other.outcomes[..self.outcomes.len()] == self.outcomes[..]
    }
}

impl fmt::Display for PathPrefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for b in &self.outcomes {
            write!(f, "{}", b)?
        }
        Ok(())
    }
}

impl fmt::Debug for PathPrefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PathPrefix({})", self)
    }
}

/// Encode an offload offer. A real offer is the victim's prefix bytes,
/// an empty offer is a single sentinel byte.
pub fn encode_offer(offer: Option<&PathPrefix>) -> Vec<u8> {
    match offer {
        Some(prefix) => prefix.encode(),
        None => vec![OFFER_EMPTY_BYTE],
    }
}

/// Decode an offload response payload. Anything short enough to fall
/// under the sentinel threshold is an empty offer.
pub fn decode_offer(payload: &[u8]) -> Result<Option<PathPrefix>, CoordError> {
    if payload.len() <= OFFER_EMPTY_MAX {
        Ok(None)
    } else {
        PathPrefix::decode(payload).map(Some)
    }
}

/// Run the prefix-generation phase: a depth-limited depth-first
/// enumeration of the path tree down to `depth`. The returned list is
/// in deterministic depth-first order, the prefixes are pairwise
/// incomparable and cover the tree frontier. A bug reached within the
/// first `depth` levels ends the enumeration and is reported through
/// the outcome.
pub fn enumerate_frontier<I: Interpreter>(
    interp: &mut I,
    depth: u32,
) -> Result<(Vec<PathPrefix>, RunOutcome), CoordError> {
    interp.set_search_mode(SearchMode::Dfs);
    interp.set_exploration_depth(depth);
    let mut frontier = Vec::new();
    let outcome = interp.run_as_main(&mut NullMonitor, Some(&mut frontier))?;
    Ok((frontier, outcome))
}
