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

//! The seam between the coordinator and the symbolic interpreter. The
//! coordinator never looks inside an engine; it configures one through
//! this trait, hands it a monitor, and reads back the run outcome. The
//! monitor is an explicit handle owned by the caller's frame, not
//! ambient process state, so every task gets a fresh interpreter wired
//! to exactly one endpoint.

use crate::error::CoordError;
use crate::prefix::PathPrefix;

/// Search policy for exploration below the prefix. Phase 1 always
/// enumerates depth first regardless of this setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Dfs,
    Bfs,
    Rand,
    CovNew,
}

impl SearchMode {
    /// Policy names as they appear in configuration. Anything
    /// unrecognised falls back to depth first.
    pub fn from_name(name: &str) -> Self {
        match name {
            "BFS" => SearchMode::Bfs,
            "RAND" => SearchMode::Rand,
            "COVNEW" => SearchMode::CovNew,
            _ => SearchMode::Dfs,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SearchMode::Dfs => "DFS",
            SearchMode::Bfs => "BFS",
            SearchMode::Rand => "RAND",
            SearchMode::CovNew => "COVNEW",
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The interpreter ran out of paths within its depth bound.
    Complete,
    /// A defect in the program under test was reached.
    Bug,
    /// A kill request stopped the run at a step boundary.
    Killed,
}

/// What the monitor wants the interpreter to do next. Polled at every
/// step boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Continue,
    /// Peel off an unexplored frontier node and answer through
    /// `Monitor::offload_reply`.
    Offload,
    /// Stop at this step boundary.
    Kill,
}

/// Callbacks from a running interpreter. The poll side carries kill and
/// steal requests in; the remaining methods carry frontier opinions and
/// steal answers out.
pub trait Monitor {
    fn poll(&mut self) -> Result<Directive, CoordError>;

    /// The frontier now holds at least one stealable node.
    fn victim_available(&mut self) -> Result<(), CoordError>;

    /// The frontier no longer holds any stealable node.
    fn victim_exhausted(&mut self) -> Result<(), CoordError>;

    /// The answer to an `Offload` directive. `None` means nothing could
    /// be peeled off.
    fn offload_reply(&mut self, victim: Option<PathPrefix>) -> Result<(), CoordError>;
}

/// Monitor for runs with nobody to report to, such as the master's
/// prefix-generation phase.
pub struct NullMonitor;

impl Monitor for NullMonitor {
    fn poll(&mut self) -> Result<Directive, CoordError> {
        Ok(Directive::Continue)
    }

    fn victim_available(&mut self) -> Result<(), CoordError> {
        Ok(())
    }

    fn victim_exhausted(&mut self) -> Result<(), CoordError> {
        Ok(())
    }

    fn offload_reply(&mut self, _victim: Option<PathPrefix>) -> Result<(), CoordError> {
        Ok(())
    }
}

/// The interpreter facade. Configuration calls must happen before
/// `run_as_main`; the engine is single use and a fresh instance is
/// created per task.
pub trait Interpreter {
    /// Depth bound for exploration, measured below the prefix root.
    /// Zero means unbounded.
    fn set_exploration_depth(&mut self, depth: u32);

    /// Pin the early portion of exploration to a branch-outcome
    /// sequence. Only equal bounds are supported.
    fn set_prefix_bounds(&mut self, lower: &PathPrefix, upper: &PathPrefix);

    /// Make the run consume the configured prefix deterministically
    /// before exploring freely.
    fn enable_prefix_checking(&mut self);

    fn set_search_mode(&mut self, mode: SearchMode);

    /// Wire the engine to raise frontier opinions and honour offload
    /// directives.
    fn enable_load_balancing(&mut self, enabled: bool);

    /// Execute. When a frontier record is requested, paths cut by the
    /// depth bound and paths that terminate naturally are recorded in
    /// exploration order; the prefix-generation phase consumes that
    /// list, workers pass `None`.
    fn run_as_main(
        &mut self,
        monitor: &mut dyn Monitor,
        frontier_out: Option<&mut Vec<PathPrefix>>,
    ) -> Result<RunOutcome, CoordError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_policy_names_fall_back_to_dfs() {
        assert_eq!(SearchMode::from_name("DFS"), SearchMode::Dfs);
        assert_eq!(SearchMode::from_name("BFS"), SearchMode::Bfs);
        assert_eq!(SearchMode::from_name("RAND"), SearchMode::Rand);
        assert_eq!(SearchMode::from_name("COVNEW"), SearchMode::CovNew);
        assert_eq!(SearchMode::from_name("bfs"), SearchMode::Dfs);
        assert_eq!(SearchMode::from_name(""), SearchMode::Dfs);
        assert_eq!(SearchMode::from_name("NONSENSE"), SearchMode::Dfs);
    }
}
