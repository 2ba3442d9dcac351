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

//! A reference engine over explicit branch trees. A program is a
//! finite binary path tree given as a default leaf depth plus declared
//! bug and early-exit points; the interpreter explores it under the
//! facade in `interp`. The real target of the coordinator is a full
//! symbolic interpreter, but the protocol neither knows nor cares, and
//! an explicit tree makes runs cheap and exactly reproducible.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::CoordError;
use crate::interp::{Directive, Interpreter, Monitor, RunOutcome, SearchMode};
use crate::prefix::{PathPrefix, OFFER_EMPTY_MAX};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Branch,
    Exit,
    Bug,
}

/// A branch-tree program. Every node branches both ways until the
/// default depth, except where a `bug` or `exit` declaration turns the
/// node into a leaf.
///
/// The text format is line based:
///
/// ```text
/// # full tree of depth 6, one buggy path, one early exit
/// depth 6
/// bug 010011
/// exit 00
/// ```
#[derive(Debug, Clone)]
pub struct TreeProgram {
    depth: u32,
    bugs: HashSet<Vec<u8>>,
    exits: HashSet<Vec<u8>>,
}

fn parse_outcomes(word: &str, lineno: usize) -> Result<Vec<u8>, CoordError> {
    if word.is_empty() {
        return Err(CoordError::Program(format!("line {}: empty outcome sequence", lineno)));
    }
    word.chars()
        .map(|c| match c {
            '0' => Ok(0),
            '1' => Ok(1),
            _ => Err(CoordError::Program(format!("line {}: branch outcome must be 0 or 1, got {:?}", lineno, c))),
        })
        .collect()
}

fn leads_through(shorter: &[u8], longer: &[u8]) -> bool {
    shorter.len() <= longer.len() && longer[..shorter.len()] == shorter[..]
}

impl TreeProgram {
    pub fn parse(text: &str) -> Result<Self, CoordError> {
        let mut depth = None;
        let mut bugs = HashSet::new();
        let mut exits = HashSet::new();

        for (i, raw) in text.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut words = line.split_whitespace();
            match (words.next(), words.next(), words.next()) {
                (Some("depth"), Some(word), None) => {
                    if depth.is_some() {
                        return Err(CoordError::Program(format!("line {}: duplicate depth declaration", lineno)));
                    }
                    let d: u32 = word
                        .parse()
                        .map_err(|_| CoordError::Program(format!("line {}: bad depth {:?}", lineno, word)))?;
                    if d == 0 {
                        return Err(CoordError::Program(format!("line {}: depth must be at least 1", lineno)));
                    }
                    depth = Some(d)
                }
                (Some("bug"), Some(word), None) => {
                    bugs.insert(parse_outcomes(word, lineno)?);
                }
                (Some("exit"), Some(word), None) => {
                    exits.insert(parse_outcomes(word, lineno)?);
                }
                _ => return Err(CoordError::Program(format!("line {}: expected depth, bug or exit", lineno))),
            }
        }

        let depth = depth.ok_or_else(|| CoordError::Program("missing depth declaration".to_string()))?;

        let declared: Vec<&Vec<u8>> = bugs.iter().chain(exits.iter()).collect();
        for point in &declared {
            if point.len() > depth as usize {
                return Err(CoordError::Program(format!("declared point {:?} lies beyond the tree depth", point)));
            }
        }
        // A leaf makes everything below it unreachable, so declared
        // points must be pairwise incomparable.
        for (i, a) in declared.iter().enumerate() {
            for b in &declared[i + 1..] {
                if leads_through(a, b) || leads_through(b, a) {
                    return Err(CoordError::Program(format!(
                        "declared point {:?} is shadowed by {:?}",
                        b, a
                    )));
                }
            }
        }

        Ok(TreeProgram { depth, bugs, exits })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CoordError> {
        let text = fs::read_to_string(path.as_ref())
            .map_err(|e| CoordError::Program(format!("cannot read {}: {}", path.as_ref().display(), e)))?;
        TreeProgram::parse(&text)
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    fn kind(&self, path: &[u8]) -> NodeKind {
        if self.bugs.contains(path) {
            NodeKind::Bug
        } else if self.exits.contains(path) {
            NodeKind::Exit
        } else if path.len() >= self.depth as usize {
            NodeKind::Exit
        } else {
            NodeKind::Branch
        }
    }
}

/// Single-use interpreter for one task over a [`TreeProgram`].
pub struct TreeInterpreter {
    program: Arc<TreeProgram>,
    depth: u32,
    prefix: Option<PathPrefix>,
    check_prefix: bool,
    mode: SearchMode,
    lb: bool,
}

impl TreeInterpreter {
    pub fn new(program: Arc<TreeProgram>) -> Self {
        TreeInterpreter {
            program,
            depth: 0,
            prefix: None,
            check_prefix: false,
            mode: SearchMode::Dfs,
            lb: false,
        }
    }

    fn select_next(&self, pending: &mut Vec<PathPrefix>, rng: &mut StdRng, last: &[u8]) -> Option<PathPrefix> {
        if pending.is_empty() {
            return None;
        }
        match self.mode {
            SearchMode::Dfs => pending.pop(),
            SearchMode::Bfs => Some(pending.remove(0)),
            SearchMode::Rand => {
                let i = rng.gen_range(0..pending.len());
                Some(pending.swap_remove(i))
            }
            SearchMode::CovNew => {
                // Novelty search: take the frontier node least related
                // to the path we just walked.
                let mut best = 0;
                let mut best_common = usize::MAX;
                for (i, p) in pending.iter().enumerate() {
                    let common = common_prefix_len(p.as_outcomes(), last);
                    if common < best_common {
                        best_common = common;
                        best = i;
                    }
                }
                Some(pending.remove(best))
            }
        }
    }

    /// Peel off the shallowest stealable frontier node. Nodes at or
    /// under the wire sentinel length are never offered since their
    /// encoding would read back as an empty offer.
    fn peel_victim(&self, pending: &mut Vec<PathPrefix>) -> Option<PathPrefix> {
        let mut victim = None;
        for (i, p) in pending.iter().enumerate() {
            if p.len() > OFFER_EMPTY_MAX {
                match victim {
                    Some((_, len)) if len <= p.len() => (),
                    _ => victim = Some((i, p.len())),
                }
            }
        }
        victim.map(|(i, _)| pending.remove(i))
    }

    fn sync_advert(
        &self,
        advertised: bool,
        pending: &[PathPrefix],
        monitor: &mut dyn Monitor,
    ) -> Result<bool, CoordError> {
        if !self.lb {
            return Ok(advertised);
        }
        let available = pending.iter().any(|p| p.len() > OFFER_EMPTY_MAX);
        if available && !advertised {
            monitor.victim_available()?
        } else if !available && advertised {
            monitor.victim_exhausted()?
        }
        Ok(available)
    }
}

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

fn rng_for(prefix: Option<&PathPrefix>) -> StdRng {
    // Deterministic per task so replays are reproducible.
    let seed = prefix
        .map(|p| p.as_outcomes().iter().fold(0x9e37_79b9_7f4a_7c15u64, |acc, b| acc.rotate_left(7) ^ (*b as u64 + 1)))
        .unwrap_or(0x9e37_79b9_7f4a_7c15u64);
    StdRng::seed_from_u64(seed)
}

impl Interpreter for TreeInterpreter {
    fn set_exploration_depth(&mut self, depth: u32) {
        self.depth = depth;
    }

    fn set_prefix_bounds(&mut self, lower: &PathPrefix, upper: &PathPrefix) {
        debug_assert_eq!(lower, upper, "only equal prefix bounds are supported");
        self.prefix = Some(lower.clone());
    }

    fn enable_prefix_checking(&mut self) {
        self.check_prefix = true;
    }

    fn set_search_mode(&mut self, mode: SearchMode) {
        self.mode = mode;
    }

    fn enable_load_balancing(&mut self, enabled: bool) {
        self.lb = enabled;
    }

    fn run_as_main(
        &mut self,
        monitor: &mut dyn Monitor,
        mut frontier_out: Option<&mut Vec<PathPrefix>>,
    ) -> Result<RunOutcome, CoordError> {
        let mut rng = rng_for(self.prefix.as_ref());

        // Replay the assigned prefix deterministically. Each replayed
        // outcome is one step, so kill requests are honoured here too.
        let root = if self.check_prefix {
            let prefix = self
                .prefix
                .clone()
                .ok_or_else(|| CoordError::Protocol("prefix checking enabled without prefix bounds".to_string()))?;
            for consumed in 0..prefix.len() {
                match monitor.poll()? {
                    Directive::Kill => return Ok(RunOutcome::Killed),
                    Directive::Offload => monitor.offload_reply(None)?,
                    Directive::Continue => (),
                }
                match self.program.kind(&prefix.as_outcomes()[..consumed]) {
                    NodeKind::Branch => (),
                    // The prefix runs into a leaf before it is fully
                    // consumed: nothing lives below it.
                    NodeKind::Exit => return Ok(RunOutcome::Complete),
                    NodeKind::Bug => return Ok(RunOutcome::Bug),
                }
            }
            prefix
        } else {
            PathPrefix::empty()
        };

        let cap = if self.depth == 0 { None } else { Some(root.len() + self.depth as usize) };

        let mut pending = vec![root.clone()];
        let mut advertised = false;
        let mut last = root.as_outcomes().to_vec();

        loop {
            match monitor.poll()? {
                Directive::Kill => return Ok(RunOutcome::Killed),
                Directive::Offload => {
                    let victim = self.peel_victim(&mut pending);
                    monitor.offload_reply(victim)?;
                    advertised = self.sync_advert(advertised, &pending, monitor)?;
                }
                Directive::Continue => (),
            }

            let node = match self.select_next(&mut pending, &mut rng, &last) {
                Some(node) => node,
                None => break,
            };
            last = node.as_outcomes().to_vec();

            match self.program.kind(node.as_outcomes()) {
                NodeKind::Bug => return Ok(RunOutcome::Bug),
                NodeKind::Exit => {
                    if let Some(out) = frontier_out.as_mut() {
                        out.push(node)
                    }
                }
                NodeKind::Branch => {
                    if cap == Some(node.len()) {
                        // Cut by the depth bound: this node is the
                        // frontier the run hands back.
                        if let Some(out) = frontier_out.as_mut() {
                            out.push(node)
                        }
                    } else if self.mode == SearchMode::Dfs {
                        pending.push(node.child(1));
                        pending.push(node.child(0));
                    } else {
                        pending.push(node.child(0));
                        pending.push(node.child(1));
                    }
                }
            }

            advertised = self.sync_advert(advertised, &pending, monitor)?;
        }

        Ok(RunOutcome::Complete)
    }
}
