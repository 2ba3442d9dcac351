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

//! The worker execution cycle: a single-threaded probe/dispatch loop
//! that replays assigned prefixes through a fresh interpreter per task
//! and answers steal requests from the frontier. The interpreter talks
//! back through a monitor that owns this rank's endpoint for the
//! duration of the task.

use crate::config::JobConfig;
use crate::error::CoordError;
use crate::interp::{Directive, Interpreter, Monitor, RunOutcome};
use crate::log;
use crate::log_from;
use crate::prefix::{encode_offer, PathPrefix};
use crate::protocol::Tag;
use crate::transport::{Endpoint, MASTER};

/// Forwards directives and frontier opinions between the running
/// interpreter and the master.
struct WorkerMonitor<'a> {
    ep: &'a Endpoint,
}

impl<'a> Monitor for WorkerMonitor<'a> {
    fn poll(&mut self) -> Result<Directive, CoordError> {
        match self.ep.try_recv()? {
            None => Ok(Directive::Continue),
            Some(msg) => match msg.tag {
                Tag::Kill => Ok(Directive::Kill),
                Tag::Offload => Ok(Directive::Offload),
                tag => panic!("worker {} received {:?} while exploring", self.ep.rank(), tag),
            },
        }
    }

    fn victim_available(&mut self) -> Result<(), CoordError> {
        log_from!(self.ep.rank(), log::STEAL, "frontier has a stealable node");
        self.ep.send_control(MASTER, Tag::ReadyToOffload)
    }

    fn victim_exhausted(&mut self) -> Result<(), CoordError> {
        log_from!(self.ep.rank(), log::STEAL, "frontier has no stealable node");
        self.ep.send_control(MASTER, Tag::NotReadyToOffload)
    }

    fn offload_reply(&mut self, victim: Option<PathPrefix>) -> Result<(), CoordError> {
        if let Some(victim) = &victim {
            log_from!(self.ep.rank(), log::STEAL, &format!("offloading subtree at {}", victim));
        }
        self.ep.send(MASTER, Tag::OffloadResp, encode_offer(victim.as_ref()))
    }
}

fn run_task<I, F>(
    ep: &Endpoint,
    config: &JobConfig,
    factory: &F,
    prefix: Option<PathPrefix>,
) -> Result<RunOutcome, CoordError>
where
    I: Interpreter,
    F: Fn() -> I,
{
    let mut interp = factory();
    interp.set_search_mode(config.search_policy);
    interp.set_exploration_depth(config.phase2_depth);
    interp.enable_load_balancing(config.lb);
    if let Some(p) = &prefix {
        interp.set_prefix_bounds(p, p);
        interp.enable_prefix_checking();
    }
    let mut monitor = WorkerMonitor { ep };
    // Workers have no use for the frontier record.
    interp.run_as_main(&mut monitor, None)
}

/// Run the worker loop until a kill request arrives.
pub fn run_worker<I, F>(ep: &Endpoint, config: &JobConfig, factory: &F) -> Result<(), CoordError>
where
    I: Interpreter,
    F: Fn() -> I,
{
    let rank = ep.rank();
    loop {
        let msg = ep.recv()?;
        let outcome = match msg.tag {
            Tag::Kill => {
                // The master may already be tearing the job down and
                // not listening any more.
                let _ = ep.send_control(MASTER, Tag::KillComplete);
                log_from!(rank, log::VERBOSE, "killed");
                return Ok(());
            }
            Tag::StartPrefixTask => {
                let prefix = PathPrefix::decode(&msg.payload)?;
                log_from!(rank, log::PROTO, &format!("prefix task, length {}", prefix.len()));
                run_task(ep, config, factory, Some(prefix))?
            }
            Tag::NormalTask => {
                log_from!(rank, log::PROTO, "normal task");
                run_task(ep, config, factory, None)?
            }
            Tag::Offload => {
                // Idle, so there is no frontier to peel from.
                ep.send(MASTER, Tag::OffloadResp, encode_offer(None))?;
                continue;
            }
            tag => panic!("worker {} received an illegal tag {:?}", rank, tag),
        };
        match outcome {
            RunOutcome::Complete => {
                log_from!(rank, log::PROTO, "finished");
                ep.send_control(MASTER, Tag::Finish)?
            }
            RunOutcome::Bug => {
                log_from!(rank, log::PROTO, "bug found");
                ep.send_control(MASTER, Tag::BugFound)?
            }
            RunOutcome::Killed => {
                let _ = ep.send_control(MASTER, Tag::KillComplete);
                log_from!(rank, log::VERBOSE, "killed mid-task");
                return Ok(());
            }
        }
    }
}
