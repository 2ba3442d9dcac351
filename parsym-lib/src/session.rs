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

//! Job lifecycle: builds the channel network for the fixed participant
//! set and runs every rank on its own scoped thread. Rank 0 is the
//! master, rank 1 the timeout sentinel, everything above a worker.

use crossbeam::thread;

use crate::config::JobConfig;
use crate::coordinator::{self, ExitStatus};
use crate::error::CoordError;
use crate::interp::Interpreter;
use crate::protocol::Tag;
use crate::sentinel;
use crate::transport::{worker_ranks, ChannelNet, SENTINEL};
use crate::worker;

/// Run one distributed execution job to completion and return the
/// master's verdict. The factory is called once per task to make a
/// fresh interpreter, on the master for prefix generation and on every
/// worker for each assignment.
pub fn run<I, F>(config: &JobConfig, program_digest: &str, factory: F) -> Result<ExitStatus, CoordError>
where
    I: Interpreter,
    F: Fn() -> I + Sync,
{
    config.validate()?;

    let mut endpoints = ChannelNet::endpoints(config.num_ranks);
    let sentinel_ep = endpoints.remove(1);
    let master_ep = endpoints.remove(0);
    let factory = &factory;
    let budget = config.budget();

    thread::scope(|scope| {
        scope.spawn(move |_| {
            if let Err(err) = sentinel::run_sentinel(&sentinel_ep, budget) {
                panic!("sentinel failed: {}", err)
            }
        });
        for ep in endpoints.drain(..) {
            scope.spawn(move |_| {
                let rank = ep.rank();
                if let Err(err) = worker::run_worker(&ep, config, factory) {
                    panic!("worker {} failed: {}", rank, err)
                }
            });
        }
        let status = coordinator::run_master(&master_ep, config, program_digest, factory);
        if status.is_err() {
            // A failed master must still release every other rank or
            // the join below never completes.
            for r in worker_ranks(config.num_ranks) {
                let _ = master_ep.send_control(r, Tag::Kill);
            }
            let _ = master_ep.send_control(SENTINEL, Tag::Kill);
        }
        // The master's endpoint must survive until every rank has
        // joined: workers finishing their kill handling may still have
        // messages in flight towards rank 0.
        (status, master_ep)
    })
    .map(|(status, _master_ep)| status)
    .unwrap_or_else(|_| Err(CoordError::Protocol("a rank panicked".to_string())))
}
