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

//! The master: owner of the pending prefix queue and the worker-set
//! bookkeeping, and the single event loop that drives the dispatch and
//! steal protocol. All protocol state lives in this loop's frame; no
//! other thread touches it.

use std::collections::{HashSet, VecDeque};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::config::JobConfig;
use crate::error::CoordError;
use crate::interp::{Interpreter, RunOutcome};
use crate::log;
use crate::log_from;
use crate::prefix::{decode_offer, enumerate_frontier, PathPrefix};
use crate::protocol::Tag;
use crate::transport::{worker_ranks, Endpoint, Rank, FIRST_WORKER, MASTER, SENTINEL};

/// How the job ended, as decided by the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    AllFinished,
    BugFound,
    Timeout,
}

/// Disjoint worker sets held by the master. A worker is Free or Busy;
/// a Busy worker that has volunteered a stealable frontier is also in
/// the offload-ready queue (oldest volunteer first); at most one worker
/// at a time has an outstanding steal request, so the active set and
/// the in-flight flag collapse into one `Option`.
pub struct WorkerSets {
    free: VecDeque<Rank>,
    busy: Vec<Rank>,
    offload_ready: VecDeque<Rank>,
    offload_active: Option<Rank>,
}

impl WorkerSets {
    pub fn new() -> Self {
        WorkerSets { free: VecDeque::new(), busy: Vec::new(), offload_ready: VecDeque::new(), offload_active: None }
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn is_busy(&self, rank: Rank) -> bool {
        self.busy.contains(&rank)
    }

    pub fn mark_busy(&mut self, rank: Rank) {
        if let Some(i) = self.free.iter().position(|r| *r == rank) {
            self.free.remove(i);
        }
        if !self.busy.contains(&rank) {
            self.busy.push(rank)
        }
    }

    pub fn mark_free(&mut self, rank: Rank) {
        if !self.free.contains(&rank) {
            self.free.push_back(rank)
        }
    }

    pub fn pop_free(&mut self) -> Option<Rank> {
        self.free.pop_front()
    }

    /// A worker reported Finish: it leaves Busy and sheds any offload
    /// state, including an outstanding steal request that will now be
    /// answered late or not at all.
    pub fn finish(&mut self, rank: Rank) {
        self.busy.retain(|r| *r != rank);
        self.clear_ready(rank);
        if self.offload_active == Some(rank) {
            self.offload_active = None
        }
    }

    /// Record an offload-ready opinion. Idempotent.
    pub fn mark_ready(&mut self, rank: Rank) {
        if !self.offload_ready.contains(&rank) {
            self.offload_ready.push_back(rank)
        }
    }

    /// Retract an offload-ready opinion. Tolerates absence.
    pub fn clear_ready(&mut self, rank: Rank) {
        if let Some(i) = self.offload_ready.iter().position(|r| *r == rank) {
            self.offload_ready.remove(i);
        }
    }

    /// The oldest volunteer, if no steal is already in flight.
    pub fn steal_candidate(&self) -> Option<Rank> {
        if self.offload_active.is_some() {
            None
        } else {
            self.offload_ready.front().copied()
        }
    }

    pub fn begin_steal(&mut self, rank: Rank) {
        debug_assert!(self.offload_active.is_none());
        self.offload_active = Some(rank)
    }

    /// Consume an offload response. Returns false for a stale answer
    /// from a worker whose Finish already cleared the request.
    pub fn end_steal(&mut self, rank: Rank) -> bool {
        if self.offload_active == Some(rank) {
            self.offload_active = None;
            true
        } else {
            false
        }
    }

    pub fn offload_active(&self) -> Option<Rank> {
        self.offload_active
    }

    /// The set relationships the protocol relies on. The one relaxation
    /// is that a rank with a steal request in flight may already have
    /// retracted its ready opinion, so the active rank is only required
    /// to be Busy.
    pub fn check_invariants(&self) {
        for r in &self.free {
            assert!(!self.busy.contains(r), "rank {} is both Free and Busy", r);
        }
        for r in &self.offload_ready {
            assert!(self.busy.contains(r), "offload-ready rank {} is not Busy", r);
        }
        if let Some(r) = self.offload_active {
            assert!(self.busy.contains(&r), "offload-active rank {} is not Busy", r);
        }
        let dedup = |ranks: Vec<Rank>| {
            let set: HashSet<Rank> = ranks.iter().copied().collect();
            set.len() == ranks.len()
        };
        assert!(dedup(self.free.iter().copied().collect()), "duplicate rank in Free");
        assert!(dedup(self.busy.clone()), "duplicate rank in Busy");
        assert!(dedup(self.offload_ready.iter().copied().collect()), "duplicate rank in OffloadReady");
    }
}

impl Default for WorkerSets {
    fn default() -> Self {
        Self::new()
    }
}

fn format_elapsed(total: u64) -> String {
    let seconds = total % 60;
    let minutes = (total / 60) % 60;
    let hours = (total / 3600) % 24;
    let days = total / 86_400;
    if days > 0 {
        format!("{} days, {:02}:{:02}:{:02}", days, hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}

/// The durable event trace, written next to the job's output directory
/// as `log_master_<outdir>`.
pub struct MasterLog {
    out: BufWriter<File>,
}

impl MasterLog {
    pub fn create(output_dir: &str) -> Result<Self, CoordError> {
        Ok(MasterLog { out: BufWriter::new(File::create(Self::path(output_dir))?) })
    }

    pub fn path(output_dir: &str) -> PathBuf {
        let dir = Path::new(output_dir);
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| output_dir.to_string());
        match dir.parent() {
            Some(parent) => parent.join(format!("log_master_{}", name)),
            None => PathBuf::from(format!("log_master_{}", name)),
        }
    }

    pub fn started(&mut self, program_digest: &str) {
        let unix = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        let _ = writeln!(self.out, "Started: {}", unix);
        if !program_digest.is_empty() {
            let _ = writeln!(self.out, "Program: {}", program_digest);
        }
        let _ = self.out.flush();
    }

    pub fn event(&mut self, line: &str) {
        let _ = writeln!(self.out, "{}", line);
        let _ = self.out.flush();
    }

    pub fn elapsed(&mut self, elapsed: Duration) {
        self.event(&format!("Elapsed: {}", format_elapsed(elapsed.as_secs())))
    }
}

/// Run the master: prefix generation, seeding, the dispatch and steal
/// event loop, and shutdown. Returns how the job ended.
pub fn run_master<I, F>(
    ep: &Endpoint,
    config: &JobConfig,
    program_digest: &str,
    factory: &F,
) -> Result<ExitStatus, CoordError>
where
    I: Interpreter,
    F: Fn() -> I,
{
    let start = Instant::now();
    let num_ranks = ep.num_ranks();
    let w = config.worker_count();
    let mut mlog = MasterLog::create(&config.output_dir)?;
    mlog.started(program_digest);
    mlog.event("MASTER_START");

    // Phase 1: depth-limited enumeration of the path tree, run locally.
    let mut pending: VecDeque<PathPrefix> = VecDeque::new();
    if config.phase1_depth > 0 {
        let mut interp = factory();
        let (prefixes, outcome) = enumerate_frontier(&mut interp, config.phase1_depth)?;
        match outcome {
            RunOutcome::Complete => {
                mlog.event(&format!("MASTER: PHASE1 PREFIXES:{}", prefixes.len()));
                log!(log::PREFIX, &format!("phase 1 produced {} prefixes", prefixes.len()));
                pending = prefixes.into()
            }
            RunOutcome::Bug => {
                // The defect sits within the first D1 levels, so there
                // is nothing to distribute.
                mlog.event("MASTER: BUG FOUND IN PREFIX GENERATION");
                mlog.elapsed(start.elapsed());
                for r in worker_ranks(num_ranks) {
                    ep.send_control(r, Tag::Kill)?;
                    mlog.event(&format!("MASTER->WORKER: KILL ID:{}", r));
                }
                let _ = ep.send_control(SENTINEL, Tag::Kill);
                return Ok(ExitStatus::BugFound);
            }
            RunOutcome::Killed => {
                return Err(CoordError::Protocol("prefix generation was killed with nobody to kill it".to_string()))
            }
        }
    }

    let mut sets = WorkerSets::new();
    let mut seed_killed: HashSet<Rank> = HashSet::new();
    let mut collected: HashSet<Rank> = HashSet::new();

    // Seeding. With no generation phase the whole job goes to the first
    // worker as one unconstrained task; otherwise the first min(W, K)
    // workers each get a prefix in rank order. Leftover workers idle in
    // Free, and without load balancing they have nothing left to
    // contribute and are killed outright.
    if config.phase1_depth == 0 {
        ep.send_control(FIRST_WORKER, Tag::NormalTask)?;
        mlog.event(&format!("MASTER->WORKER: NORMAL_TASK ID:{}", FIRST_WORKER));
        sets.mark_busy(FIRST_WORKER);
    }
    for r in worker_ranks(num_ranks) {
        if config.phase1_depth == 0 && r == FIRST_WORKER {
            continue;
        }
        if let Some(p) = pending.pop_front() {
            ep.send(r, Tag::StartPrefixTask, p.encode())?;
            mlog.event(&format!("MASTER->WORKER: START_WORK ID:{}", r));
            sets.mark_busy(r);
        } else {
            sets.mark_free(r);
            if !config.lb {
                ep.send_control(r, Tag::Kill)?;
                mlog.event(&format!("MASTER->WORKER: KILL ID:{}", r));
                seed_killed.insert(r);
            }
        }
    }

    let mut drained_logged = false;
    if config.phase1_depth > 0 && pending.is_empty() {
        mlog.event("MASTER: DONE_WITH_ALL_PREFIXES");
        drained_logged = true;
    }

    loop {
        // Steal trigger: some worker is idle, some worker is busy and
        // has volunteered, and no request is already in flight.
        if config.lb && sets.free_count() > 0 && sets.free_count() < w {
            if let Some(victim) = sets.steal_candidate() {
                sets.begin_steal(victim);
                ep.send_control(victim, Tag::Offload)?;
                mlog.event(&format!("MASTER->WORKER: OFFLOAD_SENT ID:{}", victim));
            }
        }

        let msg = ep.recv()?;
        match msg.tag {
            Tag::Finish => {
                let r = msg.from;
                assert!(sets.is_busy(r), "FINISH from rank {} which is not busy", r);
                sets.finish(r);
                mlog.event(&format!("WORKER->MASTER: FINISH ID:{}", r));
                if let Some(p) = pending.pop_front() {
                    ep.send(r, Tag::StartPrefixTask, p.encode())?;
                    mlog.event(&format!("MASTER->WORKER: START_WORK ID:{}", r));
                    sets.mark_busy(r);
                    if pending.is_empty() && !drained_logged {
                        mlog.event("MASTER: DONE_WITH_ALL_PREFIXES");
                        drained_logged = true;
                    }
                } else {
                    sets.mark_free(r);
                    mlog.event(&format!("WORKER->MASTER: FREELIST SIZE:{}", sets.free_count()));
                    if sets.free_count() == w {
                        mlog.event("MASTER: ALL WORKERS FINISHED");
                        mlog.event("MASTER_ELAPSED:");
                        mlog.elapsed(start.elapsed());
                        shutdown(ep, &mut mlog, num_ranks, &seed_killed, &collected, true)?;
                        return Ok(ExitStatus::AllFinished);
                    }
                }
            }

            Tag::BugFound => {
                mlog.event(&format!("WORKER->MASTER: BUG FOUND:{}", msg.from));
                mlog.elapsed(start.elapsed());
                shutdown(ep, &mut mlog, num_ranks, &seed_killed, &collected, false)?;
                return Ok(ExitStatus::BugFound);
            }

            Tag::Timeout => {
                assert!(msg.from == SENTINEL, "TIMEOUT from rank {} which is not the sentinel", msg.from);
                mlog.event("MASTER: TIMEOUT");
                mlog.event("MASTER_ELAPSED Timeout:");
                mlog.elapsed(start.elapsed());
                shutdown(ep, &mut mlog, num_ranks, &seed_killed, &collected, true)?;
                return Ok(ExitStatus::Timeout);
            }

            Tag::ReadyToOffload => {
                let r = msg.from;
                assert!(sets.is_busy(r), "READY_TO_OFFLOAD from rank {} which is not busy", r);
                log_from!(MASTER, log::STEAL, &format!("rank {} volunteers a stealable frontier", r));
                sets.mark_ready(r);
            }

            Tag::NotReadyToOffload => {
                // The opinion may already be gone, or never recorded.
                sets.clear_ready(msg.from);
            }

            Tag::OffloadResp => {
                let r = msg.from;
                mlog.event(&format!("WORKER->MASTER: OFFLOAD RCVD ID:{} Length:{}", r, msg.payload.len()));
                let was_active = sets.end_steal(r);
                if was_active {
                    if let Some(p) = decode_offer(&msg.payload)? {
                        if let Some(v) = sets.pop_free() {
                            mlog.event(&format!("MASTER->WORKER: PREFIX_TASK_SEND ID:{} Length:{}", v, p.len()));
                            ep.send(v, Tag::StartPrefixTask, p.encode())?;
                            mlog.event(&format!("MASTER->WORKER: START_WORK ID:{}", v));
                            sets.mark_busy(v);
                        }
                        // With one steal in flight the free list cannot
                        // drain between the trigger and the answer, so
                        // a real offer always finds a taker.
                    }
                }
                // A stale answer raced the victim's Finish and carries
                // nothing; the Finish already cleared the request.
            }

            Tag::KillComplete => {
                assert!(
                    seed_killed.contains(&msg.from),
                    "KILL_COMP from rank {} which was not killed at seeding",
                    msg.from
                );
                collected.insert(msg.from);
            }

            tag => panic!("master received an illegal tag {:?} from rank {}", tag, msg.from),
        }
    }
}

/// Kill every worker that is still alive, then optionally collect one
/// KillComplete per worker. The sentinel is always released so its
/// thread terminates with the job.
fn shutdown(
    ep: &Endpoint,
    mlog: &mut MasterLog,
    num_ranks: usize,
    seed_killed: &HashSet<Rank>,
    collected: &HashSet<Rank>,
    collect: bool,
) -> Result<(), CoordError> {
    for r in worker_ranks(num_ranks) {
        if !seed_killed.contains(&r) {
            ep.send_control(r, Tag::Kill)?;
            mlog.event(&format!("MASTER->WORKER: KILL ID:{}", r));
        }
    }
    // The sentinel may have fired and exited already.
    let _ = ep.send_control(SENTINEL, Tag::Kill);

    if collect {
        let mut remaining: HashSet<Rank> = worker_ranks(num_ranks).filter(|r| !collected.contains(r)).collect();
        while !remaining.is_empty() {
            let msg = ep.recv()?;
            if msg.tag == Tag::KillComplete {
                remaining.remove(&msg.from);
            }
            // Anything else is a straggler racing the kill (a late
            // Finish, a stale offload answer) and is dropped.
        }
        mlog.event("MASTER: KILLS COLLECTED");
    }
    Ok(())
}
