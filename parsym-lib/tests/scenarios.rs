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

//! End-to-end jobs over the channel transport with the branch-tree
//! engine on every rank.

use std::fs;
use std::sync::Arc;

use parsym_lib::config::JobConfig;
use parsym_lib::coordinator::{ExitStatus, MasterLog};
use parsym_lib::prefix::enumerate_frontier;
use parsym_lib::session;
use parsym_lib::tree::{TreeInterpreter, TreeProgram};

fn job(tmp: &tempfile::TempDir, num_ranks: usize) -> JobConfig {
    let out = tmp.path().join("run0");
    let mut config = JobConfig::new(out.to_str().unwrap());
    config.num_ranks = num_ranks;
    config
}

fn run_job(config: &JobConfig, program: &str) -> (ExitStatus, String) {
    let program = Arc::new(TreeProgram::parse(program).unwrap());
    let factory = {
        let program = program.clone();
        move || TreeInterpreter::new(program.clone())
    };
    let status = session::run(config, "", factory).unwrap();
    let trace = fs::read_to_string(MasterLog::path(&config.output_dir)).unwrap();
    (status, trace)
}

// With no generation phase the whole job goes to rank 2 as a single
// unconstrained task and the master is only a result collector.
#[test]
fn degenerate_job_without_prefix_generation() {
    let tmp = tempfile::tempdir().unwrap();
    let config = job(&tmp, 3);
    let (status, trace) = run_job(&config, "depth 4");
    assert_eq!(status, ExitStatus::AllFinished);
    assert!(trace.contains("MASTER->WORKER: NORMAL_TASK ID:2"));
    assert!(trace.contains("WORKER->MASTER: FINISH ID:2"));
    assert!(trace.contains("MASTER->WORKER: KILL ID:2"));
    assert!(trace.contains("MASTER: ALL WORKERS FINISHED"));
    assert!(!trace.contains("START_WORK"));
}

// Every phase-1 prefix is dispatched exactly once across the run.
#[test]
fn every_prefix_is_dispatched_exactly_once() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = job(&tmp, 4);
    config.phase1_depth = 3;
    let program = "depth 6\nexit 01\nexit 110";

    let expected = {
        let mut interp = TreeInterpreter::new(Arc::new(TreeProgram::parse(program).unwrap()));
        enumerate_frontier(&mut interp, 3).unwrap().0.len()
    };
    assert!(expected > config.worker_count());

    let (status, trace) = run_job(&config, program);
    assert_eq!(status, ExitStatus::AllFinished);
    let dispatched = trace.matches("MASTER->WORKER: START_WORK ID:").count();
    assert_eq!(dispatched, expected);
    assert!(trace.contains(&format!("MASTER: PHASE1 PREFIXES:{}", expected)));
    assert!(trace.contains("MASTER: DONE_WITH_ALL_PREFIXES"));
}

// Spare workers beyond the prefix count are killed at seeding when
// load balancing is off, and the job still shuts down cleanly.
#[test]
fn spare_workers_are_killed_at_seeding() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = job(&tmp, 6);
    config.phase1_depth = 1;
    // Two prefixes for four workers.
    let (status, trace) = run_job(&config, "depth 5");
    assert_eq!(status, ExitStatus::AllFinished);
    assert!(trace.contains("MASTER->WORKER: KILL ID:4"));
    assert!(trace.contains("MASTER->WORKER: KILL ID:5"));
    assert_eq!(trace.matches("MASTER->WORKER: START_WORK ID:").count(), 2);
}

// A busy worker's subtree is stolen and redistributed to an idle one.
#[test]
fn work_stealing_feeds_the_idle_worker() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = job(&tmp, 5);
    config.phase1_depth = 1;
    config.lb = true;
    // The subtree under 0 dies immediately; the subtree under 1 is
    // large enough that rank 3 is still exploring when the steal
    // request arrives.
    let (status, trace) = run_job(&config, "depth 16\nexit 00\nexit 01");
    assert_eq!(status, ExitStatus::AllFinished);
    assert!(trace.contains("MASTER->WORKER: OFFLOAD_SENT ID:3"));
    assert!(trace.contains("WORKER->MASTER: OFFLOAD RCVD ID:3"));
    assert!(trace.contains("MASTER->WORKER: PREFIX_TASK_SEND ID:4"));
    assert!(trace.contains("MASTER->WORKER: START_WORK ID:4"));
}

// First bug wins regardless of how many prefixes are still pending.
#[test]
fn bug_short_circuits_the_job() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = job(&tmp, 4);
    config.phase1_depth = 2;
    let (status, trace) = run_job(&config, "depth 8\nbug 1101");
    assert_eq!(status, ExitStatus::BugFound);
    assert!(trace.contains("WORKER->MASTER: BUG FOUND:"));
    assert!(trace.contains("Elapsed: "));
}

// A bug within the first D1 levels is found by the master itself
// during prefix generation.
#[test]
fn bug_inside_the_generation_depth_is_reported_by_the_master() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = job(&tmp, 4);
    config.phase1_depth = 4;
    let (status, trace) = run_job(&config, "depth 6\nbug 001");
    assert_eq!(status, ExitStatus::BugFound);
    assert!(trace.contains("MASTER: BUG FOUND IN PREFIX GENERATION"));
    assert!(!trace.contains("START_WORK"));
}

// The sentinel's budget expiry shuts the whole job down.
#[test]
fn timeout_kills_a_running_job() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = job(&tmp, 3);
    config.time_out = 1;
    // Far too much tree to finish within the budget.
    let (status, trace) = run_job(&config, "depth 40");
    assert_eq!(status, ExitStatus::Timeout);
    assert!(trace.contains("MASTER: TIMEOUT"));
    assert!(trace.contains("MASTER_ELAPSED Timeout:"));
    assert!(trace.contains("MASTER: KILLS COLLECTED"));
}

// Search policy is a worker-side concern only; the run completes the
// same way under each of them.
#[test]
fn every_search_policy_completes() {
    use parsym_lib::interp::SearchMode;
    for mode in [SearchMode::Dfs, SearchMode::Bfs, SearchMode::Rand, SearchMode::CovNew] {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = job(&tmp, 4);
        config.phase1_depth = 2;
        config.search_policy = mode;
        let (status, _) = run_job(&config, "depth 7\nexit 010");
        assert_eq!(status, ExitStatus::AllFinished, "policy {:?}", mode);
    }
}
