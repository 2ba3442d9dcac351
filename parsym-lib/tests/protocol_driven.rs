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

//! Master event-loop tests over a scripted transport: the test owns
//! the worker and sentinel endpoints and plays their side of the
//! protocol move by move, so every interleaving here is exact.

use std::sync::Arc;
use std::thread;

use parsym_lib::config::JobConfig;
use parsym_lib::coordinator::{run_master, ExitStatus, MasterLog};
use parsym_lib::prefix::encode_offer;
use parsym_lib::protocol::Tag;
use parsym_lib::transport::{ChannelNet, Endpoint};
use parsym_lib::tree::{TreeInterpreter, TreeProgram};

fn job(tmp: &tempfile::TempDir, num_ranks: usize) -> JobConfig {
    let out = tmp.path().join("run0");
    let mut config = JobConfig::new(out.to_str().unwrap());
    config.num_ranks = num_ranks;
    config
}

/// Spawn the master on its own thread; the returned endpoints are the
/// other ranks in rank order starting from the sentinel.
fn launch_master(config: JobConfig, program: &str) -> (Vec<Endpoint>, thread::JoinHandle<ExitStatus>) {
    let program = Arc::new(TreeProgram::parse(program).unwrap());
    let mut eps = ChannelNet::endpoints(config.num_ranks);
    let master_ep = eps.remove(0);
    let handle = thread::spawn(move || {
        let factory = move || TreeInterpreter::new(program.clone());
        run_master(&master_ep, &config, "", &factory).unwrap()
    });
    (eps, handle)
}

fn ep(eps: &[Endpoint], rank: usize) -> &Endpoint {
    &eps[rank - 1]
}

// K = 3 prefixes over W = 2 workers: the first finisher pulls the
// third prefix, the second finisher triggers the all-finished
// shutdown.
#[test]
fn finished_workers_pull_the_next_prefix() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = job(&tmp, 4);
    config.phase1_depth = 2;
    // Depth-first enumeration of this tree yields 0, 10, 11.
    let (eps, handle) = launch_master(config, "depth 4\nexit 0");
    let w2 = ep(&eps, 2);
    let w3 = ep(&eps, 3);

    let first = w2.recv().unwrap();
    assert_eq!(first.tag, Tag::StartPrefixTask);
    assert_eq!(first.payload, vec![0]);
    let second = w3.recv().unwrap();
    assert_eq!(second.tag, Tag::StartPrefixTask);
    assert_eq!(second.payload, vec![1, 0]);

    w2.send_control(0, Tag::Finish).unwrap();
    let third = w2.recv().unwrap();
    assert_eq!(third.tag, Tag::StartPrefixTask);
    assert_eq!(third.payload, vec![1, 1]);

    w3.send_control(0, Tag::Finish).unwrap();
    w2.send_control(0, Tag::Finish).unwrap();

    assert_eq!(w2.recv().unwrap().tag, Tag::Kill);
    w2.send_control(0, Tag::KillComplete).unwrap();
    assert_eq!(w3.recv().unwrap().tag, Tag::Kill);
    w3.send_control(0, Tag::KillComplete).unwrap();

    assert_eq!(handle.join().unwrap(), ExitStatus::AllFinished);
}

// K < W with load balancing off: the spare workers are killed at
// seeding, answer once, and are not killed again at shutdown.
#[test]
fn seed_killed_spares_are_collected_once() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = job(&tmp, 6);
    config.phase1_depth = 2;
    // Both root children terminate, so the enumeration is 0, 1.
    let (eps, handle) = launch_master(config, "depth 4\nexit 0\nexit 1");
    let (w2, w3, w4, w5) = (ep(&eps, 2), ep(&eps, 3), ep(&eps, 4), ep(&eps, 5));

    assert_eq!(w2.recv().unwrap().payload, vec![0]);
    assert_eq!(w3.recv().unwrap().payload, vec![1]);
    assert_eq!(w4.recv().unwrap().tag, Tag::Kill);
    assert_eq!(w5.recv().unwrap().tag, Tag::Kill);
    w4.send_control(0, Tag::KillComplete).unwrap();
    w5.send_control(0, Tag::KillComplete).unwrap();

    w2.send_control(0, Tag::Finish).unwrap();
    w3.send_control(0, Tag::Finish).unwrap();

    assert_eq!(w2.recv().unwrap().tag, Tag::Kill);
    w2.send_control(0, Tag::KillComplete).unwrap();
    assert_eq!(w3.recv().unwrap().tag, Tag::Kill);
    w3.send_control(0, Tag::KillComplete).unwrap();

    assert_eq!(handle.join().unwrap(), ExitStatus::AllFinished);
    assert!(w4.try_recv().unwrap().is_none(), "spare worker was killed twice");
    assert!(w5.try_recv().unwrap().is_none(), "spare worker was killed twice");
}

// A retracted ready opinion must stop the master from stealing, even
// when an idle worker appears right afterwards.
#[test]
fn stale_ready_is_never_stolen_from() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = job(&tmp, 5);
    config.phase1_depth = 2;
    config.lb = true;
    // Enumeration: 0, 10, 11. All three workers are seeded.
    let (eps, handle) = launch_master(config, "depth 6\nexit 0\nexit 10");
    let (w2, w3, w4) = (ep(&eps, 2), ep(&eps, 3), ep(&eps, 4));

    assert_eq!(w2.recv().unwrap().payload, vec![0]);
    assert_eq!(w3.recv().unwrap().payload, vec![1, 0]);
    assert_eq!(w4.recv().unwrap().payload, vec![1, 1]);

    w3.send_control(0, Tag::ReadyToOffload).unwrap();
    w3.send_control(0, Tag::NotReadyToOffload).unwrap();
    // An idle worker appears after the retraction; nobody is left to
    // steal from.
    w2.send_control(0, Tag::Finish).unwrap();
    w3.send_control(0, Tag::Finish).unwrap();
    w4.send_control(0, Tag::Finish).unwrap();

    // The next message on rank 3's link must be the shutdown kill, not
    // an offload request.
    assert_eq!(w3.recv().unwrap().tag, Tag::Kill);
    w3.send_control(0, Tag::KillComplete).unwrap();
    assert_eq!(w2.recv().unwrap().tag, Tag::Kill);
    w2.send_control(0, Tag::KillComplete).unwrap();
    assert_eq!(w4.recv().unwrap().tag, Tag::Kill);
    w4.send_control(0, Tag::KillComplete).unwrap();

    assert_eq!(handle.join().unwrap(), ExitStatus::AllFinished);
}

// The stealing race: the victim finishes between the steal decision
// and the request's arrival, then answers from its idle loop. The
// late empty answer must be discarded and the request cleared.
#[test]
fn late_offload_answer_after_finish_is_discarded() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = job(&tmp, 5);
    config.phase1_depth = 1;
    config.lb = true;
    // Enumeration: 0, 1. Rank 4 idles in Free from the start.
    let (eps, handle) = launch_master(config, "depth 6\nexit 00\nexit 01");
    let (w2, w3, w4) = (ep(&eps, 2), ep(&eps, 3), ep(&eps, 4));

    assert_eq!(w2.recv().unwrap().payload, vec![0]);
    assert_eq!(w3.recv().unwrap().payload, vec![1]);

    w3.send_control(0, Tag::ReadyToOffload).unwrap();
    assert_eq!(w3.recv().unwrap().tag, Tag::Offload);

    w3.send_control(0, Tag::Finish).unwrap();
    w3.send(0, Tag::OffloadResp, encode_offer(None)).unwrap();
    w2.send_control(0, Tag::Finish).unwrap();

    assert_eq!(w2.recv().unwrap().tag, Tag::Kill);
    w2.send_control(0, Tag::KillComplete).unwrap();
    assert_eq!(w3.recv().unwrap().tag, Tag::Kill);
    w3.send_control(0, Tag::KillComplete).unwrap();
    // The idle worker never received anything but the shutdown kill.
    assert_eq!(w4.recv().unwrap().tag, Tag::Kill);
    w4.send_control(0, Tag::KillComplete).unwrap();

    assert_eq!(handle.join().unwrap(), ExitStatus::AllFinished);
}

// A real offload answer is redispatched to the oldest free worker.
#[test]
fn real_offload_answer_reaches_the_idle_worker() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = job(&tmp, 5);
    config.phase1_depth = 1;
    config.lb = true;
    let (eps, handle) = launch_master(config, "depth 8\nexit 00\nexit 01");
    let (w2, w3, w4) = (ep(&eps, 2), ep(&eps, 3), ep(&eps, 4));

    assert_eq!(w2.recv().unwrap().payload, vec![0]);
    assert_eq!(w3.recv().unwrap().payload, vec![1]);

    w3.send_control(0, Tag::ReadyToOffload).unwrap();
    assert_eq!(w3.recv().unwrap().tag, Tag::Offload);
    let stolen = vec![1, 0, 1, 1, 0];
    w3.send(0, Tag::OffloadResp, stolen.clone()).unwrap();
    // The peel emptied the victim's stealable frontier.
    w3.send_control(0, Tag::NotReadyToOffload).unwrap();

    let task = w4.recv().unwrap();
    assert_eq!(task.tag, Tag::StartPrefixTask);
    assert_eq!(task.payload, stolen);

    w2.send_control(0, Tag::Finish).unwrap();
    w3.send_control(0, Tag::Finish).unwrap();
    w4.send_control(0, Tag::Finish).unwrap();

    for w in [w2, w3, w4] {
        assert_eq!(w.recv().unwrap().tag, Tag::Kill);
        w.send_control(0, Tag::KillComplete).unwrap();
    }

    assert_eq!(handle.join().unwrap(), ExitStatus::AllFinished);
}

// A timeout that lands before a bug report wins: the job still ends
// with timeout status and the late bug is dropped during shutdown.
#[test]
fn timeout_beats_a_later_bug_report() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = job(&tmp, 4);
    config.phase1_depth = 1;
    let (eps, handle) = launch_master(config.clone(), "depth 6\nexit 0");
    let sentinel = ep(&eps, 1);
    let (w2, w3) = (ep(&eps, 2), ep(&eps, 3));

    assert_eq!(w2.recv().unwrap().payload, vec![0]);
    assert_eq!(w3.recv().unwrap().payload, vec![1]);

    sentinel.send_control(0, Tag::Timeout).unwrap();
    w3.send_control(0, Tag::BugFound).unwrap();

    assert_eq!(w2.recv().unwrap().tag, Tag::Kill);
    w2.send_control(0, Tag::KillComplete).unwrap();
    assert_eq!(w3.recv().unwrap().tag, Tag::Kill);
    w3.send_control(0, Tag::KillComplete).unwrap();

    assert_eq!(handle.join().unwrap(), ExitStatus::Timeout);
    let trace = std::fs::read_to_string(MasterLog::path(&config.output_dir)).unwrap();
    assert!(trace.contains("MASTER: TIMEOUT"));
    assert!(!trace.contains("BUG FOUND"));
}

// Bug reports shut the job down immediately, without waiting for the
// kills to be acknowledged.
#[test]
fn bug_report_kills_everyone_immediately() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = job(&tmp, 4);
    config.phase1_depth = 1;
    let (eps, handle) = launch_master(config.clone(), "depth 6\nexit 0");
    let (w2, w3) = (ep(&eps, 2), ep(&eps, 3));

    assert_eq!(w2.recv().unwrap().payload, vec![0]);
    assert_eq!(w3.recv().unwrap().payload, vec![1]);

    w3.send_control(0, Tag::BugFound).unwrap();

    assert_eq!(w2.recv().unwrap().tag, Tag::Kill);
    assert_eq!(w3.recv().unwrap().tag, Tag::Kill);

    // No KillComplete is sent at all; the master must not be waiting.
    assert_eq!(handle.join().unwrap(), ExitStatus::BugFound);
    let trace = std::fs::read_to_string(MasterLog::path(&config.output_dir)).unwrap();
    assert!(trace.contains("WORKER->MASTER: BUG FOUND:3"));
    assert!(trace.contains("Elapsed: "));
}
