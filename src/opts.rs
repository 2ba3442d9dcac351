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

use getopts::{Matches, Options};
use std::process::exit;

use parsym_lib::config::{JobConfig, OffloadPolicy};
use parsym_lib::interp::SearchMode;
use parsym_lib::log;

fn tool_name() -> Option<String> {
    match std::env::current_exe() {
        Ok(path) => Some(path.components().last()?.as_os_str().to_str()?.to_string()),
        Err(_) => None,
    }
}

pub fn print_usage(opts: &Options, code: i32) -> ! {
    let tool = match tool_name() {
        Some(name) => name,
        None => "[tool]".to_string(),
    };
    let brief = format!("Usage: {} [options] <program>", tool);
    eprint!("{}", opts.usage(&brief));
    exit(code)
}

pub fn common_opts() -> Options {
    let mut opts = Options::new();
    opts.optopt("n", "ranks", "total rank count, including the master and the timeout sentinel", "<n>");
    opts.optopt("C", "config", "load a job configuration file", "<file>");
    opts.optopt("", "phase1-depth", "prefix-generation depth, 0 disables the generation phase", "<depth>");
    opts.optopt("", "phase2-depth", "exploration depth below each prefix, 0 is unbounded", "<depth>");
    opts.optopt("t", "time-out", "wall-clock budget in seconds, 0 means a day", "<seconds>");
    opts.optopt("s", "search-policy", "worker search policy: DFS, BFS, RAND or COVNEW", "<policy>");
    opts.optflag("", "lb", "steal subtrees from busy workers to feed idle ones");
    opts.optopt("", "offload-policy", "steal heuristic, currently only DEFAULT", "<policy>");
    opts.optopt("o", "output-dir", "job name, also names the master log", "<dir>");
    opts.optflag("h", "help", "print this help message");
    opts.optflag("", "verbose", "print verbose output");
    opts.optopt("D", "debug", "set debugging flags", "<flags>");
    opts
}

pub fn parse(opts: &Options) -> (Matches, JobConfig) {
    let args: Vec<String> = std::env::args().collect();

    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => {
            eprintln!("{}", f);
            print_usage(opts, 1)
        }
    };

    if matches.opt_present("help") {
        print_usage(opts, 0)
    }

    let debug_opts = matches.opt_str("debug").unwrap_or_else(|| "".to_string());
    let logging_flags = (if matches.opt_present("verbose") { log::VERBOSE } else { 0u32 })
        | (if debug_opts.contains('p') { log::PROTO } else { 0u32 })
        | (if debug_opts.contains('s') { log::STEAL } else { 0u32 })
        | (if debug_opts.contains('e') { log::PREFIX } else { 0u32 });
    log::set_flags(logging_flags);

    let mut config = match matches.opt_str("config") {
        Some(file) => match JobConfig::from_file(&file) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{}", e);
                exit(1)
            }
        },
        None => match matches.opt_str("output-dir") {
            Some(dir) => JobConfig::new(&dir),
            None => {
                eprintln!("Output directory not provided");
                print_usage(opts, 1)
            }
        },
    };

    if let Some(dir) = matches.opt_str("output-dir") {
        config.output_dir = dir
    }
    match matches.opt_get::<usize>("ranks") {
        Ok(Some(n)) => config.num_ranks = n,
        Ok(None) => (),
        Err(f) => {
            eprintln!("Could not parse --ranks option: {}", f);
            print_usage(opts, 1)
        }
    }
    match matches.opt_get::<u32>("phase1-depth") {
        Ok(Some(d)) => config.phase1_depth = d,
        Ok(None) => (),
        Err(f) => {
            eprintln!("Could not parse --phase1-depth option: {}", f);
            print_usage(opts, 1)
        }
    }
    match matches.opt_get::<u32>("phase2-depth") {
        Ok(Some(d)) => config.phase2_depth = d,
        Ok(None) => (),
        Err(f) => {
            eprintln!("Could not parse --phase2-depth option: {}", f);
            print_usage(opts, 1)
        }
    }
    match matches.opt_get::<u64>("time-out") {
        Ok(Some(t)) => config.time_out = t,
        Ok(None) => (),
        Err(f) => {
            eprintln!("Could not parse --time-out option: {}", f);
            print_usage(opts, 1)
        }
    }
    if let Some(name) = matches.opt_str("search-policy") {
        config.search_policy = SearchMode::from_name(&name)
    }
    if matches.opt_present("lb") {
        config.lb = true
    }
    if let Some(name) = matches.opt_str("offload-policy") {
        config.offload_policy = match OffloadPolicy::from_name(&name) {
            Ok(policy) => policy,
            Err(e) => {
                eprintln!("{}", e);
                exit(1)
            }
        }
    }

    if let Err(e) = config.validate() {
        eprintln!("{}", e);
        exit(1)
    }

    (matches, config)
}
