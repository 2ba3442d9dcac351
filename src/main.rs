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

use std::fmt::Write;
use std::fs;
use std::process::exit;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use parsym_lib::coordinator::ExitStatus;
use parsym_lib::session;
use parsym_lib::tree::{TreeInterpreter, TreeProgram};

mod opts;

fn main() {
    let opts = opts::common_opts();
    let (matches, config) = opts::parse(&opts);

    let file = match matches.free.first() {
        Some(file) => file.clone(),
        None => {
            eprintln!("No program file provided");
            opts::print_usage(&opts, 1)
        }
    };

    let bytes = match fs::read(&file) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error loading program {}: {}", file, e);
            exit(1)
        }
    };

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let mut digest = String::new();
    for byte in hasher.finalize() {
        let _ = write!(digest, "{:02x}", byte);
    }

    let program = match TreeProgram::parse(&String::from_utf8_lossy(&bytes)) {
        Ok(program) => Arc::new(program),
        Err(e) => {
            eprintln!("Error loading program {}: {}", file, e);
            exit(1)
        }
    };

    let factory = {
        let program = program.clone();
        move || TreeInterpreter::new(program.clone())
    };

    match session::run(&config, &digest, factory) {
        Ok(ExitStatus::AllFinished) => exit(0),
        Ok(ExitStatus::BugFound) => {
            eprintln!("Bug found, see log_master_{}", config.output_dir);
            exit(1)
        }
        Ok(ExitStatus::Timeout) => {
            eprintln!("Timed out after {} seconds", config.budget().as_secs());
            exit(2)
        }
        Err(e) => {
            eprintln!("{}", e);
            exit(1)
        }
    }
}
