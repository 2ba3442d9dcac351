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

//! This module loads a TOML file containing the configuration for one
//! distributed execution job.

use std::fs::File;
use std::io::prelude::*;
use std::path::Path;
use std::time::Duration;

use toml::Value;

use crate::error::CoordError;
use crate::interp::SearchMode;

/// A zero second budget stands for "effectively unbounded", which is a
/// day of wall clock.
pub const DEFAULT_TIMEOUT_SECS: u64 = 86_400;

/// Reserved for future steal heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffloadPolicy {
    Default,
}

impl OffloadPolicy {
    pub fn from_name(name: &str) -> Result<Self, CoordError> {
        match name {
            "DEFAULT" => Ok(OffloadPolicy::Default),
            _ => Err(CoordError::Config(format!("unknown offload policy {:?}", name))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Total participant count including the master and the timeout
    /// sentinel, so there are `num_ranks - 2` workers.
    pub num_ranks: usize,
    /// Prefix-generation depth. Zero skips the generation phase and
    /// hands the whole job to the first worker.
    pub phase1_depth: u32,
    /// Exploration depth below the assigned prefix. Zero is unbounded.
    pub phase2_depth: u32,
    /// Wall-clock budget in seconds. Zero maps to a day.
    pub time_out: u64,
    pub search_policy: SearchMode,
    /// Enable subtree stealing from busy workers.
    pub lb: bool,
    pub offload_policy: OffloadPolicy,
    pub output_dir: String,
}

impl JobConfig {
    pub fn new(output_dir: &str) -> Self {
        JobConfig {
            num_ranks: num_cpus::get().max(3),
            phase1_depth: 0,
            phase2_depth: 0,
            time_out: 0,
            search_policy: SearchMode::Dfs,
            lb: false,
            offload_policy: OffloadPolicy::Default,
            output_dir: output_dir.to_string(),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.num_ranks - 2
    }

    pub fn budget(&self) -> Duration {
        Duration::from_secs(if self.time_out == 0 { DEFAULT_TIMEOUT_SECS } else { self.time_out })
    }

    pub fn validate(&self) -> Result<(), CoordError> {
        if self.num_ranks < 3 {
            return Err(CoordError::Config(format!(
                "at least 3 ranks are required (master, sentinel, one worker), got {}",
                self.num_ranks
            )));
        }
        if self.output_dir.is_empty() {
            return Err(CoordError::Config("output directory not provided".to_string()));
        }
        Ok(())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CoordError> {
        let mut contents = String::new();
        File::open(path.as_ref())
            .and_then(|mut fd| fd.read_to_string(&mut contents))
            .map_err(|e| CoordError::Config(format!("cannot read {}: {}", path.as_ref().display(), e)))?;
        JobConfig::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, CoordError> {
        let config: Value =
            contents.parse().map_err(|e| CoordError::Config(format!("configuration parse error: {}", e)))?;

        allowed_keys(
            &config,
            &["ranks", "phase1_depth", "phase2_depth", "time_out", "search_policy", "lb", "offload_policy", "output_dir"],
        )?;

        let output_dir = get_str(&config, "output_dir")?
            .ok_or_else(|| CoordError::Config("output_dir must be specified".to_string()))?;

        let mut job = JobConfig::new(&output_dir);
        if let Some(ranks) = get_int(&config, "ranks")? {
            job.num_ranks = ranks as usize
        }
        if let Some(depth) = get_int(&config, "phase1_depth")? {
            job.phase1_depth = depth as u32
        }
        if let Some(depth) = get_int(&config, "phase2_depth")? {
            job.phase2_depth = depth as u32
        }
        if let Some(secs) = get_int(&config, "time_out")? {
            job.time_out = secs as u64
        }
        if let Some(name) = get_str(&config, "search_policy")? {
            job.search_policy = SearchMode::from_name(&name)
        }
        if let Some(lb) = get_bool(&config, "lb")? {
            job.lb = lb
        }
        if let Some(name) = get_str(&config, "offload_policy")? {
            job.offload_policy = OffloadPolicy::from_name(&name)?
        }
        job.validate()?;
        Ok(job)
    }
}

fn allowed_keys(config: &Value, allowed: &[&str]) -> Result<(), CoordError> {
    let tbl = match config {
        Value::Table(tbl) => tbl,
        _ => return Err(CoordError::Config("configuration should be a toml key-value table".to_string())),
    };
    'outer: for key in tbl.keys() {
        for allowed_key in allowed {
            if key == allowed_key {
                continue 'outer;
            }
        }
        return Err(CoordError::Config(format!("key {} is not allowed in the configuration", key)));
    }
    Ok(())
}

fn get_int(config: &Value, key: &str) -> Result<Option<i64>, CoordError> {
    match config.get(key) {
        Some(Value::Integer(n)) if *n >= 0 => Ok(Some(*n)),
        Some(_) => Err(CoordError::Config(format!("{} must be a non-negative integer", key))),
        None => Ok(None),
    }
}

fn get_bool(config: &Value, key: &str) -> Result<Option<bool>, CoordError> {
    match config.get(key) {
        Some(Value::Boolean(b)) => Ok(Some(*b)),
        Some(_) => Err(CoordError::Config(format!("{} must be a boolean", key))),
        None => Ok(None),
    }
}

fn get_str(config: &Value, key: &str) -> Result<Option<String>, CoordError> {
    match config.get(key) {
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(CoordError::Config(format!("{} must be a string", key))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = JobConfig::new("out");
        assert!(config.num_ranks >= 3);
        assert_eq!(config.phase1_depth, 0);
        assert_eq!(config.search_policy, SearchMode::Dfs);
        assert!(!config.lb);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_timeout_means_a_day() {
        let config = JobConfig::new("out");
        assert_eq!(config.budget(), Duration::from_secs(86_400));
        let mut config = config;
        config.time_out = 30;
        assert_eq!(config.budget(), Duration::from_secs(30));
    }

    #[test]
    fn full_config_parses() {
        let config = JobConfig::parse(
            r#"
            ranks = 6
            phase1_depth = 4
            phase2_depth = 10
            time_out = 120
            search_policy = "COVNEW"
            lb = true
            offload_policy = "DEFAULT"
            output_dir = "run0"
            "#,
        )
        .unwrap();
        assert_eq!(config.num_ranks, 6);
        assert_eq!(config.worker_count(), 4);
        assert_eq!(config.phase1_depth, 4);
        assert_eq!(config.phase2_depth, 10);
        assert_eq!(config.time_out, 120);
        assert_eq!(config.search_policy, SearchMode::CovNew);
        assert!(config.lb);
        assert_eq!(config.output_dir, "run0");
    }

    #[test]
    fn unknown_search_policies_fall_back_to_dfs() {
        let config = JobConfig::parse("search_policy = \"FANCY\"\noutput_dir = \"run0\"").unwrap();
        assert_eq!(config.search_policy, SearchMode::Dfs);
    }

    #[test]
    fn unknown_offload_policies_are_fatal() {
        assert!(JobConfig::parse("offload_policy = \"EAGER\"\noutput_dir = \"run0\"").is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(JobConfig::parse("outputdir = \"run0\"").is_err());
    }

    #[test]
    fn missing_output_dir_is_rejected() {
        assert!(JobConfig::parse("ranks = 4").is_err());
    }

    #[test]
    fn too_few_ranks_are_rejected() {
        assert!(JobConfig::parse("ranks = 2\noutput_dir = \"run0\"").is_err());
    }
}
