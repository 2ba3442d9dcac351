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

use std::error::Error;
use std::fmt;
use std::io;

#[derive(Debug)]
pub enum CoordError {
    /// A configuration value was rejected before any rank was spawned.
    Config(String),
    /// The program under test could not be loaded or parsed.
    Program(String),
    /// A byte arrived on the wire that is not a known message tag. The
    /// tag alphabet is closed, so this is always a bug somewhere.
    IllegalTag(u8),
    /// A well-formed message arrived where the protocol does not allow
    /// it.
    Protocol(String),
    /// The link to the given rank is gone.
    Disconnected(usize),
    /// A prefix payload contained something other than branch outcomes.
    BadPrefix(String),
    Io(io::Error),
}

impl fmt::Display for CoordError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CoordError::Config(msg) => write!(f, "configuration error: {}", msg),
            CoordError::Program(msg) => write!(f, "program error: {}", msg),
            CoordError::IllegalTag(code) => write!(f, "illegal message tag {}", code),
            CoordError::Protocol(msg) => write!(f, "protocol violation: {}", msg),
            CoordError::Disconnected(rank) => write!(f, "lost connection to rank {}", rank),
            CoordError::BadPrefix(msg) => write!(f, "bad prefix payload: {}", msg),
            CoordError::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl Error for CoordError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CoordError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for CoordError {
    fn from(err: io::Error) -> Self {
        CoordError::Io(err)
    }
}
