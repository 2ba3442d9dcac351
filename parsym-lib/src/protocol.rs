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

//! The message alphabet spoken between the master and the other ranks.
//! The integer codes are part of the wire format and must not change.

use crate::error::CoordError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    StartPrefixTask = 0,
    Kill = 1,
    Finish = 2,
    Offload = 3,
    OffloadResp = 4,
    BugFound = 5,
    Timeout = 6,
    NormalTask = 7,
    KillComplete = 8,
    ReadyToOffload = 9,
    NotReadyToOffload = 10,
}

impl Tag {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Result<Self, CoordError> {
        use Tag::*;
        Ok(match code {
            0 => StartPrefixTask,
            1 => Kill,
            2 => Finish,
            3 => Offload,
            4 => OffloadResp,
            5 => BugFound,
            6 => Timeout,
            7 => NormalTask,
            8 => KillComplete,
            9 => ReadyToOffload,
            10 => NotReadyToOffload,
            _ => return Err(CoordError::IllegalTag(code)),
        })
    }
}

/// A delivered message. `from` is the sending rank, which the transport
/// stamps itself so a rank cannot impersonate another.
#[derive(Debug, Clone)]
pub struct Message {
    pub from: usize,
    pub tag: Tag,
    pub payload: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_codes_are_stable() {
        assert_eq!(Tag::StartPrefixTask.code(), 0);
        assert_eq!(Tag::Kill.code(), 1);
        assert_eq!(Tag::Finish.code(), 2);
        assert_eq!(Tag::Offload.code(), 3);
        assert_eq!(Tag::OffloadResp.code(), 4);
        assert_eq!(Tag::BugFound.code(), 5);
        assert_eq!(Tag::Timeout.code(), 6);
        assert_eq!(Tag::NormalTask.code(), 7);
        assert_eq!(Tag::KillComplete.code(), 8);
        assert_eq!(Tag::ReadyToOffload.code(), 9);
        assert_eq!(Tag::NotReadyToOffload.code(), 10);
    }

    #[test]
    fn codes_round_trip() {
        for code in 0..=10u8 {
            assert_eq!(Tag::from_code(code).unwrap().code(), code);
        }
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert!(Tag::from_code(11).is_err());
        assert!(Tag::from_code(255).is_err());
    }
}
