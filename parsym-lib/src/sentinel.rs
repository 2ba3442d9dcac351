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

//! The timeout sentinel on rank 1. It exists so the master's event
//! loop never has to do its own timing: the sentinel sleeps for the
//! wall-clock budget and converts its expiry into one ordinary
//! protocol message.

use std::time::Duration;

use crate::error::CoordError;
use crate::protocol::Tag;
use crate::transport::{Endpoint, MASTER};

/// Sleep for the budget, then report Timeout to the master. A Kill
/// delivered before the budget elapses ends the sentinel quietly.
pub fn run_sentinel(ep: &Endpoint, budget: Duration) -> Result<(), CoordError> {
    match ep.recv_timeout(budget) {
        Ok(None) => {
            // The job may have ended in the same instant.
            let _ = ep.send_control(MASTER, Tag::Timeout);
            Ok(())
        }
        Ok(Some(msg)) if msg.tag == Tag::Kill => Ok(()),
        Ok(Some(msg)) => panic!("sentinel received an illegal tag {:?} from rank {}", msg.tag, msg.from),
        // Everyone else is gone, so the job is over.
        Err(CoordError::Disconnected(_)) => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    use crate::transport::ChannelNet;

    #[test]
    fn budget_expiry_reports_timeout() {
        let mut eps = ChannelNet::endpoints(3);
        let _worker = eps.remove(2);
        let sentinel = eps.remove(1);
        let master = eps.remove(0);

        let handle = thread::spawn(move || run_sentinel(&sentinel, Duration::from_millis(5)).unwrap());
        let msg = master.recv().unwrap();
        assert_eq!(msg.tag, Tag::Timeout);
        assert_eq!(msg.from, 1);
        handle.join().unwrap();
    }

    #[test]
    fn kill_before_the_budget_is_quiet() {
        let mut eps = ChannelNet::endpoints(3);
        let _worker = eps.remove(2);
        let sentinel = eps.remove(1);
        let master = eps.remove(0);

        master.send_control(1, Tag::Kill).unwrap();
        let handle = thread::spawn(move || run_sentinel(&sentinel, Duration::from_secs(3600)).unwrap());
        handle.join().unwrap();
        assert!(master.try_recv().unwrap().is_none());
    }
}
