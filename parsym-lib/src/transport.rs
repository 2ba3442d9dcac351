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

//! Rank addressing and the reliable FIFO transport connecting the
//! participant set. Every rank owns one receiving queue and can send to
//! any other rank; delivery between a fixed sender/receiver pair is in
//! order. The transport is channel backed, so a "process" here is a
//! rank thread in the execution session.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

use crate::error::CoordError;
use crate::protocol::{Message, Tag};

pub type Rank = usize;

pub const MASTER: Rank = 0;
pub const SENTINEL: Rank = 1;
pub const FIRST_WORKER: Rank = 2;

/// Ranks 2 onwards run workers.
pub fn worker_ranks(num_ranks: usize) -> std::ops::Range<Rank> {
    FIRST_WORKER..num_ranks
}

/// One rank's connection to the rest of the participant set.
pub struct Endpoint {
    rank: Rank,
    inbox: Receiver<Message>,
    peers: Vec<Sender<Message>>,
}

/// Builds the fully connected channel network for a fixed participant
/// set and hands out one endpoint per rank, in rank order.
pub struct ChannelNet;

impl ChannelNet {
    pub fn endpoints(num_ranks: usize) -> Vec<Endpoint> {
        let mut txs = Vec::with_capacity(num_ranks);
        let mut rxs = Vec::with_capacity(num_ranks);
        for _ in 0..num_ranks {
            let (tx, rx) = mpsc::channel();
            txs.push(tx);
            rxs.push(rx);
        }
        rxs.into_iter()
            .enumerate()
            .map(|(rank, inbox)| Endpoint { rank, inbox, peers: txs.clone() })
            .collect()
    }
}

impl Endpoint {
    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn num_ranks(&self) -> usize {
        self.peers.len()
    }

    pub fn send(&self, to: Rank, tag: Tag, payload: Vec<u8>) -> Result<(), CoordError> {
        self.peers[to]
            .send(Message { from: self.rank, tag, payload })
            .map_err(|_| CoordError::Disconnected(to))
    }

    pub fn send_control(&self, to: Rank, tag: Tag) -> Result<(), CoordError> {
        self.send(to, tag, Vec::new())
    }

    /// Blocking receive of the next message from any peer.
    pub fn recv(&self) -> Result<Message, CoordError> {
        self.inbox.recv().map_err(|_| CoordError::Disconnected(self.rank))
    }

    /// Non-blocking probe of the inbox.
    pub fn try_recv(&self) -> Result<Option<Message>, CoordError> {
        match self.inbox.try_recv() {
            Ok(msg) => Ok(Some(msg)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(CoordError::Disconnected(self.rank)),
        }
    }

    /// Receive with a deadline. `Ok(None)` means the budget elapsed
    /// with nothing delivered.
    pub fn recv_timeout(&self, budget: Duration) -> Result<Option<Message>, CoordError> {
        match self.inbox.recv_timeout(budget) {
            Ok(msg) => Ok(Some(msg)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(CoordError::Disconnected(self.rank)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_to_point_delivery_is_fifo() {
        let mut eps = ChannelNet::endpoints(3);
        let c = eps.remove(2);
        let _b = eps.remove(1);
        let a = eps.remove(0);

        for i in 0..10u8 {
            a.send(2, Tag::OffloadResp, vec![i]).unwrap();
        }
        for i in 0..10u8 {
            let msg = c.recv().unwrap();
            assert_eq!(msg.from, 0);
            assert_eq!(msg.payload, vec![i]);
        }
    }

    #[test]
    fn sender_rank_is_stamped() {
        let mut eps = ChannelNet::endpoints(3);
        let c = eps.remove(2);
        let b = eps.remove(1);
        let a = eps.remove(0);

        a.send_control(2, Tag::Finish).unwrap();
        b.send_control(2, Tag::Finish).unwrap();
        let first = c.recv().unwrap();
        let second = c.recv().unwrap();
        assert_eq!(first.from, 0);
        assert_eq!(second.from, 1);
    }

    #[test]
    fn try_recv_does_not_block() {
        let mut eps = ChannelNet::endpoints(3);
        let c = eps.remove(2);
        let _rest = eps;
        assert!(c.try_recv().unwrap().is_none());
    }

    #[test]
    fn recv_timeout_elapses() {
        let mut eps = ChannelNet::endpoints(3);
        let c = eps.remove(2);
        let _rest = eps;
        let got = c.recv_timeout(Duration::from_millis(10)).unwrap();
        assert!(got.is_none());
    }
}
