//! Partition agreement.
//!
//! Every partition runs the same refinement event on its own replica of
//! the mesh. The two collectives here are the only points where partitions
//! wait for each other: exchanging refinement flags, and agreeing that a
//! stage succeeded everywhere before anything is committed.
//!
//! - [`SerialCollective`]: a single partition
//! - [`ChannelCollective`]: an in-process group connected by channels

use std::cell::Cell;

use crossbeam_channel::{unbounded, Receiver, Sender};
use phasefield_core::CellId;
use phasefield_mesh::RefinementFlag;

use crate::error::CollectiveError;

/// Flags contributed by one partition.
pub type FlagList = Vec<(CellId, RefinementFlag)>;

/// Collective operations over a fixed group of partitions.
///
/// Every member must call the same collectives in the same order.
pub trait Collective {
    /// This partition's rank, `0..size()`.
    fn rank(&self) -> usize;

    /// Number of partitions in the group.
    fn size(&self) -> usize;

    /// Whether every partition reported `ok`.
    ///
    /// All partitions observe the same answer.
    fn all_agree(&self, ok: bool) -> Result<bool, CollectiveError>;

    /// Concatenate every partition's flags in rank order.
    fn all_gather_flags(&self, local: FlagList) -> Result<FlagList, CollectiveError>;
}

// ── SerialCollective ───────────────────────────────────────────────

/// The group of one.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialCollective;

impl Collective for SerialCollective {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_agree(&self, ok: bool) -> Result<bool, CollectiveError> {
        Ok(ok)
    }

    fn all_gather_flags(&self, local: FlagList) -> Result<FlagList, CollectiveError> {
        Ok(local)
    }
}

// ── ChannelCollective ──────────────────────────────────────────────

#[derive(Debug)]
enum Payload {
    Agree(bool),
    Flags(FlagList),
}

#[derive(Debug)]
struct Message {
    round: u64,
    payload: Payload,
}

/// One member of an in-process partition group.
///
/// Members are created together by [`group`](Self::group) and moved to
/// their own threads. Each ordered pair of members shares a dedicated
/// channel, so messages from one peer arrive in the order they were sent.
#[derive(Debug)]
pub struct ChannelCollective {
    rank: usize,
    outgoing: Vec<Option<Sender<Message>>>,
    incoming: Vec<Option<Receiver<Message>>>,
    round: Cell<u64>,
}

impl ChannelCollective {
    /// Create a group of `size` members, indexed by rank.
    pub fn group(size: usize) -> Vec<Self> {
        let mut outgoing: Vec<Vec<Option<Sender<Message>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();
        let mut incoming: Vec<Vec<Option<Receiver<Message>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();
        for from in 0..size {
            for to in 0..size {
                if from != to {
                    let (tx, rx) = unbounded();
                    outgoing[from][to] = Some(tx);
                    incoming[to][from] = Some(rx);
                }
            }
        }
        outgoing
            .into_iter()
            .zip(incoming)
            .enumerate()
            .map(|(rank, (outgoing, incoming))| Self {
                rank,
                outgoing,
                incoming,
                round: Cell::new(0),
            })
            .collect()
    }

    fn next_round(&self) -> u64 {
        let round = self.round.get() + 1;
        self.round.set(round);
        round
    }

    fn broadcast(&self, round: u64, make: impl Fn() -> Payload) -> Result<(), CollectiveError> {
        for (peer, tx) in self.outgoing.iter().enumerate() {
            if let Some(tx) = tx {
                tx.send(Message {
                    round,
                    payload: make(),
                })
                .map_err(|_| CollectiveError::Disconnected { peer })?;
            }
        }
        Ok(())
    }

    /// Receive one message from every peer, in rank order. The slot of
    /// this rank is `None`.
    fn collect(&self, round: u64) -> Result<Vec<Option<Payload>>, CollectiveError> {
        let mut out = Vec::with_capacity(self.incoming.len());
        for (peer, rx) in self.incoming.iter().enumerate() {
            match rx {
                Some(rx) => {
                    let msg = rx
                        .recv()
                        .map_err(|_| CollectiveError::Disconnected { peer })?;
                    if msg.round != round {
                        return Err(CollectiveError::OutOfStep { peer });
                    }
                    out.push(Some(msg.payload));
                }
                None => out.push(None),
            }
        }
        Ok(out)
    }
}

impl Collective for ChannelCollective {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.outgoing.len()
    }

    fn all_agree(&self, ok: bool) -> Result<bool, CollectiveError> {
        let round = self.next_round();
        self.broadcast(round, || Payload::Agree(ok))?;
        let mut all = ok;
        for (peer, payload) in self.collect(round)?.into_iter().enumerate() {
            match payload {
                Some(Payload::Agree(peer_ok)) => all &= peer_ok,
                Some(Payload::Flags(_)) => return Err(CollectiveError::OutOfStep { peer }),
                None => {}
            }
        }
        Ok(all)
    }

    fn all_gather_flags(&self, local: FlagList) -> Result<FlagList, CollectiveError> {
        let round = self.next_round();
        self.broadcast(round, || Payload::Flags(local.clone()))?;
        let mut gathered = Vec::new();
        let mut local = Some(local);
        for (peer, payload) in self.collect(round)?.into_iter().enumerate() {
            match payload {
                Some(Payload::Flags(flags)) => gathered.extend(flags),
                Some(Payload::Agree(_)) => return Err(CollectiveError::OutOfStep { peer }),
                None => gathered.extend(local.take().unwrap_or_default()),
            }
        }
        Ok(gathered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn serial_echoes() {
        let c = SerialCollective;
        assert_eq!((c.rank(), c.size()), (0, 1));
        assert!(c.all_agree(true).unwrap());
        assert!(!c.all_agree(false).unwrap());
        let flags = vec![(CellId(2), RefinementFlag::Refine)];
        assert_eq!(c.all_gather_flags(flags.clone()).unwrap(), flags);
    }

    #[test]
    fn one_dissent_fails_everywhere() {
        let handles: Vec<_> = ChannelCollective::group(3)
            .into_iter()
            .map(|c| thread::spawn(move || c.all_agree(c.rank() != 1).unwrap()))
            .collect();
        for h in handles {
            assert!(!h.join().unwrap());
        }
    }

    #[test]
    fn gather_is_rank_ordered_and_identical() {
        let handles: Vec<_> = ChannelCollective::group(3)
            .into_iter()
            .map(|c| {
                thread::spawn(move || {
                    let local = vec![(CellId(c.rank() as u32 * 10), RefinementFlag::Coarsen)];
                    let first = c.all_gather_flags(local).unwrap();
                    let agreed = c.all_agree(true).unwrap();
                    (first, agreed)
                })
            })
            .collect();
        let expected: FlagList = [0, 10, 20]
            .into_iter()
            .map(|id| (CellId(id), RefinementFlag::Coarsen))
            .collect();
        for h in handles {
            let (flags, agreed) = h.join().unwrap();
            assert_eq!(flags, expected);
            assert!(agreed);
        }
    }

    #[test]
    fn dropped_peer_is_reported() {
        let mut group = ChannelCollective::group(2);
        let survivor = group.remove(0);
        drop(group);
        assert_eq!(
            survivor.all_agree(true),
            Err(CollectiveError::Disconnected { peer: 1 })
        );
    }

    #[test]
    fn mismatched_collectives_detected() {
        let mut group = ChannelCollective::group(2);
        let b = group.remove(1);
        let a = group.remove(0);
        let h = thread::spawn(move || b.all_gather_flags(Vec::new()));
        assert_eq!(a.all_agree(true), Err(CollectiveError::OutOfStep { peer: 1 }));
        assert_eq!(h.join().unwrap(), Err(CollectiveError::OutOfStep { peer: 0 }));
    }
}
