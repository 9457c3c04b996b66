use crate::error::{AmReduceError, Result};
use crate::protocol::{StepMessage, encode_frame};
use crate::runtime::participant::Inbound;
use crate::transport::ActiveMessageTransport;
use crate::types::Rank;
use std::sync::Arc;
use tokio::sync::mpsc;

/// In-process transport: one unbounded tokio channel per participant.
///
/// Messages are framed with the wire codec on send and decoded by the
/// receiving participant, so this exercises the same path a socket
/// transport would. Channels are unbounded because `send` is called from
/// synchronous handlers that must never wait.
#[derive(Clone)]
pub struct ChannelTransport {
    rank: Rank,
    peers: Arc<Vec<mpsc::UnboundedSender<Inbound>>>,
}

impl ChannelTransport {
    pub(crate) fn new(rank: Rank, peers: Arc<Vec<mpsc::UnboundedSender<Inbound>>>) -> Self {
        Self { rank, peers }
    }
}

impl ActiveMessageTransport for ChannelTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn world_size(&self) -> u32 {
        self.peers.len() as u32
    }

    fn send(&self, dest: Rank, msg: StepMessage) -> Result<()> {
        let peer = self
            .peers
            .get(dest as usize)
            .ok_or(AmReduceError::InvalidRank {
                rank: dest,
                world_size: self.world_size(),
            })?;
        tracing::trace!(
            src = self.rank,
            dest,
            stamp = msg.stamp,
            phase = %msg.phase,
            step = msg.step,
            bytes = msg.payload.len(),
            "send"
        );
        let frame = encode_frame(&msg)?;
        peer.send(Inbound::Frame {
            src: self.rank,
            frame,
        })
        .map_err(|_| AmReduceError::PeerDisconnected { rank: dest })
    }
}
