use crate::collective::ReductionHandler;
use crate::error::{AmReduceError, Result};
use crate::protocol::decode_frame;
use crate::router::ReductionRouter;
use crate::transport::{ActiveMessageTransport, ChannelTransport};
use crate::types::Rank;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// A reduction handed to a participant by its local client.
pub(crate) struct Launch {
    pub handler: Box<dyn ReductionHandler>,
    /// Resolved once the handler is registered and started.
    pub ack: oneshot::Sender<Result<()>>,
}

/// Everything a participant task consumes, in arrival order.
pub(crate) enum Inbound {
    /// An encoded step message from `src`.
    Frame { src: Rank, frame: Vec<u8> },
    Launch(Launch),
}

/// Dispatch loop owning one rank's router.
///
/// Handlers run to completion one at a time on this task, so no engine
/// state is ever shared. The loop ends when every sender to its inbox is
/// gone, or on the first fatal error; in the latter case every live
/// reduction is dropped and its waiter observes the abort.
pub(crate) struct Participant {
    rank: Rank,
    router: ReductionRouter,
    transport: ChannelTransport,
    inbox: mpsc::UnboundedReceiver<Inbound>,
}

impl Participant {
    pub fn new(
        transport: ChannelTransport,
        inbox: mpsc::UnboundedReceiver<Inbound>,
        max_parked: usize,
        max_retired: usize,
    ) -> Self {
        let rank = transport.rank();
        Self {
            rank,
            router: ReductionRouter::new(rank, max_parked, max_retired),
            transport,
            inbox,
        }
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) -> Result<()> {
        tracing::debug!(rank = self.rank, "participant started");
        while let Some(inbound) = self.inbox.recv().await {
            match inbound {
                Inbound::Frame { src, frame } => {
                    let delivered = decode_frame(&frame)
                        .and_then(|msg| self.router.dispatch(&self.transport, src, msg));
                    if let Err(e) = delivered {
                        if e.is_fatal() {
                            tracing::error!(rank = self.rank, src, "participant aborting: {e}");
                            return Err(e);
                        }
                        tracing::warn!(rank = self.rank, src, "dropping message: {e}");
                    }
                }
                Inbound::Launch(Launch { handler, ack }) => {
                    let stamp = handler.stamp();
                    let launched = self.router.launch(&self.transport, handler).map(|_| ());
                    let fatal = match &launched {
                        Err(e) if e.is_fatal() => Some(e.to_string()),
                        _ => None,
                    };
                    // The caller may have dropped its handle; that is fine.
                    let _ = ack.send(launched);
                    if let Some(reason) = fatal {
                        tracing::error!(rank = self.rank, stamp, "participant aborting: {reason}");
                        return Err(AmReduceError::ParticipantAborted {
                            rank: self.rank,
                            reason,
                        });
                    }
                }
            }
        }
        tracing::debug!(
            rank = self.rank,
            live = self.router.live_count(),
            "participant stopped"
        );
        Ok(())
    }
}
