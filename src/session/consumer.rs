//! Consumer sessions
//!
//! A consumer resolves its threshold, replays retained history in batches,
//! then switches to live pushes once it reaches the tail. Falling behind a
//! live queue closes it and sends the consumer back to replay from its own
//! cursor, so nothing is skipped.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::{SessionContext, SessionResult};
use crate::codec::{Frame, SubscribeRequest};
use crate::framed::FramedStream;
use crate::stream::{Attach, CatchUp, StreamChannel, SubscriberId};
use crate::types::{LogEntry, Record, StreamId};

/// Outbound bytes gathered from the live queue before a flush
const LIVE_FLUSH_BYTES: usize = 64 * 1024;

#[derive(Debug)]
pub enum ConsumerState {
    Attaching,
    /// Nothing at or above the threshold yet.
    Pending(oneshot::Receiver<u64>),
    Replaying { from: u64 },
    Live(mpsc::Receiver<LogEntry>),
    Closed,
}

impl ConsumerState {
    pub fn name(&self) -> &'static str {
        match self {
            ConsumerState::Attaching => "attaching",
            ConsumerState::Pending(_) => "pending",
            ConsumerState::Replaying { .. } => "replaying",
            ConsumerState::Live(_) => "live",
            ConsumerState::Closed => "closed",
        }
    }
}

pub struct ConsumerSession {
    channel: Arc<StreamChannel>,
    id: SubscriberId,
    request: SubscribeRequest,
    queue_capacity: usize,
    replay_batch: usize,
    next_position: u64,
    delivered: u64,
}

impl ConsumerSession {
    pub fn new(request: SubscribeRequest, ctx: &SessionContext) -> Self {
        let channel = ctx.registry.get_or_create(&request.stream_id);
        Self {
            id: channel.subscriber_id(),
            channel,
            request,
            queue_capacity: ctx.consumer_queue_capacity,
            replay_batch: ctx.replay_batch_size,
            next_position: 0,
            delivered: 0,
        }
    }

    pub fn stream_id(&self) -> &StreamId {
        self.channel.id()
    }

    pub async fn run(mut self, io: &mut FramedStream) -> SessionResult<()> {
        info!(
            subscriber = self.id,
            threshold = %self.request.threshold,
            identity = self.request.identity.as_deref().unwrap_or("-"),
            "consumer attaching"
        );

        let mut state = ConsumerState::Attaching;
        let result = loop {
            match self.step(state, io).await {
                Ok(ConsumerState::Closed) => break Ok(()),
                Ok(next) => state = next,
                Err(e) => break Err(e),
            }
        };

        self.channel.detach(self.id);
        debug!(subscriber = self.id, delivered = self.delivered, "consumer closed");
        result
    }

    /// One transition of the consumer state machine.
    async fn step(
        &mut self,
        state: ConsumerState,
        io: &mut FramedStream,
    ) -> SessionResult<ConsumerState> {
        match state {
            ConsumerState::Attaching => {
                Ok(match self.channel.attach(self.id, self.request.threshold) {
                    Attach::At(position) => ConsumerState::Replaying { from: position },
                    Attach::Pending(wake) => {
                        debug!(subscriber = self.id, "no qualifying window yet");
                        ConsumerState::Pending(wake)
                    }
                })
            }

            ConsumerState::Pending(wake) => tokio::select! {
                woken = wake => Ok(match woken {
                    Ok(position) => ConsumerState::Replaying { from: position },
                    // Sender dropped without firing: the stream is gone.
                    Err(_) => ConsumerState::Closed,
                }),
                closed = io.wait_closed() => closed.map(|()| ConsumerState::Closed),
            },

            ConsumerState::Replaying { from } => {
                match self
                    .channel
                    .catch_up(self.id, from, self.replay_batch, self.queue_capacity)
                {
                    CatchUp::Batch(entries) => {
                        for entry in &entries {
                            self.deliver(io, entry);
                        }
                        io.flush().await?;
                        Ok(ConsumerState::Replaying {
                            from: self.next_position,
                        })
                    }
                    CatchUp::Live(queue) => {
                        debug!(subscriber = self.id, from, "consumer live");
                        Ok(ConsumerState::Live(queue))
                    }
                }
            }

            ConsumerState::Live(mut queue) => tokio::select! {
                entry = queue.recv() => match entry {
                    Some(entry) => {
                        self.deliver(io, &entry);
                        while io.queued_bytes() < LIVE_FLUSH_BYTES {
                            match queue.try_recv() {
                                Ok(entry) => self.deliver(io, &entry),
                                Err(_) => break,
                            }
                        }
                        io.flush().await?;
                        Ok(ConsumerState::Live(queue))
                    }
                    // Dropped from the live set after falling behind.
                    None => Ok(ConsumerState::Replaying {
                        from: self.next_position,
                    }),
                },
                closed = io.wait_closed() => closed.map(|()| ConsumerState::Closed),
            },

            ConsumerState::Closed => Ok(ConsumerState::Closed),
        }
    }

    fn deliver(&mut self, io: &mut FramedStream, entry: &LogEntry) {
        self.next_position = entry.position + 1;
        if let (Some(filter), Record::Payload { partition_key, .. }) =
            (&self.request.partitions, &entry.record)
        {
            if !filter.admits(*partition_key) {
                return;
            }
        }
        io.queue(&Frame::Record(entry.record.clone()));
        self.delivered += 1;
    }
}
