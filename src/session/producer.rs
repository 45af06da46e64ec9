//! Producer sessions: decode records and append them in arrival order

use std::sync::Arc;

use tracing::{debug, info};

use super::{SessionError, SessionResult};
use crate::codec::{Frame, PublishRequest};
use crate::framed::FramedStream;
use crate::stream::{StreamChannel, StreamRegistry};
use crate::types::{Record, StreamId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    Connecting,
    Streaming,
    Closed,
}

pub struct ProducerSession {
    channel: Arc<StreamChannel>,
    identity: Option<String>,
    state: ProducerState,
    published: u64,
}

impl ProducerSession {
    pub fn new(request: PublishRequest, registry: &StreamRegistry) -> Self {
        Self {
            channel: registry.get_or_create(&request.stream_id),
            identity: request.identity,
            state: ProducerState::Connecting,
            published: 0,
        }
    }

    pub fn stream_id(&self) -> &StreamId {
        self.channel.id()
    }

    pub fn state(&self) -> ProducerState {
        self.state
    }

    pub async fn run(mut self, io: &mut FramedStream) -> SessionResult<()> {
        self.state = ProducerState::Streaming;
        info!(identity = self.identity.as_deref().unwrap_or("-"), "producer streaming");

        let result = self.stream(io).await;
        self.state = ProducerState::Closed;
        debug!(published = self.published, "producer closed");
        result
    }

    async fn stream(&mut self, io: &mut FramedStream) -> SessionResult<()> {
        loop {
            let Some(first) = io.read_frame().await? else {
                return Ok(());
            };
            let mut batch = vec![into_record(first)?];

            // Whatever else already arrived goes in under the same lock.
            // Records that decoded before a bad frame are still appended.
            let tail = loop {
                match io.next_buffered() {
                    Ok(Some(frame)) => match into_record(frame) {
                        Ok(record) => batch.push(record),
                        Err(e) => break Err(e),
                    },
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(e),
                }
            };

            self.published += self.channel.publish_batch(batch) as u64;
            tail?;
        }
    }
}

fn into_record(frame: Frame) -> SessionResult<Record> {
    match frame {
        Frame::Record(record) => Ok(record),
        other => Err(SessionError::UnexpectedFrame {
            expected: "record",
            found: other.name(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_creates_stream() {
        let registry = StreamRegistry::new();
        let session = ProducerSession::new(PublishRequest::new("orders"), &registry);
        assert_eq!(session.state(), ProducerState::Connecting);
        assert_eq!(session.stream_id().as_str(), "orders");
        assert!(registry.get("orders").is_some());
    }

    #[test]
    fn test_only_records_accepted_after_handshake() {
        assert!(into_record(Frame::Record(Record::end(1))).is_ok());
        let err = into_record(Frame::Wipe).unwrap_err();
        assert!(matches!(
            err,
            SessionError::UnexpectedFrame {
                expected: "record",
                found: "wipe"
            }
        ));
    }
}
