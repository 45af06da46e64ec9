//! Per-connection driver: handshake, role dispatch, teardown

use tokio::net::TcpStream;
use tracing::{debug, field, info_span, warn, Instrument, Span};

use crate::config::BrokerConfig;
use crate::framed::FramedStream;
use crate::session::{Session, SessionContext, SessionError, SessionResult};

#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    pub read_buffer_size: usize,
    pub max_frame_len: usize,
}

impl From<&BrokerConfig> for ConnectionLimits {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            read_buffer_size: config.read_buffer_size,
            max_frame_len: config.max_frame_len,
        }
    }
}

pub(crate) async fn serve(socket: TcpStream, ctx: SessionContext, limits: ConnectionLimits) {
    let mut io = FramedStream::new(socket, limits.read_buffer_size, limits.max_frame_len);
    let peer = io
        .peer()
        .map_or_else(|| "unknown".to_string(), |addr| addr.to_string());
    let span = info_span!(
        "connection",
        %peer,
        role = field::Empty,
        stream = field::Empty
    );

    async move {
        match drive(&mut io, &ctx).await {
            Ok(()) => debug!("connection closed"),
            Err(SessionError::Io(e)) => debug!("connection lost: {e}"),
            Err(e) => warn!("tearing down connection: {e}"),
        }
        let _ = io.shutdown().await;
    }
    .instrument(span)
    .await
}

async fn drive(io: &mut FramedStream, ctx: &SessionContext) -> SessionResult<()> {
    let Some(handshake) = io.read_frame().await? else {
        debug!("closed before handshake");
        return Ok(());
    };
    let session = Session::accept(handshake, ctx)?;

    let span = Span::current();
    span.record("role", session.role().as_str());
    span.record("stream", session.stream_id().as_str());

    session.run(io).await
}
