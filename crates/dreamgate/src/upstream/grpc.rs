use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

use dreamgate_protocol::interact_response::ResponseType;
use dreamgate_protocol::{Event, EventBusServiceClient, InteractRequest, InteractResponse};

use super::{ClientFrame, ServerFrame, UpstreamCall, UpstreamClient, UpstreamError};

/// Request frames buffered between the bridge and the HTTP/2 stream.
const OUTGOING_BUFFER: usize = 8;

/// Capability service client over a shared, lazily connected tonic channel.
///
/// Every call multiplexes onto the same HTTP/2 connection. The connection is
/// established on first use and re-established by tonic after failures.
#[derive(Debug, Clone)]
pub struct GrpcUpstream {
    address: String,
    client: EventBusServiceClient<Channel>,
}

impl GrpcUpstream {
    pub fn connect_lazy(address: impl Into<String>) -> Result<Self, UpstreamError> {
        let address = address.into();
        let endpoint =
            Endpoint::from_shared(address.clone()).map_err(|e| UpstreamError::InvalidAddress {
                address: address.clone(),
                reason: e.to_string(),
            })?;
        let channel = endpoint.connect_lazy();

        Ok(Self {
            address,
            client: EventBusServiceClient::new(channel),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl UpstreamClient for GrpcUpstream {
    async fn open(&self) -> Result<UpstreamCall, UpstreamError> {
        let (outgoing, rx) = mpsc::channel::<ClientFrame>(OUTGOING_BUFFER);
        let requests = ReceiverStream::new(rx).map(InteractRequest::from);

        let mut client = self.client.clone();
        let call = async move { client.interact_stream(requests).await };

        // The call is started on first poll so the caller can queue the config
        // frame before tonic waits for response headers.
        let incoming = stream::once(call)
            .flat_map(|result| match result {
                Ok(response) => response
                    .into_inner()
                    .map(|message| {
                        message
                            .map_err(UpstreamError::from)
                            .and_then(ServerFrame::try_from)
                    })
                    .boxed(),
                Err(status) => stream::iter([Err(UpstreamError::from(status))]).boxed(),
            })
            .boxed();

        debug!(address = %self.address, "Opened upstream interaction call");
        Ok(UpstreamCall { outgoing, incoming })
    }

    async fn publish(&self, event: Event) -> Result<(), UpstreamError> {
        let mut client = self.client.clone();
        client.publish(event).await?;
        Ok(())
    }
}

// ============================================================================
// Wire Conversions
// ============================================================================

impl From<ClientFrame> for InteractRequest {
    fn from(frame: ClientFrame) -> Self {
        match frame {
            ClientFrame::Config {
                event_type,
                attributes,
            } => InteractRequest::config(event_type, attributes),
            ClientFrame::Data(content) => InteractRequest::data(content.to_vec()),
            ClientFrame::ClientEnd => InteractRequest::client_end(),
        }
    }
}

impl TryFrom<InteractResponse> for ServerFrame {
    type Error = UpstreamError;

    fn try_from(response: InteractResponse) -> Result<Self, UpstreamError> {
        match response.response_type {
            Some(ResponseType::Ready(ready)) => Ok(ServerFrame::Ready {
                stream_id: ready.stream_id,
            }),
            Some(ResponseType::Data(data)) => Ok(ServerFrame::Data(Bytes::from(data.content))),
            Some(ResponseType::ServerEnd(_)) => Ok(ServerFrame::ServerEnd),
            Some(ResponseType::Error(error)) => Ok(ServerFrame::Error {
                code: error.code,
                message: error.message,
            }),
            None => Err(UpstreamError::EmptyResponse),
        }
    }
}
