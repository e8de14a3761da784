use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::constants::MAX_FRAME_LENGTH;
use crate::core_rpc::error::RpcError;

/// A message-oriented channel over any byte stream.
///
/// Each message is one length-delimited frame holding a bincode payload.
pub struct Channel<T> {
    framed: Framed<T, LengthDelimitedCodec>,
}

impl<T> Channel<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: T) -> Self {
        let codec = LengthDelimitedCodec::builder()
            .max_frame_length(MAX_FRAME_LENGTH)
            .new_codec();
        Self {
            framed: Framed::new(io, codec),
        }
    }

    pub async fn send<M: Serialize>(&mut self, message: &M) -> Result<(), RpcError> {
        let payload = bincode::serialize(message).map_err(|e| RpcError::Encode(e.to_string()))?;
        self.framed.send(Bytes::from(payload)).await?;
        Ok(())
    }

    /// Receives the next frame, `None` on a clean end of stream.
    ///
    /// Decoding is left to the caller so that a malformed payload can be
    /// answered instead of tearing the connection down.
    pub async fn recv_frame(&mut self) -> Result<Option<Bytes>, RpcError> {
        match self.framed.next().await {
            Some(Ok(frame)) => Ok(Some(frame.freeze())),
            Some(Err(e)) => Err(RpcError::Io(e)),
            None => Ok(None),
        }
    }

    pub async fn recv<M: DeserializeOwned>(&mut self) -> Result<Option<M>, RpcError> {
        match self.recv_frame().await? {
            Some(frame) => decode(&frame).map(Some),
            None => Ok(None),
        }
    }
}

pub fn decode<M: DeserializeOwned>(frame: &[u8]) -> Result<M, RpcError> {
    bincode::deserialize(frame).map_err(|e| RpcError::Decode(e.to_string()))
}
