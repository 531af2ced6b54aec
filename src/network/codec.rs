use std::io;

use async_trait::async_trait;
use futures::prelude::*;
use libp2p::StreamProtocol;
use libp2p::request_response;

pub const CHAT_PROTOCOL: StreamProtocol = StreamProtocol::new("/p2p-room-chat/1.0.0");

/// Upper bound for one encoded record.
pub const MAX_FRAME_BYTES: u64 = 64 * 1024;

/// Carries exactly one encoded record per request substream.
///
/// The substream end delimits the frame, so the receiver always sees whole
/// records. Responses are empty and only tell the sender the frame was read.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec;

#[async_trait]
impl request_response::Codec for FrameCodec {
    type Protocol = StreamProtocol;
    type Request = Vec<u8>;
    type Response = ();

    async fn read_request<T>(&mut self, _: &Self::Protocol, io: &mut T) -> io::Result<Vec<u8>>
    where
        T: AsyncRead + Unpin + Send,
    {
        read_frame(io).await
    }

    async fn read_response<T>(&mut self, _: &Self::Protocol, io: &mut T) -> io::Result<()>
    where
        T: AsyncRead + Unpin + Send,
    {
        let mut sink = Vec::new();
        io.take(MAX_FRAME_BYTES).read_to_end(&mut sink).await?;
        Ok(())
    }

    async fn write_request<T>(
        &mut self,
        _: &Self::Protocol,
        io: &mut T,
        frame: Vec<u8>,
    ) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        if frame.len() as u64 > MAX_FRAME_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("frame of {} bytes exceeds {MAX_FRAME_BYTES}", frame.len()),
            ));
        }
        io.write_all(&frame).await?;
        io.flush().await
    }

    async fn write_response<T>(&mut self, _: &Self::Protocol, _io: &mut T, _: ()) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        Ok(())
    }
}

async fn read_frame<T>(io: &mut T) -> io::Result<Vec<u8>>
where
    T: AsyncRead + Unpin + Send,
{
    let mut frame = Vec::new();
    // Read one byte past the limit to tell "exactly at limit" from "too large".
    io.take(MAX_FRAME_BYTES + 1).read_to_end(&mut frame).await?;
    if frame.len() as u64 > MAX_FRAME_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("inbound frame exceeds {MAX_FRAME_BYTES} bytes"),
        ));
    }
    Ok(frame)
}
