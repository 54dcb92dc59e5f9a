use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use partisan_core::TaskDescriptor;

/// The one-way supervisor -> worker message, framed as a u32 big-endian length
/// prefix followed by a `serde_json`-encoded body. `Stop` is the sentinel that
/// replaces the source's `None` placed on the multiprocessing queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    Task(TaskDescriptor),
    Stop,
}

#[derive(Error, Debug)]
pub enum IpcError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(u32),
    #[error("could not decode frame: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Frames larger than this are refused - a sanity bound against a corrupted
/// length prefix turning a short read into an attempt to allocate gigabytes.
const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &Message,
) -> Result<(), IpcError> {
    let body = serde_json::to_vec(message)?;
    let len = u32::try_from(body.len()).map_err(|_| IpcError::FrameTooLarge(u32::MAX))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame, or `Ok(None)` on a clean EOF (the writer closed its end
/// without sending a `Stop` sentinel first).
pub async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Message>, IpcError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(IpcError::FrameTooLarge(len));
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    let message = serde_json::from_slice(&body)?;
    Ok(Some(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn round_trips_a_task_frame() {
        let mut buf = Vec::new();
        let message = Message::Task(TaskDescriptor {
            id: Uuid::now_v7(),
            processor_class: "Echo".to_string(),
            queue_name: "default".to_string(),
            arguments: json!({"args": ["hello"]}),
        });

        write_message(&mut buf, &message).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let decoded = read_message(&mut cursor).await.unwrap().unwrap();
        match decoded {
            Message::Task(desc) => assert_eq!(desc.processor_class, "Echo"),
            Message::Stop => panic!("expected a task frame"),
        }
    }

    #[tokio::test]
    async fn round_trips_the_stop_sentinel() {
        let mut buf = Vec::new();
        write_message(&mut buf, &Message::Stop).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let decoded = read_message(&mut cursor).await.unwrap().unwrap();
        assert!(matches!(decoded, Message::Stop));
    }

    #[tokio::test]
    async fn clean_eof_yields_none() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        assert!(read_message(&mut cursor).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_frame_is_refused() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_BYTES + 1).to_be_bytes());
        let mut cursor = std::io::Cursor::new(buf);
        assert!(matches!(
            read_message(&mut cursor).await,
            Err(IpcError::FrameTooLarge(_))
        ));
    }
}
