use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};

use crate::connection::codec::Codec;
use crate::consts::READ_BUFFER_CAPACITY;
use crate::error::ConnectionError;

/// 连接的读端：从字节流中按编解码器的分帧规则逐个读出应答。
///
/// 为了读取帧，`FrameReader` 使用内部缓冲区，直到有足够的字节构成一个完整的帧。
#[derive(Debug)]
pub struct FrameReader<R, C> {
    stream: R,
    codec: C,
    /// 读取帧的缓冲区
    buffer: BytesMut,
}

impl<R, C> FrameReader<R, C>
where
    R: AsyncRead + Unpin,
    C: Codec,
{
    pub fn new(stream: R, codec: C) -> FrameReader<R, C> {
        FrameReader {
            stream,
            codec,
            buffer: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
        }
    }

    /// 读取一个应答。
    ///
    /// 对端在帧边界处关闭连接时返回 `None`，在帧中途关闭则返回 `Disconnect`。
    pub async fn read_frame(&mut self) -> Result<Option<C::Response>, ConnectionError> {
        loop {
            if let Some(frame) = self.codec.decode(&mut self.buffer)? {
                return Ok(Some(frame));
            }

            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                return if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(ConnectionError::Disconnect)
                };
            }
        }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }
}

/// 连接的写端。
///
/// 请求先被编码到内存中，然后写入被 `BufWriter` 装饰的流并立即刷新。
#[derive(Debug)]
pub struct FrameWriter<W, C> {
    stream: BufWriter<W>,
    codec: C,
}

impl<W, C> FrameWriter<W, C>
where
    W: AsyncWrite + Unpin,
    C: Codec,
{
    pub fn new(stream: W, codec: C) -> FrameWriter<W, C> {
        FrameWriter {
            stream: BufWriter::new(stream),
            codec,
        }
    }

    /// 编码一个请求，不涉及 I/O。
    pub fn encode(&mut self, request: &C::Request) -> Result<Bytes, ConnectionError> {
        let mut dst = BytesMut::new();
        self.codec.encode(request, &mut dst)?;
        Ok(dst.freeze())
    }

    /// 写入已编码的字节并刷新。
    pub async fn write_encoded(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await.map_err(|e| e.into())
    }

    pub async fn write_frame(&mut self, request: &C::Request) -> Result<(), ConnectionError> {
        let bytes = self.encode(request)?;
        self.write_encoded(&bytes).await
    }

    /// 关闭写端。
    pub async fn shutdown(&mut self) -> Result<(), ConnectionError> {
        self.stream.shutdown().await.map_err(|e| e.into())
    }
}
