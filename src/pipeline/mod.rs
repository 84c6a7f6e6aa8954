//! 单连接请求管线。
//!
//! 调用方并发地提交请求，管线保证：
//!
//! * 请求按提交顺序写出；
//! * 应答按同样的顺序匹配给等待者；
//! * 任何环节（启动、写、读、解码）的故障都会投递到所有在途和之后的请求；
//! * 关闭时在途请求要么完成，要么确定地失败。
//!
//! 每个连接有两个后台任务：写任务（`Engine`）独占写端，
//! 匹配任务（`Matcher`）独占读端。调用方只接触请求队列和自己的结果槽。

use std::fmt::Debug;
use std::sync::Arc;

use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::connection::codec::Codec;
use crate::connection::connect::{FrameReader, FrameWriter};
use crate::error::{PipelineError, RequestFailure};
use crate::pipeline::engine::Engine;
use crate::pipeline::queue::RequestSender;
use crate::pipeline::shutdown::Lifecycle;

mod context;
mod engine;
mod matcher;
mod queue;
pub mod request;
mod shutdown;

pub use request::{Request, ResponseFuture};

/// 管线句柄。可以克隆，所有克隆共享同一个连接。
pub struct Pipeline<C: Codec> {
    sender: RequestSender<C::Request, C::Response>,
    lifecycle: Arc<Lifecycle>,
}

impl<C: Codec> Clone for Pipeline<C> {
    fn clone(&self) -> Self {
        Pipeline {
            sender: self.sender.clone(),
            lifecycle: self.lifecycle.clone(),
        }
    }
}

impl<C: Codec> Debug for Pipeline<C> {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("Pipeline")
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

/// 在一个双工字节流上启动管线。
///
/// `bootstrap` 中的请求在接受任何排队请求之前依次同步执行；
/// `pipeline_size` 是请求队列和在途匹配队列的容量，小于 1 时按 1 处理。
pub fn spawn<S, C>(stream: S, codec: C, bootstrap: Vec<C::Request>, pipeline_size: usize) -> Pipeline<C>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    C: Codec,
{
    let (read_half, write_half) = tokio::io::split(stream);
    spawn_split(read_half, write_half, codec, bootstrap, pipeline_size)
}

/// 与 `spawn` 相同，但读写两端分别给出。
pub fn spawn_split<R, W, C>(
    reader: R,
    writer: W,
    codec: C,
    bootstrap: Vec<C::Request>,
    pipeline_size: usize,
) -> Pipeline<C>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
    C: Codec,
{
    let pipeline_size = pipeline_size.max(1);
    let lifecycle = Arc::new(Lifecycle::new());
    let (sender, receiver) = queue::channel(pipeline_size, lifecycle.clone());

    let engine = Engine {
        reader: FrameReader::new(reader, codec.clone()),
        writer: FrameWriter::new(writer, codec),
        queue: receiver,
        bootstrap,
        pipeline_size,
        shutdown: lifecycle.subscribe(),
        close_signal: lifecycle.subscribe(),
        lifecycle: lifecycle.clone(),
    };
    tokio::spawn(engine.run());

    Pipeline { sender, lifecycle }
}

impl<C: Codec> Pipeline<C> {
    /// 提交请求，队列满时挂起；返回等待应答的 future。
    ///
    /// 管线已关闭或失败时返回 `Err`。
    pub async fn submit(&self, payload: C::Request) -> Result<ResponseFuture<C::Response>, RequestFailure> {
        let description = format!("{:?}", payload);
        self.submit_described(payload, description).await
    }

    pub(crate) async fn submit_described(
        &self,
        payload: C::Request,
        description: String,
    ) -> Result<ResponseFuture<C::Response>, RequestFailure> {
        let (request, response) = Request::new(payload, description.clone());
        match self.sender.submit(request).await {
            Ok(()) => Ok(response),
            Err(cause) => Err(RequestFailure::new(description, cause)),
        }
    }

    /// 提交并等待应答。
    pub async fn execute(&self, payload: C::Request) -> Result<C::Response, RequestFailure> {
        self.submit(payload).await?.await
    }

    /// 写出请求但不等待应答。
    ///
    /// 只能用于服务端不会产生应答的请求，否则之后的应答会错位。
    pub async fn send_detached(&self, payload: C::Request) -> Result<(), PipelineError> {
        self.sender.submit(Request::detached(payload)).await
    }

    /// 正常关闭：不再接受新请求，已提交的请求照常完成后关闭连接。
    pub fn shutdown(&self) {
        debug!("pipeline shutdown requested");
        self.lifecycle.close();
    }

    /// 取消管线：未完成的请求全部以 `Cancelled` 失败，连接随即关闭。
    pub fn close(&self) {
        debug!("pipeline cancelled");
        self.lifecycle.terminate(PipelineError::Cancelled);
    }

    /// 管线是否已经终止
    pub fn is_closed(&self) -> bool {
        self.lifecycle.terminal().is_some()
    }

    /// 等待管线终止，返回终止原因。正常关闭时为 `Closed`。
    pub async fn closed(&self) -> PipelineError {
        self.lifecycle.subscribe().terminated().await
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::connection::codec::RedisCodec;
    use crate::connection::frame::Frame;

    fn assert_send<T: Send>(_: &T) {}

    /// 写任务会被 `tokio::spawn`，包括启动阶段在内都必须是 `Send`
    #[tokio::test]
    async fn engine_task_is_send() {
        let (client, _server) = tokio::io::duplex(64);
        let (reader, writer) = tokio::io::split(client);
        let codec = RedisCodec::default();
        let lifecycle = Arc::new(Lifecycle::new());
        let (_sender, receiver) = queue::channel(1, lifecycle.clone());

        let engine = Engine {
            reader: FrameReader::new(reader, codec),
            writer: FrameWriter::new(writer, codec),
            queue: receiver,
            bootstrap: vec![Frame::command(vec![Bytes::from_static(b"PING")])],
            pipeline_size: 1,
            shutdown: lifecycle.subscribe(),
            close_signal: lifecycle.subscribe(),
            lifecycle,
        };
        let run = engine.run();
        assert_send(&run);
    }
}
