use std::sync::Arc;

use log::{debug, error, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Semaphore};

use crate::connection::codec::Codec;
use crate::connection::connect::{FrameReader, FrameWriter};
use crate::error::PipelineError;
use crate::pipeline::context::CallContext;
use crate::pipeline::matcher::Matcher;
use crate::pipeline::queue::RequestReceiver;
use crate::pipeline::request::Request;
use crate::pipeline::shutdown::{Lifecycle, Shutdown};

type Inbound<C> = mpsc::Sender<CallContext<<C as Codec>::Response>>;

/// 管线的写任务。
///
/// 先完成一次性的启动交换（认证等），然后按提交顺序取出请求：
/// 把调用上下文交给应答匹配任务，再写出请求并立即刷新。
pub(crate) struct Engine<R, W, C: Codec> {
    pub(crate) reader: FrameReader<R, C>,
    pub(crate) writer: FrameWriter<W, C>,
    pub(crate) queue: RequestReceiver<C::Request, C::Response>,
    pub(crate) bootstrap: Vec<C::Request>,
    pub(crate) pipeline_size: usize,
    pub(crate) lifecycle: Arc<Lifecycle>,
    /// 监听取消和故障
    pub(crate) shutdown: Shutdown,
    /// 监听正常关闭请求
    pub(crate) close_signal: Shutdown,
}

impl<R, W, C> Engine<R, W, C>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
    C: Codec,
{
    pub(crate) async fn run(self) {
        let Engine {
            mut reader,
            mut writer,
            queue,
            bootstrap,
            pipeline_size,
            lifecycle,
            mut shutdown,
            close_signal,
        } = self;

        let setup = tokio::select! {
            biased;
            cause = shutdown.terminated() => Err(cause),
            res = setup(&mut writer, &mut reader, bootstrap) => {
                res.map_err(|cause| PipelineError::Setup(Arc::new(cause)))
            }
        };

        let mut steady = Steady {
            writer,
            queue,
            lifecycle,
            shutdown,
            close_signal,
            in_flight: Arc::new(Semaphore::new(pipeline_size)),
        };

        if let Err(cause) = setup {
            error!("pipeline setup failed: {}", cause);
            // 启动失败时除了启动请求之外不写出任何字节
            steady.queue.close_with_failure(cause).await;
            return;
        }
        debug!("pipeline started, depth {}", pipeline_size);

        let (inbound_tx, inbound_rx) = mpsc::channel(pipeline_size);
        let matcher = Matcher::new(reader, inbound_rx, steady.lifecycle.clone());
        let matcher = tokio::spawn(matcher.run());

        let outcome = steady.run(&inbound_tx).await;
        drop(inbound_tx);

        match outcome {
            Ok(()) => {
                // 等待在途请求的应答全部读完再关闭写端
                if let Err(e) = matcher.await {
                    error!("completion matcher failed: {}", e);
                }
                if let Err(e) = steady.writer.shutdown().await {
                    debug!("failed to shut down write half: {}", e);
                }
                steady.lifecycle.terminate(PipelineError::Closed);
                debug!("pipeline closed");
            }
            Err(cause) => {
                let cause = steady.lifecycle.terminate(cause);
                debug!("pipeline terminated: {}", cause);
                steady.queue.close_with_failure(cause).await;
                if let Err(e) = matcher.await {
                    error!("completion matcher failed: {}", e);
                }
            }
        }
    }
}

/// 启动交换：每个请求同步地写出并读取唯一的应答。
async fn setup<R, W, C>(
    writer: &mut FrameWriter<W, C>,
    reader: &mut FrameReader<R, C>,
    bootstrap: Vec<C::Request>,
) -> Result<(), PipelineError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    C: Codec,
{
    for request in bootstrap {
        // 启动请求可能带有凭据，不记录内容
        let bytes = writer.encode(&request).map_err(PipelineError::write)?;
        writer
            .write_encoded(&bytes)
            .await
            .map_err(PipelineError::write)?;

        let reply = reader
            .read_frame()
            .await
            .map_err(PipelineError::read)?
            .ok_or(PipelineError::Disconnect)?;
        reader.codec().check_reply(reply)?;
    }
    Ok(())
}

struct Steady<W, C: Codec> {
    writer: FrameWriter<W, C>,
    queue: RequestReceiver<C::Request, C::Response>,
    lifecycle: Arc<Lifecycle>,
    shutdown: Shutdown,
    close_signal: Shutdown,
    /// 已写出、尚未读到应答的请求数上限
    in_flight: Arc<Semaphore>,
}

impl<W, C> Steady<W, C>
where
    W: AsyncWrite + Unpin,
    C: Codec,
{
    /// 请求队列取空后返回 `Ok`，取消或故障时返回终止原因。
    async fn run(&mut self, inbound: &Inbound<C>) -> Result<(), PipelineError> {
        let mut closing = false;

        loop {
            let request = tokio::select! {
                biased;
                cause = self.shutdown.terminated() => return Err(cause),
                _ = self.close_signal.closing(), if !closing => {
                    debug!("request queue closed, draining");
                    closing = true;
                    self.queue.close();
                    continue;
                }
                request = self.queue.recv() => match request {
                    Some(request) => request,
                    None => return Ok(()),
                },
            };

            self.dispatch(request, inbound).await?;
        }
    }

    async fn dispatch(
        &mut self,
        request: Request<C::Request, C::Response>,
        inbound: &Inbound<C>,
    ) -> Result<(), PipelineError> {
        let Request { payload, slot } = request;

        // 编码失败只影响这一个请求，此时还没有写出任何字节
        let bytes = match self.writer.encode(&payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                let cause = PipelineError::write(e);
                warn!("failed to encode request {:?}: {}", payload, cause);
                if let Some(slot) = slot {
                    slot.fail(cause);
                }
                return Ok(());
            }
        };

        // 先把上下文交给匹配任务，再写出请求
        let guard = match slot {
            Some(slot) => {
                // 在途请求达到管线深度时，等匹配任务处理完最早的一个
                let in_flight = self.in_flight.clone();
                let ticket = tokio::select! {
                    biased;
                    cause = self.shutdown.terminated() => {
                        slot.fail(cause.clone());
                        return Err(cause);
                    }
                    ticket = in_flight.acquire_owned() => ticket.ok(),
                };

                let reserved = match ticket {
                    Some(ticket) => tokio::select! {
                        biased;
                        cause = self.shutdown.terminated() => {
                            slot.fail(cause.clone());
                            return Err(cause);
                        }
                        permit = inbound.reserve() => permit.ok().map(|permit| (permit, ticket)),
                    },
                    None => None,
                };

                match reserved {
                    Some((permit, ticket)) => {
                        let (ctx, guard) = CallContext::new(slot, ticket);
                        permit.send(ctx);
                        Some(guard)
                    }
                    None => {
                        let cause = self.lifecycle.terminal().unwrap_or(PipelineError::Cancelled);
                        slot.fail(cause.clone());
                        return Err(cause);
                    }
                }
            }
            None => None,
        };

        debug!("write request: {:?}", payload);

        let written = tokio::select! {
            biased;
            cause = self.shutdown.terminated() => Err(cause),
            res = self.writer.write_encoded(&bytes) => res.map_err(PipelineError::write),
        };

        if let Err(cause) = written {
            // 有结果槽的请求已经在匹配任务手里，由它以终止原因失败
            if guard.is_none() {
                warn!("detached request {:?} failed: {}", payload, cause);
            }
            return Err(cause);
        }

        drop(guard);
        Ok(())
    }
}
