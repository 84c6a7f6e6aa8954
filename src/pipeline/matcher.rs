use std::sync::Arc;

use log::{debug, error};
use tokio::io::AsyncRead;
use tokio::sync::mpsc;

use crate::connection::codec::Codec;
use crate::connection::connect::FrameReader;
use crate::error::{ConnectionError, PipelineError};
use crate::pipeline::context::CallContext;
use crate::pipeline::shutdown::{Lifecycle, Shutdown};

/// 应答匹配任务。
///
/// 按写任务交付的顺序消费调用上下文，每个上下文恰好读取一个应答，
/// 保证线路上的第 N 个应答属于第 N 个请求。
pub(crate) struct Matcher<R, C: Codec> {
    reader: FrameReader<R, C>,
    inbound: mpsc::Receiver<CallContext<C::Response>>,
    lifecycle: Arc<Lifecycle>,
    shutdown: Shutdown,
}

impl<R, C> Matcher<R, C>
where
    R: AsyncRead + Unpin,
    C: Codec,
{
    pub(crate) fn new(
        reader: FrameReader<R, C>,
        inbound: mpsc::Receiver<CallContext<C::Response>>,
        lifecycle: Arc<Lifecycle>,
    ) -> Matcher<R, C> {
        let shutdown = lifecycle.subscribe();
        Matcher {
            reader,
            inbound,
            lifecycle,
            shutdown,
        }
    }

    /// 通道关闭后返回，读端随之被丢弃。
    pub(crate) async fn run(mut self) {
        while let Some(ctx) = self.inbound.recv().await {
            // 连接已经终止，不再读取
            if let Some(cause) = self.shutdown.terminal() {
                ctx.fail(cause).join().await;
                continue;
            }

            let result = tokio::select! {
                biased;
                cause = self.shutdown.terminated() => Err(cause),
                res = self.reader.read_frame() => self.on_reply(res),
            };

            // 等写任务处理完这个请求，再处理下一个
            ctx.complete(result).join().await;
        }

        debug!("completion matcher stopped");
    }

    fn on_reply(
        &self,
        res: Result<Option<C::Response>, ConnectionError>,
    ) -> Result<C::Response, PipelineError> {
        match res {
            Ok(Some(frame)) => {
                debug!("read response: {:?}", frame);
                self.reader.codec().check_reply(frame)
            }
            Ok(None) => Err(self.fatal(PipelineError::Disconnect)),
            // 无法确认解码失败时消耗的字节范围，后续应答可能错位，按连接故障处理
            Err(e) => Err(self.fatal(PipelineError::read(e))),
        }
    }

    fn fatal(&self, cause: PipelineError) -> PipelineError {
        error!("connection failed while reading reply: {}", cause);
        self.lifecycle.terminate(cause)
    }
}
