use std::fmt::Debug;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::PipelineError;
use crate::pipeline::request::Request;
use crate::pipeline::shutdown::Lifecycle;

/// 创建有界请求队列，容量即管线深度。
pub(crate) fn channel<Q, P>(
    capacity: usize,
    lifecycle: Arc<Lifecycle>,
) -> (RequestSender<Q, P>, RequestReceiver<Q, P>) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        RequestSender {
            tx,
            lifecycle: lifecycle.clone(),
        },
        RequestReceiver { rx, lifecycle },
    )
}

/// 请求队列的提交端，可以被多个调用方克隆持有。
#[derive(Debug)]
pub(crate) struct RequestSender<Q, P> {
    tx: mpsc::Sender<Request<Q, P>>,
    lifecycle: Arc<Lifecycle>,
}

impl<Q, P> Clone for RequestSender<Q, P> {
    fn clone(&self) -> Self {
        RequestSender {
            tx: self.tx.clone(),
            lifecycle: self.lifecycle.clone(),
        }
    }
}

impl<Q: Debug, P> RequestSender<Q, P> {
    /// 提交请求，队列满时挂起。
    ///
    /// 队列已关闭时请求以关闭原因失败，同样的错误也会返回给调用方。
    pub(crate) async fn submit(&self, request: Request<Q, P>) -> Result<(), PipelineError> {
        if !self.lifecycle.is_open() {
            let cause = self.refusal();
            request.fail(cause.clone());
            return Err(cause);
        }

        match self.tx.send(request).await {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendError(request)) => {
                let cause = self.refusal();
                request.fail(cause.clone());
                Err(cause)
            }
        }
    }

    fn refusal(&self) -> PipelineError {
        self.lifecycle.terminal().unwrap_or(PipelineError::Closed)
    }
}

/// 请求队列的消费端，只由写任务持有。
#[derive(Debug)]
pub(crate) struct RequestReceiver<Q, P> {
    rx: mpsc::Receiver<Request<Q, P>>,
    lifecycle: Arc<Lifecycle>,
}

impl<Q: Debug, P> RequestReceiver<Q, P> {
    /// 按提交顺序取出下一个请求，队列关闭且取空后返回 `None`。
    pub(crate) async fn recv(&mut self) -> Option<Request<Q, P>> {
        self.rx.recv().await
    }

    /// 正常关闭：拒绝新的提交，已入队的请求仍然可以取出。
    pub(crate) fn close(&mut self) {
        self.rx.close();
    }

    /// 带错误关闭：拒绝新的提交，并让所有尚未取出的请求以 `cause` 失败。
    pub(crate) async fn close_with_failure(&mut self, cause: PipelineError) {
        let cause = self.lifecycle.terminate(cause);
        self.rx.close();
        while let Some(request) = self.rx.recv().await {
            request.fail(cause.clone());
        }
    }
}
