use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::{PipelineError, RequestFailure};

/// 提交给管线的请求。
///
/// 没有结果槽的请求不等待应答，只适用于服务端不会产生应答的命令。
#[derive(Debug)]
pub struct Request<Q, P> {
    pub(crate) payload: Q,
    pub(crate) slot: Option<Responder<P>>,
}

impl<Q, P> Request<Q, P> {
    /// 创建请求以及调用方等待结果用的 future。
    pub fn new(payload: Q, description: impl Into<String>) -> (Request<Q, P>, ResponseFuture<P>) {
        let (responder, response) = slot(description);
        (
            Request {
                payload,
                slot: Some(responder),
            },
            response,
        )
    }

    pub fn detached(payload: Q) -> Request<Q, P> {
        Request {
            payload,
            slot: None,
        }
    }

    /// 让请求以 `cause` 失败，没有结果槽时只能记录日志。
    pub(crate) fn fail(self, cause: PipelineError)
    where
        Q: std::fmt::Debug,
    {
        match self.slot {
            Some(slot) => slot.fail(cause),
            None => log::warn!("detached request {:?} dropped: {}", self.payload, cause),
        }
    }
}

/// 结果槽的写端。
///
/// `complete` 和 `fail` 都会消耗自身，所以每个槽最多被赋值一次。
/// 写端在赋值前被丢弃时，读端得到 `PipelineError::Cancelled`。
#[derive(Debug)]
pub struct Responder<P> {
    tx: oneshot::Sender<Result<P, PipelineError>>,
}

impl<P> Responder<P> {
    pub fn complete(self, result: Result<P, PipelineError>) {
        // 调用方已经不再等待时忽略
        let _ = self.tx.send(result);
    }

    pub fn fail(self, cause: PipelineError) {
        self.complete(Err(cause))
    }
}

/// 结果槽的读端。
#[derive(Debug)]
pub struct ResponseFuture<P> {
    description: String,
    rx: oneshot::Receiver<Result<P, PipelineError>>,
}

impl<P> Future for ResponseFuture<P> {
    type Output = Result<P, RequestFailure>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let result = match Pin::new(&mut self.rx).poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Ok(result)) => result,
            Poll::Ready(Err(_)) => Err(PipelineError::Cancelled),
        };

        Poll::Ready(result.map_err(|cause| {
            RequestFailure::new(std::mem::take(&mut self.description), cause)
        }))
    }
}

/// 创建一个结果槽。
pub fn slot<P>(description: impl Into<String>) -> (Responder<P>, ResponseFuture<P>) {
    let (tx, rx) = oneshot::channel();
    (
        Responder { tx },
        ResponseFuture {
            description: description.into(),
            rx,
        },
    )
}
