use tokio::sync::{oneshot, OwnedSemaphorePermit};

use crate::error::PipelineError;
use crate::pipeline::request::Responder;

/// 单个在途请求的调用上下文。
///
/// 写任务在把请求写出之前将它交给应答匹配任务；匹配任务在解析出应答、
/// 填好结果槽之后，要等写任务处理完同一个请求（`WriteGuard` 被丢弃）
/// 才能处理下一个上下文。上下文存活期间占用一个在途名额。
#[derive(Debug)]
pub(crate) struct CallContext<P> {
    slot: Responder<P>,
    handled: oneshot::Receiver<()>,
    ticket: OwnedSemaphorePermit,
}

/// 写任务持有的守卫，丢弃即表示该请求已处理完毕。
#[derive(Debug)]
pub(crate) struct WriteGuard {
    _handled: oneshot::Sender<()>,
}

impl<P> CallContext<P> {
    pub(crate) fn new(slot: Responder<P>, ticket: OwnedSemaphorePermit) -> (CallContext<P>, WriteGuard) {
        let (tx, rx) = oneshot::channel();
        (
            CallContext {
                slot,
                handled: rx,
                ticket,
            },
            WriteGuard { _handled: tx },
        )
    }

    /// 填写结果槽，返回需要等待的完成信号。
    pub(crate) fn complete(self, result: Result<P, PipelineError>) -> Completion {
        self.slot.complete(result);
        Completion {
            handled: self.handled,
            _ticket: self.ticket,
        }
    }

    pub(crate) fn fail(self, cause: PipelineError) -> Completion {
        self.complete(Err(cause))
    }
}

/// 已经填好结果的上下文，等待写任务释放。
#[must_use]
pub(crate) struct Completion {
    handled: oneshot::Receiver<()>,
    // join 结束后才释放在途名额
    _ticket: OwnedSemaphorePermit,
}

impl Completion {
    pub(crate) async fn join(self) {
        // 守卫只会被丢弃，不会发送值
        let _ = self.handled.await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::Semaphore;
    use tokio::time;

    use super::*;
    use crate::pipeline::request::slot;

    #[tokio::test]
    async fn join_waits_for_the_writer() {
        let (responder, response) = slot::<u32>("PING");
        let in_flight = Arc::new(Semaphore::new(1));
        let ticket = in_flight.clone().try_acquire_owned().unwrap();
        let (ctx, guard) = CallContext::new(responder, ticket);

        let completion = ctx.complete(Ok(7));
        assert_eq!(7, response.await.unwrap());

        let joined = tokio::spawn(completion.join());
        time::sleep(Duration::from_millis(20)).await;
        assert!(!joined.is_finished());

        // 写任务释放之前名额一直被占用
        assert_eq!(0, in_flight.available_permits());

        drop(guard);
        joined.await.unwrap();
        assert_eq!(1, in_flight.available_permits());
    }
}
