use tokio::sync::watch;

use crate::error::PipelineError;

/// 管线的生命周期状态。
#[derive(Clone, Debug)]
pub(crate) enum State {
    Open,
    /// 请求了正常关闭：不再接受新请求，已入队的请求照常处理
    Closing,
    /// 终止状态，之后的所有请求都以该错误失败
    Terminated(PipelineError),
}

impl State {
    fn is_terminated(&self) -> bool {
        matches!(self, State::Terminated(_))
    }
}

/// 共享的生命周期状态，由句柄、写任务、匹配任务共同持有。
#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: watch::Sender<State>,
}

impl Lifecycle {
    pub(crate) fn new() -> Lifecycle {
        let (state, _) = watch::channel(State::Open);
        Lifecycle { state }
    }

    /// 请求正常关闭，已终止时无效果。
    pub(crate) fn close(&self) {
        self.state.send_if_modified(|state| match state {
            State::Open => {
                *state = State::Closing;
                true
            }
            _ => false,
        });
    }

    /// 进入终止状态并返回最终生效的错误：只有第一次终止会被记录。
    pub(crate) fn terminate(&self, cause: PipelineError) -> PipelineError {
        self.state.send_if_modified(|state| {
            if state.is_terminated() {
                false
            } else {
                *state = State::Terminated(cause);
                true
            }
        });
        self.terminal().unwrap_or(PipelineError::Closed)
    }

    pub(crate) fn terminal(&self) -> Option<PipelineError> {
        match &*self.state.borrow() {
            State::Terminated(cause) => Some(cause.clone()),
            _ => None,
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        matches!(&*self.state.borrow(), State::Open)
    }

    pub(crate) fn subscribe(&self) -> Shutdown {
        Shutdown {
            notify: self.state.subscribe(),
        }
    }
}

/// 监听生命周期变化。
///
/// 写任务和匹配任务在每个挂起点上同时等待它，以便取消或故障发生时及时退出。
#[derive(Debug, Clone)]
pub(crate) struct Shutdown {
    notify: watch::Receiver<State>,
}

impl Shutdown {
    pub(crate) fn terminal(&self) -> Option<PipelineError> {
        match &*self.notify.borrow() {
            State::Terminated(cause) => Some(cause.clone()),
            _ => None,
        }
    }

    /// 等待管线进入终止状态。
    pub(crate) async fn terminated(&mut self) -> PipelineError {
        match self.notify.wait_for(State::is_terminated).await {
            Ok(state) => match &*state {
                State::Terminated(cause) => cause.clone(),
                _ => PipelineError::Cancelled,
            },
            // 发送端全部丢弃，管线已经不存在了
            Err(_) => PipelineError::Cancelled,
        }
    }

    /// 等待正常关闭请求（或终止）。
    pub(crate) async fn closing(&mut self) {
        let _ = self
            .notify
            .wait_for(|state| !matches!(state, State::Open))
            .await;
    }
}
