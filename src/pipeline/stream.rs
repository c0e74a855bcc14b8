//! RunStream：一次运行的惰性事件序列
//!
//! 有限、不可重启：读到 Terminal 事件后流即结束。提前丢弃 RunStream 会取消这次运行。

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::pipeline::progress::{PipelineEvent, TerminalResult};

pub struct RunStream {
    run_id: String,
    rx: mpsc::UnboundedReceiver<PipelineEvent>,
    cancel: CancellationToken,
    finished: bool,
}

impl RunStream {
    pub(crate) fn new(
        run_id: String,
        rx: mpsc::UnboundedReceiver<PipelineEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            run_id,
            rx,
            cancel,
            finished: false,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// 请求取消：在下一个阶段边界生效，已派发的搜索会跑完
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// 丢弃进度，只等最终结果；运行异常退出（没有 Terminal）时返回 None
    pub async fn into_result(mut self) -> Option<TerminalResult> {
        while let Some(event) = self.next().await {
            if let PipelineEvent::Terminal(result) = event {
                return Some(result);
            }
        }
        None
    }
}

impl Stream for RunStream {
    type Item = PipelineEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    this.finished = true;
                    this.rx.close();
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for RunStream {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(run_id = %self.run_id, "run stream dropped early, cancelling");
            self.cancel.cancel();
        }
    }
}
