//! 单向执行队列
//!
//! 特权进程发往内容进程的"执行这段代码"请求按发送顺序投递；
//! 目标页面完成初始加载前先缓存，加载完成后一次性按序投递。

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::page::Page;

/// 代码接收端
pub trait CodeSink: Send + Sync {
    fn execute(&self, code: &str);
}

impl<P: Page + ?Sized> CodeSink for P {
    fn execute(&self, code: &str) {
        self.evaluate(code);
    }
}

struct QueueState {
    loaded: bool,
    pending: VecDeque<String>,
}

pub struct ExecQueue<S: CodeSink + ?Sized> {
    sink: Arc<S>,
    state: Mutex<QueueState>,
}

impl<S: CodeSink + ?Sized> ExecQueue<S> {
    pub fn new(sink: Arc<S>) -> Self {
        Self {
            sink,
            state: Mutex::new(QueueState {
                loaded: false,
                pending: VecDeque::new(),
            }),
        }
    }

    /// 发送代码；页面未加载完成时缓存，返回是否已立即投递
    pub fn send(&self, code: impl Into<String>) -> bool {
        let code = code.into();
        {
            let mut state = self.state.lock();
            if !state.loaded || !state.pending.is_empty() {
                state.pending.push_back(code);
                return false;
            }
        }
        self.sink.execute(&code);
        true
    }

    /// 标记页面已加载，按序投递缓存的代码，返回投递数量
    pub fn mark_loaded(&self) -> usize {
        let mut delivered = 0;
        loop {
            // 每次只取一条，投递时不持锁
            let next = {
                let mut state = self.state.lock();
                state.loaded = true;
                state.pending.pop_front()
            };
            match next {
                Some(code) => {
                    self.sink.execute(&code);
                    delivered += 1;
                }
                None => break,
            }
        }
        if delivered > 0 {
            tracing::debug!("[IPC] 页面加载完成，投递 {} 条缓存代码", delivered);
        }
        delivered
    }

    pub fn is_loaded(&self) -> bool {
        self.state.lock().loaded
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }
}
