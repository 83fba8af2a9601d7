//! 注册握手
//!
//! 同一时刻最多只有一个插件处于"等待注册"状态。
//! 插件代码调用 `registerPlugin` 时，实例被交给当前等待中的加载；
//! 没有等待中的加载时，调用被视为孤儿注册并忽略。

use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;

use super::types::{RuntimeError, SharedInstance};

/// 握手结果
pub enum Registration {
    /// 插件调用了 registerPlugin
    Instance(SharedInstance),
    /// 插件代码已执行完毕但没有导出实例
    Empty,
}

struct PendingSlot {
    id: String,
    waiter: oneshot::Sender<Registration>,
}

pub struct Handshake {
    slot: Mutex<Option<PendingSlot>>,
    timeout: Duration,
}

impl Handshake {
    pub fn new(timeout: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            timeout,
        }
    }

    /// 占用等待槽；已有其他插件在等待时立即失败
    pub fn begin_load(&self, id: &str) -> Result<PendingLoad<'_>, RuntimeError> {
        let mut slot = self.slot.lock();
        if let Some(pending) = slot.as_ref() {
            return Err(RuntimeError::RegistrationBusy {
                pending: pending.id.clone(),
                requested: id.to_string(),
            });
        }

        let (waiter, rx) = oneshot::channel();
        *slot = Some(PendingSlot {
            id: id.to_string(),
            waiter,
        });

        Ok(PendingLoad {
            handshake: self,
            id: id.to_string(),
            rx,
        })
    }

    pub fn pending_id(&self) -> Option<String> {
        self.slot.lock().as_ref().map(|p| p.id.clone())
    }

    /// 把实例交给当前等待中的加载，返回其插件 ID
    pub fn register(&self, instance: SharedInstance) -> Result<String, RuntimeError> {
        let Some(pending) = self.slot.lock().take() else {
            return Err(RuntimeError::OrphanRegistration);
        };
        // 接收端已超时放弃时 send 会失败，此时注册同样作废
        if pending.waiter.send(Registration::Instance(instance)).is_err() {
            return Err(RuntimeError::OrphanRegistration);
        }
        Ok(pending.id)
    }

    /// 插件代码执行完毕但没有导出实例；仅当 ID 匹配当前等待者时生效
    pub fn report_empty(&self, id: &str) -> bool {
        let mut slot = self.slot.lock();
        if slot.as_ref().map(|p| p.id == id) != Some(true) {
            return false;
        }
        match slot.take() {
            Some(pending) => pending.waiter.send(Registration::Empty).is_ok(),
            None => false,
        }
    }

    fn release(&self, id: &str) {
        let mut slot = self.slot.lock();
        if slot.as_ref().map(|p| p.id == id) == Some(true) {
            *slot = None;
        }
    }
}

/// 一次进行中的握手；丢弃时释放等待槽
pub struct PendingLoad<'a> {
    handshake: &'a Handshake,
    id: String,
    rx: oneshot::Receiver<Registration>,
}

impl PendingLoad<'_> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 等待注册结果或超时
    pub async fn wait(mut self) -> Result<Registration, RuntimeError> {
        let timeout = self.handshake.timeout;
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(registration)) => Ok(registration),
            Ok(Err(_)) | Err(_) => Err(RuntimeError::RegistrationTimeout {
                plugin_id: self.id.clone(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

impl Drop for PendingLoad<'_> {
    fn drop(&mut self) {
        self.handshake.release(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::types::PluginInstance;
    use std::sync::Arc;

    struct Inert;
    impl PluginInstance for Inert {}

    #[test]
    fn test_register_without_pending_is_orphan() {
        let handshake = Handshake::new(Duration::from_millis(50));
        let result = handshake.register(Arc::new(Inert));
        assert_eq!(result.unwrap_err(), RuntimeError::OrphanRegistration);
    }

    #[test]
    fn test_second_begin_is_busy() {
        let handshake = Handshake::new(Duration::from_millis(50));
        let _first = handshake.begin_load("alpha").unwrap();
        let err = handshake.begin_load("beta").err().unwrap();
        assert_eq!(
            err,
            RuntimeError::RegistrationBusy {
                pending: "alpha".to_string(),
                requested: "beta".to_string(),
            }
        );
    }

    #[test]
    fn test_drop_releases_slot() {
        let handshake = Handshake::new(Duration::from_millis(50));
        {
            let _pending = handshake.begin_load("alpha").unwrap();
            assert_eq!(handshake.pending_id().as_deref(), Some("alpha"));
        }
        assert!(handshake.pending_id().is_none());
        assert!(handshake.begin_load("beta").is_ok());
    }

    #[test]
    fn test_report_empty_requires_matching_id() {
        let handshake = Handshake::new(Duration::from_millis(50));
        let _pending = handshake.begin_load("alpha").unwrap();
        assert!(!handshake.report_empty("beta"));
        assert!(handshake.report_empty("alpha"));
        assert!(handshake.pending_id().is_none());
    }

    #[tokio::test]
    async fn test_register_resolves_wait() {
        let handshake = Handshake::new(Duration::from_millis(500));
        let pending = handshake.begin_load("alpha").unwrap();
        assert_eq!(handshake.register(Arc::new(Inert)).unwrap(), "alpha");

        assert!(matches!(
            pending.wait().await,
            Ok(Registration::Instance(_))
        ));
        // 一次性：第二次注册是孤儿
        assert!(handshake.register(Arc::new(Inert)).is_err());
    }

    #[tokio::test]
    async fn test_wait_times_out_and_releases() {
        let handshake = Handshake::new(Duration::from_millis(20));
        let pending = handshake.begin_load("alpha").unwrap();

        let err = pending.wait().await.err().unwrap();
        assert!(matches!(err, RuntimeError::RegistrationTimeout { .. }));
        assert!(handshake.pending_id().is_none());
        assert_eq!(
            handshake.register(Arc::new(Inert)).unwrap_err(),
            RuntimeError::OrphanRegistration
        );
    }
}
