//! 进度上报 - 业务能力层
//!
//! 只负责"把进度发出去"，不关心流程。
//! 仪表盘收不收得到不影响批次执行：投递失败只记日志，永远不上抛。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::models::ProgressEvent;

/// 进度接收端
///
/// 批次只管往里 emit，事件单向流出，不读回。
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);

    /// 侧信道状态通知（倒计时、标签页被关等，带自由文本）
    fn notify_status(&self, username: &str, status: &str, message: &str);
}

/// 只打日志的接收端
pub struct LogProgressSink;

impl ProgressSink for LogProgressSink {
    fn emit(&self, event: ProgressEvent) {
        info!("📈 进度 {}/{}: {}", event.current, event.total, event.label);
    }

    fn notify_status(&self, username: &str, status: &str, message: &str) {
        info!("📮 [{}] {} - {}", username, status, message);
    }
}

/// HTTP 接收端：POST 到仪表盘
pub struct HttpProgressSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpProgressSink {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

impl ProgressSink for HttpProgressSink {
    fn emit(&self, event: ProgressEvent) {
        info!("📈 进度 {}/{}: {}", event.current, event.total, event.label);

        let client = self.client.clone();
        let url = format!("{}/api/automation/progress", self.endpoint);
        // 发后不理，失败只打日志
        tokio::spawn(async move {
            if let Err(e) = client.post(&url).json(&event).send().await {
                debug!("⚠️ 进度上报失败: {}", e);
            }
        });
    }

    fn notify_status(&self, username: &str, status: &str, message: &str) {
        let client = self.client.clone();
        let url = format!("{}/api/automation/status", self.endpoint);
        let body = json!({
            "username": username,
            "status": status,
            "message": message,
            "timestamp": chrono::Local::now().to_rfc3339(),
        });
        tokio::spawn(async move {
            if let Err(e) = client.post(&url).json(&body).send().await {
                warn!("⚠️ 状态上报失败: {}", e);
            }
        });
    }
}

/// 进度计数器：包一层 sink，保证 current 单调递增
pub struct ProgressReporter {
    sink: Arc<dyn ProgressSink>,
    current: AtomicUsize,
    total: usize,
}

impl ProgressReporter {
    pub fn new(sink: Arc<dyn ProgressSink>, total: usize) -> Self {
        Self {
            sink,
            current: AtomicUsize::new(0),
            total,
        }
    }

    /// 完成了一个步骤，进度 +1 并上报
    pub fn step_done(&self, label: impl Into<String>) {
        let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.sink.emit(ProgressEvent {
            current,
            total: self.total,
            label: label.into(),
        });
    }

    pub fn notify_status(&self, username: &str, status: &str, message: &str) {
        self.sink.notify_status(username, status, message);
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CaptureSink {
        events: Mutex<Vec<ProgressEvent>>,
    }

    impl ProgressSink for CaptureSink {
        fn emit(&self, event: ProgressEvent) {
            self.events.lock().unwrap().push(event);
        }
        fn notify_status(&self, _username: &str, _status: &str, _message: &str) {}
    }

    #[tokio::test]
    async fn test_reporter_is_monotonic_under_concurrency() {
        let sink = Arc::new(CaptureSink {
            events: Mutex::new(Vec::new()),
        });
        let reporter = Arc::new(ProgressReporter::new(sink.clone(), 12));

        let mut handles = Vec::new();
        for i in 0..12 {
            let reporter = reporter.clone();
            handles.push(tokio::spawn(async move {
                reporter.step_done(format!("步骤 {}", i));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut currents: Vec<usize> = sink
            .events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.current)
            .collect();
        currents.sort_unstable();
        // 1..=12 各出现一次，单调不重复
        assert_eq!(currents, (1..=12).collect::<Vec<_>>());
        assert_eq!(reporter.current(), 12);
    }
}
