//! Mock 宿主实现
//!
//! 用于单元测试与本地运行的 mock 实现，支持注入失败场景。

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::instrument;

use contracts::{
    unix_now, ContextEvent, ContextListener, ContextType, SourceAnnouncement, SourceDecl,
    SourceId, SourceMode,
};

use crate::client::HostClient;
use crate::error::{HostGatewayError, Result};

/// Mock 宿主配置
#[derive(Debug, Default, Clone)]
pub struct MockHostConfig {
    /// open_session 是否失败
    pub fail_session: bool,
    /// (source, type) -> 成功前的失败次数
    pub fail_subscribe: HashMap<(String, String), u32>,
    /// 接受订阅但从不推送的源
    pub silent_sources: Vec<String>,
    /// pull 调用失败的源
    pub unreachable_sources: Vec<String>,
    /// 以原始字节交付负载的源
    pub raw_sources: Vec<String>,
    /// unsubscribe 调用失败的源
    pub fail_unsubscribe: Vec<String>,
}

type PairKey = (SourceId, ContextType);

/// Mock 宿主
pub struct MockHost {
    /// 配置（可注入失败场景）
    config: MockHostConfig,
    /// 声明的源列表
    sources: Vec<SourceDecl>,
    /// 会话状态
    session_open: Mutex<bool>,
    /// 每对订阅尝试计数（用于验证退避）
    subscribe_attempts: Mutex<HashMap<PairKey, u32>>,
    /// 推送任务句柄 (pair -> task)
    push_tasks: Mutex<HashMap<PairKey, JoinHandle<()>>>,
}

impl MockHost {
    /// 创建默认 mock 宿主
    pub fn new(sources: Vec<SourceDecl>) -> Self {
        Self::with_config(sources, MockHostConfig::default())
    }

    /// 使用配置创建 mock 宿主
    pub fn with_config(sources: Vec<SourceDecl>, config: MockHostConfig) -> Self {
        Self {
            config,
            sources,
            session_open: Mutex::new(false),
            subscribe_attempts: Mutex::new(HashMap::new()),
            push_tasks: Mutex::new(HashMap::new()),
        }
    }

    /// 指定 pair 的订阅尝试次数
    pub fn subscribe_attempts(&self, source_id: &SourceId, context_type: &ContextType) -> u32 {
        self.subscribe_attempts
            .lock()
            .unwrap()
            .get(&(source_id.clone(), context_type.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// 当前活跃的推送任务数量
    pub fn active_push_count(&self) -> usize {
        self.push_tasks.lock().unwrap().len()
    }

    fn decl(&self, source_id: &SourceId) -> Option<&SourceDecl> {
        self.sources.iter().find(|decl| decl.id == *source_id)
    }

    fn payload_for(decl: &SourceDecl, context_type: &ContextType) -> String {
        decl.payload
            .clone()
            .unwrap_or_else(|| format!("{}:{}", decl.id, context_type))
    }

    fn is_silent(&self, source_id: &SourceId) -> bool {
        self.config
            .silent_sources
            .iter()
            .any(|s| source_id == s.as_str())
    }

    fn is_raw(&self, source_id: &SourceId) -> bool {
        self.config
            .raw_sources
            .iter()
            .any(|s| source_id == s.as_str())
    }

    fn event_for(
        raw: bool,
        source_id: SourceId,
        context_type: ContextType,
        payload: String,
    ) -> ContextEvent {
        if raw {
            ContextEvent::raw(source_id, context_type, payload.into_bytes(), unix_now())
        } else {
            ContextEvent::text(source_id, context_type, payload, unix_now())
        }
    }

    fn ensure_session(&self) -> Result<()> {
        if *self.session_open.lock().unwrap() {
            Ok(())
        } else {
            Err(HostGatewayError::session("no open session"))
        }
    }
}

impl HostClient for MockHost {
    #[instrument(name = "mock_host_open_session", skip(self))]
    async fn open_session(&self) -> Result<()> {
        if self.config.fail_session {
            return Err(HostGatewayError::session("mock failure"));
        }
        *self.session_open.lock().unwrap() = true;
        Ok(())
    }

    #[instrument(name = "mock_host_close_session", skip(self))]
    async fn close_session(&self) -> Result<()> {
        for (_, task) in self.push_tasks.lock().unwrap().drain() {
            task.abort();
        }
        *self.session_open.lock().unwrap() = false;
        Ok(())
    }

    #[instrument(name = "mock_host_discover", skip(self))]
    async fn discover_sources(&self) -> Result<Vec<SourceAnnouncement>> {
        self.ensure_session()?;
        let now = unix_now();
        Ok(self
            .sources
            .iter()
            .map(|decl| SourceAnnouncement {
                source_id: decl.id.clone(),
                context_types: decl.context_types.clone(),
                announced_at: now,
            })
            .collect())
    }

    #[instrument(
        name = "mock_host_subscribe",
        skip(self, listener),
        fields(source_id = %source_id, context_type = %context_type)
    )]
    async fn subscribe(
        &self,
        source_id: &SourceId,
        context_type: &ContextType,
        listener: ContextListener,
    ) -> Result<()> {
        self.ensure_session()?;

        let key = (source_id.clone(), context_type.clone());
        let attempt = {
            let mut attempts = self.subscribe_attempts.lock().unwrap();
            let entry = attempts.entry(key.clone()).or_insert(0);
            *entry += 1;
            *entry
        };

        let fail_key = (source_id.to_string(), context_type.to_string());
        if let Some(failures) = self.config.fail_subscribe.get(&fail_key) {
            if attempt <= *failures {
                return Err(HostGatewayError::subscribe(
                    source_id.as_str(),
                    context_type.as_str(),
                    "mock failure",
                ));
            }
        }

        let decl = self.decl(source_id).ok_or_else(|| {
            HostGatewayError::subscribe(source_id.as_str(), context_type.as_str(), "unknown source")
        })?;

        if decl.mode == SourceMode::Push && !self.is_silent(source_id) {
            let payload = Self::payload_for(decl, context_type);
            let interval = Duration::from_millis(decl.push_interval_ms);
            let raw = self.is_raw(source_id);
            let push_source = source_id.clone();
            let push_type = context_type.clone();

            let task = tokio::spawn(async move {
                loop {
                    tokio::time::sleep(interval).await;
                    listener(Self::event_for(
                        raw,
                        push_source.clone(),
                        push_type.clone(),
                        payload.clone(),
                    ));
                }
            });

            // Re-subscribe replaces the old delivery task
            if let Some(old) = self.push_tasks.lock().unwrap().insert(key, task) {
                old.abort();
            }
        }

        Ok(())
    }

    #[instrument(
        name = "mock_host_unsubscribe",
        skip(self),
        fields(source_id = %source_id, context_type = %context_type)
    )]
    async fn unsubscribe(&self, source_id: &SourceId, context_type: &ContextType) -> Result<()> {
        if self
            .config
            .fail_unsubscribe
            .iter()
            .any(|s| source_id == s.as_str())
        {
            return Err(HostGatewayError::unsubscribe(
                source_id.as_str(),
                context_type.as_str(),
                "mock failure",
            ));
        }

        let key = (source_id.clone(), context_type.clone());
        // 幂等：未订阅也返回 Ok
        if let Some(task) = self.push_tasks.lock().unwrap().remove(&key) {
            task.abort();
        }
        Ok(())
    }

    #[instrument(
        name = "mock_host_pull",
        skip(self),
        fields(source_id = %source_id, context_type = %context_type)
    )]
    async fn pull(
        &self,
        source_id: &SourceId,
        context_type: &ContextType,
    ) -> Result<Option<ContextEvent>> {
        self.ensure_session()?;

        if self
            .config
            .unreachable_sources
            .iter()
            .any(|s| source_id == s.as_str())
        {
            return Err(HostGatewayError::pull(source_id.as_str(), "mock failure"));
        }

        let Some(decl) = self.decl(source_id) else {
            return Err(HostGatewayError::pull(source_id.as_str(), "unknown source"));
        };

        if self.is_silent(source_id) || !decl.context_types.contains(context_type) {
            return Ok(None);
        }

        if decl.pull_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(decl.pull_delay_ms)).await;
        }

        Ok(Some(Self::event_for(
            self.is_raw(source_id),
            source_id.clone(),
            context_type.clone(),
            Self::payload_for(decl, context_type),
        )))
    }
}
