//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 模拟 e2e 测试（mock host，无需真实宿主）
//! - 订阅重试与部分应答行为验证

#[cfg(test)]
mod contract_tests {
    #[test]
    fn test_contracts_compile() {
        // 验证 contracts crate 可编译
        let _ = contracts::ConfigVersion::V1;
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use aggregator::Aggregator;
    use contracts::{
        unix_now, BackoffPolicy, BrokerConfig, ContextListener, DecoderRegistry, SourceDecl,
        SourceMode, Utf8TextDecoder, FORMAT_TEXT,
    };
    use dispatcher::{DispatcherError, RequestDispatcher};
    use host_gateway::{
        ActivateAll, MockHost, MockHostConfig, SessionDriver, SourceSelectionPolicy,
    };
    use ingest::{queue_listener, IngestQueue};
    use registry::SourceRegistry;
    use subscriptions::SubscriptionManager;
    use tokio::sync::watch;

    /// 完整的 broker 组件栈（mock host 驱动）
    struct Stack {
        dispatcher: RequestDispatcher<MockHost>,
        subscriptions: Arc<SubscriptionManager<MockHost>>,
        registry: Arc<SourceRegistry>,
        aggregator: Arc<Aggregator>,
        host: Arc<MockHost>,
        _shutdown: watch::Sender<bool>,
    }

    fn push_decl(id: &str, ty: &str, payload: &str, interval_ms: u64) -> SourceDecl {
        SourceDecl {
            id: id.into(),
            context_types: vec![ty.into()],
            mode: SourceMode::Push,
            payload: Some(payload.into()),
            push_interval_ms: interval_ms,
            pull_delay_ms: 0,
        }
    }

    fn pull_decl(id: &str, ty: &str, payload: &str) -> SourceDecl {
        SourceDecl {
            id: id.into(),
            context_types: vec![ty.into()],
            mode: SourceMode::Pull,
            payload: Some(payload.into()),
            push_interval_ms: 60_000,
            pull_delay_ms: 0,
        }
    }

    /// 按运行时的真实顺序搭建组件栈：
    /// 会话 -> 发现 -> 注册表 -> 聚合器 -> 订阅 -> 分发器
    async fn spin_up(
        decls: Vec<SourceDecl>,
        mock_config: MockHostConfig,
        config: BrokerConfig,
    ) -> Stack {
        let mut decoders = DecoderRegistry::new();
        for decl in &decls {
            for context_type in &decl.context_types {
                decoders.register(context_type.clone(), Box::new(Utf8TextDecoder));
            }
        }

        let host = Arc::new(MockHost::with_config(decls, mock_config));
        let session = SessionDriver::new(host.clone(), 0.0);
        let announcements = session.establish().await.unwrap();

        let registry = Arc::new(SourceRegistry::new());
        for announcement in announcements {
            registry.announce(announcement);
        }

        let queue = Arc::new(IngestQueue::with_decoders(
            config.queue_capacity,
            Arc::new(decoders),
        ));
        let aggregator = Arc::new(Aggregator::new(queue.clone(), config.clone()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = aggregator.clone();
        tokio::spawn(async move { runner.run(shutdown_rx).await });

        let listener: ContextListener = queue_listener(queue.clone());
        let subscriptions = Arc::new(SubscriptionManager::new(
            host.clone(),
            listener,
            config.backoff,
        ));
        let pairs = ActivateAll.select(&registry.all_pairs());
        subscriptions.ensure_all(&pairs, unix_now()).await;

        let dispatcher = RequestDispatcher::new(
            registry.clone(),
            subscriptions.clone(),
            aggregator.clone(),
            host.clone(),
            queue,
            config,
        );

        Stack {
            dispatcher,
            subscriptions,
            registry,
            aggregator,
            host,
            _shutdown: shutdown_tx,
        }
    }

    fn fast_config() -> BrokerConfig {
        BrokerConfig {
            request_timeout_s: 2.0,
            sweep_interval_s: 0.05,
            ..Default::default()
        }
    }

    /// 推送源端到端：订阅后推送的事件进入快照存储，
    /// 请求直接走快路径命中。
    #[tokio::test]
    async fn test_e2e_push_source_feeds_fast_path() {
        let stack = spin_up(
            vec![push_decl("battery_monitor", "battery", "87%", 50)],
            MockHostConfig::default(),
            fast_config(),
        )
        .await;

        // Give the push task time to deliver and the aggregator to merge
        tokio::time::sleep(Duration::from_millis(250)).await;

        let reply = stack
            .dispatcher
            .handle_context_request(&"battery".into(), "e2e")
            .await
            .unwrap();

        assert_eq!(reply.event.render(FORMAT_TEXT).as_deref(), Some("87%"));
        assert!(!reply.partial);
        assert_eq!(stack.dispatcher.metrics().snapshot().fast_path_count, 1);
        assert_eq!(stack.subscriptions.active_count(), 1);
    }

    /// 拉取源端到端：冷请求触发扇出，第二次请求命中快路径。
    #[tokio::test]
    async fn test_e2e_pull_round_then_fast_path() {
        let stack = spin_up(
            vec![pull_decl("location_provider", "location", "52.5,13.4")],
            MockHostConfig::default(),
            fast_config(),
        )
        .await;

        let first = stack
            .dispatcher
            .handle_context_request(&"location".into(), "e2e")
            .await
            .unwrap();
        assert_eq!(first.event.render(FORMAT_TEXT).as_deref(), Some("52.5,13.4"));
        assert_eq!(stack.dispatcher.metrics().snapshot().fast_path_count, 0);

        let second = stack
            .dispatcher
            .handle_context_request(&"location".into(), "e2e")
            .await
            .unwrap();
        assert!(!second.partial);
        assert_eq!(stack.dispatcher.metrics().snapshot().fast_path_count, 1);
    }

    /// 一个源不可达时仍然应答，但标记 partial，
    /// 注册表将该源标记为 Unreachable。
    #[tokio::test]
    async fn test_e2e_unreachable_source_yields_partial() {
        let mock_config = MockHostConfig {
            unreachable_sources: vec!["flaky".to_string()],
            ..Default::default()
        };
        let stack = spin_up(
            vec![
                pull_decl("steady", "battery", "87%"),
                pull_decl("flaky", "battery", "12%"),
            ],
            mock_config,
            fast_config(),
        )
        .await;

        let reply = stack
            .dispatcher
            .handle_context_request(&"battery".into(), "e2e")
            .await
            .unwrap();

        assert!(reply.partial);
        assert_eq!(reply.event.source_id, "steady");
        assert_eq!(
            stack.registry.liveness(&"flaky".into()),
            contracts::Liveness::Unreachable
        );
    }

    /// 订阅失败进入退避，重试到期后恢复为 Active。
    #[tokio::test]
    async fn test_e2e_failed_subscription_recovers_after_backoff() {
        let mut fail_subscribe = HashMap::new();
        fail_subscribe.insert(("battery_monitor".to_string(), "battery".to_string()), 1);
        let mock_config = MockHostConfig {
            fail_subscribe,
            ..Default::default()
        };

        let config = BrokerConfig {
            backoff: BackoffPolicy {
                base_s: 0.01,
                max_s: 0.1,
            },
            ..fast_config()
        };
        let stack = spin_up(
            vec![push_decl("battery_monitor", "battery", "87%", 50)],
            mock_config,
            config,
        )
        .await;

        // Initial ensure_all failed and parked the pair
        assert_eq!(stack.subscriptions.active_count(), 0);

        // Past the jittered deadline (delay * 1.1 <= 0.022s)
        tokio::time::sleep(Duration::from_millis(60)).await;
        let retried = stack.subscriptions.retry_due(unix_now()).await;

        assert_eq!(retried, 1);
        assert_eq!(stack.subscriptions.active_count(), 1);
        assert_eq!(
            stack
                .host
                .subscribe_attempts(&"battery_monitor".into(), &"battery".into()),
            2
        );
    }

    /// 快照过期后快路径失效，下一次请求重新扇出取新值。
    #[tokio::test]
    async fn test_e2e_expired_snapshot_refetches() {
        let config = BrokerConfig {
            validity_window_s: 0.2,
            ..fast_config()
        };
        let stack = spin_up(
            vec![pull_decl("battery_monitor", "battery", "87%")],
            MockHostConfig::default(),
            config,
        )
        .await;

        let first = stack
            .dispatcher
            .handle_context_request(&"battery".into(), "e2e")
            .await
            .unwrap();
        assert_eq!(first.event.render(FORMAT_TEXT).as_deref(), Some("87%"));

        tokio::time::sleep(Duration::from_millis(300)).await;

        let second = stack
            .dispatcher
            .handle_context_request(&"battery".into(), "e2e")
            .await
            .unwrap();
        assert!(second.age_s < 0.2, "refetched snapshot should be fresh");
        // Both requests went through fan-out, never the fast path
        assert_eq!(stack.dispatcher.metrics().snapshot().fast_path_count, 0);
    }

    /// 源卸载后：订阅撤销，快照标记 degraded，
    /// 但在过期前仍照常服务（stale-but-present）。
    #[tokio::test]
    async fn test_e2e_unregistered_source_serves_degraded_until_expiry() {
        let stack = spin_up(
            vec![pull_decl("battery_monitor", "battery", "87%")],
            MockHostConfig::default(),
            fast_config(),
        )
        .await;

        // Seed a snapshot through a cold request
        stack
            .dispatcher
            .handle_context_request(&"battery".into(), "e2e")
            .await
            .unwrap();

        // Host reports the source uninstalled
        let delta = stack.registry.unregister(&"battery_monitor".into());
        for (source_id, context_type) in &delta.removed {
            stack
                .subscriptions
                .drop_subscription(source_id, context_type)
                .await;
        }
        stack
            .aggregator
            .store()
            .write()
            .await
            .set_source_degraded(&"battery_monitor".into(), true);

        let reply = stack
            .dispatcher
            .handle_context_request(&"battery".into(), "e2e")
            .await
            .unwrap();
        assert!(reply.degraded);
        assert_eq!(reply.event.render(FORMAT_TEXT).as_deref(), Some("87%"));

        // Nothing advertises the type anymore, so once the snapshot
        // expires the type is gone
        assert!(!stack.registry.supports(&"battery".into()));
        assert_eq!(stack.subscriptions.tracked_count(), 0);
    }

    /// 挂起的请求可以整体中止，组件栈继续照常服务。
    #[tokio::test]
    async fn test_e2e_inflight_request_abort_leaves_stack_usable() {
        let mock_config = MockHostConfig {
            silent_sources: vec!["mute".to_string()],
            ..Default::default()
        };
        let stack = spin_up(
            vec![pull_decl("mute", "battery", "87%")],
            mock_config,
            fast_config(),
        )
        .await;

        let dispatcher = Arc::new(stack.dispatcher);
        let pending = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                dispatcher
                    .handle_context_request(&"battery".into(), "e2e")
                    .await
            })
        };

        // The silent source never answers, so the request is parked in
        // its bounded wait when the abort lands
        tokio::time::sleep(Duration::from_millis(100)).await;
        pending.abort();
        assert!(pending.await.unwrap_err().is_cancelled());

        let result = dispatcher
            .handle_context_request(&"weather".into(), "e2e")
            .await;
        assert!(matches!(result, Err(DispatcherError::Unsupported { .. })));
        assert_eq!(stack.subscriptions.tracked_count(), 1);
    }

    /// 会话断开重开后，所有已知订阅从零重建，推送继续流入。
    #[tokio::test]
    async fn test_e2e_session_reopen_resubscribes() {
        let stack = spin_up(
            vec![push_decl("battery_monitor", "battery", "87%", 50)],
            MockHostConfig::default(),
            fast_config(),
        )
        .await;
        assert_eq!(stack.subscriptions.active_count(), 1);

        // Session drop aborts every push registration at the host
        let session = SessionDriver::new(stack.host.clone(), 0.0);
        session.shutdown().await.unwrap();
        assert_eq!(stack.host.active_push_count(), 0);

        session.establish().await.unwrap();
        let active = stack.subscriptions.resubscribe_all(unix_now()).await;

        assert_eq!(active, 1);
        assert_eq!(stack.host.active_push_count(), 1);
        assert_eq!(
            stack
                .host
                .subscribe_attempts(&"battery_monitor".into(), &"battery".into()),
            2
        );

        tokio::time::sleep(Duration::from_millis(150)).await;
        let reply = stack
            .dispatcher
            .handle_context_request(&"battery".into(), "e2e")
            .await
            .unwrap();
        assert_eq!(reply.event.render(FORMAT_TEXT).as_deref(), Some("87%"));
    }

    /// 原始字节负载在入队时由注册的解码器升级为文本。
    #[tokio::test]
    async fn test_e2e_raw_source_payload_is_decoded() {
        let mock_config = MockHostConfig {
            raw_sources: vec!["battery_monitor".to_string()],
            ..Default::default()
        };
        let stack = spin_up(
            vec![pull_decl("battery_monitor", "battery", "87%")],
            mock_config,
            fast_config(),
        )
        .await;

        let reply = stack
            .dispatcher
            .handle_context_request(&"battery".into(), "e2e")
            .await
            .unwrap();

        assert_eq!(reply.event.render(FORMAT_TEXT).as_deref(), Some("87%"));
        assert!(!reply.partial);
    }

    /// 无源声明该类型的请求立即失败，不等待超时。
    #[tokio::test]
    async fn test_e2e_unsupported_type_fails_fast() {
        let stack = spin_up(
            vec![pull_decl("battery_monitor", "battery", "87%")],
            MockHostConfig::default(),
            fast_config(),
        )
        .await;

        let started = tokio::time::Instant::now();
        let result = stack
            .dispatcher
            .handle_context_request(&"weather".into(), "e2e")
            .await;

        assert!(matches!(result, Err(DispatcherError::Unsupported { .. })));
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    /// 配置驱动的端到端：TOML -> BrokerBlueprint -> 运行时组件栈。
    #[tokio::test]
    async fn test_e2e_config_driven_stack() {
        let toml = r#"
[broker]
request_timeout_s = 2.0
validity_window_s = 30.0

[[sources]]
id = "battery_monitor"
context_types = ["battery"]
mode = "pull"
payload = "64%"
"#;
        let blueprint =
            config_loader::ConfigLoader::load_from_str(toml, config_loader::ConfigFormat::Toml)
                .unwrap();

        let stack = spin_up(
            blueprint.sources.clone(),
            MockHostConfig::default(),
            blueprint.broker.to_broker_config(),
        )
        .await;

        let reply = stack
            .dispatcher
            .handle_context_request(&"battery".into(), "e2e")
            .await
            .unwrap();

        assert_eq!(reply.event.render(FORMAT_TEXT).as_deref(), Some("64%"));
    }
}
