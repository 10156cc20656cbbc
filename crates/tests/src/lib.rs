//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 配置文件 -> 分发引擎 -> sink 的完整链路
//! - 目的地之间的故障隔离
//! - 重试、排空与释放语义

#[cfg(test)]
mod e2e_tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{
        ContractError, DeliveryOutcome, DispatchSettings, Event, EventSink, EventSource,
        RetryConfig, RouteConfig, Severity, SinkKind,
    };
    use dispatcher::{
        Dispatcher, DispatcherBuilder, InMemorySink, InMemoryStore, RouteTable, SinkFactory,
        SinkHandle,
    };
    use ingestion::{MockEventSource, MockSourceConfig};
    use tokio_util::sync::CancellationToken;

    const CONFIG: &str = r#"
log_level: debug
dispatch:
  queue_capacity: 64
  drain_timeout_ms: 5000
routes:
  - namespace: prod
    destinations: [slack-a]
  - type: Warning
    destinations: [file-a]
  - namespace: "prod|staging"
    destinations: [file-a]
receivers:
  - name: slack-a
    in_memory: {}
  - name: file-a
    in_memory: {}
"#;

    fn event(namespace: &str, reason: &str, severity: Severity) -> Event {
        let mut event = Event {
            reason: reason.into(),
            severity,
            ..Default::default()
        };
        event.involved_object.namespace = namespace.into();
        event.involved_object.kind = "Pod".into();
        event.metadata.uid = format!("{namespace}-{reason}");
        event
    }

    async fn build(yaml: &str) -> (Dispatcher, SinkFactory) {
        let config = ConfigLoader::load_from_str(yaml, ConfigFormat::Yaml).unwrap();
        let factory = SinkFactory::new();
        let dispatcher = DispatcherBuilder::new(config)
            .sink_factory(factory.clone())
            .build()
            .await
            .unwrap();
        (dispatcher, factory)
    }

    /// Config file -> Dispatcher -> in-memory destinations
    #[tokio::test]
    async fn test_e2e_routes_from_config() {
        let (dispatcher, factory) = build(CONFIG).await;
        let slack = factory.in_memory_store("slack-a").unwrap();
        let file = factory.in_memory_store("file-a").unwrap();

        // prod + Warning matches all three routes; file-a must still get it once
        dispatcher
            .dispatch(event("prod", "OOMKilled", Severity::Warning))
            .await;
        // staging Normal only matches the third route
        dispatcher
            .dispatch(event("staging", "Pulled", Severity::Normal))
            .await;
        // nothing matches
        let report = dispatcher
            .dispatch(event("dev", "Pulled", Severity::Normal))
            .await;
        assert!(report.is_unrouted());

        let report = dispatcher.stop().await;
        assert!(report.is_clean());
        assert_eq!(report.stats.received, 3);
        assert_eq!(report.stats.unrouted, 1);

        let slack_events = slack.events();
        assert_eq!(slack_events.len(), 1);
        assert_eq!(slack_events[0].reason, "OOMKilled");

        let file_reasons: Vec<String> = file.events().into_iter().map(|e| e.reason).collect();
        assert_eq!(file_reasons, vec!["OOMKilled", "Pulled"]);

        assert_eq!(slack.release_count(), 1);
        assert_eq!(file.release_count(), 1);
    }

    /// Many events to one destination arrive in dispatch order
    #[tokio::test]
    async fn test_e2e_fifo_per_destination() {
        let (dispatcher, factory) = build(CONFIG).await;
        let slack = factory.in_memory_store("slack-a").unwrap();

        for i in 0..50 {
            dispatcher
                .dispatch(event("prod", &format!("R{i}"), Severity::Normal))
                .await;
        }
        slack.wait_for(50).await;

        let reasons: Vec<String> = slack.events().into_iter().map(|e| e.reason).collect();
        let expected: Vec<String> = (0..50).map(|i| format!("R{i}")).collect();
        assert_eq!(reasons, expected);

        dispatcher.stop().await;
    }

    /// Mock source pushing straight into the dispatcher
    #[tokio::test]
    async fn test_e2e_mock_source_pipeline() {
        let yaml = r#"
routes:
  - namespace: kube-system
    destinations: [system]
receivers:
  - name: system
    in_memory: {}
"#;
        let (dispatcher, factory) = build(yaml).await;
        let store = factory.in_memory_store("system").unwrap();

        let mut source = MockEventSource::new(MockSourceConfig {
            count: Some(30),
            interval: Duration::ZERO,
            ..Default::default()
        });
        let expected = (0..30)
            .filter(|seq| source.event(*seq).namespace() == "kube-system")
            .count();

        let produced = source.run(&dispatcher).await.unwrap();
        assert_eq!(produced, 30);
        assert_eq!(source.metrics().events_emitted, 30);

        let report = dispatcher.stop().await;
        assert_eq!(report.stats.received, 30);
        assert_eq!(report.delivered_total(), expected as u64);
        assert_eq!(store.len(), expected);
        assert!(store.events().iter().all(|e| e.namespace() == "kube-system"));
    }

    /// File destination built by the factory writes JSON lines
    #[tokio::test]
    async fn test_e2e_file_destination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");
        let yaml = format!(
            r#"
routes:
  - destinations: [dump]
receivers:
  - name: dump
    file:
      path: "{}"
"#,
            path.display()
        );
        let (dispatcher, _) = build(&yaml).await;

        dispatcher
            .dispatch(event("prod", "BackOff", Severity::Warning))
            .await;
        dispatcher
            .dispatch(event("prod", "Started", Severity::Normal))
            .await;
        let report = dispatcher.stop().await;
        assert!(report.is_clean());

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Event> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].reason, "BackOff");
        assert_eq!(lines[1].severity, Severity::Normal);
    }

    /// Webhook that fails twice then accepts: retried until delivered
    #[tokio::test]
    async fn test_e2e_webhook_retries_until_accepted() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let yaml = format!(
            r#"
routes:
  - destinations: [hook]
receivers:
  - name: hook
    webhook:
      endpoint: "{}/hook"
    delivery:
      retry:
        max_attempts: 3
        base_delay_ms: 10
        max_delay_ms: 50
"#,
            server.uri()
        );
        let (dispatcher, _) = build(&yaml).await;

        dispatcher
            .dispatch(event("prod", "Unhealthy", Severity::Warning))
            .await;
        let report = dispatcher.stop().await;

        let hook = &report.sinks[0];
        assert_eq!(hook.kind, SinkKind::Webhook);
        assert_eq!(hook.metrics.delivered, 1);
        assert_eq!(hook.metrics.attempts, 3);
        assert_eq!(hook.metrics.retries, 2);
        assert_eq!(hook.metrics.exhausted, 0);
    }

    /// Sink that never succeeds
    struct AlwaysRetryable {
        attempts: Arc<AtomicU64>,
    }

    impl EventSink for AlwaysRetryable {
        fn name(&self) -> &str {
            "flaky"
        }

        fn kind(&self) -> SinkKind {
            SinkKind::Webhook
        }

        async fn deliver(&mut self, _event: &Event) -> DeliveryOutcome {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            DeliveryOutcome::Retryable("connection refused".into())
        }

        async fn release(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    /// A failing destination neither blocks nor slows a healthy one
    #[tokio::test(start_paused = true)]
    async fn test_e2e_failing_destination_is_isolated() {
        let token = CancellationToken::new();
        let attempts = Arc::new(AtomicU64::new(0));
        let flaky_settings = DispatchSettings {
            retry: RetryConfig {
                max_attempts: 3,
                base_delay_ms: 1_000,
                max_delay_ms: 1_000,
                jitter: 0.0,
            },
            ..Default::default()
        };

        let store = InMemoryStore::new();
        let handles = vec![
            SinkHandle::spawn(
                AlwaysRetryable {
                    attempts: Arc::clone(&attempts),
                },
                flaky_settings,
                token.child_token(),
            ),
            SinkHandle::spawn(
                InMemorySink::new("fast", store.clone()),
                DispatchSettings::default(),
                token.child_token(),
            ),
        ];
        let route = RouteConfig {
            destinations: vec!["flaky".into(), "fast".into()],
            ..Default::default()
        };
        let routes = RouteTable::compile(&[route], ["flaky", "fast"]).unwrap();
        let dispatcher = Dispatcher::with_handles(handles, routes);

        for i in 0..5 {
            let report = dispatcher
                .dispatch(event("prod", &format!("R{i}"), Severity::Warning))
                .await;
            assert_eq!(report.accepted(), 2);
        }

        // the healthy destination finishes before the first backoff elapses
        tokio::time::timeout(Duration::from_millis(500), store.wait_for(5))
            .await
            .expect("healthy destination was held up");

        let report = dispatcher.stop_with_grace(Duration::from_secs(60)).await;
        assert!(report.is_clean());

        let flaky = report.sinks.iter().find(|s| s.name == "flaky").unwrap();
        assert_eq!(flaky.metrics.attempts, 15);
        assert_eq!(flaky.metrics.exhausted, 5);
        assert_eq!(flaky.metrics.delivered, 0);
        assert_eq!(attempts.load(Ordering::SeqCst), 15);

        let fast = report.sinks.iter().find(|s| s.name == "fast").unwrap();
        assert_eq!(fast.metrics.delivered, 5);
        assert_eq!(store.release_count(), 1);
    }

    /// Stopping drains every queue and releases each destination once
    #[tokio::test]
    async fn test_e2e_stop_releases_every_destination_once() {
        let (dispatcher, factory) = build(CONFIG).await;
        let slack = factory.in_memory_store("slack-a").unwrap();
        let file = factory.in_memory_store("file-a").unwrap();

        dispatcher
            .dispatch(event("prod", "Killing", Severity::Normal))
            .await;
        let report = dispatcher.stop().await;

        assert_eq!(report.sinks.len(), 2);
        assert!(report.sinks.iter().all(|s| s.released && !s.forced));
        assert_eq!(report.dropped_total(), 0);
        assert_eq!(slack.release_count(), 1);
        assert_eq!(file.release_count(), 1);
    }
}
