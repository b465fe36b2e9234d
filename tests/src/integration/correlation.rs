//! # Correlation Flows
//!
//! Request/reply pairing end to end: a real client, a real dispatcher, and
//! the in-memory broker between them. Covers out-of-order replies, swarms
//! of concurrent callers, expired calls, both reply-queue modes, and the
//! exact bytes a foreign client would put on the wire.

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    use futures::future;
    use parking_lot::Mutex;
    use rand::Rng;
    use serde_json::{json, Value};
    use tokio::time::{sleep, timeout};

    use switchboard_broker::{AckMode, Broker, InMemoryBroker, MessageHeaders, QueueSpec};
    use switchboard_client::{CallError, ClientConfig, ReplyMode, RpcClient};
    use switchboard_dispatch::{
        handler_fn, ActionArgs, DispatcherConfig, HandlerRegistry, ServiceDispatcher,
    };
    use switchboard_wire::ErrorKind;

    // =========================================================================
    // FIXTURES
    // =========================================================================

    /// Service with one `delayAction`: sleeps `args[0]` milliseconds, then
    /// replies with `args[1]`. Deliveries are processed concurrently, so a
    /// slow call never holds up a fast one behind it.
    async fn start_delay_service(broker: &Arc<InMemoryBroker>, service: &str) {
        let registry = HandlerRegistry::new().with(
            "jobs",
            "delayAction",
            handler_fn("delay", |args: ActionArgs| async move {
                let millis: u64 = args.arg(0)?;
                let label: Value = args.arg(1)?;
                sleep(Duration::from_millis(millis)).await;
                Ok(label)
            }),
        );
        let dispatcher = ServiceDispatcher::new(
            Arc::clone(broker) as Arc<dyn Broker>,
            service,
            registry,
            DispatcherConfig::default(),
        );
        dispatcher.start().await.expect("dispatcher start");
    }

    fn client_with_mode(broker: &Arc<InMemoryBroker>, mode: ReplyMode) -> RpcClient {
        let config = ClientConfig {
            default_timeout: Duration::from_secs(5),
            reply_mode: mode,
            ..ClientConfig::default()
        };
        RpcClient::with_config(Arc::clone(broker) as Arc<dyn Broker>, config)
            .expect("client config")
    }

    // =========================================================================
    // REPLY ORDERING AND PAIRING
    // =========================================================================

    #[tokio::test]
    async fn test_out_of_order_replies_land_with_their_own_callers() {
        let broker = Arc::new(InMemoryBroker::new());
        start_delay_service(&broker, "workers").await;
        let client = client_with_mode(&broker, ReplyMode::Shared);

        let completions: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        // The slow request goes out first, the fast one second; their
        // replies come back in the reverse order.
        let slow = {
            let client = client.clone();
            let completions = Arc::clone(&completions);
            tokio::spawn(async move {
                let result = client
                    .call(
                        "workers",
                        "jobs",
                        "delayAction",
                        vec![json!(400), json!("slow")],
                    )
                    .await
                    .expect("slow call");
                completions.lock().push("slow");
                result
            })
        };
        // Let the slow request reach the service first.
        sleep(Duration::from_millis(50)).await;

        let fast = {
            let client = client.clone();
            let completions = Arc::clone(&completions);
            tokio::spawn(async move {
                let result = client
                    .call(
                        "workers",
                        "jobs",
                        "delayAction",
                        vec![json!(5), json!("fast")],
                    )
                    .await
                    .expect("fast call");
                completions.lock().push("fast");
                result
            })
        };

        assert_eq!(slow.await.expect("join slow"), json!("slow"));
        assert_eq!(fast.await.expect("join fast"), json!("fast"));
        assert_eq!(*completions.lock(), vec!["fast", "slow"]);
        assert_eq!(client.pending_calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_never_cross_talk() {
        let broker = Arc::new(InMemoryBroker::new());
        start_delay_service(&broker, "workers").await;
        let client = client_with_mode(&broker, ReplyMode::Shared);

        let mut rng = rand::thread_rng();
        let delays: Vec<u64> = (0..32).map(|_| rng.gen_range(1..40)).collect();

        let calls = delays.into_iter().enumerate().map(|(i, millis)| {
            let client = client.clone();
            async move {
                let label = format!("caller-{i}");
                let result = client
                    .call(
                        "workers",
                        "jobs",
                        "delayAction",
                        vec![json!(millis), json!(label.clone())],
                    )
                    .await
                    .expect("call");
                (label, result)
            }
        });

        for (label, result) in future::join_all(calls).await {
            assert_eq!(result, json!(label));
        }

        assert_eq!(client.pending_calls(), 0);
        assert_eq!(client.stats().completed.load(Ordering::Relaxed), 32);
        assert_eq!(client.stats().unmatched.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_late_reply_after_timeout_is_dropped_without_leaking() {
        let broker = Arc::new(InMemoryBroker::new());
        start_delay_service(&broker, "workers").await;
        let client = client_with_mode(&broker, ReplyMode::Shared);

        let err = client
            .call_with_timeout(
                "workers",
                "jobs",
                "delayAction",
                vec![json!(300), json!("late")],
                Some(Duration::from_millis(40)),
            )
            .await
            .expect_err("deadline should beat the handler");
        assert!(matches!(err, CallError::Timeout(_)));
        assert_eq!(client.pending_calls(), 0);

        // The reply still arrives a quarter second later, finds no pending
        // entry, and is dropped and counted.
        let mut dropped = false;
        for _ in 0..100 {
            if client.stats().unmatched.load(Ordering::Relaxed) == 1 {
                dropped = true;
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert!(dropped, "late reply never reached the shared consumer");

        // The table is healthy: the next call pairs correctly.
        let result = client
            .call(
                "workers",
                "jobs",
                "delayAction",
                vec![json!(1), json!("after")],
            )
            .await
            .expect("fresh call");
        assert_eq!(result, json!("after"));
    }

    // =========================================================================
    // REPLY MODES
    // =========================================================================

    #[tokio::test]
    async fn test_reply_modes_agree_on_results_and_errors() {
        for mode in [ReplyMode::Shared, ReplyMode::PerCall] {
            let broker = Arc::new(InMemoryBroker::new());
            start_delay_service(&broker, "workers").await;
            let client = client_with_mode(&broker, mode);

            let result = client
                .call(
                    "workers",
                    "jobs",
                    "delayAction",
                    vec![json!(1), json!({"n": 7})],
                )
                .await
                .unwrap_or_else(|err| panic!("call in {mode:?} mode: {err}"));
            assert_eq!(result, json!({"n": 7}));

            let err = client
                .call("workers", "jobs", "vanishAction", vec![])
                .await
                .expect_err("unknown action must fail");
            match err {
                CallError::Action(action) => {
                    assert_eq!(action.kind, ErrorKind::NotFound);
                    assert!(action.message.contains("jobs.vanishAction"));
                }
                other => panic!("expected not_found in {mode:?} mode, got {other:?}"),
            }

            assert_eq!(client.pending_calls(), 0);
        }
    }

    // =========================================================================
    // WIRE CONTRACT
    // =========================================================================

    #[tokio::test]
    async fn test_wire_shape_matches_the_convention() {
        let broker = Arc::new(InMemoryBroker::new());
        let registry = HandlerRegistry::new().with(
            "entries",
            "totalAction",
            handler_fn("total", |args: ActionArgs| async move {
                let total: i64 = args.raw().iter().filter_map(Value::as_i64).sum();
                Ok(json!(total))
            }),
        );
        let dispatcher = ServiceDispatcher::new(
            Arc::clone(&broker) as Arc<dyn Broker>,
            "ledger",
            registry,
            DispatcherConfig::default(),
        );
        dispatcher.start().await.expect("dispatcher start");

        // A foreign client: hand-written camelCase request, own reply queue.
        let reply_queue = broker
            .declare_queue(QueueSpec::anonymous())
            .await
            .expect("declare reply queue");
        let mut replies = broker
            .subscribe(&reply_queue, AckMode::Auto)
            .await
            .expect("subscribe reply queue");

        let body =
            br#"{"serviceName":"ledger","controllerName":"entries","actionName":"totalAction","args":[2,3,5]}"#;
        broker
            .publish(
                "ledger",
                body.to_vec(),
                MessageHeaders::for_call(reply_queue.clone(), "tok-7"),
            )
            .await
            .expect("publish request");

        let delivery = timeout(Duration::from_secs(1), replies.recv())
            .await
            .expect("timeout waiting for reply")
            .expect("reply delivery");

        // The token comes back, the reply-to does not, and the body is the
        // bare result envelope.
        assert_eq!(delivery.headers.correlation_id.as_deref(), Some("tok-7"));
        assert!(delivery.headers.reply_to.is_none());
        let value: Value = serde_json::from_slice(&delivery.body).expect("reply json");
        assert_eq!(value, json!({"result": 10}));
    }

    // =========================================================================
    // CASTS
    // =========================================================================

    #[tokio::test]
    async fn test_cast_before_startup_is_buffered_until_the_service_listens() {
        let broker = Arc::new(InMemoryBroker::new());
        let client = client_with_mode(&broker, ReplyMode::Shared);

        client
            .cast("mailroom", "letters", "stampAction", vec![json!("first")])
            .await
            .expect("cast");
        assert_eq!(broker.queue_depth("mailroom"), Some(1));

        let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let registry = {
            let seen = Arc::clone(&seen);
            HandlerRegistry::new().with(
                "letters",
                "stampAction",
                handler_fn("stamp", move |args: ActionArgs| {
                    let seen = Arc::clone(&seen);
                    async move {
                        seen.lock().push(args.arg::<Value>(0)?);
                        Ok(Value::Null)
                    }
                }),
            )
        };
        let dispatcher = ServiceDispatcher::new(
            Arc::clone(&broker) as Arc<dyn Broker>,
            "mailroom",
            registry,
            DispatcherConfig::default(),
        );
        dispatcher.start().await.expect("dispatcher start");

        let mut processed = false;
        for _ in 0..100 {
            if seen.lock().len() == 1 {
                processed = true;
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }
        assert!(processed, "buffered cast never reached the handler");
        assert_eq!(seen.lock()[0], json!("first"));
        assert_eq!(broker.queue_depth("mailroom"), Some(0));
    }
}
