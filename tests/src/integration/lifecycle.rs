//! # Lifecycle Flows
//!
//! What happens when consumers die and connections close: manual-ack
//! redelivery across a dispatcher restart, auto-ack loss, and broker
//! closure observed by callers and services at the same time.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use tokio::sync::Notify;
    use tokio::time::sleep;

    use switchboard_broker::{AckMode, Broker, InMemoryBroker};
    use switchboard_client::{CallError, ClientConfig, ReplyMode, RpcClient};
    use switchboard_dispatch::{
        handler_fn, ActionArgs, DispatcherConfig, DispatcherState, Handler, HandlerRegistry,
        ServiceDispatcher,
    };
    use switchboard_wire::ActionError;

    // =========================================================================
    // FIXTURES
    // =========================================================================

    /// Registry whose single handler parks on `gate` before replying.
    fn gated_registry(gate: Arc<Notify>) -> HandlerRegistry {
        HandlerRegistry::new().with(
            "jobs",
            "grindAction",
            handler_fn("grind", move |_: ActionArgs| {
                let gate = Arc::clone(&gate);
                async move {
                    gate.notified().await;
                    Ok(json!("ground"))
                }
            }),
        )
    }

    /// Records every `args[0]` it sees, the way a real stateful service
    /// would implement [`Handler`] by hand.
    struct RecordingHandler {
        seen: Arc<Mutex<Vec<Value>>>,
    }

    #[async_trait::async_trait]
    impl Handler for RecordingHandler {
        fn name(&self) -> &str {
            "recording"
        }

        async fn invoke(&self, args: ActionArgs) -> Result<Value, ActionError> {
            self.seen.lock().push(args.arg::<Value>(0)?);
            Ok(Value::Null)
        }
    }

    fn recording_registry(seen: Arc<Mutex<Vec<Value>>>) -> HandlerRegistry {
        HandlerRegistry::new().with("jobs", "grindAction", Arc::new(RecordingHandler { seen }))
    }

    fn dispatcher(
        broker: &Arc<InMemoryBroker>,
        registry: HandlerRegistry,
        ack_mode: AckMode,
    ) -> ServiceDispatcher {
        ServiceDispatcher::new(
            Arc::clone(broker) as Arc<dyn Broker>,
            "workshop",
            registry,
            DispatcherConfig { ack_mode },
        )
    }

    async fn poll_until(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if check() {
                return true;
            }
            sleep(Duration::from_millis(5)).await;
        }
        false
    }

    // =========================================================================
    // MANUAL vs AUTO ACKNOWLEDGEMENT
    // =========================================================================

    #[tokio::test]
    async fn test_manual_ack_redelivers_after_consumer_loss() {
        let broker = Arc::new(InMemoryBroker::new());
        let gate = Arc::new(Notify::new());
        let first = dispatcher(&broker, gated_registry(Arc::clone(&gate)), AckMode::Manual);
        let consume_loop = first.start().await.expect("first start");

        let client = RpcClient::new(Arc::clone(&broker) as Arc<dyn Broker>);
        client
            .cast("workshop", "jobs", "grindAction", vec![json!("order-1")])
            .await
            .expect("cast");

        // The gated handler holds the delivery unacknowledged.
        assert!(
            poll_until(|| broker.unacked_count("workshop") == Some(1)).await,
            "delivery never became unacked"
        );

        // Kill the consume loop mid-delivery. Dropping its subscription
        // puts the unacknowledged delivery back on the queue.
        consume_loop.abort();
        assert!(
            poll_until(|| broker.queue_depth("workshop") == Some(1)).await,
            "delivery was not requeued"
        );

        // A replacement consumer picks the same message up again.
        let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let second = dispatcher(&broker, recording_registry(Arc::clone(&seen)), AckMode::Manual);
        second.start().await.expect("second start");

        assert!(
            poll_until(|| seen.lock().len() == 1).await,
            "redelivered message never reached the replacement"
        );
        assert_eq!(seen.lock()[0], json!("order-1"));
        // Casts are acknowledged too; nothing stays outstanding.
        assert!(poll_until(|| broker.unacked_count("workshop") == Some(0)).await);
    }

    #[tokio::test]
    async fn test_auto_ack_loses_the_delivery_with_its_consumer() {
        let broker = Arc::new(InMemoryBroker::new());
        let gate = Arc::new(Notify::new());
        let first = dispatcher(&broker, gated_registry(Arc::clone(&gate)), AckMode::Auto);
        let consume_loop = first.start().await.expect("first start");

        let client = RpcClient::new(Arc::clone(&broker) as Arc<dyn Broker>);
        client
            .cast("workshop", "jobs", "grindAction", vec![json!("order-1")])
            .await
            .expect("cast");

        // Received and auto-acked: in flight in the handler, gone from the
        // broker.
        assert!(
            poll_until(|| first.state() == DispatcherState::Dispatching).await,
            "handler never started"
        );
        assert_eq!(broker.queue_depth("workshop"), Some(0));
        assert_eq!(broker.unacked_count("workshop"), Some(0));

        consume_loop.abort();

        // A replacement sees nothing: the message died with its consumer.
        let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let second = dispatcher(&broker, recording_registry(Arc::clone(&seen)), AckMode::Auto);
        second.start().await.expect("second start");

        sleep(Duration::from_millis(100)).await;
        assert!(seen.lock().is_empty());
        assert_eq!(broker.queue_depth("workshop"), Some(0));
    }

    // =========================================================================
    // BROKER CLOSURE
    // =========================================================================

    #[tokio::test]
    async fn test_broker_close_fails_callers_and_stops_the_service() {
        let broker = Arc::new(InMemoryBroker::new());
        let gate = Arc::new(Notify::new());
        let service = dispatcher(&broker, gated_registry(Arc::clone(&gate)), AckMode::Auto);
        service.start().await.expect("start");

        let config = ClientConfig {
            default_timeout: Duration::from_secs(30),
            reply_mode: ReplyMode::Shared,
            ..ClientConfig::default()
        };
        let client = RpcClient::with_config(Arc::clone(&broker) as Arc<dyn Broker>, config)
            .expect("client config");

        let calls: Vec<_> = (0..2)
            .map(|_| {
                let client = client.clone();
                tokio::spawn(async move {
                    client
                        .call("workshop", "jobs", "grindAction", vec![json!("x")])
                        .await
                })
            })
            .collect();

        assert!(
            poll_until(|| client.pending_calls() == 2).await,
            "calls never became pending"
        );

        broker.close().await;

        for call in calls {
            let err = call.await.expect("join call").expect_err("call must fail");
            assert_eq!(err, CallError::BrokerUnavailable);
        }
        assert_eq!(client.pending_calls(), 0);

        // The consume loop sees end-of-stream and stops.
        assert!(
            poll_until(|| service.state() == DispatcherState::Stopped).await,
            "dispatcher never stopped"
        );

        // Later calls fail fast on the dead connection.
        let err = client
            .call("workshop", "jobs", "grindAction", vec![json!("y")])
            .await
            .expect_err("closed broker must reject calls");
        assert_eq!(err, CallError::BrokerUnavailable);
    }
}
