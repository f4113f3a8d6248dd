use super::*;
use serde_json::json;

fn task(endpoint: &str, payload: Value) -> DeliveryTask {
    DeliveryTask {
        organization_id: "org".to_string(),
        endpoint_url: endpoint.to_string(),
        payload: Arc::new(payload),
    }
}

fn broadcaster(client: &Arc<RecordingClient>) -> Broadcaster {
    Broadcaster::new(client.clone() as Arc<dyn WebhookClient>)
}

fn far_deadline() -> Instant {
    Instant::now() + Duration::from_secs(60)
}

#[test]
fn test_message_wraps_payload_as_text() {
    let message = WebhookMessage::from_payload(&json!("p1"));
    assert_eq!(serde_json::to_string(&message).unwrap(), r#"{"text":"p1"}"#);

    let message = WebhookMessage::from_payload(&json!({"rows": 2}));
    assert_eq!(message.text, r#"{"rows":2}"#);
}

#[test]
fn test_failure_classification() {
    assert_eq!(DeliveryFailure::Connect("refused".into()).kind(), "connect");
    assert_eq!(DeliveryFailure::Status { status: 404 }.kind(), "status");
    assert_eq!(DeliveryFailure::DeadlineExceeded.kind(), "deadline_exceeded");

    assert!(DeliveryFailure::Timeout.is_transient());
    assert!(DeliveryFailure::Status { status: 503 }.is_transient());
    assert!(DeliveryFailure::Status { status: 429 }.is_transient());
    assert!(!DeliveryFailure::Status { status: 404 }.is_transient());
    assert!(!DeliveryFailure::Transport("bad url".into()).is_transient());
    assert!(!DeliveryFailure::DeadlineExceeded.is_transient());
}

#[tokio::test]
async fn test_delivers_every_task() {
    let client = Arc::new(RecordingClient::new());
    let tasks = vec![task("A", json!("p1")), task("B", json!("p1")), task("A", json!("p2"))];

    let report = broadcaster(&client).deliver_all(tasks, far_deadline()).await;

    assert_eq!(report.attempted, 3);
    assert_eq!(report.delivered, 3);
    assert!(report.is_complete());
    assert_eq!(client.attempts_to("A"), 2);
    assert_eq!(client.attempts_to("B"), 1);
}

#[tokio::test]
async fn test_failure_is_isolated_to_its_task() {
    let client = Arc::new(RecordingClient::new());
    client.fail_endpoint("B", DeliveryFailure::Connect("connection refused".into()));
    let tasks = vec![task("A", json!("p1")), task("B", json!("p1")), task("C", json!("p1"))];

    let report = broadcaster(&client).deliver_all(tasks, far_deadline()).await;

    assert_eq!(report.attempted, 3);
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.failures[0].endpoint_url, "B");
    assert_eq!(report.failures[0].failure.kind(), "connect");

    let mut delivered: Vec<_> = client.delivered().into_iter().map(|a| a.endpoint_url).collect();
    delivered.sort();
    assert_eq!(delivered, vec!["A", "C"]);
}

#[tokio::test]
async fn test_no_retries_by_default() {
    let client = Arc::new(RecordingClient::new());
    client.fail_endpoint("A", DeliveryFailure::Status { status: 503 });

    let report = broadcaster(&client)
        .deliver_all(vec![task("A", json!("p1"))], far_deadline())
        .await;

    assert_eq!(report.failed(), 1);
    assert_eq!(client.attempts_to("A"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried_when_enabled() {
    let client = Arc::new(RecordingClient::new());
    client.fail_endpoint_times("A", 2, DeliveryFailure::Status { status: 503 });

    let report = broadcaster(&client)
        .with_max_retries(2)
        .deliver_all(vec![task("A", json!("p1"))], far_deadline())
        .await;

    assert!(report.is_complete());
    assert_eq!(client.attempts_to("A"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_permanent_failures_are_not_retried() {
    let client = Arc::new(RecordingClient::new());
    client.fail_endpoint("A", DeliveryFailure::Status { status: 404 });

    let report = broadcaster(&client)
        .with_max_retries(3)
        .deliver_all(vec![task("A", json!("p1"))], far_deadline())
        .await;

    assert_eq!(report.failures[0].failure, DeliveryFailure::Status { status: 404 });
    assert_eq!(client.attempts_to("A"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_is_bounded() {
    let client = Arc::new(RecordingClient::new());
    client.set_latency(Duration::from_secs(1));
    let tasks = (0..4).map(|i| task(&format!("E{i}"), json!("p"))).collect();

    let start = Instant::now();
    let report = broadcaster(&client)
        .with_concurrency(2)
        .deliver_all(tasks, far_deadline())
        .await;
    let elapsed = start.elapsed();

    assert_eq!(report.delivered, 4);
    assert!(elapsed >= Duration::from_secs(2), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_pending_deliveries_fail_at_deadline() {
    let client = Arc::new(RecordingClient::new());
    client.set_latency(Duration::from_secs(10));
    let tasks = vec![task("A", json!("p1")), task("B", json!("p1"))];

    let report = broadcaster(&client)
        .deliver_all(tasks, Instant::now() + Duration::from_secs(1))
        .await;

    assert_eq!(report.attempted, 2);
    assert_eq!(report.delivered, 0);
    assert!(report
        .failures
        .iter()
        .all(|f| f.failure == DeliveryFailure::DeadlineExceeded));
    assert!(client.attempts().is_empty());
}

#[tokio::test]
async fn test_expired_deadline_skips_delivery() {
    let client = Arc::new(RecordingClient::new());

    let report = broadcaster(&client)
        .deliver_all(vec![task("A", json!("p1"))], Instant::now())
        .await;

    assert_eq!(report.failures[0].failure, DeliveryFailure::DeadlineExceeded);
    assert_eq!(report.planned, 1);
    assert_eq!(report.attempted, 0);
    assert!(client.attempts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_tasks_queued_past_deadline_are_not_attempted() {
    let client = Arc::new(RecordingClient::new());
    client.set_latency(Duration::from_secs(2));
    let tasks = vec![task("A", json!("p1")), task("B", json!("p1"))];

    let report = broadcaster(&client)
        .with_concurrency(1)
        .deliver_all(tasks, Instant::now() + Duration::from_secs(1))
        .await;

    assert_eq!(report.planned, 2);
    assert_eq!(report.attempted, 1);
    assert_eq!(report.delivered, 0);
    assert_eq!(report.failed(), 2);
}

#[tokio::test]
async fn test_empty_task_list() {
    let client = Arc::new(RecordingClient::new());
    let report = broadcaster(&client).deliver_all(Vec::new(), far_deadline()).await;
    assert_eq!(report, DeliveryReport::default());
}
