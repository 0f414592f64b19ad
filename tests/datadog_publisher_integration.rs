//! Integration tests for the Datadog publisher against a stateful wiremock fake

use bigeye::config::{Params, PublisherConfig, PublisherKind};
use bigeye::metrics::{Binding, MetricDefinition, MetricResult};
use bigeye::publishers::{DatadogPublisher, Publish};
use camino::Utf8Path;
use chrono::{TimeZone, Utc};
use core::time::Duration;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// In-memory stand-in for the Datadog dashboard and metric metadata endpoints
#[derive(Debug, Default)]
struct FakeDatadog {
    dashboards: Vec<Value>,
    creates: usize,
    updates: usize,
    descriptions: HashMap<String, String>,
    description_updates: usize,
}

type Shared = Arc<Mutex<FakeDatadog>>;

fn last_segment(request: &Request) -> String {
    request.url.path().rsplit('/').next().unwrap_or_default().to_string()
}

async fn mount_fake(server: &MockServer) -> Shared {
    let state = Shared::default();

    let list_state = Arc::clone(&state);
    Mock::given(method("GET"))
        .and(path("/api/v1/dashboard"))
        .respond_with(move |_: &Request| {
            let fake = list_state.lock().unwrap();
            let dashboards: Vec<Value> = fake
                .dashboards
                .iter()
                .map(|d| json!({ "id": d["id"], "title": d["title"], "description": d["description"] }))
                .collect();
            ResponseTemplate::new(200).set_body_json(json!({ "dashboards": dashboards }))
        })
        .mount(server)
        .await;

    let create_state = Arc::clone(&state);
    Mock::given(method("POST"))
        .and(path("/api/v1/dashboard"))
        .respond_with(move |request: &Request| {
            let mut fake = create_state.lock().unwrap();
            let mut dashboard: Value = request.body_json().unwrap();
            fake.creates += 1;
            dashboard["id"] = json!(format!("dash-{}", fake.creates));
            fake.dashboards.push(dashboard.clone());
            ResponseTemplate::new(200).set_body_json(dashboard)
        })
        .mount(server)
        .await;

    let get_state = Arc::clone(&state);
    Mock::given(method("GET"))
        .and(path_regex("^/api/v1/dashboard/[^/]+$"))
        .respond_with(move |request: &Request| {
            let fake = get_state.lock().unwrap();
            let id = last_segment(request);
            match fake.dashboards.iter().find(|d| d["id"] == json!(id)) {
                Some(dashboard) => ResponseTemplate::new(200).set_body_json(dashboard.clone()),
                None => ResponseTemplate::new(404),
            }
        })
        .mount(server)
        .await;

    let put_state = Arc::clone(&state);
    Mock::given(method("PUT"))
        .and(path_regex("^/api/v1/dashboard/[^/]+$"))
        .respond_with(move |request: &Request| {
            let mut fake = put_state.lock().unwrap();
            let id = last_segment(request);
            let mut body: Value = request.body_json().unwrap();
            body["id"] = json!(id);
            fake.updates += 1;
            match fake.dashboards.iter_mut().find(|d| d["id"] == json!(id)) {
                Some(dashboard) => {
                    *dashboard = body.clone();
                    ResponseTemplate::new(200).set_body_json(body)
                }
                None => ResponseTemplate::new(404),
            }
        })
        .mount(server)
        .await;

    let metadata_state = Arc::clone(&state);
    Mock::given(method("GET"))
        .and(path_regex("^/api/v1/metrics/[^/]+$"))
        .respond_with(move |request: &Request| {
            let fake = metadata_state.lock().unwrap();
            match fake.descriptions.get(&last_segment(request)) {
                Some(description) => ResponseTemplate::new(200).set_body_json(json!({ "type": "gauge", "description": description })),
                None => ResponseTemplate::new(404),
            }
        })
        .mount(server)
        .await;

    let metadata_update_state = Arc::clone(&state);
    Mock::given(method("PUT"))
        .and(path_regex("^/api/v1/metrics/[^/]+$"))
        .respond_with(move |request: &Request| {
            let mut fake = metadata_update_state.lock().unwrap();
            let body: Value = request.body_json().unwrap();
            let description = body["description"].as_str().unwrap_or_default().to_string();
            let _ = fake.descriptions.insert(last_segment(request), description);
            fake.description_updates += 1;
            ResponseTemplate::new(200).set_body_json(body)
        })
        .mount(server)
        .await;

    state
}

fn publisher(server: &MockServer, batch_size: usize) -> DatadogPublisher {
    let mut credentials = Params::new();
    let _ = credentials.insert("apiKey".to_string(), "test-api-key".to_string());
    let _ = credentials.insert("appKey".to_string(), "test-app-key".to_string());
    let _ = credentials.insert("apiUrl".to_string(), server.uri());

    let config = PublisherConfig {
        name: "datadog".to_string(),
        kind: PublisherKind::Datadog,
        credentials,
        batch_size,
    };

    DatadogPublisher::from_config(&config, Duration::from_secs(5)).expect("valid publisher config")
}

fn definition(name: &str, dashboard: &str, kind: &str, description: &str) -> MetricDefinition {
    let yaml = format!(
        "name: {name}\ndescription: {description}\ntype: quality\nteam: data\nmetrics:\n  main:\n    fetchers:\n      db_a: {{ query: select 1 }}\n    publishers:\n      datadog: {{ dashboardName: {dashboard}, typeOfDashboard: {kind} }}\n"
    );
    MetricDefinition::from_yaml(&yaml, Utf8Path::new("tests/inline.yaml")).expect("valid definition")
}

fn result(metric: &str, value: f64) -> MetricResult {
    let params: Params = BTreeMap::from([
        ("dashboardName".to_string(), "Data Police".to_string()),
        ("typeOfDashboard".to_string(), "timeboard".to_string()),
    ]);

    MetricResult {
        metric: Arc::from(metric),
        sub_metric: Arc::from("main"),
        value,
        tags: BTreeMap::from([
            ("metric".to_string(), metric.to_string()),
            ("team".to_string(), "data".to_string()),
        ]),
        timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        publishers: Arc::from(vec![Binding {
            name: Arc::from("datadog"),
            params,
        }]),
    }
}

fn widget_titles(dashboard: &Value) -> Vec<String> {
    dashboard["widgets"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|w| w["definition"]["title"].as_str().map(str::to_string))
        .collect()
}

#[tokio::test]
async fn test_publish_sends_detail_and_summary_series() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/series"))
        .and(header("dd-api-key", "test-api-key"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "status": "ok" })))
        .expect(1)
        .mount(&server)
        .await;

    publisher(&server, 100).publish(&[result("row_count_match", 2.0)]).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: Value = requests[0].body_json().unwrap();
    let series = body["series"].as_array().unwrap();

    assert_eq!(series.len(), 2);

    assert_eq!(series[0]["metric"], "bigeye.Data_Police.row_count_match");
    assert_eq!(series[0]["type"], "gauge");
    assert_eq!(series[0]["points"], json!([[1_772_366_400_i64, 2.0]]));
    assert_eq!(series[0]["tags"], json!(["metric:row_count_match", "team:data"]));

    assert_eq!(series[1]["metric"], "bigeye.Data_Police");
    assert_eq!(
        series[1]["tags"],
        json!(["metric:row_count_match", "team:data", "test_name:row_count_match"])
    );
}

#[tokio::test]
async fn test_publish_reports_partial_failure() {
    let server = MockServer::start().await;
    let calls = Arc::new(AtomicUsize::new(0));

    // The second of three chunks is rejected
    let counter = Arc::clone(&calls);
    Mock::given(method("POST"))
        .and(path("/api/v1/series"))
        .respond_with(move |_: &Request| {
            if counter.fetch_add(1, Ordering::SeqCst) == 1 {
                ResponseTemplate::new(500).set_body_string("intake unavailable")
            } else {
                ResponseTemplate::new(202)
            }
        })
        .mount(&server)
        .await;

    let results: Vec<_> = (0..5).map(|i| result(&format!("check_{i}"), f64::from(i))).collect();
    let err = publisher(&server, 2).publish(&results).await.unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(err.delivered, 3);
    assert_eq!(err.failed, 2);
    assert_eq!(&*err.publisher, "datadog");
    assert!(format!("{err}").contains("500"), "{err}");
}

#[tokio::test]
async fn test_reconcile_creates_then_is_idempotent() {
    let server = MockServer::start().await;
    let state = mount_fake(&server).await;
    let publisher = publisher(&server, 100);

    let definitions = vec![
        definition("orders_archived", "Data Police", "timeboard", ""),
        definition("payments_settled", "Data Police", "timeboard", ""),
    ];

    let first = publisher.reconcile_dashboard(&definitions).await.unwrap();
    assert_eq!(first.dashboards_created, 1);
    assert_eq!(first.widgets_added, 4);

    {
        let fake = state.lock().unwrap();
        assert_eq!(fake.creates, 1);
        assert_eq!(fake.dashboards[0]["title"], "Data Police");
        assert_eq!(fake.dashboards[0]["layout_type"], "ordered");
        assert_eq!(
            widget_titles(&fake.dashboards[0]),
            ["Top offenders", "Change vs previous day", "orders_archived", "payments_settled"]
        );
    }

    let second = publisher.reconcile_dashboard(&definitions).await.unwrap();
    assert!(second.is_unchanged());

    let fake = state.lock().unwrap();
    assert_eq!(fake.creates, 1);
    assert_eq!(fake.updates, 0);
}

#[tokio::test]
async fn test_reconcile_removes_stale_widgets() {
    let server = MockServer::start().await;
    let state = mount_fake(&server).await;
    let publisher = publisher(&server, 100);

    let before = vec![
        definition("orders_archived", "Data Police", "screenboard", ""),
        definition("payments_settled", "Data Police", "screenboard", ""),
    ];
    let _ = publisher.reconcile_dashboard(&before).await.unwrap();

    let after = vec![definition("orders_archived", "Data Police", "screenboard", "")];
    let report = publisher.reconcile_dashboard(&after).await.unwrap();

    assert_eq!(report.dashboards_updated, 1);
    assert_eq!(report.widgets_added, 0);
    assert_eq!(report.widgets_removed, 1);

    let fake = state.lock().unwrap();
    assert_eq!(fake.updates, 1);
    assert_eq!(fake.dashboards[0]["layout_type"], "free");
    assert_eq!(
        widget_titles(&fake.dashboards[0]),
        ["Top offenders", "Change vs previous day", "orders_archived"]
    );
}

#[tokio::test]
async fn test_reconcile_keeps_hand_made_widgets() {
    let server = MockServer::start().await;
    let state = mount_fake(&server).await;
    let publisher = publisher(&server, 100);

    let definitions = vec![definition("orders_archived", "Data Police", "timeboard", "")];
    let _ = publisher.reconcile_dashboard(&definitions).await.unwrap();

    // Someone adds a note to the dashboard by hand
    state.lock().unwrap().dashboards[0]["widgets"]
        .as_array_mut()
        .unwrap()
        .push(json!({ "definition": { "type": "note", "title": "Runbook", "content": "see wiki" } }));

    let definitions = vec![
        definition("orders_archived", "Data Police", "timeboard", ""),
        definition("refunds_match", "Data Police", "timeboard", ""),
    ];
    let report = publisher.reconcile_dashboard(&definitions).await.unwrap();

    assert_eq!(report.widgets_added, 1);
    assert_eq!(report.widgets_removed, 0);

    let fake = state.lock().unwrap();
    assert_eq!(
        widget_titles(&fake.dashboards[0]),
        ["Top offenders", "Change vs previous day", "orders_archived", "Runbook", "refunds_match"]
    );
}

fn dashboard<'a>(fake: &'a FakeDatadog, title: &str) -> &'a Value {
    fake.dashboards.iter().find(|d| d["title"] == title).unwrap()
}

#[tokio::test]
async fn test_reconcile_moved_metric_leaves_old_board() {
    let server = MockServer::start().await;
    let state = mount_fake(&server).await;
    let publisher = publisher(&server, 100);

    let _ = publisher
        .reconcile_dashboard(&[definition("orders_archived", "Old Board", "timeboard", "")])
        .await
        .unwrap();

    // A dashboard someone built by hand, never to be touched
    state.lock().unwrap().dashboards.push(json!({
        "id": "hand-made",
        "title": "Team Board",
        "layout_type": "ordered",
        "widgets": [{ "definition": { "type": "timeseries", "title": "orders", "requests": [{ "q": "avg:bigeye.Team_Board.orders{*}" }] } }]
    }));

    let report = publisher
        .reconcile_dashboard(&[definition("orders_archived", "New Board", "timeboard", "")])
        .await
        .unwrap();

    assert_eq!(report.dashboards_created, 1);
    assert_eq!(report.dashboards_updated, 1);
    assert_eq!(report.widgets_added, 3);
    assert_eq!(report.widgets_removed, 1);

    let fake = state.lock().unwrap();
    assert_eq!(fake.updates, 1);
    assert_eq!(widget_titles(dashboard(&fake, "Old Board")), ["Top offenders", "Change vs previous day"]);
    assert_eq!(
        widget_titles(dashboard(&fake, "New Board")),
        ["Top offenders", "Change vs previous day", "orders_archived"]
    );
    assert_eq!(widget_titles(dashboard(&fake, "Team Board")), ["orders"]);
}

#[tokio::test]
async fn test_reconcile_without_definitions_empties_managed_boards() {
    let server = MockServer::start().await;
    let state = mount_fake(&server).await;
    let publisher = publisher(&server, 100);

    let _ = publisher
        .reconcile_dashboard(&[definition("orders_archived", "Data Police", "screenboard", "")])
        .await
        .unwrap();

    let report = publisher.reconcile_dashboard(&[]).await.unwrap();
    assert_eq!(report.dashboards_updated, 1);
    assert_eq!(report.widgets_removed, 1);

    let again = publisher.reconcile_dashboard(&[]).await.unwrap();
    assert!(again.is_unchanged());

    let fake = state.lock().unwrap();
    assert_eq!(fake.updates, 1);
    assert_eq!(widget_titles(dashboard(&fake, "Data Police")), ["Top offenders", "Change vs previous day"]);
}

#[tokio::test]
async fn test_reconcile_syncs_descriptions() {
    let server = MockServer::start().await;
    let state = mount_fake(&server).await;
    let publisher = publisher(&server, 100);

    let _ = state
        .lock()
        .unwrap()
        .descriptions
        .insert("bigeye.Data_Police.orders_archived".to_string(), "outdated".to_string());

    // payments_settled has never been reported, so Datadog does not know it yet
    let definitions = vec![
        definition("orders_archived", "Data Police", "timeboard", "Orders must be archived"),
        definition("payments_settled", "Data Police", "timeboard", "Payments must settle"),
    ];

    let first = publisher.reconcile_dashboard(&definitions).await.unwrap();
    assert_eq!(first.descriptions_updated, 1);

    let second = publisher.reconcile_dashboard(&definitions).await.unwrap();
    assert_eq!(second.descriptions_updated, 0);

    let fake = state.lock().unwrap();
    assert_eq!(fake.description_updates, 1);
    assert_eq!(
        fake.descriptions.get("bigeye.Data_Police.orders_archived").map(String::as_str),
        Some("Orders must be archived")
    );
}

#[tokio::test]
async fn test_reconcile_failure_names_publisher() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/dashboard"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;

    let definitions = vec![definition("orders_archived", "Data Police", "timeboard", "")];
    let err = publisher(&server, 100).reconcile_dashboard(&definitions).await.unwrap_err();

    assert_eq!(&*err.publisher, "datadog");
    assert!(err.to_string().contains("403"), "{err}");
}
