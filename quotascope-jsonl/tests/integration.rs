use chrono::NaiveDate;
use quotascope::telemetry::{boxed, emit_best_effort, FetchEvent};
use quotascope::{Quota, QuotaDefinition, QuotaResponse, Service};
use quotascope_jsonl::{report_file_name, write_quota_lines, write_report, JsonlSink, ReportKind};
use tower_service::Service as _;

fn quota(code: &str) -> Quota {
    let def = QuotaDefinition {
        quota_code: code.into(),
        quota_name: format!("quota {code}"),
        value: Some(10.0),
        ..Default::default()
    };
    Quota::from_definition("us-east-1", &Service::new("ec2", "Amazon EC2"), &def)
}

#[tokio::test]
async fn writes_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.log");
    let mut sink = JsonlSink::new(path.to_string_lossy().to_string());

    sink.call(FetchEvent::CacheMiss { key: "quotas:all:ec2".into() }).await.unwrap();
    sink.call(FetchEvent::RegionFailed { region: "eu-west-1".into(), error: "boom".into() })
        .await
        .unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<serde_json::Value> =
        contents.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["kind"], "cache_miss");
    assert_eq!(lines[1]["region"], "eu-west-1");
}

#[tokio::test]
async fn works_as_a_boxed_sink() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.log");
    let sink = boxed(JsonlSink::new(path.to_string_lossy().to_string()));

    emit_best_effort(sink, FetchEvent::CacheCleared { entries: 3 }).await;

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("cache_cleared"));
}

#[tokio::test]
async fn unwritable_path_is_swallowed_by_best_effort_emit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("events.log");
    let sink = boxed(JsonlSink::new(path.to_string_lossy().to_string()));

    emit_best_effort(sink, FetchEvent::CacheHit { key: "regions".into() }).await;

    assert!(!path.exists());
}

#[tokio::test]
async fn report_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.json");
    let response = QuotaResponse::new(vec![quota("L-1"), quota("L-2")], vec![], true);

    write_report(&path, &response).await.unwrap();

    let read: QuotaResponse =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(read.total, 2);
    assert!(read.from_cache);
    assert_eq!(read.quotas, response.quotas);
}

#[tokio::test]
async fn quota_lines_hold_one_quota_each() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quotas.jsonl");

    write_quota_lines(&path, &[quota("L-1"), quota("L-2"), quota("L-3")]).await.unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let codes: Vec<String> = contents
        .lines()
        .map(|l| serde_json::from_str::<Quota>(l).unwrap().quota_code)
        .collect();
    assert_eq!(codes, ["L-1", "L-2", "L-3"]);
}

#[test]
fn report_names_carry_the_date() {
    let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
    assert_eq!(report_file_name(ReportKind::Json, date), "quotas-2026-03-07.json");
    assert_eq!(report_file_name(ReportKind::Jsonl, date), "quotas-2026-03-07.jsonl");
}
