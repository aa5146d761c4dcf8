#![allow(missing_docs)]

mod common;

use common::{engine, quota_def, regions, FakeProvider, RegionData};
use quotascope::prelude::*;
use std::io;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for SharedBuf {
    type Writer = SharedBuf;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn capture() -> (SharedBuf, tracing::subscriber::DefaultGuard) {
    let buf = SharedBuf::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buf.clone())
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (buf, guard)
}

#[tokio::test]
async fn region_failure_and_skipped_service_are_warnings() {
    let (buf, _guard) = capture();
    let provider = FakeProvider::new()
        .region(
            "us-east-1",
            RegionData::new()
                .service("ec2", "Amazon EC2", vec![quota_def("A", "A", 1.0, false)])
                .service("vpc", "Amazon VPC", vec![])
                .failing_quotas("vpc"),
        )
        .failing_connect("eu-west-1");
    let engine = engine(provider);

    let result =
        engine.aggregate(&regions(&["us-east-1", "eu-west-1"]), "", &CancellationToken::new()).await;
    assert_eq!(result.warnings.len(), 1);

    let logs = buf.contents();
    let warn_lines: Vec<_> = logs.lines().filter(|l| l.contains("WARN")).collect();
    assert!(warn_lines
        .iter()
        .any(|l| l.contains("quotascope::engine") && l.contains("eu-west-1")));
    assert!(warn_lines
        .iter()
        .any(|l| l.contains("quotascope::fetcher") && l.contains("skipping service")));
    assert!(logs.contains("aggregation finished"));
}

#[tokio::test]
async fn missing_usage_is_only_diagnostic() {
    let (buf, _guard) = capture();
    let provider = FakeProvider::new().region(
        "us-east-1",
        RegionData::new().service(
            "ec2",
            "Amazon EC2",
            // Probe registered, but the inventory cannot count it.
            vec![quota_def("L-0263D0A3", "EC2-VPC Elastic IPs", 5.0, false)],
        ),
    );
    let engine = engine(provider);

    let result = engine.aggregate(&regions(&["us-east-1"]), "ec2", &CancellationToken::new()).await;

    assert!(result.warnings.is_empty());
    assert!(!result.quotas[0].has_usage_metrics);
    let logs = buf.contents();
    assert!(!logs.lines().any(|l| l.contains("WARN") || l.contains("ERROR")));
    assert!(logs.lines().any(|l| l.contains("DEBUG") && l.contains("quotascope::usage")));
}
