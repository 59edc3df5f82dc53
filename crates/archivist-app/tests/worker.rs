use std::io::Cursor;
use std::time::Duration;

use archivist_app::{AppError, BootstrapDependencies, run_with};
use archivist_config::ArchiverConfig;
use archivist_events::Event;
use archivist_test_support::StoreLayout;
use archivist_test_support::fixtures::ledger_lines;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(10);

fn config_for(layout: &StoreLayout) -> ArchiverConfig {
    let mut config = ArchiverConfig::default();
    config.datastore_root = layout.datastore().to_path_buf();
    config.archivestore_root = layout.archivestore().to_path_buf();
    config.worker.redelivery_delay = Duration::from_millis(20);
    config
}

fn input(lines: &[Vec<u8>]) -> Cursor<Vec<u8>> {
    let mut buffer = Vec::new();
    for line in lines {
        buffer.extend_from_slice(line);
        buffer.push(b'\n');
    }
    Cursor::new(buffer)
}

#[tokio::test]
async fn stdin_payloads_are_archived_until_eof() -> anyhow::Result<()> {
    let layout = StoreLayout::new()?;
    layout.write_source("a/one.dat", b"1")?;
    layout.write_source("a/two.dat", b"2")?;
    let deps = BootstrapDependencies::new(config_for(&layout), "edge-01")?;
    let mut events = deps.events().subscribe(None);
    let metrics = deps.metrics().clone();

    let lines = input(&[
        layout.payload("1", "a/one.dat"),
        Vec::new(),
        layout.payload("2", "a/two.dat"),
    ]);
    let summary = timeout(WAIT, run_with(deps, lines, std::future::pending())).await??;

    assert_eq!(summary.handled, 2);
    assert_eq!(summary.acked, 2);
    assert_eq!(ledger_lines(&layout.archive_path("a"))?.len(), 2);
    assert_eq!(metrics.snapshot().archived_total, 2);

    let mut stopped = None;
    while let Ok(Some(envelope)) = timeout(Duration::from_millis(200), events.next()).await {
        if let Event::WorkerStopped { subject, handled } = envelope.event {
            stopped = Some((subject, handled));
        }
    }
    assert_eq!(
        stopped,
        Some(("onglai-msg.archive.bucket.job.edge-01".to_string(), 2))
    );
    Ok(())
}

#[tokio::test]
async fn drop_policy_terminates_malformed_lines() -> anyhow::Result<()> {
    let layout = StoreLayout::new()?;
    let mut config = config_for(&layout);
    config.worker.permanent_failures = archivist_config::PermanentFailurePolicy::Drop;
    let deps = BootstrapDependencies::new(config, "edge-01")?;

    let lines = input(&[b"bad-payload-no-colon".to_vec()]);
    let summary = timeout(WAIT, run_with(deps, lines, std::future::pending())).await??;

    assert_eq!(summary.termed, 1);
    assert_eq!(summary.acked, 0);
    Ok(())
}

#[tokio::test]
async fn shutdown_signal_stops_a_worker_with_open_input() -> anyhow::Result<()> {
    let layout = StoreLayout::new()?;
    let deps = BootstrapDependencies::new(config_for(&layout), "edge-01")?;
    let (_writer, reader) = tokio::io::duplex(64);
    let reader = tokio::io::BufReader::new(reader);

    let summary = timeout(
        WAIT,
        run_with(deps, reader, tokio::time::sleep(Duration::from_millis(50))),
    )
    .await??;

    assert_eq!(summary.handled, 0);
    Ok(())
}

#[tokio::test]
async fn missing_storage_root_fails_startup() -> anyhow::Result<()> {
    let layout = StoreLayout::new()?;
    let mut config = config_for(&layout);
    config.archivestore_root = layout.root().join("absent");
    let deps = BootstrapDependencies::new(config, "edge-01")?;

    let result = run_with(deps, input(&[]), std::future::pending()).await;
    assert!(matches!(
        result,
        Err(AppError::Io {
            operation: "archivestore.inspect",
            ..
        })
    ));
    Ok(())
}
