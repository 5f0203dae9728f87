use std::fs;
use std::path::PathBuf;

use market::MarketDataProvider;
use market::provider::QueueProvider;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("chainpulse-{name}-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn line(minute: u32, ltp: f64) -> String {
    format!(
        r#"{{"instrument":{{"symbol":"NIFTY","marketType":"EQUITY","expiry":"2026-10-29"}},"timestamp":"2026-10-15T04:{minute:02}:00Z","ltp":{ltp},"strikes":[]}}"#
    )
}

#[tokio::test]
async fn archive_replays_snapshots_in_timestamp_order() {
    let dir = scratch_dir("ordered");
    fs::write(
        dir.join("NIFTY.jsonl"),
        [line(2, 24_020.0), String::new(), line(1, 24_010.0)].join("\n"),
    )
    .unwrap();

    let provider = QueueProvider::from_archive("archive", &dir, &["NIFTY".to_string()]).unwrap();
    assert_eq!(provider.remaining("NIFTY"), 2);

    let first = provider.fetch_snapshot("NIFTY").await.unwrap();
    let second = provider.fetch_snapshot("NIFTY").await.unwrap();
    assert_eq!(first.ltp(), 24_010.0);
    assert_eq!(second.ltp(), 24_020.0);

    assert!(provider.fetch_snapshot("NIFTY").await.is_err());

    fs::remove_dir_all(dir).ok();
}

#[test]
fn archive_rejects_foreign_symbols() {
    let dir = scratch_dir("foreign");
    fs::write(dir.join("BANKNIFTY.jsonl"), line(1, 24_010.0)).unwrap();

    let res = QueueProvider::from_archive("archive", &dir, &["BANKNIFTY".to_string()]);
    assert!(res.is_err());

    fs::remove_dir_all(dir).ok();
}

#[test]
fn missing_archive_file_is_an_error() {
    let dir = scratch_dir("missing");
    let res = QueueProvider::from_archive("archive", &dir, &["SENSEX".to_string()]);
    assert!(res.is_err());

    fs::remove_dir_all(dir).ok();
}
