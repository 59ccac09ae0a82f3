//! Sentinel marker semantics: atomic writes, claim-once consumption, and
//! cancellable waits.

use std::sync::{Arc, Barrier};
use std::time::Duration;

use pantry_session::sentinel::writer::write_atomic;
use pantry_session::sentinel::{Marker, SentinelChannel};
use tokio_util::sync::CancellationToken;

fn dir_entries(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn marker_files_match_main_stage_names() {
    assert_eq!(Marker::GuiClosed.file_name(), "GUI_closed.txt");
    assert_eq!(Marker::GuiLoggedOut.file_name(), "GUI_logged_out.txt");
    assert_eq!(Marker::InitialGuiClosed.file_name(), "initial_gui_closed.txt");
    assert_eq!(Marker::ManagementSignal.file_name(), "management_signal.txt");
}

#[test]
fn signal_writes_the_main_stage_file_name() {
    let temp = tempfile::tempdir().expect("tempdir");
    let channel = SentinelChannel::new(temp.path());

    channel.signal(Marker::GuiClosed, None).expect("signal");
    channel.signal(Marker::GuiLoggedOut, None).expect("signal");

    assert_eq!(
        dir_entries(temp.path()),
        vec!["GUI_closed.txt", "GUI_logged_out.txt"]
    );
}

#[test]
fn marker_written_by_main_stage_is_consumed() {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(temp.path().join("GUI_closed.txt"), "").expect("write");
    let channel = SentinelChannel::new(temp.path());

    assert_eq!(
        channel.consume(Marker::GuiClosed).expect("consume").as_deref(),
        Some("")
    );
    assert!(dir_entries(temp.path()).is_empty());
}

#[test]
fn poll_does_not_remove_marker() {
    let temp = tempfile::tempdir().expect("tempdir");
    let channel = SentinelChannel::new(temp.path());

    channel
        .signal(Marker::ManagementSignal, Some("In button clicked"))
        .expect("signal");

    assert_eq!(
        channel.poll(Marker::ManagementSignal).expect("poll").as_deref(),
        Some("In button clicked")
    );
    assert!(channel.path(Marker::ManagementSignal).exists());
}

#[test]
fn consume_returns_payload_once() {
    let temp = tempfile::tempdir().expect("tempdir");
    let channel = SentinelChannel::new(temp.path());
    channel
        .signal(Marker::ManagementSignal, Some("Out button clicked"))
        .expect("signal");

    let first = channel.consume(Marker::ManagementSignal).expect("consume");
    let second = channel.consume(Marker::ManagementSignal).expect("consume");

    assert_eq!(first.as_deref(), Some("Out button clicked"));
    assert_eq!(second, None);
    assert!(dir_entries(temp.path()).is_empty(), "no claim files left behind");
}

#[test]
fn marker_without_payload_reads_empty() {
    let temp = tempfile::tempdir().expect("tempdir");
    let channel = SentinelChannel::new(temp.path());
    channel.signal(Marker::GuiClosed, None).expect("signal");

    assert_eq!(
        channel.consume(Marker::GuiClosed).expect("consume").as_deref(),
        Some("")
    );
}

#[test]
fn consume_of_absent_marker_is_none() {
    let temp = tempfile::tempdir().expect("tempdir");
    let channel = SentinelChannel::new(temp.path());
    assert_eq!(channel.consume(Marker::GuiLoggedOut).expect("consume"), None);
}

#[test]
fn clear_reports_whether_marker_existed() {
    let temp = tempfile::tempdir().expect("tempdir");
    let channel = SentinelChannel::new(temp.path());

    assert!(!channel.clear(Marker::InitialGuiClosed).expect("clear"));
    channel.signal(Marker::InitialGuiClosed, None).expect("signal");
    assert!(channel.clear(Marker::InitialGuiClosed).expect("clear"));
    assert!(!channel.path(Marker::InitialGuiClosed).exists());
}

#[test]
fn signal_overwrites_existing_marker() {
    let temp = tempfile::tempdir().expect("tempdir");
    let channel = SentinelChannel::new(temp.path());
    channel
        .signal(Marker::ManagementSignal, Some("In button clicked"))
        .expect("signal");
    channel
        .signal(Marker::ManagementSignal, Some("Out button clicked"))
        .expect("signal");

    assert_eq!(
        channel.consume(Marker::ManagementSignal).expect("consume").as_deref(),
        Some("Out button clicked")
    );
}

#[test]
fn concurrent_consumers_claim_a_signal_at_most_once() {
    let temp = tempfile::tempdir().expect("tempdir");
    let channel = SentinelChannel::new(temp.path());

    for _ in 0..20 {
        channel.signal(Marker::GuiClosed, None).expect("signal");

        let barrier = Arc::new(Barrier::new(8));
        let claimed: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let channel = channel.clone();
                    let barrier = Arc::clone(&barrier);
                    scope.spawn(move || {
                        barrier.wait();
                        channel.consume(Marker::GuiClosed).expect("consume").is_some()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| usize::from(handle.join().expect("join")))
                .sum()
        });

        assert_eq!(claimed, 1, "exactly one consumer must claim the marker");
    }
    assert!(dir_entries(temp.path()).is_empty());
}

#[test]
fn write_atomic_creates_parent_directory() {
    let temp = tempfile::tempdir().expect("tempdir");
    let target = temp.path().join("nested").join("marker.txt");

    write_atomic(&target, "payload").expect("write");

    assert_eq!(std::fs::read_to_string(&target).expect("read"), "payload");
    assert_eq!(dir_entries(&temp.path().join("nested")), vec!["marker.txt"]);
}

#[tokio::test]
async fn wait_returns_marker_written_later() {
    let temp = tempfile::tempdir().expect("tempdir");
    let channel = SentinelChannel::new(temp.path());
    let writer = channel.clone();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        writer
            .signal(Marker::GuiLoggedOut, None)
            .expect("signal");
    });

    let cancel = CancellationToken::new();
    let received = tokio::time::timeout(
        Duration::from_secs(5),
        channel.wait(Marker::GuiLoggedOut, Duration::from_millis(10), &cancel),
    )
    .await
    .expect("wait completes")
    .expect("wait succeeds");

    assert_eq!(received.as_deref(), Some(""));
    assert!(!channel.path(Marker::GuiLoggedOut).exists());
}

#[tokio::test]
async fn wait_returns_none_when_cancelled() {
    let temp = tempfile::tempdir().expect("tempdir");
    let channel = SentinelChannel::new(temp.path());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.cancel();
    });

    let received = tokio::time::timeout(
        Duration::from_secs(5),
        channel.wait(Marker::GuiClosed, Duration::from_secs(60), &cancel),
    )
    .await
    .expect("wait completes")
    .expect("wait succeeds");

    assert_eq!(received, None);
}

#[tokio::test]
async fn cancelled_wait_leaves_marker_in_place() {
    let temp = tempfile::tempdir().expect("tempdir");
    let channel = SentinelChannel::new(temp.path());
    channel.signal(Marker::GuiClosed, None).expect("signal");

    let cancel = CancellationToken::new();
    cancel.cancel();
    let received = channel
        .wait(Marker::GuiClosed, Duration::from_millis(10), &cancel)
        .await
        .expect("wait succeeds");

    assert_eq!(received, None);
    assert!(channel.path(Marker::GuiClosed).exists());
}
