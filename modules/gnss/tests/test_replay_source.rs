// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use geolocator::{DistanceFilter, LocationSource, SourceEvent, SourceFactory};
use gnss::replay_source::{
    REPLAY_ACCURACY_METERS, ReplayPoint, ReplaySourceFactory, read_track_file,
};
use std::time::Duration;
use tokio::{
    sync::mpsc::{UnboundedReceiver, unbounded_channel},
    time::timeout,
};

const TIMEOUT_MS: u64 = 100;
const VELOCITY: f64 = 2.77778;

fn track() -> Vec<ReplayPoint> {
    vec![
        ReplayPoint {
            latitude: 52.026649,
            longitude: 11.282535,
        },
        ReplayPoint {
            latitude: 52.026751,
            longitude: 11.282047,
        },
        ReplayPoint {
            latitude: 52.026807,
            longitude: 11.281746,
        },
    ]
}

fn create_source(
    points: Vec<ReplayPoint>,
) -> (Box<dyn LocationSource>, UnboundedReceiver<SourceEvent>) {
    let factory = ReplaySourceFactory::new(points, VELOCITY, Duration::from_millis(10))
        .expect("Failed to create replay factory");
    let (sink, events) = unbounded_channel();
    (factory.create(sink), events)
}

async fn next_event(events: &mut UnboundedReceiver<SourceEvent>) -> SourceEvent {
    timeout(Duration::from_millis(TIMEOUT_MS), events.recv())
        .await
        .expect("No source event received in time")
        .expect("Source event channel closed")
}

async fn expect_silence(events: &mut UnboundedReceiver<SourceEvent>, millis: u64) {
    if let Ok(event) = timeout(Duration::from_millis(millis), events.recv()).await {
        panic!("Unexpected source event {:?}", event);
    }
}

#[test]
fn report_creation_error_with_empty_points() {
    assert!(ReplaySourceFactory::new(vec![], VELOCITY, Duration::from_millis(10)).is_err());
}

#[test]
fn report_creation_error_with_zero_interval() {
    assert!(ReplaySourceFactory::new(track(), VELOCITY, Duration::ZERO).is_err());
}

#[test]
fn report_creation_error_with_invalid_velocity() {
    for velocity in [f64::INFINITY, f64::NAN, -1.0] {
        let result = ReplaySourceFactory::new(track(), velocity, Duration::from_millis(10));
        assert_eq!(
            result.err().map(|e| e.kind()),
            Some(std::io::ErrorKind::InvalidInput),
            "velocity {} accepted",
            velocity
        );
    }
    assert!(ReplaySourceFactory::new(track(), 0.0, Duration::from_millis(10)).is_ok());
}

#[tokio::test]
async fn interpolate_from_first_point() {
    let (mut source, mut events) = create_source(track());
    source.start_updates();

    let SourceEvent::FixesUpdated(fixes) = next_event(&mut events).await else {
        panic!("Expected a fix");
    };
    assert_eq!(fixes.len(), 1);
    let fix = fixes[0];
    assert!((fix.latitude - 52.026649).abs() < 1e-5);
    assert!((fix.longitude - 11.282535).abs() < 1e-5);
    assert!(fix.latitude > 52.026649);
    assert_eq!(fix.horizontal_accuracy, REPLAY_ACCURACY_METERS);
    assert_eq!(fix.speed, VELOCITY);
    assert!(fix.vertical_accuracy < 0.0);
}

#[tokio::test]
async fn report_heading_towards_next_point_when_enabled() {
    let (mut source, mut events) = create_source(track());
    source.start_heading_updates();
    source.start_updates();

    let SourceEvent::HeadingUpdated(Some(heading)) = next_event(&mut events).await else {
        panic!("Expected a heading");
    };
    assert!(
        heading.true_heading > 270.0 && heading.true_heading < 360.0,
        "heading was {}",
        heading.true_heading
    );
    assert!(heading.accuracy >= 0.0);
    assert!(matches!(
        next_event(&mut events).await,
        SourceEvent::FixesUpdated(_)
    ));
}

#[tokio::test]
async fn no_heading_without_heading_updates() {
    let (mut source, mut events) = create_source(track());
    source.start_updates();

    for _ in 0..3 {
        assert!(matches!(
            next_event(&mut events).await,
            SourceEvent::FixesUpdated(_)
        ));
    }
}

#[tokio::test]
async fn distance_filter_suppresses_stationary_fixes() {
    let (mut source, mut events) = create_source(vec![ReplayPoint {
        latitude: 52.0,
        longitude: 11.0,
    }]);
    source.set_distance_filter(DistanceFilter::Meters(10.0));
    source.start_updates();

    assert!(matches!(
        next_event(&mut events).await,
        SourceEvent::FixesUpdated(_)
    ));
    expect_silence(&mut events, 50).await;
}

#[tokio::test]
async fn no_fixes_after_stop() {
    let (mut source, mut events) = create_source(track());
    source.start_updates();
    next_event(&mut events).await;

    source.stop_updates();
    while events.try_recv().is_ok() {}
    expect_silence(&mut events, 50).await;
}

#[tokio::test]
async fn finish_deferral_after_max_time() {
    let (mut source, mut events) = create_source(track());
    source.schedule_deferred_updates(Some(100.0), Some(Duration::from_millis(20)));

    assert_eq!(
        next_event(&mut events).await,
        SourceEvent::DeferralFinished(None)
    );
}

#[tokio::test]
async fn cancelled_deferral_never_finishes() {
    let (mut source, mut events) = create_source(track());
    source.schedule_deferred_updates(None, Some(Duration::from_millis(20)));
    source.cancel_deferred_updates();

    expect_silence(&mut events, 50).await;
}

#[test]
fn read_longitude_latitude_records() {
    let path = std::env::temp_dir().join(format!("replay_track_{}.csv", std::process::id()));
    std::fs::write(&path, "lon,lat\n11.282535,52.026649\n11.282047, 52.026751\n")
        .expect("Failed to write track file");

    let points = read_track_file(&path);
    let _ = std::fs::remove_file(&path);

    assert_eq!(points.expect("Failed to read track file"), track()[..2].to_vec());
}

#[test]
fn report_invalid_track_records() {
    let path = std::env::temp_dir().join(format!("replay_invalid_{}.csv", std::process::id()));
    std::fs::write(&path, "lon,lat\neast,north\n").expect("Failed to write track file");

    let points = read_track_file(&path);
    let _ = std::fs::remove_file(&path);

    assert!(points.is_err());
}
