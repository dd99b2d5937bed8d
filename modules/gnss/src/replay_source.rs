// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use crate::geo::{MovementFilter, bearing, distance};
use chrono::Utc;
use common::position::{RawFix, RawHeading};
use geolocator::{
    Accuracy, AuthorizationStatus, Capabilities, DistanceFilter, LocationSource, SourceEvent,
    SourceFactory, SourceSink,
};
use std::{
    io::{Error, ErrorKind},
    path::Path,
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::task::JoinHandle;
use tracing::debug;

/// Accuracy in meters reported for every replayed fix.
pub const REPLAY_ACCURACY_METERS: f64 = 5.0;

/// A coordinate of a replayed track.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReplayPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Reads a track from a CSV file with a header line and the columns
/// longitude, latitude.
pub fn read_track_file(path: &Path) -> Result<Vec<ReplayPoint>, Error> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut points = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let (Some(lon), Some(lat)) = (record.get(0), record.get(1)) else {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("Track record {:?} has less than two columns", record),
            ));
        };
        let parse = |value: &str| {
            f64::from_str(value.trim()).map_err(|e| Error::new(ErrorKind::InvalidData, e))
        };
        points.push(ReplayPoint {
            longitude: parse(lon)?,
            latitude: parse(lat)?,
        });
    }
    debug!("Read {} track points from {:?}", points.len(), path);
    Ok(points)
}

/// Moves along the track with constant velocity and reports a fix per tick.
struct ReplayRuntime {
    points: Arc<Vec<ReplayPoint>>,
    next_point: usize,
    current: ReplayPoint,
    velocity: f64,
    interval: Duration,
    heading_enabled: Arc<AtomicBool>,
    movement: MovementFilter,
    sink: SourceSink,
}

impl ReplayRuntime {
    fn advance(&mut self) {
        let mut remaining = self.velocity * self.interval.as_secs_f64();
        while remaining > 0.0 && self.points.len() > 1 {
            let target = self.points[self.next_point];
            let to_target = distance(
                self.current.latitude,
                self.current.longitude,
                target.latitude,
                target.longitude,
            );
            if to_target <= remaining {
                self.current = target;
                self.next_point = (self.next_point + 1) % self.points.len();
                remaining -= to_target;
                if to_target == 0.0 && self.next_point == 0 {
                    break;
                }
            } else {
                let fraction = remaining / to_target;
                self.current.latitude += (target.latitude - self.current.latitude) * fraction;
                self.current.longitude += (target.longitude - self.current.longitude) * fraction;
                remaining = 0.0;
            }
        }
    }

    fn handle_tick(&mut self) {
        self.advance();
        if self.heading_enabled.load(Ordering::Relaxed) {
            let target = self.points[self.next_point];
            let heading = RawHeading {
                true_heading: bearing(
                    self.current.latitude,
                    self.current.longitude,
                    target.latitude,
                    target.longitude,
                ),
                accuracy: 1.0,
            };
            let _ = self.sink.send(SourceEvent::HeadingUpdated(Some(heading)));
        }
        if !self
            .movement
            .admit(self.current.latitude, self.current.longitude)
        {
            return;
        }
        let fix = RawFix {
            latitude: self.current.latitude,
            longitude: self.current.longitude,
            altitude: 0.0,
            horizontal_accuracy: REPLAY_ACCURACY_METERS,
            vertical_accuracy: -1.0,
            speed: self.velocity,
            timestamp: Utc::now(),
        };
        let _ = self.sink.send(SourceEvent::FixesUpdated(vec![fix]));
    }
}

async fn replay_task(mut runtime: ReplayRuntime) {
    let mut timer = tokio::time::interval(runtime.interval);
    loop {
        timer.tick().await;
        runtime.handle_tick();
    }
}

/// A location source replaying a recorded track.
pub struct ReplayLocationSource {
    points: Arc<Vec<ReplayPoint>>,
    velocity: f64,
    interval: Duration,
    sink: SourceSink,
    distance_filter: DistanceFilter,
    heading_enabled: Arc<AtomicBool>,
    replay: Option<JoinHandle<()>>,
    deferral: Option<JoinHandle<()>>,
}

impl LocationSource for ReplayLocationSource {
    fn start_updates(&mut self) {
        if self.replay.is_some() {
            return;
        }
        let runtime = ReplayRuntime {
            points: self.points.clone(),
            next_point: 1 % self.points.len(),
            current: self.points[0],
            velocity: self.velocity,
            interval: self.interval,
            heading_enabled: self.heading_enabled.clone(),
            movement: MovementFilter::new(self.distance_filter),
            sink: self.sink.clone(),
        };
        self.replay = Some(tokio::spawn(async move { replay_task(runtime).await }));
    }

    fn stop_updates(&mut self) {
        if let Some(replay) = self.replay.take() {
            replay.abort();
        }
    }

    fn start_heading_updates(&mut self) {
        self.heading_enabled.store(true, Ordering::Relaxed);
    }

    fn stop_heading_updates(&mut self) {
        self.heading_enabled.store(false, Ordering::Relaxed);
    }

    /// Only the time limit is honored, the replayed fixes are delivered as
    /// they occur.
    fn schedule_deferred_updates(&mut self, max_distance: Option<f64>, max_time: Option<Duration>) {
        self.cancel_deferred_updates();
        debug!(
            "Replay deferral scheduled, distance: {:?}, time: {:?}",
            max_distance, max_time
        );
        let Some(max_time) = max_time else { return };
        let sink = self.sink.clone();
        self.deferral = Some(tokio::spawn(async move {
            tokio::time::sleep(max_time).await;
            let _ = sink.send(SourceEvent::DeferralFinished(None));
        }));
    }

    fn cancel_deferred_updates(&mut self) {
        if let Some(deferral) = self.deferral.take() {
            deferral.abort();
        }
    }

    fn set_desired_accuracy(&mut self, accuracy: Accuracy) {
        debug!(
            "Replay accuracy is fixed to {}m, requested {:?}",
            REPLAY_ACCURACY_METERS, accuracy
        );
    }

    fn set_distance_filter(&mut self, filter: DistanceFilter) {
        self.distance_filter = filter;
    }
}

impl Drop for ReplayLocationSource {
    fn drop(&mut self) {
        self.stop_updates();
        self.cancel_deferred_updates();
    }
}

/// Creates [`ReplayLocationSource`]s for a recorded track.
pub struct ReplaySourceFactory {
    points: Arc<Vec<ReplayPoint>>,
    velocity: f64,
    interval: Duration,
}

impl ReplaySourceFactory {
    /// Replays `points` with `velocity` in m/s, reporting a fix every `interval`.
    pub fn new(points: Vec<ReplayPoint>, velocity: f64, interval: Duration) -> Result<Self, Error> {
        if points.is_empty() {
            return Err(Error::new(ErrorKind::InvalidData, "points parameter is empty"));
        }
        if interval.is_zero() {
            return Err(Error::new(ErrorKind::InvalidInput, "interval must not be zero"));
        }
        if !velocity.is_finite() || velocity < 0.0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("velocity must be a finite, non-negative speed, got {}", velocity),
            ));
        }
        Ok(ReplaySourceFactory {
            points: Arc::new(points),
            velocity,
            interval,
        })
    }

    /// Features the replayed sources provide.
    pub fn capabilities() -> Capabilities {
        Capabilities {
            deferred_updates: true,
            ..Capabilities::default()
        }
    }
}

impl SourceFactory for ReplaySourceFactory {
    fn create(&self, sink: SourceSink) -> Box<dyn LocationSource> {
        Box::new(ReplayLocationSource {
            points: self.points.clone(),
            velocity: self.velocity,
            interval: self.interval,
            sink,
            distance_filter: DistanceFilter::None,
            heading_enabled: Arc::new(AtomicBool::new(false)),
            replay: None,
            deferral: None,
        })
    }

    fn heading_available(&self) -> bool {
        true
    }

    fn authorization_status(&self) -> AuthorizationStatus {
        AuthorizationStatus::AuthorizedWhenInUse
    }
}
