// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! Scripted location source for tests.

use crate::source::{
    Accuracy, AuthorizationStatus, DistanceFilter, LocationSource, SourceEvent, SourceFactory,
    SourceSink,
};
use common::position::RawFix;
use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

/// Calls the fake sources of one factory received, summed over all sources.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SourceLog {
    pub created: usize,
    pub dropped: usize,
    pub start_updates: usize,
    pub stop_updates: usize,
    pub start_heading: usize,
    pub stop_heading: usize,
    pub start_significant: usize,
    pub stop_significant: usize,
    pub scheduled_deferrals: Vec<(Option<f64>, Option<Duration>)>,
    pub cancelled_deferrals: usize,
    pub desired_accuracy: Option<Accuracy>,
    pub distance_filter: Option<DistanceFilter>,
    pub pauses_automatically: Option<bool>,
    pub allows_background_updates: Option<bool>,
}

impl SourceLog {
    /// Number of sources with started updates that have not been stopped.
    pub fn running(&self) -> usize {
        (self.start_updates + self.start_significant)
            .saturating_sub(self.stop_updates + self.stop_significant)
    }
}

struct FakeState {
    log: SourceLog,
    sinks: Vec<SourceSink>,
    heading_available: bool,
    authorization: AuthorizationStatus,
    fix_on_start: Option<RawFix>,
}

/// Factory of fake sources that record every call and deliver injected events.
#[derive(Clone)]
pub struct FakeSourceFactory {
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakeSourceFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeSourceFactory {
    /// Authorized platform with heading support.
    pub fn new() -> Self {
        FakeSourceFactory {
            state: Arc::new(Mutex::new(FakeState {
                log: SourceLog::default(),
                sinks: vec![],
                heading_available: true,
                authorization: AuthorizationStatus::AuthorizedWhenInUse,
                fix_on_start: None,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|state| state.into_inner())
    }

    pub fn set_heading_available(&self, available: bool) {
        self.state().heading_available = available;
    }

    pub fn set_authorization(&self, status: AuthorizationStatus) {
        self.state().authorization = status;
    }

    /// Every source reports `fix` as soon as its updates are started.
    pub fn set_fix_on_start(&self, fix: Option<RawFix>) {
        self.state().fix_on_start = fix;
    }

    pub fn log(&self) -> SourceLog {
        self.state().log.clone()
    }

    /// Delivers `event` as if reported by the most recently created source.
    pub fn emit(&self, event: SourceEvent) {
        let state = self.state();
        let sink = state
            .sinks
            .last()
            .expect("No fake source has been created yet");
        let _ = sink.send(event);
    }

    /// Waits until `count` sources have started their updates.
    ///
    /// # Panics
    ///
    /// Panics if this doesn't happen within 100ms.
    pub async fn wait_for_started(&self, count: usize) {
        for _ in 0..100 {
            let log = self.log();
            if log.start_updates + log.start_significant >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("Fake source not started {} times: {:?}", count, self.log());
    }
}

impl SourceFactory for FakeSourceFactory {
    fn create(&self, sink: SourceSink) -> Box<dyn LocationSource> {
        let mut state = self.state();
        state.log.created += 1;
        state.sinks.push(sink.clone());
        Box::new(FakeLocationSource {
            sink,
            state: self.state.clone(),
        })
    }

    fn heading_available(&self) -> bool {
        self.state().heading_available
    }

    fn authorization_status(&self) -> AuthorizationStatus {
        self.state().authorization
    }
}

struct FakeLocationSource {
    sink: SourceSink,
    state: Arc<Mutex<FakeState>>,
}

impl FakeLocationSource {
    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|state| state.into_inner())
    }
}

impl LocationSource for FakeLocationSource {
    fn start_updates(&mut self) {
        let fix = {
            let mut state = self.state();
            state.log.start_updates += 1;
            state.fix_on_start
        };
        if let Some(fix) = fix {
            let _ = self.sink.send(SourceEvent::FixesUpdated(vec![fix]));
        }
    }

    fn stop_updates(&mut self) {
        self.state().log.stop_updates += 1;
    }

    fn start_heading_updates(&mut self) {
        self.state().log.start_heading += 1;
    }

    fn stop_heading_updates(&mut self) {
        self.state().log.stop_heading += 1;
    }

    fn start_significant_change_updates(&mut self) {
        self.state().log.start_significant += 1;
    }

    fn stop_significant_change_updates(&mut self) {
        self.state().log.stop_significant += 1;
    }

    fn schedule_deferred_updates(&mut self, max_distance: Option<f64>, max_time: Option<Duration>) {
        self.state()
            .log
            .scheduled_deferrals
            .push((max_distance, max_time));
    }

    fn cancel_deferred_updates(&mut self) {
        self.state().log.cancelled_deferrals += 1;
    }

    fn set_desired_accuracy(&mut self, accuracy: Accuracy) {
        self.state().log.desired_accuracy = Some(accuracy);
    }

    fn set_distance_filter(&mut self, filter: DistanceFilter) {
        self.state().log.distance_filter = Some(filter);
    }

    fn set_pauses_automatically(&mut self, pauses: bool) {
        self.state().log.pauses_automatically = Some(pauses);
    }

    fn set_allows_background_updates(&mut self, allowed: bool) {
        self.state().log.allows_background_updates = Some(allowed);
    }
}

impl Drop for FakeLocationSource {
    fn drop(&mut self) {
        self.state().log.dropped += 1;
    }
}
