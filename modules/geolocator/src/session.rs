// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use crate::source::{
    Accuracy, Capabilities, DistanceFilter, LocationSource, SourceEvent, SourceFactory,
};
use common::{
    error::{GeolocationError, Result},
    settings::{EnergySettings, GeolocatorConfig},
};
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tracing::{debug, info, warn};

/// Parameters of a continuous listening session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListenRequest {
    /// Minimum time between updates.
    pub min_time: Duration,
    /// Minimum distance in meters between updates.
    pub min_distance: f64,
    /// Also listen for compass headings.
    pub include_heading: bool,
    pub energy_settings: Option<EnergySettings>,
}

/// Progress of a deferred update request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeferralState {
    #[default]
    Idle,
    /// The source has been asked to defer updates and has not finished yet.
    Scheduled,
}

/// Which update stream a session runs on. Exactly one per session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum UpdateMode {
    Standard,
    SignificantChanges,
}

/// Source settings after applying the energy policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SourceSettings {
    pub accuracy: Accuracy,
    pub distance_filter: DistanceFilter,
}

/// Resolves the accuracy and distance filter a session source is configured with.
///
/// Deferred updates only work without distance filter and with best accuracy,
/// so both are forced if deferral is requested and supported. Otherwise the
/// caller's values are used unchanged.
pub fn resolve_source_settings(
    min_distance: f64,
    energy_settings: Option<&EnergySettings>,
    capabilities: &Capabilities,
    config: &GeolocatorConfig,
) -> SourceSettings {
    let defer = energy_settings.is_some_and(|s| s.defer_location_updates);
    if defer && capabilities.deferred_updates {
        return SourceSettings {
            accuracy: Accuracy::Best,
            distance_filter: DistanceFilter::None,
        };
    }
    SourceSettings {
        accuracy: Accuracy::Meters(config.desired_accuracy_meters),
        distance_filter: DistanceFilter::Meters(min_distance),
    }
}

/// A running continuous session and everything scoped to it.
struct ActiveSession {
    source: Box<dyn LocationSource>,
    events: UnboundedReceiver<SourceEvent>,
    energy_settings: Option<EnergySettings>,
    mode: UpdateMode,
    heading: bool,
    deferral: DeferralState,
}

impl ActiveSession {
    fn start(&mut self) {
        match self.mode {
            UpdateMode::Standard => self.source.start_updates(),
            UpdateMode::SignificantChanges => self.source.start_significant_change_updates(),
        }
        if self.heading {
            self.source.start_heading_updates();
        }
    }

    fn shutdown(&mut self) {
        if self.deferral == DeferralState::Scheduled {
            debug!("Cancel deferred updates of the stopped session");
            self.source.cancel_deferred_updates();
            self.deferral = DeferralState::Idle;
        }
        match self.mode {
            UpdateMode::Standard => self.source.stop_updates(),
            UpdateMode::SignificantChanges => self.source.stop_significant_change_updates(),
        }
        if self.heading {
            self.source.stop_heading_updates();
        }
    }
}

/// Session state: either idle or exactly one active session.
enum SessionState {
    Idle,
    Listening(Box<ActiveSession>),
}

/// Owns the lifecycle of the continuous listening session.
///
/// At most one session is active at a time. Stopping a session releases its
/// source and discards its energy settings and pending source events, so a
/// subsequent start never sees state of the previous session.
///
/// Not synchronized: every call has to come from the task that owns the manager.
pub struct SessionManager {
    state: SessionState,
    capabilities: Capabilities,
}

impl SessionManager {
    pub fn new(capabilities: Capabilities) -> Self {
        SessionManager {
            state: SessionState::Idle,
            capabilities,
        }
    }

    pub fn is_listening(&self) -> bool {
        matches!(self.state, SessionState::Listening(_))
    }

    /// Returns `true` between scheduling a deferral and the source finishing it.
    pub fn is_deferring_updates(&self) -> bool {
        self.deferral_state() == DeferralState::Scheduled
    }

    pub fn deferral_state(&self) -> DeferralState {
        match &self.state {
            SessionState::Listening(session) => session.deferral,
            SessionState::Idle => DeferralState::Idle,
        }
    }

    /// Energy settings of the active session.
    pub fn energy_settings(&self) -> Option<&EnergySettings> {
        match &self.state {
            SessionState::Listening(session) => session.energy_settings.as_ref(),
            SessionState::Idle => None,
        }
    }

    /// Starts a new session on a fresh source created by `factory`.
    ///
    /// # Errors
    ///
    /// * [`GeolocationError::InvalidArgument`] if `min_distance` is negative or not a number.
    /// * [`GeolocationError::AlreadyListening`] if a session is already active.
    ///   The active session is left untouched.
    pub fn start(
        &mut self,
        request: ListenRequest,
        factory: &dyn SourceFactory,
        config: &GeolocatorConfig,
    ) -> Result<()> {
        if request.min_distance.is_nan() || request.min_distance < 0.0 {
            return Err(GeolocationError::InvalidArgument(format!(
                "min_distance must be >= 0, got {}",
                request.min_distance
            )));
        }
        if self.is_listening() {
            return Err(GeolocationError::AlreadyListening);
        }

        let settings = resolve_source_settings(
            request.min_distance,
            request.energy_settings.as_ref(),
            &self.capabilities,
            config,
        );
        let significant = request
            .energy_settings
            .as_ref()
            .is_some_and(|s| s.listen_for_significant_changes);
        let mode = if significant && self.capabilities.significant_changes {
            UpdateMode::SignificantChanges
        } else {
            if significant {
                warn!("Significant change updates not supported, using standard updates");
            }
            UpdateMode::Standard
        };

        let (sink, events) = unbounded_channel();
        let mut source = factory.create(sink);
        if self.capabilities.background_updates {
            source.set_allows_background_updates(config.allows_background_updates);
        }
        if self.capabilities.pause_updates {
            source.set_pauses_automatically(config.pauses_automatically);
        }
        source.set_desired_accuracy(settings.accuracy);
        source.set_distance_filter(settings.distance_filter);

        info!(
            "Start listening. mode: {:?}, accuracy: {:?}, distance filter: {:?}, min time: {:?}",
            mode, settings.accuracy, settings.distance_filter, request.min_time
        );
        self.state = SessionState::Listening(Box::new(ActiveSession {
            source,
            events,
            energy_settings: request.energy_settings,
            mode,
            heading: request.include_heading && factory.heading_available(),
            deferral: DeferralState::Idle,
        }));
        if let SessionState::Listening(session) = &mut self.state {
            session.start();
        }
        Ok(())
    }

    /// Stops the active session. Returns `false` if there was none.
    pub fn stop(&mut self) -> bool {
        let SessionState::Listening(session) = &mut self.state else {
            return false;
        };
        session.shutdown();
        self.state = SessionState::Idle;
        info!("Stopped listening");
        true
    }

    /// Schedules a deferral after fixes were accepted, if the session asks
    /// for it and no deferral is pending yet.
    pub fn on_fixes_accepted(&mut self) {
        let SessionState::Listening(session) = &mut self.state else {
            return;
        };
        if !self.capabilities.deferred_updates || session.deferral != DeferralState::Idle {
            return;
        }
        let Some((distance, time)) = session
            .energy_settings
            .as_ref()
            .filter(|s| s.defer_location_updates)
            .map(|s| (s.deferral_distance_meters, s.deferral_time))
        else {
            return;
        };
        debug!("Defer updates. distance: {:?}, time: {:?}", distance, time);
        session.source.schedule_deferred_updates(distance, time);
        session.deferral = DeferralState::Scheduled;
    }

    /// Handles the source callback that a deferral has ended.
    pub fn on_deferral_finished(&mut self, error: Option<String>) {
        if let Some(error) = error {
            warn!("Deferred updates finished with error: {}", error);
        }
        if let SessionState::Listening(session) = &mut self.state {
            session.deferral = DeferralState::Idle;
        }
    }

    /// Waits for the next event of the active session's source.
    ///
    /// Never completes while no session is active.
    pub async fn next_event(&mut self) -> SourceEvent {
        if let SessionState::Listening(session) = &mut self.state
            && let Some(event) = session.events.recv().await
        {
            return event;
        }
        std::future::pending::<SourceEvent>().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defer() -> EnergySettings {
        EnergySettings {
            defer_location_updates: true,
            ..Default::default()
        }
    }

    #[test]
    fn deferral_forces_best_accuracy_without_filter() {
        let settings = resolve_source_settings(
            25.0,
            Some(&defer()),
            &Capabilities::all(),
            &GeolocatorConfig::default(),
        );
        assert_eq!(settings.accuracy, Accuracy::Best);
        assert_eq!(settings.distance_filter, DistanceFilter::None);
    }

    #[test]
    fn unsupported_deferral_keeps_caller_values() {
        let settings = resolve_source_settings(
            25.0,
            Some(&defer()),
            &Capabilities::default(),
            &GeolocatorConfig::default(),
        );
        assert_eq!(settings.accuracy, Accuracy::Meters(100.0));
        assert_eq!(settings.distance_filter, DistanceFilter::Meters(25.0));
    }

    #[test]
    fn no_energy_settings_keeps_caller_values() {
        let config = GeolocatorConfig {
            desired_accuracy_meters: 10.0,
            ..Default::default()
        };
        let settings = resolve_source_settings(0.0, None, &Capabilities::all(), &config);
        assert_eq!(settings.accuracy, Accuracy::Meters(10.0));
        assert_eq!(settings.distance_filter, DistanceFilter::Meters(0.0));
    }
}
