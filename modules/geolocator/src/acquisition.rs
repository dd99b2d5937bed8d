// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use crate::aggregator::PositionAggregator;
use crate::gate;
use crate::source::{Accuracy, Capabilities, LocationSource, SourceEvent, SourceFactory};
use common::{
    error::{GeolocationError, Result},
    position::{Position, RawFix, RawHeading},
    settings::GeolocatorConfig,
};
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Outcome state of a single acquisition. Leaves `Pending` exactly once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquisitionState {
    Pending,
    Resolved,
    Cancelled,
    TimedOut,
    Failed,
}

/// Parameters of a single position request.
#[derive(Clone, Debug)]
pub struct AcquisitionRequest {
    pub deadline: Option<Instant>,
    pub cancellation: Option<CancellationToken>,
    pub include_heading: bool,
    pub config: GeolocatorConfig,
    pub capabilities: Capabilities,
}

/// Validates a caller supplied timeout. `None` waits without limit, as does a
/// timeout too large to be represented as a deadline.
pub fn deadline_from_timeout(timeout: Option<Duration>) -> Result<Option<Instant>> {
    match timeout {
        Some(timeout) if timeout.is_zero() => Err(GeolocationError::InvalidArgument(
            "timeout must be positive or infinite".to_string(),
        )),
        Some(timeout) => Ok(Instant::now().checked_add(timeout)),
        None => Ok(None),
    }
}

/// Completes when the deadline is reached, never without one.
pub(crate) async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Completes when the token is cancelled, never without one.
pub(crate) async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

/// A source started for one acquisition. Stopped exactly once, at the latest
/// when it is dropped.
struct PrivateSource {
    source: Box<dyn LocationSource>,
    heading: bool,
    running: bool,
}

impl PrivateSource {
    fn start(mut source: Box<dyn LocationSource>, heading: bool) -> Self {
        source.start_updates();
        if heading {
            source.start_heading_updates();
        }
        PrivateSource {
            source,
            heading,
            running: true,
        }
    }

    fn release(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.source.stop_updates();
        if self.heading {
            self.source.stop_heading_updates();
        }
    }
}

impl Drop for PrivateSource {
    fn drop(&mut self) {
        self.release();
    }
}

enum Input {
    Cancelled,
    TimedOut,
    Event(Option<SourceEvent>),
}

/// Satisfies one position request on a private source.
///
/// Keeps the most accurate fix seen so far and resolves as soon as it meets
/// the desired accuracy and, if requested, a heading was received.
pub struct SingleAcquisition {
    source: PrivateSource,
    events: UnboundedReceiver<SourceEvent>,
    aggregator: PositionAggregator,
    desired_accuracy: f64,
    wants_heading: bool,
    best_heading_accuracy: Option<f64>,
    state: AcquisitionState,
}

impl SingleAcquisition {
    /// Runs a complete acquisition on a new source created by `factory`.
    ///
    /// The source is stopped and released on every outcome.
    ///
    /// # Errors
    ///
    /// * [`GeolocationError::Unauthorized`] if location access is or becomes denied.
    /// * [`GeolocationError::PositionUnavailable`] on a connectivity failure.
    /// * [`GeolocationError::Cancelled`] if the token is cancelled first.
    /// * [`GeolocationError::Timeout`] if the deadline elapses first.
    pub async fn acquire(factory: &dyn SourceFactory, request: AcquisitionRequest) -> Result<Position> {
        if factory.authorization_status().is_denied() {
            debug!("Location access denied, no private source started");
            return Err(GeolocationError::Unauthorized);
        }
        if request.cancellation.as_ref().is_some_and(|t| t.is_cancelled()) {
            return Err(GeolocationError::Cancelled);
        }

        SingleAcquisition::start(factory, &request)
            .run(request.deadline, request.cancellation.as_ref())
            .await
    }

    /// Creates, configures and starts the private source.
    fn start(factory: &dyn SourceFactory, request: &AcquisitionRequest) -> Self {
        let (sink, events) = unbounded_channel();
        let mut source = factory.create(sink);
        if request.capabilities.background_updates {
            source.set_allows_background_updates(request.config.allows_background_updates);
        }
        if request.capabilities.pause_updates {
            source.set_pauses_automatically(request.config.pauses_automatically);
        }
        source.set_desired_accuracy(Accuracy::Meters(request.config.desired_accuracy_meters));

        let wants_heading = request.include_heading && factory.heading_available();
        SingleAcquisition {
            source: PrivateSource::start(source, wants_heading),
            events,
            aggregator: PositionAggregator::new(),
            desired_accuracy: request.config.desired_accuracy_meters,
            wants_heading,
            best_heading_accuracy: None,
            state: AcquisitionState::Pending,
        }
    }

    async fn run(
        mut self,
        deadline: Option<Instant>,
        cancellation: Option<&CancellationToken>,
    ) -> Result<Position> {
        loop {
            let input = tokio::select! {
                biased;
                _ = cancelled(cancellation) => Input::Cancelled,
                _ = deadline_elapsed(deadline) => Input::TimedOut,
                event = self.events.recv() => Input::Event(event),
            };
            if let Some(outcome) = self.step(input) {
                return outcome;
            }
        }
    }

    /// Handles one input and returns the outcome once the acquisition settles.
    /// A settled acquisition ignores every further input.
    fn step(&mut self, input: Input) -> Option<Result<Position>> {
        if self.state != AcquisitionState::Pending {
            return None;
        }
        let outcome = match input {
            Input::Cancelled => Err(GeolocationError::Cancelled),
            Input::TimedOut => Err(GeolocationError::Timeout),
            Input::Event(Some(event)) => self.handle_event(event)?,
            Input::Event(None) => Err(GeolocationError::PositionUnavailable),
        };
        self.settle(&outcome);
        Some(outcome)
    }

    fn settle(&mut self, outcome: &Result<Position>) {
        self.source.release();
        self.state = match outcome {
            Ok(_) => AcquisitionState::Resolved,
            Err(GeolocationError::Cancelled) => AcquisitionState::Cancelled,
            Err(GeolocationError::Timeout) => AcquisitionState::TimedOut,
            Err(_) => AcquisitionState::Failed,
        };
        debug!("Single acquisition finished: {:?}", self.state);
    }

    fn handle_event(&mut self, event: SourceEvent) -> Option<Result<Position>> {
        match event {
            SourceEvent::FixesUpdated(fixes) => {
                for fix in fixes.iter() {
                    if self.accept_fix(fix) && self.is_satisfied() {
                        return self.aggregator.last().copied().map(Ok);
                    }
                }
                None
            }
            SourceEvent::HeadingUpdated(Some(heading)) => {
                if self.accept_heading(&heading) && self.is_satisfied() {
                    return self.aggregator.last().copied().map(Ok);
                }
                None
            }
            SourceEvent::HeadingUpdated(None) => None,
            SourceEvent::AuthorizationChanged(status) => gate::authorization_error(status).map(Err),
            SourceEvent::HardFailure(cause) => gate::failure_error(&cause).map(Err),
            SourceEvent::DeferralFinished(_) => None,
        }
    }

    fn accept_fix(&mut self, fix: &RawFix) -> bool {
        if !fix.has_valid_horizontal() {
            return false;
        }
        let held_accuracy = self.aggregator.last().and_then(|p| p.accuracy());
        if held_accuracy.is_some_and(|held| fix.horizontal_accuracy > held) {
            return false;
        }
        self.aggregator.apply_fix(fix);
        true
    }

    fn accept_heading(&mut self, heading: &RawHeading) -> bool {
        if heading.accuracy < 0.0 {
            return false;
        }
        if self
            .best_heading_accuracy
            .is_some_and(|best| heading.accuracy >= best)
        {
            return false;
        }
        self.best_heading_accuracy = Some(heading.accuracy);
        self.aggregator.apply_heading(heading);
        true
    }

    fn is_satisfied(&self) -> bool {
        let Some(position) = self.aggregator.last() else {
            return false;
        };
        let accurate = position
            .accuracy()
            .is_some_and(|accuracy| accuracy <= self.desired_accuracy);
        accurate && (!self.wants_heading || self.best_heading_accuracy.is_some())
    }
}
