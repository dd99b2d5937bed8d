// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use crate::acquisition::{
    AcquisitionRequest, SingleAcquisition, cancelled, deadline_elapsed, deadline_from_timeout,
};
use crate::aggregator::PositionAggregator;
use crate::gate;
use crate::session::{ListenRequest, SessionManager};
use crate::source::{Capabilities, SourceEvent, SourceFactory};
use crate::waiters::{WaiterId, WaiterRegistry};
use async_trait::async_trait;
use common::{
    error::{GeolocationError, Result},
    position::Position,
    settings::{EnergySettings, GeolocatorConfig},
};
use module_core::{Event, EventKind, Module, ModuleCtx, PositionPtr};
use std::{sync::Arc, time::Duration};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// How a position request is answered while the geolocator decides.
enum AcquireRoute {
    /// The active session already knows a position.
    Cached(Position),
    /// The active session has no position yet, wait for its next event.
    Waiting(WaiterId, oneshot::Receiver<Result<Position>>),
    /// No session is active, the caller acquires on a private source.
    Private(GeolocatorConfig),
}

/// Provider properties that can be changed at runtime.
#[derive(Clone, Copy, Debug)]
enum ConfigUpdate {
    DesiredAccuracy(f64),
    PausesAutomatically(bool),
    AllowsBackgroundUpdates(bool),
}

enum Command {
    Acquire(oneshot::Sender<AcquireRoute>),
    ForgetWaiter(WaiterId),
    StartListening(ListenRequest, oneshot::Sender<Result<()>>),
    StopListening(oneshot::Sender<()>),
    Status(oneshot::Sender<SessionStatus>),
    Config(oneshot::Sender<GeolocatorConfig>),
    UpdateConfig(ConfigUpdate),
}

/// Snapshot of the session state, as seen by the geolocator task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionStatus {
    pub is_listening: bool,
    pub is_deferring_updates: bool,
}

enum Input {
    Command(Option<Command>),
    Source(SourceEvent),
    Bus(std::result::Result<Event, broadcast::error::RecvError>),
}

/// The geolocation provider module.
///
/// Owns the listening session, the last known position and the waiters of
/// position requests that piggy-back on the session. All of them are only
/// touched from [`Module::run`], callers interact through a
/// [`GeolocatorHandle`]. Source callbacks of the session are received on the
/// same task.
///
/// Position changes and session errors are published on the event bus as
/// [`EventKind::PositionChangedEvent`] and [`EventKind::PositionErrorEvent`].
pub struct Geolocator {
    ctx: ModuleCtx,
    factory: Arc<dyn SourceFactory>,
    config: GeolocatorConfig,
    session: SessionManager,
    aggregator: PositionAggregator,
    waiters: WaiterRegistry,
    commands: mpsc::UnboundedReceiver<Command>,
    commands_closed: bool,
}

impl Geolocator {
    /// Creates the module and the handle to control it.
    ///
    /// The handle only gets answers while [`Module::run`] is executing.
    pub fn new(
        ctx: ModuleCtx,
        factory: Arc<dyn SourceFactory>,
        capabilities: Capabilities,
        config: GeolocatorConfig,
    ) -> (Self, GeolocatorHandle) {
        let (sender, commands) = mpsc::unbounded_channel();
        let handle = GeolocatorHandle {
            commands: sender,
            factory: factory.clone(),
            capabilities,
            events: ctx.sender.clone(),
        };
        let geolocator = Geolocator {
            ctx,
            factory,
            config,
            session: SessionManager::new(capabilities),
            aggregator: PositionAggregator::new(),
            waiters: WaiterRegistry::new(),
            commands,
            commands_closed: false,
        };
        (geolocator, handle)
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Acquire(reply) => {
                let _ = reply.send(self.route_acquisition());
            }
            Command::ForgetWaiter(id) => self.waiters.forget(id),
            Command::StartListening(request, reply) => {
                let result = self
                    .session
                    .start(request, self.factory.as_ref(), &self.config);
                if let Err(e) = &result {
                    info!("Start listening rejected: {}", e);
                }
                let _ = reply.send(result);
            }
            Command::StopListening(reply) => {
                self.stop_session();
                let _ = reply.send(());
            }
            Command::Status(reply) => {
                let _ = reply.send(SessionStatus {
                    is_listening: self.session.is_listening(),
                    is_deferring_updates: self.session.is_deferring_updates(),
                });
            }
            Command::Config(reply) => {
                let _ = reply.send(self.config.clone());
            }
            Command::UpdateConfig(update) => {
                debug!("Update configuration {:?}", update);
                match update {
                    ConfigUpdate::DesiredAccuracy(meters) => {
                        self.config.desired_accuracy_meters = meters
                    }
                    ConfigUpdate::PausesAutomatically(pauses) => {
                        self.config.pauses_automatically = pauses
                    }
                    ConfigUpdate::AllowsBackgroundUpdates(allowed) => {
                        self.config.allows_background_updates = allowed
                    }
                }
            }
        }
    }

    fn route_acquisition(&mut self) -> AcquireRoute {
        if !self.session.is_listening() {
            return AcquireRoute::Private(self.config.clone());
        }
        if let Some(position) = self.aggregator.last() {
            return AcquireRoute::Cached(*position);
        }
        let (id, receiver) = self.waiters.register();
        AcquireRoute::Waiting(id, receiver)
    }

    fn handle_source_event(&mut self, event: SourceEvent) {
        match event {
            SourceEvent::FixesUpdated(fixes) => {
                for fix in fixes.iter() {
                    let position = self.aggregator.apply_fix(fix);
                    self.publish_position(position);
                }
                if !fixes.is_empty() {
                    self.session.on_fixes_accepted();
                }
            }
            SourceEvent::HeadingUpdated(Some(heading)) => {
                let position = self.aggregator.apply_heading(&heading);
                self.publish_position(position);
            }
            SourceEvent::HeadingUpdated(None) => debug!("Ignored invalid heading"),
            SourceEvent::AuthorizationChanged(status) => {
                if let Some(error) = gate::authorization_error(status) {
                    self.fail_session(error);
                }
            }
            SourceEvent::HardFailure(cause) => {
                if let Some(error) = gate::failure_error(&cause) {
                    self.fail_session(error);
                }
            }
            SourceEvent::DeferralFinished(error) => self.session.on_deferral_finished(error),
        }
    }

    fn publish_position(&mut self, position: Position) {
        self.waiters.resolve_all(Ok(position));
        self.ctx
            .publish_event(EventKind::PositionChangedEvent(PositionPtr::new(position)));
    }

    /// Stops the session before anybody learns about the error.
    fn fail_session(&mut self, error: GeolocationError) {
        error!("Listening session failed: {}", error);
        self.session.stop();
        self.aggregator.reset();
        self.waiters.resolve_all(Err(error.clone()));
        self.ctx.publish_event(EventKind::PositionErrorEvent(error));
    }

    fn stop_session(&mut self) {
        if self.session.stop() {
            self.aggregator.reset();
            self.waiters.resolve_all(Err(GeolocationError::Cancelled));
        }
    }
}

#[async_trait]
impl Module for Geolocator {
    async fn run(&mut self) -> std::result::Result<(), ()> {
        let mut run = true;
        while run {
            let input = tokio::select! {
                command = self.commands.recv(), if !self.commands_closed => Input::Command(command),
                event = self.session.next_event() => Input::Source(event),
                event = self.ctx.receiver.recv() => Input::Bus(event),
            };
            match input {
                Input::Command(Some(command)) => self.handle_command(command),
                Input::Command(None) => {
                    debug!("All geolocator handles dropped");
                    self.commands_closed = true;
                }
                Input::Source(event) => self.handle_source_event(event),
                Input::Bus(Ok(event)) => {
                    if let EventKind::QuitEvent = event.kind {
                        self.stop_session();
                        run = false;
                    }
                }
                Input::Bus(Err(e)) => {
                    error!("Failed to receive event in module Geolocator. Error:{e}");
                }
            }
        }
        Ok(())
    }
}

/// Cloneable access to a running [`Geolocator`].
///
/// Calls from several tasks are answered in the order the geolocator task
/// receives them.
#[derive(Clone)]
pub struct GeolocatorHandle {
    commands: mpsc::UnboundedSender<Command>,
    factory: Arc<dyn SourceFactory>,
    capabilities: Capabilities,
    events: broadcast::Sender<Event>,
}

enum Waited {
    Done(Result<Position>),
    Abandoned(GeolocationError),
}

impl GeolocatorHandle {
    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Option<T> {
        let (reply, answer) = oneshot::channel();
        self.commands.send(command(reply)).ok()?;
        answer.await.ok()
    }

    /// Returns the current position.
    ///
    /// While listening, the last known position of the session is returned,
    /// or its next position if it has none yet. The session itself is never
    /// changed. Otherwise a private source is started and the first fix
    /// meeting the desired accuracy is returned.
    ///
    /// # Arguments
    ///
    /// * `timeout` – Maximum time to wait. `None` waits without limit.
    /// * `cancellation` – Aborts the request when cancelled.
    /// * `include_heading` – Also wait for a heading if the platform has one.
    ///
    /// # Errors
    ///
    /// * [`GeolocationError::InvalidArgument`] for a zero timeout.
    /// * [`GeolocationError::Timeout`] or [`GeolocationError::Cancelled`] if
    ///   the deadline or the token fires first.
    /// * [`GeolocationError::Unauthorized`] or
    ///   [`GeolocationError::PositionUnavailable`] if the source fails.
    pub async fn get_position(
        &self,
        timeout: Option<Duration>,
        cancellation: Option<CancellationToken>,
        include_heading: bool,
    ) -> Result<Position> {
        let deadline = deadline_from_timeout(timeout)?;
        let route = self
            .request(Command::Acquire)
            .await
            .ok_or(GeolocationError::PositionUnavailable)?;
        match route {
            AcquireRoute::Cached(position) => Ok(position),
            AcquireRoute::Waiting(id, receiver) => {
                let waited = tokio::select! {
                    biased;
                    _ = cancelled(cancellation.as_ref()) => Waited::Abandoned(GeolocationError::Cancelled),
                    _ = deadline_elapsed(deadline) => Waited::Abandoned(GeolocationError::Timeout),
                    result = receiver => Waited::Done(result.unwrap_or(Err(GeolocationError::PositionUnavailable))),
                };
                match waited {
                    Waited::Done(result) => result,
                    Waited::Abandoned(error) => {
                        let _ = self.commands.send(Command::ForgetWaiter(id));
                        Err(error)
                    }
                }
            }
            AcquireRoute::Private(config) => {
                SingleAcquisition::acquire(
                    self.factory.as_ref(),
                    AcquisitionRequest {
                        deadline,
                        cancellation,
                        include_heading,
                        config,
                        capabilities: self.capabilities,
                    },
                )
                .await
            }
        }
    }

    /// Starts a continuous listening session.
    ///
    /// # Errors
    ///
    /// * [`GeolocationError::InvalidArgument`] for a negative `min_distance`.
    /// * [`GeolocationError::AlreadyListening`] if a session is active.
    pub async fn start_listening(
        &self,
        min_time: Duration,
        min_distance: f64,
        include_heading: bool,
        energy_settings: Option<EnergySettings>,
    ) -> Result<()> {
        let request = ListenRequest {
            min_time,
            min_distance,
            include_heading,
            energy_settings,
        };
        self.request(|reply| Command::StartListening(request, reply))
            .await
            .unwrap_or(Err(GeolocationError::PositionUnavailable))
    }

    /// Stops the listening session. Succeeds without a session, too.
    pub async fn stop_listening(&self) -> Result<()> {
        let _ = self.request(Command::StopListening).await;
        Ok(())
    }

    pub async fn status(&self) -> SessionStatus {
        self.request(Command::Status)
            .await
            .unwrap_or(SessionStatus {
                is_listening: false,
                is_deferring_updates: false,
            })
    }

    pub async fn is_listening(&self) -> bool {
        self.status().await.is_listening
    }

    pub fn supports_heading(&self) -> bool {
        self.factory.heading_available()
    }

    pub fn is_geolocation_enabled(&self) -> bool {
        self.factory.authorization_status().is_authorized()
    }

    pub async fn config(&self) -> GeolocatorConfig {
        self.request(Command::Config).await.unwrap_or_default()
    }

    pub async fn desired_accuracy(&self) -> f64 {
        self.config().await.desired_accuracy_meters
    }

    /// Sets the accuracy in meters used by later sessions and acquisitions.
    pub fn set_desired_accuracy(&self, meters: f64) -> Result<()> {
        if meters.is_nan() || meters <= 0.0 {
            return Err(GeolocationError::InvalidArgument(format!(
                "desired accuracy must be > 0, got {}",
                meters
            )));
        }
        self.update(ConfigUpdate::DesiredAccuracy(meters));
        Ok(())
    }

    pub async fn pauses_automatically(&self) -> bool {
        self.config().await.pauses_automatically
    }

    pub fn set_pauses_automatically(&self, pauses: bool) {
        self.update(ConfigUpdate::PausesAutomatically(pauses));
    }

    pub async fn allows_background_updates(&self) -> bool {
        self.config().await.allows_background_updates
    }

    pub fn set_allows_background_updates(&self, allowed: bool) {
        self.update(ConfigUpdate::AllowsBackgroundUpdates(allowed));
    }

    /// Subscribes to position changes and session errors.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    fn update(&self, update: ConfigUpdate) {
        let _ = self.commands.send(Command::UpdateConfig(update));
    }
}
