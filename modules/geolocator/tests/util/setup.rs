// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use common::settings::GeolocatorConfig;
use geolocator::{Capabilities, Geolocator, GeolocatorHandle, SessionStatus, test_helper::FakeSourceFactory};
use module_core::{EventBus, Module};
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;

pub const TIMEOUT: Duration = Duration::from_millis(100);

pub struct Setup {
    pub event_bus: EventBus,
    pub factory: FakeSourceFactory,
    pub handle: GeolocatorHandle,
    pub module: JoinHandle<Result<(), ()>>,
}

pub fn start_geolocator(capabilities: Capabilities) -> Setup {
    let event_bus = EventBus::default();
    let factory = FakeSourceFactory::new();
    let (mut geolocator, handle) = Geolocator::new(
        event_bus.context(),
        Arc::new(factory.clone()),
        capabilities,
        GeolocatorConfig::default(),
    );
    let module = tokio::spawn(async move { geolocator.run().await });
    Setup {
        event_bus,
        factory,
        handle,
        module,
    }
}

/// Polls the session status until `predicate` holds.
pub async fn wait_for_status(handle: &GeolocatorHandle, predicate: impl Fn(&SessionStatus) -> bool) {
    for _ in 0..100 {
        if predicate(&handle.status().await) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("Session status not reached: {:?}", handle.status().await);
}

/// Gives a spawned position request time to reach the geolocator task.
pub async fn settle(handle: &GeolocatorHandle) {
    tokio::time::sleep(Duration::from_millis(10)).await;
    let _ = handle.status().await;
}
