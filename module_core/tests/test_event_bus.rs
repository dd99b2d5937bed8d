// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use common::{error::GeolocationError, position::Position};
use module_core::{
    Event, EventBus, EventKind, EventKindType, PositionPtr, payload_ref,
    test_helper::wait_for_event,
};
use strum::IntoDiscriminant;

#[test_log::test(tokio::test)]
pub async fn events_delivered() {
    let event_bus = EventBus::new();
    let mut receiver = event_bus.subscribe();
    let event = Event {
        kind: EventKind::QuitEvent,
    };
    event_bus.publish(&event);
    let received_event =
        tokio::time::timeout(std::time::Duration::from_millis(100), receiver.recv())
            .await
            .expect("Failed to receive event in required time")
            .unwrap();
    assert_eq!(received_event, event);
}

#[test_log::test(tokio::test)]
pub async fn wait_skips_other_event_types() {
    let event_bus = EventBus::new();
    let ctx = event_bus.context();
    let mut receiver = event_bus.subscribe();
    ctx.publish_event(EventKind::PositionErrorEvent(GeolocationError::Unauthorized));
    ctx.publish_event(EventKind::PositionChangedEvent(PositionPtr::new(
        Position::default(),
    )));

    let event = wait_for_event(
        &mut receiver,
        std::time::Duration::from_millis(100),
        EventKindType::PositionChangedEvent,
    )
    .await;
    assert_eq!(
        payload_ref!(event.kind, EventKind::PositionChangedEvent).map(|p| **p),
        Some(Position::default())
    );
}

#[test]
pub fn discriminant_matches_variant() {
    let kind = EventKind::PositionErrorEvent(GeolocationError::Timeout);
    assert_eq!(EventKindType::from(&kind), EventKindType::PositionErrorEvent);
    assert_eq!(kind.discriminant(), EventKindType::PositionErrorEvent);
    assert!(payload_ref!(kind, EventKind::PositionChangedEvent).is_none());
}
