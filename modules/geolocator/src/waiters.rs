// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use common::{error::Result, position::Position};
use std::collections::HashMap;
use tokio::sync::oneshot;

/// Identifies a registered one-shot waiter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WaiterId(u64);

/// One-shot listeners for the next position or error of the active session.
///
/// Every waiter is removed from the registry in the same step it is
/// resolved, so no waiter can be answered twice.
#[derive(Debug, Default)]
pub struct WaiterRegistry {
    next_id: u64,
    waiters: HashMap<WaiterId, oneshot::Sender<Result<Position>>>,
}

impl WaiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new waiter and returns the receiving end of its result.
    pub fn register(&mut self) -> (WaiterId, oneshot::Receiver<Result<Position>>) {
        let id = WaiterId(self.next_id);
        self.next_id += 1;
        let (sender, receiver) = oneshot::channel();
        self.waiters.insert(id, sender);
        (id, receiver)
    }

    /// Removes a waiter that is no longer interested in a result.
    pub fn forget(&mut self, id: WaiterId) {
        self.waiters.remove(&id);
    }

    /// Answers and removes every registered waiter.
    pub fn resolve_all(&mut self, result: Result<Position>) {
        for (_, waiter) in self.waiters.drain() {
            let _ = waiter.send(result.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::error::GeolocationError;

    #[tokio::test]
    async fn waiters_are_resolved_once() {
        let mut registry = WaiterRegistry::new();
        let (_, first) = registry.register();
        let (_, second) = registry.register();
        registry.resolve_all(Ok(Position::default()));
        assert!(registry.is_empty());
        registry.resolve_all(Err(GeolocationError::Timeout));
        assert_eq!(first.await.unwrap(), Ok(Position::default()));
        assert_eq!(second.await.unwrap(), Ok(Position::default()));
    }

    #[tokio::test]
    async fn forgotten_waiter_is_not_resolved() {
        let mut registry = WaiterRegistry::new();
        let (id, receiver) = registry.register();
        registry.forget(id);
        assert_eq!(registry.len(), 0);
        assert!(receiver.await.is_err());
    }
}
