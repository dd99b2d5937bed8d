// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use common::position::{Position, RawFix, RawHeading};

/// Folds raw source readings into the last known [`Position`].
///
/// Each accepted reading produces a new snapshot. Values the reading does not
/// carry are copied from the previous snapshot, so a snapshot is never
/// modified after it has been handed out.
#[derive(Debug, Default)]
pub struct PositionAggregator {
    last: Option<Position>,
}

impl PositionAggregator {
    pub fn new() -> Self {
        PositionAggregator { last: None }
    }

    /// Merges `fix` into the last known position and returns the new snapshot.
    pub fn apply_fix(&mut self, fix: &RawFix) -> Position {
        let next = self.last.unwrap_or_default().with_fix(fix);
        self.last = Some(next);
        next
    }

    /// Merges `heading` into the last known position and returns the new snapshot.
    ///
    /// Without any previous fix the snapshot only carries the heading.
    pub fn apply_heading(&mut self, heading: &RawHeading) -> Position {
        let next = self.last.unwrap_or_default().with_heading(heading);
        self.last = Some(next);
        next
    }

    /// The last known position, if any reading was accepted since the last reset.
    pub fn last(&self) -> Option<&Position> {
        self.last.as_ref()
    }

    /// Forgets the last known position.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_helper::fixes::{fix_with_accuracy, full_fix, heading, invalid_fix};

    #[test]
    fn every_fix_produces_a_snapshot() {
        let mut aggregator = PositionAggregator::new();
        assert!(aggregator.last().is_none());
        let first = aggregator.apply_fix(&full_fix());
        let second = aggregator.apply_fix(&invalid_fix());
        assert_ne!(first, second);
        assert_eq!(second.latitude(), first.latitude());
        assert_eq!(aggregator.last(), Some(&second));
    }

    #[test]
    fn heading_without_fix_yields_heading_only_snapshot() {
        let mut aggregator = PositionAggregator::new();
        let pos = aggregator.apply_heading(&heading(270.0));
        assert_eq!(pos.heading(), Some(270.0));
        assert!(!pos.has_fix());
        assert!(pos.timestamp().is_none());
    }

    #[test]
    fn heading_after_fix_keeps_fix() {
        let mut aggregator = PositionAggregator::new();
        let fix = fix_with_accuracy(10.0, 0);
        aggregator.apply_fix(&fix);
        let pos = aggregator.apply_heading(&heading(12.0));
        assert_eq!(pos.latitude(), Some(fix.latitude));
        assert_eq!(pos.accuracy(), Some(10.0));
        assert_eq!(pos.heading(), Some(12.0));

        let next = aggregator.apply_fix(&fix_with_accuracy(4.0, 1));
        assert_eq!(next.heading(), Some(12.0));
    }

    #[test]
    fn reset_forgets_last_position() {
        let mut aggregator = PositionAggregator::new();
        aggregator.apply_fix(&full_fix());
        aggregator.reset();
        assert!(aggregator.last().is_none());
    }
}
