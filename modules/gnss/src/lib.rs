// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! GNSS location sources for the geolocator
//!
//! Provides a source backed by the gpsd daemon and a source replaying a
//! recorded track.

pub mod geo;
pub mod gpsd_source;
pub mod replay_source;
