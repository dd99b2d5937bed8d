// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! Common Modul for the geolocator
//!
//! Provides the common data types that are used across every modul.

pub mod error;
pub mod position;
pub mod settings;
pub mod test_helper;
