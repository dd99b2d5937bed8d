// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use crate::geo::MovementFilter;
use common::position::RawFix;
use futures::StreamExt;
use geolocator::{
    Accuracy, AuthorizationStatus, DistanceFilter, FailureCause, LocationSource, SourceEvent,
    SourceFactory, SourceSink,
};
use gpsd_proto::{self, Mode, Tpv};
use std::{
    io::{self, Error, ErrorKind},
    net::SocketAddr,
    str::FromStr,
};
use tokio::{io::AsyncWriteExt, net::TcpStream, task::JoinHandle};
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, error, warn};

/// Converts a gpsd TPV report into a source reading.
///
/// Returns `None` if the report has no coordinates or no valid time.
/// The horizontal accuracy is the larger of the longitude and latitude error
/// estimates, the vertical accuracy the altitude error estimate of a 3D fix.
/// Missing estimates mark the matching values as invalid.
pub fn tpv_to_fix(tpv: &Tpv) -> Option<RawFix> {
    let lat = tpv.lat?;
    let lon = tpv.lon?;
    let time = tpv.time.as_ref()?;
    let timestamp = chrono::DateTime::<chrono::Utc>::from_str(time).ok()?;

    let horizontal_accuracy = match (&tpv.mode, tpv.epx, tpv.epy) {
        (Mode::NoFix, _, _) => -1.0,
        (_, Some(epx), Some(epy)) => f64::from(epx.max(epy)),
        (_, Some(ep), None) | (_, None, Some(ep)) => f64::from(ep),
        (_, None, None) => -1.0,
    };
    let (altitude, vertical_accuracy) = match (&tpv.mode, tpv.alt, tpv.epv) {
        (Mode::Fix3d, Some(alt), Some(epv)) => (f64::from(alt), f64::from(epv)),
        _ => (0.0, -1.0),
    };
    Some(RawFix {
        latitude: lat,
        longitude: lon,
        altitude,
        horizontal_accuracy,
        vertical_accuracy,
        speed: tpv.speed.map(f64::from).unwrap_or(-1.0),
        timestamp,
    })
}

/// State of the task reading reports from gpsd.
struct GpsdReaderRuntime {
    sink: SourceSink,
    movement: MovementFilter,
}

impl GpsdReaderRuntime {
    fn process_tpv_msg(&mut self, tpv: &Tpv) {
        let Some(fix) = tpv_to_fix(tpv) else { return };
        if fix.has_valid_horizontal() && !self.movement.admit(fix.latitude, fix.longitude) {
            return;
        }
        let _ = self.sink.send(SourceEvent::FixesUpdated(vec![fix]));
    }

    fn report_failure(&self) {
        let _ = self
            .sink
            .send(SourceEvent::HardFailure(FailureCause::Network));
    }
}

async fn gpsd_reader(address: SocketAddr, mut runtime: GpsdReaderRuntime) {
    let mut stream = match TcpStream::connect(address).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to connect to gpsd at {}. Error: {}", address, e);
            runtime.report_failure();
            return;
        }
    };
    if let Err(e) = stream
        .write_all(gpsd_proto::ENABLE_WATCH_CMD.as_bytes())
        .await
    {
        error!("Failed to enable gpsd watch mode. Error: {}", e);
        runtime.report_failure();
        return;
    }
    let mut framed = Framed::new(stream, LinesCodec::new());
    while let Some(result) = framed.next().await {
        match result {
            Ok(ref line) => {
                if let Ok(tpv) = serde_json::from_str::<Tpv>(line) {
                    runtime.process_tpv_msg(&tpv);
                }
            }
            Err(e) => {
                warn!("GPSD receive error {e:?}");
            }
        }
    }
    warn!("Connection to gpsd at {} closed", address);
    runtime.report_failure();
}

/// A location source reading the reports of a gpsd daemon.
///
/// Every started source opens its own connection. Connection failures are
/// reported as [`FailureCause::Network`].
pub struct GpsdLocationSource {
    address: SocketAddr,
    sink: SourceSink,
    distance_filter: DistanceFilter,
    reader: Option<JoinHandle<()>>,
}

impl GpsdLocationSource {
    pub fn new(address: SocketAddr, sink: SourceSink) -> Self {
        GpsdLocationSource {
            address,
            sink,
            distance_filter: DistanceFilter::None,
            reader: None,
        }
    }
}

impl LocationSource for GpsdLocationSource {
    fn start_updates(&mut self) {
        if self.reader.is_some() {
            return;
        }
        let runtime = GpsdReaderRuntime {
            sink: self.sink.clone(),
            movement: MovementFilter::new(self.distance_filter),
        };
        let address = self.address;
        self.reader = Some(tokio::spawn(
            async move { gpsd_reader(address, runtime).await },
        ));
    }

    fn stop_updates(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }

    fn set_desired_accuracy(&mut self, accuracy: Accuracy) {
        debug!("gpsd reports every fix, requested accuracy {:?} ignored", accuracy);
    }

    fn set_distance_filter(&mut self, filter: DistanceFilter) {
        self.distance_filter = filter;
    }
}

impl Drop for GpsdLocationSource {
    fn drop(&mut self) {
        self.stop_updates();
    }
}

/// Creates [`GpsdLocationSource`]s for a gpsd daemon.
pub struct GpsdSourceFactory {
    address: SocketAddr,
}

impl GpsdSourceFactory {
    pub fn new(address: &str) -> Result<Self, Error> {
        let address: SocketAddr = match address.parse() {
            Ok(addr) => addr,
            Err(e) => return Err(io::Error::new(ErrorKind::InvalidInput, e)),
        };
        Ok(GpsdSourceFactory { address })
    }
}

impl SourceFactory for GpsdSourceFactory {
    fn create(&self, sink: SourceSink) -> Box<dyn LocationSource> {
        Box::new(GpsdLocationSource::new(self.address, sink))
    }

    fn heading_available(&self) -> bool {
        false
    }

    fn authorization_status(&self) -> AuthorizationStatus {
        AuthorizationStatus::AuthorizedAlways
    }
}
