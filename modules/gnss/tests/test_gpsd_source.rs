// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use chrono::{DateTime, Utc};
use geolocator::{DistanceFilter, FailureCause, LocationSource, SourceEvent, SourceFactory};
use gnss::gpsd_source::{GpsdSourceFactory, tpv_to_fix};
use gpsd_proto::Tpv;
use std::{io::Error, str::FromStr, time::Duration};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::mpsc::{UnboundedReceiver, unbounded_channel},
    time::timeout,
};

struct GpsdServer {
    socket: TcpListener,
    client: Option<TcpStream>,
}

impl GpsdServer {
    pub async fn new(addr: &str) -> GpsdServer {
        let listener = TcpListener::bind(addr).await;
        GpsdServer {
            socket: listener.unwrap_or_else(|e| panic!("Failed to bind gpsd test server on {addr}: {e}")),
            client: None,
        }
    }

    pub async fn accept_client(&mut self) {
        match self.socket.accept().await {
            Ok((client, _)) => self.client = Some(client),
            Err(e) => panic!("Client connection failed. Error: {:?}", e),
        }
    }

    pub async fn send(&mut self, buf: &[u8]) -> Result<(), Error> {
        match self.client {
            Some(ref mut client) => client.write_all(buf).await,
            None => panic!("GPSD server no client is connected"),
        }
    }

    pub async fn receive(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        match self.client {
            Some(ref mut client) => client.read_exact(buf).await,
            None => panic!("GPSD server no client is connected"),
        }
    }

    pub fn disconnect(&mut self) {
        self.client = None;
    }
}

const TIMEOUT_MS: u8 = 100;

async fn test_setup(
    addr: &str,
    filter: DistanceFilter,
) -> (
    Box<dyn LocationSource>,
    UnboundedReceiver<SourceEvent>,
    GpsdServer,
) {
    let mut server = GpsdServer::new(addr).await;
    let factory = GpsdSourceFactory::new(addr).expect("Failed to create gpsd factory");
    let (sink, events) = unbounded_channel();
    let mut source = factory.create(sink);
    source.set_distance_filter(filter);
    source.start_updates();
    timeout(
        Duration::from_millis(TIMEOUT_MS.into()),
        server.accept_client(),
    )
    .await
    .unwrap_or_else(|_| panic!("No client connected within timeout of 100ms"));
    (source, events, server)
}

async fn next_event(events: &mut UnboundedReceiver<SourceEvent>) -> SourceEvent {
    timeout(Duration::from_millis(TIMEOUT_MS.into()), events.recv())
        .await
        .expect("Failed to receive source event in required time")
        .expect("Source event channel closed")
}

fn tpv_msg(lat: f64, lon: f64) -> String {
    format!(
        "{{\"class\":\"TPV\",\"time\":\"2005-06-08T10:34:48.283Z\",\"lat\":{lat},\"lon\":{lon},\
         \"alt\":110.5,\"epx\":4.5,\"epy\":6.0,\"epv\":9.0,\"speed\":22.0,\"mode\":3}}\n"
    )
}

#[test]
fn map_error_estimates_to_accuracies() {
    let tpv: Tpv = serde_json::from_str(tpv_msg(1.0, 2.0).trim()).expect("Invalid TPV");
    let fix = tpv_to_fix(&tpv).expect("TPV without fix");

    assert_eq!(fix.latitude, 1.0);
    assert_eq!(fix.longitude, 2.0);
    assert_eq!(fix.horizontal_accuracy, 6.0);
    assert_eq!(fix.altitude, 110.5);
    assert_eq!(fix.vertical_accuracy, 9.0);
    assert_eq!(fix.speed, 22.0);
    assert_eq!(
        fix.timestamp,
        DateTime::<Utc>::from_str("2005-06-08T10:34:48.283Z").unwrap()
    );
}

#[test]
fn mark_missing_estimates_invalid() {
    let tpv: Tpv = serde_json::from_str(
        r#"{"class":"TPV","time":"2005-06-08T10:34:48.283Z","lat":1.0,"lon":1.0,"alt":20.0,"mode":2}"#,
    )
    .expect("Invalid TPV");
    let fix = tpv_to_fix(&tpv).expect("TPV without fix");

    assert!(fix.horizontal_accuracy < 0.0);
    assert!(fix.vertical_accuracy < 0.0);
    assert!(fix.speed < 0.0);
}

#[test]
fn ignore_tpv_without_coordinates() {
    let tpv: Tpv = serde_json::from_str(
        r#"{"class":"TPV","time":"2005-06-08T10:34:48.283Z","mode":1}"#,
    )
    .expect("Invalid TPV");
    assert!(tpv_to_fix(&tpv).is_none());
}

#[tokio::test]
async fn enable_gpsd_notifications() {
    let (_source, _events, mut server) =
        test_setup("127.0.0.1:35500", DistanceFilter::None).await;
    let enable_cmd: &str = gpsd_proto::ENABLE_WATCH_CMD;
    let mut buf: Vec<u8> = vec![0; enable_cmd.len()];
    let _ = timeout(
        Duration::from_millis(TIMEOUT_MS.into()),
        server.receive(&mut buf),
    )
    .await
    .unwrap_or_else(|_| panic!("Enable command not received in {:?} ms", TIMEOUT_MS));
    let received_cmd =
        std::str::from_utf8(&buf).expect("Received enable command is not a valid string");
    assert_eq!(received_cmd, enable_cmd);
}

#[tokio::test]
async fn report_fixes() {
    let (_source, mut events, mut server) =
        test_setup("127.0.0.1:35501", DistanceFilter::None).await;
    server
        .send(tpv_msg(1.0, 1.0).as_bytes())
        .await
        .expect("Failed to send TPV msg");

    let SourceEvent::FixesUpdated(fixes) = next_event(&mut events).await else {
        panic!("Expected a fix");
    };
    assert_eq!(fixes.len(), 1);
    assert_eq!(fixes[0].latitude, 1.0);
    assert_eq!(fixes[0].horizontal_accuracy, 6.0);
}

#[tokio::test]
async fn suppress_fixes_within_distance_filter() {
    let (_source, mut events, mut server) =
        test_setup("127.0.0.1:35502", DistanceFilter::Meters(50.0)).await;
    for (lat, lon) in [(52.0, 11.0), (52.0001, 11.0), (52.001, 11.0)] {
        server
            .send(tpv_msg(lat, lon).as_bytes())
            .await
            .expect("Failed to send TPV msg");
    }

    let mut latitudes = vec![];
    for _ in 0..2 {
        let SourceEvent::FixesUpdated(fixes) = next_event(&mut events).await else {
            panic!("Expected a fix");
        };
        latitudes.extend(fixes.iter().map(|fix| fix.latitude));
    }
    assert_eq!(latitudes, vec![52.0, 52.001]);
}

#[tokio::test]
async fn report_network_failure_on_connection_loss() {
    let (_source, mut events, mut server) =
        test_setup("127.0.0.1:35503", DistanceFilter::None).await;
    server.disconnect();

    assert_eq!(
        next_event(&mut events).await,
        SourceEvent::HardFailure(FailureCause::Network)
    );
}

#[tokio::test]
async fn report_network_failure_without_gpsd() {
    let factory = GpsdSourceFactory::new("127.0.0.1:35504").expect("Failed to create factory");
    let (sink, mut events) = unbounded_channel();
    let mut source = factory.create(sink);
    source.start_updates();

    assert_eq!(
        next_event(&mut events).await,
        SourceEvent::HardFailure(FailureCause::Network)
    );
}

#[test]
fn reject_invalid_address() {
    assert!(GpsdSourceFactory::new("not an address").is_err());
}

#[test]
fn gpsd_provides_no_heading() {
    let factory = GpsdSourceFactory::new("127.0.0.1:2947").expect("Failed to create factory");
    assert!(!factory.heading_available());
}
