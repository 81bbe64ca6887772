// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `watch` command.
//!
//! Subscribes the given nodes under one key and prints every change until
//! shutdown. While watching, the simulated plant advances each watched
//! value once per sampling interval so there is something to see.

use std::time::Duration;

use bhs_opcua::client::conversion::format_value;
use bhs_opcua::simulation::SimulatedServer;
use bhs_opcua::{ChannelCallback, ItemNotification, MonitoredItemSpec, NodeId, OpcUaValue};
use chrono::Utc;
use tracing::info;

use super::{parse_nodes, Connection};
use crate::cli::{Cli, WatchArgs};
use crate::error::CliResult;
use crate::shutdown::StopSignal;

const NOTIFICATION_CAPACITY: usize = 256;
const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Executes the `watch` command.
pub async fn watch(cli: &Cli, args: &WatchArgs) -> CliResult<()> {
    let nodes = parse_nodes(&args.nodes)?;
    let interval = args.sampling_ms.map(Duration::from_millis);
    let specs: Vec<MonitoredItemSpec> = nodes
        .iter()
        .map(|node| {
            let spec = MonitoredItemSpec::new(node.clone());
            match interval {
                Some(interval) => spec.with_sampling_interval(interval),
                None => spec,
            }
        })
        .collect();

    let connection = Connection::open(cli).await?;
    let (callback, mut notifications) = ChannelCallback::with_channel(NOTIFICATION_CAPACITY);
    let info = match connection
        .client
        .subscriptions()
        .subscribe_with(&args.key, specs, callback)
        .await
    {
        Ok(info) => info,
        Err(e) => {
            connection.close().await?;
            return Err(e.into());
        }
    };
    info!(
        key = %info.key,
        subscription_id = info.subscription_id,
        items = info.items.len(),
        "Watching, press Ctrl+C to stop"
    );

    let stop = StopSignal::new();
    let driver = tokio::spawn(drive_plant(
        connection.server.clone(),
        nodes,
        interval.unwrap_or(DEFAULT_TICK),
        stop.clone(),
    ));
    let signals = stop.stop_on_os_signal();

    loop {
        tokio::select! {
            Some(notification) = notifications.recv() => {
                println!("{}", render_notification(&notification));
            }
            _ = stop.stopped() => break,
        }
    }

    signals.abort();
    let _ = driver.await;
    connection.close().await
}

/// Renders one change as `timestamp key display_name = value`.
pub(crate) fn render_notification(notification: &ItemNotification) -> String {
    let at = notification
        .value
        .source_timestamp
        .unwrap_or_else(Utc::now)
        .format("%H:%M:%S%.3f");
    if notification.value.is_good() {
        format!(
            "{} {} {} = {}",
            at,
            notification.key,
            notification.item.display_name,
            format_value(&notification.value.value)
        )
    } else {
        format!(
            "{} {} {} [{}]",
            at, notification.key, notification.item.display_name, notification.value.status
        )
    }
}

/// Moves every watched value one step each `period` until shutdown.
async fn drive_plant(
    server: SimulatedServer,
    nodes: Vec<NodeId>,
    period: Duration,
    stop: StopSignal,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for node in &nodes {
                    if let Some(next) = server.value(node).as_ref().and_then(advance) {
                        server.set_value(node, next);
                    }
                }
            }
            _ = stop.stopped() => break,
        }
    }
}

/// Returns the next value in a simple ramp, or `None` for kinds left alone.
pub(crate) fn advance(value: &OpcUaValue) -> Option<OpcUaValue> {
    match value {
        OpcUaValue::Boolean(v) => Some(OpcUaValue::Boolean(!v)),
        OpcUaValue::Byte(v) => Some(OpcUaValue::Byte(v.wrapping_add(1))),
        OpcUaValue::Int16(v) => Some(OpcUaValue::Int16(v.wrapping_add(1))),
        OpcUaValue::UInt16(v) => Some(OpcUaValue::UInt16(v.wrapping_add(1))),
        OpcUaValue::Int32(v) => Some(OpcUaValue::Int32(v.wrapping_add(1))),
        OpcUaValue::UInt32(v) => Some(OpcUaValue::UInt32(v.wrapping_add(1))),
        OpcUaValue::Float(v) => Some(OpcUaValue::Float(v + 0.5)),
        OpcUaValue::DateTime(_) => Some(OpcUaValue::DateTime(Utc::now())),
        OpcUaValue::String(_) | OpcUaValue::Null => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bhs_opcua::{OpcUaClient, OpcUaConfig};

    #[test]
    fn test_advance() {
        assert_eq!(advance(&OpcUaValue::UInt32(u32::MAX)), Some(OpcUaValue::UInt32(0)));
        assert_eq!(advance(&OpcUaValue::Boolean(true)), Some(OpcUaValue::Boolean(false)));
        assert_eq!(advance(&OpcUaValue::Float(12.5)), Some(OpcUaValue::Float(13.0)));
        assert_eq!(advance(&OpcUaValue::from("default")), None);
    }

    #[tokio::test]
    async fn test_driven_plant_notifies_watchers() {
        let server = SimulatedServer::plant();
        let client = OpcUaClient::new(OpcUaConfig::new(server.endpoint_url()), server.transport());
        client.connect().await.unwrap();

        let count = NodeId::string(2, "Plant.Line1.Count");
        let (callback, mut rx) = ChannelCallback::with_channel(16);
        client
            .subscriptions()
            .subscribe_one("watch", &count, callback)
            .await
            .unwrap();

        let stop = StopSignal::new();
        let driver = tokio::spawn(drive_plant(
            server.clone(),
            vec![count.clone()],
            Duration::from_millis(5),
            stop.clone(),
        ));

        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        stop.stop();
        driver.await.unwrap();

        assert_eq!(first.key, "watch");
        assert_eq!(first.value.value, OpcUaValue::UInt32(1));
        assert!(render_notification(&first).ends_with("watch ns=2;s=Plant.Line1.Count = 1"));

        client.disconnect().await.unwrap();
    }
}
