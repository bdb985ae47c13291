//! Serial ports a hub reports as attached.
//!
//! Hubs announce USB-serial devices coming and going with `device_event`
//! frames. Each session keeps a [`PortTable`] of what is currently
//! attached; it starts empty and disappears with the session.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// What happened to a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PortEventKind {
    /// A device was plugged in or opened.
    Connected,
    /// A device was unplugged or closed.
    Disconnected,
}

/// A decoded `device_event` frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PortEvent {
    /// Connected or disconnected.
    pub kind: PortEventKind,
    /// Hub-side port identifier.
    pub port_id: String,
    /// Free-form device description sent by the hub.
    pub device_info: Option<serde_json::Value>,
}

/// A port currently attached to a hub.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PortInfo {
    /// Hub-side port identifier.
    pub port_id: String,
    /// OS device path, e.g. `/dev/ttyUSB0`.
    pub port: Option<String>,
    /// USB product description.
    pub description: Option<String>,
    /// USB manufacturer.
    pub manufacturer: Option<String>,
    /// USB serial number.
    pub serial_number: Option<String>,
    /// USB vendor id.
    pub vendor_id: Option<String>,
    /// USB product id.
    pub product_id: Option<String>,
    /// Line speed, if the hub opened the port.
    pub baud_rate: Option<u32>,
    /// When the hub reported the port.
    pub connected_at: DateTime<Utc>,
}

impl PortInfo {
    fn from_event(port_id: String, info: Option<&serde_json::Value>, at: DateTime<Utc>) -> Self {
        let text = |key: &str| {
            info.and_then(|v| v.get(key)).and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
        };
        Self {
            port: text("port"),
            description: text("description"),
            manufacturer: text("manufacturer"),
            serial_number: text("serial_number"),
            vendor_id: text("vendor_id"),
            product_id: text("product_id"),
            baud_rate: info
                .and_then(|v| v.get("baud_rate"))
                .and_then(serde_json::Value::as_u64)
                .and_then(|b| u32::try_from(b).ok()),
            connected_at: at,
            port_id,
        }
    }
}

/// Ports attached to one hub, keyed by port id.
#[derive(Debug, Default)]
pub struct PortTable {
    ports: BTreeMap<String, PortInfo>,
}

impl PortTable {
    /// Applies `event` received at `at`.
    ///
    /// A repeated `connected` replaces the stored details. Returns `false`
    /// for a `disconnected` of a port that was never reported.
    pub fn apply(&mut self, event: &PortEvent, at: DateTime<Utc>) -> bool {
        match event.kind {
            PortEventKind::Connected => {
                let info = PortInfo::from_event(event.port_id.clone(), event.device_info.as_ref(), at);
                self.ports.insert(event.port_id.clone(), info);
                true
            }
            PortEventKind::Disconnected => self.ports.remove(&event.port_id).is_some(),
        }
    }

    /// Attached ports sorted by port id.
    #[must_use]
    pub fn list(&self) -> Vec<PortInfo> {
        self.ports.values().cloned().collect()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn event(kind: PortEventKind, port_id: &str, info: Option<serde_json::Value>) -> PortEvent {
        PortEvent {
            kind,
            port_id: port_id.to_string(),
            device_info: info,
        }
    }

    #[test]
    fn connect_records_usb_details() {
        let mut table = PortTable::default();
        let info = serde_json::json!({
            "port": "/dev/ttyUSB0",
            "manufacturer": "FTDI",
            "vendor_id": 1027,
            "product_id": "6001",
            "baud_rate": 115200
        });
        assert!(table.apply(&event(PortEventKind::Connected, "ttyUSB0", Some(info)), Utc::now()));

        let ports = table.list();
        let [port] = ports.as_slice() else {
            panic!("one port expected");
        };
        assert_eq!(port.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(port.manufacturer.as_deref(), Some("FTDI"));
        assert_eq!(port.vendor_id.as_deref(), Some("1027"));
        assert_eq!(port.baud_rate, Some(115_200));
        assert!(port.description.is_none());
    }

    #[test]
    fn disconnect_removes_only_known_ports() {
        let mut table = PortTable::default();
        table.apply(&event(PortEventKind::Connected, "ttyACM0", None), Utc::now());
        table.apply(&event(PortEventKind::Connected, "ttyUSB0", None), Utc::now());

        assert!(!table.apply(&event(PortEventKind::Disconnected, "ttyS9", None), Utc::now()));
        assert!(table.apply(&event(PortEventKind::Disconnected, "ttyACM0", None), Utc::now()));

        let ids: Vec<String> = table.list().into_iter().map(|p| p.port_id).collect();
        assert_eq!(ids, vec!["ttyUSB0"]);
    }
}
