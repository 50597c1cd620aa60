use std::net::UdpSocket;
use std::sync::atomic::{AtomicU64, Ordering};

use patterncore_model::ScheduledMessage;
use rosc::{OscMessage, OscPacket, OscType};
use serde_json::Value;
use tracing::warn;

use crate::sender::Sender;

/// One UDP OSC message per event, sent to a configured address.
/// Destination-agnostic in the sense that the *path* is fixed per sender —
/// different destinations use different `OscSender` instances, each bound
/// to its own socket.
pub struct OscSender {
    name: String,
    socket: UdpSocket,
    target: String,
    address_path: String,
    send_errors: AtomicU64,
}

impl OscSender {
    pub fn new(name: impl Into<String>, host: &str, port: u16) -> std::io::Result<Self> {
        Self::with_address(name, host, port, "/dirt/play")
    }

    pub fn with_address(
        name: impl Into<String>,
        host: &str,
        port: u16,
        address_path: impl Into<String>,
    ) -> std::io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            name: name.into(),
            socket,
            target: format!("{host}:{port}"),
            address_path: address_path.into(),
            send_errors: AtomicU64::new(0),
        })
    }

    pub fn send_errors(&self) -> u64 {
        self.send_errors.load(Ordering::Relaxed)
    }

    fn encode(&self, message: &ScheduledMessage) -> Vec<u8> {
        let args = flatten_params(&message.params);
        let packet = OscPacket::Message(OscMessage {
            addr: self.address_path.clone(),
            args,
        });
        rosc::encoder::encode(&packet).unwrap_or_default()
    }
}

/// Flattens a `params` JSON object to the OSC argument list as alternating
/// key/value pairs, with the OSC type tag inferred from the JSON value's
/// kind. Unknown/unsupported shapes fall back to their string
/// representation so encoding never fails outright.
fn flatten_params(params: &serde_json::Map<String, Value>) -> Vec<OscType> {
    let mut args = Vec::with_capacity(params.len() * 2);
    for (key, value) in params {
        args.push(OscType::String(key.clone()));
        args.push(to_osc_type(value));
    }
    args
}

fn to_osc_type(value: &Value) -> OscType {
    match value {
        Value::Bool(b) => OscType::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                OscType::Int(i as i32)
            } else {
                OscType::Float(n.as_f64().unwrap_or(0.0) as f32)
            }
        }
        Value::String(s) => OscType::String(s.clone()),
        other => OscType::String(other.to_string()),
    }
}

impl Sender for OscSender {
    fn send_batch(&self, messages: &[ScheduledMessage]) {
        for message in messages {
            let bytes = self.encode(message);
            if let Err(err) = self.socket.send_to(&bytes, &self.target) {
                self.send_errors.fetch_add(1, Ordering::Relaxed);
                warn!(sender = %self.name, error = %err, "osc send failed, dropping message");
            }
        }
    }

    fn close(&self) {}

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_mixed_types_with_string_fallback() {
        let params = json!({"s": "bd", "n": 2, "gain": 0.8, "muted": false})
            .as_object()
            .unwrap()
            .clone();
        let args = flatten_params(&params);
        assert_eq!(args.len(), 8);
    }

    #[test]
    fn sends_without_blocking_on_loopback() {
        let sender = OscSender::new("test", "127.0.0.1", 57120).unwrap();
        let msg = ScheduledMessage {
            destination_id: "kick".into(),
            cycle: 0.0,
            step: 0,
            params: json!({"s": "bd"}).as_object().unwrap().clone(),
        };
        sender.send_batch(&[msg]);
        assert_eq!(sender.send_errors(), 0);
    }
}
