use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use arc_swap::ArcSwap;
use crossbeam_channel::{bounded, Sender as ChannelSender};
use midir::{MidiOutput, MidiOutputConnection};
use patterncore_model::ScheduledMessage;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Result, SenderError};
use crate::sender::Sender;

const NOTE_ON: u8 = 0x90;
const NOTE_OFF: u8 = 0x80;
const CONTROL_CHANGE: u8 = 0xB0;
const PITCH_BEND: u8 = 0xE0;
const AFTERTOUCH: u8 = 0xD0;
const CLOCK: u8 = 0xF8;
const START: u8 = 0xFA;
const CONTINUE: u8 = 0xFB;
const STOP: u8 = 0xFC;
const ALL_SOUND_OFF: u8 = 120;
const ALL_NOTES_OFF: u8 = 123;

/// One open MIDI output port, owned by a dedicated OS thread.
///
/// A bounded `crossbeam_channel` feeds a worker thread that owns the single
/// `midir::MidiOutputConnection`, with `arc_swap` publishing the connected
/// port name for lock-free reads and an `AtomicBool` tracking whether a port
/// is currently open. Selecting a new port always closes the old connection
/// before opening the new one, so at most one port is ever held.
#[derive(Clone)]
pub struct MidiSender {
    name: String,
    command_tx: ChannelSender<Command>,
    connected_port: Arc<ArcSwap<Option<String>>>,
    is_connected: Arc<AtomicBool>,
    dropped_events: Arc<AtomicU64>,
}

enum Command {
    Connect(String),
    Disconnect,
    Bytes(Vec<u8>),
    Shutdown,
}

impl MidiSender {
    pub fn new(name: impl Into<String>) -> Self {
        let (command_tx, command_rx) = bounded::<Command>(4096);
        let connected_port = Arc::new(ArcSwap::from_pointee(None));
        let is_connected = Arc::new(AtomicBool::new(false));

        let connected_port_worker = Arc::clone(&connected_port);
        let is_connected_worker = Arc::clone(&is_connected);
        thread::Builder::new()
            .name("midi-sender".into())
            .spawn(move || run_worker(command_rx, connected_port_worker, is_connected_worker))
            .expect("failed to spawn midi sender thread");

        Self {
            name: name.into(),
            command_tx,
            connected_port,
            is_connected,
            dropped_events: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn list_ports() -> Result<Vec<String>> {
        let output = MidiOutput::new("patterncore-enumerate")
            .map_err(|e| SenderError::MidiPort(e.to_string()))?;
        Ok(output
            .ports()
            .iter()
            .filter_map(|p| output.port_name(p).ok())
            .collect())
    }

    /// Closes any currently open port, then opens `port_name`. The worker
    /// thread clears its existing connection before attempting the new one,
    /// so only one `MidiOutputConnection` is ever held.
    pub fn connect(&self, port_name: &str) {
        let _ = self.command_tx.send(Command::Connect(port_name.to_string()));
    }

    pub fn disconnect(&self) {
        let _ = self.command_tx.send(Command::Disconnect);
    }

    pub fn connected_port(&self) -> Option<String> {
        (**self.connected_port.load()).clone()
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected.load(Ordering::Acquire)
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    fn send_bytes(&self, bytes: Vec<u8>) {
        if !self.is_connected() {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
            return;
        }
        if self.command_tx.send(Command::Bytes(bytes)).is_err() {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn send_note_on(&self, channel: u8, note: u8, velocity: u8) {
        let channel = channel.min(15);
        self.send_bytes(vec![NOTE_ON | channel, note & 0x7F, velocity & 0x7F]);
    }

    pub fn send_note_off(&self, channel: u8, note: u8) {
        let channel = channel.min(15);
        self.send_bytes(vec![NOTE_OFF | channel, note & 0x7F, 0]);
    }

    pub fn send_cc(&self, channel: u8, cc_number: u8, value: u8) {
        let channel = channel.min(15);
        self.send_bytes(vec![CONTROL_CHANGE | channel, cc_number & 0x7F, value & 0x7F]);
    }

    pub fn send_pitch_bend(&self, channel: u8, value: i16) {
        let channel = channel.min(15);
        let unsigned = (value + 8192).clamp(0, 16383) as u16;
        let lsb = (unsigned & 0x7F) as u8;
        let msb = ((unsigned >> 7) & 0x7F) as u8;
        self.send_bytes(vec![PITCH_BEND | channel, lsb, msb]);
    }

    pub fn send_aftertouch(&self, channel: u8, value: u8) {
        let channel = channel.min(15);
        self.send_bytes(vec![AFTERTOUCH | channel, value & 0x7F]);
    }

    pub fn send_clock(&self) {
        self.send_bytes(vec![CLOCK]);
    }

    pub fn send_start(&self) {
        self.send_bytes(vec![START]);
    }

    pub fn send_stop(&self) {
        self.send_bytes(vec![STOP]);
    }

    pub fn send_continue(&self) {
        self.send_bytes(vec![CONTINUE]);
    }

    /// All-notes-off and all-sound-off on every channel.
    /// Idempotent: calling this twice in a row sends the same all-channel
    /// reset both times, but only the first call follows any actually
    /// sounding notes — the second is a harmless no-op from the listener's
    /// perspective.
    pub fn panic(&self) {
        for channel in 0..16u8 {
            self.send_cc(channel, ALL_SOUND_OFF, 0);
            self.send_cc(channel, ALL_NOTES_OFF, 0);
        }
        self.send_stop();
    }
}

impl Sender for MidiSender {
    fn send_batch(&self, messages: &[ScheduledMessage]) {
        for message in messages {
            let channel = message
                .params
                .get("channel")
                .and_then(Value::as_u64)
                .unwrap_or(0) as u8;
            let velocity = message
                .params
                .get("velocity")
                .and_then(Value::as_f64)
                .unwrap_or(1.0);
            if let Some(note) = message.params.get("note").and_then(Value::as_u64) {
                self.send_note_on(channel, note as u8, (velocity * 127.0).round() as u8);
            } else {
                debug!(destination = %message.destination_id, "midi message without a note, skipping");
            }
        }
    }

    fn close(&self) {
        let _ = self.command_tx.send(Command::Shutdown);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn run_worker(
    rx: crossbeam_channel::Receiver<Command>,
    connected_port: Arc<ArcSwap<Option<String>>>,
    is_connected: Arc<AtomicBool>,
) {
    let mut connection: Option<MidiOutputConnection> = None;

    while let Ok(cmd) = rx.recv() {
        match cmd {
            Command::Connect(port_name) => {
                // Close the prior connection before opening the new one.
                connection = None;
                is_connected.store(false, Ordering::Release);

                match open_port(&port_name) {
                    Ok(conn) => {
                        connection = Some(conn);
                        connected_port.store(Arc::new(Some(port_name.clone())));
                        is_connected.store(true, Ordering::Release);
                        debug!(port = %port_name, "midi port connected");
                    }
                    Err(err) => {
                        warn!(port = %port_name, error = %err, "midi unavailable");
                        connected_port.store(Arc::new(None));
                    }
                }
            }
            Command::Disconnect => {
                connection = None;
                is_connected.store(false, Ordering::Release);
                connected_port.store(Arc::new(None));
            }
            Command::Bytes(bytes) => {
                if let Some(conn) = connection.as_mut() {
                    if let Err(err) = conn.send(&bytes) {
                        warn!(error = %err, "midi write failed");
                    }
                }
            }
            Command::Shutdown => break,
        }
    }
}

fn open_port(port_name: &str) -> Result<MidiOutputConnection> {
    let output = MidiOutput::new("patterncore").map_err(|e| SenderError::MidiPort(e.to_string()))?;
    let port = output
        .ports()
        .into_iter()
        .find(|p| output.port_name(p).map(|n| n == port_name).unwrap_or(false))
        .ok_or_else(|| SenderError::MidiPort(format!("port `{port_name}` not found")))?;
    output
        .connect(&port, "patterncore-out")
        .map_err(|e| SenderError::MidiPort(e.to_string()))
}
