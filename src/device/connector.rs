/// Bridge between the UI thread and the buttplug device-control client.
///
/// The async client lives on its own thread inside a tokio runtime. The UI
/// polls connector events and sends device commands over channels, the same
/// thread-plus-channel shape the playback clock uses. There is no deadline
/// on the connection attempt and no retry after a failure.
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread;

use buttplug::client::{ButtplugClient, ButtplugClientEvent, ScalarValueCommand};
use buttplug::core::connector::new_json_ws_client_connector;
use futures::StreamExt;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use super::{DeviceInfo, HapticOutput};

pub const DEFAULT_SERVER_ADDRESS: &str = "ws://127.0.0.1:12345";
const CLIENT_NAME: &str = "vibe sequencer";

#[derive(Debug, Clone)]
pub enum ConnectorEvent {
    Connected,
    ConnectFailed(String),
    DevicesChanged(Vec<DeviceInfo>),
}

#[derive(Debug, Clone, Copy)]
pub enum DeviceCommand {
    Vibrate { index: u32, strength: f64 },
    Stop { index: u32 },
}

pub struct DeviceConnector {
    events: Receiver<ConnectorEvent>,
    commands: UnboundedSender<DeviceCommand>,
}

impl DeviceConnector {
    /// Spawns the client thread and begins connecting to `address`.
    pub fn spawn(address: String) -> Self {
        let (event_tx, event_rx) = channel();
        let (command_tx, command_rx) = unbounded_channel();

        thread::spawn(move || match tokio::runtime::Runtime::new() {
            Ok(runtime) => runtime.block_on(run_client(address, event_tx, command_rx)),
            Err(e) => {
                let _ = event_tx.send(ConnectorEvent::ConnectFailed(e.to_string()));
            }
        });

        Self {
            events: event_rx,
            commands: command_tx,
        }
    }

    pub fn poll_events(&self) -> Vec<ConnectorEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Hands out a haptic capability bound to one device index.
    pub fn bind(&self, info: DeviceInfo) -> BoundDevice {
        BoundDevice {
            info,
            commands: self.commands.clone(),
        }
    }
}

pub struct BoundDevice {
    info: DeviceInfo,
    commands: UnboundedSender<DeviceCommand>,
}

impl BoundDevice {
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }
}

impl HapticOutput for BoundDevice {
    fn vibrate(&self, strength: f64) {
        let _ = self.commands.send(DeviceCommand::Vibrate {
            index: self.info.index,
            strength,
        });
    }

    fn stop(&self) {
        let _ = self.commands.send(DeviceCommand::Stop {
            index: self.info.index,
        });
    }
}

fn snapshot(client: &ButtplugClient) -> Vec<DeviceInfo> {
    client
        .devices()
        .iter()
        .map(|device| DeviceInfo {
            index: device.index(),
            name: device.name().clone(),
        })
        .collect()
}

async fn run_client(
    address: String,
    events: Sender<ConnectorEvent>,
    mut commands: UnboundedReceiver<DeviceCommand>,
) {
    let client = ButtplugClient::new(CLIENT_NAME);
    let connector = new_json_ws_client_connector(&address);

    if let Err(e) = client.connect(connector).await {
        tracing::warn!("device server connection failed: {e}");
        let _ = events.send(ConnectorEvent::ConnectFailed(e.to_string()));
        return;
    }

    let mut client_events = Box::pin(client.event_stream());

    let _ = events.send(ConnectorEvent::Connected);
    let _ = events.send(ConnectorEvent::DevicesChanged(snapshot(&client)));

    if let Err(e) = client.start_scanning().await {
        tracing::warn!("device scan failed: {e}");
    }

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(DeviceCommand::Vibrate { index, strength }) => {
                    // Commands for a device that has gone away are dropped.
                    if let Some(device) = client.devices().into_iter().find(|d| d.index() == index) {
                        if let Err(e) = device.vibrate(&ScalarValueCommand::ScalarValue(strength)).await {
                            tracing::warn!("vibrate failed: {e}");
                        }
                    }
                }
                Some(DeviceCommand::Stop { index }) => {
                    if let Some(device) = client.devices().into_iter().find(|d| d.index() == index) {
                        if let Err(e) = device.stop().await {
                            tracing::warn!("stop failed: {e}");
                        }
                    }
                }
                // UI side went away; shut the client thread down.
                None => break,
            },
            event = client_events.next() => match event {
                Some(ButtplugClientEvent::DeviceAdded(_)) | Some(ButtplugClientEvent::DeviceRemoved(_)) => {
                    let _ = events.send(ConnectorEvent::DevicesChanged(snapshot(&client)));
                }
                Some(ButtplugClientEvent::ServerDisconnect) | None => {
                    tracing::warn!("device server disconnected");
                    break;
                }
                Some(_) => {}
            },
        }
    }
}
