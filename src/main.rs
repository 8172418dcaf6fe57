#[cfg(feature = "gui")]
use eframe::egui;

#[cfg(feature = "gui")]
use vibeseq::device::connector::{ConnectorEvent, DeviceConnector, DEFAULT_SERVER_ADDRESS};
#[cfg(feature = "gui")]
use vibeseq::device::{DeviceInfo, HapticOutput};
#[cfg(feature = "gui")]
use vibeseq::sequencer::{
    Sequence, DURATION_MAX_MS, DURATION_MIN_MS, DURATION_STEP_MS, LEVEL_MAX, STEP_COUNT,
};
#[cfg(feature = "gui")]
use vibeseq::{shared, FileStorage, Session};

#[cfg(feature = "gui")]
const STATE_FILE: &str = "vibeseq-state.json";

#[cfg(feature = "gui")]
fn main() -> Result<(), eframe::Error> {
    init_tracing();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 640.0])
            .with_title("vibe sequencer"),
        ..Default::default()
    };

    eframe::run_native(
        "vibeseq",
        options,
        Box::new(|_cc| Ok(Box::new(VibeseqApp::new()))),
    )
}

#[cfg(not(feature = "gui"))]
fn main() {
    eprintln!("This binary requires the 'gui' feature to be enabled");
    std::process::exit(1);
}

#[cfg(feature = "gui")]
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[cfg(feature = "gui")]
enum PanelAction {
    SetValue { index: usize, step: usize, level: u8 },
    SetDuration { index: usize, duration: u64 },
    TogglePlay { index: usize },
    Remove { index: usize },
}

#[cfg(feature = "gui")]
struct VibeseqApp {
    session: Session,
    connector: DeviceConnector,
    devices: Vec<DeviceInfo>,
    connecting: bool,
}

#[cfg(feature = "gui")]
impl VibeseqApp {
    fn new() -> Self {
        let address =
            std::env::var("VIBESEQ_SERVER").unwrap_or_else(|_| DEFAULT_SERVER_ADDRESS.to_string());

        Self {
            session: Session::new(shared(FileStorage::open(STATE_FILE))),
            connector: DeviceConnector::spawn(address),
            devices: Vec::new(),
            connecting: true,
        }
    }

    fn handle_connector_events(&mut self) {
        for event in self.connector.poll_events() {
            match event {
                ConnectorEvent::Connected => self.connecting = false,
                ConnectorEvent::ConnectFailed(reason) => {
                    // No retry; the selector keeps showing "connecting...".
                    tracing::warn!("device server unavailable: {reason}");
                }
                ConnectorEvent::DevicesChanged(devices) => {
                    self.devices = devices;
                    let connector = &self.connector;
                    let devices = self.devices.clone();
                    self.session.rebind_device(
                        &devices,
                        |info: &DeviceInfo| -> Box<dyn HapticOutput> {
                            Box::new(connector.bind(info.clone()))
                        },
                    );
                }
            }
        }
    }

    fn draw_device_selector(&mut self, ui: &mut egui::Ui) {
        let mut chosen = None;

        ui.horizontal(|ui| {
            ui.label("Device:");
            let selected_text = match (self.session.device(), self.connecting) {
                (Some(info), _) => info.name.clone(),
                (None, true) => "connecting...".to_string(),
                (None, false) => "select a device".to_string(),
            };

            egui::ComboBox::from_id_source("device-selector")
                .selected_text(selected_text)
                .show_ui(ui, |ui| {
                    for device in &self.devices {
                        let selected = self.session.device().map(|d| d.index) == Some(device.index);
                        if ui.selectable_label(selected, &device.name).clicked() {
                            chosen = Some(device.index);
                        }
                    }
                });
        });

        if let Some(index) = chosen {
            let connector = &self.connector;
            let devices = self.devices.clone();
            self.session.select_device(
                &index.to_string(),
                &devices,
                |info: &DeviceInfo| -> Box<dyn HapticOutput> {
                    Box::new(connector.bind(info.clone()))
                },
            );
        }
    }

    fn apply(&mut self, action: PanelAction) {
        let result = match action {
            PanelAction::SetValue { index, step, level } => {
                self.session.set_value(index, step, level)
            }
            PanelAction::SetDuration { index, duration } => {
                self.session.set_duration(index, duration)
            }
            PanelAction::TogglePlay { index } => {
                self.session.toggle_play(index);
                Ok(())
            }
            PanelAction::Remove { index } => self.session.remove_sequence(index),
        };

        if let Err(e) = result {
            tracing::warn!("failed to persist sequences: {e}");
        }
    }
}

#[cfg(feature = "gui")]
fn draw_sequencer(
    ui: &mut egui::Ui,
    index: usize,
    sequence: &Sequence,
    playhead: usize,
    is_playing: bool,
    device_bound: bool,
) -> Option<PanelAction> {
    let mut action = None;

    // 20 columns by 5 levels; cell (step, level) is lit when the column's
    // value equals that level.
    ui.horizontal(|ui| {
        ui.spacing_mut().item_spacing = egui::vec2(2.0, 2.0);

        for step in 0..STEP_COUNT {
            let column_playing = is_playing && playhead == step;

            ui.vertical(|ui| {
                ui.spacing_mut().item_spacing = egui::vec2(2.0, 2.0);

                for level in 0..=LEVEL_MAX {
                    let selected = sequence.value_at(step) == level;
                    let fill = match (selected, column_playing) {
                        (true, true) => egui::Color32::from_rgb(120, 220, 120),
                        (true, false) => egui::Color32::from_rgb(190, 80, 160),
                        (false, true) => egui::Color32::from_rgb(70, 70, 70),
                        (false, false) => egui::Color32::from_rgb(40, 40, 40),
                    };

                    let cell = egui::Button::new("")
                        .min_size(egui::vec2(26.0, 20.0))
                        .fill(fill);
                    let response = ui.add(cell);

                    // Click or drag across cells with the button held.
                    let painting =
                        response.contains_pointer() && ui.input(|i| i.pointer.primary_down());
                    if response.clicked() || painting {
                        action = Some(PanelAction::SetValue { index, step, level });
                    }
                }
            });
        }
    });

    ui.add_space(4.0);

    ui.horizontal(|ui| {
        let label = if is_playing { "pause" } else { "play" };
        if ui
            .add_enabled(device_bound, egui::Button::new(label))
            .clicked()
        {
            action = Some(PanelAction::TogglePlay { index });
        }

        let mut duration = sequence.duration;
        if ui
            .add(
                egui::Slider::new(&mut duration, DURATION_MIN_MS..=DURATION_MAX_MS)
                    .step_by(DURATION_STEP_MS as f64)
                    .text("duration"),
            )
            .changed()
        {
            action = Some(PanelAction::SetDuration { index, duration });
        }

        if ui.button("remove").clicked() {
            action = Some(PanelAction::Remove { index });
        }
    });

    action
}

#[cfg(feature = "gui")]
impl eframe::App for VibeseqApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint();

        self.handle_connector_events();
        self.session.pump();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("vibe sequencer");
            ui.add_space(10.0);

            self.draw_device_selector(ui);
            ui.add_space(10.0);

            let mut action = None;
            let device_bound = self.session.device().is_some();

            egui::ScrollArea::vertical().show(ui, |ui| {
                for index in 0..self.session.sequence_count() {
                    let Some(sequence) = self.session.sequence(index) else {
                        continue;
                    };
                    let is_playing = self.session.playing() == Some(index);
                    let playhead = self.session.playhead(index);

                    if let Some(panel_action) =
                        draw_sequencer(ui, index, sequence, playhead, is_playing, device_bound)
                    {
                        action = Some(panel_action);
                    }

                    ui.add_space(12.0);
                }

                if ui.button("Add Sequencer").clicked() {
                    if let Err(e) = self.session.add_sequence() {
                        tracing::warn!("failed to persist sequences: {e}");
                    }
                }
            });

            if let Some(action) = action {
                self.apply(action);
            }
        });
    }
}
