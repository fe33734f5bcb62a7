use crate::prelude::*;
use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts};

pub struct ConfigEguiPlugin;

impl Plugin for ConfigEguiPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Update, ui_system);
    }
}

/// One frame of panel interaction.
#[derive(Clone, Copy, Default, Debug)]
struct EditSignals {
    /// Some value moved this frame.
    changed: bool,
    /// A slider drag ended or a control gave up focus.
    released: bool,
    /// A control is still held: pointer down, slider focused, color picker open.
    active: bool,
}

/// Changes collect in `pending` and are committed once, when the control is let go.
/// Letting go of a control that never changed commits nothing.
fn commit_edit(pending: &mut bool, signals: EditSignals) -> bool {
    *pending |= signals.changed;
    if *pending && (signals.released || !signals.active) {
        *pending = false;
        return true;
    }
    false
}

fn color_ui(ui: &mut egui::Ui, label: &str, color: &mut LinearRgba) -> bool {
    ui.horizontal(|ui| {
        let mut rgb = [color.red, color.green, color.blue];
        let response = ui.color_edit_button_rgb(&mut rgb);
        ui.label(label);

        if response.changed() {
            *color = LinearRgba::rgb(rgb[0], rgb[1], rgb[2]);
        }
        response.changed()
    })
    .inner
}

fn params_ui(params: &mut GalaxyParams, ui: &mut egui::Ui) -> EditSignals {
    let minval = GalaxyParams::MIN;
    let maxval = GalaxyParams::MAX;

    let responses = [
        ui.add(
            egui::Slider::new(&mut params.count, minval.count..=maxval.count)
                .step_by(100.0)
                .logarithmic(true)
                .text("count"),
        ),
        ui.add(
            egui::Slider::new(&mut params.size, minval.size..=maxval.size)
                .step_by(0.001)
                .text("size"),
        ),
        ui.add(
            egui::Slider::new(&mut params.radius, minval.radius..=maxval.radius)
                .step_by(0.01)
                .text("radius"),
        ),
        ui.add(
            egui::Slider::new(&mut params.branches, minval.branches..=maxval.branches)
                .text("branches"),
        ),
        ui.add(
            egui::Slider::new(&mut params.spin, minval.spin..=maxval.spin)
                .step_by(0.001)
                .text("spin"),
        ),
        ui.add(
            egui::Slider::new(&mut params.randomness, minval.randomness..=maxval.randomness)
                .step_by(0.001)
                .text("randomness"),
        ),
        ui.add(
            egui::Slider::new(
                &mut params.randomness_power,
                minval.randomness_power..=maxval.randomness_power,
            )
            .step_by(0.001)
            .text("randomnessPower"),
        ),
    ];
    let mut signals = EditSignals {
        changed: responses.iter().any(egui::Response::changed),
        released: responses
            .iter()
            .any(|response| response.drag_stopped() || response.lost_focus()),
        active: responses
            .iter()
            .any(|response| response.dragged() || response.has_focus()),
    };

    ui.separator();
    signals.changed |= color_ui(ui, "insideColor", &mut params.inside_color);
    signals.changed |= color_ui(ui, "outsideColor", &mut params.outside_color);

    signals
}

fn ui_system(
    mut contexts: EguiContexts,
    mut galaxy_config: ResMut<GalaxyConfig>,
    stats: Res<GalaxyStats>,
    mut regenerate: EventWriter<RegenerateGalaxy>,
    mut visuals_set: Local<bool>,
    mut pending: Local<bool>,
) {
    let Some(ctx) = contexts.try_ctx_mut() else {
        return;
    };
    if !*visuals_set {
        ctx.set_visuals(egui::Visuals {
            window_corner_radius: 0.0.into(),
            ..Default::default()
        });
        *visuals_set = true;
    }

    let mut signals = EditSignals::default();
    egui::SidePanel::right("galaxy_panel")
        .default_width(240.0)
        .show(ctx, |ui| {
            ui.heading("Galaxy");
            signals = params_ui(&mut galaxy_config.params, ui);

            ui.separator();
            if stats.generating {
                ui.label("Generating...");
            }
            ui.label(format!(
                "{} points, built in {:.1} ms",
                stats.points,
                stats.last_generation.as_secs_f32() * 1000.0
            ));
            if stats.superseded > 0 {
                ui.label(format!("{} stale rebuilds skipped", stats.superseded));
            }
        });

    // picker drags happen inside the popup, outside the button's response
    signals.active |= ctx.input(|input| input.pointer.any_down())
        || ctx.memory(|memory| memory.any_popup_open());

    if commit_edit(&mut pending, signals) {
        regenerate.write(RegenerateGalaxy(galaxy_config.params));
    }
}
