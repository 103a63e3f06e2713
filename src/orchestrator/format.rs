//! Human-readable messages for the report feed.

use crate::engine::ingredients::{Coffee, Heat, Water};
use crate::model::{fixed, BrewInfo, BrewStep};
use std::borrow::Cow;

pub const MSG_ALREADY_RUNNING: &str = "Simulation already running";
pub const MSG_STARTED: &str = "Simulation started";
pub const MSG_ASSEMBLING: &str = "Assembling machine...";
pub const MSG_READY: &str = "Machine ready";
pub const MSG_BREWING: &str = "Brewing espresso...";
pub const MSG_COMPLETE: &str = "Brew complete";

/// Display label for a step id; unknown ids are shown as-is.
pub fn step_label(id: &str) -> Cow<'_, str> {
    match id {
        "heat-water" => "Heat water".into(),
        "pre-brew" => "Pre-heating portafilter".into(),
        "pre-infusion" => "Pre-infusion".into(),
        "pressure-buildup" => "Pressure build".into(),
        "extraction" => "Extracting".into(),
        other => Cow::Borrowed(other),
    }
}

// Zero readings count as absent.
fn reading(v: Option<f64>) -> Option<f64> {
    v.filter(|x| *x != 0.0 && !x.is_nan())
}

pub fn format_step(step: &BrewStep) -> String {
    let mut out = step_label(&step.step).into_owned();

    let pressure = reading(step.pressure_bars);
    if let Some(bars) = pressure {
        out.push_str(&format!(" - {bars} bar"));
    }

    if let Some(temp) = reading(step.temperature_c) {
        let sep = if pressure.is_some() { "•" } else { "-" };
        out.push_str(&format!(" {sep} {}°C", fixed(temp, 1)));
    }

    if let Some(ms) = step.time_remaining_ms.filter(|ms| *ms > 0.0) {
        out.push_str(&format!(" • left {}s", (ms / 1000.0).round()));
    }

    out
}

pub fn format_setup(coffee: &Coffee, water: &Water, heat: &Heat) -> String {
    format!(
        "Setup - water {:.1}ml @ {:.1}°C • coffee {}g {} ({}) • heater {}W",
        water.actual_volume_ml,
        water.actual_temp_c,
        coffee.actual_weight_g,
        coffee.kind,
        coffee.grind_size,
        heat.heat_power_w,
    )
}

pub fn format_brew_complete(info: &BrewInfo) -> String {
    format!(
        "{MSG_COMPLETE} - TDS {} • Ext {} • {} • {} • {}",
        info.tds, info.extraction, info.temperature, info.volume, info.category
    )
}

pub fn format_error(err: &anyhow::Error) -> String {
    format!("Error: {err}")
}
