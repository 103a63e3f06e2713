use serde::{Deserialize, Serialize};
use std::fmt;

/// Parameter bundle for one simulated brew. Immutable for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunParameters {
    pub time_scale: f64,
    pub coffee_type: CoffeeType,
    pub grind_size: GrindSize,
    pub coffee_weight_g: f64,
    pub water_volume_ml: f64,
    pub water_temp_c: f64,
    pub heat_source: HeatSource,
    pub heat_power_w: f64,
    /// Seed for the collaborators' modelling noise; `None` draws from entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for RunParameters {
    fn default() -> Self {
        Self {
            time_scale: 1.0,
            coffee_type: CoffeeType::Arabica,
            grind_size: GrindSize::Fine,
            coffee_weight_g: 20.0,
            water_volume_ml: 36.0,
            water_temp_c: 90.0,
            heat_source: HeatSource::ElectricBoiler,
            heat_power_w: 1500.0,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CoffeeType {
    Arabica,
    Robusta,
    Blend,
}

impl CoffeeType {
    pub fn as_str(self) -> &'static str {
        match self {
            CoffeeType::Arabica => "arabica",
            CoffeeType::Robusta => "robusta",
            CoffeeType::Blend => "blend",
        }
    }
}

impl fmt::Display for CoffeeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum GrindSize {
    ExtraFine,
    Fine,
    Medium,
    Coarse,
    ExtraCoarse,
}

impl GrindSize {
    pub fn as_str(self) -> &'static str {
        match self {
            GrindSize::ExtraFine => "extra-fine",
            GrindSize::Fine => "fine",
            GrindSize::Medium => "medium",
            GrindSize::Coarse => "coarse",
            GrindSize::ExtraCoarse => "extra-coarse",
        }
    }
}

impl fmt::Display for GrindSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum HeatSource {
    ElectricBoiler,
}

impl HeatSource {
    pub fn as_str(self) -> &'static str {
        match self {
            HeatSource::ElectricBoiler => "electric-boiler",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    Running,
}

/// Classification tag carried by every status entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Success,
    Warning,
    Error,
    Info,
    Heading,
    #[default]
    Plain,
}

impl ReportKind {
    /// Fixed-width tag used by the text printer.
    pub fn tag(self) -> &'static str {
        match self {
            ReportKind::Success => "OK   ",
            ReportKind::Warning => "WAIT ",
            ReportKind::Error => "ERR  ",
            ReportKind::Info => "INFO ",
            ReportKind::Heading => "==== ",
            ReportKind::Plain => "     ",
        }
    }
}

/// One line of the report feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    /// Monotonic identity; wall-clock `time` is not unique at sub-second rates.
    pub seq: u64,
    pub time: String,
    pub kind: ReportKind,
    pub message: String,
}

/// Intermediate progress value produced by a brewing machine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrewStep {
    pub step: String,
    pub pressure_bars: Option<f64>,
    pub temperature_c: Option<f64>,
    pub time_remaining_ms: Option<f64>,
}

impl BrewStep {
    pub fn new(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            ..Default::default()
        }
    }

    pub fn pressure(mut self, bars: f64) -> Self {
        self.pressure_bars = Some(bars);
        self
    }

    pub fn temperature(mut self, celsius: f64) -> Self {
        self.temperature_c = Some(celsius);
        self
    }

    pub fn remaining_ms(mut self, ms: f64) -> Self {
        self.time_remaining_ms = Some(ms);
        self
    }
}

/// Raw metrics of a finished brew.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrewResult {
    pub tds_percent: f64,
    pub extraction_percent: f64,
    pub temperature_c: f64,
    pub volume_ml: f64,
    pub category: BrewCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrewCategory {
    UnderExtracted,
    Balanced,
    OverExtracted,
}

impl BrewCategory {
    pub fn label(self) -> &'static str {
        match self {
            BrewCategory::UnderExtracted => "Under-extracted",
            BrewCategory::Balanced => "Balanced",
            BrewCategory::OverExtracted => "Over-extracted",
        }
    }
}

/// Pre-formatted summary of a [`BrewResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrewInfo {
    pub tds: String,
    pub extraction: String,
    pub temperature: String,
    pub volume: String,
    pub category: String,
}

/// Fixed-point text with `digits` decimals. Exact ties round away from zero
/// (92.25 renders as "92.3").
pub fn fixed(value: f64, digits: usize) -> String {
    let factor = 10f64.powi(digits as i32);
    let rounded = (value * factor).round() / factor;
    format!("{rounded:.digits$}")
}

impl BrewResult {
    pub fn brew_info(&self) -> BrewInfo {
        BrewInfo {
            tds: format!("{}%", fixed(self.tds_percent, 2)),
            extraction: format!("{}%", fixed(self.extraction_percent, 1)),
            temperature: format!("{}°C", fixed(self.temperature_c, 1)),
            volume: format!("{}ml", fixed(self.volume_ml, 1)),
            category: self.category.label().to_string(),
        }
    }
}

/// Element of a brew sequence: progress steps terminated by an optional result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BrewEvent {
    Step(BrewStep),
    Finished(Option<BrewResult>),
}
