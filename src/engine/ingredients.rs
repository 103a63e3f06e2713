//! Physical inputs of a brew. Each derives its "actual" values from the
//! nominal ones with a little modelling noise.

use super::MachineError;
use crate::model::{CoffeeType, GrindSize, HeatSource};
use rand::Rng;

fn require_positive(field: &'static str, value: f64) -> Result<f64, MachineError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(MachineError::InvalidInput { field, value })
    }
}

/// Scale `nominal` by a uniform factor in `1 ± spread`, rounded to 0.1.
fn jitter(rng: &mut impl Rng, nominal: f64, spread: f64) -> f64 {
    let factor = 1.0 + rng.gen_range(-spread..=spread);
    (nominal * factor * 10.0).round() / 10.0
}

#[derive(Debug, Clone)]
pub struct Coffee {
    pub kind: CoffeeType,
    pub grind_size: GrindSize,
    pub nominal_weight_g: f64,
    pub actual_weight_g: f64,
}

impl Coffee {
    pub fn new(
        kind: CoffeeType,
        grind_size: GrindSize,
        nominal_weight_g: f64,
        rng: &mut impl Rng,
    ) -> Result<Self, MachineError> {
        let nominal_weight_g = require_positive("coffee weight", nominal_weight_g)?;
        Ok(Self {
            kind,
            grind_size,
            nominal_weight_g,
            // Grinder dosing is accurate to about 2%.
            actual_weight_g: jitter(rng, nominal_weight_g, 0.02),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Water {
    pub nominal_volume_ml: f64,
    pub nominal_temp_c: f64,
    pub actual_volume_ml: f64,
    pub actual_temp_c: f64,
}

impl Water {
    pub fn new(
        nominal_volume_ml: f64,
        nominal_temp_c: f64,
        rng: &mut impl Rng,
    ) -> Result<Self, MachineError> {
        let nominal_volume_ml = require_positive("water volume", nominal_volume_ml)?;
        let nominal_temp_c = require_positive("water temperature", nominal_temp_c)?;
        let actual_temp_c = nominal_temp_c + rng.gen_range(-0.5..=0.5);
        Ok(Self {
            nominal_volume_ml,
            nominal_temp_c,
            actual_volume_ml: jitter(rng, nominal_volume_ml, 0.015),
            actual_temp_c: actual_temp_c.min(100.0),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Heat {
    pub source: HeatSource,
    pub heat_power_w: f64,
}

impl Heat {
    /// Only non-finite power is rejected here. Zero or negative power is a
    /// machine fault and surfaces as [`MachineError::HeaterFault`] at assembly.
    pub fn new(source: HeatSource, heat_power_w: f64) -> Result<Self, MachineError> {
        if !heat_power_w.is_finite() {
            return Err(MachineError::InvalidInput {
                field: "heat power",
                value: heat_power_w,
            });
        }
        Ok(Self {
            source,
            heat_power_w,
        })
    }

    /// Fraction of electrical power that ends up in the water.
    pub fn efficiency(&self) -> f64 {
        match self.source {
            HeatSource::ElectricBoiler => 0.85,
        }
    }
}
