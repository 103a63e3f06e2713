//! Extraction yield and strength of the finished shot.

use super::ingredients::{Coffee, Water};
use crate::model::{BrewCategory, BrewResult, CoffeeType, GrindSize};

/// Specific heat of water, J/(g·°C).
pub const WATER_SPECIFIC_HEAT: f64 = 4.186;
pub const AMBIENT_TEMP_C: f64 = 20.0;
/// Heat lost between group head and cup.
const CUP_LOSS_C: f64 = 4.0;

const UNDER_EXTRACTED_BELOW: f64 = 18.0;
const OVER_EXTRACTED_ABOVE: f64 = 22.0;

/// Simulated seconds the shot runs for at 9 bar.
pub fn extraction_secs(grind: GrindSize) -> u64 {
    match grind {
        GrindSize::ExtraFine => 35,
        GrindSize::Fine => 28,
        GrindSize::Medium => 22,
        GrindSize::Coarse => 17,
        GrindSize::ExtraCoarse => 13,
    }
}

fn base_yield(grind: GrindSize) -> f64 {
    match grind {
        GrindSize::ExtraFine => 23.5,
        GrindSize::Fine => 20.5,
        GrindSize::Medium => 18.5,
        GrindSize::Coarse => 16.5,
        GrindSize::ExtraCoarse => 14.5,
    }
}

fn bean_bonus(kind: CoffeeType) -> f64 {
    match kind {
        CoffeeType::Arabica => 0.0,
        CoffeeType::Blend => 0.5,
        CoffeeType::Robusta => 1.0,
    }
}

pub fn categorize(extraction_percent: f64) -> BrewCategory {
    if extraction_percent < UNDER_EXTRACTED_BELOW {
        BrewCategory::UnderExtracted
    } else if extraction_percent > OVER_EXTRACTED_ABOVE {
        BrewCategory::OverExtracted
    } else {
        BrewCategory::Balanced
    }
}

pub fn compute_result(coffee: &Coffee, water: &Water) -> BrewResult {
    // Hotter water extracts more: +0.25% yield per °C around 90°C.
    let temp_adjust = (water.actual_temp_c - 90.0) * 0.25;
    let extraction_percent =
        (base_yield(coffee.grind_size) + bean_bonus(coffee.kind) + temp_adjust).clamp(8.0, 30.0);

    // The puck retains roughly its own dose in water, capped at a third of the shot.
    let retained_ml = coffee.actual_weight_g.min(water.actual_volume_ml / 3.0);
    let dissolved_g = coffee.actual_weight_g * extraction_percent / 100.0;
    let volume_ml = water.actual_volume_ml - retained_ml + dissolved_g;
    let tds_percent = dissolved_g / volume_ml * 100.0;

    BrewResult {
        tds_percent,
        extraction_percent,
        temperature_c: water.actual_temp_c - CUP_LOSS_C,
        volume_ml,
        category: categorize(extraction_percent),
    }
}
