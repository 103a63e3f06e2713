mod extraction;
pub mod ingredients;
pub mod timing;

use crate::model::{BrewEvent, BrewStep};
use anyhow::Result;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use ingredients::{Coffee, Heat, Water};
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use timing::Timing;

pub const BOILER_CAPACITY_ML: f64 = 60.0;
pub const BASKET_CAPACITY_G: f64 = 45.0;

/// Faults raised by the simulated machine and its inputs.
#[derive(Debug, Error)]
pub enum MachineError {
    #[error("invalid {field}: {value}")]
    InvalidInput { field: &'static str, value: f64 },
    #[error("heater fault: {power_w}W is not a usable heater power")]
    HeaterFault { power_w: f64 },
    #[error("water volume {volume_ml:.1}ml exceeds boiler capacity of {capacity_ml}ml")]
    BoilerCapacity { volume_ml: f64, capacity_ml: f64 },
    #[error("coffee dose {weight_g:.1}g exceeds basket capacity of {capacity_g}g")]
    BasketCapacity { weight_g: f64, capacity_g: f64 },
    #[error("machine is not assembled")]
    NotAssembled,
}

/// A brewing machine driven by the run controller.
///
/// `brew` returns a lazy, finite, non-restartable sequence of steps terminated
/// by [`BrewEvent::Finished`]. Every element may suspend.
pub trait Machine: Send {
    fn assemble(&mut self, coffee: Coffee, water: Water, heat: Heat) -> BoxFuture<'_, Result<()>>;

    fn brew(&mut self) -> BoxStream<'static, Result<BrewEvent>>;
}

/// Builds a fresh machine for each run, bound to that run's timing context.
pub trait MachineFactory: Send + Sync {
    fn create(&self, timing: Timing) -> Box<dyn Machine>;
}

impl<F> MachineFactory for F
where
    F: Fn(Timing) -> Box<dyn Machine> + Send + Sync,
{
    fn create(&self, timing: Timing) -> Box<dyn Machine> {
        self(timing)
    }
}

/// Factory for the built-in espresso model.
pub fn espresso_machine(timing: Timing) -> Box<dyn Machine> {
    Box::new(EspressoMachine::new(timing))
}

struct Loaded {
    coffee: Coffee,
    water: Water,
    heat: Heat,
}

pub struct EspressoMachine {
    timing: Timing,
    loaded: Option<Loaded>,
}

impl EspressoMachine {
    pub fn new(timing: Timing) -> Self {
        Self {
            timing,
            loaded: None,
        }
    }
}

impl Machine for EspressoMachine {
    fn assemble(&mut self, coffee: Coffee, water: Water, heat: Heat) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.timing.sleep(Duration::from_millis(1500)).await;

            if heat.heat_power_w <= 0.0 {
                return Err(MachineError::HeaterFault {
                    power_w: heat.heat_power_w,
                }
                .into());
            }
            if water.actual_volume_ml > BOILER_CAPACITY_ML {
                return Err(MachineError::BoilerCapacity {
                    volume_ml: water.actual_volume_ml,
                    capacity_ml: BOILER_CAPACITY_ML,
                }
                .into());
            }
            if coffee.actual_weight_g > BASKET_CAPACITY_G {
                return Err(MachineError::BasketCapacity {
                    weight_g: coffee.actual_weight_g,
                    capacity_g: BASKET_CAPACITY_G,
                }
                .into());
            }

            tracing::debug!(
                power_w = heat.heat_power_w,
                volume_ml = water.actual_volume_ml,
                "machine assembled"
            );
            self.loaded = Some(Loaded { coffee, water, heat });
            Ok(())
        })
    }

    fn brew(&mut self) -> BoxStream<'static, Result<BrewEvent>> {
        let Some(loaded) = self.loaded.take() else {
            return stream::once(async { Err(MachineError::NotAssembled.into()) }).boxed();
        };
        let session = BrewSession {
            timing: self.timing.clone(),
            plan: plan_steps(&loaded),
            loaded,
            finished: false,
        };
        stream::unfold(session, |mut session| async move {
            if let Some(planned) = session.plan.pop_front() {
                session.timing.sleep(planned.delay).await;
                return Some((Ok(BrewEvent::Step(planned.step)), session));
            }
            if session.finished {
                return None;
            }
            session.finished = true;
            let result = extraction::compute_result(&session.loaded.coffee, &session.loaded.water);
            Some((Ok(BrewEvent::Finished(Some(result))), session))
        })
        .boxed()
    }
}

struct PlannedStep {
    delay: Duration,
    step: BrewStep,
}

struct BrewSession {
    timing: Timing,
    plan: VecDeque<PlannedStep>,
    loaded: Loaded,
    finished: bool,
}

// Saturates: a vanishingly small heater power yields an effectively endless heat-up.
fn secs(s: f64) -> Duration {
    Duration::try_from_secs_f64(s.max(0.0)).unwrap_or(Duration::MAX)
}

/// Lay out every step of the shot with its simulated delay.
fn plan_steps(loaded: &Loaded) -> VecDeque<PlannedStep> {
    let Loaded { coffee, water, heat } = loaded;
    let target_c = water.actual_temp_c;
    let mut plan = VecDeque::new();

    // Heating: energy = m·c·ΔT, delivered at the heater's effective power.
    let delta_c = (target_c - extraction::AMBIENT_TEMP_C).max(0.0);
    let energy_j = water.actual_volume_ml * extraction::WATER_SPECIFIC_HEAT * delta_c;
    let heat_secs = energy_j / (heat.heat_power_w * heat.efficiency());
    let ticks = (heat_secs.ceil() as usize).clamp(1, 60);
    let tick_secs = heat_secs / ticks as f64;
    for i in 1..=ticks {
        let progress = i as f64 / ticks as f64;
        plan.push_back(PlannedStep {
            delay: secs(tick_secs),
            step: BrewStep::new("heat-water")
                .temperature(extraction::AMBIENT_TEMP_C + delta_c * progress)
                .remaining_ms((heat_secs - tick_secs * i as f64) * 1000.0),
        });
    }

    plan.push_back(PlannedStep {
        delay: secs(2.0),
        step: BrewStep::new("pre-brew").temperature(target_c - 1.5),
    });

    for (i, bars) in [2.0, 2.5, 3.0].into_iter().enumerate() {
        plan.push_back(PlannedStep {
            delay: secs(1.0),
            step: BrewStep::new("pre-infusion")
                .pressure(bars)
                .temperature(target_c - 1.0)
                .remaining_ms((2 - i) as f64 * 1000.0),
        });
    }

    for bars in [5.0, 7.0, 9.0] {
        plan.push_back(PlannedStep {
            delay: secs(1.0),
            step: BrewStep::new("pressure-buildup").pressure(bars),
        });
    }

    let total = extraction::extraction_secs(coffee.grind_size);
    let mut elapsed = 0;
    while elapsed < total {
        let next = (elapsed + 5).min(total);
        plan.push_back(PlannedStep {
            delay: Duration::from_secs(next - elapsed),
            step: BrewStep::new("extraction")
                .pressure(9.0)
                .temperature(target_c - 0.05 * next as f64)
                .remaining_ms(((total - next) * 1000) as f64),
        });
        elapsed = next;
    }

    plan
}
