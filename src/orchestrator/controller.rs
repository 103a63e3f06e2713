//! Run lifecycle controller.
//!
//! Owns the single-flight run state, drives a machine's brew sequence to
//! completion and reports every stage to the shared [`ReportFeed`].

use super::feed::ReportFeed;
use super::format::{
    format_brew_complete, format_error, format_setup, format_step, MSG_ALREADY_RUNNING,
    MSG_ASSEMBLING, MSG_BREWING, MSG_COMPLETE, MSG_READY, MSG_STARTED,
};
use crate::engine::ingredients::{Coffee, Heat, Water};
use crate::engine::timing::Timing;
use crate::engine::MachineFactory;
use crate::model::{BrewEvent, BrewResult, ReportKind, RunParameters, RunState};
use anyhow::{anyhow, Result};
use futures::stream::{BoxStream, StreamExt};
use rand::{rngs::StdRng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinSet;

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    Brew,
    Clear,
    Quit,
}

/// Marks the controller as running until dropped.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct RunController {
    factory: Box<dyn MachineFactory>,
    feed: ReportFeed,
    timing: Timing,
    running: AtomicBool,
    step_timeout: Option<Duration>,
}

impl RunController {
    pub fn new(factory: impl MachineFactory + 'static, feed: ReportFeed) -> Self {
        Self {
            factory: Box::new(factory),
            feed,
            timing: Timing::new(),
            running: AtomicBool::new(false),
            step_timeout: None,
        }
    }

    /// Fail a run when the machine produces no step within `timeout`.
    pub fn with_step_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn feed(&self) -> &ReportFeed {
        &self.feed
    }

    #[cfg(test)]
    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn state(&self) -> RunState {
        if self.running.load(Ordering::Acquire) {
            RunState::Running
        } else {
            RunState::Idle
        }
    }

    /// Run one simulation. Never fails: the outcome is reported through the feed.
    ///
    /// A call made while another run is in flight is rejected immediately with
    /// a single error entry; it neither waits nor replaces the active run.
    pub async fn execute(&self, params: &RunParameters) {
        let Some(_running) = RunningGuard::acquire(&self.running) else {
            tracing::warn!("brew requested while a simulation is running");
            self.feed.push(MSG_ALREADY_RUNNING, ReportKind::Error);
            return;
        };

        let started = Instant::now();
        tracing::info!(
            time_scale = params.time_scale,
            coffee = %params.coffee_type,
            grind = %params.grind_size,
            "simulation started"
        );
        self.feed.push(MSG_STARTED, ReportKind::Heading);

        // Dropped before `_running`, so the scale is back to default before the
        // controller reports idle.
        let _scaled = self.timing.scaled(params.time_scale);

        match self.run(params).await {
            Ok(()) => tracing::info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "simulation finished"
            ),
            Err(e) => {
                tracing::error!(error = %e, "simulation failed");
                self.feed.push(format_error(&e), ReportKind::Error);
            }
        }
    }

    async fn run(&self, params: &RunParameters) -> Result<()> {
        let mut rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let coffee = Coffee::new(
            params.coffee_type,
            params.grind_size,
            params.coffee_weight_g,
            &mut rng,
        )?;
        let water = Water::new(params.water_volume_ml, params.water_temp_c, &mut rng)?;
        let heat = Heat::new(params.heat_source, params.heat_power_w)?;
        tracing::debug!(
            dose_g = coffee.nominal_weight_g,
            actual_dose_g = coffee.actual_weight_g,
            water_ml = water.nominal_volume_ml,
            actual_water_ml = water.actual_volume_ml,
            water_temp_c = water.nominal_temp_c,
            actual_water_temp_c = water.actual_temp_c,
            "ingredients prepared"
        );
        let mut machine = self.factory.create(self.timing.clone());

        self.feed
            .push(format_setup(&coffee, &water, &heat), ReportKind::Info);

        self.feed.push(MSG_ASSEMBLING, ReportKind::Warning);
        machine.assemble(coffee, water, heat).await?;
        self.feed.push(MSG_READY, ReportKind::Success);

        self.feed.push(MSG_BREWING, ReportKind::Warning);
        match self.consume_steps(machine.brew()).await? {
            Some(result) => self.feed.push(
                format_brew_complete(&result.brew_info()),
                ReportKind::Success,
            ),
            None => self.feed.push(MSG_COMPLETE, ReportKind::Success),
        };
        Ok(())
    }

    /// Pull steps in production order until the sequence finishes.
    async fn consume_steps(
        &self,
        mut steps: BoxStream<'static, Result<BrewEvent>>,
    ) -> Result<Option<BrewResult>> {
        loop {
            let next = match self.step_timeout {
                Some(limit) => tokio::time::timeout(limit, steps.next())
                    .await
                    .map_err(|_| {
                        anyhow!("no brew step within {}", humantime::format_duration(limit))
                    })?,
                None => steps.next().await,
            };
            match next.transpose()? {
                Some(BrewEvent::Step(step)) => {
                    tracing::debug!(step = %step.step, "brew step");
                    self.feed.push_plain(format_step(&step));
                }
                Some(BrewEvent::Finished(result)) => return Ok(result),
                None => return Ok(None),
            }
        }
    }
}

/// Serve UI commands until quit. Each brew request runs on its own task so a
/// second request while one is in flight reaches the controller and is rejected.
pub(crate) async fn run_controller(
    controller: Arc<RunController>,
    params: RunParameters,
    brew_on_launch: bool,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let mut runs = JoinSet::new();
    let spawn_brew = |runs: &mut JoinSet<()>| {
        let controller = controller.clone();
        let params = params.clone();
        runs.spawn(async move { controller.execute(&params).await });
    };

    if brew_on_launch {
        spawn_brew(&mut runs);
    }

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UiCommand::Brew) => spawn_brew(&mut runs),
                    Some(UiCommand::Clear) => controller.feed().clear(),
                    Some(UiCommand::Quit) | None => break,
                }
            }
            Some(joined) = runs.join_next(), if !runs.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "simulation task failed");
                    controller
                        .feed()
                        .push(format!("Error: simulation task failed: {e}"), ReportKind::Error);
                }
            }
        }
    }

    if !runs.is_empty() {
        tracing::info!("abandoning in-flight simulation on quit");
        runs.abort_all();
        while runs.join_next().await.is_some() {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{espresso_machine, Machine, MachineError};
    use crate::model::{BrewCategory, BrewStep};
    use futures::future::BoxFuture;
    use futures::stream;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    type Script = Vec<std::result::Result<BrewEvent, &'static str>>;

    /// Machine that replays a fixed script and records the time scale it saw.
    #[derive(Clone, Default)]
    struct ScriptedMachine {
        timing: Timing,
        assemble_error: Option<&'static str>,
        gate: Option<Arc<Notify>>,
        events: Script,
        pending_after_events: bool,
        seen_scales: Arc<Mutex<Vec<f64>>>,
    }

    impl Machine for ScriptedMachine {
        fn assemble(&mut self, _: Coffee, _: Water, _: Heat) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                self.seen_scales.lock().unwrap().push(self.timing.scale());
                if let Some(gate) = &self.gate {
                    gate.notified().await;
                }
                match self.assemble_error {
                    Some(msg) => Err(anyhow!(msg)),
                    None => Ok(()),
                }
            })
        }

        fn brew(&mut self) -> BoxStream<'static, Result<BrewEvent>> {
            let events = stream::iter(
                std::mem::take(&mut self.events)
                    .into_iter()
                    .map(|ev| ev.map_err(|msg| anyhow!(msg))),
            );
            if self.pending_after_events {
                events.chain(stream::pending()).boxed()
            } else {
                events.boxed()
            }
        }
    }

    fn controller_for(script: ScriptedMachine) -> RunController {
        RunController::new(
            move |timing: Timing| -> Box<dyn Machine> {
                Box::new(ScriptedMachine {
                    timing,
                    ..script.clone()
                })
            },
            ReportFeed::new(),
        )
    }

    fn params() -> RunParameters {
        RunParameters {
            time_scale: 8.0,
            seed: Some(11),
            ..Default::default()
        }
    }

    fn result() -> BrewResult {
        BrewResult {
            tds_percent: 9.5,
            extraction_percent: 20.1,
            temperature_c: 86.0,
            volume_ml: 27.7,
            category: BrewCategory::Balanced,
        }
    }

    fn happy_script() -> ScriptedMachine {
        ScriptedMachine {
            events: vec![
                Ok(BrewEvent::Step(BrewStep::new("heat-water").temperature(60.0))),
                Ok(BrewEvent::Step(
                    BrewStep::new("extraction")
                        .pressure(9.0)
                        .temperature(92.3)
                        .remaining_ms(15000.0),
                )),
                Ok(BrewEvent::Finished(Some(result()))),
            ],
            ..Default::default()
        }
    }

    fn kinds_and_messages(feed: &ReportFeed) -> Vec<(ReportKind, String)> {
        feed.snapshot()
            .into_iter()
            .map(|e| (e.kind, e.message))
            .collect()
    }

    #[tokio::test]
    async fn successful_run_reports_newest_first() {
        let controller = controller_for(happy_script());
        controller.execute(&params()).await;

        let entries = kinds_and_messages(controller.feed());
        let kinds: Vec<_> = entries.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            [
                ReportKind::Success,
                ReportKind::Plain,
                ReportKind::Plain,
                ReportKind::Warning,
                ReportKind::Success,
                ReportKind::Warning,
                ReportKind::Info,
                ReportKind::Heading,
            ]
        );
        assert_eq!(
            entries[0].1,
            "Brew complete - TDS 9.50% • Ext 20.1% • 86.0°C • 27.7ml • Balanced"
        );
        assert_eq!(entries[1].1, "Extracting - 9 bar • 92.3°C • left 15s");
        assert_eq!(entries[2].1, "Heat water - 60.0°C");
        assert_eq!(entries[3].1, MSG_BREWING);
        assert_eq!(entries[4].1, MSG_READY);
        assert_eq!(entries[5].1, MSG_ASSEMBLING);
        assert!(entries[6].1.starts_with("Setup - water "));
        assert_eq!(entries[7].1, MSG_STARTED);
        assert_eq!(controller.state(), RunState::Idle);
    }

    #[tokio::test]
    async fn time_scale_applies_during_run_and_resets_after() {
        let script = happy_script();
        let seen = script.seen_scales.clone();
        let controller = controller_for(script);

        controller.execute(&params()).await;

        assert_eq!(*seen.lock().unwrap(), [8.0]);
        assert_eq!(controller.timing().scale(), 1.0);
    }

    #[tokio::test]
    async fn concurrent_start_is_rejected_without_side_effects() {
        let gate = Arc::new(Notify::new());
        let controller = controller_for(ScriptedMachine {
            gate: Some(gate.clone()),
            ..happy_script()
        });
        let params = params();

        let first = controller.execute(&params);
        let second = async {
            while controller.state() != RunState::Running {
                tokio::task::yield_now().await;
            }
            let before = controller.feed().snapshot();
            controller.execute(&params).await;
            let after = controller.feed().snapshot();

            assert_eq!(after.len(), before.len() + 1);
            assert_eq!(after[0].kind, ReportKind::Error);
            assert_eq!(after[0].message, MSG_ALREADY_RUNNING);
            assert_eq!(&after[1..], &before[..]);
            assert_eq!(controller.state(), RunState::Running);
            assert_eq!(controller.timing().scale(), 8.0);
            gate.notify_one();
        };
        tokio::join!(first, second);

        assert_eq!(controller.state(), RunState::Idle);
        let newest = controller.feed().newest().unwrap();
        assert_eq!(newest.kind, ReportKind::Success);
    }

    #[tokio::test]
    async fn assembly_failure_reports_error_and_goes_idle() {
        let controller = controller_for(ScriptedMachine {
            assemble_error: Some("boiler fault"),
            ..happy_script()
        });
        controller.execute(&params()).await;

        let newest = controller.feed().newest().unwrap();
        assert_eq!(newest.kind, ReportKind::Error);
        assert_eq!(newest.message, "Error: boiler fault");
        assert_eq!(controller.state(), RunState::Idle);
        assert_eq!(controller.timing().scale(), 1.0);

        let messages: Vec<_> = controller.feed().snapshot().into_iter().map(|e| e.message).collect();
        assert!(!messages.iter().any(|m| m == MSG_READY));
        assert_eq!(messages[1], MSG_ASSEMBLING);
    }

    #[tokio::test]
    async fn step_failure_keeps_earlier_entries() {
        let controller = controller_for(ScriptedMachine {
            events: vec![
                Ok(BrewEvent::Step(BrewStep::new("pre-brew").temperature(88.5))),
                Err("pump stalled"),
                Ok(BrewEvent::Step(BrewStep::new("extraction"))),
            ],
            ..Default::default()
        });
        controller.execute(&params()).await;

        let entries = kinds_and_messages(controller.feed());
        assert_eq!(
            entries[0],
            (ReportKind::Error, "Error: pump stalled".to_string())
        );
        assert_eq!(entries[1].1, "Pre-heating portafilter - 88.5°C");
        assert_eq!(entries[2].1, MSG_BREWING);
        assert_eq!(controller.state(), RunState::Idle);
    }

    #[tokio::test]
    async fn sequence_without_result_reports_generic_completion() {
        let controller = controller_for(ScriptedMachine {
            events: vec![
                Ok(BrewEvent::Step(BrewStep::new("extraction").pressure(9.0))),
                Ok(BrewEvent::Finished(None)),
            ],
            ..Default::default()
        });
        controller.execute(&params()).await;
        let newest = controller.feed().newest().unwrap();
        assert_eq!((newest.kind, newest.message.as_str()), (ReportKind::Success, MSG_COMPLETE));

        // A stream that simply ends is treated the same way.
        let controller = controller_for(ScriptedMachine::default());
        controller.execute(&params()).await;
        assert_eq!(controller.feed().newest().unwrap().message, MSG_COMPLETE);
    }

    #[tokio::test]
    async fn invalid_ingredients_fail_before_setup() {
        let controller = controller_for(happy_script());
        let params = RunParameters {
            coffee_weight_g: 0.0,
            ..params()
        };
        controller.execute(&params).await;

        let entries = kinds_and_messages(controller.feed());
        assert_eq!(
            entries,
            [
                (ReportKind::Error, "Error: invalid coffee weight: 0".to_string()),
                (ReportKind::Heading, MSG_STARTED.to_string()),
            ]
        );
        assert_eq!(controller.state(), RunState::Idle);
        assert_eq!(controller.timing().scale(), 1.0);
    }

    #[tokio::test]
    async fn history_accumulates_across_runs() {
        let controller = controller_for(happy_script());
        controller.execute(&params()).await;
        let first_run = controller.feed().snapshot();

        controller.execute(&params()).await;
        let both = controller.feed().snapshot();

        assert_eq!(both.len(), first_run.len() * 2);
        assert_eq!(&both[first_run.len()..], &first_run[..]);
        assert!(both[..first_run.len()]
            .iter()
            .all(|e| e.seq > first_run[0].seq));
        assert_eq!(both[first_run.len() - 1].message, MSG_STARTED);
    }

    #[tokio::test]
    async fn stalled_step_times_out_when_limit_set() {
        let controller = controller_for(ScriptedMachine {
            events: vec![Ok(BrewEvent::Step(BrewStep::new("heat-water")))],
            pending_after_events: true,
            ..Default::default()
        })
        .with_step_timeout(Some(Duration::from_millis(20)));
        controller.execute(&params()).await;

        let entries = kinds_and_messages(controller.feed());
        assert_eq!(
            entries[0],
            (ReportKind::Error, "Error: no brew step within 20ms".to_string())
        );
        assert_eq!(entries[1].1, "Heat water");
        assert_eq!(controller.state(), RunState::Idle);
    }

    #[tokio::test]
    async fn built_in_machine_brews_to_a_summary() {
        let controller = RunController::new(espresso_machine, ReportFeed::new());
        let params = RunParameters {
            time_scale: 100_000.0,
            seed: Some(5),
            ..Default::default()
        };
        controller.execute(&params).await;

        let snapshot = controller.feed().snapshot();
        assert!(snapshot[0].message.starts_with("Brew complete - TDS "));
        assert!(snapshot.iter().any(|e| e.message.starts_with("Extracting - 9 bar")));
        assert_eq!(controller.timing().scale(), 1.0);
    }

    #[tokio::test]
    async fn built_in_machine_with_negligible_heater_power_stays_recoverable() {
        let controller = RunController::new(espresso_machine, ReportFeed::new())
            .with_step_timeout(Some(Duration::from_millis(50)));
        let params = RunParameters {
            time_scale: 100_000.0,
            heat_power_w: 1e-18,
            seed: Some(5),
            ..Default::default()
        };
        controller.execute(&params).await;

        let newest = controller.feed().newest().unwrap();
        assert_eq!(newest.kind, ReportKind::Error);
        assert_eq!(newest.message, "Error: no brew step within 50ms");
        assert_eq!(controller.state(), RunState::Idle);
        assert_eq!(controller.timing().scale(), 1.0);
    }

    #[tokio::test]
    async fn built_in_machine_heater_fault() {
        let controller = RunController::new(espresso_machine, ReportFeed::new());
        let params = RunParameters {
            time_scale: 100_000.0,
            heat_power_w: 0.0,
            seed: Some(5),
            ..Default::default()
        };
        controller.execute(&params).await;

        let newest = controller.feed().newest().unwrap();
        assert_eq!(newest.kind, ReportKind::Error);
        assert_eq!(
            newest.message,
            format!("Error: {}", MachineError::HeaterFault { power_w: 0.0 })
        );
    }

    #[tokio::test]
    async fn command_loop_rejects_overlapping_brews_and_clears() {
        let gate = Arc::new(Notify::new());
        let controller = Arc::new(controller_for(ScriptedMachine {
            gate: Some(gate.clone()),
            ..happy_script()
        }));
        let (cmd_tx, cmd_rx) = tokio::sync::mpsc::unbounded_channel();
        let serve = tokio::spawn(run_controller(controller.clone(), params(), true, cmd_rx));

        while controller.state() != RunState::Running {
            tokio::task::yield_now().await;
        }
        let mut rx = controller.feed().subscribe();
        cmd_tx.send(UiCommand::Brew).unwrap();
        while controller.feed().newest().map(|e| e.message) != Some(MSG_ALREADY_RUNNING.into()) {
            rx.changed().await.unwrap();
        }

        gate.notify_one();
        while controller.state() != RunState::Idle {
            tokio::task::yield_now().await;
        }

        cmd_tx.send(UiCommand::Clear).unwrap();
        cmd_tx.send(UiCommand::Quit).unwrap();
        serve.await.unwrap().unwrap();
        assert!(controller.feed().is_empty());
    }
}
