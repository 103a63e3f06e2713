mod help;
mod report;
mod state;

use crate::cli::{self, Cli};
use crate::model::RunState;
use crate::orchestrator::{self, export, RunController, UiCommand};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs, Wrap},
    Terminal,
};
use state::UiState;
use std::sync::Arc;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedSender;

pub async fn run(args: Cli) -> Result<()> {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let params = cli::build_params(&args);
    let controller = Arc::new(cli::build_controller(&args));

    let mut ui_state = UiState::new(params.clone());
    ui_state.step_timeout = args.step_timeout.as_ref().map(ToString::to_string);

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_controller = controller.clone();
    let ui_handle = std::thread::spawn(move || run_threaded(ui_state, ui_controller, cmd_tx));

    let res =
        orchestrator::run_controller(controller.clone(), params.clone(), args.brew_on_launch, cmd_rx)
            .await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    if let Some(msg) = export::export_if_requested(
        args.export_json.as_deref(),
        &params,
        controller.feed().snapshot(),
    ) {
        eprintln!("{msg}");
    }

    res
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    mut state: UiState,
    controller: Arc<RunController>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let mut revision = controller.feed().subscribe();
    state.refresh_entries(controller.feed().snapshot());

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        // Only copy the feed when it actually changed.
        if revision.has_changed().unwrap_or(false) {
            let _ = revision.borrow_and_update();
            state.refresh_entries(controller.feed().snapshot());
        }
        let run_state = controller.state();
        if state.run_state == RunState::Running && run_state == RunState::Idle {
            if let Some(last) = controller.feed().newest() {
                state.info = format!("Last: {}", last.message);
            }
        }
        state.run_state = run_state;

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                match (k.modifiers, k.code) {
                    (_, KeyCode::Char('q')) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                        let _ = cmd_tx.send(UiCommand::Quit);
                        break Ok(());
                    }
                    (_, KeyCode::Char('b')) | (_, KeyCode::Enter) => {
                        state.tab = 0;
                        state.info = if cmd_tx.send(UiCommand::Brew).is_ok() {
                            "Brew requested".into()
                        } else {
                            "Controller stopped".into()
                        };
                    }
                    (_, KeyCode::Char('c')) => {
                        if controller.feed().is_empty() {
                            state.info = "Nothing to clean".into();
                        } else {
                            let _ = cmd_tx.send(UiCommand::Clear);
                            state.scroll = 0;
                            state.info = "Reports cleared".into();
                        }
                    }
                    (_, KeyCode::Up) | (_, KeyCode::Char('k')) => state.scroll_up(),
                    (_, KeyCode::Down) | (_, KeyCode::Char('j')) => state.scroll_down(),
                    (_, KeyCode::Tab) => {
                        state.tab = (state.tab + 1) % 2;
                    }
                    (_, KeyCode::Char('?')) => {
                        state.tab = 1;
                    }
                    _ => {}
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(area);

    let tabs = Tabs::new(vec![Line::from("Report"), Line::from("Help")])
        .select(state.tab)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("espresso-sim-cli"),
        )
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        0 => draw_dashboard(chunks[1], f, state),
        _ => help::draw_help(chunks[1], f),
    }
}

fn draw_dashboard(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(34), Constraint::Min(0)].as_ref())
        .split(area);

    draw_setup(cols[0], f, state);
    report::draw_report(cols[1], f, &state.entries, state.scroll);
}

fn draw_setup(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let (label, color) = match state.run_state {
        RunState::Idle => ("Idle", Color::Gray),
        RunState::Running => ("Running", Color::Yellow),
    };

    let mut lines = vec![
        Line::from(vec![
            Span::styled("State:", Style::default().fg(Color::Gray)),
            Span::raw(" "),
            Span::styled(label, Style::default().fg(color)),
        ]),
        Line::from(""),
    ];
    lines.extend(state.setup_lines(area.width));
    if !state.info.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            state.info.clone(),
            Style::default().fg(Color::Cyan),
        )));
    }

    let p = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Machine Setup"));
    f.render_widget(p, area);
}
