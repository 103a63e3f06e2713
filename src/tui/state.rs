use crate::model::{RunParameters, RunState, StatusEntry};
use ratatui::{
    style::Color,
    style::Style,
    text::{Line, Span},
};

pub struct UiState {
    pub tab: usize,
    pub info: String,
    pub run_state: RunState,
    pub params: RunParameters,
    pub step_timeout: Option<String>,
    /// Newest-first copy of the report feed, refreshed when its revision moves.
    pub entries: Vec<StatusEntry>,
    pub scroll: usize,
}

impl UiState {
    pub fn new(params: RunParameters) -> Self {
        Self {
            tab: 0,
            info: String::new(),
            run_state: RunState::Idle,
            params,
            step_timeout: None,
            entries: Vec::new(),
            scroll: 0,
        }
    }

    /// Replace the feed copy, keeping the view pinned to the newest entry
    /// unless the user scrolled away from it.
    pub fn refresh_entries(&mut self, entries: Vec<StatusEntry>) {
        if self.scroll > 0 {
            let grown = entries.len().saturating_sub(self.entries.len());
            self.scroll += grown;
        }
        self.entries = entries;
        self.scroll = self.scroll.min(self.entries.len().saturating_sub(1));
    }

    pub fn scroll_up(&mut self) {
        self.scroll = self.scroll.saturating_sub(1);
    }

    pub fn scroll_down(&mut self) {
        if self.scroll + 1 < self.entries.len() {
            self.scroll += 1;
        }
    }

    pub fn setup_lines(&self, width: u16) -> Vec<Line<'static>> {
        let p = &self.params;
        let mut out = Vec::new();
        push_wrapped_status_kv(&mut out, "Machine", "espresso", width);
        push_wrapped_status_kv(&mut out, "Heat source", p.heat_source.as_str(), width);
        push_wrapped_status_kv(&mut out, "Heater", &format!("{}W", p.heat_power_w), width);
        push_wrapped_status_kv(&mut out, "Coffee", p.coffee_type.as_str(), width);
        push_wrapped_status_kv(&mut out, "Grind", p.grind_size.as_str(), width);
        push_wrapped_status_kv(&mut out, "Dose", &format!("{}g", p.coffee_weight_g), width);
        push_wrapped_status_kv(&mut out, "Water", &format!("{}ml", p.water_volume_ml), width);
        push_wrapped_status_kv(&mut out, "Temp", &format!("{}°C", p.water_temp_c), width);
        push_wrapped_status_kv(&mut out, "Time scale", &format!("x{}", p.time_scale), width);
        if let Some(seed) = p.seed {
            push_wrapped_status_kv(&mut out, "Seed", &seed.to_string(), width);
        }
        if let Some(timeout) = self.step_timeout.as_deref() {
            push_wrapped_status_kv(&mut out, "Step timeout", timeout, width);
        }
        out
    }
}

/// Append a `label: value` row, continuing long values on indented lines
/// that fit inside a bordered panel `panel_width` columns wide.
pub fn push_wrapped_status_kv(
    out: &mut Vec<Line<'static>>,
    label: &str,
    value: &str,
    panel_width: u16,
) {
    let value: Vec<char> = value.trim().chars().collect();
    if value.is_empty() {
        return;
    }

    let inner = usize::from(panel_width.saturating_sub(4)).max(1);
    let head = format!("{label}:");
    let first_width = inner.saturating_sub(head.chars().count() + 1).max(1);
    let rest_width = inner.saturating_sub(2).max(1);

    let (first, mut rest) = value.split_at(first_width.min(value.len()));
    out.push(Line::from(vec![
        Span::styled(head, Style::default().fg(Color::Gray)),
        Span::raw(" "),
        Span::raw(first.iter().collect::<String>()),
    ]));

    while !rest.is_empty() {
        let (chunk, tail) = rest.split_at(rest_width.min(rest.len()));
        out.push(Line::from(vec![
            Span::raw("  "),
            Span::raw(chunk.iter().collect::<String>()),
        ]));
        rest = tail;
    }
}
