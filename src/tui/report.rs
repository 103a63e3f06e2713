use crate::model::{ReportKind, StatusEntry};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

/// Display intent for each classification. Has no effect on ordering.
pub fn kind_style(kind: ReportKind) -> Style {
    match kind {
        ReportKind::Error => Style::default().fg(Color::Red),
        ReportKind::Info => Style::default().fg(Color::Blue),
        ReportKind::Warning => Style::default().fg(Color::Yellow),
        ReportKind::Success => Style::default().fg(Color::Green),
        ReportKind::Heading => Style::default().add_modifier(Modifier::BOLD),
        ReportKind::Plain => Style::default(),
    }
}

pub fn entry_line(entry: &StatusEntry) -> Line<'static> {
    let message = if entry.kind == ReportKind::Heading {
        entry.message.to_uppercase()
    } else {
        entry.message.clone()
    };
    Line::from(vec![
        Span::styled(entry.time.clone(), Style::default().fg(Color::DarkGray)),
        Span::raw("  "),
        Span::styled(message, kind_style(entry.kind)),
    ])
}

pub fn draw_report(area: Rect, f: &mut Frame, entries: &[StatusEntry], scroll: usize) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Simulator Status Report");

    if entries.is_empty() {
        let p = Paragraph::new(vec![
            Line::from(""),
            Line::from(Span::styled(
                "Press b to start brewing",
                Style::default().fg(Color::Gray),
            )),
        ])
        .alignment(Alignment::Center)
        .block(block);
        f.render_widget(p, area);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)].as_ref())
        .split(block.inner(area));
    f.render_widget(block, area);

    // Entries are newest-first; keys are `seq`, never the clock string.
    let lines: Vec<Line> = entries.iter().skip(scroll).map(entry_line).collect();
    f.render_widget(Paragraph::new(lines), chunks[0]);

    let footer = Line::from(vec![
        Span::styled("c", Style::default().fg(Color::Magenta)),
        Span::raw(" clean reports  "),
        Span::styled(
            format!("{} entries", entries.len()),
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    f.render_widget(Paragraph::new(footer), chunks[1]);
}
