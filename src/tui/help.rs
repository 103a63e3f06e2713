use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

fn key_line(keys: &[&'static str], desc: &'static str) -> Line<'static> {
    let mut spans = vec![Span::raw("  ")];
    let mut width = 0;
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" / "));
            width += 3;
        }
        spans.push(Span::styled(*key, Style::default().fg(Color::Magenta)));
        width += key.chars().count();
    }
    spans.push(Span::raw(" ".repeat(14usize.saturating_sub(width))));
    spans.push(Span::raw(desc));
    Line::from(spans)
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        key_line(&["q", "Ctrl-C"], "Quit"),
        key_line(&["b", "Enter"], "Start brewing"),
        key_line(&["c"], "Clean reports"),
        key_line(&["↑/↓", "j/k"], "Scroll reports"),
        key_line(&["tab"], "Switch tabs"),
        key_line(&["?"], "Show this help"),
        Line::from(""),
        Line::from("Only one simulation runs at a time; a brew request during a run"),
        Line::from("is reported as an error and the active run continues."),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
