use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::Paragraph,
    Frame,
};
use tui_textarea::TextArea;

use crate::ui::transcript::Transcript;

pub const INPUT_PROMPT: &str = "> ";

pub fn navbar_text(model: &str) -> String {
    format!("Astrid | Model: {model} | Ctrl-C / Ctrl-D or /exit to quit")
}

/// Screen regions, top to bottom: navbar, output, status bar, input line.
pub struct ChatLayout {
    pub navbar: Rect,
    pub output: Rect,
    pub status: Rect,
    pub prompt: Rect,
    pub input: Rect,
}

impl ChatLayout {
    pub fn new(area: Rect) -> Self {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .split(area);

        let prompt_width = INPUT_PROMPT.len() as u16;
        let input_row = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(prompt_width), Constraint::Min(0)])
            .split(rows[3]);

        Self {
            navbar: rows[0],
            output: rows[1],
            status: rows[2],
            prompt: input_row[0],
            input: input_row[1],
        }
    }
}

pub struct ChatView<'a> {
    pub model: &'a str,
    pub transcript: &'a Transcript,
    pub input: &'a TextArea<'static>,
}

pub fn ui(f: &mut Frame, view: &ChatView<'_>) {
    let layout = ChatLayout::new(f.area());

    let navbar = Paragraph::new(navbar_text(view.model)).style(
        Style::default()
            .fg(Color::Black)
            .bg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    );
    f.render_widget(navbar, layout.navbar);

    let rows: Vec<Line> = view
        .transcript
        .visible_rows(layout.output.height, layout.output.width)
        .into_iter()
        .map(Line::from)
        .collect();
    f.render_widget(Paragraph::new(rows), layout.output);

    let status = Paragraph::new(format!(" {}", view.transcript.status_text()))
        .style(Style::default().fg(Color::Black).bg(Color::Gray));
    f.render_widget(status, layout.status);

    f.render_widget(
        Paragraph::new(INPUT_PROMPT).style(Style::default().fg(Color::Cyan)),
        layout.prompt,
    );
    f.render_widget(view.input, layout.input);
}
