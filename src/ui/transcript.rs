//! Output buffer behind the chat view.
//!
//! Holds the visible lines, the status bar text, and the scroll position.
//! Nothing here depends on the terminal, so the chat loop stays a thin shell
//! around it.

use unicode_width::UnicodeWidthChar;

use crate::ui::display::DisplayEvent;

pub const READY_STATUS: &str = "Ready.";

#[derive(Debug, Default)]
pub struct Transcript {
    lines: Vec<String>,
    // The last line is still receiving streamed tokens.
    open_line: bool,
    status: Option<String>,
    scroll_offset: u16,
    follow_tail: bool,
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            follow_tail: true,
            ..Default::default()
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn apply(&mut self, event: DisplayEvent) {
        match event {
            DisplayEvent::Token(token) => self.push_token(&token),
            DisplayEvent::Line(line) => self.push_line(&line),
            DisplayEvent::Status(status) => self.set_status(&status),
            DisplayEvent::HideStatus => self.hide_status(),
        }
    }

    /// Appends streamed text to the current line, opening new lines at `\n`.
    pub fn push_token(&mut self, token: &str) {
        let mut segments = token.split('\n');
        if let Some(first) = segments.next() {
            if self.open_line {
                if let Some(last) = self.lines.last_mut() {
                    last.push_str(first);
                }
            } else if !first.is_empty() {
                self.lines.push(first.to_string());
                self.open_line = true;
            }
        }
        for segment in segments {
            self.lines.push(segment.to_string());
            self.open_line = true;
        }
    }

    /// Appends complete lines, closing any line left open by streaming.
    pub fn push_line(&mut self, text: &str) {
        self.open_line = false;
        self.lines.extend(text.split('\n').map(str::to_string));
    }

    pub fn end_stream(&mut self) {
        self.open_line = false;
    }

    pub fn set_status(&mut self, status: &str) {
        self.status = Some(status.to_string());
    }

    pub fn hide_status(&mut self) {
        self.status = None;
    }

    pub fn status_text(&self) -> &str {
        self.status.as_deref().unwrap_or(READY_STATUS)
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.open_line = false;
        self.scroll_offset = 0;
        self.follow_tail = true;
    }

    /// Rows the buffer occupies once wrapped to `width` columns.
    pub fn wrapped_height(&self, width: u16) -> u16 {
        let rows: usize = self
            .lines
            .iter()
            .map(|line| wrap_line(line, width).len())
            .sum();
        u16::try_from(rows).unwrap_or(u16::MAX)
    }

    /// The wrapped rows that fit in a `viewport`-row window at the current
    /// scroll position.
    pub fn visible_rows(&self, viewport: u16, width: u16) -> Vec<String> {
        let skip = usize::from(self.scroll_offset(viewport, width));
        self.lines
            .iter()
            .flat_map(|line| wrap_line(line, width))
            .skip(skip)
            .take(usize::from(viewport))
            .collect()
    }

    fn max_offset(&self, viewport: u16, width: u16) -> u16 {
        self.wrapped_height(width).saturating_sub(viewport)
    }

    /// Scroll offset to render with; pinned to the bottom while following.
    pub fn scroll_offset(&self, viewport: u16, width: u16) -> u16 {
        let max = self.max_offset(viewport, width);
        if self.follow_tail {
            max
        } else {
            self.scroll_offset.min(max)
        }
    }

    pub fn is_following(&self) -> bool {
        self.follow_tail
    }

    pub fn scroll_up(&mut self, rows: u16, viewport: u16, width: u16) {
        let current = self.scroll_offset(viewport, width);
        self.scroll_offset = current.saturating_sub(rows);
        self.follow_tail = false;
    }

    pub fn scroll_down(&mut self, rows: u16, viewport: u16, width: u16) {
        let max = self.max_offset(viewport, width);
        let next = self.scroll_offset(viewport, width).saturating_add(rows);
        if next >= max {
            self.scroll_to_bottom();
        } else {
            self.scroll_offset = next;
        }
    }

    pub fn scroll_to_bottom(&mut self) {
        self.follow_tail = true;
    }
}

/// Splits `line` into rows of at most `width` display columns. A wide
/// character that does not fit moves to the next row whole.
pub fn wrap_line(line: &str, width: u16) -> Vec<String> {
    let width = usize::from(width.max(1));
    let mut rows = Vec::new();
    let mut current = String::new();
    let mut used = 0;
    for ch in line.chars() {
        let ch_width = ch.width().unwrap_or(0);
        if used + ch_width > width && !current.is_empty() {
            rows.push(std::mem::take(&mut current));
            used = 0;
        }
        current.push(ch);
        used += ch_width;
    }
    rows.push(current);
    rows
}
