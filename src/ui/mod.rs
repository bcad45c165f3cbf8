use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;
use unicode_width::UnicodeWidthStr;

use crate::app::App;
use crate::config::Palette;
use crate::surface::{NoteSurface, RowStyle};
use crate::sync::SaveStatus;

const CARET: &str = "▌";
const HELP: &str =
    "Enter new row • Bksp on empty row merges • Ctrl-x check • Ctrl-d delete • Esc leave • Ctrl-s save • Ctrl-t theme • Ctrl-q quit";

pub fn draw_app(frame: &mut Frame, app: &App) {
    let palette = app.theme().palette();
    let base = Style::default().fg(palette.foreground).bg(palette.background);

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(4)])
        .split(frame.size());

    let surface = app.editor().surface();
    let focused = surface.focused_row();
    let caret = surface.caret();
    let lines: Vec<Line> = surface
        .rows()
        .into_iter()
        .map(|row| {
            let text = surface.text(row).unwrap_or_default();
            let checked = surface.is_checked(row).unwrap_or(false);
            let style = surface.style(row).unwrap_or_default();
            let row_caret = if focused == Some(row) { caret } else { None };
            Line::from(row_spans(&text, checked, style, row_caret, &palette))
        })
        .collect();

    let title_style = if focused.is_some() {
        Style::default().fg(palette.accent)
    } else {
        Style::default().fg(palette.muted)
    };
    let list = Paragraph::new(lines).style(base).block(
        Block::default()
            .title(Span::styled(format!(" {} ", surface.title()), title_style))
            .borders(Borders::ALL)
            .border_style(title_style),
    );
    frame.render_widget(list, vertical[0]);

    let status = status_line(app, &palette, vertical[1].width.saturating_sub(2) as usize);
    let footer = Paragraph::new(vec![
        status,
        Line::from(Span::styled(HELP, Style::default().fg(palette.muted))),
    ])
    .style(base)
    .wrap(Wrap { trim: true })
    .block(Block::default().borders(Borders::ALL));
    frame.render_widget(footer, vertical[1]);
}

/// Checkbox marker plus text, with the caret drawn when `caret` is set.
fn row_spans(
    text: &str,
    checked: bool,
    style: RowStyle,
    caret: Option<usize>,
    palette: &Palette,
) -> Vec<Span<'static>> {
    let marker = if checked { "[x] " } else { "[ ] " };
    let mut text_style = Style::default().fg(palette.foreground);
    if style.contains(RowStyle::CHECKED) {
        text_style = text_style
            .fg(palette.muted)
            .add_modifier(Modifier::CROSSED_OUT);
    }
    if style.contains(RowStyle::FADING) {
        text_style = text_style.fg(palette.muted).add_modifier(Modifier::DIM);
    }
    let marker_style = match caret {
        Some(_) => Style::default()
            .fg(palette.accent)
            .add_modifier(Modifier::BOLD),
        None => Style::default().fg(palette.muted),
    };

    let mut spans = vec![Span::styled(marker, marker_style)];
    match caret {
        Some(offset) => {
            let offset = offset.min(text.len());
            let (before, after) = text.split_at(offset);
            if !before.is_empty() {
                spans.push(Span::styled(before.to_string(), text_style));
            }
            spans.push(Span::styled(CARET, Style::default().fg(palette.accent)));
            if !after.is_empty() {
                spans.push(Span::styled(after.to_string(), text_style));
            }
        }
        None => spans.push(Span::styled(text.to_string(), text_style)),
    }
    spans
}

fn status_line(app: &App, palette: &Palette, width: usize) -> Line<'static> {
    let (message, style) = match (app.status_message(), app.save_status()) {
        (_, SaveStatus::Error { message, .. }) => (
            format!("Save failed: {message}"),
            Style::default().fg(palette.error),
        ),
        (_, SaveStatus::InFlight { trigger }) => (
            format!("Saving ({trigger})…"),
            Style::default().fg(palette.accent),
        ),
        (Some(message), SaveStatus::Idle { .. }) => {
            (message.to_string(), Style::default().fg(palette.foreground))
        }
        (None, SaveStatus::Idle { .. }) => {
            let note = app.editor().read_state();
            (
                format!("{} of {} done", note.checked_count(), note.len()),
                Style::default().fg(palette.muted),
            )
        }
    };
    let clock = app
        .clock_face()
        .map(|face| format!("🕓 {}", face.label))
        .unwrap_or_default();
    let used = message.width() + clock.width();
    let gap = width.saturating_sub(used).max(1);
    Line::from(vec![
        Span::styled(message, style),
        Span::raw(" ".repeat(gap)),
        Span::styled(clock, Style::default().fg(palette.accent)),
    ])
}
