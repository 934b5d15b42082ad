use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Style, Stylize};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph};

use chargecap_core::limiter::LimiterStatus;

use crate::tui::App;

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(1),
        ])
        .split(f.area());

    draw_gauge(f, app, chunks[0]);
    draw_details(f, app, chunks[1]);
    draw_footer(f, chunks[2]);
}

fn draw_gauge(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title(" battery ");
    let gauge = match app.status.as_ref().and_then(|s| s.reading.as_ref()) {
        Some(reading) => {
            let color = if app.status.as_ref().is_some_and(|s| s.charging_suppressed) {
                Color::Magenta
            } else {
                match reading.status {
                    chargecap_core::power::ChargeStatus::Charging => Color::Green,
                    chargecap_core::power::ChargeStatus::Full => Color::Cyan,
                    _ => Color::Yellow,
                }
            };
            Gauge::default()
                .block(block)
                .gauge_style(Style::default().fg(color))
                .percent(u16::from(reading.percent))
                .label(format!("{}% ({})", reading.percent, reading.status.as_str()))
        }
        None => Gauge::default()
            .block(block)
            .gauge_style(Style::default().fg(Color::DarkGray))
            .percent(0)
            .label("no reading"),
    };
    f.render_widget(gauge, area);
}

fn draw_details(f: &mut Frame, app: &App, area: Rect) {
    let mut lines: Vec<Line> = Vec::new();

    match app.status.as_ref() {
        Some(status) => {
            lines.push(kv("limiter", if status.running { "running" } else { "stopped" }));
            lines.push(kv(
                "band",
                &format!(
                    "resume at {}%, cut off at {}%",
                    status.lower_threshold, status.upper_threshold
                ),
            ));
            lines.push(kv(
                "usb",
                match status.reading.as_ref() {
                    Some(r) if r.usb_present => "present",
                    Some(_) => "absent",
                    None => "unknown",
                },
            ));
            lines.push(kv(
                "charging path",
                if status.charging_suppressed { "suppressed" } else { "open" },
            ));
            if status.cutoff_pending {
                lines.push(Line::from(Span::styled(
                    "  cutoff armed, waiting for the debounce interval",
                    Style::default().fg(Color::Yellow),
                )));
            }
            lines.push(kv("ticks", &status.tick_count.to_string()));
            lines.push(kv(
                "updated",
                &status.updated_at.format("%H:%M:%S").to_string(),
            ));
        }
        None => lines.push(Line::from("waiting for first status reply...".dim())),
    }

    if let Some(error) = &app.last_error {
        lines.push(Line::default());
        lines.push(Line::from(Span::styled(
            format!("  {error}"),
            Style::default().fg(Color::Red),
        )));
    }

    let block = Block::default().borders(Borders::ALL).title(" chargecap ");
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn kv(key: &str, value: &str) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("  {key:<14}"), Style::default().fg(Color::DarkGray)),
        Span::raw(value.to_owned()),
    ])
}

fn draw_footer(f: &mut Frame, area: Rect) {
    let text = " q quit   e toggle limiter   [ ] resume -/+   { } cutoff -/+   r refresh";
    let para = Paragraph::new(Line::from(Span::styled(
        text,
        Style::default().fg(Color::DarkGray),
    )));
    f.render_widget(para, area);
}
