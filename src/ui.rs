use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{
        canvas::{Canvas, Map as WorldMap, MapResolution, Points},
        Block, Borders, Clear, List, ListItem, Paragraph, Wrap,
    },
    Frame,
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::app::{App, AppState, Pane};
use crate::controller::glyph;
use crate::form::{ActivityForm, FormField};
use crate::map::MapSurface;
use crate::summary::{totals, KindTotals};
use crate::workout::{Activity, ActivityKind, Details};

const SIDEBAR_WIDTH: u16 = 44;
const FORM_HEIGHT: u16 = 8;
const MAX_LABEL_WIDTH: usize = 26;

pub fn kind_color(kind: ActivityKind) -> Color {
    match kind {
        ActivityKind::Running => Color::Green,
        ActivityKind::Cycling => Color::Yellow,
    }
}

fn style_class_color(style_class: &str) -> Color {
    if style_class == ActivityKind::Cycling.style_class() {
        kind_color(ActivityKind::Cycling)
    } else {
        kind_color(ActivityKind::Running)
    }
}

/// Whole numbers without decimals, everything else with one.
fn fmt_num(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

/// Cuts `text` to at most `max_width` terminal columns, ending in `…`
/// when something was dropped.
pub fn truncate(text: &str, max_width: usize) -> String {
    if text.width() <= max_width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut width = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if width + w + 1 > max_width {
            break;
        }
        out.push(c);
        width += w;
    }
    out.push('…');
    out
}

pub fn metrics_text(activity: &Activity) -> String {
    let base = format!(
        "{} km · {} min",
        fmt_num(activity.distance_km()),
        fmt_num(activity.duration_min())
    );
    match activity.details() {
        Details::Run {
            cadence_spm,
            pace_min_per_km,
        } => format!(
            "{base} · {pace_min_per_km:.1} min/km · {} spm",
            fmt_num(cadence_spm)
        ),
        Details::Ride {
            elevation_gain_m,
            speed_km_per_h,
        } => format!(
            "{base} · {speed_km_per_h:.1} km/h · {} m",
            fmt_num(elevation_gain_m)
        ),
    }
}

pub fn draw(f: &mut Frame, app: &mut App) {
    let [body, status] =
        Layout::vertical([Constraint::Min(0), Constraint::Length(1)]).areas(f.area());
    let [sidebar, map] =
        Layout::horizontal([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(0)]).areas(body);

    render_sidebar(f, app, sidebar);
    render_map(f, app, map);
    render_status(f, app, status);

    match app.state {
        AppState::Help => render_help(f),
        AppState::ConfirmClear => render_confirm_clear(f, app),
        AppState::Browsing | AppState::Form => {}
    }
}

fn pane_style(active: bool) -> Style {
    if active {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    }
}

fn render_sidebar(f: &mut Frame, app: &mut App, area: Rect) {
    let summary = totals(app.controller.activities());
    let summary_height = summary.len().max(1) as u16 + 2;
    let form_height = if app.form.is_some() { FORM_HEIGHT } else { 0 };
    let [list_area, summary_area, form_area] = Layout::vertical([
        Constraint::Min(3),
        Constraint::Length(summary_height),
        Constraint::Length(form_height),
    ])
    .areas(area);

    render_list(f, app, list_area);
    render_summary(f, &summary, summary_area);
    if let Some(form) = &app.form {
        render_form(f, form, form_area);
    }
}

fn list_item(activity: &Activity, focused: bool) -> ListItem<'static> {
    let mut title_style = Style::default()
        .fg(kind_color(activity.kind()))
        .add_modifier(Modifier::BOLD);
    if focused {
        title_style = title_style.add_modifier(Modifier::UNDERLINED);
    }
    ListItem::new(vec![
        Line::from(vec![
            Span::raw(format!("{} ", glyph(activity.kind()))),
            Span::styled(activity.description().to_string(), title_style),
        ]),
        Line::from(Span::styled(
            format!("  {}", metrics_text(activity)),
            Style::default().add_modifier(Modifier::DIM),
        )),
    ])
}

fn render_list(f: &mut Frame, app: &mut App, area: Rect) {
    let active = app.state == AppState::Browsing && app.pane == Pane::List;
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Workouts ({}) ", app.controller.activities().len()))
        .border_style(pane_style(active));
    app.list_area = block.inner(area);

    if app.controller.activities().len() == 0 {
        let hint = Paragraph::new("No workouts yet. Click the map to log one.")
            .style(Style::default().add_modifier(Modifier::ITALIC))
            .wrap(Wrap { trim: true })
            .block(block);
        f.render_widget(hint, area);
        return;
    }

    let items: Vec<ListItem> = app
        .listed()
        .map(|a| list_item(a, app.focused.as_ref() == Some(a.id())))
        .collect();
    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_symbol("▶ ");
    f.render_stateful_widget(list, area, &mut app.list_state);
}

fn render_summary(f: &mut Frame, summary: &[KindTotals], area: Rect) {
    let lines: Vec<Line> = if summary.is_empty() {
        vec![Line::from("Nothing logged yet")]
    } else {
        summary
            .iter()
            .map(|t| {
                let average = match (t.average_pace(), t.average_speed()) {
                    (Some(pace), _) => format!(" · {pace:.1} min/km"),
                    (_, Some(speed)) => format!(" · {speed:.1} km/h"),
                    _ => String::new(),
                };
                Line::from(Span::styled(
                    format!(
                        "{} {}× · {} km · {} min{average}",
                        glyph(t.kind),
                        t.count,
                        fmt_num(t.distance_km),
                        fmt_num(t.duration_min)
                    ),
                    Style::default().fg(kind_color(t.kind)),
                ))
            })
            .collect()
    };
    let widget =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(" Totals "));
    f.render_widget(widget, area);
}

fn render_form(f: &mut Frame, form: &ActivityForm, area: Rect) {
    let row = |field: FormField, label: &str, value: String, unit: &str| -> Line<'static> {
        let value_style = if form.focus == field {
            Style::default().fg(Color::Black).bg(Color::Cyan)
        } else {
            Style::default().add_modifier(Modifier::UNDERLINED)
        };
        Line::from(vec![
            Span::raw(format!("{label:<10}")),
            Span::styled(format!(" {value:<10}"), value_style),
            Span::raw(format!(" {unit}")),
        ])
    };

    let mut lines = vec![
        row(
            FormField::Kind,
            "Type",
            format!("◀ {} ▶", form.kind.label()),
            "",
        ),
        row(FormField::Distance, "Distance", form.distance.clone(), "km"),
        row(FormField::Duration, "Duration", form.duration.clone(), "min"),
        row(
            FormField::Extra,
            form.extra_label(),
            form.extra().to_string(),
            form.extra_unit(),
        ),
    ];
    match &form.error {
        Some(err) => lines.push(Line::from(Span::styled(
            err.to_string(),
            Style::default().fg(Color::Red),
        ))),
        None => lines.push(Line::from("")),
    }
    lines.push(Line::from(Span::styled(
        "tab next · ⏎ save · esc cancel",
        Style::default().add_modifier(Modifier::DIM),
    )));

    let widget = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" New workout at {} ", form.location))
            .border_style(Style::default().fg(kind_color(form.kind))),
    );
    f.render_widget(widget, area);
}

fn render_map(f: &mut Frame, app: &mut App, area: Rect) {
    let active = app.state == AppState::Browsing && app.pane == Pane::Map;
    let map = app.controller.map();
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Map · zoom {} ", map.current_zoom() as u8))
        .border_style(pane_style(active));
    app.map_area = block.inner(area);

    if !app.controller.is_map_ready() {
        let text = match app.controller.last_warning() {
            Some(warning) => vec![
                Line::from(Span::styled(
                    "Map unavailable",
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                )),
                Line::from(warning.to_string()),
            ],
            None => vec![Line::from("Waiting for your location…")],
        };
        let widget = Paragraph::new(text)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .block(block);
        f.render_widget(widget, area);
        return;
    }

    let focused_marker = app
        .focused
        .as_ref()
        .and_then(|id| app.controller.store().marker_for(id))
        .copied();
    let markers: Vec<(f64, f64, Color, String, bool)> = map
        .markers()
        .map(|(id, m)| {
            (
                m.location.lng,
                m.location.lat,
                style_class_color(&m.style_class),
                truncate(&m.popup, MAX_LABEL_WIDTH),
                Some(id) == focused_marker,
            )
        })
        .collect();
    let cursor = app.cursor;
    let (x_bounds, y_bounds) = map.bounds();

    let canvas = Canvas::default()
        .block(block)
        .marker(Marker::Braille)
        .x_bounds(x_bounds)
        .y_bounds(y_bounds)
        .paint(move |ctx| {
            ctx.draw(&WorldMap {
                color: Color::DarkGray,
                resolution: MapResolution::High,
            });
            ctx.layer();
            for (x, y, color, label, focused) in &markers {
                ctx.draw(&Points {
                    coords: &[(*x, *y)],
                    color: *color,
                });
                let style = if *focused {
                    Style::default()
                        .fg(Color::Black)
                        .bg(*color)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(*color)
                };
                ctx.print(*x, *y, Span::styled(label.clone(), style));
            }
            if let Some(c) = cursor {
                ctx.print(
                    c.lng,
                    c.lat,
                    Span::styled(
                        "+",
                        Style::default()
                            .fg(Color::Cyan)
                            .add_modifier(Modifier::BOLD),
                    ),
                );
            }
        });
    f.render_widget(canvas, area);
}

fn legend(app: &App) -> Line<'static> {
    let keys: &[(&str, &str)] = match (app.state, app.pane) {
        (AppState::Form, _) => &[("tab", "next field"), ("⏎", "save"), ("esc", "cancel")],
        (_, Pane::List) => &[
            ("↑↓", "select"),
            ("⏎", "focus"),
            ("d", "delete"),
            ("o", "open"),
            ("tab", "map"),
            ("?", "help"),
            ("q", "quit"),
        ],
        (_, Pane::Map) => &[
            ("arrows", "move"),
            ("⏎/click", "new workout"),
            ("+/-", "zoom"),
            ("tab", "list"),
            ("?", "help"),
            ("q", "quit"),
        ],
    };
    Line::from(
        keys.iter()
            .flat_map(|(key, what)| {
                [
                    Span::styled(
                        format!(" {key} "),
                        Style::default().add_modifier(Modifier::REVERSED),
                    ),
                    Span::raw(format!(" {what}  ")),
                ]
            })
            .collect::<Vec<_>>(),
    )
}

fn render_status(f: &mut Frame, app: &App, area: Rect) {
    let line = if let Some(status) = &app.status {
        Line::from(Span::styled(status.clone(), Style::default().fg(Color::Cyan)))
    } else if let Some(warning) = app.controller.last_warning() {
        Line::from(Span::styled(
            format!("⚠ {warning}"),
            Style::default().fg(Color::Red),
        ))
    } else {
        legend(app)
    };
    f.render_widget(Paragraph::new(line), area);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

const HELP: &[(&str, &str)] = &[
    ("tab", "switch between list and map"),
    ("↑↓ / j k", "select a workout"),
    ("⏎", "focus the selected workout on the map"),
    ("d", "delete the selected workout"),
    ("o", "open the selected location in a browser"),
    ("arrows", "move the map cursor (map pane)"),
    ("⏎ / click", "log a workout at the cursor"),
    ("+ / -", "zoom in / out"),
    ("X", "delete every workout"),
    ("q / esc", "quit"),
];

fn render_help(f: &mut Frame) {
    let area = centered(f.area(), 56, HELP.len() as u16 + 4);
    let mut lines: Vec<Line> = HELP
        .iter()
        .map(|(key, what)| {
            Line::from(vec![
                Span::styled(
                    format!("{key:>12}  "),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
                Span::raw(*what),
            ])
        })
        .collect();
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "press any key to close",
        Style::default().add_modifier(Modifier::DIM),
    )));

    f.render_widget(Clear, area);
    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(" Keys ")),
        area,
    );
}

fn render_confirm_clear(f: &mut Frame, app: &App) {
    let area = centered(f.area(), 46, 6);
    let count = app.controller.activities().len();
    let text = vec![
        Line::from(format!("Delete all {count} workouts?")),
        Line::from("This cannot be undone."),
        Line::from(""),
        Line::from(Span::styled(
            "y confirm · any other key cancels",
            Style::default().add_modifier(Modifier::DIM),
        )),
    ];
    f.render_widget(Clear, area);
    f.render_widget(
        Paragraph::new(text)
            .alignment(Alignment::Center)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(" Clear ")
                    .border_style(Style::default().fg(Color::Red)),
            ),
        area,
    );
}
