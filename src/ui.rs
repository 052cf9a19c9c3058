use crate::app::{App, Focus};
use crate::map::MapLayers;
use crate::metric::Function;
use crate::palette::{self, Rgb, FILL_OPACITY};
use crate::scale::{format_value, Classification};
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Widget, Wrap},
    Frame,
};

/// Sidebar width in columns
pub const SIDEBAR_WIDTH: u16 = 36;
/// Legend panel height, fits up to 10 buckets
const LEGEND_HEIGHT: u16 = 12;
/// Land color the choropleth is blended over
const BASEMAP: Rgb = (242, 239, 233);

/// Screen regions, shared by rendering and mouse hit-testing
#[derive(Clone, Copy, Debug)]
pub struct DashboardLayout {
    pub title: Rect,
    pub category: Rect,
    pub function: Rect,
    pub classification: Rect,
    pub legend: Rect,
    pub map: Rect,
    /// Map area inside its border
    pub map_inner: Rect,
    pub status: Rect,
}

impl DashboardLayout {
    pub fn group(&self, focus: Focus) -> Rect {
        match focus {
            Focus::Category => self.category,
            Focus::Function => self.function,
            Focus::Classification => self.classification,
        }
    }
}

pub fn layout(area: Rect) -> DashboardLayout {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Title
            Constraint::Min(3),    // Sidebar + map
            Constraint::Length(1), // Status bar
        ])
        .split(area);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(10)])
        .split(rows[1]);

    let sidebar = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(4),
            Constraint::Length(4),
            Constraint::Length(LEGEND_HEIGHT),
        ])
        .split(body[0]);

    let map = body[1];
    DashboardLayout {
        title: rows[0],
        category: sidebar[0],
        function: sidebar[1],
        classification: sidebar[2],
        legend: sidebar[3],
        map,
        map_inner: Block::default().borders(Borders::ALL).inner(map),
        status: rows[2],
    }
}

/// First visible option so that `selected` stays in view
fn list_offset(selected: usize, visible: usize) -> usize {
    if visible == 0 {
        return 0;
    }
    selected.saturating_sub(visible - 1)
}

/// Option index under a terminal position inside a bordered radio group
pub fn option_at(area: Rect, selected: usize, col: u16, row: u16) -> Option<usize> {
    let inner = Block::default().borders(Borders::ALL).inner(area);
    if col < inner.x || col >= inner.right() || row < inner.y || row >= inner.bottom() {
        return None;
    }
    let offset = list_offset(selected, inner.height as usize);
    Some((row - inner.y) as usize + offset)
}

fn rgb(c: Rgb) -> Color {
    Color::Rgb(c.0, c.1, c.2)
}

/// Render the UI
pub fn render(frame: &mut Frame, app: &App) {
    let layout = layout(frame.area());

    render_title(frame, app, layout.title);

    let categories: Vec<&str> = app.categories.iter().map(String::as_str).collect();
    let functions: Vec<&str> = Function::ALL.iter().map(|f| f.label()).collect();
    let classifications: Vec<&str> = Classification::ALL.iter().map(|c| c.label()).collect();
    for (focus, title, options) in [
        (Focus::Category, " Monumentcategorie ", categories.as_slice()),
        (Focus::Function, " Berekening ", functions.as_slice()),
        (Focus::Classification, " Klassenindeling ", classifications.as_slice()),
    ] {
        render_group(
            frame,
            layout.group(focus),
            title,
            options,
            app.selected_index(focus),
            app.focus == focus,
        );
    }

    render_legend(frame, app, layout.legend);
    render_map(frame, app, layout.map);
    render_status_bar(frame, app, layout.status);
}

fn render_title(frame: &mut Frame, app: &App, area: Rect) {
    let title = Line::from(vec![
        Span::styled(
            format!(" {} ", app.config.display.title),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("| {} gemeenten", app.dataset.len()),
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    frame.render_widget(Paragraph::new(title), area);
}

/// A bordered radio group
fn render_group(frame: &mut Frame, area: Rect, title: &str, options: &[&str], selected: usize, focused: bool) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if focused { Color::Cyan } else { Color::DarkGray }))
        .title(Span::styled(
            title.to_string(),
            Style::default().fg(if focused { Color::Cyan } else { Color::Gray }),
        ));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let offset = list_offset(selected, inner.height as usize);
    let lines: Vec<Line> = options
        .iter()
        .enumerate()
        .skip(offset)
        .take(inner.height as usize)
        .map(|(i, label)| {
            let is_selected = i == selected;
            let marker = if is_selected { "(•) " } else { "( ) " };
            let style = if is_selected {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };
            Line::from(vec![Span::styled(marker, style), Span::styled(label.to_string(), style)])
        })
        .collect();

    frame.render_widget(Paragraph::new(lines), inner);
}

fn render_legend(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(" Legenda ", Style::default().fg(Color::Gray)));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let mut lines = vec![Line::from(Span::styled(
        app.config.display.legend_title.clone(),
        Style::default().fg(Color::Gray),
    ))];

    match &app.scale {
        Some(scale) => {
            for (label, &color) in scale.labels().iter().zip(&app.colors) {
                let fill = palette::blend(color, BASEMAP, FILL_OPACITY);
                lines.push(Line::from(vec![
                    Span::styled("██ ", Style::default().fg(rgb(fill))),
                    Span::raw(label.clone()),
                ]));
            }
        }
        None => lines.push(Line::from(Span::styled(
            "geen schaal voor deze selectie",
            Style::default().fg(Color::Red),
        ))),
    }

    lines.push(Line::from(vec![
        Span::styled("██ ", Style::default().fg(rgb(BASEMAP))),
        Span::styled("geen gegevens", Style::default().fg(Color::DarkGray)),
    ]));

    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), inner);
}

fn render_map(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            format!(" {} ", app.selection_label()),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    // Braille gives 2x4 resolution per character
    let mut viewport = app.viewport.clone();
    viewport.width = inner.width as usize * 2;
    viewport.height = inner.height as usize * 4;

    let layers = app
        .map_renderer
        .render(&app.dataset, inner.width as usize, inner.height as usize, &viewport);

    let fills = (0..app.dataset.len()).map(|i| app.color_of(i)).collect();
    let hovered = app.hovered();

    frame.render_widget(
        ChoroplethWidget {
            layers,
            fills,
            hovered,
        },
        inner,
    );

    if let (Some(index), Some((col, row))) = (hovered, app.mouse_pos) {
        render_tooltip(frame, app, index, col, row, inner);
    }
}

/// Fills municipality cells by bucket color and overlays border glyphs
struct ChoroplethWidget {
    layers: MapLayers,
    /// Palette color per municipality, `None` renders unstyled
    fills: Vec<Option<Rgb>>,
    hovered: Option<usize>,
}

impl Widget for ChoroplethWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let rows = self.layers.rows.min(area.height as usize);
        let cols = self.layers.cols.min(area.width as usize);

        for row in 0..rows {
            for col in 0..cols {
                let x = area.x + col as u16;
                let y = area.y + row as u16;

                let background = self.layers.region_at(col, row).map(|m| {
                    let fill = match self.fills.get(m).copied().flatten() {
                        Some(color) => palette::blend(color, BASEMAP, FILL_OPACITY),
                        None => BASEMAP,
                    };
                    if self.hovered == Some(m) {
                        palette::blend((255, 255, 255), fill, 0.35)
                    } else {
                        fill
                    }
                });

                let cell = &mut buf[(x, y)];
                if let Some(bg) = background {
                    cell.set_char(' ').set_bg(rgb(bg));
                }

                if let Some(ch) = self.layers.borders.glyph(col, row) {
                    let fg = background
                        .map(|bg| rgb(palette::blend((0, 0, 0), bg, 0.55)))
                        .unwrap_or(Color::DarkGray);
                    cell.set_char(ch).set_fg(fg);
                } else if let Some(ch) = self.layers.backdrop.glyph(col, row) {
                    cell.set_char(ch).set_fg(Color::Cyan);
                }
            }
        }
    }
}

/// Name and value of the hovered municipality, next to the cursor
fn render_tooltip(frame: &mut Frame, app: &App, index: usize, col: u16, row: u16, map: Rect) {
    let Some(municipality) = app.dataset.municipalities.get(index) else {
        return;
    };
    let value = app
        .metric
        .get(index)
        .map(format_value)
        .unwrap_or_else(|| "geen gegevens".to_string());

    let lines = vec![
        Line::from(Span::styled(
            municipality.name.clone(),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        )),
        Line::from(vec![
            Span::styled(format!("{}: ", app.selection.function), Style::default().fg(Color::Gray)),
            Span::styled(value, Style::default().fg(Color::Yellow)),
        ]),
    ];

    let width = lines.iter().map(Line::width).max().unwrap_or(0) as u16 + 2;
    let height = lines.len() as u16 + 2;
    if width > map.width || height > map.height {
        return;
    }

    // Prefer below-right of the cursor, flip when it would leave the map
    let x = if col + 2 + width <= map.right() { col + 2 } else { col.saturating_sub(width + 1).max(map.x) };
    let y = if row + 1 + height <= map.bottom() { row + 1 } else { row.saturating_sub(height).max(map.y) };
    let area = Rect::new(x, y, width, height);

    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Gray)),
        ),
        area,
    );
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let max = app
        .metric
        .max()
        .map(format_value)
        .unwrap_or_else(|| "-".to_string());

    let mut spans = vec![
        Span::styled(" Max: ", Style::default().fg(Color::DarkGray)),
        Span::styled(max, Style::default().fg(Color::Yellow)),
        Span::styled(" Geen gegevens: ", Style::default().fg(Color::DarkGray)),
        Span::styled(app.metric.missing().to_string(), Style::default().fg(Color::Magenta)),
        Span::styled(" Zoom: ", Style::default().fg(Color::DarkGray)),
        Span::styled(app.zoom_level(), Style::default().fg(Color::Yellow)),
        Span::styled(" | ", Style::default().fg(Color::DarkGray)),
        Span::styled(app.center_coords(), Style::default().fg(Color::Cyan)),
    ];

    if let Some(status) = &app.status {
        spans.push(Span::styled(" | ", Style::default().fg(Color::DarkGray)));
        spans.push(Span::styled(
            status.text.clone(),
            Style::default().fg(if status.is_error { Color::Red } else { Color::Green }),
        ));
    }

    spans.push(Span::styled(
        " | tab:groep ↑↓:kies hjkl:schuif +/-:zoom b:grenzen o:omtrek e:export r:herstel q:stop",
        Style::default().fg(Color::DarkGray),
    ));

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
