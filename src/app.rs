use crate::config::Config;
use crate::data::{CategoryMapping, Dataset};
use crate::export::{self, ExportOptions};
use crate::map::{MapRenderer, Viewport};
use crate::metric::{aggregate, DerivedMetric, Function, MetricError};
use crate::palette::{self, Rgb};
use crate::scale::{Classification, Scale, ScaleError};
use crate::ui::{self, DashboardLayout};
use ratatui::layout::Rect;
use std::time::Instant;
use tracing::{debug, error, info};

/// Result of one full recomputation
pub struct Computed {
    pub metric: DerivedMetric,
    pub scale: Result<Scale, ScaleError>,
}

/// Aggregate the category and build its scale
pub fn compute(
    dataset: &Dataset,
    mapping: &CategoryMapping,
    category: &str,
    function: Function,
    classification: Classification,
) -> Result<Computed, MetricError> {
    let metric = aggregate(dataset, mapping, category, function)?;
    let scale = Scale::for_max(metric.max(), classification);
    Ok(Computed { metric, scale })
}

/// Sidebar control group with keyboard focus
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Focus {
    Category,
    Function,
    Classification,
}

impl Focus {
    pub fn next(self) -> Self {
        match self {
            Focus::Category => Focus::Function,
            Focus::Function => Focus::Classification,
            Focus::Classification => Focus::Category,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            Focus::Category => Focus::Classification,
            Focus::Function => Focus::Category,
            Focus::Classification => Focus::Function,
        }
    }
}

/// The three user choices
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Selection {
    /// Index into `App::categories`
    pub category: usize,
    pub function: Function,
    pub classification: Classification,
}

/// Message shown in the status bar
#[derive(Clone, Debug, PartialEq)]
pub struct Status {
    pub text: String,
    pub is_error: bool,
}

/// Application state
pub struct App {
    pub config: Config,
    pub dataset: Dataset,
    pub mapping: CategoryMapping,
    /// Sorted category labels
    pub categories: Vec<String>,
    pub selection: Selection,
    pub focus: Focus,
    pub metric: DerivedMetric,
    pub scale: Option<Scale>,
    /// Palette colors per bucket of `scale`
    pub colors: Vec<Rgb>,
    pub viewport: Viewport,
    pub map_renderer: MapRenderer,
    pub should_quit: bool,
    /// Last mouse position for drag tracking
    pub last_mouse: Option<(u16, u16)>,
    /// Current mouse position for the tooltip
    pub mouse_pos: Option<(u16, u16)>,
    pub status: Option<Status>,
    /// Terminal size
    size: (u16, u16),
}

impl App {
    pub fn new(
        config: Config,
        dataset: Dataset,
        mapping: CategoryMapping,
        map_renderer: MapRenderer,
        width: u16,
        height: u16,
    ) -> Self {
        let categories = mapping.categories();
        let mut app = Self {
            config,
            dataset,
            mapping,
            categories,
            selection: Selection {
                category: 0,
                function: Function::default(),
                classification: Classification::default(),
            },
            focus: Focus::Category,
            metric: DerivedMetric::default(),
            scale: None,
            colors: Vec::new(),
            viewport: Viewport::new(0.0, 0.0, 1.0, 0, 0),
            map_renderer,
            should_quit: false,
            last_mouse: None,
            mouse_pos: None,
            status: None,
            size: (width, height),
        };
        app.reset_view();
        app.recompute();
        app
    }

    /// Screen layout for the current terminal size
    pub fn layout(&self) -> DashboardLayout {
        ui::layout(Rect::new(0, 0, self.size.0, self.size.1))
    }

    /// Update viewport size when terminal resizes
    pub fn resize(&mut self, width: u16, height: u16) {
        self.size = (width, height);
        let map = self.layout().map_inner;
        self.viewport.width = map.width as usize * 2;
        self.viewport.height = map.height as usize * 4;
    }

    /// Fit the dataset into the map area, centered on the median/mean centroid
    pub fn reset_view(&mut self) {
        let map = self.layout().map_inner;
        let (width, height) = (map.width as usize * 2, map.height as usize * 4);
        self.viewport = match (self.dataset.center(), self.dataset.bounds()) {
            (Some(center), Some(bounds)) => Viewport::fit(center, &bounds, width, height),
            _ => Viewport::new(0.0, 0.0, 1.0, width, height),
        };
    }

    pub fn category(&self) -> Option<&str> {
        self.categories.get(self.selection.category).map(String::as_str)
    }

    /// Full recomputation of metric, scale and colors for the current selection
    pub fn recompute(&mut self) {
        let start = Instant::now();
        let Some(category) = self.category().map(str::to_string) else {
            self.set_error("no monument categories available".to_string());
            return;
        };

        match compute(
            &self.dataset,
            &self.mapping,
            &category,
            self.selection.function,
            self.selection.classification,
        ) {
            Ok(computed) => {
                self.metric = computed.metric;
                match computed.scale {
                    Ok(scale) => {
                        self.colors = palette::sequential(scale.bucket_count());
                        self.scale = Some(scale);
                        self.status = None;
                    }
                    Err(e) => {
                        self.scale = None;
                        self.colors.clear();
                        self.set_error(format!("{category}: {e}"));
                    }
                }
            }
            Err(e) => {
                self.metric = DerivedMetric::default();
                self.scale = None;
                self.colors.clear();
                self.set_error(e.to_string());
            }
        }

        debug!(
            category = %category,
            function = %self.selection.function,
            classification = %self.selection.classification,
            elapsed_us = start.elapsed().as_micros() as u64,
            "recomputed choropleth"
        );
    }

    fn set_error(&mut self, text: String) {
        error!("{text}");
        self.status = Some(Status { text, is_error: true });
    }

    /// Fill color of a municipality, `None` when it has no bucket
    pub fn color_of(&self, municipality: usize) -> Option<Rgb> {
        let value = self.metric.get(municipality)?;
        let bucket = self.scale.as_ref()?.bucket(value)?;
        self.colors.get(bucket).copied()
    }

    /// Number of options in a control group
    fn option_count(&self, focus: Focus) -> usize {
        match focus {
            Focus::Category => self.categories.len(),
            Focus::Function => Function::ALL.len(),
            Focus::Classification => Classification::ALL.len(),
        }
    }

    /// Index of the selected option in a control group
    pub fn selected_index(&self, focus: Focus) -> usize {
        match focus {
            Focus::Category => self.selection.category,
            Focus::Function => Function::ALL
                .iter()
                .position(|&f| f == self.selection.function)
                .unwrap_or(0),
            Focus::Classification => Classification::ALL
                .iter()
                .position(|&c| c == self.selection.classification)
                .unwrap_or(0),
        }
    }

    /// Select an option in a group; recomputes when the selection changes
    pub fn select(&mut self, focus: Focus, index: usize) {
        if index >= self.option_count(focus) {
            return;
        }
        let before = self.selection;
        match focus {
            Focus::Category => self.selection.category = index,
            Focus::Function => self.selection.function = Function::ALL[index],
            Focus::Classification => self.selection.classification = Classification::ALL[index],
        }
        self.focus = focus;
        if self.selection != before {
            self.recompute();
        }
    }

    pub fn select_next(&mut self) {
        let index = self.selected_index(self.focus) + 1;
        self.select(self.focus, index);
    }

    pub fn select_prev(&mut self) {
        if let Some(index) = self.selected_index(self.focus).checked_sub(1) {
            self.select(self.focus, index);
        }
    }

    pub fn focus_next(&mut self) {
        self.focus = self.focus.next();
    }

    pub fn focus_prev(&mut self) {
        self.focus = self.focus.prev();
    }

    /// Pan the map
    pub fn pan(&mut self, dx: i32, dy: i32) {
        self.viewport.pan(dx, dy);
    }

    /// Zoom in
    pub fn zoom_in(&mut self) {
        self.viewport.zoom_in();
    }

    /// Zoom out
    pub fn zoom_out(&mut self) {
        self.viewport.zoom_out();
    }

    /// Convert terminal coords to braille pixel coords inside the map
    fn map_pixel(&self, col: u16, row: u16) -> Option<(i32, i32)> {
        let map = self.layout().map_inner;
        if col < map.x || row < map.y || col >= map.right() || row >= map.bottom() {
            return None;
        }
        Some((((col - map.x) as i32) * 2 + 1, ((row - map.y) as i32) * 4 + 2))
    }

    /// Zoom in towards a screen position (terminal column/row)
    pub fn zoom_in_at(&mut self, col: u16, row: u16) {
        if let Some((px, py)) = self.map_pixel(col, row) {
            self.viewport.zoom_in_at(px, py);
        }
    }

    /// Zoom out from a screen position (terminal column/row)
    pub fn zoom_out_at(&mut self, col: u16, row: u16) {
        if let Some((px, py)) = self.map_pixel(col, row) {
            self.viewport.zoom_out_at(px, py);
        }
    }

    /// Handle mouse drag on the map
    pub fn handle_drag(&mut self, x: u16, y: u16) {
        if let Some((last_x, last_y)) = self.last_mouse {
            let dx = (last_x as i32 - x as i32) * 2;
            let dy = (last_y as i32 - y as i32) * 4;
            self.pan(dx, dy);
        }
        self.last_mouse = Some((x, y));
    }

    /// Reset drag state when mouse button released
    pub fn end_drag(&mut self) {
        self.last_mouse = None;
    }

    /// Update mouse cursor position
    pub fn set_mouse_pos(&mut self, col: u16, row: u16) {
        self.mouse_pos = Some((col, row));
    }

    /// Left click: select a sidebar option, or start a drag on the map
    pub fn click(&mut self, col: u16, row: u16) {
        let layout = self.layout();
        for focus in [Focus::Category, Focus::Function, Focus::Classification] {
            let area = layout.group(focus);
            if let Some(index) = ui::option_at(area, self.selected_index(focus), col, row) {
                self.select(focus, index);
                return;
            }
        }
        if self.map_pixel(col, row).is_some() {
            self.last_mouse = Some((col, row));
        }
    }

    /// Municipality under the mouse cursor
    pub fn hovered(&self) -> Option<usize> {
        let (col, row) = self.mouse_pos?;
        let (px, py) = self.map_pixel(col, row)?;
        let (lon, lat) = self.viewport.unproject(px, py);
        self.map_renderer.municipality_at(&self.dataset, lon, lat)
    }

    /// Current selection as a single line
    pub fn selection_label(&self) -> String {
        format!(
            "{} · {} · {}",
            self.category().unwrap_or("-"),
            self.selection.function,
            self.selection.classification
        )
    }

    /// Render the current view to the configured HTML file
    pub fn export_html(&mut self) {
        let path = self.config.display.export_path.clone();
        let values = export::values_by_name(&self.dataset, &self.metric);
        let subtitle = self.selection_label();
        let options = ExportOptions {
            title: &self.config.display.title,
            legend_title: &self.config.display.legend_title,
            subtitle: &subtitle,
            tiles: &self.config.tiles,
            center: self.dataset.center().unwrap_or((self.viewport.center_lon, self.viewport.center_lat)),
        };
        let html = export::render_html(&self.dataset, &values, self.scale.as_ref(), &options);

        match export::write_html(&path, &html) {
            Ok(()) => {
                info!(path = %path.display(), "exported current view");
                self.status = Some(Status {
                    text: format!("geëxporteerd naar {}", path.display()),
                    is_error: false,
                });
            }
            Err(e) => self.set_error(format!("export to {} failed: {e}", path.display())),
        }
    }

    /// Request quit
    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    /// Get current zoom level as a string
    pub fn zoom_level(&self) -> String {
        format!("{:.0}x", self.viewport.zoom)
    }

    /// Get current center coordinates as a string
    pub fn center_coords(&self) -> String {
        format!(
            "{:.2}°{}, {:.2}°{}",
            self.viewport.center_lat.abs(),
            if self.viewport.center_lat >= 0.0 { "N" } else { "S" },
            self.viewport.center_lon.abs(),
            if self.viewport.center_lon >= 0.0 { "E" } else { "W" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColumnNames;
    use crate::data::tests::{write_temp, SAMPLE_GEOJSON, SAMPLE_MAPPING};
    use crate::data::{load_category_mapping, load_dataset};

    fn app() -> App {
        let data = write_temp(SAMPLE_GEOJSON, ".geojson");
        let csv = write_temp(SAMPLE_MAPPING, ".csv");
        let dataset = load_dataset(data.path(), &ColumnNames::default()).unwrap();
        let mapping = load_category_mapping(csv.path(), &ColumnNames::default()).unwrap();
        let renderer = MapRenderer::new(&dataset);
        App::new(Config::default(), dataset, mapping, renderer, 120, 40)
    }

    #[test]
    fn test_initial_selection_is_first_sorted_category() {
        let app = app();
        assert_eq!(app.category(), Some("Molens"));
        // Molens: 2, 0, 0 -> equal intervals up to 2
        assert_eq!(app.scale.as_ref().unwrap().boundaries(), &[0.0, 0.5, 1.0, 1.5, 2.0]);
        assert_eq!(app.colors.len(), 4);
        assert!(app.status.is_none());
    }

    #[test]
    fn test_every_change_recomputes() {
        let mut app = app();
        app.select(Focus::Category, 1); // Religieuze gebouwen: kerk + molen
        assert_eq!(app.metric.values, vec![Some(5.0), Some(1.0), Some(1.0)]);

        app.select(Focus::Function, 1);
        assert_eq!(app.metric.get(0), Some(5.0));
        assert_eq!(app.metric.get(1), Some(2.0));
        assert_eq!(app.metric.get(2), None);

        app.select(Focus::Classification, 1);
        assert_eq!(app.scale.as_ref().unwrap().boundaries(), &[0.0, 1.0, 10.0]);
        assert_eq!(app.color_of(2), None);
        assert!(app.color_of(0).is_some());
    }

    #[test]
    fn test_empty_dataset_has_no_scale() {
        let app = app();
        let dataset = Dataset::from_municipalities(Vec::new()).unwrap();
        let computed = compute(&dataset, &app.mapping, "Molens", Function::Total, Classification::EqualIntervals).unwrap();
        assert_eq!(computed.scale, Err(ScaleError::NoValues));
    }

    #[test]
    fn test_zero_max_sets_error_status() {
        let mut app = app();
        // a category whose only column is zero everywhere
        app.mapping = CategoryMapping::new(vec![crate::data::MappingEntry {
            category: "Leeg".to_string(),
            column: "molen".to_string(),
        }]);
        app.dataset.municipalities[0].counts.insert("molen".to_string(), 0.0);
        app.categories = app.mapping.categories();
        app.selection.category = 0;
        app.recompute();

        assert!(app.scale.is_none());
        let status = app.status.as_ref().unwrap();
        assert!(status.is_error);
        assert!(status.text.contains("Leeg"));
        assert_eq!(app.color_of(0), None);
    }

    #[test]
    fn test_navigation_wraps_focus_and_clamps_selection() {
        let mut app = app();
        app.select_prev();
        assert_eq!(app.selection.category, 0);
        app.select_next();
        app.select_next();
        app.select_next();
        assert_eq!(app.selection.category, 2);

        app.focus_prev();
        assert_eq!(app.focus, Focus::Classification);
        app.focus_next();
        assert_eq!(app.focus, Focus::Category);
    }

    #[test]
    fn test_hover_outside_map_is_none() {
        let mut app = app();
        app.set_mouse_pos(0, 0);
        assert_eq!(app.hovered(), None);
    }

    #[test]
    fn test_hover_finds_municipality_at_center() {
        let mut app = app();
        let map = app.layout().map_inner;
        // find any map cell that hits a municipality
        let hit = (map.y..map.bottom())
            .flat_map(|row| (map.x..map.right()).map(move |col| (col, row)))
            .find(|&(col, row)| {
                app.set_mouse_pos(col, row);
                app.hovered().is_some()
            });
        assert!(hit.is_some());
    }
}
