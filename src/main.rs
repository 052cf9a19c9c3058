use anyhow::{bail, Context, Result};
use clap::Parser;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton,
    MouseEvent, MouseEventKind,
};
use crossterm::execute;
use monument_map::app::{self, App};
use monument_map::config::{Config, TILE_TOKEN_ENV};
use monument_map::data::{self, CategoryMapping, Dataset};
use monument_map::export::{self, ExportOptions};
use monument_map::map::MapRenderer;
use monument_map::metric::Function;
use monument_map::scale::Classification;
use monument_map::ui;
use ratatui::DefaultTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "monument-map",
    about = "Choropleth dashboard of monuments per municipality"
)]
struct Args {
    /// TOML config file (defaults to ./monument-map.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Municipality GeoJSON, overrides the config
    #[arg(long)]
    geojson: Option<PathBuf>,

    /// Category mapping CSV, overrides the config
    #[arg(long)]
    mapping: Option<PathBuf>,

    /// Access token substituted into the tile URL of HTML exports
    #[arg(long, env = TILE_TOKEN_ENV, hide_env_values = true)]
    tile_token: Option<String>,

    /// Log file for the interactive dashboard
    #[arg(long, default_value = "monument-map.log")]
    log_file: PathBuf,

    /// Write an HTML map to this file and exit instead of starting the dashboard
    #[arg(long)]
    export: Option<PathBuf>,

    /// Category for --export (defaults to the first one)
    #[arg(long)]
    category: Option<String>,

    /// Calculation for --export: total | per-capita
    #[arg(long, default_value = "total", value_parser = parse_function)]
    function: Function,

    /// Classification for --export: equal | log10
    #[arg(long, default_value = "equal", value_parser = parse_classification)]
    classification: Classification,
}

fn parse_function(s: &str) -> Result<Function, String> {
    Function::from_name(s).ok_or_else(|| format!("unknown function '{s}', expected total or per-capita"))
}

fn parse_classification(s: &str) -> Result<Classification, String> {
    Classification::from_name(s).ok_or_else(|| format!("unknown classification '{s}', expected equal or log10"))
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = init_logging(&args)?;

    let config = load_config(&args)?;
    let (dataset, mapping) = load_inputs(&config)?;
    let renderer = build_renderer(&config, &dataset);

    if let Some(path) = &args.export {
        return export_headless(&args, &config, &dataset, &mapping, path);
    }

    // Initialize terminal
    let mut terminal = ratatui::init();
    terminal.clear()?;

    // Enable mouse capture
    execute!(std::io::stdout(), EnableMouseCapture)?;

    let size = terminal.size()?;
    let mut app = App::new(config, dataset, mapping, renderer, size.width, size.height);
    let result = run(&mut terminal, &mut app);

    // Disable mouse capture and restore terminal
    let _ = execute!(std::io::stdout(), DisableMouseCapture);
    ratatui::restore();

    result
}

/// Headless export logs to stderr; the dashboard logs to a file since it owns the terminal
fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if args.export.is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        return Ok(None);
    }

    let dir = match args.log_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = args
        .log_file
        .file_name()
        .context("log file path has no file name")?;
    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(Some(guard))
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = Config::load(args.config.as_deref())
        .context("failed to load configuration")?
        .with_tile_token(args.tile_token.clone());

    if let Some(geojson) = &args.geojson {
        config.data.geojson = geojson.clone();
    }
    if let Some(mapping) = &args.mapping {
        config.data.mapping = mapping.clone();
    }
    Ok(config)
}

/// Load and validate both inputs before the terminal is touched
fn load_inputs(config: &Config) -> Result<(Dataset, CategoryMapping)> {
    let dataset = data::load_dataset(&config.data.geojson, &config.columns)
        .with_context(|| format!("failed to load municipalities from {}", config.data.geojson.display()))?;
    let mapping = data::load_category_mapping(&config.data.mapping, &config.columns)
        .with_context(|| format!("failed to load category mapping from {}", config.data.mapping.display()))?;

    mapping
        .validate_against(&dataset)
        .context("category mapping does not match the municipality dataset")?;
    if mapping.categories().is_empty() {
        bail!("{} defines no categories", config.data.mapping.display());
    }
    Ok((dataset, mapping))
}

fn build_renderer(config: &Config, dataset: &Dataset) -> MapRenderer {
    let renderer = MapRenderer::new(dataset);
    let Some(path) = &config.display.backdrop else {
        return renderer;
    };
    match data::load_outlines(path) {
        Ok(lines) => renderer.with_backdrop(lines),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load backdrop, continuing without it");
            renderer
        }
    }
}

fn export_headless(
    args: &Args,
    config: &Config,
    dataset: &Dataset,
    mapping: &CategoryMapping,
    path: &Path,
) -> Result<()> {
    let categories = mapping.categories();
    let category = match &args.category {
        Some(category) => category.clone(),
        None => categories.first().cloned().context("no categories available")?,
    };

    let computed = app::compute(dataset, mapping, &category, args.function, args.classification)?;
    let scale = match computed.scale {
        Ok(scale) => Some(scale),
        Err(e) => {
            warn!(category = %category, error = %e, "no scale for selection, exporting unstyled map");
            None
        }
    };

    let subtitle = format!("{category} · {} · {}", args.function, args.classification);
    let options = ExportOptions {
        title: &config.display.title,
        legend_title: &config.display.legend_title,
        subtitle: &subtitle,
        tiles: &config.tiles,
        center: dataset.center().unwrap_or((0.0, 0.0)),
    };
    let values = export::values_by_name(dataset, &computed.metric);
    let html = export::render_html(dataset, &values, scale.as_ref(), &options);
    export::write_html(path, &html).with_context(|| format!("failed to write {}", path.display()))?;

    info!(category = %category, path = %path.display(), "export finished");
    Ok(())
}

/// Handle mouse events for selection, panning and zooming
fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    // Always track mouse position for the tooltip
    app.set_mouse_pos(mouse.column, mouse.row);

    match mouse.kind {
        // Scroll wheel for zooming towards mouse position
        MouseEventKind::ScrollUp => app.zoom_in_at(mouse.column, mouse.row),
        MouseEventKind::ScrollDown => app.zoom_out_at(mouse.column, mouse.row),
        // Horizontal scroll for panning (trackpad two-finger swipe)
        MouseEventKind::ScrollLeft => app.pan(-15, 0),
        MouseEventKind::ScrollRight => app.pan(15, 0),
        // Click selects a sidebar option or starts a drag on the map
        MouseEventKind::Down(MouseButton::Left) => app.click(mouse.column, mouse.row),
        MouseEventKind::Drag(MouseButton::Left) => {
            if app.last_mouse.is_some() {
                app.handle_drag(mouse.column, mouse.row);
            }
        }
        MouseEventKind::Up(MouseButton::Left) => app.end_drag(),
        _ => {}
    }
}

fn run(terminal: &mut DefaultTerminal, app: &mut App) -> Result<()> {
    info!(municipalities = app.dataset.len(), categories = app.categories.len(), "dashboard started");

    loop {
        terminal.draw(|frame| ui::render(frame, app))?;

        if event::poll(Duration::from_millis(250))? {
            match event::read()? {
                Event::Key(key) => {
                    // Only handle key press events (not release)
                    if key.kind == KeyEventKind::Press {
                        match key.code {
                            KeyCode::Char('q') | KeyCode::Esc => app.quit(),

                            // Sidebar controls
                            KeyCode::Tab => app.focus_next(),
                            KeyCode::BackTab => app.focus_prev(),
                            KeyCode::Up => app.select_prev(),
                            KeyCode::Down => app.select_next(),

                            // Pan with hjkl or left/right
                            KeyCode::Left | KeyCode::Char('h') => app.pan(-10, 0),
                            KeyCode::Right | KeyCode::Char('l') => app.pan(10, 0),
                            KeyCode::Char('k') => app.pan(0, -8),
                            KeyCode::Char('j') => app.pan(0, 8),

                            // Zoom
                            KeyCode::Char('+') | KeyCode::Char('=') => app.zoom_in(),
                            KeyCode::Char('-') | KeyCode::Char('_') => app.zoom_out(),

                            // Layer toggles
                            KeyCode::Char('b') | KeyCode::Char('B') => app.map_renderer.toggle_borders(),
                            KeyCode::Char('o') | KeyCode::Char('O') => app.map_renderer.toggle_backdrop(),

                            KeyCode::Char('e') | KeyCode::Char('E') => app.export_html(),

                            // Reset view
                            KeyCode::Char('r') | KeyCode::Char('0') => app.reset_view(),

                            _ => {}
                        }
                    }
                }
                Event::Mouse(mouse) => handle_mouse(app, mouse),
                Event::Resize(width, height) => app.resize(width, height),
                _ => {}
            }
        }

        if app.should_quit {
            break;
        }
    }

    info!("dashboard closed");
    Ok(())
}
