use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    io::{self, stdin, Write},
    path::PathBuf,
    sync::mpsc::Sender,
    time::Duration,
};
use tracing::info;

use tread::{
    app::App,
    app_dirs::AppDirs,
    codec::Persistence,
    config::{Config, ConfigStore, FileConfigStore},
    controller::{glyph, Controller},
    export,
    geolocation::{ConfiguredGeolocator, Geolocator},
    logging,
    map::CanvasMap,
    runtime::{AppEvent, CrosstermEventSource, EventSource, FixedTicker, Runner, Ticker},
    storage::{open_backend, BlobStore, MemoryBlobStore, StorageBackend},
    ui,
    workout::{Activity, ActivityKind},
};

const TICK_RATE_MS: u64 = 250;

/// log runs and rides on a terminal world map
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A terminal workout log: click the world map where you ran or rode, fill in distance and duration, and tread keeps the list, the markers and your pace or speed."
)]
pub struct Cli {
    /// your position as "lat,lng" (overrides TREAD_LOCATION and the configured home)
    #[clap(short = 'l', long, allow_hyphen_values = true)]
    location: Option<String>,

    /// initial map zoom, 1 (world) to 18
    #[clap(short = 'z', long, value_parser = clap::value_parser!(u8).range(1..=18))]
    zoom: Option<u8>,

    /// activity type preselected in the form
    #[clap(short = 'k', long, value_enum)]
    kind: Option<ActivityKind>,

    /// storage backend for workouts
    #[clap(long, value_enum)]
    storage: Option<StorageBackend>,

    /// directory workouts are stored in
    #[clap(long)]
    data_dir: Option<PathBuf>,

    /// keep workouts in memory only; nothing is read or written
    #[clap(long)]
    ephemeral: bool,

    /// write stored workouts to PATH as CSV and exit
    #[clap(long, value_name = "PATH")]
    export_csv: Option<PathBuf>,

    /// print stored workouts and exit
    #[clap(long)]
    list: bool,

    /// save zoom, kind and storage as the new defaults and exit
    #[clap(long)]
    save_config: bool,

    /// log file (default: ~/.local/state/tread/tread.log)
    #[clap(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    /// Command line values win over the stored config.
    fn apply(&self, mut config: Config) -> Config {
        if let Some(zoom) = self.zoom {
            config.zoom = zoom;
        }
        if let Some(kind) = self.kind {
            config.default_kind = kind;
        }
        if let Some(storage) = self.storage {
            config.storage = storage;
        }
        config
    }

    fn open_store(&self, config: &Config) -> tread::error::Result<Box<dyn BlobStore>> {
        if self.ephemeral {
            return Ok(Box::new(MemoryBlobStore::new()));
        }
        let dir = self
            .data_dir
            .clone()
            .or_else(AppDirs::data_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(open_backend(config.storage, &dir)?)
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let config_store = FileConfigStore::new();
    let config = cli.apply(config_store.load());

    if let Some(path) = cli.log_file.clone().or_else(AppDirs::log_path) {
        logging::init_file_logging(&path, &config.log_level)?;
    }
    info!(version = env!("CARGO_PKG_VERSION"), "tread starting");

    if cli.save_config {
        config_store.save(&config)?;
        println!("settings saved to {}", config_store.path().display());
        return Ok(());
    }

    let persistence = Persistence::new(cli.open_store(&config)?);

    if let Some(path) = &cli.export_csv {
        let activities = persistence.load();
        export::export_to_path(&activities, path)?;
        println!("{} workouts written to {}", activities.len(), path.display());
        return Ok(());
    }
    if cli.list {
        print_list(&persistence.load(), &mut io::stdout())?;
        return Ok(());
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let mut controller = Controller::new(CanvasMap::new(), persistence, f64::from(config.zoom));
    controller.startup();
    let mut app = App::new(controller, config.default_kind);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let events = CrosstermEventSource::new();
    locate(
        &ConfiguredGeolocator::new(cli.location.clone(), config.home),
        events.sender(),
    );
    let runner = Runner::new(events, FixedTicker::new(Duration::from_millis(TICK_RATE_MS)));
    let result = start_tui(&mut terminal, &mut app, &runner);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    info!("tread exiting");

    result
}

/// Asks for the position; the answer arrives later as an event.
fn locate(geolocator: &impl Geolocator, tx: Sender<AppEvent>) {
    let fail_tx = tx.clone();
    geolocator.current_location(
        Box::new(move |location| {
            let _ = tx.send(AppEvent::Located(location));
        }),
        Box::new(move |err| {
            let _ = fail_tx.send(AppEvent::LocationFailed(err));
        }),
    );
}

fn start_tui<B: Backend, E: EventSource, T: Ticker>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    runner: &Runner<E, T>,
) -> Result<(), Box<dyn Error>> {
    terminal.draw(|f| ui::draw(f, app))?;
    while !app.should_quit {
        let event = runner.step();
        let redraw = !matches!(event, AppEvent::Tick);
        app.on_event(event);
        if redraw {
            terminal.draw(|f| ui::draw(f, app))?;
        }
    }
    Ok(())
}

fn print_list(activities: &[Activity], out: &mut impl Write) -> io::Result<()> {
    if activities.is_empty() {
        return writeln!(out, "no workouts stored");
    }
    for a in activities.iter().rev() {
        writeln!(
            out,
            "{}  {} {}  {}  @ {}  clicks: {}",
            a.id(),
            glyph(a.kind()),
            a.description(),
            ui::metrics_text(a),
            a.location(),
            a.click_count()
        )?;
    }
    Ok(())
}
