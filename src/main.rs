use crossterm::{
    event::{
        self, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::{Backend, CrosstermBackend},
};
use std::{error::Error, io};
use tracing::{info, warn};

mod actions;
mod app;
mod calendar;
mod config;
mod date_input;
mod form;
mod input;
mod integrations;
mod logging;
mod models;
mod runtime;
mod session;
mod storage;
mod ui;

use app::App;
use config::Config;

fn main() -> Result<(), Box<dyn Error>> {
    let config = Config::load();
    if let Err(err) = logging::init(&config.logging) {
        eprintln!("Logging disabled: {err}");
    }
    for notice in &config.notices {
        warn!("{notice}");
    }
    info!(
        remote = config.remote.is_configured(),
        events = %config.data.events_path.display(),
        "starting"
    );

    let mut app = App::new(config);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;

    // Unsupported terminals reject this; the app works without it.
    let _ = execute!(
        stdout,
        PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES)
    );

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    let _ = execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags);
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        warn!(error = %err, "terminal loop failed");
        println!("{err:?}");
    }
    info!("exiting");

    Ok(())
}

fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    loop {
        runtime::tick(app);

        terminal.draw(|f| ui::ui(f, app))?;

        if event::poll(std::time::Duration::from_millis(250))? {
            let event = event::read()?;
            input::handle_event(app, event);
        }

        if app.should_quit {
            return Ok(());
        }
    }
}
