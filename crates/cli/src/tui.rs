use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossterm::event::{KeyCode, KeyModifiers};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use chargecap_core::limiter::LimiterStatus;

use crate::client::CtlClient;
use crate::event::AppEvent;
use crate::widgets;

/// Which threshold a keyboard adjustment targets.
enum Threshold {
    Lower,
    Upper,
}

impl Threshold {
    fn param(&self) -> &'static str {
        match self {
            Self::Lower => "lower_threshold",
            Self::Upper => "upper_threshold",
        }
    }
}

/// Dashboard state.
pub struct App {
    pub status: Option<LimiterStatus>,
    pub last_error: Option<String>,
    pub should_exit: bool,
}

/// Run the watch dashboard. Blocks until the user exits (q or Ctrl+C).
pub async fn run_app(mut client: CtlClient) -> anyhow::Result<()> {
    terminal::enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(std::io::stdout());
    let mut terminal = Terminal::new(backend)?;

    let stop = Arc::new(AtomicBool::new(false));
    let mut event_rx = crate::event::spawn(stop.clone());

    let mut app = App {
        status: None,
        last_error: None,
        should_exit: false,
    };

    let result = run_loop(&mut terminal, &mut app, &mut client, &mut event_rx).await;

    // Cleanup, also on error paths.
    stop.store(true, Ordering::Relaxed);
    terminal::disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), LeaveAlternateScreen)?;
    result
}

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    app: &mut App,
    client: &mut CtlClient,
    event_rx: &mut tokio::sync::mpsc::UnboundedReceiver<AppEvent>,
) -> anyhow::Result<()> {
    let mut poll = tokio::time::interval(Duration::from_secs(1));
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        if app.should_exit {
            return Ok(());
        }
        tokio::select! {
            evt = event_rx.recv() => {
                let Some(evt) = evt else { return Ok(()) };
                match evt {
                    AppEvent::Key(key) => handle_key(app, client, key).await,
                    AppEvent::Resize => {}
                }
            }
            _ = poll.tick() => refresh(app, client).await,
        }
        terminal.draw(|f| widgets::draw(f, app))?;
    }
}

async fn refresh(app: &mut App, client: &mut CtlClient) {
    match client.status().await {
        Ok(status) => {
            app.status = Some(status);
            app.last_error = None;
        }
        Err(e) => app.last_error = Some(e.to_string()),
    }
}

async fn handle_key(app: &mut App, client: &mut CtlClient, key: crossterm::event::KeyEvent) {
    match (key.modifiers, key.code) {
        (KeyModifiers::CONTROL, KeyCode::Char('c')) | (_, KeyCode::Char('q')) => {
            app.should_exit = true;
        }
        (_, KeyCode::Char('e')) => {
            let running = app.status.as_ref().is_some_and(|s| s.running);
            let value = if running { "0" } else { "1" };
            report(app, client.set("enabled", value).await);
            refresh(app, client).await;
        }
        (_, KeyCode::Char('[')) => adjust(app, client, Threshold::Lower, -1).await,
        (_, KeyCode::Char(']')) => adjust(app, client, Threshold::Lower, 1).await,
        (_, KeyCode::Char('{')) => adjust(app, client, Threshold::Upper, -1).await,
        (_, KeyCode::Char('}')) => adjust(app, client, Threshold::Upper, 1).await,
        (_, KeyCode::Char('r')) => refresh(app, client).await,
        _ => {}
    }
}

/// Bump a threshold by `delta` percent from its last known value.
async fn adjust(app: &mut App, client: &mut CtlClient, threshold: Threshold, delta: i16) {
    let Some(status) = app.status.as_ref() else {
        return;
    };
    let current = match threshold {
        Threshold::Lower => status.lower_threshold,
        Threshold::Upper => status.upper_threshold,
    };
    let next = (i16::from(current) + delta).clamp(0, 100);
    report(
        app,
        client.set(threshold.param(), &next.to_string()).await,
    );
    refresh(app, client).await;
}

fn report(app: &mut App, result: anyhow::Result<()>) {
    if let Err(e) = result {
        app.last_error = Some(e.to_string());
    }
}
