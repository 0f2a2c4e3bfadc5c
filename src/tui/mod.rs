use crate::cli::Cli;
use crate::model::{ProgressState, ResultRecord, RunConfig, RunMode};
use crate::orchestrator::{self, ControllerParams, JobSession, SessionEvent, UiCommand};
use crate::progress::ProgressCell;
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph},
    Terminal,
};
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

struct UiState {
    cfg: RunConfig,
    progress: ProgressCell,
    info: String,
    results: Vec<ResultRecord>,
    auto_save: bool,
}

pub async fn run(args: Cli) -> Result<()> {
    // Ingest before touching the terminal so input errors print normally.
    let batch = crate::cli::ingest_from_args(&args)?;
    let cfg = crate::cli::build_config(&args, &batch);

    // Unbounded channels avoid backpressure between the UI thread and the
    // session controller.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<SessionEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    let session = JobSession::new();
    let progress = session.progress();

    // TUI runs in a dedicated thread to keep all blocking I/O out of the
    // Tokio runtime.
    let ui_args = args.clone();
    let ui_cfg = cfg.clone();
    let ui_handle =
        std::thread::spawn(move || run_threaded(ui_args, ui_cfg, progress, event_rx, cmd_tx));

    let res = orchestrator::run_controller(ControllerParams {
        session,
        cfg,
        batch,
        library: args.library.clone(),
        run_on_launch: args.run_on_launch,
        event_tx,
        cmd_rx,
    })
    .await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    args: Cli,
    cfg: RunConfig,
    progress: ProgressCell,
    mut event_rx: UnboundedReceiver<SessionEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    // UiState is owned by the UI thread only; progress is read via snapshots.
    let mut state = UiState {
        cfg,
        progress,
        info: String::new(),
        results: Vec::new(),
        auto_save: args.auto_save,
    };

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        // Drain events without blocking to keep the UI responsive.
        while let Ok(ev) = event_rx.try_recv() {
            match ev {
                SessionEvent::Status(message) => state.info = message,
                SessionEvent::RunFinished(results) => {
                    handle_run_finished(&args, &mut state, results)
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                match (k.modifiers, k.code) {
                    (_, KeyCode::Char('q')) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                        let _ = cmd_tx.send(UiCommand::Quit);
                        break Ok(());
                    }
                    (_, KeyCode::Char('r')) => {
                        state.info = "Calculation requested…".into();
                        let _ = cmd_tx.send(UiCommand::Run);
                    }
                    (_, KeyCode::Char('c')) => {
                        let _ = cmd_tx.send(UiCommand::Cancel);
                    }
                    (_, KeyCode::Char('a')) => {
                        state.auto_save = !state.auto_save;
                        state.info = if state.auto_save {
                            "Auto-save enabled".into()
                        } else {
                            "Auto-save disabled".into()
                        };
                    }
                    _ => {}
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

fn handle_run_finished(args: &Cli, state: &mut UiState, results: Option<Vec<ResultRecord>>) {
    let Some(results) = results else {
        // Failure details are in the progress cell; the status panel shows
        // them from the snapshot.
        return;
    };
    let processed = orchestrator::process_run_completion(
        &state.cfg,
        args.export_json.as_deref(),
        state.auto_save,
        results,
    );
    let mut info = Vec::new();
    if let Some(path) = processed.persisted_path.as_ref() {
        info.push(format!("Results written: {}", path.display()));
    }
    info.extend(processed.messages.iter().cloned());
    if let Some(path) = processed.auto_saved_path.as_ref() {
        info.push(format!("Saved: {}", path.display()));
    }
    state.info = if info.is_empty() {
        "Calculation complete".into()
    } else {
        info.join("; ")
    };
    state.results = processed.results;
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let snap = state.progress.snapshot();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Length(8),
                Constraint::Min(0),
            ]
            .as_ref(),
        )
        .split(area);

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("mrm-tune"))
        .gauge_style(Style::default().fg(if snap.error.is_some() {
            Color::Red
        } else {
            Color::Green
        }))
        .percent(snap.percent as u16);
    f.render_widget(gauge, chunks[0]);

    draw_status(chunks[1], f, state, &snap);
    draw_results(chunks[2], f, state);
}

fn draw_status(area: Rect, f: &mut ratatui::Frame, state: &UiState, snap: &ProgressState) {
    let run_state = if snap.running {
        ("running", Color::Yellow)
    } else if snap.complete {
        ("complete", Color::Green)
    } else if snap.error.is_some() {
        ("failed", Color::Red)
    } else {
        ("idle", Color::Gray)
    };

    let mode = match &state.cfg.mode {
        RunMode::Single { inchikey } => format!("single compound ({inchikey})"),
        RunMode::Batch => "batch".to_string(),
    };

    let mut lines = vec![
        Line::from(vec![
            Span::styled("State: ", Style::default().fg(Color::Gray)),
            Span::styled(run_state.0, Style::default().fg(run_state.1)),
            Span::raw("   "),
            Span::styled("Auto-save: ", Style::default().fg(Color::Gray)),
            Span::styled(
                if state.auto_save { "ON" } else { "OFF" },
                if state.auto_save {
                    Style::default().fg(Color::Green)
                } else {
                    Style::default().fg(Color::Red)
                },
            ),
        ]),
        Line::from(vec![
            Span::styled("Mode: ", Style::default().fg(Color::Gray)),
            Span::raw(mode),
        ]),
        Line::from(vec![
            Span::styled("Parameters: ", Style::default().fg(Color::Gray)),
            Span::raw(format!(
                "mz_tol {:.2}  rt_tol {:.2}  rt_offset {:+.2}  specificity {:.2}",
                state.cfg.mz_tolerance,
                state.cfg.rt_tolerance,
                state.cfg.rt_offset,
                state.cfg.specificity_weight
            )),
        ]),
    ];
    if let Some(message) = snap.error.as_deref() {
        lines.push(Line::from(vec![
            Span::styled("Error: ", Style::default().fg(Color::Red)),
            Span::raw(message.to_string()),
        ]));
    }
    lines.push(Line::from(vec![
        Span::styled("Info: ", Style::default().fg(Color::Gray)),
        Span::raw(state.info.clone()),
    ]));
    lines.push(Line::from(
        "Keys: r run | c cancel | a auto-save | q quit",
    ));

    let status =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(status, area);
}

fn draw_results(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let mut lines: Vec<Line> = Vec::new();
    if let Some(first) = state.results.first() {
        lines.push(Line::from(Span::styled(
            first.field_names().collect::<Vec<_>>().join("  "),
            Style::default().fg(Color::Gray),
        )));
        for record in &state.results {
            lines.push(Line::from(record.values().collect::<Vec<_>>().join("  ")));
        }
    } else {
        lines.push(Line::from("No results yet."));
    }

    let results = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Optimized transitions ({})", state.results.len())),
    );
    f.render_widget(results, area);
}
