use std::{io, thread, time::Duration};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use para_core::{
    config::{AppConfig, LibraryLayout},
    deps::DependencyInstaller,
    launch::Launcher,
    library::{LibraryEvent, LibraryStore, LibraryWatcher},
    manifest::LibraryManifest,
    models::GameDescriptor,
    update::{EventSender, JobEvent, JobOutcome, Updater},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Gauge, Paragraph, Row, Table, TableState, Wrap},
    Frame, Terminal,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const TICK_RATE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
struct Theme {
    accent: Color,
    muted: Color,
    selection_bg: Color,
    success: Color,
    warning: Color,
    danger: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            accent: Color::Cyan,
            muted: Color::DarkGray,
            selection_bg: Color::DarkGray,
            success: Color::Green,
            warning: Color::Yellow,
            danger: Color::Red,
        }
    }
}

enum AppEvent {
    Input(Event),
    Tick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Primary,
    Staging,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Job {
    Update,
    Dependency,
}

/// Terminal front end: game table, status line, error popup.
pub struct ParaApp {
    config: AppConfig,
    layout: LibraryLayout,
    store: LibraryStore,
    updater: Updater,
    launcher: Launcher,
    installer: DependencyInstaller,
    state: UiState,
    job_tx: EventSender,
    job_rx: Option<mpsc::UnboundedReceiver<JobEvent>>,
    library_rx: Option<mpsc::UnboundedReceiver<LibraryEvent>>,
    watcher: Option<LibraryWatcher>,
    theme: Theme,
}

impl ParaApp {
    pub fn new(
        config: AppConfig,
        updater: Updater,
        launcher: Launcher,
        installer: DependencyInstaller,
    ) -> Self {
        let layout = config.layout();
        let store = LibraryStore::new(&layout);
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        Self {
            config,
            layout,
            store,
            updater,
            launcher,
            installer,
            state: UiState::default(),
            job_tx,
            job_rx: Some(job_rx),
            library_rx: None,
            watcher: None,
            theme: Theme::default(),
        }
    }

    pub fn attach_watcher(
        &mut self,
        watcher: LibraryWatcher,
        receiver: mpsc::UnboundedReceiver<LibraryEvent>,
    ) {
        self.watcher = Some(watcher);
        self.library_rx = Some(receiver);
    }

    pub async fn run(&mut self) -> Result<()> {
        self.reload_games();
        self.refresh_manifest();
        self.state
            .set_status(format!("Loaded {} games", self.state.games.len()));

        let mut stdout = io::stdout();
        enable_raw_mode().context("failed to enter raw mode")?;
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("failed to create terminal")?;
        terminal.hide_cursor()?;
        terminal.clear()?;

        let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(128);
        spawn_input_thread(event_tx);

        let mut job_rx = self
            .job_rx
            .take()
            .context("job event receiver already consumed")?;
        let mut library_rx = self.library_rx.take();

        loop {
            terminal.draw(|frame| self.draw(frame))?;
            if self.state.should_quit {
                break;
            }

            tokio::select! {
                maybe_event = event_rx.recv() => {
                    if !self.process_app_event(maybe_event) {
                        break;
                    }
                }
                Some(event) = job_rx.recv() => self.handle_job_event(event),
                maybe_change = recv_optional(&mut library_rx) => match maybe_change {
                    Some(event) => self.handle_library_event(event),
                    None => library_rx = None,
                },
            }

            if self.state.should_quit {
                break;
            }
        }

        restore_terminal(&mut terminal)?;
        self.watcher = None;
        Ok(())
    }

    fn reload_games(&mut self) {
        let games = self.store.list();
        info!(total = games.len(), "Games reloaded");
        self.state.set_games(games);
        self.state.library_dirty = false;
    }

    fn refresh_manifest(&mut self) {
        self.state.last_updated = match LibraryManifest::load(self.layout.manifest_path()) {
            Ok(manifest) => manifest.map(|manifest| manifest.updated_at),
            Err(err) => {
                warn!(?err, "Failed to read update manifest");
                None
            }
        };
    }

    fn active_url(&self) -> &str {
        match self.state.source {
            Source::Primary => &self.config.download_url,
            Source::Staging => &self.config.staging_url,
        }
    }

    fn handle_tick(&mut self) {
        if self.state.library_dirty && self.state.job.is_none() {
            self.reload_games();
            self.state
                .set_status(format!("Library changed, {} games", self.state.games.len()));
        }
    }

    fn handle_job_event(&mut self, event: JobEvent) {
        debug!(?event, "Job event");
        let finished = matches!(event, JobEvent::Finished(_));
        let job = self.state.job;
        self.state.apply_job_event(event);
        if finished && job == Some(Job::Update) {
            self.refresh_manifest();
        }
    }

    fn handle_library_event(&mut self, event: LibraryEvent) {
        match event {
            LibraryEvent::Changed if self.state.job == Some(Job::Update) => {
                debug!("Ignoring library change during update");
            }
            LibraryEvent::Changed => self.state.library_dirty = true,
        }
    }

    fn process_app_event(&mut self, maybe_event: Option<AppEvent>) -> bool {
        match maybe_event {
            Some(AppEvent::Input(Event::Key(key))) if key.kind != KeyEventKind::Release => {
                self.handle_key(key);
                true
            }
            Some(AppEvent::Input(_)) => true,
            Some(AppEvent::Tick) => {
                self.handle_tick();
                true
            }
            None => false,
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if self.state.error.take().is_some() {
            return;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.state.should_quit = true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.state.should_quit = true
            }
            KeyCode::Char('j') | KeyCode::Down => self.state.move_cursor(1),
            KeyCode::Char('k') | KeyCode::Up => self.state.move_cursor(-1),
            KeyCode::Home => self.state.move_to(0),
            KeyCode::End => self.state.move_to_end(),
            KeyCode::PageDown => self.state.page_down(),
            KeyCode::PageUp => self.state.page_up(),
            KeyCode::Char('u') => self.start_update(),
            KeyCode::Char('i') => self.start_dependency_install(),
            KeyCode::Char('s') => self.toggle_source(),
            KeyCode::Char('r') => {
                if self.state.job == Some(Job::Update) {
                    self.state
                        .set_status("Reload unavailable while updating".to_string());
                } else {
                    self.reload_games();
                    self.state
                        .set_status(format!("Reloaded {} games", self.state.games.len()));
                }
            }
            KeyCode::Enter => self.launch_selected(),
            _ => {}
        }
    }

    fn start_update(&mut self) {
        if self.state.job.is_some() {
            return;
        }
        let url = self.active_url().to_string();
        match self.updater.start(url.clone(), self.job_tx.clone()) {
            Ok(_) => {
                info!(%url, "Update started");
                self.state.begin_job(Job::Update);
            }
            Err(err) => {
                warn!(%err, "Update not started");
                self.state.set_status(err.to_string());
            }
        }
    }

    fn start_dependency_install(&mut self) {
        if self.state.job.is_some() {
            return;
        }
        info!(label = self.installer.label(), "Dependency install started");
        self.installer.start(self.job_tx.clone());
        self.state.begin_job(Job::Dependency);
    }

    fn toggle_source(&mut self) {
        if self.state.job == Some(Job::Update) {
            return;
        }
        self.state.source = match self.state.source {
            Source::Primary => Source::Staging,
            Source::Staging => Source::Primary,
        };
        let message = match self.state.source {
            Source::Primary => "Using main server",
            Source::Staging => "Using staging server",
        };
        info!(url = self.active_url(), "Update source switched");
        self.state.set_status(message.to_string());
    }

    fn launch_selected(&mut self) {
        let Some(game) = self.state.current_game().cloned() else {
            return;
        };
        match self.launcher.launch(&game.path) {
            Ok(handle) => {
                info!(name = %game.name, pid = handle.pid, "Launched game");
                self.state.set_status(format!("Started {}", game.name));
            }
            Err(err) => {
                error!(%err, name = %game.name, "Launch failed");
                self.state.error = Some(format!("{} could not be started.", game.name));
            }
        }
    }

    fn draw(&mut self, frame: &mut Frame) {
        let size = frame.size();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(5),
                Constraint::Length(5),
                Constraint::Length(1),
            ])
            .split(size);

        self.render_game_table(frame, chunks[0]);
        self.render_status(frame, chunks[1]);
        self.render_help(frame, chunks[2]);
        if let Some(message) = &self.state.error {
            self.render_error_popup(frame, size, message);
        }
    }

    fn render_game_table(&mut self, frame: &mut Frame, area: Rect) {
        // Border plus header row.
        self.state.list_height = area.height.saturating_sub(3) as usize;
        self.state.clamp_cursor();

        let header = Row::new(vec!["Name", "Author", "Released"]).style(
            Style::default()
                .fg(self.theme.accent)
                .add_modifier(Modifier::BOLD),
        );
        let rows: Vec<Row> = self
            .state
            .games
            .iter()
            .map(|game| {
                Row::new(vec![
                    Cell::from(game.name.clone()),
                    Cell::from(Span::styled(
                        game.author.clone(),
                        Style::default().fg(self.theme.muted),
                    )),
                    Cell::from(game.release_day()),
                ])
            })
            .collect();

        let title = format!("Games ({})", self.state.games.len());
        let table = Table::new(
            rows,
            [
                Constraint::Percentage(50),
                Constraint::Percentage(30),
                Constraint::Length(12),
            ],
        )
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(
            Style::default()
                .bg(self.theme.selection_bg)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▶ ");

        let mut table_state = TableState::default();
        if !self.state.games.is_empty() {
            table_state.select(Some(self.state.cursor));
        }
        frame.render_stateful_widget(table, area, &mut table_state);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title("Status");
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .split(inner);

        let status_color = match self.state.last_outcome {
            Some(JobOutcome::Succeeded) => self.theme.success,
            Some(JobOutcome::Failed(_)) => self.theme.danger,
            None if self.state.job.is_some() => self.theme.warning,
            None => Color::Reset,
        };
        frame.render_widget(
            Paragraph::new(Span::styled(
                self.state.status.clone(),
                Style::default().fg(status_color),
            )),
            rows[0],
        );

        let (ratio, label) = match self.state.progress {
            Some(percent) => (f64::from(percent) / 100.0, format!("{percent}%")),
            None if self.state.job.is_some() => (0.0, "working…".to_string()),
            None => (0.0, String::new()),
        };
        let gauge = Gauge::default()
            .gauge_style(Style::default().fg(self.theme.accent))
            .ratio(ratio.clamp(0.0, 1.0))
            .label(label);
        frame.render_widget(gauge, rows[1]);

        let updated = self
            .state
            .last_updated
            .map(|at| {
                at.with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M")
                    .to_string()
            })
            .unwrap_or_else(|| "never".to_string());
        let server = match self.state.source {
            Source::Primary => "main",
            Source::Staging => "staging",
        };
        let source = Line::from(vec![
            Span::styled(
                format!("Source ({server}): "),
                Style::default().fg(self.theme.muted),
            ),
            Span::raw(self.active_url().to_string()),
            Span::styled("  Last updated: ", Style::default().fg(self.theme.muted)),
            Span::raw(updated),
        ]);
        frame.render_widget(Paragraph::new(source), rows[2]);
    }

    fn render_help(&self, frame: &mut Frame, area: Rect) {
        let help = if self.state.job.is_some() {
            "Enter launch · ↑/↓ move · q quit"
        } else {
            "Enter launch · u update · s switch server · i install runtime · r reload · q quit"
        };
        frame.render_widget(
            Paragraph::new(help).style(Style::default().fg(self.theme.muted)),
            area,
        );
    }

    fn render_error_popup(&self, frame: &mut Frame, area: Rect, message: &str) {
        let popup = centered_rect(60, 30, area);
        let lines = vec![
            Line::from(message.to_string()),
            Line::from(""),
            Line::from(Span::styled(
                "Press any key to continue",
                Style::default().fg(self.theme.muted),
            )),
        ];
        let paragraph = Paragraph::new(lines)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("Error")
                    .border_style(Style::default().fg(self.theme.danger)),
            )
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        frame.render_widget(Clear, popup);
        frame.render_widget(paragraph, popup);
    }
}

async fn recv_optional<T>(receiver: &mut Option<mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match receiver {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor()?;
    Ok(())
}

fn spawn_input_thread(sender: mpsc::Sender<AppEvent>) {
    thread::spawn(move || loop {
        match event::poll(TICK_RATE) {
            Ok(true) => match event::read() {
                Ok(evt) => {
                    if sender.blocking_send(AppEvent::Input(evt)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            Ok(false) => {
                if sender.blocking_send(AppEvent::Tick).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    });
}

struct UiState {
    games: Vec<GameDescriptor>,
    cursor: usize,
    list_height: usize,
    status: String,
    progress: Option<u8>,
    job: Option<Job>,
    last_outcome: Option<JobOutcome>,
    error: Option<String>,
    source: Source,
    last_updated: Option<DateTime<Utc>>,
    library_dirty: bool,
    should_quit: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            games: Vec::new(),
            cursor: 0,
            list_height: 1,
            status: "Ready".to_string(),
            progress: None,
            job: None,
            last_outcome: None,
            error: None,
            source: Source::Primary,
            last_updated: None,
            library_dirty: false,
            should_quit: false,
        }
    }
}

impl UiState {
    /// Replace the listing, keeping the selected game when it survived.
    fn set_games(&mut self, games: Vec<GameDescriptor>) {
        let selected = self.current_game().map(|game| game.path.clone());
        self.games = games;
        self.cursor = selected
            .and_then(|path| self.games.iter().position(|game| game.path == path))
            .unwrap_or(0);
        self.clamp_cursor();
    }

    fn begin_job(&mut self, job: Job) {
        self.job = Some(job);
        self.progress = None;
        self.last_outcome = None;
        self.error = None;
    }

    fn apply_job_event(&mut self, event: JobEvent) {
        match event {
            JobEvent::Progress { label, percent } => {
                self.status = label;
                self.progress = percent;
            }
            JobEvent::Error(message) => self.error = Some(message),
            JobEvent::LibraryChanged(games) => {
                self.set_games(games);
                self.library_dirty = false;
            }
            JobEvent::Finished(outcome) => {
                self.job = None;
                self.last_outcome = Some(outcome);
                if outcome != JobOutcome::Succeeded {
                    self.progress = None;
                }
            }
        }
    }

    fn move_cursor(&mut self, delta: isize) {
        if self.games.is_empty() {
            return;
        }
        let len = self.games.len() as isize;
        let idx = (self.cursor as isize + delta).clamp(0, len - 1);
        self.cursor = idx as usize;
    }

    fn move_to(&mut self, index: usize) {
        if self.games.is_empty() {
            return;
        }
        self.cursor = index.min(self.games.len() - 1);
    }

    fn move_to_end(&mut self) {
        if self.games.is_empty() {
            return;
        }
        self.cursor = self.games.len() - 1;
    }

    fn page_down(&mut self) {
        let delta = self.list_height.max(1);
        self.move_cursor(delta as isize);
    }

    fn page_up(&mut self) {
        let delta = self.list_height.max(1);
        self.move_cursor(-(delta as isize));
    }

    fn current_game(&self) -> Option<&GameDescriptor> {
        self.games.get(self.cursor)
    }

    fn set_status(&mut self, message: String) {
        self.status = message;
    }

    fn clamp_cursor(&mut self) {
        if self.games.is_empty() {
            self.cursor = 0;
        } else if self.cursor >= self.games.len() {
            self.cursor = self.games.len() - 1;
        }
    }
}
