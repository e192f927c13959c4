use std::collections::{HashMap, HashSet};
use std::env;
use std::fs;
use std::io::{self, BufRead, BufReader, IsTerminal, Stdout};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::time::{Duration, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};
use serde::Deserialize;
use serde_json::Value;

const SESSION_EXTENSION: &str = "jsonl";
const PREVIEW_BUDGET: usize = 300;
const SUGGESTION_LIMIT: usize = 8;
const MIN_LIST_WIDTH: u16 = 30;
const MIN_DETAIL_WIDTH: u16 = 24;
const PANE_SEPARATOR_WIDTH: u16 = 3;
const DETAIL_SUPPRESS_BELOW: u16 = 72;
const LIST_FRACTION: f32 = 0.55;

fn main() -> Result<()> {
    if !io::stdout().is_terminal() {
        bail!("codex-archive-tui needs an interactive terminal");
    }

    let mut app = App::load()?;
    let mut tui = Tui::new()?;

    let run_result = run_app(&mut tui, &mut app);
    let restore_result = tui.restore();

    run_result?;
    restore_result?;
    Ok(())
}

fn run_app(tui: &mut Tui, app: &mut App) -> Result<()> {
    loop {
        app.drain_preview_signals();
        app.ensure_preview_requested();

        tui.draw(app)?;

        if !event::poll(Duration::from_millis(150))? {
            continue;
        }

        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Ok(());
        }

        if app.help_visible {
            match key.code {
                KeyCode::Char('?') | KeyCode::Esc => app.help_visible = false,
                KeyCode::Char('q') => return Ok(()),
                _ => {}
            }
            continue;
        }

        match app.mode {
            Mode::Normal => {
                if handle_normal_mode(key.code, app) {
                    return Ok(());
                }
            }
            Mode::Input => handle_input_mode(key.code, app),
        }
    }
}

fn handle_normal_mode(code: KeyCode, app: &mut App) -> bool {
    match code {
        KeyCode::Char('q') => return true,
        KeyCode::Up | KeyCode::Char('k') => app.move_focus(-1),
        KeyCode::Down | KeyCode::Char('j') => app.move_focus(1),
        KeyCode::Home | KeyCode::Char('g') => app.jump_first(),
        KeyCode::End | KeyCode::Char('G') => app.jump_last(),
        KeyCode::Char('f') => app.cycle_scope(),
        KeyCode::Char('o') => app.toggle_sort_order(),
        KeyCode::Char('d') => app.toggle_detail(),
        KeyCode::Char(' ') => app.toggle_selected(),
        KeyCode::Char('v') => app.select_all_visible(),
        KeyCode::Char('i') => app.invert_selection(),
        KeyCode::Char('c') => app.clear_selection(),
        KeyCode::Char('/') => app.start_input(InputKind::Search),
        KeyCode::Char('r') => app.start_input(InputKind::Rename),
        KeyCode::Char('t') => app.start_input(InputKind::Tags),
        KeyCode::Char('a') => app.toggle_archive_focused(),
        KeyCode::Char('A') => app.bulk_toggle_archive(),
        KeyCode::Char('?') => app.help_visible = true,
        _ => {}
    }

    false
}

fn handle_input_mode(code: KeyCode, app: &mut App) {
    match code {
        KeyCode::Esc => app.cancel_input(),
        KeyCode::Enter => app.commit_input(),
        KeyCode::Tab => app.complete_tag_fragment(),
        KeyCode::Backspace => {
            if let Some(input) = &mut app.input {
                input.value.pop();
            }
        }
        KeyCode::Char(ch) if !ch.is_control() => {
            if let Some(input) = &mut app.input {
                input.value.push(ch);
            }
        }
        _ => {}
    }
}

struct Tui {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl Tui {
    fn new() -> Result<Self> {
        enable_raw_mode().context("failed to enable raw mode")?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend).context("failed to create terminal")?;
        Ok(Self { terminal })
    }

    fn draw(&mut self, app: &App) -> Result<()> {
        self.terminal.draw(|frame| {
            let root = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(1),
                    Constraint::Min(3),
                    Constraint::Length(2),
                ])
                .split(frame.area());

            render_header(frame, root[0], app);
            if app.help_visible {
                render_help(frame, root[1]);
            } else {
                render_main(frame, root[1], app);
            }
            render_footer(frame, root[2], app);
        })?;

        Ok(())
    }

    fn restore(&mut self) -> Result<()> {
        disable_raw_mode().context("failed to disable raw mode")?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)
            .context("failed to leave alternate screen")?;
        self.terminal
            .show_cursor()
            .context("failed to restore cursor")?;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ArchiveScope {
    ActiveOnly,
    ArchivedOnly,
    All,
}

impl ArchiveScope {
    fn cycle(self) -> Self {
        match self {
            Self::ActiveOnly => Self::ArchivedOnly,
            Self::ArchivedOnly => Self::All,
            Self::All => Self::ActiveOnly,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::ActiveOnly => "active",
            Self::ArchivedOnly => "archived",
            Self::All => "all",
        }
    }

    fn admits(self, archived: bool) -> bool {
        match self {
            Self::ActiveOnly => !archived,
            Self::ArchivedOnly => archived,
            Self::All => true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    fn toggle(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Ascending => "oldest first",
            Self::Descending => "newest first",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    Input,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum InputKind {
    Search,
    Rename,
    Tags,
}

struct InputState {
    kind: InputKind,
    prompt: &'static str,
    value: String,
    target: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq)]
struct SessionRecord {
    path: PathBuf,
    file_name: String,
    archived: bool,
    title: Option<String>,
    tags: Vec<String>,
    timestamp: Option<String>,
    date_label: Option<String>,
    display_name: String,
    sort_key: i64,
    id: Option<String>,
    cwd: Option<String>,
    originator: Option<String>,
    cli_version: Option<String>,
    model_provider: Option<String>,
    git: Option<GitInfo>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
struct GitInfo {
    repository_url: Option<String>,
    branch: Option<String>,
    commit_hash: Option<String>,
}

#[derive(Clone, Debug)]
struct CodexPaths {
    root: PathBuf,
    sessions_dir: PathBuf,
    archived_dir: PathBuf,
}

impl CodexPaths {
    fn new(root: PathBuf) -> Self {
        let sessions_dir = root.join("sessions");
        let archived_dir = root.join("archived_sessions");
        Self {
            root,
            sessions_dir,
            archived_dir,
        }
    }

    fn resolve() -> Result<Self> {
        Ok(Self::new(resolve_codex_home()?))
    }
}

#[derive(Deserialize)]
struct MetaEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: MetaPayload,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct MetaPayload {
    id: Option<String>,
    timestamp: Option<String>,
    cwd: Option<String>,
    title: Option<String>,
    name: Option<String>,
    tags: Option<TagsField>,
    originator: Option<String>,
    cli_version: Option<String>,
    model_provider: Option<String>,
    git: Option<GitInfo>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TagsField {
    List(Vec<String>),
    Single(String),
}

impl TagsField {
    fn into_list(self) -> Vec<String> {
        match self {
            Self::List(tags) => tags,
            Self::Single(raw) => raw
                .split(|c: char| c == ',' || c.is_whitespace())
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct SessionPreview {
    first: String,
    last: String,
}

struct PreviewSignal {
    path: PathBuf,
    result: Result<Option<SessionPreview>, String>,
}

enum PreviewSlot<'a> {
    Loading,
    Ready(&'a SessionPreview),
    Empty,
    NotRequested,
}

struct App {
    paths: CodexPaths,
    all_records: Vec<SessionRecord>,
    visible: Vec<SessionRecord>,
    focus_idx: usize,
    query: String,
    scope: ArchiveScope,
    order: SortOrder,
    detail_enabled: bool,
    selected: HashSet<PathBuf>,
    tag_index: Vec<String>,
    mode: Mode,
    input: Option<InputState>,
    help_visible: bool,
    preview_cache: HashMap<PathBuf, Option<SessionPreview>>,
    preview_inflight: Option<PathBuf>,
    preview_tx: Sender<PreviewSignal>,
    preview_rx: Receiver<PreviewSignal>,
    status: String,
}

impl App {
    fn load() -> Result<Self> {
        let paths = CodexPaths::resolve()?;
        let (preview_tx, preview_rx) = channel();

        let mut app = Self {
            paths,
            all_records: Vec::new(),
            visible: Vec::new(),
            focus_idx: 0,
            query: String::new(),
            scope: ArchiveScope::ActiveOnly,
            order: SortOrder::Descending,
            detail_enabled: true,
            selected: HashSet::new(),
            tag_index: Vec::new(),
            mode: Mode::Normal,
            input: None,
            help_visible: false,
            preview_cache: HashMap::new(),
            preview_inflight: None,
            preview_tx,
            preview_rx,
            status: String::from("Press ? for help, q to quit"),
        };

        app.reload()?;
        Ok(app)
    }

    fn reload(&mut self) -> Result<()> {
        self.all_records = load_records(&self.paths)?;

        let live: HashSet<&Path> = self
            .all_records
            .iter()
            .map(|record| record.path.as_path())
            .collect();
        self.selected.retain(|path| live.contains(path.as_path()));

        self.tag_index = build_tag_index(&self.all_records);
        self.apply_view();
        Ok(())
    }

    fn apply_view(&mut self) {
        let filtered = filter_records(&self.all_records, &self.query, self.scope);
        self.visible = sort_records(filtered, self.order);
        if self.visible.is_empty() {
            self.focus_idx = 0;
        } else {
            self.focus_idx = self.focus_idx.min(self.visible.len() - 1);
        }
    }

    fn focused_record(&self) -> Option<&SessionRecord> {
        self.visible.get(self.focus_idx)
    }

    fn refocus(&mut self, path: &Path) {
        if let Some(pos) = self.visible.iter().position(|record| record.path == path) {
            self.focus_idx = pos;
        }
    }

    fn move_focus(&mut self, delta: isize) {
        if self.visible.is_empty() {
            return;
        }
        let last = self.visible.len() - 1;
        self.focus_idx = if delta < 0 {
            self.focus_idx.saturating_sub(delta.unsigned_abs())
        } else {
            (self.focus_idx + delta as usize).min(last)
        };
    }

    fn jump_first(&mut self) {
        self.focus_idx = 0;
    }

    fn jump_last(&mut self) {
        self.focus_idx = self.visible.len().saturating_sub(1);
    }

    fn cycle_scope(&mut self) {
        self.scope = self.scope.cycle();
        self.apply_view();
        self.status = format!("Showing {} sessions", self.scope.label());
    }

    fn toggle_sort_order(&mut self) {
        self.order = self.order.toggle();
        self.apply_view();
        self.status = format!("Sorting {}", self.order.label());
    }

    fn toggle_detail(&mut self) {
        self.detail_enabled = !self.detail_enabled;
    }

    fn toggle_selected(&mut self) {
        let Some(path) = self.focused_record().map(|record| record.path.clone()) else {
            self.status = String::from("No session selected");
            return;
        };
        if !self.selected.remove(&path) {
            self.selected.insert(path);
        }
    }

    fn select_all_visible(&mut self) {
        for record in &self.visible {
            self.selected.insert(record.path.clone());
        }
        self.status = format!("Selected {} sessions", self.selected.len());
    }

    fn invert_selection(&mut self) {
        for record in &self.visible {
            if !self.selected.remove(&record.path) {
                self.selected.insert(record.path.clone());
            }
        }
    }

    fn clear_selection(&mut self) {
        self.selected.clear();
        self.status = String::from("Selection cleared");
    }

    fn start_input(&mut self, kind: InputKind) {
        let (prompt, value, target) = match kind {
            InputKind::Search => ("Search", self.query.clone(), None),
            InputKind::Rename => {
                let Some(record) = self.focused_record() else {
                    self.status = String::from("No session selected");
                    return;
                };
                (
                    "Title",
                    record.title.clone().unwrap_or_default(),
                    Some(record.path.clone()),
                )
            }
            InputKind::Tags => {
                let Some(record) = self.focused_record() else {
                    self.status = String::from("No session selected");
                    return;
                };
                ("Tags", record.tags.join(", "), Some(record.path.clone()))
            }
        };

        self.mode = Mode::Input;
        self.input = Some(InputState {
            kind,
            prompt,
            value,
            target,
        });
    }

    fn cancel_input(&mut self) {
        self.mode = Mode::Normal;
        self.input = None;
        self.status = String::from("Cancelled");
    }

    fn commit_input(&mut self) {
        self.mode = Mode::Normal;
        let Some(input) = self.input.take() else {
            return;
        };

        let outcome = match input.kind {
            InputKind::Search => {
                self.query = input.value.trim().to_string();
                self.apply_view();
                if self.query.is_empty() {
                    Ok(String::from("Filter cleared"))
                } else {
                    Ok(format!(
                        "Filter '{}' matches {} sessions",
                        self.query,
                        self.visible.len()
                    ))
                }
            }
            InputKind::Rename => match input.target {
                Some(path) => self.commit_rename(&path, &input.value),
                None => Err(anyhow!("no target session")),
            },
            InputKind::Tags => match input.target {
                Some(path) => self.commit_tags(&path, &input.value),
                None => Err(anyhow!("no target session")),
            },
        };

        match outcome {
            Ok(message) => self.status = message,
            Err(err) => self.status = format!("Action failed: {err:#}"),
        }
    }

    fn commit_rename(&mut self, path: &Path, value: &str) -> Result<String> {
        update_metadata(path, Some(value), None)?;
        self.reload()?;
        self.refocus(path);
        if value.trim().is_empty() {
            Ok(String::from("Title cleared"))
        } else {
            Ok(format!("Renamed to '{}'", value.trim()))
        }
    }

    fn commit_tags(&mut self, path: &Path, value: &str) -> Result<String> {
        let tags = dedupe_tags(
            value
                .split(|c: char| c == ',' || c.is_whitespace())
                .map(str::to_string),
        );
        update_metadata(path, None, Some(&tags))?;
        self.reload()?;
        self.refocus(path);
        if tags.is_empty() {
            Ok(String::from("Tags cleared"))
        } else {
            Ok(format!("Tagged: {}", tags.join(", ")))
        }
    }

    fn complete_tag_fragment(&mut self) {
        let Some(input) = &self.input else {
            return;
        };
        if input.kind != InputKind::Tags {
            return;
        }
        let suggestions = suggest_tags(&input.value, &self.tag_index, SUGGESTION_LIMIT);
        let Some(first) = suggestions.first() else {
            return;
        };
        let completed = apply_suggestion(&input.value, first);
        if let Some(input) = &mut self.input {
            input.value = completed;
        }
    }

    fn toggle_archive_focused(&mut self) {
        let Some(record) = self.focused_record().cloned() else {
            self.status = String::from("No session selected");
            return;
        };
        let target = !record.archived;

        match set_archive_status(&record, target, &self.paths) {
            Ok(new_path) => {
                // Keep the selection entry pointing at the moved file.
                if self.selected.remove(&record.path) {
                    self.selected.insert(new_path.clone());
                }
                if let Err(err) = self.reload() {
                    self.status = format!("Refresh failed: {err:#}");
                    return;
                }
                self.refocus(&new_path);
                let verb = if target { "Archived" } else { "Restored" };
                self.status = format!("{verb} {}", record.display_name);
            }
            Err(err) => self.status = format!("Archive failed: {err:#}"),
        }
    }

    fn bulk_toggle_archive(&mut self) {
        if self.selected.is_empty() {
            self.status = String::from("Nothing selected");
            return;
        }

        let targets: Vec<SessionRecord> = self
            .all_records
            .iter()
            .filter(|record| self.selected.contains(&record.path))
            .cloned()
            .collect();

        let mut archived = 0usize;
        let mut restored = 0usize;
        let mut failed = 0usize;
        for record in targets {
            let target = !record.archived;
            match set_archive_status(&record, target, &self.paths) {
                Ok(_) => {
                    if target {
                        archived += 1;
                    } else {
                        restored += 1;
                    }
                }
                Err(_) => failed += 1,
            }
        }

        if let Err(err) = self.reload() {
            self.status = format!("Refresh failed: {err:#}");
            return;
        }
        self.selected.clear();
        self.status = format!("Archived {archived}, restored {restored}, failed {failed}");
    }

    fn ensure_preview_requested(&mut self) {
        if self.help_visible {
            return;
        }
        let Some(path) = self.focused_record().map(|record| record.path.clone()) else {
            return;
        };
        if self.preview_cache.contains_key(&path) {
            return;
        }
        if self.preview_inflight.as_deref() == Some(path.as_path()) {
            return;
        }
        self.preview_inflight = Some(path.clone());
        spawn_preview_load(path, self.preview_tx.clone());
    }

    fn drain_preview_signals(&mut self) {
        while let Ok(signal) = self.preview_rx.try_recv() {
            if self.preview_inflight.as_deref() == Some(signal.path.as_path()) {
                self.preview_inflight = None;
            }

            // A completion for anything other than the focused record is
            // stale; drop it instead of letting it overwrite a newer
            // selection.
            let focused = self.focused_record().map(|record| record.path.clone());
            if focused.as_deref() != Some(signal.path.as_path()) {
                continue;
            }

            match signal.result {
                Ok(preview) => {
                    self.preview_cache.insert(signal.path, preview);
                }
                Err(err) => {
                    self.preview_cache.insert(signal.path, None);
                    self.status = format!("Preview failed: {err}");
                }
            }
        }
    }

    fn preview_slot(&self, path: &Path) -> PreviewSlot<'_> {
        match self.preview_cache.get(path) {
            Some(Some(preview)) => PreviewSlot::Ready(preview),
            Some(None) => PreviewSlot::Empty,
            None => {
                if self.preview_inflight.as_deref() == Some(path) {
                    PreviewSlot::Loading
                } else {
                    PreviewSlot::NotRequested
                }
            }
        }
    }
}

fn render_header(frame: &mut ratatui::Frame, area: Rect, app: &App) {
    let mut spans = vec![
        Span::styled(
            "codex sessions ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!("{}/{} ", app.visible.len(), app.all_records.len())),
        Span::styled(
            format!("[{}] ", app.scope.label()),
            Style::default().fg(Color::Yellow),
        ),
        Span::styled(
            format!("[{}] ", app.order.label()),
            Style::default().fg(Color::DarkGray),
        ),
    ];
    if !app.query.is_empty() {
        spans.push(Span::styled(
            format!("filter:'{}' ", app.query),
            Style::default().fg(Color::Magenta),
        ));
    }
    if !app.selected.is_empty() {
        spans.push(Span::styled(
            format!("{} selected ", app.selected.len()),
            Style::default().fg(Color::Green),
        ));
    }
    spans.push(Span::styled(
        app.paths.root.display().to_string(),
        Style::default().fg(Color::DarkGray),
    ));

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_main(frame: &mut ratatui::Frame, area: Rect, app: &App) {
    let (list_width, detail_width) = pane_widths(area.width, app.detail_enabled);

    if detail_width == 0 {
        render_list(frame, area, app);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(list_width),
            Constraint::Length(PANE_SEPARATOR_WIDTH),
            Constraint::Length(detail_width),
        ])
        .split(area);

    render_list(frame, chunks[0], app);
    render_separator(frame, chunks[1]);
    render_detail(frame, chunks[2], app);
}

fn render_list(frame: &mut ratatui::Frame, area: Rect, app: &App) {
    let viewport = area.height.saturating_sub(2) as usize;
    let offset = window_start(app.visible.len(), viewport, app.focus_idx);

    let items: Vec<ListItem> = app
        .visible
        .iter()
        .map(|record| {
            let mark = if app.selected.contains(&record.path) {
                "▪"
            } else {
                " "
            };
            let state = if record.archived { "A" } else { " " };
            let date = record.date_label.as_deref().unwrap_or("          ");
            let tags = if record.tags.is_empty() {
                String::new()
            } else {
                format!("  [{}]", record.tags.join(", "))
            };
            ListItem::new(format!(
                "{mark}{state} {date}  {}{tags}",
                record.display_name
            ))
        })
        .collect();

    let mut state = ListState::default();
    if !app.visible.is_empty() {
        state.select(Some(app.focus_idx));
        state = state.with_offset(offset);
    }

    let list = List::new(items)
        .block(Block::default().title("Sessions").borders(Borders::ALL))
        .highlight_style(
            Style::default()
                .bg(Color::Rgb(44, 54, 84))
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol(" > ");

    frame.render_stateful_widget(list, area, &mut state);
}

fn render_separator(frame: &mut ratatui::Frame, area: Rect) {
    let lines: Vec<Line> = (0..area.height).map(|_| Line::from(" │ ")).collect();
    frame.render_widget(Paragraph::new(lines), area);
}

fn render_detail(frame: &mut ratatui::Frame, area: Rect, app: &App) {
    let wrap_width = (area.width.saturating_sub(2) as usize)
        .saturating_sub(2)
        .max(8);

    let lines = match app.focused_record() {
        Some(record) => detail_lines(record, app.preview_slot(&record.path), wrap_width),
        None => vec![Line::from("No session selected")],
    };

    let para = Paragraph::new(lines)
        .block(Block::default().title("Detail").borders(Borders::ALL))
        .wrap(Wrap { trim: false });
    frame.render_widget(para, area);
}

fn render_help(frame: &mut ratatui::Frame, area: Rect) {
    let lines = vec![
        Line::from(""),
        Line::from("  j/k, arrows    move focus"),
        Line::from("  g/G, Home/End  first / last"),
        Line::from("  /              filter by name or tag"),
        Line::from("  f              cycle active / archived / all"),
        Line::from("  o              toggle sort order"),
        Line::from("  d              toggle detail pane"),
        Line::from("  r              rename focused session"),
        Line::from("  t              edit tags (Tab completes)"),
        Line::from("  space          select / deselect focused"),
        Line::from("  v              select all visible"),
        Line::from("  i              invert selection"),
        Line::from("  c              clear selection"),
        Line::from("  a              archive / restore focused"),
        Line::from("  A              archive / restore selection"),
        Line::from("  ?              close this help"),
        Line::from("  q, ctrl-c      quit"),
    ];
    let para = Paragraph::new(lines).block(Block::default().title("Help").borders(Borders::ALL));
    frame.render_widget(para, area);
}

fn render_footer(frame: &mut ratatui::Frame, area: Rect, app: &App) {
    let lines = if let Some(input) = &app.input {
        let prompt = Line::from(vec![
            Span::styled(
                format!("{}: ", input.prompt),
                Style::default().fg(Color::Cyan),
            ),
            Span::raw(input.value.clone()),
            Span::styled("▏", Style::default().fg(Color::DarkGray)),
        ]);
        let hint = if input.kind == InputKind::Tags {
            let suggestions = suggest_tags(&input.value, &app.tag_index, SUGGESTION_LIMIT);
            if suggestions.is_empty() {
                Line::from(Span::styled(
                    "Enter apply, Esc cancel",
                    Style::default().fg(Color::DarkGray),
                ))
            } else {
                Line::from(Span::styled(
                    format!("Tab completes: {}", suggestions.join(", ")),
                    Style::default().fg(Color::DarkGray),
                ))
            }
        } else {
            Line::from(Span::styled(
                "Enter apply, Esc cancel",
                Style::default().fg(Color::DarkGray),
            ))
        };
        vec![prompt, hint]
    } else {
        let keys = Line::from(vec![
            Span::styled("j/k", Style::default().fg(Color::Cyan)),
            Span::raw(" nav  "),
            Span::styled("/", Style::default().fg(Color::Cyan)),
            Span::raw(" filter  "),
            Span::styled("r/t", Style::default().fg(Color::Green)),
            Span::raw(" rename/tags  "),
            Span::styled("a/A", Style::default().fg(Color::Green)),
            Span::raw(" archive  "),
            Span::styled("space", Style::default().fg(Color::Cyan)),
            Span::raw(" select  "),
            Span::styled("f", Style::default().fg(Color::Yellow)),
            Span::raw(" scope  "),
            Span::styled("?", Style::default().fg(Color::Yellow)),
            Span::raw(" help  "),
            Span::styled("q", Style::default().fg(Color::Red)),
            Span::raw(" quit"),
        ]);
        vec![keys, Line::from(app.status.clone())]
    };

    frame.render_widget(Paragraph::new(lines), area);
}

fn detail_field(label: &str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{label:<12}"), Style::default().fg(Color::DarkGray)),
        Span::raw(value),
    ])
}

fn detail_lines(
    record: &SessionRecord,
    slot: PreviewSlot,
    wrap_width: usize,
) -> Vec<Line<'static>> {
    let mut lines = vec![detail_field("Name", record.display_name.clone())];

    if let Some(title) = &record.title {
        lines.push(detail_field("Title", title.clone()));
    }
    let status = if record.archived { "archived" } else { "active" };
    lines.push(detail_field("Status", status.to_string()));
    if let Some(timestamp) = &record.timestamp {
        lines.push(detail_field("Timestamp", timestamp.clone()));
    } else if let Some(date) = &record.date_label {
        lines.push(detail_field("Date", date.clone()));
    }
    if let Some(cwd) = &record.cwd {
        lines.push(detail_field("Cwd", cwd.clone()));
    }
    if !record.tags.is_empty() {
        lines.push(detail_field("Tags", record.tags.join(", ")));
    }
    if let Some(id) = &record.id {
        lines.push(detail_field("Id", id.clone()));
    }
    if let Some(originator) = &record.originator {
        lines.push(detail_field("Originator", originator.clone()));
    }
    if let Some(version) = &record.cli_version {
        lines.push(detail_field("Cli", version.clone()));
    }
    if let Some(provider) = &record.model_provider {
        lines.push(detail_field("Model", provider.clone()));
    }
    if let Some(git) = &record.git {
        if let Some(repository) = &git.repository_url {
            lines.push(detail_field("Repository", repository.clone()));
        }
        if let Some(branch) = &git.branch {
            lines.push(detail_field("Branch", branch.clone()));
        }
        if let Some(commit) = &git.commit_hash {
            lines.push(detail_field("Commit", commit.clone()));
        }
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "Preview",
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    )));

    match slot {
        PreviewSlot::Loading => lines.push(Line::from("Loading preview…")),
        PreviewSlot::NotRequested => lines.push(Line::from("preview unavailable")),
        PreviewSlot::Empty => lines.push(Line::from("no preview available")),
        PreviewSlot::Ready(preview) => {
            lines.push(Line::from(Span::styled(
                "First:",
                Style::default().fg(Color::DarkGray),
            )));
            for wrapped in wrap_text(&preview.first, wrap_width) {
                lines.push(Line::from(format!("  {wrapped}")));
            }
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                "Last:",
                Style::default().fg(Color::DarkGray),
            )));
            for wrapped in wrap_text(&preview.last, wrap_width) {
                lines.push(Line::from(format!("  {wrapped}")));
            }
        }
    }

    lines
}

/// Window start that keeps the focused row centered, clamped so the window
/// never runs past either end of the list.
fn window_start(total: usize, viewport: usize, focus: usize) -> usize {
    if viewport == 0 || total <= viewport {
        return 0;
    }
    focus.saturating_sub(viewport / 2).min(total - viewport)
}

fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![String::new()];
    }

    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if current_len == 0 && word_len <= width {
            current.push_str(word);
            current_len = word_len;
            continue;
        }
        if current_len > 0 && current_len + 1 + word_len <= width {
            current.push(' ');
            current.push_str(word);
            current_len += 1 + word_len;
            continue;
        }

        if current_len > 0 {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if word_len <= width {
            current.push_str(word);
            current_len = word_len;
            continue;
        }

        // Hard-split a word wider than the pane.
        let chars: Vec<char> = word.chars().collect();
        let mut start = 0;
        while start + width < chars.len() {
            lines.push(chars[start..start + width].iter().collect());
            start += width;
        }
        current = chars[start..].iter().collect();
        current_len = chars.len() - start;
    }

    if current_len > 0 || lines.is_empty() {
        lines.push(current);
    }

    lines
}

fn pane_widths(total: u16, detail_enabled: bool) -> (u16, u16) {
    if !detail_enabled || total < DETAIL_SUPPRESS_BELOW {
        return (total, 0);
    }
    let max_list = total - PANE_SEPARATOR_WIDTH - MIN_DETAIL_WIDTH;
    let list = ((f32::from(total) * LIST_FRACTION) as u16).clamp(MIN_LIST_WIDTH, max_list);
    (list, total - list - PANE_SEPARATOR_WIDTH)
}

fn spawn_preview_load(path: PathBuf, tx: Sender<PreviewSignal>) {
    std::thread::spawn(move || {
        let result = load_preview(&path).map_err(|err| format!("{err:#}"));
        let _ = tx.send(PreviewSignal { path, result });
    });
}

fn load_preview(path: &Path) -> Result<Option<SessionPreview>> {
    let file =
        fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut first: Option<String> = None;
    let mut last: Option<String> = None;

    for line in reader.lines() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let Ok(value) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        let Some(text) = message_text(&value) else {
            continue;
        };
        if first.is_none() {
            first = Some(text.clone());
        }
        last = Some(text);
    }

    Ok(match (first, last) {
        (Some(first), Some(last)) => Some(SessionPreview {
            first: truncate_preview(&first),
            last: truncate_preview(&last),
        }),
        _ => None,
    })
}

fn message_text(value: &Value) -> Option<String> {
    let payload = value.get("payload")?;
    if payload.get("type").and_then(Value::as_str) != Some("message") {
        return None;
    }
    let items = payload.get("content").and_then(Value::as_array)?;

    let mut parts: Vec<&str> = Vec::new();
    for item in items {
        for key in ["text", "input_text", "output_text"] {
            if let Some(text) = item.get(key).and_then(Value::as_str) {
                if !text.trim().is_empty() {
                    parts.push(text);
                    break;
                }
            }
        }
    }
    if parts.is_empty() {
        return None;
    }

    let joined = parts.join(" ");
    let collapsed = joined.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

fn truncate_preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_BUDGET {
        return text.to_string();
    }
    let cut: String = text.chars().take(PREVIEW_BUDGET).collect();
    format!("{cut}…")
}

fn load_records(paths: &CodexPaths) -> Result<Vec<SessionRecord>> {
    let mut files = Vec::new();
    if paths.sessions_dir.exists() {
        collect_session_files(&paths.sessions_dir, &mut files)?;
    }
    if paths.archived_dir.exists() {
        collect_session_files(&paths.archived_dir, &mut files)?;
    }

    let mut records = Vec::new();
    for path in files {
        let archived = path.starts_with(&paths.archived_dir);
        if let Some(record) = read_record(&path, archived) {
            records.push(record);
        }
    }

    Ok(records)
}

fn collect_session_files(root: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(root).with_context(|| format!("failed to read {}", root.display()))? {
        let entry = entry?;
        let path = entry.path();
        let metadata = entry.metadata()?;

        if metadata.is_dir() {
            collect_session_files(&path, files)?;
            continue;
        }

        if metadata.is_file()
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == SESSION_EXTENSION)
        {
            files.push(path);
        }
    }

    Ok(())
}

/// Builds a record from the first line of a session file. Files that cannot
/// be read, fail to parse, or do not start with the session_meta envelope
/// are skipped without error.
fn read_record(path: &Path, archived: bool) -> Option<SessionRecord> {
    let first = read_first_line(path)?;
    let envelope: MetaEnvelope = serde_json::from_str(&first).ok()?;
    if envelope.kind != "session_meta" {
        return None;
    }
    let payload = envelope.payload;

    let file_name = path.file_name()?.to_str()?.to_string();
    let tags = dedupe_tags(payload.tags.map(TagsField::into_list).unwrap_or_default());
    let title = payload.title.or(payload.name).and_then(|raw| {
        let trimmed = raw.trim().to_string();
        if trimmed.is_empty() { None } else { Some(trimmed) }
    });
    let sort_key = resolve_sort_key(payload.timestamp.as_deref(), &file_name, path);
    let display_name = derive_display_name(title.as_deref(), payload.cwd.as_deref(), &file_name);

    Some(SessionRecord {
        path: path.to_path_buf(),
        file_name,
        archived,
        title,
        tags,
        timestamp: payload.timestamp,
        date_label: date_label(sort_key),
        display_name,
        sort_key,
        id: payload.id,
        cwd: payload.cwd,
        originator: payload.originator,
        cli_version: payload.cli_version,
        model_provider: payload.model_provider,
        git: payload.git,
    })
}

fn read_first_line(path: &Path) -> Option<String> {
    let file = fs::File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let mut line = String::new();
    match reader.read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim_end_matches(['\n', '\r']).to_string()),
    }
}

/// Resolution order: explicit timestamp, then a timestamp embedded in the
/// file name, then mtime. The file name outranks mtime because mtime changes
/// on copy or restore.
fn resolve_sort_key(timestamp: Option<&str>, file_name: &str, path: &Path) -> i64 {
    if let Some(ts) = timestamp {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(ts) {
            return parsed.timestamp_millis();
        }
    }
    if let Some(naive) = filename_timestamp(file_name) {
        return Utc.from_utc_datetime(&naive).timestamp_millis();
    }
    if let Ok(meta) = fs::metadata(path) {
        if let Ok(modified) = meta.modified() {
            if let Ok(elapsed) = modified.duration_since(UNIX_EPOCH) {
                return elapsed.as_millis() as i64;
            }
        }
    }
    0
}

fn filename_timestamp(file_name: &str) -> Option<NaiveDateTime> {
    let bytes = file_name.as_bytes();
    if bytes.len() < 19 {
        return None;
    }
    for start in 0..=bytes.len() - 19 {
        let window = &bytes[start..start + 19];
        if !timestamp_shape(window) {
            continue;
        }
        let text = std::str::from_utf8(window).ok()?;
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H-%M-%S") {
            return Some(parsed);
        }
    }
    None
}

fn timestamp_shape(window: &[u8]) -> bool {
    window.iter().enumerate().all(|(i, b)| match i {
        4 | 7 | 13 | 16 => *b == b'-',
        10 => *b == b'T',
        _ => b.is_ascii_digit(),
    })
}

fn date_label(sort_key: i64) -> Option<String> {
    if sort_key <= 0 {
        return None;
    }
    Utc.timestamp_millis_opt(sort_key)
        .single()
        .map(|when| when.format("%Y-%m-%d").to_string())
}

fn derive_display_name(title: Option<&str>, cwd: Option<&str>, file_name: &str) -> String {
    if let Some(title) = title {
        let trimmed = title.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    if let Some(cwd) = cwd {
        if let Some(base) = Path::new(cwd).file_name().and_then(|s| s.to_str()) {
            if !base.is_empty() {
                return base.to_string();
            }
        }
    }
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("");
    if !stem.is_empty() {
        return stem.to_string();
    }
    if !file_name.is_empty() {
        return file_name.to_string();
    }
    String::from("session")
}

fn dedupe_tags<I: IntoIterator<Item = String>>(tags: I) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for tag in tags {
        let trimmed = tag.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_lowercase()) {
            out.push(trimmed.to_string());
        }
    }
    out
}

fn filter_records(
    records: &[SessionRecord],
    query: &str,
    scope: ArchiveScope,
) -> Vec<SessionRecord> {
    let needle = query.trim().to_lowercase();
    records
        .iter()
        .filter(|record| scope.admits(record.archived))
        .filter(|record| {
            if needle.is_empty() {
                return true;
            }
            record.display_name.to_lowercase().contains(&needle)
                || record.tags.join(" ").to_lowercase().contains(&needle)
        })
        .cloned()
        .collect()
}

fn sort_records(mut records: Vec<SessionRecord>, order: SortOrder) -> Vec<SessionRecord> {
    match order {
        SortOrder::Ascending => records.sort_by(|a, b| a.sort_key.cmp(&b.sort_key)),
        SortOrder::Descending => records.sort_by(|a, b| b.sort_key.cmp(&a.sort_key)),
    }
    records
}

/// Rewrites the session_meta first line in place, leaving every other line
/// untouched. A non-empty title lands in both `title` and the legacy `name`
/// field; an empty title removes both. An empty cleaned tag list removes the
/// `tags` field rather than writing an empty array.
fn update_metadata(path: &Path, title: Option<&str>, tags: Option<&[String]>) -> Result<()> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let (first, rest) = match content.split_once('\n') {
        Some((first, rest)) => (first, Some(rest)),
        None => (content.as_str(), None),
    };

    let mut value: Value = serde_json::from_str(first)
        .with_context(|| format!("invalid JSON in first line of {}", path.display()))?;
    if value.get("type").and_then(Value::as_str) != Some("session_meta") {
        bail!("{} is not session metadata", path.display());
    }
    let payload = value
        .get_mut("payload")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| anyhow!("{} has no metadata payload", path.display()))?;

    if let Some(title) = title {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            payload.remove("title");
            payload.remove("name");
        } else {
            payload.insert("title".to_string(), Value::String(trimmed.to_string()));
            payload.insert("name".to_string(), Value::String(trimmed.to_string()));
        }
    }

    if let Some(tags) = tags {
        let cleaned = dedupe_tags(tags.iter().cloned());
        if cleaned.is_empty() {
            payload.remove("tags");
        } else {
            payload.insert(
                "tags".to_string(),
                Value::Array(cleaned.into_iter().map(Value::String).collect()),
            );
        }
    }

    let mut out = serde_json::to_string(&value)?;
    if let Some(rest) = rest {
        out.push('\n');
        out.push_str(rest);
    }

    atomic_write(path, &out)
}

/// Moves a session between the active and archived trees. Restoring
/// recomputes the date bucket from the timestamp chain, so a session whose
/// mtime disagrees with its embedded timestamp can land in a different
/// bucket than it came from.
fn set_archive_status(
    record: &SessionRecord,
    archived: bool,
    paths: &CodexPaths,
) -> Result<PathBuf> {
    if record.archived == archived {
        return Ok(record.path.clone());
    }

    let dest = if archived {
        paths.archived_dir.join(&record.file_name)
    } else {
        active_destination(record, &paths.sessions_dir)
    };

    if dest.exists() {
        bail!("{} already exists", dest.display());
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    move_file(&record.path, &dest)?;
    Ok(dest)
}

fn active_destination(record: &SessionRecord, sessions_dir: &Path) -> PathBuf {
    let millis = resolve_sort_key(record.timestamp.as_deref(), &record.file_name, &record.path);
    let when = if millis > 0 {
        Utc.timestamp_millis_opt(millis)
            .single()
            .unwrap_or_else(Utc::now)
    } else {
        Utc::now()
    };
    sessions_dir
        .join(when.format("%Y").to_string())
        .join(when.format("%m").to_string())
        .join(when.format("%d").to_string())
        .join(&record.file_name)
}

fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    // rename fails across filesystems; fall back to copy then delete.
    fs::copy(from, to)
        .with_context(|| format!("failed to copy {} to {}", from.display(), to.display()))?;
    fs::remove_file(from).with_context(|| format!("failed to remove {}", from.display()))?;
    Ok(())
}

fn atomic_write(path: &Path, content: &str) -> Result<()> {
    let mut tmp = path.to_path_buf();
    tmp.set_extension("jsonl.tmp");

    fs::write(&tmp, content).with_context(|| format!("failed writing {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed renaming {} to {}", tmp.display(), path.display()))?;
    Ok(())
}

fn build_tag_index(records: &[SessionRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for record in records {
        for tag in &record.tags {
            if seen.insert(tag.to_lowercase()) {
                out.push(tag.clone());
            }
        }
    }
    out.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()));
    out
}

fn tag_fragment(input: &str) -> (Vec<String>, &str) {
    let boundary = input
        .rfind(|c: char| c == ',' || c.is_whitespace())
        .map(|idx| idx + input[idx..].chars().next().map_or(1, char::len_utf8))
        .unwrap_or(0);
    let completed = input[..boundary]
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.trim().is_empty())
        .map(|token| token.trim().to_string())
        .collect();
    (completed, &input[boundary..])
}

fn suggest_tags(input: &str, all_tags: &[String], limit: usize) -> Vec<String> {
    let (completed, fragment) = tag_fragment(input);
    let used: HashSet<String> = completed.iter().map(|tag| tag.to_lowercase()).collect();
    let needle = fragment.trim().to_lowercase();

    let mut out: Vec<String> = all_tags
        .iter()
        .filter(|tag| {
            let lower = tag.to_lowercase();
            lower.starts_with(&needle) && !used.contains(&lower)
        })
        .cloned()
        .collect();
    out.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()));
    out.truncate(limit);
    out
}

fn apply_suggestion(input: &str, suggestion: &str) -> String {
    let (_, fragment) = tag_fragment(input);
    let prefix = &input[..input.len() - fragment.len()];
    format!("{prefix}{suggestion}")
}

fn resolve_codex_home() -> Result<PathBuf> {
    if let Ok(path) = env::var("CODEX_HOME") {
        let expanded = expand_tilde(path.trim());
        if !expanded.as_os_str().is_empty() {
            return Ok(expanded);
        }
    }

    let home = env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".codex"))
}

fn expand_tilde(input: &str) -> PathBuf {
    if input.is_empty() {
        return PathBuf::new();
    }

    if input == "~" {
        if let Ok(home) = env::var("HOME") {
            return PathBuf::from(home);
        }
    }

    if let Some(rest) = input.strip_prefix("~/") {
        if let Ok(home) = env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }

    PathBuf::from(input)
}
