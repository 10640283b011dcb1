use std::io;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::*;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Bar, BarChart, BarGroup, Block, Borders, Clear, Paragraph, Wrap};

use footy_value::analysis_parser::format_analysis_response;
use footy_value::config::AppConfig;
use footy_value::logging::init_file_logging;
use footy_value::pipeline::AnalysisOutcome;
use footy_value::state::{AppState, Delta, Form, LoginMode, Screen, WorkerCommand, apply_delta};
use footy_value::users::{PACKAGES, Package};
use footy_value::worker::spawn_worker;

struct App {
    state: AppState,
    should_quit: bool,
    cmd_tx: Option<mpsc::Sender<WorkerCommand>>,
}

impl App {
    fn new(state: AppState, cmd_tx: Option<mpsc::Sender<WorkerCommand>>) -> Self {
        Self {
            state,
            should_quit: false,
            cmd_tx,
        }
    }

    fn send(&mut self, cmd: Option<WorkerCommand>) {
        let Some(cmd) = cmd else {
            return;
        };
        let analyze = matches!(cmd, WorkerCommand::Analyze { .. });
        let sent = self.cmd_tx.as_ref().is_some_and(|tx| tx.send(cmd).is_ok());
        if !sent {
            self.state.push_log("[WARN] Background worker unavailable");
            if analyze {
                self.state.busy = false;
            }
        }
    }

    fn on_key(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Esc
            || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
        {
            if self.state.help_overlay {
                self.state.help_overlay = false;
            } else {
                self.should_quit = true;
            }
            return;
        }

        let signed_in = self.state.current_user.is_some();
        match key.code {
            KeyCode::F(1) => self.state.help_overlay = !self.state.help_overlay,
            KeyCode::F(2) if signed_in => self.state.screen = Screen::Dashboard,
            KeyCode::F(3) if signed_in => self.state.screen = Screen::Packages,
            KeyCode::F(4) => self.state.screen = Screen::Admin,
            KeyCode::F(5) => self.on_alternate(),
            KeyCode::F(6) if self.state.screen == Screen::Dashboard => {
                self.state.use_llm = !self.state.use_llm;
                let msg = if self.state.use_llm {
                    "[INFO] AI commentary on"
                } else {
                    "[INFO] AI commentary off"
                };
                self.state.push_log(msg);
            }
            KeyCode::F(7) => match self.state.screen {
                Screen::Admin => {
                    self.state.export_users();
                }
                _ => {
                    self.state.export_last_analysis();
                }
            },
            KeyCode::F(8) if self.state.screen == Screen::Admin => self.state.admin_delete_selected(),
            KeyCode::F(10) => self.state.logout(),
            KeyCode::PageDown => self.state.results_scroll = self.state.results_scroll.saturating_add(5),
            KeyCode::PageUp => self.state.results_scroll = self.state.results_scroll.saturating_sub(5),
            KeyCode::Up => self.on_vertical(-1),
            KeyCode::Down => self.on_vertical(1),
            KeyCode::Tab => {
                if let Some(form) = self.state.active_form() {
                    form.next();
                }
            }
            KeyCode::BackTab => {
                if let Some(form) = self.state.active_form() {
                    form.prev();
                }
            }
            KeyCode::Backspace => {
                if let Some(form) = self.state.active_form() {
                    form.backspace();
                }
            }
            KeyCode::Enter => self.on_submit(),
            KeyCode::Char(c) => {
                if let Some(form) = self.state.active_form() {
                    form.push_char(c);
                }
            }
            _ => {}
        }
    }

    fn on_vertical(&mut self, delta: isize) {
        match self.state.screen {
            Screen::Packages => self.state.select_package(delta),
            Screen::Admin if self.state.admin_unlocked => self.state.admin_move(delta),
            _ => {
                if let Some(form) = self.state.active_form() {
                    if delta > 0 { form.next() } else { form.prev() }
                }
            }
        }
    }

    fn on_submit(&mut self) {
        match self.state.screen {
            Screen::Login => match self.state.login_mode {
                LoginMode::SignIn => self.state.submit_login(),
                LoginMode::Register => {
                    let cmd = self.state.submit_register();
                    self.send(cmd);
                }
            },
            Screen::Verify => self.state.submit_verification(),
            Screen::Dashboard => {
                let cmd = self.state.submit_analysis();
                self.send(cmd);
            }
            Screen::Packages => {
                let cmd = self.state.start_checkout();
                self.send(cmd);
            }
            Screen::Admin => {
                if self.state.admin_unlocked {
                    self.state.admin_grant_credits();
                } else {
                    self.state.unlock_admin();
                }
            }
        }
    }

    // F5: the secondary action of each screen.
    fn on_alternate(&mut self) {
        match self.state.screen {
            Screen::Login => self.state.toggle_login_mode(),
            Screen::Verify => {
                let cmd = self.state.resend_verification();
                self.send(cmd);
            }
            Screen::Dashboard => {
                self.state.source_kind = self.state.source_kind.next();
                let msg = format!(
                    "[INFO] Stats source: {} ({})",
                    self.state.source_kind.label(),
                    self.state.source_kind.hint()
                );
                self.state.push_log(msg);
            }
            Screen::Packages => {
                let cmd = self.state.confirm_checkout();
                self.send(cmd);
            }
            Screen::Admin => {}
        }
    }
}

fn main() -> io::Result<()> {
    let cfg = AppConfig::from_env();
    let _log_guard = init_file_logging(&cfg.log_dir());

    let state = match AppState::new(&cfg) {
        Ok(state) => state,
        Err(err) => {
            eprintln!("error: cannot open user store {}: {err}", cfg.user_data_path().display());
            return Ok(());
        }
    };

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = ratatui::Terminal::new(backend)?;

    let (tx, rx) = mpsc::channel();
    let (cmd_tx, cmd_rx) = mpsc::channel();
    spawn_worker(tx, cmd_rx, cfg);

    let mut app = App::new(state, Some(cmd_tx));
    let res = run_app(&mut terminal, &mut app, rx);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("error: {err}");
    }
    Ok(())
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    rx: mpsc::Receiver<Delta>,
) -> io::Result<()> {
    let tick_rate = Duration::from_millis(250);
    let mut last_tick = Instant::now();

    loop {
        while let Ok(delta) = rx.try_recv() {
            apply_delta(&mut app.state, delta);
        }

        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);
        if event::poll(timeout)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            app.on_key(key);
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn ui(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(4),
            Constraint::Length(1),
        ])
        .split(frame.size());

    let header = Paragraph::new(header_text(&app.state))
        .block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(header, chunks[0]);

    match app.state.screen {
        Screen::Login => render_login(frame, chunks[1], &app.state),
        Screen::Verify => render_verify(frame, chunks[1], &app.state),
        Screen::Dashboard => render_dashboard(frame, chunks[1], &app.state),
        Screen::Packages => render_packages(frame, chunks[1], &app.state),
        Screen::Admin => render_admin(frame, chunks[1], &app.state),
    }

    let console = Paragraph::new(console_text(&app.state))
        .block(Block::default().title("Log").borders(Borders::TOP));
    frame.render_widget(console, chunks[2]);

    let footer = Paragraph::new(footer_text(&app.state)).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(footer, chunks[3]);

    if app.state.help_overlay {
        render_help_overlay(frame, frame.size());
    }
}

fn header_text(state: &AppState) -> String {
    let screen = match state.screen {
        Screen::Login => "Sign in",
        Screen::Verify => "Verify email",
        Screen::Dashboard => "Value finder",
        Screen::Packages => "Credit packages",
        Screen::Admin => "Admin",
    };
    let user = match (&state.current_user, state.credits()) {
        (Some(email), Some(credits)) => {
            let tier = state.users.get(email).map(|u| u.tier.label()).unwrap_or("Free");
            format!("{email} | {tier} | {credits} credits")
        }
        _ => "not signed in".to_string(),
    };
    let busy = if state.busy { " | analysing..." } else { "" };
    format!("Footy Value | {screen}\n{user}{busy}")
}

fn footer_text(state: &AppState) -> String {
    let keys = match state.screen {
        Screen::Login => "Enter submit | F5 sign in/register | Tab next field",
        Screen::Verify => "Enter verify | F5 resend code",
        Screen::Dashboard => "Enter analyse | F5 source | F6 AI on/off | F7 export | PgUp/PgDn scroll",
        Screen::Packages => "Up/Down choose | Enter checkout | F5 confirm payment",
        Screen::Admin => "Enter unlock/grant | Up/Down select | F7 export users | F8 delete",
    };
    format!("{keys} | F1 help | F10 sign out | Esc quit")
}

fn render_form(frame: &mut Frame, area: Rect, title: &str, form: &Form) {
    let lines: Vec<Line> = form
        .fields
        .iter()
        .enumerate()
        .map(|(idx, field)| {
            let value = if field.secret {
                "*".repeat(field.value.chars().count())
            } else {
                field.value.clone()
            };
            let focused = idx == form.focus;
            let marker = if focused { "> " } else { "  " };
            let style = if focused {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            Line::from(vec![
                Span::styled(format!("{marker}{:<24}", field.label), style),
                Span::raw(value),
                Span::styled(if focused { "_" } else { "" }, style),
            ])
        })
        .collect();
    let widget = Paragraph::new(lines).block(Block::default().title(title.to_string()).borders(Borders::ALL));
    frame.render_widget(widget, area);
}

fn render_login(frame: &mut Frame, area: Rect, state: &AppState) {
    let popup = centered_rect(60, 50, area);
    match state.login_mode {
        LoginMode::SignIn => render_form(frame, popup, "Sign in (F5 to register)", &state.login_form),
        LoginMode::Register => render_form(
            frame,
            popup,
            "Register: 5 free credits after email verification (F5 to sign in)",
            &state.register_form,
        ),
    }
}

fn render_verify(frame: &mut Frame, area: Rect, state: &AppState) {
    let popup = centered_rect(60, 40, area);
    let title = match &state.pending_verification {
        Some(email) => format!("Code sent to {email}"),
        None => "Verify email".to_string(),
    };
    render_form(frame, popup, &title, &state.verify_form);
}

fn render_dashboard(frame: &mut Frame, area: Rect, state: &AppState) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(area);
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(9), Constraint::Length(5), Constraint::Min(1)])
        .split(columns[0]);

    let title = format!(
        "Match | source: {} | AI: {}",
        state.source_kind.label(),
        if state.use_llm { "on" } else { "off" }
    );
    render_form(frame, left[0], &title, &state.analysis_form);

    let hint = format!(
        "Source: {}\nOdds: 1=2.10 X=3.40 2=3.60 1X=1.30 O2.5=1.90 U2.5=1.95\n      BTTS=1.80 CO9.5=1.85 KO4.5=1.90",
        state.source_kind.hint()
    );
    frame.render_widget(
        Paragraph::new(hint).block(Block::default().title("Input").borders(Borders::ALL)),
        left[1],
    );

    match &state.last_outcome {
        Some(outcome) => {
            frame.render_widget(
                moneyline_chart(outcome).block(Block::default().title("1X2 model %").borders(Borders::ALL)),
                left[2],
            );
            let results = Paragraph::new(results_text(outcome))
                .wrap(Wrap { trim: false })
                .scroll((state.results_scroll, 0))
                .block(Block::default().title("Analysis").borders(Borders::ALL));
            frame.render_widget(results, columns[1]);
        }
        None => {
            let placeholder = Paragraph::new("Enter a fixture and odds, then press Enter.")
                .block(Block::default().title("Analysis").borders(Borders::ALL));
            frame.render_widget(placeholder, columns[1]);
        }
    }
}

fn moneyline_chart(outcome: &AnalysisOutcome) -> BarChart<'static> {
    let ml = &outcome.probabilities.moneyline;
    let bar = |label: &str, value: f64, color: Color| {
        Bar::default()
            .label(label.to_string().into())
            .value(value.round().max(0.0) as u64)
            .style(Style::default().fg(color))
    };
    let bars = [
        bar("1", ml.home, Color::Green),
        bar("X", ml.draw, Color::Yellow),
        bar("2", ml.away, Color::Red),
    ];
    BarChart::default()
        .data(BarGroup::default().bars(&bars))
        .direction(Direction::Horizontal)
        .bar_width(1)
        .bar_gap(0)
        .max(100)
}

fn results_text(outcome: &AnalysisOutcome) -> String {
    let p = &outcome.probabilities;
    let mut out = format!(
        "{} vs {} ({})\nxG {:.2} - {:.2} | data quality {:.0}%\n",
        outcome.home.name,
        outcome.away.name,
        outcome.source,
        p.expected_goals_home,
        p.expected_goals_away,
        p.data_quality * 100.0
    );
    out.push_str(&format!(
        "1X2 {:.1} / {:.1} / {:.1} | BTTS {:.1}\n",
        p.moneyline.home, p.moneyline.draw, p.moneyline.away, p.btts.yes
    ));
    for l in &p.goals {
        out.push_str(&format!("  Goals O/U {}: {:.1} / {:.1}\n", l.line, l.over, l.under));
    }

    out.push_str("\nMarkets (real vs implied, edge):\n");
    for c in &outcome.comparisons {
        out.push_str(&format!(
            "  {:<28} @{:<5.2} {:>5.1}% vs {:>5.1}%  {:+.1}\n",
            c.label, c.decimal_odds, c.real_probability, c.implied_probability, c.edge
        ));
    }

    out.push_str("\nValue opportunities:\n");
    if outcome.opportunities.is_empty() {
        out.push_str("  none above threshold\n");
    }
    for o in &outcome.opportunities {
        out.push_str(&format!(
            "  {} @{:.2}: edge {:+.1}, EV {:+.3}\n",
            o.label, o.decimal_odds, o.edge, o.expected_value
        ));
        if let Some(j) = &o.justification {
            out.push_str(&format!("    {j}\n"));
        }
    }

    if let Some(doc) = &outcome.document {
        out.push_str("\nAI analysis:\n");
        out.push_str(&format_analysis_response(doc));
        out.push('\n');
    }
    out
}

fn render_packages(frame: &mut Frame, area: Rect, state: &AppState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(4)])
        .split(area);

    let lines: Vec<Line> = PACKAGES
        .iter()
        .enumerate()
        .map(|(idx, pack)| {
            let style = if idx == state.selected_package {
                Style::default().fg(Color::Black).bg(Color::Yellow)
            } else {
                Style::default()
            };
            Line::styled(package_line(pack), style)
        })
        .chain(state.pending_checkout.iter().map(|s| {
            Line::raw(format!(
                "Pending checkout {}: {}",
                s.id,
                s.url.as_deref().unwrap_or("-")
            ))
        }))
        .collect();
    frame.render_widget(
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().title("Packages").borders(Borders::ALL)),
        rows[0],
    );
    render_form(frame, rows[1], "Confirm payment (F5)", &state.confirm_form);
}

fn package_line(pack: &Package) -> String {
    format!(
        "{:<10} {:>3} credits  EUR {}.{:02}",
        pack.name,
        pack.credits,
        pack.price_cents / 100,
        pack.price_cents % 100
    )
}

fn render_admin(frame: &mut Frame, area: Rect, state: &AppState) {
    if !state.admin_unlocked {
        let popup = centered_rect(60, 40, area);
        render_form(frame, popup, "Admin password", &state.admin_form);
        return;
    }
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(4)])
        .split(area);
    let users = state.users.list();
    let mut lines = vec![Line::styled(
        format!(
            "{:<32} {:<10} {:<5} {:>6} {:>6} {:>9}",
            "Email", "Tier", "Ver.", "Used", "Left", "Analyses"
        ),
        Style::default().add_modifier(Modifier::BOLD),
    )];
    for (idx, u) in users.iter().enumerate() {
        let style = if idx == state.admin_selected {
            Style::default().fg(Color::Black).bg(Color::Yellow)
        } else {
            Style::default()
        };
        lines.push(Line::styled(
            format!(
                "{:<32} {:<10} {:<5} {:>6} {:>6} {:>9}",
                u.email,
                u.tier.label(),
                if u.verified { "yes" } else { "no" },
                u.credits_used(),
                u.credits_remaining(),
                u.usage.len()
            ),
            style,
        ));
    }
    frame.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .title(format!("Users ({})", users.len()))
                .borders(Borders::ALL),
        ),
        rows[0],
    );
    render_form(frame, rows[1], "Grant credits (Enter)", &state.admin_form);
}

fn console_text(state: &AppState) -> String {
    if state.logs.is_empty() {
        return "No messages yet".to_string();
    }
    state
        .logs
        .iter()
        .rev()
        .take(3)
        .cloned()
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(60, 60, area);
    frame.render_widget(Clear, popup_area);

    let text = [
        "Footy Value - Help",
        "",
        "Global:",
        "  F1           Toggle help",
        "  F2           Value finder",
        "  F3           Credit packages",
        "  F4           Admin",
        "  F10          Sign out",
        "  Esc          Quit",
        "",
        "Forms:",
        "  Tab / ↑/↓    Move between fields",
        "  Enter        Submit",
        "  F5           Screen action (mode, source, resend, confirm)",
        "",
        "Value finder:",
        "  F6           AI commentary on/off",
        "  F7           Export last analysis to xlsx",
        "  PgUp/PgDn    Scroll results",
        "",
        "Each priced market costs one credit.",
    ]
    .join("\n");

    let help = Paragraph::new(text)
        .block(Block::default().title("Help").borders(Borders::ALL))
        .style(Style::default());
    frame.render_widget(help, popup_area);
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

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);

    horizontal[1]
}
