use anyhow::Result;
use crossterm::{
    ExecutableCommand,
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
};
use std::io::stdout;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread;
use std::time::{Duration, Instant};

use crate::ai::{AnalysisProvider, ResumeFile};
use crate::mailer::{self, MailComposer, SystemMailer};
use crate::models::{AnalysisResult, Candidate, JobContext};
use crate::queue::{Decision, EmailQueue, ReviewKind, SentTracker, StepOutcome};

const NOTICE_TTL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Idle,
    Processing,
    Complete,
    Error,
}

/// Completion message from one analysis call. Tagged with the generation the
/// call was started under so a response arriving after a session reset can
/// be recognized as stale and dropped.
pub struct AnalysisOutcome {
    pub generation: u64,
    pub result: Result<AnalysisResult, String>,
}

struct AppState {
    status: Status,
    generation: u64,
    result: Option<AnalysisResult>,
    selected_id: Option<String>,
    sent: SentTracker,
    queue: Option<EmailQueue>,
    error_msg: Option<String>,
    notice: Option<(String, Instant)>,
    detail_scroll: u16,
    file_count: usize,
}

impl AppState {
    fn new(file_count: usize) -> Self {
        Self {
            status: Status::Idle,
            generation: 0,
            result: None,
            selected_id: None,
            sent: SentTracker::new(),
            queue: None,
            error_msg: None,
            notice: None,
            detail_scroll: 0,
            file_count,
        }
    }

    /// Moves into Processing and returns the generation to tag the call
    /// with. Returns None while a call is already in flight.
    fn begin_analysis(&mut self) -> Option<u64> {
        if self.status == Status::Processing {
            return None;
        }
        self.status = Status::Processing;
        self.error_msg = None;
        Some(self.generation)
    }

    fn apply_outcome(&mut self, outcome: AnalysisOutcome) {
        if outcome.generation != self.generation {
            // Stale response from before a session reset.
            return;
        }
        match outcome.result {
            Ok(result) => {
                self.selected_id = result.candidates.first().map(|c| c.id.clone());
                self.sent = SentTracker::new();
                self.queue = None;
                self.detail_scroll = 0;
                self.result = Some(result);
                self.status = Status::Complete;
            }
            Err(msg) => {
                // Prior result, if any, stays untouched.
                self.status = Status::Error;
                self.error_msg = Some(if msg.is_empty() {
                    "An unexpected error occurred".to_string()
                } else {
                    msg
                });
            }
        }
    }

    /// Hard reset. Bumping the generation orphans any in-flight call.
    fn reset_session(&mut self) {
        self.generation += 1;
        self.status = Status::Idle;
        self.result = None;
        self.selected_id = None;
        self.sent = SentTracker::new();
        self.queue = None;
        self.error_msg = None;
        self.notice = None;
        self.detail_scroll = 0;
    }

    /// Display order for the list view: descending score, stable.
    fn sorted_candidates(&self) -> Vec<&Candidate> {
        let mut candidates: Vec<&Candidate> = self
            .result
            .iter()
            .flat_map(|r| r.candidates.iter())
            .collect();
        candidates.sort_by(|a, b| b.score.cmp(&a.score));
        candidates
    }

    fn selected_candidate(&self) -> Option<&Candidate> {
        let id = self.selected_id.as_deref()?;
        self.result
            .as_ref()?
            .candidates
            .iter()
            .find(|c| c.id == id)
    }

    /// Tolerates unknown ids: selection is unchanged if the id is not in
    /// the current result set.
    fn select(&mut self, id: &str) {
        let known = self
            .result
            .as_ref()
            .is_some_and(|r| r.candidates.iter().any(|c| c.id == id));
        if known {
            self.selected_id = Some(id.to_string());
            self.detail_scroll = 0;
        }
    }

    fn selected_position(&self) -> Option<usize> {
        let id = self.selected_id.as_deref()?;
        self.sorted_candidates().iter().position(|c| c.id == id)
    }

    fn select_offset(&mut self, delta: isize) {
        let sorted = self.sorted_candidates();
        if sorted.is_empty() {
            return;
        }
        let pos = self.selected_position().unwrap_or(0) as isize + delta;
        let pos = pos.clamp(0, sorted.len() as isize - 1) as usize;
        let id = sorted[pos].id.clone();
        self.select(&id);
    }

    fn start_review(&mut self, kind: ReviewKind) {
        let Some(result) = &self.result else { return };
        // Starting while a queue is open replaces it.
        match EmailQueue::start(&result.candidates, kind, &self.sent) {
            Some(queue) => self.queue = Some(queue),
            None => self.set_notice(kind.empty_notice()),
        }
    }

    fn queue_act(&mut self, decision: Decision, composer: &dyn MailComposer) {
        let Some(queue) = &mut self.queue else { return };
        match queue.act(decision, &mut self.sent, composer) {
            Ok(StepOutcome::Advanced) => {}
            Ok(StepOutcome::Completed) => {
                self.queue = None;
                self.set_notice("Batch processing complete!");
            }
            Err(e) => self.set_notice(e.to_string()),
        }
    }

    fn queue_edit_push(&mut self, c: char) {
        if let Some(queue) = &mut self.queue {
            let mut draft = queue.draft_email().to_string();
            draft.push(c);
            queue.edit_draft(draft);
        }
    }

    fn queue_edit_pop(&mut self) {
        if let Some(queue) = &mut self.queue {
            let mut draft = queue.draft_email().to_string();
            draft.pop();
            queue.edit_draft(draft);
        }
    }

    fn queue_confirm_cancel(&mut self) {
        // Sent marks from earlier steps are durable for the session.
        self.queue = None;
    }

    /// Sends the detail-pane draft for the selected candidate using their
    /// extracted address.
    fn send_selected(&mut self, composer: &dyn MailComposer) {
        let Some(candidate) = self.selected_candidate() else {
            return;
        };
        if candidate.email.trim().is_empty() {
            self.set_notice("No email extracted. Use batch review to enter one.");
            return;
        }
        let id = candidate.id.clone();
        match composer.compose(
            &candidate.email,
            &candidate.evaluation.email_subject,
            &candidate.evaluation.email_body,
        ) {
            Ok(()) => {
                self.sent.mark_sent(&id);
                self.set_notice("Opened mail client.");
            }
            Err(e) => self.set_notice(e.to_string()),
        }
    }

    fn set_notice(&mut self, msg: impl Into<String>) {
        self.notice = Some((msg.into(), Instant::now()));
    }

    /// Expires the transient notice after its 2-second window.
    fn tick(&mut self) {
        if let Some((_, since)) = &self.notice {
            if since.elapsed() >= NOTICE_TTL {
                self.notice = None;
            }
        }
    }
}

pub fn run_session(
    job: JobContext,
    files: Vec<ResumeFile>,
    provider: Box<dyn AnalysisProvider>,
) -> Result<()> {
    let job = Arc::new(job);
    let files = Arc::new(files);
    let provider: Arc<dyn AnalysisProvider> = Arc::from(provider);
    let mut state = AppState::new(files.len());
    let (tx, rx) = channel();

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut state, &job, &files, &provider, &tx, &rx);

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

fn spawn_analysis(
    generation: u64,
    job: Arc<JobContext>,
    files: Arc<Vec<ResumeFile>>,
    provider: Arc<dyn AnalysisProvider>,
    tx: Sender<AnalysisOutcome>,
) {
    thread::spawn(move || {
        let result = provider.analyze(&job, &files).map_err(|e| format!("{:#}", e));
        // The receiver may be gone if the session ended; nothing to do then.
        let _ = tx.send(AnalysisOutcome { generation, result });
    });
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut AppState,
    job: &Arc<JobContext>,
    files: &Arc<Vec<ResumeFile>>,
    provider: &Arc<dyn AnalysisProvider>,
    tx: &Sender<AnalysisOutcome>,
    rx: &Receiver<AnalysisOutcome>,
) -> Result<()> {
    let composer = SystemMailer;
    let mut list_state = ListState::default();

    loop {
        while let Ok(outcome) = rx.try_recv() {
            state.apply_outcome(outcome);
        }
        state.tick();

        list_state.select(state.selected_position());
        terminal.draw(|frame| draw(frame, state, job, &mut list_state))?;

        if !event::poll(Duration::from_millis(150))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        // The batch review modal captures all input while open.
        if state.queue.is_some() {
            let cancel_pending = state.queue.as_ref().is_some_and(|q| q.cancel_pending());
            if cancel_pending {
                match key.code {
                    KeyCode::Char('y') | KeyCode::Char('Y') => state.queue_confirm_cancel(),
                    KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                        if let Some(queue) = &mut state.queue {
                            queue.dismiss_cancel();
                        }
                    }
                    _ => {}
                }
                continue;
            }
            match key.code {
                KeyCode::Esc => {
                    if let Some(queue) = &mut state.queue {
                        queue.request_cancel();
                    }
                }
                KeyCode::Enter => state.queue_act(Decision::Send, &composer),
                KeyCode::Tab => state.queue_act(Decision::Skip, &composer),
                KeyCode::Backspace => state.queue_edit_pop(),
                KeyCode::Char(c) => state.queue_edit_push(c),
                _ => {}
            }
            continue;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => break,
            KeyCode::Char('a') => {
                if matches!(state.status, Status::Idle | Status::Error) {
                    if let Some(generation) = state.begin_analysis() {
                        spawn_analysis(
                            generation,
                            Arc::clone(job),
                            Arc::clone(files),
                            Arc::clone(provider),
                            tx.clone(),
                        );
                    }
                }
            }
            KeyCode::Char('n') => state.reset_session(),
            _ if state.status == Status::Complete => match key.code {
                KeyCode::Down | KeyCode::Char('j') => state.select_offset(1),
                KeyCode::Up | KeyCode::Char('k') => state.select_offset(-1),
                KeyCode::Char('J') | KeyCode::PageDown => {
                    state.detail_scroll = state.detail_scroll.saturating_add(3)
                }
                KeyCode::Char('K') | KeyCode::PageUp => {
                    state.detail_scroll = state.detail_scroll.saturating_sub(3)
                }
                KeyCode::Char('s') => state.start_review(ReviewKind::Shortlist),
                KeyCode::Char('r') => state.start_review(ReviewKind::Rejection),
                KeyCode::Char('m') => state.send_selected(&composer),
                KeyCode::Char('c') => {
                    if let Some(candidate) = state.selected_candidate() {
                        let body = candidate.evaluation.email_body.clone();
                        match mailer::copy_to_clipboard(&body) {
                            Ok(()) => state.set_notice("Copied email body"),
                            Err(e) => state.set_notice(e.to_string()),
                        }
                    }
                }
                KeyCode::Char('C') => {
                    if let Some(candidate) = state.selected_candidate() {
                        let subject = candidate.evaluation.email_subject.clone();
                        match mailer::copy_to_clipboard(&subject) {
                            Ok(()) => state.set_notice("Copied email subject"),
                            Err(e) => state.set_notice(e.to_string()),
                        }
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }
    Ok(())
}

fn draw(frame: &mut Frame, state: &AppState, job: &JobContext, list_state: &mut ListState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(frame.area());

    if state.status == Status::Complete && state.result.is_some() {
        draw_dashboard(frame, chunks[0], state, list_state);
    } else {
        draw_setup(frame, chunks[0], state, job);
    }

    let footer = match &state.notice {
        Some((msg, _)) => Paragraph::new(format!(" {}", msg)).style(Style::default().fg(Color::Yellow)),
        None => Paragraph::new(help_line(state)).style(Style::default().fg(Color::DarkGray)),
    };
    frame.render_widget(footer, chunks[1]);

    if state.queue.is_some() {
        draw_queue_modal(frame, state);
    }
}

fn help_line(state: &AppState) -> &'static str {
    if state.queue.is_some() {
        " type to edit recipient  Enter:send  Tab:skip  Esc:cancel"
    } else if state.status == Status::Complete {
        " j/k:navigate  J/K:scroll  s:review shortlisted  r:review rejected  m:mail  c/C:copy body/subject  n:new session  q:quit"
    } else {
        " a:run analysis  n:new session  q:quit"
    }
}

fn draw_setup(frame: &mut Frame, area: Rect, state: &AppState, job: &JobContext) {
    let mut lines: Vec<Line> = Vec::new();

    lines.push(Line::from(Span::styled(
        "shortlist - resume screening assistant",
        Style::default().add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(""));
    if !job.role_title.is_empty() {
        lines.push(Line::from(format!("Role:    {}", job.role_title)));
    }
    lines.push(Line::from(format!("Company: {}", job.company)));
    lines.push(Line::from(format!("Resumes: {} file(s)", state.file_count)));
    lines.push(Line::from(""));

    match state.status {
        Status::Idle => {
            lines.push(Line::from("Press 'a' to run the analysis."));
        }
        Status::Processing => {
            lines.push(Line::from(Span::styled(
                format!("Processing {} resumes...", state.file_count),
                Style::default().fg(Color::Cyan),
            )));
        }
        Status::Error => {
            if let Some(msg) = &state.error_msg {
                lines.push(Line::from(Span::styled(
                    format!("Error: {}", msg),
                    Style::default().fg(Color::Red),
                )));
                lines.push(Line::from(""));
                lines.push(Line::from("Press 'a' to retry from scratch."));
            }
        }
        Status::Complete => {}
    }

    let panel = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL).title(" Setup "))
        .wrap(Wrap { trim: false });
    frame.render_widget(panel, area);
}

fn draw_dashboard(frame: &mut Frame, area: Rect, state: &AppState, list_state: &mut ListState) {
    let Some(result) = &state.result else { return };

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    // Summary strip
    let metric_areas = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(25),
            Constraint::Percentage(25),
            Constraint::Percentage(25),
            Constraint::Percentage(25),
        ])
        .split(rows[0]);

    let metrics = [
        ("Processed", result.summary.processed_count.to_string(), Color::White),
        ("Shortlisted", result.summary.shortlisted_count.to_string(), Color::Green),
        ("Cutoff Score", format!("{}%", result.summary.recommended_cutoff), Color::Cyan),
        ("Duplicates Removed", result.summary.duplicate_count.to_string(), Color::Yellow),
    ];
    for (i, (label, value, color)) in metrics.iter().enumerate() {
        let metric = Paragraph::new(Span::styled(
            value.clone(),
            Style::default().fg(*color).add_modifier(Modifier::BOLD),
        ))
        .block(Block::default().borders(Borders::ALL).title(format!(" {} ", label)));
        frame.render_widget(metric, metric_areas[i]);
    }

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(rows[1]);

    // Left panel: candidate list, descending score
    let items: Vec<ListItem> = state
        .sorted_candidates()
        .iter()
        .map(|candidate| {
            let category_style = if candidate.category.is_rejection() {
                Style::default().fg(Color::Red)
            } else {
                Style::default().fg(Color::Green)
            };
            let sent_badge = if state.sent.has(&candidate.id) {
                " [sent]"
            } else {
                ""
            };
            let name = truncate(&candidate.name, 22);
            ListItem::new(Line::from(vec![
                Span::raw(format!("{:>3}% ", candidate.score)),
                Span::raw(format!("{:<22} ", name)),
                Span::styled(candidate.category.label().to_string(), category_style),
                Span::styled(sent_badge, Style::default().fg(Color::Green)),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(format!(
            " Candidates ({}) ",
            result.candidates.len()
        )))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, columns[0], list_state);

    // Right panel: candidate detail
    let detail = build_detail(state);
    let detail_widget = Paragraph::new(detail)
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false })
        .scroll((state.detail_scroll, 0));
    frame.render_widget(detail_widget, columns[1]);
}

fn build_detail<'a>(state: &'a AppState) -> Text<'a> {
    let Some(candidate) = state.selected_candidate() else {
        return Text::raw("Select a candidate to view details");
    };

    let mut lines: Vec<Line> = Vec::new();

    lines.push(Line::from(vec![
        Span::styled(
            &candidate.name,
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!("  {}%", candidate.score)),
    ]));
    lines.push(Line::from(format!(
        "{}  |  {}  |  id {}",
        candidate.category.label(),
        candidate.filename,
        candidate.id
    )));
    if candidate.email.is_empty() {
        lines.push(Line::from(Span::styled(
            "Email not extracted",
            Style::default().fg(Color::Yellow),
        )));
    } else {
        lines.push(Line::from(format!("Email: {}", candidate.email)));
    }
    if state.sent.has(&candidate.id) {
        lines.push(Line::from(Span::styled(
            "Email sent",
            Style::default().fg(Color::Green),
        )));
    }
    lines.push(Line::from(""));

    lines.push(section_header("SUMMARY"));
    for line in textwrap::fill(&candidate.evaluation.summary, 76).lines() {
        lines.push(Line::from(format!("  {}", line)));
    }
    lines.push(Line::from(""));

    if !candidate.evaluation.strengths.is_empty() {
        lines.push(section_header("KEY STRENGTHS"));
        for s in &candidate.evaluation.strengths {
            lines.push(Line::from(Span::styled(
                format!("  + {}", s),
                Style::default().fg(Color::Green),
            )));
        }
        lines.push(Line::from(""));
    }

    if !candidate.evaluation.gaps.is_empty() {
        lines.push(section_header("GAPS & RISKS"));
        for g in &candidate.evaluation.gaps {
            lines.push(Line::from(Span::styled(
                format!("  - {}", g),
                Style::default().fg(Color::Yellow),
            )));
        }
        lines.push(Line::from(""));
    }

    if !candidate.evaluation.red_flags.is_empty() {
        lines.push(section_header("RED FLAGS"));
        for r in &candidate.evaluation.red_flags {
            lines.push(Line::from(Span::styled(
                format!("  ! {}", r),
                Style::default().fg(Color::Red),
            )));
        }
        lines.push(Line::from(""));
    }

    lines.push(section_header("STARTUP FIT"));
    for line in textwrap::fill(&candidate.evaluation.startup_fit, 76).lines() {
        lines.push(Line::from(format!("  {}", line)));
    }
    lines.push(Line::from(""));

    if !candidate.evaluation.interview_questions.is_empty() {
        lines.push(section_header("INTERVIEW QUESTIONS"));
        for (i, q) in candidate.evaluation.interview_questions.iter().enumerate() {
            lines.push(Line::from(format!("  {}. {}", i + 1, q)));
        }
        lines.push(Line::from(""));
    }

    let draft_title = if candidate.category.is_rejection() {
        "REJECTION EMAIL DRAFT"
    } else {
        "SHORTLIST EMAIL DRAFT"
    };
    lines.push(section_header(draft_title));
    lines.push(Line::from(format!(
        "  Subject: {}",
        candidate.evaluation.email_subject
    )));
    lines.push(Line::from(""));
    for line in candidate.evaluation.email_body.lines() {
        for wrapped in textwrap::fill(line, 76).lines() {
            lines.push(Line::from(format!("  {}", wrapped)));
        }
    }

    Text::from(lines)
}

fn section_header(title: &str) -> Line<'static> {
    Line::from(Span::styled(
        title.to_string(),
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    ))
}

fn draw_queue_modal(frame: &mut Frame, state: &AppState) {
    let Some(queue) = &state.queue else { return };

    let area = centered_rect(70, 80, frame.area());
    frame.render_widget(Clear, area);

    let candidate = queue.current();
    let title = format!(
        " Review Email {} of {} - {} ",
        queue.cursor() + 1,
        queue.len(),
        queue.kind().label()
    );

    let mut lines: Vec<Line> = Vec::new();
    lines.push(Line::from(Span::styled(
        &candidate.name,
        Style::default().add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::styled("To: ", Style::default().fg(Color::Cyan)),
        Span::raw(queue.draft_email().to_string()),
        Span::styled("_", Style::default().add_modifier(Modifier::SLOW_BLINK)),
    ]));
    if queue.draft_email().is_empty() {
        lines.push(Line::from(Span::styled(
            "Email not found in resume. Please enter manually.",
            Style::default().fg(Color::Yellow),
        )));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::styled("Subject: ", Style::default().fg(Color::Cyan)),
        Span::raw(candidate.evaluation.email_subject.clone()),
    ]));
    lines.push(Line::from(""));
    for line in candidate.evaluation.email_body.lines() {
        for wrapped in textwrap::fill(line, area.width.saturating_sub(4) as usize).lines() {
            lines.push(Line::from(wrapped.to_string()));
        }
    }
    lines.push(Line::from(""));
    let send_label = if queue.is_last() {
        "Enter: send & finish"
    } else {
        "Enter: send & next"
    };
    lines.push(Line::from(Span::styled(
        format!("{}   Tab: skip   Esc: cancel", send_label),
        Style::default().fg(Color::DarkGray),
    )));

    let modal = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: false });
    frame.render_widget(modal, area);

    if queue.cancel_pending() {
        let confirm_area = centered_rect(50, 20, frame.area());
        frame.render_widget(Clear, confirm_area);
        let confirm = Paragraph::new(
            "Stop sending emails? Progress on sent emails is saved.\n\n(y) stop   (n) keep going",
        )
        .block(Block::default().borders(Borders::ALL).title(" Cancel batch "))
        .wrap(Wrap { trim: false });
        frame.render_widget(confirm, confirm_area);
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

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
