use anyhow::Result;
use crossterm::{
    ExecutableCommand,
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use std::io::stdout;

use ats::Tracker;
use ats::models::{Attachment, JobRecord, JobStatus, SkillRecord, SkillStatus, local_date};
use ats::store::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Jobs,
    Skills,
}

struct AppState {
    view: View,
    filter: Option<JobStatus>,
    jobs: Vec<JobRecord>,
    skills: Vec<SkillRecord>,
    job_selected: usize,
    skill_selected: usize,
    scroll_offset: u16,
    message: Option<String>,
}

fn filter_jobs(jobs: Vec<JobRecord>, filter: Option<JobStatus>) -> Vec<JobRecord> {
    jobs.into_iter()
        .filter(|j| filter.is_none_or(|s| j.status == s))
        .collect()
}

/// Index of `previous` in `items`, or the top. Always in range for non-empty
/// lists.
fn reselect<R: Record>(items: &[R], previous: Option<&str>) -> usize {
    previous
        .and_then(|id| items.iter().position(|r| r.id() == id))
        .unwrap_or(0)
        .min(items.len().saturating_sub(1))
}

impl AppState {
    fn new(jobs: Vec<JobRecord>, skills: Vec<SkillRecord>, filter: Option<JobStatus>) -> Self {
        let view = if jobs.is_empty() && !skills.is_empty() {
            View::Skills
        } else {
            View::Jobs
        };
        Self {
            view,
            filter,
            jobs: filter_jobs(jobs, filter),
            skills,
            job_selected: 0,
            skill_selected: 0,
            scroll_offset: 0,
            message: None,
        }
    }

    fn current_job(&self) -> Option<&JobRecord> {
        self.jobs.get(self.job_selected)
    }

    fn current_skill(&self) -> Option<&SkillRecord> {
        self.skills.get(self.skill_selected)
    }

    fn selected(&self) -> usize {
        match self.view {
            View::Jobs => self.job_selected,
            View::Skills => self.skill_selected,
        }
    }

    fn toggle_view(&mut self) {
        self.view = match self.view {
            View::Jobs => View::Skills,
            View::Skills => View::Jobs,
        };
        self.scroll_offset = 0;
    }

    fn next(&mut self) {
        let (selected, len) = match self.view {
            View::Jobs => (&mut self.job_selected, self.jobs.len()),
            View::Skills => (&mut self.skill_selected, self.skills.len()),
        };
        if *selected + 1 < len {
            *selected += 1;
            self.scroll_offset = 0;
        }
    }

    fn prev(&mut self) {
        let selected = match self.view {
            View::Jobs => &mut self.job_selected,
            View::Skills => &mut self.skill_selected,
        };
        if *selected > 0 {
            *selected -= 1;
            self.scroll_offset = 0;
        }
    }

    fn scroll_down(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_add(3);
    }

    fn scroll_up(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(3);
    }

    /// Replace both lists with what is stored, keeping each cursor on the
    /// same record when it still exists. The status filter stays applied.
    async fn reload(&mut self, tracker: &Tracker) {
        let current_job = self.current_job().map(|j| j.id.clone());
        match tracker.get_jobs().await {
            Ok(jobs) => {
                self.jobs = filter_jobs(jobs, self.filter);
                self.job_selected = reselect(&self.jobs, current_job.as_deref());
            }
            Err(e) => self.message = Some(format!("Reload failed: {}", e)),
        }

        let current_skill = self.current_skill().map(|s| s.id.clone());
        match tracker.get_skills().await {
            Ok(skills) => {
                self.skills = skills;
                self.skill_selected = reselect(&self.skills, current_skill.as_deref());
            }
            Err(e) => self.message = Some(format!("Reload failed: {}", e)),
        }
    }

    async fn cycle_status(&mut self, tracker: &Tracker) {
        match self.view {
            View::Jobs => self.cycle_job_status(tracker).await,
            View::Skills => self.cycle_skill_status(tracker).await,
        }
    }

    /// Show the new status immediately, then persist it. If the write fails
    /// the view is re-read from storage.
    async fn cycle_job_status(&mut self, tracker: &Tracker) {
        let Some(job) = self.jobs.get_mut(self.job_selected) else { return };
        job.status = job.status.next();
        let updated = job.clone();

        match tracker.save_job(updated.clone()).await {
            Ok(()) => {
                self.message = Some(format!(
                    "{} @ {} -> {}",
                    updated.position, updated.company, updated.status
                ));
            }
            Err(e) => {
                tracing::warn!(id = %updated.id, error = %e, "status update failed");
                self.reload(tracker).await;
                self.message = Some(format!("Save failed: {}", e));
            }
        }
    }

    async fn cycle_skill_status(&mut self, tracker: &Tracker) {
        let Some(skill) = self.skills.get_mut(self.skill_selected) else { return };
        skill.status = skill.status.next();
        let updated = skill.clone();

        match tracker.save_skill(updated.clone()).await {
            Ok(()) => self.message = Some(format!("{} -> {}", updated.name, updated.status)),
            Err(e) => {
                tracing::warn!(id = %updated.id, error = %e, "skill status update failed");
                self.reload(tracker).await;
                self.message = Some(format!("Save failed: {}", e));
            }
        }
    }

    async fn download(&mut self, tracker: &Tracker, cover_letter: bool) {
        if self.view != View::Jobs {
            return;
        }
        let Some(job) = self.current_job() else { return };
        let (label, attachment) = if cover_letter {
            ("cover letter", job.cover_letter_file.as_ref())
        } else {
            ("CV", job.cv_file.as_ref())
        };
        let message = match tracker.download_file(attachment).await {
            Ok(Some(path)) => format!("Saved {} to {}", label, path.display()),
            Ok(None) => format!("No {} attached", label),
            Err(e) => format!("Download failed: {}", e),
        };
        self.message = Some(message);
    }
}

pub async fn run_browse(tracker: &Tracker, status: Option<JobStatus>) -> Result<()> {
    let jobs = tracker.get_jobs().await?;
    let skills = tracker.get_skills().await?;
    let mut state = AppState::new(jobs, skills, status);
    if state.jobs.is_empty() && state.skills.is_empty() {
        println!("No jobs or skills found.");
        return Ok(());
    }

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut state, tracker).await;

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut AppState,
    tracker: &Tracker,
) -> Result<()> {
    let mut list_state = ListState::default();
    list_state.select(Some(state.selected()));

    loop {
        terminal.draw(|frame| draw(frame, state, &mut list_state))?;

        let event = tokio::task::spawn_blocking(event::read).await??;
        if let Event::Key(key) = event {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => break,
                KeyCode::Tab => state.toggle_view(),
                KeyCode::Down | KeyCode::Char('j') => state.next(),
                KeyCode::Up | KeyCode::Char('k') => state.prev(),
                KeyCode::Char('J') | KeyCode::PageDown => state.scroll_down(),
                KeyCode::Char('K') | KeyCode::PageUp => state.scroll_up(),
                KeyCode::Char('s') => state.cycle_status(tracker).await,
                KeyCode::Char('c') => state.download(tracker, false).await,
                KeyCode::Char('l') => state.download(tracker, true).await,
                KeyCode::Char('r') => {
                    state.reload(tracker).await;
                    state.message = Some("Reloaded".to_string());
                }
                _ => {}
            }
            list_state.select(Some(state.selected()));
        }
    }
    Ok(())
}

fn status_style(status: JobStatus) -> Style {
    match status {
        JobStatus::Applied => Style::default().fg(Color::Gray),
        JobStatus::PendingResponse => Style::default().fg(Color::Blue),
        JobStatus::InterviewScheduled => Style::default().fg(Color::Yellow),
        JobStatus::Rejected => Style::default().fg(Color::Red),
        JobStatus::Accepted => Style::default().fg(Color::Green),
    }
}

fn skill_status_style(status: SkillStatus) -> Style {
    match status {
        SkillStatus::YetToStart => Style::default().fg(Color::Gray),
        SkillStatus::Learning => Style::default().fg(Color::Blue),
        SkillStatus::Completed => Style::default().fg(Color::Green),
    }
}

fn draw(frame: &mut Frame, state: &AppState, list_state: &mut ListState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(frame.area());

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(35),
            Constraint::Percentage(65),
        ])
        .split(rows[0]);

    // Left panel: job or skill list
    let (items, title): (Vec<ListItem>, String) = match state.view {
        View::Jobs => (
            state
                .jobs
                .iter()
                .map(|job| {
                    ListItem::new(Line::from(vec![
                        Span::styled("● ", status_style(job.status)),
                        Span::raw(format!("{} | {}", truncate(&job.position, 30), job.company)),
                    ]))
                })
                .collect(),
            format!(" Applications ({}) ", state.jobs.len()),
        ),
        View::Skills => (
            state
                .skills
                .iter()
                .map(|skill| {
                    ListItem::new(Line::from(vec![
                        Span::styled("● ", skill_status_style(skill.status)),
                        Span::raw(truncate(&skill.name, 40)),
                    ]))
                })
                .collect(),
            format!(" Skills ({}) ", state.skills.len()),
        ),
    };

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, chunks[0], list_state);

    // Right panel: detail
    let detail = match state.view {
        View::Jobs => build_detail(state),
        View::Skills => build_skill_detail(state),
    };
    let detail_widget = Paragraph::new(detail)
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false })
        .scroll((state.scroll_offset, 0));

    frame.render_widget(detail_widget, chunks[1]);

    // Footer: last action result, or help
    let help = match state.view {
        View::Jobs => {
            " Tab:skills  j/k:navigate  J/K:scroll  s:next status  c:save CV  \
             l:save cover letter  r:reload  q:quit"
        }
        View::Skills => " Tab:jobs  j/k:navigate  s:next status  r:reload  q:quit",
    };
    let footer = match &state.message {
        Some(msg) => Paragraph::new(format!(" {}", msg)).style(Style::default().fg(Color::Cyan)),
        None => Paragraph::new(help).style(Style::default().fg(Color::DarkGray)),
    };
    frame.render_widget(footer, rows[1]);
}

fn field<'a>(label: &str, value: Option<&str>) -> Option<Line<'a>> {
    let value = value.filter(|v| !v.trim().is_empty())?;
    Some(Line::from(format!("{}: {}", label, value)))
}

fn attachment_label(attachment: Option<&Attachment>) -> String {
    match attachment {
        Some(Attachment { name, data: Some(data) }) => format!("{} ({} bytes)", name, data.len()),
        Some(Attachment { name, data: None }) => format!("{} (unavailable)", name),
        None => "-".to_string(),
    }
}

fn build_skill_detail<'a>(state: &'a AppState) -> Text<'a> {
    let Some(skill) = state.current_skill() else {
        return Text::raw("No skills yet");
    };
    Text::from(vec![
        Line::from(Span::styled(
            &skill.name,
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            format!("Status: {}", skill.status),
            skill_status_style(skill.status),
        )),
        Line::from(format!(
            "Added: {}",
            local_date(skill.created_at).format("%Y-%m-%d")
        )),
    ])
}

fn build_detail<'a>(state: &'a AppState) -> Text<'a> {
    let Some(job) = state.current_job() else {
        return Text::raw("No job selected");
    };

    let mut lines: Vec<Line> = Vec::new();

    // Header
    lines.push(Line::from(Span::styled(
        &job.position,
        Style::default().add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(format!("at {}", job.company)));
    lines.push(Line::from(Span::styled(
        format!("Status: {}", job.status),
        status_style(job.status),
    )));
    lines.push(Line::from(format!(
        "Applied On: {}",
        local_date(job.created_at).format("%Y-%m-%d")
    )));

    lines.extend(
        [
            field("Method", job.method.as_deref()),
            field("Location", job.location.as_deref()),
            field("Country", job.country.as_deref()),
            field("HR Contact", job.hr_contact.as_deref()),
            field("URL", job.job_url.as_deref()),
        ]
        .into_iter()
        .flatten(),
    );

    if job.shows_interview_details() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "Interview",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        let date = job.interview_date.map(|d| d.format("%Y-%m-%d").to_string());
        lines.extend(
            [
                field("  Date", date.as_deref()),
                field("  Time", job.interview_time.as_deref()),
                field("  Round", job.interview_round.as_deref()),
            ]
            .into_iter()
            .flatten(),
        );
    }

    lines.push(Line::from(""));
    lines.push(Line::from(format!("CV: {}", attachment_label(job.cv_file.as_ref()))));
    lines.push(Line::from(format!(
        "Cover Letter: {}",
        attachment_label(job.cover_letter_file.as_ref())
    )));

    if let Some(remarks) = job.remarks.as_deref().filter(|r| !r.trim().is_empty()) {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "Remarks",
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for line in textwrap::fill(remarks, 70).lines() {
            lines.push(Line::from(format!("  {}", line)));
        }
    }

    Text::from(lines)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
