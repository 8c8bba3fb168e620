mod tui;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use ats::attachment;
use ats::config::Config;
use ats::logging::init_logging;
use ats::models::{Attachment, JobRecord, JobStatus, SkillRecord, SkillStatus, local_date};
use ats::{Database, Tracker};

const DEFAULT_METHOD: &str = "LinkedIn";

#[derive(Parser)]
#[command(name = "ats")]
#[command(about = "Track job applications and the skills you are learning")]
struct Cli {
    /// Database file (default: platform data dir, or $ATS_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Where downloaded attachments are saved (default: Downloads, or $ATS_DOWNLOAD_DIR)
    #[arg(long, global = true)]
    download_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize storage
    Init,

    /// Record a new application
    Add {
        /// Position applied for
        #[arg(short, long)]
        position: String,

        /// Company name
        #[arg(short, long)]
        company: String,

        #[command(flatten)]
        details: JobDetails,
    },

    /// Change fields of an existing application
    Edit {
        /// Job ID (or unique prefix)
        id: String,

        #[arg(short, long)]
        position: Option<String>,

        #[arg(short, long)]
        company: Option<String>,

        #[command(flatten)]
        details: JobDetails,
    },

    /// List applications, newest first
    List {
        /// Filter by status
        #[arg(short, long)]
        status: Option<JobStatus>,
    },

    /// Show application details
    Show {
        /// Job ID (or unique prefix)
        id: String,
    },

    /// Set the status of an application
    Status {
        /// Job ID (or unique prefix)
        id: String,

        /// Applied, "Pending Response", "Interview Scheduled", Rejected, Accepted
        status: JobStatus,
    },

    /// Delete an application
    Delete {
        /// Job ID (or unique prefix)
        id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Save an application's CV or cover letter to disk
    Download {
        /// Job ID (or unique prefix)
        id: String,

        /// Download the cover letter instead of the CV
        #[arg(long)]
        cover_letter: bool,

        /// Target directory (overrides --download-dir)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Manage skills to learn
    Skill {
        #[command(subcommand)]
        command: SkillCommands,
    },

    /// Browse applications interactively
    Browse {
        /// Filter by status
        #[arg(short, long)]
        status: Option<JobStatus>,
    },
}

#[derive(Args, Default)]
struct JobDetails {
    /// How you applied (LinkedIn, Referral, ...)
    #[arg(short, long)]
    method: Option<String>,

    /// Application status
    #[arg(short, long)]
    status: Option<JobStatus>,

    #[arg(long)]
    country: Option<String>,

    /// HR contact name or email
    #[arg(long)]
    hr_contact: Option<String>,

    #[arg(short, long)]
    location: Option<String>,

    /// Job posting URL
    #[arg(short, long)]
    url: Option<String>,

    #[arg(short, long)]
    remarks: Option<String>,

    /// Date applied (YYYY-MM-DD)
    #[arg(short, long)]
    applied: Option<NaiveDate>,

    /// Interview date (YYYY-MM-DD)
    #[arg(long)]
    interview_date: Option<NaiveDate>,

    /// Interview time (HH:MM)
    #[arg(long)]
    interview_time: Option<String>,

    /// Interview round (e.g. "Technical 1")
    #[arg(long)]
    interview_round: Option<String>,

    /// CV file to attach
    #[arg(long)]
    cv: Option<PathBuf>,

    /// Cover letter file to attach
    #[arg(long)]
    cover_letter: Option<PathBuf>,
}

#[derive(Subcommand)]
enum SkillCommands {
    /// Add a skill to learn
    Add {
        /// Skill name
        name: String,
    },

    /// List skills
    List,

    /// Set a skill's status
    Status {
        /// Skill ID (or unique prefix)
        id: String,

        /// "Yet to start", Learning, Completed
        status: SkillStatus,
    },

    /// Delete a skill
    Delete {
        /// Skill ID (or unique prefix)
        id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Empty or whitespace-only text means "not set".
fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn require(value: &str, field: &str) -> Result<String> {
    non_empty(value.to_string()).ok_or_else(|| anyhow!("{} is required", field))
}

async fn load_attachment(path: Option<PathBuf>) -> Result<Option<Attachment>> {
    match path {
        Some(path) => {
            let attachment = attachment::attach(&path)
                .await
                .context("Failed to attach file")?;
            Ok(Some(attachment))
        }
        None => Ok(None),
    }
}

/// Copy the given fields onto `job`. Fields not given are left as they are;
/// attachments are only replaced when a new file is supplied.
async fn apply_details(job: &mut JobRecord, details: JobDetails) -> Result<()> {
    if let Some(method) = details.method {
        job.method = non_empty(method);
    }
    if let Some(status) = details.status {
        job.status = status;
    }
    if let Some(country) = details.country {
        job.country = non_empty(country);
    }
    if let Some(hr_contact) = details.hr_contact {
        job.hr_contact = non_empty(hr_contact);
    }
    if let Some(location) = details.location {
        job.location = non_empty(location);
    }
    if let Some(url) = details.url {
        job.job_url = non_empty(url);
    }
    if let Some(remarks) = details.remarks {
        job.remarks = non_empty(remarks);
    }
    if let Some(applied) = details.applied {
        job.set_applied_date(Some(applied));
    }
    if let Some(date) = details.interview_date {
        job.interview_date = Some(date);
    }
    if let Some(time) = details.interview_time {
        job.interview_time = non_empty(time);
    }
    if let Some(round) = details.interview_round {
        job.interview_round = non_empty(round);
    }
    if let Some(cv) = load_attachment(details.cv).await? {
        job.cv_file = Some(cv);
    }
    if let Some(cover_letter) = load_attachment(details.cover_letter).await? {
        job.cover_letter_file = Some(cover_letter);
    }
    Ok(())
}

/// Apply an edit to a stored job. `createdAt` is always re-derived from the
/// applied date: the new one if given, else the stored one, else the day the
/// job was created.
async fn edit_job(
    job: &mut JobRecord,
    position: Option<String>,
    company: Option<String>,
    details: JobDetails,
) -> Result<()> {
    if let Some(position) = position {
        job.position = require(&position, "Position")?;
    }
    if let Some(company) = company {
        job.company = require(&company, "Company")?;
    }
    let applied = details
        .applied
        .or(job.applied_date)
        .unwrap_or_else(|| local_date(job.created_at));
    apply_details(job, details).await?;
    job.set_applied_date(Some(applied));
    Ok(())
}

/// Resolve a full id or unique id prefix against `ids`.
fn resolve_id<'a>(ids: impl Iterator<Item = &'a str>, wanted: &str, kind: &str) -> Result<String> {
    let matches: Vec<&str> = ids.filter(|id| id.starts_with(wanted)).collect();
    if let Some(exact) = matches.iter().find(|id| **id == wanted) {
        return Ok(exact.to_string());
    }
    match matches.as_slice() {
        [] => bail!("{} '{}' not found", kind, wanted),
        [only] => Ok(only.to_string()),
        _ => bail!("{} id '{}' is ambiguous ({} matches)", kind, wanted, matches.len()),
    }
}

async fn find_job(tracker: &Tracker, id: &str) -> Result<JobRecord> {
    let jobs = tracker.get_jobs().await?;
    let id = resolve_id(jobs.iter().map(|j| j.id.as_str()), id, "Job")?;
    jobs.into_iter()
        .find(|j| j.id == id)
        .ok_or_else(|| anyhow!("Job '{}' not found", id))
}

async fn find_skill(tracker: &Tracker, id: &str) -> Result<SkillRecord> {
    let skills = tracker.get_skills().await?;
    let id = resolve_id(skills.iter().map(|s| s.id.as_str()), id, "Skill")?;
    skills
        .into_iter()
        .find(|s| s.id == id)
        .ok_or_else(|| anyhow!("Skill '{}' not found", id))
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn print_job(job: &JobRecord) {
    println!("Job {}", job.id);
    println!("Position: {}", job.position);
    println!("Company: {}", job.company);
    println!("Status: {}", job.status);
    println!("Applied On: {}", local_date(job.created_at).format("%Y-%m-%d"));
    let optional = [
        ("Method", &job.method),
        ("Location", &job.location),
        ("Country", &job.country),
        ("HR Contact", &job.hr_contact),
        ("URL", &job.job_url),
    ];
    for (label, value) in optional {
        if let Some(value) = value {
            println!("{}: {}", label, value);
        }
    }
    if job.shows_interview_details() {
        println!("\n--- Interview ---");
        if let Some(date) = job.interview_date {
            println!("Date: {}", date.format("%Y-%m-%d"));
        }
        if let Some(time) = &job.interview_time {
            println!("Time: {}", time);
        }
        if let Some(round) = &job.interview_round {
            println!("Round: {}", round);
        }
    }
    for (label, attachment) in [("CV", &job.cv_file), ("Cover Letter", &job.cover_letter_file)] {
        match attachment {
            Some(Attachment { name, data: Some(data) }) => {
                println!("{}: {} ({} bytes)", label, name, data.len())
            }
            Some(Attachment { name, data: None }) => println!("{}: {} (unavailable)", label, name),
            None => {}
        }
    }
    if let Some(remarks) = &job.remarks {
        println!("\n--- Remarks ---\n{}", remarks);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::resolve(cli.db, cli.download_dir);
    init_logging(&config.log_filter);

    let db = Database::open(&config.db_path)
        .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?;
    let tracker = Tracker::new(Arc::new(db), config.download_dir.clone());

    match cli.command {
        Commands::Init => {
            tracker.init_storage().await?;
            println!("Storage initialized at {}", config.db_path.display());
        }

        Commands::Add {
            position,
            company,
            details,
        } => {
            let position = require(&position, "Position")?;
            let company = require(&company, "Company")?;
            let mut job = JobRecord::new(position, company);
            job.method = Some(DEFAULT_METHOD.to_string());
            job.set_applied_date(Some(Local::now().date_naive()));
            apply_details(&mut job, details).await?;

            let id = job.id.clone();
            tracker.save_job(job).await.context("Failed to save job")?;
            println!("Added job {}", id);
        }

        Commands::Edit {
            id,
            position,
            company,
            details,
        } => {
            let mut job = find_job(&tracker, &id).await?;
            edit_job(&mut job, position, company, details).await?;

            let id = job.id.clone();
            tracker.save_job(job).await.context("Failed to save job")?;
            println!("Updated job {}", id);
        }

        Commands::List { status } => {
            let jobs: Vec<JobRecord> = tracker
                .get_jobs()
                .await?
                .into_iter()
                .filter(|j| status.is_none_or(|s| j.status == s))
                .collect();
            if jobs.is_empty() {
                println!("No jobs found.");
            } else {
                println!(
                    "{:<9} {:<20} {:<28} {:<20} {:<10}",
                    "ID", "STATUS", "POSITION", "COMPANY", "APPLIED"
                );
                println!("{}", "-".repeat(91));
                for job in jobs {
                    println!(
                        "{:<9} {:<20} {:<28} {:<20} {:<10}",
                        short_id(&job.id),
                        job.status,
                        truncate(&job.position, 26),
                        truncate(&job.company, 18),
                        local_date(job.created_at).format("%Y-%m-%d")
                    );
                }
            }
        }

        Commands::Show { id } => {
            let job = find_job(&tracker, &id).await?;
            print_job(&job);
        }

        Commands::Status { id, status } => {
            let mut job = find_job(&tracker, &id).await?;
            job.status = status;
            let (position, company) = (job.position.clone(), job.company.clone());
            tracker.save_job(job).await.context("Failed to save job")?;
            println!("Marked '{}' at {} as {}.", position, company, status);
        }

        Commands::Delete { id, yes } => {
            let job = find_job(&tracker, &id).await?;
            let prompt = format!(
                "Permanently delete the application for '{}' at {}?",
                job.position, job.company
            );
            if !yes && !confirm(&prompt)? {
                println!("Kept.");
                return Ok(());
            }
            tracker.delete_job(&job.id).await.context("Failed to delete job")?;
            println!("Deleted job {}", job.id);
        }

        Commands::Download {
            id,
            cover_letter,
            out,
        } => {
            let job = find_job(&tracker, &id).await?;
            let (label, file) = if cover_letter {
                ("cover letter", job.cover_letter_file.as_ref())
            } else {
                ("CV", job.cv_file.as_ref())
            };
            let saved = match out {
                Some(dir) => attachment::download_file(file, &dir).await?,
                None => tracker.download_file(file).await?,
            };
            match saved {
                Some(path) => println!("Saved {} to {}", label, path.display()),
                None => println!("No {} attached to job {}.", label, short_id(&job.id)),
            }
        }

        Commands::Skill { command } => match command {
            SkillCommands::Add { name } => {
                let skill = SkillRecord::new(require(&name, "Skill name")?);
                let id = skill.id.clone();
                tracker.save_skill(skill).await.context("Failed to save skill")?;
                println!("Added skill {}", id);
            }

            SkillCommands::List => {
                let skills = tracker.get_skills().await?;
                if skills.is_empty() {
                    println!("No skills yet.");
                } else {
                    println!("{:<9} {:<14} {:<30} {:<10}", "ID", "STATUS", "NAME", "ADDED");
                    println!("{}", "-".repeat(66));
                    for skill in skills {
                        println!(
                            "{:<9} {:<14} {:<30} {:<10}",
                            short_id(&skill.id),
                            skill.status,
                            truncate(&skill.name, 28),
                            local_date(skill.created_at).format("%Y-%m-%d")
                        );
                    }
                }
            }

            SkillCommands::Status { id, status } => {
                let mut skill = find_skill(&tracker, &id).await?;
                skill.status = status;
                let name = skill.name.clone();
                tracker.save_skill(skill).await.context("Failed to save skill")?;
                println!("Marked '{}' as {}.", name, status);
            }

            SkillCommands::Delete { id, yes } => {
                let skill = find_skill(&tracker, &id).await?;
                if !yes && !confirm(&format!("Delete skill '{}'?", skill.name))? {
                    println!("Kept.");
                    return Ok(());
                }
                tracker.delete_skill(&skill.id).await.context("Failed to delete skill")?;
                println!("Deleted skill '{}'", skill.name);
            }
        },

        Commands::Browse { status } => {
            tui::run_browse(&tracker, status).await?;
        }
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
