mod ai;
mod mailer;
mod models;
mod queue;
mod tui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ai::ResumeFile;
use models::JobContext;

#[derive(Parser)]
#[command(name = "shortlist")]
#[command(about = "Resume screening assistant - analyze, rank, and email candidates")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze resumes against a job description and open the dashboard
    Analyze {
        /// Role title, e.g. "Senior Backend Engineer"
        #[arg(short, long, default_value = "")]
        role: String,

        /// Path to a file containing the job description
        #[arg(short, long)]
        description: PathBuf,

        /// Path to a file with startup context (stage, industry, team size)
        #[arg(short, long)]
        context: Option<PathBuf>,

        /// Company name used in the drafted outreach emails
        #[arg(long, default_value = "our company")]
        company: String,

        /// Model to use (flash, pro, flash-lite)
        #[arg(short, long, default_value = "flash")]
        model: String,

        /// Resume files (pdf, txt, md)
        files: Vec<PathBuf>,
    },

    /// List selectable analysis models
    Models,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            role,
            description,
            context,
            company,
            model,
            files,
        } => {
            let description_text = std::fs::read_to_string(&description).with_context(|| {
                format!("Failed to read job description: {}", description.display())
            })?;
            let startup_context = match &context {
                Some(path) => std::fs::read_to_string(path).with_context(|| {
                    format!("Failed to read startup context: {}", path.display())
                })?,
                None => String::new(),
            };

            let job = JobContext {
                role_title: role,
                description: description_text,
                startup_context,
                company,
            };

            let resumes = files
                .iter()
                .map(|p| ResumeFile::load(p))
                .collect::<Result<Vec<_>>>()?;

            // Local validation before anything touches the network.
            ai::validate_inputs(&job, &resumes)?;

            let spec = ai::resolve_model(&model)?;
            let provider = ai::create_provider(&spec)?;

            tui::run_session(job, resumes, provider)?;
        }

        Commands::Models => {
            println!("{:<12} {}", "NAME", "MODEL ID");
            println!("{}", "-".repeat(36));
            for name in ["flash", "pro", "flash-lite"] {
                let spec = ai::resolve_model(name)?;
                println!("{:<12} {}", spec.short_name, spec.model_id);
            }
        }
    }

    Ok(())
}
