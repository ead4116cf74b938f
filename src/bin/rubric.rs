#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use rubric_harness::bank;
use rubric_harness::gateway::{
    CompletionGateway, CompletionModel, NoopUsageSink, ProviderGateway, StderrUsageSink,
    DEFAULT_MODEL,
};
use rubric_harness::grader::{save_session, GradeError, Grader, GraderConfig};
use rubric_harness::QuestionBank;

#[derive(Parser)]
#[command(name = "rubric", version, about = "LLM-judged grading harness")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade every discovered submission against a master assignment
    Grade {
        /// Path to the master assignment JSON
        #[arg(long)]
        assignment: PathBuf,

        /// Directory holding answers_*.json submission files
        #[arg(long, default_value = "result")]
        answers_dir: PathBuf,

        /// Output results JSON
        #[arg(long, default_value = "grading_results.json")]
        out: PathBuf,

        /// Model id for judgment calls
        #[arg(long, default_value = DEFAULT_MODEL)]
        model: String,

        /// Acceptance threshold on the aggregate success rate
        #[arg(long, default_value_t = 0.5)]
        threshold: f64,

        /// Number of students to grade concurrently
        #[arg(long, default_value_t = 1)]
        parallel: usize,

        /// Echo model output to stderr as it arrives
        #[arg(long)]
        stream: bool,

        /// Log each provider call to stderr as a JSON line
        #[arg(long)]
        log_usage: bool,
    },
    /// Validate the assignment and submissions without calling the model
    Check {
        /// Path to the master assignment JSON
        #[arg(long)]
        assignment: PathBuf,

        /// Directory holding answers_*.json submission files
        #[arg(long, default_value = "result")]
        answers_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Grade {
            assignment,
            answers_dir,
            out,
            model,
            threshold,
            parallel,
            stream,
            log_usage,
        } => {
            // The credential check happens here, before any files are read
            // or any grading begins.
            let gateway: Arc<dyn CompletionGateway> = if log_usage {
                Arc::new(ProviderGateway::from_env(Arc::new(StderrUsageSink))?)
            } else {
                Arc::new(ProviderGateway::from_env(Arc::new(NoopUsageSink))?)
            };

            let config = GraderConfig {
                model: CompletionModel::openai(model),
                threshold,
                parallel,
                stream,
            };

            let mut grader = Grader::new(gateway, config);
            grader.load_assignment(&assignment)?;

            for path in bank::discover_submissions(&answers_dir)? {
                let student_id = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default()
                    .to_string();
                match bank::load_submission(&path) {
                    Ok(submission) => grader.add_submission(student_id, submission),
                    Err(err) => {
                        eprintln!("[grade] skipping malformed submission {student_id}: {err}");
                    }
                }
            }

            let session = match grader.grade_all().await {
                Ok(session) => session,
                Err(GradeError::NoSubmissions) => {
                    eprintln!(
                        "[grade] no student answer files found in '{}'",
                        answers_dir.display()
                    );
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            };

            save_session(&session, &out)?;

            let outcomes: usize = session.values().map(|r| r.len()).sum();
            let accepted: usize = session
                .values()
                .flat_map(|r| r.values())
                .filter(|o| o.accepted(threshold))
                .count();
            eprintln!(
                "[grade] complete - {} students, {} outcomes, {} accepted (threshold {})",
                session.len(),
                outcomes,
                accepted,
                threshold
            );
        }
        Commands::Check {
            assignment,
            answers_dir,
        } => {
            let bank = QuestionBank::load(&assignment)?;
            println!("{} questions in {}", bank.len(), assignment.display());
            for (qid, q) in bank.iter() {
                let mode = if q.has_testcases() {
                    format!("consensus, {} test cases", q.testcases.len())
                } else {
                    "feedback".to_string()
                };
                println!("  {qid}: {} instruction(s), {mode}", q.instructions.len());
            }

            let mut problems = 0usize;
            let files = bank::discover_submissions(&answers_dir)?;
            if files.is_empty() {
                println!("no submission files in '{}'", answers_dir.display());
            }
            for path in files {
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default()
                    .to_string();
                let submission = match bank::load_submission(&path) {
                    Ok(s) => s,
                    Err(err) => {
                        println!("{name}: MALFORMED ({err})");
                        problems += 1;
                        continue;
                    }
                };
                for (qid, content) in &submission {
                    match bank.get(qid) {
                        None => {
                            println!("{name}: {qid} not in master assignment");
                            problems += 1;
                        }
                        Some(master) => {
                            if content.answers.len() < master.instructions.len() {
                                println!(
                                    "{name}: {qid} has {} answer(s) for {} instruction(s)",
                                    content.answers.len(),
                                    master.instructions.len()
                                );
                            }
                        }
                    }
                }
            }

            if problems > 0 {
                return Err(format!("{problems} problem(s) found").into());
            }
            println!("ok");
        }
    }

    Ok(())
}
