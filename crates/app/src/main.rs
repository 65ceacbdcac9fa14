mod config;
mod db;
mod terminal;

use std::fs::OpenOptions;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quiz_core::model::{Learner, Role, has_role};
use services::{
    AnonymousSession, AppServices, Clock, Identity, PresentedQuestion, QuizStep, SubmitOutcome,
    SubmitRequest, Terminal,
};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::writer::MakeWriterExt;

use crate::config::{QuizConfig, load_config_from};
use crate::db::{normalize_sqlite_url, prepare_sqlite_file};
use crate::terminal::{Console, Reply, parse_reply, render_question};

#[derive(Parser)]
#[command(
    name = "quizbank",
    version,
    about = "Acquire a multiple-choice question bank and practice it"
)]
struct Cli {
    /// Path to the configuration file (default: quizbank.toml if present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every page of the configured source and store the questions.
    Acquire {
        /// Skip the `confirm_update` prompt.
        #[arg(long)]
        yes: bool,
    },

    /// List stored questions.
    Questions {
        #[arg(long, default_value = "1")]
        page: u32,
    },

    /// Answer questions in order. Without --user progress lives only in this run.
    Quiz {
        #[arg(long)]
        user: Option<String>,
    },

    /// Retry missed questions until none are left.
    Practice {
        #[arg(long)]
        user: String,
    },

    /// Show missed questions, most recent first.
    Review {
        #[arg(long)]
        user: String,
    },

    /// Move a learner's position to question N.
    Reset {
        #[arg(long)]
        user: String,
        #[arg(long)]
        to: u32,
    },

    /// List learners and their roles.
    Users,

    /// Change a learner's role. Only the superadmin may do this.
    SetRole {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        role: Role,
    },
}

struct App {
    config: QuizConfig,
    services: AppServices,
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config_from(cli.config.as_deref())?;

    init_logging(&config)?;

    let db_url = normalize_sqlite_url(&config.database_url);
    prepare_sqlite_file(&db_url)?;
    let services =
        AppServices::new_sqlite(&db_url, Clock::System, &config.superadmin, config.clear_database)
            .await
            .with_context(|| format!("failed to open {db_url}"))?;
    tracing::debug!(%db_url, "database ready");
    let app = App { config, services };

    let stdin = std::io::stdin();
    let mut term = Console::new(stdin.lock(), std::io::stdout());

    match cli.command {
        Commands::Acquire { yes } => app.acquire(&mut term, yes).await,
        Commands::Questions { page } => app.list_questions(page).await,
        Commands::Quiz { user } => app.quiz(&mut term, user.as_deref()).await,
        Commands::Practice { user } => app.practice(&mut term, &user).await,
        Commands::Review { user } => app.review(&user).await,
        Commands::Reset { user, to } => app.reset(&user, to).await,
        Commands::Users => app.users().await,
        Commands::SetRole { actor, user, role } => app.set_role(&actor, &user, role).await,
    }
}

/// stderr always, plus `logging.directory/logging.file` in append mode when configured.
fn init_logging(config: &QuizConfig) -> Result<()> {
    let default_level: Directive = config
        .logging
        .level
        .parse()
        .with_context(|| format!("invalid logging.level {:?}", config.logging.level))?;
    let filter = EnvFilter::from_default_env().add_directive(default_level);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match config.log_file() {
        Some(path) => {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            builder
                .with_writer(std::io::stderr.and(Mutex::new(file)))
                .with_ansi(false)
                .init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

impl App {
    async fn acquire<R: BufRead, W: Write>(
        &self,
        term: &mut Console<R, W>,
        assume_yes: bool,
    ) -> Result<()> {
        let settings = self.config.acquisition()?;
        if self.config.confirm_update {
            let prompt = format!("refresh the question bank from {}?", settings.fetcher.base_url);
            if !term.confirm(&prompt, assume_yes)? {
                term.say("acquisition cancelled")?;
                return Ok(());
            }
        }
        let report = self
            .services
            .http_ingest(settings)?
            .acquire_and_ingest()
            .await;
        term.say(&format!(
            "fetched {} questions, stored {}, skipped {}",
            report.fetched, report.ingested, report.skipped
        ))
    }

    async fn list_questions(&self, page: u32) -> Result<()> {
        let store = self.services.store();
        let total = store.count().await?;
        let questions = store.list(page, self.config.questions.per_page).await?;
        if questions.is_empty() {
            println!("no questions on page {page} ({total} stored)");
            return Ok(());
        }
        for q in &questions {
            println!("#{:<5} {}  [{}]", q.number(), q.title(), q.answer());
        }
        println!("page {page}, {total} questions stored");
        Ok(())
    }

    async fn learner(&self, handle: &str) -> Result<Learner> {
        Ok(self.services.identity().resolve(handle).await?)
    }

    async fn quiz<R: BufRead, W: Write>(
        &self,
        term: &mut Console<R, W>,
        user: Option<&str>,
    ) -> Result<()> {
        let mut identity = match user {
            Some(handle) => Identity::Registered(self.learner(handle).await?),
            None => {
                term.say("answering anonymously; type `login <name>` to keep your progress")?;
                Identity::Anonymous(AnonymousSession::new())
            }
        };
        let quiz = self.services.quiz();

        loop {
            let question = match quiz.current_question(&identity, None).await? {
                QuizStep::Question(q) => q,
                QuizStep::Finished { total } => {
                    term.say(&format!("all {total} questions answered"))?;
                    return Ok(());
                }
                QuizStep::EmptyBank => {
                    if self.may_acquire(&identity) {
                        term.say("question bank is empty, acquiring")?;
                        self.acquire(term, false).await?;
                        if self.services.store().count().await? > 0 {
                            continue;
                        }
                    }
                    term.say("question bank is empty; run `quizbank acquire` first")?;
                    return Ok(());
                }
                QuizStep::Missing { number } => match quiz.skip_gap(&identity, number).await? {
                    Some(next) => {
                        term.say(&format!("question {number} is missing, skipping to {next}"))?;
                        continue;
                    }
                    None => {
                        term.say(&format!("question {number} is missing"))?;
                        return Ok(());
                    }
                },
            };

            term.say(&render_question(&question))?;
            let Some(choice) = read_choice(term, &question, &mut identity, self).await? else {
                return Ok(());
            };
            let outcome = quiz
                .submit(
                    &identity,
                    SubmitRequest {
                        question_id: question.id,
                        chosen_option_index: choice,
                        current_number: Some(question.number),
                        practice_mode: false,
                    },
                )
                .await?;
            announce(term, &outcome)?;
            if outcome.terminal == Some(Terminal::BankComplete) {
                term.say("that was the last question")?;
                return Ok(());
            }
        }
    }

    fn may_acquire(&self, identity: &Identity) -> bool {
        let admin = matches!(identity, Identity::Registered(l) if has_role(l, Role::Admin));
        admin && self.config.scraper.base_url.is_some()
    }

    async fn practice<R: BufRead, W: Write>(
        &self,
        term: &mut Console<R, W>,
        user: &str,
    ) -> Result<()> {
        let mut identity = Identity::Registered(self.learner(user).await?);
        let quiz = self.services.quiz();
        let Some(mut question) = quiz.practice_start(&identity, None).await? else {
            term.say("no missed questions to practice")?;
            return Ok(());
        };

        loop {
            term.say(&render_question(&question))?;
            let Some(choice) = read_choice(term, &question, &mut identity, self).await? else {
                return Ok(());
            };
            let outcome = quiz
                .submit(
                    &identity,
                    SubmitRequest {
                        question_id: question.id,
                        chosen_option_index: choice,
                        current_number: Some(question.number),
                        practice_mode: true,
                    },
                )
                .await?;
            announce(term, &outcome)?;
            if outcome.terminal == Some(Terminal::PracticeComplete) {
                term.say("every missed question is cleared")?;
                return Ok(());
            }
            let next = match outcome.next_number {
                Some(number) => quiz.practice_question(&identity, number).await?,
                None => None,
            };
            match next {
                Some(q) => question = q,
                None => return Ok(()),
            }
        }
    }

    async fn review(&self, user: &str) -> Result<()> {
        let identity = Identity::Registered(self.learner(user).await?);
        let misses = self.services.quiz().review(&identity).await?;
        if misses.is_empty() {
            println!("{user} has no missed questions");
            return Ok(());
        }
        for miss in &misses {
            println!(
                "#{:<5} missed {}x, last {}  {}",
                miss.number(),
                miss.wrong_count,
                miss.last_review_time.format("%Y-%m-%d %H:%M"),
                miss.question.title()
            );
            println!("       answer: {}", miss.question.answer());
        }
        Ok(())
    }

    async fn reset(&self, user: &str, to: u32) -> Result<()> {
        let identity = Identity::Registered(self.learner(user).await?);
        let progress = self.services.quiz().reset_progress(&identity, to).await?;
        println!("{user} now continues at question {}", progress.current());
        Ok(())
    }

    async fn users(&self) -> Result<()> {
        for learner in self.services.identity().list_learners().await? {
            println!(
                "{:<20} {:<10} since {}",
                learner.handle(),
                learner.role(),
                learner.created_at().format("%Y-%m-%d")
            );
        }
        Ok(())
    }

    async fn set_role(&self, actor: &str, user: &str, role: Role) -> Result<()> {
        let identity = self.services.identity();
        let actor = identity
            .find(actor)
            .await?
            .with_context(|| format!("unknown learner {actor:?}"))?;
        let target = identity
            .find(user)
            .await?
            .with_context(|| format!("unknown learner {user:?}"))?;
        let updated = identity.set_role(&actor, target.id(), role).await?;
        println!("{} is now {}", updated.handle(), updated.role());
        Ok(())
    }
}

/// Prompt until a valid option is picked. `None` when the learner quits.
///
/// `login <name>` migrates an anonymous session in place and asks again.
async fn read_choice<R: BufRead, W: Write>(
    term: &mut Console<R, W>,
    question: &PresentedQuestion,
    identity: &mut Identity,
    app: &App,
) -> Result<Option<usize>> {
    loop {
        let Some(line) = term.ask("answer> ")? else {
            return Ok(None);
        };
        match parse_reply(&line, question.options.len()) {
            Reply::Choice(shown) => return Ok(question.stored_index(shown)),
            Reply::Quit => return Ok(None),
            Reply::Login(handle) => match identity {
                Identity::Anonymous(session) => {
                    let learner = app.services.identity().login(&handle, session).await?;
                    term.say(&format!("signed in as {}", learner.handle()))?;
                    *identity = Identity::Registered(learner);
                }
                Identity::Registered(learner) => {
                    term.say(&format!("already signed in as {}", learner.handle()))?;
                }
            },
            Reply::Unrecognized => term.say("pick one of the listed options, or q to stop")?,
        }
    }
}

fn announce<R: BufRead, W: Write>(
    term: &mut Console<R, W>,
    outcome: &SubmitOutcome,
) -> Result<()> {
    if outcome.correct {
        term.say("correct")
    } else {
        term.say(&format!("wrong, the answer is: {}", outcome.canonical_answer))
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(2);
    }
}
