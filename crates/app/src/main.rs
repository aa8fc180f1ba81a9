use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use quiz_core::model::{Complexity, ConfigPatch, OptionId, SessionState, SessionStatus, SubjectId};
use quiz_core::scoring::{self, AnswerOutcome};
use quiz_core::time::{format_countdown, format_countdown_detailed};
use services::{AssessmentSession, BankQuestionProvider, Clock, QuestionMarker, SessionError};
use storage::repository::{SessionSlot, Storage};
use storage::sample;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::{EnvFilter, fmt as log_fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidSubject { raw: String },
    InvalidCount { raw: String },
    InvalidComplexity { raw: String },
    InvalidDuration { raw: String },
    InvalidSlot { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidSubject { raw } => write!(f, "invalid --subject value: {raw}"),
            ArgsError::InvalidCount { raw } => write!(f, "invalid --count value: {raw}"),
            ArgsError::InvalidComplexity { raw } => {
                write!(
                    f,
                    "invalid --complexity value (expected novice, intermediate or advanced): {raw}"
                )
            }
            ArgsError::InvalidDuration { raw } => write!(f, "invalid --duration value: {raw}"),
            ArgsError::InvalidSlot { raw } => write!(f, "invalid --slot value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p quiz -- [run]  [options]   # take (or resume) an assessment");
    eprintln!("  cargo run -p quiz -- status [options]   # show the saved session");
    eprintln!("  cargo run -p quiz -- reset  [options]   # discard the saved session");
    eprintln!("  cargo run -p quiz -- seed   [options]   # load the sample question bank");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite://quiz.sqlite3)");
    eprintln!("  --subject <id>            Restrict questions to one subject");
    eprintln!("  --count <n>               Number of questions, 1-100 (default: 20)");
    eprintln!("  --complexity <level>      novice | intermediate | advanced");
    eprintln!("  --duration <secs>         Countdown length (default: 90s per question)");
    eprintln!("  --slot <name>             Saved-session slot (default: quiz-storage)");
    eprintln!("  --shuffle                 Shuffle the question pool");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!(
        "  QUIZ_DB_URL, QUIZ_SUBJECT, QUIZ_COUNT, QUIZ_COMPLEXITY, QUIZ_DURATION_SECS, QUIZ_SLOT"
    );
    eprintln!("  QUIZ_LOG or RUST_LOG set the log filter (default: info)");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run,
    Status,
    Reset,
    Seed,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "run" => Some(Self::Run),
            "status" => Some(Self::Status),
            "reset" => Some(Self::Reset),
            "seed" => Some(Self::Seed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    subject: Option<SubjectId>,
    count: Option<u32>,
    complexity: Option<Complexity>,
    duration_secs: Option<u32>,
    slot: SessionSlot,
    shuffle: bool,
}

fn parse_count(raw: String) -> Result<u32, ArgsError> {
    raw.parse::<u32>()
        .map_err(|_| ArgsError::InvalidCount { raw })
}

fn parse_duration(raw: String) -> Result<u32, ArgsError> {
    match raw.parse::<u32>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(ArgsError::InvalidDuration { raw }),
    }
}

fn parse_complexity(raw: String) -> Result<Complexity, ArgsError> {
    Complexity::from_str(&raw).map_err(|_| ArgsError::InvalidComplexity { raw })
}

fn parse_subject(raw: String) -> Result<SubjectId, ArgsError> {
    SubjectId::from_str(raw.trim()).map_err(|_| ArgsError::InvalidSubject { raw })
}

fn parse_slot(raw: String) -> Result<SessionSlot, ArgsError> {
    if raw.trim().is_empty() {
        return Err(ArgsError::InvalidSlot { raw });
    }
    Ok(SessionSlot::new(raw))
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        let mut db_url = env("QUIZ_DB_URL")
            .map_or_else(|| "sqlite://quiz.sqlite3".into(), normalize_sqlite_url);
        let mut subject = env("QUIZ_SUBJECT").map(parse_subject).transpose()?;
        let mut count = env("QUIZ_COUNT").map(parse_count).transpose()?;
        let mut complexity = env("QUIZ_COMPLEXITY").map(parse_complexity).transpose()?;
        let mut duration_secs = env("QUIZ_DURATION_SECS").map(parse_duration).transpose()?;
        let mut slot = env("QUIZ_SLOT")
            .map(parse_slot)
            .transpose()?
            .unwrap_or_default();
        let mut shuffle = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--subject" => subject = Some(parse_subject(require_value(args, "--subject")?)?),
                "--count" => count = Some(parse_count(require_value(args, "--count")?)?),
                "--complexity" => {
                    complexity = Some(parse_complexity(require_value(args, "--complexity")?)?);
                }
                "--duration" => {
                    duration_secs = Some(parse_duration(require_value(args, "--duration")?)?);
                }
                "--slot" => slot = parse_slot(require_value(args, "--slot")?)?,
                "--shuffle" => shuffle = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            subject,
            count,
            complexity,
            duration_secs,
            slot,
            shuffle,
        })
    }

    fn config_patch(&self) -> ConfigPatch {
        let mut patch = ConfigPatch::new();
        if let Some(count) = self.count {
            patch = patch.question_count(count);
        }
        if let Some(complexity) = self.complexity {
            patch = patch.complexity(complexity);
        }
        patch
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("QUIZ_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // Logs go to stderr so they never interleave with the question display.
    tracing_subscriber::registry()
        .with(filter)
        .with(
            log_fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

//
// ─── INTERACTIVE LOOP ──────────────────────────────────────────────────────────
//

/// One line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Answer(OptionId),
    Next,
    Previous,
    Jump(usize),
    Flag,
    Show,
    Palette,
    Submit,
    Quit,
    Help,
}

fn parse_input(line: &str) -> Option<Input> {
    let mut parts = line.split_whitespace();
    let head = parts.next()?.to_ascii_lowercase();
    let arg = parts.next();
    if parts.next().is_some() {
        return None;
    }

    match (head.as_str(), arg) {
        ("a" | "answer", Some(option)) => OptionId::from_str(option).ok().map(Input::Answer),
        ("n" | "next", None) => Some(Input::Next),
        ("p" | "prev" | "previous", None) => Some(Input::Previous),
        ("j" | "jump", Some(n)) => n
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .map(|n| Input::Jump(n - 1)),
        ("f" | "flag", None) => Some(Input::Flag),
        ("show" | "s", None) => Some(Input::Show),
        ("palette" | "l", None) => Some(Input::Palette),
        ("submit", None) => Some(Input::Submit),
        ("q" | "quit", None) => Some(Input::Quit),
        ("h" | "help" | "?", None) => Some(Input::Help),
        // A bare option id answers the current question.
        (option, None) if option.len() == 1 && option.chars().all(|c| c.is_ascii_lowercase()) => {
            Some(Input::Answer(OptionId::new(option)))
        }
        _ => None,
    }
}

fn print_commands() {
    println!("Commands:");
    println!("  a <opt> | <opt>   answer the current question (e.g. `b`)");
    println!("  n / p             next / previous question");
    println!("  j <n>             jump to question n");
    println!("  f                 flag or unflag the current question");
    println!("  show / palette    redisplay the question / the question palette");
    println!("  submit            finish the assessment");
    println!("  q                 leave; the session stays saved and the clock keeps its value");
}

fn print_question(state: &SessionState) {
    let Some(question) = state.current_question() else {
        println!("(no questions)");
        return;
    };
    let flagged = if state.is_flagged(question.id()) {
        "  [flagged]"
    } else {
        ""
    };
    println!();
    println!(
        "Question {}/{}  [{} left]  {} · {}{flagged}",
        state.current_index() + 1,
        state.questions().len(),
        format_countdown(state.time_remaining()),
        question.chapter(),
        question.complexity(),
    );
    println!("{}", question.prompt());
    if let Some(notation) = question.notation() {
        println!("    {notation}");
    }
    let chosen = state.answer_for(question.id());
    for option in question.options() {
        let mark = if chosen == Some(&option.id) { '*' } else { ' ' };
        match &option.notation {
            Some(notation) => println!(" {mark} {}) {}  {notation}", option.id, option.text),
            None => println!(" {mark} {}) {}", option.id, option.text),
        }
    }
}

fn print_palette(markers: &[QuestionMarker]) {
    let cells: Vec<String> = markers
        .iter()
        .enumerate()
        .map(|(i, marker)| {
            let symbol = match marker {
                QuestionMarker::Current { .. } => '>',
                QuestionMarker::Answered { .. } => '#',
                QuestionMarker::Untouched { .. } => '.',
            };
            let flag = if marker.is_flagged() { "!" } else { "" };
            format!("{}{symbol}{flag}", i + 1)
        })
        .collect();
    println!("{}", cells.join(" "));
    println!("(> current, # answered, . untouched, ! flagged)");
}

async fn print_results(quiz: &AssessmentSession) -> Result<(), SessionError> {
    let result = quiz.result().await?;
    println!();
    println!("Assessment complete.");
    println!(
        "  Score      {}/{} ({}%)  rank: {}",
        result.correct_count, result.total_questions, result.accuracy, result.rank
    );
    println!(
        "  Correct {}  Incorrect {}  Skipped {}",
        result.correct_count, result.incorrect_count, result.skipped_count
    );
    println!("  Experience +{} XP", result.experience_earned);
    println!(
        "  Time       {}{}",
        format_countdown_detailed(result.elapsed_seconds),
        if result.within_pace { "  (fast pace)" } else { "" }
    );

    for review in quiz.reviews().await? {
        let outcome = match review.outcome {
            AnswerOutcome::Correct => "correct",
            AnswerOutcome::Incorrect => "incorrect",
            AnswerOutcome::Skipped => "skipped",
        };
        println!();
        println!("{}. {}  [{outcome}]", review.position + 1, review.prompt);
        if let Some(chosen) = &review.chosen {
            println!("   chosen {chosen}, correct {}", review.correct);
        } else {
            println!("   correct {}", review.correct);
        }
        for step in &review.explanation {
            println!("   {}. {}: {}", step.step, step.title, step.body);
        }
    }
    Ok(())
}

async fn read_line(lines: &mut Lines<BufReader<Stdin>>) -> std::io::Result<Option<String>> {
    lines.next_line().await
}

/// Drive one session until it completes or the user quits.
async fn interact(quiz: &AssessmentSession) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut watch = tokio::time::interval(Duration::from_secs(1));

    print_commands();
    print_question(&quiz.snapshot().await);

    loop {
        if quiz.snapshot().await.is_completed() {
            print_results(quiz).await?;
            return Ok(());
        }

        let line = tokio::select! {
            line = read_line(&mut lines) => line?,
            _ = watch.tick() => continue,
        };
        let Some(line) = line else {
            println!("Input closed; session saved.");
            return Ok(());
        };
        if line.trim().is_empty() {
            continue;
        }

        let Some(input) = parse_input(&line) else {
            println!("Unrecognized command. Type `help` for the list.");
            continue;
        };

        let outcome = match input {
            Input::Answer(option) => quiz.answer_current(&option).await.map(|()| true),
            Input::Next => {
                quiz.next().await;
                Ok(true)
            }
            Input::Previous => {
                quiz.previous().await;
                Ok(true)
            }
            Input::Jump(index) => {
                quiz.jump(index).await;
                Ok(true)
            }
            Input::Flag => quiz.toggle_flag_current().await.map(|_| true),
            Input::Show => Ok(true),
            Input::Palette => {
                print_palette(&quiz.markers().await);
                Ok(false)
            }
            Input::Submit => {
                let progress = quiz.progress().await;
                if progress.needs_submit_confirmation() {
                    println!(
                        "{} question(s) unanswered. Submit anyway? [y/N]",
                        progress.unanswered
                    );
                    let confirmed = read_line(&mut lines)
                        .await?
                        .is_some_and(|l| l.trim().eq_ignore_ascii_case("y"));
                    if !confirmed {
                        continue;
                    }
                }
                quiz.submit().await.map(|_| false)
            }
            Input::Quit => {
                println!("Session saved. Run again to resume.");
                return Ok(());
            }
            Input::Help => {
                print_commands();
                Ok(false)
            }
        };

        match outcome {
            Ok(true) => print_question(&quiz.snapshot().await),
            Ok(false) => {}
            Err(err) if err.is_rejection() => println!("Not allowed: {err}"),
            Err(err) => return Err(err.into()),
        }

        let progress = quiz.progress().await;
        if progress.all_answered && !quiz.snapshot().await.is_completed() {
            println!("All questions answered. Type `submit` when ready.");
        }
    }
}

async fn configure_new(quiz: &AssessmentSession, args: &Args) -> Result<(), SessionError> {
    if let Some(subject) = &args.subject {
        quiz.select_subject(subject).await?;
    }
    quiz.configure(args.config_patch()).await?;

    let config = quiz.snapshot().await.config().clone();
    println!(
        "Starting: {} question(s), {}, {} XP on offer",
        config.question_count(),
        config.complexity(),
        scoring::potential_experience(&config)
    );
    match args.duration_secs {
        Some(secs) => quiz.start_with_duration(secs).await,
        None => quiz.start().await,
    }
}

async fn ensure_bank(storage: &Storage) -> Result<(), Box<dyn std::error::Error>> {
    if storage.questions.list_subjects().await?.is_empty() {
        let report = sample::seed(storage).await?;
        tracing::info!(
            subjects = report.subjects,
            questions = report.questions,
            "question bank was empty, loaded sample catalog"
        );
    }
    Ok(())
}

fn print_status(state: &SessionState) {
    let progress = services::SessionProgress::from_state(state);
    match state.status() {
        SessionStatus::Setup => println!("No assessment in progress."),
        SessionStatus::InProgress => println!(
            "In progress: {}/{} answered, {} flagged, {} left",
            progress.answered,
            progress.total,
            progress.flagged,
            format_countdown(progress.time_remaining)
        ),
        SessionStatus::Completed => {
            let result = scoring::SessionResult::from_state(state);
            println!(
                "Completed: {}% ({} of {} correct), rank {}, +{} XP",
                result.accuracy,
                result.correct_count,
                result.total_questions,
                result.rank,
                result.experience_earned
            );
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    // Default behavior: take an assessment when no subcommand is provided.
    let cmd = match argv.first().map(String::as_str) {
        None => Command::Run,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Run,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let args = Args::parse(&mut argv.into_iter()).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    init_logging();

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&args.db_url)?;
    let storage = Storage::sqlite(&args.db_url).await?;

    if cmd == Command::Seed {
        let report = sample::seed(&storage).await?;
        println!(
            "Seeded {} subjects and {} questions into {}",
            report.subjects, report.questions, args.db_url
        );
        return Ok(());
    }

    ensure_bank(&storage).await?;
    let provider = BankQuestionProvider::new(Arc::clone(&storage.questions)).with_shuffle(args.shuffle);
    let quiz = AssessmentSession::new(&storage, Clock::default_clock(), args.slot.clone())
        .with_provider(Arc::new(provider));

    match cmd {
        Command::Status => {
            // Read-only view; the countdown is not resumed.
            let state = match storage.snapshots.load_snapshot(&args.slot).await? {
                Some(record) => record.into_state()?,
                None => SessionState::new(),
            };
            print_status(&state);
        }
        Command::Reset => {
            quiz.reset().await;
            println!("Saved session in slot {} discarded.", args.slot);
        }
        Command::Run => {
            match quiz.hydrate().await {
                SessionStatus::Setup => configure_new(&quiz, &args).await?,
                SessionStatus::InProgress => println!("Resuming saved assessment."),
                SessionStatus::Completed => {
                    println!("The saved assessment is finished. Run `reset` to start a new one.");
                }
            }
            if quiz.persistence_degraded() {
                eprintln!("warning: progress is not being saved; see the log for details");
            }
            interact(&quiz).await?;
        }
        Command::Seed => {}
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
