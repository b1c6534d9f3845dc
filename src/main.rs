use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use qna::utils::{ensure_database_directory, parse_tags};
use qna::{
    AnswerId, AuthState, Config, Database, ForumError, ForumService, ListQuestionsOptions,
    NewQuestion, NotificationId, QuestionId, QuestionOrder, Session, UserId, VoteTarget, VoteType,
    doctor,
};

/// qna - a question and answer forum on a local SQLite database
#[derive(Parser)]
#[command(name = "qna")]
#[command(about = "Ask questions, answer them, vote and accept answers")]
#[command(version)]
struct Cli {
    /// Username to act as (defaults to QNA_USER)
    #[arg(long = "as", value_name = "USERNAME", global = true)]
    as_user: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Manage profiles
    #[command(subcommand)]
    Profile(ProfileCommand),
    /// Post a new question
    Ask(AskCommand),
    /// Answer a question
    Answer(AnswerCommand),
    /// Vote on a question or answer (repeating a vote retracts it)
    Vote(VoteCommand),
    /// Accept an answer to one of your questions
    Accept(AcceptCommand),
    /// Show a question with its answers (counts as a view)
    Show(ShowCommand),
    /// List questions
    List(ListCommand),
    /// Show the most used tags
    Tags(TagsCommand),
    /// Show or clear your notifications
    Notifications(NotificationsCommand),
    /// Check database health and counter consistency
    Doctor(DoctorCommand),
}

#[derive(Subcommand)]
enum ProfileCommand {
    /// Create a profile with a fresh user id
    Create {
        username: String,
        #[arg(short, long, default_value = "")]
        display_name: String,
    },
    /// Show a profile by username (defaults to the acting user)
    Show { username: Option<String> },
    /// Update the acting user's display name or bio
    Update {
        #[arg(short, long)]
        display_name: Option<String>,
        /// New bio; pass an empty string to clear it
        #[arg(short, long)]
        bio: Option<String>,
    },
    /// Delete the acting user's profile and everything they posted
    Delete,
}

#[derive(Parser)]
struct AskCommand {
    #[arg(value_name = "TITLE")]
    title: String,

    #[arg(value_name = "CONTENT")]
    content: String,

    /// Comma-separated tags (at least one)
    #[arg(short, long, value_name = "TAGS")]
    tags: String,
}

#[derive(Parser)]
struct AnswerCommand {
    #[arg(value_name = "QUESTION_ID")]
    question_id: i64,

    #[arg(value_name = "CONTENT")]
    content: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum TargetKind {
    Question,
    Answer,
}

#[derive(Clone, Copy, ValueEnum)]
enum Direction {
    Up,
    Down,
}

#[derive(Parser)]
struct VoteCommand {
    #[arg(value_enum)]
    kind: TargetKind,

    #[arg(value_name = "ID")]
    id: i64,

    #[arg(value_enum)]
    direction: Direction,
}

#[derive(Parser)]
struct AcceptCommand {
    #[arg(value_name = "QUESTION_ID")]
    question_id: i64,

    #[arg(value_name = "ANSWER_ID")]
    answer_id: i64,
}

#[derive(Parser)]
struct ShowCommand {
    #[arg(value_name = "QUESTION_ID")]
    question_id: i64,
}

#[derive(Clone, Copy, Default, ValueEnum)]
enum OrderArg {
    #[default]
    Newest,
    Oldest,
    Votes,
}

impl From<OrderArg> for QuestionOrder {
    fn from(order: OrderArg) -> Self {
        match order {
            OrderArg::Newest => QuestionOrder::Newest,
            OrderArg::Oldest => QuestionOrder::Oldest,
            OrderArg::Votes => QuestionOrder::MostVoted,
        }
    }
}

#[derive(Parser)]
struct ListCommand {
    /// Maximum number of questions to show
    #[arg(short, long, default_value_t = 20)]
    limit: usize,

    /// Only questions with this tag
    #[arg(short, long)]
    tag: Option<String>,

    #[arg(short, long, value_enum, default_value_t = OrderArg::Newest)]
    order: OrderArg,

    /// Only questions that have not accepted an answer yet
    #[arg(long)]
    open: bool,
}

#[derive(Parser)]
struct TagsCommand {
    #[arg(short, long, default_value_t = 20)]
    limit: usize,
}

#[derive(Parser)]
struct NotificationsCommand {
    /// Only unread notifications
    #[arg(short, long)]
    unread: bool,

    /// Mark one notification as read
    #[arg(long, value_name = "ID", conflicts_with = "read_all")]
    read: Option<i64>,

    /// Mark every notification as read
    #[arg(long)]
    read_all: bool,
}

#[derive(Parser)]
struct DoctorCommand {
    /// Rewrite drifted counters from their source rows
    #[arg(long)]
    repair: bool,

    /// Skip the confirmation prompt
    #[arg(short, long, requires = "repair")]
    yes: bool,
}

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let result = Config::from_env().and_then(|config| {
        init_tracing(&config.log_filter);
        run(&cli, &config)
    });

    if let Err(e) = result {
        // Determine exit code based on error type
        let exit_code = if is_user_error(&e) { 1 } else { 2 };
        eprintln!("Error: {e:#}");
        std::process::exit(exit_code);
    }
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Determines if an error is a user error (vs internal error).
///
/// User errors are forum errors caused by input or session: validation,
/// missing rows, conflicts, missing sign-in. Everything else (database,
/// I/O) is internal.
fn is_user_error(error: &anyhow::Error) -> bool {
    error
        .chain()
        .any(|cause| cause.downcast_ref::<ForumError>().is_some_and(ForumError::is_user_error))
}

fn run(cli: &Cli, config: &Config) -> Result<()> {
    let db_path = &config.database_path;
    ensure_database_directory(db_path)?;
    let db = Database::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
    let service = ForumService::new(db);

    let username = cli.as_user.as_deref().or(config.user.as_deref());
    let session = resolve_session(&service, username)?;
    let out = Output { json: cli.json };

    match &cli.command {
        Commands::Profile(cmd) => execute_profile(&service, &session, cmd, out),
        Commands::Ask(cmd) => execute_ask(&service, &session, cmd, out),
        Commands::Answer(cmd) => execute_answer(&service, &session, cmd, out),
        Commands::Vote(cmd) => execute_vote(&service, &session, cmd, out),
        Commands::Accept(cmd) => execute_accept(&service, &session, cmd, out),
        Commands::Show(cmd) => execute_show(&service, &session, cmd, out),
        Commands::List(cmd) => execute_list(&service, cmd, out),
        Commands::Tags(cmd) => execute_tags(&service, cmd, out),
        Commands::Notifications(cmd) => execute_notifications(&service, &session, cmd, out),
        Commands::Doctor(cmd) => execute_doctor(&service, config, cmd),
    }
}

/// Signs the named user in and returns the session actions run under.
///
/// No username means an anonymous session; read-only commands work, writes
/// fail with `AuthRequired`.
fn resolve_session(service: &ForumService, username: Option<&str>) -> Result<Session> {
    let auth = AuthState::new();
    if let Some(name) = username {
        let profile = service
            .find_profile_by_username(name)?
            .ok_or_else(|| ForumError::NotFound {
                entity: "profile",
                id: name.to_string(),
            })?;
        auth.sign_in(profile.user_id);
    }
    Ok(Session::from_auth(&auth))
}

#[derive(Clone, Copy)]
struct Output {
    json: bool,
}

impl Output {
    /// Prints `value` as JSON, or the text produced by `text` otherwise.
    fn emit<T: Serialize>(self, value: &T, text: impl FnOnce(&T) -> String) -> Result<()> {
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(value).context("Failed to serialize output")?
            );
        } else {
            println!("{}", text(value));
        }
        Ok(())
    }
}

fn execute_profile(
    service: &ForumService,
    session: &Session,
    cmd: &ProfileCommand,
    out: Output,
) -> Result<()> {
    match cmd {
        ProfileCommand::Create {
            username,
            display_name,
        } => {
            let profile = service.create_profile(UserId::random(), username, display_name)?;
            out.emit(&profile, |p| {
                format!("Profile created: {} (id: {})", p.username, p.user_id)
            })
        }
        ProfileCommand::Show { username } => {
            let profile = match username {
                Some(name) => service.find_profile_by_username(name)?,
                None => service.get_profile(session.require_user()?)?,
            };
            let profile = profile.ok_or_else(|| ForumError::NotFound {
                entity: "profile",
                id: username.clone().unwrap_or_default(),
            })?;
            out.emit(&profile, |p| {
                let mut text = format!(
                    "{} ({})\n  reputation: {}\n  joined: {}",
                    p.display_name,
                    p.username,
                    p.reputation,
                    p.created_at.date()
                );
                if let Some(bio) = &p.bio {
                    text.push_str(&format!("\n  bio: {bio}"));
                }
                text
            })
        }
        ProfileCommand::Update { display_name, bio } => {
            let profile =
                service.update_profile(session, display_name.as_deref(), bio.as_deref())?;
            out.emit(&profile, |p| format!("Profile updated: {}", p.username))
        }
        ProfileCommand::Delete => {
            service.delete_profile(session)?;
            println!("Profile deleted");
            Ok(())
        }
    }
}

fn execute_ask(
    service: &ForumService,
    session: &Session,
    cmd: &AskCommand,
    out: Output,
) -> Result<()> {
    let input = NewQuestion::new(&cmd.title, &cmd.content, parse_tags(&cmd.tags));
    let question = service
        .post_question(session, &input)
        .context("Failed to post question")?;
    out.emit(&question, |q| {
        format!(
            "Question posted (id: {}) with tags: {}",
            q.id,
            q.tags.join(", ")
        )
    })
}

fn execute_answer(
    service: &ForumService,
    session: &Session,
    cmd: &AnswerCommand,
    out: Output,
) -> Result<()> {
    let answer = service
        .post_answer(session, QuestionId::new(cmd.question_id), &cmd.content)
        .context("Failed to post answer")?;
    out.emit(&answer, |a| {
        format!("Answer posted (id: {}) to question {}", a.id, a.question_id)
    })
}

fn execute_vote(
    service: &ForumService,
    session: &Session,
    cmd: &VoteCommand,
    out: Output,
) -> Result<()> {
    let target = match cmd.kind {
        TargetKind::Question => VoteTarget::Question(QuestionId::new(cmd.id)),
        TargetKind::Answer => VoteTarget::Answer(AnswerId::new(cmd.id)),
    };
    let vote_type = match cmd.direction {
        Direction::Up => VoteType::Up,
        Direction::Down => VoteType::Down,
    };

    let outcome = service.cast_vote(session, target, vote_type)?;
    out.emit(&outcome, |o| {
        let current = o
            .current
            .map_or_else(|| "none".to_string(), |v| v.to_string());
        format!(
            "{}: score {} (your vote: {})",
            o.target, o.vote_count, current
        )
    })
}

#[derive(Serialize)]
struct AcceptResult {
    question_id: QuestionId,
    answer_id: AnswerId,
    accepted: bool,
}

fn execute_accept(
    service: &ForumService,
    session: &Session,
    cmd: &AcceptCommand,
    out: Output,
) -> Result<()> {
    let question_id = QuestionId::new(cmd.question_id);
    let answer_id = AnswerId::new(cmd.answer_id);
    let accepted = service.accept_answer(session, question_id, answer_id)?;

    out.emit(
        &AcceptResult {
            question_id,
            answer_id,
            accepted,
        },
        |r| {
            if r.accepted {
                format!("Answer {} accepted", r.answer_id)
            } else {
                format!(
                    "Answer {} was not accepted: only the asker can accept, once, \
                     an answer to their own question",
                    r.answer_id
                )
            }
        },
    )
}

#[derive(Serialize)]
struct Thread {
    question: qna::Question,
    answers: Vec<qna::Answer>,
}

fn execute_show(
    service: &ForumService,
    session: &Session,
    cmd: &ShowCommand,
    out: Output,
) -> Result<()> {
    let question = service.view_question(QuestionId::new(cmd.question_id))?;
    let answers = service.list_answers(question.id)?;
    let my_vote = service.user_vote(session, VoteTarget::Question(question.id))?;

    out.emit(&Thread { question, answers }, |t| {
        let q = &t.question;
        let mut text = format!(
            "#{} {}\n[{}] score {} | {} views | {} answers",
            q.id,
            q.title,
            q.tags.join(", "),
            q.vote_count,
            q.view_count,
            q.answer_count
        );
        if let Some(vote) = my_vote {
            text.push_str(&format!(" | you voted {vote}"));
        }
        text.push_str(&format!("\n\n{}\n", q.content));
        for a in &t.answers {
            let mark = if a.is_accepted { " (accepted)" } else { "" };
            text.push_str(&format!(
                "\n--- answer {} | score {}{}\n{}\n",
                a.id, a.vote_count, mark, a.content
            ));
        }
        text
    })
}

fn execute_list(service: &ForumService, cmd: &ListCommand, out: Output) -> Result<()> {
    let options = ListQuestionsOptions {
        limit: Some(cmd.limit),
        tag: cmd.tag.clone(),
        order: cmd.order.into(),
        open_only: cmd.open,
    };
    let questions = service.list_questions(&options)?;

    out.emit(&questions, |qs| {
        if qs.is_empty() {
            return "No questions found".to_string();
        }
        qs.iter()
            .map(|q| {
                let closed = if q.is_open() { " " } else { "\u{2713}" };
                format!(
                    "{closed} #{:<5} {:>4} votes {:>3} answers  {}  [{}]",
                    q.id.get(),
                    q.vote_count,
                    q.answer_count,
                    q.title,
                    q.tags.join(", ")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    })
}

fn execute_tags(service: &ForumService, cmd: &TagsCommand, out: Output) -> Result<()> {
    let tags = service.popular_tags(cmd.limit)?;
    out.emit(&tags, |ts| {
        if ts.is_empty() {
            return "No tags yet".to_string();
        }
        ts.iter()
            .map(|t| format!("{:>5}  {}", t.usage_count, t.name))
            .collect::<Vec<_>>()
            .join("\n")
    })
}

fn execute_notifications(
    service: &ForumService,
    session: &Session,
    cmd: &NotificationsCommand,
    out: Output,
) -> Result<()> {
    if let Some(id) = cmd.read {
        service.mark_notification_read(session, NotificationId::new(id))?;
        println!("Notification {id} marked as read");
        return Ok(());
    }
    if cmd.read_all {
        let changed = service.mark_all_read(session)?;
        println!("{changed} notifications marked as read");
        return Ok(());
    }

    let notifications = service.list_notifications(session, cmd.unread)?;
    out.emit(&notifications, |ns| {
        if ns.is_empty() {
            return "No notifications".to_string();
        }
        ns.iter()
            .map(|n| {
                let dot = if n.is_read { " " } else { "*" };
                let answer = n
                    .answer_id
                    .map(|a| format!(" answer {a}"))
                    .unwrap_or_default();
                format!(
                    "{dot} #{:<5} {} on question {}{}",
                    n.id.get(),
                    n.kind,
                    n.question_id,
                    answer
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    })
}

fn execute_doctor(service: &ForumService, config: &Config, cmd: &DoctorCommand) -> Result<()> {
    if cmd.repair {
        let yes = cmd.yes;
        doctor::run_repair(service, || yes || doctor::confirm_repair())?;
        return Ok(());
    }
    doctor::run_health_checks(&config.database_path.to_string_lossy(), service)
}
