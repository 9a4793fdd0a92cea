//! Corkboard CLI - comment board and moderation from the terminal
//!
//! Reads and writes the same hosted comment store as the website, with the
//! same local moderation overrides when the remote is unreachable.

use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::aot::Generator;
use clap_complete::{generate, shells};
use corkboard_core::util::compact_text;
use corkboard_core::{
    Comment, CommentBoard, CommentDraft, CommentEngine, CommentId, ConnectionState, DeleteOutcome,
    FileStatusPersistence, LikeOutcome, ModerationPanel, OverrideStore, PhotoUpload, Placement,
    RemoteConfig, StatusFilter, SupabaseStore,
};
use serde::Serialize;
use thiserror::Error;

const ENV_ADMIN_PASSWORD: &str = "CORKBOARD_ADMIN_PASSWORD";
const ENV_DATA_DIR: &str = "CORKBOARD_DATA_DIR";

#[derive(Parser)]
#[command(name = "corkboard")]
#[command(about = "Comment board and moderation for a personal site")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Optional directory for the local moderation override file
    #[arg(long, value_name = "PATH", global = true)]
    overrides_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Public comment board
    #[command(subcommand)]
    Board(BoardCommand),
    /// Moderation commands for the site owner
    Admin {
        /// Admin password, required when the gate is configured
        #[arg(long, value_name = "PASSWORD")]
        password: Option<String>,
        #[command(subcommand)]
        command: AdminCommand,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum BoardCommand {
    /// List visible comments, pinned first
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Post a new comment
    Post {
        /// Author display name
        #[arg(long)]
        name: String,
        /// Comment text
        #[arg(long)]
        message: String,
        /// Photo to upload alongside the comment
        #[arg(long, value_name = "PATH")]
        photo: Option<PathBuf>,
    },
    /// Like a comment
    Like {
        /// Comment id
        id: String,
    },
}

#[derive(Subcommand)]
enum AdminCommand {
    /// List all comments, hidden ones included
    List {
        /// Case-insensitive text filter on author name and message
        #[arg(long)]
        search: Option<String>,
        /// Status facet to narrow the list
        #[arg(long, value_enum, default_value_t = StatusArg::All)]
        status: StatusArg,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Toggle the pin flag for a comment
    Pin {
        /// Comment id
        id: String,
    },
    /// Toggle the hidden flag for a comment
    Hide {
        /// Comment id
        id: String,
    },
    /// Delete a comment from the remote store
    Delete {
        /// Comment id
        id: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Show locally stored moderation overrides
    Overrides {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove every locally stored moderation override
    ClearOverrides {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] corkboard_core::Error),
    #[error(transparent)]
    Remote(#[from] corkboard_core::RemoteError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Comment id cannot be empty")]
    EmptyCommentId,
    #[error("Admin password missing or incorrect. Pass --password matching CORKBOARD_ADMIN_PASSWORD.")]
    AdminGateFailed,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum StatusArg {
    All,
    Pinned,
    Hidden,
}

impl From<StatusArg> for StatusFilter {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::All => Self::All,
            StatusArg::Pinned => Self::Pinned,
            StatusArg::Hidden => Self::Hidden,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

type Engine = CommentEngine<SupabaseStore, FileStatusPersistence>;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("corkboard=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let overrides_dir = resolve_overrides_dir(cli.overrides_dir);

    match cli.command {
        Commands::Board(command) => match command {
            BoardCommand::List { json } => run_board_list(json, &overrides_dir).await?,
            BoardCommand::Post {
                name,
                message,
                photo,
            } => run_board_post(&name, &message, photo.as_deref(), &overrides_dir).await?,
            BoardCommand::Like { id } => run_board_like(&id, &overrides_dir).await?,
        },
        Commands::Admin { password, command } => {
            gate_admin(password.as_deref(), env::var(ENV_ADMIN_PASSWORD).ok().as_deref())?;
            match command {
                AdminCommand::List {
                    search,
                    status,
                    json,
                } => run_admin_list(search.as_deref(), status, json, &overrides_dir).await?,
                AdminCommand::Pin { id } => run_admin_pin(&id, &overrides_dir).await?,
                AdminCommand::Hide { id } => run_admin_hide(&id, &overrides_dir).await?,
                AdminCommand::Delete { id, yes } => {
                    run_admin_delete(&id, yes, &overrides_dir).await?;
                }
                AdminCommand::Overrides { json } => run_admin_overrides(json, &overrides_dir)?,
                AdminCommand::ClearOverrides { yes } => {
                    run_admin_clear_overrides(yes, &overrides_dir)?;
                }
            }
        }
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref())?,
    }

    Ok(())
}

async fn run_board_list(as_json: bool, overrides_dir: &Path) -> Result<(), CliError> {
    let mut board = CommentBoard::new(build_engine(overrides_dir)?);
    board.load().await;
    report_connection(board.connection());

    print_comments(&board.visible(), as_json, "No comments yet")
}

async fn run_board_post(
    name: &str,
    message: &str,
    photo_path: Option<&Path>,
    overrides_dir: &Path,
) -> Result<(), CliError> {
    let mut draft = CommentDraft::new(name, message);
    if let Some(path) = photo_path {
        draft = draft.with_photo(read_photo(path)?);
    }

    let mut board = CommentBoard::new(build_engine(overrides_dir)?);
    board.set_draft(draft);
    let placement = board.submit().await?;

    if let Some(comment) = board.comments().first() {
        println!("{}", comment.id);
    }
    if placement == Placement::Local {
        println!("Stored locally; no remote store was reachable, so the comment will not persist");
    }
    Ok(())
}

async fn run_board_like(id: &str, overrides_dir: &Path) -> Result<(), CliError> {
    let id = normalize_comment_id(id)?;
    let mut board = CommentBoard::new(build_engine(overrides_dir)?);
    board.load().await;
    report_connection(board.connection());

    match board.like(&id).await? {
        LikeOutcome::Applied => {
            if let Some(comment) = board.comments().iter().find(|comment| comment.id == id) {
                println!("{} now has {} likes", comment.id, comment.likes);
            }
        }
        LikeOutcome::AlreadyLiked => println!("Already liked in this session"),
    }
    Ok(())
}

async fn run_admin_list(
    search: Option<&str>,
    status: StatusArg,
    as_json: bool,
    overrides_dir: &Path,
) -> Result<(), CliError> {
    let mut panel = ModerationPanel::new(build_engine(overrides_dir)?);
    panel.load().await;
    report_connection(panel.connection());

    if let Some(search) = search {
        panel.set_search(search);
    }
    panel.set_status_filter(status.into());

    print_comments(&panel.rows(), as_json, "No matching comments")
}

async fn run_admin_pin(id: &str, overrides_dir: &Path) -> Result<(), CliError> {
    let id = normalize_comment_id(id)?;
    let mut panel = ModerationPanel::new(build_engine(overrides_dir)?);
    panel.load().await;

    let pinned = panel.toggle_pinned(&id).await?;
    println!("{id} {}", if pinned { "pinned" } else { "unpinned" });
    Ok(())
}

async fn run_admin_hide(id: &str, overrides_dir: &Path) -> Result<(), CliError> {
    let id = normalize_comment_id(id)?;
    let mut panel = ModerationPanel::new(build_engine(overrides_dir)?);
    panel.load().await;

    let hidden = panel.toggle_hidden(&id).await?;
    println!("{id} {}", if hidden { "hidden" } else { "visible" });
    Ok(())
}

async fn run_admin_delete(
    id: &str,
    assume_yes: bool,
    overrides_dir: &Path,
) -> Result<(), CliError> {
    let id = normalize_comment_id(id)?;
    let mut panel = ModerationPanel::new(build_engine(overrides_dir)?);
    panel.load().await;

    let Some(comment) = panel.comment(&id) else {
        return Err(corkboard_core::Error::CommentNotFound(id.to_string()).into());
    };

    if !assume_yes {
        let prompt = format!(
            "Delete comment {} by {}: \"{}\"? [y/N] ",
            comment.id,
            comment.name,
            compact_text(&comment.message)
        );
        if !confirm(&prompt)? {
            println!("Aborted");
            return Ok(());
        }
    }

    match panel.delete(&id).await? {
        DeleteOutcome::Remote => println!("{id} deleted"),
        DeleteOutcome::LocalOnly => {
            println!("{id} removed from the session; no remote store was reachable");
        }
    }
    Ok(())
}

fn run_admin_overrides(as_json: bool, overrides_dir: &Path) -> Result<(), CliError> {
    let overrides = OverrideStore::open(FileStatusPersistence::new(overrides_dir));

    if as_json {
        println!("{}", serde_json::to_string_pretty(overrides.entries())?);
    } else if overrides.is_empty() {
        println!("No local overrides stored");
    } else {
        for (id, flags) in overrides.entries() {
            let mut marks = Vec::new();
            if flags.pinned {
                marks.push("pinned");
            }
            if flags.hidden {
                marks.push("hidden");
            }
            println!("{id}  {}", marks.join(" "));
        }
    }
    Ok(())
}

fn run_admin_clear_overrides(assume_yes: bool, overrides_dir: &Path) -> Result<(), CliError> {
    let mut overrides = OverrideStore::open(FileStatusPersistence::new(overrides_dir));
    if overrides.is_empty() {
        println!("No local overrides stored");
        return Ok(());
    }

    if !assume_yes {
        let prompt = format!(
            "Remove {} stored override entries? [y/N] ",
            overrides.entries().len()
        );
        if !confirm(&prompt)? {
            println!("Aborted");
            return Ok(());
        }
    }

    overrides.clear();
    println!("Local overrides cleared");
    Ok(())
}

fn run_completions(shell: CompletionShell, output_path: Option<&Path>) -> Result<(), CliError> {
    let mut command = Cli::command();
    let mut buffer = Vec::new();

    match shell {
        CompletionShell::Bash => generate_for_shell(shells::Bash, &mut command, &mut buffer),
        CompletionShell::Zsh => generate_for_shell(shells::Zsh, &mut command, &mut buffer),
        CompletionShell::Fish => generate_for_shell(shells::Fish, &mut command, &mut buffer),
    }

    if let Some(path) = output_path {
        std::fs::write(path, &buffer)?;
        println!("{}", path.display());
    } else {
        io::stdout().write_all(&buffer)?;
    }

    Ok(())
}

fn generate_for_shell<G: Generator>(
    generator: G,
    command: &mut clap::Command,
    buffer: &mut Vec<u8>,
) {
    generate(generator, command, "corkboard", buffer);
}

fn build_engine(overrides_dir: &Path) -> Result<Engine, CliError> {
    let overrides = OverrideStore::open(FileStatusPersistence::new(overrides_dir));

    let remote = match RemoteConfig::from_env()? {
        Some(config) => {
            tracing::debug!("Using remote comment store at {}", config.url);
            Some(SupabaseStore::new(config)?)
        }
        None => {
            tracing::debug!("No remote store configured; running local-only");
            None
        }
    };

    Ok(CommentEngine::new(remote, overrides))
}

fn gate_admin(attempt: Option<&str>, expected: Option<&str>) -> Result<(), CliError> {
    let Some(expected) = expected.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(());
    };

    if attempt.map(str::trim) == Some(expected) {
        Ok(())
    } else {
        Err(CliError::AdminGateFailed)
    }
}

fn report_connection(connection: ConnectionState) {
    match connection {
        ConnectionState::Connected => {}
        ConnectionState::LocalOnly => {
            tracing::debug!("No remote store configured; showing session data only");
        }
        ConnectionState::Lost => {
            eprintln!("Warning: the remote store could not be reached; showing session data only");
        }
    }
}

#[derive(Debug, Serialize)]
struct CommentListItem {
    id: String,
    name: String,
    message: String,
    photo_url: Option<String>,
    created_at: DateTime<Utc>,
    likes: u32,
    pinned: bool,
    hidden: bool,
    relative_time: String,
}

fn comment_to_list_item(comment: &Comment, now: DateTime<Utc>) -> CommentListItem {
    CommentListItem {
        id: comment.id.to_string(),
        name: comment.name.clone(),
        message: comment.message.clone(),
        photo_url: comment.photo_url.clone(),
        created_at: comment.created_at,
        likes: comment.likes,
        pinned: comment.pinned,
        hidden: comment.hidden,
        relative_time: format_relative_time(comment.created_at, now),
    }
}

fn print_comments(
    comments: &[&Comment],
    as_json: bool,
    empty_message: &str,
) -> Result<(), CliError> {
    if as_json {
        let now = Utc::now();
        let items = comments
            .iter()
            .map(|comment| comment_to_list_item(comment, now))
            .collect::<Vec<CommentListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if comments.is_empty() {
        println!("{empty_message}");
    } else {
        for line in format_comment_lines(comments) {
            println!("{line}");
        }
    }
    Ok(())
}

fn format_comment_lines(comments: &[&Comment]) -> Vec<String> {
    let now = Utc::now();
    comments
        .iter()
        .map(|comment| {
            let short_id = short_id(&comment.id);
            let name = truncate_with_ellipsis(comment.name.trim(), 16);
            let preview = comment_preview(comment, 40);
            let likes = comment.likes;
            let relative_time = format_relative_time(comment.created_at, now);
            let marks = status_marks(comment);

            if marks.is_empty() {
                format!("{short_id:<13}  {name:<16}  {preview:<40}  {likes:>4}  {relative_time}")
            } else {
                format!(
                    "{short_id:<13}  {name:<16}  {preview:<40}  {likes:>4}  \
                     {relative_time:<10}  {marks}"
                )
            }
        })
        .collect()
}

fn short_id(id: &CommentId) -> String {
    id.as_str().chars().take(13).collect()
}

fn comment_preview(comment: &Comment, max_chars: usize) -> String {
    let first_line = comment.message.lines().next().unwrap_or("").trim();
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_with_ellipsis(&collapsed, max_chars)
}

fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = text.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

fn status_marks(comment: &Comment) -> String {
    let mut marks = Vec::new();
    if comment.pinned {
        marks.push("[pinned]");
    }
    if comment.hidden {
        marks.push("[hidden]");
    }
    marks.join(" ")
}

fn format_relative_time(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now.signed_duration_since(timestamp).num_milliseconds().max(0);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

fn normalize_comment_id(id: &str) -> Result<CommentId, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(CliError::EmptyCommentId);
    }
    Ok(CommentId::from(trimmed))
}

fn read_photo(path: &Path) -> Result<PhotoUpload, CliError> {
    let bytes = std::fs::read(path)?;
    let file_name = path
        .file_name()
        .map_or_else(|| "photo".to_string(), |name| name.to_string_lossy().into_owned());

    Ok(PhotoUpload {
        file_name,
        bytes,
        content_type: photo_content_type(path),
    })
}

fn photo_content_type(path: &Path) -> Option<String> {
    let extension = path.extension()?.to_str()?.to_lowercase();
    let mime = match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => return None,
    };
    Some(mime.to_string())
}

fn confirm(prompt: &str) -> Result<bool, CliError> {
    print!("{prompt}");
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn resolve_overrides_dir(cli_dir: Option<PathBuf>) -> PathBuf {
    cli_dir
        .or_else(|| env::var_os(ENV_DATA_DIR).map(PathBuf::from))
        .unwrap_or_else(default_overrides_dir)
}

fn default_overrides_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("corkboard")
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    use chrono::Duration;
    use corkboard_core::Comment;

    use super::{
        comment_preview, default_overrides_dir, format_relative_time, gate_admin,
        normalize_comment_id, photo_content_type, resolve_overrides_dir,
        run_admin_clear_overrides, run_completions, status_marks, truncate_with_ellipsis,
        CliError, CompletionShell, FileStatusPersistence, OverrideStore, Utc,
    };

    #[test]
    fn gate_admin_is_open_without_configured_password() {
        assert!(gate_admin(None, None).is_ok());
        assert!(gate_admin(Some("anything"), None).is_ok());
        assert!(gate_admin(None, Some("   ")).is_ok());
    }

    #[test]
    fn gate_admin_checks_configured_password() {
        assert!(gate_admin(Some("hunter2"), Some("hunter2")).is_ok());
        assert!(gate_admin(Some(" hunter2 "), Some("hunter2")).is_ok());

        assert!(matches!(
            gate_admin(Some("wrong"), Some("hunter2")),
            Err(CliError::AdminGateFailed)
        ));
        assert!(matches!(
            gate_admin(None, Some("hunter2")),
            Err(CliError::AdminGateFailed)
        ));
    }

    #[test]
    fn normalize_comment_id_rejects_empty() {
        assert!(matches!(
            normalize_comment_id(" \n "),
            Err(CliError::EmptyCommentId)
        ));
        assert_eq!(normalize_comment_id("  abc123  ").unwrap().as_str(), "abc123");
    }

    #[test]
    fn format_relative_time_units() {
        let now = Utc::now();
        assert_eq!(format_relative_time(now - Duration::seconds(30), now), "just now");
        assert_eq!(format_relative_time(now - Duration::minutes(2), now), "2m ago");
        assert_eq!(format_relative_time(now - Duration::hours(2), now), "2h ago");
        assert_eq!(format_relative_time(now - Duration::days(3), now), "3d ago");
        assert_eq!(format_relative_time(now + Duration::minutes(5), now), "just now");
    }

    #[test]
    fn comment_preview_truncates_with_ellipsis() {
        let comment = Comment::local(
            "Ada",
            "This is a very long message that should be shortened for the table",
            None,
        );
        assert_eq!(comment_preview(&comment, 20), "This is a very lo...");
    }

    #[test]
    fn comment_preview_collapses_whitespace_and_newlines() {
        let comment = Comment::local("Ada", "first   line\nsecond line", None);
        assert_eq!(comment_preview(&comment, 40), "first line");
    }

    #[test]
    fn truncate_with_ellipsis_keeps_short_text() {
        assert_eq!(truncate_with_ellipsis("short", 20), "short");
    }

    #[test]
    fn status_marks_render_flags() {
        let mut comment = Comment::local("Ada", "hello", None);
        assert_eq!(status_marks(&comment), "");

        comment.pinned = true;
        assert_eq!(status_marks(&comment), "[pinned]");

        comment.hidden = true;
        assert_eq!(status_marks(&comment), "[pinned] [hidden]");
    }

    #[test]
    fn photo_content_type_maps_known_extensions() {
        assert_eq!(
            photo_content_type(&PathBuf::from("selfie.JPG")),
            Some("image/jpeg".to_string())
        );
        assert_eq!(
            photo_content_type(&PathBuf::from("pic.png")),
            Some("image/png".to_string())
        );
        assert_eq!(photo_content_type(&PathBuf::from("notes.txt")), None);
        assert_eq!(photo_content_type(&PathBuf::from("no-extension")), None);
    }

    #[test]
    fn resolve_overrides_dir_prefers_cli_path() {
        let dir = PathBuf::from("/tmp/custom-overrides");
        assert_eq!(resolve_overrides_dir(Some(dir.clone())), dir);
        assert!(!default_overrides_dir().as_os_str().is_empty());
    }

    #[test]
    fn run_admin_clear_overrides_empties_persisted_store() {
        let dir = unique_test_dir();
        {
            let mut store = OverrideStore::open(FileStatusPersistence::new(&dir));
            store.set_hidden("c1", true);
            store.set_pinned("c2", true);
        }

        run_admin_clear_overrides(true, &dir).unwrap();

        let reopened = OverrideStore::open(FileStatusPersistence::new(&dir));
        assert!(reopened.is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn run_completions_writes_bash_script_file() {
        let output_path = std::env::temp_dir().join(format!(
            "corkboard-completions-test-{}.bash",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |duration| duration.as_nanos())
        ));

        run_completions(CompletionShell::Bash, Some(&output_path)).unwrap();

        let script = std::fs::read_to_string(&output_path).unwrap();
        assert!(script.contains("_corkboard()"));
        assert!(script.contains("complete -F _corkboard"));

        let _ = std::fs::remove_file(output_path);
    }

    fn unique_test_dir() -> PathBuf {
        static NEXT_TEST_DIR_ID: AtomicU64 = AtomicU64::new(0);

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |duration| duration.as_nanos());
        let sequence = NEXT_TEST_DIR_ID.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("corkboard-cli-test-{timestamp}-{sequence}"))
    }
}
