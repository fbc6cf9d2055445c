//! tgmedia: log in, list and download media from a Telegram channel.
//!
//! Credentials come from flags or the environment:
//!
//! ```text
//! TELEGRAM_API_ID=12345 TELEGRAM_API_HASH=… tgmedia login +15551234567
//! TELEGRAM_CHANNEL=@some_channel tgmedia media --type video --limit 10
//! tgmedia download 42 --out downloads/
//! ```

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tgmedia_client::{
    Client, Config, DownloadOutcome, DownloadTarget, FileSessionStore, LoginError, LoginFlow, MediaAccess, TypeFilter,
};

#[derive(Parser)]
#[command(name = "tgmedia")]
#[command(about = "List and download media from Telegram chats", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[arg(long, env = "TELEGRAM_API_ID", global = true, default_value_t = 0)]
    api_id: i32,

    #[arg(long, env = "TELEGRAM_API_HASH", global = true, default_value = "", hide_env_values = true)]
    api_hash: String,

    /// Session file
    #[arg(long, env = "TELEGRAM_SESSION", global = true, default_value = "tgmedia.session")]
    session: PathBuf,

    /// Address used when no session is stored
    #[arg(long, env = "TELEGRAM_DC", global = true)]
    dc: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with a phone number; prompts for the code and, if set, the
    /// cloud password
    Login { phone: String },
    /// Sign out and delete the session file
    Logout,
    /// Show the signed-in account
    Whoami,
    /// List media-bearing messages, newest first
    Media {
        /// `@username`, `t.me/…` link, `-100…` id or `me`
        #[arg(long, env = "TELEGRAM_CHANNEL")]
        chat: String,
        /// photo, video, audio or document
        #[arg(short = 't', long = "type")]
        kind: Option<TypeFilter>,
        /// List messages older than this id
        #[arg(long, default_value_t = 0)]
        offset: i32,
        #[arg(short, long, default_value_t = 20)]
        limit: i32,
    },
    /// Download the media of one message
    Download {
        #[arg(long, env = "TELEGRAM_CHANNEL")]
        chat: String,
        message_id: i32,
        /// Directory to save into
        #[arg(short, long, default_value = "downloads")]
        out: PathBuf,
    },
    /// Download every photo and document in the chat
    DownloadAll {
        #[arg(long, env = "TELEGRAM_CHANNEL")]
        chat: String,
        #[arg(short, long, default_value = "downloads")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    env_logger::Builder::from_default_env().filter_level(level).init();

    if let Err(e) = run(cli).await {
        eprintln!("✗ {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config {
        api_id:        cli.api_id,
        api_hash:      cli.api_hash,
        session_store: Arc::new(FileSessionStore::new(&cli.session)),
        ..Config::default()
    };
    if let Some(dc) = cli.dc {
        config.dc_addr = dc;
    }
    let needs_api = matches!(cli.command, Commands::Login { .. });
    if needs_api && (config.api_id == 0 || config.api_hash.is_empty()) {
        return Err("set TELEGRAM_API_ID and TELEGRAM_API_HASH (https://my.telegram.org)".into());
    }
    log::debug!("session file: {}", cli.session.display());

    let client = Client::new(config);
    match cli.command {
        Commands::Login { phone } => login(&client, &phone).await?,
        Commands::Logout => {
            if client.sign_out().await? {
                println!("✅ Signed out");
            } else {
                println!("Session was not signed in; removed it anyway");
            }
        }
        Commands::Whoami => {
            let me = client.get_me().await?;
            let username = if me.username.is_empty() { String::new() } else { format!(" @{}", me.username) };
            println!("{} {}{username} (id {})", me.first_name, me.last_name, me.id);
        }
        Commands::Media { chat, kind, offset, limit } => {
            let page = client.list_media_page(&chat, kind, offset, limit).await?;
            if page.items.is_empty() {
                println!("No media found");
            }
            for m in &page.items {
                let name = m.media.suggested_name();
                let size = client.format_size(m.media.size_bytes as i64, 2);
                let mime = m.media.mime_type.as_deref().unwrap_or("?");
                println!("{:>8}  {:<8}  {:>10}  {mime:<24}  {name}", m.id, m.media.kind.as_str(), size);
            }
            if let Some(next) = page.next_offset {
                println!("\nMore: --offset {next}");
            }
        }
        Commands::Download { chat, message_id, out } => {
            match client.download_media(&chat, message_id, DownloadTarget::Directory(out)).await? {
                DownloadOutcome::Saved { path, bytes } => {
                    println!("💾 {} ({})", path.display(), client.format_size(bytes as i64, 2));
                }
                DownloadOutcome::Streamed { bytes } => println!("💾 {bytes} bytes"),
            }
        }
        Commands::DownloadAll { chat, out } => {
            let results = client.download_all(&chat, out).await?;
            let failed = results.iter().filter(|(_, r)| r.is_err()).count();
            for (id, result) in &results {
                match result {
                    Ok(outcome) => println!("{id:>8}  ✓ {}", client.format_size(outcome.bytes() as i64, 2)),
                    Err(e) => println!("{id:>8}  ✗ {e}"),
                }
            }
            println!("\n{} downloaded, {failed} failed", results.len() - failed);
        }
    }
    Ok(())
}

async fn login(client: &Client, phone: &str) -> Result<(), Box<dyn std::error::Error>> {
    if client.is_authorized().await? {
        println!("✅ Already logged in");
        return Ok(());
    }

    println!("📱 Sending login code to {phone} …");
    let token = client.request_login_code(phone).await?;
    let code = prompt("Enter the code you received: ")?;

    let user = match client.complete_login(&token, &code, None).await {
        Ok(user) => user,
        Err(LoginError::TwoFactorRequired { hint }) => {
            let hint = if hint.is_empty() { "(no hint)".to_string() } else { hint };
            let password = prompt(&format!("2FA password (hint: {hint}): "))?;
            client.complete_login(&token, &code, Some(&password)).await?
        }
        Err(LoginError::SignUpRequired) => {
            return Err("this number is not registered; sign up in an official app first".into());
        }
        Err(e) => return Err(e.into()),
    };
    println!("✅ Signed in as {}", user.first_name);
    Ok(())
}

fn prompt(msg: &str) -> io::Result<String> {
    print!("{msg}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
