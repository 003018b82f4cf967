use std::sync::Arc;

use anyhow::{Context, bail};
use tracing::{info, warn};

use huddle_client::friends::open_direct_chat;
use huddle_client::{ChatList, ChatRow, ChatSource, Config, Conversation, Session};
use huddle_types::models::{ChatId, UserId};

const USAGE: &str = "usage: huddle <chats | history <chat_id> [pages] | send <chat_id> <text> | friends | dm <user_id>>";

enum Command {
    /// Print the chat list, then keep it current until interrupted.
    Chats,
    History { chat_id: ChatId, pages: u32 },
    Send { chat_id: ChatId, text: String },
    Friends,
    Dm { user_id: UserId },
}

impl Command {
    fn parse(mut args: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        let Some(name) = args.next() else {
            bail!(USAGE);
        };
        let command = match name.as_str() {
            "chats" => Self::Chats,
            "history" => Self::History {
                chat_id: parse_id(args.next(), "chat_id")?,
                pages: match args.next() {
                    Some(pages) => pages.parse().context("pages must be a number")?,
                    None => 1,
                },
            },
            "send" => {
                let chat_id = parse_id(args.next(), "chat_id")?;
                let text = args.collect::<Vec<_>>().join(" ");
                if text.is_empty() {
                    bail!("send needs message text");
                }
                Self::Send { chat_id, text }
            }
            "friends" => Self::Friends,
            "dm" => Self::Dm {
                user_id: parse_id(args.next(), "user_id")?,
            },
            other => bail!("unknown command {:?}\n{}", other, USAGE),
        };
        Ok(command)
    }
}

fn parse_id(arg: Option<String>, name: &str) -> anyhow::Result<i64> {
    arg.with_context(|| format!("missing {}\n{}", name, USAGE))?
        .parse()
        .with_context(|| format!("{} must be a number", name))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huddle=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let command = Command::parse(std::env::args().skip(1))?;
    let config = Config::from_env()?;
    let identity = config.identity()?;

    let session = Arc::new(Session::start(&config, identity).await);

    let result = match command {
        Command::Chats => watch_chats(&session).await,
        Command::History { chat_id, pages } => show_history(&session, &config, chat_id, pages).await,
        Command::Send { chat_id, text } => send(&session, chat_id, &text),
        Command::Friends => show_friends(&session).await,
        Command::Dm { user_id } => start_dm(&session, user_id).await,
    };

    session.shutdown().await;
    result
}

async fn watch_chats(session: &Arc<Session>) -> anyhow::Result<()> {
    // Subscribe before loading so nothing pushed during the load is missed.
    let (_messages_sub, messages) = session.history().message_channel();
    let (_created_sub, created) = session.chats().created_chats().subscribe_channel();

    let mut list = ChatList::new(session.clone());
    list.load().await.context("loading chats")?;
    print_rows(&list.rows());

    if !session.is_live() {
        warn!("No live connection, not following updates");
        return Ok(());
    }

    let mut expired = session.session_expired();
    tokio::select! {
        _ = list.run(messages, created, |list| print_rows(&list.rows())) => {}
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        _ = expired.wait_for(|expired| *expired) => warn!("Session expired, sign in again"),
    }
    Ok(())
}

async fn show_history(session: &Arc<Session>, config: &Config, chat_id: ChatId, pages: u32) -> anyhow::Result<()> {
    let mut conversation = Conversation::open(session.clone(), chat_id, config.page_size).await?;
    for _ in 1..pages {
        if conversation.load_more().await? == 0 {
            break;
        }
    }

    println!("# {}", conversation.title());
    for message in conversation.messages().iter().rev() {
        println!(
            "[{}] {}: {}",
            message.created_at.format("%Y-%m-%d %H:%M"),
            conversation.author(message),
            message.text.as_deref().unwrap_or_default()
        );
    }
    if conversation.has_more() {
        println!("(older messages available)");
    }
    Ok(())
}

fn send(session: &Session, chat_id: ChatId, text: &str) -> anyhow::Result<()> {
    if !session.is_live() {
        bail!("no live connection, message not sent");
    }
    session.send_message(text, chat_id);
    Ok(())
}

async fn show_friends(session: &Session) -> anyhow::Result<()> {
    for friend in session.list_friends().await? {
        println!("{}\t{}", friend.id, friend.display_name());
    }
    Ok(())
}

async fn start_dm(session: &Session, user_id: UserId) -> anyhow::Result<()> {
    let chat_id = open_direct_chat(session, user_id).await?;
    println!("{}", chat_id);
    Ok(())
}

fn print_rows(rows: &[ChatRow]) {
    println!("--");
    for row in rows {
        let when = row
            .last_activity
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "{}\t{:<16}\t{}\t{}",
            row.chat_id,
            when,
            row.title,
            row.preview.as_deref().unwrap_or_default()
        );
    }
}
