use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use nextext_api::ClientConfig;
use nextext_client::{ChatClient, ConversationView};
use nextext_types::models::{Identity, Message, UserId};

#[derive(Parser)]
#[command(name = "nextext", about = "Terminal client for nextext chat")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and remember the session
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
    },
    /// Create an account, then log in with it
    Register {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the logged-in user
    Whoami,
    /// List people to chat with
    Contacts {
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Open a conversation; stdin lines are sent, live messages printed
    Chat { partner_id: UserId },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nextext=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env()?;
    info!("Using backend {}", config.api_base());
    let client = ChatClient::from_config(config)?;

    match cli.command {
        Command::Login { username, password } => {
            let me = client.login(&username, &password).await?;
            println!("Logged in as {} (id {})", me.username, me.id);
        }
        Command::Register {
            username,
            email,
            password,
        } => {
            let me = client.register(&username, &email, &password).await?;
            println!("Registered and logged in as {} (id {})", me.username, me.id);
        }
        Command::Logout => {
            client.logout().await;
            println!("Logged out");
        }
        Command::Whoami => {
            let me = restore(&client).await?;
            println!("{} (id {})", me.username, me.id);
        }
        Command::Contacts { search } => {
            restore(&client).await?;
            let contacts = client.contacts().await?;
            let shown = contacts.search(search.as_deref().unwrap_or(""));
            if shown.is_empty() {
                println!("No users found.");
            }
            for contact in shown {
                println!("{:>6}  {}", contact.id, contact.username);
            }
        }
        Command::Chat { partner_id } => {
            restore(&client).await?;
            let view = client.open_conversation(partner_id).await?;
            run_chat(view).await?;
            client.channel().close().await;
        }
    }

    Ok(())
}

async fn restore(client: &ChatClient) -> anyhow::Result<Identity> {
    client
        .restore()
        .await?
        .context("not logged in; run `nextext login` first")
}

async fn run_chat(mut view: ConversationView) -> anyhow::Result<()> {
    println!("-- {} --", view.partner().username);
    for message in view.timeline() {
        println!("{}", render(&view, message));
    }
    if !view.is_live() {
        println!("(live updates unavailable)");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(text) => {
                        if let Err(e) = view.send(&text).await {
                            eprintln!("{}", e);
                        }
                    }
                    None => break,
                }
            }
            message = view.next_message() => {
                match message {
                    Some(message) => println!("{}", render(&view, &message)),
                    None => {
                        println!("(connection closed)");
                        break;
                    }
                }
            }
        }
    }
    Ok(())
}

fn render(view: &ConversationView, message: &Message) -> String {
    let author = if message.sender_id == view.viewer().id {
        view.viewer().username.as_str()
    } else {
        view.partner().username.as_str()
    };
    let time = message
        .sent_at()
        .map(|ts| ts.format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".into());
    format!("[{}] {}: {}", time, author, message.content)
}
