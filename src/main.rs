use clap::Parser;
use colored::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use santa_sync::cli::{self, Args, Command, LobbyCommand, LOBBY_HELP};
use santa_sync::model::{CreateRoomRequest, JoinRequest};
use santa_sync::timeline::TimelineChange;
use santa_sync::transport::{ApiClient, RoomApi};
use santa_sync::{ClientConfig, Result, SantaError, Session, SessionNotice};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = ClientConfig::load(args.config.as_deref())?;
    if let Some(url) = args.api_url {
        config.api_base = url.trim_end_matches('/').to_string();
    }
    if let Some(url) = args.ws_url {
        config.ws_base = Some(url);
    }

    match args.command {
        Command::Health => {
            let status = ApiClient::new(&config)?.health().await?;
            if status.is_healthy() {
                println!("{} {}", "healthy".green().bold(), status.version.unwrap_or_default());
            } else {
                println!(
                    "{} {}",
                    "unhealthy".red().bold(),
                    status.error.unwrap_or_default()
                );
            }
            Ok(())
        }
        Command::Show { code } => {
            let code = santa_sync::model::code_from_link(&code)
                .ok_or_else(|| SantaError::Validation("room code is empty".into()))?;
            let room = ApiClient::new(&config)?.fetch_room(&code).await?;
            println!("{}", cli::render_room(&room, None));
            Ok(())
        }
        Command::Create {
            name,
            room_name,
            date,
            preferences,
            secret,
        } => {
            let (mut session, notices) = Session::connect(config)?;
            let room = session
                .create_room(CreateRoomRequest {
                    room_name,
                    exchange_date: date,
                    host_name: name,
                    host_preferences: preferences,
                    host_secret_message: secret,
                })
                .await?;
            println!("{}", cli::render_room(&room, session.current_user().map(|u| u.id).as_deref()));
            if let Some(link) = session.share_link() {
                println!("share: {}", link.underline());
            }
            lobby(&mut session, notices).await
        }
        Command::Join {
            code,
            name,
            preferences,
            secret,
        } => {
            let (mut session, notices) = Session::connect(config)?;
            let room = session
                .join_room(JoinRequest {
                    room_code: code,
                    name,
                    preferences,
                    secret_message: secret,
                })
                .await?;
            println!("{}", cli::render_room(&room, session.current_user().map(|u| u.id).as_deref()));
            lobby(&mut session, notices).await
        }
    }
}

/// Interactive lobby: stdin commands on one side, session notices on the other.
async fn lobby(
    session: &mut Session,
    mut notices: mpsc::UnboundedReceiver<SessionNotice>,
) -> Result<()> {
    for item in session.timeline() {
        print_item(session, &item);
    }
    if let Some(giftee) = session.my_match() {
        println!("{}", cli::render_match(&giftee));
    }
    println!("{}", "type /help for commands".dimmed());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut had_match = session.my_match().is_some();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) | Err(_) => break,
                };
                let Some(cmd) = LobbyCommand::parse(&line) else { continue };
                match handle_command(session, cmd).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => eprintln!("{} {}", "!".red().bold(), e),
                }
            }
            notice = notices.recv() => {
                let Some(notice) = notice else { break };
                match notice {
                    SessionNotice::Timeline(TimelineChange::Appended(idx))
                    | SessionNotice::Timeline(TimelineChange::Replaced(idx)) => {
                        if let Some(item) = session.timeline().get(idx) {
                            print_item(session, item);
                        }
                    }
                    SessionNotice::RoomRefreshed => {
                        if !had_match {
                            if let Some(giftee) = session.my_match() {
                                had_match = true;
                                println!("{}", cli::render_match(&giftee));
                            }
                        }
                    }
                    SessionNotice::RoomClosed => {
                        println!("{}", "Room has been closed by the host.".red().bold());
                        break;
                    }
                    SessionNotice::Removed => {
                        println!("{}", "You have been removed from the room by the host.".red().bold());
                        break;
                    }
                    SessionNotice::ChannelClosed => {
                        println!("{}", "chat disconnected".dimmed());
                    }
                    SessionNotice::ChannelError(e) => {
                        eprintln!("{} {}", "chat error:".yellow(), e);
                    }
                }
            }
        }
    }

    session.leave().await;
    Ok(())
}

/// Returns `Ok(false)` when the lobby should exit.
async fn handle_command(session: &mut Session, cmd: LobbyCommand) -> Result<bool> {
    match cmd {
        LobbyCommand::Chat(text) => session.send_chat(&text)?,
        LobbyCommand::Poll { question, options } => {
            let poll = session.create_poll(&question, &options).await?;
            println!("{} {}", "poll created:".dimmed(), poll.id);
        }
        LobbyCommand::Vote { poll_id, option } => session.vote(&poll_id, &option).await?,
        LobbyCommand::Start => match session.start_game().await? {
            Some(giftee) => println!("{}", cli::render_match(&giftee)),
            None => println!("{}", "draw done".green()),
        },
        LobbyCommand::Kick(id) => {
            session.remove_participant(&id).await?;
            println!("{}", "Participant removed successfully".green());
        }
        LobbyCommand::Close => {
            session.close_room().await?;
            println!("{}", "Room closed and data deleted.".green());
            return Ok(false);
        }
        LobbyCommand::Who => match session.room() {
            Some(room) => println!(
                "{}",
                cli::render_room(&room, session.current_user().map(|u| u.id).as_deref())
            ),
            None => return Err(SantaError::NotInRoom),
        },
        LobbyCommand::Match => match session.my_match() {
            Some(giftee) => println!("{}", cli::render_match(&giftee)),
            None => println!("{}", "no match yet, waiting for the host to start".dimmed()),
        },
        LobbyCommand::Link => match session.share_link() {
            Some(link) => println!("{}", link.underline()),
            None => return Err(SantaError::NotInRoom),
        },
        LobbyCommand::Leave => return Ok(false),
        LobbyCommand::Help => println!("{LOBBY_HELP}"),
        LobbyCommand::Unknown(line) => {
            return Err(SantaError::Validation(format!("unknown command: {line}")));
        }
    }
    Ok(true)
}

fn print_item(session: &Session, item: &santa_sync::TimelineItem) {
    let me = session.current_user();
    let (name, id) = me
        .as_ref()
        .map(|u| (u.name.as_str(), u.id.as_str()))
        .unwrap_or(("", ""));
    println!("{}", cli::render_item(item, name, id));
}
