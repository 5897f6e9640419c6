use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::*;

use crate::model::{Participant, Poll, Room};
use crate::timeline::TimelineItem;

#[derive(Parser)]
#[command(name = "santa-sync")]
#[command(version)]
#[command(about = "Terminal client for a Secret Santa gift-exchange room")]
pub struct Args {
    /// TOML config file (api_url, ws_url, web_url, poll_interval_ms, ...)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Room API base URL, e.g. http://127.0.0.1:8000/api
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Live channel base URL (defaults to the API host with ws:// or wss://)
    #[arg(long, global = true)]
    pub ws_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Create a room as its host and open the lobby
    Create {
        /// Your display name
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        room_name: String,
        /// Exchange date, e.g. 2026-12-20
        #[arg(long)]
        date: Option<String>,
        #[arg(long, default_value = "")]
        preferences: String,
        #[arg(long, default_value = "")]
        secret: String,
    },
    /// Join a room by code or share link and open the lobby
    Join {
        /// Room code or share link
        code: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        preferences: String,
        #[arg(long, default_value = "")]
        secret: String,
    },
    /// Print a room once
    Show { code: String },
    /// Check the backend's health endpoint
    Health,
}

/// A line typed into the lobby.
#[derive(Debug, Clone, PartialEq)]
pub enum LobbyCommand {
    Chat(String),
    Poll { question: String, options: Vec<String> },
    Vote { poll_id: String, option: String },
    Start,
    Kick(String),
    Close,
    Who,
    Match,
    Link,
    Leave,
    Help,
    Unknown(String),
}

pub const LOBBY_HELP: &str = "\
commands:
  <text>                         send a chat message
  /poll question | opt | opt ... create a poll
  /vote <poll-id> <option>       vote (again to change your vote)
  /start                         run the draw (host)
  /kick <participant-id>         remove a participant (host)
  /close                         delete the room (host)
  /who  /match  /link  /leave  /help";

impl LobbyCommand {
    /// Parse one input line. Returns `None` for blank input.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Some(LobbyCommand::Chat(line.to_string()));
        };
        let (cmd, arg) = match rest.split_once(char::is_whitespace) {
            Some((c, a)) => (c, a.trim()),
            None => (rest, ""),
        };
        Some(match cmd {
            "poll" => {
                let mut parts = arg.split('|').map(|p| p.trim().to_string());
                let question = parts.next().unwrap_or_default();
                LobbyCommand::Poll {
                    question,
                    options: parts.collect(),
                }
            }
            "vote" => match arg.split_once(char::is_whitespace) {
                Some((id, option)) => LobbyCommand::Vote {
                    poll_id: id.to_string(),
                    option: option.trim().to_string(),
                },
                None => LobbyCommand::Unknown(line.to_string()),
            },
            "kick" if !arg.is_empty() => LobbyCommand::Kick(arg.to_string()),
            "start" => LobbyCommand::Start,
            "close" => LobbyCommand::Close,
            "who" => LobbyCommand::Who,
            "match" => LobbyCommand::Match,
            "link" => LobbyCommand::Link,
            "leave" | "quit" => LobbyCommand::Leave,
            "help" => LobbyCommand::Help,
            _ => LobbyCommand::Unknown(line.to_string()),
        })
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// One timeline entry as terminal text. `me` is the viewer's name and id.
pub fn render_item(item: &TimelineItem, me_name: &str, me_id: &str) -> String {
    match item {
        TimelineItem::System { text } => text.dimmed().italic().to_string(),
        TimelineItem::Chat { sender, text } if sender == me_name => {
            format!("{} {}", "you:".green().bold(), text)
        }
        TimelineItem::Chat { sender, text } => {
            format!("{} {}", format!("{sender}:").cyan().bold(), text)
        }
        TimelineItem::Poll(poll) => render_poll(poll, me_id),
    }
}

pub fn render_poll(poll: &Poll, me_id: &str) -> String {
    let tally = poll.tally(Some(me_id));
    let mut out = format!(
        "{} {}  {}\n",
        "poll".magenta().bold(),
        poll.question.bold(),
        format!("[{}] by {}", poll.id, poll.created_by).dimmed()
    );
    for (option, votes) in &tally.counts {
        let mark = if tally.my_vote.as_deref() == Some(option.as_str()) {
            "*".green().bold()
        } else {
            " ".normal()
        };
        out.push_str(&format!(
            "  {mark} {option:<20} {votes:>3} {} ({:.0}%)\n",
            if *votes == 1 { "vote " } else { "votes" },
            tally.percentage(option)
        ));
    }
    out.push_str(&format!(
        "  {} total {}",
        tally.total,
        if tally.total == 1 { "vote" } else { "votes" }
    ));
    out
}

pub fn render_room(room: &Room, me_id: Option<&str>) -> String {
    let mut out = format!(
        "{} {}  code {}\n",
        "room".red().bold(),
        room.display_name().bold(),
        room.code.yellow().bold()
    );
    if let Some(date) = &room.exchange_date {
        out.push_str(&format!("  exchange on {date}\n"));
    }
    out.push_str(&format!(
        "  {} participant(s){}\n",
        room.participants.len(),
        if room.is_started { ", draw done" } else { "" }
    ));
    for p in &room.participants {
        out.push_str(&format!("  {}\n", render_participant(p, me_id)));
    }
    out.trim_end().to_string()
}

fn render_participant(p: &Participant, me_id: Option<&str>) -> String {
    let mut line = format!("{} {}", p.id.dimmed(), p.name);
    if me_id == Some(p.id.as_str()) {
        line.push_str(&" (you)".red().to_string());
    }
    if p.is_host {
        line.push_str(&" host".red().to_string());
    }
    line
}

pub fn render_match(giftee: &Participant) -> String {
    let prefs = if giftee.preferences.is_empty() {
        "No preferences provided."
    } else {
        &giftee.preferences
    };
    let secret = if giftee.secret_message.is_empty() {
        "No secret message."
    } else {
        &giftee.secret_message
    };
    format!(
        "{} {}\n  wishes: {}\n  secret: {}",
        "you are gifting".green().bold(),
        giftee.name.bold(),
        prefs,
        secret
    )
}
