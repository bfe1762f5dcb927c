//! `!poll` text commands: parsing and execution against the poll engine.

use eternity_core::poll::{Delivery, PollEngine};
use eternity_core::{render, CoreError, DirectorySource, NotificationSink};
use eternity_models::{NewPoll, Selector};
use eternity_util::args::split_args;

pub const PREFIX: &str = "!poll";

const HELP: &str = "\
**!poll help**
Create and run guild polls. A poll closes on its own when its deadline passes \
or every target has responded, and the results are posted here.

Usage:
* !poll create <named|anonymous> <ALL|job role|user:nickname>[,...] <title> <choice>[,...] <hours>
  * Quote arguments that contain spaces. Duration is 1 to {max} hours.
* !poll describe <title>
  <description on the following lines>
  * Only before the poll starts.
* !poll start <title>
* !poll resend <title>
  * Re-notifies members who have not responded yet.
* !poll info <title>
* !poll list
* !poll result <title>
  * Only for finished polls.
* !poll delete <title>
Members answer in a direct message with `!poll vote <poll id> <choice number>`.";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Create(NewPoll),
    Describe { title: String, body: String },
    Start(String),
    Resend(String),
    List,
    Info(String),
    Result(String),
    Delete(String),
    Vote { poll_id: i64, choice: i64 },
    Help,
}

impl Command {
    fn is_vote(&self) -> bool {
        matches!(self, Command::Vote { .. })
    }
}

/// A message relayed from the chat gateway.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub author_id: i64,
    /// `None` for direct messages.
    pub channel_id: Option<i64>,
    pub content: String,
}

fn usage(command: &str) -> String {
    format!("Wrong usage of `{PREFIX} {command}`. Send `{PREFIX} help` for the syntax.")
}

fn single_title(command: &str, args: &[String]) -> Result<String, String> {
    match args {
        [title] => Ok(title.clone()),
        _ => Err(usage(command)),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',').map(|item| item.trim().to_string()).collect()
}

fn parse_create(args: &[String]) -> Result<Command, String> {
    let [kind, targets, title, choices, hours] = args else {
        return Err(usage("create"));
    };
    let identifiable = match kind.as_str() {
        "named" => true,
        "anonymous" => false,
        _ => return Err("Poll kind must be `named` or `anonymous`.".to_string()),
    };
    let duration_hours = hours
        .parse::<i64>()
        .map_err(|_| "Duration must be a whole number of hours.".to_string())?;
    Ok(Command::Create(NewPoll {
        title: title.clone(),
        identifiable,
        targets: split_list(targets)
            .iter()
            .map(|t| Selector::parse(t))
            .collect(),
        choices: split_list(choices),
        duration_hours,
    }))
}

fn parse_vote(args: &[String]) -> Result<Command, String> {
    let [poll_id, choice] = args else {
        return Err(usage("vote"));
    };
    let poll_id = poll_id
        .parse::<i64>()
        .map_err(|_| "Poll id must be a number.".to_string())?;
    let choice = choice
        .parse::<i64>()
        .map_err(|_| "Choice must be a number.".to_string())?;
    Ok(Command::Vote { poll_id, choice })
}

/// Parse a message. `None` means the message is not a poll command at all.
pub fn parse(content: &str) -> Option<Result<Command, String>> {
    let rest = content.trim_start().strip_prefix(PREFIX)?;
    if !(rest.is_empty() || rest.starts_with(char::is_whitespace)) {
        return None;
    }

    let (header, body) = match rest.split_once('\n') {
        Some((header, body)) => (header, Some(body)),
        None => (rest, None),
    };
    let args = split_args(header);
    let Some((sub, args)) = args.split_first() else {
        return Some(Ok(Command::Help));
    };

    let parsed = match sub.as_str() {
        "create" => parse_create(args),
        "describe" => match (single_title("describe", args), body) {
            (Ok(title), Some(body)) => Ok(Command::Describe {
                title,
                body: body.to_string(),
            }),
            _ => Err(usage("describe")),
        },
        "start" => single_title("start", args).map(Command::Start),
        "resend" => single_title("resend", args).map(Command::Resend),
        "list" => Ok(Command::List),
        "info" => single_title("info", args).map(Command::Info),
        "result" => single_title("result", args).map(Command::Result),
        "delete" => single_title("delete", args).map(Command::Delete),
        "vote" => parse_vote(args),
        _ => Ok(Command::Help),
    };
    Some(parsed)
}

pub fn help_text(max_duration_hours: i64) -> String {
    HELP.replace("{max}", &max_duration_hours.to_string())
}

/// Text shown to whoever issued a command that failed.
pub fn error_reply(err: &CoreError) -> String {
    match err {
        CoreError::DuplicateTitle(title) => format!("A poll titled '{title}' already exists."),
        CoreError::NotFound => "No poll with that title.".to_string(),
        CoreError::AlreadyStarted => "That poll has already started.".to_string(),
        CoreError::AlreadyResponded => "You have already responded to this poll.".to_string(),
        CoreError::PollNotActive => {
            "That poll does not exist or is not accepting responses.".to_string()
        }
        CoreError::InvalidChoice(choice) => format!("Choice {choice} is not one of the options."),
        CoreError::UnknownTarget(target) => format!("Unknown target '{target}'."),
        CoreError::UpstreamUnavailable(_) => {
            "Discord is unavailable right now, please try again later.".to_string()
        }
        CoreError::NotFinished => "That poll has not finished yet.".to_string(),
        CoreError::BadRequest(reason) => format!("Invalid poll: {reason}."),
        CoreError::Database(err) => {
            tracing::error!("command failed with database error: {err}");
            "Something went wrong, please try again.".to_string()
        }
    }
}

fn delivery_reply(verb: &str, delivery: &Delivery) -> String {
    let poll = &delivery.poll;
    let mut reply = format!("Poll '{}' {verb}. ", poll.title);
    if poll.identifiable {
        let names: Vec<&str> = delivery
            .targeted
            .iter()
            .map(|m| m.display_name.as_str())
            .collect();
        reply.push_str(&format!("Notified: {}", names.join(", ")));
    } else {
        reply.push_str(&format!("Notified {} members", delivery.targeted.len()));
    }
    let failed = delivery.targeted.len().saturating_sub(delivery.delivered);
    if failed > 0 {
        reply.push_str(&format!(" ({failed} could not be reached)"));
    }
    reply.push('.');
    reply
}

async fn run<S, N>(engine: &PollEngine<S, N>, author_id: i64, command: Command) -> Result<String, CoreError>
where
    S: DirectorySource,
    N: NotificationSink,
{
    let offset = engine.settings().display_offset;
    match command {
        Command::Create(new_poll) => {
            let poll = engine.create(new_poll).await?;
            Ok(format!(
                "Poll '{}' created (id {}). Add a description with `{PREFIX} describe`, then `{PREFIX} start` it.",
                poll.title, poll.id
            ))
        }
        Command::Describe { title, body } => {
            let poll = engine.set_description(&title, &body).await?;
            Ok(format!("Description saved for poll '{}'.", poll.title))
        }
        Command::Start(title) => {
            let delivery = engine.start(&title).await?;
            Ok(delivery_reply("started", &delivery))
        }
        Command::Resend(title) => {
            let delivery = engine.resend(&title).await?;
            Ok(delivery_reply("re-sent", &delivery))
        }
        Command::List => {
            let polls = engine.list_polls().await?;
            Ok(render::poll_list(&polls, engine.now(), offset))
        }
        Command::Info(title) => {
            let poll = engine.find_by_title(&title).await?;
            Ok(render::poll_info(&poll, offset))
        }
        Command::Result(title) => {
            let results = engine.results(&title).await?;
            Ok(render::results(&results))
        }
        Command::Delete(title) => {
            let poll = engine.delete(&title).await?;
            Ok(format!("Poll '{}' deleted.", poll.title))
        }
        Command::Vote { poll_id, choice } => {
            let response = engine.record_response(poll_id, author_id, choice).await?;
            Ok(format!(
                "Your response '{}' to poll {} was recorded. Thank you.",
                response.choice, poll_id
            ))
        }
        Command::Help => Ok(help_text(engine.settings().max_duration_hours)),
    }
}

/// Handle one relayed message and produce the reply, if any.
///
/// Operator commands are only honored in the poll channel and votes only in
/// direct messages; everything else is ignored.
pub async fn execute<S, N>(engine: &PollEngine<S, N>, message: &Inbound) -> Option<String>
where
    S: DirectorySource,
    N: NotificationSink,
{
    let parsed = parse(&message.content)?;

    match message.channel_id {
        None => {
            let command = match parsed {
                Ok(command) if command.is_vote() => command,
                Err(reason) if message.content.split_whitespace().nth(1) == Some("vote") => {
                    return Some(reason)
                }
                _ => return None,
            };
            if engine.directory().lookup_member(message.author_id).is_none() {
                return Some("Only guild members can respond to polls.".to_string());
            }
            Some(match run(engine, message.author_id, command).await {
                Ok(reply) => reply,
                Err(err) => error_reply(&err),
            })
        }
        Some(channel_id) if channel_id == engine.settings().poll_channel_id => {
            let command = match parsed {
                Ok(command) if !command.is_vote() => command,
                Ok(_) => return Some("Respond to polls in a direct message to the bot.".to_string()),
                Err(reason) => return Some(reason),
            };
            tracing::info!("command from {} in poll channel: {:?}", message.author_id, command);
            Some(match run(engine, message.author_id, command).await {
                Ok(reply) => reply,
                Err(err) => error_reply(&err),
            })
        }
        Some(_) => None,
    }
}
