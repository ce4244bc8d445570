//! Line-oriented front end.
//!
//! [`parse_line`] turns one line of user input into an [`Input`];
//! [`Input::into_command`] resolves numbered choices against the current
//! [`Snapshot`] and yields the [`ComposerCommand`] to send.  [`render_event`]
//! formats composer events for the terminal.

use std::fmt::Write as _;

use thiserror::Error;

use crate::composer::{ComposerCommand, ComposerEvent, Snapshot, Source};
use crate::conversation::{preset_sentences, Context, Role, UnknownTag, QUICK_PHRASES};

pub const HELP: &str = "\
commands:
  context <id> [role]   choose a scenario (restaurant, hospital, classroom, cafe, store, bank)
  start                 begin the conversation
  rec / stop            record the partner
  pick <n|text>         add a candidate to the sentence
  preset <n|text>       replace the sentence with a preset
  speak                 say the sentence
  clear                 discard the sentence
  say <n|text>          say a quick phrase right away
  history [n]           show the conversation
  status                show the current state
  help / quit";

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// A 1-based list index or literal text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    Index(usize),
    Text(String),
}

impl Choice {
    fn parse(arg: &str) -> Self {
        match arg.parse::<usize>() {
            Ok(n) => Choice::Index(n),
            Err(_) => Choice::Text(arg.to_string()),
        }
    }

    /// Look the choice up in `options`.
    pub fn resolve<S: AsRef<str>>(&self, options: &[S]) -> Result<String, ParseError> {
        match self {
            Choice::Text(text) => Ok(text.clone()),
            Choice::Index(n) => n
                .checked_sub(1)
                .and_then(|i| options.get(i))
                .map(|s| s.as_ref().to_string())
                .ok_or(ParseError::OutOfRange {
                    index: *n,
                    len: options.len(),
                }),
        }
    }
}

/// One parsed line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Context {
        context: Context,
        role: Option<Role>,
    },
    Begin,
    Record,
    Stop,
    Pick(Choice),
    Preset(Choice),
    Speak,
    Clear,
    Say(Choice),
    History(Option<usize>),
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty input")]
    Empty,
    #[error("unknown command {0:?} (try \"help\")")]
    UnknownCommand(String),
    #[error("{0} needs an argument")]
    MissingArgument(&'static str),
    #[error(transparent)]
    UnknownTag(#[from] UnknownTag),
    #[error("not a number: {0:?}")]
    BadNumber(String),
    #[error("no item {index} (there are {len})")]
    OutOfRange { index: usize, len: usize },
}

/// Parse one line of input.
pub fn parse_line(line: &str) -> Result<Input, ParseError> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let input = match word.to_lowercase().as_str() {
        "" => return Err(ParseError::Empty),
        "context" | "ctx" => {
            let mut args = rest.split_whitespace();
            let context = args
                .next()
                .ok_or(ParseError::MissingArgument("context"))?
                .parse::<Context>()?;
            let role = args.next().map(str::parse::<Role>).transpose()?;
            Input::Context { context, role }
        }
        "start" | "begin" => Input::Begin,
        "rec" | "record" => Input::Record,
        "stop" => Input::Stop,
        "pick" | "p" => Input::Pick(Choice::parse(required(rest, "pick")?)),
        "preset" => Input::Preset(Choice::parse(required(rest, "preset")?)),
        "speak" => Input::Speak,
        "clear" => Input::Clear,
        "say" => Input::Say(Choice::parse(required(rest, "say")?)),
        "history" | "log" => {
            if rest.is_empty() {
                Input::History(None)
            } else {
                let n = rest
                    .parse::<usize>()
                    .map_err(|_| ParseError::BadNumber(rest.to_string()))?;
                Input::History(Some(n))
            }
        }
        "status" => Input::Status,
        "help" | "?" => Input::Help,
        "quit" | "exit" | "q" => Input::Quit,
        other => return Err(ParseError::UnknownCommand(other.to_string())),
    };
    Ok(input)
}

fn required<'a>(rest: &'a str, command: &'static str) -> Result<&'a str, ParseError> {
    if rest.is_empty() {
        Err(ParseError::MissingArgument(command))
    } else {
        Ok(rest)
    }
}

impl Input {
    /// The composer command for this input, resolving numbered choices
    /// against `snapshot`.  `Help` and `Quit` have none.
    pub fn into_command(self, snapshot: &Snapshot) -> Result<Option<ComposerCommand>, ParseError> {
        let command = match self {
            Input::Context { context, role } => ComposerCommand::SelectContext { context, role },
            Input::Begin => ComposerCommand::Begin,
            Input::Record => ComposerCommand::StartCapture,
            Input::Stop => ComposerCommand::StopCapture,
            Input::Pick(choice) => {
                ComposerCommand::ChooseToken(choice.resolve(&snapshot.candidates)?)
            }
            Input::Preset(choice) => ComposerCommand::ChoosePreset(
                choice.resolve(preset_sentences(snapshot.context))?,
            ),
            Input::Speak => ComposerCommand::Speak,
            Input::Clear => ComposerCommand::Clear,
            Input::Say(choice) => ComposerCommand::SpeakQuick(choice.resolve(QUICK_PHRASES)?),
            Input::History(limit) => ComposerCommand::History(limit),
            Input::Status => ComposerCommand::Status,
            Input::Help | Input::Quit => return Ok(None),
        };
        Ok(Some(command))
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// `[1] a  [2] b ...`, or a dash when empty.
pub fn numbered<S: AsRef<str>>(items: &[S]) -> String {
    if items.is_empty() {
        return "-".to_string();
    }
    let mut out = String::new();
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str("  ");
        }
        let _ = write!(out, "[{}] {}", i + 1, item.as_ref());
    }
    out
}

/// Terminal text for `event`.
pub fn render_event(event: &ComposerEvent) -> String {
    match event {
        ComposerEvent::ContextSelected { context, role } => {
            let mut line = format!("상황: {}", context.label());
            if let Some(role) = role {
                let _ = write!(line, " ({})", role.label_in(*context));
            }
            let _ = write!(line, "\n상용구: {}", numbered(preset_sentences(Some(*context))));
            line
        }
        ComposerEvent::Started { message } => format!("대화 시작: {message}"),
        ComposerEvent::CaptureStarted => "녹음 중... (stop 으로 종료)".to_string(),
        ComposerEvent::PartnerSpoke {
            transcript,
            candidates,
            source,
        } => format!(
            "상대방: {transcript}{}\n후보: {}",
            source_note(*source),
            numbered(candidates)
        ),
        ComposerEvent::SentenceChanged {
            sentence,
            candidates,
            source,
        } => format!(
            "문장: {}{}\n후보: {}",
            if sentence.is_empty() { "-" } else { sentence.as_str() },
            source_note(*source),
            numbered(candidates)
        ),
        ComposerEvent::Spoken { text } => format!("나: {text}"),
        ComposerEvent::Finalized { final_sentence } => match final_sentence {
            Some(sentence) => format!("완료: {sentence}"),
            None => "완료 (서버 응답 없음)".to_string(),
        },
        ComposerEvent::History(entries) => {
            if entries.is_empty() {
                "(대화 기록 없음)".to_string()
            } else {
                entries
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        ComposerEvent::Status(snapshot) => render_status(snapshot),
        ComposerEvent::Rejected { command, reason } => format!("! {command}: {reason}"),
    }
}

fn source_note(source: Source) -> &'static str {
    match source {
        Source::Fallback => " (오프라인 추천)",
        Source::Server | Source::Local => "",
    }
}

pub fn render_status(snapshot: &Snapshot) -> String {
    let context = snapshot
        .context
        .map(|c| c.label())
        .unwrap_or("-");
    let role = match (snapshot.context, snapshot.role) {
        (Some(context), Some(role)) => role.label_in(context),
        _ => "-",
    };
    format!(
        "상태: {} | 상황: {context} | 역할: {role} | 기록 {}개\n상대방: {}\n문장: {}\n후보: {}",
        snapshot.phase.label(),
        snapshot.history_len,
        snapshot.transcript.as_deref().unwrap_or("-"),
        if snapshot.sentence.is_empty() {
            "-"
        } else {
            snapshot.sentence.as_str()
        },
        numbered(&snapshot.candidates),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
