use chrono::SecondsFormat;
use colored::{ColoredString, Colorize};
use hookline::{
    eventlog::{EventKind, LogEntry},
    graph::{Conversation, Message},
};

/// One-line rendering of a log entry: timestamp then summary
pub fn entry_line(entry: &LogEntry) -> String {
    format!(
        "{} {}",
        entry
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Millis, true)
            .dimmed(),
        paint(entry.kind, entry.summary())
    )
}

fn paint(kind: EventKind, text: String) -> ColoredString {
    match kind {
        EventKind::Error => text.red(),
        EventKind::ApiCall | EventKind::ApiResponse => text.cyan(),
        EventKind::Verification => text.yellow(),
        EventKind::Received | EventKind::Processed => text.normal(),
    }
}

pub fn conversation_line(conversation: &Conversation) -> String {
    let who: Vec<&str> = conversation
        .participants()
        .iter()
        .map(|p| p.username.as_deref().unwrap_or(p.id.as_str()))
        .collect();
    format!(
        "{}  {}  {}",
        conversation.id.bold(),
        conversation.updated_time.as_deref().unwrap_or("-"),
        who.join(", ")
    )
}

pub fn message_line(message: &Message) -> String {
    let from = message
        .from
        .as_ref()
        .map(|p| p.username.as_deref().unwrap_or(p.id.as_str()))
        .unwrap_or("?");
    format!(
        "{}  {}: {}",
        message.created_time.as_deref().unwrap_or("-").dimmed(),
        from.bold(),
        message.message.as_deref().unwrap_or("<no text>")
    )
}
