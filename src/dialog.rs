//! Bot Dialog
//!
//! Replies to messages addressed to the bot itself (`bot: help`).

/// Report sections linked by the `website` command
const REPORT_ANCHORS: &[(&str, &str)] = &[
    ("top posters of the day", "top_day"),
    ("top posters of the week", "top_week"),
    ("messages per hour", "hours"),
    ("messages per weekday", "weekdays"),
    ("relationship graph", "graph"),
];

/// Dialog commands understood by the bot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogCommand {
    Help,
    Website,
}

impl DialogCommand {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "help" | "1" => Some(DialogCommand::Help),
            "website" | "2" => Some(DialogCommand::Website),
            _ => None,
        }
    }
}

/// Lines to post in the channel, or `None` when the message is not a command
pub fn reply(text: &str, website_url: &str) -> Option<Vec<String>> {
    let lines = match DialogCommand::parse(text)? {
        DialogCommand::Help => vec![
            "Available commands:".to_string(),
            "1 - help: this list".to_string(),
            "2 - website: links to the channel statistics".to_string(),
        ],
        DialogCommand::Website => {
            let base = website_url.trim_end_matches('/');
            REPORT_ANCHORS
                .iter()
                .map(|(label, anchor)| format!("{}: {}#{}", label, base, anchor))
                .collect()
        }
    };
    Some(lines)
}
