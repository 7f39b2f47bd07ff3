use crate::dispatch::report::RunTally;

/// Escape text for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Caption of the `/start` banner.
pub fn start_message_html(username: Option<&str>) -> String {
    let name = username
        .filter(|u| !u.trim().is_empty())
        .map(escape_html)
        .unwrap_or_else(|| "there".to_string());

    format!(
        "<b>Hi @{name}!</b> 👋\n\n\
Simply tap the ➕ and ➖ buttons to contribute to the global number. \n\n\
Try our <b>Guess</b> and <b>Leverage</b> modes to earn more $DITTO.\n\n\
Ditto can be whatever. You can be ANYTHING! 🚀✨\n\n\
<i>Join the fun and start playing now!</i> 🎉"
    )
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkKind {
    /// Opens inside Telegram as a Mini App.
    WebApp,
    Url,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkButton {
    pub text: &'static str,
    pub url: String,
    pub kind: LinkKind,
}

impl LinkButton {
    fn url(text: &'static str, url: &str) -> Self {
        Self {
            text,
            url: url.to_string(),
            kind: LinkKind::Url,
        }
    }
}

/// Rows of the keyboard under the `/start` banner.
///
/// Buttons with an empty link are left out, and so are rows left empty.
pub fn start_menu(game_link: &str, quest_link: &str) -> Vec<Vec<LinkButton>> {
    let rows = vec![
        vec![LinkButton {
            text: "Guess and Leverage Game 🎮",
            url: game_link.to_string(),
            kind: LinkKind::WebApp,
        }],
        vec![LinkButton::url("Ditto Quest Idle RPG 👾", quest_link)],
        vec![
            LinkButton::url("X 🌐", "https://x.com/dittocoin"),
            LinkButton::url("Community 👥", "https://t.me/teamditto"),
        ],
        vec![LinkButton::url(
            "Whitepaper 📖",
            "https://team-ditto.notion.site/ABOUT-DITTO-2fb550fd465b4cc08a95d359b7d5809c",
        )],
    ];

    rows.into_iter()
        .map(|row| {
            row.into_iter()
                .filter(|b| !b.url.trim().is_empty())
                .collect::<Vec<_>>()
        })
        .filter(|row| !row.is_empty())
        .collect()
}

/// Operator-facing summary of a finished (or cancelled) run.
///
/// Only counts are shown; per-recipient errors stay in the logs.
pub fn run_summary(label: &str, tally: &RunTally, total_recipients: u64) -> String {
    let title = if label.is_empty() {
        "Broadcast".to_string()
    } else {
        format!("{label} Broadcast")
    };
    let headline = if tally.cancelled {
        format!("⛔ {title} Cancelled")
    } else {
        format!("✅ {title} Completed!")
    };

    let mut out = format!(
        "{headline}\n\n\
📊 Results:\n\
• ✅ Successfully sent: {}\n\
• ❌ Failed: {}\n\
• 📋 Total users: {total_recipients}",
        tally.total_success, tally.total_failure
    );
    if tally.cancelled {
        let skipped = total_recipients.saturating_sub(tally.attempted());
        out.push_str(&format!("\n• ⏭ Not attempted: ~{skipped}"));
    }
    out
}
