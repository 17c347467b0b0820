//! Reminder email and notification text

use chrono::{DateTime, Utc};

use crate::schedule::{Frequency, SessionSchedule};

pub const REMINDER_TITLE: &str = "Session Today!";

/// Rendered reminder for one schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub subject: String,
    pub html: String,
    pub notification: String,
}

pub fn subject_for(frequency: Frequency) -> &'static str {
    match frequency {
        Frequency::Weekly => "Time for Your Weekly Self-Care",
        Frequency::Monthly => "It's Time for Your Monthly Reflection",
        Frequency::Minute => "Your Session Is Coming Up",
    }
}

fn cadence_word(frequency: Frequency) -> &'static str {
    match frequency {
        Frequency::Weekly => "weekly",
        Frequency::Monthly => "monthly",
        Frequency::Minute => "upcoming",
    }
}

impl Reminder {
    pub fn render(schedule: &SessionSchedule, due: DateTime<Utc>) -> Self {
        let name = if schedule.user_name.is_empty() {
            "there".to_string()
        } else {
            escape_html(&schedule.user_name)
        };

        let html = format!(
            concat!(
                "<div style=\"font-family: Arial, sans-serif; color: #333;\">",
                "<p>Hi {name},</p>",
                "<p>This is your {cadence} reminder to pause and reconnect with yourself.</p>",
                "<p>Whether it's journaling, painting, or simply breathing, your self-care matters.</p>",
                "<p>Next session date: <strong>{date}</strong></p>",
                "<p>Take good care,</p>",
                "<p><strong>Your Virtual Therapist</strong></p>",
                "</div>"
            ),
            name = name,
            cadence = cadence_word(schedule.frequency),
            date = due.format("%B %-d, %Y"),
        );

        Self {
            subject: subject_for(schedule.frequency).to_string(),
            html,
            notification: format!(
                "Friendly reminder: Your therapy session is scheduled for today at {} UTC.",
                due.format("%H:%M")
            ),
        }
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
