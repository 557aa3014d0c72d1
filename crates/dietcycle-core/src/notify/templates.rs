//! Notification and email wording.

use chrono::{DateTime, Utc};

use dietcycle_db::models::Cycle;

use super::WeightStatus;

pub(super) struct Rendered {
    pub title: String,
    pub message: String,
    pub subject: String,
    pub html: String,
}

pub(super) fn plan_generated(
    cycle: &Cycle,
    calorie_target: f64,
    meal_count: usize,
    expected_weight: f64,
) -> (String, String) {
    let title = "Diet Plan Generated".to_owned();
    let message = format!(
        "Cycle {number}: {meal_count} meals at {calorie_target:.0} kcal/day. \
         Expected weight by {end}: {expected_weight:.2} kg.",
        number = cycle.cycle_number,
        end = cycle.end_date.format("%Y-%m-%d"),
    );
    (title, message)
}

pub(super) fn weight_report(
    name: &str,
    status: WeightStatus,
    current: f64,
    expected: f64,
    difference: f64,
) -> Rendered {
    let name = escape_html(name);
    let gap = difference.abs();
    let (message, subject, headline, line) = match status {
        WeightStatus::Above => (
            format!(
                "Your current weight ({current} kg) is {gap:.1} kg above the expected \
                 weight ({expected} kg). Your next plan will be tuned to close the gap."
            ),
            "Weight Check: Above Target",
            "Weight check complete",
            format!("Difference: +{gap:.1} kg above target"),
        ),
        WeightStatus::Below => (
            format!(
                "Your current weight ({current} kg) is {gap:.1} kg below the expected \
                 weight ({expected} kg). Nice progress."
            ),
            "Weight Check: Ahead of Target",
            "Great progress",
            format!("Difference: {gap:.1} kg below target"),
        ),
        WeightStatus::AtTarget => (
            format!("Your current weight ({current} kg) matches the expected weight."),
            "Weight Check: On Target",
            "Right on target",
            "Status: exact match".to_owned(),
        ),
    };

    let html = format!(
        "<h2>{headline}</h2>\
         <p>Hi {name},</p>\
         <ul>\
         <li><strong>Current weight:</strong> {current} kg</li>\
         <li><strong>Expected weight:</strong> {expected} kg</li>\
         <li><strong>{line}</strong></li>\
         </ul>\
         <p>Open your dashboard to see your plan.</p>"
    );

    Rendered {
        title: "Weight Update Recorded".to_owned(),
        message,
        subject: subject.to_owned(),
        html,
    }
}

pub(super) fn feedback_reminder(
    name: &str,
    cycle_number: i32,
    cycle_started: DateTime<Utc>,
    feedback_url: &str,
) -> Rendered {
    let name = escape_html(name);
    let url = escape_html(feedback_url);
    let started = cycle_started.format("%Y-%m-%d");
    Rendered {
        title: format!("How did cycle {cycle_number} go?"),
        message: format!(
            "Your diet cycle that started on {started} has ended. \
             Tell us how it went to get your next plan."
        ),
        subject: format!("Cycle {cycle_number} feedback reminder"),
        html: format!(
            "<h2>Time for your cycle check-in</h2>\
             <p>Hi {name},</p>\
             <p>Your diet cycle that started on {started} has ended.</p>\
             <p><a href=\"{url}\">Share your feedback</a> so we can prepare your next plan.</p>"
        ),
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn above_message_uses_one_decimal_gap() {
        let r = weight_report("Sam", WeightStatus::Above, 72.4, 70.0, 2.4);
        assert!(r.message.contains("2.4 kg above"), "{}", r.message);
        assert_eq!(r.subject, "Weight Check: Above Target");
    }

    #[test]
    fn below_message_reports_absolute_gap() {
        let r = weight_report("Sam", WeightStatus::Below, 68.0, 69.22, -1.22);
        assert!(r.message.contains("1.2 kg below"), "{}", r.message);
    }

    #[test]
    fn names_are_escaped_in_html() {
        let r = weight_report("<b>Eve</b>", WeightStatus::AtTarget, 70.0, 70.0, 0.0);
        assert!(r.html.contains("&lt;b&gt;Eve&lt;/b&gt;"));
        assert!(!r.html.contains("<b>Eve"));
    }

    #[test]
    fn reminder_links_to_feedback_form() {
        let started = chrono::TimeZone::with_ymd_and_hms(&Utc, 2026, 3, 1, 9, 0, 0).unwrap();
        let r = feedback_reminder("Kim", 2, started, "https://app/f?token=a&b");
        assert!(r.html.contains("https://app/f?token=a&amp;b"));
        assert!(r.message.contains("2026-03-01"));
        assert_eq!(r.title, "How did cycle 2 go?");
    }
}
