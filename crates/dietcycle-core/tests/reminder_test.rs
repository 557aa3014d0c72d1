//! Reminder Scheduler: eligibility threshold, debounce, termination on
//! feedback, and safety under overlapping passes.

mod common;

use std::time::Duration as StdDuration;

use chrono::Duration;
use tokio_util::sync::CancellationToken;

use dietcycle_core::feedback::FeedbackSubmission;
use dietcycle_core::link::LinkSigner;
use dietcycle_core::reminder::ReminderReport;
use dietcycle_db::models::NotificationKind;
use dietcycle_db::queries::notifications;

use common::{
    CATALOG, FRONTEND_URL, FakeRecommender, LINK_SECRET, RecordingMailer, TestEnv, sample_profile,
};

async fn reminder_count(env: &TestEnv, cycle_id: uuid::Uuid) -> i64 {
    notifications::count_for_related(&env.pool, cycle_id, NotificationKind::FeedbackReminder)
        .await
        .unwrap()
}

#[tokio::test]
async fn young_cycles_are_not_reminded() {
    let env = TestEnv::new().await;
    let user = env.user("Cora").await;
    let (cycle, _) = env
        .service
        .start_cycle(user.id, &sample_profile())
        .await
        .unwrap();

    env.clock.advance(Duration::days(14));
    let report = env.service.scheduler().run_once().await.unwrap();

    assert_eq!(report, ReminderReport::default());
    assert_eq!(reminder_count(&env, cycle.id).await, 0);

    env.teardown().await;
}

#[tokio::test]
async fn one_reminder_per_debounce_window() {
    let env = TestEnv::new().await;
    let user = env.user("Dev").await;
    let (cycle, _) = env
        .service
        .start_cycle(user.id, &sample_profile())
        .await
        .unwrap();
    let scheduler = env.service.scheduler();

    env.clock.advance(Duration::days(15));
    let report = scheduler.run_once().await.unwrap();
    assert_eq!(report.candidates, 1);
    assert_eq!(report.sent, 1);
    assert_eq!(reminder_count(&env, cycle.id).await, 1);

    env.clock.advance(Duration::hours(6));
    let report = scheduler.run_once().await.unwrap();
    assert_eq!(report.sent, 0);
    assert_eq!(report.debounced, 1);
    assert_eq!(reminder_count(&env, cycle.id).await, 1);

    // Past the window the cycle is due again.
    env.clock.advance(Duration::hours(19));
    let report = scheduler.run_once().await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(reminder_count(&env, cycle.id).await, 2);

    env.teardown().await;
}

#[tokio::test]
async fn feedback_ends_reminders() {
    let env = TestEnv::new().await;
    let user = env.user("Edda").await;
    let (cycle, _) = env
        .service
        .start_cycle(user.id, &sample_profile())
        .await
        .unwrap();

    env.clock.advance(Duration::days(15));
    env.service.scheduler().run_once().await.unwrap();

    env.service
        .feedback()
        .submit_feedback(
            user.id,
            &FeedbackSubmission {
                cycle_id: Some(cycle.id),
                achieved: Some(true),
                ..FeedbackSubmission::default()
            },
        )
        .await
        .unwrap();

    env.clock.advance(Duration::days(3));
    let report = env.service.scheduler().run_once().await.unwrap();
    assert_eq!(report.candidates, 0);
    assert_eq!(reminder_count(&env, cycle.id).await, 1);

    env.teardown().await;
}

#[tokio::test]
async fn superseded_cycles_are_not_reminded() {
    let env = TestEnv::new().await;
    let user = env.user("Elio").await;
    let (first, _) = env
        .service
        .start_cycle(user.id, &sample_profile())
        .await
        .unwrap();
    env.clock.advance(Duration::days(16));
    let (second, _) = env
        .service
        .start_cycle(user.id, &sample_profile())
        .await
        .unwrap();
    env.clock.advance(Duration::days(16));

    // Both cycles are old and unanswered; only the active one is due.
    let report = env.service.scheduler().run_once().await.unwrap();
    env.service.dispatcher().flush_mail().await;

    assert_eq!(report.candidates, 1);
    assert_eq!(report.sent, 1);
    assert_eq!(reminder_count(&env, first.id).await, 0);
    assert_eq!(reminder_count(&env, second.id).await, 1);
    let sent = env.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, user.email);

    env.teardown().await;
}

#[tokio::test]
async fn overlapping_passes_send_once() {
    let env = TestEnv::new().await;
    let user = env.user("Finn").await;
    let (cycle, _) = env
        .service
        .start_cycle(user.id, &sample_profile())
        .await
        .unwrap();
    env.clock.advance(Duration::days(16));

    let a = env.service.scheduler().clone();
    let b = env.service.scheduler().clone();
    let (ra, rb) = tokio::join!(a.run_once(), b.run_once());
    let (ra, rb) = (ra.unwrap(), rb.unwrap());

    assert_eq!(ra.sent + rb.sent, 1);
    assert_eq!(ra.debounced + rb.debounced, 1);
    assert_eq!(reminder_count(&env, cycle.id).await, 1);

    env.teardown().await;
}

#[tokio::test]
async fn reminder_links_to_signed_feedback_form() {
    let env = TestEnv::new().await;
    let user = env.user("Gia").await;
    let (cycle, _) = env
        .service
        .start_cycle(user.id, &sample_profile())
        .await
        .unwrap();

    env.clock.advance(Duration::days(15));
    env.service.scheduler().run_once().await.unwrap();
    env.service.dispatcher().flush_mail().await;

    let listed = env
        .service
        .dispatcher()
        .list_notifications(user.id)
        .await
        .unwrap();
    let reminder = listed
        .iter()
        .find(|n| n.kind == NotificationKind::FeedbackReminder)
        .expect("reminder notification");
    assert_eq!(reminder.related_id, Some(cycle.id));
    assert!(reminder.has_feedback);
    assert!(!reminder.read);

    let sent = env.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, user.email);

    let prefix = format!("{FRONTEND_URL}/main-page/feedback-form/{}?token=", cycle.id);
    let start = sent[0].html.find(&prefix).expect("feedback link in email") + prefix.len();
    let token: String = sent[0].html[start..]
        .chars()
        .take_while(|c| *c != '"')
        .collect();
    let signer = LinkSigner::new(LINK_SECRET.to_vec());
    assert_eq!(signer.verify(&token).unwrap(), cycle.id);

    env.teardown().await;
}

#[tokio::test]
async fn mail_failure_keeps_reminder_row() {
    let env = TestEnv::with(FakeRecommender::new(CATALOG, 3), RecordingMailer::failing()).await;
    let user = env.user("Hal").await;
    let (cycle, _) = env
        .service
        .start_cycle(user.id, &sample_profile())
        .await
        .unwrap();

    env.clock.advance(Duration::days(15));
    let report = env.service.scheduler().run_once().await.unwrap();
    env.service.dispatcher().flush_mail().await;

    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(env.mailer.sent().len(), 1);
    assert_eq!(reminder_count(&env, cycle.id).await, 1);

    env.teardown().await;
}

#[tokio::test]
async fn run_loop_stops_on_cancel() {
    let env = TestEnv::new().await;
    let user = env.user("Ines").await;
    let (cycle, _) = env
        .service
        .start_cycle(user.id, &sample_profile())
        .await
        .unwrap();
    env.clock.advance(Duration::days(15));

    let cancel = CancellationToken::new();
    let scheduler = env.service.scheduler().clone();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { scheduler.run(StdDuration::from_millis(50), cancel).await }
    });

    // The first tick fires immediately.
    for _ in 0..100 {
        if reminder_count(&env, cycle.id).await == 1 {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(20)).await;
    }
    cancel.cancel();
    tokio::time::timeout(StdDuration::from_secs(5), handle)
        .await
        .expect("scheduler should stop after cancel")
        .unwrap();

    // Later ticks inside the window were debounced.
    assert_eq!(reminder_count(&env, cycle.id).await, 1);

    env.teardown().await;
}
