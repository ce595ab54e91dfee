use chrono::{Duration, Utc};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::helpers::{received_subjects, TestApp};

#[tokio::test]
async fn tick_on_confirmation_day_sends_nothing_when_day_one_was_already_sent() {
    let test_app = TestApp::spawn_app().await;
    let anchor = Utc::now();

    test_app
        .seed_confirmed_subscriber("frank@test.com", "Frank", anchor, &[1])
        .await;

    Mock::given(path("/mail/send"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&test_app.email_server)
        .await;

    // elapsedDays = 0 => currentScheduleDay = 1: day 1 is the only eligible
    // offset and it was already sent at confirmation
    let summary = test_app.run_tick(anchor.date_naive()).await;

    assert_eq!(summary.subscribers, 1);
    assert_eq!(summary.delivered, 0);
    assert!(received_subjects(&test_app.email_server).await.is_empty());

    // Next day: day 2 goes out
    let summary = test_app
        .run_tick(anchor.date_naive() + Duration::days(1))
        .await;

    assert_eq!(summary.delivered, 1);

    let subjects = received_subjects(&test_app.email_server).await;
    assert_eq!(subjects.len(), 1);
    assert!(subjects[0].starts_with("Day 2"));
}

#[tokio::test]
async fn running_the_tick_twice_sends_no_duplicates() {
    let test_app = TestApp::spawn_app().await;
    let anchor = Utc::now();
    let today = anchor.date_naive() + Duration::days(2);

    test_app
        .seed_confirmed_subscriber("frank@test.com", "Frank", anchor, &[1])
        .await;

    Mock::given(path("/mail/send"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&test_app.email_server)
        .await;

    let first = test_app.run_tick(today).await;
    let second = test_app.run_tick(today).await;

    assert_eq!(first.delivered, 2); // days 2 and 3
    assert_eq!(second.delivered, 0);
    assert_eq!(received_subjects(&test_app.email_server).await.len(), 2);
}

#[tokio::test]
async fn missed_days_are_caught_up_in_ascending_order_in_one_tick() {
    let test_app = TestApp::spawn_app().await;
    let anchor = Utc::now();

    // Confirmed 10 days ago (currentScheduleDay = 10), only day 1 sent at
    // confirmation; schedule is {1, 2, 3, 5, 11}
    test_app
        .seed_confirmed_subscriber("frank@test.com", "Frank", anchor, &[1])
        .await;

    Mock::given(path("/mail/send"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&test_app.email_server)
        .await;

    let summary = test_app
        .run_tick(anchor.date_naive() + Duration::days(9))
        .await;

    assert_eq!(summary.delivered, 3);

    let subjects = received_subjects(&test_app.email_server).await;
    let days: Vec<&str> = subjects
        .iter()
        .map(|subject| subject.split(':').next().unwrap())
        .collect();

    // Days 2, 3 and 5 in that order; day 11 is not yet due
    assert_eq!(days, vec!["Day 2", "Day 3", "Day 5"]);

    let state = test_app.get_subscriber_state("frank@test.com").await;

    assert_eq!(state.last_sent_day, 5);
    assert_eq!(state.sent_days, vec![1, 2, 3, 5]);
}

#[tokio::test]
async fn gateway_failure_halts_the_subscriber_and_leaves_state_unchanged() {
    let test_app = TestApp::spawn_app().await;
    let anchor = Utc::now();

    test_app
        .seed_confirmed_subscriber("frank@test.com", "Frank", anchor, &[1])
        .await;

    Mock::given(path("/mail/send"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&test_app.email_server)
        .await;

    // Days 2, 3 and 5 are all overdue, but the first failure must stop the
    // chain: no later day may be attempted in the same tick
    let summary = test_app
        .run_tick(anchor.date_naive() + Duration::days(9))
        .await;

    assert_eq!(summary.delivered, 0);
    assert_eq!(summary.halted, 1);
    assert_eq!(received_subjects(&test_app.email_server).await.len(), 1);

    let state = test_app.get_subscriber_state("frank@test.com").await;

    assert_eq!(state.last_sent_day, 1);
    assert_eq!(state.sent_days, vec![1]);
}

#[tokio::test]
async fn a_failed_day_is_retried_and_committed_once_on_the_next_tick() {
    let test_app = TestApp::spawn_app().await;
    let anchor = Utc::now();
    let today = anchor.date_naive() + Duration::days(1);

    test_app
        .seed_confirmed_subscriber("frank@test.com", "Frank", anchor, &[1])
        .await;

    // First attempt fails, every later attempt succeeds
    Mock::given(path("/mail/send"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&test_app.email_server)
        .await;
    Mock::given(path("/mail/send"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&test_app.email_server)
        .await;

    let failed = test_app.run_tick(today).await;

    assert_eq!(failed.delivered, 0);
    assert_eq!(failed.halted, 1);

    let retried = test_app.run_tick(today).await;

    assert_eq!(retried.delivered, 1);

    let state = test_app.get_subscriber_state("frank@test.com").await;

    assert_eq!(state.last_sent_day, 2);
    assert_eq!(state.sent_days, vec![1, 2]);

    // Day 2 went over the wire exactly twice: the failed try and the retry
    assert_eq!(received_subjects(&test_app.email_server).await.len(), 2);
}

#[tokio::test]
async fn one_failing_subscriber_does_not_block_the_others() {
    let test_app = TestApp::spawn_app().await;
    let anchor = Utc::now();
    let today = anchor.date_naive() + Duration::days(1);

    // Seeded in subscription order: the failing subscriber is processed first
    test_app
        .seed_confirmed_subscriber("unlucky@test.com", "Unlucky", anchor - Duration::seconds(10), &[1])
        .await;
    test_app
        .seed_confirmed_subscriber("lucky@test.com", "Lucky", anchor, &[1])
        .await;

    Mock::given(path("/mail/send"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&test_app.email_server)
        .await;
    Mock::given(path("/mail/send"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&test_app.email_server)
        .await;

    let summary = test_app.run_tick(today).await;

    assert_eq!(summary.subscribers, 2);
    assert_eq!(summary.halted, 1);
    assert_eq!(summary.delivered, 1);

    let unlucky = test_app.get_subscriber_state("unlucky@test.com").await;
    let lucky = test_app.get_subscriber_state("lucky@test.com").await;

    assert_eq!(unlucky.last_sent_day, 1);
    assert_eq!(lucky.last_sent_day, 2);
}

#[tokio::test]
async fn a_subscriber_whose_welcome_send_failed_is_reconciled_by_the_tick() {
    let test_app = TestApp::spawn_app().await;
    let anchor = Utc::now();

    // Confirmed, but the immediate day-1 send never went through
    test_app
        .seed_confirmed_subscriber("frank@test.com", "Frank", anchor, &[])
        .await;

    Mock::given(path("/mail/send"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&test_app.email_server)
        .await;

    let summary = test_app.run_tick(anchor.date_naive()).await;

    assert_eq!(summary.delivered, 1);

    let subjects = received_subjects(&test_app.email_server).await;
    assert!(subjects[0].starts_with("Day 1"));

    let state = test_app.get_subscriber_state("frank@test.com").await;
    assert_eq!(state.last_sent_day, 1);
    assert_eq!(state.sent_days, vec![1]);
}
