use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::subscriber_email::SubscriberEmail;
use crate::domain::subscriber_name::SubscriberName;
use crate::domain::subscriber_status::SubscriberStatus;

/// A persisted subscriber record together with its delivery state.
///
/// `subscribed_at` is the anchor for day-offset arithmetic: it is set at
/// signup and reset to the confirmation instant when the subscriber confirms.
/// `last_sent_day` is the highest scheduled day successfully delivered and
/// never decreases; `sent_days` holds one flag per delivered scheduled day and
/// flags never revert.
#[derive(Debug)]
pub struct Subscriber {
    pub id: Uuid,
    pub email: SubscriberEmail,
    pub name: SubscriberName,
    pub status: SubscriberStatus,
    pub subscribed_at: DateTime<Utc>,
    pub last_sent_day: u32,
    pub sent_days: HashSet<u32>,
}

impl Subscriber {
    pub fn has_sent(&self, day: u32) -> bool {
        self.sent_days.contains(&day)
    }
}
