use std::collections::BTreeMap;

/// Static, sparse mapping from day offset (1-based, counted from the
/// confirmation anchor) to the template reference sent on that day, plus the
/// reserved confirmation-email template which is excluded from the ordering.
#[derive(Debug, Clone)]
pub struct ScheduleTable {
    days: BTreeMap<u32, String>,
    confirmation_template: String,
}

impl ScheduleTable {
    pub fn new(
        days: BTreeMap<u32, String>,
        confirmation_template: String,
    ) -> Result<ScheduleTable, String> {
        if days.is_empty() {
            return Err("The autoresponder schedule cannot be empty".into());
        }
        if days.contains_key(&0) {
            return Err("Schedule day offsets start at 1".into());
        }
        if confirmation_template.trim().is_empty() {
            return Err("The confirmation template reference cannot be empty".into());
        }

        Ok(ScheduleTable {
            days,
            confirmation_template,
        })
    }

    /// Day offsets in ascending order.
    pub fn days(&self) -> impl Iterator<Item = u32> + '_ {
        self.days.keys().copied()
    }

    pub fn contains(&self, day: u32) -> bool {
        self.days.contains_key(&day)
    }

    pub fn template_for(&self, day: u32) -> Option<&str> {
        self.days.get(&day).map(String::as_str)
    }

    pub fn confirmation_template(&self) -> &str {
        &self.confirmation_template
    }

    /// The lowest scheduled offset, sent immediately upon confirmation.
    pub fn first_day(&self) -> u32 {
        *self.days.keys().next().unwrap()
    }

    /// The highest scheduled offset; a subscriber whose last_sent_day equals
    /// it has completed the sequence.
    pub fn last_day(&self) -> u32 {
        *self.days.keys().next_back().unwrap()
    }
}
