//! Eligibility gate - decides whether an item may be published now

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::model::{Item, Schedule};

/// What to do with an item whose schedule could not be parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InvalidSchedulePolicy {
    /// Treat a malformed schedule as no constraint
    #[default]
    PublishNow,
    /// Leave the item alone until the schedule is fixed
    Skip,
}

/// Outcome of a gate check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    /// Status is already set
    AlreadyHandled,
    /// Scheduled for later
    NotYetDue { at: OffsetDateTime },
    /// Schedule is malformed and the policy says skip
    InvalidSchedule { raw: String },
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible)
    }

    /// Human-readable reason for a skip
    pub fn reason(&self) -> String {
        match self {
            Self::Eligible => "eligible".to_string(),
            Self::AlreadyHandled => "Already handled".to_string(),
            Self::NotYetDue { at } => format!("Scheduled for {}", at),
            Self::InvalidSchedule { raw } => format!("Unparseable schedule '{}'", raw),
        }
    }
}

/// Eligibility gate
#[derive(Debug, Clone, Copy, Default)]
pub struct EligibilityGate {
    invalid_schedule: InvalidSchedulePolicy,
}

impl EligibilityGate {
    pub fn new(invalid_schedule: InvalidSchedulePolicy) -> Self {
        Self { invalid_schedule }
    }

    pub fn check(&self, item: &Item, now: OffsetDateTime) -> Eligibility {
        if !item.status.is_pending() {
            return Eligibility::AlreadyHandled;
        }

        match &item.schedule {
            Schedule::At(at) if now < *at => Eligibility::NotYetDue { at: *at },
            Schedule::Invalid(raw) => match self.invalid_schedule {
                InvalidSchedulePolicy::PublishNow => Eligibility::Eligible,
                InvalidSchedulePolicy::Skip => Eligibility::InvalidSchedule { raw: raw.clone() },
            },
            _ => Eligibility::Eligible,
        }
    }

    pub fn is_eligible(&self, item: &Item, now: OffsetDateTime) -> bool {
        self.check(item, now).is_eligible()
    }
}
