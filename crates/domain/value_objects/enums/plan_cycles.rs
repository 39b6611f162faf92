use std::fmt::Display;

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanCycle {
    Monthly,
    Quarterly,
    Yearly,
}

impl PlanCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanCycle::Monthly => "MONTHLY",
            PlanCycle::Quarterly => "QUARTERLY",
            PlanCycle::Yearly => "YEARLY",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "MONTHLY" => Some(PlanCycle::Monthly),
            "QUARTERLY" => Some(PlanCycle::Quarterly),
            "YEARLY" => Some(PlanCycle::Yearly),
            _ => None,
        }
    }

    pub fn months(&self) -> u32 {
        match self {
            PlanCycle::Monthly => 1,
            PlanCycle::Quarterly => 3,
            PlanCycle::Yearly => 12,
        }
    }

    /// Calendar arithmetic: Jan 31 + 1 month clamps to the last day of February.
    pub fn add_to(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        start.checked_add_months(Months::new(self.months()))
    }
}

impl Display for PlanCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn monthly_cycle_uses_calendar_months() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let end = PlanCycle::Monthly.add_to(start).unwrap();
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn month_end_clamps_instead_of_overflowing() {
        let start = Utc.with_ymd_and_hms(2025, 1, 31, 12, 0, 0).unwrap();
        let end = PlanCycle::Monthly.add_to(start).unwrap();
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 2, 28, 12, 0, 0).unwrap());
    }

    #[test]
    fn quarterly_and_yearly_cycles() {
        let start = Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap();
        assert_eq!(
            PlanCycle::Quarterly.add_to(start).unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 29, 0, 0, 0).unwrap()
        );
        assert_eq!(
            PlanCycle::Yearly.add_to(start).unwrap(),
            Utc.with_ymd_and_hms(2025, 2, 28, 0, 0, 0).unwrap()
        );
    }
}
