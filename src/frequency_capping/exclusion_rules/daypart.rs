use chrono::{DateTime, Datelike, FixedOffset, Timelike};

use super::ExclusionRule;
use crate::model::{CreativeAd, CreativeDaypart};

pub struct DaypartExclusionRule {
    local_now: DateTime<FixedOffset>,
}

impl DaypartExclusionRule {
    pub fn new(local_now: DateTime<FixedOffset>) -> Self {
        Self { local_now }
    }

    fn matches(&self, daypart: &CreativeDaypart) -> bool {
        let day_of_week = self.local_now.weekday().num_days_from_sunday();
        let Some(day) = char::from_digit(day_of_week, 10) else {
            return false;
        };
        if !daypart.days_of_week.contains(day) {
            return false;
        }
        let minute = self.local_now.hour() * 60 + self.local_now.minute();
        daypart.start_minute <= minute && minute <= daypart.end_minute
    }
}

impl ExclusionRule for DaypartExclusionRule {
    fn name(&self) -> &'static str {
        "daypart"
    }

    fn cache_key(&self, creative_ad: &CreativeAd) -> String {
        creative_ad.campaign_id.clone()
    }

    fn should_include(&self, creative_ad: &CreativeAd) -> Result<(), String> {
        if creative_ad.dayparts.is_empty()
            || creative_ad.dayparts.iter().any(|daypart| self.matches(daypart))
        {
            return Ok(());
        }
        Err(format!(
            "creativeSetId {} excluded as not within a scheduled time slot",
            creative_ad.creative_set_id
        ))
    }
}
