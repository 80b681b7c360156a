// Reference in-memory `CalendarProvider`. Calendar ingestion is an external
// collaborator; this is the minimal concrete view the regime scorer's
// blockout-window check needs for tests.

use chrono::{DateTime, NaiveDate, Utc};

use crate::market_data::providers::{CalendarProvider, EconEvent};

#[derive(Debug, Clone, Default)]
pub struct VecCalendarProvider {
    events: Vec<EconEvent>,
}

impl VecCalendarProvider {
    pub fn new(mut events: Vec<EconEvent>) -> Self {
        events.sort_by_key(|e| e.timestamp);
        Self { events }
    }
}

impl CalendarProvider for VecCalendarProvider {
    fn next_event_after(&self, ts: DateTime<Utc>) -> Option<EconEvent> {
        self.events.iter().find(|e| e.timestamp > ts).cloned()
    }

    fn events(&self, start: NaiveDate, end: NaiveDate) -> Vec<EconEvent> {
        self.events
            .iter()
            .filter(|e| {
                let d = e.timestamp.date_naive();
                d >= start && d <= end
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn next_event_after_is_strictly_after() {
        let ts = Utc.with_ymd_and_hms(2024, 2, 1, 14, 0, 0).unwrap();
        let provider = VecCalendarProvider::new(vec![EconEvent { timestamp: ts, kind: "CPI".into() }]);
        assert!(provider.next_event_after(ts).is_none());
        let before = ts - chrono::Duration::minutes(1);
        assert_eq!(provider.next_event_after(before).unwrap().kind, "CPI");
    }
}
