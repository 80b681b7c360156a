// IV-proxy lookup: returns (short_iv, thirty_iv) for a date, most-recent-
// on-or-before when the exact date is missing, and falls back to whichever
// single series has a value when only one does.

use std::collections::BTreeMap;

use chrono::NaiveDate;

#[derive(Debug, Clone, Default)]
pub struct IvProxySeries {
    short: BTreeMap<NaiveDate, f64>,
    thirty: BTreeMap<NaiveDate, f64>,
}

impl IvProxySeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_short(&mut self, date: NaiveDate, value: f64) {
        self.short.insert(date, value);
    }

    pub fn insert_thirty(&mut self, date: NaiveDate, value: f64) {
        self.thirty.insert(date, value);
    }

    fn latest_on_or_before(map: &BTreeMap<NaiveDate, f64>, date: NaiveDate) -> Option<f64> {
        map.range(..=date).next_back().map(|(_, v)| *v)
    }

    /// `(short_iv, thirty_iv)` for `date`. When only one series has a value
    /// on or before `date`, that value is used for both; when neither has
    /// one, returns `(0.0, 0.0)` (the caller clamps/defaults downstream).
    pub fn lookup(&self, date: NaiveDate) -> (f64, f64) {
        let short = Self::latest_on_or_before(&self.short, date);
        let thirty = Self::latest_on_or_before(&self.thirty, date);
        match (short, thirty) {
            (Some(s), Some(t)) => (s, t),
            (Some(s), None) => (s, s),
            (None, Some(t)) => (t, t),
            (None, None) => (0.0, 0.0),
        }
    }
}
