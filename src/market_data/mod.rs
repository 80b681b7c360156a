// Bar/calendar data model and the provider traits the core consumes.
// Market-data ingestion itself (CSV parsing, live feeds, timezone handling)
// is an external collaborator — only the interfaces and one reference
// CSV-backed implementation live here.

pub mod providers;
pub mod csv_loader;
pub mod calendar;

pub use providers::{Bar, BarProvider, CalendarProvider, EconEvent, OptionsProvider};
