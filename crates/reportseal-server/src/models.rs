//! Database models for ReportSeal.

pub mod report_entry;

pub use report_entry::{NewReportEntry, ReportEntry, ReportEntryRow};
