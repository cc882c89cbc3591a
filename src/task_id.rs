//! Task identifier allocation.
//!
//! Identifiers look like `t-20260105-003`: a fixed prefix, the creation day,
//! and a per-day sequence number. Allocation always picks one past the
//! highest sequence already seen for that day, so an identifier that was
//! used once (even by a task that has since been hard-deleted) is never
//! handed out again.

use chrono::NaiveDate;

pub const ID_PREFIX: &str = "t";

const DAY_FORMAT: &str = "%Y%m%d";
const SEQUENCE_WIDTH: usize = 3;

/// Format an identifier from its parts.
pub fn format_task_id(day: NaiveDate, sequence: u32) -> String {
    format!(
        "{ID_PREFIX}-{}-{sequence:0width$}",
        day.format(DAY_FORMAT),
        width = SEQUENCE_WIDTH
    )
}

/// Split an identifier into its day and sequence number.
///
/// Returns `None` for anything that is not a well-formed identifier.
pub fn parse_task_id(id: &str) -> Option<(NaiveDate, u32)> {
    let mut parts = id.splitn(3, '-');
    if parts.next()? != ID_PREFIX {
        return None;
    }
    let day = parts.next()?;
    let sequence = parts.next()?;
    if day.len() != 8 || sequence.len() < SEQUENCE_WIDTH {
        return None;
    }
    if !sequence.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let day = NaiveDate::parse_from_str(day, DAY_FORMAT).ok()?;
    let sequence = sequence.parse().ok()?;
    Some((day, sequence))
}

/// Highest sequence number used on `day` among `existing`.
pub fn max_sequence<I, S>(day: NaiveDate, existing: I) -> u32
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    existing
        .into_iter()
        .filter_map(|id| parse_task_id(id.as_ref()))
        .filter(|(id_day, _)| *id_day == day)
        .map(|(_, sequence)| sequence)
        .max()
        .unwrap_or(0)
}

/// Next identifier for `day`, given every identifier ever used in the store.
///
/// Identifiers from other days and malformed strings are ignored.
pub fn allocate<I, S>(day: NaiveDate, existing: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let next = max_sequence(day, existing).saturating_add(1);
    format_task_id(day, next)
}
