use chrono::NaiveDate;

use crate::domain::submission::SubmissionId;
use crate::errors::DomainError;

const MAX_DAILY_SEQUENCE: u32 = 999;

/// Next id for `prefix` on `day`: one past the highest sequence already used that day, from 001.
///
/// Read-then-compute with no compare-and-swap; two concurrent creations can pick the same id.
pub fn next_submission_id<'a>(
    prefix: &str,
    day: NaiveDate,
    existing: impl IntoIterator<Item = &'a str>,
) -> Result<SubmissionId, DomainError> {
    let day_key = day.format("%Y%m%d").to_string();
    let highest = existing
        .into_iter()
        .filter_map(|raw| {
            let id = SubmissionId(raw.trim().to_owned());
            id.parts()
                .filter(|(id_prefix, date, _)| *id_prefix == prefix && *date == day_key)
                .map(|(_, _, sequence)| sequence)
        })
        .max()
        .unwrap_or(0);

    if highest >= MAX_DAILY_SEQUENCE {
        return Err(DomainError::SequenceExhausted { prefix: format!("{prefix}-{day_key}") });
    }
    Ok(SubmissionId::compose(prefix, day, highest + 1))
}
