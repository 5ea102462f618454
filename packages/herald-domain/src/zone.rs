//! Wall-clock time as published by the source.

use time::{Date, Duration, Month, OffsetDateTime, PrimitiveDateTime, UtcOffset};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocalZone {
	/// Offset outside summer time.
	pub standard: UtcOffset,
	/// One hour ahead of `standard` from the last Sunday of March to the last Sunday of
	/// October, switching at 01:00 UTC.
	pub eu_summer_time: bool,
}
impl LocalZone {
	pub const UTC: Self = Self { standard: UtcOffset::UTC, eu_summer_time: false };

	pub fn new(standard: UtcOffset, eu_summer_time: bool) -> Self {
		Self { standard, eu_summer_time }
	}

	/// Pins a wall-clock reading to an instant. Readings inside the spring-forward gap or the
	/// autumn overlap resolve to summer time.
	pub fn assume(&self, local: PrimitiveDateTime) -> OffsetDateTime {
		let standard = local.assume_offset(self.standard);

		if !self.eu_summer_time {
			return standard;
		}

		let Ok(summer_offset) = UtcOffset::from_whole_seconds(self.standard.whole_seconds() + 3_600)
		else {
			return standard;
		};
		let summer = local.assume_offset(summer_offset);

		if in_summer_time(summer) || in_summer_time(standard) { summer } else { standard }
	}
}
impl Default for LocalZone {
	fn default() -> Self {
		Self::UTC
	}
}

fn in_summer_time(at: OffsetDateTime) -> bool {
	let year = at.to_offset(UtcOffset::UTC).year();

	match (switch_at(year, Month::March), switch_at(year, Month::October)) {
		(Some(start), Some(end)) => at >= start && at < end,
		_ => false,
	}
}

fn switch_at(year: i32, month: Month) -> Option<OffsetDateTime> {
	let next_year = if month == Month::December { year + 1 } else { year };
	let last_day = Date::from_calendar_date(next_year, month.next(), 1).ok()?.previous_day()?;
	let last_sunday =
		last_day - Duration::days(i64::from(last_day.weekday().number_days_from_sunday()));

	Some(last_sunday.with_hms(1, 0, 0).ok()?.assume_utc())
}
