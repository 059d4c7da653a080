//! "Nice" tick spacing for a linear numeric axis, and a table-driven,
//! calendar-aware selector for a multi-scale time axis. Both are used by
//! the (out-of-scope) UI to label axes; neither touches the cache.

use chrono::{DateTime, Datelike, FixedOffset, TimeZone, Timelike};

pub const MINTICKS: u32 = 4;
pub const MAXTICKS: u32 = 8;

/// A set of "nice" tick values for a linear axis over `[lo, hi]`, plus
/// enough state (`p0`) to format each value consistently.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearTicks {
    pub values: Vec<f64>,
    pub delta: f64,
    p0: i32,
}

impl LinearTicks {
    /// Format `value` per the label-precision rule: scientific with
    /// `-p0` fractional digits when `-p0 >= 0` (the axis spans less than
    /// one unit of `delta`'s magnitude), otherwise rounded to kill
    /// float jitter at the `10^(-p0)` scale and printed with zero
    /// fractional digits.
    pub fn format(&self, value: f64) -> String {
        let frac_digits = -self.p0;
        if frac_digits >= 0 {
            format!("{:.*e}", frac_digits as usize, value)
        } else {
            let granularity = 10f64.powi(frac_digits);
            let rounded = (value / granularity).round() * granularity;
            format!("{:.0}", rounded)
        }
    }
}

/// Compute "nice" tick values for `[lo, hi]` (`lo < hi`, both finite).
pub fn linear_ticks(lo: f64, hi: f64) -> LinearTicks {
    assert!(lo.is_finite() && hi.is_finite() && lo < hi);

    let mut p0 = ((hi - lo).log10() - 1.0).round() as i32;
    let mut delta = 10f64.powi(p0);
    let mut n = (hi - lo) / delta;

    while n > MAXTICKS as f64 {
        delta *= 2.0;
        n /= 2.0;
    }
    while n < MINTICKS as f64 {
        delta /= 2.0;
        n *= 2.0;
        p0 += 1;
    }

    let t0 = (lo / delta).ceil() * delta;
    let limit = hi + delta / 10.0;
    let mut values = Vec::new();
    let mut t = t0;
    while t < limit {
        values.push(t);
        t += delta;
    }

    LinearTicks { values, delta, p0 }
}

/// Map a value in `[lo, hi]` to normalized `[0, 1]` axis space.
pub fn map(lo: f64, hi: f64, x: f64) -> f32 {
    ((x - lo) / (hi - lo)) as f32
}

/// Inverse of [`map`].
pub fn unmap(lo: f64, hi: f64, t: f32) -> f64 {
    lo + (t as f64) * (hi - lo)
}

// ---------------------------------------------------------------------
// Time axis
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Nanoseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
    Months,
    Years,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeCandidate {
    pub unit: TimeUnit,
    pub amount: i64,
}

impl TimeCandidate {
    /// Nominal duration in nanoseconds, used only to pick the smallest
    /// candidate satisfying `span / interval <= 7`. Calendar units use an
    /// average length; actual tick placement is exact calendar arithmetic.
    fn nominal_ns(&self) -> i64 {
        const NS_PER_MS: i64 = 1_000_000;
        const NS_PER_S: i64 = 1_000 * NS_PER_MS;
        const NS_PER_MIN: i64 = 60 * NS_PER_S;
        const NS_PER_HOUR: i64 = 60 * NS_PER_MIN;
        const NS_PER_DAY: i64 = 24 * NS_PER_HOUR;
        match self.unit {
            TimeUnit::Nanoseconds => self.amount,
            TimeUnit::Milliseconds => self.amount * NS_PER_MS,
            TimeUnit::Seconds => self.amount * NS_PER_S,
            TimeUnit::Minutes => self.amount * NS_PER_MIN,
            TimeUnit::Hours => self.amount * NS_PER_HOUR,
            TimeUnit::Days => self.amount * NS_PER_DAY,
            TimeUnit::Months => self.amount * 30 * NS_PER_DAY,
            TimeUnit::Years => self.amount * 365 * NS_PER_DAY,
        }
    }
}

/// The full candidate table, smallest interval first within each unit.
pub fn candidate_table() -> Vec<TimeCandidate> {
    use TimeUnit::*;
    let mut v = Vec::new();
    for &amount in &[1, 2, 5, 10, 20, 50, 100, 200, 500, 1000, 2000, 5000, 10000, 20000, 50000, 100000, 200000, 500000] {
        v.push(TimeCandidate { unit: Nanoseconds, amount });
    }
    for amount in 1..=500 {
        v.push(TimeCandidate { unit: Milliseconds, amount });
    }
    for &amount in &[1, 2, 5, 10, 20, 30] {
        v.push(TimeCandidate { unit: Seconds, amount });
    }
    for &amount in &[1, 2, 5, 10, 20, 30] {
        v.push(TimeCandidate { unit: Minutes, amount });
    }
    for &amount in &[1, 2, 3, 4, 6, 12] {
        v.push(TimeCandidate { unit: Hours, amount });
    }
    for &amount in &[1, 2, 4, 7, 14] {
        v.push(TimeCandidate { unit: Days, amount });
    }
    for &amount in &[1, 2, 3, 6] {
        v.push(TimeCandidate { unit: Months, amount });
    }
    for &amount in &[1, 2, 5, 10, 20, 50, 100, 200] {
        v.push(TimeCandidate { unit: Years, amount });
    }
    v
}

/// Select the smallest candidate interval such that `span / interval <= 7`.
/// Falls back to the largest candidate if the span exceeds everything in
/// the table.
pub fn select_time_interval(span_ns: i64) -> TimeCandidate {
    let table = candidate_table();
    table
        .iter()
        .copied()
        .find(|c| span_ns as f64 / c.nominal_ns() as f64 <= 7.0)
        .unwrap_or(*table.last().expect("candidate table is non-empty"))
}

/// Place ticks at calendar-aligned boundaries in `tz` across `[lo_ns,
/// hi_ns]` (both nanoseconds since the Unix epoch), using the interval
/// selected by [`select_time_interval`] for `hi_ns - lo_ns`.
pub fn time_ticks(lo_ns: i64, hi_ns: i64, tz: FixedOffset) -> Vec<i64> {
    assert!(hi_ns > lo_ns);
    let candidate = select_time_interval(hi_ns - lo_ns);
    let lo = ns_to_datetime(lo_ns, tz);
    let hi = ns_to_datetime(hi_ns, tz);

    let mut ticks = Vec::new();
    let mut cursor = floor_to_boundary(lo, candidate);
    loop {
        let ns = datetime_to_ns(cursor);
        if ns > hi_ns {
            break;
        }
        if ns >= lo_ns {
            ticks.push(ns);
        }
        cursor = step_forward(cursor, candidate);
        if cursor > hi {
            // One more iteration to catch a boundary exactly at `hi`.
            let ns = datetime_to_ns(cursor);
            if ns <= hi_ns {
                ticks.push(ns);
            }
            break;
        }
    }
    ticks
}

/// The largest unit whose value differs between `lo_ns` and `hi_ns`, used
/// to choose which axis-label components to show (a narrow window need
/// not repeat the date on every tick).
pub fn label_unit(lo_ns: i64, hi_ns: i64, tz: FixedOffset) -> TimeUnit {
    let lo = ns_to_datetime(lo_ns, tz);
    let hi = ns_to_datetime(hi_ns, tz);
    if lo.year() != hi.year() {
        TimeUnit::Years
    } else if lo.month() != hi.month() {
        TimeUnit::Months
    } else if lo.day() != hi.day() {
        TimeUnit::Days
    } else if lo.hour() != hi.hour() {
        TimeUnit::Hours
    } else if lo.minute() != hi.minute() {
        TimeUnit::Minutes
    } else if lo.second() != hi.second() {
        TimeUnit::Seconds
    } else {
        TimeUnit::Nanoseconds
    }
}

fn ns_to_datetime(ns: i64, tz: FixedOffset) -> DateTime<FixedOffset> {
    let secs = ns.div_euclid(1_000_000_000);
    let subsec = ns.rem_euclid(1_000_000_000) as u32;
    tz.timestamp_opt(secs, subsec)
        .single()
        .expect("valid unix timestamp")
}

fn datetime_to_ns(dt: DateTime<FixedOffset>) -> i64 {
    dt.timestamp() * 1_000_000_000 + dt.timestamp_subsec_nanos() as i64
}

fn floor_to_boundary(dt: DateTime<FixedOffset>, candidate: TimeCandidate) -> DateTime<FixedOffset> {
    use TimeUnit::*;
    match candidate.unit {
        Nanoseconds | Milliseconds | Seconds | Minutes | Hours => {
            let unit_ns = candidate.nominal_ns();
            let ns = datetime_to_ns(dt);
            let floored = ns.div_euclid(unit_ns) * unit_ns;
            ns_to_datetime(floored, *dt.offset())
        }
        Days => {
            let midnight = dt
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .expect("midnight is valid");
            dt.timezone().from_local_datetime(&midnight).single().expect("valid local midnight")
        }
        Months => {
            let first_of_month = dt
                .date_naive()
                .with_day(1)
                .expect("day 1 is valid")
                .and_hms_opt(0, 0, 0)
                .expect("midnight is valid");
            dt.timezone().from_local_datetime(&first_of_month).single().expect("valid local midnight")
        }
        Years => {
            let first_of_year = dt
                .date_naive()
                .with_month(1)
                .expect("month 1 is valid")
                .with_day(1)
                .expect("day 1 is valid")
                .and_hms_opt(0, 0, 0)
                .expect("midnight is valid");
            dt.timezone().from_local_datetime(&first_of_year).single().expect("valid local midnight")
        }
    }
}

fn step_forward(dt: DateTime<FixedOffset>, candidate: TimeCandidate) -> DateTime<FixedOffset> {
    use TimeUnit::*;
    match candidate.unit {
        Nanoseconds | Milliseconds | Seconds | Minutes | Hours => {
            let ns = datetime_to_ns(dt) + candidate.nominal_ns();
            ns_to_datetime(ns, *dt.offset())
        }
        Days => {
            let next = dt.date_naive() + chrono::Duration::days(candidate.amount);
            let midnight = next.and_hms_opt(0, 0, 0).expect("midnight is valid");
            dt.timezone().from_local_datetime(&midnight).single().expect("valid local midnight")
        }
        Months => {
            let total_months = dt.year() * 12 + (dt.month0() as i32) + candidate.amount as i32;
            let year = total_months.div_euclid(12);
            let month0 = total_months.rem_euclid(12);
            let next = chrono::NaiveDate::from_ymd_opt(year, month0 as u32 + 1, 1)
                .expect("valid calendar month")
                .and_hms_opt(0, 0, 0)
                .expect("midnight is valid");
            dt.timezone().from_local_datetime(&next).single().expect("valid local midnight")
        }
        Years => {
            let next = chrono::NaiveDate::from_ymd_opt(dt.year() + candidate.amount as i32, 1, 1)
                .expect("valid calendar year")
                .and_hms_opt(0, 0, 0)
                .expect("midnight is valid");
            dt.timezone().from_local_datetime(&next).single().expect("valid local midnight")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_count_within_slack_bounds() {
        for (lo, hi) in [(0.0, 100.0), (1.0, 2.0), (-50.0, 50.0), (0.0, 1e9)] {
            let ticks = linear_ticks(lo, hi);
            assert!(
                ticks.values.len() as u32 >= MINTICKS,
                "{lo}..{hi} produced {} ticks",
                ticks.values.len()
            );
            assert!(
                ticks.values.len() as u32 <= 2 * MINTICKS + 1,
                "{lo}..{hi} produced {} ticks",
                ticks.values.len()
            );
        }
    }

    #[test]
    fn ticks_are_multiples_of_delta_within_bounds() {
        let ticks = linear_ticks(0.0, 100.0);
        for &v in &ticks.values {
            assert!(v >= 0.0);
            assert!(v < 100.0 + ticks.delta / 10.0);
            let ratio = v / ticks.delta;
            assert!((ratio - ratio.round()).abs() < 1e-6);
        }
    }

    #[test]
    fn map_unmap_round_trip() {
        let lo = -10.0;
        let hi = 250.0;
        for x in [-10.0, 0.0, 37.5, 250.0] {
            let t = map(lo, hi, x);
            let back = unmap(lo, hi, t);
            assert!((back - x).abs() < 1e-3, "{x} -> {t} -> {back}");
        }
    }

    #[test]
    fn selects_smallest_interval_within_seven_ticks() {
        let one_hour_ns = 3_600_000_000_000i64;
        let candidate = select_time_interval(one_hour_ns);
        assert!(one_hour_ns as f64 / candidate.nominal_ns() as f64 <= 7.0);
    }

    #[test]
    fn month_ticks_land_on_the_first_of_each_month() {
        let tz = FixedOffset::east_opt(0).unwrap();
        let lo = chrono::NaiveDate::from_ymd_opt(2026, 1, 15)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp_nanos_opt()
            .unwrap();
        let hi = chrono::NaiveDate::from_ymd_opt(2026, 7, 15)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp_nanos_opt()
            .unwrap();
        let ticks = time_ticks(lo, hi, tz);
        for &t in &ticks {
            let dt = ns_to_datetime(t, tz);
            assert_eq!(dt.day(), 1, "tick {t} not on the 1st: {dt}");
        }
    }

    proptest::proptest! {
        #[test]
        fn linear_tick_values_always_within_one_slack_of_hi(
            lo in -1e6f64..1e6,
            span in 1e-3f64..1e6,
        ) {
            let hi = lo + span;
            let ticks = linear_ticks(lo, hi);
            for &v in &ticks.values {
                proptest::prop_assert!(v < hi + ticks.delta / 10.0 + 1e-6);
                proptest::prop_assert!(v >= lo - ticks.delta + 1e-6);
            }
        }
    }
}
