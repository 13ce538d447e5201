use crate::error::FormatError;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{Local, NaiveTime, Timelike};

const SECS_PER_DAY: u32 = 24 * 60 * 60;

/// A wall-clock hour and minute.
///
/// Ordered by minutes since midnight. Constructors validate the fields, so an
/// out-of-range value never exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay {
  hour: u8,
  minute: u8,
}

impl TimeOfDay {
  pub const MIDNIGHT: TimeOfDay = TimeOfDay { hour: 0, minute: 0 };

  /// Creates a time of day, rejecting hours above 23 and minutes above 59.
  pub fn new(hour: u32, minute: u32) -> Result<Self, FormatError> {
    if hour > 23 {
      return Err(FormatError::HourOutOfRange(hour));
    }
    if minute > 59 {
      return Err(FormatError::MinuteOutOfRange(minute));
    }
    Ok(Self {
      hour: hour as u8,
      minute: minute as u8,
    })
  }

  /// Parses the fixed four character `HHMM` representation (e.g. `"1800"`).
  pub fn parse(s: &str) -> Result<Self, FormatError> {
    let bytes = s.as_bytes();
    if bytes.len() != 4 || !bytes.iter().all(u8::is_ascii_digit) {
      return Err(FormatError::NotFourDigits(s.to_string()));
    }
    let digit = |i: usize| u32::from(bytes[i] - b'0');
    Self::new(digit(0) * 10 + digit(1), digit(2) * 10 + digit(3))
  }

  /// Reads the local wall clock, truncated to the minute.
  pub fn now() -> Self {
    Self::from(Local::now().time())
  }

  pub fn hour(&self) -> u32 {
    u32::from(self.hour)
  }

  pub fn minute(&self) -> u32 {
    u32::from(self.minute)
  }

  pub fn minutes_since_midnight(&self) -> u32 {
    self.hour() * 60 + self.minute()
  }

  /// Returns true if `self` lies inside `[start, end]`.
  ///
  /// When `start > end` the window wraps past midnight and `self` is inside if it
  /// is at or after `start` or at or before `end`.
  pub fn is_between(&self, start: TimeOfDay, end: TimeOfDay) -> bool {
    if start <= end {
      start <= *self && *self <= end
    } else {
      *self >= start || *self <= end
    }
  }

  /// Time from the local wall clock until the next occurrence of `self`.
  pub fn until(&self) -> Duration {
    until_from(Local::now().time(), *self)
  }

  fn as_naive(&self) -> NaiveTime {
    NaiveTime::from_hms_opt(self.hour(), self.minute(), 0).unwrap_or(NaiveTime::MIN)
  }
}

/// Duration from `now` until the next occurrence of `target`, always in `[0, 24h)`.
///
/// A target that has already passed today is taken to be tomorrow's occurrence.
pub fn until_from(now: NaiveTime, target: TimeOfDay) -> Duration {
  let now_secs = now.num_seconds_from_midnight() as i64;
  let target_secs = target.as_naive().num_seconds_from_midnight() as i64;
  let diff = (target_secs - now_secs).rem_euclid(i64::from(SECS_PER_DAY));
  // Sub-second remainder of `now` is subtracted so the wake-up lands on the minute.
  let nanos = u64::from(now.nanosecond().min(999_999_999));
  Duration::from_secs(diff as u64)
    .checked_sub(Duration::from_nanos(nanos))
    .unwrap_or_else(|| Duration::from_secs(u64::from(SECS_PER_DAY)) - Duration::from_nanos(nanos))
}

impl From<NaiveTime> for TimeOfDay {
  fn from(t: NaiveTime) -> Self {
    Self {
      hour: t.hour() as u8,
      minute: t.minute() as u8,
    }
  }
}

impl FromStr for TimeOfDay {
  type Err = FormatError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::parse(s)
  }
}

impl fmt::Display for TimeOfDay {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:02}{:02}", self.hour, self.minute)
  }
}

/// A permitted daily window. `end < start` means the window runs past midnight
/// and closes at `end` on the following day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
  pub start: TimeOfDay,
  pub end: TimeOfDay,
}

impl Interval {
  pub fn new(start: TimeOfDay, end: TimeOfDay) -> Self {
    Self { start, end }
  }

  /// Parses a window from two `HHMM` strings.
  pub fn parse(start: &str, end: &str) -> Result<Self, FormatError> {
    Ok(Self::new(TimeOfDay::parse(start)?, TimeOfDay::parse(end)?))
  }

  pub fn contains(&self, t: TimeOfDay) -> bool {
    t.is_between(self.start, self.end)
  }

  /// Whether the gate is open at `t`: like `contains`, but the window closes
  /// when `end` is reached, so the `end` minute itself is excluded.
  pub fn is_open_at(&self, t: TimeOfDay) -> bool {
    self.contains(t) && t != self.end
  }

  pub fn wraps_midnight(&self) -> bool {
    self.end < self.start
  }
}

impl fmt::Display for Interval {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}", self.start, self.end)
  }
}

/// Source of the current wall-clock time of day.
pub trait Clock: Send + Sync + fmt::Debug {
  fn now(&self) -> NaiveTime;
}

/// Local system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> NaiveTime {
    Local::now().time()
  }
}
