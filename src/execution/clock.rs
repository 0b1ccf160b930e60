use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::models::{offset_from_secs, session_date};

/// Exchange trading hours in a fixed UTC offset
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionClock {
    pub utc_offset_secs: i32,
    pub open: NaiveTime,
    pub close: NaiveTime,
    /// Local time from which a holding position is force-closed
    pub liquidate_at: NaiveTime,
    pub trade_weekends: bool,
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::krx()
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

impl SessionClock {
    /// Korea Exchange regular session, KST
    pub fn krx() -> Self {
        Self {
            utc_offset_secs: 9 * 3600,
            open: hm(9, 0),
            close: hm(15, 20),
            liquidate_at: hm(15, 15),
            trade_weekends: false,
        }
    }

    fn local_time(&self, now: DateTime<Utc>) -> NaiveTime {
        now.with_timezone(&offset_from_secs(self.utc_offset_secs)).time()
    }

    pub fn session_date(&self, now: DateTime<Utc>) -> NaiveDate {
        session_date(now, offset_from_secs(self.utc_offset_secs))
    }

    pub fn is_trading_day(&self, now: DateTime<Utc>) -> bool {
        self.trade_weekends
            || !matches!(self.session_date(now).weekday(), Weekday::Sat | Weekday::Sun)
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        let local = self.local_time(now);
        self.is_trading_day(now) && local >= self.open && local < self.close
    }

    /// Inside the end-of-session liquidation window
    pub fn should_liquidate(&self, now: DateTime<Utc>) -> bool {
        self.is_open(now) && self.local_time(now) >= self.liquidate_at
    }

    /// Time until the next open; zero while the market is open
    pub fn until_open(&self, now: DateTime<Utc>) -> Duration {
        if self.is_open(now) {
            return Duration::zero();
        }
        let offset = offset_from_secs(self.utc_offset_secs);
        let mut date = self.session_date(now);
        for _ in 0..8 {
            let Some(open) = date
                .and_time(self.open)
                .and_local_timezone(offset)
                .single()
            else {
                break;
            };
            let open = open.with_timezone(&Utc);
            if open > now && self.is_trading_day(open) {
                return open - now;
            }
            date = date.succ_opt().unwrap_or(date);
        }
        Duration::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn kst(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        // KST = UTC+9
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap() - Duration::hours(9)
    }

    #[test]
    fn test_krx_hours() {
        let clock = SessionClock::krx();
        // 2024-03-04 is a Monday
        assert!(!clock.is_open(kst(2024, 3, 4, 8, 59)));
        assert!(clock.is_open(kst(2024, 3, 4, 9, 0)));
        assert!(!clock.should_liquidate(kst(2024, 3, 4, 15, 14)));
        assert!(clock.should_liquidate(kst(2024, 3, 4, 15, 15)));
        assert!(!clock.is_open(kst(2024, 3, 4, 15, 20)));
    }

    #[test]
    fn test_weekend_closed() {
        let clock = SessionClock::krx();
        assert!(!clock.is_open(kst(2024, 3, 9, 10, 0)));
    }

    #[test]
    fn test_until_open_skips_weekend() {
        let clock = SessionClock::krx();
        // Friday after close -> Monday 09:00
        let wait = clock.until_open(kst(2024, 3, 8, 16, 0));
        assert_eq!(wait, Duration::hours(65));
        assert_eq!(clock.until_open(kst(2024, 3, 4, 10, 0)), Duration::zero());
    }

    #[test]
    fn test_session_date_in_local_time() {
        let clock = SessionClock::krx();
        let date = clock.session_date(kst(2024, 3, 4, 0, 30));
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
    }
}
