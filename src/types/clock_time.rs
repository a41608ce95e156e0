use std::{fmt::Display, str::FromStr};

use serde::{de, Deserialize, Deserializer};
use time::{format_description::FormatItem, macros::format_description, Time};

const HH_MM: &[FormatItem<'static>] = format_description!("[hour]:[minute]");

/// A local wall-clock time of day, written `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime(Time);

impl ClockTime {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        Time::from_hms(hour, minute, 0).ok().map(Self)
    }

    pub fn time(self) -> Time {
        self.0
    }
}

impl From<Time> for ClockTime {
    fn from(time: Time) -> Self {
        Self(time)
    }
}

impl FromStr for ClockTime {
    type Err = Box<dyn std::error::Error + Sync + Send>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Time::parse(s.trim(), HH_MM)
            .map(Self)
            .map_err(|err| Box::from(format!("'{s}' is not a HH:MM time: {err}")))
    }
}

impl Display for ClockTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.0.hour(), self.0.minute())
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
