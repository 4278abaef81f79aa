//! Canonical weekday used as the partition key of a weekly schedule.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// One of the seven canonical weekdays.
///
/// Ordering follows the display order of a week view: Monday first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    /// All weekdays in canonical order.
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    /// Canonical display name, e.g. `Monday`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Monday => "Monday",
            Self::Tuesday => "Tuesday",
            Self::Wednesday => "Wednesday",
            Self::Thursday => "Thursday",
            Self::Friday => "Friday",
            Self::Saturday => "Saturday",
            Self::Sunday => "Sunday",
        }
    }

    /// Indonesian day name, e.g. `Senin`.
    pub fn local_name(self) -> &'static str {
        match self {
            Self::Monday => "Senin",
            Self::Tuesday => "Selasa",
            Self::Wednesday => "Rabu",
            Self::Thursday => "Kamis",
            Self::Friday => "Jumat",
            Self::Saturday => "Sabtu",
            Self::Sunday => "Minggu",
        }
    }

    /// Parses a proposer day label.
    ///
    /// Accepts the English or Indonesian name in any letter case, optionally
    /// followed by a comma and a date fragment (`"Monday, 21 October"`,
    /// `"Senin, 21 Oktober"`). Anything else is rejected.
    pub fn parse_label(label: &str) -> Option<Self> {
        let head = label.split(',').next().unwrap_or_default().trim();
        Self::ALL.into_iter().find(|day| {
            day.name().eq_ignore_ascii_case(head) || day.local_name().eq_ignore_ascii_case(head)
        })
    }

    /// Maps a chrono weekday onto the canonical set.
    pub fn from_chrono(value: chrono::Weekday) -> Self {
        match value {
            chrono::Weekday::Mon => Self::Monday,
            chrono::Weekday::Tue => Self::Tuesday,
            chrono::Weekday::Wed => Self::Wednesday,
            chrono::Weekday::Thu => Self::Thursday,
            chrono::Weekday::Fri => Self::Friday,
            chrono::Weekday::Sat => Self::Saturday,
            chrono::Weekday::Sun => Self::Sunday,
        }
    }

    pub(crate) fn as_db(self) -> &'static str {
        match self {
            Self::Monday => "monday",
            Self::Tuesday => "tuesday",
            Self::Wednesday => "wednesday",
            Self::Thursday => "thursday",
            Self::Friday => "friday",
            Self::Saturday => "saturday",
            Self::Sunday => "sunday",
        }
    }

    pub(crate) fn from_db(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|day| day.as_db() == value)
    }
}

impl Display for Weekday {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::Weekday;

    #[test]
    fn parse_label_accepts_canonical_names_and_date_suffix() {
        assert_eq!(Weekday::parse_label("Monday"), Some(Weekday::Monday));
        assert_eq!(Weekday::parse_label(" sunday "), Some(Weekday::Sunday));
        assert_eq!(
            Weekday::parse_label("Friday, 25 October 2024"),
            Some(Weekday::Friday)
        );
    }

    #[test]
    fn parse_label_accepts_indonesian_names() {
        assert_eq!(Weekday::parse_label("Senin"), Some(Weekday::Monday));
        assert_eq!(Weekday::parse_label("jumat"), Some(Weekday::Friday));
        assert_eq!(
            Weekday::parse_label("Minggu, 27 Oktober 2024"),
            Some(Weekday::Sunday)
        );
        for day in Weekday::ALL {
            assert_eq!(Weekday::parse_label(day.local_name()), Some(day));
        }
    }

    #[test]
    fn parse_label_rejects_unknown_names() {
        assert_eq!(Weekday::parse_label("Mon"), None);
        assert_eq!(Weekday::parse_label("Sen"), None);
        assert_eq!(Weekday::parse_label(""), None);
    }

    #[test]
    fn db_names_round_trip_for_every_day() {
        for day in Weekday::ALL {
            assert_eq!(Weekday::from_db(day.as_db()), Some(day));
        }
    }
}
