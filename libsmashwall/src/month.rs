use crate::errors::SwError;
use chrono::Month;
use phf::phf_map;
use std::str::FromStr;

/// A validated month, keeping the token it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthSpec {
    token: String,
    number: u8,
    name: &'static str,
}

impl MonthSpec {
    /// Accepts a number from 1 to 12 or an English month name in any case.
    pub fn parse(token: &str) -> Result<Self, SwError> {
        let number = if !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()) {
            token.parse::<u8>().ok().filter(|n| (1..=12).contains(n))
        } else {
            MONTH_NUMBERS.get(token.to_lowercase().as_str()).copied()
        };
        let month = number
            .and_then(|n| Month::try_from(n).ok())
            .ok_or_else(|| SwError::InvalidMonth(token.to_string()))?;
        Ok(Self {
            token: token.to_string(),
            number: month.number_from_month() as u8,
            name: month.name(),
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// 1 based month number
    pub fn number(&self) -> u8 {
        self.number
    }

    /// Capitalized English name. E.g January
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl FromStr for MonthSpec {
    type Err = SwError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

static MONTH_NUMBERS: phf::Map<&'static str, u8> = phf_map! {
    "january" => 1,
    "february" => 2,
    "march" => 3,
    "april" => 4,
    "may" => 5,
    "june" => 6,
    "july" => 7,
    "august" => 8,
    "september" => 9,
    "october" => 10,
    "november" => 11,
    "december" => 12,
};
