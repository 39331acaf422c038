use crate::errors::SwError;
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt::Formatter;
use std::str::FromStr;

lazy_static! {
    static ref RESOLUTION_PATTERN: Regex = Regex::new(r"^\d{3,4}x\d{3,4}$").unwrap();
}

/// Image resolution in the `<width>x<height>` form used as anchor text on the
/// listing page. E.g 1920x1080
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionSpec(String);

impl ResolutionSpec {
    pub fn parse(token: &str) -> Result<Self, SwError> {
        if RESOLUTION_PATTERN.is_match(token) {
            Ok(Self(token.to_string()))
        } else {
            Err(SwError::InvalidResolution(token.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ResolutionSpec {
    type Err = SwError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for ResolutionSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
