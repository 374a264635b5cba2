use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type UserId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    #[default]
    En,
    Ru,
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lang::En => write!(f, "en"),
            Lang::Ru => write!(f, "ru"),
        }
    }
}

impl FromStr for Lang {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "en" => Ok(Lang::En),
            "ru" => Ok(Lang::Ru),
            other => Err(format!("lang not found: {}", other)),
        }
    }
}

/// Registered participant. The referrer link is fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Stable external identity key
    pub key: String,
    pub referrer_id: Option<UserId>,
    pub is_frozen: bool,
    pub is_newbie: bool,
    pub lang: Lang,
    pub created_at: DateTime<Utc>,
}

/// Registration input
#[derive(Debug, Clone)]
pub struct NewUser {
    pub key: String,
    pub referrer_id: Option<UserId>,
    pub lang: Lang,
    pub deposit_address: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lang_parse() {
        assert_eq!("RU".parse::<Lang>().unwrap(), Lang::Ru);
        assert!("de".parse::<Lang>().is_err());
        assert_eq!(Lang::default(), Lang::En);
    }
}
