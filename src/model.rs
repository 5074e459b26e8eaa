use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::convert::{TryFrom, TryInto};
use std::fmt;
use std::str::FromStr;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub username: String,
    pub password: String,
    /// Random per-user key material the token signing secret is derived from.
    pub signing_secret: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rating {
    #[serde(rename = "*****")]
    FiveStars,
    #[serde(rename = "****")]
    FourStars,
    #[serde(rename = "***")]
    ThreeStars,
    #[serde(rename = "**")]
    TwoStars,
    #[serde(rename = "*")]
    OneStar,
}

impl Rating {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::FiveStars => "*****",
            Rating::FourStars => "****",
            Rating::ThreeStars => "***",
            Rating::TwoStars => "**",
            Rating::OneStar => "*",
        }
    }
}

impl Default for Rating {
    fn default() -> Self {
        Rating::FiveStars
    }
}

impl FromStr for Rating {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "*****" => Ok(Rating::FiveStars),
            "****" => Ok(Rating::FourStars),
            "***" => Ok(Rating::ThreeStars),
            "**" => Ok(Rating::TwoStars),
            "*" => Ok(Rating::OneStar),
            other => Err(format!(
                "`{}` is not a valid rating, expected one of *****, ****, ***, **, *",
                other
            )),
        }
    }
}

/// Store-generated film identifier, rendered as 24 hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilmId([u8; FilmId::LEN]);

impl FilmId {
    pub const LEN: usize = 12;

    /// The monotonic store counter leads, so ids sort in insertion order even
    /// if the wall clock steps back. Seconds outside the `u32` range saturate.
    pub fn new(created: DateTime<Utc>, counter: u64) -> Self {
        let seconds = u32::try_from(created.timestamp().max(0)).unwrap_or(u32::MAX);
        let mut bytes = [0u8; Self::LEN];
        bytes[..8].copy_from_slice(&counter.to_be_bytes());
        bytes[8..].copy_from_slice(&seconds.to_be_bytes());
        FilmId(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(FilmId)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for FilmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for FilmId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != Self::LEN * 2 {
            return Err(());
        }
        let bytes = hex::decode(s).map_err(|_| ())?;
        FilmId::from_bytes(&bytes).ok_or(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Film {
    pub name: String,
    pub rating: Rating,
    pub release_year: Option<i32>,
    pub poster_url: Option<String>,
    pub notes: Option<String>,
    pub added_by: String,
    pub inserted_on: DateTime<Utc>,
    pub updated_on: Option<DateTime<Utc>>,
}

/// Fields supplied on creation; `added_by` and timestamps come from the store.
#[derive(Debug, Clone, Default)]
pub struct NewFilm {
    pub name: String,
    pub rating: Rating,
    pub release_year: Option<i32>,
    pub poster_url: Option<String>,
    pub notes: Option<String>,
}

/// Partial update: only `Some` fields overwrite the stored film.
#[derive(Debug, Clone, Default)]
pub struct FilmUpdate {
    pub name: Option<String>,
    pub rating: Option<Rating>,
    pub release_year: Option<i32>,
    pub poster_url: Option<String>,
    pub notes: Option<String>,
}

impl FilmUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.rating.is_none()
            && self.release_year.is_none()
            && self.poster_url.is_none()
            && self.notes.is_none()
    }

    pub fn apply(self, film: &mut Film, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            film.name = name;
        }
        if let Some(rating) = self.rating {
            film.rating = rating;
        }
        if let Some(year) = self.release_year {
            film.release_year = Some(year);
        }
        if let Some(url) = self.poster_url {
            film.poster_url = Some(url);
        }
        if let Some(notes) = self.notes {
            film.notes = Some(notes);
        }
        film.updated_on = Some(now);
    }
}

pub const MIN_RELEASE_YEAR: i32 = 1800;

/// Mirrors the `/\S+/` schema check: at least one non-whitespace character.
pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rating_parses_star_tiers() {
        assert_eq!("*****".parse::<Rating>(), Ok(Rating::FiveStars));
        assert_eq!("*".parse::<Rating>(), Ok(Rating::OneStar));
        assert!("******".parse::<Rating>().is_err());
        assert!("".parse::<Rating>().is_err());
        assert_eq!(Rating::default(), Rating::FiveStars);
        assert_eq!(Rating::ThreeStars.as_str(), "***");
    }

    #[test]
    fn film_id_is_24_hex_chars() {
        let created = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let id = FilmId::new(created, 7);
        let text = id.to_string();
        assert_eq!(text.len(), 24);
        assert_eq!(text.parse::<FilmId>(), Ok(id));
        assert!("abc".parse::<FilmId>().is_err());
        assert!("zzzzzzzzzzzzzzzzzzzzzzzz".parse::<FilmId>().is_err());
    }

    #[test]
    fn film_ids_sort_by_counter_not_clock() {
        let earlier = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let later = Utc.timestamp_opt(1_700_000_001, 0).unwrap();
        // clock stepped back between the two inserts
        assert!(FilmId::new(later, 1).as_bytes() < FilmId::new(earlier, 2).as_bytes());
        assert!(FilmId::new(earlier, 1).as_bytes() < FilmId::new(earlier, 2).as_bytes());
    }

    fn created_seconds(id: FilmId) -> u32 {
        u32::from_be_bytes(id.as_bytes()[8..].try_into().unwrap())
    }

    #[test]
    fn film_id_seconds_saturate() {
        let far_future = Utc.timestamp_opt(i64::from(u32::MAX) + 10, 0).unwrap();
        assert_eq!(created_seconds(FilmId::new(far_future, 1)), u32::MAX);
        let before_epoch = Utc.timestamp_opt(-5, 0).unwrap();
        assert_eq!(created_seconds(FilmId::new(before_epoch, 1)), 0);
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        assert_eq!(created_seconds(FilmId::new(now, 1)), 1_700_000_000);
    }

    #[test]
    fn update_only_touches_supplied_fields() {
        let inserted = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut film = Film {
            name: "Heat".to_owned(),
            rating: Rating::FourStars,
            release_year: Some(1995),
            poster_url: None,
            notes: Some("rewatch".to_owned()),
            added_by: "alice".to_owned(),
            inserted_on: inserted,
            updated_on: None,
        };
        let update = FilmUpdate {
            rating: Some(Rating::FiveStars),
            ..FilmUpdate::default()
        };
        assert!(!update.is_empty());
        let now = Utc.timestamp_opt(1_700_000_100, 0).unwrap();
        update.apply(&mut film, now);
        assert_eq!(film.rating, Rating::FiveStars);
        assert_eq!(film.name, "Heat");
        assert_eq!(film.release_year, Some(1995));
        assert_eq!(film.notes.as_deref(), Some("rewatch"));
        assert_eq!(film.updated_on, Some(now));
        assert!(FilmUpdate::default().is_empty());
    }
}
