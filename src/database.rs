use crate::model::*;
use chrono::Utc;
use sled::transaction::{TransactionError, Transactional};
use std::convert::TryInto;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("corrupt record: {0}")]
    Codec(#[from] bincode::Error),
    #[error("bad index entry for user {0}")]
    BadIndex(String),
}

pub type Result<T> = std::result::Result<T, Error>;

fn serialize_id(id: u64) -> [u8; 8] {
    id.to_le_bytes()
}

fn deserialize_id<V: AsRef<[u8]>>(id: V) -> Option<u64> {
    id.as_ref().try_into().ok().map(u64::from_le_bytes)
}

pub trait UserDb {
    type Error;
    fn add_user(&self, user: &User) -> std::result::Result<Option<u64>, Self::Error>;
    fn get_user_by_username(
        &self,
        username: &str,
    ) -> std::result::Result<Option<(u64, User)>, Self::Error>;
}

const USERS: &'static [u8] = b"users";
const USERS_USERNAME: &'static [u8] = b"USERS_USERNAME";

impl UserDb for sled::Db {
    type Error = Error;

    fn add_user(&self, user: &User) -> Result<Option<u64>> {
        let users = self.open_tree(USERS)?;
        let users_username = self.open_tree(USERS_USERNAME)?;
        let id = self.generate_id()?;
        let record = bincode::serialize(user)?;
        if let Err(err) = (&users, &users_username).transaction(|(users, users_username)| {
            users.insert(&serialize_id(id), record.as_slice())?;
            if let Some(_) = users_username.insert(user.username.as_bytes(), &serialize_id(id))? {
                sled::transaction::abort(())?;
            }
            Ok(())
        }) {
            match err {
                TransactionError::Storage(e) => return Err(e.into()),
                TransactionError::Abort(_) => return Ok(None),
            };
        }
        Ok(Some(id))
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<(u64, User)>> {
        let users_username = self.open_tree(USERS_USERNAME)?;
        let users = self.open_tree(USERS)?;
        if let Some(id) = users_username.get(&username)? {
            let bad_index = || Error::BadIndex(username.to_owned());
            let record = users.get(&id)?.ok_or_else(bad_index)?;
            let user = bincode::deserialize(&record)?;
            Ok(Some((deserialize_id(id).ok_or_else(bad_index)?, user)))
        } else {
            Ok(None)
        }
    }
}

pub trait FilmDb {
    type Error;
    fn insert_film(&self, owner: &str, film: NewFilm) -> std::result::Result<FilmId, Self::Error>;
    fn get_film(&self, owner: &str, id: FilmId) -> std::result::Result<Option<Film>, Self::Error>;
    fn list_films(
        &self,
        owner: &str,
        limit: usize,
        offset: usize,
    ) -> std::result::Result<Vec<(FilmId, Film)>, Self::Error>;
    fn update_film(
        &self,
        owner: &str,
        id: FilmId,
        update: FilmUpdate,
    ) -> std::result::Result<Option<Film>, Self::Error>;
    fn remove_film(&self, owner: &str, id: FilmId) -> std::result::Result<Option<Film>, Self::Error>;
    fn clear_films(&self, owner: &str) -> std::result::Result<usize, Self::Error>;
}

const FILMS: &'static [u8] = b"films";

/// Length-prefixed owner name, so no username is a prefix of another's keys.
fn owner_prefix(owner: &str) -> Vec<u8> {
    let mut prefix = (owner.len() as u32).to_be_bytes().to_vec();
    prefix.extend_from_slice(owner.as_bytes());
    prefix
}

fn film_key(owner: &str, id: FilmId) -> Vec<u8> {
    let mut key = owner_prefix(owner);
    key.extend_from_slice(id.as_bytes());
    key
}

impl FilmDb for sled::Db {
    type Error = Error;

    fn insert_film(&self, owner: &str, film: NewFilm) -> Result<FilmId> {
        let films = self.open_tree(FILMS)?;
        let now = Utc::now();
        let id = FilmId::new(now, self.generate_id()?);
        let film = Film {
            name: film.name,
            rating: film.rating,
            release_year: film.release_year,
            poster_url: film.poster_url,
            notes: film.notes,
            added_by: owner.to_owned(),
            inserted_on: now,
            updated_on: None,
        };
        films.insert(film_key(owner, id), bincode::serialize(&film)?)?;
        Ok(id)
    }

    fn get_film(&self, owner: &str, id: FilmId) -> Result<Option<Film>> {
        let films = self.open_tree(FILMS)?;
        match films.get(film_key(owner, id))? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    fn list_films(&self, owner: &str, limit: usize, offset: usize) -> Result<Vec<(FilmId, Film)>> {
        let films = self.open_tree(FILMS)?;
        let prefix = owner_prefix(owner);
        // A zero limit means no limit, as with the skip/limit of document stores.
        let take = if limit == 0 { usize::MAX } else { limit };
        films
            .scan_prefix(&prefix)
            .skip(limit.saturating_mul(offset))
            .take(take)
            .map(|entry| -> Result<(FilmId, Film)> {
                let (key, data) = entry?;
                let id = FilmId::from_bytes(&key[prefix.len()..])
                    .ok_or_else(|| Error::BadIndex(owner.to_owned()))?;
                Ok((id, bincode::deserialize(&data)?))
            })
            .collect()
    }

    fn update_film(&self, owner: &str, id: FilmId, update: FilmUpdate) -> Result<Option<Film>> {
        let films = self.open_tree(FILMS)?;
        let key = film_key(owner, id);
        // Swap against the bytes read so a concurrent removal is never undone.
        loop {
            let current = match films.get(&key)? {
                Some(data) => data,
                None => return Ok(None),
            };
            let mut film: Film = bincode::deserialize(&current)?;
            update.clone().apply(&mut film, Utc::now());
            let record = bincode::serialize(&film)?;
            if films
                .compare_and_swap(&key, Some(&current), Some(record))?
                .is_ok()
            {
                return Ok(Some(film));
            }
        }
    }

    fn remove_film(&self, owner: &str, id: FilmId) -> Result<Option<Film>> {
        let films = self.open_tree(FILMS)?;
        match films.remove(film_key(owner, id))? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    fn clear_films(&self, owner: &str) -> Result<usize> {
        let films = self.open_tree(FILMS)?;
        let mut batch = sled::Batch::default();
        let mut count = 0;
        for key in films.scan_prefix(owner_prefix(owner)).keys() {
            batch.remove(key?);
            count += 1;
        }
        films.apply_batch(batch)?;
        Ok(count)
    }
}
