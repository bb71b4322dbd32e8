use chrono::{DateTime, Utc};
use serde_json::value::RawValue;

use super::db::{state_key, Database, DatabaseError};
use super::models::StoredState;
use super::tables::*;
use crate::tokens::Token;

impl Database {
    // ========================================================================
    // Coordinator state operations
    // ========================================================================

    /// Load every persisted field of an instance in one read transaction
    pub fn load_state(&self, instance: &str) -> Result<StoredState, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(COORDINATOR_STATE)?;

        let token = match table.get(state_key(instance, TOKEN_FIELD).as_str())? {
            Some(data) => Some(rmp_serde::from_slice::<Token>(data.value())?),
            None => None,
        };

        let cache_duration_seconds =
            match table.get(state_key(instance, CACHE_DURATION_FIELD).as_str())? {
                Some(data) => Some(rmp_serde::from_slice::<u64>(data.value())?),
                None => None,
            };

        let playing = match table.get(state_key(instance, PLAYING_FIELD).as_str())? {
            Some(data) => {
                let text = std::str::from_utf8(data.value())?;
                Some(RawValue::from_string(text.to_string())?)
            }
            None => None,
        };

        let expires_at = match table.get(state_key(instance, EXPIRES_AT_FIELD).as_str())? {
            Some(data) => rmp_serde::from_slice::<Option<DateTime<Utc>>>(data.value())?,
            None => None,
        };

        Ok(StoredState {
            cache_duration_seconds,
            expires_at,
            playing,
            token,
        })
    }

    /// Store the token of an instance
    pub fn put_token(&self, instance: &str, token: &Token) -> Result<(), DatabaseError> {
        debug_assert!(
            token.refresh_token().is_some(),
            "persisted token must carry a refresh token"
        );

        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(COORDINATOR_STATE)?;
            let data = rmp_serde::to_vec_named(token)?;
            table.insert(state_key(instance, TOKEN_FIELD).as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Store a cached payload together with its expiry and the duration used.
    ///
    /// All three keys land in one transaction.
    pub fn put_cache(
        &self,
        instance: &str,
        payload: &RawValue,
        expires_at: DateTime<Utc>,
        cache_duration_seconds: u64,
    ) -> Result<(), DatabaseError> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(COORDINATOR_STATE)?;
            table.insert(
                state_key(instance, PLAYING_FIELD).as_str(),
                payload.get().as_bytes(),
            )?;

            let expiry = rmp_serde::to_vec(&Some(expires_at))?;
            table.insert(
                state_key(instance, EXPIRES_AT_FIELD).as_str(),
                expiry.as_slice(),
            )?;

            let duration = rmp_serde::to_vec(&cache_duration_seconds)?;
            table.insert(
                state_key(instance, CACHE_DURATION_FIELD).as_str(),
                duration.as_slice(),
            )?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Remove the cached payload and its expiry.
    ///
    /// Returns whether a payload was present. Deleting an absent cache is not
    /// an error.
    pub fn delete_cache(&self, instance: &str) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(COORDINATOR_STATE)?;
            let removed = table
                .remove(state_key(instance, PLAYING_FIELD).as_str())?
                .is_some();
            table.remove(state_key(instance, EXPIRES_AT_FIELD).as_str())?;
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }
}
