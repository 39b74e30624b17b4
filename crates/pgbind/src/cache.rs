//! Read-through cache of models keyed by primary key.
//!
//! Entries only change once a write is durable: `save` and `delete` register
//! `Committed` callbacks that refresh or evict the entry, so a rolled-back
//! transaction never leaks into the cache.

use crate::adapter::Adapter;
use crate::client::GenericClient;
use crate::error::OrmResult;
use crate::model::{Model, Record};
use crate::transaction::TrackType;
use crate::value::{Params, Value};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Entries<M> = HashMap<Vec<String>, M>;

/// Shared cache handle. Clones refer to the same entries.
pub struct ModelCache<M> {
    entries: Arc<Mutex<Entries<M>>>,
}

impl<M> Clone for ModelCache<M> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<M> Default for ModelCache<M> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<M> std::fmt::Debug for ModelCache<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCache")
            .field("len", &lock(&self.entries).len())
            .finish()
    }
}

fn lock<M>(entries: &Mutex<Entries<M>>) -> MutexGuard<'_, Entries<M>> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

fn cache_key(keys: &[Value]) -> OrmResult<Vec<String>> {
    keys.iter().map(|k| k.encode().map(|(text, _)| text)).collect()
}

impl<M: Model + Clone> ModelCache<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }

    /// Cached model for `keys`, without touching the database.
    pub fn get(&self, keys: &[Value]) -> OrmResult<Option<M>> {
        let key = cache_key(keys)?;
        Ok(lock(&self.entries).get(&key).cloned())
    }

    /// Store `model` under its own keys.
    pub fn insert(&self, model: &M) -> OrmResult<()> {
        let key = cache_key(&model.key_values()?)?;
        lock(&self.entries).insert(key, model.clone());
        Ok(())
    }

    pub fn evict(&self, keys: &[Value]) -> OrmResult<()> {
        let key = cache_key(keys)?;
        lock(&self.entries).remove(&key);
        Ok(())
    }

    /// [`Adapter::get_by_key`], answered from the cache when possible.
    pub async fn get_by_key<C: GenericClient>(
        &self,
        db: &mut Adapter<C>,
        keys: &[Value],
    ) -> OrmResult<Option<Record<M>>> {
        if let Some(model) = self.get(keys)? {
            return Ok(Some(Record::existing(model)));
        }

        let found = db.get_by_key::<M>(keys).await?;
        if let Some(record) = &found {
            self.insert(record.model())?;
        }
        Ok(found)
    }

    /// [`Adapter::find`], caching every returned model.
    pub async fn find<C: GenericClient>(
        &self,
        db: &mut Adapter<C>,
        filter: &str,
        params: &Params,
    ) -> OrmResult<Vec<Record<M>>> {
        let records = db.find::<M>(filter, params).await?;
        for record in &records {
            self.insert(record.model())?;
        }
        Ok(records)
    }

    /// [`Adapter::save`], refreshing the entry once the write commits.
    pub async fn save<C: GenericClient>(
        &self,
        db: &mut Adapter<C>,
        record: &mut Record<M>,
    ) -> OrmResult<bool> {
        let saved = db.save(record).await?;
        if saved {
            self.refresh_on_commit(db, record)?;
        }
        Ok(saved)
    }

    /// [`Adapter::delete`], evicting the entry once the delete commits.
    pub async fn delete<C: GenericClient>(
        &self,
        db: &mut Adapter<C>,
        record: &mut Record<M>,
    ) -> OrmResult<bool> {
        let deleted = db.delete(record).await?;
        if deleted {
            self.refresh_on_commit(db, record)?;
        }
        Ok(deleted)
    }

    fn refresh_on_commit<C: GenericClient>(
        &self,
        db: &mut Adapter<C>,
        record: &Record<M>,
    ) -> OrmResult<()> {
        let key = cache_key(&record.key_values()?)?;
        let snapshot = record.model().clone();
        let exists = record.exists_flag();
        let entries = Arc::clone(&self.entries);

        db.track_model(TrackType::Committed, move || {
            let mut entries = lock(&entries);
            if exists.load(Ordering::SeqCst) {
                entries.insert(key, snapshot);
            } else {
                entries.remove(&key);
            }
        });
        Ok(())
    }
}
