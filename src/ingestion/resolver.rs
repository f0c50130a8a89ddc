//! Find-or-create of catalog entities with a per-run cache.

use super::error::IngestionError;
use crate::listen_store::{
    Album, AlbumDefaults, Artist, ArtistDefaults, CatalogEntity, EntityKind, EntityRecord, Track,
    TrackDefaults,
};
use rusqlite::Connection;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    /// Lookups that had to go to the store.
    pub store_lookups: usize,
    pub created: usize,
}

/// Entities already resolved during the current run, keyed by kind and upstream id.
///
/// Lives for exactly one run. Entities created inside an event stay pending
/// until the runner commits that event; if the event is rolled back they are
/// evicted, since their rows no longer exist.
#[derive(Debug, Default)]
pub struct EntityCache {
    entries: HashMap<(EntityKind, String), EntityRecord>,
    pending: Vec<(EntityKind, String)>,
    stats: CacheStats,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The current event's transaction committed.
    pub fn commit_pending(&mut self) {
        self.pending.clear();
    }

    /// The current event's transaction rolled back.
    pub fn discard_pending(&mut self) {
        for key in self.pending.drain(..) {
            self.entries.remove(&key);
        }
    }

    fn get<E: CatalogEntity>(&self, external_id: &str) -> Option<E> {
        self.entries
            .get(&(E::KIND, external_id.to_string()))
            .and_then(E::from_record)
    }

    fn insert<E: CatalogEntity>(&mut self, external_id: &str, entity: E, created: bool) {
        let key = (E::KIND, external_id.to_string());
        if created {
            self.pending.push(key.clone());
        }
        self.entries.insert(key, entity.into_record());
    }
}

/// Returns the entity for `external_id`, creating it from `defaults` if the store has none.
///
/// Defaults are never applied to a row that already exists. The boolean is
/// true when a row was inserted.
pub fn resolve<E: CatalogEntity>(
    conn: &Connection,
    cache: &mut EntityCache,
    external_id: &str,
    defaults: E::Defaults,
) -> Result<(E, bool), IngestionError> {
    if external_id.is_empty() {
        return Err(IngestionError::MalformedEvent(format!(
            "{} without an id",
            E::KIND
        )));
    }

    if let Some(entity) = cache.get::<E>(external_id) {
        cache.stats.hits += 1;
        return Ok((entity, false));
    }

    cache.stats.store_lookups += 1;
    if let Some(existing) = E::find_by_external_id(conn, external_id)? {
        cache.insert(external_id, existing.clone(), false);
        return Ok((existing, false));
    }

    let created = E::insert(conn, external_id, defaults)?;
    debug!("Created {} {}", E::KIND, external_id);
    cache.stats.created += 1;
    cache.insert(external_id, created.clone(), true);
    Ok((created, true))
}

pub fn resolve_artist(
    conn: &Connection,
    cache: &mut EntityCache,
    external_id: &str,
    name: &str,
) -> Result<(Artist, bool), IngestionError> {
    resolve(
        conn,
        cache,
        external_id,
        ArtistDefaults {
            name: name.to_string(),
        },
    )
}

pub fn resolve_album(
    conn: &Connection,
    cache: &mut EntityCache,
    external_id: &str,
    defaults: AlbumDefaults,
) -> Result<(Album, bool), IngestionError> {
    resolve(conn, cache, external_id, defaults)
}

pub fn resolve_track(
    conn: &Connection,
    cache: &mut EntityCache,
    external_id: &str,
    defaults: TrackDefaults,
) -> Result<(Track, bool), IngestionError> {
    resolve(conn, cache, external_id, defaults)
}
