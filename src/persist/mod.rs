//! The persistence engine: moves entities between memory and their table.
//!
//! A [`Repository`] owns one connection, the quoting schema resolved from that
//! connection's driver, the identity cache for its entity type, and the hooks the
//! type was registered with. Writes are minimal: an UPDATE names only changed
//! columns, and the baseline moves only after the connection confirmed the write.

pub mod clock;
pub mod config;
pub mod sql;

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, trace, warn};

use crate::cache::{EntityRef, IdentityCache};
use crate::connection::Connection;
use crate::core::{Params, PersistError, Result, Row, Value};
use crate::entity::{
    CREATED_AT, DELETED, DELETED_AT, Diff, Entity, EntityHooks, EntityType, HistoryLogger,
    NoHooks, UPDATED_AT,
};
use crate::schema::Schema;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::PersistConfig;
pub use sql::{ID_PARAM, TableStatements};

pub struct Repository<T: EntityType, C: Connection> {
    conn: C,
    schema: Schema,
    config: PersistConfig,
    cache: IdentityCache<T>,
    hooks: Box<dyn EntityHooks<T>>,
    history: Option<Box<dyn HistoryLogger<T>>>,
    clock: Box<dyn Clock>,
}

impl<T: EntityType, C: Connection> Repository<T, C> {
    /// Repository with the default configuration.
    pub fn new(conn: C) -> Result<Self> {
        Self::with_config(conn, PersistConfig::default())
    }

    /// Resolves the quoting schema from the connection's driver name; unsupported
    /// drivers fail here with [`PersistError::Configuration`].
    pub fn with_config(conn: C, config: PersistConfig) -> Result<Self> {
        let schema = Schema::for_driver(conn.driver_name())?;
        let cache = if config.cache_enabled {
            IdentityCache::for_type()
        } else {
            IdentityCache::disabled()
        };
        debug!(
            table = T::TABLE,
            driver = %schema.driver(),
            cache = config.cache_enabled,
            "repository ready"
        );

        Ok(Self {
            conn,
            schema,
            config,
            cache,
            hooks: Box::new(NoHooks),
            history: None,
            clock: Box::new(SystemClock),
        })
    }

    pub fn with_hooks(mut self, hooks: impl EntityHooks<T> + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    pub fn with_history(mut self, logger: impl HistoryLogger<T> + 'static) -> Self {
        self.history = Some(Box::new(logger));
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn config(&self) -> &PersistConfig {
        &self.config
    }

    pub fn cache(&self) -> &IdentityCache<T> {
        &self.cache
    }

    /// A transient entity using the configured date-trigger default.
    pub fn new_entity(&self) -> Entity<T> {
        let mut entity = Entity::new();
        entity.set_date_triggers(self.config.date_triggers);
        entity
    }

    /// Builds an entity from a fetched row and registers it in the identity cache.
    ///
    /// When the cache already holds the entity for the same primary key, that
    /// reference is returned unchanged and `on_load` does not run again; use
    /// [`Repository::refresh`] to reload it.
    pub fn hydrate(&mut self, row: Row) -> EntityRef<T> {
        let mut entity = self.new_entity();
        entity.load_row(&row, true);
        if let Some(cached) = self.cache.find(&entity) {
            trace!(table = T::TABLE, id = %entity.debug_title(), "identity cache hit");
            return cached;
        }

        entity.replace_baseline(row);
        self.hooks.on_load(&mut entity);
        let entity = Rc::new(RefCell::new(entity));
        self.cache.store(&entity);
        entity
    }

    /// Loads the row with primary key `id`.
    pub fn by_primary_key(&mut self, id: impl Into<Value>) -> Result<EntityRef<T>> {
        let id = id.into();
        let sql = self.statements().select_by_id();
        let row = self
            .fetch_row(&sql, &Params::new().with(ID_PARAM, id.clone()))?
            .ok_or_else(|| PersistError::not_found(T::TABLE, format!("id = \"{}\"", id)))?;
        Ok(self.hydrate(row))
    }

    /// Re-reads the stored row and makes it the new baseline.
    ///
    /// With `apply_to_fields` the stored values also overwrite the in-memory fields;
    /// without it local edits survive and show up as changes against the new baseline.
    pub fn refresh(&mut self, entity: &mut Entity<T>, apply_to_fields: bool) -> Result<()> {
        let id = entity.id().cloned().ok_or_else(|| {
            PersistError::InvalidOperation(format!(
                "cannot refresh a '{}' entity that was never persisted",
                T::TABLE
            ))
        })?;
        let sql = self.statements().select_by_id();
        let row = self
            .fetch_row(&sql, &Params::new().with(ID_PARAM, id.clone()))?
            .ok_or_else(|| {
                PersistError::not_found(T::TABLE, format!("ID does not exist anymore: {}", id))
            })?;

        if apply_to_fields {
            entity.load_row(&row, false);
        }
        entity.replace_baseline(row);
        self.hooks.on_load(entity);
        Ok(())
    }

    /// Writes a transient entity and assigns its primary key.
    pub fn insert(&mut self, entity: &mut Entity<T>) -> Result<()> {
        if let Some(id) = entity.id() {
            return Err(PersistError::InsertNotAllowed(format!(
                "Already exists. id: {}",
                id
            )));
        }

        // hooks may inspect the pending diff
        entity.preview_changes();

        let now = self.clock.now();
        if entity.date_triggers_enabled() && T::tracks(CREATED_AT) {
            entity.write_tracked(CREATED_AT, now);
        }
        self.hooks.before_insert(entity)?;
        self.before_save(entity);

        let mut params = Params::new();
        for &column in T::COLUMNS {
            if column == T::ID_COLUMN {
                continue;
            }
            if let Some(value) = entity.get(column).filter(|v| !v.is_null()) {
                params.bind(column, value.clone());
            }
        }
        if let Some(id) = entity.id_to_assign() {
            params.bind(T::ID_COLUMN, id.clone());
        }

        let columns: Vec<&str> = params.names().collect();
        let sql = self.statements().insert(&columns);
        self.execute(&sql, &params)?;

        let id = match entity.id_to_assign() {
            Some(id) => id.clone(),
            None => self.conn.last_insert_id()?,
        };
        debug!(table = T::TABLE, %id, "inserted");
        entity.commit_insert(id);

        let changes = entity.last_diff().clone();
        self.after_change(entity, &changes)
    }

    /// Writes pending changes of a persisted entity.
    ///
    /// A transient entity is inserted only when `allow_insert` is set, which keeps
    /// accidental inserts from slipping through.
    pub fn save(&mut self, entity: &mut Entity<T>, allow_insert: bool) -> Result<()> {
        let Some(id) = entity.id().cloned() else {
            if allow_insert {
                return self.insert(entity);
            }
            return Err(PersistError::InsertNotAllowed(format!(
                "'{}' entity is not stored yet and insert was not requested",
                T::TABLE
            )));
        };
        entity.reset_just_inserted();

        let mut changes = entity.preview_changes();
        if changes.is_empty() {
            trace!(table = T::TABLE, %id, "nothing to save");
            return Ok(());
        }
        if self.before_save(entity) {
            changes = entity.preview_changes();
            if changes.is_empty() {
                trace!(table = T::TABLE, %id, "changes reverted before save");
                return Ok(());
            }
        }

        let mut params = Params::new();
        for change in &changes {
            params.bind(change.column, change.new.clone());
        }
        let columns: Vec<&str> = changes.columns().collect();
        let sql = self.statements().update(&columns);
        params.bind(ID_PARAM, id);
        self.execute(&sql, &params)?;

        entity.commit_update(&changes);
        self.after_change(entity, &changes)
    }

    /// Soft delete: sets `deleted_at` (and the legacy `deleted` flag) and saves.
    ///
    /// When the save fails both markers are put back, so the entity is not deleted
    /// and the call can be retried.
    pub fn delete(&mut self, entity: &mut Entity<T>) -> Result<()> {
        if !entity.exists() || entity.is_deleted() {
            return Ok(());
        }
        if !T::tracks(DELETED_AT) && !T::tracks(DELETED) {
            return Err(PersistError::InvalidOperation(format!(
                "'{}' tracks neither {} nor {}; soft delete is not available",
                T::TABLE,
                DELETED_AT,
                DELETED
            )));
        }
        let previous = entity.deletion_markers();
        if T::tracks(DELETED_AT) {
            entity.write_tracked(DELETED_AT, self.clock.now());
        }
        entity.set_deleted_flag(1);

        if let Err(err) = self.save(entity, false) {
            entity.restore_deletion_markers(previous);
            return Err(err);
        }
        debug!(table = T::TABLE, id = %entity.debug_title(), "soft deleted");
        self.hooks.on_delete(entity);
        Ok(())
    }

    /// Hard delete by primary key. The entity loses its key and its identity-cache
    /// registrations afterwards.
    pub fn purge(&mut self, entity: &mut Entity<T>) -> Result<()> {
        let Some(id) = entity.id().cloned() else {
            return Ok(());
        };
        let sql = self.statements().delete_by_id();
        self.execute(&sql, &Params::new().with(ID_PARAM, id.clone()))?;
        entity.commit_purge();
        self.cache.evict(&id);
        debug!(table = T::TABLE, %id, "purged");
        Ok(())
    }

    /// `LOCK TABLE <table> WRITE`. Nothing unlocks automatically; prefer
    /// [`Repository::with_table_lock`].
    pub fn lock_table(&mut self) -> Result<()> {
        let sql = self.statements().lock();
        debug!(table = T::TABLE, %sql, "exec");
        self.conn.exec(&sql)?;
        Ok(())
    }

    pub fn unlock_table(&mut self) -> Result<()> {
        let sql = self.statements().unlock();
        debug!(table = T::TABLE, %sql, "exec");
        self.conn.exec(&sql)?;
        Ok(())
    }

    /// Runs `op` while the table is write-locked, unlocking whatever `op` returns.
    ///
    /// An error from `op` wins over an unlock error.
    pub fn with_table_lock<R, F>(&mut self, op: F) -> Result<R>
    where
        F: FnOnce(&mut Self) -> Result<R>,
    {
        self.lock_table()?;
        let result = op(self);
        let unlocked = self.unlock_table();

        match (result, unlocked) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(unlock_err)) => {
                warn!(table = T::TABLE, error = %unlock_err, "unlock failed after error");
                Err(err)
            }
        }
    }

    /// Identity-cache lookup by criteria name (`"slug.lang"`) and key (`"home.en"`).
    pub fn cached(&self, criteria_key: &str, key: &str) -> Result<EntityRef<T>> {
        self.cache.get(criteria_key, key)
    }

    pub fn cached_by(&self, columns: &[&str], values: &[Value]) -> Result<EntityRef<T>> {
        self.cache.get_by(columns, values)
    }

    pub fn disable_cache(&mut self) {
        self.cache.disable();
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    fn statements(&self) -> TableStatements<'_> {
        TableStatements::new(&self.schema, T::TABLE, T::ID_COLUMN)
    }

    /// Stamps `updated_at` and runs the user hook; `true` when anything changed.
    fn before_save(&self, entity: &mut Entity<T>) -> bool {
        let mut changed = false;
        if entity.date_triggers_enabled() && T::tracks(UPDATED_AT) {
            entity.write_tracked(UPDATED_AT, self.clock.now());
            changed = true;
        }
        changed |= self.hooks.before_save(entity);
        changed
    }

    fn after_change(&self, entity: &Entity<T>, changes: &Diff) -> Result<()> {
        self.hooks.after_change(entity, changes);
        if let Some(history) = &self.history {
            history.log_changes(entity, changes)?;
        }
        Ok(())
    }

    fn execute(&mut self, sql: &str, params: &Params) -> Result<()> {
        debug!(table = T::TABLE, %sql, "execute");
        let mut stmt = self.conn.prepare(sql)?;
        stmt.execute(params)
    }

    fn fetch_row(&mut self, sql: &str, params: &Params) -> Result<Option<Row>> {
        debug!(table = T::TABLE, %sql, "query");
        let mut stmt = self.conn.prepare(sql)?;
        stmt.execute(params)?;
        stmt.fetch_one()
    }
}
