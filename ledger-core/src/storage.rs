//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `restaurants` - Administrative records (key: restaurant_id)
//! - `events` - Append-only processor event log (key: event_id)
//! - `postings` - Append-only ledger postings (key: posting_id)
//! - `payouts` - Payout records with embedded items (key: payout_id)
//! - `indices` - Secondary indices for fast lookups
//!
//! # Atomicity
//!
//! RocksDB has no unique constraints, so insert-with-uniqueness-rejection
//! is built here: a short `parking_lot::Mutex` critical section makes the
//! key probe and the `WriteBatch` commit one indivisible operation. The
//! result is a tagged outcome, never an exception path. The lock is the
//! store's analog of a row latch; callers never observe it.

use crate::{
    error::{Error, Result},
    types::{
        Currency, Payout, PayoutStatus, Posting, ProcessorEvent, Restaurant, RestaurantId,
    },
    Config,
};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    WriteBatch, DB,
};
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_RESTAURANTS: &str = "restaurants";
const CF_EVENTS: &str = "events";
const CF_POSTINGS: &str = "postings";
const CF_PAYOUTS: &str = "payouts";
const CF_INDICES: &str = "indices";

/// Index key prefixes
const IDX_POSTING: u8 = b'p';
const IDX_PAYOUT: u8 = b'y';
const IDX_PAYOUT_AS_OF: u8 = b'a';

/// Outcome of an atomic insert keyed by a unique external id
#[derive(Debug)]
pub enum InsertOutcome<T> {
    /// The key was new; everything in the unit was written
    Created,
    /// The key already existed; nothing was written
    AlreadyExists(T),
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,

    /// Serializes uniqueness probes with their batch commits. Held only
    /// for the probe + write, never across reads returned to callers.
    write_lock: Mutex<()>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        // Universal compaction for the append-heavy workload
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_RESTAURANTS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_EVENTS, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_POSTINGS, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_PAYOUTS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = %path.display(), "Opened RocksDB ledger store");

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    // Column family options

    fn cf_options_log() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_records() -> Options {
        let mut opts = Options::default();
        // Frequently read, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false); // 10 bits per key
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Event ingestion

    /// Atomically insert a processor event with its derived postings.
    ///
    /// The probe on `event_id` *is* the idempotency check: under the write
    /// lock, either the id is new and the whole unit (restaurant upsert,
    /// event row, postings, optional payout transition) commits as one
    /// `WriteBatch`, or the stored event is returned and nothing is
    /// written. `mark_paid` carries the payout a `payout_paid` event
    /// transitions; its referential checks run before anything is staged.
    pub fn insert_event_atomic(
        &self,
        event: &ProcessorEvent,
        postings: &[Posting],
        mark_paid: Option<Uuid>,
    ) -> Result<InsertOutcome<ProcessorEvent>> {
        let cf_events = self.cf_handle(CF_EVENTS)?;
        let cf_postings = self.cf_handle(CF_POSTINGS)?;
        let cf_restaurants = self.cf_handle(CF_RESTAURANTS)?;
        let cf_payouts = self.cf_handle(CF_PAYOUTS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let _guard = self.write_lock.lock();

        // Uniqueness probe and commit are one critical section.
        if let Some(raw) = self.db.get_cf(cf_events, event.event_id.as_bytes())? {
            let existing: ProcessorEvent = bincode::deserialize(&raw)?;
            return Ok(InsertOutcome::AlreadyExists(existing));
        }

        let mut batch = WriteBatch::default();

        // Referential checks before anything is staged; any failure here
        // leaves no partial state behind.
        if let Some(payout_id) = mark_paid {
            let mut payout = self.load_payout(payout_id)?;
            if payout.restaurant_id != event.restaurant_id || payout.currency != event.currency
            {
                return Err(Error::Conflict(format!(
                    "Payout {} does not belong to {}/{}",
                    payout_id, event.restaurant_id, event.currency
                )));
            }
            if payout.status.is_terminal() {
                return Err(Error::Conflict(format!(
                    "Payout {} already {}",
                    payout_id, payout.status
                )));
            }
            payout.status = PayoutStatus::Paid;
            payout.paid_at = Some(event.occurred_at);
            self.stage_payout(&mut batch, cf_payouts, cf_indices, &payout)?;
        }

        // Restaurant auto-created on first reference
        if self
            .db
            .get_cf(cf_restaurants, event.restaurant_id.as_str().as_bytes())?
            .is_none()
        {
            let restaurant = Restaurant::implicit(event.restaurant_id.clone(), event.recorded_at);
            batch.put_cf(
                cf_restaurants,
                restaurant.id.as_str().as_bytes(),
                bincode::serialize(&restaurant)?,
            );
        }

        batch.put_cf(
            cf_events,
            event.event_id.as_bytes(),
            bincode::serialize(event)?,
        );

        for posting in postings {
            batch.put_cf(
                cf_postings,
                posting.posting_id.as_bytes(),
                bincode::serialize(posting)?,
            );
            batch.put_cf(
                cf_indices,
                Self::posting_index_key(
                    &posting.restaurant_id,
                    posting.currency,
                    posting.posting_id,
                ),
                b"",
            );
        }

        self.db.write(batch)?;

        tracing::debug!(
            event_id = %event.event_id,
            restaurant_id = %event.restaurant_id,
            postings = postings.len(),
            "Event appended"
        );

        Ok(InsertOutcome::Created)
    }

    /// Get event by its external id
    pub fn get_event(&self, event_id: &str) -> Result<ProcessorEvent> {
        let cf = self.cf_handle(CF_EVENTS)?;
        let raw = self
            .db
            .get_cf(cf, event_id.as_bytes())?
            .ok_or_else(|| Error::EventNotFound(event_id.to_string()))?;
        Ok(bincode::deserialize(&raw)?)
    }

    // Restaurant operations

    /// Get restaurant by id
    pub fn get_restaurant(&self, id: &RestaurantId) -> Result<Option<Restaurant>> {
        let cf = self.cf_handle(CF_RESTAURANTS)?;
        match self.db.get_cf(cf, id.as_str().as_bytes())? {
            Some(raw) => Ok(Some(bincode::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Overwrite a restaurant record (administrative updates)
    pub fn put_restaurant(&self, restaurant: &Restaurant) -> Result<()> {
        let cf = self.cf_handle(CF_RESTAURANTS)?;
        self.db.put_cf(
            cf,
            restaurant.id.as_str().as_bytes(),
            bincode::serialize(restaurant)?,
        )?;
        Ok(())
    }

    /// Ids of all restaurants with the active flag set
    pub fn list_active_restaurants(&self) -> Result<Vec<RestaurantId>> {
        let cf = self.cf_handle(CF_RESTAURANTS)?;
        let mut ids = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, raw) = item?;
            let restaurant: Restaurant = bincode::deserialize(&raw)?;
            if restaurant.is_active {
                ids.push(restaurant.id);
            }
        }
        Ok(ids)
    }

    // Posting operations

    /// All postings for a (restaurant, currency) pair, oldest first
    pub fn get_postings(
        &self,
        restaurant_id: &RestaurantId,
        currency: Currency,
    ) -> Result<Vec<Posting>> {
        let cf_postings = self.cf_handle(CF_POSTINGS)?;

        let prefix = Self::posting_index_prefix(restaurant_id, currency);
        let mut postings = Vec::new();

        for key in self.scan_index(&prefix)? {
            // posting_id is the 16-byte suffix of the index key
            let id_bytes: [u8; 16] = key[key.len() - 16..]
                .try_into()
                .map_err(|_| Error::Storage("Malformed posting index key".to_string()))?;
            let posting_id = Uuid::from_bytes(id_bytes);

            let raw = self
                .db
                .get_cf(cf_postings, posting_id.as_bytes())?
                .ok_or_else(|| {
                    Error::Storage(format!("Posting {} indexed but missing", posting_id))
                })?;
            postings.push(bincode::deserialize::<Posting>(&raw)?);
        }

        Ok(postings)
    }

    // Payout operations

    /// Atomically insert a payout with its reservation posting.
    ///
    /// The (restaurant, currency, as_of) probe and the commit share the
    /// write lock, so a second run for the same date is a silent no-op
    /// reported as `AlreadyExists` with the earlier payout's id. Invariant
    /// checks (positive amount, items sum, reservation mirror) reject the
    /// whole unit before anything is written.
    pub fn insert_payout_atomic(
        &self,
        payout: &Payout,
        reserve: &Posting,
    ) -> Result<InsertOutcome<Uuid>> {
        let cf_payouts = self.cf_handle(CF_PAYOUTS)?;
        let cf_postings = self.cf_handle(CF_POSTINGS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;

        if payout.amount_cents <= 0 {
            return Err(Error::InvariantViolation(format!(
                "Payout amount must be positive, got {}",
                payout.amount_cents
            )));
        }
        if payout.items_total_cents() != payout.amount_cents {
            return Err(Error::InvariantViolation(format!(
                "Payout items sum {} != amount {}",
                payout.items_total_cents(),
                payout.amount_cents
            )));
        }
        if reserve.amount_cents != -payout.amount_cents
            || reserve.related_payout_id != Some(payout.payout_id)
            || reserve.available_at.is_some()
        {
            return Err(Error::InvariantViolation(
                "Reservation posting must debit the full payout amount immediately".to_string(),
            ));
        }

        let _guard = self.write_lock.lock();

        let as_of_key =
            Self::payout_as_of_key(&payout.restaurant_id, payout.currency, payout.as_of);
        if let Some(raw) = self.db.get_cf(cf_indices, &as_of_key)? {
            let id_bytes: [u8; 16] = raw
                .as_slice()
                .try_into()
                .map_err(|_| Error::Storage("Malformed as-of index value".to_string()))?;
            return Ok(InsertOutcome::AlreadyExists(Uuid::from_bytes(id_bytes)));
        }

        let mut batch = WriteBatch::default();

        self.stage_payout(&mut batch, cf_payouts, cf_indices, payout)?;
        batch.put_cf(cf_indices, &as_of_key, payout.payout_id.as_bytes());

        batch.put_cf(
            cf_postings,
            reserve.posting_id.as_bytes(),
            bincode::serialize(reserve)?,
        );
        batch.put_cf(
            cf_indices,
            Self::posting_index_key(&reserve.restaurant_id, reserve.currency, reserve.posting_id),
            b"",
        );

        self.db.write(batch)?;

        tracing::info!(
            payout_id = %payout.payout_id,
            restaurant_id = %payout.restaurant_id,
            currency = %payout.currency,
            amount_cents = payout.amount_cents,
            as_of = %payout.as_of,
            "Payout reserved"
        );

        Ok(InsertOutcome::Created)
    }

    /// Get payout by id, items embedded
    pub fn get_payout(&self, payout_id: Uuid) -> Result<Payout> {
        self.load_payout(payout_id)
    }

    /// Whether a non-terminal (`created`/`processing`) payout exists for
    /// the pair
    pub fn has_open_payout(
        &self,
        restaurant_id: &RestaurantId,
        currency: Currency,
    ) -> Result<bool> {
        let prefix = Self::payout_index_prefix(restaurant_id, currency);
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let iter = self
            .db
            .iterator_cf(cf_indices, IteratorMode::From(&prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            match value.first() {
                Some(&s) if s == PayoutStatus::Created as u8 => return Ok(true),
                Some(&s) if s == PayoutStatus::Processing as u8 => return Ok(true),
                _ => {}
            }
        }

        Ok(false)
    }

    /// Transition a payout's status.
    ///
    /// Terminal payouts reject further transitions; `paid` requires a
    /// timestamp and only `failed` carries a reason. The reservation
    /// posting is never touched here.
    pub fn update_payout_status(
        &self,
        payout_id: Uuid,
        status: PayoutStatus,
        paid_at: Option<DateTime<Utc>>,
        failure_reason: Option<String>,
    ) -> Result<Payout> {
        let cf_payouts = self.cf_handle(CF_PAYOUTS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let _guard = self.write_lock.lock();

        let mut payout = self.load_payout(payout_id)?;
        if payout.status.is_terminal() {
            return Err(Error::Conflict(format!(
                "Payout {} already {}",
                payout_id, payout.status
            )));
        }

        payout.status = status;
        payout.paid_at = match status {
            PayoutStatus::Paid => Some(paid_at.unwrap_or_else(Utc::now)),
            _ => None,
        };
        if let Some(reason) = failure_reason {
            payout.failure_reason = Some(reason);
        }

        let mut batch = WriteBatch::default();
        self.stage_payout(&mut batch, cf_payouts, cf_indices, &payout)?;
        self.db.write(batch)?;

        tracing::info!(payout_id = %payout_id, status = %status, "Payout status updated");

        Ok(payout)
    }

    // Statistics

    /// Approximate row counts, for operational logging
    pub fn get_stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            total_events: self.approximate_count(CF_EVENTS)?,
            total_postings: self.approximate_count(CF_POSTINGS)?,
            total_payouts: self.approximate_count(CF_PAYOUTS)?,
        })
    }

    fn approximate_count(&self, cf_name: &str) -> Result<u64> {
        let cf = self.cf_handle(cf_name)?;
        let prop = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);
        Ok(prop)
    }

    // Internal helpers

    fn load_payout(&self, payout_id: Uuid) -> Result<Payout> {
        let cf = self.cf_handle(CF_PAYOUTS)?;
        let raw = self
            .db
            .get_cf(cf, payout_id.as_bytes())?
            .ok_or_else(|| Error::PayoutNotFound(payout_id.to_string()))?;
        Ok(bincode::deserialize(&raw)?)
    }

    fn stage_payout(
        &self,
        batch: &mut WriteBatch,
        cf_payouts: &ColumnFamily,
        cf_indices: &ColumnFamily,
        payout: &Payout,
    ) -> Result<()> {
        batch.put_cf(
            cf_payouts,
            payout.payout_id.as_bytes(),
            bincode::serialize(payout)?,
        );
        batch.put_cf(
            cf_indices,
            Self::payout_index_key(&payout.restaurant_id, payout.currency, payout.payout_id),
            [payout.status as u8],
        );
        Ok(())
    }

    /// Collect index keys sharing `prefix`, in key order
    fn scan_index(&self, prefix: &[u8]) -> Result<Vec<Box<[u8]>>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let mut keys = Vec::new();

        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            keys.push(key);
        }

        Ok(keys)
    }

    // Index key helpers

    fn key_pair_prefix(tag: u8, restaurant_id: &RestaurantId, currency: Currency) -> Vec<u8> {
        let mut key = vec![tag, b'|'];
        key.extend_from_slice(restaurant_id.as_str().as_bytes());
        key.push(b'|');
        key.extend_from_slice(currency.code().as_bytes());
        key.push(b'|');
        key
    }

    fn posting_index_prefix(restaurant_id: &RestaurantId, currency: Currency) -> Vec<u8> {
        Self::key_pair_prefix(IDX_POSTING, restaurant_id, currency)
    }

    fn posting_index_key(
        restaurant_id: &RestaurantId,
        currency: Currency,
        posting_id: Uuid,
    ) -> Vec<u8> {
        let mut key = Self::posting_index_prefix(restaurant_id, currency);
        key.extend_from_slice(posting_id.as_bytes());
        key
    }

    fn payout_index_prefix(restaurant_id: &RestaurantId, currency: Currency) -> Vec<u8> {
        Self::key_pair_prefix(IDX_PAYOUT, restaurant_id, currency)
    }

    fn payout_index_key(
        restaurant_id: &RestaurantId,
        currency: Currency,
        payout_id: Uuid,
    ) -> Vec<u8> {
        let mut key = Self::payout_index_prefix(restaurant_id, currency);
        key.extend_from_slice(payout_id.as_bytes());
        key
    }

    fn payout_as_of_key(
        restaurant_id: &RestaurantId,
        currency: Currency,
        as_of: NaiveDate,
    ) -> Vec<u8> {
        let mut key = Self::key_pair_prefix(IDX_PAYOUT_AS_OF, restaurant_id, currency);
        key.extend_from_slice(as_of.to_string().as_bytes());
        key
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Approximate number of processor events
    pub total_events: u64,
    /// Approximate number of ledger postings
    pub total_postings: u64,
    /// Approximate number of payouts
    pub total_payouts: u64,
}
