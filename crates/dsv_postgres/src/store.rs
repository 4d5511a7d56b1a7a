//! Postgres implementation of every dsv_core port trait.
//!
//! All SQL is runtime-checked (`sqlx::query`, not `sqlx::query!`) so the crate
//! builds without a live database. Batch inserts use `ON CONFLICT DO NOTHING`
//! on the natural key and advance the checkpoint in the same transaction.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use dsv_core::error::DsvError;
use dsv_core::location::GeographicLevel;
use dsv_core::mapping::types::OptionMapping;
use dsv_core::meta::{FilterOptionMeta, LocationMeta, LocationOptionMetaRow, VersionMeta};
use dsv_core::ports::{
    DataSetStore, MappingStore, PublicIdLink, Result, SnapshotStore, VersionStore,
};
use dsv_core::types::{DataSet, DataSetVersion};
use dsv_core::version::SemVersion;

use crate::error::{decode, map_sqlx};
use crate::rows::{
    DataSetRow, FilterOptionRow, FilterRow, IndicatorRow, LocationOptionRow, MappingRow,
    TimePeriodRow, VersionRow, VERSION_COLUMNS,
};

const LOCATION_OPTIONS_JOB: &str = "location_options";
const OPTION_MAPPINGS_JOB: &str = "option_mappings";

/// Rows per INSERT statement; keeps bind parameters under the protocol limit.
const ROWS_PER_STATEMENT: usize = 2000;

const SCHEMA: &str = include_str!("../migrations/0001_data_set_versions.sql");

/// Postgres-backed store implementing all four ports over one pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the schema. Every statement is `IF NOT EXISTS`.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        tracing::info!("schema applied");
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(map_sqlx)
    }
}

async fn advance_checkpoint(
    tx: &mut Transaction<'static, Postgres>,
    job_key: &str,
    version_id: Uuid,
    batch_no: u32,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO batch_checkpoints (job_key, version_id, last_batch)
        VALUES ($1, $2, $3)
        ON CONFLICT (job_key, version_id) DO UPDATE
        SET last_batch = GREATEST(batch_checkpoints.last_batch, EXCLUDED.last_batch),
            updated_at = now()
        "#,
    )
    .bind(job_key)
    .bind(version_id)
    .bind(batch_no as i32)
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx)?;
    Ok(())
}

async fn read_checkpoint(pool: &PgPool, job_key: &str, version_id: Uuid) -> Result<Option<u32>> {
    let last = sqlx::query_scalar::<_, i32>(
        "SELECT last_batch FROM batch_checkpoints WHERE job_key = $1 AND version_id = $2",
    )
    .bind(job_key)
    .bind(version_id)
    .fetch_optional(pool)
    .await
    .map_err(map_sqlx)?;
    Ok(last.map(|n| n as u32))
}

// ── DataSetStore ──────────────────────────────────────────────

#[async_trait]
impl DataSetStore for PgStore {
    async fn create_data_set(&self, data_set: &DataSet) -> Result<()> {
        sqlx::query(
            "INSERT INTO data_sets (id, title, summary, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(data_set.id)
        .bind(&data_set.title)
        .bind(&data_set.summary)
        .bind(data_set.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn get_data_set(&self, data_set_id: Uuid) -> Result<DataSet> {
        sqlx::query_as::<_, DataSetRow>(
            "SELECT id, title, summary, created_at FROM data_sets WHERE id = $1",
        )
        .bind(data_set_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .map(DataSet::from)
        .ok_or_else(|| DsvError::NotFound(format!("data set {data_set_id} not found")))
    }

    async fn list_data_sets(&self) -> Result<Vec<DataSet>> {
        let rows = sqlx::query_as::<_, DataSetRow>(
            "SELECT id, title, summary, created_at FROM data_sets ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(rows.into_iter().map(DataSet::from).collect())
    }
}

// ── VersionStore ──────────────────────────────────────────────

#[async_trait]
impl VersionStore for PgStore {
    async fn insert_version(&self, v: &DataSetVersion) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO data_set_versions (
                id, data_set_id, version_major, version_minor, version_patch,
                status, notes, release_file_id, source_version_id, predecessor_id,
                failure_reason, concurrency_token, created_at, updated_at, published_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(v.id)
        .bind(v.data_set_id)
        .bind(v.version.major as i32)
        .bind(v.version.minor as i32)
        .bind(v.version.patch as i32)
        .bind(v.status.as_str())
        .bind(&v.notes)
        .bind(v.release_file_id)
        .bind(v.source_version_id)
        .bind(v.predecessor_id)
        .bind(&v.failure_reason)
        .bind(v.concurrency_token)
        .bind(v.created_at)
        .bind(v.updated_at)
        .bind(v.published_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn get_version(&self, version_id: Uuid) -> Result<DataSetVersion> {
        let query = format!("SELECT {VERSION_COLUMNS} FROM data_set_versions WHERE id = $1");
        sqlx::query_as::<_, VersionRow>(&query)
            .bind(version_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?
            .ok_or_else(|| DsvError::NotFound(format!("version {version_id} not found")))?
            .try_into()
    }

    async fn list_versions(&self, data_set_id: Uuid) -> Result<Vec<DataSetVersion>> {
        let query = format!(
            "SELECT {VERSION_COLUMNS} FROM data_set_versions WHERE data_set_id = $1 \
             ORDER BY version_major, version_minor, version_patch"
        );
        sqlx::query_as::<_, VersionRow>(&query)
            .bind(data_set_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?
            .into_iter()
            .map(DataSetVersion::try_from)
            .collect()
    }

    async fn find_version(
        &self,
        data_set_id: Uuid,
        version: SemVersion,
    ) -> Result<Option<DataSetVersion>> {
        let query = format!(
            "SELECT {VERSION_COLUMNS} FROM data_set_versions WHERE data_set_id = $1 \
             AND version_major = $2 AND version_minor = $3 AND version_patch = $4"
        );
        sqlx::query_as::<_, VersionRow>(&query)
            .bind(data_set_id)
            .bind(version.major as i32)
            .bind(version.minor as i32)
            .bind(version.patch as i32)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?
            .map(DataSetVersion::try_from)
            .transpose()
    }

    async fn update_version(
        &self,
        v: &DataSetVersion,
        expected_token: Uuid,
    ) -> Result<DataSetVersion> {
        let query = format!(
            r#"
            UPDATE data_set_versions
            SET version_major = $3, version_minor = $4, version_patch = $5,
                status = $6, notes = $7, release_file_id = $8,
                source_version_id = $9, predecessor_id = $10, failure_reason = $11,
                published_at = $12, concurrency_token = $13, updated_at = now()
            WHERE id = $1 AND concurrency_token = $2
            RETURNING {VERSION_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, VersionRow>(&query)
            .bind(v.id)
            .bind(expected_token)
            .bind(v.version.major as i32)
            .bind(v.version.minor as i32)
            .bind(v.version.patch as i32)
            .bind(v.status.as_str())
            .bind(&v.notes)
            .bind(v.release_file_id)
            .bind(v.source_version_id)
            .bind(v.predecessor_id)
            .bind(&v.failure_reason)
            .bind(v.published_at)
            .bind(Uuid::new_v4())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;

        match updated {
            Some(row) => row.try_into(),
            None => {
                // Distinguish a stale token from a missing row.
                let current = self.get_version(v.id).await?;
                Err(DsvError::Conflict(format!(
                    "version {} was modified concurrently (now '{}')",
                    v.id, current.status
                )))
            }
        }
    }

    async fn delete_version(&self, version_id: Uuid, expected_token: Uuid) -> Result<()> {
        let mut tx = self.begin().await?;
        let locked = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM data_set_versions WHERE id = $1 AND concurrency_token = $2 FOR UPDATE",
        )
        .bind(version_id)
        .bind(expected_token)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx)?;
        if locked.is_none() {
            tx.rollback().await.map_err(map_sqlx)?;
            let current = self.get_version(version_id).await?;
            return Err(DsvError::Conflict(format!(
                "version {version_id} was modified concurrently (now '{}')",
                current.status
            )));
        }

        for (table, column) in [
            ("option_mappings", "target_version_id"),
            ("mapping_finalizations", "target_version_id"),
            ("batch_checkpoints", "version_id"),
            ("filter_option_metas", "version_id"),
            ("filter_metas", "version_id"),
            ("location_option_metas", "version_id"),
            ("indicator_metas", "version_id"),
            ("time_period_metas", "version_id"),
            ("version_metas", "version_id"),
            ("data_set_versions", "id"),
        ] {
            sqlx::query(&format!("DELETE FROM {table} WHERE {column} = $1"))
                .bind(version_id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx)?;
        }
        tx.commit().await.map_err(map_sqlx)?;
        Ok(())
    }
}

// ── SnapshotStore ─────────────────────────────────────────────

#[async_trait]
impl SnapshotStore for PgStore {
    async fn insert_meta(&self, version_id: Uuid, meta: &VersionMeta) -> Result<()> {
        let mut tx = self.begin().await?;

        let fingerprint = meta.location_fingerprint();
        let stored = sqlx::query_scalar::<_, Option<String>>(
            "SELECT location_fingerprint FROM version_metas WHERE version_id = $1 FOR UPDATE",
        )
        .bind(version_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx)?
        .flatten();
        if stored.as_deref() != Some(fingerprint.as_str()) {
            // Committed location batches belong to another snapshot.
            sqlx::query("DELETE FROM location_option_metas WHERE version_id = $1")
                .bind(version_id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx)?;
            sqlx::query("DELETE FROM batch_checkpoints WHERE job_key = $1 AND version_id = $2")
                .bind(LOCATION_OPTIONS_JOB)
                .bind(version_id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx)?;
            if stored.is_some() {
                tracing::info!(
                    version_id = %version_id,
                    "snapshot replaced, location batches reset"
                );
            }
        }

        let geographic_levels: Vec<String> = meta
            .geographic_levels
            .iter()
            .map(|l| l.code().to_string())
            .collect();
        let location_levels: Vec<String> = meta
            .locations
            .iter()
            .map(|l| l.level.code().to_string())
            .collect();
        sqlx::query(
            r#"
            INSERT INTO version_metas
                (version_id, geographic_levels, location_levels, location_fingerprint)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (version_id) DO UPDATE
            SET geographic_levels = EXCLUDED.geographic_levels,
                location_levels = EXCLUDED.location_levels,
                location_fingerprint = EXCLUDED.location_fingerprint
            "#,
        )
        .bind(version_id)
        .bind(&geographic_levels)
        .bind(&location_levels)
        .bind(&fingerprint)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        // The header is replaced wholesale; location options are left to the batches.
        for table in [
            "filter_option_metas",
            "filter_metas",
            "indicator_metas",
            "time_period_metas",
        ] {
            sqlx::query(&format!("DELETE FROM {table} WHERE version_id = $1"))
                .bind(version_id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx)?;
        }

        for (ordinal, filter) in meta.filters.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO filter_metas (version_id, id, ordinal, column_name, label, hint)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(version_id)
            .bind(filter.id)
            .bind(ordinal as i32)
            .bind(&filter.column)
            .bind(&filter.label)
            .bind(&filter.hint)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

            let indexed: Vec<(usize, &FilterOptionMeta)> =
                filter.options.iter().enumerate().collect();
            for chunk in indexed.chunks(ROWS_PER_STATEMENT) {
                let mut qb = QueryBuilder::<Postgres>::new(
                    "INSERT INTO filter_option_metas \
                     (version_id, id, filter_id, ordinal, label, public_id, is_aggregate) ",
                );
                qb.push_values(chunk.iter(), |mut b, &(ordinal, option)| {
                    b.push_bind(version_id)
                        .push_bind(option.id)
                        .push_bind(filter.id)
                        .push_bind(ordinal as i32)
                        .push_bind(option.label.clone())
                        .push_bind(option.public_id.clone())
                        .push_bind(option.is_aggregate);
                });
                qb.build().execute(&mut *tx).await.map_err(map_sqlx)?;
            }
        }

        for (ordinal, indicator) in meta.indicators.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO indicator_metas
                    (version_id, id, ordinal, column_name, label, unit, decimal_places)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(version_id)
            .bind(indicator.id)
            .bind(ordinal as i32)
            .bind(&indicator.column)
            .bind(&indicator.label)
            .bind(&indicator.unit)
            .bind(indicator.decimal_places.map(i16::from))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        }

        for (ordinal, period) in meta.time_periods.iter().enumerate() {
            sqlx::query(
                "INSERT INTO time_period_metas (version_id, ordinal, code, period) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(version_id)
            .bind(ordinal as i32)
            .bind(&period.code)
            .bind(&period.period)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        }

        tx.commit().await.map_err(map_sqlx)?;
        Ok(())
    }

    async fn location_option_checkpoint(&self, version_id: Uuid) -> Result<Option<u32>> {
        read_checkpoint(&self.pool, LOCATION_OPTIONS_JOB, version_id).await
    }

    async fn insert_location_option_batch(
        &self,
        version_id: Uuid,
        batch_no: u32,
        rows: &[LocationOptionMetaRow],
    ) -> Result<()> {
        let mut tx = self.begin().await?;
        for chunk in rows.chunks(ROWS_PER_STATEMENT) {
            let mut qb = QueryBuilder::<Postgres>::new(
                "INSERT INTO location_option_metas \
                 (version_id, id, level, ordinal, label, code, old_code, urn, laestab, ukprn, public_id) ",
            );
            qb.push_values(chunk, |mut b, row| {
                let codes = &row.option.codes;
                b.push_bind(version_id)
                    .push_bind(row.option.id)
                    .push_bind(row.level.code())
                    .push_bind(row.ordinal as i32)
                    .push_bind(row.option.label.clone())
                    .push_bind(codes.code.clone())
                    .push_bind(codes.old_code.clone())
                    .push_bind(codes.urn.clone())
                    .push_bind(codes.laestab.clone())
                    .push_bind(codes.ukprn.clone())
                    .push_bind(row.option.public_id.clone());
            });
            qb.push(" ON CONFLICT (version_id, id) DO NOTHING");
            qb.build().execute(&mut *tx).await.map_err(map_sqlx)?;
        }
        advance_checkpoint(&mut tx, LOCATION_OPTIONS_JOB, version_id, batch_no).await?;
        tx.commit().await.map_err(map_sqlx)?;
        Ok(())
    }

    async fn get_meta(&self, version_id: Uuid) -> Result<VersionMeta> {
        let header = sqlx::query_as::<_, (Vec<String>, Vec<String>)>(
            "SELECT geographic_levels, location_levels FROM version_metas WHERE version_id = $1",
        )
        .bind(version_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .ok_or_else(|| DsvError::NotFound(format!("no snapshot for version {version_id}")))?;

        let parse_levels = |codes: &[String]| -> Result<Vec<GeographicLevel>> {
            codes
                .iter()
                .map(|c| decode("geographic level", c, GeographicLevel::parse))
                .collect()
        };
        let geographic_levels = parse_levels(&header.0)?.into_iter().collect();
        let location_levels = parse_levels(&header.1)?;

        let filter_rows = sqlx::query_as::<_, FilterRow>(
            "SELECT id, column_name, label, hint FROM filter_metas \
             WHERE version_id = $1 ORDER BY ordinal",
        )
        .bind(version_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let option_rows = sqlx::query_as::<_, FilterOptionRow>(
            "SELECT id, filter_id, label, public_id, is_aggregate FROM filter_option_metas \
             WHERE version_id = $1 ORDER BY filter_id, ordinal",
        )
        .bind(version_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        let mut options_by_filter: HashMap<Uuid, Vec<FilterOptionMeta>> = HashMap::new();
        for row in option_rows {
            options_by_filter
                .entry(row.filter_id)
                .or_default()
                .push(row.into());
        }

        let location_rows = sqlx::query_as::<_, LocationOptionRow>(
            "SELECT version_id, id, level, ordinal, label, code, old_code, urn, laestab, ukprn, \
             public_id FROM location_option_metas WHERE version_id = $1 ORDER BY level, ordinal",
        )
        .bind(version_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        let mut options_by_level: HashMap<GeographicLevel, Vec<_>> = HashMap::new();
        for row in location_rows {
            let row = LocationOptionMetaRow::try_from(row)?;
            options_by_level.entry(row.level).or_default().push(row.option);
        }

        let indicators = sqlx::query_as::<_, IndicatorRow>(
            "SELECT id, column_name, label, unit, decimal_places FROM indicator_metas \
             WHERE version_id = $1 ORDER BY ordinal",
        )
        .bind(version_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let time_periods = sqlx::query_as::<_, TimePeriodRow>(
            "SELECT code, period FROM time_period_metas WHERE version_id = $1 ORDER BY ordinal",
        )
        .bind(version_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(VersionMeta {
            filters: filter_rows
                .into_iter()
                .map(|f| {
                    let options = options_by_filter.remove(&f.id).unwrap_or_default();
                    f.into_meta(options)
                })
                .collect(),
            locations: location_levels
                .into_iter()
                .map(|level| LocationMeta {
                    level,
                    options: options_by_level.remove(&level).unwrap_or_default(),
                })
                .collect(),
            indicators: indicators.into_iter().map(Into::into).collect(),
            time_periods: time_periods.into_iter().map(Into::into).collect(),
            geographic_levels,
        })
    }

    async fn assign_public_ids(&self, version_id: Uuid, links: &[PublicIdLink]) -> Result<()> {
        let mut tx = self.begin().await?;
        for link in links {
            for table in ["filter_option_metas", "location_option_metas"] {
                sqlx::query(&format!(
                    "UPDATE {table} SET public_id = $3 WHERE version_id = $1 AND id = $2"
                ))
                .bind(version_id)
                .bind(link.option_id)
                .bind(&link.public_id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx)?;
            }
        }
        tx.commit().await.map_err(map_sqlx)?;
        Ok(())
    }
}

// ── MappingStore ──────────────────────────────────────────────

#[async_trait]
impl MappingStore for PgStore {
    async fn mapping_checkpoint(&self, target_version_id: Uuid) -> Result<Option<u32>> {
        read_checkpoint(&self.pool, OPTION_MAPPINGS_JOB, target_version_id).await
    }

    async fn insert_mapping_batch(
        &self,
        target_version_id: Uuid,
        batch_no: u32,
        rows: &[OptionMapping],
    ) -> Result<()> {
        if let Some(stray) = rows.iter().find(|r| r.target_version_id != target_version_id) {
            return Err(DsvError::Integrity(format!(
                "mapping row targets {} but batch is for {target_version_id}",
                stray.target_version_id
            )));
        }
        let mut tx = self.begin().await?;
        for chunk in rows.chunks(ROWS_PER_STATEMENT) {
            let mut qb = QueryBuilder::<Postgres>::new(
                "INSERT INTO option_mappings (source_version_id, source_option_id, \
                 target_version_id, target_option_id, grouping_kind, grouping_key, mapping_type) ",
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(row.source_version_id)
                    .push_bind(row.source_option_id)
                    .push_bind(row.target_version_id)
                    .push_bind(row.target_option_id)
                    .push_bind(row.grouping.kind())
                    .push_bind(row.grouping.key())
                    .push_bind(row.mapping_type.as_str());
            });
            qb.push(
                " ON CONFLICT (source_version_id, source_option_id, target_version_id) DO NOTHING",
            );
            qb.build().execute(&mut *tx).await.map_err(map_sqlx)?;
        }
        advance_checkpoint(&mut tx, OPTION_MAPPINGS_JOB, target_version_id, batch_no).await?;
        tx.commit().await.map_err(map_sqlx)?;
        Ok(())
    }

    async fn list_mappings(&self, target_version_id: Uuid) -> Result<Vec<OptionMapping>> {
        sqlx::query_as::<_, MappingRow>(
            "SELECT source_version_id, source_option_id, target_version_id, target_option_id, \
             grouping_kind, grouping_key, mapping_type FROM option_mappings \
             WHERE target_version_id = $1 ORDER BY seq",
        )
        .bind(target_version_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?
        .into_iter()
        .map(OptionMapping::try_from)
        .collect()
    }

    async fn get_mapping(
        &self,
        target_version_id: Uuid,
        source_option_id: Uuid,
    ) -> Result<OptionMapping> {
        sqlx::query_as::<_, MappingRow>(
            "SELECT source_version_id, source_option_id, target_version_id, target_option_id, \
             grouping_kind, grouping_key, mapping_type FROM option_mappings \
             WHERE target_version_id = $1 AND source_option_id = $2",
        )
        .bind(target_version_id)
        .bind(source_option_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .ok_or_else(|| {
            DsvError::NotFound(format!(
                "no mapping for option {source_option_id} in version {target_version_id}"
            ))
        })?
        .try_into()
    }

    async fn update_mapping(&self, mapping: &OptionMapping) -> Result<()> {
        if let Some(target_option_id) = mapping.target_option_id {
            let present = sqlx::query_scalar::<_, bool>(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM filter_option_metas WHERE version_id = $1 AND id = $2
                    UNION ALL
                    SELECT 1 FROM location_option_metas WHERE version_id = $1 AND id = $2
                )
                "#,
            )
            .bind(mapping.target_version_id)
            .bind(target_option_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;
            if !present {
                return Err(DsvError::Integrity(format!(
                    "option {target_option_id} is not in the snapshot of version {}",
                    mapping.target_version_id
                )));
            }
        }
        let result = sqlx::query(
            r#"
            UPDATE option_mappings
            SET target_option_id = $4, mapping_type = $5
            WHERE source_version_id = $1 AND source_option_id = $2 AND target_version_id = $3
            "#,
        )
        .bind(mapping.source_version_id)
        .bind(mapping.source_option_id)
        .bind(mapping.target_version_id)
        .bind(mapping.target_option_id)
        .bind(mapping.mapping_type.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(DsvError::NotFound(format!(
                "no mapping for option {} in version {}",
                mapping.source_option_id, mapping.target_version_id
            )));
        }
        Ok(())
    }

    async fn mark_finalized(&self, target_version_id: Uuid) -> Result<()> {
        sqlx::query(
            "INSERT INTO mapping_finalizations (target_version_id) VALUES ($1) \
             ON CONFLICT (target_version_id) DO NOTHING",
        )
        .bind(target_version_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn is_finalized(&self, target_version_id: Uuid) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM mapping_finalizations WHERE target_version_id = $1)",
        )
        .bind(target_version_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)
    }
}
