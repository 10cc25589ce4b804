//! Postgres implementation of the ImageStore port
//!
//! All domain type (de)serialization and SQL construction lives here.
//! Every operation runs in its own transaction (single statements rely on
//! Postgres statement atomicity). Folder counters are always recomputed
//! from image rows inside the same statement that updates the folder, so
//! `processed_images <= total_images` cannot be observed violated.
//!
//! ## Type Mapping
//!
//! | Domain Type        | SQL Type    | Strategy                                |
//! |--------------------|-------------|-----------------------------------------|
//! | FolderId, ImageId  | UUID        | `Uuid` via sqlx uuid feature            |
//! | DriveFolderId, ... | TEXT        | string via `as_str()` / `new()`         |
//! | FolderStatus, ...  | TEXT        | `as_str()` / `parse()` codecs           |
//! | DateTime<Utc>      | TIMESTAMPTZ | chrono via sqlx chrono feature          |
//! | caption_vec        | vector(D)   | text literal + `::vector` cast          |

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use drivelens_core::domain::folder::{Folder, FolderStatus};
use drivelens_core::domain::image::{Image, ImageStatus};
use drivelens_core::domain::newtypes::{
    DriveFileId, DriveFolderId, FolderId, ImageId, UserId, VersionToken,
};
use drivelens_core::domain::user::User;
use drivelens_core::ports::store::{
    FilenameHit, FilenameRank, ImageStore, NewFolder, NewImage, ResetFilter, SimilarityHit,
    StatusCounts, StoreError,
};

use crate::pool::DatabasePool;
use crate::vector::{parse_vector_literal, vector_literal, VectorInfra};

/// Postgres-backed image store
pub struct PgImageStore {
    pool: PgPool,
    embedding_dim: usize,
    vector_infra: VectorInfra,
}

impl PgImageStore {
    /// Creates a repository over an initialized pool
    pub fn new(pool: &DatabasePool, embedding_dim: usize) -> Self {
        Self {
            pool: pool.pool().clone(),
            embedding_dim,
            vector_infra: VectorInfra::default(),
        }
    }

    /// True when the vector column exists (provisioning succeeded)
    async fn vector_ready(&self) -> bool {
        self.vector_infra.is_ready(&self.pool, self.embedding_dim).await
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

fn map_sqlx(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::RowNotFound => StoreError::NotFound("row not found".to_string()),
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(e.to_string())
        }
        other => StoreError::Query(other.to_string()),
    }
}

fn decode_err(what: &str, detail: impl std::fmt::Display) -> StoreError {
    StoreError::Query(format!("failed to decode {what}: {detail}"))
}

/// Image column list; the vector column is faked as NULL when the
/// extension never provisioned, so row mapping stays uniform.
fn image_columns(with_vector: bool) -> String {
    let vec_expr = if with_vector {
        "caption_vec::text"
    } else {
        "NULL::text"
    };
    format!(
        "id, drive_file_id, folder_id, name, mime_type, thumbnail_url, view_url, \
         size_bytes, checksum, modified_at, version_token, status, caption, tags, \
         {vec_expr} AS caption_vec, error, created_at, updated_at"
    )
}

const FOLDER_COLUMNS: &str = "id, drive_folder_id, name, origin_url, user_id, status, \
                              total_images, processed_images, created_at, updated_at";

/// Escapes LIKE wildcards so user queries match literally
fn escape_like(pattern: &str) -> String {
    pattern
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

// ============================================================================
// Row mapping functions
// ============================================================================

fn folder_from_row(row: &PgRow) -> Result<Folder, StoreError> {
    let id: Uuid = row.try_get("id").map_err(|e| decode_err("folder.id", e))?;
    let drive_id: String = row
        .try_get("drive_folder_id")
        .map_err(|e| decode_err("folder.drive_folder_id", e))?;
    let status_str: String = row
        .try_get("status")
        .map_err(|e| decode_err("folder.status", e))?;
    let user_id: Option<Uuid> = row
        .try_get("user_id")
        .map_err(|e| decode_err("folder.user_id", e))?;

    Ok(Folder {
        id: FolderId::from_uuid(id),
        drive_folder_id: DriveFolderId::new(drive_id.clone())
            .map_err(|e| decode_err("folder.drive_folder_id", e))?,
        name: row.try_get("name").map_err(|e| decode_err("folder.name", e))?,
        origin_url: row
            .try_get("origin_url")
            .map_err(|e| decode_err("folder.origin_url", e))?,
        user_id: user_id.map(UserId::from_uuid),
        status: FolderStatus::parse(&status_str)
            .ok_or_else(|| decode_err("folder.status", &status_str))?,
        total_images: row
            .try_get("total_images")
            .map_err(|e| decode_err("folder.total_images", e))?,
        processed_images: row
            .try_get("processed_images")
            .map_err(|e| decode_err("folder.processed_images", e))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| decode_err("folder.created_at", e))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| decode_err("folder.updated_at", e))?,
    })
}

fn image_from_row(row: &PgRow) -> Result<Image, StoreError> {
    let id: Uuid = row.try_get("id").map_err(|e| decode_err("image.id", e))?;
    let drive_id: String = row
        .try_get("drive_file_id")
        .map_err(|e| decode_err("image.drive_file_id", e))?;
    let folder_id: Uuid = row
        .try_get("folder_id")
        .map_err(|e| decode_err("image.folder_id", e))?;
    let status_str: String = row
        .try_get("status")
        .map_err(|e| decode_err("image.status", e))?;
    let version_token: Option<String> = row
        .try_get("version_token")
        .map_err(|e| decode_err("image.version_token", e))?;
    let vec_text: Option<String> = row
        .try_get("caption_vec")
        .map_err(|e| decode_err("image.caption_vec", e))?;

    Ok(Image {
        id: ImageId::from_uuid(id),
        drive_file_id: DriveFileId::new(drive_id.clone())
            .map_err(|e| decode_err("image.drive_file_id", e))?,
        folder_id: FolderId::from_uuid(folder_id),
        name: row.try_get("name").map_err(|e| decode_err("image.name", e))?,
        mime_type: row
            .try_get("mime_type")
            .map_err(|e| decode_err("image.mime_type", e))?,
        thumbnail_url: row
            .try_get("thumbnail_url")
            .map_err(|e| decode_err("image.thumbnail_url", e))?,
        view_url: row
            .try_get("view_url")
            .map_err(|e| decode_err("image.view_url", e))?,
        size_bytes: row
            .try_get("size_bytes")
            .map_err(|e| decode_err("image.size_bytes", e))?,
        checksum: row
            .try_get("checksum")
            .map_err(|e| decode_err("image.checksum", e))?,
        modified_at: row
            .try_get("modified_at")
            .map_err(|e| decode_err("image.modified_at", e))?,
        version_token: version_token.and_then(|v| VersionToken::new(v).ok()),
        status: ImageStatus::parse(&status_str)
            .ok_or_else(|| decode_err("image.status", &status_str))?,
        caption: row
            .try_get("caption")
            .map_err(|e| decode_err("image.caption", e))?,
        tags: row.try_get("tags").map_err(|e| decode_err("image.tags", e))?,
        caption_vec: vec_text.as_deref().and_then(parse_vector_literal),
        error: row.try_get("error").map_err(|e| decode_err("image.error", e))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| decode_err("image.created_at", e))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| decode_err("image.updated_at", e))?,
    })
}

// ============================================================================
// ImageStore implementation
// ============================================================================

#[async_trait::async_trait]
impl ImageStore for PgImageStore {
    async fn create_folder(&self, folder: NewFolder) -> Result<Folder, StoreError> {
        let sql = format!(
            "INSERT INTO folders (id, drive_folder_id, name, origin_url, user_id, status, \
                                  total_images, processed_images) \
             VALUES ($1, $2, $3, $4, $5, 'pending', $6, 0) \
             RETURNING {FOLDER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(folder.drive_folder_id.as_str())
            .bind(&folder.name)
            .bind(&folder.origin_url)
            .bind(folder.user_id.map(|u| *u.as_uuid()))
            .bind(folder.total_images)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;
        folder_from_row(&row)
    }

    async fn get_folder(&self, id: &FolderId) -> Result<Folder, StoreError> {
        let sql = format!("SELECT {FOLDER_COLUMNS} FROM folders WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?
            .ok_or_else(|| StoreError::NotFound(format!("folder {id}")))?;
        folder_from_row(&row)
    }

    async fn find_folder_by_drive_id(
        &self,
        drive_folder_id: &DriveFolderId,
    ) -> Result<Option<Folder>, StoreError> {
        let sql = format!("SELECT {FOLDER_COLUMNS} FROM folders WHERE drive_folder_id = $1");
        let row = sqlx::query(&sql)
            .bind(drive_folder_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(folder_from_row).transpose()
    }

    async fn set_folder_status(
        &self,
        id: &FolderId,
        status: FolderStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE folders SET status = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("folder {id}")));
        }
        Ok(())
    }

    async fn set_folder_name(&self, id: &FolderId, name: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE folders SET name = $2, updated_at = now() WHERE id = $1")
            .bind(id.as_uuid())
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn link_folder_user(&self, id: &FolderId, user_id: &UserId) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE folders SET user_id = $2, updated_at = now() \
             WHERE id = $1 AND user_id IS NULL",
        )
        .bind(id.as_uuid())
        .bind(user_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn refresh_folder_progress(&self, id: &FolderId) -> Result<Folder, StoreError> {
        // Counts and folder update in one statement: the progress
        // invariant holds at every commit point, and a folder whose last
        // image just completed flips to 'completed' in the same write.
        let sql = format!(
            "UPDATE folders SET \
                 total_images = sub.total, \
                 processed_images = sub.completed, \
                 status = CASE WHEN sub.total > 0 AND sub.completed = sub.total \
                               THEN 'completed' \
                               WHEN folders.status = 'completed' THEN 'processing' \
                               ELSE folders.status END, \
                 updated_at = now() \
             FROM (SELECT count(*) AS total, \
                          count(*) FILTER (WHERE status = 'completed') AS completed \
                   FROM images WHERE folder_id = $1) AS sub \
             WHERE folders.id = $1 \
             RETURNING {}",
            FOLDER_COLUMNS
                .split(", ")
                .map(|c| format!("folders.{c}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?
            .ok_or_else(|| StoreError::NotFound(format!("folder {id}")))?;
        folder_from_row(&row)
    }

    async fn list_active_folders(&self) -> Result<Vec<Folder>, StoreError> {
        let sql = format!(
            "SELECT {FOLDER_COLUMNS} FROM folders WHERE status = 'processing' \
             ORDER BY updated_at ASC"
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        rows.iter().map(folder_from_row).collect()
    }

    async fn list_folders_with_pending(&self) -> Result<Vec<Folder>, StoreError> {
        let sql = format!(
            "SELECT {FOLDER_COLUMNS} FROM folders f \
             WHERE f.status <> 'completed' \
               AND EXISTS (SELECT 1 FROM images i \
                           WHERE i.folder_id = f.id AND i.status = 'pending') \
             ORDER BY f.created_at ASC"
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        rows.iter().map(folder_from_row).collect()
    }

    async fn create_images_bulk(&self, images: Vec<NewImage>) -> Result<Vec<Image>, StoreError> {
        let with_vector = self.vector_ready().await;
        let sql = format!(
            "INSERT INTO images (id, drive_file_id, folder_id, name, mime_type, \
                                 thumbnail_url, view_url, size_bytes, checksum, \
                                 modified_at, version_token, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'pending') \
             ON CONFLICT (drive_file_id) DO NOTHING \
             RETURNING {}",
            image_columns(with_vector)
        );

        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        let mut inserted = Vec::with_capacity(images.len());
        for image in images {
            let row = sqlx::query(&sql)
                .bind(Uuid::new_v4())
                .bind(image.drive_file_id.as_str())
                .bind(image.folder_id.as_uuid())
                .bind(&image.name)
                .bind(&image.mime_type)
                .bind(&image.thumbnail_url)
                .bind(&image.view_url)
                .bind(image.size_bytes)
                .bind(&image.checksum)
                .bind(image.modified_at)
                .bind(image.version_token.as_ref().map(VersionToken::as_str))
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx)?;
            if let Some(row) = row {
                inserted.push(image_from_row(&row)?);
            }
        }
        tx.commit().await.map_err(map_sqlx)?;
        Ok(inserted)
    }

    async fn get_image(&self, id: &ImageId) -> Result<Image, StoreError> {
        let with_vector = self.vector_ready().await;
        let sql = format!(
            "SELECT {} FROM images WHERE id = $1",
            image_columns(with_vector)
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?
            .ok_or_else(|| StoreError::NotFound(format!("image {id}")))?;
        image_from_row(&row)
    }

    async fn list_images(&self, folder_id: &FolderId) -> Result<Vec<Image>, StoreError> {
        let with_vector = self.vector_ready().await;
        let sql = format!(
            "SELECT {} FROM images WHERE folder_id = $1 ORDER BY name ASC",
            image_columns(with_vector)
        );
        let rows = sqlx::query(&sql)
            .bind(folder_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        rows.iter().map(image_from_row).collect()
    }

    async fn list_pending_images(
        &self,
        folder_id: &FolderId,
        limit: i64,
    ) -> Result<Vec<Image>, StoreError> {
        let with_vector = self.vector_ready().await;
        let sql = format!(
            "SELECT {} FROM images \
             WHERE folder_id = $1 AND status = 'pending' \
             ORDER BY created_at ASC, id ASC LIMIT $2",
            image_columns(with_vector)
        );
        let rows = sqlx::query(&sql)
            .bind(folder_id.as_uuid())
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        rows.iter().map(image_from_row).collect()
    }

    async fn list_drive_file_ids(
        &self,
        folder_id: &FolderId,
    ) -> Result<Vec<DriveFileId>, StoreError> {
        let rows = sqlx::query("SELECT drive_file_id FROM images WHERE folder_id = $1")
            .bind(folder_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;

        rows.iter()
            .map(|row| {
                let id: String = row
                    .try_get("drive_file_id")
                    .map_err(|e| decode_err("image.drive_file_id", e))?;
                DriveFileId::new(id).map_err(|e| decode_err("image.drive_file_id", e))
            })
            .collect()
    }

    async fn set_image_processing(&self, id: &ImageId) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE images SET status = 'processing', updated_at = now() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_image_completed(
        &self,
        id: &ImageId,
        caption: &str,
        tags: &str,
        vector: &[f32],
    ) -> Result<(), StoreError> {
        let result = if self.vector_ready().await {
            sqlx::query(
                "UPDATE images SET status = 'completed', caption = $2, tags = $3, \
                     caption_vec = $4::vector, error = NULL, updated_at = now() \
                 WHERE id = $1",
            )
            .bind(id.as_uuid())
            .bind(caption)
            .bind(tags)
            .bind(vector_literal(vector))
            .execute(&self.pool)
            .await
        } else {
            // Caption and tags persist even when vectors cannot.
            sqlx::query(
                "UPDATE images SET status = 'completed', caption = $2, tags = $3, \
                     error = NULL, updated_at = now() \
                 WHERE id = $1",
            )
            .bind(id.as_uuid())
            .bind(caption)
            .bind(tags)
            .execute(&self.pool)
            .await
        };

        let result = result.map_err(map_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("image {id}")));
        }
        Ok(())
    }

    async fn set_image_failed(&self, id: &ImageId, error: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE images SET status = 'failed', error = $2, updated_at = now() \
             WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("image {id}")));
        }
        Ok(())
    }

    async fn reset_images_to_pending(
        &self,
        filter: ResetFilter,
    ) -> Result<Vec<Image>, StoreError> {
        let with_vector = self.vector_ready().await;
        let vec_clause = if with_vector {
            "caption_vec = NULL, "
        } else {
            ""
        };
        let (where_clause, uuid_binds, time_bind): (&str, Vec<Uuid>, Option<DateTime<Utc>>) =
            match &filter {
                ResetFilter::Image(id) => ("id = $1", vec![*id.as_uuid()], None),
                ResetFilter::FolderRetryable(folder_id) => (
                    "folder_id = $1 AND status IN ('failed', 'pending')",
                    vec![*folder_id.as_uuid()],
                    None,
                ),
                ResetFilter::StuckSince(cutoff) => {
                    ("status = 'processing' AND updated_at < $1", vec![], Some(*cutoff))
                }
                ResetFilter::Ids(ids) => (
                    "id = ANY($1)",
                    ids.iter().map(|i| *i.as_uuid()).collect(),
                    None,
                ),
            };

        let sql = format!(
            "UPDATE images SET status = 'pending', caption = NULL, tags = NULL, \
                 {vec_clause}error = NULL, updated_at = now() \
             WHERE {where_clause} \
             RETURNING {}",
            image_columns(with_vector)
        );

        let mut query = sqlx::query(&sql);
        query = match &filter {
            ResetFilter::Ids(_) => query.bind(uuid_binds),
            ResetFilter::StuckSince(_) => query.bind(time_bind.expect("cutoff bound")),
            _ => query.bind(uuid_binds[0]),
        };

        let rows = query.fetch_all(&self.pool).await.map_err(map_sqlx)?;
        rows.iter().map(image_from_row).collect()
    }

    async fn count_images_by_status(
        &self,
        folder_id: &FolderId,
    ) -> Result<StatusCounts, StoreError> {
        let row = sqlx::query(
            "SELECT \
                 count(*) FILTER (WHERE status = 'pending') AS pending, \
                 count(*) FILTER (WHERE status = 'processing') AS processing, \
                 count(*) FILTER (WHERE status = 'completed') AS completed, \
                 count(*) FILTER (WHERE status = 'failed') AS failed \
             FROM images WHERE folder_id = $1",
        )
        .bind(folder_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(StatusCounts {
            pending: row.try_get("pending").map_err(|e| decode_err("counts", e))?,
            processing: row
                .try_get("processing")
                .map_err(|e| decode_err("counts", e))?,
            completed: row
                .try_get("completed")
                .map_err(|e| decode_err("counts", e))?,
            failed: row.try_get("failed").map_err(|e| decode_err("counts", e))?,
        })
    }

    async fn delete_images_by_drive_ids(
        &self,
        folder_id: &FolderId,
        drive_file_ids: &[DriveFileId],
    ) -> Result<u64, StoreError> {
        if drive_file_ids.is_empty() {
            return Ok(0);
        }
        let ids: Vec<String> = drive_file_ids.iter().map(|i| i.to_string()).collect();
        // Rows mid-caption stay put; the next sync pass removes them once
        // their worker releases the processing transition.
        let result = sqlx::query(
            "DELETE FROM images \
             WHERE folder_id = $1 AND drive_file_id = ANY($2) AND status <> 'processing'",
        )
        .bind(folder_id.as_uuid())
        .bind(&ids)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }

    async fn search_by_filename(
        &self,
        folder_id: &FolderId,
        pattern: &str,
        limit: i64,
    ) -> Result<Vec<FilenameHit>, StoreError> {
        let with_vector = self.vector_ready().await;
        let sql = format!(
            "SELECT {}, \
                 CASE WHEN lower(name) = lower($2) THEN 0 \
                      WHEN name ILIKE $3 || '%' THEN 1 \
                      ELSE 2 END AS name_rank \
             FROM images \
             WHERE folder_id = $1 AND name ILIKE '%' || $3 || '%' \
             ORDER BY name_rank ASC, name ASC \
             LIMIT $4",
            image_columns(with_vector)
        );
        let rows = sqlx::query(&sql)
            .bind(folder_id.as_uuid())
            .bind(pattern)
            .bind(escape_like(pattern))
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;

        rows.iter()
            .map(|row| {
                let rank: i32 = row
                    .try_get("name_rank")
                    .map_err(|e| decode_err("name_rank", e))?;
                Ok(FilenameHit {
                    image: image_from_row(row)?,
                    rank: match rank {
                        0 => FilenameRank::Exact,
                        1 => FilenameRank::Prefix,
                        _ => FilenameRank::Substring,
                    },
                })
            })
            .collect()
    }

    async fn search_by_similarity(
        &self,
        folder_id: &FolderId,
        query_vector: &[f32],
        limit: i64,
    ) -> Result<Vec<SimilarityHit>, StoreError> {
        // Surface unavailability as the typed error so the search engine
        // can degrade, rather than failing on an unknown column.
        self.vector_infra
            .ensure(&self.pool, self.embedding_dim)
            .await?;

        let sql = format!(
            "SELECT {}, (caption_vec <=> $2::vector)::float8 AS distance \
             FROM images \
             WHERE folder_id = $1 AND status = 'completed' AND caption_vec IS NOT NULL \
             ORDER BY caption_vec <=> $2::vector ASC \
             LIMIT $3",
            image_columns(true)
        );
        let rows = sqlx::query(&sql)
            .bind(folder_id.as_uuid())
            .bind(vector_literal(query_vector))
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;

        rows.iter()
            .map(|row| {
                let distance: f64 = row
                    .try_get("distance")
                    .map_err(|e| decode_err("distance", e))?;
                Ok(SimilarityHit {
                    image: image_from_row(row)?,
                    distance,
                })
            })
            .collect()
    }

    async fn ensure_vector_infra(&self) -> Result<(), StoreError> {
        self.vector_infra.ensure(&self.pool, self.embedding_dim).await
    }

    async fn upsert_user(&self, auth_id: &str, email: Option<&str>) -> Result<User, StoreError> {
        let row = sqlx::query(
            "INSERT INTO users (id, auth_id, email) VALUES ($1, $2, $3) \
             ON CONFLICT (auth_id) DO UPDATE \
                 SET email = COALESCE(EXCLUDED.email, users.email) \
             RETURNING id, auth_id, email, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(auth_id)
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(User {
            id: UserId::from_uuid(row.try_get("id").map_err(|e| decode_err("user.id", e))?),
            auth_id: row
                .try_get("auth_id")
                .map_err(|e| decode_err("user.auth_id", e))?,
            email: row.try_get("email").map_err(|e| decode_err("user.email", e))?,
            created_at: row
                .try_get("created_at")
                .map_err(|e| decode_err("user.created_at", e))?,
        })
    }

    async fn record_scan_receipt(
        &self,
        user_id: &UserId,
        drive_folder_id: &DriveFolderId,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO scan_receipts (user_id, drive_folder_id) VALUES ($1, $2) \
             ON CONFLICT (user_id, drive_folder_id) DO UPDATE \
                 SET scanned_at = now(), deleted_at = NULL",
        )
        .bind(user_id.as_uuid())
        .bind(drive_folder_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}
