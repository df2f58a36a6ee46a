use async_trait::async_trait;
use sqlx::{FromRow, PgConnection};
use time::OffsetDateTime;

use crate::application::repos::{
    CreatePropertyParams, PropertiesRepo, PropertiesWriteRepo, RepoError, UpdatePropertyParams,
};
use crate::cache::{CommitHooks, CommitListener, MutationAction, PendingMutation};
use crate::domain::entities::{PropertyId, PropertyRecord, generate_reference_number};
use crate::domain::types::{PropertyStatus, PropertyType};

use super::PostgresRepositories;
use super::util::map_sqlx_error;

const SELECT_PROPERTIES: &str = r#"
    SELECT p.id, p.reference_number, p.title, p.description,
           p.price::float8 AS price, p.location, p.property_type,
           p.bedrooms, p.bathrooms::float8 AS bathrooms, p.square_feet, p.status,
           p.has_garage, p.has_pool, p.has_garden, p.is_furnished,
           ARRAY(
               SELECT a.name FROM property_amenities a
               WHERE a.property_id = p.id ORDER BY a.name
           )::text[] AS amenities,
           p.created_at, p.updated_at, p.listed_date
    FROM properties p
"#;

#[derive(Debug, FromRow)]
struct PropertyRow {
    id: i64,
    reference_number: String,
    title: String,
    description: String,
    price: f64,
    location: String,
    property_type: PropertyType,
    bedrooms: i32,
    bathrooms: f64,
    square_feet: Option<i32>,
    status: PropertyStatus,
    has_garage: bool,
    has_pool: bool,
    has_garden: bool,
    is_furnished: bool,
    amenities: Vec<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    listed_date: OffsetDateTime,
}

impl From<PropertyRow> for PropertyRecord {
    fn from(row: PropertyRow) -> Self {
        Self {
            id: row.id,
            reference_number: row.reference_number,
            title: row.title,
            description: row.description,
            price: row.price,
            location: row.location,
            property_type: row.property_type,
            bedrooms: row.bedrooms,
            bathrooms: row.bathrooms,
            square_feet: row.square_feet,
            status: row.status,
            has_garage: row.has_garage,
            has_pool: row.has_pool,
            has_garden: row.has_garden,
            is_furnished: row.is_furnished,
            amenities: row.amenities,
            created_at: row.created_at,
            updated_at: row.updated_at,
            listed_date: row.listed_date,
        }
    }
}

async fn fetch_one_by_id(
    conn: &mut PgConnection,
    id: PropertyId,
) -> Result<Option<PropertyRecord>, RepoError> {
    let sql = format!("{SELECT_PROPERTIES} WHERE p.id = $1");
    let row = sqlx::query_as::<_, PropertyRow>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(map_sqlx_error)?;
    Ok(row.map(PropertyRecord::from))
}

async fn fetch_list<'q>(
    pool: &sqlx::PgPool,
    query: sqlx::query::QueryAs<'q, sqlx::Postgres, PropertyRow, sqlx::postgres::PgArguments>,
) -> Result<Vec<PropertyRecord>, RepoError> {
    let rows = query.fetch_all(pool).await.map_err(map_sqlx_error)?;
    Ok(rows.into_iter().map(PropertyRecord::from).collect())
}

#[async_trait]
impl PropertiesRepo for PostgresRepositories {
    async fn fetch_all(&self) -> Result<Vec<PropertyRecord>, RepoError> {
        let sql = format!("{SELECT_PROPERTIES} ORDER BY p.created_at DESC, p.id DESC");
        fetch_list(self.pool(), sqlx::query_as(&sql)).await
    }

    async fn fetch_by_location(&self, location: &str) -> Result<Vec<PropertyRecord>, RepoError> {
        let sql = format!(
            "{SELECT_PROPERTIES} WHERE p.location ILIKE $1 ORDER BY p.created_at DESC, p.id DESC"
        );
        let pattern = format!("%{}%", location.trim());
        fetch_list(self.pool(), sqlx::query_as(&sql).bind(pattern)).await
    }

    async fn fetch_by_price_range(
        &self,
        min_price: f64,
        max_price: f64,
    ) -> Result<Vec<PropertyRecord>, RepoError> {
        let sql = format!(
            "{SELECT_PROPERTIES} WHERE p.price >= $1 AND p.price <= $2 ORDER BY p.price ASC, p.id ASC"
        );
        fetch_list(
            self.pool(),
            sqlx::query_as(&sql).bind(min_price).bind(max_price),
        )
        .await
    }

    async fn fetch_by_id(&self, id: PropertyId) -> Result<Option<PropertyRecord>, RepoError> {
        let mut conn = self.pool().acquire().await.map_err(map_sqlx_error)?;
        fetch_one_by_id(&mut *conn, id).await
    }

    async fn fetch_available(&self) -> Result<Vec<PropertyRecord>, RepoError> {
        let sql = format!(
            "{SELECT_PROPERTIES} WHERE p.status = $1 ORDER BY p.created_at DESC, p.id DESC"
        );
        fetch_list(
            self.pool(),
            sqlx::query_as(&sql).bind(PropertyStatus::Available),
        )
        .await
    }
}

#[async_trait]
impl PropertiesWriteRepo for PostgresRepositories {
    async fn create_property(
        &self,
        params: CreatePropertyParams,
        listener: &dyn CommitListener,
    ) -> Result<PropertyRecord, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO properties (
                reference_number, title, description, price, location, property_type,
                bedrooms, bathrooms, square_feet, status,
                has_garage, has_pool, has_garden, is_furnished
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING id
            "#,
        )
        .bind(generate_reference_number())
        .bind(&params.title)
        .bind(&params.description)
        .bind(params.price)
        .bind(&params.location)
        .bind(params.property_type)
        .bind(params.bedrooms)
        .bind(params.bathrooms)
        .bind(params.square_feet)
        .bind(params.status)
        .bind(params.has_garage)
        .bind(params.has_pool)
        .bind(params.has_garden)
        .bind(params.is_furnished)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let record = fetch_one_by_id(&mut *tx, id).await?.ok_or(RepoError::NotFound)?;

        let mut hooks = CommitHooks::new();
        hooks.defer(PendingMutation::for_record(&record, MutationAction::Created));
        hooks
            .commit_then(async { tx.commit().await.map_err(map_sqlx_error) }, listener)
            .await?;
        Ok(record)
    }

    async fn update_property(
        &self,
        params: UpdatePropertyParams,
        listener: &dyn CommitListener,
    ) -> Result<PropertyRecord, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE properties SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                price = COALESCE($4, price),
                location = COALESCE($5, location),
                property_type = COALESCE($6, property_type),
                bedrooms = COALESCE($7, bedrooms),
                bathrooms = COALESCE($8, bathrooms),
                square_feet = CASE WHEN $9 THEN $10 ELSE square_feet END,
                status = COALESCE($11, status),
                has_garage = COALESCE($12, has_garage),
                has_pool = COALESCE($13, has_pool),
                has_garden = COALESCE($14, has_garden),
                is_furnished = COALESCE($15, is_furnished),
                updated_at = now()
            WHERE id = $1
            RETURNING id
            "#,
        )
        .bind(params.id)
        .bind(params.title)
        .bind(params.description)
        .bind(params.price)
        .bind(params.location)
        .bind(params.property_type)
        .bind(params.bedrooms)
        .bind(params.bathrooms)
        .bind(params.square_feet.is_some())
        .bind(params.square_feet.flatten())
        .bind(params.status)
        .bind(params.has_garage)
        .bind(params.has_pool)
        .bind(params.has_garden)
        .bind(params.is_furnished)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let id = updated.ok_or(RepoError::NotFound)?;
        let record = fetch_one_by_id(&mut *tx, id).await?.ok_or(RepoError::NotFound)?;

        let mut hooks = CommitHooks::new();
        hooks.defer(PendingMutation::for_record(&record, MutationAction::Updated));
        hooks
            .commit_then(async { tx.commit().await.map_err(map_sqlx_error) }, listener)
            .await?;
        Ok(record)
    }

    async fn delete_property(
        &self,
        id: PropertyId,
        listener: &dyn CommitListener,
    ) -> Result<PropertyRecord, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let record = fetch_one_by_id(&mut *tx, id).await?.ok_or(RepoError::NotFound)?;
        sqlx::query("DELETE FROM properties WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let mut hooks = CommitHooks::new();
        hooks.defer(PendingMutation::for_record(&record, MutationAction::Deleted));
        hooks
            .commit_then(async { tx.commit().await.map_err(map_sqlx_error) }, listener)
            .await?;
        Ok(record)
    }

    async fn replace_amenities(
        &self,
        id: PropertyId,
        amenities: Vec<String>,
        listener: &dyn CommitListener,
    ) -> Result<PropertyRecord, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let touched: Option<i64> = sqlx::query_scalar(
            "UPDATE properties SET updated_at = now() WHERE id = $1 RETURNING id",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        if touched.is_none() {
            return Err(RepoError::NotFound);
        }

        sqlx::query("DELETE FROM property_amenities WHERE property_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        if !amenities.is_empty() {
            sqlx::query(
                "INSERT INTO property_amenities (property_id, name) \
                 SELECT $1, name FROM UNNEST($2::text[]) AS name",
            )
            .bind(id)
            .bind(&amenities)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        let record = fetch_one_by_id(&mut *tx, id).await?.ok_or(RepoError::NotFound)?;

        let mut hooks = CommitHooks::new();
        hooks.defer(PendingMutation::for_record(
            &record,
            MutationAction::RelationChanged,
        ));
        hooks
            .commit_then(async { tx.commit().await.map_err(map_sqlx_error) }, listener)
            .await?;
        Ok(record)
    }
}
