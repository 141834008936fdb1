//! Postgres-backed [`Repository`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::{Repository, StoreResult};
use crate::models::{
    BranchRecord, DealTypeRecord, ExternalId, LandlordRecord, ListingRecord, LocalId,
    NewPriceRecord, Owner, OwnerProfile, PhotoRecord, PriceStatus, PropertyTypeRecord,
    StaffRecord, SyncStatusUpdate, TagRecord,
};

/// Column list for owner queries.
const OWNER_COLUMNS: &str = "id, auth_id, email, api_key_hash, display_name, phone, \
    logo_url, operator_email, last_synced_at, sync_status, sync_message, sync_listing_count";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a connection pool from a database URL.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the bundled migrations.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn find_owner_where(&self, predicate: &str, value: &str) -> StoreResult<Option<Owner>> {
        let query = format!("SELECT {OWNER_COLUMNS} FROM owner WHERE {predicate} ORDER BY id LIMIT 1");
        let owner = sqlx::query_as::<_, Owner>(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(owner)
    }

    async fn upsert_reference(
        &self,
        table: &str,
        external_id: ExternalId,
        name: &str,
    ) -> StoreResult<LocalId> {
        let query = format!(
            "INSERT INTO {table} (external_id, name) VALUES ($1, $2)
             ON CONFLICT (external_id) DO UPDATE SET name = EXCLUDED.name
             RETURNING id"
        );
        let id = sqlx::query_scalar::<_, LocalId>(&query)
            .bind(external_id)
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }
}

#[async_trait]
impl Repository for PgStore {
    async fn find_owner_by_auth_id(&self, auth_id: &str) -> StoreResult<Option<Owner>> {
        self.find_owner_where("auth_id = $1", auth_id).await
    }

    async fn find_owner_by_email(&self, email: &str) -> StoreResult<Option<Owner>> {
        self.find_owner_where("lower(email) = lower($1)", email).await
    }

    async fn find_owner_by_api_key_hash(&self, key_hash: &str) -> StoreResult<Option<Owner>> {
        self.find_owner_where("api_key_hash = $1", key_hash).await
    }

    async fn update_owner_profile(
        &self,
        owner_id: LocalId,
        profile: &OwnerProfile,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE owner
             SET display_name = $2, phone = $3, logo_url = $4, operator_email = $5
             WHERE id = $1",
        )
        .bind(owner_id)
        .bind(&profile.display_name)
        .bind(&profile.phone)
        .bind(&profile.logo_url)
        .bind(&profile.operator_email)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_owner_sync(
        &self,
        owner_id: LocalId,
        key_hash: &str,
        synced_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE owner SET api_key_hash = NULL WHERE api_key_hash = $1 AND id <> $2")
            .bind(key_hash)
            .bind(owner_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE owner SET api_key_hash = $2, last_synced_at = $3 WHERE id = $1")
            .bind(owner_id)
            .bind(key_hash)
            .bind(synced_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn write_sync_status(
        &self,
        key_hash: &str,
        update: &SyncStatusUpdate,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE owner
             SET sync_status = $2,
                 sync_message = $3,
                 sync_listing_count = COALESCE($4, sync_listing_count),
                 sync_updated_at = now()
             WHERE api_key_hash = $1",
        )
        .bind(key_hash)
        .bind(update.status.as_str())
        .bind(&update.message)
        .bind(update.listing_count)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn find_location(&self, external_id: ExternalId) -> StoreResult<Option<LocalId>> {
        let id = sqlx::query_scalar::<_, LocalId>(
            "SELECT id FROM location_reference WHERE external_id = $1",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    async fn upsert_property_type(&self, record: &PropertyTypeRecord) -> StoreResult<LocalId> {
        let id = sqlx::query_scalar::<_, LocalId>(
            "INSERT INTO property_type (external_id, name, code) VALUES ($1, $2, $3)
             ON CONFLICT (external_id) DO UPDATE SET name = EXCLUDED.name, code = EXCLUDED.code
             RETURNING id",
        )
        .bind(record.external_id)
        .bind(&record.name)
        .bind(&record.code)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn upsert_deal_type(&self, record: &DealTypeRecord) -> StoreResult<LocalId> {
        self.upsert_reference("deal_type", record.external_id, &record.name)
            .await
    }

    async fn upsert_tag(&self, record: &TagRecord) -> StoreResult<LocalId> {
        let id = sqlx::query_scalar::<_, LocalId>(
            "INSERT INTO tag (external_id, name, kind) VALUES ($1, $2, $3)
             ON CONFLICT (external_id) DO UPDATE SET name = EXCLUDED.name, kind = EXCLUDED.kind
             RETURNING id",
        )
        .bind(record.external_id)
        .bind(&record.name)
        .bind(record.kind)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn upsert_branch(&self, record: &BranchRecord) -> StoreResult<LocalId> {
        let id = sqlx::query_scalar::<_, LocalId>(
            "INSERT INTO branch
                (owner_id, external_id, name, display_name, email, phone, alternative_phone,
                 address, contact_time, logo_url, latitude, longitude, is_default,
                 remote_created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
             ON CONFLICT (external_id, owner_id) DO UPDATE SET
                name = EXCLUDED.name,
                display_name = EXCLUDED.display_name,
                email = EXCLUDED.email,
                phone = EXCLUDED.phone,
                alternative_phone = EXCLUDED.alternative_phone,
                address = EXCLUDED.address,
                contact_time = EXCLUDED.contact_time,
                logo_url = EXCLUDED.logo_url,
                latitude = EXCLUDED.latitude,
                longitude = EXCLUDED.longitude,
                is_default = EXCLUDED.is_default,
                remote_created_at = EXCLUDED.remote_created_at,
                updated_at = now()
             RETURNING id",
        )
        .bind(record.owner_id)
        .bind(record.external_id)
        .bind(&record.name)
        .bind(&record.display_name)
        .bind(&record.email)
        .bind(&record.phone)
        .bind(&record.alternative_phone)
        .bind(&record.address)
        .bind(&record.contact_time)
        .bind(&record.logo_url)
        .bind(record.latitude)
        .bind(record.longitude)
        .bind(record.is_default)
        .bind(record.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn upsert_staff(&self, record: &StaffRecord) -> StoreResult<LocalId> {
        let id = sqlx::query_scalar::<_, LocalId>(
            "INSERT INTO staff
                (owner_id, external_id, name, email, phone, cellphone, picture_url, position)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (external_id, owner_id) DO UPDATE SET
                name = EXCLUDED.name,
                email = EXCLUDED.email,
                phone = EXCLUDED.phone,
                cellphone = EXCLUDED.cellphone,
                picture_url = EXCLUDED.picture_url,
                position = EXCLUDED.position,
                updated_at = now()
             RETURNING id",
        )
        .bind(record.owner_id)
        .bind(record.external_id)
        .bind(&record.name)
        .bind(&record.email)
        .bind(&record.phone)
        .bind(&record.cellphone)
        .bind(&record.picture_url)
        .bind(&record.position)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn upsert_landlord(&self, record: &LandlordRecord) -> StoreResult<LocalId> {
        let id = sqlx::query_scalar::<_, LocalId>(
            "INSERT INTO landlord
                (owner_id, external_id, name, email, phone, cellphone, document_number, notes)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (external_id, owner_id) DO UPDATE SET
                name = EXCLUDED.name,
                email = EXCLUDED.email,
                phone = EXCLUDED.phone,
                cellphone = EXCLUDED.cellphone,
                document_number = EXCLUDED.document_number,
                notes = EXCLUDED.notes,
                updated_at = now()
             RETURNING id",
        )
        .bind(record.owner_id)
        .bind(record.external_id)
        .bind(&record.name)
        .bind(&record.email)
        .bind(&record.phone)
        .bind(&record.cellphone)
        .bind(&record.document_number)
        .bind(&record.notes)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn upsert_listing(&self, record: &ListingRecord) -> StoreResult<LocalId> {
        let a = &record.amenities;
        let id = sqlx::query_scalar::<_, LocalId>(
            "INSERT INTO listing
                (owner_id, external_id, source_flag, branch_id, staff_id, location_id,
                 parent_division_location_id, type_id, reference_code, title, address,
                 real_address, fake_address, description, rich_description, public_url,
                 latitude, longitude, rooms, bathrooms, suites, toilets, parking_lots, floors,
                 age, surface, roofed_surface, semiroofed_surface, unroofed_surface,
                 total_surface, surface_measurement, orientation, disposition,
                 property_condition, situation, remote_status, expenses, has_pool, has_garden,
                 has_grill, has_laundry, has_elevator, has_gym, has_security, has_balcony,
                 has_terrace, is_furnished, pets_allowed, deal_types, extra_attributes,
                 custom_tags, videos)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                     $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30,
                     $31, $32, $33, $34, $35, $36, $37, $38, $39, $40, $41, $42, $43, $44,
                     $45, $46, $47, $48, $49, $50, $51, $52)
             ON CONFLICT (external_id, owner_id) DO UPDATE SET
                source_flag = EXCLUDED.source_flag,
                branch_id = EXCLUDED.branch_id,
                staff_id = EXCLUDED.staff_id,
                location_id = EXCLUDED.location_id,
                parent_division_location_id = EXCLUDED.parent_division_location_id,
                type_id = EXCLUDED.type_id,
                reference_code = EXCLUDED.reference_code,
                title = EXCLUDED.title,
                address = EXCLUDED.address,
                real_address = EXCLUDED.real_address,
                fake_address = EXCLUDED.fake_address,
                description = EXCLUDED.description,
                rich_description = EXCLUDED.rich_description,
                public_url = EXCLUDED.public_url,
                latitude = EXCLUDED.latitude,
                longitude = EXCLUDED.longitude,
                rooms = EXCLUDED.rooms,
                bathrooms = EXCLUDED.bathrooms,
                suites = EXCLUDED.suites,
                toilets = EXCLUDED.toilets,
                parking_lots = EXCLUDED.parking_lots,
                floors = EXCLUDED.floors,
                age = EXCLUDED.age,
                surface = EXCLUDED.surface,
                roofed_surface = EXCLUDED.roofed_surface,
                semiroofed_surface = EXCLUDED.semiroofed_surface,
                unroofed_surface = EXCLUDED.unroofed_surface,
                total_surface = EXCLUDED.total_surface,
                surface_measurement = EXCLUDED.surface_measurement,
                orientation = EXCLUDED.orientation,
                disposition = EXCLUDED.disposition,
                property_condition = EXCLUDED.property_condition,
                situation = EXCLUDED.situation,
                remote_status = EXCLUDED.remote_status,
                expenses = EXCLUDED.expenses,
                has_pool = EXCLUDED.has_pool,
                has_garden = EXCLUDED.has_garden,
                has_grill = EXCLUDED.has_grill,
                has_laundry = EXCLUDED.has_laundry,
                has_elevator = EXCLUDED.has_elevator,
                has_gym = EXCLUDED.has_gym,
                has_security = EXCLUDED.has_security,
                has_balcony = EXCLUDED.has_balcony,
                has_terrace = EXCLUDED.has_terrace,
                is_furnished = EXCLUDED.is_furnished,
                pets_allowed = EXCLUDED.pets_allowed,
                deal_types = EXCLUDED.deal_types,
                extra_attributes = EXCLUDED.extra_attributes,
                custom_tags = EXCLUDED.custom_tags,
                videos = EXCLUDED.videos,
                updated_at = now()
             RETURNING id",
        )
        .bind(record.owner_id)
        .bind(record.external_id)
        .bind(record.source_flag)
        .bind(record.branch_id)
        .bind(record.staff_id)
        .bind(record.location_id)
        .bind(record.parent_division_location_id)
        .bind(record.type_id)
        .bind(&record.reference_code)
        .bind(&record.title)
        .bind(&record.address)
        .bind(&record.real_address)
        .bind(&record.fake_address)
        .bind(&record.description)
        .bind(&record.rich_description)
        .bind(&record.public_url)
        .bind(record.latitude)
        .bind(record.longitude)
        .bind(record.rooms)
        .bind(record.bathrooms)
        .bind(record.suites)
        .bind(record.toilets)
        .bind(record.parking_lots)
        .bind(record.floors)
        .bind(record.age)
        .bind(record.surface)
        .bind(record.roofed_surface)
        .bind(record.semiroofed_surface)
        .bind(record.unroofed_surface)
        .bind(record.total_surface)
        .bind(&record.surface_measurement)
        .bind(&record.orientation)
        .bind(&record.disposition)
        .bind(&record.property_condition)
        .bind(&record.situation)
        .bind(record.remote_status)
        .bind(record.expenses)
        .bind(a.pool)
        .bind(a.garden)
        .bind(a.grill)
        .bind(a.laundry)
        .bind(a.elevator)
        .bind(a.gym)
        .bind(a.security)
        .bind(a.balcony)
        .bind(a.terrace)
        .bind(a.furnished)
        .bind(a.pets_allowed)
        .bind(&record.deal_types)
        .bind(&record.extra_attributes)
        .bind(&record.custom_tags)
        .bind(&record.videos)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn replace_available_prices(
        &self,
        listing_id: LocalId,
        prices: &[NewPriceRecord],
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM price_record WHERE listing_id = $1 AND status = $2")
            .bind(listing_id)
            .bind(PriceStatus::Available.as_str())
            .execute(&mut *tx)
            .await?;

        if !prices.is_empty() {
            let mut insert: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO price_record
                    (listing_id, deal_type_id, status, currency, price, period,
                     secondary_currency, secondary_price, expenses, cleaning_tax, insurance,
                     down_payment) ",
            );
            insert.push_values(prices, |mut row, p| {
                row.push_bind(p.listing_id)
                    .push_bind(p.deal_type_id)
                    .push_bind(p.status.as_str())
                    .push_bind(p.currency.clone())
                    .push_bind(p.price)
                    .push_bind(p.period)
                    .push_bind(p.secondary_currency.clone())
                    .push_bind(p.secondary_price)
                    .push_bind(p.expenses)
                    .push_bind(p.cleaning_tax)
                    .push_bind(p.insurance)
                    .push_bind(p.down_payment);
            });
            insert.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn upsert_tag_links(&self, listing_id: LocalId, tag_ids: &[LocalId]) -> StoreResult<()> {
        if tag_ids.is_empty() {
            return Ok(());
        }
        let mut insert: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO tag_link (listing_id, tag_id) ");
        insert.push_values(tag_ids, |mut row, tag_id| {
            row.push_bind(listing_id).push_bind(*tag_id);
        });
        insert.push(" ON CONFLICT (listing_id, tag_id) DO NOTHING");
        insert.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn replace_photos(&self, listing_id: LocalId, photos: &[PhotoRecord]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM photo WHERE listing_id = $1")
            .bind(listing_id)
            .execute(&mut *tx)
            .await?;

        if !photos.is_empty() {
            let mut insert: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO photo
                    (listing_id, image_url, thumb_url, original_url, description, position,
                     is_blueprint, is_front_cover) ",
            );
            insert.push_values(photos, |mut row, p| {
                row.push_bind(p.listing_id)
                    .push_bind(p.image_url.clone())
                    .push_bind(p.thumb_url.clone())
                    .push_bind(p.original_url.clone())
                    .push_bind(p.description.clone())
                    .push_bind(p.position)
                    .push_bind(p.is_blueprint)
                    .push_bind(p.is_front_cover);
            });
            insert.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn link_landlord(&self, listing_id: LocalId, landlord_id: LocalId) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO landlord_link (listing_id, landlord_id) VALUES ($1, $2)
             ON CONFLICT (listing_id, landlord_id) DO NOTHING",
        )
        .bind(listing_id)
        .bind(landlord_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
