//! SQL reads of the service directory and emergency contacts

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use super::Store;
use crate::directory::{ContactDirectory, ServiceDirectory};
use crate::error::Result;
use crate::types::{EmergencyContact, ServiceLocation};

#[derive(Debug, sqlx::FromRow)]
struct ServiceRow {
    id: i64,
    category: String,
    name: String,
    address: Option<String>,
    phone: Option<String>,
    municipality: Option<String>,
    open_24h: bool,
    latitude: Option<f64>,
    longitude: Option<f64>,
    active: bool,
}

impl From<ServiceRow> for ServiceLocation {
    fn from(row: ServiceRow) -> Self {
        ServiceLocation {
            id: row.id,
            category: row.category,
            name: row.name,
            address: row.address,
            phone: row.phone,
            municipality: row.municipality,
            open_24h: row.open_24h,
            latitude: row.latitude,
            longitude: row.longitude,
            active: row.active,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ContactRow {
    anonymized_identity: String,
    name: String,
    phone: String,
    sort_order: i64,
    active: bool,
}

impl From<ContactRow> for EmergencyContact {
    fn from(row: ContactRow) -> Self {
        EmergencyContact {
            anonymized_identity: row.anonymized_identity,
            name: row.name,
            phone: row.phone,
            order: row.sort_order,
            active: row.active,
        }
    }
}

/// Typed filter over `service_locations`
///
/// Every optional predicate is bound as a parameter; the SQL text only
/// varies by which predicates are present.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceQuery<'a> {
    pub category: Option<&'a str>,
    /// Skip services without both coordinates
    pub require_coordinates: bool,
}

impl<'a> ServiceQuery<'a> {
    pub fn category(mut self, category: Option<&'a str>) -> Self {
        self.category = category;
        self
    }

    pub fn require_coordinates(mut self) -> Self {
        self.require_coordinates = true;
        self
    }

    fn builder(&self) -> QueryBuilder<'a, Sqlite> {
        let mut qb = QueryBuilder::new(
            "SELECT id, category, name, address, phone, municipality, open_24h, \
             latitude, longitude, active FROM service_locations WHERE active = 1",
        );
        if let Some(category) = self.category {
            qb.push(" AND category = ").push_bind(category);
        }
        if self.require_coordinates {
            qb.push(" AND latitude IS NOT NULL AND longitude IS NOT NULL");
        }
        qb.push(" ORDER BY id ASC");
        qb
    }

    pub async fn fetch(&self, conn: &mut SqliteConnection) -> Result<Vec<ServiceLocation>> {
        let mut qb = self.builder();
        let rows: Vec<ServiceRow> = qb.build_query_as().fetch_all(&mut *conn).await?;
        Ok(rows.into_iter().map(ServiceLocation::from).collect())
    }
}

/// Active contacts of an identity in notification order
pub async fn active_contacts(
    conn: &mut SqliteConnection,
    identity_key: &str,
) -> Result<Vec<EmergencyContact>> {
    let rows: Vec<ContactRow> = sqlx::query_as(
        "SELECT anonymized_identity, name, phone, sort_order, active \
         FROM emergency_contacts \
         WHERE anonymized_identity = ? AND active = 1 \
         ORDER BY sort_order ASC, id ASC",
    )
    .bind(identity_key)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(EmergencyContact::from).collect())
}

#[async_trait]
impl ServiceDirectory for Store {
    async fn list_active_services(&self, category: Option<&str>) -> Result<Vec<ServiceLocation>> {
        let mut conn = self.pool().acquire().await?;
        ServiceQuery::default()
            .category(category)
            .require_coordinates()
            .fetch(&mut conn)
            .await
    }
}

#[async_trait]
impl ContactDirectory for Store {
    async fn list_contacts(&self, identity_key: &str) -> Result<Vec<EmergencyContact>> {
        let mut conn = self.pool().acquire().await?;
        active_contacts(&mut conn, identity_key).await
    }
}
