//! User-reported sale prices and their admin review.
//!
//! A contribution starts unverified. An admin either verifies it, which is
//! final, or rejects it, which deletes the record.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::SoldHistoryRecord;
use crate::store::PropertyStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Admin,
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
}

impl Actor {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            user_id: id.into(),
            role: Role::User,
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            user_id: id.into(),
            role: Role::Admin,
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ContributionError {
    #[error("only administrators can review sale records")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(String),
    #[error("sold price must be a positive amount")]
    InvalidPrice,
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ContributionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ContributionError::NotFound(what),
            other => ContributionError::Store(other),
        }
    }
}

pub struct ContributionService {
    store: Arc<dyn PropertyStore>,
}

impl ContributionService {
    pub fn new(store: Arc<dyn PropertyStore>) -> Self {
        Self { store }
    }

    /// Record a reported sale as unverified.
    pub async fn submit(
        &self,
        actor: &Actor,
        property_id: &str,
        sold_price: f64,
        sold_date: NaiveDate,
        notes: Option<String>,
    ) -> Result<SoldHistoryRecord, ContributionError> {
        if !sold_price.is_finite() || sold_price <= 0.0 {
            return Err(ContributionError::InvalidPrice);
        }
        if self.store.get_property(property_id).await?.is_none() {
            return Err(ContributionError::NotFound(format!("property {property_id}")));
        }

        let record = SoldHistoryRecord {
            id: Uuid::new_v4().to_string(),
            property_id: property_id.to_string(),
            sold_price,
            sold_date,
            reporter: Some(actor.user_id.clone()),
            is_verified: false,
            notes,
            created_at: Utc::now(),
        };
        self.store.insert_sold_record(record.clone()).await?;

        info!("{} reported a sale for {}", actor.user_id, property_id);
        Ok(record)
    }

    pub async fn verify(&self, actor: &Actor, record_id: &str) -> Result<(), ContributionError> {
        require_admin(actor)?;
        self.store.mark_sold_record_verified(record_id).await?;
        info!("{} verified sale record {}", actor.user_id, record_id);
        Ok(())
    }

    pub async fn reject(&self, actor: &Actor, record_id: &str) -> Result<(), ContributionError> {
        require_admin(actor)?;
        self.store.delete_sold_record(record_id).await?;
        info!("{} rejected sale record {}", actor.user_id, record_id);
        Ok(())
    }

    /// Unverified records awaiting review, oldest first.
    pub async fn pending(&self, actor: &Actor) -> Result<Vec<SoldHistoryRecord>, ContributionError> {
        require_admin(actor)?;
        Ok(self.store.unverified_sold_records().await?)
    }
}

fn require_admin(actor: &Actor) -> Result<(), ContributionError> {
    match actor.role {
        Role::Admin => Ok(()),
        Role::User => Err(ContributionError::Forbidden),
    }
}
