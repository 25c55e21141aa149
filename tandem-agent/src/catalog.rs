//! Record types the agent replicates out of the box.
//!
//! A small retail back-office: reference data (products, customers), sales
//! orders referencing them, and invoices referencing orders. Deployments
//! with their own schema register their types instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tandem_sync::{EngineResult, HandlerRegistry};
use tandem_types::{KeyStrategy, RecordId, SyncPriority, SyncRecord, Versioned};

/// Lifecycle fields shared by the soft-deletable catalog types.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lifecycle {
    #[serde(default)]
    pub is_deleted: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Lifecycle {
    /// A live record created (and last touched) at `at`.
    pub fn created(at: DateTime<Utc>) -> Self {
        Self {
            is_deleted: false,
            created_at: Some(at),
            updated_at: Some(at),
            deleted_at: None,
        }
    }

    /// Marks the record edited at `at`.
    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
    }

    /// Soft-deletes the record at `at`.
    pub fn delete(&mut self, at: DateTime<Utc>) {
        self.is_deleted = true;
        self.updated_at = Some(at);
        self.deleted_at = Some(at);
    }
}

macro_rules! versioned_by_lifecycle {
    ($ty:ty, |$this:ident| $id:expr) => {
        impl Versioned for $ty {
            fn record_id(&self) -> RecordId {
                let $this = self;
                RecordId::from($id)
            }
            fn is_deleted(&self) -> bool {
                self.lifecycle.is_deleted
            }
            fn created_at(&self) -> Option<DateTime<Utc>> {
                self.lifecycle.created_at
            }
            fn updated_at(&self) -> Option<DateTime<Utc>> {
                self.lifecycle.updated_at
            }
            fn deleted_at(&self) -> Option<DateTime<Utc>> {
                self.lifecycle.deleted_at
            }
        }
    };
}

/// A stocked item. Keys are generated by whichever store creates the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub sku: String,
    pub name: String,
    pub quantity_on_hand: i64,
    pub unit_price_cents: i64,
    #[serde(flatten)]
    pub lifecycle: Lifecycle,
}

versioned_by_lifecycle!(Product, |p| p.id);

impl SyncRecord for Product {
    const TYPE_NAME: &'static str = "Product";
    const SOFT_DELETE: bool = true;
    const KEY: KeyStrategy = KeyStrategy::Identity;
}

/// A customer, keyed by its account code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub code: String,
    pub name: String,
    pub email: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Versioned for Customer {
    fn record_id(&self) -> RecordId {
        RecordId::new(&self.code)
    }
    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

impl SyncRecord for Customer {
    const TYPE_NAME: &'static str = "Customer";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesOrder {
    pub id: i64,
    pub customer_code: String,
    pub product_id: i64,
    pub quantity: i64,
    #[serde(flatten)]
    pub lifecycle: Lifecycle,
}

versioned_by_lifecycle!(SalesOrder, |o| o.id);

impl SyncRecord for SalesOrder {
    const TYPE_NAME: &'static str = "SalesOrder";
    const SOFT_DELETE: bool = true;
    const KEY: KeyStrategy = KeyStrategy::Identity;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub order_id: i64,
    pub total_cents: i64,
    pub paid: bool,
    #[serde(flatten)]
    pub lifecycle: Lifecycle,
}

versioned_by_lifecycle!(Invoice, |i| i.id);

impl SyncRecord for Invoice {
    const TYPE_NAME: &'static str = "Invoice";
    const SOFT_DELETE: bool = true;
    const KEY: KeyStrategy = KeyStrategy::Identity;
}

/// Registers every catalog type at its foreign-key tier.
pub fn register_catalog(registry: &mut HandlerRegistry) -> EngineResult<()> {
    registry
        .register::<Product>(SyncPriority::Reference)?
        .register::<Customer>(SyncPriority::Reference)?
        .register::<SalesOrder>(SyncPriority::Transactional)?
        .register::<Invoice>(SyncPriority::Financial)?;
    Ok(())
}

/// A registry holding the catalog types.
pub fn registry() -> EngineResult<HandlerRegistry> {
    let mut registry = HandlerRegistry::new();
    register_catalog(&mut registry)?;
    Ok(registry)
}
