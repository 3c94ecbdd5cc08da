use uuid::Uuid;

use crate::entities::{Adjustment, Variant};
use crate::errors::ServiceError;

pub mod variant_repository;

pub use variant_repository::{
    ChangeSet, CommitOutcome, InMemoryVariantStore, UpdatedVariant, VariantPatch, VariantUpdate,
};

/// Closure computing the audit record for a quantity change from the
/// freshly read variant. Runs while the variant is write-locked.
pub type QuantityChange<'a> = dyn FnMut(&Variant) -> Result<Adjustment, ServiceError> + 'a;

/// Persistence boundary for variants and their adjustment ledger.
///
/// Implementations must serialize writes per variant, keep the SKU and
/// (product, color, size) indexes consistent, and apply a [`ChangeSet`]
/// all-or-nothing.
pub trait VariantStore: Send + Sync {
    fn get(&self, id: Uuid) -> Option<Variant>;

    fn find_by_sku(&self, sku: &str) -> Option<Variant>;

    fn list(&self) -> Vec<Variant>;

    fn list_by_product(&self, product_id: Uuid) -> Vec<Variant>;

    /// Applies inserts, patches and deletes atomically.
    fn commit(&self, changes: ChangeSet) -> Result<CommitOutcome, ServiceError>;

    /// Applies one quantity change and appends its adjustment to the ledger
    /// under the same lock. `expected_version` enables optimistic checks.
    fn apply_quantity_change(
        &self,
        variant_id: Uuid,
        expected_version: Option<i32>,
        change: &mut QuantityChange<'_>,
    ) -> Result<(Variant, Adjustment), ServiceError>;

    /// Entire ledger in append order.
    fn adjustments(&self) -> Result<Vec<Adjustment>, ServiceError>;

    /// Ledger entries of one variant in append order.
    fn adjustments_for(&self, variant_id: Uuid) -> Result<Vec<Adjustment>, ServiceError>;
}
