pub mod adjustment;
pub mod reference;
pub mod variant;

pub use adjustment::{Adjustment, AdjustmentOperation, AdjustmentReason, SourceType};
pub use reference::{ColorRef, ProductRef, ReferenceData};
pub use variant::Variant;
