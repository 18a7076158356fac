pub mod derived;
pub mod field;
pub mod form;
pub mod payload;

pub use derived::{AgeBinding, BmiBinding, DerivedSpec, FallRiskBinding};
pub use field::{ChoiceSpec, FieldKind, FieldSpec};
pub use form::{FormSpec, GroupSpec, SchemaError, SectionSpec};
pub use payload::{ColumnRule, ColumnSpec, PayloadSpec};
