#![allow(missing_docs)]

pub mod accessor;
pub mod clock;
pub mod controller;
pub mod derived;
pub mod exclusive;
pub mod expr;
pub mod navigation;
pub mod payload;
pub mod persist;
pub mod preview;
pub mod spec;
pub mod state;
pub mod submit;
pub mod validate;
pub mod visibility;

/// The physiotherapy intake questionnaire shipped with the engine.
pub const PHYSIO_FORM: &str = include_str!("../forms/physio_form.json");

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{EngineOptions, FormController, Mode, Status, StatusState};
pub use derived::{AgeTrigger, BirthdateError, FallRisk, age_on, bmi, classify_fall_risk};
pub use expr::{Clause, Condition};
pub use navigation::{NavOutcome, Navigator, Progress, StepState, progress};
pub use payload::{build_payload, to_year_month};
pub use persist::{MemoryStore, PersistedSnapshot, SaveScheduler, SnapshotStore, StoreError};
pub use preview::{Preview, PreviewItem, PreviewSection, build_preview, render_html, render_text};
pub use spec::{
    ChoiceSpec, ColumnRule, ColumnSpec, DerivedSpec, FieldKind, FieldSpec, FormSpec, GroupSpec,
    PayloadSpec, SchemaError, SectionSpec,
};
pub use state::{FieldValue, FormState};
pub use submit::{
    ResponseBody, SubmitError, Submission, Transport, TransportError, TransportResponse,
    interpret_response,
};
pub use validate::{CustomValidity, FieldIssue, ValidationResult, validate_form, validate_section};
pub use visibility::{VisibilityMap, apply_visibility, resolve_visibility};
