//! Development server and release export for the questionnaire front end.

pub mod export;
pub mod server;

pub use export::{DEFAULT_EXPORT_FILES, ExportError, ExportReport, export_static};
pub use server::{DEFAULT_PORT, ServeError, content_type_for, router, safe_join, serve};
