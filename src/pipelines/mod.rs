//! Workflow pipelines orchestrating stateless services.

pub mod extend;
pub mod validate;

pub use extend::ExtendWorkflow;
pub use validate::ValidateWorkflow;
