//! Command implementations.

mod export;
mod info;
mod run;
mod validate;

pub use export::run_export;
pub use info::run_info;
pub use run::run_pipeline;
pub use validate::run_validate;
