/// Configuration system
///
/// All sections are declared in `schemas.rs` with the `config_struct!` macro.
///
/// ```ignore
/// use swap_orchestrator::config::{load_config, with_config};
///
/// load_config()?;
/// let attempts = with_config(|cfg| cfg.engine.max_swap_attempts);
/// ```
pub mod macros;
pub mod schemas;
pub mod utils;

pub use schemas::*;
pub use utils::*;
