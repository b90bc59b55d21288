//! # Tazriq — a runtime dependency injection engine for Rust
//!
//! Tazriq maps requested types to instance-producing recipes, resolves
//! transitive dependencies through declared parameter signatures, and
//! manages instance lifetime with transient, singleton and scoped
//! policies. Modules compose into a priority-ordered graph with
//! override semantics; scopes bind caches and resource teardown to
//! dynamic extents; every recipe is callable from both synchronous and
//! asynchronous code.
//!
//! ```
//! use std::sync::Arc;
//! use tazriq::prelude::*;
//!
//! #[derive(Debug)]
//! struct Config { url: String }
//!
//! #[derive(Debug)]
//! struct Database { url: String }
//!
//! let module = Module::new();
//! module.set_constant(Config { url: "postgres://localhost".into() }).unwrap();
//! module
//!     .singleton(Recipe::new(
//!         Signature::new([param::<Config>("config")]),
//!         |args| {
//!             let config = args.get::<Config>("config")?;
//!             Ok(Database { url: config.url.clone() })
//!         },
//!     ))
//!     .unwrap();
//!
//! let database: Arc<Database> = module.find_instance().unwrap();
//! assert_eq!(database.url, "postgres://localhost");
//! ```

pub use tazriq_core::*;
pub use tazriq_support::rendering;

use std::sync::Arc;

/// Returns the process-default module.
pub fn default_module() -> Arc<Module> {
    Module::get_default()
}

/// Returns the process-wide module of this name, creating it on first
/// reference.
pub fn named_module(name: &str) -> Arc<Module> {
    Module::get_or_create(name)
}

/// Helpers bound to the `"__testing__"` profile module.
///
/// Register test doubles on [`test_module`], then activate them over
/// the default module with [`load_test_profile`]; the guard restores
/// the previous module set when dropped.
pub mod testing {
    use std::sync::Arc;

    use tazriq_core::module::{Module, ProfileGuard};
    use tazriq_core::Result;

    /// Name of the testing profile module.
    pub const TEST_PROFILE_NAME: &str = "__testing__";

    /// Returns the process-wide testing module.
    pub fn test_module() -> Arc<Module> {
        Module::get_or_create(TEST_PROFILE_NAME)
    }

    /// Swaps the testing profile (plus any extra named profiles) into
    /// the default module.
    pub fn load_test_profile(extra: &[&str]) -> Result<ProfileGuard> {
        let mut names = vec![TEST_PROFILE_NAME];
        names.extend_from_slice(extra);
        Module::get_default().load_profile(&names)
    }
}
