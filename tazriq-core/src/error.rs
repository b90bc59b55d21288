//! Error types for Tazriq engine operations.
//!
//! Errors split into two families the caller can tell apart:
//! recoverable lookup failures (see [`Error::is_lookup_failure`]) and
//! usage errors that indicate a bug at the call site.

use std::fmt;

use crate::key::TypeKey;

/// Main error type for all Tazriq operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Requested type has no matching injectable in the searched locators.
    #[error("{}", .0)]
    NoInjectable(NoInjectableError),

    /// A type was declared with `should_be_injectable` but nobody
    /// provided a real registration for it.
    #[error("`{type_name}` should be an injectable")]
    ShouldBeInjectable { type_name: &'static str },

    /// Two normal-mode registrations target the same type key.
    #[error(
        "registration conflict: a normal-mode injectable already exists for `{key}`\n  \
         Hint: register with `Mode::Override` or pick a different type key"
    )]
    RegistrationConflict { key: TypeKey },

    /// A mutation was attempted while the module graph holds primed
    /// singleton or scoped caches.
    #[error("module `{module}` is locked\n  Hint: call `unlock()` before changing the graph")]
    ModuleLocked { module: String },

    /// Self-use, duplicate use, or reprioritizing an unknown module.
    #[error("{}", .0)]
    ModuleGraph(#[from] ModuleGraphError),

    /// A scoped injectable was accessed with no active scope of its name.
    #[error("scope `{name}` isn't defined in the current context")]
    ScopeUndefined { name: String },

    /// Contradictory scope binding attempts.
    #[error("{}", .0)]
    ScopeConflict(#[from] ScopeConflictError),

    /// Synchronous access to an asynchronous-only surface.
    #[error("synchronous call isn't supported: {context}")]
    SyncAsyncMismatch { context: &'static str },

    /// A scoped injectable backed by an open resource refused to unlock.
    #[error("to unlock, close the `{scope_name}` scope")]
    UnlockRefused { scope_name: String },

    /// An instance could not be downcast to the requested type.
    #[error("instance type mismatch: expected `{expected}`")]
    TypeMismatch { expected: &'static str },

    /// A recipe asked for an argument that was neither resolved nor
    /// supplied explicitly.
    #[error("missing argument `{name}`: not resolvable and not supplied at the call site")]
    MissingArgument { name: &'static str },

    /// `set_owner` was called after dependencies were already resolved.
    #[error("function owner must be assigned before dependencies are resolved")]
    OwnerAfterResolution,

    /// `set_owner` was called twice.
    #[error("function owner is already defined")]
    OwnerAlreadyDefined,

    /// `on_setup` was called after the setup queue already ran.
    #[error("injected function is already up; setup queue is closed")]
    SetupClosed,

    /// Multiple failures surfaced while releasing scope resources.
    #[error("{}", .0)]
    Teardown(TeardownError),

    /// A user factory failed while producing an instance.
    #[error("factory failed: {source}")]
    Factory {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    /// Wraps a user error raised inside a recipe or resource.
    pub fn factory(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Factory {
            source: Box::new(source),
        }
    }

    /// True for failures that mean "nothing registered", which
    /// `get_instance`-style accessors convert into a default value.
    pub fn is_lookup_failure(&self) -> bool {
        matches!(self, Error::NoInjectable(_))
    }
}

/// Error when a requested type has no registration.
///
/// Carries "did you mean?" suggestions built from the registered keys.
#[derive(Debug)]
pub struct NoInjectableError {
    /// Rendered description of the requested type
    pub requested: String,
    /// Similar registered type names
    pub suggestions: Vec<String>,
}

impl fmt::Display for NoInjectableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no injectable for `{}`", self.requested)?;

        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean one of:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n    - {suggestion}")?;
            }
        }

        Ok(())
    }
}

/// Errors about the used-module graph.
#[derive(Debug, thiserror::Error)]
pub enum ModuleGraphError {
    #[error("module `{module}` can't be used by itself")]
    SelfUse { module: String },

    #[error("`{module}` already uses `{used}`")]
    AlreadyUsed { module: String, used: String },

    #[error("`{target}` can't be found in the modules used by `{module}`")]
    NotUsed { module: String, target: String },
}

/// Errors about contradictory scope bindings.
#[derive(Debug, thiserror::Error)]
pub enum ScopeConflictError {
    #[error("scope `{name}` is already defined in the current context")]
    AlreadyDefined { name: String },

    #[error(
        "a shared scope can't be defined when one or more contextual scopes \
         are defined on the same name (`{name}`)"
    )]
    SharedWithContextual { name: String },
}

/// Aggregate of failures raised while releasing scope resources.
///
/// Release always runs to completion; every failure is collected here.
#[derive(Debug)]
pub struct TeardownError {
    pub errors: Vec<Error>,
}

impl fmt::Display for TeardownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} resource(s) failed to release:", self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n  - {error}")?;
        }
        Ok(())
    }
}

/// Convenient Result type for Tazriq operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_injectable_display() {
        let err = Error::NoInjectable(NoInjectableError {
            requested: "Database".to_string(),
            suggestions: vec!["DatabasePool".to_string()],
        });

        let msg = format!("{err}");
        assert!(msg.contains("no injectable"));
        assert!(msg.contains("Database"));
        assert!(msg.contains("Did you mean"));
    }

    #[test]
    fn lookup_failure_classification() {
        let miss = Error::NoInjectable(NoInjectableError {
            requested: "X".to_string(),
            suggestions: vec![],
        });
        assert!(miss.is_lookup_failure());

        let misuse = Error::ShouldBeInjectable { type_name: "X" };
        assert!(!misuse.is_lookup_failure());

        let locked = Error::ModuleLocked {
            module: "app".to_string(),
        };
        assert!(!locked.is_lookup_failure());
    }

    #[test]
    fn teardown_display_lists_all() {
        let err = Error::Teardown(TeardownError {
            errors: vec![
                Error::UnlockRefused {
                    scope_name: "request".to_string(),
                },
                Error::ScopeUndefined {
                    name: "request".to_string(),
                },
            ],
        });

        let msg = format!("{err}");
        assert!(msg.contains("2 resource(s)"));
        assert!(msg.contains("request"));
    }
}
