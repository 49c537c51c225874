//! # suitekit
//!
//! A lifecycle-driven test harness for dependency-injected server
//! applications.
//!
//! One suite boots exactly one application. Hooks run around it in
//! priority order: forward phases ascending, teardown phases descending.
//! The setup callback configures the suite through [`SetupHooks`] before
//! boot; test bodies use [`ReturnHooks`] afterwards. Teardown is
//! idempotent, tolerates failing steps, and also runs out of band when
//! the process hits a fatal error.
//!
//! ## Features
//!
//! - **Hooks**: async [`Hook`] trait and closure-based [`FnHook`]
//! - **Boot config pipeline**: each hook extends a [`BootConfig`] accumulator
//! - **Mocks and spies**: replace or observe methods of live container
//!   singletons, with guaranteed restoration
//! - **Emergency cleanup**: panic and signal listeners reach every live suite
//!   through an explicit [`SuiteRegistry`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use suitekit::prelude::*;
//!
//! #[derive(Instrumentable)]
//! #[instrumentable(kind = "repository")]
//! pub struct UserRepository {
//!     #[methods]
//!     methods: MethodTable<Self>,
//! }
//!
//! #[tokio::test]
//! async fn finds_users() -> suitekit::Result<()> {
//!     let registry = SuiteRegistry::new();
//!     let suite = Suite::new(TestFramework::builder(Api).build()?, &registry);
//!     suite.before_all(|setup| setup.config(json!({ "port": 0 }))).await?;
//!
//!     suite
//!         .test(|hooks| async move {
//!             let mock = hooks.mock(
//!                 Mock::<UserRepository>::new().returning::<String, u32>("count", 0),
//!             )?;
//!             // ... exercise the API ...
//!             assert_eq!(mock.call_count("count"), 1);
//!             Ok(())
//!         })
//!         .await?;
//!
//!     suite.after_all().await;
//!     Ok(())
//! }
//! ```

extern crate self as suitekit;

pub mod app;
pub mod config;
pub mod di;
pub mod error;
pub mod framework;
pub mod hook;
pub mod instrument;
pub mod library;
pub mod logging;
pub mod runner;

// Re-export core types
pub use app::{AppView, Application, BootContext, ListenerHandle, Readiness};
pub use config::{BootConfig, HarnessSettings, LingeringPolicy};
pub use di::{
    Capability, ComponentKind, Container, ContainerBuilder, HasContainer, Inject, Injectable,
    Instrumentable,
};
pub use error::{Result, SuiteError};
pub use framework::{EmergencySummary, FatalError, SuiteRegistry, SuiteState, TestFramework};
pub use hook::{FnHook, Hook, HookManager, HookState, Phase};
pub use instrument::{Mock, MockHandle, MethodError, MethodResult, MethodTable, SpyHandle};
pub use library::{DefaultHooksLibrary, HooksLibrary, ReturnHooks, SetupHooks};
pub use runner::Suite;

// Re-export macros
pub use suitekit_macro::{Injectable as DeriveInjectable, Instrumentable as DeriveInstrumentable};

// Re-export commonly used types from dependencies
pub use async_trait::async_trait;
pub use axum;

/// Prelude module for convenient imports
///
/// ```
/// use suitekit::prelude::*;
/// ```
pub mod prelude {
    pub use crate::app::{
        AppView, Application, BootContext, ListenerHandle, PERSISTENCE_READY, WIRING_COMPLETE,
    };
    pub use crate::config::{BootConfig, HarnessSettings, LingeringPolicy};
    pub use crate::di::{Container, ContainerBuilder, HasContainer, Inject, Injectable, Instrumentable};
    pub use crate::error::{Result, SuiteError};
    pub use crate::framework::{SuiteRegistry, TestFramework};
    pub use crate::hook::{FnHook, Hook, HookState};
    pub use crate::instrument::{Callable, Mock, MethodError, MethodResult, MethodTable};
    pub use crate::library::{HooksLibrary, ReturnHooks, SetupHooks};
    pub use crate::runner::Suite;
    pub use crate::{DeriveInjectable as Injectable, DeriveInstrumentable as Instrumentable};
    pub use async_trait::async_trait;
    pub use serde_json::json;
    pub use std::sync::Arc;
}
