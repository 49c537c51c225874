//! Instrumentation
//!
//! Mocks replace methods of live container singletons and spies observe
//! them. Both work through the [`MethodTable`] an [`Instrumentable`]
//! component dispatches through, and both hand back a handle whose
//! restoration puts the original implementation back.
//!
//! [`Instrumentable`]: crate::di::Instrumentable

mod hooks;
mod method;
mod mock;
mod record;
mod restore;
mod spy;

pub use hooks::{MockHook, SpyHook};
pub use method::{
    AsyncMethod, Callable, Flavor, MethodError, MethodResult, MethodTable, OriginalMethod, SyncMethod,
};
pub use mock::{mock, Mock, MockHandle};
pub use record::{CallLog, Outcome};
pub use restore::{Restoration, RestoreQueue};
pub use spy::{spy, spy_on, SpyHandle};
