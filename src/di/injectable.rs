use crate::di::Container;
use crate::error::Result;
use std::sync::Arc;

/// A component assembled from what the container already holds
///
/// Usually derived; see [`DeriveInjectable`](crate::DeriveInjectable) for
/// the field rules.
pub trait Injectable: Sized + Send + Sync + 'static {
    fn inject(container: &Container) -> Result<Self>;

    /// Inject and register the result as the container's singleton
    fn provide(container: &Container) -> Result<Arc<Self>> {
        let instance = Arc::new(Self::inject(container)?);
        container.set_arc(Arc::clone(&instance));
        tracing::debug!(
            component = std::any::type_name::<Self>(),
            "Provided injectable"
        );
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeriveInjectable;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Clock;

    struct Audit;

    #[derive(DeriveInjectable)]
    struct Scheduler {
        clock: Arc<Clock>,
        audit: Option<Arc<Audit>>,
        #[inject(default)]
        runs: AtomicUsize,
    }

    #[test]
    fn test_derived_fields_follow_their_rules() {
        let container = Container::new();
        container.set(Clock);

        let scheduler = Scheduler::inject(&container).unwrap();
        assert!(Arc::ptr_eq(&scheduler.clock, &container.get::<Clock>().unwrap()));
        assert!(scheduler.audit.is_none());
        assert_eq!(scheduler.runs.load(Ordering::SeqCst), 0);

        container.set(Audit);
        assert!(Scheduler::inject(&container).unwrap().audit.is_some());
    }

    #[test]
    fn test_provide_registers_the_singleton() {
        let container = Container::new();
        assert!(Scheduler::provide(&container).is_err());

        container.set(Clock);
        let provided = Scheduler::provide(&container).unwrap();
        assert!(Arc::ptr_eq(&provided, &container.get::<Scheduler>().unwrap()));
    }
}
