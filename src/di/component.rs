use crate::instrument::MethodTable;
use serde::Serialize;

/// Role a component plays in the application under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ComponentKind {
    Service,
    Repository,
    Controller,
    Component,
}

/// Instrumentation a caller asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Capability {
    Mock,
    Spy,
}

impl ComponentKind {
    /// Controllers may be spied but never mocked.
    pub fn permits(self, capability: Capability) -> bool {
        match capability {
            Capability::Spy => true,
            Capability::Mock => !matches!(self, ComponentKind::Controller),
        }
    }
}

/// Marker trait for components that opt into mock/spy instrumentation
///
/// Implemented with `#[derive(Instrumentable)]`. The method table is the
/// dispatch point every instrumentable method goes through, which is what
/// lets a replacement installed on the live singleton reach every holder.
pub trait Instrumentable: Send + Sync + Sized + 'static {
    const KIND: ComponentKind;

    fn methods(&self) -> &MethodTable<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controllers_can_only_be_spied() {
        assert!(ComponentKind::Controller.permits(Capability::Spy));
        assert!(!ComponentKind::Controller.permits(Capability::Mock));
        assert!(ComponentKind::Service.permits(Capability::Mock));
        assert!(ComponentKind::Repository.permits(Capability::Mock));
    }
}
