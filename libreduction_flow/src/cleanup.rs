use fxhash::FxHashSet;
use std::collections::BTreeSet;

use super::config::{CleanupMode, SubalgorithmLogging};
use super::identifier::{Identifier, Resolve};
use super::registry::Registry;

/// IntermediateCleanup decides which intermediate workspaces get deleted, and when.
///
/// Three kinds of names are tracked:
/// - protected names are never deleted, whatever else is asked (caller owned inputs, outputs)
/// - deferred names are deleted at [`IntermediateCleanup::final_cleanup`]
/// - anything else passed to [`IntermediateCleanup::cleanup`] is deleted right away
///
/// With cleanup off nothing is ever deleted. Handles that resolve to nothing, and names the
/// registry does not hold (already deleted through an alias, say), are silently skipped.
#[derive(Debug, Clone)]
pub struct IntermediateCleanup {
    do_delete: bool,
    deletion_logging: bool,
    protected: FxHashSet<Identifier>,
    to_be_deleted: BTreeSet<Identifier>,
}

impl IntermediateCleanup {
    pub fn new(cleanup_mode: CleanupMode, deletion_logging: SubalgorithmLogging) -> Self {
        Self {
            do_delete: cleanup_mode == CleanupMode::On,
            deletion_logging: deletion_logging == SubalgorithmLogging::On,
            protected: FxHashSet::default(),
            to_be_deleted: BTreeSet::new(),
        }
    }

    /// Delete the given workspaces now
    pub fn cleanup<I>(&self, registry: &mut dyn Registry, handles: I)
    where
        I: IntoIterator,
        I::Item: Resolve,
    {
        for handle in handles {
            if let Some(id) = handle.resolve() {
                self.delete(registry, &id);
            }
        }
    }

    /// Mark the given workspaces to be deleted at final cleanup
    pub fn cleanup_later<I>(&mut self, handles: I)
    where
        I: IntoIterator,
        I::Item: Resolve,
    {
        self.to_be_deleted
            .extend(handles.into_iter().filter_map(|h| h.resolve()));
    }

    /// Mark the given workspaces to be never deleted
    pub fn protect<I>(&mut self, handles: I)
    where
        I: IntoIterator,
        I::Item: Resolve,
    {
        self.protected
            .extend(handles.into_iter().filter_map(|h| h.resolve()));
    }

    /// Delete everything marked for later. The deferred set is emptied.
    pub fn final_cleanup(&mut self, registry: &mut dyn Registry) {
        let deferred = std::mem::take(&mut self.to_be_deleted);
        for id in deferred.iter() {
            self.delete(registry, id);
        }
    }

    fn delete(&self, registry: &mut dyn Registry, id: &Identifier) {
        if !self.do_delete {
            return;
        }
        if self.protected.contains(id) || !registry.exists(id) {
            return;
        }
        if self.deletion_logging {
            spdlog::debug!("Cleaning up intermediate workspace {id}");
        } else {
            spdlog::trace!("Cleaning up intermediate workspace {id}");
        }
        registry.delete(id, self.deletion_logging);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryRegistry;
    use crate::workspace::MatrixWorkspace;

    fn registry_with(names: &[&str]) -> InMemoryRegistry {
        let mut registry = InMemoryRegistry::new();
        for name in names {
            registry.store(
                Identifier::new(*name),
                MatrixWorkspace::single_valued(1.0).into(),
            );
        }
        registry
    }

    #[test]
    fn test_cleanup_deletes() {
        let mut registry = registry_with(&["a"]);
        let tracker = IntermediateCleanup::new(CleanupMode::On, SubalgorithmLogging::Off);
        tracker.cleanup(&mut registry, ["a"]);
        assert!(!registry.exists(&Identifier::new("a")));
    }

    #[test]
    fn test_protection_wins() {
        for mode in [CleanupMode::On, CleanupMode::Off] {
            let mut registry = registry_with(&["x"]);
            let mut tracker = IntermediateCleanup::new(mode, SubalgorithmLogging::Off);
            tracker.protect(["x"]);
            tracker.cleanup(&mut registry, ["x"]);
            tracker.cleanup_later(["x"]);
            tracker.final_cleanup(&mut registry);
            assert!(registry.exists(&Identifier::new("x")));
        }
    }

    #[test]
    fn test_cleanup_off_deletes_nothing() {
        let mut registry = registry_with(&["x", "y"]);
        let mut tracker = IntermediateCleanup::new(CleanupMode::Off, SubalgorithmLogging::On);
        tracker.cleanup(&mut registry, ["x"]);
        tracker.cleanup_later(["y"]);
        tracker.final_cleanup(&mut registry);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_missing_and_empty_handles_are_no_ops() {
        let mut registry = registry_with(&["kept"]);
        let tracker = IntermediateCleanup::new(CleanupMode::On, SubalgorithmLogging::On);
        tracker.cleanup(&mut registry, ["never_existed"]);
        tracker.cleanup(&mut registry, [""]);
        tracker.cleanup(&mut registry, [None::<Identifier>]);
        // Double delete
        tracker.cleanup(&mut registry, ["kept", "kept"]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cleanup_later_waits_for_final_cleanup() {
        let mut registry = registry_with(&["a", "b"]);
        let mut tracker = IntermediateCleanup::new(CleanupMode::On, SubalgorithmLogging::Off);
        tracker.cleanup_later([Identifier::new("a"), Identifier::new("b")]);
        assert_eq!(registry.len(), 2);
        tracker.final_cleanup(&mut registry);
        assert!(registry.is_empty());
        // Spent, but still usable
        tracker.final_cleanup(&mut registry);
    }
}
