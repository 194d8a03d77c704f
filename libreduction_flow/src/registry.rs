use fxhash::FxHashMap;

use super::error::RegistryError;
use super::identifier::Identifier;
use super::workspace::{MatrixWorkspace, TableWorkspace, Workspace};

/// The store holding every named workspace of a process.
///
/// The registry has no concurrency control of its own. Runs sharing one registry stay apart
/// by using distinct name prefixes.
pub trait Registry {
    fn exists(&self, id: &Identifier) -> bool;

    /// Remove an entry. Deleting something that is not there is a no-op.
    fn delete(&mut self, id: &Identifier, logging: bool);

    fn retrieve(&self, id: &Identifier) -> Option<&Workspace>;

    /// Insert or overwrite an entry
    fn store(&mut self, id: Identifier, workspace: Workspace);

    /// All identifiers currently held, sorted
    fn names(&self) -> Vec<Identifier>;

    fn matrix(&self, id: &Identifier) -> Result<&MatrixWorkspace, RegistryError> {
        match self.retrieve(id) {
            Some(Workspace::Matrix(m)) => Ok(m),
            Some(_) => Err(RegistryError::WrongKind {
                id: id.clone(),
                expected: "MatrixWorkspace",
            }),
            None => Err(RegistryError::Missing(id.clone())),
        }
    }

    fn table(&self, id: &Identifier) -> Result<&TableWorkspace, RegistryError> {
        match self.retrieve(id) {
            Some(Workspace::Table(t)) => Ok(t),
            Some(_) => Err(RegistryError::WrongKind {
                id: id.clone(),
                expected: "TableWorkspace",
            }),
            None => Err(RegistryError::Missing(id.clone())),
        }
    }
}

/// A Registry that keeps everything in a hash map
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistry {
    store: FxHashMap<Identifier, Workspace>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Approximate memory held by every entry
    pub fn total_data_size(&self) -> usize {
        self.store.values().map(|ws| ws.estimated_bytes()).sum()
    }

    /// Every entry with its approximate size, ordered by name
    pub fn entry_sizes(&self) -> Vec<(Identifier, usize)> {
        self.names()
            .into_iter()
            .map(|id| {
                let size = self.store.get(&id).map(|ws| ws.estimated_bytes()).unwrap_or(0);
                (id, size)
            })
            .collect()
    }
}

impl Registry for InMemoryRegistry {
    fn exists(&self, id: &Identifier) -> bool {
        self.store.contains_key(id)
    }

    fn delete(&mut self, id: &Identifier, logging: bool) {
        if self.store.remove(id).is_some() && logging {
            spdlog::info!("Deleted workspace {id}");
        }
    }

    fn retrieve(&self, id: &Identifier) -> Option<&Workspace> {
        self.store.get(id)
    }

    fn store(&mut self, id: Identifier, workspace: Workspace) {
        self.store.insert(id, workspace);
    }

    fn names(&self) -> Vec<Identifier> {
        let mut names: Vec<Identifier> = self.store.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_delete() {
        let mut registry = InMemoryRegistry::new();
        let id = Identifier::new("ws");
        registry.store(id.clone(), MatrixWorkspace::single_valued(2.0).into());
        assert!(registry.exists(&id));
        assert_eq!(registry.matrix(&id).unwrap().value(), Some(2.0));
        registry.delete(&id, false);
        assert!(!registry.exists(&id));
        // Deleting twice is fine
        registry.delete(&id, true);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_entry_sizes() {
        let mut registry = InMemoryRegistry::new();
        let single = MatrixWorkspace::single_valued(1.0);
        let single_size = Workspace::from(single.clone()).estimated_bytes();
        registry.store(Identifier::new("b"), single.clone().into());
        registry.store(Identifier::new("a"), single.into());
        let entries = registry.entry_sizes();
        assert_eq!(
            entries,
            vec![
                (Identifier::new("a"), single_size),
                (Identifier::new("b"), single_size)
            ]
        );
        assert!(single_size > 0);
        assert_eq!(registry.total_data_size(), 2 * single_size);
    }

    #[test]
    fn test_wrong_kind() {
        let mut registry = InMemoryRegistry::new();
        let id = Identifier::new("table");
        registry.store(id.clone(), TableWorkspace::new().into());
        assert!(matches!(
            registry.matrix(&id),
            Err(RegistryError::WrongKind { .. })
        ));
        assert!(registry.table(&id).is_ok());
        assert!(matches!(
            registry.table(&Identifier::new("nope")),
            Err(RegistryError::Missing(_))
        ));
    }
}
