use std::cell::RefCell;
use std::collections::BTreeSet;

use super::config::CleanupMode;
use super::identifier::Identifier;

/// Prepended to the prefix when cleanup is on, marking names as internal
pub const HIDDEN_MARKER: &str = "__";

/// NameSource hands out names for the intermediate workspaces of a single run.
///
/// Names are `<prefix>_<suffix>_`. With cleanup on, the prefix is decorated with
/// [`HIDDEN_MARKER`] so intermediates never look like (or collide with) names a user picked.
/// Isolation between runs sharing a registry comes from distinct prefixes, not locking.
#[derive(Debug, Clone)]
pub struct NameSource {
    prefix: String,
    issued: RefCell<BTreeSet<Identifier>>,
}

impl NameSource {
    pub fn new(prefix: &str, cleanup_mode: CleanupMode) -> Self {
        let prefix = match cleanup_mode {
            CleanupMode::On => format!("{HIDDEN_MARKER}{prefix}"),
            CleanupMode::Off => prefix.to_string(),
        };
        Self {
            prefix,
            issued: RefCell::new(BTreeSet::new()),
        }
    }

    /// Returns a workspace name with the given suffix applied.
    ///
    /// The same suffix always gives the same name.
    pub fn with_suffix(&self, suffix: &str) -> Identifier {
        let name = Identifier::new(format!("{}_{}_", self.prefix, suffix));
        self.issued.borrow_mut().insert(name.clone());
        name
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Every name handed out so far, in sorted order
    pub fn issued(&self) -> Vec<Identifier> {
        self.issued.borrow().iter().cloned().collect()
    }
}
