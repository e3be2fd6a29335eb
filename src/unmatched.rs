use crate::patch::Catalogue;
use std::collections::BTreeSet;

/// Catalogue entries that no profile has selected yet.
#[derive(Clone, PartialEq, Debug, Default)]
pub(crate) struct UnmatchedTracker {
    names: BTreeSet<String>,
}

impl UnmatchedTracker {
    pub fn from_catalogue(catalogue: &Catalogue) -> Self {
        UnmatchedTracker {
            names: catalogue.names().map(str::to_string).collect(),
        }
    }

    pub fn mark_used(&mut self, name: &str) {
        self.names.remove(name);
    }

    pub fn remaining(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}
