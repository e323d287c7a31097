//! Symbolic identifier tables.
//!
//! Each index namespace (types, functions, a function's locals) owns one
//! [`IdContext`] mapping `$name` to the index assigned where it was declared.

use super::error::{Namespace, ParseErrorKind};
use crate::module::NameAssoc;
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct IdContext {
    ids: HashMap<String, u32>,
}

impl IdContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `id` (with or without its `$` sigil) at `index`, returning the
    /// normalized name.
    ///
    /// Fails if the name is already declared in this namespace.
    pub fn set_id(&mut self, id: &str, index: u32) -> Result<String, ParseErrorKind> {
        let name = strip_sigil(id);
        if self.ids.contains_key(name) {
            return Err(ParseErrorKind::DuplicateId(name.to_string()));
        }
        self.ids.insert(name.to_string(), index);
        Ok(name.to_string())
    }

    /// The index `id` was declared at, if any.
    pub fn get(&self, id: &str) -> Option<u32> {
        self.ids.get(strip_sigil(id)).copied()
    }

    /// Like [`IdContext::get`], but an unknown name is an error in `namespace`.
    pub fn resolve(&self, id: &str, namespace: Namespace) -> Result<u32, ParseErrorKind> {
        self.get(id).ok_or_else(|| ParseErrorKind::Unresolved {
            namespace,
            reference: format!("${}", strip_sigil(id)),
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// All `(index, name)` pairs, ordered by index.
    pub fn entries(&self) -> Vec<(u32, String)> {
        let mut entries: Vec<_> = self.ids.iter().map(|(name, &idx)| (idx, name.clone())).collect();
        entries.sort();
        entries
    }

    /// [`IdContext::entries`] as name section associations.
    pub fn names(&self) -> Vec<NameAssoc> {
        self.entries()
            .into_iter()
            .map(|(index, name)| NameAssoc { index, name })
            .collect()
    }
}

/// A local identifier resolved against a [`LocalScope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalIndex {
    /// Position in the function's local index space.
    Absolute(u32),
    /// Position among the declared locals; the parameter count is added on
    /// bind.
    Declared(u32),
}

/// The parameter and local identifiers of the function being parsed.
///
/// A function whose signature is a `(type $t)` declared further down does
/// not know its parameter count until binding. Its local identifiers then
/// resolve relative to the first declared local.
#[derive(Debug, Clone, Copy)]
pub struct LocalScope<'a> {
    ids: &'a IdContext,
    params: Option<u32>,
}

impl<'a> LocalScope<'a> {
    pub fn new(ids: &'a IdContext, params: Option<u32>) -> Self {
        Self { ids, params }
    }

    pub fn resolve(&self, id: &str) -> Result<LocalIndex, ParseErrorKind> {
        let index = self.ids.resolve(id, Namespace::Local)?;
        Ok(match self.params {
            Some(_) => LocalIndex::Absolute(index),
            None => LocalIndex::Declared(index),
        })
    }
}

fn strip_sigil(id: &str) -> &str {
    id.strip_prefix('$').unwrap_or(id)
}
