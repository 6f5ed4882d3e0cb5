//! Delegate catalog
//!
//! Trampolines are bound to a local delegate shape looked up by name. The
//! catalog holds the local modules that can declare such shapes, the
//! references between them, and three root modules (entry, executing,
//! calling) the lookup starts from.

use std::collections::{HashMap, HashSet, VecDeque};

use dashmap::DashMap;
use tether_types::PropertyKind;

use crate::error::{BridgeError, Result};

/// Parameter and return kinds of a local callback type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegateShape {
    pub name: String,
    pub params: Vec<PropertyKind>,
    /// `None` when the delegate returns nothing
    pub returns: Option<PropertyKind>,
}

impl DelegateShape {
    /// A delegate returning nothing
    pub fn action(name: impl Into<String>, params: Vec<PropertyKind>) -> Self {
        Self {
            name: name.into(),
            params,
            returns: None,
        }
    }

    pub fn func(name: impl Into<String>, params: Vec<PropertyKind>, returns: PropertyKind) -> Self {
        Self {
            name: name.into(),
            params,
            returns: Some(returns),
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn is_void(&self) -> bool {
        self.returns.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModuleInfo {
    pub name: String,
    pub delegates: HashMap<String, DelegateShape>,
    /// Names of the modules this one references
    pub references: Vec<String>,
}

impl ModuleInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_delegate(mut self, shape: DelegateShape) -> Self {
        self.delegates.insert(shape.name.clone(), shape);
        self
    }

    pub fn with_reference(mut self, module: impl Into<String>) -> Self {
        self.references.push(module.into());
        self
    }
}

/// The three modules a lookup starts from, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogRoot {
    Entry,
    Executing,
    Calling,
}

impl CatalogRoot {
    const ORDER: [CatalogRoot; 3] = [CatalogRoot::Entry, CatalogRoot::Executing, CatalogRoot::Calling];
}

#[derive(Debug, Default)]
pub struct DelegateCatalog {
    modules: DashMap<String, ModuleInfo>,
    roots: DashMap<CatalogRoot, String>,
}

impl DelegateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a module
    pub fn register_module(&self, module: ModuleInfo) {
        log::debug!(
            "Registered module {} ({} delegates, {} references)",
            module.name,
            module.delegates.len(),
            module.references.len()
        );
        self.modules.insert(module.name.clone(), module);
    }

    pub fn set_root(&self, root: CatalogRoot, module: impl Into<String>) {
        self.roots.insert(root, module.into());
    }

    pub fn root(&self, root: CatalogRoot) -> Option<String> {
        self.roots.get(&root).map(|name| name.clone())
    }

    /// Find a delegate shape by name.
    ///
    /// The roots are searched first (entry, executing, calling), then the
    /// modules they reference, breadth first. `max_depth` bounds how many
    /// reference hops are followed; `None` walks the whole graph. The first
    /// module declaring the name wins.
    pub fn resolve(&self, name: &str, max_depth: Option<usize>) -> Result<DelegateShape> {
        let mut scanned = Vec::new();
        let mut visited = HashSet::new();
        let mut frontier = VecDeque::new();

        let roots: Vec<String> = CatalogRoot::ORDER
            .iter()
            .filter_map(|root| self.root(*root))
            .collect();

        for root in &roots {
            if !visited.insert(root.clone()) {
                continue;
            }
            scanned.push(root.clone());
            if let Some(shape) = self.lookup_in(root, name) {
                return Ok(shape);
            }
        }

        for root in &roots {
            for reference in self.references_of(root) {
                frontier.push_back((reference, 1usize));
            }
        }

        while let Some((module, depth)) = frontier.pop_front() {
            if max_depth.is_some_and(|max| depth > max) {
                continue;
            }
            if !visited.insert(module.clone()) {
                continue;
            }
            scanned.push(module.clone());
            if let Some(shape) = self.lookup_in(&module, name) {
                log::debug!("Resolved delegate {} in {} at depth {}", name, module, depth);
                return Ok(shape);
            }
            for reference in self.references_of(&module) {
                frontier.push_back((reference, depth + 1));
            }
        }

        Err(BridgeError::TypeResolution {
            name: name.to_string(),
            scanned,
        })
    }

    fn lookup_in(&self, module: &str, name: &str) -> Option<DelegateShape> {
        self.modules
            .get(module)
            .and_then(|info| info.delegates.get(name).cloned())
    }

    fn references_of(&self, module: &str) -> Vec<String> {
        match self.modules.get(module) {
            Some(info) => info.references.clone(),
            None => {
                log::trace!("Referenced module {} is not registered", module);
                Vec::new()
            }
        }
    }
}
