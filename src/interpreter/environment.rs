use std::fmt::Debug;

use rustc_hash::FxHashMap;

use super::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

impl ScopeId {
    pub const GLOBAL: ScopeId = ScopeId(0);
}

#[derive(Debug, Clone)]
pub struct Scope {
    name: String,
    variables: FxHashMap<String, Value>,
    parent: Option<ScopeId>,
}

impl Scope {
    fn new(name: &str, parent: Option<ScopeId>) -> Self {
        Self {
            name: name.to_string(),
            variables: FxHashMap::default(),
            parent,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<ScopeId> {
        self.parent
    }

    /// Variables of this scope alone, sorted by name.
    pub fn variables(&self) -> Vec<(&str, &Value)> {
        let mut variables: Vec<_> = self
            .variables
            .iter()
            .map(|(name, value)| (name.as_str(), value))
            .collect();
        variables.sort_by(|a, b| a.0.cmp(b.0));
        variables
    }
}

/// An activation record: which function runs, in which scope, at which line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFrame {
    pub function: String,
    pub scope: ScopeId,
    pub line: usize,
}

/// Scope arena. Scopes are created and released in call order, so the arena is a stack.
#[derive(Clone)]
pub struct Environment {
    scopes: Vec<Scope>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::new("global", None)],
        }
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    pub fn push(&mut self, name: &str, parent: ScopeId) -> ScopeId {
        self.scopes.push(Scope::new(name, Some(parent)));
        ScopeId(self.scopes.len() - 1)
    }

    /// Releases `id` and every scope created after it. The global scope is never released.
    pub fn pop(&mut self, id: ScopeId) {
        self.scopes.truncate(id.0.max(1));
    }

    pub fn define(&mut self, scope: ScopeId, name: &str, value: Value) {
        self.scopes[scope.0].variables.insert(name.to_string(), value);
    }

    pub fn get(&self, scope: ScopeId, name: &str) -> Option<&Value> {
        self.chain(scope)
            .find_map(|scope| scope.variables.get(name))
    }

    /// Stores `value` in `scope` if `name` is visible from it.
    ///
    /// A name owned by an enclosing scope is shadowed in `scope` instead of being written
    /// through, so a callee never changes its caller's variables.
    pub fn assign(&mut self, scope: ScopeId, name: &str, value: Value) -> bool {
        if self.get(scope, name).is_none() {
            return false;
        }
        self.define(scope, name, value);
        true
    }

    /// `scope` followed by its ancestors up to the global scope.
    pub fn chain(&self, scope: ScopeId) -> impl Iterator<Item = &Scope> {
        std::iter::successors(Some(self.scope(scope)), |scope| {
            scope.parent.map(|parent| self.scope(parent))
        })
    }

    /// Every name visible from `scope`, nearest definition first, sorted by name.
    pub fn visible(&self, scope: ScopeId) -> Vec<(&str, &Value)> {
        let mut seen: FxHashMap<&str, &Value> = FxHashMap::default();
        for scope in self.chain(scope) {
            for (name, value) in &scope.variables {
                seen.entry(name.as_str()).or_insert(value);
            }
        }
        let mut visible: Vec<_> = seen.into_iter().collect();
        visible.sort_by(|a, b| a.0.cmp(b.0));
        visible
    }

    /// Every name the scope could suggest as a correction for a misspelling.
    pub fn names(&self, scope: ScopeId) -> impl Iterator<Item = &str> {
        self.chain(scope)
            .flat_map(|scope| scope.variables.keys().map(String::as_str))
    }
}

impl Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.scopes.iter().enumerate().map(|(i, scope)| {
                (
                    i,
                    &scope.name,
                    scope.parent.map(|p| p.0),
                    scope
                        .variables()
                        .into_iter()
                        .map(|(name, value)| format!("{name}={value}"))
                        .collect::<Vec<_>>(),
                )
            }))
            .finish()
    }
}
