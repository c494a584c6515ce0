//! Action-handler export detection.
//!
//! Plugins built against different SDK generations expose their handlers in
//! different shapes. Each shape has an extraction strategy; strategies are
//! tried in a fixed priority order and the first match wins:
//!
//! 1. canonical: one export per action, named `action:<name>`
//! 2. legacy dispatcher: a single `handle_action` export that reads the
//!    action name from its input document
//! 3. legacy bare: one export per action, named after the action itself
//!
//! A handler export has the signature `(ptr: i32, len: i32) -> i64`.

use std::collections::BTreeMap;

/// Prefix of canonical handler exports.
pub const CANONICAL_PREFIX: &str = "action:";

/// Export name of the legacy single dispatcher.
pub const DISPATCHER_EXPORT: &str = "handle_action";

/// Exports that are part of the guest ABI, never actions.
const RESERVED_EXPORTS: &[&str] = &[
    "memory",
    "alloc",
    "dealloc",
    "_start",
    "_initialize",
    DISPATCHER_EXPORT,
];

/// A function export, reduced to what detection needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFunc {
    pub name: String,
    /// Whether the signature is `(i32, i32) -> i64`.
    pub handler_signature: bool,
}

impl ExportedFunc {
    pub fn new(name: impl Into<String>, handler_signature: bool) -> Self {
        Self {
            name: name.into(),
            handler_signature,
        }
    }
}

/// Which export shape a module uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportShape {
    Canonical,
    LegacyDispatcher,
    LegacyBare,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Handlers {
    /// action name -> export name
    Named(BTreeMap<String, String>),
    Dispatcher(String),
}

/// Maps action names to the export that handles them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionTable {
    shape: ExportShape,
    handlers: Handlers,
}

impl ActionTable {
    pub fn shape(&self) -> ExportShape {
        self.shape
    }

    /// Export to call for `action`. A dispatcher handles every action name.
    pub fn resolve(&self, action: &str) -> Option<&str> {
        match &self.handlers {
            Handlers::Named(map) => map.get(action).map(String::as_str),
            Handlers::Dispatcher(export) => Some(export),
        }
    }

    /// Declared action names; empty for a dispatcher.
    pub fn actions(&self) -> Vec<&str> {
        match &self.handlers {
            Handlers::Named(map) => map.keys().map(String::as_str).collect(),
            Handlers::Dispatcher(_) => Vec::new(),
        }
    }

    fn named(shape: ExportShape, map: BTreeMap<String, String>) -> Option<Self> {
        (!map.is_empty()).then_some(Self {
            shape,
            handlers: Handlers::Named(map),
        })
    }
}

/// An extraction strategy for one export shape.
pub type ExportStrategy = fn(&[ExportedFunc]) -> Option<ActionTable>;

/// All strategies, highest priority first.
pub const STRATEGIES: &[ExportStrategy] = &[canonical, legacy_dispatcher, legacy_bare];

fn handlers(exports: &[ExportedFunc]) -> impl Iterator<Item = &ExportedFunc> {
    exports.iter().filter(|e| e.handler_signature)
}

/// `action:<name>` exports.
pub fn canonical(exports: &[ExportedFunc]) -> Option<ActionTable> {
    let map = handlers(exports)
        .filter_map(|e| {
            let action = e.name.strip_prefix(CANONICAL_PREFIX)?;
            (!action.is_empty()).then(|| (action.to_string(), e.name.clone()))
        })
        .collect();
    ActionTable::named(ExportShape::Canonical, map)
}

/// A single `handle_action` dispatcher.
pub fn legacy_dispatcher(exports: &[ExportedFunc]) -> Option<ActionTable> {
    handlers(exports)
        .find(|e| e.name == DISPATCHER_EXPORT)
        .map(|e| ActionTable {
            shape: ExportShape::LegacyDispatcher,
            handlers: Handlers::Dispatcher(e.name.clone()),
        })
}

/// Bare handler exports named after their action.
pub fn legacy_bare(exports: &[ExportedFunc]) -> Option<ActionTable> {
    let map = handlers(exports)
        .filter(|e| {
            !RESERVED_EXPORTS.contains(&e.name.as_str()) && !e.name.starts_with(CANONICAL_PREFIX)
        })
        .map(|e| (e.name.clone(), e.name.clone()))
        .collect();
    ActionTable::named(ExportShape::LegacyBare, map)
}

/// Runs [`STRATEGIES`] in order and returns the first table found.
pub fn detect_action_table(exports: &[ExportedFunc]) -> Option<ActionTable> {
    STRATEGIES.iter().find_map(|strategy| strategy(exports))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler(name: &str) -> ExportedFunc {
        ExportedFunc::new(name, true)
    }

    #[test]
    fn canonical_wins_over_legacy_shapes() {
        let exports = [
            handler("action:charge"),
            handler("handle_action"),
            handler("refund"),
        ];
        let table = detect_action_table(&exports).unwrap();
        assert_eq!(table.shape(), ExportShape::Canonical);
        assert_eq!(table.resolve("charge"), Some("action:charge"));
        assert_eq!(table.resolve("refund"), None);
    }

    #[test]
    fn dispatcher_handles_any_action() {
        let exports = [handler("handle_action"), handler("refund")];
        let table = detect_action_table(&exports).unwrap();
        assert_eq!(table.shape(), ExportShape::LegacyDispatcher);
        assert_eq!(table.resolve("anything"), Some("handle_action"));
        assert!(table.actions().is_empty());
    }

    #[test]
    fn bare_exports_skip_reserved_and_wrong_signatures() {
        let exports = [
            ExportedFunc::new("alloc", false),
            ExportedFunc::new("helper", false),
            handler("charge"),
            handler("_start"),
        ];
        let table = detect_action_table(&exports).unwrap();
        assert_eq!(table.shape(), ExportShape::LegacyBare);
        assert_eq!(table.actions(), vec!["charge"]);
    }

    #[test]
    fn empty_canonical_name_is_ignored() {
        let exports = [handler("action:")];
        assert_eq!(canonical(&exports), None);
    }

    #[test]
    fn nothing_detected_without_handlers() {
        let exports = [ExportedFunc::new("alloc", false)];
        assert_eq!(detect_action_table(&exports), None);
    }
}
