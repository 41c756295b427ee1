//! Module graph and cyclic-import detection.
//!
//! The driver registers each loaded module and its imports here before
//! semantic analysis; a grey/black depth-first search rejects cycles
//! (fatal — analysis of a cyclic program would recurse forever) and
//! yields a dependency-first analysis order.

use tocin_util::diagnostic::codes;
use tocin_util::{CompileResult, ErrorReported, FxHashMap, Handler, Span, Symbol};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Grey,
    Black,
}

/// Import graph over module names (dotted paths interned as one
/// symbol).
#[derive(Default)]
pub struct ModuleGraph {
    nodes: Vec<Symbol>,
    edges: FxHashMap<Symbol, Vec<(Symbol, Span)>>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_module(&mut self, name: Symbol) {
        if !self.nodes.contains(&name) {
            self.nodes.push(name);
            self.edges.entry(name).or_default();
        }
    }

    pub fn add_import(&mut self, from: Symbol, to: Symbol, span: Span) {
        self.add_module(from);
        self.add_module(to);
        self.edges.entry(from).or_default().push((to, span));
    }

    /// Check for cycles and return modules in dependency-first order
    /// (imports before importers). A cycle is fatal.
    pub fn toposort(&self, handler: &Handler) -> CompileResult<Vec<Symbol>> {
        let mut marks: FxHashMap<Symbol, Mark> =
            self.nodes.iter().map(|&n| (n, Mark::White)).collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        for &node in &self.nodes {
            if marks[&node] == Mark::White {
                self.visit(node, &mut marks, &mut order, handler)?;
            }
        }
        Ok(order)
    }

    fn visit(
        &self,
        node: Symbol,
        marks: &mut FxHashMap<Symbol, Mark>,
        order: &mut Vec<Symbol>,
        handler: &Handler,
    ) -> CompileResult<()> {
        marks.insert(node, Mark::Grey);
        if let Some(edges) = self.edges.get(&node) {
            for &(dep, span) in edges {
                match marks.get(&dep).copied().unwrap_or(Mark::White) {
                    Mark::Grey => {
                        handler.fatal(
                            codes::T035_CYCLIC_IMPORT,
                            format!("cyclic import: module `{node}` imports `{dep}` which is already being loaded"),
                            span,
                        );
                        return Err(ErrorReported);
                    }
                    Mark::White => self.visit(dep, marks, order, handler)?,
                    Mark::Black => {}
                }
            }
        }
        marks.insert(node, Mark::Black);
        order.push(node);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(s: &str) -> Symbol {
        Symbol::intern(s)
    }

    #[test]
    fn test_linear_chain_orders_dependencies_first() {
        let mut graph = ModuleGraph::new();
        graph.add_import(sym("app"), sym("util"), Span::DUMMY);
        graph.add_import(sym("util"), sym("base"), Span::DUMMY);
        let handler = Handler::new();
        let order = graph.toposort(&handler).unwrap();
        let pos = |name: &str| order.iter().position(|&n| n == sym(name)).unwrap();
        assert!(pos("base") < pos("util"));
        assert!(pos("util") < pos("app"));
    }

    #[test]
    fn test_cycle_is_fatal() {
        let mut graph = ModuleGraph::new();
        graph.add_import(sym("a"), sym("b"), Span::DUMMY);
        graph.add_import(sym("b"), sym("a"), Span::DUMMY);
        let handler = Handler::new();
        assert!(graph.toposort(&handler).is_err());
        assert!(handler.has_fatal());
    }

    #[test]
    fn test_diamond_is_fine() {
        let mut graph = ModuleGraph::new();
        graph.add_import(sym("top"), sym("left"), Span::DUMMY);
        graph.add_import(sym("top"), sym("right"), Span::DUMMY);
        graph.add_import(sym("left"), sym("base"), Span::DUMMY);
        graph.add_import(sym("right"), sym("base"), Span::DUMMY);
        let handler = Handler::new();
        let order = graph.toposort(&handler).unwrap();
        assert_eq!(order.len(), 4);
        assert!(!handler.has_errors());
    }
}
