use std::collections::HashSet;

use crate::host::ModuleHost;

/// Every module transitively reachable from a page, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeepImports {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl DeepImports {
    /// Returns false if `id` was already visited.
    fn visit(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        self.seen.insert(id.to_string());
        self.order.push(id.to_string());
        true
    }

    /// Visit each id in order, returning the ones seen for the first time.
    fn visit_all(&mut self, ids: &[String]) -> Vec<String> {
        ids.iter().filter(|id| self.visit(id)).cloned().collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Stylesheet modules, in discovery order.
    pub fn css(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| is_stylesheet(id))
            .cloned()
            .collect()
    }
}

pub fn is_stylesheet(id: &str) -> bool {
    id.ends_with(".css")
}

/// Collect the transitive dependencies of `roots`.
///
/// Every dependency list is marked as visited in declared order before any
/// of its entries is expanded, then each entry is expanded depth-first. A
/// stylesheet imported directly therefore precedes one reached through a
/// sibling. Every node is expanded at most once, which terminates cycles.
/// Modules the host has not analysed are leaves.
pub async fn collect_deep_imports(host: &dyn ModuleHost, roots: &[String]) -> DeepImports {
    let mut imports = DeepImports::default();
    let mut branches = vec![imports.visit_all(roots).into_iter()];

    while let Some(branch) = branches.last_mut() {
        let Some(id) = branch.next() else {
            branches.pop();
            continue;
        };

        let Some(deps) = host.module_dependencies(&id).await else {
            tracing::trace!(module = %id, "module not analysed, treating as leaf");
            continue;
        };

        let fresh = imports.visit_all(&deps);
        if !fresh.is_empty() {
            branches.push(fresh.into_iter());
        }
    }

    imports
}
