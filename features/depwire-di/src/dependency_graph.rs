use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::{
    container::AppState,
    extract::{Extractor, Source},
    overrides::Overrides,
    requirement::Requirement,
    types::{DependableKey, TypeInfo},
};

/// Graph of everything a path operation requires
/// Used to check circular dependencies before serving and lists every request value the operation reads
pub struct DependencyGraph {
    operation: &'static str,
    roots: Vec<DependableKey>,
    map: HashMap<DependableKey, DependencyGraphEntry>,
    extractors: Vec<Extractor>,
    errors: Vec<DependencyGraphError>,
}

impl DependencyGraph {
    /// Walks `requirements` with `overrides` applied
    pub fn new(
        operation: &'static str,
        requirements: &[Requirement],
        overrides: &Overrides,
        state: &AppState,
    ) -> Self {
        let mut graph = Self {
            operation,
            roots: Vec::new(),
            map: HashMap::new(),
            extractors: Vec::new(),
            errors: Vec::new(),
        };

        graph.roots = graph.add_all(operation, requirements, overrides, state);
        graph
    }

    fn add_all(
        &mut self,
        required_by: &'static str,
        requirements: &[Requirement],
        overrides: &Overrides,
        state: &AppState,
    ) -> Vec<DependableKey> {
        let mut dependencies = Vec::new();
        for requirement in requirements {
            match requirement {
                Requirement::Extract(extractor) => self.add_extractor(extractor),
                Requirement::Depends { dependable, .. } => {
                    let dependable = overrides.effective(dependable);
                    dependencies.push(dependable.key());

                    if self.map.contains_key(&dependable.key()) {
                        continue;
                    }
                    // Inserted before recursing so cycles terminate
                    self.map.insert(
                        dependable.key(),
                        DependencyGraphEntry {
                            name: dependable.name(),
                            dependencies: Vec::new(),
                        },
                    );
                    let nested =
                        self.add_all(dependable.name(), dependable.requirements(), overrides, state);
                    if let Some(entry) = self.map.get_mut(&dependable.key()) {
                        entry.dependencies = nested;
                    }
                }
                Requirement::State { info, .. } => {
                    if !state.contains(*info) {
                        self.errors.push(DependencyGraphError::MissingState {
                            dependency: *info,
                            required_by,
                        });
                    }
                }
                Requirement::Request { .. } | Requirement::BackgroundTasks { .. } => {}
            }
        }
        dependencies
    }

    fn add_extractor(&mut self, extractor: &Extractor) {
        let existing = self.extractors.iter().find(|e| {
            e.source() == extractor.source() && e.lookup_name() == extractor.lookup_name()
        });

        match existing {
            None => self.extractors.push(extractor.clone()),
            Some(existing) if existing.target() == extractor.target() => {}
            Some(existing) => self.errors.push(DependencyGraphError::ConflictingExtractor {
                location: extractor.source(),
                name: extractor.lookup_name().to_string(),
                first: existing.target(),
                second: extractor.target(),
            }),
        }
    }

    /// Every distinct request value the operation reads, in resolution order
    pub fn extractors(&self) -> &[Extractor] {
        &self.extractors
    }

    /// Names of all dependables reachable from the operation
    pub fn dependables(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.map.values().map(|entry| entry.name).collect();
        names.sort_unstable();
        names
    }

    /// Validate the graph
    ///
    /// Returns a list of all issues
    pub fn check(&self) -> Result<(), DependencyGraphErrors> {
        let mut checked = HashSet::new();
        let mut errors = self.errors.clone();
        for root in &self.roots {
            let mut dependency_chain = Vec::new();
            check_recurse(self, &mut checked, &mut errors, &mut dependency_chain, *root);
        }

        if !errors.is_empty() {
            return Err(DependencyGraphErrors {
                operation: self.operation,
                errors,
            });
        }

        return Ok(());

        fn check_recurse(
            graph: &DependencyGraph,
            checked: &mut HashSet<DependableKey>,
            errors: &mut Vec<DependencyGraphError>,
            dependency_chain: &mut Vec<DependableKey>,
            key: DependableKey,
        ) {
            let Some(entry) = graph.map.get(&key) else {
                return;
            };
            let name_of = |key: &DependableKey| graph.map.get(key).map_or("?", |e| e.name);

            // Circular Dependency Check
            if dependency_chain.contains(&key) {
                let mut chain: Vec<_> = dependency_chain.iter().map(name_of).collect();
                chain.push(entry.name); // Add current so chain is complete

                errors.push(DependencyGraphError::CircularDependency {
                    from: chain[0],
                    to: entry.name,
                    chain,
                });
                return;
            }

            // Skip other checks if already checked
            if !checked.insert(key) {
                return;
            };

            dependency_chain.push(key);
            for dependency in &entry.dependencies {
                check_recurse(graph, checked, errors, dependency_chain, *dependency);
            }
            dependency_chain.pop();
        }
    }
}

struct DependencyGraphEntry {
    name: &'static str,
    dependencies: Vec<DependableKey>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DependencyGraphError {
    #[error("'{required_by}' needs '{dependency}' but it is not registered")]
    MissingState {
        dependency: TypeInfo,
        required_by: &'static str,
    },
    #[error("{location} value '{name}' is declared as both '{first}' and '{second}'")]
    ConflictingExtractor {
        location: Source,
        name: String,
        first: TypeInfo,
        second: TypeInfo,
    },
    #[error("A Circular Dependency exists between '{from}' and '{to}' through {chain:?}")]
    CircularDependency {
        from: &'static str,
        to: &'static str,
        chain: Vec<&'static str>,
    },
}
impl std::fmt::Display for DependencyGraphErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut display = Vec::new();
        display.push(format!(
            "The dependency graph of '{}' had one or more errors:",
            self.operation
        ));
        for error in &self.errors {
            display.push(format!("- {}", error));
        }
        f.write_str(&display.join("\n"))
    }
}

#[derive(Error, Debug, Clone)]
pub struct DependencyGraphErrors {
    pub operation: &'static str,
    pub errors: Vec<DependencyGraphError>,
}

#[cfg(test)]
mod tests {
    use std::{any::TypeId, convert::Infallible};

    use super::*;
    use crate::{dependable::Dependable, types::Instance};

    fn leaf(name: &'static str) -> Dependable {
        Dependable::plain(name, |_| async { Ok::<_, Infallible>(()) })
            .requires(Extractor::query::<String>("q").optional())
            .build()
    }

    #[test]
    fn lists_shared_extractors_once() {
        let query = leaf("query_extractor");
        let other = Dependable::plain("other", |_| async { Ok::<_, Infallible>(()) })
            .requires(Requirement::depends("query", &query))
            .requires(Extractor::cookie::<String>("last_query").optional())
            .build();

        let graph = DependencyGraph::new(
            "read_query",
            &[
                Requirement::depends("other", &other),
                Requirement::depends("query", &query),
                Extractor::query::<String>("q").into(),
            ],
            &Overrides::default(),
            &AppState::default(),
        );

        assert!(graph.check().is_ok());
        let names: Vec<_> = graph.extractors().iter().map(|e| e.lookup_name()).collect();
        assert_eq!(names, vec!["q", "last_query"]);
        assert_eq!(graph.dependables(), vec!["other", "query_extractor"]);
    }

    #[test]
    fn reports_cycles_through_overrides() {
        let a = leaf("a");
        let b = Dependable::plain("b", |_| async { Ok::<_, Infallible>(()) })
            .requires(Requirement::depends("a", &a))
            .build();

        let mut overrides = Overrides::default();
        overrides.insert(&a, b.clone());
        let graph = DependencyGraph::new(
            "op",
            &[Requirement::depends("b", &b)],
            &overrides,
            &AppState::default(),
        );

        let errors = graph.check().unwrap_err();
        assert_eq!(
            errors.errors,
            vec![DependencyGraphError::CircularDependency {
                from: "b",
                to: "b",
                chain: vec!["b", "b"],
            }]
        );
        assert!(errors.to_string().starts_with("The dependency graph of 'op'"));
    }

    #[test]
    fn reports_conflicts_and_missing_state() {
        let mut instances = std::collections::HashMap::new();
        instances.insert(TypeId::of::<String>(), Instance::new("db".to_string()));
        let state = AppState::new(instances);

        let graph = DependencyGraph::new(
            "op",
            &[
                Extractor::query::<String>("limit").into(),
                Extractor::query::<u32>("limit").into(),
                Requirement::state::<String>("db"),
                Requirement::state::<u64>("counter"),
            ],
            &Overrides::default(),
            &state,
        );

        let errors = graph.check().unwrap_err().errors;
        assert_eq!(errors.len(), 2);
        assert!(matches!(
            errors[0],
            DependencyGraphError::ConflictingExtractor { location: Source::Query, .. }
        ));
        assert_eq!(
            errors[1],
            DependencyGraphError::MissingState {
                dependency: TypeInfo::of::<u64>(),
                required_by: "op",
            }
        );
    }
}
