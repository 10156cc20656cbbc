//! RouteTable - ordered route rules evaluated against every event

use std::collections::HashSet;

use contracts::{Event, RouteConfig};
use regex::Regex;

use crate::error::DispatcherError;

/// Anchored selector (`prod` matches exactly `prod`)
#[derive(Debug, Clone)]
struct Selector(Regex);

impl Selector {
    fn compile(route: usize, field: &str, pattern: &str) -> Result<Self, DispatcherError> {
        Regex::new(&format!("^(?:{pattern})$"))
            .map(Self)
            .map_err(|e| DispatcherError::invalid_route(route, field, e.to_string()))
    }

    fn matches(&self, value: &str) -> bool {
        self.0.is_match(value)
    }
}

#[derive(Debug, Clone)]
struct CompiledRoute {
    namespace: Option<Selector>,
    kind: Option<Selector>,
    reason: Option<Selector>,
    severity: Option<Selector>,
    component: Option<Selector>,
    labels: Vec<(String, Selector)>,
    min_count: Option<u32>,
    destinations: Vec<String>,
}

impl CompiledRoute {
    fn compile(idx: usize, route: &RouteConfig) -> Result<Self, DispatcherError> {
        let optional = |field: &str, pattern: &Option<String>| {
            pattern
                .as_deref()
                .map(|p| Selector::compile(idx, field, p))
                .transpose()
        };
        let labels = route
            .labels
            .iter()
            .map(|(key, pattern)| Ok((key.clone(), Selector::compile(idx, key, pattern)?)))
            .collect::<Result<Vec<_>, DispatcherError>>()?;

        Ok(Self {
            namespace: optional("namespace", &route.namespace)?,
            kind: optional("kind", &route.kind)?,
            reason: optional("reason", &route.reason)?,
            severity: optional("type", &route.severity)?,
            component: optional("component", &route.component)?,
            labels,
            min_count: route.min_count,
            destinations: route.destinations.clone(),
        })
    }

    /// Every configured selector must match; unset selectors are wildcards
    fn matches(&self, event: &Event) -> bool {
        let check = |selector: &Option<Selector>, value: &str| {
            selector.as_ref().is_none_or(|s| s.matches(value))
        };

        check(&self.namespace, event.namespace())
            && check(&self.kind, &event.involved_object.kind)
            && check(&self.reason, &event.reason)
            && check(&self.severity, event.severity.as_str())
            && check(&self.component, &event.source.component)
            && self.min_count.is_none_or(|min| event.count >= min)
            && self.labels.iter().all(|(key, selector)| {
                event
                    .involved_object
                    .labels
                    .get(key)
                    .is_some_and(|value| selector.matches(value))
            })
    }
}

/// Compiled, read-only route table
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<CompiledRoute>,
}

impl RouteTable {
    /// Compile routes, checking every destination against `known`
    ///
    /// # Errors
    /// - `InvalidRoute` when a selector fails to compile
    /// - `UnknownRouteDestination` when a route names an unconfigured receiver
    pub fn compile<'a>(
        routes: &[RouteConfig],
        known: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, DispatcherError> {
        let known: HashSet<&str> = known.into_iter().collect();
        let mut compiled = Vec::with_capacity(routes.len());

        for (idx, route) in routes.iter().enumerate() {
            if let Some(name) = route
                .destinations
                .iter()
                .find(|name| !known.contains(name.as_str()))
            {
                return Err(DispatcherError::UnknownRouteDestination {
                    route: idx,
                    name: name.clone(),
                });
            }
            compiled.push(CompiledRoute::compile(idx, route)?);
        }

        Ok(Self { routes: compiled })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Destination set for `event`
    ///
    /// Union over all matching routes, deduplicated, in first-seen order
    /// (route order, then destination order within a route).
    pub fn destinations_for(&self, event: &Event) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for route in self.routes.iter().filter(|r| r.matches(event)) {
            for name in &route.destinations {
                if seen.insert(name.as_str()) {
                    out.push(name.as_str());
                }
            }
        }
        out
    }
}
