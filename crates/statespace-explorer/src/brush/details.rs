use serde::{Deserialize, Serialize};
use statespace_core::{names, AttributeSchema};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategorySelection {
    pub all: bool,
    pub attributes: BTreeMap<String, bool>,
}

/// Which attribute categories and attributes a pane projects.
///
/// Categories that were never configured are projected in full.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetailSelection {
    categories: BTreeMap<String, CategorySelection>,
}

impl DetailSelection {
    /// Results are shown when every result is ready, variable values otherwise.
    /// Ready results are enabled individually either way.
    pub fn initial(schema: &AttributeSchema) -> Self {
        let results_ready = schema
            .get(names::RESULTS)
            .is_some_and(|attrs| attrs.values().all(|m| m.is_ready()));
        let focus = if results_ready {
            names::RESULTS
        } else {
            names::VARIABLES
        };

        let categories = schema
            .iter()
            .filter(|(category, _)| category.as_str() != names::METADATA)
            .map(|(category, attrs)| {
                let all = category == focus;
                let attributes = attrs
                    .iter()
                    .map(|(name, meta)| {
                        let on = all || (category == names::RESULTS && meta.is_ready());
                        (name.clone(), on)
                    })
                    .collect();
                (category.clone(), CategorySelection { all, attributes })
            })
            .collect();
        Self { categories }
    }

    pub fn is_enabled(&self, category: &str, attribute: &str) -> bool {
        match self.categories.get(category) {
            None => category != names::METADATA,
            Some(c) => c.attributes.get(attribute).copied().unwrap_or(c.all),
        }
    }

    pub fn set_category(&mut self, category: &str, all: bool) {
        let entry = self.categories.entry(category.to_string()).or_default();
        entry.all = all;
        for on in entry.attributes.values_mut() {
            *on = all;
        }
    }

    pub fn set_attribute(&mut self, category: &str, attribute: &str, on: bool) {
        self.categories
            .entry(category.to_string())
            .or_default()
            .attributes
            .insert(attribute.to_string(), on);
    }

    /// Explicitly enabled `(category, attribute)` pairs.
    pub fn enabled(&self) -> impl Iterator<Item = (&str, &str)> {
        self.categories.iter().flat_map(|(c, sel)| {
            sel.attributes
                .iter()
                .filter(|(_, on)| **on)
                .map(move |(a, _)| (c.as_str(), a.as_str()))
        })
    }
}
