// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bundled override rule documents.
//!
//! Presets are plain rule documents compiled into the binary. They are only parsed
//! when requested through [`PresetLibrary::load`], and go through the same validation
//! as user supplied rules.

use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::rules::{RuleError, Set, Sets};

const BUILTIN: &[(&str, &str)] = &[
    ("aws/v1", include_str!("../../presets/aws/v1.yaml")),
    ("infer/v1", include_str!("../../presets/infer/v1.yaml")),
];

#[derive(Debug, Clone, Default)]
pub struct PresetLibrary {
    documents: BTreeMap<String, Cow<'static, str>>,
}

impl PresetLibrary {
    /// Library holding the presets shipped with the crate.
    pub fn builtin() -> Self {
        let documents = BUILTIN
            .iter()
            .map(|(name, document)| ((*name).to_string(), Cow::Borrowed(*document)))
            .collect();
        PresetLibrary { documents }
    }

    #[must_use]
    pub fn with_document(mut self, name: impl Into<String>, document: impl Into<String>) -> Self {
        self.documents
            .insert(name.into(), Cow::Owned(document.into()));
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.documents.keys().map(String::as_str)
    }

    /// Builds one validated [`Set`] per requested preset, in the requested order.
    pub fn load<S: AsRef<str>>(&self, names: &[S]) -> Result<Sets, RuleError> {
        let mut sets = Sets::default();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            let document = self
                .documents
                .get(name)
                .ok_or_else(|| RuleError::PresetNotFound(name.to_string()))?;
            sets.push(Set::from_yaml(name, document)?);
        }
        Ok(sets)
    }
}
