//
// Copyright 2026 The Project Oak Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Selects scenarios from the catalogue and runs them one after another
//! against a single server.

use std::{fmt, time::Instant};

use serde::Serialize;

use crate::{
    client::{ClientConfig, TestClient},
    fixtures::{self, Sizes},
    reporter::Reporter,
    scenarios::{Capabilities, Category, Context, Scenario, SoakConfig},
};

/// Which scenarios to run. Empty lists select the whole catalogue.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    pub names: Vec<String>,
    pub categories: Vec<Category>,
}

impl Selection {
    fn is_empty(&self) -> bool {
        self.names.is_empty() && self.categories.is_empty()
    }

    fn matches(&self, scenario: &Scenario) -> bool {
        self.is_empty()
            || self.names.iter().any(|name| name == scenario.name)
            || self.categories.contains(&scenario.category)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectionError {
    UnknownScenario(String),
}

impl fmt::Display for SelectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionError::UnknownScenario(name) => write!(f, "unknown scenario: {name}"),
        }
    }
}

impl std::error::Error for SelectionError {}

/// Filters `scenarios` by `selection`, dropping those that need transport
/// features the target lacks. Catalogue order is preserved.
pub fn select(
    scenarios: &[Scenario],
    selection: &Selection,
    capabilities: Capabilities,
) -> Result<Vec<Scenario>, SelectionError> {
    if let Some(unknown) = selection
        .names
        .iter()
        .find(|name| !scenarios.iter().any(|scenario| scenario.name == name.as_str()))
    {
        return Err(SelectionError::UnknownScenario(unknown.clone()));
    }
    Ok(scenarios
        .iter()
        .filter(|scenario| selection.matches(scenario))
        .filter(|scenario| {
            let supported =
                scenario.requires.iter().all(|requirement| capabilities.supports(*requirement));
            if !supported {
                log::info!("skipping {}: requires {:?}", scenario.name, scenario.requires);
            }
            supported
        })
        .copied()
        .collect())
}

#[derive(Clone, Debug)]
pub struct HarnessConfig {
    pub selection: Selection,
    pub capabilities: Capabilities,
    pub sizes: Sizes,
    pub soak: SoakConfig,
    pub unresolvable: ClientConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            selection: Selection::default(),
            capabilities: Capabilities::default(),
            sizes: Sizes::default(),
            soak: SoakConfig::default(),
            unresolvable: ClientConfig::new(fixtures::UNRESOLVABLE_HOST, 80),
        }
    }
}

impl HarnessConfig {
    pub fn context(&self, client: TestClient) -> Context {
        Context {
            client,
            sizes: self.sizes,
            soak: self.soak.clone(),
            unresolvable: self.unresolvable.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub name: &'static str,
    pub category: Category,
    pub passed: bool,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub outcomes: Vec<Outcome>,
}

impl Summary {
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(|outcome| outcome.passed)
    }

    pub fn passed_count(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.passed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.passed_count()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        #[derive(Serialize)]
        struct Report<'a> {
            passed: usize,
            failed: usize,
            outcomes: &'a [Outcome],
        }
        serde_json::to_string_pretty(&Report {
            passed: self.passed_count(),
            failed: self.failed_count(),
            outcomes: &self.outcomes,
        })
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.outcomes {
            let verdict = if outcome.passed { "PASS" } else { "FAIL" };
            write!(f, "{verdict} {} ({} ms)", outcome.name, outcome.elapsed_ms)?;
            if let Some(message) = &outcome.message {
                write!(f, ": {message}")?;
            }
            writeln!(f)?;
        }
        write!(f, "{} passed, {} failed", self.passed_count(), self.failed_count())
    }
}

/// Runs `scenarios` in order. A fatal report ends only the scenario that
/// raised it.
pub async fn run(
    reporter: &mut dyn Reporter,
    context: &mut Context,
    scenarios: &[Scenario],
) -> Summary {
    let mut summary = Summary::default();
    for scenario in scenarios {
        log::info!("running {} ({})", scenario.name, scenario.category);
        reporter.begin(scenario.name);
        let start = Instant::now();
        let result = (scenario.run)(&mut *reporter, &mut *context).await;
        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let (passed, message) = match result {
            Err(fatal) => (false, Some(fatal.message().to_string())),
            Ok(()) if reporter.failed() => (false, Some("errors were reported".to_string())),
            Ok(()) => (true, None),
        };
        log::info!(
            "{} {} in {elapsed_ms} ms",
            scenario.name,
            if passed { "passed" } else { "failed" }
        );
        summary.outcomes.push(Outcome {
            name: scenario.name,
            category: scenario.category,
            passed,
            elapsed_ms,
            message,
        });
    }
    summary
}

/// One line per scenario: name, category and transport requirements.
pub fn list(scenarios: &[Scenario]) -> String {
    scenarios
        .iter()
        .map(|scenario| {
            if scenario.requires.is_empty() {
                format!("{}\t{}", scenario.name, scenario.category)
            } else {
                format!("{}\t{}\t{:?}", scenario.name, scenario.category, scenario.requires)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
