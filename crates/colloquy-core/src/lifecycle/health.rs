use serde::Serialize;

/// Result of one health probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthResult {
    /// Unit (or collaborator) name
    pub name: String,
    /// "module", "service" or "api"
    pub kind: String,
    /// Whether the probe passed
    pub healthy: bool,
    /// Failure description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthResult {
    /// Passing probe
    #[must_use]
    pub fn passed(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            healthy: true,
            error: None,
        }
    }

    /// Failing probe
    #[must_use]
    pub fn failed(name: impl Into<String>, kind: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            healthy: false,
            error: Some(error.into()),
        }
    }
}

/// Aggregated result of one health-check run. Not persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// Probes that passed
    pub passed: usize,
    /// Probes that failed
    pub failed: usize,
    /// Individual results
    pub details: Vec<HealthResult>,
}

impl HealthReport {
    /// Tally a list of results.
    #[must_use]
    pub fn from_results(details: Vec<HealthResult>) -> Self {
        let passed = details.iter().filter(|r| r.healthy).count();
        Self {
            passed,
            failed: details.len() - passed,
            details,
        }
    }

    /// Whether every probe passed
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.failed == 0
    }
}
