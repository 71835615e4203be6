//! NUnit XML test report parsing and merging.
//!
//! Backs the `generateTestReport` build command: each report file is parsed
//! into [`TestResults`] and merged into the job's running totals, which feed
//! the console summary line.

use std::path::Path;

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::DeError),
}

/// Root `<test-results>` element of an NUnit report.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestResults {
    #[serde(rename = "@name", default)]
    pub name: String,
    #[serde(rename = "@total", default)]
    pub total: u32,
    #[serde(rename = "@errors", default)]
    pub errors: u32,
    #[serde(rename = "@failures", default)]
    pub failures: u32,
    #[serde(rename = "@not-run", default)]
    pub not_run: u32,
    #[serde(rename = "@ignored", default)]
    pub ignored: u32,
    #[serde(rename = "@skipped", default)]
    pub skipped: u32,
    #[serde(rename = "@invalid", default)]
    pub invalid: u32,

    #[serde(rename = "test-suite")]
    pub test_suite: Option<TestSuite>,

    #[serde(skip)]
    pub time: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestSuite {
    #[serde(rename = "@name", default)]
    pub name: String,
    #[serde(rename = "@executed", default)]
    pub executed: bool,
    #[serde(rename = "@success", default)]
    pub success: bool,
    #[serde(rename = "@time", default)]
    pub time: f64,

    #[serde(rename = "results")]
    pub results: Option<SuiteResults>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SuiteResults {
    #[serde(rename = "test-suite", default)]
    pub suites: Vec<TestSuite>,
    #[serde(rename = "test-case", default)]
    pub cases: Vec<TestCase>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestCase {
    #[serde(rename = "@name", default)]
    pub name: String,
    #[serde(rename = "@success", default)]
    pub success: String,
    #[serde(rename = "@executed", default)]
    pub executed: bool,
    #[serde(rename = "@time", default)]
    pub time: f64,
}

impl TestSuite {
    /// Test cases of this suite, recursing into nested suites when the suite
    /// holds no cases directly.
    pub fn test_cases(&self) -> Vec<&TestCase> {
        let Some(results) = &self.results else {
            return Vec::new();
        };
        if !results.cases.is_empty() {
            return results.cases.iter().collect();
        }
        results
            .suites
            .iter()
            .flat_map(|suite| suite.test_cases())
            .collect()
    }
}

impl TestResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate another report's counters into this one.
    pub fn merge(&mut self, other: &TestResults) {
        self.total += other.total;
        self.errors += other.errors;
        self.failures += other.failures;
        self.not_run += other.not_run;
        self.ignored += other.ignored;
        self.skipped += other.skipped;
        self.invalid += other.invalid;
        self.time += other.time;
    }

    /// Console summary line for the accumulated totals.
    pub fn summary(&self) -> String {
        format!(
            "Tests run: {}, Failures: {}, Errors: {}, Not run: {}, Time: {} seconds",
            self.total, self.failures, self.errors, self.not_run, self.time
        )
    }
}

/// Parse one NUnit report file.
pub fn read(path: &Path) -> Result<TestResults, ReportError> {
    let data = std::fs::read_to_string(path)?;
    parse(&data)
}

fn parse(xml: &str) -> Result<TestResults, ReportError> {
    let mut results: TestResults = quick_xml::de::from_str(xml)?;
    if let Some(suite) = &results.test_suite {
        results.time = suite.time;
    }
    Ok(results)
}
