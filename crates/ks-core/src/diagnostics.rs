//! Accumulating diagnostics collector.
//!
//! Provides:
//! - `Severity` (Warning, Error, Fatal)
//! - `ErrorCode` with stable numeric codes
//! - `ErrorList`, which folds repeated identical reports into one entry

use std::collections::HashMap;
use std::fmt;

/// How bad a recorded condition is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Severity {
    /// Degraded but evaluation continues with a fallback value.
    Warning,
    /// No meaningful value could be produced this pass.
    Error,
    /// Resource exhaustion or a broken setup.
    Fatal,
}

impl Severity {
    fn slot(self) -> usize {
        match self {
            Severity::Warning => 0,
            Severity::Error => 1,
            Severity::Fatal => 2,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Kind of a recorded condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorCode {
    UnsupportedModel,
    UnsupportedFeature,
    InvalidInput,
    OutOfMemory,
    IntegratorFailure,
    UnknownNode,
    EmptyNode,
    CyclicDependency,
    UnresolvedName,
    DelayOperator,
    UndefinedFunction,
    NonIntegerFactorial,
    LambdaOutsideDefinition,
    SettleLimitExceeded,
}

impl ErrorCode {
    /// Stable numeric code, grouped by area.
    pub fn code(self) -> u32 {
        match self {
            ErrorCode::UnsupportedModel => 1000,
            ErrorCode::UnsupportedFeature => 1001,
            ErrorCode::InvalidInput => 1100,
            ErrorCode::OutOfMemory => 2003,
            ErrorCode::IntegratorFailure => 2004,
            ErrorCode::UnknownNode => 2010,
            ErrorCode::EmptyNode => 2011,
            ErrorCode::CyclicDependency => 2012,
            ErrorCode::UnresolvedName => 2013,
            ErrorCode::DelayOperator => 2020,
            ErrorCode::UndefinedFunction => 2021,
            ErrorCode::NonIntegerFactorial => 2022,
            ErrorCode::LambdaOutsideDefinition => 2023,
            ErrorCode::SettleLimitExceeded => 2030,
        }
    }
}

/// One distinct recorded message.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Diagnostic {
    pub code: ErrorCode,
    pub severity: Severity,
    pub message: String,
    /// How many times this exact message was reported.
    pub occurrences: usize,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {}] {}", self.severity, self.code.code(), self.message)?;
        if self.occurrences > 1 {
            write!(f, " (x{})", self.occurrences)?;
        }
        Ok(())
    }
}

/// Accumulating error list passed explicitly to everything that can degrade.
#[derive(Clone, Debug, Default)]
pub struct ErrorList {
    entries: Vec<Diagnostic>,
    lookup: HashMap<(ErrorCode, Severity, String), usize>,
    counts: [usize; 3],
}

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence of a condition.
    pub fn report(&mut self, severity: Severity, code: ErrorCode, message: impl Into<String>) {
        let message = message.into();
        self.counts[severity.slot()] += 1;

        let key = (code, severity, message);
        if let Some(&at) = self.lookup.get(&key) {
            self.entries[at].occurrences += 1;
            return;
        }
        let (code, severity, message) = key;
        tracing::debug!(code = code.code(), %severity, %message, "diagnostic recorded");
        self.lookup
            .insert((code, severity, message.clone()), self.entries.len());
        self.entries.push(Diagnostic {
            code,
            severity,
            message,
            occurrences: 1,
        });
    }

    pub fn warning(&mut self, code: ErrorCode, message: impl Into<String>) {
        self.report(Severity::Warning, code, message);
    }

    pub fn error(&mut self, code: ErrorCode, message: impl Into<String>) {
        self.report(Severity::Error, code, message);
    }

    pub fn fatal(&mut self, code: ErrorCode, message: impl Into<String>) {
        self.report(Severity::Fatal, code, message);
    }

    /// Occurrences recorded at the given severity.
    pub fn count(&self, severity: Severity) -> usize {
        self.counts[severity.slot()]
    }

    pub fn num_warnings(&self) -> usize {
        self.count(Severity::Warning)
    }

    pub fn num_errors(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn num_fatals(&self) -> usize {
        self.count(Severity::Fatal)
    }

    /// Error plus Fatal occurrences. Compare two readings to learn whether a
    /// pass failed.
    pub fn failures(&self) -> usize {
        self.num_errors() + self.num_fatals()
    }

    pub fn has_failures(&self) -> bool {
        self.failures() > 0
    }

    /// True when nothing at all has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct messages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// Distinct messages carrying the given code.
    pub fn with_code(&self, code: ErrorCode) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |d| d.code == code)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.lookup.clear();
        self.counts = [0; 3];
    }

    /// Most severe message recorded, if any.
    pub fn worst(&self) -> Option<&Diagnostic> {
        self.entries.iter().max_by_key(|d| d.severity)
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, d) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{d}")?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ErrorList {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_severity() {
        let mut list = ErrorList::new();
        list.warning(ErrorCode::DelayOperator, "delay ignored");
        list.error(ErrorCode::UnresolvedName, "unknown name 'q'");
        list.fatal(ErrorCode::OutOfMemory, "no memory");

        assert_eq!(list.num_warnings(), 1);
        assert_eq!(list.num_errors(), 1);
        assert_eq!(list.num_fatals(), 1);
        assert_eq!(list.failures(), 2);
        assert_eq!(list.worst().map(|d| d.severity), Some(Severity::Fatal));
    }

    #[test]
    fn repeated_reports_fold_into_one_entry() {
        let mut list = ErrorList::new();
        for _ in 0..3 {
            list.warning(ErrorCode::NonIntegerFactorial, "factorial of 2.5");
        }
        list.warning(ErrorCode::NonIntegerFactorial, "factorial of 3.5");

        assert_eq!(list.len(), 2);
        assert_eq!(list.num_warnings(), 4);
        let first = list.iter().next().unwrap();
        assert_eq!(first.occurrences, 3);
        assert!(first.to_string().ends_with("(x3)"));
    }

    #[test]
    fn warnings_are_not_failures() {
        let mut list = ErrorList::new();
        list.warning(ErrorCode::UndefinedFunction, "f");
        assert!(!list.has_failures());
        assert!(!list.is_empty());
    }

    #[test]
    fn clear_resets_everything() {
        let mut list = ErrorList::new();
        list.error(ErrorCode::CyclicDependency, "a");
        list.clear();
        assert!(list.is_empty());
        assert_eq!(list.failures(), 0);
        list.error(ErrorCode::CyclicDependency, "a");
        assert_eq!(list.iter().next().unwrap().occurrences, 1);
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorCode::UnsupportedModel.code(), 1000);
        assert_eq!(ErrorCode::IntegratorFailure.code(), 2004);
        assert_eq!(list_codes().len(), 14);
    }

    fn list_codes() -> Vec<u32> {
        let mut codes: Vec<u32> = [
            ErrorCode::UnsupportedModel,
            ErrorCode::UnsupportedFeature,
            ErrorCode::InvalidInput,
            ErrorCode::OutOfMemory,
            ErrorCode::IntegratorFailure,
            ErrorCode::UnknownNode,
            ErrorCode::EmptyNode,
            ErrorCode::CyclicDependency,
            ErrorCode::UnresolvedName,
            ErrorCode::DelayOperator,
            ErrorCode::UndefinedFunction,
            ErrorCode::NonIntegerFactorial,
            ErrorCode::LambdaOutsideDefinition,
            ErrorCode::SettleLimitExceeded,
        ]
        .iter()
        .map(|c| c.code())
        .collect();
        codes.sort_unstable();
        codes.dedup();
        codes
    }
}
