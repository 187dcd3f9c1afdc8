use std::sync::Mutex;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiagnosticLevel {
    Error,
    Warning,
    Info,
}

/// A message raised during a build, tagged with the area it concerns
/// (`config`, `page`, `bundle`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub scope: String,
    pub message: String,
}

/// Diagnostics sink for a single build. Every entry is also emitted as a
/// `tracing` event.
#[derive(Debug, Default)]
pub struct BuildReport {
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl BuildReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&self, scope: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(scope, "{message}");
        self.push(DiagnosticLevel::Info, scope, message);
    }

    pub fn warn(&self, scope: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(scope, "{message}");
        self.push(DiagnosticLevel::Warning, scope, message);
    }

    pub fn error(&self, scope: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(scope, "{message}");
        self.push(DiagnosticLevel::Error, scope, message);
    }

    fn push(&self, level: DiagnosticLevel, scope: &str, message: String) {
        let mut diagnostics = self
            .diagnostics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        diagnostics.push(Diagnostic {
            level,
            scope: scope.to_string(),
            message,
        });
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn warnings(&self) -> Vec<Diagnostic> {
        self.diagnostics()
            .into_iter()
            .filter(|d| d.level == DiagnosticLevel::Warning)
            .collect()
    }
}
