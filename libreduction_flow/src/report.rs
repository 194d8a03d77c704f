use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReportLevel {
    Notice,
    Warning,
    Error,
}

impl Display for ReportLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Notice => write!(f, "notice"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Where a Report ends up
pub trait LogSink {
    fn notice(&mut self, text: &str);
    fn warning(&mut self, text: &str);
    fn error(&mut self, text: &str);
}

/// Forwards report entries to the default spdlog logger
#[derive(Debug, Clone, Copy, Default)]
pub struct SpdlogSink;

impl LogSink for SpdlogSink {
    fn notice(&mut self, text: &str) {
        spdlog::info!("{text}");
    }

    fn warning(&mut self, text: &str) {
        spdlog::warn!("{text}");
    }

    fn error(&mut self, text: &str) {
        spdlog::error!("{text}");
    }
}

/// Keeps everything it receives. Handy for checking what a run reported.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    pub entries: Vec<(ReportLevel, String)>,
}

impl LogSink for RecordingSink {
    fn notice(&mut self, text: &str) {
        self.entries.push((ReportLevel::Notice, text.to_string()));
    }

    fn warning(&mut self, text: &str) {
        self.entries.push((ReportLevel::Warning, text.to_string()));
    }

    fn error(&mut self, text: &str) {
        self.entries.push((ReportLevel::Error, text.to_string()));
    }
}

/// Report collects the messages of a single run in order.
///
/// Nothing reaches a sink until [`Report::to_log`] is called, which normally happens once a
/// run has finished successfully. A run that fails drops its Report, so its warnings are
/// never seen.
#[derive(Debug, Clone, Default)]
pub struct Report {
    entries: Vec<(ReportLevel, String)>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notice(&mut self, text: impl Into<String>) {
        self.entries.push((ReportLevel::Notice, text.into()));
    }

    pub fn warning(&mut self, text: impl Into<String>) {
        self.entries.push((ReportLevel::Warning, text.into()));
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.entries.push((ReportLevel::Error, text.into()));
    }

    pub fn entries(&self) -> &[(ReportLevel, String)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Send every entry to the sink, in insertion order. Calling this twice sends everything twice.
    pub fn to_log(&self, sink: &mut dyn LogSink) {
        for (level, text) in self.entries.iter() {
            match level {
                ReportLevel::Notice => sink.notice(text),
                ReportLevel::Warning => sink.warning(text),
                ReportLevel::Error => sink.error(text),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_is_kept() {
        let mut report = Report::new();
        report.notice("a");
        report.warning("b");
        let mut sink = RecordingSink::default();
        report.to_log(&mut sink);
        assert_eq!(
            sink.entries,
            vec![
                (ReportLevel::Notice, String::from("a")),
                (ReportLevel::Warning, String::from("b"))
            ]
        );
    }

    #[test]
    fn test_to_log_twice_reemits() {
        let mut report = Report::new();
        report.error("bad");
        let mut sink = RecordingSink::default();
        report.to_log(&mut sink);
        report.to_log(&mut sink);
        assert_eq!(sink.entries.len(), 2);
        assert_eq!(sink.entries[1].0, ReportLevel::Error);
    }
}
