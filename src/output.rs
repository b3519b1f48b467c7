use std::path::PathBuf;
use std::sync::Arc;

use crate::noop_sink::NoopSink;
use crate::sink::LineSink;
use crate::stream_sink::{FileSink, StderrSink, StdoutSink};

/// Where formatted lines go, selected from a single target string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Stdout,
    Stderr,
    File(PathBuf),
    Noop,
}

/// Parse an output target string.
///
/// Examples:
/// - "stdout" (also the empty string)
/// - "stderr"
/// - "file:///var/log/app/entries.log"
/// - "noop"
pub fn parse_output(target: &str) -> Result<OutputTarget, OutputError> {
    let trimmed = target.trim();
    let lower = trimmed.to_ascii_lowercase();

    if lower.is_empty() || lower == "stdout" {
        Ok(OutputTarget::Stdout)
    } else if lower == "stderr" {
        Ok(OutputTarget::Stderr)
    } else if lower == "noop" || lower == "none" {
        Ok(OutputTarget::Noop)
    } else if lower.starts_with("file://") {
        let path = &trimmed["file://".len()..];
        if path.is_empty() {
            return Err(OutputError::MissingPath);
        }
        Ok(OutputTarget::File(PathBuf::from(path)))
    } else {
        Err(OutputError::UnknownTarget(trimmed.to_string()))
    }
}

/// Error type returned when parsing or opening an output target.
#[derive(thiserror::Error, Debug)]
pub enum OutputError {
    #[error("unknown or unsupported output target: {0}")]
    UnknownTarget(String),

    #[error("file output target has no path")]
    MissingPath,

    #[error("failed to open log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Create a concrete [`LineSink`] for an [`OutputTarget`].
pub async fn make_sink(target: &OutputTarget) -> Result<Arc<dyn LineSink>, OutputError> {
    match target {
        OutputTarget::Stdout => Ok(Arc::new(StdoutSink::stdout()) as Arc<dyn LineSink>),
        OutputTarget::Stderr => Ok(Arc::new(StderrSink::stderr()) as Arc<dyn LineSink>),
        OutputTarget::Noop => Ok(Arc::new(NoopSink) as Arc<dyn LineSink>),
        OutputTarget::File(path) => {
            let sink = FileSink::open(path).await.map_err(|source| OutputError::Open {
                path: path.clone(),
                source,
            })?;
            Ok(Arc::new(sink) as Arc<dyn LineSink>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_targets() {
        assert_eq!(parse_output("").unwrap(), OutputTarget::Stdout);
        assert_eq!(parse_output("STDOUT").unwrap(), OutputTarget::Stdout);
        assert_eq!(parse_output("stderr").unwrap(), OutputTarget::Stderr);
        assert_eq!(parse_output("noop").unwrap(), OutputTarget::Noop);
        assert_eq!(
            parse_output("file:///var/log/App.log").unwrap(),
            OutputTarget::File(PathBuf::from("/var/log/App.log"))
        );
    }

    #[test]
    fn rejects_unknown_and_empty_file() {
        assert!(matches!(parse_output("kafka://broker/topic"), Err(OutputError::UnknownTarget(_))));
        assert!(matches!(parse_output("file://"), Err(OutputError::MissingPath)));
    }

    #[tokio::test]
    async fn open_failure_names_the_path() {
        let target = OutputTarget::File(PathBuf::from("/nonexistent-dir/for/sure/x.log"));
        match make_sink(&target).await {
            Err(OutputError::Open { path, .. }) => assert_eq!(path, PathBuf::from("/nonexistent-dir/for/sure/x.log")),
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("expected open failure"),
        }
    }
}
