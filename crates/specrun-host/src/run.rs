//! `specrun-host run`: run one request file in this process.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use specrun_core::{RecursiveTaskRunner, RunOptions, RunRequest, TaskResult};

use crate::colors::{BOLD, GREEN, RED, RESET, YELLOW};
use crate::console::{ConsoleTaskServer, Summary};

/// Run the request at `path`, adding the command-line filters to its options.
pub fn execute(path: &Path, overrides: RunOptions) -> anyhow::Result<()> {
    let bytes = fs::read(path)
        .with_context(|| format!("Failed to read run request {}", path.display()))?;
    let mut request = RunRequest::from_json(&bytes)?;
    merge_options(&mut request.options, overrides);

    tracing::debug!(
        "Running {} ({} child tasks)",
        request.tree.task.id,
        request.tree.descendants().count()
    );

    let server = Arc::new(ConsoleTaskServer::new(&request.tree));
    let mut runner = RecursiveTaskRunner::new(server.clone()).with_options(request.options);
    let result = runner.run_to_completion(&request.tree)?;

    print_summary(result, server.summary());

    if result == TaskResult::Error {
        anyhow::bail!("Run of {} failed", request.tree.task.id);
    }
    Ok(())
}

fn merge_options(options: &mut RunOptions, overrides: RunOptions) {
    options.include_tags.extend(overrides.include_tags);
    options.exclude_tags.extend(overrides.exclude_tags);
    options.filters.extend(overrides.filters);
}

fn print_summary(result: TaskResult, summary: Summary) {
    let color = if result.is_failure() || summary.failed > 0 || summary.errors > 0 {
        RED
    } else {
        GREEN
    };
    println!();
    print!("{BOLD}{color}{} passed, {} failed{RESET}", summary.passed, summary.failed);
    if summary.skipped > 0 || summary.inconclusive > 0 {
        print!(
            ", {YELLOW}{} skipped, {} not implemented{RESET}",
            summary.skipped, summary.inconclusive
        );
    }
    if summary.errors > 0 {
        print!(", {RED}{} errors{RESET}", summary.errors);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_filters_extend_request() {
        let mut options = RunOptions {
            include_tags: vec!["db".to_string()],
            ..Default::default()
        };
        merge_options(
            &mut options,
            RunOptions {
                include_tags: vec!["fast".to_string()],
                filters: vec!["a::one".to_string()],
                ..Default::default()
            },
        );

        assert_eq!(options.include_tags, vec!["db", "fast"]);
        assert_eq!(options.filters, vec!["a::one"]);
        assert!(options.exclude_tags.is_empty());
    }
}
