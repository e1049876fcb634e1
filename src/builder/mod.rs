//! Binary builders
//!
//! The build service hands a resolved dependency set to a `Builder` and gets
//! binary bytes back. Cancellation is by drop: implementations must not leave
//! work running once their future is dropped.

mod native;

pub use native::{NativeBuilder, NativeBuilderConfig};

use crate::catalog::ResolvedSet;
use crate::error::ForgeResult;
use crate::platform::Platform;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Max number of output lines to include in build error messages.
const BUILD_ERROR_TAIL_LINES: usize = 50;

/// Toolchain capability consumed by the build service
#[async_trait]
pub trait Builder: Send + Sync {
    /// Produce the binary for `platform` from the resolved set.
    ///
    /// Fails with `ForgeError::Build` on toolchain failure.
    async fn build(&self, platform: &Platform, resolved: &ResolvedSet) -> ForgeResult<Vec<u8>>;
}

/// Extract the useful tail of build output for error diagnostics.
pub(crate) fn build_error_output(lines: &[String]) -> String {
    let start = lines.len().saturating_sub(BUILD_ERROR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Stream stdout+stderr from a child process, calling `on_output` for each line.
///
/// Returns all collected output lines for error reporting.
pub(crate) async fn stream_child_output(
    child: &mut tokio::process::Child,
    on_output: &(dyn Fn(&str) + Send + Sync),
) -> Vec<String> {
    let mut stderr_reader = child.stderr.take().map(|s| BufReader::new(s).lines());
    let mut stdout_reader = child.stdout.take().map(|s| BufReader::new(s).lines());

    let mut all_output = Vec::new();

    while stderr_reader.is_some() || stdout_reader.is_some() {
        tokio::select! {
            line = next_line(&mut stderr_reader), if stderr_reader.is_some() => {
                match line {
                    Some(line) => {
                        on_output(&line);
                        all_output.push(line);
                    }
                    None => stderr_reader = None,
                }
            }
            line = next_line(&mut stdout_reader), if stdout_reader.is_some() => {
                match line {
                    Some(line) => {
                        on_output(&line);
                        all_output.push(line);
                    }
                    None => stdout_reader = None,
                }
            }
        }
    }

    all_output
}

async fn next_line<R>(reader: &mut Option<tokio::io::Lines<BufReader<R>>>) -> Option<String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    match reader {
        Some(lines) => lines.next_line().await.ok().flatten(),
        None => None,
    }
}
