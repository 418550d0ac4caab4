//! Default exception sink.

use splice_core::ExceptionSink;

/// Writes module failures to the `tracing` log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ExceptionSink for TracingSink {
    fn log(&self, module_id: &str, error: &(dyn std::error::Error + 'static)) {
        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }
        tracing::error!(
            module = module_id,
            error = %error,
            causes = ?chain,
            "module exception"
        );
    }
}
