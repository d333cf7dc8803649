//! Extension trait for fluent API: attach node logging middleware then compile.

use std::sync::Arc;

use stategraph::StateGraph;

use super::logging::LoggingMiddleware;

/// Attaches [`LoggingMiddleware`] to a graph. Chain with `.compile()?`.
pub trait WithNodeLogging {
    fn with_node_logging(self) -> Self;
}

impl WithNodeLogging for StateGraph {
    fn with_node_logging(self) -> Self {
        self.with_middleware(Arc::new(LoggingMiddleware))
    }
}
