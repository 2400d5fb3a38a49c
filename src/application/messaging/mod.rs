//! Message handling - Parsing, middleware and dispatching

pub mod dispatcher;
pub mod middleware;
pub mod parser;

pub use dispatcher::MessageDispatcher;
pub use middleware::{LoggingMiddleware, Middleware, RateLimitMiddleware};
pub use parser::MessageParser;
