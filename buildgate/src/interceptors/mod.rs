//! Launch interceptors: ordered pre-start checks that can veto a build.

mod chain;

pub use chain::{InterceptContext, InterceptResult, InterceptorChain, LaunchInterceptor};
