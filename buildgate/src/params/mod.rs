//! Start parameter resolution and `${var}` substitution.

mod resolver;
mod substitution;

pub use resolver::{BuildParameter, ManualStartupInfo, ParameterResolver};
pub use substitution::{parse_env, split_user_list};
