mod checkers;
mod defaults;
mod engine;
mod models;

pub use checkers::{
    AspectTarget, CheckFn, CheckerEntry, CheckerRegistry, ImageRequirements,
    DEFAULT_PADDING_THRESHOLD,
};
pub use defaults::{builtin_rules, is_builtin};
pub use engine::Engine;
pub use models::*;
