mod helpers;
mod ingredients;
mod seed;
mod targets;
mod users;

pub(crate) use ingredients::cmd_ingredients;
pub(crate) use seed::cmd_seed;
pub(crate) use targets::cmd_targets;
pub(crate) use users::cmd_user_active;
