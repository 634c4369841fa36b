mod helpers;
mod ingredient;
mod prep;
mod rate;
mod recipe;
mod version;

pub(crate) use ingredient::{
    cmd_ingredient_add, cmd_ingredient_list, cmd_ingredient_receive, cmd_ingredient_set_price,
};
pub(crate) use prep::{cmd_prep_delete, cmd_prep_generate, cmd_prep_list, cmd_prep_save, cmd_prep_show};
pub(crate) use rate::{cmd_rate_list, cmd_rate_remove, cmd_rate_set, cmd_rate_set_base};
pub(crate) use recipe::{
    cmd_cost, cmd_recipe_add_line, cmd_recipe_create, cmd_recipe_delete, cmd_recipe_list,
    cmd_recipe_remove_line, cmd_recipe_show, cmd_recipe_update,
};
pub(crate) use version::{
    cmd_version_diff, cmd_version_list, cmd_version_rollback, cmd_version_snapshot,
};
