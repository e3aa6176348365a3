mod catalog;
mod helpers;
mod meal;
mod plan;

pub(crate) use catalog::{
    cmd_catalog_export, cmd_catalog_import, cmd_catalog_refresh, cmd_catalog_show,
};
pub(crate) use meal::{
    IngredientArgs, cmd_meal_add, cmd_meal_delete, cmd_meal_edit, cmd_meal_inspire,
    cmd_meal_list, cmd_meal_search, cmd_meal_show,
};
pub(crate) use plan::{
    cmd_plan_create, cmd_plan_delete, cmd_plan_made, cmd_plan_saved, cmd_plan_show,
};
