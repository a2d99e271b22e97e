pub mod default_placement_policy;
pub mod placement_policy;
