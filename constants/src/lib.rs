pub mod averaging;
pub mod reference_sets;
pub mod render_settings;
