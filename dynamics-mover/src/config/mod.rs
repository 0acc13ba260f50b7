//! Run configuration: settings file, date window and filename masks

mod mask;
mod settings;

pub use settings::{
    DateFilterOptions, ExportPlan, ImportPlan, Mode, MoverSettings, ResolvedSettings, SettingsError,
    parse_date,
};
