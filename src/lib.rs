pub mod algorithms;
pub mod alignment;
pub mod config;
pub mod locator;
pub mod preprocessing;
pub mod roi;

pub use algorithms::{
    match_by_features, match_template_rotated, DiagSink, FeatureReport, MatchFailure,
    TemplateReport,
};
pub use alignment::{place_inspections, reposition_dependent_region, AnchorContext, ImgPoint};
pub use config::{MatchMode, MatcherConfig};
pub use locator::{locate_in_search_region, locate_template_in_rect, LocateParams};
pub use roi::{PixelRect, Roi, RoiRole, RoiShape};

pub type Result<T> = anyhow::Result<T>;
