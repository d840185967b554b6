pub mod feature_matching;
pub mod homography;
pub mod keypoints;
pub mod template_matching;

pub use feature_matching::{match_by_features, FeatureReport};
pub use template_matching::{match_template_rotated, TemplateReport};

use thiserror::Error;

/// Why a matching strategy produced no usable center.
///
/// A failure is the normal "no match" channel, not an error: strategies still
/// report their score for diagnostics alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MatchFailure {
    #[error("empty input image")]
    EmptyInput,
    #[error("insufficient keypoints")]
    InsufficientKeypoints,
    #[error("insufficient descriptors")]
    InsufficientDescriptors,
    #[error("too few good matches")]
    TooFewGoodMatches,
    #[error("homography estimation failed")]
    HomographyFailed,
    #[error("score below threshold")]
    BelowThreshold,
    #[error("region too small")]
    RegionTooSmall,
    #[error("no correlation peak")]
    NoCorrelation,
}

/// Optional diagnostic sink. Strategies write free-form strings into it; a
/// `None` sink is a no-op and the sink never influences results.
pub type DiagSink<'a> = Option<&'a dyn Fn(&str)>;

pub(crate) fn diag(sink: DiagSink<'_>, message: impl AsRef<str>) {
    let message = message.as_ref();
    log::debug!("{message}");
    if let Some(sink) = sink {
        sink(message);
    }
}

/// Map a unit-interval quality value onto the 0-100 confidence scale.
pub(crate) fn to_score(value: f64) -> i32 {
    (100.0 * value.clamp(0.0, 1.0)).round() as i32
}
