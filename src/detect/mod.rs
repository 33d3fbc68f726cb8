pub mod background;
pub mod backends;
pub mod blink;
pub mod fall;
pub mod foreground;
mod signals;

pub use background::BackgroundModel;
pub use backends::StubLandmarks;
#[cfg(feature = "landmarks-tract")]
pub use backends::TractFaceMesh;
pub use blink::{
    select_blink_estimator, BlinkEstimator, FaceLandmarks, LandmarkBackend,
    LandmarkBlinkEstimator, NullBlinkEstimator,
};
pub use fall::{assess_fall, BoundingBox, FallAssessment, FALL_MOTION_FLOOR};
pub use foreground::{Foreground, ForegroundExtractor};
pub use signals::{FrameOutcome, FrameSignals, SignalExtractor, Stage, StageFailure};
