mod ball;
mod predictor;
mod reconciler;
mod spin;

pub use ball::BallState;
pub use predictor::{MotionPredictor, Prediction, PredictionConfig, PredictionState, DEFAULT_GRAVITY};
pub use reconciler::{DisplayState, Reconciler};
pub use spin::{SpinConfig, SpinState};
