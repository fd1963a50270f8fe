// Orchestration over the repository seam
pub mod forecasting;

pub use forecasting::{BatchFailure, BatchOutcome, Clock, ForecastBundle, ForecastRequest, ForecastService};
