// Tables of the sea-orm repository adapter
pub mod demand_forecast;
pub mod demand_observation;
pub mod seasonal_pattern;
