pub mod correlation;
pub mod drawdown;
pub mod indicators;
pub mod returns;
pub mod rsi;
pub mod seasonality;
pub mod volume_profile;

pub use correlation::{horizon_log_returns, rolling_correlation};
pub use drawdown::{drawdown, rolling_drawdown};
pub use indicators::{bollinger, ema, rolling_stdev, sma, zscore};
pub use returns::{log_returns, periods_per_year, rolling_sharpe, rolling_volatility, simple_returns};
pub use rsi::{rsi, RsiBands};
pub use seasonality::{
    day_of_year_index, seasonality_heatmap, seasonality_years, Bucket, SeasonalityHeatmap,
    SeasonalityYears, YearNorm,
};
pub use volume_profile::{volume_profile, ProfileBin, VolumeProfile};
