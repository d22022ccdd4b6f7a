pub mod bar;
pub mod chart;
pub mod duration;
pub mod instrument;
pub mod series;
pub mod symbol;

pub use bar::{validate_spacing, Bar, BarSize};
pub use chart::{ChartMeta, ChartResponse, PointPayload, RangePayload, SeriesPayload};
pub use duration::{window_to_bars, DurationToken};
pub use instrument::{
    equity_region, future_product, index_default, ChainSegment, ContractSpec, DisplayMeta,
    FutureProduct, Instrument, ResolvedChain,
};
pub use series::{Point, Series, Unit};
pub use symbol::{index_alias, month_code_to_month, month_to_month_code, SymbolToken};
