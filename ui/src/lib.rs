//! Input handling and frame projection on top of `kbar-core`.

mod frame;
pub mod logging;
mod runtime;
mod session;
mod source;

pub use frame::{AxisTick, CandleGeometry, Frame, build_frame, format_price, format_time};
pub use logging::init_logging;
pub use runtime::shared_runtime;
pub use session::{ChartSession, InputEvent, NavKey, RedrawNeeded};
pub use source::{FileSource, SourceFormat, detect_format};
