pub mod adapter;
pub mod candle_buffer;

pub use adapter::{DataAdapter, FallbackDataAdapter};
pub use candle_buffer::{Bar, BarBuffer, BarKey};
