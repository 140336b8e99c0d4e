pub mod contract;
pub mod selector;
pub mod symbol;
pub mod universe_filter;

pub use contract::{Greeks, LiquidityStamp, OptionContract, Quote};
pub use selector::{select_contract, SelectedContract, SelectorConfig};
pub use symbol::{decode, encode, DecodedSymbol};
pub use universe_filter::{filter_chain, FilterCounters};
