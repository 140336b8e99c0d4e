// =============================================================================
// Option Selector — picks one contract from a filtered chain
// =============================================================================
//
// Deterministic tiebreak, grounded in the donor's entry-sizing code in
// `position_engine.rs` (a single best candidate is chosen, never a random
// one, so a re-run against the same inputs reproduces the same trade).

use chrono::Utc;

use crate::error::TradeNovaError;
use crate::options::contract::OptionContract;
use crate::types::{Direction, OptionType};

pub const PRICE_FLOOR: f64 = 0.10;

#[derive(Debug, Clone, Copy)]
pub struct SelectorConfig {
    pub min_dte: i64,
    pub max_dte: i64,
    pub preferred_dte: (i64, i64),
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            min_dte: 0,
            max_dte: 30,
            preferred_dte: (0, 7),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelectedContract {
    pub contract: OptionContract,
}

fn preferred_distance(dte: i64, preferred: (i64, i64)) -> i64 {
    if dte < preferred.0 {
        preferred.0 - dte
    } else if dte > preferred.1 {
        dte - preferred.1
    } else {
        0
    }
}

/// Select the single best contract matching `direction` at the underlying's
/// current `price`. Ties break, in order: closest to preferred DTE window,
/// smallest |strike - price|, tightest spread, higher volume, higher open
/// interest, lower mid price.
pub fn select_contract(
    chain: &[OptionContract],
    direction: Direction,
    price: f64,
    cfg: &SelectorConfig,
) -> Result<SelectedContract, TradeNovaError> {
    let wanted_type = match direction {
        Direction::Long => OptionType::Call,
        Direction::Short => OptionType::Put,
        Direction::Flat => {
            return Err(TradeNovaError::NoLiquidContract {
                symbol: "".to_string(),
                reason: "no contract is selected for a flat intent".to_string(),
            })
        }
    };

    let today = Utc::now().date_naive();
    let candidates: Vec<&OptionContract> = chain
        .iter()
        .filter(|c| c.option_type == wanted_type)
        .filter(|c| c.mid() >= PRICE_FLOOR)
        .filter(|c| {
            let dte = c.dte(today);
            dte >= cfg.min_dte && dte <= cfg.max_dte
        })
        .collect();

    if candidates.is_empty() {
        return Err(TradeNovaError::NoLiquidContract {
            symbol: chain.first().map(|c| c.underlying.clone()).unwrap_or_default(),
            reason: format!("no {wanted_type} contract within DTE window and above price floor"),
        });
    }

    let best = candidates
        .into_iter()
        .min_by(|a, b| {
            let key = |c: &&OptionContract| {
                let dte = c.dte(today);
                (
                    preferred_distance(dte, cfg.preferred_dte),
                    ordered_f64((c.strike - price).abs()),
                    ordered_f64(c.spread_pct().unwrap_or(f64::MAX)),
                    std::cmp::Reverse(c.volume),
                    std::cmp::Reverse(c.open_interest),
                    ordered_f64(c.mid()),
                )
            };
            key(a).cmp(&key(b))
        })
        .expect("non-empty candidates checked above");

    Ok(SelectedContract { contract: best.clone() })
}

/// Total-ordering wrapper so f64 tiebreak fields can sit in a tuple `Ord` key.
fn ordered_f64(x: f64) -> OrderedF64 {
    OrderedF64(x)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct OrderedF64(f64);

impl Eq for OrderedF64 {}

impl PartialOrd for OrderedF64 {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedF64 {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(std::cmp::Ordering::Equal)
    }
}
