// =============================================================================
// OCC option-symbol codec — UNDERLYINGyymmdd{C|P}SSSSSSSS
// =============================================================================
//
// Strike is encoded as dollars * 1000, zero-padded to 8 digits. Encode/decode
// round-trips `(underlying, expiration, type, strike)` losslessly.

use chrono::NaiveDate;

use crate::error::TradeNovaError;
use crate::types::OptionType;

pub fn encode(underlying: &str, expiration: NaiveDate, option_type: OptionType, strike: f64) -> String {
    let type_char = match option_type {
        OptionType::Call => 'C',
        OptionType::Put => 'P',
    };
    let strike_thousandths = (strike * 1000.0).round() as u64;
    format!(
        "{}{}{}{:08}",
        underlying.to_uppercase(),
        expiration.format("%y%m%d"),
        type_char,
        strike_thousandths
    )
}

pub struct DecodedSymbol {
    pub underlying: String,
    pub expiration: NaiveDate,
    pub option_type: OptionType,
    pub strike: f64,
}

pub fn decode(option_symbol: &str) -> Result<DecodedSymbol, TradeNovaError> {
    let symbol = option_symbol.strip_prefix("O:").unwrap_or(option_symbol);

    // Find the C/P marker by scanning from the back: 8 digits of strike,
    // then the type char, then 6 digits of date, then the underlying.
    if symbol.len() < 15 {
        return Err(TradeNovaError::DataUnavailable {
            symbol: option_symbol.to_string(),
            reason: "option symbol too short to decode".to_string(),
        });
    }
    let (head, strike_str) = symbol.split_at(symbol.len() - 8);
    let strike_thousandths: u64 = strike_str.parse().map_err(|_| TradeNovaError::DataUnavailable {
        symbol: option_symbol.to_string(),
        reason: "non-numeric strike field".to_string(),
    })?;
    let (head, type_char) = head.split_at(head.len() - 1);
    let option_type = match type_char {
        "C" => OptionType::Call,
        "P" => OptionType::Put,
        _ => {
            return Err(TradeNovaError::DataUnavailable {
                symbol: option_symbol.to_string(),
                reason: format!("unrecognized option type char '{type_char}'"),
            })
        }
    };
    let (underlying, date_str) = head.split_at(head.len() - 6);
    let expiration = NaiveDate::parse_from_str(date_str, "%y%m%d").map_err(|_| TradeNovaError::DataUnavailable {
        symbol: option_symbol.to_string(),
        reason: "unparseable expiration date field".to_string(),
    })?;

    Ok(DecodedSymbol {
        underlying: underlying.to_string(),
        expiration,
        option_type,
        strike: strike_thousandths as f64 / 1000.0,
    })
}
