//! Matka number rules
//!
//! Patti categories are closed lists, checked literally; they cannot be
//! derived from digit arithmetic alone.

use crate::errors::{WagerError, WagerResult};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

static SINGLE_PATTI: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "127", "136", "145", "190", "235", "280", "370", "389", "460", "479", "569", "578",
        "128", "137", "146", "236", "245", "290", "380", "470", "489", "560", "579", "678",
        "129", "138", "147", "156", "237", "246", "345", "390", "480", "570", "589", "679",
        "120", "139", "148", "157", "238", "247", "256", "346", "490", "580", "670", "689",
        "130", "149", "158", "167", "239", "248", "257", "347", "356", "590", "680", "789",
        "140", "159", "168", "230", "249", "258", "267", "348", "357", "456", "690", "780",
        "123", "150", "169", "178", "240", "259", "268", "349", "358", "367", "457", "790",
        "124", "160", "179", "250", "269", "278", "340", "359", "368", "458", "467", "890",
        "125", "134", "170", "189", "260", "279", "350", "369", "378", "459", "468", "567",
        "126", "135", "180", "234", "270", "289", "360", "379", "450", "469", "478", "568",
    ]
    .into_iter()
    .collect()
});

static DOUBLE_PATTI: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "118", "226", "244", "299", "334", "488", "550", "668", "677",
        "100", "119", "155", "227", "335", "344", "399", "588", "669",
        "110", "200", "228", "255", "336", "499", "660", "688", "778",
        "166", "229", "300", "337", "355", "445", "599", "779", "788",
        "112", "220", "266", "338", "400", "446", "455", "699", "770",
        "113", "122", "177", "339", "366", "447", "500", "799", "889",
        "114", "277", "330", "448", "466", "556", "600", "880", "899",
        "115", "133", "188", "223", "377", "449", "557", "566", "700",
        "116", "224", "233", "288", "440", "477", "558", "800", "990",
        "117", "144", "199", "225", "388", "559", "577", "667", "900",
    ]
    .into_iter()
    .collect()
});

static TRIPLE_PATTI: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["000", "111", "222", "333", "444", "555", "666", "777", "888", "999"]
        .into_iter()
        .collect()
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BetType {
    SingleAnk,
    SinglePatti,
    DoublePatti,
    TriplePatti,
    Jodi,
}

impl BetType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "SINGLE_ANK" => Some(BetType::SingleAnk),
            "SINGLE_PATTI" => Some(BetType::SinglePatti),
            "DOUBLE_PATTI" => Some(BetType::DoublePatti),
            "TRIPLE_PATTI" => Some(BetType::TriplePatti),
            "JODI" => Some(BetType::Jodi),
            _ => None,
        }
    }

    /// Whether `number` is a permitted pick for this bet type
    pub fn accepts(self, number: &str) -> bool {
        match self {
            BetType::SingleAnk => is_digits(number, 1),
            BetType::Jodi => is_digits(number, 2),
            BetType::SinglePatti => SINGLE_PATTI.contains(number),
            BetType::DoublePatti => DOUBLE_PATTI.contains(number),
            BetType::TriplePatti => TRIPLE_PATTI.contains(number),
        }
    }
}

impl fmt::Display for BetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetType::SingleAnk => write!(f, "SINGLE_ANK"),
            BetType::SinglePatti => write!(f, "SINGLE_PATTI"),
            BetType::DoublePatti => write!(f, "DOUBLE_PATTI"),
            BetType::TriplePatti => write!(f, "TRIPLE_PATTI"),
            BetType::Jodi => write!(f, "JODI"),
        }
    }
}

fn is_digits(raw: &str, len: usize) -> bool {
    raw.len() == len && raw.bytes().all(|b| b.is_ascii_digit())
}

fn ank(patti: &str) -> u8 {
    let sum: u32 = patti.bytes().map(|b| u32::from(b - b'0')).sum();
    (sum % 10) as u8
}

/// A declared market result and the digits derived from it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatkaResult {
    pub raw: String,
    pub open_patti: String,
    /// Middle segment, informational only
    pub middle: String,
    pub close_patti: String,
    pub open_ank: u8,
    pub close_ank: u8,
    pub jodi: String,
}

impl MatkaResult {
    /// Parse `DDD-D-DDD` (the middle segment may carry one or two digits)
    pub fn parse(raw: &str) -> WagerResult<Self> {
        let raw = raw.trim();
        let parts: Vec<&str> = raw.split('-').collect();
        let valid = parts.len() == 3
            && is_digits(parts[0], 3)
            && (is_digits(parts[1], 1) || is_digits(parts[1], 2))
            && is_digits(parts[2], 3);
        if !valid {
            return Err(WagerError::validation(format!(
                "result '{}' does not match DDD-DD-DDD",
                raw
            )));
        }

        let open_ank = ank(parts[0]);
        let close_ank = ank(parts[2]);
        Ok(Self {
            raw: raw.to_string(),
            open_patti: parts[0].to_string(),
            middle: parts[1].to_string(),
            close_patti: parts[2].to_string(),
            open_ank,
            close_ank,
            jodi: format!("{}{}", open_ank, close_ank),
        })
    }
}
