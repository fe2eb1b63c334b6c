//! Recognition of spoken/typed token transfer requests.
//!
//! The grammar is deliberately small: a recipient address, an amount, an
//! optional repeat count and a token keyword, in any order. Each part is an
//! independent matcher; [`parse_transfer`] composes them. When the token
//! cannot be determined the intent is returned with
//! [`TransferIntent::needs_clarification`] set rather than guessing.
//!
//! ```
//! use omrelay::intent::{parse_transfer, TokenKind};
//!
//! let intent = parse_transfer("转 1 USDC 到 0x1111111111111111111111111111111111111111").unwrap();
//! assert_eq!(intent.kind, TokenKind::Erc20);
//! assert_eq!(intent.amount, "1");
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use alloy_primitives::Address;
use regex::Regex;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;

use crate::command::{Command, CommandKind};
use crate::networks::{TransferDefaults, USDC_DECIMALS};

/// Upper bound on repeated executions triggered by one confirmation.
pub const MAX_REPEAT: u32 = 50;

static ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(0x[0-9a-fA-F]{40})(?:[^0-9a-fA-F]|$)").expect("valid address regex")
});

static COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:转账|转)?\s*(-?[\d.,]*\d)\s*(?:次|times\b)").expect("valid count regex")
});

static AMOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid amount regex"));

static NATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^a-z])(?:ethereum|ether|eth|native)(?:[^a-z]|$)|以太|原生")
        .expect("valid native regex")
});

/// Which token a transfer moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// USDC via its ERC-20 contract.
    Erc20,
    /// The chain's native currency.
    Native,
    /// No token keyword was found.
    Ambiguous,
}

/// A recognized transfer request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferIntent {
    /// Token classification.
    pub kind: TokenKind,
    /// Recipient address.
    pub recipient: Address,
    /// Amount as written, in whole-token units.
    pub amount: String,
    /// Token decimals, known only for ERC-20 transfers.
    pub token_decimals: Option<u8>,
    /// Requested number of repetitions, at least 1. Clamped to
    /// [`MAX_REPEAT`] when executed.
    pub repeat_count: u32,
    /// Set when the token is unknown and the user must be asked.
    pub needs_clarification: bool,
}

impl TransferIntent {
    /// Repeat count clamped to `1..=MAX_REPEAT`.
    #[must_use]
    pub fn capped_repeat(&self) -> u32 {
        self.repeat_count.clamp(1, MAX_REPEAT)
    }

    /// Human-readable token symbol.
    #[must_use]
    pub const fn token_symbol(&self) -> &'static str {
        match self.kind {
            TokenKind::Erc20 => "USDC",
            TokenKind::Native => "ETH",
            TokenKind::Ambiguous => "?",
        }
    }

    /// Converts a committed intent into a transfer [`Command`].
    ///
    /// Returns `None` for ambiguous intents, which must never be executed.
    #[must_use]
    pub fn to_command(&self, defaults: &TransferDefaults) -> Option<Command> {
        let to = self.recipient.to_checksum(None);
        match self.kind {
            TokenKind::Erc20 => Some(Command::new(
                CommandKind::TransferErc20,
                json!({
                    "chain_id": defaults.chain_id,
                    "rpc_url": defaults.rpc_url,
                    "token_address": defaults.token_address.to_checksum(None),
                    "to": to,
                    "amount": self.amount,
                    "decimals": self.token_decimals.unwrap_or(USDC_DECIMALS),
                }),
            )),
            TokenKind::Native => Some(Command::new(
                CommandKind::TransferNative,
                json!({
                    "chain_id": defaults.chain_id,
                    "rpc_url": defaults.rpc_url,
                    "to": to,
                    "amount": self.amount,
                }),
            )),
            TokenKind::Ambiguous => None,
        }
    }
}

impl fmt::Display for TransferIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} -> {}", self.amount, self.token_symbol(), self.recipient)?;
        let times = self.capped_repeat();
        if times > 1 {
            write!(f, " x{times}")?;
        }
        Ok(())
    }
}

/// Parses a transfer request from free text.
///
/// Returns `None` when no recipient address or no positive amount is found,
/// or when the amount or repeat count is not a plain number (`.5`, `1,000`,
/// `-3`, `2.5 次`).
#[must_use]
pub fn parse_transfer(text: &str) -> Option<TransferIntent> {
    let (recipient, rest) = match_address(text)?;
    let (repeat_count, rest) = match_repeat_count(&rest)?;
    let amount = match_amount(&rest)?;
    let kind = classify_token(&rest);

    Some(TransferIntent {
        kind,
        recipient,
        amount,
        token_decimals: (kind == TokenKind::Erc20).then_some(USDC_DECIMALS),
        repeat_count,
        needs_clarification: kind == TokenKind::Ambiguous,
    })
}

/// Finds the first address and returns it with the text minus that address.
fn match_address(text: &str) -> Option<(Address, String)> {
    let m = ADDRESS_RE.captures(text)?.get(1)?;
    let address = Address::from_str(m.as_str()).ok()?;
    let rest = format!("{} {}", &text[..m.start()], &text[m.end()..]);
    Some((address, rest))
}

/// Finds a "N 次" / "N times" phrase. An absent count, zero or an overflowing
/// count is 1; a count that is not a plain integer rejects the whole request.
fn match_repeat_count(text: &str) -> Option<(u32, String)> {
    let Some(caps) = COUNT_RE.captures(text) else {
        return Some((1, text.to_owned()));
    };
    let whole = caps.get(0)?;
    let digits = caps.get(1)?.as_str();
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let count = digits.parse::<u32>().ok().filter(|n| *n >= 1).unwrap_or(1);
    let rest = format!("{} {}", &text[..whole.start()], &text[whole.end()..]);
    Some((count, rest))
}

/// First number in `text`, which must be positive and stand on its own: a
/// sign or separator glued to either side means it is part of something the
/// grammar does not read.
fn match_amount(text: &str) -> Option<String> {
    let m = AMOUNT_RE.find(text)?;
    if matches!(text[..m.start()].chars().next_back(), Some('.' | ',' | '-')) {
        return None;
    }
    let mut after = text[m.end()..].chars();
    if matches!((after.next(), after.next()), (Some('.' | ','), Some(d)) if d.is_ascii_digit()) {
        return None;
    }
    let raw = m.as_str();
    let value = Decimal::from_str(raw).ok()?;
    (value > Decimal::ZERO).then(|| raw.to_owned())
}

fn classify_token(text: &str) -> TokenKind {
    let lower = text.to_lowercase();
    if lower.contains("usdc") {
        TokenKind::Erc20
    } else if NATIVE_RE.is_match(&lower) {
        TokenKind::Native
    } else {
        TokenKind::Ambiguous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const ADDR: &str = "0x1111111111111111111111111111111111111111";

    #[test]
    fn test_erc20_transfer() {
        let intent = parse_transfer(&format!("转 1 USDC 到 {ADDR}")).unwrap();
        assert_eq!(intent.kind, TokenKind::Erc20);
        assert_eq!(intent.amount, "1");
        assert_eq!(intent.token_decimals, Some(6));
        assert_eq!(intent.repeat_count, 1);
        assert_eq!(intent.recipient, address!("1111111111111111111111111111111111111111"));
        assert!(!intent.needs_clarification);
    }

    #[test]
    fn test_missing_token_needs_clarification() {
        let intent = parse_transfer(&format!("转 0.5 给 {ADDR}")).unwrap();
        assert!(intent.needs_clarification);
        assert_eq!(intent.kind, TokenKind::Ambiguous);
        assert_eq!(intent.amount, "0.5");
        assert_eq!(intent.token_decimals, None);
        assert_eq!(intent.to_command(&TransferDefaults::default()), None);
    }

    #[test]
    fn test_native_transfer() {
        let intent = parse_transfer(&format!("send 0.01 ETH to {ADDR}")).unwrap();
        assert_eq!(intent.kind, TokenKind::Native);
        assert_eq!(intent.amount, "0.01");

        let intent = parse_transfer(&format!("转0.2以太到{ADDR}")).unwrap();
        assert_eq!(intent.kind, TokenKind::Native);
        assert_eq!(intent.amount, "0.2");

        for name in ["ether", "Ethereum"] {
            let intent = parse_transfer(&format!("send 2 {name} to {ADDR}")).unwrap();
            assert_eq!(intent.kind, TokenKind::Native, "{name}");
        }
    }

    #[test]
    fn test_repeat_count() {
        let intent = parse_transfer(&format!("转账3次 每次 2 usdc 到 {ADDR}")).unwrap();
        assert_eq!(intent.repeat_count, 3);
        assert_eq!(intent.amount, "2");

        let intent = parse_transfer(&format!("send 5 usdc to {ADDR} 4 times")).unwrap();
        assert_eq!(intent.repeat_count, 4);
        assert_eq!(intent.amount, "5");
    }

    #[test]
    fn test_repeat_count_is_capped_on_execution() {
        let intent = parse_transfer(&format!("转 120 次 1 USDC 到 {ADDR}")).unwrap();
        assert_eq!(intent.repeat_count, 120);
        assert_eq!(intent.capped_repeat(), MAX_REPEAT);
    }

    #[test]
    fn test_unparsable_count_defaults_to_one() {
        let intent =
            parse_transfer(&format!("转 99999999999999 次 1 USDC 到 {ADDR}")).unwrap();
        assert_eq!(intent.repeat_count, 1);
        assert_eq!(intent.amount, "1");
    }

    #[test]
    fn test_malformed_numbers_rejected() {
        assert_eq!(parse_transfer(&format!("转 .5 ETH 到 {ADDR}")), None);
        assert_eq!(parse_transfer(&format!("send 1,000 USDC to {ADDR}")), None);
        assert_eq!(parse_transfer(&format!("send -3 usdc to {ADDR}")), None);
        assert_eq!(parse_transfer(&format!("send 1.2.3 usdc to {ADDR}")), None);
    }

    #[test]
    fn test_fractional_repeat_count_rejected() {
        assert_eq!(parse_transfer(&format!("转 2.5次 1 USDC 到 {ADDR}")), None);
        assert_eq!(parse_transfer(&format!("send 1 usdc to {ADDR} -2 times")), None);
        assert_eq!(parse_transfer(&format!("send 1 usdc to {ADDR} 1,5 times")), None);
    }

    #[test]
    fn test_address_required() {
        assert_eq!(parse_transfer("转 1 USDC 给小明"), None);
        // 41 hex digits is not an address.
        assert_eq!(parse_transfer(&format!("转 1 USDC 到 {ADDR}1")), None);
    }

    #[test]
    fn test_amount_required() {
        assert_eq!(parse_transfer(&format!("转 USDC 到 {ADDR}")), None);
        assert_eq!(parse_transfer(&format!("转 0 USDC 到 {ADDR}")), None);
    }

    #[test]
    fn test_address_digits_do_not_become_amount() {
        let intent = parse_transfer(&format!("{ADDR} usdc 7.25")).unwrap();
        assert_eq!(intent.amount, "7.25");
    }

    #[test]
    fn test_eth_inside_word_is_not_native() {
        let intent = parse_transfer(&format!("send something 3 to {ADDR}")).unwrap();
        assert!(intent.needs_clarification);
    }

    #[test]
    fn test_erc20_command_uses_defaults() {
        let defaults = TransferDefaults::default();
        let intent = parse_transfer(&format!("转 1.5 USDC 到 {ADDR}")).unwrap();
        let cmd = intent.to_command(&defaults).unwrap();
        assert_eq!(cmd.kind, CommandKind::TransferErc20);
        assert_eq!(cmd.value["amount"], "1.5");
        assert_eq!(cmd.value["decimals"], 6);
        assert_eq!(cmd.value["chain_id"], defaults.chain_id);
        assert_eq!(
            cmd.value["token_address"],
            defaults.token_address.to_checksum(None)
        );
    }

    #[test]
    fn test_display() {
        let intent = parse_transfer(&format!("转账2次 1 USDC 到 {ADDR}")).unwrap();
        let shown = intent.to_string();
        assert!(shown.starts_with("1 USDC -> 0x"));
        assert!(shown.ends_with("x2"));
    }
}
