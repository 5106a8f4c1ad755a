//! Key encoding for the `RocksDB` backend.
//!
//! Ledger keys follow the `user || ulid` layout so a user's transactions are
//! a contiguous, time-ordered range. Usage keys put the encoded date before
//! the feature name so one user's counters for one day are a contiguous,
//! prefix-deletable range.

use chrono::{Datelike, NaiveDate};

use atelier_core::{TransactionId, UserId};

/// Create an account key from a user id.
#[must_use]
pub fn account_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create a transaction key from a transaction id.
#[must_use]
pub fn transaction_key(transaction_id: &TransactionId) -> Vec<u8> {
    transaction_id.to_bytes().to_vec()
}

/// Create a user-transaction index key.
///
/// Format: `user_id (16 bytes) || transaction_id (16 bytes)`
///
/// Since ULIDs are time-ordered, transactions for a user sort by time.
#[must_use]
pub fn user_transaction_key(user_id: &UserId, transaction_id: &TransactionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&transaction_id.to_bytes());
    key
}

/// Create a prefix for iterating all transactions for a user.
#[must_use]
pub fn user_transactions_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Extract the transaction id from a user-transaction index key.
///
/// # Panics
///
/// Panics if the key is not at least 32 bytes.
#[must_use]
pub fn extract_transaction_id_from_user_key(key: &[u8]) -> TransactionId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..32]);
    TransactionId::from_bytes(bytes).expect("valid ULID bytes")
}

/// Encode a calendar date as a big-endian `u32` (`yyyymmdd`), so encoded
/// dates sort the same way the dates do.
#[must_use]
pub fn encode_date(date: NaiveDate) -> [u8; 4] {
    #[allow(clippy::cast_sign_loss)]
    let packed = date.year() as u32 * 10_000 + date.month() * 100 + date.day();
    packed.to_be_bytes()
}

/// Decode a date encoded with [`encode_date`]. Returns `None` for bytes
/// that do not form a valid calendar date.
#[must_use]
pub fn decode_date(bytes: [u8; 4]) -> Option<NaiveDate> {
    let packed = u32::from_be_bytes(bytes);
    let year = i32::try_from(packed / 10_000).ok()?;
    let month = (packed / 100) % 100;
    let day = packed % 100;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Create a usage counter key.
///
/// Format: `user_id (16 bytes) || date (4 bytes) || feature (utf-8)`
#[must_use]
pub fn usage_counter_key(user_id: &UserId, feature: &str, date: NaiveDate) -> Vec<u8> {
    let mut key = Vec::with_capacity(20 + feature.len());
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&encode_date(date));
    key.extend_from_slice(feature.as_bytes());
    key
}

/// Create a prefix covering all of a user's counters for one date.
#[must_use]
pub fn usage_day_prefix(user_id: &UserId, date: NaiveDate) -> Vec<u8> {
    let mut key = Vec::with_capacity(20);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&encode_date(date));
    key
}

/// Extract the date from a usage counter key.
///
/// Returns `None` for malformed keys.
#[must_use]
pub fn extract_usage_date(key: &[u8]) -> Option<NaiveDate> {
    if key.len() < 20 {
        return None;
    }
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&key[16..20]);
    decode_date(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn account_key_length() {
        let user_id = UserId::generate();
        assert_eq!(account_key(&user_id).len(), 16);
    }

    #[test]
    fn user_transaction_key_format() {
        let user_id = UserId::generate();
        let tx_id = TransactionId::generate();
        let key = user_transaction_key(&user_id, &tx_id);

        assert_eq!(key.len(), 32);
        assert_eq!(&key[..16], user_id.as_bytes());
        assert_eq!(&key[16..], tx_id.to_bytes());
    }

    #[test]
    fn extract_transaction_id_roundtrip() {
        let user_id = UserId::generate();
        let tx_id = TransactionId::generate();
        let key = user_transaction_key(&user_id, &tx_id);

        assert_eq!(extract_transaction_id_from_user_key(&key), tx_id);
    }

    #[test]
    fn encoded_dates_sort_chronologically() {
        let earlier = encode_date(date(2025, 5, 31));
        let later = encode_date(date(2025, 6, 1));
        assert!(earlier < later);
    }

    #[test]
    fn date_roundtrip() {
        let d = date(2025, 12, 31);
        assert_eq!(decode_date(encode_date(d)), Some(d));
    }

    #[test]
    fn usage_key_roundtrip() {
        let user_id = UserId::generate();
        let d = date(2025, 6, 1);
        let key = usage_counter_key(&user_id, "decoder", d);

        assert!(key.starts_with(&usage_day_prefix(&user_id, d)));
        assert_eq!(extract_usage_date(&key), Some(d));
        assert_eq!(&key[20..], b"decoder");
    }
}
