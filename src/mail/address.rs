//! Recipient address validation
//!
//! A pragmatic dot-atom check, not full RFC 5322: anything accepted here is
//! something every provider we talk to will also accept syntactically.

use once_cell::sync::Lazy;
use regex::Regex;

static ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~.-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
    )
    .expect("valid regex")
});

const MAX_ADDRESS_LEN: usize = 254;
const MAX_LOCAL_PART_LEN: usize = 64;

/// Check whether `address` is a well-formed mailbox address
pub fn is_valid_address(address: &str) -> bool {
    if address.len() > MAX_ADDRESS_LEN || !ADDRESS.is_match(address) {
        return false;
    }

    let Some((local, _domain)) = address.rsplit_once('@') else {
        return false;
    };

    local.len() <= MAX_LOCAL_PART_LEN
        && !local.starts_with('.')
        && !local.ends_with('.')
        && !local.contains("..")
}
