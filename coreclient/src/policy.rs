// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Client-side content policy
//!
//! As long as a specialist was not chosen for an order, participants must not exchange contact
//! details. The backend enforces the same policy; checking it locally avoids sending a message
//! that would be rejected anyway.

use std::sync::LazyLock;

use regex::Regex;

static PHONE_NUMBER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\+?\d[\d\s\-/().]{6,}\d").ok());

static EMAIL_ADDRESS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}").ok());

static LINK: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(https?://|www\.)\S+|\b[a-z0-9\-]+\.(com|net|org|de|io|me)\b").ok()
});

/// Reason a message violates the content policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyViolation {
    PhoneNumber,
    EmailAddress,
    Link,
}

impl PolicyViolation {
    pub fn message(self) -> &'static str {
        match self {
            Self::PhoneNumber => "Phone numbers can only be shared after the order was accepted",
            Self::EmailAddress => {
                "E-mail addresses can only be shared after the order was accepted"
            }
            Self::Link => "Links can only be shared after the order was accepted",
        }
    }
}

/// Checks `text` for contact details.
pub fn check(text: &str) -> Result<(), PolicyViolation> {
    let matches = |regex: &LazyLock<Option<Regex>>| {
        regex.as_ref().is_some_and(|regex| regex.is_match(text))
    };
    // e-mail addresses contain a domain, so check them before links
    if matches(&EMAIL_ADDRESS) {
        Err(PolicyViolation::EmailAddress)
    } else if matches(&PHONE_NUMBER) {
        Err(PolicyViolation::PhoneNumber)
    } else if matches(&LINK) {
        Err(PolicyViolation::Link)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn patterns_compile() {
        assert!(PHONE_NUMBER.is_some());
        assert!(EMAIL_ADDRESS.is_some());
        assert!(LINK.is_some());
    }

    #[test]
    fn detects_contact_details() {
        assert_eq!(
            check("call me at +49 170 1234567"),
            Err(PolicyViolation::PhoneNumber)
        );
        assert_eq!(
            check("write to alice@example.com"),
            Err(PolicyViolation::EmailAddress)
        );
        assert_eq!(
            check("see https://example.org/portfolio"),
            Err(PolicyViolation::Link)
        );
        assert_eq!(check("my site is alice.de"), Err(PolicyViolation::Link));
    }

    #[test]
    fn allows_ordinary_messages() {
        assert_eq!(check("I can come on the 3rd at 10:30."), Ok(()));
        assert_eq!(check("The price is 120 EUR for 2 rooms"), Ok(()));
        assert_eq!(check("hello"), Ok(()));
    }
}
