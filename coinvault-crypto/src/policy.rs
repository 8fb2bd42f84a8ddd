//! Password strength rules.

use std::fmt;

/// A single rule a password failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordRule {
    MinLength(usize),
    Lowercase,
    Uppercase,
    Digit,
    Special,
}

impl fmt::Display for PasswordRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PasswordRule::MinLength(n) => write!(f, "must be at least {n} characters"),
            PasswordRule::Lowercase => f.write_str("must contain a lowercase letter"),
            PasswordRule::Uppercase => f.write_str("must contain an uppercase letter"),
            PasswordRule::Digit => f.write_str("must contain a digit"),
            PasswordRule::Special => f.write_str("must contain a special character"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_lowercase: bool,
    pub require_uppercase: bool,
    pub require_digit: bool,
    pub require_special: bool,
}

impl PasswordPolicy {
    /// Rules for the local unlocking password.
    pub fn local() -> Self {
        Self {
            min_length: 8,
            require_lowercase: true,
            require_uppercase: true,
            require_digit: true,
            require_special: false,
        }
    }

    /// Rules for the remote-backup password. Stricter than [`PasswordPolicy::local`].
    pub fn backup() -> Self {
        Self {
            require_special: true,
            ..Self::local()
        }
    }

    /// Returns every rule `password` breaks. Empty means valid.
    pub fn violations(&self, password: &str) -> Vec<PasswordRule> {
        let mut failed = Vec::new();
        if password.chars().count() < self.min_length {
            failed.push(PasswordRule::MinLength(self.min_length));
        }
        if self.require_lowercase && !password.chars().any(|c| c.is_lowercase()) {
            failed.push(PasswordRule::Lowercase);
        }
        if self.require_uppercase && !password.chars().any(|c| c.is_uppercase()) {
            failed.push(PasswordRule::Uppercase);
        }
        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            failed.push(PasswordRule::Digit);
        }
        if self.require_special && !password.chars().any(is_special) {
            failed.push(PasswordRule::Special);
        }
        failed
    }

    pub fn is_valid(&self, password: &str) -> bool {
        self.violations(password).is_empty()
    }
}

fn is_special(c: char) -> bool {
    !c.is_alphanumeric() && !c.is_whitespace()
}

/// Rough strength score from 0 (weak) to 4 (strong).
pub fn password_strength(password: &str) -> u8 {
    let len = password.chars().count();
    let has_lower = password.chars().any(|c| c.is_lowercase());
    let has_upper = password.chars().any(|c| c.is_uppercase());
    let checks = [
        len >= 8,
        len >= 12,
        has_lower && has_upper,
        password.chars().any(|c| c.is_ascii_digit()),
        password.chars().any(is_special),
    ];
    let score = checks.iter().filter(|ok| **ok).count();
    score.min(4) as u8
}
