//! Admin secret and storage locker name generation
//!
//! Both draw from the same OS-seeded CSPRNG.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{CryptoRng, Rng, SeedableRng};
use tracing::debug;

const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";

/// Lowercase letters in a generated secret
pub const SECRET_LOWERCASE: usize = 20;

/// Uppercase letters in a generated secret
pub const SECRET_UPPERCASE: usize = 20;

/// Digits in a generated secret
pub const SECRET_DIGITS: usize = 10;

/// Length of a generated secret
pub const SECRET_LEN: usize = SECRET_LOWERCASE + SECRET_UPPERCASE + SECRET_DIGITS;

/// Prefix of generated storage locker names
pub const LOCKER_PREFIX: &str = "cyclecloud";

/// Random lowercase characters after the locker prefix
pub const LOCKER_SUFFIX_LEN: usize = 14;

/// Resolve the admin secret: the override verbatim, or a fresh secret
pub fn generate_secret(override_secret: Option<&str>) -> String {
    match override_secret.filter(|s| !s.is_empty()) {
        Some(secret) => {
            debug!("Admin secret supplied, using it as-is");
            secret.to_string()
        }
        None => {
            debug!("Generating admin secret");
            generate_secret_with(&mut secure_rng())
        }
    }
}

/// Build a secret of 20 lowercase, 20 uppercase and 10 digit characters in
/// shuffled order
pub fn generate_secret_with<R: Rng + CryptoRng>(rng: &mut R) -> String {
    let mut chars = Vec::with_capacity(SECRET_LEN);
    push_random(rng, LOWERCASE, SECRET_LOWERCASE, &mut chars);
    push_random(rng, UPPERCASE, SECRET_UPPERCASE, &mut chars);
    push_random(rng, DIGITS, SECRET_DIGITS, &mut chars);
    chars.shuffle(rng);
    chars.into_iter().map(char::from).collect()
}

/// Resolve the storage locker name: the override verbatim, or
/// `cyclecloud` followed by 14 random lowercase letters
pub fn generate_locker_name(override_name: Option<&str>) -> String {
    match override_name.filter(|s| !s.is_empty()) {
        Some(name) => name.to_string(),
        None => generate_locker_name_with(&mut secure_rng()),
    }
}

pub fn generate_locker_name_with<R: Rng + CryptoRng>(rng: &mut R) -> String {
    let mut suffix = Vec::with_capacity(LOCKER_SUFFIX_LEN);
    push_random(rng, LOWERCASE, LOCKER_SUFFIX_LEN, &mut suffix);
    let mut name = String::with_capacity(LOCKER_PREFIX.len() + LOCKER_SUFFIX_LEN);
    name.push_str(LOCKER_PREFIX);
    name.extend(suffix.into_iter().map(char::from));
    name
}

fn push_random<R: Rng>(rng: &mut R, alphabet: &[u8], count: usize, out: &mut Vec<u8>) {
    for _ in 0..count {
        out.push(alphabet[rng.random_range(0..alphabet.len())]);
    }
}

fn secure_rng() -> StdRng {
    StdRng::from_os_rng()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(secret: &str) -> (usize, usize, usize) {
        let lower = secret.chars().filter(|c| c.is_ascii_lowercase()).count();
        let upper = secret.chars().filter(|c| c.is_ascii_uppercase()).count();
        let digits = secret.chars().filter(|c| c.is_ascii_digit()).count();
        (lower, upper, digits)
    }

    #[test]
    fn test_generated_secret_shape() {
        for _ in 0..50 {
            let secret = generate_secret(None);
            assert_eq!(secret.len(), 50);
            assert_eq!(counts(&secret), (20, 20, 10));
        }
    }

    #[test]
    fn test_secret_is_shuffled() {
        // A seeded generator keeps this deterministic
        let mut rng = StdRng::seed_from_u64(42);
        let secret = generate_secret_with(&mut rng);
        let first_twenty = &secret[..20];
        assert!(!first_twenty.chars().all(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn test_secrets_differ() {
        assert_ne!(generate_secret(None), generate_secret(None));
    }

    #[test]
    fn test_override_used_verbatim() {
        assert_eq!(generate_secret(Some("p@ss w0rd")), "p@ss w0rd");
    }

    #[test]
    fn test_empty_override_generates() {
        assert_eq!(generate_secret(Some("")).len(), SECRET_LEN);
    }

    #[test]
    fn test_locker_name_shape() {
        let name = generate_locker_name(None);
        assert_eq!(name.len(), 24);
        let suffix = name.strip_prefix("cyclecloud").unwrap();
        assert_eq!(suffix.len(), 14);
        assert!(suffix.chars().all(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn test_locker_override_wins() {
        assert_eq!(generate_locker_name(Some("mylocker01")), "mylocker01");
    }
}
