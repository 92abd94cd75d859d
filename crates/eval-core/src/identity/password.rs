//! Hash de contraseñas: PBKDF2-HMAC-SHA256 con sal aleatoria.
//!
//! Formato almacenado: `pbkdf2_sha256$<iteraciones>$<sal hex>$<hash hex>`.

use rand::RngCore;
use sha2::Sha256;

const SCHEME: &str = "pbkdf2_sha256";
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    iterations: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self { iterations: 100_000 }
    }
}

impl PasswordHasher {
    pub fn new(iterations: u32) -> Self {
        Self { iterations: iterations.max(1) }
    }

    pub fn hash(&self, password: &str) -> String {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let digest = derive(password, &salt, self.iterations);
        format!("{SCHEME}${}${}${}", self.iterations, hex::encode(salt), hex::encode(digest))
    }

    /// `false` ante cualquier formato desconocido.
    pub fn verify(&self, password: &str, stored: &str) -> bool {
        let parts: Vec<&str> = stored.split('$').collect();
        let [scheme, iters, salt, expected] = parts.as_slice() else {
            return false;
        };
        if *scheme != SCHEME {
            return false;
        }
        let (Ok(iterations), Ok(salt), Ok(expected)) = (iters.parse::<u32>(), hex::decode(salt), hex::decode(expected))
        else {
            return false;
        };
        let actual = derive(password, &salt, iterations);
        constant_time_eq(&actual, &expected)
    }
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> [u8; HASH_LEN] {
    let mut out = [0u8; HASH_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
    out
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify() {
        let h = PasswordHasher::new(1_000);
        let stored = h.hash("s3cret");
        assert!(stored.starts_with("pbkdf2_sha256$1000$"));
        assert!(h.verify("s3cret", &stored));
        assert!(!h.verify("other", &stored));
        assert_ne!(stored, h.hash("s3cret"));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        let h = PasswordHasher::new(1_000);
        assert!(!h.verify("x", ""));
        assert!(!h.verify("x", "md5$1$aa$bb"));
        assert!(!h.verify("x", "pbkdf2_sha256$nope$aa$bb"));
    }
}
